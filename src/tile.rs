//! Tiling restrictions over occupancy relations.
//!
//! A tiling restriction is a relation over an occupancy space (spatial
//! tuple to data tuple) whose only constraints tie one data dimension to a
//! block of `n` consecutive values indexed by one spatial dimension.
//! Intersecting an occupancy relation with the restriction splits the data
//! among the spatial axis in contiguous blocks; no code is rewritten and
//! no schedule is touched.

use crate::algebra::{AlgebraError, Result};
use isl_rs::{BasicMap, Constraint, DimType, LocalSpace, Map, Space};

/// Builds the relation that tiles one data axis along one spatial axis.
///
/// Read as: tile the data axis at position `data_dim` of `src_space` in
/// blocks of `n` consecutive elements along the spatial axis at position
/// `axis_dim`. The result constrains exactly
///
/// ```text
/// n * axis <= data < n * axis + n
/// ```
///
/// and leaves every other dimension free, so it can be intersected with an
/// occupancy relation of the same space.
///
/// # Arguments
/// * `data_dim` - data (output) axis index to restrict
/// * `src_space` - the occupancy space the restriction lives in; consumed
/// * `n` - block width, must be positive
/// * `axis_dim` - spatial (input) axis index the blocks are indexed by
///
/// # Errors
/// `Domain` if either index is out of range for the space or `n` is not
/// positive.
pub fn tile(data_dim: u32, src_space: Space, n: i64, axis_dim: u32) -> Result<Map> {
    let n_in = src_space.dim(DimType::In);
    let n_out = src_space.dim(DimType::Out);
    if (axis_dim as i32) >= n_in {
        return Err(AlgebraError::Domain {
            op: "tile",
            reason: format!("spatial axis {} out of range for {} input dims", axis_dim, n_in),
        });
    }
    if (data_dim as i32) >= n_out {
        return Err(AlgebraError::Domain {
            op: "tile",
            reason: format!("data axis {} out of range for {} output dims", data_dim, n_out),
        });
    }
    if n <= 0 {
        return Err(AlgebraError::Domain {
            op: "tile",
            reason: format!("block width must be positive, got {}", n),
        });
    }

    let ls = LocalSpace::from_space(src_space);

    // n * axis <= data, written as data - n * axis >= 0.
    let lower = Constraint::alloc_inequality(ls.copy())
        .set_coefficient_si(DimType::In, axis_dim as i32, -(n as i32))
        .set_coefficient_si(DimType::Out, data_dim as i32, 1);
    // data < n * axis + n, written as n * axis + n - 1 - data >= 0.
    let upper = Constraint::alloc_inequality(ls)
        .set_coefficient_si(DimType::In, axis_dim as i32, n as i32)
        .set_coefficient_si(DimType::Out, data_dim as i32, -1)
        .set_constant_si((n - 1) as i32);

    let tile = BasicMap::from_constraint(lower).add_constraint(upper);
    Ok(Map::from_basic_map(tile))
}

/// Builds a multi-level tiling restriction.
///
/// Each level is `(data_dim, n, axis_dim)` as for [`tile`]; the result is
/// the intersection of all level restrictions, outermost first, suitable
/// for a single `intersect` against the occupancy.
///
/// # Errors
/// `Domain` if `levels` is empty or any level is invalid.
pub fn tile_hierarchy(src_space: Space, levels: &[(u32, i64, u32)]) -> Result<Map> {
    let mut combined: Option<Map> = None;
    for &(data_dim, n, axis_dim) in levels {
        let level = tile(data_dim, src_space.copy(), n, axis_dim)?;
        combined = Some(match combined {
            Some(acc) => acc.intersect(level),
            None => level,
        });
    }
    combined.ok_or_else(|| AlgebraError::Domain {
        op: "tile_hierarchy",
        reason: "no tiling levels given".to_string(),
    })
}
