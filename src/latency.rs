//! Latency and jump-count analysis of occupancy/fill problems.
//!
//! # Problem shape
//!
//! * `src_occupancy : SpatialSrc -> Data` relates each source slot to the
//!   data it holds.
//! * `dst_fill : SpatialDst -> Data` relates each destination slot to the
//!   data it requests.
//! * `dist : [SpatialDst -> SpatialSrc] -> [hops]` is a distance metric in
//!   relation form (see [`crate::metrics`]).
//!
//! # Derivation
//!
//! Both analyses build, for every requested `(dst, data)` pair, the
//! relation to all sources holding that datum, and apply the distance
//! metric to the resulting destination/source pairs:
//!
//! ```text
//! data_to_pairs  = range_product(reverse(dst_fill), reverse(src_occupancy))
//! pairs          = apply_range(range_map(dst_fill), data_to_pairs)
//! pairs          = equate destination coordinates on both sides
//! distance       = apply_range(pairs, dist)        -- [dst -> data] -> hops
//! min_distance   = min_multi_pw_aff(distance)      -- min over sources
//! ```
//!
//! The latency query maximizes `min_distance` over all pairs; the jump
//! query sums it. Neither enumerates points: the minimum is parametric
//! ILP, the sum is Barvinok-style counting, both inside ISL.
//!
//! Enable debug logging to see every intermediate relation by name.

use crate::algebra::{
    self, dump_map, range_product, single_pw_aff, single_val, sum_to_scalar, val_to_i64,
    AlgebraError, Result,
};
use crate::metrics::pw_aff_to_map;
use crate::qpolynomial::PwQpolynomial;
use isl_rs::{Context, DimType, Map};
use std::sync::Arc;

/// Builds the distance relation `[dst -> data] -> [hops]`.
///
/// For every requested pair, the hop counts to each source holding the
/// datum. Shared prologue of both analyses.
fn requested_pair_distances(
    op: &'static str,
    src_occupancy: &Map,
    dst_fill: &Map,
    dist: &Map,
) -> Result<Map> {
    // A metric that is negative somewhere on its domain could hide
    // behind the max-of-min aggregate; screen it before composing.
    algebra::ensure_nonneg_values(op, dist)?;

    // Invert both inputs so that data implies location.
    let dst_fill_inverted = dst_fill.copy().reverse();
    dump_map("dst_fill_inverted", &dst_fill_inverted);
    let src_occupancy_inverted = src_occupancy.copy().reverse();
    dump_map("src_occupancy_inverted", &src_occupancy_inverted);

    // Factored range over the shared data domain:
    // { data -> [dst -> src] }. Fails with SpaceMismatch when the two
    // inputs disagree on the data space.
    let data_to_pairs = range_product(dst_fill_inverted, src_occupancy_inverted)?;
    dump_map("data_to_pairs", &data_to_pairs);

    // { [dst -> data] -> data }: each requested pair keyed to its datum.
    let dst_fill_keyed = dst_fill.copy().range_map();
    dump_map("dst_fill_keyed", &dst_fill_keyed);

    // { [dst -> data] -> [dst' -> src] }, all destinations paired so far.
    let mut pairs = algebra::apply_range(dst_fill_keyed, data_to_pairs)?;
    dump_map("pairs", &pairs);

    // Restrict to dst' = dst, coordinate by coordinate. The nested spaces
    // are treated as flat dimension lists, so the first destination-arity
    // input dimensions line up with the destination half of the range.
    let n_dst = dst_fill.dim(DimType::In);
    for i in 0..n_dst {
        pairs = pairs.equate(DimType::In, i, DimType::Out, i);
    }
    dump_map("pairs_restricted", &pairs);

    // Charge the metric on each surviving pair.
    let distance = algebra::apply_range(pairs, dist.copy())?;
    dump_map("distance", &distance);

    Ok(distance)
}

/// Fails with `Unbounded` when some requested datum has no holding source.
///
/// A minimum over an empty candidate set has no finite value, and the
/// summation path would silently skip the uncovered pair otherwise, so
/// both analyses check coverage up front.
fn ensure_covered(op: &'static str, dst_fill: &Map, distance: &Map) -> Result<()> {
    let wanted = dst_fill.copy().wrap();
    let covered = distance.copy().domain();
    if !wanted.is_subset(&covered) {
        return Err(AlgebraError::Unbounded {
            op,
            detail: "a requested datum is held by no source".to_string(),
        });
    }
    Ok(())
}

/// Worst-case delivery latency of a fill problem.
///
/// For every requested `(dst, data)` pair, the minimum hop count from any
/// source holding the datum; the result is the maximum of those minima
/// over all pairs. A problem whose sources already hold everything in
/// place reports zero.
///
/// # Errors
/// * `SpaceMismatch` if the three inputs disagree on their shared spaces.
/// * `Unbounded` if some requested datum is held by no source, or the
///   extremum does not exist.
/// * `Domain` if the metric is negative on part of its domain.
pub fn analyze_latency(src_occupancy: &Map, dst_fill: &Map, dist: &Map) -> Result<i64> {
    let distance = requested_pair_distances("analyze_latency", src_occupancy, dst_fill, dist)?;
    ensure_covered("analyze_latency", dst_fill, &distance)?;

    // Minimum over sources, per requested pair.
    let min_distance = distance.min_multi_pw_aff();

    // Maximum of the minima over all requested pairs.
    let max_min = min_distance.max_multi_val();
    let val = single_val("analyze_latency", &max_min)?;
    let latency = val_to_i64("analyze_latency", val)?;
    algebra::ensure_nonneg("analyze_latency", latency)
}

/// Total hop count of a fill problem.
///
/// For every requested `(dst, data)` pair, the minimum hop count from any
/// source holding the datum; the result is the sum of those minima over
/// all requested pairs.
///
/// # Errors
/// Same taxonomy as [`analyze_latency`].
pub fn analyze_jumps(src_occupancy: &Map, dst_fill: &Map, dist: &Map) -> Result<i64> {
    let distance = requested_pair_distances("analyze_jumps", src_occupancy, dst_fill, dist)?;
    ensure_covered("analyze_jumps", dst_fill, &distance)?;

    let min_distance = distance.min_multi_pw_aff();
    let per_pair = single_pw_aff("analyze_jumps", &min_distance)?;

    // Quasi-polynomial form admits summation over the whole pair domain.
    let qp = PwQpolynomial::from_pw_aff(per_pair);
    let jumps = sum_to_scalar("analyze_jumps", qp)?;
    algebra::ensure_nonneg("analyze_jumps", jumps)
}

/// String-level wrapper around [`analyze_latency`].
///
/// Parses the occupancy and fill relations as maps and the metric as a
/// piecewise-affine function, then delegates.
pub fn analyze_latency_str(
    ctx: &Arc<Context>,
    src_occupancy: &str,
    dst_fill: &str,
    dist: &str,
) -> Result<i64> {
    let src_occupancy = algebra::parse_map(ctx, src_occupancy)?;
    let dst_fill = algebra::parse_map(ctx, dst_fill)?;
    let dist = pw_aff_to_map(algebra::parse_pw_aff(ctx, dist)?);
    analyze_latency(&src_occupancy, &dst_fill, &dist)
}

/// String-level wrapper around [`analyze_jumps`].
pub fn analyze_jumps_str(
    ctx: &Arc<Context>,
    src_occupancy: &str,
    dst_fill: &str,
    dist: &str,
) -> Result<i64> {
    let src_occupancy = algebra::parse_map(ctx, src_occupancy)?;
    let dst_fill = algebra::parse_map(ctx, dst_fill)?;
    let dist = pw_aff_to_map(algebra::parse_pw_aff(ctx, dist)?);
    analyze_jumps(&src_occupancy, &dst_fill, &dist)
}
