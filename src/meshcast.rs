//! Identification and costing of mesh multicast networks.
//!
//! # Overview
//!
//! Where [`crate::latency`] reduces a fill problem to aggregate numbers,
//! this module keeps the structure: for every requested `(dst, data)` pair
//! it selects one nearest source holding the datum, and groups the
//! resulting minimal pairs by source. Destinations sharing a source form a
//! multicast network that hardware can serve with a single cast.
//!
//! # Selection
//!
//! The nearest source is chosen by lexicographic minimization over tuples
//! ordered distance first, source coordinates second. Ties in distance
//! therefore break deterministically by source coordinate order; callers
//! that want load-balanced tie-breaking must impose their own ordering
//! dimension ahead of the source coordinates.

use crate::algebra::{self, dump_map, single_pw_aff, sum_to_scalar, Result};
use crate::qpolynomial::PwQpolynomial;
use isl_rs::{Context, Map};
use std::sync::Arc;

/// The outcome of mesh-cast identification.
pub struct MeshCasts {
    /// `[dst -> data] -> src`: each requested pair with its selected
    /// nearest source.
    pub minimal_pairs: Map,
    /// `src -> [dst -> data]`: the multicast networks, one source mapped
    /// to every destination/datum pair it serves.
    pub networks: Map,
}

impl MeshCasts {
    /// Fan-out of each network: for every source, the number of
    /// destination/datum pairs it serves, as a quasi-polynomial over the
    /// source space.
    pub fn network_sizes(&self) -> PwQpolynomial {
        crate::qpolynomial::map_card(self.networks.copy())
    }

    /// Total number of requested pairs the networks serve.
    pub fn served_pairs(&self) -> Result<i64> {
        sum_to_scalar("served_pairs", self.network_sizes())
    }
}

/// Selects a nearest holding source for every requested pair and groups
/// the result into multicast networks.
///
/// # Arguments
/// * `src_occupancy` - `SpatialSrc -> Data`
/// * `dst_fill` - `SpatialDst -> Data`
/// * `dist` - `[SpatialDst -> SpatialSrc] -> [hops]`
///
/// Requested pairs whose datum no source holds are absent from the
/// result; they are this layer's unsatisfied traffic, not an error here.
///
/// # Errors
/// `SpaceMismatch` if the inputs disagree on their shared spaces;
/// `Unbounded` if the minimization has no solution on some pair;
/// `Domain` if the metric is negative on part of its domain.
pub fn identify_mesh_casts(
    src_occupancy: &Map,
    dst_fill: &Map,
    dist: &Map,
) -> Result<MeshCasts> {
    // A negative metric piece would corrupt the distance-first ranking.
    algebra::ensure_nonneg_values("identify_mesh_casts", dist)?;

    // Identity on the valid [dst -> data] pairs.
    let wrapped_fill = dst_fill.copy().wrap();
    let ident = algebra::identity_on(wrapped_fill.get_space());
    let ident = algebra::intersect_domain(ident, wrapped_fill)?;
    dump_map("wrapped_fill_identity", &ident);

    // [[dst -> data] -> dst] -> data
    let uncurried = ident.uncurry();
    dump_map("uncurried_fill_identity", &uncurried);

    // Compose with data -> src to reach the holding sources:
    // [[dst -> data] -> dst] -> src.
    let occupancy_inverted = src_occupancy.copy().reverse();
    let reaching = algebra::apply_range(uncurried, occupancy_inverted)?;
    dump_map("reaching", &reaching);

    // [dst -> data] -> [dst -> src]: each requested pair related to the
    // destination/source pairs that can serve it.
    let candidates = reaching.curry();
    dump_map("candidates", &candidates);

    // Key every candidate to itself and charge the metric:
    // [[dst -> data] -> [dst -> src]] -> hops.
    let keyed = candidates.range_map();
    let charged = algebra::apply_range(keyed, dist.copy())?;
    dump_map("charged", &charged);

    // Rearrange to [dst -> data] -> [hops -> [dst -> src]] so that the
    // lexicographic minimum ranks by distance before source coordinates.
    let ranked = charged.curry().range_reverse();
    dump_map("ranked", &ranked);

    let minimal = algebra::lexmin(ranked)?;
    dump_map("minimal", &minimal);

    // Drop the hop count, then the duplicated destination, leaving
    // [dst -> data] -> src.
    let minimal_pairs = minimal.range_factor_range().range_factor_range();
    dump_map("minimal_pairs", &minimal_pairs);

    // Group by shared source.
    let networks = minimal_pairs.copy().reverse();
    dump_map("multicast_networks", &networks);

    Ok(MeshCasts {
        minimal_pairs,
        networks,
    })
}

/// String-level wrapper around [`identify_mesh_casts`].
pub fn identify_mesh_casts_str(
    ctx: &Arc<Context>,
    src_occupancy: &str,
    dst_fill: &str,
    dist: &str,
) -> Result<MeshCasts> {
    let src_occupancy = algebra::parse_map(ctx, src_occupancy)?;
    let dst_fill = algebra::parse_map(ctx, dst_fill)?;
    let dist = algebra::parse_map(ctx, dist)?;
    identify_mesh_casts(&src_occupancy, &dst_fill, &dist)
}

/// Total traffic of a set of multicast networks, pair-sum baseline.
///
/// Every minimal `(dst, src)` pair is charged its metric distance once per
/// datum it carries, and the charges are summed. This upper-bounds the
/// traffic of any tree-shaped realization of the casts; charging a shared
/// tree instead is future work.
///
/// # Arguments
/// * `networks` - `src -> [dst -> data]` as produced by
///   [`identify_mesh_casts`]
/// * `dist` - the same metric the networks were identified with
///
/// # Errors
/// `SpaceMismatch` if `networks` and `dist` disagree on the spatial
/// spaces; `NotSingleton` if the distance is not scalar; `Domain` if the
/// metric is negative on part of its domain.
pub fn cost_mesh_cast(networks: &Map, dist: &Map) -> Result<i64> {
    algebra::ensure_nonneg_values("cost_mesh_cast", dist)?;

    // src -> [dst -> data], back to pair-per-key form.
    let pairs = networks.copy().reverse();
    dump_map("cost_pairs", &pairs);

    // [dst -> src] -> data: the spatial pair in metric orientation, keyed
    // to the datum it carries.
    let oriented = pairs.curry().range_reverse().uncurry();
    dump_map("cost_oriented", &oriented);

    // [[dst -> src] -> data] -> hops: every carried datum charged the
    // pair's distance.
    let keyed = oriented.domain_map();
    let charged = algebra::apply_range(keyed, dist.copy())?;
    dump_map("cost_charged", &charged);

    // The distance is single-valued per tuple; collapse and sum.
    let scalar = charged.min_multi_pw_aff();
    let per_tuple = single_pw_aff("cost_mesh_cast", &scalar)?;
    let total = sum_to_scalar("cost_mesh_cast", PwQpolynomial::from_pw_aff(per_tuple))?;
    algebra::ensure_nonneg("cost_mesh_cast", total)
}

/// String-level wrapper around [`cost_mesh_cast`].
pub fn cost_mesh_cast_str(ctx: &Arc<Context>, networks: &str, dist: &str) -> Result<i64> {
    let networks = algebra::parse_map(ctx, networks)?;
    let dist = algebra::parse_map(ctx, dist)?;
    cost_mesh_cast(&networks, &dist)
}
