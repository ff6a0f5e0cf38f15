//! Symbolic synthesis of spatial distance metrics.
//!
//! A distance metric is a piecewise-affine function over the wrapped pair
//! space `[dst -> src]`: given a destination coordinate tuple and a source
//! coordinate tuple, it yields the hop count between them. The analyses
//! compose metrics with candidate-pair relations, so a metric must be an
//! ordinary algebra object rather than opaque code.
//!
//! ISL has no absolute-value primitive, so the Manhattan metric is built
//! per dimension as `max(delta, -delta)` and the ring metric as the
//! minimum of the two modular walk directions. Both constructions stay
//! symbolic: the piecewise case split is carried by the affine algebra,
//! not by string templating.

use crate::algebra::{AlgebraError, Result};
use isl_rs::{Aff, Context, DimType, LocalSpace, Map, PwAff, Space, Val};
use std::sync::Arc;

/// Builds the n-dimensional Manhattan distance metric.
///
/// The result is defined over the wrapped pair space `[dst -> src]` where
/// the destination tuple carries `dst_names` and the source tuple carries
/// `src_names`, and maps each pair to `sum_i |src_i - dst_i|`.
///
/// # Arguments
/// * `ctx` - ISL context the metric is built in
/// * `dst_names` - destination dimension names, e.g. `["xd", "yd"]`
/// * `src_names` - source dimension names, e.g. `["xs", "ys"]`
///
/// # Errors
/// `Domain` if the name lists are empty or of different lengths.
pub fn manhattan_nd(ctx: &Arc<Context>, dst_names: &[&str], src_names: &[&str]) -> Result<PwAff> {
    manhattan_over(pair_space(ctx, dst_names, src_names, None, "manhattan_nd")?)
}

/// [`manhattan_nd`] over named spatial tuples.
///
/// Occupancy and fill relations written with tuple identifiers (say
/// `dst[xd, yd] -> data[a, b]`) only compose with a metric whose pair
/// space carries the same identifiers; this variant names the two tuples.
pub fn manhattan_nd_named(
    ctx: &Arc<Context>,
    dst: (&str, &[&str]),
    src: (&str, &[&str]),
) -> Result<PwAff> {
    let (dst_tuple, dst_names) = dst;
    let (src_tuple, src_names) = src;
    manhattan_over(pair_space(
        ctx,
        dst_names,
        src_names,
        Some((dst_tuple, src_tuple)),
        "manhattan_nd",
    )?)
}

/// Builds the pair space `[dst -> src]` with named dimensions and
/// optionally named tuples, destination on the in side.
fn pair_space(
    ctx: &Arc<Context>,
    dst_names: &[&str],
    src_names: &[&str],
    tuples: Option<(&str, &str)>,
    op: &'static str,
) -> Result<Space> {
    if dst_names.is_empty() || dst_names.len() != src_names.len() {
        return Err(AlgebraError::Domain {
            op,
            reason: format!(
                "need matching non-empty dimension name lists, got {} dst and {} src",
                dst_names.len(),
                src_names.len()
            ),
        });
    }
    let k = dst_names.len();

    let mut space = Space::alloc(ctx, 0, k as u32, k as u32);
    for (i, name) in dst_names.iter().enumerate() {
        space = space.set_dim_name(DimType::In, i as u32, name);
    }
    for (i, name) in src_names.iter().enumerate() {
        space = space.set_dim_name(DimType::Out, i as u32, name);
    }
    if let Some((dst_tuple, src_tuple)) = tuples {
        space = space.set_tuple_name(DimType::In, dst_tuple);
        space = space.set_tuple_name(DimType::Out, src_tuple);
    }
    Ok(space)
}

fn manhattan_over(space: Space) -> Result<PwAff> {
    let k = space.dim(DimType::In) as usize;

    // Wrapping flattens the pair into one set tuple: dimensions 0..k are
    // the destination, k..2k the source.
    let wrapped = space.wrap();
    let ls = LocalSpace::from_space(wrapped);

    let mut total: Option<PwAff> = None;
    for i in 0..k {
        let dst = Aff::var_on_domain(ls.copy(), DimType::Set, i as u32);
        let src = Aff::var_on_domain(ls.copy(), DimType::Set, (k + i) as u32);
        let delta = src.sub(dst);
        let neg = delta.copy().neg();
        let abs = PwAff::from_aff(delta).max(PwAff::from_aff(neg));
        total = Some(match total {
            Some(acc) => acc.add(abs),
            None => abs,
        });
    }

    Ok(total.expect("at least one dimension"))
}

/// Builds the distance metric of a ring (1-D torus) of circumference `n`.
///
/// Defined over the pair space `[dst -> src]` of arity one; the value is
/// `min((src - dst) mod n, (dst - src) mod n)`, the shorter of the two
/// walk directions. A ring of circumference one has distance zero
/// everywhere.
///
/// # Errors
/// `Domain` if `n` is not positive.
pub fn ring_metric(ctx: &Arc<Context>, n: i64) -> Result<PwAff> {
    ring_over(ctx, n, None)
}

/// [`ring_metric`] over named spatial tuples, see [`manhattan_nd_named`].
pub fn ring_metric_named(
    ctx: &Arc<Context>,
    n: i64,
    dst_tuple: &str,
    src_tuple: &str,
) -> Result<PwAff> {
    ring_over(ctx, n, Some((dst_tuple, src_tuple)))
}

fn ring_over(ctx: &Arc<Context>, n: i64, tuples: Option<(&str, &str)>) -> Result<PwAff> {
    if n <= 0 {
        return Err(AlgebraError::Domain {
            op: "ring_metric",
            reason: format!("ring circumference must be positive, got {}", n),
        });
    }

    let space = pair_space(ctx, &["xd"], &["xs"], tuples, "ring_metric")?;
    let ls = LocalSpace::from_space(space.wrap());

    let dst = Aff::var_on_domain(ls.copy(), DimType::Set, 0);
    let src = Aff::var_on_domain(ls, DimType::Set, 1);
    let delta = src.sub(dst);
    let neg = delta.copy().neg();

    let forward = PwAff::from_aff(delta).mod_val(Val::int_from_si(ctx, n));
    let backward = PwAff::from_aff(neg).mod_val(Val::int_from_si(ctx, n));
    Ok(forward.min(backward))
}

/// Converts a metric to its relation form `[dst -> src] -> [hops]`.
///
/// The analyzers compose distances with `apply_range`, which wants a map
/// rather than a function object.
pub fn pw_aff_to_map(metric: PwAff) -> Map {
    Map::from_pw_aff(metric)
}
