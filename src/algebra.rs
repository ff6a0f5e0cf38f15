//! Typed façade over the ISL relation algebra.
//!
//! # Overview
//!
//! Every analysis in this crate is phrased as a chain of operations on
//! integer sets, integer relations (maps), piecewise-affine functions and
//! piecewise quasi-polynomials. The underlying library is ISL via the
//! `isl-rs` bindings, with the quasi-polynomial layer bound directly in
//! [`crate::qpolynomial`]. This module is the single place where raw
//! library behavior is turned into checked, `Result`-returning Rust:
//!
//! 1. **Parsing**: `isl-rs` panics (via null-pointer checks) when a string
//!    does not denote a valid relation. Every parse entry point here wraps
//!    the call in `catch_unwind` and converts failure to
//!    [`AlgebraError::Parse`].
//! 2. **Space discipline**: binary operations check operand spaces before
//!    delegating, so a mismatch surfaces as
//!    [`AlgebraError::SpaceMismatch`] naming both spaces instead of an
//!    opaque library error deep in a pipeline.
//! 3. **Extraction**: terminal values are checked for NaN and the
//!    infinities before integer conversion, so an extremum over an empty
//!    or unbounded set surfaces as [`AlgebraError::Unbounded`].
//!
//! # Ownership
//!
//! The façade keeps ISL's transfer-of-ownership convention: operations
//! that ISL documents as `__isl_take` consume their Rust arguments by
//! value, and callers that need an object afterwards pass a `copy()`
//! (a reference-count bump). All functions here release everything they
//! own on every exit path, including failure, because consumed arguments
//! are dropped by the callee.

use crate::qpolynomial::PwQpolynomial;
use isl_rs::{
    BasicSet, Constraint, Context, DimType, LocalSpace, Map, MultiPwAff, MultiVal, PwAff, Set,
    Space, Val,
};
use log::debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the relation algebra and the analyses built on it.
///
/// Every variant names the operation that failed and describes the space
/// or value in question. Errors abort the in-flight query; there is no
/// local recovery.
#[derive(Error, Debug)]
pub enum AlgebraError {
    /// A string input did not denote a valid set, relation, affine
    /// function or quasi-polynomial.
    #[error("{op}: failed to parse {kind} from {input:?}")]
    Parse {
        op: &'static str,
        kind: &'static str,
        input: String,
    },

    /// Two operands disagree on named dimensions, tuple identifiers or
    /// arity.
    #[error("{op}: incompatible spaces {lhs} and {rhs}")]
    SpaceMismatch {
        op: &'static str,
        lhs: String,
        rhs: String,
    },

    /// An extremum or count was requested on a non-finite set.
    #[error("{op}: unbounded result ({detail})")]
    Unbounded { op: &'static str, detail: String },

    /// A piecewise object required to be a single piece was not.
    #[error("{op}: expected a single piece, found {pieces}")]
    NotSingleton { op: &'static str, pieces: i32 },

    /// A precondition on dimension counts, sign or non-emptiness failed.
    #[error("{op}: {reason}")]
    Domain { op: &'static str, reason: String },

    /// The underlying library reported a failure not covered above.
    #[error("{op}: internal algebra error ({reason})")]
    Internal { op: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, AlgebraError>;

/// Logs an intermediate relation under `debug`.
///
/// Mirrors the derivation traces the analyses print: enable debug logging
/// to see every intermediate object of a query by name.
pub(crate) fn dump_map(label: &str, map: &Map) {
    debug!("{}: {}", label, map.to_str());
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses an integer relation (map) from ISL set-builder notation.
///
/// # Errors
/// `Parse` if ISL rejects the input. The underlying parser aborts with a
/// panic on malformed strings, which is caught and converted here.
pub fn parse_map(ctx: &Arc<Context>, input: &str) -> Result<Map> {
    if input.trim().is_empty() {
        return Err(AlgebraError::Parse {
            op: "parse_map",
            kind: "map",
            input: input.to_string(),
        });
    }
    catch_unwind(AssertUnwindSafe(|| Map::read_from_str(ctx, input))).map_err(|_| {
        AlgebraError::Parse {
            op: "parse_map",
            kind: "map",
            input: input.to_string(),
        }
    })
}

/// Parses an integer set from ISL set-builder notation.
pub fn parse_set(ctx: &Arc<Context>, input: &str) -> Result<Set> {
    if input.trim().is_empty() {
        return Err(AlgebraError::Parse {
            op: "parse_set",
            kind: "set",
            input: input.to_string(),
        });
    }
    catch_unwind(AssertUnwindSafe(|| Set::read_from_str(ctx, input))).map_err(|_| {
        AlgebraError::Parse {
            op: "parse_set",
            kind: "set",
            input: input.to_string(),
        }
    })
}

/// Parses a piecewise-affine function.
pub fn parse_pw_aff(ctx: &Arc<Context>, input: &str) -> Result<PwAff> {
    if input.trim().is_empty() {
        return Err(AlgebraError::Parse {
            op: "parse_pw_aff",
            kind: "piecewise-affine function",
            input: input.to_string(),
        });
    }
    catch_unwind(AssertUnwindSafe(|| PwAff::read_from_str(ctx, input))).map_err(|_| {
        AlgebraError::Parse {
            op: "parse_pw_aff",
            kind: "piecewise-affine function",
            input: input.to_string(),
        }
    })
}

/// Parses a piecewise quasi-polynomial.
pub fn parse_pw_qpolynomial(ctx: &Arc<Context>, input: &str) -> Result<PwQpolynomial> {
    PwQpolynomial::read_from_str(ctx, input).ok_or_else(|| AlgebraError::Parse {
        op: "parse_pw_qpolynomial",
        kind: "piecewise quasi-polynomial",
        input: input.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Space-checked relation algebra
// ---------------------------------------------------------------------------

fn space_mismatch(op: &'static str, lhs: &Space, rhs: &Space) -> AlgebraError {
    AlgebraError::SpaceMismatch {
        op,
        lhs: lhs.to_str(),
        rhs: rhs.to_str(),
    }
}

/// Relational composition `lhs; rhs` for `lhs: A -> B`, `rhs: B -> C`.
///
/// Checks that the range space of `lhs` equals the domain space of `rhs`
/// before delegating to `isl_map_apply_range`. Consumes both operands.
pub fn apply_range(lhs: Map, rhs: Map) -> Result<Map> {
    let lhs_range = lhs.get_space().range();
    let rhs_domain = rhs.get_space().domain();
    if !lhs_range.is_equal(&rhs_domain) {
        return Err(space_mismatch("apply_range", &lhs_range, &rhs_domain));
    }
    Ok(lhs.apply_range(rhs))
}

/// Factored join `A -> (B, C)` of `lhs: A -> B` and `rhs: A -> C`.
///
/// Requires the two domain spaces to be equal. Consumes both operands.
pub fn range_product(lhs: Map, rhs: Map) -> Result<Map> {
    let lhs_domain = lhs.get_space().domain();
    let rhs_domain = rhs.get_space().domain();
    if !lhs_domain.is_equal(&rhs_domain) {
        return Err(space_mismatch("range_product", &lhs_domain, &rhs_domain));
    }
    Ok(lhs.range_product(rhs))
}

/// Restricts the domain of `map` to `set`, checking the spaces agree.
pub fn intersect_domain(map: Map, set: Set) -> Result<Map> {
    let map_domain = map.get_space().domain();
    let set_space = set.get_space();
    if !map_domain.is_equal(&set_space) {
        return Err(space_mismatch("intersect_domain", &map_domain, &set_space));
    }
    Ok(map.intersect_domain(set))
}

/// Restricts the range of `map` to `set`, checking the spaces agree.
pub fn intersect_range(map: Map, set: Set) -> Result<Map> {
    let map_range = map.get_space().range();
    let set_space = set.get_space();
    if !map_range.is_equal(&set_space) {
        return Err(space_mismatch("intersect_range", &map_range, &set_space));
    }
    Ok(map.intersect_range(set))
}

/// The identity relation on the points of a set space.
pub fn identity_on(set_space: Space) -> Map {
    Map::identity(set_space.map_from_set())
}

/// Lexicographic minimum of `map`: for each domain point, the
/// lexicographically smallest range tuple.
///
/// # Errors
/// `Unbounded` if the minimum does not exist, which ISL reports as a
/// library error (caught here as a panic from the bindings).
pub fn lexmin(map: Map) -> Result<Map> {
    let space = map.get_space().to_str();
    catch_unwind(AssertUnwindSafe(move || map.lexmin())).map_err(|_| AlgebraError::Unbounded {
        op: "lexmin",
        detail: space,
    })
}

// ---------------------------------------------------------------------------
// Terminal extraction
// ---------------------------------------------------------------------------

/// Converts a terminal [`Val`] to `i64`.
///
/// # Errors
/// `Unbounded` for NaN and the infinities (the values ISL uses to report
/// extrema over empty or unbounded domains); `Internal` for any
/// non-integer rational.
pub fn val_to_i64(op: &'static str, val: Val) -> Result<i64> {
    if val.is_nan() || val.is_infty() || val.is_neginfty() {
        return Err(AlgebraError::Unbounded {
            op,
            detail: val.to_str(),
        });
    }
    if !val.is_int() {
        return Err(AlgebraError::Internal {
            op,
            reason: format!("expected an integer value, got {}", val.to_str()),
        });
    }
    Ok(val.get_num_si())
}

/// Checks a cost scalar is non-negative.
///
/// Backstop on the final aggregate; the domain-wide validation of the
/// piecewise inputs happens in [`ensure_nonneg_values`] and
/// [`ensure_nonneg_qp`] before any summation or extremum can cancel a
/// negative piece away.
pub fn ensure_nonneg(op: &'static str, cost: i64) -> Result<i64> {
    if cost < 0 {
        return Err(AlgebraError::Domain {
            op,
            reason: format!("negative cost {} from piecewise input", cost),
        });
    }
    Ok(cost)
}

/// Fails with `Domain` when a scalar-valued relation takes a negative
/// value anywhere on its domain.
///
/// Aggregate checks alone would let a negative piece hide behind a
/// positive one, so distance inputs are screened over their whole domain
/// before composition.
pub fn ensure_nonneg_values(op: &'static str, map: &Map) -> Result<()> {
    let values = map.copy().range();
    let value_space = values.get_space();
    if value_space.dim(DimType::Set) != 1 {
        return Err(AlgebraError::Domain {
            op,
            reason: format!(
                "expected a scalar value tuple, got {}",
                value_space.to_str()
            ),
        });
    }

    // v <= -1, written as -v - 1 >= 0.
    let negative = Constraint::alloc_inequality(LocalSpace::from_space(value_space))
        .set_coefficient_si(DimType::Set, 0, -1)
        .set_constant_si(-1);
    let negative = Set::from_basic_set(BasicSet::from_constraint(negative));
    if !values.intersect(negative).is_empty() {
        return Err(AlgebraError::Domain {
            op,
            reason: "input takes a negative value on part of its domain".to_string(),
        });
    }
    Ok(())
}

/// Fails with `Domain` when a quasi-polynomial is negative anywhere on
/// its domain.
///
/// Checked with a lower-bound fold over the whole domain; callers
/// restrict the quasi-polynomial to the points actually charged before
/// calling, so an unconstrained guard is not rejected for geometry
/// points that never occur. An empty quasi-polynomial passes.
pub fn ensure_nonneg_qp(op: &'static str, qp: PwQpolynomial) -> Result<()> {
    let val = qp.bound_min().eval_zero().ok_or(AlgebraError::Internal {
        op,
        reason: "lower-bound evaluation failed".to_string(),
    })?;
    if val.is_nan() {
        return Err(AlgebraError::Internal {
            op,
            reason: "lower bound is not a number".to_string(),
        });
    }
    if !val.is_nonneg() {
        return Err(AlgebraError::Domain {
            op,
            reason: "cost input is negative on part of its domain".to_string(),
        });
    }
    Ok(())
}

/// Sums a quasi-polynomial down to a scalar.
///
/// Applies `isl_pw_qpolynomial_sum` until no set dimensions remain in the
/// domain (a wrapped domain sums one nesting level per application), then
/// evaluates at the origin of the residual space. An empty
/// quasi-polynomial evaluates to zero.
pub fn sum_to_scalar(op: &'static str, mut qp: PwQpolynomial) -> Result<i64> {
    // Each application strips at least one nesting level; relation domains
    // in this crate nest at most twice.
    for _ in 0..4 {
        if qp.domain_space().dim(DimType::Set) == 0 {
            break;
        }
        qp = qp.sum();
    }
    if qp.domain_space().dim(DimType::Set) != 0 {
        return Err(AlgebraError::Internal {
            op,
            reason: "summation failed to collapse the domain".to_string(),
        });
    }
    let val = qp.eval_zero().ok_or(AlgebraError::Internal {
        op,
        reason: "evaluation at the origin failed".to_string(),
    })?;
    val_to_i64(op, val)
}

/// Maximum of a quasi-polynomial over all values of its domain.
///
/// Computed as an upper-bound fold evaluated at the origin of the
/// residual space; exact for the piecewise inputs this crate produces.
///
/// # Errors
/// `Unbounded` when no finite maximum exists (including an empty domain,
/// which ISL reports as negative infinity).
pub fn pw_qp_max(op: &'static str, qp: PwQpolynomial) -> Result<i64> {
    let val = qp.bound_max().eval_zero().ok_or(AlgebraError::Internal {
        op,
        reason: "bound evaluation failed".to_string(),
    })?;
    val_to_i64(op, val)
}

/// Minimum of a quasi-polynomial over all values of its domain.
pub fn pw_qp_min(op: &'static str, qp: PwQpolynomial) -> Result<i64> {
    let val = qp.bound_min().eval_zero().ok_or(AlgebraError::Internal {
        op,
        reason: "bound evaluation failed".to_string(),
    })?;
    val_to_i64(op, val)
}

/// Extracts the unique piecewise-affine component of a multi expression.
///
/// # Errors
/// `NotSingleton` when the expression has any number of components other
/// than one. Callers that can handle several components must branch before
/// calling this.
pub fn single_pw_aff(op: &'static str, mpa: &MultiPwAff) -> Result<PwAff> {
    let n = mpa.dim(DimType::Out);
    if n != 1 {
        return Err(AlgebraError::NotSingleton { op, pieces: n });
    }
    Ok(mpa.get_at(0))
}

/// Extracts the unique value of a multi-value expression.
pub fn single_val(op: &'static str, mv: &MultiVal) -> Result<Val> {
    let n = mv.dim(DimType::Set);
    if n != 1 {
        return Err(AlgebraError::NotSingleton { op, pieces: n });
    }
    Ok(mv.get_at(0))
}
