//! Direct FFI bindings to ISL's piecewise quasi-polynomial API.
//!
//! # Purpose
//!
//! The counting half of the cost engine (Barvinok-style cardinality,
//! quasi-polynomial arithmetic, evaluation at a point) lives in ISL's
//! `polynomial.h`, which the `isl-rs` bindings do not cover. This module
//! binds the handful of entry points the engine needs and wraps them in
//! the same ownership discipline `isl-rs` uses everywhere else.
//!
//! # Memory Management
//!
//! ISL functions follow one of three ownership patterns:
//!
//! ```ignore
//! // 1. __isl_take: the callee takes ownership (caller loses access)
//! sum = isl_pw_qpolynomial_sum(pwqp);
//!
//! // 2. __isl_give: the callee returns a new object (caller owns)
//! space = isl_pw_qpolynomial_get_domain_space(pwqp);
//!
//! // 3. __isl_keep: the callee borrows (no ownership change)
//! n = isl_pw_qpolynomial_n_piece(pwqp);
//! ```
//!
//! The wrapper types mirror this with the `should_free_on_drop` flag:
//! consuming methods take `self`, clear the flag, and hand the raw pointer
//! to ISL; borrowing methods take `&self`. Objects received from ISL are
//! constructed with the flag set and freed on drop.
//!
//! Interop with `isl-rs` objects goes through their public `ptr` /
//! `should_free_on_drop` fields, which is the channel `isl-rs` itself uses
//! between its modules.

use isl_rs::{Context, Map, PwAff, Set, Space, Val};
use libc::uintptr_t;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

// enum isl_fold from isl/polynomial.h
const ISL_FOLD_MIN: c_int = 0;
const ISL_FOLD_MAX: c_int = 1;

extern "C" {
    fn isl_pw_qpolynomial_read_from_str(ctx: uintptr_t, s: *const c_char) -> uintptr_t;
    fn isl_pw_qpolynomial_free(pwqp: uintptr_t) -> uintptr_t;
    fn isl_pw_qpolynomial_copy(pwqp: uintptr_t) -> uintptr_t;

    fn isl_pw_qpolynomial_from_pw_aff(pwaff: uintptr_t) -> uintptr_t;
    fn isl_pw_qpolynomial_intersect_domain(pwqp: uintptr_t, set: uintptr_t) -> uintptr_t;
    fn isl_pw_qpolynomial_mul(pwqp1: uintptr_t, pwqp2: uintptr_t) -> uintptr_t;
    fn isl_pw_qpolynomial_sum(pwqp: uintptr_t) -> uintptr_t;
    fn isl_pw_qpolynomial_eval(pwqp: uintptr_t, pnt: uintptr_t) -> uintptr_t;
    fn isl_pw_qpolynomial_get_domain_space(pwqp: uintptr_t) -> uintptr_t;
    fn isl_pw_qpolynomial_n_piece(pwqp: uintptr_t) -> c_int;
    fn isl_pw_qpolynomial_bound(pwqp: uintptr_t, fold: c_int, tight: *mut c_int) -> uintptr_t;

    fn isl_pw_qpolynomial_fold_free(pwf: uintptr_t) -> uintptr_t;
    fn isl_pw_qpolynomial_fold_copy(pwf: uintptr_t) -> uintptr_t;
    fn isl_pw_qpolynomial_fold_eval(pwf: uintptr_t, pnt: uintptr_t) -> uintptr_t;
    fn isl_pw_qpolynomial_fold_get_domain_space(pwf: uintptr_t) -> uintptr_t;

    // Barvinok-style counting entry points.
    fn isl_set_card(set: uintptr_t) -> uintptr_t;
    fn isl_map_card(map: uintptr_t) -> uintptr_t;
    fn isl_map_apply_pw_qpolynomial(map: uintptr_t, pwqp: uintptr_t) -> uintptr_t;

    fn isl_point_zero(space: uintptr_t) -> uintptr_t;

    // String output goes through an isl_printer, same as the schedule
    // serialization path.
    fn isl_printer_to_str(ctx: uintptr_t) -> uintptr_t;
    fn isl_printer_free(printer: uintptr_t) -> uintptr_t;
    fn isl_printer_get_str(printer: uintptr_t) -> *const c_char;
    fn isl_printer_print_pw_qpolynomial(printer: uintptr_t, pwqp: uintptr_t) -> uintptr_t;
    fn isl_pw_qpolynomial_get_ctx(pwqp: uintptr_t) -> uintptr_t;
}

/// Takes ownership of an `isl-rs` map and returns its raw pointer.
///
/// The map's destructor is disarmed first, so the pointer may be handed
/// to an `__isl_take` parameter.
pub(crate) fn take_map(map: Map) -> uintptr_t {
    let mut map = map;
    map.should_free_on_drop = false;
    map.ptr
}

pub(crate) fn take_set(set: Set) -> uintptr_t {
    let mut set = set;
    set.should_free_on_drop = false;
    set.ptr
}

pub(crate) fn take_pw_aff(pwaff: PwAff) -> uintptr_t {
    let mut pwaff = pwaff;
    pwaff.should_free_on_drop = false;
    pwaff.ptr
}

fn val_from_ptr(ptr: uintptr_t) -> Option<Val> {
    if ptr == 0 {
        return None;
    }
    Some(Val {
        ptr,
        should_free_on_drop: true,
    })
}

fn space_from_ptr(ptr: uintptr_t) -> Space {
    Space {
        ptr,
        should_free_on_drop: true,
    }
}

/// Wraps `isl_pw_qpolynomial`.
///
/// A piecewise quasi-polynomial: a partial integer function whose value on
/// each piece of its domain is a quasi-polynomial. Produced by counting
/// (`map_card`) and by conversion from piecewise-affine functions; consumed
/// by summation and evaluation.
pub struct PwQpolynomial {
    pub ptr: uintptr_t,
    pub should_free_on_drop: bool,
}

impl PwQpolynomial {
    pub(crate) fn from_ptr(ptr: uintptr_t) -> Self {
        PwQpolynomial {
            ptr,
            should_free_on_drop: true,
        }
    }

    fn take(self) -> uintptr_t {
        let mut pwqp = self;
        pwqp.should_free_on_drop = false;
        pwqp.ptr
    }

    /// Parses a piecewise quasi-polynomial from its ISL string form.
    ///
    /// Returns `None` if ISL rejects the input. Unlike the `isl-rs` parse
    /// entry points this does not panic on malformed strings; the null
    /// result is checked here.
    pub fn read_from_str(ctx: &Context, s: &str) -> Option<PwQpolynomial> {
        let cstr = CString::new(s).ok()?;
        let ptr = unsafe { isl_pw_qpolynomial_read_from_str(ctx.ptr, cstr.as_ptr()) };
        if ptr == 0 {
            return None;
        }
        Some(PwQpolynomial::from_ptr(ptr))
    }

    /// Wraps `isl_pw_qpolynomial_from_pw_aff`. Consumes the input.
    pub fn from_pw_aff(pwaff: PwAff) -> PwQpolynomial {
        let ptr = unsafe { isl_pw_qpolynomial_from_pw_aff(take_pw_aff(pwaff)) };
        PwQpolynomial::from_ptr(ptr)
    }

    /// Wraps `isl_pw_qpolynomial_intersect_domain`.
    ///
    /// Restricts the quasi-polynomial to `set`. Consumes both.
    pub fn intersect_domain(self, set: Set) -> PwQpolynomial {
        let ptr = unsafe { isl_pw_qpolynomial_intersect_domain(self.take(), take_set(set)) };
        PwQpolynomial::from_ptr(ptr)
    }

    /// Wraps `isl_pw_qpolynomial_mul`. Consumes both operands.
    pub fn mul(self, other: PwQpolynomial) -> PwQpolynomial {
        let ptr = unsafe { isl_pw_qpolynomial_mul(self.take(), other.take()) };
        PwQpolynomial::from_ptr(ptr)
    }

    /// Wraps `isl_pw_qpolynomial_sum`.
    ///
    /// Sums the quasi-polynomial over the innermost group of domain
    /// dimensions (the range of a wrapped domain, or all set dimensions of
    /// a flat domain). Consumes the input.
    pub fn sum(self) -> PwQpolynomial {
        let ptr = unsafe { isl_pw_qpolynomial_sum(self.take()) };
        PwQpolynomial::from_ptr(ptr)
    }

    /// Evaluates at the origin of the domain space.
    ///
    /// The point of all zeros is the conventional probe for a
    /// quasi-polynomial whose domain has been fully summed away. Returns
    /// `None` if ISL reports an error.
    pub fn eval_zero(self) -> Option<Val> {
        let space = unsafe { isl_pw_qpolynomial_get_domain_space(self.ptr) };
        let point = unsafe { isl_point_zero(space) };
        let val = unsafe { isl_pw_qpolynomial_eval(self.take(), point) };
        val_from_ptr(val)
    }

    /// The space of the domain, as an `isl-rs` object.
    pub fn domain_space(&self) -> Space {
        let ptr = unsafe { isl_pw_qpolynomial_get_domain_space(self.ptr) };
        space_from_ptr(ptr)
    }

    /// Number of pieces in the piecewise representation.
    pub fn n_piece(&self) -> i32 {
        unsafe { isl_pw_qpolynomial_n_piece(self.ptr) }
    }

    /// Wraps `isl_pw_qpolynomial_bound` with `isl_fold_max`.
    ///
    /// Produces an upper bound fold over all values of the domain
    /// dimensions. Consumes the input.
    pub fn bound_max(self) -> PwQpolynomialFold {
        let ptr =
            unsafe { isl_pw_qpolynomial_bound(self.take(), ISL_FOLD_MAX, std::ptr::null_mut()) };
        PwQpolynomialFold::from_ptr(ptr)
    }

    /// Wraps `isl_pw_qpolynomial_bound` with `isl_fold_min`.
    pub fn bound_min(self) -> PwQpolynomialFold {
        let ptr =
            unsafe { isl_pw_qpolynomial_bound(self.take(), ISL_FOLD_MIN, std::ptr::null_mut()) };
        PwQpolynomialFold::from_ptr(ptr)
    }

    /// Prints the ISL string form through an `isl_printer`.
    pub fn to_str(&self) -> String {
        unsafe {
            let ctx = isl_pw_qpolynomial_get_ctx(self.ptr);
            let printer = isl_printer_to_str(ctx);
            let printer = isl_printer_print_pw_qpolynomial(printer, self.ptr);
            let cstr = isl_printer_get_str(printer);
            let out = if cstr.is_null() {
                String::new()
            } else {
                CStr::from_ptr(cstr).to_string_lossy().into_owned()
            };
            isl_printer_free(printer);
            out
        }
    }
}

impl Drop for PwQpolynomial {
    fn drop(&mut self) {
        if self.should_free_on_drop {
            unsafe {
                isl_pw_qpolynomial_free(self.ptr);
            }
        }
    }
}

impl Clone for PwQpolynomial {
    fn clone(&self) -> Self {
        let ptr = unsafe { isl_pw_qpolynomial_copy(self.ptr) };
        PwQpolynomial::from_ptr(ptr)
    }
}

/// Wraps `isl_pw_qpolynomial_fold`: a quasi-polynomial together with the
/// extremum used to combine overlapping pieces.
pub struct PwQpolynomialFold {
    pub ptr: uintptr_t,
    pub should_free_on_drop: bool,
}

impl PwQpolynomialFold {
    pub(crate) fn from_ptr(ptr: uintptr_t) -> Self {
        PwQpolynomialFold {
            ptr,
            should_free_on_drop: true,
        }
    }

    fn take(self) -> uintptr_t {
        let mut pwf = self;
        pwf.should_free_on_drop = false;
        pwf.ptr
    }

    /// Evaluates the fold at the origin of its domain space.
    pub fn eval_zero(self) -> Option<Val> {
        let space = unsafe { isl_pw_qpolynomial_fold_get_domain_space(self.ptr) };
        let point = unsafe { isl_point_zero(space) };
        let val = unsafe { isl_pw_qpolynomial_fold_eval(self.take(), point) };
        val_from_ptr(val)
    }
}

impl Drop for PwQpolynomialFold {
    fn drop(&mut self) {
        if self.should_free_on_drop {
            unsafe {
                isl_pw_qpolynomial_fold_free(self.ptr);
            }
        }
    }
}

impl Clone for PwQpolynomialFold {
    fn clone(&self) -> Self {
        let ptr = unsafe { isl_pw_qpolynomial_fold_copy(self.ptr) };
        PwQpolynomialFold::from_ptr(ptr)
    }
}

/// Wraps `isl_map_card`.
///
/// For each point in the domain of `map`, the number of points in its
/// image. Consumes the map.
pub fn map_card(map: Map) -> PwQpolynomial {
    let ptr = unsafe { isl_map_card(take_map(map)) };
    PwQpolynomial::from_ptr(ptr)
}

/// Wraps `isl_set_card`: the number of points of `set` as a
/// quasi-polynomial over its parameters. Consumes the set.
pub fn set_card(set: Set) -> PwQpolynomial {
    let ptr = unsafe { isl_set_card(take_set(set)) };
    PwQpolynomial::from_ptr(ptr)
}

/// Wraps `isl_map_apply_pw_qpolynomial`.
///
/// Charges `cost` at every image point of `map` and sums per domain
/// point, producing a quasi-polynomial over the domain of `map`. The cost
/// must be defined over the range space of the map. Consumes both.
pub fn map_apply_pw_qpolynomial(map: Map, cost: PwQpolynomial) -> PwQpolynomial {
    let ptr = unsafe { isl_map_apply_pw_qpolynomial(take_map(map), cost.take()) };
    PwQpolynomial::from_ptr(ptr)
}
