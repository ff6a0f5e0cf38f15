//! PolyCast: polyhedral analysis of communication cost on spatial arrays
//!
//! This library models the cost of distributing data across a spatial
//! array of producers and consumers (meshes, tori, systolic arrays). A
//! problem is three relations: a *source occupancy* (which producer holds
//! which data), a *destination fill* (which consumer requests which data)
//! and a *distance metric* over the spatial coordinates. The analyses
//! reduce a problem to aggregate integers or to multicast structure
//! without ever enumerating points; all the heavy lifting is done inside
//! ISL (parametric ILP for extrema, Barvinok-style counting for sums).
//!
//! # Core Analysis Flow
//! ```text
//! occupancy + fill + metric
//!       |                \
//!       v                 v
//!  analyze_latency   identify_mesh_casts --> cost_mesh_cast
//!  analyze_jumps          |
//!       |                 v
//!       v            multicast networks (src -> destinations)
//!  scalar hops
//!
//! binding + layer chain --> evaluate_chain --> per-layer cost + residual
//! ```
//!
//! # Module Organization
//!
//! ## Relation Algebra
//! - [`algebra`]: checked, `Result`-returning façade over ISL
//! - [`qpolynomial`]: direct bindings to ISL's quasi-polynomial layer
//!
//! ## Problem Construction
//! - [`metrics`]: symbolic distance metrics (Manhattan, ring)
//! - [`tile`]: tiling restrictions over occupancy relations
//!
//! ## Analyses
//! - [`latency`]: worst-case latency and total hop count
//! - [`meshcast`]: multicast network identification and costing
//! - [`folding`]: layered folding engine (trunk/branch/twig)
//!
//! # Contexts and Ownership
//!
//! Every object belongs to one ISL [`Context`](isl_rs::Context), created
//! at the start of an analysis session and shared as `Arc<Context>`.
//! Objects never cross contexts, and the context is not thread-safe;
//! concurrent analyses use separate contexts on separate threads.
//! Operations follow ISL's transfer-of-ownership convention: consuming
//! operations take their arguments by value, and `copy()` (a reference
//! bump) retains an object across a consuming call.

// ============================================================================
// Relation Algebra
// ============================================================================

pub mod algebra; // Checked façade over ISL
pub mod qpolynomial; // Quasi-polynomial FFI layer

// ============================================================================
// Problem Construction
// ============================================================================

pub mod metrics; // Distance metric synthesis
pub mod tile; // Tiling restrictions

// ============================================================================
// Analyses
// ============================================================================

pub mod folding; // Layered folding engine
pub mod latency; // Latency / jump analysis
pub mod meshcast; // Multicast network identification

pub use algebra::{
    parse_map, parse_pw_aff, parse_pw_qpolynomial, parse_set, pw_qp_max, pw_qp_min, AlgebraError,
    Result,
};
pub use folding::{
    evaluate_chain, Binding, ChainResult, ChainSpec, FoldResult, Layer, LayerOutcome, LayerSpec,
};
pub use latency::{analyze_jumps, analyze_jumps_str, analyze_latency, analyze_latency_str};
pub use meshcast::{
    cost_mesh_cast, cost_mesh_cast_str, identify_mesh_casts, identify_mesh_casts_str, MeshCasts,
};
pub use metrics::{
    manhattan_nd, manhattan_nd_named, pw_aff_to_map, ring_metric, ring_metric_named,
};
pub use qpolynomial::{map_apply_pw_qpolynomial, map_card, set_card, PwQpolynomial};
pub use tile::{tile, tile_hierarchy};
