//! End-to-end analysis scenarios.
//!
//! Concrete occupancy/fill problems with hand-computed expected answers,
//! exercising the full derivation from relation strings to scalar costs.
//! Every case builds a fresh context.

use isl_rs::Context;
use polycast::algebra::AlgebraError;
use polycast::folding::{evaluate_chain, Binding, ChainSpec, Layer, LayerSpec};
use polycast::metrics::{manhattan_nd, manhattan_nd_named, pw_aff_to_map, ring_metric};
use polycast::{
    analyze_jumps, analyze_latency, analyze_latency_str, cost_mesh_cast, identify_mesh_casts,
    parse_map,
};
use std::sync::Arc;

/// Run with `RUST_LOG=debug` to see every intermediate relation.
fn fresh_context() -> Arc<Context> {
    let _ = env_logger::builder().is_test(true).try_init();
    Arc::new(Context::alloc())
}

// ----------------------------------------------------------------------------
// Identity multicast on an 8x8 mesh: everything is already in place.
// ----------------------------------------------------------------------------

#[test]
fn identity_fill_on_8x8_mesh_is_free() {
    let ctx = fresh_context();
    let src = parse_map(
        &ctx,
        "{ [xs, ys] -> [a, b] : a = xs and b = ys and 0 <= xs < 8 and 0 <= ys < 8 }",
    )
    .unwrap();
    let dst = parse_map(
        &ctx,
        "{ [xd, yd] -> [a, b] : a = xd and b = yd and 0 <= xd < 8 and 0 <= yd < 8 }",
    )
    .unwrap();
    let dist = pw_aff_to_map(manhattan_nd(&ctx, &["xd", "yd"], &["xs", "ys"]).unwrap());

    assert_eq!(analyze_latency(&src, &dst, &dist).unwrap(), 0);
    assert_eq!(analyze_jumps(&src, &dst, &dist).unwrap(), 0);
}

// ----------------------------------------------------------------------------
// Row broadcast on an 8x8 mesh: every slot wants its whole column.
// ----------------------------------------------------------------------------

#[test]
fn column_broadcast_worst_case_is_seven_hops() {
    let ctx = fresh_context();
    let src = parse_map(
        &ctx,
        "{ [xs, ys] -> [a, b] : a = xs and b = ys and 0 <= xs < 8 and 0 <= ys < 8 }",
    )
    .unwrap();
    // Each destination requests all eight data of column xd.
    let dst = parse_map(
        &ctx,
        "{ [xd, yd] -> [a, b] : a = xd and 0 <= b < 8 and 0 <= xd < 8 and 0 <= yd < 8 }",
    )
    .unwrap();
    let dist = pw_aff_to_map(manhattan_nd(&ctx, &["xd", "yd"], &["xs", "ys"]).unwrap());

    // The unique source of datum (xd, b) sits at (xd, b); the worst pair
    // is a slot at one end of the column requesting the far end.
    assert_eq!(analyze_latency(&src, &dst, &dist).unwrap(), 7);
}

// ----------------------------------------------------------------------------
// Ring of length 8, all data requested by slot 0.
// ----------------------------------------------------------------------------

#[test]
fn ring_of_eight_reaches_everything_in_four_hops() {
    let ctx = fresh_context();
    let src = parse_map(&ctx, "{ [xs] -> [a] : a = xs and 0 <= xs < 8 }").unwrap();
    let dst = parse_map(&ctx, "{ [xd] -> [a] : 0 <= a < 8 and xd = 0 }").unwrap();
    let dist = pw_aff_to_map(ring_metric(&ctx, 8).unwrap());

    // The farthest point on an 8-ring is 4 hops away.
    assert_eq!(analyze_latency(&src, &dst, &dist).unwrap(), 4);
}

// ----------------------------------------------------------------------------
// Folding layer: crease plus multicast cost of one twig layer.
// ----------------------------------------------------------------------------

#[test]
fn twig_layer_costs_seven_and_leaves_one_datum_missing() {
    let ctx = fresh_context();
    let spec = LayerSpec {
        crease_cost: "{ [id, x, y] -> x : x >= 0; [id, x, y] -> -x : x < 0 }".to_string(),
        fold: "{ [id, x, y] -> [id, y] }".to_string(),
        multicast_cost: "{ [id, y] -> y + 1 }".to_string(),
        src_collapser: "{ [id] -> [id] }".to_string(),
        dst_collapser: "{ [id] -> [id, x, y] }".to_string(),
        trunk_axis: 1,
    };
    let layer = Layer::from_spec(&ctx, &spec).unwrap();
    let binding = Binding::from_strs(
        &ctx,
        "{ [id] -> [data] : id = 0 and data = id }",
        "{ [id, x, y] -> [data] : id = 0 and (x = -1 or x = 1) and 0 <= y <= 1 and data = y }",
    )
    .unwrap();

    let chain = evaluate_chain(&[layer], binding).unwrap();
    // Crease: four destination points at |x| = 1. Multicast: trunk points
    // y = 0 and y = 1 cost 1 + 2.
    assert_eq!(chain.total_cost, 7);
    assert_eq!(chain.layer_costs, vec![7]);

    let missing = parse_map(&ctx, "{ [0] -> [1] }").unwrap();
    assert!(chain.residual.dsts().is_equal(&missing));
}

// ----------------------------------------------------------------------------
// Mesh-cast identification on a 4x4 mesh with stride-2 occupancy.
// ----------------------------------------------------------------------------

#[test]
fn strided_occupancy_mesh_casts_cost_sixteen() {
    let ctx = fresh_context();
    // Sources hold even columns only: xs = 0, 2 hold a = 0 and xs = 1, 3
    // hold a = 2.
    let src = parse_map(
        &ctx,
        "{ [xs, ys] -> [a, b] : a = (2xs) mod 4 and b = ys
           and 0 <= xs < 4 and 0 <= ys < 4 and 0 <= a < 4 and 0 <= b < 4 }",
    )
    .unwrap();
    let dst = parse_map(
        &ctx,
        "{ [xd, yd] -> [a, b] : b = yd and 0 <= xd < 4 and 0 <= yd < 4
           and 0 <= a < 4 and 0 <= b < 4 }",
    )
    .unwrap();
    let dist = pw_aff_to_map(manhattan_nd(&ctx, &["xd", "yd"], &["xs", "ys"]).unwrap());

    let casts = identify_mesh_casts(&src, &dst, &dist).unwrap();

    // Odd columns of data are held by no source and drop out; the held
    // data cost min distance 0 or 1 per destination, row by row:
    // for a = 0 the nearest of {0, 2} and for a = 2 the nearest of {1, 3},
    // each summing to 2 per row of destinations, over 2 data values and
    // 4 rows.
    assert_eq!(cost_mesh_cast(&casts.networks, &dist).unwrap(), 16);

    // Every minimal pair keeps b = yd and a even.
    let odd_data = parse_map(
        &ctx,
        "{ [[xd, yd] -> [a, b]] -> [xs, ys] : a mod 2 = 1 }",
    )
    .unwrap();
    assert!(casts.minimal_pairs.copy().intersect(odd_data).is_empty());
}

#[test]
fn two_layer_chain_threads_the_residual_downward() {
    let ctx = fresh_context();
    let twig = Layer::from_spec(
        &ctx,
        &LayerSpec {
            crease_cost: "{ [id, x, y] -> x : x >= 0; [id, x, y] -> -x : x < 0 }".to_string(),
            fold: "{ [id, x, y] -> [id, y] }".to_string(),
            multicast_cost: "{ [id, y] -> y + 1 }".to_string(),
            src_collapser: "{ [id] -> [id] }".to_string(),
            dst_collapser: "{ [id] -> [id, x, y] }".to_string(),
            trunk_axis: 1,
        },
    )
    .unwrap();
    // The trunk works on the collapsed [id] space the twig hands down.
    let trunk = Layer::from_spec(
        &ctx,
        &LayerSpec {
            crease_cost: "{ [id] -> 2 }".to_string(),
            fold: "{ [id] -> [id] }".to_string(),
            multicast_cost: "{ [id] -> 1 }".to_string(),
            src_collapser: "{ [id] -> [id] }".to_string(),
            dst_collapser: "{ [id] -> [id] }".to_string(),
            trunk_axis: 0,
        },
    )
    .unwrap();
    let binding = Binding::from_strs(
        &ctx,
        "{ [id] -> [data] : id = 0 and data = id }",
        "{ [id, x, y] -> [data] : id = 0 and (x = -1 or x = 1) and 0 <= y <= 1 and data = y }",
    )
    .unwrap();

    let chain = evaluate_chain(&[twig, trunk], binding).unwrap();
    // The twig costs 7 and leaves datum 1 missing; the trunk charges its
    // crease of 2 plus one multicast on the single missing datum.
    assert_eq!(chain.layer_costs, vec![7, 3]);
    assert_eq!(chain.total_cost, 10);
    assert!(!chain.residual.is_satisfied());
}

// ----------------------------------------------------------------------------
// Ring mesh-casts: pair-sum cost agrees with the jump analysis.
// ----------------------------------------------------------------------------

#[test]
fn ring_mesh_cast_cost_matches_total_jumps() {
    let ctx = fresh_context();
    let src = parse_map(&ctx, "{ [xs] -> [a] : a = xs and 0 <= xs < 8 }").unwrap();
    let dst = parse_map(&ctx, "{ [xd] -> [a] : 0 <= a < 8 and xd = 0 }").unwrap();
    let dist = pw_aff_to_map(ring_metric(&ctx, 8).unwrap());

    // Each datum has exactly one holder, so the minimal pairs are forced
    // and the pair-sum equals the jump total: 0+1+2+3+4+3+2+1.
    let casts = identify_mesh_casts(&src, &dst, &dist).unwrap();
    let cast_cost = cost_mesh_cast(&casts.networks, &dist).unwrap();
    assert_eq!(cast_cost, 16);
    assert_eq!(cast_cost, analyze_jumps(&src, &dst, &dist).unwrap());
}

// ----------------------------------------------------------------------------
// Named spatial tuples: occupancy, fill and metric all carry identifiers.
// ----------------------------------------------------------------------------

#[test]
fn named_tuple_problems_compose_with_named_metrics() {
    let ctx = fresh_context();
    let src = parse_map(
        &ctx,
        "{ src[xs, ys] -> data[a, b] : a = xs and b = ys and 0 <= xs < 4 and 0 <= ys < 4 }",
    )
    .unwrap();
    // Every slot requests its whole row of data.
    let dst = parse_map(
        &ctx,
        "{ dst[xd, yd] -> data[a, b] : b = yd and 0 <= a < 4 and 0 <= xd < 4 and 0 <= yd < 4 }",
    )
    .unwrap();
    let dist = pw_aff_to_map(
        manhattan_nd_named(&ctx, ("dst", &["xd", "yd"]), ("src", &["xs", "ys"])).unwrap(),
    );

    // Datum (a, yd) lives at source (a, yd) in the same row, so the hop
    // count is the column distance alone.
    assert_eq!(analyze_latency(&src, &dst, &dist).unwrap(), 3);
    assert_eq!(analyze_jumps(&src, &dst, &dist).unwrap(), 80);
}

#[test]
fn anonymous_metric_does_not_compose_with_named_tuples() {
    let ctx = fresh_context();
    let src = parse_map(&ctx, "{ src[xs] -> data[a] : a = xs and 0 <= xs < 4 }").unwrap();
    let dst = parse_map(&ctx, "{ dst[xd] -> data[a] : a = xd and 0 <= xd < 4 }").unwrap();
    let dist = pw_aff_to_map(manhattan_nd(&ctx, &["xd"], &["xs"]).unwrap());

    assert!(matches!(
        analyze_latency(&src, &dst, &dist).unwrap_err(),
        AlgebraError::SpaceMismatch { .. }
    ));
}

// ----------------------------------------------------------------------------
// Chain specs survive serialization and rebuild into the same chain.
// ----------------------------------------------------------------------------

#[test]
fn chain_specs_round_trip_through_serialization() {
    let ctx = fresh_context();
    let spec = ChainSpec {
        layers: vec![LayerSpec {
            crease_cost: "{ [id, x, y] -> x : x >= 0; [id, x, y] -> -x : x < 0 }".to_string(),
            fold: "{ [id, x, y] -> [id, y] }".to_string(),
            multicast_cost: "{ [id, y] -> y + 1 }".to_string(),
            src_collapser: "{ [id] -> [id] }".to_string(),
            dst_collapser: "{ [id] -> [id, x, y] }".to_string(),
            trunk_axis: 1,
        }],
    };

    let encoded = serde_json::to_string(&spec).unwrap();
    let decoded: ChainSpec = serde_json::from_str(&encoded).unwrap();
    let layers = decoded.build(&ctx).unwrap();

    let binding = Binding::from_strs(
        &ctx,
        "{ [id] -> [data] : id = 0 and data = id }",
        "{ [id, x, y] -> [data] : id = 0 and (x = -1 or x = 1) and 0 <= y <= 1 and data = y }",
    )
    .unwrap();
    let chain = evaluate_chain(&layers, binding).unwrap();
    assert_eq!(chain.total_cost, 7);
}

// ----------------------------------------------------------------------------
// Boundary cases.
// ----------------------------------------------------------------------------

#[test]
fn empty_occupancy_reports_unbounded() {
    let ctx = fresh_context();
    let src = parse_map(&ctx, "{ [xs] -> [a] : 1 = 0 }").unwrap();
    let dst = parse_map(&ctx, "{ [xd] -> [a] : a = xd and 0 <= xd < 4 }").unwrap();
    let dist = pw_aff_to_map(manhattan_nd(&ctx, &["xd"], &["xs"]).unwrap());

    assert!(matches!(
        analyze_latency(&src, &dst, &dist).unwrap_err(),
        AlgebraError::Unbounded { .. }
    ));
    assert!(matches!(
        analyze_jumps(&src, &dst, &dist).unwrap_err(),
        AlgebraError::Unbounded { .. }
    ));
}

#[test]
fn coincident_single_point_is_free() {
    let ctx = fresh_context();
    let src = parse_map(&ctx, "{ [xs, ys] -> [a] : xs = 2 and ys = 3 and a = 0 }").unwrap();
    let dst = parse_map(&ctx, "{ [xd, yd] -> [a] : xd = 2 and yd = 3 and a = 0 }").unwrap();
    let dist = pw_aff_to_map(manhattan_nd(&ctx, &["xd", "yd"], &["xs", "ys"]).unwrap());

    assert_eq!(analyze_latency(&src, &dst, &dist).unwrap(), 0);
    assert_eq!(analyze_jumps(&src, &dst, &dist).unwrap(), 0);
}

#[test]
fn metrics_negative_on_their_domain_are_rejected() {
    let ctx = fresh_context();
    let src = "{ [xs] -> [a] : a = xs and 0 <= xs < 4 }";
    let dst = "{ [xd] -> [a] : a = xd and 0 <= xd < 4 }";
    // A signed difference is not a distance; it must be refused up front
    // even though the in-place minima would aggregate to zero.
    let signed = "{ [[xd] -> [xs]] -> [xs - xd] }";

    assert!(matches!(
        analyze_latency_str(&ctx, src, dst, signed).unwrap_err(),
        AlgebraError::Domain { .. }
    ));
}

#[test]
fn degenerate_ring_distance_is_zero() {
    let ctx = fresh_context();
    let src = parse_map(&ctx, "{ [xs] -> [a] : a = 0 and 0 <= xs < 1 }").unwrap();
    let dst = parse_map(&ctx, "{ [xd] -> [a] : a = 0 and xd = 0 }").unwrap();
    let dist = pw_aff_to_map(ring_metric(&ctx, 1).unwrap());

    assert_eq!(analyze_latency(&src, &dst, &dist).unwrap(), 0);
}

// ----------------------------------------------------------------------------
// String-level entry points with a handwritten piecewise metric.
// ----------------------------------------------------------------------------

#[test]
fn string_wrappers_accept_handwritten_metrics() {
    let ctx = fresh_context();
    let src = "{ [xs, ys] -> [d0, d1] : d0 = xs and d1 = ys and 0 <= xs < 8 and 0 <= ys < 8 }";
    let dst = "{ [xd, yd] -> [d0, d1] : 0 <= d0 < 8 and 0 <= d1 < 8
                and (xd = 0 or 3 <= xd <= 4 or xd = 7)
                and (yd = 0 or 3 <= yd <= 4 or yd = 7) }";
    let dist = "{ [[xd, yd] -> [xs, ys]] -> [(xd - xs) + (yd - ys)] :
                    xd >= xs and yd >= ys;
                  [[xd, yd] -> [xs, ys]] -> [-(xd - xs) + -(yd - ys)] :
                    xd < xs and yd < ys;
                  [[xd, yd] -> [xs, ys]] -> [-(xd - xs) + (yd - ys)] :
                    xd < xs and yd >= ys;
                  [[xd, yd] -> [xs, ys]] -> [(xd - xs) + -(yd - ys)] :
                    xd >= xs and yd < ys }";

    // Sources cover the whole mesh in place, so even a sparse destination
    // pattern is served at distance zero.
    assert_eq!(analyze_latency_str(&ctx, src, dst, dist).unwrap(), 0);
}

#[test]
fn string_wrappers_reject_malformed_relations() {
    let ctx = fresh_context();
    let err = analyze_latency_str(&ctx, "nonsense", "{ [x] -> [a] }", "{ [[x] -> [y]] -> [0] }")
        .unwrap_err();
    assert!(matches!(err, AlgebraError::Parse { .. }));
}
