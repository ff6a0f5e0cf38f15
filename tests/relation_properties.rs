//! Algebraic laws of the relation façade.
//!
//! These tests execute real ISL logic through the façade and check the
//! laws the analyses silently rely on: composition behaves like relation
//! composition, reversal is an involution, identity is neutral, counting
//! agrees with cardinality, and the synthesized metrics behave like
//! distances. Every case builds a fresh context.

use isl_rs::Context;
use polycast::algebra::{self, apply_range, identity_on, parse_map, parse_set};
use polycast::metrics::{manhattan_nd, pw_aff_to_map, ring_metric};
use polycast::{map_card, tile};
use std::sync::Arc;

#[test]
fn composition_is_associative() {
    let ctx = Arc::new(Context::alloc());
    let r = parse_map(&ctx, "{ [x] -> [y] : y = x + 1 and 0 <= x < 10 }").unwrap();
    let s = parse_map(&ctx, "{ [y] -> [z] : z = 3y and 0 <= y < 20 }").unwrap();
    let t = parse_map(&ctx, "{ [z] -> [w] : w = z - 2 }").unwrap();

    let left = apply_range(
        apply_range(r.copy(), s.copy()).unwrap(),
        t.copy(),
    )
    .unwrap();
    let right = apply_range(r, apply_range(s, t).unwrap()).unwrap();
    assert!(left.is_equal(&right));
}

#[test]
fn reverse_is_an_involution() {
    let ctx = Arc::new(Context::alloc());
    let r = parse_map(
        &ctx,
        "{ [x, y] -> [a] : a = x + 2y and 0 <= x < 5 and 0 <= y < 7 }",
    )
    .unwrap();
    let twice = r.copy().reverse().reverse();
    assert!(twice.is_equal(&r));
}

#[test]
fn identity_is_neutral_for_composition() {
    let ctx = Arc::new(Context::alloc());
    let r = parse_map(&ctx, "{ [x] -> [y] : y = 2x and 0 <= x < 6 }").unwrap();

    let id_domain = identity_on(r.get_space().domain());
    let id_range = identity_on(r.get_space().range());

    let left = apply_range(id_domain, r.copy()).unwrap();
    let right = apply_range(r.copy(), id_range).unwrap();
    assert!(left.is_equal(&r));
    assert!(right.is_equal(&r));
}

#[test]
fn counting_the_identity_yields_the_cardinality() {
    let ctx = Arc::new(Context::alloc());
    let s = parse_set(&ctx, "{ [x, y] : 0 <= x < 4 and 0 <= y < 3 }").unwrap();

    let ident = algebra::intersect_domain(identity_on(s.get_space()), s).unwrap();
    let card = map_card(ident);
    assert_eq!(algebra::sum_to_scalar("card", card).unwrap(), 12);
}

#[test]
fn manhattan_is_nonnegative_and_zero_on_the_diagonal() {
    let ctx = Arc::new(Context::alloc());
    let map = pw_aff_to_map(manhattan_nd(&ctx, &["xd", "yd", "zd"], &["xs", "ys", "zs"]).unwrap());

    let domain = parse_set(
        &ctx,
        "{ [[xd, yd, zd] -> [xs, ys, zs]] : 0 <= xd, yd, zd, xs, ys, zs < 4 }",
    )
    .unwrap();
    let bounded = algebra::intersect_domain(map.copy(), domain).unwrap();
    let negative = parse_set(&ctx, "{ [v] : v < 0 }").unwrap();
    assert!(bounded.range().intersect(negative).is_empty());

    let diagonal = parse_set(
        &ctx,
        "{ [[xd, yd, zd] -> [xd, yd, zd]] : 0 <= xd, yd, zd < 4 }",
    )
    .unwrap();
    let on_diag = algebra::intersect_domain(map, diagonal).unwrap();
    assert!(on_diag
        .range()
        .is_equal(&parse_set(&ctx, "{ [0] }").unwrap()));
}

#[test]
fn ring_metric_is_nonnegative_and_zero_on_the_diagonal() {
    let ctx = Arc::new(Context::alloc());
    let map = pw_aff_to_map(ring_metric(&ctx, 6).unwrap());

    let domain = parse_set(&ctx, "{ [[xd] -> [xs]] : 0 <= xd, xs < 6 }").unwrap();
    let bounded = algebra::intersect_domain(map.copy(), domain).unwrap();
    let negative = parse_set(&ctx, "{ [v] : v < 0 }").unwrap();
    assert!(bounded.range().intersect(negative).is_empty());

    let diagonal = parse_set(&ctx, "{ [[xd] -> [xd]] : 0 <= xd < 6 }").unwrap();
    let on_diag = algebra::intersect_domain(map, diagonal).unwrap();
    assert!(on_diag
        .range()
        .is_equal(&parse_set(&ctx, "{ [0] }").unwrap()));
}

#[test]
fn tile_blocks_partition_the_data_domain() {
    let ctx = Arc::new(Context::alloc());
    let occ = parse_map(&ctx, "{ [x] -> [d] : 0 <= x < 8 and 0 <= d < 32 }").unwrap();
    let tiled = occ
        .copy()
        .intersect(tile(0, occ.get_space(), 4, 0).unwrap());

    // Coverage: every datum lands in some block.
    let data = parse_set(&ctx, "{ [d] : 0 <= d < 32 }").unwrap();
    assert!(tiled.copy().range().is_equal(&data));

    // Disjointness: a datum belongs to exactly one axis value.
    let sharing = tiled.copy().apply_range(tiled.reverse());
    let ident = parse_map(&ctx, "{ [x] -> [x] : 0 <= x < 8 }").unwrap();
    assert!(sharing.is_equal(&ident));
}
