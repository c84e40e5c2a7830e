//! Unit tests for the region cost model.

use std::collections::{BTreeMap, BTreeSet};

use tessera_ir::{DimBounds, Expr, Interval, Region};

use crate::costs::{Cost, RegionCosts, perform_inline};
use crate::test::helpers::pointwise_pipeline;

fn unit_bounds() -> DimBounds {
    let mut bounds = DimBounds::new();
    bounds.insert("x".to_string(), Interval::constant(0, 0));
    bounds.insert("y".to_string(), Interval::constant(0, 0));
    bounds
}

#[test]
fn element_bytes_cover_functions_and_inputs() {
    let (env, _) = pointwise_pipeline();
    let costs = RegionCosts::new(&env);
    assert_eq!(costs.element_bytes("a"), Some(4));
    assert_eq!(costs.element_bytes("in"), Some(4));
    assert_eq!(costs.element_bytes("nope"), None);
}

#[test]
fn stage_region_cost_scales_per_point_cost() {
    let (env, _) = pointwise_pipeline();
    let costs = RegionCosts::new(&env);
    let inlined = BTreeSet::new();

    // b(x,y) = a(x,y) + a(x+1,y): one point is one add plus the add in the
    // index, and two 4-byte loads.
    let point = costs.stage_region_cost("b", 0, &unit_bounds(), &inlined);
    assert_eq!(point.arith, Some(2));
    assert_eq!(point.memory, Some(8));

    let mut bounds = DimBounds::new();
    bounds.insert("x".to_string(), Interval::constant(0, 63));
    bounds.insert("y".to_string(), Interval::constant(0, 63));
    let tile = costs.stage_region_cost("b", 0, &bounds, &inlined);
    assert_eq!(tile.arith, Some(2 * 64 * 64));
    assert_eq!(tile.memory, Some(8 * 64 * 64));
}

#[test]
fn unknown_bounds_poison_stage_cost() {
    let (env, _) = pointwise_pipeline();
    let costs = RegionCosts::new(&env);
    let mut bounds = unit_bounds();
    bounds.insert("x".to_string(), Interval::everything());
    let cost = costs.stage_region_cost("b", 0, &bounds, &BTreeSet::new());
    assert_eq!(cost.arith, None);
    assert_eq!(cost.memory, None);
}

#[test]
fn inlining_substitutes_the_producer() {
    let (env, _) = pointwise_pipeline();
    let inlined = BTreeSet::from(["a".to_string()]);
    let e = Expr::call("a", vec![Expr::var("x") + 1, Expr::var("y")]);
    let inlined_expr = perform_inline(&e, &env, &inlined);
    assert_eq!(inlined_expr.to_string(), "in((x + 1), y)");
}

#[test]
fn inlined_callees_disappear_from_load_costs() {
    let (env, _) = pointwise_pipeline();
    let costs = RegionCosts::new(&env);

    let none = BTreeSet::new();
    let loads = costs.stage_detailed_load_costs("b", 0, &unit_bounds(), &none);
    assert_eq!(loads.get("a"), Some(&Some(8)));
    assert!(!loads.contains_key("in"));

    let inlined = BTreeSet::from(["a".to_string()]);
    let loads = costs.stage_detailed_load_costs("b", 0, &unit_bounds(), &inlined);
    assert!(!loads.contains_key("a"));
    // a's loads of the input surface instead.
    assert_eq!(loads.get("in"), Some(&Some(8)));
}

#[test]
fn region_cost_skips_inlined_and_unknown_regions_poison() {
    let (env, _) = pointwise_pipeline();
    let costs = RegionCosts::new(&env);

    let mut regions = BTreeMap::new();
    regions.insert("a".to_string(), Region::from_intervals([Interval::constant(0, 63), Interval::constant(0, 63)]));
    regions.insert("b".to_string(), Region::from_intervals([Interval::constant(0, 63), Interval::constant(0, 63)]));

    let inlined = BTreeSet::from(["a".to_string()]);
    let with_inline = costs.region_cost(&regions, &inlined);
    let without = costs.region_cost(&regions, &BTreeSet::new());
    // Inlining a removes its standalone evaluation but re-prices b's loads.
    assert!(with_inline.is_known() && without.is_known());
    assert_ne!(with_inline, without);

    regions.insert("b".to_string(), Region::from_intervals([Interval::everything(), Interval::constant(0, 63)]));
    assert_eq!(costs.region_cost(&regions, &BTreeSet::new()), Cost::unknown());
}

#[test]
fn region_sizes_in_bytes() {
    let (env, _) = pointwise_pipeline();
    let costs = RegionCosts::new(&env);
    let region = Region::from_intervals([Interval::constant(0, 63), Interval::constant(0, 63)]);
    assert_eq!(costs.region_size("a", &region), Some(64 * 64 * 4));
    assert_eq!(costs.input_region_size("in", &region), Some(64 * 64 * 4));
    assert_eq!(costs.region_size("in", &region), None);
}
