//! Unit tests for dependence analysis.

use std::collections::BTreeSet;

use tessera_ir::{DimBounds, FuncValueBounds, Interval};

use crate::dependence::DependenceAnalysis;
use crate::test::helpers::{blur_pipeline, extern_pipeline, histogram_pipeline, pointwise_pipeline};

fn all_funcs(env: &tessera_ir::Environment) -> BTreeSet<String> {
    env.funcs.keys().cloned().collect()
}

fn bounds_2d(x: (i64, i64), y: (i64, i64)) -> DimBounds {
    let mut bounds = DimBounds::new();
    bounds.insert("x".to_string(), Interval::constant(x.0, x.1));
    bounds.insert("y".to_string(), Interval::constant(y.0, y.1));
    bounds
}

#[test]
fn pointwise_chain_regions() {
    let (env, _) = pointwise_pipeline();
    let dep = DependenceAnalysis::new(&env, FuncValueBounds::new());
    let prods = all_funcs(&env);

    let regions = dep.regions_required("out", 0, &bounds_2d((0, 1023), (0, 1023)), &prods, false);

    // b is needed point-for-point, a grows by the stencil tap, the input
    // follows a.
    assert_eq!(regions["out"].size(), Some(1024 * 1024));
    assert_eq!(regions["b"].size(), Some(1024 * 1024));
    let a = &regions["a"];
    assert_eq!(a[0].min_int(), Some(0));
    assert_eq!(a[0].max_int(), Some(1024));
    assert_eq!(a[1].max_int(), Some(1023));
    assert_eq!(regions["in"], regions["a"]);
}

#[test]
fn only_computed_drops_the_queried_function() {
    let (env, _) = pointwise_pipeline();
    let dep = DependenceAnalysis::new(&env, FuncValueBounds::new());
    let prods = all_funcs(&env);
    let bounds = bounds_2d((0, 1023), (0, 1023));

    let alloc = dep.regions_required("out", 0, &bounds, &prods, false);
    let computed = dep.regions_required("out", 0, &bounds, &prods, true);

    assert!(alloc.contains_key("out"));
    assert!(!computed.contains_key("out"));
    assert_eq!(alloc["a"], computed["a"]);
}

#[test]
fn producers_outside_the_set_are_not_traversed() {
    let (env, _) = pointwise_pipeline();
    let dep = DependenceAnalysis::new(&env, FuncValueBounds::new());
    let prods = BTreeSet::from(["b".to_string()]);

    let regions = dep.regions_required("out", 0, &bounds_2d((0, 1023), (0, 1023)), &prods, false);
    // b's own producers are reported through b's definition, but a's
    // producers are not chased because a is not in the producer set.
    assert!(regions.contains_key("b"));
    assert!(regions.contains_key("a"));
    assert!(!regions.contains_key("in"));
}

#[test]
fn redundant_regions_refine_required_regions() {
    let (env, _) = blur_pipeline();
    let dep = DependenceAnalysis::new(&env, FuncValueBounds::new());
    let prods = all_funcs(&env);
    let bounds = bounds_2d((0, 255), (0, 63));

    let required = dep.regions_required("blur_y", 0, &bounds, &prods, false);
    let redundant = dep.redundant_regions("blur_y", 0, "y", &bounds, &prods, false);

    for (name, overlap) in &redundant {
        let required = &required[name];
        for (dim, interval) in overlap.iter().enumerate() {
            if let (Some(lo), Some(hi)) = (interval.min_int(), interval.max_int())
                && lo <= hi
            {
                assert!(lo >= required[dim].min_int().unwrap());
                assert!(hi <= required[dim].max_int().unwrap());
            }
        }
    }

    // A 3-tap vertical stencil shifted by a full tile overlaps in exactly
    // the two boundary rows of blur_x.
    let blur_x_overlap = &redundant["blur_x"];
    assert_eq!(blur_x_overlap[1].min_int(), Some(63));
    assert_eq!(blur_x_overlap[1].max_int(), Some(64));
}

#[test]
fn overlap_regions_cover_every_dimension() {
    let (env, _) = blur_pipeline();
    let dep = DependenceAnalysis::new(&env, FuncValueBounds::new());
    let prods = all_funcs(&env);

    let overlaps = dep.overlap_regions("blur_y", 0, &bounds_2d((0, 255), (0, 63)), &prods, false);
    assert_eq!(overlaps.len(), 2);
}

#[test]
fn pipeline_bounds_cover_functions_and_inputs() {
    let (env, outputs) = pointwise_pipeline();
    let dep = DependenceAnalysis::new(&env, FuncValueBounds::new());
    let bounds = dep.pipeline_bounds(&outputs);

    assert_eq!(bounds["out"].size(), Some(1024 * 1024));
    assert_eq!(bounds["b"].size(), Some(1024 * 1024));
    assert_eq!(bounds["a"].size(), Some(1025 * 1024));
    assert_eq!(bounds["in"].size(), Some(1025 * 1024));
}

#[test]
fn extern_stage_needs_whole_producers() {
    let (env, _) = extern_pipeline();
    let dep = DependenceAnalysis::new(&env, FuncValueBounds::new());
    let prods = all_funcs(&env);

    let regions = dep.regions_required("post", 0, &bounds_2d((0, 511), (0, 511)), &prods, false);

    // The consumer's read of fft is a plain point access.
    assert_eq!(regions["fft"].size(), Some(512 * 512));

    // No visibility into the extern stage: pre is needed in its entirety
    // and its own producer is still chased.
    let pre = &regions["pre"];
    assert_eq!(pre.len(), 2);
    assert!(pre.iter().all(|i| i.min.is_none() && i.max.is_none()));
    assert!(regions.contains_key("in"));

    // The coefficient buffer is a whole-buffer load of its own arity.
    let coeffs = &regions["coeffs"];
    assert_eq!(coeffs.len(), 1);
    assert_eq!(coeffs.size(), None);
}

#[test]
fn histogram_update_extends_its_own_region() {
    let (env, _) = histogram_pipeline();
    let mut fvb = FuncValueBounds::new();
    fvb.insert("in".to_string(), Interval::constant(0, 255));
    let dep = DependenceAnalysis::new(&env, fvb);
    let prods = all_funcs(&env);

    let mut bounds = DimBounds::new();
    bounds.insert("i".to_string(), Interval::constant(0, 15));
    let regions = dep.regions_required("cdf", 0, &bounds, &prods, false);

    // The consumer only reads bins 0..16, but the update stage writes
    // wherever the input sends it, so the histogram's own region grows to
    // the input's value bounds.
    let hist = &regions["hist"];
    assert_eq!(hist[0].min_int(), Some(0));
    assert_eq!(hist[0].max_int(), Some(255));
    // And the whole input is scanned.
    assert_eq!(regions["in"][0].min_int(), Some(0));
    assert_eq!(regions["in"][0].max_int(), Some(1023));
}
