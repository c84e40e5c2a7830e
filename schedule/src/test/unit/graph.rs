//! Unit tests for stage identity and the pipeline graph.

use std::collections::BTreeSet;

use tessera_ir::{DimBounds, Expr, Function, Interval, ReductionVariable, ScalarType};

use crate::graph::{FStage, build_children, can_parallelize_rvar, realization_order, stage_bounds, stage_parents};
use crate::test::helpers::{extern_pipeline, histogram_pipeline, pointwise_pipeline};

#[test]
fn fstage_orders_lexicographically() {
    let mut stages = [FStage::new("b", 1), FStage::new("b", 0), FStage::new("a", 2)];
    stages.sort();
    assert_eq!(stages, [FStage::new("a", 2), FStage::new("b", 0), FStage::new("b", 1)]);
    assert_eq!(FStage::new("f", 1).to_string(), "(f, 1)");
}

#[test]
fn children_of_pointwise_chain() {
    let (env, _) = pointwise_pipeline();
    let children = build_children(&env);

    // Inputs are never nodes; a feeds b, b feeds out.
    assert!(!children.contains_key(&FStage::new("in", 0)));
    let a_children: Vec<_> = children[&FStage::new("a", 0)].iter().cloned().collect();
    assert_eq!(a_children, vec![FStage::new("b", 0)]);
    let b_children: Vec<_> = children[&FStage::new("b", 0)].iter().cloned().collect();
    assert_eq!(b_children, vec![FStage::new("out", 0)]);
    assert!(!children.contains_key(&FStage::new("out", 0)));
}

#[test]
fn consumers_depend_on_last_stage_and_stages_chain() {
    let (env, _) = histogram_pipeline();
    let children = build_children(&env);

    // The consumer hangs off the update stage, not the pure stage.
    let final_children: Vec<_> = children[&FStage::new("hist", 1)].iter().cloned().collect();
    assert_eq!(final_children, vec![FStage::new("cdf", 0)]);

    // Intra-function edge from stage 0 to stage 1.
    assert!(children[&FStage::new("hist", 0)].contains(&FStage::new("hist", 1)));
}

#[test]
fn stage_parents_include_rvar_and_nested_calls() {
    let (env, _) = histogram_pipeline();
    let hist = env.get("hist").unwrap();
    let parents = stage_parents(hist, 1);
    // Self call plus the input read in both the value and the store index.
    assert_eq!(parents, BTreeSet::from(["hist".to_string(), "in".to_string()]));
}

#[test]
fn stage_parents_cover_extern_arguments() {
    let (env, _) = extern_pipeline();
    let fft = env.get("fft").unwrap();
    assert_eq!(stage_parents(fft, 0), BTreeSet::from(["coeffs".to_string(), "pre".to_string()]));

    // The extern stage is still an ordinary node in the graph.
    let children = build_children(&env);
    let pre_children: Vec<_> = children[&FStage::new("pre", 0)].iter().cloned().collect();
    assert_eq!(pre_children, vec![FStage::new("fft", 0)]);
}

#[test]
fn realization_order_puts_producers_first() {
    let (env, outputs) = pointwise_pipeline();
    let order = realization_order(&env, &outputs);
    assert_eq!(order, vec!["a".to_string(), "b".to_string(), "out".to_string()]);
}

#[test]
fn stage_bounds_pick_up_reduction_domains() {
    let (env, _) = histogram_pipeline();
    let hist = env.get("hist").unwrap();
    let mut pure_bounds = DimBounds::new();
    pure_bounds.insert("i".to_string(), Interval::constant(0, 255));

    let bounds = stage_bounds(hist, 1, &pure_bounds);
    let r = &bounds["r"];
    assert_eq!(r.min_int(), Some(0));
    assert_eq!(r.max_int(), Some(1023));
    // The update's store site is data dependent, so `i` is not a loop dim.
    assert!(!bounds.contains_key("i"));
}

#[test]
fn histogram_rvar_is_not_parallelizable() {
    let (env, _) = histogram_pipeline();
    let hist = env.get("hist").unwrap();
    assert!(!can_parallelize_rvar("r", "hist", hist.definition(1)));
}

#[test]
fn accumulation_rvar_is_not_parallelizable() {
    let mut f = Function::new("acc", &["x"], vec![ScalarType::Float32], vec![Expr::int(0)]);
    f.define_update(
        vec![Expr::var("x")],
        vec![Expr::call("acc", vec![Expr::var("x")]) + Expr::call("in", vec![Expr::var("x"), Expr::var("r")])],
        vec![ReductionVariable::new("r", 0, 64)],
    );
    assert!(!can_parallelize_rvar("r", "acc", f.definition(1)));
}

#[test]
fn scatter_rvar_with_disjoint_writes_is_parallelizable() {
    // r appears directly as a store coordinate and every self call keeps it
    // there, so distinct r iterations touch disjoint sites.
    let mut f = Function::new("scan", &["x"], vec![ScalarType::Float32], vec![Expr::int(0)]);
    f.define_update(
        vec![Expr::var("r")],
        vec![Expr::call("scan", vec![Expr::var("r")]) + 1],
        vec![ReductionVariable::new("r", 0, 64)],
    );
    assert!(can_parallelize_rvar("r", "scan", f.definition(1)));
}
