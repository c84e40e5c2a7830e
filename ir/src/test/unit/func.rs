//! Unit tests for the function data model and schedule mutators.

use crate::{DimKind, Expr, ForType, Function, LoopLevel, ReductionVariable, ScalarType};

fn pure_2d() -> Function {
    Function::new("f", &["x", "y"], vec![ScalarType::Float32], vec![Expr::var("x") + Expr::var("y")])
}

#[test]
fn pure_function_dims_follow_args() {
    let f = pure_2d();
    assert_eq!(f.stages(), 1);
    assert!(f.is_pure());
    let dims = &f.init().schedule.dims;
    assert_eq!(dims.len(), 2);
    assert_eq!(dims[0].var, "x");
    assert_eq!(dims[1].var, "y");
    assert!(dims.iter().all(|d| d.for_type == ForType::Serial && d.kind == DimKind::PureVar));
}

#[test]
fn update_dims_are_rvars_then_lhs_pure_vars() {
    let mut f = Function::new("hist", &["i"], vec![ScalarType::Int32], vec![Expr::int(0)]);
    f.define_update(
        vec![Expr::call("in", vec![Expr::var("r")])],
        vec![Expr::call("hist", vec![Expr::call("in", vec![Expr::var("r")])]) + 1],
        vec![ReductionVariable::new("r", 0, 1024)],
    );
    assert_eq!(f.stages(), 2);
    assert!(!f.is_pure());
    let dims = &f.definition(1).schedule.dims;
    // The left-hand side is in(r), not a plain var, so `i` is not a loop.
    assert_eq!(dims.len(), 1);
    assert_eq!(dims[0].var, "r");
    assert!(dims[0].is_rvar());
}

#[test]
fn update_with_plain_lhs_keeps_pure_dims() {
    let mut f = Function::new("acc", &["x", "y"], vec![ScalarType::Float32], vec![Expr::int(0)]);
    f.define_update(
        vec![Expr::var("x"), Expr::var("y")],
        vec![Expr::call("acc", vec![Expr::var("x"), Expr::var("y")]) + Expr::call("in", vec![Expr::var("x"), Expr::var("r")])],
        vec![ReductionVariable::new("r", 0, 64)],
    );
    let dims = &f.definition(1).schedule.dims;
    assert_eq!(dims.iter().map(|d| d.var.as_str()).collect::<Vec<_>>(), vec!["r", "x", "y"]);
    assert!(dims[0].is_rvar());
    assert!(dims[1].is_pure() && dims[2].is_pure());
}

#[test]
fn split_replaces_dim_and_records() {
    let mut f = pure_2d();
    let sched = &mut f.definition_mut(0).schedule;
    sched.split("x", "x_o", "x_i", 8).unwrap();
    assert_eq!(sched.dim_names(), vec!["x_i", "x_o", "y"]);
    assert_eq!(sched.splits.len(), 1);
    assert_eq!(sched.splits[0].factor, 8);
    assert!(sched.split("nope", "a", "b", 4).is_err());
}

#[test]
fn reorder_moves_dims_within_their_slots() {
    let mut f = pure_2d();
    let sched = &mut f.definition_mut(0).schedule;
    sched.reorder(&["y".to_string(), "x".to_string()]).unwrap();
    assert_eq!(sched.dim_names(), vec!["y", "x"]);
}

#[test]
fn partial_reorder_leaves_other_dims_alone() {
    let mut f = Function::new(
        "g",
        &["x", "y", "z"],
        vec![ScalarType::Float32],
        vec![Expr::var("x")],
    );
    let sched = &mut f.definition_mut(0).schedule;
    sched.reorder(&["z".to_string(), "x".to_string()]).unwrap();
    assert_eq!(sched.dim_names(), vec!["z", "y", "x"]);
}

#[test]
fn vectorize_and_parallel_set_for_types() {
    let mut f = pure_2d();
    let sched = &mut f.definition_mut(0).schedule;
    sched.vectorize("x").unwrap();
    sched.parallel("y").unwrap();
    assert_eq!(sched.find_dim("x").unwrap().for_type, ForType::Vectorized);
    assert_eq!(sched.find_dim("y").unwrap().for_type, ForType::Parallel);
}

#[test]
fn compute_levels_track_directives() {
    let mut f = pure_2d();
    assert!(f.compute_level().is_root());
    f.compute_at("g", "y_o");
    assert_eq!(*f.compute_level(), LoopLevel::At { func: "g".to_string(), var: "y_o".to_string() });
    f.compute_inline();
    assert!(f.compute_level().is_inlined());
    f.compute_root();
    assert!(f.store_level().is_root());
}
