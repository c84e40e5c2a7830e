//! Unit tests for the simplifier.

use test_case::test_case;

use crate::{Expr, simplify};

#[test_case(Expr::int(3) + Expr::int(4), 7; "add constants")]
#[test_case(Expr::int(10) - Expr::int(4), 6; "sub constants")]
#[test_case(Expr::int(6) * Expr::int(7), 42; "mul constants")]
#[test_case(Expr::div(Expr::int(9), Expr::int(2)), 4; "div positive constants")]
#[test_case(Expr::div(Expr::int(-9), Expr::int(2)), -5; "div is euclidean for negatives")]
#[test_case(Expr::min(Expr::int(3), Expr::int(8)), 3; "min constants")]
#[test_case(Expr::max(Expr::int(3), Expr::int(8)), 8; "max constants")]
fn constant_folding(e: Expr, expected: i64) {
    assert_eq!(simplify(&e).as_int(), Some(expected));
}

#[test]
fn additive_identity() {
    let x = Expr::var("x");
    assert_eq!(simplify(&(x.clone() + 0)), x);
    assert_eq!(simplify(&(Expr::int(0) + x.clone())), x);
    assert_eq!(simplify(&(x.clone() - 0)), x);
}

#[test]
fn multiplicative_identity_and_annihilator() {
    let x = Expr::var("x");
    assert_eq!(simplify(&(x.clone() * 1)), x);
    assert_eq!(simplify(&(x.clone() * 0)).as_int(), Some(0));
    assert_eq!(simplify(&Expr::div(x.clone(), Expr::int(1))), x);
}

#[test]
fn constant_addends_reassociate() {
    let x = Expr::var("x");
    let e = (x.clone() + 3) + 4;
    assert_eq!(simplify(&e), x.clone() + 7);

    let e = (x.clone() + 3) - 3;
    assert_eq!(simplify(&e), x);
}

#[test]
fn self_subtraction_cancels() {
    let x = Expr::var("x");
    assert_eq!(simplify(&(x.clone() - x)).as_int(), Some(0));
}

#[test]
fn min_max_of_equal_operands_collapse() {
    let x = Expr::var("x");
    assert_eq!(simplify(&Expr::min(x.clone(), x.clone())), x);
    assert_eq!(simplify(&Expr::max(x.clone(), x.clone())), x);
}

#[test]
fn simplifies_inside_calls() {
    let e = Expr::call("f", vec![Expr::var("x") + 0, Expr::int(2) + Expr::int(3)]);
    assert_eq!(e.to_string(), "f((x + 0), (2 + 3))");
    assert_eq!(simplify(&e).to_string(), "f(x, 5)");
}

#[test]
fn extent_style_expression_folds() {
    // (1023 - 0 + 1) is the shape every extent computation takes.
    let e = Expr::int(1023) - Expr::int(0) + 1;
    assert_eq!(simplify(&e).as_int(), Some(1024));
}
