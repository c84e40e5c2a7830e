//! Bottom-up expression simplification.
//!
//! The scheduler does not need a full simplifier: it needs bounds that have
//! had integer estimates substituted into them to collapse to literals, and
//! it needs the obvious identities so symbolic endpoints stay readable.
//! Anything beyond constant folding, identity/annihilator elimination, and
//! re-association of constant addends is out of scope.

use std::rc::Rc;

use crate::Expr;

pub fn simplify(e: &Expr) -> Expr {
    match e {
        Expr::IntImm(_) | Expr::Var(_) | Expr::Param(_) => e.clone(),
        Expr::Add(a, b) => simplify_add(&simplify(a), &simplify(b)),
        Expr::Sub(a, b) => simplify_sub(&simplify(a), &simplify(b)),
        Expr::Mul(a, b) => simplify_mul(&simplify(a), &simplify(b)),
        Expr::Div(a, b) => simplify_div(&simplify(a), &simplify(b)),
        Expr::Min(a, b) => simplify_min(&simplify(a), &simplify(b)),
        Expr::Max(a, b) => simplify_max(&simplify(a), &simplify(b)),
        Expr::Call { name, args } => {
            Expr::Call { name: name.clone(), args: args.iter().map(simplify).collect() }
        }
    }
}

/// `x + c`, dropping the add when `c` is zero.
fn offset(x: Expr, c: i64) -> Expr {
    if c == 0 { x } else { Expr::Add(Rc::new(x), Rc::new(Expr::IntImm(c))) }
}

fn simplify_add(a: &Expr, b: &Expr) -> Expr {
    // Canonicalize the constant to the right.
    let (a, b) = if a.as_int().is_some() && b.as_int().is_none() { (b, a) } else { (a, b) };
    match (a, b) {
        (Expr::IntImm(x), Expr::IntImm(y)) => Expr::IntImm(x + y),
        (_, Expr::IntImm(0)) => a.clone(),
        // (x + c1) + c2 => x + (c1 + c2)
        (Expr::Add(x, c1), Expr::IntImm(c2)) if c1.as_int().is_some() => {
            offset((**x).clone(), c1.as_int().expect("guarded") + c2)
        }
        _ => Expr::Add(Rc::new(a.clone()), Rc::new(b.clone())),
    }
}

fn simplify_sub(a: &Expr, b: &Expr) -> Expr {
    match (a, b) {
        (Expr::IntImm(x), Expr::IntImm(y)) => Expr::IntImm(x - y),
        (_, Expr::IntImm(0)) => a.clone(),
        _ if a == b => Expr::IntImm(0),
        // (x + c1) - c2 => x + (c1 - c2)
        (Expr::Add(x, c1), Expr::IntImm(c2)) if c1.as_int().is_some() => {
            offset((**x).clone(), c1.as_int().expect("guarded") - c2)
        }
        // x - c => x + (-c)
        (_, Expr::IntImm(c)) => offset(a.clone(), -c),
        _ => Expr::Sub(Rc::new(a.clone()), Rc::new(b.clone())),
    }
}

fn simplify_mul(a: &Expr, b: &Expr) -> Expr {
    let (a, b) = if a.as_int().is_some() && b.as_int().is_none() { (b, a) } else { (a, b) };
    match (a, b) {
        (Expr::IntImm(x), Expr::IntImm(y)) => Expr::IntImm(x * y),
        (_, Expr::IntImm(0)) => Expr::IntImm(0),
        (_, Expr::IntImm(1)) => a.clone(),
        _ => Expr::Mul(Rc::new(a.clone()), Rc::new(b.clone())),
    }
}

fn simplify_div(a: &Expr, b: &Expr) -> Expr {
    match (a, b) {
        (Expr::IntImm(x), Expr::IntImm(y)) if *y != 0 => Expr::IntImm(x.div_euclid(*y)),
        (Expr::IntImm(0), _) => Expr::IntImm(0),
        (_, Expr::IntImm(1)) => a.clone(),
        _ => Expr::Div(Rc::new(a.clone()), Rc::new(b.clone())),
    }
}

fn simplify_min(a: &Expr, b: &Expr) -> Expr {
    match (a, b) {
        (Expr::IntImm(x), Expr::IntImm(y)) => Expr::IntImm(*x.min(y)),
        _ if a == b => a.clone(),
        _ => Expr::Min(Rc::new(a.clone()), Rc::new(b.clone())),
    }
}

fn simplify_max(a: &Expr, b: &Expr) -> Expr {
    match (a, b) {
        (Expr::IntImm(x), Expr::IntImm(y)) => Expr::IntImm(*x.max(y)),
        _ if a == b => a.clone(),
        _ => Expr::Max(Rc::new(a.clone()), Rc::new(b.clone())),
    }
}
