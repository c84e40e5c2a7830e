//! Bounds queries over expressions.
//!
//! Two operations the scheduler leans on constantly:
//!
//! - [`bounds_of_expr_in_scope`]: the interval an expression can span given
//!   intervals for the loop variables in scope.
//! - [`boxes_required`]: for every call in an expression, the region of the
//!   callee touched when the expression is evaluated over the scope.
//!
//! Both treat unknown endpoints as absorbing, except where one side of a
//! min/max still yields a usable one-sided bound.

use std::collections::BTreeMap;

use crate::func::Environment;
use crate::{Expr, Interval, Region, simplify};

/// Intervals for the loop variables currently in scope.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: BTreeMap<String, Interval>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, interval: Interval) {
        self.vars.insert(name.into(), interval);
    }

    pub fn get(&self, name: &str) -> Option<&Interval> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}

/// Interval bound on the values a function can produce, keyed by name.
///
/// Multi-valued functions are bounded by the hull over all their values;
/// the scheduler consumes nothing finer.
pub type FuncValueBounds = BTreeMap<String, Interval>;

/// Interval arithmetic over an expression.
///
/// A variable outside the scope bounds itself (a symbolic point); a call is
/// bounded by the callee's value bounds when known.
pub fn bounds_of_expr_in_scope(e: &Expr, scope: &Scope, func_val_bounds: &FuncValueBounds) -> Interval {
    match e {
        Expr::IntImm(_) | Expr::Param(_) => Interval::point(e.clone()),
        Expr::Var(name) => scope.get(name).cloned().unwrap_or_else(|| Interval::point(e.clone())),
        Expr::Add(a, b) => {
            let (ia, ib) = child_bounds(a, b, scope, func_val_bounds);
            Interval {
                min: binop_endpoint(&ia.min, &ib.min, |x, y| x + y),
                max: binop_endpoint(&ia.max, &ib.max, |x, y| x + y),
            }
        }
        Expr::Sub(a, b) => {
            let (ia, ib) = child_bounds(a, b, scope, func_val_bounds);
            Interval {
                min: binop_endpoint(&ia.min, &ib.max, |x, y| x - y),
                max: binop_endpoint(&ia.max, &ib.min, |x, y| x - y),
            }
        }
        Expr::Mul(a, b) => {
            let (ia, ib) = child_bounds(a, b, scope, func_val_bounds);
            scale_bounds(&ia, &ib)
        }
        Expr::Div(a, b) => {
            let (ia, ib) = child_bounds(a, b, scope, func_val_bounds);
            div_bounds(&ia, &ib)
        }
        Expr::Min(a, b) => {
            let (ia, ib) = child_bounds(a, b, scope, func_val_bounds);
            Interval {
                // A lower bound needs both sides; an upper bound survives
                // from either side alone.
                min: binop_endpoint(&ia.min, &ib.min, Expr::min),
                max: one_sided(&ia.max, &ib.max, Expr::min),
            }
        }
        Expr::Max(a, b) => {
            let (ia, ib) = child_bounds(a, b, scope, func_val_bounds);
            Interval {
                min: one_sided(&ia.min, &ib.min, Expr::max),
                max: binop_endpoint(&ia.max, &ib.max, Expr::max),
            }
        }
        Expr::Call { name, .. } => func_val_bounds.get(name).cloned().unwrap_or_else(Interval::everything),
    }
}

fn child_bounds(a: &Expr, b: &Expr, scope: &Scope, fvb: &FuncValueBounds) -> (Interval, Interval) {
    (bounds_of_expr_in_scope(a, scope, fvb), bounds_of_expr_in_scope(b, scope, fvb))
}

fn binop_endpoint(a: &Option<Expr>, b: &Option<Expr>, op: impl Fn(Expr, Expr) -> Expr) -> Option<Expr> {
    match (a, b) {
        (Some(a), Some(b)) => Some(simplify(&op(a.clone(), b.clone()))),
        _ => None,
    }
}

fn one_sided(a: &Option<Expr>, b: &Option<Expr>, op: impl Fn(Expr, Expr) -> Expr) -> Option<Expr> {
    match (a, b) {
        (Some(a), Some(b)) => Some(simplify(&op(a.clone(), b.clone()))),
        (Some(a), None) => Some(a.clone()),
        (None, b) => b.clone(),
    }
}

/// Bounds of a product. Handles scaling by a single-point constant on either
/// side and the fully constant case; anything else is unknown.
fn scale_bounds(a: &Interval, b: &Interval) -> Interval {
    if let Some(c) = point_const(b) {
        return scale_by_const(a, c);
    }
    if let Some(c) = point_const(a) {
        return scale_by_const(b, c);
    }
    match (a.min_int(), a.max_int(), b.min_int(), b.max_int()) {
        (Some(alo), Some(ahi), Some(blo), Some(bhi)) => {
            let products = [alo * blo, alo * bhi, ahi * blo, ahi * bhi];
            Interval::constant(*products.iter().min().unwrap(), *products.iter().max().unwrap())
        }
        _ => Interval::everything(),
    }
}

fn scale_by_const(a: &Interval, c: i64) -> Interval {
    let scaled = |e: &Option<Expr>| e.as_ref().map(|e| simplify(&(e.clone() * c)));
    if c >= 0 {
        Interval { min: scaled(&a.min), max: scaled(&a.max) }
    } else {
        Interval { min: scaled(&a.max), max: scaled(&a.min) }
    }
}

fn div_bounds(a: &Interval, b: &Interval) -> Interval {
    let Some(c) = point_const(b) else { return Interval::everything() };
    if c == 0 {
        return Interval::everything();
    }
    let divided = |e: &Option<Expr>| e.as_ref().map(|e| simplify(&Expr::div(e.clone(), Expr::IntImm(c))));
    if c > 0 {
        Interval { min: divided(&a.min), max: divided(&a.max) }
    } else {
        Interval { min: divided(&a.max), max: divided(&a.min) }
    }
}

fn point_const(i: &Interval) -> Option<i64> {
    let (lo, hi) = (i.min_int()?, i.max_int()?);
    (lo == hi).then_some(lo)
}

/// Regions of every function and input called in `e`, evaluated over `scope`.
///
/// Calls nested inside index arguments contribute too; repeated calls to the
/// same name are merged by hull.
pub fn boxes_required(e: &Expr, scope: &Scope, func_val_bounds: &FuncValueBounds) -> BTreeMap<String, Region> {
    let mut boxes = BTreeMap::new();
    collect_boxes(e, scope, func_val_bounds, &mut boxes);
    boxes
}

fn collect_boxes(e: &Expr, scope: &Scope, fvb: &FuncValueBounds, out: &mut BTreeMap<String, Region>) {
    if let Expr::Call { name, args } = e {
        let region: Region = args.iter().map(|arg| bounds_of_expr_in_scope(arg, scope, fvb)).collect();
        match out.get_mut(name) {
            Some(existing) => existing.merge_with(&region),
            None => {
                out.insert(name.clone(), region);
            }
        }
    }
    match e {
        Expr::IntImm(_) | Expr::Var(_) | Expr::Param(_) => {}
        Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) | Expr::Min(a, b) | Expr::Max(a, b) => {
            collect_boxes(a, scope, fvb, out);
            collect_boxes(b, scope, fvb, out);
        }
        Expr::Call { args, .. } => {
            for arg in args {
                collect_boxes(arg, scope, fvb, out);
            }
        }
    }
}

/// Value bounds for every function, computed in realization order so callee
/// bounds are available when a caller is bounded.
pub fn compute_function_value_bounds(order: &[String], env: &Environment) -> FuncValueBounds {
    let scope = Scope::new();
    let mut bounds = FuncValueBounds::new();
    for name in order {
        let Some(func) = env.get(name) else { continue };
        let mut value_bound: Option<Interval> = None;
        for stage in 0..func.stages() {
            for value in &func.definition(stage).values {
                let b = bounds_of_expr_in_scope(value, &scope, &bounds);
                value_bound = Some(match value_bound {
                    Some(acc) => acc.hull(&b),
                    None => b,
                });
            }
        }
        if let Some(b) = value_bound {
            bounds.insert(name.clone(), b);
        }
    }
    bounds
}
