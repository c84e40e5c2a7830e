//! Symbolic substrate for the tessera auto-scheduler.
//!
//! This crate owns everything the scheduler reasons *about*:
//!
//! - [`expr`] - a small symbolic integer expression tree with calls
//! - [`simplify`] - bottom-up constant folding and identity rewriting
//! - [`interval`] - intervals and rectangular regions with first-class
//!   "unknown" endpoints
//! - [`bounds`] - interval arithmetic over expressions in a variable scope,
//!   and extraction of the regions every call in an expression touches
//! - [`func`] - the function / definition / schedule data model and the
//!   environment that owns it
//! - [`types`] - scalar element types and their byte widths
//!
//! Functions are owned by the [`Environment`] map and referred to everywhere
//! else by name plus stage index; there are no pointer graphs outside the
//! environment.

pub mod bounds;
pub mod error;
pub mod expr;
pub mod func;
pub mod interval;
pub mod simplify;
pub mod types;

#[cfg(test)]
pub mod test;

pub use bounds::{FuncValueBounds, Scope, bounds_of_expr_in_scope, boxes_required, compute_function_value_bounds};
pub use error::{Error, Result};
pub use expr::Expr;
pub use func::{
    BoundDirective, Definition, Dim, DimEstimate, DimKind, Environment, ExternArg, ExternDefinition, ForType,
    Function, InputParam, LoopLevel, ReductionVariable, Split, StageSchedule,
};
pub use interval::{DimBounds, Interval, Region};
pub use simplify::simplify;
pub use types::ScalarType;
