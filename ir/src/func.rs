//! Function, definition, and schedule data model.
//!
//! A [`Function`] is a named multi-dimensional definition with an initial
//! (pure) stage and zero or more update stages. Functions are owned by the
//! [`Environment`] map; all other state refers to them by name and stage
//! index, never by pointer.
//!
//! The schedule state here is the *surface* the auto-scheduler writes into:
//! loop dims with their for-types, recorded splits, and the store/compute
//! loop levels. It starts in a clean default state (serial loops in
//! definition order, root levels) and the validator rejects anything else.

use std::collections::BTreeMap;

use snafu::ensure;

use crate::error::{DuplicateReorderDimSnafu, Result, UnknownDimSnafu};
use crate::{Expr, ScalarType};

/// How a loop dimension is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForType {
    Serial,
    Vectorized,
    Parallel,
}

/// Whether a dimension iterates a pure argument or a reduction domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimKind {
    PureVar,
    RVar,
}

/// One loop dimension of a stage. `dims[0]` is the innermost loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dim {
    pub var: String,
    pub for_type: ForType,
    pub kind: DimKind,
}

impl Dim {
    pub fn is_rvar(&self) -> bool {
        self.kind == DimKind::RVar
    }

    pub fn is_pure(&self) -> bool {
        self.kind == DimKind::PureVar
    }
}

/// A recorded `split` transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub old_var: String,
    pub outer: String,
    pub inner: String,
    pub factor: i64,
}

/// Loop level at which a function's values are materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopLevel {
    Inlined,
    Root,
    At { func: String, var: String },
}

impl LoopLevel {
    pub fn is_root(&self) -> bool {
        matches!(self, LoopLevel::Root)
    }

    pub fn is_inlined(&self) -> bool {
        matches!(self, LoopLevel::Inlined)
    }
}

/// User-specified bound on a dimension. The auto-scheduler never creates
/// these; their presence is grounds for rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundDirective {
    pub var: String,
    pub min: Expr,
    pub extent: Expr,
}

/// Schedule state of a single stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSchedule {
    /// Loop dimensions, innermost first.
    pub dims: Vec<Dim>,
    pub splits: Vec<Split>,
    pub bounds: Vec<BoundDirective>,
}

impl StageSchedule {
    pub fn find_dim(&self, var: &str) -> Option<&Dim> {
        self.dims.iter().find(|d| d.var == var)
    }

    pub fn dim_names(&self) -> Vec<String> {
        self.dims.iter().map(|d| d.var.clone()).collect()
    }

    /// Split `old_var` by `factor`: the dim is replaced by `inner` with
    /// `outer` immediately outside it; both inherit its kind.
    pub fn split(&mut self, old_var: &str, outer: &str, inner: &str, factor: i64) -> Result<()> {
        let pos = self
            .dims
            .iter()
            .position(|d| d.var == old_var)
            .ok_or_else(|| UnknownDimSnafu { var: old_var.to_string() }.build())?;
        let old = self.dims[pos].clone();
        self.dims[pos] = Dim { var: inner.to_string(), for_type: old.for_type, kind: old.kind };
        self.dims.insert(pos + 1, Dim { var: outer.to_string(), for_type: old.for_type, kind: old.kind });
        self.splits.push(Split {
            old_var: old_var.to_string(),
            outer: outer.to_string(),
            inner: inner.to_string(),
            factor,
        });
        Ok(())
    }

    /// Partial reorder: the named dims are rearranged into the given order
    /// (innermost first) within the loop slots they already occupy; dims not
    /// named keep their positions.
    pub fn reorder(&mut self, order: &[String]) -> Result<()> {
        let mut positions = Vec::with_capacity(order.len());
        for var in order {
            let pos = self
                .dims
                .iter()
                .position(|d| d.var == *var)
                .ok_or_else(|| UnknownDimSnafu { var: var.clone() }.build())?;
            ensure!(!positions.contains(&pos), DuplicateReorderDimSnafu { var: var.clone() });
            positions.push(pos);
        }
        let selected: Vec<Dim> = positions.iter().map(|&p| self.dims[p].clone()).collect();
        let mut slots = positions;
        slots.sort_unstable();
        for (slot, dim) in slots.into_iter().zip(selected) {
            self.dims[slot] = dim;
        }
        Ok(())
    }

    pub fn vectorize(&mut self, var: &str) -> Result<()> {
        self.set_for_type(var, ForType::Vectorized)
    }

    pub fn parallel(&mut self, var: &str) -> Result<()> {
        self.set_for_type(var, ForType::Parallel)
    }

    fn set_for_type(&mut self, var: &str, for_type: ForType) -> Result<()> {
        let dim = self
            .dims
            .iter_mut()
            .find(|d| d.var == var)
            .ok_or_else(|| UnknownDimSnafu { var: var.to_string() }.build())?;
        dim.for_type = for_type;
        Ok(())
    }
}

/// One variable of a reduction domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionVariable {
    pub var: String,
    pub min: Expr,
    pub extent: Expr,
}

impl ReductionVariable {
    pub fn new(var: impl Into<String>, min: impl Into<Expr>, extent: impl Into<Expr>) -> Self {
        Self { var: var.into(), min: min.into(), extent: extent.into() }
    }
}

/// One stage of a function: left-hand-side index expressions, values, the
/// reduction domain (empty for the pure stage), and the stage schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub args: Vec<Expr>,
    pub values: Vec<Expr>,
    pub rvars: Vec<ReductionVariable>,
    pub schedule: StageSchedule,
    /// Specialization conditions; rejected on the initial stage.
    pub specializations: Vec<Expr>,
}

impl Definition {
    pub fn is_update(&self) -> bool {
        !self.rvars.is_empty() || self.args.iter().any(|a| a.as_var().is_none())
    }
}

/// Argument to an extern stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternArg {
    /// An entire pipeline function; its required region is unknowable.
    Func(String),
    /// A scalar expression.
    Expr(Expr),
    /// An input buffer of the given dimensionality.
    Buffer { name: String, dimensions: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternDefinition {
    pub args: Vec<ExternArg>,
}

/// Integer estimate of one output dimension: `var` spans
/// `[min, min + extent - 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimEstimate {
    pub var: String,
    pub min: i64,
    pub extent: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    name: String,
    args: Vec<String>,
    output_types: Vec<ScalarType>,
    init: Definition,
    updates: Vec<Definition>,
    extern_def: Option<ExternDefinition>,
    estimates: Vec<DimEstimate>,
    store_level: LoopLevel,
    compute_level: LoopLevel,
}

impl Function {
    /// Define a pure function `name(args...) = values`.
    pub fn new(
        name: impl Into<String>,
        args: &[&str],
        output_types: Vec<ScalarType>,
        values: Vec<Expr>,
    ) -> Self {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let init = Definition {
            args: args.iter().map(Expr::var).collect(),
            values,
            rvars: Vec::new(),
            schedule: StageSchedule {
                dims: args
                    .iter()
                    .map(|a| Dim { var: a.clone(), for_type: ForType::Serial, kind: DimKind::PureVar })
                    .collect(),
                ..StageSchedule::default()
            },
            specializations: Vec::new(),
        };
        Self {
            name: name.into(),
            args,
            output_types,
            init,
            updates: Vec::new(),
            extern_def: None,
            estimates: Vec::new(),
            store_level: LoopLevel::Root,
            compute_level: LoopLevel::Root,
        }
    }

    /// Define a function computed by an extern stage. The initial definition
    /// carries the loop dims but no visible values.
    pub fn new_extern(
        name: impl Into<String>,
        args: &[&str],
        output_types: Vec<ScalarType>,
        extern_args: Vec<ExternArg>,
    ) -> Self {
        let mut f = Self::new(name, args, output_types, Vec::new());
        f.extern_def = Some(ExternDefinition { args: extern_args });
        f
    }

    /// Add an update stage. Loop dims are the reduction variables in domain
    /// order (innermost) followed by the pure vars that appear as plain
    /// variables on the left-hand side, in argument order.
    pub fn define_update(&mut self, args: Vec<Expr>, values: Vec<Expr>, rvars: Vec<ReductionVariable>) {
        let mut dims: Vec<Dim> = rvars
            .iter()
            .map(|rv| Dim { var: rv.var.clone(), for_type: ForType::Serial, kind: DimKind::RVar })
            .collect();
        for pure_arg in &self.args {
            let used = args.iter().any(|a| a.as_var() == Some(pure_arg.as_str()));
            if used {
                dims.push(Dim { var: pure_arg.clone(), for_type: ForType::Serial, kind: DimKind::PureVar });
            }
        }
        self.updates.push(Definition {
            args,
            values,
            rvars,
            schedule: StageSchedule { dims, ..StageSchedule::default() },
            specializations: Vec::new(),
        });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn output_types(&self) -> &[ScalarType] {
        &self.output_types
    }

    /// Total bytes of one point of this function's outputs.
    pub fn element_bytes(&self) -> i64 {
        self.output_types.iter().map(|t| t.bytes()).sum()
    }

    pub fn init(&self) -> &Definition {
        &self.init
    }

    pub fn updates(&self) -> &[Definition] {
        &self.updates
    }

    /// Number of stages: the pure definition plus each update.
    pub fn stages(&self) -> usize {
        1 + self.updates.len()
    }

    pub fn definition(&self, stage: usize) -> &Definition {
        if stage == 0 { &self.init } else { &self.updates[stage - 1] }
    }

    pub fn definition_mut(&mut self, stage: usize) -> &mut Definition {
        if stage == 0 { &mut self.init } else { &mut self.updates[stage - 1] }
    }

    pub fn has_extern_definition(&self) -> bool {
        self.extern_def.is_some()
    }

    pub fn extern_definition(&self) -> Option<&ExternDefinition> {
        self.extern_def.as_ref()
    }

    pub fn is_pure(&self) -> bool {
        self.updates.is_empty() && self.extern_def.is_none()
    }

    pub fn set_estimate(&mut self, var: impl Into<String>, min: i64, extent: i64) {
        self.estimates.push(DimEstimate { var: var.into(), min, extent });
    }

    pub fn estimates(&self) -> &[DimEstimate] {
        &self.estimates
    }

    pub fn store_level(&self) -> &LoopLevel {
        &self.store_level
    }

    pub fn compute_level(&self) -> &LoopLevel {
        &self.compute_level
    }

    pub fn compute_root(&mut self) {
        self.store_level = LoopLevel::Root;
        self.compute_level = LoopLevel::Root;
    }

    pub fn compute_at(&mut self, func: impl Into<String>, var: impl Into<String>) {
        let level = LoopLevel::At { func: func.into(), var: var.into() };
        self.store_level = level.clone();
        self.compute_level = level;
    }

    pub fn compute_inline(&mut self) {
        self.store_level = LoopLevel::Inlined;
        self.compute_level = LoopLevel::Inlined;
    }
}

/// A pipeline input: an image parameter or bound buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputParam {
    pub ty: ScalarType,
    pub dimensions: usize,
}

/// Owner of every function in the pipeline plus the pipeline inputs and the
/// estimates for scalar parameters.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub funcs: BTreeMap<String, Function>,
    pub inputs: BTreeMap<String, InputParam>,
    pub param_estimates: BTreeMap<String, i64>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_func(&mut self, f: Function) {
        self.funcs.insert(f.name().to_string(), f);
    }

    pub fn add_input(&mut self, name: impl Into<String>, ty: ScalarType, dimensions: usize) {
        self.inputs.insert(name.into(), InputParam { ty, dimensions });
    }

    pub fn set_param_estimate(&mut self, name: impl Into<String>, value: i64) {
        self.param_estimates.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.funcs.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.funcs.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }
}
