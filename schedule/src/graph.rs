//! Stage identity and the pipeline graph.
//!
//! Each stage of each function is a node, identified by
//! `(function_name, stage_index)`. Two classes of edges populate the
//! `children` adjacency:
//!
//! - inter-function: a call from stage `(g, s)` to `h` adds an edge from
//!   `h`'s *last* stage to `(g, s)` - consumers depend only on a producer's
//!   final stage, which is what makes a function's stages atomic with
//!   respect to grouping;
//! - intra-function: stage `s` depends on stage `s - 1`.
//!
//! Pipeline inputs are never nodes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tessera_ir::{Definition, DimBounds, Environment, Expr, ExternArg, Function, Interval, simplify};

/// Identity of one function stage: stage 0 is the pure definition, stages
/// `1..` the updates. Ordering is lexicographic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FStage {
    pub func: String,
    pub stage: usize,
}

impl FStage {
    pub fn new(func: impl Into<String>, stage: usize) -> Self {
        Self { func: func.into(), stage }
    }
}

impl fmt::Display for FStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.func, self.stage)
    }
}

/// Names of every function and input a stage calls, including calls in its
/// reduction-domain bounds and, for extern stages, its extern arguments.
pub fn stage_parents(func: &Function, stage: usize) -> BTreeSet<String> {
    let mut parents = BTreeSet::new();
    if stage == 0
        && let Some(ext) = func.extern_definition()
    {
        for arg in &ext.args {
            match arg {
                ExternArg::Func(name) => {
                    parents.insert(name.clone());
                }
                ExternArg::Expr(e) => e.called_names(&mut parents),
                ExternArg::Buffer { name, .. } => {
                    parents.insert(name.clone());
                }
            }
        }
    }
    let def = func.definition(stage);
    for e in def.values.iter().chain(def.args.iter()) {
        e.called_names(&mut parents);
    }
    for rv in &def.rvars {
        rv.min.called_names(&mut parents);
        rv.extent.called_names(&mut parents);
    }
    parents
}

/// Bounds of one stage's loop dims: pure dims take the function's pure
/// bounds, reduction dims take their domain `[min, min + extent - 1]`.
pub fn stage_bounds(func: &Function, stage: usize, pure_bounds: &DimBounds) -> DimBounds {
    let def = func.definition(stage);
    let mut bounds = DimBounds::new();
    for rv in &def.rvars {
        let max = simplify(&(rv.min.clone() + rv.extent.clone() - 1));
        bounds.insert(rv.var.clone(), Interval::new(simplify(&rv.min), max));
    }
    for d in &def.schedule.dims {
        if bounds.contains_key(&d.var) {
            continue;
        }
        let bound = pure_bounds.get(&d.var).cloned().unwrap_or_else(Interval::everything);
        bounds.insert(d.var.clone(), bound);
    }
    bounds
}

/// Bounds for every stage of `func`, from bounds on its pure dimensions.
pub fn all_stage_bounds(func: &Function, pure_bounds: &DimBounds) -> Vec<DimBounds> {
    (0..func.stages()).map(|s| stage_bounds(func, s, pure_bounds)).collect()
}

/// Topological order over the environment's call graph: producers before
/// consumers, restricted to functions reachable from `outputs`.
pub fn realization_order(env: &Environment, outputs: &[String]) -> Vec<String> {
    let mut order = Vec::new();
    let mut visited = BTreeSet::new();
    for out in outputs {
        visit_realization(env, out, &mut visited, &mut order);
    }
    order
}

fn visit_realization(env: &Environment, name: &str, visited: &mut BTreeSet<String>, order: &mut Vec<String>) {
    if !env.contains(name) || !visited.insert(name.to_string()) {
        return;
    }
    let func = env.get(name).expect("function visited by name");
    let mut callees = BTreeSet::new();
    for stage in 0..func.stages() {
        callees.extend(stage_parents(func, stage));
    }
    for callee in callees {
        if callee != name {
            visit_realization(env, &callee, visited, order);
        }
    }
    order.push(name.to_string());
}

/// Producer-stage to consumer-stages adjacency over the whole environment.
pub fn build_children(env: &Environment) -> BTreeMap<FStage, BTreeSet<FStage>> {
    let mut children: BTreeMap<FStage, BTreeSet<FStage>> = BTreeMap::new();
    for (name, func) in &env.funcs {
        for stage in 0..func.stages() {
            for parent in stage_parents(func, stage) {
                // Calls to pipeline inputs are not nodes.
                if parent == *name {
                    continue;
                }
                let Some(prod) = env.get(&parent) else { continue };
                let prod_stage = FStage::new(parent, prod.stages() - 1);
                children.entry(prod_stage).or_default().insert(FStage::new(name.clone(), stage));
            }
            if stage > 0 {
                children
                    .entry(FStage::new(name.clone(), stage - 1))
                    .or_default()
                    .insert(FStage::new(name.clone(), stage));
            }
        }
    }
    children
}

/// Whether the reduction variable `var` of `def` can be parallelized.
///
/// Conservative syntactic proof: `var` must appear as a plain left-hand-side
/// argument at some position, and every call the definition makes back into
/// `func_name` must preserve `var` at that position. Distinct values of the
/// rvar then write and read disjoint sites.
pub fn can_parallelize_rvar(var: &str, func_name: &str, def: &Definition) -> bool {
    let store_positions: Vec<usize> = def
        .args
        .iter()
        .enumerate()
        .filter_map(|(i, a)| (a.as_var() == Some(var)).then_some(i))
        .collect();
    if store_positions.is_empty() {
        return false;
    }

    let mut self_calls: Vec<Vec<Expr>> = Vec::new();
    for e in def.values.iter().chain(def.args.iter()) {
        e.for_each_call(&mut |name, args| {
            if name == func_name {
                self_calls.push(args.to_vec());
            }
        });
    }

    store_positions
        .iter()
        .any(|&pos| self_calls.iter().all(|args| args.get(pos).and_then(Expr::as_var) == Some(var)))
}
