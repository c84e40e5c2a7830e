//! Region cost model.
//!
//! Turns symbolic regions into scalar arithmetic and memory-traffic
//! estimates. Costs are per-point expression walks scaled by region sizes;
//! "unknown" (`None`) is absorbing through every arithmetic path, so a
//! missing estimate suppresses the candidate it feeds instead of poisoning
//! unrelated merges.

use std::collections::{BTreeMap, BTreeSet};

use tessera_ir::{DimBounds, Environment, Expr, Region};

/// Arithmetic plus memory cost estimate; either component may be unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cost {
    pub arith: Option<i64>,
    pub memory: Option<i64>,
}

impl Cost {
    pub fn zero() -> Self {
        Self { arith: Some(0), memory: Some(0) }
    }

    pub fn unknown() -> Self {
        Self { arith: None, memory: None }
    }

    pub fn is_known(&self) -> bool {
        self.arith.is_some() && self.memory.is_some()
    }

    pub fn plus(&self, other: &Cost) -> Cost {
        Cost {
            arith: opt_add(self.arith, other.arith),
            memory: opt_add(self.memory, other.memory),
        }
    }

    pub fn scaled(&self, factor: Option<i64>) -> Cost {
        Cost { arith: opt_mul(self.arith, factor), memory: opt_mul(self.memory, factor) }
    }
}

pub fn opt_add(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    Some(a? + b?)
}

pub fn opt_mul(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    Some(a? * b?)
}

/// Substitute calls to the named pure functions by their definitions, so
/// costs and strides are measured on the post-inlining expression.
pub fn perform_inline(e: &Expr, env: &Environment, inlined: &BTreeSet<String>) -> Expr {
    match e {
        Expr::Call { name, args } if inlined.contains(name) && env.contains(name) => {
            let callee = env.get(name).expect("inlined callee is in the environment");
            let value = callee.init().values.first().expect("inlined function has a value").clone();
            let mut subs = BTreeMap::new();
            for (arg_name, arg) in callee.args().iter().zip(args.iter()) {
                subs.insert(arg_name.clone(), perform_inline(arg, env, inlined));
            }
            perform_inline(&value.substitute(&subs), env, inlined)
        }
        Expr::Call { name, args } => Expr::Call {
            name: name.clone(),
            args: args.iter().map(|a| perform_inline(a, env, inlined)).collect(),
        },
        Expr::Add(a, b) => perform_inline(a, env, inlined) + perform_inline(b, env, inlined),
        Expr::Sub(a, b) => perform_inline(a, env, inlined) - perform_inline(b, env, inlined),
        Expr::Mul(a, b) => perform_inline(a, env, inlined) * perform_inline(b, env, inlined),
        Expr::Div(a, b) => Expr::div(perform_inline(a, env, inlined), perform_inline(b, env, inlined)),
        Expr::Min(a, b) => Expr::min(perform_inline(a, env, inlined), perform_inline(b, env, inlined)),
        Expr::Max(a, b) => Expr::max(perform_inline(a, env, inlined), perform_inline(b, env, inlined)),
        _ => e.clone(),
    }
}

pub struct RegionCosts<'e> {
    pub env: &'e Environment,
}

impl<'e> RegionCosts<'e> {
    pub fn new(env: &'e Environment) -> Self {
        Self { env }
    }

    /// Bytes of one element of a function or input, unknown for names the
    /// environment has never heard of.
    pub fn element_bytes(&self, name: &str) -> Option<i64> {
        if let Some(f) = self.env.get(name) {
            return Some(f.element_bytes());
        }
        self.env.inputs.get(name).map(|input| input.ty.bytes())
    }

    /// Cost of evaluating one point of stage `(func, stage)` with the given
    /// functions inlined: one arithmetic unit per arithmetic node, one
    /// element load per surviving call.
    fn stage_point_cost(&self, func: &str, stage: usize, inlined: &BTreeSet<String>) -> Cost {
        let f = self.env.get(func).expect("cost query names a known function");
        let def = f.definition(stage);
        let mut arith: i64 = 0;
        let mut memory: Option<i64> = Some(0);
        for e in def.values.iter().chain(def.args.iter()) {
            let e = perform_inline(e, self.env, inlined);
            e.visit(&mut |node| match node {
                Expr::Add(..) | Expr::Sub(..) | Expr::Mul(..) | Expr::Div(..) | Expr::Min(..) | Expr::Max(..) => {
                    arith += 1;
                }
                Expr::Call { name, .. } => {
                    memory = opt_add(memory, self.element_bytes(name));
                }
                _ => {}
            });
        }
        Cost { arith: Some(arith), memory }
    }

    /// Cost of computing stage `(func, stage)` over `bounds`: per-point cost
    /// scaled by the iteration count of every loop dim.
    pub fn stage_region_cost(&self, func: &str, stage: usize, bounds: &DimBounds, inlined: &BTreeSet<String>) -> Cost {
        let f = self.env.get(func).expect("cost query names a known function");
        let mut size: Option<i64> = Some(1);
        for d in &f.definition(stage).schedule.dims {
            let extent = bounds.get(&d.var).and_then(|b| b.extent());
            size = opt_mul(size, extent);
        }
        self.stage_point_cost(func, stage, inlined).scaled(size)
    }

    /// Total cost of evaluating the given producer regions once. Inlined
    /// functions are skipped; their cost rides in their consumers'
    /// substituted expressions.
    pub fn region_cost(&self, regions: &BTreeMap<String, Region>, inlined: &BTreeSet<String>) -> Cost {
        let mut total = Cost::zero();
        for (name, region) in regions {
            let Some(f) = self.env.get(name) else { continue };
            if inlined.contains(name) {
                continue;
            }
            let size = region.size();
            for stage in 0..f.stages() {
                total = total.plus(&self.stage_point_cost(name, stage, inlined).scaled(size));
            }
            if !total.is_known() {
                return Cost::unknown();
            }
        }
        total
    }

    /// Bytes loaded from each callee while evaluating one point of the
    /// stage, after inlining substitution.
    fn stage_point_loads(&self, func: &str, stage: usize, inlined: &BTreeSet<String>) -> BTreeMap<String, Option<i64>> {
        let f = self.env.get(func).expect("load query names a known function");
        let def = f.definition(stage);
        let mut loads: BTreeMap<String, Option<i64>> = BTreeMap::new();
        for e in def.values.iter().chain(def.args.iter()) {
            let e = perform_inline(e, self.env, inlined);
            e.for_each_call(&mut |name, _| {
                let bytes = self.element_bytes(name);
                let entry = loads.entry(name.to_string()).or_insert(Some(0));
                *entry = opt_add(*entry, bytes);
            });
        }
        loads
    }

    /// Per-callee bytes loaded while computing stage `(func, stage)` over
    /// `bounds`.
    pub fn stage_detailed_load_costs(
        &self,
        func: &str,
        stage: usize,
        bounds: &DimBounds,
        inlined: &BTreeSet<String>,
    ) -> BTreeMap<String, Option<i64>> {
        let f = self.env.get(func).expect("load query names a known function");
        let mut size: Option<i64> = Some(1);
        for d in &f.definition(stage).schedule.dims {
            size = opt_mul(size, bounds.get(&d.var).and_then(|b| b.extent()));
        }
        let mut loads = self.stage_point_loads(func, stage, inlined);
        for load in loads.values_mut() {
            *load = opt_mul(*load, size);
        }
        loads
    }

    /// Per-callee bytes loaded while evaluating the given producer regions.
    pub fn detailed_load_costs(
        &self,
        regions: &BTreeMap<String, Region>,
        inlined: &BTreeSet<String>,
    ) -> BTreeMap<String, Option<i64>> {
        let mut total: BTreeMap<String, Option<i64>> = BTreeMap::new();
        for (name, region) in regions {
            let Some(f) = self.env.get(name) else { continue };
            if inlined.contains(name) {
                continue;
            }
            let size = region.size();
            for stage in 0..f.stages() {
                let mut loads = self.stage_point_loads(name, stage, inlined);
                for load in loads.values_mut() {
                    *load = opt_mul(*load, size);
                }
                combine_load_costs(&mut total, loads);
            }
        }
        total
    }

    /// Bytes of the given region of a pipeline function.
    pub fn region_size(&self, name: &str, region: &Region) -> Option<i64> {
        let f = self.env.get(name)?;
        opt_mul(region.size(), Some(f.element_bytes()))
    }

    /// Bytes of the given region of a pipeline input.
    pub fn input_region_size(&self, name: &str, region: &Region) -> Option<i64> {
        let input = self.env.inputs.get(name)?;
        opt_mul(region.size(), Some(input.ty.bytes()))
    }
}

/// Fold `partial` into `total`, adding per-key with unknown absorption.
pub fn combine_load_costs(total: &mut BTreeMap<String, Option<i64>>, partial: BTreeMap<String, Option<i64>>) {
    for (name, load) in partial {
        let entry = total.entry(name).or_insert(Some(0));
        *entry = opt_add(*entry, load);
    }
}
