//! Dependence analysis.
//!
//! Given a stage and a requested region of it, symbolically derive the
//! regions of every transitive producer that must be computed or allocated.
//! The traversal is an iterative worklist over `(stage, bounds)` pairs; the
//! pipeline DAG is acyclic and a function is never enqueued under itself, so
//! the worklist terminates.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::debug;

use tessera_ir::{
    DimBounds, Environment, Expr, ExternArg, FuncValueBounds, Interval, Region, Scope, bounds_of_expr_in_scope,
    boxes_required, simplify,
};

use crate::graph::{FStage, all_stage_bounds};

pub struct DependenceAnalysis<'e> {
    pub env: &'e Environment,
    pub func_val_bounds: FuncValueBounds,
}

impl<'e> DependenceAnalysis<'e> {
    pub fn new(env: &'e Environment, func_val_bounds: FuncValueBounds) -> Self {
        Self { env, func_val_bounds }
    }

    /// Regions of the producers in `prods` required to compute the region of
    /// stage `(func, stage)` given by `bounds`. With `only_computed`, the
    /// queried function's own region is left out of the result: the caller
    /// wants what is computed, not what is allocated.
    pub fn regions_required(
        &self,
        func: &str,
        stage: usize,
        bounds: &DimBounds,
        prods: &BTreeSet<String>,
        only_computed: bool,
    ) -> BTreeMap<String, Region> {
        let mut regions: BTreeMap<String, Region> = BTreeMap::new();
        let mut queue: VecDeque<(FStage, DimBounds)> = VecDeque::new();
        queue.push_back((FStage::new(func, stage), bounds.clone()));

        while let Some((s, curr_bounds)) = queue.pop_front() {
            let f = self.env.get(&s.func).expect("queued stages name known functions");
            let def = f.definition(s.stage);

            // Substitute parameter estimates into the bounds and push each
            // dimension's interval into the scope.
            let mut scope = Scope::new();
            for d in &def.schedule.dims {
                let bound = curr_bounds.get(&d.var).expect("stage bounds cover every dim");
                scope.push(d.var.clone(), self.substituted_interval(bound));
            }

            if s.stage == 0
                && let Some(ext) = f.extern_definition()
            {
                // No visibility into an extern stage: function arguments are
                // needed in their entirety, expression arguments are walked
                // for calls, buffer arguments are whole-buffer loads.
                for arg in &ext.args {
                    match arg {
                        ExternArg::Func(prod_name) => {
                            let Some(prod_func) = self.env.get(prod_name) else { continue };
                            let mut prod_reg = BTreeMap::new();
                            prod_reg.insert(prod_name.clone(), Region::everything(prod_func.args().len()));
                            self.merge_and_queue(&mut queue, &mut regions, prod_reg, prods, only_computed, &s.func);
                        }
                        ExternArg::Expr(e) => {
                            let subs_arg = e.substitute_params(&self.env.param_estimates);
                            let arg_regions = boxes_required(&subs_arg, &scope, &self.func_val_bounds);
                            self.merge_and_queue(&mut queue, &mut regions, arg_regions, prods, only_computed, &s.func);
                        }
                        ExternArg::Buffer { name, dimensions } => {
                            let mut buf_reg = BTreeMap::new();
                            buf_reg.insert(name.clone(), Region::everything(*dimensions));
                            merge_regions(&mut regions, buf_reg);
                        }
                    }
                }
            }

            for value in &def.values {
                let subs_val = value.substitute_params(&self.env.param_estimates);
                let mut curr_regions = boxes_required(&subs_val, &scope, &self.func_val_bounds);

                // Left-hand-side arguments may themselves read producers
                // (histogram-style updates), and their bounds form the
                // "self" box that extends the function's own required
                // region.
                let mut left_reg = Region::new();
                for arg in &def.args {
                    let subs_arg = arg.substitute_params(&self.env.param_estimates);
                    let arg_regions = boxes_required(&subs_arg, &scope, &self.func_val_bounds);
                    merge_regions(&mut curr_regions, arg_regions);
                    left_reg.push(bounds_of_expr_in_scope(&subs_arg, &scope, &self.func_val_bounds));
                }
                match curr_regions.get_mut(s.func.as_str()) {
                    Some(existing) => existing.merge_with(&left_reg),
                    None => {
                        curr_regions.insert(s.func.clone(), left_reg);
                    }
                }

                self.merge_and_queue(&mut queue, &mut regions, curr_regions, prods, only_computed, &s.func);
            }
        }

        self.concretize(regions)
    }

    /// Convenience overload merging `regions_required` across every stage of
    /// `func`, from bounds on its pure dimensions.
    pub fn regions_required_all(
        &self,
        func: &str,
        pure_bounds: &DimBounds,
        prods: &BTreeSet<String>,
        only_computed: bool,
    ) -> BTreeMap<String, Region> {
        let f = self.env.get(func).expect("query names a known function");
        let mut regions: BTreeMap<String, Region> = BTreeMap::new();
        for (stage, bounds) in all_stage_bounds(f, pure_bounds).iter().enumerate() {
            let stage_regions = self.regions_required(func, stage, bounds, prods, only_computed);
            merge_regions(&mut regions, stage_regions);
        }
        regions
    }

    /// Regions recomputed if the bounds along `var` are shifted by one full
    /// extent: the overlap between the original and shifted requirements.
    pub fn redundant_regions(
        &self,
        func: &str,
        stage: usize,
        var: &str,
        bounds: &DimBounds,
        prods: &BTreeSet<String>,
        only_computed: bool,
    ) -> BTreeMap<String, Region> {
        let regions = self.regions_required(func, stage, bounds, prods, only_computed);

        let mut shifted_bounds = DimBounds::new();
        for (name, bound) in bounds {
            if name == var
                && let (Some(min), Some(max)) = (&bound.min, &bound.max)
            {
                let len = simplify(&(max.clone() - min.clone() + 1));
                shifted_bounds.insert(
                    name.clone(),
                    Interval::new(simplify(&(min.clone() + len.clone())), simplify(&(max.clone() + len))),
                );
            } else {
                shifted_bounds.insert(name.clone(), bound.clone());
            }
        }

        let regions_shifted = self.regions_required(func, stage, &shifted_bounds, prods, only_computed);

        let mut overlaps = BTreeMap::new();
        for (name, region) in &regions {
            // A function can be in the original regions but missing from the
            // shifted ones; such entries are skipped.
            let Some(shifted) = regions_shifted.get(name) else { continue };
            assert_eq!(region.len(), shifted.len(), "shifted region changed dimensionality for {name}");
            let mut overlap = region.intersect(shifted);
            overlap.simplify();
            overlaps.insert(name.clone(), overlap);
        }
        overlaps
    }

    /// Redundant regions along each non-outermost loop dimension.
    pub fn overlap_regions(
        &self,
        func: &str,
        stage: usize,
        bounds: &DimBounds,
        prods: &BTreeSet<String>,
        only_computed: bool,
    ) -> Vec<BTreeMap<String, Region>> {
        let f = self.env.get(func).expect("query names a known function");
        let dims = &f.definition(stage).schedule.dims;
        dims.iter()
            .map(|d| self.redundant_regions(func, stage, &d.var, bounds, prods, only_computed))
            .collect()
    }

    /// Regions of every function and input required to compute the pipeline
    /// outputs over their estimated extents.
    pub fn pipeline_bounds(&self, outputs: &[String]) -> BTreeMap<String, Region> {
        let prods: BTreeSet<String> = self.env.funcs.keys().cloned().collect();
        let mut pipeline_bounds = BTreeMap::new();

        for out_name in outputs {
            let out = self.env.get(out_name).expect("outputs are known functions");
            let mut pure_bounds = DimBounds::new();
            let mut out_box = Region::new();
            for arg in out.args() {
                // Most recent estimate wins on duplicates.
                let est = out.estimates().iter().rev().find(|e| e.var == *arg);
                let interval = match est {
                    Some(e) => Interval::constant(e.min, e.min + e.extent - 1),
                    None => Interval::everything(),
                };
                pure_bounds.insert(arg.clone(), interval.clone());
                out_box.push(interval);
            }

            let mut regions = self.regions_required_all(out_name, &pure_bounds, &prods, false);
            regions.entry(out_name.clone()).or_insert(out_box);
            merge_regions(&mut pipeline_bounds, regions);
        }

        for (name, region) in &pipeline_bounds {
            debug!(func = %name, region = %region, "pipeline bounds");
        }
        pipeline_bounds
    }

    fn substituted_interval(&self, bound: &Interval) -> Interval {
        let subst = |e: &Option<Expr>| {
            e.as_ref().map(|e| simplify(&e.substitute_params(&self.env.param_estimates)))
        };
        Interval { min: subst(&bound.min), max: subst(&bound.max) }
    }

    /// Merge `curr_regions` into the global result map and enqueue every
    /// producer region that names a known function in `prods`. The current
    /// function is never merged when `only_computed` is set and never
    /// enqueued under itself.
    fn merge_and_queue(
        &self,
        queue: &mut VecDeque<(FStage, DimBounds)>,
        regions: &mut BTreeMap<String, Region>,
        curr_regions: BTreeMap<String, Region>,
        prods: &BTreeSet<String>,
        only_computed: bool,
        curr_func: &str,
    ) {
        for (name, region) in curr_regions {
            if !only_computed || name != curr_func {
                match regions.get_mut(&name) {
                    Some(existing) => existing.merge_with(&region),
                    None => {
                        regions.insert(name.clone(), region.clone());
                    }
                }
            }

            if !prods.contains(&name) || name == curr_func {
                continue;
            }
            let Some(prod_func) = self.env.get(&name) else { continue };

            assert_eq!(
                region.len(),
                prod_func.args().len(),
                "required region of {name} does not match its arity"
            );
            let mut prod_pure_bounds = DimBounds::new();
            for (arg, interval) in prod_func.args().iter().zip(region.iter()) {
                prod_pure_bounds.insert(arg.clone(), interval.clone());
            }
            for (stage, bounds) in all_stage_bounds(prod_func, &prod_pure_bounds).into_iter().enumerate() {
                queue.push_back((FStage::new(name.clone(), stage), bounds));
            }
        }
    }

    /// Simplify every region and anchor endpoints that stayed symbolic to
    /// the producer's own output estimates on its pure dimensions.
    fn concretize(&self, regions: BTreeMap<String, Region>) -> BTreeMap<String, Region> {
        let mut concrete = BTreeMap::new();
        for (name, mut region) in regions {
            region.simplify();
            let func = self.env.get(&name);
            let mut anchored = Region::new();
            for (i, interval) in region.iter().enumerate() {
                let mut lower = interval.min.clone();
                let mut upper = interval.max.clone();
                if let Some(f) = func
                    && i < f.args().len()
                {
                    let arg = &f.args()[i];
                    if lower.as_ref().and_then(Expr::as_int).is_none()
                        && let Some(est) = f.estimates().iter().find(|e| e.var == *arg)
                    {
                        lower = Some(Expr::int(est.min));
                    }
                    if upper.as_ref().and_then(Expr::as_int).is_none()
                        && let Some(est) = f.estimates().iter().find(|e| e.var == *arg)
                    {
                        upper = Some(Expr::int(est.min + est.extent - 1));
                    }
                }
                anchored.push(Interval { min: lower, max: upper });
            }
            concrete.insert(name, anchored);
        }
        concrete
    }
}

/// Merge a partial region map into `result` by dimension-wise hull.
pub fn merge_regions(result: &mut BTreeMap<String, Region>, partial: BTreeMap<String, Region>) {
    for (name, region) in partial {
        match result.get_mut(&name) {
            Some(existing) => existing.merge_with(&region),
            None => {
                result.insert(name, region);
            }
        }
    }
}
