//! The partitioner: a greedy fixpoint merger over the pipeline graph.
//!
//! Every stage starts in its own group. Each iteration enumerates candidate
//! producer-into-consumer merges, scores them against the cost model
//! (caching scored configurations per choice), applies the best-scoring
//! merge, and selectively invalidates cache entries whose neighborhood the
//! merge disturbed. The loop stops when no candidate has positive benefit.
//!
//! Two modes run in sequence: `Inline` (pure producers spliced into their
//! consumers, tile sizes collapsed to one) and `FastMem` (producers computed
//! at tiles of their single consumer, tile sizes searched).

mod analysis;
mod group;
mod tiling;

pub use group::{Group, GroupAnalysis, GroupConfig, GroupingChoice, GroupingLevel};
pub use tiling::tile_configurations;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use tessera_ir::{DimBounds, Environment, Interval, Region};

use crate::arch::MachineParams;
use crate::costs::{Cost, RegionCosts, opt_add};
use crate::dependence::DependenceAnalysis;
use crate::graph::FStage;
use crate::graph::build_children;

/// Snapshot of the final grouping handed to schedule synthesis. Computed
/// before any schedule is mutated, because loop and storage bounds depend on
/// the dimension lists the synthesizer rewrites.
#[derive(Debug, Clone)]
pub struct SchedulePlan {
    pub groups: BTreeMap<FStage, Group>,
    /// Per group: loop bounds of each member stage.
    pub loop_bounds: BTreeMap<FStage, BTreeMap<FStage, DimBounds>>,
    /// Per group: allocation bounds of each non-output member function.
    pub storage_bounds: BTreeMap<FStage, BTreeMap<String, Region>>,
    /// Bounds of the output stage of each group.
    pub output_bounds: BTreeMap<FStage, DimBounds>,
    pub pipeline_bounds: BTreeMap<String, Region>,
}

pub struct Partitioner<'a> {
    pub(crate) pipeline_bounds: &'a BTreeMap<String, Region>,
    pub(crate) arch: &'a MachineParams,
    pub(crate) dep: &'a DependenceAnalysis<'a>,
    pub(crate) costs: &'a RegionCosts<'a>,
    outputs: &'a [String],

    /// Groups keyed by their output stage.
    pub groups: BTreeMap<FStage, Group>,
    /// Consumer stages of each producer stage.
    pub children: BTreeMap<FStage, BTreeSet<FStage>>,
    /// Analysis of each group, keyed like `groups`.
    pub(crate) group_costs: BTreeMap<FStage, GroupAnalysis>,
    /// Best configuration scored for each grouping choice so far.
    pub(crate) grouping_cache: BTreeMap<GroupingChoice, GroupConfig>,
}

impl<'a> Partitioner<'a> {
    pub fn new(
        pipeline_bounds: &'a BTreeMap<String, Region>,
        arch: &'a MachineParams,
        dep: &'a DependenceAnalysis<'a>,
        costs: &'a RegionCosts<'a>,
        outputs: &'a [String],
    ) -> Self {
        // Functions without pipeline bounds are not reachable from the
        // outputs; they take no part in grouping.
        let mut groups = BTreeMap::new();
        for (name, func) in &dep.env.funcs {
            if !pipeline_bounds.contains_key(name) {
                continue;
            }
            for stage in 0..func.stages() {
                let stg = FStage::new(name.clone(), stage);
                groups.insert(stg.clone(), Group::new(stg.clone(), vec![stg]));
            }
        }
        let mut children = build_children(dep.env);
        children.retain(|prod, _| pipeline_bounds.contains_key(&prod.func));
        for consumers in children.values_mut() {
            consumers.retain(|cons| pipeline_bounds.contains_key(&cons.func));
        }
        Self {
            pipeline_bounds,
            arch,
            dep,
            costs,
            outputs,
            groups,
            children,
            group_costs: BTreeMap::new(),
            grouping_cache: BTreeMap::new(),
        }
    }

    fn env(&self) -> &Environment {
        self.dep.env
    }

    /// Install the best tile configuration for every singleton group and
    /// start from an empty cache.
    pub fn initialize_groups(&mut self) {
        let keys: Vec<FStage> = self.groups.keys().cloned().collect();
        for key in keys {
            let g = self.groups.get(&key).expect("group key").clone();
            let (tile_sizes, analysis) = self.find_best_tile_config(&g);
            self.groups.get_mut(&key).expect("group key").tile_sizes = tile_sizes;
            self.group_costs.insert(key, analysis);
        }
        self.grouping_cache.clear();
    }

    pub fn clear_grouping_cache(&mut self) {
        self.grouping_cache.clear();
    }

    /// Total cost of computing every group in the pipeline.
    pub fn pipeline_cost(&self) -> Cost {
        assert!(!self.group_costs.is_empty(), "pipeline cost queried before groups were analyzed");
        let mut total = Cost::zero();
        for analysis in self.group_costs.values() {
            total = total.plus(&analysis.cost);
        }
        total
    }

    /// Bounds of one stage, from the pipeline bounds of its function.
    pub fn bounds_for_stage(&self, stg: &FStage) -> DimBounds {
        let func = self.env().get(&stg.func).expect("stage names a known function");
        let region = self
            .pipeline_bounds
            .get(&stg.func)
            .unwrap_or_else(|| panic!("no pipeline bounds for {}", stg.func));
        let mut pure_bounds = DimBounds::new();
        for (arg, interval) in func.args().iter().zip(region.iter()) {
            pure_bounds.insert(arg.clone(), interval.clone());
        }
        crate::graph::stage_bounds(func, stg.stage, &pure_bounds)
    }

    /// Bounds of one tile of a stage. A dimension is tiled only when at
    /// least two tiles fit its extent; otherwise it keeps its full bound.
    pub fn bounds_from_tile_sizes(&self, stg: &FStage, tile_sizes: &BTreeMap<String, i64>) -> DimBounds {
        let func = self.env().get(&stg.func).expect("stage names a known function");
        let def_bounds = self.bounds_for_stage(stg);
        let mut bounds = DimBounds::new();
        for d in &func.definition(stg.stage).schedule.dims {
            let bound = def_bounds.get(&d.var).expect("stage bounds cover every dim");
            let tiled = match (tile_sizes.get(&d.var), bound.extent()) {
                (Some(&size), Some(extent)) if extent >= 2 * size => Some(Interval::constant(0, size - 1)),
                _ => None,
            };
            bounds.insert(d.var.clone(), tiled.unwrap_or_else(|| bound.clone()));
        }
        bounds
    }

    /// One fixpoint grouping pass at the given level.
    pub fn group(&mut self, level: GroupingLevel) {
        loop {
            let pre_merge = self.pipeline_cost();

            let cands = self.candidates(level);
            debug!(?level, count = cands.len(), "grouping candidates");
            for (prod, cons) in &cands {
                debug!(candidate.prod = %prod, candidate.cons = %cons, "candidate");
            }

            let best = self.choose_candidate_grouping(&cands, level);
            if best.is_empty() {
                break;
            }

            // All returned choices share one producer; merging it disturbs
            // only the neighborhood of its final stage.
            let prod = best[0].0.prod.clone();
            let prod_func = self.env().get(&prod).expect("producer is a known function");
            let num_stages = prod_func.stages();
            let final_stage = FStage::new(prod.clone(), num_stages - 1);
            let prod_children = self.children.get(&final_stage).cloned().unwrap_or_default();

            let invalid: Vec<GroupingChoice> = self
                .grouping_cache
                .keys()
                .filter(|key| prod_children.iter().any(|c| key.prod == c.func || key.cons == *c))
                .cloned()
                .collect();
            for key in invalid {
                self.grouping_cache.remove(&key);
            }

            for (choice, config) in &best {
                assert_eq!(choice.prod, prod, "aggregate choices must share one producer");
                self.merge_groups(choice, config, level);
            }

            for stage in 0..num_stages {
                let prod_stage = FStage::new(prod.clone(), stage);
                self.groups.remove(&prod_stage);
                self.group_costs.remove(&prod_stage);
                self.children.remove(&prod_stage);
                for consumers in self.children.values_mut() {
                    if consumers.remove(&prod_stage) {
                        // Anything that fed the merged producer now feeds the
                        // consumers of its final stage.
                        consumers.extend(prod_children.iter().cloned());
                    }
                }
            }

            let post_merge = self.pipeline_cost();
            self.log_pipeline_costs();
            if let (Some(pre_a), Some(pre_m), Some(post_a), Some(post_m)) =
                (pre_merge.arith, pre_merge.memory, post_merge.arith, post_merge.memory)
            {
                assert!(
                    post_a + post_m <= pre_a + pre_m,
                    "pipeline cost increased while merging {prod}: {} -> {}",
                    pre_a + pre_m,
                    post_a + post_m,
                );
            }
        }
    }

    /// Candidate producers for the current level. A candidate is drawn from
    /// the final stage of a non-output function with at least one child;
    /// `FastMem` additionally requires all consumers to be one function,
    /// `Inline` requires the producer to be pure.
    pub(crate) fn candidates(&self, level: GroupingLevel) -> Vec<(String, String)> {
        let mut cands = Vec::new();
        for stg in self.groups.keys() {
            if self.outputs.contains(&stg.func) {
                continue;
            }
            let prod_func = self.env().get(&stg.func).expect("group stage names a known function");
            if stg.stage != prod_func.stages() - 1 {
                continue;
            }
            let Some(consumers) = self.children.get(stg) else { continue };

            let consumer_names: BTreeSet<&str> = consumers.iter().map(|s| s.func.as_str()).collect();
            if consumer_names.len() == 1 && level == GroupingLevel::FastMem {
                let cons = consumer_names.first().expect("one consumer").to_string();
                cands.push((stg.func.clone(), cons));
            } else if level == GroupingLevel::Inline && prod_func.is_pure() {
                cands.push((stg.func.clone(), String::new()));
            }
        }
        cands
    }

    /// Score every candidate (reading the cache where possible) and return
    /// the choice set with the highest aggregate benefit. Ties keep the
    /// first candidate seen.
    fn choose_candidate_grouping(
        &mut self,
        cands: &[(String, String)],
        level: GroupingLevel,
    ) -> Vec<(GroupingChoice, GroupConfig)> {
        let mut best: Vec<(GroupingChoice, GroupConfig)> = Vec::new();
        let mut best_benefit = 0i64;

        for (prod_name, _) in cands {
            let prod_func = self.env().get(prod_name).expect("candidate names a known function");
            let final_stage = FStage::new(prod_name.clone(), prod_func.stages() - 1);
            let consumers = self.children.get(&final_stage).cloned().unwrap_or_default();

            // Aggregate over every consumer of the producer: inlining happens
            // into all of them at once.
            let mut choices = Vec::new();
            for cons in consumers {
                let choice = GroupingChoice { prod: prod_name.clone(), cons };
                let config = match self.grouping_cache.get(&choice) {
                    Some(config) => config.clone(),
                    None => {
                        let config = self.evaluate_choice(&choice, level);
                        self.grouping_cache.insert(choice.clone(), config.clone());
                        config
                    }
                };
                choices.push((choice, config));
            }

            let overall_benefit = self.estimate_benefit_choices(&choices, false, true);
            for (choice, _) in &choices {
                debug!(choice = %choice, benefit = ?overall_benefit, "candidate choice");
            }
            if let Some(benefit) = overall_benefit
                && best_benefit < benefit
            {
                best = choices;
                best_benefit = benefit;
            }
        }

        for (choice, _) in &best {
            debug!(choice = %choice, benefit = best_benefit, "best choice");
        }
        best
    }

    /// Score one producer-into-consumer merge. `Inline` collapses the tile
    /// sizes to one along every dimension and marks every producer member
    /// inlined; `FastMem` searches tile configurations.
    pub(crate) fn evaluate_choice(&self, choice: &GroupingChoice, level: GroupingLevel) -> GroupConfig {
        let prod_func = self.env().get(&choice.prod).expect("choice names a known function");

        let mut merged = self.groups.get(&choice.cons).expect("consumer has a group").clone();
        for stage in 0..prod_func.stages() {
            let prod_stage = FStage::new(choice.prod.clone(), stage);
            let prod_group = self.groups.get(&prod_stage).expect("producer stage has a group");
            merged.members.extend(prod_group.members.iter().cloned());
            merged.inlined.extend(prod_group.inlined.iter().cloned());
        }

        match level {
            GroupingLevel::Inline => {
                let cons_func = self.env().get(&choice.cons.func).expect("consumer is a known function");
                let mut tile_sizes = BTreeMap::new();
                for d in &cons_func.definition(choice.cons.stage).schedule.dims {
                    tile_sizes.insert(d.var.clone(), 1);
                }
                merged.tile_sizes = tile_sizes.clone();
                for stage in 0..prod_func.stages() {
                    let prod_stage = FStage::new(choice.prod.clone(), stage);
                    let prod_group = self.groups.get(&prod_stage).expect("producer stage has a group");
                    for member in &prod_group.members {
                        merged.inlined.insert(member.func.clone());
                    }
                }
                let analysis = self.analyze_group(&merged);
                GroupConfig { tile_sizes, analysis }
            }
            GroupingLevel::FastMem => {
                let (tile_sizes, analysis) = self.find_best_tile_config(&merged);
                GroupConfig { tile_sizes, analysis }
            }
        }
    }

    /// Apply one choice: union the members (and, for `Inline`, the names) of
    /// every producer stage's group into the consumer group, install the
    /// scored tile sizes, and refresh the consumer's analysis.
    fn merge_groups(&mut self, choice: &GroupingChoice, config: &GroupConfig, level: GroupingLevel) {
        let prod_func = self.env().get(&choice.prod).expect("choice names a known function");
        for stage in 0..prod_func.stages() {
            let prod_stage = FStage::new(choice.prod.clone(), stage);
            let prod_group = self.groups.get(&prod_stage).expect("producer stage has a group").clone();
            let child_group = self.groups.get_mut(&choice.cons).expect("consumer has a group");
            child_group.members.extend(prod_group.members.iter().cloned());
            match level {
                GroupingLevel::Inline => {
                    for member in &prod_group.members {
                        child_group.inlined.insert(member.func.clone());
                    }
                }
                GroupingLevel::FastMem => {
                    child_group.inlined.extend(prod_group.inlined.iter().cloned());
                }
            }
        }
        self.groups.get_mut(&choice.cons).expect("consumer has a group").tile_sizes = config.tile_sizes.clone();

        let merged = self.groups.get(&choice.cons).expect("consumer has a group").clone();
        let analysis = self.analyze_group(&merged);
        self.group_costs.insert(choice.cons.clone(), analysis);
    }

    /// Benefit of `new` over `old`; positive prefers `new`. `None` rejects:
    /// unknown costs, a parallelism estimate under the machine floor (when
    /// `ensure_parallelism`), or redundant work (when `no_redundant_work`).
    pub fn estimate_benefit(
        &self,
        old: &GroupAnalysis,
        new: &GroupAnalysis,
        no_redundant_work: bool,
        ensure_parallelism: bool,
    ) -> Option<i64> {
        if ensure_parallelism {
            match new.parallelism {
                Some(p) if p >= self.arch.parallelism => {}
                _ => return None,
            }
        }

        let arith_benefit = old.cost.arith? - new.cost.arith?;
        if no_redundant_work && arith_benefit < 0 {
            return None;
        }
        let mem_benefit = old.cost.memory? - new.cost.memory?;
        Some(arith_benefit + mem_benefit)
    }

    /// Aggregate benefit of a set of choices sharing one producer: the sum
    /// of the new analyses (minimum parallelism) against the sum of the
    /// current analyses of every group the choices would replace.
    fn estimate_benefit_choices(
        &self,
        choices: &[(GroupingChoice, GroupConfig)],
        no_redundant_work: bool,
        ensure_parallelism: bool,
    ) -> Option<i64> {
        let mut new_analysis = GroupAnalysis { cost: Cost::zero(), parallelism: Some(i64::MAX) };
        let mut replaced: BTreeSet<FStage> = BTreeSet::new();

        for (choice, config) in choices {
            let prod_func = self.env().get(&choice.prod).expect("choice names a known function");
            for stage in 0..prod_func.stages() {
                replaced.insert(FStage::new(choice.prod.clone(), stage));
            }
            replaced.insert(choice.cons.clone());

            if config.analysis.cost.arith.is_some() {
                new_analysis.cost = new_analysis.cost.plus(&config.analysis.cost);
                new_analysis.parallelism = match (new_analysis.parallelism, config.analysis.parallelism) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    _ => None,
                };
            } else {
                new_analysis = GroupAnalysis::unknown();
                break;
            }
        }

        let mut old_analysis = GroupAnalysis { cost: Cost::zero(), parallelism: Some(i64::MAX) };
        for stg in &replaced {
            let analysis = self.group_costs.get(stg).expect("replaced group has an analysis");
            if analysis.cost.arith.is_some() {
                old_analysis.cost = old_analysis.cost.plus(&analysis.cost);
                old_analysis.parallelism = match (old_analysis.parallelism, analysis.parallelism) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    _ => None,
                };
            } else {
                old_analysis = GroupAnalysis::unknown();
                break;
            }
        }

        self.estimate_benefit(&old_analysis, &new_analysis, no_redundant_work, ensure_parallelism)
    }

    /// Reuse along each dimension of a stage: overlap-region sizes at unit
    /// tile granularity. Diagnostic only.
    pub fn evaluate_reuse(&self, stg: &FStage, prods: &BTreeSet<String>) -> BTreeMap<String, Option<i64>> {
        let func = self.env().get(&stg.func).expect("stage names a known function");
        let def = func.definition(stg.stage);

        let mut tile_sizes = BTreeMap::new();
        for d in &def.schedule.dims {
            tile_sizes.insert(d.var.clone(), 1);
        }
        let bounds = self.bounds_from_tile_sizes(stg, &tile_sizes);
        let reuse_regions = self.dep.overlap_regions(&stg.func, stg.stage, &bounds, prods, false);

        let mut reuse = BTreeMap::new();
        for (d, regions) in def.schedule.dims.iter().zip(reuse_regions) {
            let mut total: Option<i64> = Some(0);
            for region in regions.values() {
                total = opt_add(total, region.size());
            }
            reuse.insert(d.var.clone(), total);
        }
        reuse
    }

    /// Loop bounds of every member of every group, at the group's tile
    /// granularity.
    pub fn group_loop_bounds(&self) -> BTreeMap<FStage, BTreeMap<FStage, DimBounds>> {
        let mut group_bounds = BTreeMap::new();
        for (key, g) in &self.groups {
            let bounds = self.bounds_from_tile_sizes(&g.output, &g.tile_sizes);
            let prods: BTreeSet<String> = g.members.iter().map(|m| m.func.clone()).collect();
            let reg_computed = self.dep.regions_required(&g.output.func, g.output.stage, &bounds, &prods, true);

            let mut member_bounds = BTreeMap::new();
            for member in &g.members {
                let Some(region) = reg_computed.get(&member.func) else { continue };
                let func = self.env().get(&member.func).expect("member names a known function");
                let mut tile_sizes = BTreeMap::new();
                for (arg, interval) in func.args().iter().zip(region.iter()) {
                    if let Some(extent) = interval.extent() {
                        tile_sizes.insert(arg.clone(), extent);
                    }
                }
                member_bounds.insert(member.clone(), self.bounds_from_tile_sizes(member, &tile_sizes));
            }
            group_bounds.insert(key.clone(), member_bounds);
        }
        group_bounds
    }

    /// Allocation bounds of every non-output member of every group.
    pub fn group_storage_bounds(&self) -> BTreeMap<FStage, BTreeMap<String, Region>> {
        let mut storage_bounds = BTreeMap::new();
        for (key, g) in &self.groups {
            let bounds = self.bounds_from_tile_sizes(&g.output, &g.tile_sizes);
            let prods: BTreeSet<String> = g.members.iter().map(|m| m.func.clone()).collect();
            let reg_alloc = self.dep.regions_required(&g.output.func, g.output.stage, &bounds, &prods, false);

            let mut group_alloc = BTreeMap::new();
            for member in &g.members {
                if member.func == g.output.func {
                    continue;
                }
                if let Some(region) = reg_alloc.get(&member.func) {
                    group_alloc.insert(member.func.clone(), region.clone());
                }
            }
            storage_bounds.insert(key.clone(), group_alloc);
        }
        storage_bounds
    }

    /// Snapshot everything schedule synthesis needs, before any schedule is
    /// mutated.
    pub fn into_plan(self) -> SchedulePlan {
        let loop_bounds = self.group_loop_bounds();
        let storage_bounds = self.group_storage_bounds();
        let output_bounds =
            self.groups.keys().map(|key| (key.clone(), self.bounds_for_stage(key))).collect();
        SchedulePlan {
            loop_bounds,
            storage_bounds,
            output_bounds,
            pipeline_bounds: self.pipeline_bounds.clone(),
            groups: self.groups,
        }
    }

    pub fn log_pipeline_graph(&self) {
        for (stg, consumers) in &self.children {
            let list: Vec<String> = consumers.iter().map(|c| c.to_string()).collect();
            debug!(stage = %stg, children = %list.join(", "), "pipeline graph");
        }
    }

    pub fn log_pipeline_bounds(&self) {
        for (name, region) in self.pipeline_bounds {
            debug!(func = %name, region = %region, "pipeline bounds");
        }
    }

    pub fn log_pipeline_costs(&self) {
        let mut total = Cost::zero();
        for (key, g) in &self.groups {
            let analysis = self.group_costs.get(key).expect("group has an analysis");
            total = total.plus(&analysis.cost);
            debug!(group = %g.output, analysis = %analysis, "group cost");
        }
        debug!(arith = ?total.arith, memory = ?total.memory, "pipeline cost");
    }

    pub fn log_grouping(&self) {
        for g in self.groups.values() {
            debug!(group = %g, "grouping");
        }
    }
}
