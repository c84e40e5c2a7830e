//! Unit tests for the partitioner.

use std::collections::BTreeSet;

use tessera_ir::FuncValueBounds;

use crate::arch::MachineParams;
use crate::costs::{Cost, RegionCosts};
use crate::dependence::DependenceAnalysis;
use crate::graph::FStage;
use crate::partitioner::{GroupAnalysis, GroupingChoice, GroupingLevel, Partitioner};
use crate::test::helpers::{histogram_pipeline, pointwise_pipeline};

macro_rules! with_partitioner {
    ($pipeline:expr, |$part:ident| $body:block) => {{
        let (env, outputs) = $pipeline;
        let dep = DependenceAnalysis::new(&env, FuncValueBounds::new());
        let pipeline_bounds = dep.pipeline_bounds(&outputs);
        let costs = RegionCosts::new(&env);
        let arch = MachineParams::generic();
        #[allow(unused_mut)]
        let mut $part = Partitioner::new(&pipeline_bounds, &arch, &dep, &costs, &outputs);
        $body
    }};
}

#[test]
fn every_stage_starts_in_a_singleton_group() {
    with_partitioner!(histogram_pipeline(), |part| {
        assert_eq!(part.groups.len(), 3);
        for (key, group) in &part.groups {
            assert_eq!(&group.output, key);
            assert_eq!(group.members, vec![key.clone()]);
            assert!(group.inlined.is_empty());
        }
    });
}

#[test]
fn initialize_groups_installs_analyses_and_clears_cache() {
    with_partitioner!(pointwise_pipeline(), |part| {
        part.initialize_groups();
        assert_eq!(part.group_costs.len(), part.groups.len());
        assert!(part.grouping_cache.is_empty());
        let out_cost = &part.group_costs[&FStage::new("out", 0)];
        assert!(out_cost.cost.is_known());
    });
}

#[test]
fn inline_candidates_are_pure_non_outputs() {
    with_partitioner!(pointwise_pipeline(), |part| {
        let cands = part.candidates(GroupingLevel::Inline);
        let names: Vec<&str> = cands.iter().map(|(prod, _)| prod.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    });
}

#[test]
fn impure_producers_are_not_inline_candidates() {
    with_partitioner!(histogram_pipeline(), |part| {
        let cands = part.candidates(GroupingLevel::Inline);
        assert!(cands.is_empty());
    });
}

#[test]
fn fast_mem_candidates_come_from_final_stages() {
    with_partitioner!(histogram_pipeline(), |part| {
        let cands = part.candidates(GroupingLevel::FastMem);
        // Only hist's final (update) stage is offered; the pure stage
        // piggybacks through co-scheduling.
        assert_eq!(cands, vec![("hist".to_string(), "cdf".to_string())]);
    });
}

#[test]
fn parallelism_floor_rejects_benefit() {
    with_partitioner!(pointwise_pipeline(), |part| {
        let old = GroupAnalysis { cost: Cost { arith: Some(1000), memory: Some(1000) }, parallelism: Some(64) };
        let new = GroupAnalysis { cost: Cost { arith: Some(10), memory: Some(10) }, parallelism: Some(4) };
        // Machine wants 16-way parallelism; 4 is under the floor.
        assert_eq!(part.estimate_benefit(&old, &new, false, true), None);
        // Without the floor the benefit is the full cost delta.
        assert_eq!(part.estimate_benefit(&old, &new, false, false), Some(1980));
    });
}

#[test]
fn unknown_costs_suppress_benefit() {
    with_partitioner!(pointwise_pipeline(), |part| {
        let known = GroupAnalysis { cost: Cost { arith: Some(100), memory: Some(100) }, parallelism: Some(64) };
        let unknown = GroupAnalysis { cost: Cost { arith: None, memory: Some(10) }, parallelism: Some(64) };
        assert_eq!(part.estimate_benefit(&known, &unknown, false, false), None);
        assert_eq!(part.estimate_benefit(&unknown, &known, false, false), None);
    });
}

#[test]
fn redundant_work_gate_rejects_arith_regressions() {
    with_partitioner!(pointwise_pipeline(), |part| {
        let old = GroupAnalysis { cost: Cost { arith: Some(100), memory: Some(1000) }, parallelism: Some(64) };
        let new = GroupAnalysis { cost: Cost { arith: Some(150), memory: Some(10) }, parallelism: Some(64) };
        assert_eq!(part.estimate_benefit(&old, &new, true, false), None);
        assert_eq!(part.estimate_benefit(&old, &new, false, false), Some(940));
    });
}

#[test]
fn inline_pass_folds_the_pointwise_chain() {
    with_partitioner!(pointwise_pipeline(), |part| {
        part.initialize_groups();
        part.group(GroupingLevel::Inline);

        assert_eq!(part.groups.len(), 1);
        let group = &part.groups[&FStage::new("out", 0)];
        assert_eq!(group.inlined, BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert_eq!(group.members.len(), 3);

        // The merged producers' bookkeeping is gone.
        assert!(!part.group_costs.contains_key(&FStage::new("a", 0)));
        assert!(!part.children.contains_key(&FStage::new("b", 0)));
    });
}

#[test]
fn inline_pass_is_idempotent() {
    with_partitioner!(pointwise_pipeline(), |part| {
        part.initialize_groups();
        part.group(GroupingLevel::Inline);
        let groups = part.groups.clone();
        part.group(GroupingLevel::Inline);
        assert_eq!(part.groups, groups);
    });
}

#[test]
fn fast_mem_after_inline_reaches_a_fixpoint() {
    with_partitioner!(pointwise_pipeline(), |part| {
        part.initialize_groups();
        part.group(GroupingLevel::Inline);
        part.clear_grouping_cache();
        part.group(GroupingLevel::FastMem);
        let groups = part.groups.clone();
        part.group(GroupingLevel::FastMem);
        assert_eq!(part.groups, groups);
    });
}

#[test]
fn evaluate_choice_inline_collapses_tiles() {
    with_partitioner!(pointwise_pipeline(), |part| {
        part.initialize_groups();
        let choice = GroupingChoice { prod: "a".to_string(), cons: FStage::new("b", 0) };
        let config = part.evaluate_choice(&choice, GroupingLevel::Inline);
        assert!(config.tile_sizes.values().all(|&size| size == 1));
    });
}

#[test]
fn merging_keeps_pipeline_cost_monotonic() {
    with_partitioner!(pointwise_pipeline(), |part| {
        part.initialize_groups();
        let before = part.pipeline_cost();
        part.group(GroupingLevel::Inline);
        part.clear_grouping_cache();
        part.group(GroupingLevel::FastMem);
        let after = part.pipeline_cost();
        let total = |c: &Cost| c.arith.unwrap() + c.memory.unwrap();
        assert!(total(&after) <= total(&before));
    });
}

#[test]
fn histogram_stages_stay_co_scheduled() {
    with_partitioner!(histogram_pipeline(), |part| {
        part.initialize_groups();
        part.group(GroupingLevel::Inline);
        // Nothing inlines: hist is impure, and cdf is the output.
        assert_eq!(part.groups.len(), 3);
        part.clear_grouping_cache();
        part.group(GroupingLevel::FastMem);
        // If hist merged anywhere, both its stages moved together.
        for group in part.groups.values() {
            let has_pure = group.members.contains(&FStage::new("hist", 0));
            let has_update = group.members.contains(&FStage::new("hist", 1));
            assert_eq!(has_pure, has_update, "hist stages split across groups");
        }
    });
}

#[test]
fn cache_invalidation_drops_the_merged_neighborhood() {
    with_partitioner!(pointwise_pipeline(), |part| {
        part.initialize_groups();
        part.group(GroupingLevel::Inline);
        // Whatever survived in the cache may not reference a stage that no
        // longer owns a group.
        for choice in part.grouping_cache.keys() {
            assert!(part.groups.contains_key(&choice.cons), "stale cache entry for {choice}");
        }
    });
}

#[test]
fn evaluate_reuse_reports_per_dimension_totals() {
    with_partitioner!(pointwise_pipeline(), |part| {
        let prods: BTreeSet<String> = ["a", "b", "in"].iter().map(|s| s.to_string()).collect();
        let reuse = part.evaluate_reuse(&FStage::new("out", 0), &prods);
        assert_eq!(reuse.len(), 2);
        assert!(reuse.contains_key("x") && reuse.contains_key("y"));
    });
}
