//! Group cost analysis.
//!
//! Scores a group at a chosen tile configuration: per-tile arithmetic from
//! the cost model, per-tile memory from footprint-weighted load counts, both
//! scaled by the tile count; plus the parallelism the tiling exposes.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use tessera_ir::{Interval, Region};

use crate::graph::{can_parallelize_rvar, stage_parents};
use crate::partitioner::{Group, GroupAnalysis, Partitioner};

/// Whether loads from outside the tile are charged at their steady-state
/// footprint instead of their first-touch footprint. The reuse-aware branch
/// is kept but disabled: without a reuse model the first-touch charge is the
/// safer estimate.
const MODEL_REUSE: bool = false;

impl Partitioner<'_> {
    /// Estimated cost and parallelism of computing `g` with its tile sizes.
    /// Any unknown quantity on the way poisons the whole analysis.
    pub fn analyze_group(&self, g: &Group) -> GroupAnalysis {
        let env = self.dep.env;
        let out_func = env.get(&g.output.func).expect("group output names a known function");
        let def = out_func.definition(g.output.stage);

        let group_members: BTreeSet<String> = g.members.iter().map(|m| m.func.clone()).collect();
        let mut group_inputs: BTreeSet<String> = BTreeSet::new();
        for member in &g.members {
            let func = env.get(&member.func).expect("member names a known function");
            for parent in stage_parents(func, member.stage) {
                if !group_members.contains(&parent) {
                    group_inputs.insert(parent);
                }
            }
        }

        // Tile count over the output's bounds, and the parallelism the tile
        // grid exposes. Pure dims are parallelizable by construction; rvars
        // only when the dependence pattern allows it.
        let stg_bounds = self.bounds_for_stage(&g.output);
        let mut estimate_tiles: i64 = 1;
        let mut parallelism: i64 = 1;
        for d in &def.schedule.dims {
            let Some(&size) = g.tile_sizes.get(&d.var) else { continue };
            let Some(extent) = stg_bounds.get(&d.var).and_then(Interval::extent) else {
                return GroupAnalysis::unknown();
            };
            let dim_tiles = (extent + size - 1) / size;
            estimate_tiles *= dim_tiles;
            if !d.is_rvar() || can_parallelize_rvar(&d.var, &g.output.func, def) {
                parallelism *= dim_tiles;
            }
        }

        // Regions needed for one tile: everything allocated, and everything
        // computed (the group's own output region excluded).
        let tile_bounds = self.bounds_from_tile_sizes(&g.output, &g.tile_sizes);
        let alloc_regions =
            self.dep.regions_required(&g.output.func, g.output.stage, &tile_bounds, &group_members, false);
        let compute_regions =
            self.dep.regions_required(&g.output.func, g.output.stage, &tile_bounds, &group_members, true);

        let mut group_reg: BTreeMap<String, Region> = BTreeMap::new();
        let mut prod_reg: BTreeMap<String, Region> = BTreeMap::new();
        let mut input_reg: BTreeMap<String, Region> = BTreeMap::new();
        for (name, region) in &compute_regions {
            if group_members.contains(name) && *name != g.output.func {
                group_reg.insert(name.clone(), region.clone());
            } else if group_inputs.contains(name) {
                if env.contains(name) {
                    prod_reg.insert(name.clone(), region.clone());
                } else {
                    input_reg.insert(name.clone(), region.clone());
                }
            }
        }

        let tile_cost = self.costs.region_cost(&group_reg, &g.inlined);
        if !tile_cost.is_known() {
            return GroupAnalysis::unknown();
        }
        let out_cost =
            self.costs.stage_region_cost(&g.output.func, g.output.stage, &tile_bounds, &g.inlined);
        if !out_cost.is_known() {
            return GroupAnalysis::unknown();
        }
        for region in alloc_regions.values() {
            if region.size().is_none() {
                return GroupAnalysis::unknown();
            }
        }
        let per_tile_arith = tile_cost.arith.expect("checked") + out_cost.arith.expect("checked");

        let mut load_costs = self.costs.detailed_load_costs(&group_reg, &g.inlined);
        let out_loads =
            self.costs.stage_detailed_load_costs(&g.output.func, g.output.stage, &tile_bounds, &g.inlined);
        crate::costs::combine_load_costs(&mut load_costs, out_loads);

        // Extent of one output tile, used for the output's own footprint.
        let mut out_tile_extent = Region::new();
        if g.output.stage == 0 {
            for arg in out_func.args() {
                let interval = tile_bounds.get(arg).cloned().unwrap_or_else(Interval::everything);
                out_tile_extent.push(interval);
            }
        }

        // Footprint-weighted memory cost. The penalty curve is linear in the
        // footprint and clamps at `balance`, which sits roughly where the
        // footprint exceeds the last-level cache.
        let load_slope = self.arch.balance as f64 / self.arch.last_level_cache_size as f64;
        let mut per_tile_memory: i64 = 0;
        for (name, load) in &load_costs {
            assert!(
                !g.inlined.contains(name),
                "inlined function {name} must not surface in the load costs"
            );
            let Some(load) = *load else { return GroupAnalysis::unknown() };
            let alloc_reg = alloc_regions
                .get(name)
                .unwrap_or_else(|| panic!("no allocation region for loaded function {name}"));

            let is_member = group_members.contains(name);
            let is_output = *name == g.output.func;

            // The allocated region is the conservative footprint: loads can
            // touch any of it.
            let footprint = if is_member && !is_output {
                self.costs.region_size(name, alloc_reg)
            } else {
                let pl_bounds = self
                    .pipeline_bounds
                    .get(name)
                    .unwrap_or_else(|| panic!("no pipeline bounds for loaded function {name}"));
                let (initial_footprint, footprint) = if !env.contains(name) {
                    (self.costs.input_region_size(name, pl_bounds), self.costs.input_region_size(name, alloc_reg))
                } else if is_output {
                    assert!(is_member, "output {name} must be a member of its own group");
                    (self.costs.region_size(name, pl_bounds), self.costs.region_size(name, &out_tile_extent))
                } else {
                    (self.costs.region_size(name, pl_bounds), self.costs.region_size(name, alloc_reg))
                };

                if MODEL_REUSE {
                    let Some(initial) = initial_footprint else { return GroupAnalysis::unknown() };
                    let Some(steady) = footprint else { return GroupAnalysis::unknown() };
                    let initial_factor =
                        (1.0 + initial as f64 * load_slope).min(self.arch.balance as f64).trunc() as i64;
                    per_tile_memory += initial_factor * steady;
                    footprint
                } else {
                    initial_footprint
                }
            };

            let Some(footprint) = footprint else { return GroupAnalysis::unknown() };
            let cost_factor = (1.0 + footprint as f64 * load_slope).min(self.arch.balance as f64).trunc() as i64;
            per_tile_memory += cost_factor * load;
        }

        debug!(
            group = %g.output,
            per_tile_arith,
            per_tile_memory,
            estimate_tiles,
            parallelism,
            "group analysis"
        );

        GroupAnalysis {
            cost: crate::costs::Cost {
                arith: Some(per_tile_arith * estimate_tiles),
                memory: Some(per_tile_memory * estimate_tiles),
            },
            parallelism: Some(parallelism),
        }
    }
}
