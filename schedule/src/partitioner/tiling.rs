//! Tile-size enumeration and search.

use std::collections::BTreeMap;

use tracing::debug;

use crate::graph::FStage;
use crate::partitioner::{Group, GroupAnalysis, Partitioner};

/// Candidate tile sizes. The innermost dimension is floored at 64 so a tile
/// always holds enough values to vectorize and prefetch.
const SIZE_VARIANTS: [i64; 8] = [1, 4, 8, 16, 32, 64, 128, 256];
const MIN_INNER_DIM_SIZE: i64 = 64;

/// Enumerate tile configurations over the given pure loop vars (innermost
/// first). Three families, duplicates elided:
///
/// 1. skewed: one pivot dimension takes each candidate size, dims inside the
///    pivot take the maximum size, dims outside take 1;
/// 2. square: every dimension takes the same size;
/// 3. reorder masks: each subset of dims takes 1 (the innermost floored),
///    the rest are left untiled.
pub fn tile_configurations(tile_vars: &[String]) -> Vec<BTreeMap<String, i64>> {
    let mut configs: Vec<BTreeMap<String, i64>> = Vec::new();
    let push_unique = |configs: &mut Vec<BTreeMap<String, i64>>, tiling: BTreeMap<String, i64>| {
        if !tiling.is_empty() && !configs.contains(&tiling) {
            configs.push(tiling);
        }
    };

    for (pivot, pivot_var) in tile_vars.iter().enumerate() {
        for &size in &SIZE_VARIANTS {
            let mut tiling = BTreeMap::new();
            tiling.insert(pivot_var.clone(), if pivot == 0 { size.max(MIN_INNER_DIM_SIZE) } else { size });
            for (j, var) in tile_vars.iter().enumerate() {
                if j < pivot {
                    tiling.insert(var.clone(), *SIZE_VARIANTS.last().expect("non-empty size set"));
                } else if j > pivot {
                    tiling.insert(var.clone(), SIZE_VARIANTS[0]);
                }
            }
            push_unique(&mut configs, tiling);
        }
    }

    for &size in &SIZE_VARIANTS {
        let mut tiling = BTreeMap::new();
        for (j, var) in tile_vars.iter().enumerate() {
            tiling.insert(var.clone(), if j == 0 { size.max(MIN_INNER_DIM_SIZE) } else { size });
        }
        push_unique(&mut configs, tiling);
    }

    for mask in 0..(1usize << tile_vars.len()) {
        let mut tiling = BTreeMap::new();
        for (j, var) in tile_vars.iter().enumerate() {
            if (mask >> j) & 1 == 1 {
                tiling.insert(var.clone(), if j == 0 { MIN_INNER_DIM_SIZE } else { 1 });
            }
        }
        push_unique(&mut configs, tiling);
    }

    configs
}

impl Partitioner<'_> {
    /// Tile configurations for a stage: its pure dims are tiled, reduction
    /// dims are left alone.
    pub fn generate_tile_configs(&self, stg: &FStage) -> Vec<BTreeMap<String, i64>> {
        let func = self.dep.env.get(&stg.func).expect("stage names a known function");
        let tile_vars: Vec<String> = func
            .definition(stg.stage)
            .schedule
            .dims
            .iter()
            .filter(|d| !d.is_rvar())
            .map(|d| d.var.clone())
            .collect();
        tile_configurations(&tile_vars)
    }

    /// Evaluate "no tiling" first, then each configuration, keeping any that
    /// improves on the running best.
    pub fn find_best_tile_config(&self, g: &Group) -> (BTreeMap<String, i64>, GroupAnalysis) {
        let mut no_tile = g.clone();
        no_tile.tile_sizes = BTreeMap::new();
        let no_tile_analysis = self.analyze_group(&no_tile);

        let mut best_config = BTreeMap::new();
        let mut best_analysis = no_tile_analysis;
        if best_analysis.cost.arith.is_none() {
            return (best_config, best_analysis);
        }

        for config in self.generate_tile_configs(&g.output) {
            let mut candidate = g.clone();
            candidate.tile_sizes = config.clone();
            let analysis = self.analyze_group(&candidate);

            let benefit = self.estimate_benefit(&best_analysis, &analysis, false, true);
            if let Some(benefit) = benefit
                && benefit > 0
            {
                best_config = config;
                best_analysis = analysis;
            }
        }

        debug!(group = %g.output, config = ?best_config, analysis = %best_analysis, "best tile config");
        (best_config, best_analysis)
    }
}
