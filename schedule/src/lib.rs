//! Automatic scheduler for staged image-processing pipelines.
//!
//! Given a DAG of pure and update function stages, estimates of the output
//! region sizes, and a machine cost model, [`auto_schedule`] decides
//!
//! 1. which producers to inline into their consumers,
//! 2. how to partition the survivors into groups computed together in tiles,
//! 3. and, per group, the tile sizes and loop transformations (split,
//!    reorder, vectorize, parallelize, compute-at) that minimize an
//!    estimated arithmetic-plus-memory cost under a parallelism floor.
//!
//! # Module organization
//!
//! - [`graph`] - stage identity and the producer/consumer pipeline graph
//! - [`dependence`] - regions of transitive producers needed for a region of
//!   a stage
//! - [`costs`] - region cost model with a cache-footprint penalty curve
//! - [`partitioner`] - greedy fixpoint grouping with per-choice caching
//! - [`synthesis`] - emission of the concrete loop transformations
//! - [`validate`] - rejection of partially scheduled inputs
//! - [`arch`] - machine parameters and vector widths

pub mod arch;
pub mod costs;
pub mod dependence;
pub mod error;
pub mod graph;
pub mod locality;
pub mod partitioner;
pub mod synthesis;
pub mod validate;

#[cfg(test)]
pub mod test;

pub use arch::{MachineParams, Target};
pub use costs::{Cost, RegionCosts};
pub use dependence::DependenceAnalysis;
pub use error::{Error, Result};
pub use graph::FStage;
pub use partitioner::{
    Group, GroupAnalysis, GroupConfig, GroupingChoice, GroupingLevel, Partitioner, SchedulePlan,
};

use tessera_ir::{Environment, compute_function_value_bounds};
use tracing::warn;

use crate::error::UnknownOutputSnafu;
use snafu::ensure;

/// Generate schedules for every function required to compute `outputs`.
///
/// On success the schedule has been applied to the functions in `env`
/// (store/compute levels, dims, splits, vectorize and parallel markers) and
/// the returned string is the transcript of every scheduling call made, in
/// emission order.
///
/// Outputs without complete integer estimates degrade gracefully: every
/// stage is computed at root and the transcript is empty.
pub fn auto_schedule(
    env: &mut Environment,
    outputs: &[String],
    target: &Target,
    arch: &MachineParams,
) -> Result<String> {
    for name in outputs {
        ensure!(env.contains(name), UnknownOutputSnafu { name: name.clone() });
    }
    for f in env.funcs.values() {
        validate::validate_no_partial_schedules(f)?;
    }

    let order = graph::realization_order(env, outputs);
    let func_val_bounds = compute_function_value_bounds(&order, env);

    if !validate::outputs_have_estimates(env, outputs) {
        warn!("missing estimates on pipeline outputs; computing every stage at root");
        validate::set_schedule_defaults(env);
        return Ok(String::new());
    }

    let plan = {
        let dep = DependenceAnalysis::new(env, func_val_bounds);
        let pipeline_bounds = dep.pipeline_bounds(outputs);
        let costs = RegionCosts::new(dep.env);
        let mut part = Partitioner::new(&pipeline_bounds, arch, &dep, &costs, outputs);

        part.log_pipeline_graph();
        part.log_pipeline_bounds();

        part.initialize_groups();
        part.log_pipeline_costs();

        part.group(GroupingLevel::Inline);
        part.log_grouping();

        part.clear_grouping_cache();
        part.group(GroupingLevel::FastMem);

        part.log_pipeline_costs();
        part.log_grouping();

        part.into_plan()
    };

    synthesis::generate_cpu_schedule(env, &plan, target, arch)
}
