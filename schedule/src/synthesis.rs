//! Schedule synthesis.
//!
//! Walks the final grouping and turns it into concrete loop transformations
//! on every surviving stage: spatial reordering, tile splits, vectorization,
//! parallelization, and compute-at placement of group members. Every emitted
//! directive is applied to the function's schedule state and appended to a
//! transcript, which is returned in emission order.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use tessera_ir::{DimBounds, Environment};

use crate::arch::{MachineParams, Target};
use crate::error::Result;
use crate::graph::{FStage, can_parallelize_rvar};
use crate::locality::analyze_spatial_locality;
use crate::partitioner::{Group, SchedulePlan};

/// Textual handle a stage's directives are logged under.
fn stage_handle(func: &str, stage: usize) -> String {
    if stage == 0 { func.to_string() } else { format!("{func}.update({})", stage - 1) }
}

/// Extents of each dimension, unknown where a bound is not constant.
pub fn bounds_to_estimates(bounds: &DimBounds) -> BTreeMap<String, Option<i64>> {
    bounds.iter().map(|(var, bound)| (var.clone(), bound.extent())).collect()
}

/// Apply the plan to the environment and return the transcript of every
/// scheduling call made, in order.
pub fn generate_cpu_schedule(
    env: &mut Environment,
    plan: &SchedulePlan,
    target: &Target,
    arch: &MachineParams,
) -> Result<String> {
    let mut sched = String::new();

    // Inlined functions first, so group scheduling never touches them.
    let mut inlines = BTreeSet::new();
    for g in plan.groups.values() {
        inlines.extend(g.inlined.iter().cloned());
    }
    for name in &inlines {
        if let Some(f) = env.get_mut(name) {
            f.compute_inline();
            sched.push_str(&format!("{name}.compute_inline();\n"));
        }
    }

    for (key, g) in &plan.groups {
        generate_group_schedule(env, plan, key, g, target, arch, &inlines, &mut sched)?;
    }

    Ok(sched)
}

#[allow(clippy::too_many_arguments)]
fn generate_group_schedule(
    env: &mut Environment,
    plan: &SchedulePlan,
    group_key: &FStage,
    g: &Group,
    target: &Target,
    arch: &MachineParams,
    inlines: &BTreeSet<String>,
    sched: &mut String,
) -> Result<()> {
    let out_name = g.output.func.clone();
    let handle = stage_handle(&out_name, g.output.stage);

    if g.output.stage == 0 {
        env.get_mut(&out_name).expect("group output is a known function").compute_root();
        sched.push_str(&format!("{out_name}.compute_root();\n"));
    }

    if env.get(&out_name).expect("group output is a known function").has_extern_definition() {
        assert_eq!(g.members.len(), 1, "extern stages cannot share a group");
        return Ok(());
    }

    let stg_bounds = plan.output_bounds.get(group_key).expect("plan carries bounds for every group");
    let mut stg_estimates = bounds_to_estimates(stg_bounds);
    let mut rvars = rvar_dims(env, &g.output);

    let empty = BTreeMap::new();
    let storage = plan.storage_bounds.get(group_key).unwrap_or(&empty);

    // Reorder for spatial locality before anything else touches the dims.
    let strides = analyze_spatial_locality(env, &plan.pipeline_bounds, &g.output, storage, inlines);
    reorder_dims(env, &g.output, &handle, strides, sched)?;

    // Tile the output: split every dim with a useful tile size, then move
    // all the inner halves inside all the outer halves.
    let dim_vars = dim_names(env, &g.output);
    let mut inner_dims: Vec<String> = Vec::new();
    let mut outer_dims: Vec<String> = Vec::new();
    for var in dim_vars {
        let tile_size = g.tile_sizes.get(&var).copied();
        let estimate = stg_estimates.get(&var).copied().flatten();
        match (tile_size, estimate) {
            (Some(size), Some(extent)) if extent > size => {
                if size > 1 {
                    let (inner, outer) =
                        split_dim(env, &g.output, &handle, &var, size, "_i", "_o", &mut stg_estimates, sched)?;
                    if rvars.remove(&var) {
                        rvars.insert(inner.clone());
                        rvars.insert(outer.clone());
                    }
                    inner_dims.push(inner);
                    outer_dims.push(outer);
                } else {
                    outer_dims.push(var);
                }
            }
            _ => inner_dims.push(var),
        }
    }
    if !outer_dims.is_empty() {
        let ordering: Vec<String> = inner_dims.iter().chain(outer_dims.iter()).cloned().collect();
        schedule_of(env, &g.output).reorder(&ordering)?;
        sched.push_str(&format!("{handle}.reorder({});\n", ordering.join(",")));
    }

    vectorize_stage(env, &g.output, &handle, target, &mut rvars, &mut stg_estimates, sched)?;

    // Parallelize outer loops until the machine is saturated. A serial rvar
    // encountered on the way is remembered and demoted inside each parallel
    // loop.
    let mut def_par: i64 = 1;
    let mut seq_var: Option<String> = None;
    for var in dim_names(env, &g.output).into_iter().rev() {
        let parallelizable = {
            let func = env.get(&out_name).expect("group output is a known function");
            let def = func.definition(g.output.stage);
            !rvars.contains(&var) || can_parallelize_rvar(&var, &out_name, def)
        };
        if !parallelizable {
            if seq_var.is_none() {
                seq_var = Some(var);
            }
            continue;
        }
        if def_par >= arch.parallelism {
            break;
        }
        let Some(Some(extent)) = stg_estimates.get(&var).copied() else { break };
        if let Some(seq) = &seq_var {
            schedule_of(env, &g.output).reorder(&[seq.clone(), var.clone()])?;
            sched.push_str(&format!("{handle}.reorder({seq},{var});\n"));
        }
        schedule_of(env, &g.output).parallel(&var)?;
        sched.push_str(&format!("{handle}.parallel({var});\n"));
        def_par *= extent;
    }
    if def_par < arch.parallelism {
        warn!(stage = %handle, achieved = def_par, floor = arch.parallelism, "insufficient parallelism");
    }

    // The loop level group members are computed at: the innermost tile-outer
    // loop of the output, if any dimension was tiled.
    let tile_inner_var = if outer_dims.is_empty() {
        None
    } else {
        let dims = dim_names(env, &g.output);
        Some(dims[dims.len() - outer_dims.len()].clone())
    };

    for mem in &g.members {
        if g.inlined.contains(&mem.func) || mem.func == out_name {
            continue;
        }
        let mem_handle = stage_handle(&mem.func, mem.stage);
        let mem_bounds = plan
            .loop_bounds
            .get(group_key)
            .and_then(|bounds| bounds.get(mem))
            .unwrap_or_else(|| panic!("plan carries loop bounds for member {mem}"));
        let mut mem_estimates = bounds_to_estimates(mem_bounds);
        let mut mem_rvars = rvar_dims(env, mem);

        if mem.stage == 0 {
            match &tile_inner_var {
                Some(tile_var) => {
                    env.get_mut(&mem.func)
                        .expect("member is a known function")
                        .compute_at(out_name.as_str(), tile_var.as_str());
                    sched.push_str(&format!("{}.compute_at({out_name},{tile_var});\n", mem.func));
                }
                None => {
                    warn!(member = %mem.func, group = %out_name, "degenerate tiling, no dimensions are tiled");
                    warn!(member = %mem.func, "computing at root instead");
                    env.get_mut(&mem.func).expect("member is a known function").compute_root();
                    sched.push_str(&format!("{}.compute_root();\n", mem.func));
                }
            }
        }

        let mem_strides = analyze_spatial_locality(env, &plan.pipeline_bounds, mem, storage, inlines);
        reorder_dims(env, mem, &mem_handle, mem_strides, sched)?;
        vectorize_stage(env, mem, &mem_handle, target, &mut mem_rvars, &mut mem_estimates, sched)?;
    }

    Ok(())
}

fn schedule_of<'a>(env: &'a mut Environment, stg: &FStage) -> &'a mut tessera_ir::StageSchedule {
    &mut env
        .get_mut(&stg.func)
        .expect("stage names a known function")
        .definition_mut(stg.stage)
        .schedule
}

fn dim_names(env: &Environment, stg: &FStage) -> Vec<String> {
    env.get(&stg.func).expect("stage names a known function").definition(stg.stage).schedule.dim_names()
}

fn rvar_dims(env: &Environment, stg: &FStage) -> BTreeSet<String> {
    env.get(&stg.func)
        .expect("stage names a known function")
        .definition(stg.stage)
        .schedule
        .dims
        .iter()
        .filter(|d| d.is_rvar())
        .map(|d| d.var.clone())
        .collect()
}

/// Reorder a stage's dims by ascending access stride. Pure dims are freely
/// ordered; reduction dims keep their relative order and cut in as soon as
/// the cheapest remaining pure stride exceeds the first unplaced reduction
/// stride.
fn reorder_dims(
    env: &mut Environment,
    stg: &FStage,
    handle: &str,
    mut strides: BTreeMap<String, i64>,
    sched: &mut String,
) -> Result<()> {
    let dims: Vec<(String, bool)> = {
        let func = env.get(&stg.func).expect("stage names a known function");
        func.definition(stg.stage).schedule.dims.iter().map(|d| (d.var.clone(), d.is_pure())).collect()
    };
    for (var, _) in &dims {
        assert!(strides.contains_key(var), "no stride computed for dim {var}");
    }

    let mut order: Vec<String> = Vec::new();
    while !strides.is_empty() {
        let mut min_pure: (i64, Option<&String>) = (i64::MAX, None);
        for (var, is_pure) in &dims {
            if let Some(&stride) = strides.get(var)
                && *is_pure
                && stride < min_pure.0
            {
                min_pure = (stride, Some(var));
            }
        }

        // Reduction dims cannot be reordered relative to each other; only
        // the first unplaced one competes.
        let mut min_impure: (i64, Option<&String>) = (i64::MAX, None);
        for (var, is_pure) in &dims {
            if let Some(&stride) = strides.get(var)
                && !*is_pure
            {
                min_impure = (stride, Some(var));
                break;
            }
        }

        let next = if min_impure.0 < min_pure.0 { min_impure.1 } else { min_pure.1 };
        let Some(next) = next else { break };
        let next = next.clone();
        strides.remove(&next);
        order.push(next);
    }

    if order.is_empty() {
        return Ok(());
    }
    schedule_of(env, stg).reorder(&order)?;
    sched.push_str(&format!("{handle}.reorder({});\n", order.join(",")));
    Ok(())
}

/// Split `var` by `factor`, creating `var<in_suffix>` inside
/// `var<out_suffix>`, and fold the split into the estimate map.
#[allow(clippy::too_many_arguments)]
fn split_dim(
    env: &mut Environment,
    stg: &FStage,
    handle: &str,
    var: &str,
    factor: i64,
    in_suffix: &str,
    out_suffix: &str,
    estimates: &mut BTreeMap<String, Option<i64>>,
    sched: &mut String,
) -> Result<(String, String)> {
    let inner = format!("{var}{in_suffix}");
    let outer = format!("{var}{out_suffix}");
    sched.push_str(&format!("Var {inner}(\"{inner}\");\n"));
    sched.push_str(&format!("Var {outer}(\"{outer}\");\n"));

    schedule_of(env, stg).split(var, &outer, &inner, factor)?;
    sched.push_str(&format!("{handle}.split({var},{outer},{inner},{factor});\n"));

    let old = estimates.get(var).copied().flatten().expect("split dim has a known estimate");
    estimates.insert(inner.clone(), Some(factor));
    estimates.insert(outer.clone(), Some((old + factor - 1) / factor));
    estimates.remove(var);

    Ok((inner, outer))
}

/// Vectorize the innermost dim whose estimate covers the natural vector
/// width and which is either pure or a parallelizable rvar: split it by the
/// vector length and vectorize the inner half.
fn vectorize_stage(
    env: &mut Environment,
    stg: &FStage,
    handle: &str,
    target: &Target,
    rvars: &mut BTreeSet<String>,
    estimates: &mut BTreeMap<String, Option<i64>>,
    sched: &mut String,
) -> Result<()> {
    let picked: Option<(usize, String)> = {
        let func = env.get(&stg.func).expect("stage names a known function");
        let def = func.definition(stg.stage);
        let vec_len =
            func.output_types().iter().map(|t| target.natural_vector_size(*t)).max().unwrap_or(0);
        if vec_len <= 1 {
            return Ok(());
        }
        def.schedule
            .dims
            .iter()
            .enumerate()
            .find(|(_, d)| {
                let can_vectorize =
                    !rvars.contains(&d.var) || can_parallelize_rvar(&d.var, &stg.func, def);
                let extent = estimates.get(&d.var).copied().flatten();
                can_vectorize && extent.is_some_and(|e| e >= vec_len)
            })
            .map(|(i, d)| (i, d.var.clone()))
    };

    let Some((dim_index, var)) = picked else { return Ok(()) };
    let vec_len = {
        let func = env.get(&stg.func).expect("stage names a known function");
        func.output_types().iter().map(|t| target.natural_vector_size(*t)).max().unwrap_or(0)
    };

    let (inner, outer) = split_dim(env, stg, handle, &var, vec_len, "_vi", "_vo", estimates, sched)?;
    schedule_of(env, stg).vectorize(&inner)?;
    sched.push_str(&format!("{handle}.vectorize({inner});\n"));

    if rvars.remove(&var) {
        rvars.insert(inner);
        rvars.insert(outer);
    }
    if dim_index > 0 {
        warn!(stage = %handle, dim = %var, "vectorizing an outer loop dimension");
    }
    Ok(())
}
