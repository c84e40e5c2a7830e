//! Input validation.
//!
//! The emitted schedule assumes a clean baseline: no user splits or bounds,
//! serial loops everywhere, no specializations, and dims in definition
//! order. Anything else is rejected before any state is built.

use snafu::ensure;

use tessera_ir::{Environment, Function};

use crate::error::{
    NonSerialDimSnafu, PartialBoundsSnafu, PartialSplitsSnafu, ReorderedDimSnafu, Result, SpecializationsSnafu,
};

/// Reject a function with a partially specified schedule.
pub fn validate_no_partial_schedules(f: &Function) -> Result<()> {
    let func = f.name().to_string();
    for stage in 0..f.stages() {
        let def = f.definition(stage);
        let schedule = &def.schedule;

        ensure!(schedule.splits.is_empty(), PartialSplitsSnafu { func: func.clone(), stage });
        ensure!(schedule.bounds.is_empty(), PartialBoundsSnafu { func: func.clone(), stage });
        for d in &schedule.dims {
            ensure!(
                d.for_type == tessera_ir::ForType::Serial,
                NonSerialDimSnafu { func: func.clone(), stage, dim: d.var.clone() }
            );
        }

        if f.has_extern_definition() {
            continue;
        }

        if stage == 0 {
            // Specializations hang off the function, so the initial stage is
            // the only place to check.
            ensure!(def.specializations.is_empty(), SpecializationsSnafu { func: func.clone() });

            // The dims must be the left-hand-side args in definition order.
            assert_eq!(
                schedule.dims.len(),
                def.args.len(),
                "pure stage of {func} must have one dim per argument"
            );
            for (d, arg) in schedule.dims.iter().zip(def.args.iter()) {
                let arg_name = arg.as_var().expect("pure definition args are variables");
                ensure!(
                    d.var == arg_name,
                    ReorderedDimSnafu { func: func.clone(), stage, dim: d.var.clone() }
                );
            }
        } else {
            // Reduction dims first, in domain order.
            assert!(schedule.dims.len() >= def.rvars.len());
            for (d, rv) in schedule.dims.iter().zip(def.rvars.iter()) {
                ensure!(
                    d.is_rvar() && d.var == rv.var,
                    ReorderedDimSnafu { func: func.clone(), stage, dim: d.var.clone() }
                );
            }
            // Then pure vars, in ascending argument order.
            let mut last_index: Option<usize> = None;
            for d in schedule.dims.iter().skip(def.rvars.len()) {
                ensure!(
                    !d.is_rvar(),
                    ReorderedDimSnafu { func: func.clone(), stage, dim: d.var.clone() }
                );
                let index = f
                    .args()
                    .iter()
                    .position(|arg| *arg == d.var)
                    .unwrap_or_else(|| panic!("update dim {} of {func} is not an argument", d.var));
                ensure!(
                    last_index.is_none_or(|last| index > last),
                    ReorderedDimSnafu { func: func.clone(), stage, dim: d.var.clone() }
                );
                last_index = Some(index);
            }
        }
    }
    Ok(())
}

/// Whether every pipeline output carries an integer estimate on each of its
/// dimensions.
pub fn outputs_have_estimates(env: &Environment, outputs: &[String]) -> bool {
    outputs.iter().all(|name| {
        let Some(f) = env.get(name) else { return false };
        f.args().iter().all(|arg| f.estimates().iter().any(|e| e.var == *arg))
    })
}

/// Degraded schedule: compute and store every stage at root.
pub fn set_schedule_defaults(env: &mut Environment) {
    for f in env.funcs.values_mut() {
        f.compute_root();
    }
}
