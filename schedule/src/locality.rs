//! Spatial-locality analysis.
//!
//! For every loop dimension of a stage, sum the largest storage stride each
//! access exhibits along that dimension. The synthesizer orders loops so the
//! smallest-stride dimension ends up innermost.

use std::collections::{BTreeMap, BTreeSet};

use tessera_ir::{Environment, Expr, Region};

use crate::costs::perform_inline;
use crate::graph::FStage;

/// Largest stride (in bytes) a loop over `var` takes through the allocation
/// of `callee`, given the access expressions along each storage dimension
/// and the allocation's bounds.
///
/// Walking the storage dims innermost-out: an access expression that uses
/// the loop var jumps by the size of everything inside its dimension.
fn max_access_stride(env: &Environment, var: &str, callee: &str, acc_exprs: &[Expr], buffer_bounds: &Region) -> i64 {
    let (bytes_per_ele, num_storage_dims) = match env.get(callee) {
        Some(f) => (f.element_bytes(), f.args().len()),
        None => {
            let bytes = env.inputs.get(callee).map(|input| input.ty.bytes()).unwrap_or(1);
            (bytes, buffer_bounds.len())
        }
    };

    let mut curr_stride = bytes_per_ele;
    let mut stride = 0;
    for sdim in 0..num_storage_dims.min(acc_exprs.len()) {
        if acc_exprs[sdim].uses_var(var) {
            stride = stride.max(curr_stride);
        }
        // Beyond an unknown extent the running stride is unknowable.
        let Some(extent) = buffer_bounds.get(sdim).and_then(|b| b.extent()) else { break };
        curr_stride *= extent;
    }
    stride
}

/// Sum of access strides along each loop dimension of a stage.
///
/// Accesses are measured on the post-inlining expressions: when a producer
/// is spliced into this stage, the loop variables reach its producers
/// through the substituted indices, and the strides must see that.
pub fn analyze_spatial_locality(
    env: &Environment,
    pipeline_bounds: &BTreeMap<String, Region>,
    stg: &FStage,
    allocation_bounds: &BTreeMap<String, Region>,
    inlined: &BTreeSet<String>,
) -> BTreeMap<String, i64> {
    let func = env.get(&stg.func).expect("stage names a known function");
    assert!(!func.has_extern_definition(), "extern stages have no access expressions to analyze");
    let def = func.definition(stg.stage);

    let mut call_args: Vec<(String, Vec<Expr>)> = Vec::new();
    let mut inlined_args: Vec<Expr> = Vec::new();
    for e in def.values.iter().chain(def.args.iter()) {
        let e = perform_inline(e, env, inlined);
        e.for_each_call(&mut |name, args| {
            call_args.push((name.to_string(), args.to_vec()));
        });
    }
    // The store on the left-hand side is an access too.
    for arg in &def.args {
        inlined_args.push(perform_inline(arg, env, inlined));
    }
    call_args.push((stg.func.clone(), inlined_args));

    let mut var_strides = BTreeMap::new();
    for d in &def.schedule.dims {
        let mut total_stride = 0;
        for (callee, acc_exprs) in &call_args {
            let bounds = allocation_bounds
                .get(callee)
                .or_else(|| pipeline_bounds.get(callee))
                .unwrap_or_else(|| panic!("no allocation or pipeline bounds for {callee}"));
            total_stride += max_access_stride(env, &d.var, callee, acc_exprs, bounds);
        }
        var_strides.insert(d.var.clone(), total_stride);
    }
    var_strides
}
