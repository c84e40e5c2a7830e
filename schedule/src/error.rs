use snafu::Snafu;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display(
        "cannot auto-schedule function {func:?}: it has partially specified splits at stage {stage}"
    ))]
    PartialSplits { func: String, stage: usize },
    #[snafu(display(
        "cannot auto-schedule function {func:?}: it has partially specified bounds at stage {stage}"
    ))]
    PartialBounds { func: String, stage: usize },
    #[snafu(display("cannot auto-schedule function {func:?}: stage {stage} is not serial at dim {dim:?}"))]
    NonSerialDim { func: String, stage: usize, dim: String },
    #[snafu(display("cannot auto-schedule function {func:?}: it has specializations"))]
    Specializations { func: String },
    #[snafu(display("cannot auto-schedule function {func:?}: dim {dim:?} at stage {stage} has been reordered"))]
    ReorderedDim { func: String, stage: usize, dim: String },
    #[snafu(display("pipeline output {name:?} is not defined in the environment"))]
    UnknownOutput { name: String },
    #[snafu(display("schedule transform failed: {source}"), context(false))]
    Transform { source: tessera_ir::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
