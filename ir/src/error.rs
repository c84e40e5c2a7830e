use snafu::Snafu;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("no loop dimension named {var:?} in this stage"))]
    UnknownDim { var: String },
    #[snafu(display("reorder lists dimension {var:?} more than once"))]
    DuplicateReorderDim { var: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
