//! Scalar element types.
//!
//! The cost model only needs byte widths (footprints, load costs) and the
//! vectorizer only needs lane counts, so this stays a closed set.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    UInt8,
    UInt16,
    UInt32,
    Int8,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl ScalarType {
    /// Storage width of one element.
    pub fn bytes(self) -> i64 {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 => 2,
            Self::UInt32 | Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}
