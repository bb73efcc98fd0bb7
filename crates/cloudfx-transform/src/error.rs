//! Error types for the transform layer

/// Failure while turning a transform request into a delivery URL
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositionError {
    /// Asset identifier was empty
    #[error("asset identifier is empty")]
    EmptyAssetId,

    /// Operation name not in the dispatch table
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Required parameter not supplied
    #[error("missing parameter `{name}` for {operation}")]
    MissingParameter {
        /// Operation wire name
        operation: &'static str,
        /// Parameter name
        name: String,
    },

    /// Parameter outside the range the service accepts
    #[error("parameter `{name}` = {value} out of range {min}..={max}")]
    OutOfRange {
        /// Parameter name
        name: String,
        /// Supplied value
        value: i64,
        /// Inclusive lower bound
        min: i64,
        /// Inclusive upper bound
        max: i64,
    },

    /// Base URL could not be extended into a delivery URL
    #[error("invalid delivery base: {0}")]
    InvalidBase(String),
}

/// Failure while building a catalog
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Two descriptors share an id
    #[error("duplicate descriptor id {0}")]
    DuplicateId(u32),

    /// Two descriptors point at the same operation
    #[error("duplicate descriptor for operation {0}")]
    DuplicateOperation(&'static str),

    /// Catalog document did not parse
    #[error("catalog parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
