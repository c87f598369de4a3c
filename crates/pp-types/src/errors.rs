use thiserror::Error;

/// Main error type for probe pooling
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PoolError {
    /// True when the search ran but no assignment satisfies the budget.
    pub fn is_infeasible(&self) -> bool {
        matches!(self, PoolError::Search(SearchError::Infeasible { .. }))
    }
}

/// Errors raised while building or reading measurement and weight tables
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Table loading failed: {message}")]
    LoadingFailed { message: String },

    #[error("Table writing failed: {message}")]
    WriteFailed { message: String },

    #[error("Missing columns: {message}")]
    MissingColumns { message: String },

    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Dataset {dataset}: expected {expected} parameter values, got {got}")]
    DimensionMismatch {
        dataset: String,
        expected: usize,
        got: usize,
    },

    #[error("Dataset {dataset}: parameter values must be finite, got {params:?}")]
    NonFiniteParameter { dataset: String, params: Vec<f64> },

    #[error("Dataset {dataset}: duplicate measurement for parameters {params:?}")]
    DuplicateMeasurement { dataset: String, params: Vec<f64> },

    #[error("Dataset {dataset}: weight must be finite and non-negative, got {weight}")]
    InvalidWeight { dataset: String, weight: f64 },

    #[error("Dataset {dataset}: weight given twice")]
    DuplicateWeight { dataset: String },

    #[error("Weight given for dataset {dataset}, which is not in the probe-count table")]
    UnknownDataset { dataset: String },
}

/// Invalid combinations of search inputs; always fatal before any search work
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("target cost must be a positive integer")]
    NonPositiveTarget,

    #[error("the table must name at least one parameter column")]
    NoParameters,

    #[error(
        "got {got} loss coefficients, but the input table has {expected} parameters; \
         the counts must match"
    )]
    CoefficientCount { expected: usize, got: usize },

    #[error("loss coefficient {index} must be finite, got {value}")]
    NonFiniteCoefficient { index: usize, value: f64 },

    #[error(
        "rounding cannot be combined with higher-dimensional search; \
         that mode explores a continuous space and never rounds"
    )]
    RoundingWithHigherDimensional,

    #[error(
        "standard search requires exactly the parameters (mismatches, cover_extension) \
         in that order, found {found:?}; use higher-dimensional search for other parameters"
    )]
    StandardParameters { found: Vec<String> },

    #[error("rounding multiple for {parameter} must be positive")]
    ZeroRoundingMultiple { parameter: String },

    #[error("dataset weights are missing an entry for dataset {dataset}")]
    MissingWeight { dataset: String },

    #[error("dataset weights name dataset {dataset}, which is not in the probe-count table")]
    UnknownWeightedDataset { dataset: String },
}

/// Failures that surface while building interpolators or searching
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("dataset {dataset} has no measurements")]
    EmptyDataset { dataset: String },

    #[error("dataset {dataset}: expected {expected} parameter values, got {got}")]
    DimensionMismatch {
        dataset: String,
        expected: usize,
        got: usize,
    },

    #[error("dataset {dataset}: parameters {params:?} are outside the measured support")]
    OutsideSupport { dataset: String, params: Vec<f64> },

    #[error("dataset {dataset}: no integral parameter vector lies inside the measured support")]
    NoGridPoints { dataset: String },

    #[error("dataset {dataset}: no multiple of {multiple} for {parameter} lies inside the measured support")]
    NoRoundedValue {
        dataset: String,
        parameter: String,
        multiple: u32,
    },

    #[error("dataset {dataset}: interpolation grid would need {nodes} nodes (limit {limit})")]
    GridTooLarge {
        dataset: String,
        nodes: usize,
        limit: usize,
    },

    #[error("dataset {dataset}: simplex minimization failed: {message}")]
    Solver { dataset: String, message: String },

    #[error("no parameter assignment meets the target cost {target}; minimum achievable total is {min_achievable}")]
    Infeasible { target: u64, min_achievable: f64 },
}

/// Result type alias for probe pooling operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($variant:expr) => {
        $crate::PoolError::Config($variant)
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::PoolError::Internal(format!($($arg)*))
    };
}
