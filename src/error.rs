//! Error types for the aggregation engine.
//!
//! Only load-time failures are errors. Sparse query results (no clusters,
//! missing metric columns, empty subsets) are expressed in the return types
//! instead, see [`crate::SummaryStats`] and [`crate::cluster_routes`].

/// Errors that can occur while loading or configuring the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No input column could be resolved for a required canonical field.
    #[error("cannot resolve column for `{field}` (available columns: {available})")]
    SchemaResolution {
        /// Canonical field that could not be resolved.
        field: &'static str,
        /// Comma-separated list of the input headers.
        available: String,
    },

    /// CSV framing or decoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error (file open/read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON config parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Zone registry is empty or has duplicate ids.
    #[error("invalid zone registry: {message}")]
    InvalidZones {
        /// Description of what went wrong.
        message: String,
    },

    /// Weather weights cannot form a categorical distribution.
    #[error("invalid weather distribution: {message}")]
    WeatherDistribution {
        /// Description of what went wrong.
        message: String,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
