use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::feature::ValueKind;

/// Boxed cause carried by [`FeatureQueryError::SourceExecution`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum FeatureQueryError {
    // construction errors, raised before any I/O
    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidRange { start: DateTime<Utc>, end: DateTime<Utc> },
    #[error("Invalid bounding box: ({min_x}, {min_y}, {max_x}, {max_y})")]
    InvalidBBox { min_x: f64, min_y: f64, max_x: f64, max_y: f64 },
    #[error("Invalid spatial reference system: '{0}'")]
    InvalidSrs(String),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Invalid target type: '{0}'")]
    InvalidTargetType(String),
    #[error("Invalid result limit: {0} (must be at least 1)")]
    InvalidLimit(usize),
    // execution errors, raised when talking to the store
    #[error("Feature type not found: {0}")]
    TypeNotFound(String),
    #[error("Source execution error: {0}")]
    SourceExecution(#[source] BoxError),
    #[error("Feature collection already consumed")]
    AlreadyConsumed,
    // traversal errors
    #[error("Malformed feature {feature}: property {property} declared {declared} but holds {actual}")]
    MalformedFeature {
        feature: String,
        property: String,
        declared: ValueKind,
        actual: ValueKind,
    },
    #[error("Config error: {0}")]
    Config(String),
}

impl FeatureQueryError {
    /// Wraps any store-side failure as a [`FeatureQueryError::SourceExecution`].
    pub fn source<E>(cause: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::SourceExecution(cause.into())
    }
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange { .. }
                | Self::InvalidBBox { .. }
                | Self::InvalidSrs(_)
                | Self::InvalidPattern(_)
                | Self::InvalidTargetType(_)
                | Self::InvalidLimit(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FeatureQueryError>;

// Helper conversions
impl From<rusqlite::Error> for FeatureQueryError {
    fn from(e: rusqlite::Error) -> Self { Self::SourceExecution(Box::new(e)) }
}
impl From<config::ConfigError> for FeatureQueryError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
