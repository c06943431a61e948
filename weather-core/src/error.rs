use thiserror::Error;

/// Boxed cause carried by [`WeatherError::Operation`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the core.
pub type Result<T, E = WeatherError> = std::result::Result<T, E>;

/// Malformed caller input, raised before any port is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Every failure the core reports to its callers.
///
/// Ports speak `anyhow::Error`; coordinators re-wrap those into [`WeatherError::Operation`]
/// so callers never depend on an adapter's native error type.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Invalid input ({0})")]
    Validation(#[from] ValidationError),

    #[error("Weather provider '{provider}' is currently unavailable")]
    ServiceUnavailable { provider: String },

    #[error("{operation} failed: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl WeatherError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(field, reason))
    }

    /// Wrap a port failure, keeping it as the error source.
    pub fn operation(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Operation {
            operation,
            source: source.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }

    pub fn is_operation(&self) -> bool {
        matches!(self, Self::Operation { .. })
    }
}
