//! Result and error types for Pomar.

use crate::driver::DriverError;
use thiserror::Error;

/// Result type for Pomar operations
pub type PomarResult<T> = Result<T, PomarError>;

/// Errors that can occur in Pomar
#[derive(Debug, Error)]
pub enum PomarError {
    /// Required scope element could not be located
    #[error("Unable to locate element of {component}. Search: {search}")]
    NotFound {
        /// Full hierarchical component name
        component: String,
        /// Search parameters used
        search: String,
    },

    /// Element was present although it was required to be missing
    #[error("{component} is present, but it was expected to be missing. Search: {search}")]
    UnexpectedlyPresent {
        /// Full hierarchical component name
        component: String,
        /// Search parameters used
        search: String,
    },

    /// Wait condition was not met in time
    #[error("Timed out after {ms}ms waiting for {what}. Last state: {last_state}")]
    Timeout {
        /// What was awaited
        what: String,
        /// Timeout in milliseconds
        ms: u64,
        /// Last observed state
        last_state: String,
    },

    /// Invalid configuration, raised before any DOM interaction
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Driver failure
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// A trigger failed while executing for an event
    #[error("{trigger} trigger failed on {event} of {component}: {source}")]
    TriggerFailed {
        /// Trigger kind name
        trigger: String,
        /// Event being executed
        event: String,
        /// Full component name
        component: String,
        /// Underlying failure
        #[source]
        source: Box<PomarError>,
    },

    /// Invalid state error (operation called in wrong state)
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// Script execution returned an unusable result
    #[error("Script error: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl PomarError {
    /// Shorthand for a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Error with trigger wrappers peeled off
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        let mut current = self;
        while let Self::TriggerFailed { source, .. } = current {
            current = source;
        }
        current
    }

    /// Whether a retry loop may treat this failure as "not yet"
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self.root_cause() {
            Self::Driver(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether this failure is a stale element reference
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::Driver(DriverError::StaleElementReference { .. })
        )
    }
}
