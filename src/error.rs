//! Error types for the onboarding service.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors returned by sequencer commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OnboardingError {
    /// One or more required form fields are empty.
    #[error("Please fill in all required fields (missing: {})", missing_fields.join(", "))]
    Validation { missing_fields: Vec<String> },

    #[error("Onboarding already started; reset before starting again")]
    AlreadyStarted,

    #[error("No onboarding stages configured")]
    NoStages,
}

impl OnboardingError {
    pub fn validation(fields: &[&str]) -> Self {
        Self::Validation {
            missing_fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
