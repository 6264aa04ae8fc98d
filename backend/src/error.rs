//! Error types for the automation engine and its collaborators.
//!
//! Only the binary edge uses `anyhow`; everything below it returns one of these.

use thiserror::Error;

/// Failures raised by the persistence adapters.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Invalid stored value: {0}")]
    InvalidData(String),
}

/// Failures raised by the email collaborator.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),
    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("Email transport unavailable: {0}")]
    Unavailable(String),
}

/// Why a single workflow action did not complete.
///
/// Configuration and resolution problems are treated as skips; transport and
/// repository problems are treated as failures. Neither ever leaves the dispatcher.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Invalid action configuration: {0}")]
    Configuration(String),
    #[error("Could not resolve {0}")]
    Resolution(String),
    #[error(transparent)]
    Transport(#[from] EmailError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ActionError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution(message.into())
    }

    /// Configuration and resolution errors skip the action rather than fail it.
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Resolution(_))
    }
}
