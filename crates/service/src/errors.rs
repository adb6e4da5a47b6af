use thiserror::Error;

use models::errors::ModelError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("concurrent update: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Db(String),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

impl ServiceError {
    pub fn not_found(entity: &str) -> Self { Self::NotFound(format!("{} not found", entity)) }

    /// Lift the model-level conflict into a variant callers can match and retry on.
    pub fn from_model(e: ModelError) -> Self {
        match e {
            ModelError::Conflict(msg) => Self::Conflict(msg),
            ModelError::Validation(msg) => Self::Validation(msg),
            ModelError::Db(msg) => Self::Db(msg),
            other => Self::Model(other),
        }
    }
}

/// Why a lifecycle request did not change state the way the caller asked.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("protocol not found: {0}")]
    NotFound(String),
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("operation failed: {0}")]
    OperationFailed(String),
    #[error("protocol {0} has another operation in progress")]
    Busy(String),
    #[error("store error: {0}")]
    Store(#[from] ServiceError),
}

impl From<installers::RegistryError> for LifecycleError {
    fn from(e: installers::RegistryError) -> Self {
        LifecycleError::OperationFailed(e.to_string())
    }
}

impl LifecycleError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::NotFound(_) => "not_found",
            LifecycleError::PreconditionFailed(_) => "precondition_failed",
            LifecycleError::InvalidInput(_) => "invalid_input",
            LifecycleError::OperationFailed(_) => "operation_failed",
            LifecycleError::Busy(_) => "busy",
            LifecycleError::Store(_) => "store",
        }
    }
}
