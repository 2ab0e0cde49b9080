use px_common::BackPressureReason;
use thiserror::Error;

/// Failures handing work to a pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Pool {pool} is saturated")]
    Busy { pool: String },

    #[error("Pool {pool} is stopped")]
    Stopped { pool: String },

    #[error("Pool {pool} still saturated after {attempts} submission attempts")]
    RetriesExhausted { pool: String, attempts: u32 },

    #[error("Task on pool {pool} was dropped before it produced a result")]
    Abandoned { pool: String },

    #[error("No tokio runtime available to host pool tasks")]
    NoRuntime,
}

/// Failures raised by a component's own processing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    #[error("Processing failed: {0}")]
    Failed(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Event rejected: {0}")]
    Rejected(BackPressureReason),

    #[error("Component {location} failed: {source}")]
    Component {
        location: String,
        #[source]
        source: ComponentError,
    },

    #[error("Processing strategy has not been started")]
    NotStarted,

    #[error("Shutdown in progress")]
    ShutdownInProgress,

    #[error("Response dropped before the event completed")]
    ResponseDropped,
}

/// Failures from the management bean registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagementError {
    #[error("Malformed object name: {0}")]
    MalformedObjectName(String),

    #[error("Instance already exists: {0}")]
    AlreadyRegistered(String),

    #[error("Instance not found: {0}")]
    NotFound(String),

    #[error("Operation {operation} not supported by {name}")]
    UnknownOperation { name: String, operation: String },

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}
