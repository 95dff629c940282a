use thiserror::Error;

/// Main error type for the ML node task scheduler
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Trial error: {0}")]
    Trial(#[from] TrialError),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while building or running a single trial
#[derive(Error, Debug)]
pub enum TrialError {
    #[error("Trial {trial_id} failed: {message}")]
    ExecutionFailed { trial_id: String, message: String },

    #[error("Model creation failed: {message}")]
    ModelCreation { message: String },

    #[error("Trainer process for trial {trial_id} exited with {status}")]
    ProcessFailed { trial_id: String, status: String },

    #[error("Trainer output for trial {trial_id} is not a loss: {output:?}")]
    InvalidOutput { trial_id: String, output: String },
}

/// Errors talking to the cluster coordinator
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Cannot connect to coordinator at {address}: {message}")]
    Connection { address: String, message: String },

    #[error("Coordinator request failed: {message}")]
    Transport { message: String },

    #[error("Coordinator rejected update for model {model_id}: status {status}, {message}")]
    Rejected {
        model_id: String,
        status: u16,
        message: String,
    },
}

/// Trial registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid registry key: {key:?}")]
    InvalidKey { key: String },

    #[error("Registry storage failure at {path}: {message}")]
    Storage { path: String, message: String },
}

/// Hyperparameter search errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid range for parameter {name}: [{low}, {high}]")]
    InvalidRange { name: String, low: f64, high: f64 },

    #[error("No completed trials in study")]
    NoCompletedTrials,
}

/// Result type alias for task scheduler operations
pub type TaskResult<T> = Result<T, TaskError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::TaskError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::TaskError::Config(format!($($arg)*))
    };
}
