use thiserror::Error;

/// Main error type for swarmtune
#[derive(Error, Debug)]
pub enum StError {
    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("Study error: {0}")]
    Study(#[from] StudyError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Faults raised while running the external program or reading its output.
///
/// These never escape a trial; the objective turns each of them into the
/// sentinel fitness and logs the error text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Evaluation timed out after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    #[error("Failed to launch {program}: {reason}")]
    LaunchFailed { program: String, reason: String },

    #[error("External program exited with code {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("Could not parse fitness: {message}")]
    Parse { message: String },
}

/// Study-level errors
#[derive(Error, Debug)]
pub enum StudyError {
    #[error("No trials completed")]
    NoTrials,

    #[error("Every one of the {n_trials} trials returned the sentinel fitness")]
    Degenerate { n_trials: usize },

    #[error("Invalid study configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to persist results to {path}: {message}")]
    Persistence { path: String, message: String },
}

/// Result type alias for swarmtune operations
pub type StResult<T> = Result<T, StError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::StError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::StError::Config(format!($($arg)*))
    };
}
