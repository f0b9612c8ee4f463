use thiserror::Error;

/// Errors surfaced by the scan subsystem.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("filesystem watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0} already started")]
    AlreadyStarted(&'static str),

    #[error("scheduler is shutting down")]
    ShuttingDown,

    #[error("listener {0} not found")]
    ListenerNotFound(u64),

    #[error("task {task} failed in {hook}: {message}")]
    Task {
        task: &'static str,
        hook: &'static str,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ScanError>;
