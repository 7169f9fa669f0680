use thiserror::Error;

/// The crate's single typed error enum. Every fallible operation in the
/// library returns `Result<T>` (an alias over this type) so callers can
/// match on a closed set of variants instead of downcasting an opaque
/// report.
#[derive(Debug, Error)]
pub enum RunzError {
    #[error("invalid task in `{command_line}` at {position}: {message}")]
    InvalidTask {
        message: String,
        command_line: String,
        position: usize,
    },

    #[error("unknown option: {name}")]
    UnknownOption { name: String },

    #[error("unknown task `{task_name}` in package `{target}`")]
    UnknownTask { target: String, task_name: String },

    #[error("task `{task_name}` failed with exit code {exit_code}")]
    JobFailed { task_name: String, exit_code: i32 },

    #[error("failed to spawn task `{task_name}`: {source}")]
    Spawn {
        task_name: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RunzError>;

impl RunzError {
    /// Exit code this error maps to at the CLI boundary (§7).
    pub fn exit_code(&self) -> i32 {
        match self {
            RunzError::InvalidTask { .. }
            | RunzError::UnknownOption { .. }
            | RunzError::UnknownTask { .. } => 2,
            RunzError::JobFailed { .. } | RunzError::Spawn { .. } => 1,
        }
    }
}
