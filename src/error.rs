//! Error taxonomy shared by the store, manifest, prune and create paths.
//!
//! Each variant maps to a distinct process exit code so wrappers and cron jobs
//! can tell a bad request from a missing box or a failed VM build.
use std::io;
use std::path::PathBuf;

/// Errors surfaced by box-manager operations.
#[derive(Debug, thiserror::Error)]
pub enum BoxError {
    /// Bad or conflicting input: malformed names, duplicate versions, unsafe paths.
    #[error("{0}")]
    Validation(String),
    /// A manifest, manifest entry or artifact that was required is absent.
    #[error("{0}")]
    NotFound(String),
    /// The external VM tool failed, timed out or could not be started.
    #[error("{command} failed: {detail}")]
    Build { command: String, detail: String },
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    /// A manifest on disk could not be parsed, or a manifest could not be serialized.
    #[error("invalid manifest {}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Config(String),
}

pub type Result<T, E = BoxError> = std::result::Result<T, E>;

impl BoxError {
    pub fn validation(message: impl Into<String>) -> Self {
        BoxError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        BoxError::NotFound(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BoxError::NotFound(_))
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            BoxError::Validation(_) | BoxError::Config(_) => 2,
            BoxError::NotFound(_) => 3,
            BoxError::Build { .. } => 4,
            BoxError::Io { .. } | BoxError::Manifest { .. } => 1,
        }
    }
}

/// Attach a human-readable context string to `std::io` failures.
pub trait IoContext<T> {
    fn io_context<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| BoxError::Io {
            context: context(),
            source,
        })
    }
}
