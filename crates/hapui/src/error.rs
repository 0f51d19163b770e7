// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Error types for hapui

use thiserror::Error;

/// Result type alias for hapui operations
pub type Result<T> = core::result::Result<T, Error>;

/// Main error type for the hapui library
#[derive(Error, Debug)]
pub enum Error {
    /// Completion service errors (HTTP failures, subprocess failures, empty output)
    #[error("Completion error: {0}")]
    Completion(String),

    /// Task loading errors (missing file, unsupported format)
    #[error("Task error: {0}")]
    Task(String),

    /// Aggregation was asked to work on an empty path list
    #[error("No reasoning paths provided")]
    EmptyPaths,

    /// A prompt version or version history that was explicitly requested
    /// does not exist.
    #[error("No prompt version {version:?} for task {task_id:?}")]
    VersionNotFound {
        /// Task whose history was queried.
        task_id: String,
        /// The requested version id ("latest" when none was named).
        version: String,
    },

    /// Version store errors (unreadable directory, malformed metadata)
    #[error("Store error: {0}")]
    Store(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a completion error
    pub fn completion(msg: impl Into<String>) -> Self {
        Self::Completion(msg.into())
    }

    /// Create a task error
    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a version-not-found error
    pub fn version_not_found(task_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self::VersionNotFound {
            task_id: task_id.into(),
            version: version.into(),
        }
    }

    /// Check if this error means a requested version/history is absent.
    ///
    /// Absence indicates a caller logic error rather than a transient
    /// condition, so callers usually want to surface it instead of
    /// substituting a default.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::VersionNotFound { .. })
    }

    /// Get the error category for logging/metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Completion(_) => "completion",
            Self::Task(_) => "task",
            Self::EmptyPaths => "aggregation",
            Self::VersionNotFound { .. } => "not_found",
            Self::Store(_) => "store",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Yaml(_) => "yaml",
            Self::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_completion() {
        let err = Error::completion("model unavailable");
        assert!(matches!(err, Error::Completion(_)));
        assert_eq!(err.to_string(), "Completion error: model unavailable");
    }

    #[test]
    fn test_error_task() {
        let err = Error::task("unsupported extension");
        assert!(matches!(err, Error::Task(_)));
        assert_eq!(err.to_string(), "Task error: unsupported extension");
    }

    #[test]
    fn test_error_version_not_found() {
        let err = Error::version_not_found("math_1", "v3");
        assert!(err.is_not_found());
        let msg = err.to_string();
        assert!(msg.contains("math_1"));
        assert!(msg.contains("v3"));
    }

    #[test]
    fn test_error_category() {
        assert_eq!(Error::completion("x").category(), "completion");
        assert_eq!(Error::task("x").category(), "task");
        assert_eq!(Error::EmptyPaths.category(), "aggregation");
        assert_eq!(Error::version_not_found("t", "v1").category(), "not_found");
        assert_eq!(Error::Other("x".to_string()).category(), "other");
        assert!(!Error::completion("x").is_not_found());
    }

    #[test]
    fn test_result_type() {
        let ok: Result<i32> = Ok(42);
        assert!(ok.is_ok());

        let err: Result<i32> = Err(Error::EmptyPaths);
        assert!(err.is_err());
    }
}
