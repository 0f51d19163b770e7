// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Task records and file loading.
//!
//! A task is a problem statement, an optional expected answer, and an id
//! used for logging and versioning keys. Tasks are immutable once loaded.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A problem to solve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    /// Identifier used for logging and versioning keys.
    pub id: String,
    /// The problem statement handed to the completion service.
    pub problem_statement: String,
    /// Reference answer, when one is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
}

impl Task {
    /// Create a new task.
    pub fn new(id: impl Into<String>, problem_statement: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            problem_statement: problem_statement.into(),
            expected_answer: None,
        }
    }

    /// Attach an expected answer.
    pub fn with_expected(mut self, answer: impl Into<String>) -> Self {
        self.expected_answer = Some(answer.into());
        self
    }

    /// Load a task from a JSON or YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(Error::task(format!("Task file not found: {}", path.display())));
        }

        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            other => Err(Error::task(format!(
                "Unsupported task file format: {:?}",
                other.unwrap_or("")
            ))),
        }
    }
}

/// List the task files (json/yaml/yml) in a directory, sorted by name.
///
/// Loading each file is left to the caller so a malformed task can be
/// logged and skipped without aborting the batch.
pub fn task_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("json") | Some("yaml") | Some("yml")
            )
        })
        .collect();
    files.sort();
    Ok(files)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_builder() {
        let task = Task::new("t1", "What is 2+2?").with_expected("4");
        assert_eq!(task.id, "t1");
        assert_eq!(task.problem_statement, "What is 2+2?");
        assert_eq!(task.expected_answer.as_deref(), Some("4"));
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t1.json");
        std::fs::write(
            &path,
            r#"{"id": "t1", "problem_statement": "What is 2+2?", "expected_answer": "4"}"#,
        )
        .unwrap();

        let task = Task::load(&path).unwrap();
        assert_eq!(task.id, "t1");
        assert_eq!(task.expected_answer.as_deref(), Some("4"));
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t2.yaml");
        std::fs::write(
            &path,
            "id: t2\nproblem_statement: Capital of France?\n",
        )
        .unwrap();

        let task = Task::load(&path).unwrap();
        assert_eq!(task.id, "t2");
        assert!(task.expected_answer.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Task::load("/nonexistent/task.json").unwrap_err();
        assert!(matches!(err, Error::Task(_)));
    }

    #[test]
    fn test_load_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t3.txt");
        std::fs::write(&path, "not a task").unwrap();

        let err = Task::load(&path).unwrap_err();
        assert!(matches!(err, Error::Task(_)));
    }

    #[test]
    fn test_task_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a.yaml"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = task_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.yaml"));
        assert!(files[1].ends_with("b.json"));
    }
}
