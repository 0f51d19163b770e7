// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Versioned prompt storage.
//!
//! Each saved prompt becomes two files in the store directory: a
//! `{task_id}_{version}.txt` holding the prompt text and a sibling
//! `{task_id}_{version}.json` holding the metadata record. Version ids are
//! "initial" (number 0) or `v{N}`, where N is one more than the highest
//! number already present for the task; absent or deleted versions never
//! cause a number to be reused.
//!
//! History is append-only and monotonically non-decreasing in version
//! number. Requesting a version or history that does not exist is an
//! error; that indicates a caller bug, not a transient condition.

use crate::error::{Error, Result};
use crate::optimize::PromptMetrics;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persisted metadata for one prompt version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersion {
    /// Task this version belongs to.
    pub task_id: String,
    /// Version id: "initial" or "v{N}".
    pub version: String,
    /// Numeric version, strictly increasing per task.
    pub version_number: u32,
    /// RFC 3339 creation timestamp.
    pub timestamp: String,
    /// Metrics the prompt achieved.
    pub metrics: PromptMetrics,
    /// Name of the sibling file holding the prompt text.
    pub prompt_file: String,
}

/// Delta of one metric between two versions.
#[derive(Debug, Clone, Serialize)]
pub struct MetricDelta {
    /// Value at the earlier version.
    pub initial: f64,
    /// Value at the later version.
    #[serde(rename = "final")]
    pub final_value: f64,
    /// `final - initial`.
    pub delta: f64,
    /// `delta / initial * 100`, or 0 when the initial value is 0.
    pub percentage: f64,
}

impl MetricDelta {
    fn between(initial: f64, final_value: f64) -> Self {
        let delta = final_value - initial;
        let percentage = if initial == 0.0 {
            0.0
        } else {
            delta / initial * 100.0
        };
        Self {
            initial,
            final_value,
            delta,
            percentage,
        }
    }
}

/// Metric deltas between two consecutive versions.
#[derive(Debug, Clone, Serialize)]
pub struct StepDelta {
    /// Earlier version id.
    pub from: String,
    /// Later version id.
    pub to: String,
    /// Per-metric deltas, in the metrics' fixed order.
    pub deltas: Vec<(String, MetricDelta)>,
}

/// Performance progression across a task's prompt versions.
#[derive(Debug, Clone, Serialize)]
pub struct Progression {
    /// The task.
    pub task_id: String,
    /// Number of versions on record.
    pub versions: usize,
    /// Deltas between each consecutive pair of versions.
    pub steps: Vec<StepDelta>,
    /// Deltas between the first and last version (empty with one version).
    pub overall: Vec<(String, MetricDelta)>,
}

/// Directory-backed prompt version store.
pub struct VersionStore {
    dir: PathBuf,
}

impl VersionStore {
    /// Open a store, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a prompt version and return its version id.
    ///
    /// `initial` pins the id to "initial" (number 0); otherwise the next
    /// number is one more than the highest already stored for the task.
    pub fn save(
        &self,
        task_id: &str,
        prompt: &str,
        metrics: &PromptMetrics,
        initial: bool,
    ) -> Result<String> {
        let existing = self.history(task_id)?;

        let (version, version_number) = if initial {
            ("initial".to_string(), 0)
        } else {
            let max = existing.iter().map(|v| v.version_number).max().unwrap_or(0);
            (format!("v{}", max + 1), max + 1)
        };

        let prompt_file = format!("{}_{}.txt", task_id, version);
        std::fs::write(self.dir.join(&prompt_file), prompt)?;

        let record = PromptVersion {
            task_id: task_id.to_string(),
            version: version.clone(),
            version_number,
            timestamp: chrono::Utc::now().to_rfc3339(),
            metrics: metrics.clone(),
            prompt_file: prompt_file.clone(),
        };

        let metadata_path = self.dir.join(format!("{}_{}.json", task_id, version));
        std::fs::write(&metadata_path, serde_json::to_string_pretty(&record)?)?;

        tracing::info!(
            task = task_id,
            version = %version,
            overall = metrics.overall_score,
            "prompt version saved"
        );

        Ok(version)
    }

    /// All versions for a task, sorted by version number. Empty when the
    /// task has none.
    pub fn history(&self, task_id: &str) -> Result<Vec<PromptVersion>> {
        let prefix = format!("{}_", task_id);
        let mut versions: Vec<PromptVersion> = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }

            let content = std::fs::read_to_string(&path)?;
            let record: PromptVersion = serde_json::from_str(&content)
                .map_err(|e| Error::store(format!("Malformed metadata {}: {}", name, e)))?;

            // Prefix matching alone would also collect "{task_id}_extra"'s
            // files; the record's own task_id is authoritative.
            if record.task_id == task_id {
                versions.push(record);
            }
        }

        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    /// Load a version's prompt text and metadata.
    ///
    /// With `None`, loads the latest version. Fails with a not-found error
    /// when the task has no versions or the named version is absent.
    pub fn load(&self, task_id: &str, version: Option<&str>) -> Result<(String, PromptVersion)> {
        let versions = self.history(task_id)?;

        let record = match version {
            Some(wanted) => versions
                .into_iter()
                .find(|v| v.version == wanted)
                .ok_or_else(|| Error::version_not_found(task_id, wanted))?,
            None => versions
                .into_iter()
                .next_back()
                .ok_or_else(|| Error::version_not_found(task_id, "latest"))?,
        };

        let prompt = std::fs::read_to_string(self.dir.join(&record.prompt_file))?;
        Ok((prompt, record))
    }

    /// Compute the performance progression across a task's versions.
    ///
    /// Fails with a not-found error when the task has no versions.
    pub fn progression(&self, task_id: &str) -> Result<Progression> {
        let versions = self.history(task_id)?;

        if versions.is_empty() {
            return Err(Error::version_not_found(task_id, "any"));
        }

        let steps = versions
            .windows(2)
            .map(|pair| StepDelta {
                from: pair[0].version.clone(),
                to: pair[1].version.clone(),
                deltas: metric_deltas(&pair[0].metrics, &pair[1].metrics),
            })
            .collect();

        let overall = if versions.len() > 1 {
            metric_deltas(
                &versions[0].metrics,
                &versions[versions.len() - 1].metrics,
            )
        } else {
            Vec::new()
        };

        Ok(Progression {
            task_id: task_id.to_string(),
            versions: versions.len(),
            steps,
            overall,
        })
    }
}

fn metric_deltas(initial: &PromptMetrics, final_m: &PromptMetrics) -> Vec<(String, MetricDelta)> {
    initial
        .named()
        .iter()
        .zip(final_m.named().iter())
        .map(|((name, a), (_, b))| (name.to_string(), MetricDelta::between(*a, *b)))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
