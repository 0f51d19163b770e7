// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! End-to-end pipeline: generate, aggregate, optimize, record.
//!
//! One [`Pipeline::run`] call handles one task: generate reasoning paths,
//! aggregate them into a consensus, and, when confidence falls below the
//! floor, hill-climb the guiding prompt and re-run generation with the
//! optimized prompt. Every run writes two artifacts under the base
//! directory: a full run log (`logs/`) and an evaluation summary
//! (`evaluation/`), and records prompt versions under `prompts/`.

use crate::consensus::{aggregate, AggregationResult};
use crate::error::Result;
use crate::explore::{explore, ReasoningPath};
use crate::llm::Llm;
use crate::optimize::{evaluate, optimize, EvalInput};
use crate::task::Task;
use crate::version::VersionStore;
use serde::Serialize;
use std::path::PathBuf;

/// Headline metrics of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    /// Consensus confidence after the final aggregation.
    pub confidence: f64,
    /// Fraction of paths in the consensus cluster.
    pub consistency: f64,
    /// The consensus answer.
    pub final_answer: String,
    /// The task's reference answer, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The task that ran.
    pub task_id: String,
    /// Run timestamp (RFC 3339).
    pub timestamp: String,
    /// The prompt the run started from.
    pub initial_prompt: String,
    /// The prompt the run ended with (differs when optimization ran).
    pub final_prompt: String,
    /// All reasoning paths from the final generation, best first.
    pub reasoning_paths: Vec<ReasoningPath>,
    /// The final aggregation.
    pub aggregation_result: AggregationResult,
    /// Headline metrics.
    pub metrics: RunMetrics,
    /// Whether the optimization loop ran.
    pub optimized: bool,
}

/// The initial guiding prompt for a task.
pub fn base_prompt(task: &Task) -> String {
    format!(
        "Solve the following problem step by step:\n\n\
         Problem: {}\n\n\
         Requirements:\n\
         1. Show your complete reasoning process\n\
         2. Break down the solution into clear steps\n\
         3. Validate your answer\n\
         4. State your final answer clearly\n\n\
         Your solution:",
        task.problem_statement,
    )
}

/// Pipeline builder.
pub struct Pipeline<'a, L: Llm> {
    llm: &'a L,
    base_dir: PathBuf,
    num_paths: usize,
    max_depth: u32,
    threshold: f64,
    max_iter: u32,
    confidence_floor: f64,
}

impl<'a, L: Llm> Pipeline<'a, L> {
    /// Create a pipeline writing artifacts under `base_dir`.
    pub fn new(llm: &'a L, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            llm,
            base_dir: base_dir.into(),
            num_paths: 3,
            max_depth: 3,
            threshold: 0.7,
            max_iter: 3,
            confidence_floor: 0.8,
        }
    }

    /// Set the number of reasoning attempts (default: 3).
    pub fn paths(mut self, n: usize) -> Self {
        self.num_paths = n.max(1);
        self
    }

    /// Set the maximum rounds per attempt (default: 3).
    pub fn depth(mut self, n: u32) -> Self {
        self.max_depth = n.max(1);
        self
    }

    /// Set the clustering similarity threshold (default: 0.7).
    pub fn threshold(mut self, t: f64) -> Self {
        self.threshold = t.clamp(0.0, 1.0);
        self
    }

    /// Set the optimization iteration budget (default: 3).
    pub fn max_iter(mut self, n: u32) -> Self {
        self.max_iter = n;
        self
    }

    /// Set the confidence below which optimization kicks in (default: 0.8).
    pub fn confidence_floor(mut self, floor: f64) -> Self {
        self.confidence_floor = floor.clamp(0.0, 1.0);
        self
    }

    /// Execute synchronously.
    ///
    /// If called inside a tokio runtime, uses `block_in_place`. Otherwise,
    /// creates a new single-threaded runtime.
    pub fn go(self, task: &Task) -> Result<RunReport> {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            tokio::task::block_in_place(|| handle.block_on(self.run(task)))
        } else {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to create tokio runtime")
                .block_on(self.run(task))
        }
    }

    /// Execute asynchronously.
    pub async fn run(self, task: &Task) -> Result<RunReport> {
        let _span = tracing::info_span!("pipeline", task = %task.id).entered();

        let store = VersionStore::open(self.base_dir.join("prompts"))?;

        let initial_prompt = base_prompt(task);
        let mut current_prompt = initial_prompt.clone();

        tracing::info!("generating reasoning paths");
        let mut paths = explore(self.llm, task)
            .paths(self.num_paths)
            .depth(self.max_depth)
            .run()
            .await;

        tracing::info!("aggregating results");
        let mut aggregation = aggregate(self.llm, &paths)
            .threshold(self.threshold)
            .run()
            .await?;

        let initial_metrics = evaluate(self.llm, EvalInput::from(&aggregation), task).await;
        store.save(&task.id, &initial_prompt, &initial_metrics, true)?;

        let mut optimized = false;
        if aggregation.confidence < self.confidence_floor {
            tracing::info!(
                confidence = aggregation.confidence,
                floor = self.confidence_floor,
                "confidence below floor, optimizing prompt"
            );

            let outcome = optimize(self.llm, current_prompt.clone(), task)
                .results(&aggregation)
                .max_iter(self.max_iter)
                .store(&store)
                .run()
                .await;
            current_prompt = outcome.optimized_prompt;
            optimized = true;

            tracing::info!("re-running with optimized prompt");
            paths = explore(self.llm, task)
                .paths(self.num_paths)
                .depth(self.max_depth)
                .instruction(current_prompt.as_str())
                .run()
                .await;
            aggregation = aggregate(self.llm, &paths)
                .threshold(self.threshold)
                .run()
                .await?;
        }

        let report = RunReport {
            task_id: task.id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            initial_prompt,
            final_prompt: current_prompt,
            metrics: RunMetrics {
                confidence: aggregation.confidence,
                consistency: aggregation.supporting_answers.len() as f64 / paths.len() as f64,
                final_answer: aggregation.final_answer.clone(),
                expected_answer: task.expected_answer.clone(),
            },
            reasoning_paths: paths,
            aggregation_result: aggregation,
            optimized,
        };

        self.write_artifacts(&report)?;

        tracing::info!(
            confidence = report.metrics.confidence,
            answer = %report.metrics.final_answer,
            optimized,
            "pipeline run complete"
        );

        Ok(report)
    }

    /// Write the run log and the evaluation summary.
    fn write_artifacts(&self, report: &RunReport) -> Result<()> {
        let logs_dir = self.base_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)?;

        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let log_path = logs_dir.join(format!("{}_{}.json", report.task_id, stamp));
        std::fs::write(&log_path, serde_json::to_string_pretty(report)?)?;

        let eval_dir = self.base_dir.join("evaluation");
        std::fs::create_dir_all(&eval_dir)?;

        let summary = serde_json::json!({
            "task_id": report.task_id,
            "timestamp": report.timestamp,
            "metrics": report.metrics,
            "prompt_versions": {
                "initial": report.initial_prompt,
                "final": report.final_prompt,
            },
        });
        let eval_path = eval_dir.join(format!("{}_evaluation.json", report.task_id));
        std::fs::write(&eval_path, serde_json::to_string_pretty(&summary)?)?;

        tracing::debug!(log = %log_path.display(), "artifacts written");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
