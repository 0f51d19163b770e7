// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Multi-path reasoning generation.
//!
//! This module provides the [`explore`] entry point for generating several
//! independent reasoning attempts for a task. Each attempt grows through up
//! to `depth` rounds of completion calls, stops early once a conclusion
//! marker appears, and is self-scored by a model judgment. The returned
//! paths are sorted by score, best first.
//!
//! # Examples
//!
//! ```
//! use hapui::llm::MockLlm;
//! use hapui::task::Task;
//! use hapui::explore::explore;
//!
//! let llm = MockLlm::new(|prompt| {
//!     if prompt.contains("Rate this reasoning") {
//!         "0.9".to_string()
//!     } else {
//!         "120 / 2 = 60. Therefore, the answer is 60 km/h.".to_string()
//!     }
//! });
//! let task = Task::new("t1", "A train travels 120 km in 2 hours. Average speed?");
//!
//! let paths = explore(&llm, &task).paths(2).go();
//! assert_eq!(paths.len(), 2);
//! assert!(paths[0].final_text.contains("60 km/h"));
//! ```

use crate::judge::Judge;
use crate::llm::Llm;
use crate::task::Task;
use serde::Serialize;

/// Entry point for multi-path reasoning generation.
pub fn explore<'a, L: Llm>(llm: &'a L, task: &'a Task) -> Explore<'a, L> {
    Explore::new(llm, task)
}

/// One complete, independently generated reasoning attempt.
///
/// Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningPath {
    /// The incremental reasoning chunks, in generation order.
    pub steps: Vec<String>,
    /// All chunks joined with newlines.
    pub final_text: String,
    /// Self-reported quality in [0, 1].
    pub score: f64,
}

/// Builder for multi-path reasoning generation.
pub struct Explore<'a, L: Llm> {
    llm: &'a L,
    task: &'a Task,
    num_paths: usize,
    max_depth: u32,
    instruction: Option<String>,
    parallel: bool,
}

impl<'a, L: Llm> Explore<'a, L> {
    /// Create a new builder with defaults (3 paths, depth 3).
    pub fn new(llm: &'a L, task: &'a Task) -> Self {
        Self {
            llm,
            task,
            num_paths: 3,
            max_depth: 3,
            instruction: None,
            parallel: false,
        }
    }

    /// Set the number of independent attempts (default: 3).
    pub fn paths(mut self, n: usize) -> Self {
        self.num_paths = n.max(1);
        self
    }

    /// Set the maximum rounds per attempt (default: 3).
    pub fn depth(mut self, n: u32) -> Self {
        self.max_depth = n.max(1);
        self
    }

    /// Override the guiding instruction block.
    ///
    /// Used by the pipeline to re-run generation with an optimized prompt.
    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Generate attempts concurrently.
    ///
    /// Attempts share no state, so fan-out is safe; results are reassembled
    /// in attempt order before the final score sort, making the output
    /// identical to sequential generation.
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Execute synchronously and return the score-sorted paths.
    ///
    /// If called inside a tokio runtime, uses `block_in_place`. Otherwise,
    /// creates a new single-threaded runtime.
    pub fn go(self) -> Vec<ReasoningPath> {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            tokio::task::block_in_place(|| handle.block_on(self.run()))
        } else {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to create tokio runtime")
                .block_on(self.run())
        }
    }

    /// Execute asynchronously.
    pub async fn run(self) -> Vec<ReasoningPath> {
        let _span = tracing::info_span!(
            "explore",
            task = %self.task.id,
            paths = self.num_paths,
            depth = self.max_depth,
        )
        .entered();

        let mut paths: Vec<ReasoningPath> = Vec::with_capacity(self.num_paths);

        if self.parallel {
            use futures::stream::{FuturesUnordered, StreamExt};

            let mut futs = FuturesUnordered::new();
            for i in 0..self.num_paths {
                let fut = self.attempt();
                futs.push(async move { (i, fut.await) });
            }

            let mut indexed: Vec<(usize, ReasoningPath)> = Vec::with_capacity(self.num_paths);
            while let Some(result) = futs.next().await {
                indexed.push(result);
            }

            // Restore attempt order so the stable score sort ties out the
            // same way as sequential generation.
            indexed.sort_by_key(|(i, _)| *i);
            paths.extend(indexed.into_iter().map(|(_, p)| p));
        } else {
            for _ in 0..self.num_paths {
                paths.push(self.attempt().await);
            }
        }

        // Stable sort: ties keep generation order.
        paths.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        tracing::info!(
            generated = paths.len(),
            best_score = paths.first().map(|p| p.score).unwrap_or(0.0),
            "exploration complete"
        );

        paths
    }

    /// Generate and score a single attempt.
    async fn attempt(&self) -> ReasoningPath {
        let mut labels: Vec<String> = Vec::new();
        let mut steps: Vec<String> = Vec::new();

        for depth in 0..self.max_depth {
            let prompt = self.round_prompt(&labels);

            let text = match self.llm.complete(&prompt).await {
                Ok(output) if !output.text.is_empty() => output.text,
                // Service failure or empty output ends the attempt; a
                // partial (possibly empty) path is allowed.
                _ => break,
            };

            labels.push(format!("Step {}", depth + 1));
            let concluded = has_conclusion(&text);
            steps.push(text);

            if concluded {
                break;
            }
        }

        let final_text = steps.join("\n");
        let score = Judge::new(self.llm).rate_path(self.task, &final_text).await;

        ReasoningPath {
            steps,
            final_text,
            score,
        }
    }

    /// Build the reasoning prompt for one round.
    fn round_prompt(&self, labels: &[String]) -> String {
        let prior = if labels.is_empty() {
            "Starting fresh".to_string()
        } else {
            labels.join(" -> ")
        };

        let framing = match &self.instruction {
            Some(instruction) => instruction.clone(),
            None => "You are solving this problem by exploring several lines of \
                     reasoning. Consider multiple possible approaches and work \
                     through them systematically."
                .to_string(),
        };

        format!(
            "Task: {}\n\n\
             {}\n\n\
             Previous thoughts (if any):\n{}\n\n\
             Think step by step:\n\
             1. First, identify multiple possible approaches to solve this problem\n\
             2. For each approach, break down the reasoning into clear steps\n\
             3. Evaluate the potential of each path\n\
             4. Choose the most promising direction and explain why\n\n\
             Your reasoning:",
            self.task.problem_statement, framing, prior,
        )
    }
}

/// Check whether a response has reached a conclusion.
fn has_conclusion(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("therefore") || lowered.contains("conclusion")
}

// ============================================================================
// Tests
// ============================================================================
