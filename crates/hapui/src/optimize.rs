// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Prompt optimization via greedy hill-climbing.
//!
//! This module provides the [`optimize`] entry point. The optimizer
//! evaluates the current prompt's performance, asks the completion service
//! for a rewrite targeting the observed deficiencies, tests the rewrite
//! with a single completion, and keeps it only when its overall score
//! strictly improves. The first non-improving rewrite stops the climb;
//! `max_iter` is an upper bound, not a target.
//!
//! The climb is an explicit state machine (`Proposing -> Testing ->
//! Accepted | Stopped`) so the stop-on-first-non-improvement policy is a
//! visible transition rather than buried control flow.

use crate::consensus::AggregationResult;
use crate::judge::Judge;
use crate::llm::Llm;
use crate::task::Task;
use crate::version::{Progression, VersionStore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entry point for prompt optimization.
pub fn optimize<'a, L: Llm>(
    llm: &'a L,
    prompt: impl Into<String>,
    task: &'a Task,
) -> Optimize<'a, L> {
    Optimize::new(llm, prompt, task)
}

/// Performance metrics for one prompt iteration. All components in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMetrics {
    /// Aggregation confidence.
    pub confidence: f64,
    /// Fraction of paths in the consensus cluster.
    pub consistency: f64,
    /// Model-judged equivalence to the expected answer.
    pub correctness: f64,
    /// Weighted composite: 0.3·confidence + 0.3·consistency + 0.4·correctness.
    pub overall_score: f64,
}

impl PromptMetrics {
    /// Build metrics from components, computing the composite.
    pub fn from_components(confidence: f64, consistency: f64, correctness: f64) -> Self {
        Self {
            confidence,
            consistency,
            correctness,
            overall_score: 0.3 * confidence + 0.3 * consistency + 0.4 * correctness,
        }
    }

    /// The metrics as (name, value) pairs, in a fixed order.
    pub fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("confidence", self.confidence),
            ("consistency", self.consistency),
            ("correctness", self.correctness),
            ("overall_score", self.overall_score),
        ]
    }
}

/// What a prompt evaluation looks at.
///
/// Built from a full [`AggregationResult`] for the seed evaluation, or from
/// a bare test response when probing a rewrite.
#[derive(Debug, Clone, Default)]
pub struct EvalInput<'e> {
    /// The answer under evaluation.
    pub final_answer: &'e str,
    /// Aggregation confidence, 0 when unknown.
    pub confidence: f64,
    /// Number of supporting answers.
    pub supporting: usize,
    /// Total paths behind the result.
    pub total_paths: usize,
}

impl<'e> From<&'e AggregationResult> for EvalInput<'e> {
    fn from(result: &'e AggregationResult) -> Self {
        Self {
            final_answer: &result.final_answer,
            confidence: result.confidence,
            supporting: result.supporting_answers.len(),
            total_paths: result.total_paths,
        }
    }
}

/// Evaluate prompt performance against a task.
///
/// Correctness is 0 unless the task carries an expected answer, in which
/// case it is model-judged (default 0 on failure). The consistency
/// denominator defaults to 1 so a resultless probe scores 0, not NaN.
pub async fn evaluate<L: Llm>(llm: &L, input: EvalInput<'_>, task: &Task) -> PromptMetrics {
    let consistency = input.supporting as f64 / input.total_paths.max(1) as f64;

    let correctness = match &task.expected_answer {
        Some(expected) => Judge::new(llm).correctness(input.final_answer, expected).await,
        None => 0.0,
    };

    PromptMetrics::from_components(input.confidence, consistency, correctness)
}

/// Why the hill-climb stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The service returned no rewrite.
    NoRewrite,
    /// A rewrite failed to strictly improve the overall score.
    NotImproved,
    /// The iteration budget ran out.
    MaxIterations,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRewrite => write!(f, "no rewrite returned"),
            Self::NotImproved => write!(f, "no improvement"),
            Self::MaxIterations => write!(f, "max iterations"),
        }
    }
}

/// One step of the climb, for the outcome history.
#[derive(Debug, Clone, Serialize)]
pub struct ClimbRecord {
    /// 1-based iteration number.
    pub iteration: u32,
    /// The rewritten prompt that was tested.
    pub prompt: String,
    /// Metrics the rewrite achieved on its test completion.
    pub metrics: PromptMetrics,
    /// Whether the rewrite was adopted.
    pub accepted: bool,
}

/// Result of a prompt optimization run.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The best prompt found (the original when nothing improved).
    pub optimized_prompt: String,
    /// The prompt the climb started from.
    pub original_prompt: String,
    /// Metrics of the best prompt.
    pub metrics: PromptMetrics,
    /// Per-iteration history of tested rewrites.
    pub history: Vec<ClimbRecord>,
    /// Number of iterations entered.
    pub iterations: u32,
    /// Why the climb stopped.
    pub stop_reason: StopReason,
    /// Cross-version performance progression, when a store was attached.
    pub progression: Option<Progression>,
}

/// Hill-climb state. One transition per completion round.
enum Climb {
    /// Ask the service for a rewrite of the current prompt.
    Proposing,
    /// Test the candidate rewrite with a single completion.
    Testing(String),
    /// The rewrite strictly improved the overall score.
    Accepted {
        prompt: String,
        metrics: PromptMetrics,
    },
    /// The climb is over.
    Stopped(StopReason),
}

/// Builder for prompt optimization.
pub struct Optimize<'a, L: Llm> {
    llm: &'a L,
    prompt: String,
    task: &'a Task,
    results: Option<&'a AggregationResult>,
    max_iter: u32,
    store: Option<&'a VersionStore>,
}

impl<'a, L: Llm> Optimize<'a, L> {
    /// Create a new builder with the default iteration budget (3).
    pub fn new(llm: &'a L, prompt: impl Into<String>, task: &'a Task) -> Self {
        Self {
            llm,
            prompt: prompt.into(),
            task,
            results: None,
            max_iter: 3,
            store: None,
        }
    }

    /// Seed the climb with aggregation results for the current prompt.
    pub fn results(mut self, results: &'a AggregationResult) -> Self {
        self.results = Some(results);
        self
    }

    /// Set the iteration budget (default: 3).
    pub fn max_iter(mut self, n: u32) -> Self {
        self.max_iter = n;
        self
    }

    /// Persist accepted rewrites to a version store.
    pub fn store(mut self, store: &'a VersionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Execute synchronously.
    ///
    /// If called inside a tokio runtime, uses `block_in_place`. Otherwise,
    /// creates a new single-threaded runtime.
    pub fn go(self) -> Outcome {
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
    pub async fn run(self) -> Outcome {
        let _span = tracing::info_span!(
            "optimize",
            task = %self.task.id,
            max_iter = self.max_iter,
        )
        .entered();

        let seed_input = self
            .results
            .map(EvalInput::from)
            .unwrap_or_default();
        let seed = evaluate(self.llm, seed_input, self.task).await;

        let original_prompt = self.prompt.clone();
        let mut current = self.prompt.clone();
        let mut best_prompt = self.prompt.clone();
        let mut best = seed;
        let mut history: Vec<ClimbRecord> = Vec::new();
        let mut stop_reason = StopReason::MaxIterations;
        let mut iterations = 0u32;

        'climb: for iter in 0..self.max_iter {
            iterations = iter + 1;
            let mut state = Climb::Proposing;

            loop {
                state = match state {
                    Climb::Proposing => {
                        let request = self.improvement_prompt(&current);
                        match self.llm.complete(&request).await {
                            Ok(output) if !output.text.trim().is_empty() => {
                                Climb::Testing(output.text.trim().to_string())
                            }
                            _ => Climb::Stopped(StopReason::NoRewrite),
                        }
                    }
                    Climb::Testing(rewrite) => {
                        let test = match self.llm.complete(&rewrite).await {
                            Ok(output) if !output.text.is_empty() => output.text,
                            // Probe failed: this iteration is lost, but the
                            // climb goes on from the same prompt.
                            _ => {
                                tracing::debug!(iteration = iterations, "rewrite probe failed");
                                continue 'climb;
                            }
                        };

                        let input = EvalInput {
                            final_answer: &test,
                            ..EvalInput::default()
                        };
                        let metrics = evaluate(self.llm, input, self.task).await;

                        if metrics.overall_score > best.overall_score {
                            Climb::Accepted {
                                prompt: rewrite,
                                metrics,
                            }
                        } else {
                            history.push(ClimbRecord {
                                iteration: iterations,
                                prompt: rewrite,
                                metrics,
                                accepted: false,
                            });
                            Climb::Stopped(StopReason::NotImproved)
                        }
                    }
                    Climb::Accepted { prompt, metrics } => {
                        history.push(ClimbRecord {
                            iteration: iterations,
                            prompt: prompt.clone(),
                            metrics: metrics.clone(),
                            accepted: true,
                        });

                        if let Some(store) = self.store {
                            if let Err(e) =
                                store.save(&self.task.id, &prompt, &metrics, false)
                            {
                                tracing::warn!(error = %e, "failed to persist prompt version");
                            }
                        }

                        tracing::info!(
                            iteration = iterations,
                            overall = metrics.overall_score,
                            "rewrite accepted"
                        );

                        current = prompt.clone();
                        best_prompt = prompt;
                        best = metrics;
                        continue 'climb;
                    }
                    Climb::Stopped(reason) => {
                        stop_reason = reason;
                        break 'climb;
                    }
                };
            }
        }

        tracing::info!(
            iterations,
            stop = %stop_reason,
            overall = best.overall_score,
            "optimization finished"
        );

        let progression = self
            .store
            .and_then(|store| store.progression(&self.task.id).ok());

        Outcome {
            optimized_prompt: best_prompt,
            original_prompt,
            metrics: best,
            history,
            iterations,
            stop_reason,
            progression,
        }
    }

    /// Build the rewrite request for the current prompt.
    ///
    /// Deficiency lines are included only when they apply.
    fn improvement_prompt(&self, current: &str) -> String {
        let confidence = self.results.map(|r| r.confidence).unwrap_or(0.0);
        let final_answer = self
            .results
            .map(|r| r.final_answer.as_str())
            .unwrap_or("N/A");
        let supporting: Vec<&str> = self
            .results
            .map(|r| r.supporting_answers.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let mut issues: Vec<&str> = Vec::new();
        if confidence < 0.7 {
            issues.push("Low confidence");
        }
        if supporting.len() < 2 {
            issues.push("Inconsistent answers");
        }
        if let Some(expected) = &self.task.expected_answer {
            if expected.as_str() != final_answer {
                issues.push("Incorrect answer");
            }
        }

        let issue_list = issues
            .iter()
            .enumerate()
            .map(|(i, issue)| format!("{}. {}", i + 1, issue))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Analyze and improve the following prompt that produced suboptimal results:\n\n\
             Original Prompt:\n{}\n\n\
             Task Description:\n{}\n\n\
             Expected Answer:\n{}\n\n\
             Current Results:\n\
             - Confidence: {:.2}\n\
             - Answer: {}\n\
             - Supporting Answers: [{}]\n\n\
             Issues to address:\n{}\n\n\
             Provide an improved version of the prompt that:\n\
             1. Is more specific and clearer\n\
             2. Better guides the reasoning process\n\
             3. Reduces ambiguity\n\
             4. Encourages consistent outputs\n\n\
             Return only the improved prompt text.",
            current,
            self.task.problem_statement,
            self.task.expected_answer.as_deref().unwrap_or("Not provided"),
            confidence,
            final_answer,
            supporting.join(", "),
            issue_list,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FailingLlm, MockLlm, SequenceLlm};

    fn agg(final_answer: &str, confidence: f64, supporting: usize, total: usize) -> AggregationResult {
        AggregationResult {
            final_answer: final_answer.to_string(),
            confidence,
            supporting_answers: vec![final_answer.to_string(); supporting],
            cluster_size: supporting,
            total_paths: total,
        }
    }

    #[tokio::test]
    async fn test_evaluate_weights() {
        let llm = MockLlm::new(|_| "1.0".to_string());
        let task = Task::new("t", "q").with_expected("42");
        let results = agg("42", 0.9, 3, 3);

        let metrics = evaluate(&llm, EvalInput::from(&results), &task).await;

        assert!((metrics.confidence - 0.9).abs() < f64::EPSILON);
        assert!((metrics.consistency - 1.0).abs() < f64::EPSILON);
        assert!((metrics.correctness - 1.0).abs() < f64::EPSILON);
        // 0.3*0.9 + 0.3*1.0 + 0.4*1.0
        assert!((metrics.overall_score - 0.97).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_evaluate_without_expected_answer() {
        let llm = FailingLlm::new("down");
        let task = Task::new("t", "q");
        let results = agg("42", 0.6, 2, 4);

        let metrics = evaluate(&llm, EvalInput::from(&results), &task).await;

        // No expected answer: correctness is 0 without any service call.
        assert_eq!(metrics.correctness, 0.0);
        assert!((metrics.consistency - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_evaluate_zero_denominator_guard() {
        let llm = MockLlm::new(|_| "0.0".to_string());
        let task = Task::new("t", "q");
        let input = EvalInput::default();

        let metrics = evaluate(&llm, input, &task).await;
        assert_eq!(metrics.consistency, 0.0);
        assert!(!metrics.overall_score.is_nan());
    }

    #[test]
    fn test_optimize_stops_when_no_rewrite() {
        let llm = FailingLlm::new("down");
        let task = Task::new("t", "q");
        let results = agg("42", 0.5, 1, 3);

        let outcome = optimize(&llm, "initial prompt", &task)
            .results(&results)
            .go();

        assert_eq!(outcome.optimized_prompt, "initial prompt");
        assert_eq!(outcome.stop_reason, StopReason::NoRewrite);
        assert!(outcome.history.is_empty());
        // Seed metrics survive: 0.3*0.5 + 0.3*(1/3)
        assert!((outcome.metrics.overall_score - (0.15 + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_optimize_accepts_then_stops_on_plateau() {
        // Script, in call order:
        //   1. seed correctness        -> "0"
        //   2. rewrite proposal        -> improved prompt
        //   3. rewrite probe           -> test answer
        //   4. probe correctness       -> "0.9"  (accepted: 0.36 > 0)
        //   5. second proposal         -> another prompt
        //   6. second probe            -> test answer
        //   7. probe correctness       -> "0.5"  (0.2 < 0.36: stop)
        let llm = SequenceLlm::new([
            "0",
            "Improved prompt",
            "The answer is 42",
            "0.9",
            "Another prompt",
            "The answer is 42",
            "0.5",
        ]);
        let task = Task::new("t", "q").with_expected("42");
        let results = agg("nothing", 0.0, 0, 3);

        let outcome = optimize(&llm, "initial prompt", &task)
            .results(&results)
            .max_iter(5)
            .go();

        assert_eq!(outcome.optimized_prompt, "Improved prompt");
        assert_eq!(outcome.original_prompt, "initial prompt");
        assert_eq!(outcome.stop_reason, StopReason::NotImproved);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.history.len(), 2);
        assert!(outcome.history[0].accepted);
        assert!(!outcome.history[1].accepted);
        assert!((outcome.metrics.overall_score - 0.36).abs() < 1e-9);
    }

    #[test]
    fn test_optimize_monotonic_best() {
        // Rewrites never improve: best stays the seed evaluation.
        let llm = SequenceLlm::new(["0.8", "A rewrite", "test", "0.1"]);
        let task = Task::new("t", "q").with_expected("42");
        let results = agg("42", 0.9, 3, 3);

        let seed_overall = 0.3 * 0.9 + 0.3 * 1.0 + 0.4 * 0.8;
        let outcome = optimize(&llm, "initial", &task).results(&results).go();

        assert!(outcome.metrics.overall_score >= seed_overall - 1e-9);
        assert_eq!(outcome.optimized_prompt, "initial");
        assert_eq!(outcome.stop_reason, StopReason::NotImproved);
    }

    #[test]
    fn test_optimize_exhausts_iteration_budget() {
        // Every rewrite improves (correctness keeps climbing), so the loop
        // only stops when the budget runs out.
        let llm = SequenceLlm::new([
            "0", // seed correctness
            "P1", "42", "0.2", // iter 1: accepted
            "P2", "42", "0.5", // iter 2: accepted
        ]);
        let task = Task::new("t", "q").with_expected("42");
        let results = agg("nothing", 0.0, 0, 3);

        let outcome = optimize(&llm, "initial", &task)
            .results(&results)
            .max_iter(2)
            .go();

        assert_eq!(outcome.stop_reason, StopReason::MaxIterations);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.optimized_prompt, "P2");
        assert_eq!(outcome.history.len(), 2);
        assert!(outcome.history.iter().all(|r| r.accepted));
    }

    #[test]
    fn test_improvement_prompt_deficiency_lines() {
        let llm = MockLlm::new(|_| String::new());
        let task = Task::new("t", "q").with_expected("42");
        let results = agg("41", 0.5, 1, 3);

        let builder = optimize(&llm, "p", &task).results(&results);
        let prompt = builder.improvement_prompt("p");

        assert!(prompt.contains("1. Low confidence"));
        assert!(prompt.contains("2. Inconsistent answers"));
        assert!(prompt.contains("3. Incorrect answer"));
    }

    #[test]
    fn test_improvement_prompt_omits_inapplicable_issues() {
        let llm = MockLlm::new(|_| String::new());
        let task = Task::new("t", "q").with_expected("42");
        let results = agg("42", 0.9, 3, 3);

        let builder = optimize(&llm, "p", &task).results(&results);
        let prompt = builder.improvement_prompt("p");

        assert!(!prompt.contains("Low confidence"));
        assert!(!prompt.contains("Inconsistent answers"));
        assert!(!prompt.contains("Incorrect answer"));
    }

    #[test]
    fn test_metrics_named_order() {
        let metrics = PromptMetrics::from_components(0.1, 0.2, 0.3);
        let named = metrics.named();
        assert_eq!(named[0].0, "confidence");
        assert_eq!(named[3].0, "overall_score");
        assert!((named[3].1 - (0.03 + 0.06 + 0.12)).abs() < 1e-9);
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::NoRewrite.to_string(), "no rewrite returned");
        assert_eq!(StopReason::NotImproved.to_string(), "no improvement");
        assert_eq!(StopReason::MaxIterations.to_string(), "max iterations");
    }
}
