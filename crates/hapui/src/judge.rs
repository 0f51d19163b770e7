// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Model-judged numeric scoring.
//!
//! Path quality, answer similarity, and answer correctness all reduce to the
//! same shape: ask the completion service for a number, parse defensively,
//! fall back to a documented default. [`Judge`] is that shared capability;
//! the per-call-site defaults are:
//!
//! - path rating → 0.5
//! - answer similarity → 0.0
//! - answer correctness → 0.0
//!
//! Parsing takes the first numeric token in the response, folds values
//! above 1 as percentages, and clamps to [0, 1]. A response with no usable
//! number is treated exactly like a failed call.

use crate::llm::Llm;
use crate::task::Task;
use regex::Regex;
use std::sync::OnceLock;

/// Shared judging capability over a completion service.
pub struct Judge<'a, L: Llm> {
    llm: &'a L,
}

impl<'a, L: Llm> Judge<'a, L> {
    /// Create a judge over the given provider.
    pub fn new(llm: &'a L) -> Self {
        Self { llm }
    }

    /// Rate a complete reasoning path in [0, 1]. Defaults to 0.5.
    pub async fn rate_path(&self, task: &Task, reasoning: &str) -> f64 {
        let prompt = format!(
            "Evaluate the following reasoning path for solving this problem:\n\n\
             Problem: {}\n\
             Expected Answer: {}\n\n\
             Reasoning Path:\n{}\n\n\
             Rate this reasoning path from 0 to 1 based on:\n\
             1. Logical coherence\n\
             2. Step-by-step clarity\n\
             3. Likelihood of reaching the correct solution\n\n\
             Provide only the numerical score.",
            task.problem_statement,
            task.expected_answer.as_deref().unwrap_or("Not provided"),
            reasoning,
        );
        self.ask(&prompt, 0.5).await
    }

    /// Judge the equivalence of two answers in [0, 1]. Defaults to 0.0.
    pub async fn similarity(&self, answer1: &str, answer2: &str) -> f64 {
        let prompt = format!(
            "Rate the similarity between these two answers from 0 to 1:\n\n\
             Answer 1: {}\n\
             Answer 2: {}\n\n\
             Consider:\n\
             1. Numerical equivalence (if numbers are present)\n\
             2. Semantic meaning\n\
             3. Units and format\n\n\
             Your response must be ONLY a number between 0 and 1. \
             Do not include any other text.",
            answer1, answer2,
        );
        self.ask(&prompt, 0.0).await
    }

    /// Judge a produced answer against a reference in [0, 1]. Defaults to 0.0.
    pub async fn correctness(&self, given: &str, expected: &str) -> f64 {
        let prompt = format!(
            "Rate the correctness of this answer from 0 to 1:\n\n\
             Given Answer: {}\n\
             Expected Answer: {}\n\n\
             Consider:\n\
             1. Numerical accuracy\n\
             2. Units and format\n\
             3. Semantic equivalence\n\n\
             Provide only the numerical score.",
            given, expected,
        );
        self.ask(&prompt, 0.0).await
    }

    async fn ask(&self, prompt: &str, default: f64) -> f64 {
        match self.llm.complete(prompt).await {
            Ok(output) => match parse_score(&output.text) {
                Some(score) => score,
                None => {
                    tracing::warn!(
                        response = %output.text.chars().take(80).collect::<String>(),
                        default,
                        "no numeric judgment in response"
                    );
                    default
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, default, "judgment call failed");
                default
            }
        }
    }
}

/// Parse the first numeric token of a judgment response into [0, 1].
///
/// Values above 1 are treated as percentages and divided by 100 before
/// clamping. Returns `None` when the text contains no digits.
pub fn parse_score(text: &str) -> Option<f64> {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    let re = NUMBER.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid literal pattern"));

    let token = re.find(text)?;
    let mut value: f64 = token.as_str().parse().ok()?;

    if value > 1.0 {
        value /= 100.0;
    }

    Some(value.clamp(0.0, 1.0))
}

// ============================================================================
// Tests
// ============================================================================
