// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! # Hapui - Consensus Reasoning and Prompt Optimization
//!
//! Library for multi-sample reasoning over a text-completion service:
//! generate several independent reasoning attempts, reconcile their answers
//! into a consensus with a confidence score, and, when the consensus is
//! weak, hill-climb the guiding prompt, keeping a versioned history of
//! prompt/performance pairs.
//!
//! ## Architecture
//!
//! - **[`llm`]**: the completion-service trait (GAT futures, no boxing)
//!   with mock, sequence, and failing providers for tests
//! - **[`explore`]**: fan a task out over N self-scored reasoning paths
//! - **[`consensus`]**: cluster extracted answers by model-judged
//!   similarity and pick a consensus with a confidence score
//! - **[`optimize`]**: greedy prompt hill-climb with early stop
//! - **[`version`]**: append-only prompt version store with metric deltas
//! - **[`pipeline`]**: one-call orchestration per task
//!
//! ## Quick Start
//!
//! ```
//! use hapui::prelude::*;
//!
//! let llm = MockLlm::new(|prompt| {
//!     if prompt.contains("Rate") {
//!         "0.9".to_string()
//!     } else {
//!         "120 / 2 = 60. Therefore, the answer is 60 km/h.".to_string()
//!     }
//! });
//! let task = Task::new("train", "A train covers 120 km in 2 hours. Average speed?");
//!
//! let paths = explore(&llm, &task).paths(3).go();
//! let result = aggregate(&llm, &paths).go().unwrap();
//! assert_eq!(result.final_answer, "60 km/h");
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod consensus;
pub mod error;
pub mod explore;
pub mod extract;
pub mod judge;
pub mod llm;
pub mod optimize;
pub mod pipeline;
pub mod retry;
pub mod task;
pub mod version;

// Re-exports for convenience
pub use client::{OllamaLlm, Transport};
pub use consensus::{aggregate, Aggregate, AggregationResult, AnswerRecord, Cluster};
pub use error::{Error, Result};
pub use explore::{explore, Explore, ReasoningPath};
pub use extract::{extract_answer, EXTRACT_ERROR, NO_ANSWER, NO_CLEAR_ANSWER};
pub use judge::{parse_score, Judge};
pub use llm::{FailingLlm, Llm, LmOutput, MockLlm, SequenceLlm};
pub use optimize::{
    evaluate, optimize, ClimbRecord, EvalInput, Optimize, Outcome, PromptMetrics, StopReason,
};
pub use pipeline::{base_prompt, Pipeline, RunMetrics, RunReport};
pub use retry::{LlmExt, RetryConfig, RetryLlm};
pub use task::{task_files, Task};
pub use version::{MetricDelta, Progression, PromptVersion, StepDelta, VersionStore};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::llm::{FailingLlm, Llm, LmOutput, MockLlm, SequenceLlm};
    pub use crate::retry::LlmExt;
    pub use crate::task::Task;
    pub use crate::{aggregate, explore, optimize};
    pub use crate::{AggregationResult, Outcome, Pipeline, PromptMetrics, ReasoningPath};
    pub use crate::{OllamaLlm, VersionStore};
}

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
