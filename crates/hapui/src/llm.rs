// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Completion service trait using Generic Associated Types (GATs).
//!
//! This module provides the [`Llm`] trait which defines the interface for
//! text-completion providers: plain text in, plain text out. Using GATs
//! instead of `async_trait` allows zero-cost async without boxing.
//!
//! Failures are ordinary values here; every consumer in this crate
//! substitutes a documented default instead of propagating them.
//!
//! # Examples
//!
//! ```
//! use hapui::llm::{MockLlm, Llm};
//!
//! let llm = MockLlm::new(|prompt| format!("Echo: {}", prompt));
//! ```

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Output from a completion request.
#[derive(Debug, Clone)]
pub struct LmOutput {
    /// The generated text.
    pub text: String,
    /// Number of prompt tokens used (0 when the provider does not report it).
    pub prompt_tokens: u32,
    /// Number of completion tokens generated.
    pub completion_tokens: u32,
}

impl LmOutput {
    /// Create a new LmOutput with just the text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt_tokens: 0,
            completion_tokens: 0,
        }
    }

    /// Create a new LmOutput with token counts.
    pub fn with_tokens(text: impl Into<String>, prompt: u32, completion: u32) -> Self {
        Self {
            text: text.into(),
            prompt_tokens: prompt,
            completion_tokens: completion,
        }
    }

    /// Get the total token count.
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Trait for text-completion providers.
///
/// The associated type `CompleteFut<'a>` is the future returned by
/// `complete()`. Synchronous providers return `std::future::Ready<T>`;
/// asynchronous ones define their own future type without boxing.
pub trait Llm: Send + Sync {
    /// The future type returned by `complete()`.
    type CompleteFut<'a>: Future<Output = Result<LmOutput>> + Send + 'a
    where
        Self: 'a;

    /// Generate a completion for the given prompt.
    fn complete<'a>(&'a self, prompt: &'a str) -> Self::CompleteFut<'a>;

    /// Get the model name for logging.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// A mock completion service for testing and examples.
///
/// Uses a closure to generate responses synchronously, so reasoning and
/// optimization loops can be exercised without a live model.
pub struct MockLlm<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    generator: F,
    name: &'static str,
}

impl<F> MockLlm<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    /// Create a new mock with the given generator function.
    pub fn new(generator: F) -> Self {
        Self {
            generator,
            name: "mock",
        }
    }

    /// Set a custom name for the mock.
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<F> Llm for MockLlm<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    type CompleteFut<'a>
        = std::future::Ready<Result<LmOutput>>
    where
        Self: 'a;

    fn complete<'a>(&'a self, prompt: &'a str) -> Self::CompleteFut<'a> {
        let text = (self.generator)(prompt);
        std::future::ready(Ok(LmOutput::new(text)))
    }

    fn model_name(&self) -> &str {
        self.name
    }
}

/// A mock that replays a fixed sequence of responses, one per call.
///
/// After the script is exhausted the last response repeats. Useful for
/// testing multi-call flows (generate, score, rewrite, re-score) where
/// each call site expects a different answer.
pub struct SequenceLlm {
    responses: Vec<String>,
    cursor: AtomicUsize,
    name: &'static str,
}

impl SequenceLlm {
    /// Create a new sequenced mock from a response script.
    pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            cursor: AtomicUsize::new(0),
            name: "sequence",
        }
    }

    /// Number of calls served so far.
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Reset the call cursor.
    pub fn reset(&self) {
        self.cursor.store(0, Ordering::SeqCst);
    }
}

impl Llm for SequenceLlm {
    type CompleteFut<'a>
        = std::future::Ready<Result<LmOutput>>
    where
        Self: 'a;

    fn complete<'a>(&'a self, _prompt: &'a str) -> Self::CompleteFut<'a> {
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        let text = match self.responses.get(idx).or_else(|| self.responses.last()) {
            Some(text) => text.clone(),
            None => String::new(),
        };
        std::future::ready(Ok(LmOutput::new(text)))
    }

    fn model_name(&self) -> &str {
        self.name
    }
}

/// A completion service that always fails with a specific error.
///
/// Useful for testing the default-value fallbacks in scoring, clustering,
/// and optimization.
#[derive(Debug, Clone)]
pub struct FailingLlm {
    message: String,
}

impl FailingLlm {
    /// Create a new failing service with the given error message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Llm for FailingLlm {
    type CompleteFut<'a>
        = std::future::Ready<Result<LmOutput>>
    where
        Self: 'a;

    fn complete<'a>(&'a self, _prompt: &'a str) -> Self::CompleteFut<'a> {
        std::future::ready(Err(Error::completion(&self.message)))
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_llm() {
        let llm = MockLlm::new(|prompt| format!("Response: {}", prompt));

        let output = llm.complete("test prompt").await.unwrap();
        assert_eq!(output.text, "Response: test prompt");
    }

    #[tokio::test]
    async fn test_sequence_llm() {
        let llm = SequenceLlm::new(["first", "second", "third"]);

        assert_eq!(llm.complete("a").await.unwrap().text, "first");
        assert_eq!(llm.complete("b").await.unwrap().text, "second");
        assert_eq!(llm.complete("c").await.unwrap().text, "third");
        // Exhausted script repeats the last entry
        assert_eq!(llm.complete("d").await.unwrap().text, "third");
        assert_eq!(llm.calls(), 4);

        llm.reset();
        assert_eq!(llm.complete("e").await.unwrap().text, "first");
    }

    #[tokio::test]
    async fn test_failing_llm() {
        let llm = FailingLlm::new("intentional failure");

        let result = llm.complete("test").await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("intentional failure"));
    }

    #[test]
    fn test_lm_output() {
        let output = LmOutput::new("test");
        assert_eq!(output.text, "test");
        assert_eq!(output.total_tokens(), 0);

        let output = LmOutput::with_tokens("test", 10, 20);
        assert_eq!(output.total_tokens(), 30);
    }

    #[test]
    fn test_mock_name() {
        let llm = MockLlm::new(|_| String::new()).with_name("custom");
        assert_eq!(llm.model_name(), "custom");
    }
}
