// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Retry with exponential backoff for completion calls.
//!
//! This module provides [`RetryLlm`], a wrapper that adds automatic retry
//! with exponential backoff to any [`Llm`] implementation. Use the [`LlmExt`]
//! trait to wrap any provider with retry logic. The wrapper only affects
//! transient failures; call sites keep their documented default-value
//! fallbacks for failures that survive the retry budget.
//!
//! # Examples
//!
//! ```
//! use hapui::llm::MockLlm;
//! use hapui::retry::LlmExt;
//!
//! let llm = MockLlm::new(|_| "response".to_string()).with_retry(3);
//! ```

use crate::error::{Error, Result};
use crate::llm::{Llm, LmOutput};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Initial delay before first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

/// A completion wrapper that retries on transient errors.
pub struct RetryLlm<L: Llm> {
    inner: L,
    config: RetryConfig,
}

impl<L: Llm> RetryLlm<L> {
    /// Create a new RetryLlm with the given config.
    pub fn new(inner: L, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

/// Internal state for the retry future.
enum RetryState<'a, L: Llm + 'a> {
    /// Currently awaiting a completion call.
    Generating(Pin<Box<L::CompleteFut<'a>>>),
    /// Sleeping before the next retry.
    Sleeping(Pin<Box<tokio::time::Sleep>>),
}

/// Future returned by `RetryLlm::complete()`.
///
/// Implements a state machine that retries the inner provider on transient
/// errors with exponential backoff delays.
pub struct RetryFut<'a, L: Llm + 'a> {
    llm: &'a L,
    prompt: &'a str,
    config: &'a RetryConfig,
    attempt: u32,
    delay: Duration,
    state: RetryState<'a, L>,
}

// SAFETY: all fields are Unpin: references and Copy types are Unpin,
// Pin<Box<T>> is Unpin, and tokio::time::Sleep is only held boxed.
impl<'a, L: Llm + 'a> Unpin for RetryFut<'a, L> {}

impl<'a, L: Llm + 'a> Future for RetryFut<'a, L> {
    type Output = Result<LmOutput>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            match &mut this.state {
                RetryState::Generating(fut) => match fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(output)) => return Poll::Ready(Ok(output)),
                    Poll::Ready(Err(e))
                        if is_retryable(&e) && this.attempt < this.config.max_retries =>
                    {
                        this.attempt += 1;
                        tracing::debug!(attempt = this.attempt, error = %e, "retrying completion");
                        let sleep = tokio::time::sleep(this.delay);
                        this.state = RetryState::Sleeping(Box::pin(sleep));
                        this.delay = Duration::from_secs_f64(
                            (this.delay.as_secs_f64() * this.config.backoff_factor)
                                .min(this.config.max_delay.as_secs_f64()),
                        );
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                },
                RetryState::Sleeping(sleep) => match sleep.as_mut().poll(cx) {
                    Poll::Ready(()) => {
                        let new_fut = this.llm.complete(this.prompt);
                        this.state = RetryState::Generating(Box::pin(new_fut));
                    }
                    Poll::Pending => return Poll::Pending,
                },
            }
        }
    }
}

impl<L: Llm> Llm for RetryLlm<L> {
    type CompleteFut<'a>
        = RetryFut<'a, L>
    where
        Self: 'a;

    fn complete<'a>(&'a self, prompt: &'a str) -> Self::CompleteFut<'a> {
        let fut = self.inner.complete(prompt);
        RetryFut {
            llm: &self.inner,
            prompt,
            config: &self.config,
            attempt: 0,
            delay: self.config.initial_delay,
            state: RetryState::Generating(Box::pin(fut)),
        }
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Extension trait for adding retry capability to any Llm.
pub trait LlmExt: Llm + Sized {
    /// Wrap this provider with retry logic using the specified attempt count.
    ///
    /// Uses default backoff configuration (500ms initial, 2x backoff, 30s max).
    fn with_retry(self, max_retries: u32) -> RetryLlm<Self> {
        RetryLlm::new(
            self,
            RetryConfig {
                max_retries,
                ..Default::default()
            },
        )
    }

    /// Wrap this provider with retry logic using a custom configuration.
    fn with_retry_config(self, config: RetryConfig) -> RetryLlm<Self> {
        RetryLlm::new(self, config)
    }
}

impl<L: Llm> LlmExt for L {}

/// Check if an error is likely transient and worth retrying.
fn is_retryable(error: &Error) -> bool {
    let msg = error.to_string().to_lowercase();

    // HTTP status codes indicating transient failures
    if msg.contains("429") || msg.contains("rate limit") {
        return true;
    }
    if msg.contains("500") || msg.contains("502") || msg.contains("503") {
        return true;
    }
    if msg.contains("internal server error") || msg.contains("bad gateway") {
        return true;
    }
    if msg.contains("service unavailable") || msg.contains("gateway timeout") {
        return true;
    }

    // Network/connection errors
    if msg.contains("timeout") || msg.contains("timed out") {
        return true;
    }
    if msg.contains("connection") && (msg.contains("reset") || msg.contains("refused")) {
        return true;
    }

    // Overloaded
    if msg.contains("overloaded") || msg.contains("capacity") {
        return true;
    }

    false
}

// ============================================================================
// Tests
// ============================================================================
