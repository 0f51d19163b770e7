// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Ollama-backed completion client.
//!
//! This module provides [`OllamaLlm`], a completion client for locally
//! hosted models. It implements the [`Llm`] trait using blocking HTTP
//! requests (via `reqwest::blocking`), keeping the same sync pattern as
//! [`MockLlm`](crate::llm::MockLlm).
//!
//! # Transports
//!
//! - **Http**: the Ollama server API (`POST /api/generate`)
//! - **Cli**: the `ollama` binary as a subprocess (no server needed)
//!
//! # Examples
//!
//! ```ignore
//! use hapui::client::OllamaLlm;
//!
//! // Auto-detect from environment (OLLAMA_HOST or ollama binary in PATH)
//! let llm = OllamaLlm::from_env().unwrap();
//!
//! // Explicit transports
//! let llm = OllamaLlm::http("http://localhost:11434", "qwen2.5:7b");
//! let llm = OllamaLlm::cli("qwen2.5:7b");
//! ```

use crate::error::{Error, Result};
use crate::llm::{Llm, LmOutput};
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;

/// How the client reaches the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Ollama HTTP server API.
    Http {
        /// Base URL of the server (e.g. "http://localhost:11434").
        base_url: String,
    },
    /// Local `ollama` binary (subprocess invocation).
    Cli {
        /// Path to the `ollama` binary.
        path: String,
    },
}

/// Completion client for Ollama-hosted models.
pub struct OllamaLlm {
    client: Option<Client>,
    transport: Transport,
    model: String,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
}

impl OllamaLlm {
    /// Auto-detect a transport from the environment.
    ///
    /// Checked in order:
    /// 1. `OLLAMA_HOST` → HTTP transport against that server
    /// 2. `ollama` binary in PATH → CLI transport
    ///
    /// The model defaults to `HAPUI_MODEL` or "qwen2.5:7b".
    pub fn from_env() -> Result<Self> {
        let model =
            std::env::var("HAPUI_MODEL").unwrap_or_else(|_| "qwen2.5:7b".to_string());

        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            return Ok(Self::http(host, model));
        }

        if let Some(path) = which_ollama() {
            let mut llm = Self::cli(model);
            llm.transport = Transport::Cli { path };
            return Ok(llm);
        }

        Err(Error::completion(
            "No completion provider found. Set OLLAMA_HOST or install the ollama binary.",
        ))
    }

    /// Create a client against an Ollama HTTP server.
    pub fn http(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Some(Client::new()),
            transport: Transport::Http {
                base_url: base_url.into(),
            },
            model: model.into(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout: Duration::from_secs(120),
        }
    }

    /// Create a client driving the local `ollama` binary.
    pub fn cli(model: impl Into<String>) -> Self {
        Self {
            client: None,
            transport: Transport::Cli {
                path: "ollama".to_string(),
            },
            model: model.into(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout: Duration::from_secs(120),
        }
    }

    /// Set the model name.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    /// Set the maximum tokens to generate.
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    /// Set the per-request timeout (HTTP transport only).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the transport being used.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    fn transport_name(&self) -> &'static str {
        match &self.transport {
            Transport::Http { .. } => "http",
            Transport::Cli { .. } => "cli",
        }
    }

    fn call(&self, prompt: &str) -> Result<LmOutput> {
        let _span = tracing::info_span!(
            "completion",
            transport = self.transport_name(),
            model = %self.model,
        )
        .entered();

        let result = match &self.transport {
            Transport::Http { base_url } => self.call_http(base_url, prompt),
            Transport::Cli { path } => self.call_cli(path, prompt),
        };

        match &result {
            Ok(output) => tracing::debug!(
                completion_tokens = output.completion_tokens,
                "completion ok"
            ),
            Err(e) => tracing::warn!(error = %e, "completion failed"),
        }

        result
    }

    fn call_http(&self, base_url: &str, prompt: &str) -> Result<LmOutput> {
        let client = self.client.as_ref().ok_or_else(|| {
            Error::completion("HTTP transport has no client")
        })?;

        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });

        let response = client
            .post(format!("{}/api/generate", base_url.trim_end_matches('/')))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .map_err(|e| Error::completion(format!("Request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| Error::completion(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::completion(format!(
                "Server returned {}: {}",
                status, text
            )));
        }

        parse_generate_response(&text)
    }

    fn call_cli(&self, path: &str, prompt: &str) -> Result<LmOutput> {
        let output = std::process::Command::new(path)
            .args(["run", &self.model, prompt])
            .output()
            .map_err(|e| Error::completion(format!("Failed to execute ollama: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::completion(format!("ollama failed: {}", stderr)));
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|e| Error::completion(format!("ollama output is not valid UTF-8: {}", e)))?
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(Error::completion("ollama produced no output"));
        }

        Ok(LmOutput::new(text))
    }
}

impl Llm for OllamaLlm {
    type CompleteFut<'a> = std::future::Ready<Result<LmOutput>>;

    fn complete<'a>(&'a self, prompt: &'a str) -> Self::CompleteFut<'a> {
        std::future::ready(self.call(prompt))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Parse an Ollama `/api/generate` response body into an [`LmOutput`].
fn parse_generate_response(body: &str) -> Result<LmOutput> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| Error::completion(format!("Malformed response body: {}", e)))?;

    let text = json["response"]
        .as_str()
        .ok_or_else(|| Error::completion("Response missing \"response\" field"))?
        .trim()
        .to_string();

    if text.is_empty() {
        return Err(Error::completion("Model produced no output"));
    }

    let prompt_tokens = json["prompt_eval_count"].as_u64().unwrap_or(0) as u32;
    let completion_tokens = json["eval_count"].as_u64().unwrap_or(0) as u32;

    Ok(LmOutput::with_tokens(text, prompt_tokens, completion_tokens))
}

/// Find the `ollama` binary in PATH or common install locations.
fn which_ollama() -> Option<String> {
    let candidates = [
        "/usr/local/bin/ollama",
        "/usr/bin/ollama",
        "/opt/homebrew/bin/ollama",
    ];

    if let Ok(path_var) = std::env::var("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join("ollama");
            if candidate.is_file() {
                return Some(candidate.to_string_lossy().into_owned());
            }
        }
    }

    candidates
        .iter()
        .find(|p| std::path::Path::new(p).is_file())
        .map(|p| p.to_string())
}

// ============================================================================
// Tests
// ============================================================================
