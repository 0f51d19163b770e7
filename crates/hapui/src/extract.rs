// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Final-answer extraction from free-form reasoning text.
//!
//! [`extract_answer`] scans the lower-cased text for conclusion markers
//! ("therefore", "conclusion:", "final answer:", "thus") and returns the
//! *last* match for the first pattern that hits anywhere, since later
//! restatements supersede earlier ones. When no marker matches, the last
//! non-empty sentence of the raw text is used. The function is total: bad
//! input produces a sentinel string, never an error.
//!
//! # Examples
//!
//! ```
//! use hapui::extract::extract_answer;
//!
//! let text = "The train's speed is 60 km/h. Therefore, the answer is 60 km/h.";
//! assert!(extract_answer(text).contains("60 km/h"));
//! ```

use regex::Regex;
use std::sync::OnceLock;

/// Sentinel for empty input.
pub const NO_ANSWER: &str = "No answer available";
/// Sentinel for text with no extractable sentence.
pub const NO_CLEAR_ANSWER: &str = "No clear answer found";
/// Sentinel for an internal extraction failure.
pub const EXTRACT_ERROR: &str = "Error extracting answer";

fn conclusion_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"therefore,?\s*(the\s*)?(?:answer\s*is\s*)?([^.]+)",
            r"conclusion:?\s*([^.]+)",
            r"final\s*answer:?\s*([^.]+)",
            r"thus,?\s*(the\s*)?(?:answer\s*is\s*)?([^.]+)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid literal pattern"))
        .collect()
    })
}

/// Extract the final answer from a reasoning text.
///
/// Never fails; returns a sentinel when nothing can be extracted.
pub fn extract_answer(reasoning: &str) -> String {
    if reasoning.is_empty() {
        return NO_ANSWER.to_string();
    }

    let lowered = reasoning.to_lowercase();

    for pattern in conclusion_patterns() {
        // Take the last match: the final conclusion supersedes earlier ones.
        if let Some(caps) = pattern.captures_iter(&lowered).last() {
            let group = match caps.get(2).or_else(|| caps.get(1)) {
                Some(m) => m.as_str().trim(),
                None => return EXTRACT_ERROR.to_string(),
            };
            if !group.is_empty() {
                return group.to_string();
            }
        }
    }

    // No marker matched: fall back to the last non-empty sentence, keeping
    // the original casing.
    if let Some(sentence) = reasoning
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .next_back()
    {
        return sentence.to_string();
    }

    NO_CLEAR_ANSWER.to_string()
}

// ============================================================================
// Tests
// ============================================================================
