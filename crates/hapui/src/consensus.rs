// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Consensus aggregation over reasoning paths.
//!
//! This module provides the [`aggregate`] entry point for reconciling the
//! answers of several reasoning paths into a single consensus. Answers are
//! clustered greedily: each answer joins the first existing cluster whose
//! *representative* (first member) it matches at or above the similarity
//! threshold, otherwise it opens a new cluster. The policy is first-fit in
//! cluster-creation order, with no centroid recomputation, so the result
//! can depend on input ordering; downstream confidence math relies on this
//! exact behavior.
//!
//! Confidence conflates consensus share and self-reported path quality:
//! `(cluster_size / total_paths) * mean(cluster scores)`. Both factors must
//! be high for confidence to be high.

use crate::error::{Error, Result};
use crate::explore::ReasoningPath;
use crate::extract::extract_answer;
use crate::judge::Judge;
use crate::llm::Llm;
use serde::Serialize;
use smallvec::SmallVec;

/// Entry point for consensus aggregation.
pub fn aggregate<'a, L: Llm>(llm: &'a L, paths: &'a [ReasoningPath]) -> Aggregate<'a, L> {
    Aggregate::new(llm, paths)
}

/// An extracted answer paired with its path's score.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnswerRecord {
    /// The extracted answer string.
    pub answer: String,
    /// The originating path's self-reported score.
    pub score: f64,
}

/// A group of answers judged equivalent. Non-empty by construction.
#[derive(Debug, Clone)]
pub struct Cluster {
    members: SmallVec<[AnswerRecord; 4]>,
}

impl Cluster {
    fn new(first: AnswerRecord) -> Self {
        let mut members = SmallVec::new();
        members.push(first);
        Self { members }
    }

    /// The cluster's representative: its first member, used for all
    /// similarity comparisons against incoming answers.
    pub fn representative(&self) -> &AnswerRecord {
        &self.members[0]
    }

    /// All members in insertion order.
    pub fn members(&self) -> &[AnswerRecord] {
        &self.members
    }

    /// Number of members.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Mean member score.
    pub fn mean_score(&self) -> f64 {
        self.members.iter().map(|m| m.score).sum::<f64>() / self.members.len() as f64
    }
}

/// Result of consensus aggregation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AggregationResult {
    /// The highest-scoring answer from the winning cluster.
    pub final_answer: String,
    /// `(cluster_size / total_paths) * mean(cluster scores)`, in [0, 1].
    pub confidence: f64,
    /// All answer strings in the winning cluster. May contain
    /// near-duplicates: extraction is lexical, clustering is semantic.
    pub supporting_answers: Vec<String>,
    /// Size of the winning cluster.
    pub cluster_size: usize,
    /// Number of paths that went in.
    pub total_paths: usize,
}

/// Builder for consensus aggregation.
pub struct Aggregate<'a, L: Llm> {
    llm: &'a L,
    paths: &'a [ReasoningPath],
    threshold: f64,
}

impl<'a, L: Llm> Aggregate<'a, L> {
    /// Create a new builder with the default similarity threshold (0.7).
    pub fn new(llm: &'a L, paths: &'a [ReasoningPath]) -> Self {
        Self {
            llm,
            paths,
            threshold: 0.7,
        }
    }

    /// Set the similarity threshold for joining a cluster.
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Execute synchronously.
    ///
    /// If called inside a tokio runtime, uses `block_in_place`. Otherwise,
    /// creates a new single-threaded runtime.
    pub fn go(self) -> Result<AggregationResult> {
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
    pub async fn run(self) -> Result<AggregationResult> {
        if self.paths.is_empty() {
            return Err(Error::EmptyPaths);
        }

        let _span = tracing::info_span!(
            "aggregate",
            paths = self.paths.len(),
            threshold = self.threshold,
        )
        .entered();

        let records: Vec<AnswerRecord> = self
            .paths
            .iter()
            .map(|p| AnswerRecord {
                answer: extract_answer(&p.final_text),
                score: p.score,
            })
            .collect();

        let clusters = self.cluster(records).await;

        // Best cluster by (size, mean score), size dominant; strict
        // comparison keeps the earliest-created cluster on ties.
        let mut best = &clusters[0];
        for cluster in &clusters[1..] {
            if cluster.size() > best.size()
                || (cluster.size() == best.size() && cluster.mean_score() > best.mean_score())
            {
                best = cluster;
            }
        }

        let confidence =
            (best.size() as f64 / self.paths.len() as f64) * best.mean_score();

        // Highest-scoring member wins; the first such member on ties.
        let mut top = &best.members()[0];
        for member in &best.members()[1..] {
            if member.score > top.score {
                top = member;
            }
        }

        let result = AggregationResult {
            final_answer: top.answer.clone(),
            confidence: confidence.clamp(0.0, 1.0),
            supporting_answers: best.members().iter().map(|m| m.answer.clone()).collect(),
            cluster_size: best.size(),
            total_paths: self.paths.len(),
        };

        tracing::info!(
            clusters = clusters.len(),
            cluster_size = result.cluster_size,
            confidence = result.confidence,
            "aggregation complete"
        );

        Ok(result)
    }

    /// Greedy single-link clustering: first fitting cluster wins, in
    /// cluster-creation order.
    async fn cluster(&self, records: Vec<AnswerRecord>) -> Vec<Cluster> {
        let judge = Judge::new(self.llm);
        let mut clusters: Vec<Cluster> = Vec::new();

        for record in records {
            let mut target: Option<usize> = None;

            for (idx, cluster) in clusters.iter().enumerate() {
                let similarity = judge
                    .similarity(&record.answer, &cluster.representative().answer)
                    .await;
                tracing::debug!(
                    answer = %record.answer,
                    representative = %cluster.representative().answer,
                    similarity,
                    "compared against cluster"
                );
                if similarity >= self.threshold {
                    target = Some(idx);
                    break;
                }
            }

            match target {
                Some(idx) => clusters[idx].members.push(record),
                None => clusters.push(Cluster::new(record)),
            }
        }

        clusters
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FailingLlm, MockLlm};

    fn path(text: &str, score: f64) -> ReasoningPath {
        ReasoningPath {
            steps: vec![text.to_string()],
            final_text: text.to_string(),
            score,
        }
    }

    /// Similarity mock: "1.0" when both quoted answers mention 60, else "0.3".
    fn speed_judge() -> MockLlm<impl Fn(&str) -> String> {
        MockLlm::new(|prompt| {
            let both_60 = prompt.matches("60 km/h").count() >= 2;
            if both_60 { "1.0" } else { "0.3" }.to_string()
        })
    }

    #[test]
    fn test_aggregate_consensus_scenario() {
        let paths = vec![
            path("Therefore, the answer is 60 km/h.", 0.9),
            path("Therefore, the answer is 60 km/h.", 0.85),
            path("Therefore, the answer is 70 km/h.", 0.6),
        ];
        let llm = speed_judge();

        let result = aggregate(&llm, &paths).go().unwrap();

        assert_eq!(result.cluster_size, 2);
        assert_eq!(result.total_paths, 3);
        assert_eq!(result.final_answer, "60 km/h");
        assert_eq!(result.supporting_answers.len(), 2);
        // (2/3) * ((0.9 + 0.85) / 2)
        assert!((result.confidence - 2.0 / 3.0 * 0.875).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_empty_paths() {
        let llm = speed_judge();
        let paths: Vec<ReasoningPath> = vec![];

        let err = aggregate(&llm, &paths).go().unwrap_err();
        assert!(matches!(err, Error::EmptyPaths));
    }

    #[test]
    fn test_aggregate_similarity_failure_gives_singletons() {
        // A failing judge yields 0.0 similarity, so nothing clusters.
        let paths = vec![
            path("Therefore, 60 km/h.", 0.9),
            path("Therefore, 60 km/h.", 0.8),
        ];
        let llm = FailingLlm::new("down");

        let result = aggregate(&llm, &paths).go().unwrap();

        assert_eq!(result.cluster_size, 1);
        assert_eq!(result.total_paths, 2);
        // Two singletons tie on size; the first-created cluster wins
        // because its mean score is higher.
        assert!((result.confidence - 0.5 * 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_size_dominates_mean_score() {
        // One low-scoring pair vs one high-scoring singleton: the pair wins.
        let paths = vec![
            path("Therefore, 60 km/h.", 0.2),
            path("Therefore, 60 km/h.", 0.3),
            path("Therefore, 70 km/h.", 0.99),
        ];
        let llm = speed_judge();

        let result = aggregate(&llm, &paths).go().unwrap();

        assert_eq!(result.cluster_size, 2);
        assert_eq!(result.final_answer, "60 km/h");
    }

    #[test]
    fn test_aggregate_final_answer_is_best_member() {
        // The representative has a lower score than a later member; the
        // final answer comes from the highest-scoring member.
        let paths = vec![
            path("Therefore, roughly 60 km/h.", 0.5),
            path("Therefore, exactly 60 km/h.", 0.95),
        ];
        let llm = speed_judge();

        let result = aggregate(&llm, &paths).go().unwrap();

        assert_eq!(result.cluster_size, 2);
        assert_eq!(result.final_answer, "exactly 60 km/h");
    }

    #[test]
    fn test_aggregate_idempotent() {
        let paths = vec![
            path("Therefore, 60 km/h.", 0.9),
            path("Therefore, 60 km/h.", 0.85),
            path("Therefore, 70 km/h.", 0.6),
        ];
        let llm = speed_judge();

        let first = aggregate(&llm, &paths).go().unwrap();
        let second = aggregate(&llm, &paths).go().unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_supporting_answers_bounded_by_total() {
        let paths = vec![
            path("Therefore, 60 km/h.", 0.9),
            path("Therefore, 60 km/h.", 0.8),
            path("Therefore, 60 km/h.", 0.7),
        ];
        let llm = speed_judge();

        let result = aggregate(&llm, &paths).go().unwrap();

        assert!(result.supporting_answers.len() <= result.total_paths);
        assert_eq!(result.supporting_answers.len(), result.cluster_size);
    }

    #[test]
    fn test_cluster_accessors() {
        let cluster = Cluster::new(AnswerRecord {
            answer: "42".to_string(),
            score: 0.8,
        });

        assert_eq!(cluster.size(), 1);
        assert_eq!(cluster.representative().answer, "42");
        assert!((cluster.mean_score() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_threshold_clamped() {
        let llm = speed_judge();
        let paths = vec![path("Therefore, 60 km/h.", 0.9)];
        let builder = aggregate(&llm, &paths).threshold(1.7);
        assert!((builder.threshold - 1.0).abs() < f64::EPSILON);
    }
}
