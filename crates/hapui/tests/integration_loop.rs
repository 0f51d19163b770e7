// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! End-to-end test of the generate → aggregate → optimize → record loop
//! against a deterministic scripted model.

use hapui::prelude::*;
use hapui::version::VersionStore;

/// A scripted model for the whole loop.
///
/// Paths rate poorly and their answers are judged dissimilar, forcing
/// optimization; the rewrite's probe response judges as more correct than
/// the bare consensus answer, so exactly one rewrite is accepted before
/// the climb plateaus.
fn loop_model() -> MockLlm<impl Fn(&str) -> String> {
    MockLlm::new(|prompt| {
        if prompt.contains("Rate this reasoning") {
            "0.5".to_string()
        } else if prompt.contains("Rate the similarity") {
            "0.2".to_string()
        } else if prompt.contains("Rate the correctness") {
            if prompt.contains("Given Answer: 60 km/h\n") {
                "0.3".to_string()
            } else {
                "0.9".to_string()
            }
        } else if prompt.contains("improved version of the prompt") {
            "State the speed with units, showing the division explicitly.".to_string()
        } else {
            "120 km over 2 hours means 120 / 2 = 60. Therefore, the answer is 60 km/h."
                .to_string()
        }
    })
}

#[test]
fn full_loop_optimizes_and_records() {
    let dir = tempfile::tempdir().unwrap();
    let llm = loop_model();
    let task = Task::new("train_speed", "A train travels 120 km in 2 hours. Average speed?")
        .with_expected("60 km/h");

    // Three singleton clusters at self-score 0.5: confidence is
    // (1/3) * 0.5 ≈ 0.17, well below the 0.8 floor.
    let report = Pipeline::new(&llm, dir.path())
        .paths(3)
        .depth(3)
        .max_iter(3)
        .go(&task)
        .unwrap();

    assert!(report.optimized);
    assert_eq!(report.metrics.final_answer, "60 km/h");
    assert!(report.final_prompt.contains("showing the division explicitly"));
    assert_eq!(report.aggregation_result.total_paths, 3);
    assert_eq!(report.aggregation_result.cluster_size, 1);
    assert!((report.metrics.confidence - 0.5 / 3.0).abs() < 1e-9);

    // Paths come back sorted and clamped.
    for pair in report.reasoning_paths.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for path in &report.reasoning_paths {
        assert!((0.0..=1.0).contains(&path.score));
    }

    // Version history: initial plus the accepted rewrite, numbered in order.
    let store = VersionStore::open(dir.path().join("prompts")).unwrap();
    let history = store.history("train_speed").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].version, "initial");
    assert_eq!(history[0].version_number, 0);
    assert_eq!(history[1].version, "v1");
    assert_eq!(history[1].version_number, 1);

    // The accepted rewrite strictly improved the overall score.
    assert!(
        history[1].metrics.overall_score > history[0].metrics.overall_score,
        "accepted version must beat the initial evaluation"
    );

    // Progression reflects the improvement.
    let progression = store.progression("train_speed").unwrap();
    assert_eq!(progression.versions, 2);
    let overall = progression
        .overall
        .iter()
        .find(|(name, _)| name == "overall_score")
        .unwrap();
    assert!(overall.1.delta > 0.0);

    // Both artifacts landed on disk.
    assert!(dir.path().join("evaluation/train_speed_evaluation.json").exists());
    let logs = std::fs::read_dir(dir.path().join("logs")).unwrap().count();
    assert_eq!(logs, 1);
}

#[test]
fn confident_consensus_skips_optimization() {
    let dir = tempfile::tempdir().unwrap();
    let llm = MockLlm::new(|prompt| {
        if prompt.contains("Rate this reasoning") || prompt.contains("Rate the similarity") {
            "0.95".to_string()
        } else if prompt.contains("Rate the correctness") {
            "0.9".to_string()
        } else {
            "Therefore, the answer is 4.".to_string()
        }
    });
    let task = Task::new("sum", "What is 2+2?").with_expected("4");

    let report = Pipeline::new(&llm, dir.path()).go(&task).unwrap();

    assert!(!report.optimized);
    assert_eq!(report.final_prompt, report.initial_prompt);
    assert_eq!(report.metrics.final_answer, "4");

    // Only the initial prompt version exists.
    let store = VersionStore::open(dir.path().join("prompts")).unwrap();
    assert_eq!(store.history("sum").unwrap().len(), 1);
}

#[test]
fn unavailable_service_still_produces_a_report() {
    let dir = tempfile::tempdir().unwrap();
    let llm = FailingLlm::new("connection refused");
    let task = Task::new("offline", "Anything at all?");

    // Every completion fails: paths are empty with the 0.5 default score,
    // all answers collapse to the empty-input sentinel, and clustering
    // degrades to singletons (similarity defaults to 0.0).
    let report = Pipeline::new(&llm, dir.path()).go(&task).unwrap();

    assert_eq!(report.aggregation_result.total_paths, 3);
    assert_eq!(report.aggregation_result.cluster_size, 1);
    assert_eq!(report.metrics.final_answer, "No answer available");
    assert!((report.aggregation_result.confidence - (1.0 / 3.0) * 0.5).abs() < 1e-9);
}
