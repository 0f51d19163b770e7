// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Hapui CLI tool

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use hapui::retry::LlmExt;
use hapui::{task_files, Llm, OllamaLlm, Pipeline, RunReport, Task, VersionStore};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hapui")]
#[command(about = "Consensus reasoning and prompt optimization pipeline", long_about = None)]
struct Cli {
    /// Base directory for prompts, logs, and evaluation artifacts
    #[arg(long, default_value = "runs", global = true)]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for a single task file
    Run {
        /// Path to the task file (json/yaml)
        task: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Run the pipeline for every task file in a directory
    Batch {
        /// Directory of task files
        tasks: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Show the prompt version history for a task
    History {
        /// Task id
        task_id: String,
    },

    /// Show the metric progression across a task's prompt versions
    Progression {
        /// Task id
        task_id: String,
    },
}

#[derive(clap::Args)]
struct RunOptions {
    /// Number of independent reasoning attempts
    #[arg(long, default_value_t = 3)]
    paths: usize,

    /// Maximum reasoning rounds per attempt
    #[arg(long, default_value_t = 3)]
    depth: u32,

    /// Similarity threshold for answer clustering
    #[arg(long, default_value_t = 0.7)]
    threshold: f64,

    /// Optimization iteration budget
    #[arg(long, default_value_t = 3)]
    max_iter: u32,

    /// Model name (overrides HAPUI_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Ollama server URL (overrides OLLAMA_HOST detection)
    #[arg(long)]
    host: Option<String>,

    /// Retries per completion call on transient failures
    #[arg(long, default_value_t = 2)]
    retries: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hapui=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { task, options } => {
            let llm = build_llm(&options)?.with_retry(options.retries);
            let task = Task::load(&task)
                .with_context(|| format!("loading task {}", task.display()))?;

            print_header(&task.id);
            let report = run_one(&llm, &cli.dir, &task, &options).await?;
            print_results(&report);
        }
        Commands::Batch { tasks, options } => {
            let llm = build_llm(&options)?.with_retry(options.retries);
            let files = task_files(&tasks)
                .with_context(|| format!("listing tasks in {}", tasks.display()))?;

            if files.is_empty() {
                println!("No task files found in {}", tasks.display());
                return Ok(());
            }

            for file in files {
                // A malformed task skips to the next one; it never aborts
                // the batch.
                let task = match Task::load(&file) {
                    Ok(task) => task,
                    Err(e) => {
                        tracing::error!(file = %file.display(), error = %e, "failed to load task");
                        continue;
                    }
                };

                print_header(&task.id);
                match run_one(&llm, &cli.dir, &task, &options).await {
                    Ok(report) => print_results(&report),
                    Err(e) => {
                        tracing::error!(task = %task.id, error = %e, "pipeline run failed");
                    }
                }
            }
        }
        Commands::History { task_id } => {
            let store = VersionStore::open(cli.dir.join("prompts"))?;
            let history = store.history(&task_id)?;

            if history.is_empty() {
                println!("No prompt versions for task {}", style(&task_id).cyan());
                return Ok(());
            }

            println!(
                "{} version(s) for task {}",
                history.len(),
                style(&task_id).cyan().bold()
            );
            for version in history {
                println!(
                    "  {:>8}  overall {:.3}  confidence {:.3}  {}",
                    style(&version.version).yellow(),
                    version.metrics.overall_score,
                    version.metrics.confidence,
                    version.timestamp,
                );
            }
        }
        Commands::Progression { task_id } => {
            let store = VersionStore::open(cli.dir.join("prompts"))?;
            let progression = store.progression(&task_id)?;

            println!(
                "Progression for task {} across {} version(s)",
                style(&task_id).cyan().bold(),
                progression.versions
            );
            for step in &progression.steps {
                println!("  {} -> {}", style(&step.from).yellow(), style(&step.to).yellow());
                for (metric, delta) in &step.deltas {
                    println!("    {:<14} {:+.3}", metric, delta.delta);
                }
            }
            if !progression.overall.is_empty() {
                println!("  {}", style("overall").bold());
                for (metric, delta) in &progression.overall {
                    println!(
                        "    {:<14} {:.3} -> {:.3} ({:+.1}%)",
                        metric, delta.initial, delta.final_value, delta.percentage,
                    );
                }
            }
        }
    }

    Ok(())
}

fn build_llm(options: &RunOptions) -> anyhow::Result<OllamaLlm> {
    let mut llm = match &options.host {
        Some(host) => OllamaLlm::http(
            host.clone(),
            std::env::var("HAPUI_MODEL").unwrap_or_else(|_| "qwen2.5:7b".to_string()),
        ),
        None => OllamaLlm::from_env().context("no completion provider configured")?,
    };
    if let Some(model) = &options.model {
        llm = llm.model(model.clone());
    }
    Ok(llm)
}

async fn run_one<L: Llm>(
    llm: &L,
    dir: &std::path::Path,
    task: &Task,
    options: &RunOptions,
) -> anyhow::Result<RunReport> {
    let report = Pipeline::new(llm, dir)
        .paths(options.paths)
        .depth(options.depth)
        .threshold(options.threshold)
        .max_iter(options.max_iter)
        .run(task)
        .await?;
    Ok(report)
}

fn print_header(task_id: &str) {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    println!("\n{}", "=".repeat(60));
    println!(
        "Pipeline Execution - Task: {}",
        style(task_id).cyan().bold()
    );
    println!("Started at: {}", timestamp);
    println!("{}\n", "=".repeat(60));
}

fn print_results(report: &RunReport) {
    println!("\n{}", "-".repeat(60));
    println!("{}", style("Pipeline Results Summary").bold());
    println!("{}", "-".repeat(60));
    println!(
        "Final Answer: {}",
        style(&report.metrics.final_answer).green().bold()
    );
    println!("Confidence:   {:.2}", report.metrics.confidence);
    println!("Consistency:  {:.2}", report.metrics.consistency);
    if let Some(expected) = &report.metrics.expected_answer {
        println!("Expected:     {}", expected);
    }
    if report.optimized {
        println!("{}", style("Prompt was optimized during this run").yellow());
    }
    println!("{}\n", "-".repeat(60));
}
