//! Command-line front end for task analysis.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;

use task_analyst::analysis::{sse_frames, StructuredOutput, TracingSink};
use task_analyst::{AnalyzerConfig, TaskAnalyzer, TaskStore};

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "task-analyst")]
#[command(version, about = "Classify tasks and break them into subtasks with an LLM")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file (defaults to environment variables)
    #[arg(long, global = true, env = "TASK_ANALYST_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a task by category and priority
    Classify(TaskArgs),

    /// Suggest subtasks for a task
    Subtasks(TaskArgs),

    /// Run classification and subtask generation
    Analyze {
        #[command(flatten)]
        task: TaskArgs,

        /// Print progress events as text/event-stream frames
        #[arg(long)]
        stream: bool,
    },
}

#[derive(Args)]
struct TaskArgs {
    /// Task title
    title: String,

    /// Task description
    #[arg(short, long, default_value = "")]
    description: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "task_analyst=info".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AnalyzerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let analyzer = TaskAnalyzer::connect(&config, Arc::new(TracingSink))
        .await
        .context("Failed to initialize task analyzer")?;

    match cli.command {
        Commands::Classify(task) => {
            let result = analyzer.classify(&task.title, &task.description).await;
            print_result(cli.format, &result)?;
        }
        Commands::Subtasks(task) => {
            let result = analyzer.suggest_subtasks(&task.title, &task.description).await;
            print_result(cli.format, &result)?;
        }
        Commands::Analyze { task, stream } if stream => {
            let frames = sse_frames(analyzer.analyze_stream(&task.title, &task.description));
            futures::pin_mut!(frames);
            let mut stdout = std::io::stdout();
            while let Some(frame) = frames.next().await {
                stdout.write_all(frame.as_bytes())?;
                stdout.flush()?;
            }
        }
        Commands::Analyze { task, .. } => {
            let store = TaskStore::new();
            let created = store.create(&task.title, &task.description).await?;
            let analysis = analyzer.analyze(&created.title, &created.description).await;
            let updated = store.apply_analysis(created.id, &analysis).await?;

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&updated)?),
                OutputFormat::Text => {
                    println!("{}", analysis.classification.summary());
                    println!("  {}", analysis.classification.reasoning);
                    println!("{}", analysis.subtasks.summary());
                    for subtask in &updated.subtasks {
                        println!("  {}. {}", subtask.order + 1, subtask.title);
                        if !subtask.description.is_empty() {
                            println!("     {}", subtask.description);
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_result<T: StructuredOutput>(format: OutputFormat, result: &T) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            println!("{}", result.summary());
            println!("{}", serde_json::to_string_pretty(result)?);
        }
    }
    Ok(())
}
