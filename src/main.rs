//! Maestro CLI - Command-line interface for hierarchical workflow orchestration.
//!
//! # Usage
//!
//! ```bash
//! # Analyze a workflow description
//! maestro analyze "Build and test a data pipeline" --complexity high
//!
//! # Run a workflow end to end against the in-memory backend
//! maestro run "Research the market and document the findings" --complexity high
//!
//! # Show the agent hierarchy after a run
//! maestro run "..." --show-hierarchy
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::process;
use std::sync::Arc;

use maestro::agents::AgentService;
use maestro::config::MaestroConfig;
use maestro::memory::EpisodeJournal;
use maestro::orchestration::{analyze, Complexity, Orchestrator, WorkflowRequest};
use maestro::storage::InMemoryStore;
use maestro::tasks::{TaskService, TaskStatus};

#[derive(Parser)]
#[command(name = "maestro")]
#[command(about = "Maestro - Hierarchical Multi-Agent Orchestration", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a workflow description without running it
    Analyze {
        /// Workflow description
        description: String,

        /// Complexity label (low, medium, high, extreme)
        #[arg(short, long, default_value = "medium")]
        complexity: String,

        /// Required expertise hints (comma-separated)
        #[arg(short, long)]
        expertise: Option<String>,
    },

    /// Orchestrate a workflow end to end against the in-memory backend
    Run {
        /// Workflow description
        description: String,

        /// Complexity label (low, medium, high, extreme)
        #[arg(short, long, default_value = "medium")]
        complexity: String,

        /// Required expertise hints (comma-separated)
        #[arg(short, long)]
        expertise: Option<String>,

        /// Print the agent hierarchy after the run
        #[arg(long)]
        show_hierarchy: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Analyze {
            description,
            complexity,
            expertise,
        } => {
            let analysis = analyze(
                &description,
                Complexity::from_label(&complexity),
                &split_list(expertise),
                MaestroConfig::default().complexity_threshold,
            );
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }

        Commands::Run {
            description,
            complexity,
            expertise,
            show_hierarchy,
        } => {
            run_workflow(description, complexity, split_list(expertise), show_hierarchy).await?;
        }
    }

    Ok(())
}

/// Orchestrate a workflow, drive every leaf task to completion, and print
/// the compiled report.
async fn run_workflow(
    description: String,
    complexity: String,
    expertise: Vec<String>,
    show_hierarchy: bool,
) -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let sink = Arc::new(EpisodeJournal::new(store.clone()));
    let config = Arc::new(MaestroConfig::default());
    let agents = Arc::new(AgentService::new(
        store.clone(),
        store.clone(),
        sink.clone(),
        config.clone(),
    ));
    let tasks = Arc::new(TaskService::new(
        store.clone(),
        store,
        agents.clone(),
        config.clone(),
    ));
    let orchestrator = Orchestrator::new(agents.clone(), tasks.clone(), sink, config);

    let execution = orchestrator
        .orchestrate_workflow(WorkflowRequest {
            description,
            complexity: Some(complexity),
            required_expertise: expertise,
            ..Default::default()
        })
        .await?;

    // drive assigned tasks to completion, dispatching newly unblocked
    // tasks between rounds until the tree settles
    let mut open: Vec<_> = execution.assignments.iter().map(|(t, _)| t.clone()).collect();
    while !open.is_empty() {
        for task_id in open.drain(..) {
            tasks.start_task(&task_id).await?;
            let task = tasks.get_task(&task_id).await?;
            tasks
                .complete_task(
                    &task_id,
                    HashMap::from([(
                        "result".to_string(),
                        serde_json::json!(format!("completed: {}", task.title)),
                    )]),
                )
                .await?;
        }
        open = orchestrator
            .dispatch_ready_tasks()
            .await?
            .into_iter()
            .map(|(t, _)| t)
            .collect();
    }

    let root = tasks.get_task(&execution.workflow_id).await?;
    if root.status == TaskStatus::InProgress {
        tasks
            .complete_task(&execution.workflow_id, HashMap::new())
            .await?;
    }

    let progress = orchestrator.monitor_workflow(&execution.workflow_id).await?;
    let compiled = orchestrator.compile_results(&execution.workflow_id).await?;

    println!("{}", serde_json::to_string_pretty(&progress)?);
    println!("{}", serde_json::to_string_pretty(&compiled)?);

    if show_hierarchy {
        let tree = agents
            .get_agent_hierarchy(&execution.conductor_id)
            .await?;
        println!("{}", serde_json::to_string_pretty(&tree)?);
    }

    Ok(())
}

fn split_list(arg: Option<String>) -> Vec<String> {
    arg.map(|s| {
        s.split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("maestro=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("maestro=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
