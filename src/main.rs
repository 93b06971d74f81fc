//! Hiverun - tiered run orchestration and isolated execution engine.
//!
//! Main entry point for the hiverun CLI: runs a demo routine through
//! the full coordination stack, executes code in the sandbox, or
//! classifies an error message.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hiverun_classify::{ClassifyConfig, ErrorClassifier, ErrorContext};
use hiverun_sandbox::{
    ProcessBackendConfig, ProcessWorkerBackend, SandboxConfig, SandboxJob, SandboxManager,
};
use hiverun_swarm::{
    CoordinationRequest, CreditLimit, ExecuteOutcome, ExecuteRequest, ResourceRequest,
    SwarmConfig, SwarmCoordinator,
};

mod demo;

/// Hiverun CLI.
#[derive(Parser)]
#[command(name = "hiverun")]
#[command(about = "Tiered run orchestration and isolated execution engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in demo routine through the coordination layer
    Run {
        /// Goal recorded on the swarm's blackboard
        #[arg(long, default_value = "demonstrate the engine")]
        goal: String,

        /// Credit budget, a number or "unlimited"
        #[arg(long, default_value = "unlimited")]
        credits: String,
    },

    /// Execute a code snippet in the sandbox
    Sandbox {
        /// Worker program to spawn
        #[arg(long, default_value = "node")]
        program: String,

        /// Arguments passed to the worker program
        #[arg(long)]
        worker_args: Vec<String>,

        /// Language of the snippet
        #[arg(long, default_value = "javascript")]
        language: String,

        /// The code to run
        code: String,
    },

    /// Classify an error message
    Classify {
        /// The error message
        message: String,

        /// Error type name
        #[arg(long, default_value = "Error")]
        error_type: String,

        /// Operation that failed
        #[arg(long, default_value = "read")]
        operation: String,

        /// Component the failure occurred in
        #[arg(long, default_value = "cli")]
        component: String,

        /// Attempt count
        #[arg(long, default_value_t = 1)]
        attempt: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { goal, credits } => run_demo(goal, credits).await,
        Commands::Sandbox {
            program,
            worker_args,
            language,
            code,
        } => run_sandbox(program, worker_args, language, code).await,
        Commands::Classify {
            message,
            error_type,
            operation,
            component,
            attempt,
        } => classify(message, error_type, operation, component, attempt),
    }
}

async fn run_demo(goal: String, credits: String) -> anyhow::Result<()> {
    let max_credits = if credits.eq_ignore_ascii_case("unlimited") {
        CreditLimit::Unlimited
    } else {
        CreditLimit::Limited(credits.parse()?)
    };

    let (collaborators, _store, bus) = demo::demo_collaborators(None);
    let coordinator = SwarmCoordinator::new(
        SwarmConfig::default(),
        collaborators,
        Arc::new(demo::DemoRoutineExecutor),
    );

    // Log lifecycle events as they happen
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(topic = event.topic(), run_id = %event.run_id(), "event");
        }
    });

    let outcome = coordinator
        .execute(ExecuteRequest::Coordination(CoordinationRequest {
            goal: goal.clone(),
            user: whoami(),
            routine: demo::demo_routine(&goal),
            config: Default::default(),
            resources: ResourceRequest {
                max_credits,
                time_secs: None,
                memory_mb: None,
                concurrency: None,
            },
        }))
        .await?;
    let ExecuteOutcome::Coordination { swarm_id, run_id, .. } = outcome else {
        anyhow::bail!("coordination request produced a delegated outcome");
    };
    info!(%swarm_id, %run_id, "swarm created");

    let status = coordinator.drive_swarm(&swarm_id).await?;
    info!(%swarm_id, %status, "run finished");

    let report = coordinator.execution_status(&swarm_id).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(context) = coordinator.context(&swarm_id) {
        println!("{}", serde_json::to_string_pretty(&context.summary)?);
    }
    Ok(())
}

async fn run_sandbox(
    program: String,
    worker_args: Vec<String>,
    language: String,
    code: String,
) -> anyhow::Result<()> {
    let backend = ProcessWorkerBackend::new(ProcessBackendConfig {
        program,
        args: worker_args,
    });
    let manager = SandboxManager::new(SandboxConfig::default(), Arc::new(backend));

    let job = SandboxJob::new(code, language, serde_json::Value::Null);
    match manager.run_user_code(job).await {
        Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
        Err(e) => warn!(error = %e, "sandbox execution failed"),
    }
    manager.shutdown();
    Ok(())
}

fn classify(
    message: String,
    error_type: String,
    operation: String,
    component: String,
    attempt: u32,
) -> anyhow::Result<()> {
    let classifier = ErrorClassifier::new(ClassifyConfig::default());
    let context = ErrorContext {
        operation: Some(operation),
        component: Some(component),
        tier: Some("cli".to_string()),
        attempt,
        metadata: Default::default(),
    };
    let classification = classifier.classify(&error_type, &message, Some(&context));
    println!("{}", serde_json::to_string_pretty(&classification)?);
    Ok(())
}

fn whoami() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}
