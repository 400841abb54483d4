//! `rusty-automation-tool` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server, in-process scheduler, and executor.
//! - `migrate`  — run pending database migrations.
//! - `validate` — validate a workflow JSON file's dependency graph.

mod registry;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use db::PgStore;
use engine::{Engine, ExecutorConfig, Scheduler, SchedulerConfig, TemplateEvaluator};
use nodes::SystemClock;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "rusty-automation-tool",
    about = "High-performance workflow automation engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server, the cron/event scheduler, and the executor.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow definition JSON file's dependency graph.
    Validate {
        /// Path to the workflow JSON file.
        path: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, database_url } => {
            info!("Starting API server on {bind}");
            let pool = db::pool::create_pool(&database_url, 10).await?;
            db::pool::run_migrations(&pool).await?;

            let store: Arc<dyn engine::storage::Store> = Arc::new(PgStore::new(pool));
            let node_registry = registry::bootstrap();
            let clock = Arc::new(SystemClock);
            let evaluator = Arc::new(TemplateEvaluator::new());

            let engine = Engine::new(
                store.clone(),
                node_registry,
                clock.clone(),
                evaluator.clone(),
                ExecutorConfig::default(),
            );

            let scheduler = Scheduler::new(
                engine.clone(),
                store.clone(),
                evaluator,
                clock,
                SchedulerConfig::default(),
            );
            for trigger in store.list_scheduled_triggers().await? {
                scheduler
                    .add_cron(trigger.workflow_id, trigger.expression, trigger.trigger_params)
                    .await
                    .ok();
            }
            for trigger in store.list_event_triggers().await? {
                scheduler
                    .add_event(
                        trigger.workflow_id,
                        trigger.event_pattern,
                        trigger.conditions,
                        trigger.trigger_params_template,
                    )
                    .await
                    .ok();
            }
            let _scheduler_tasks = scheduler.spawn();

            api::serve(&bind, engine, store).await?;
        }
        Command::Migrate { database_url } => {
            info!("Running migrations against {database_url}");
            let pool = db::pool::create_pool(&database_url, 2).await?;
            db::pool::run_migrations(&pool).await?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)?;
            let workflow: engine::Workflow = serde_json::from_str(&content)?;

            match engine::dag::build_dependency_graph(&workflow) {
                Ok(graph) => {
                    println!("workflow is valid. execution order: {:?}", graph.topo_order);
                }
                Err(e) => {
                    eprintln!("validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
