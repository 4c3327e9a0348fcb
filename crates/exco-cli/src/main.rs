//! # exco CLI entry point
//!
//! Operator tooling over the coordination engine: run the background
//! service loop (event workers + deadline scheduler), trigger a manual
//! sweep, run conflict detection for one project or a batch, and print
//! moratorium statistics for a municipality.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use exco_core::ProjectId;
use exco_engine::{Engine, EngineConfig, PgUserDirectory, TracingEmailQueue};

/// EXCO Stack CLI
///
/// Excavation coordination engine: spatial/temporal conflict detection,
/// project lifecycle workflow, moratorium registry, and deadline sweeps.
#[derive(Parser, Debug)]
#[command(name = "exco", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the service loop: event workers and the daily deadline sweep.
    Serve,

    /// Run one deadline sweep immediately and print what it published.
    Sweep,

    /// Run conflict detection for one project and print the result.
    Detect {
        /// Project id.
        project_id: Uuid,
    },

    /// Run conflict detection for several projects (waves of at most 5).
    Batch {
        /// Project ids.
        project_ids: Vec<Uuid>,
    },

    /// Print moratorium statistics for a municipality.
    Stats {
        /// Municipality code.
        municipality: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let pool = exco_db::init_pool().await?;
    let config = EngineConfig::from_env();
    let directory = Arc::new(PgUserDirectory::new(pool.clone()));
    let queue = Arc::new(TracingEmailQueue);
    let engine = Engine::start(pool.clone(), directory, queue, &config);

    match command {
        Commands::Serve => {
            engine.scheduler.start();
            let status = engine.scheduler.status();
            tracing::info!(
                next_sweep = ?status.next_sweep,
                "engine running; press Ctrl-C to stop"
            );
            tokio::signal::ctrl_c().await?;
            engine.scheduler.stop();
            tracing::info!("engine stopped");
        }

        Commands::Sweep => {
            let report = engine.scheduler.trigger_now().await?;
            println!(
                "published {} events (start approaching: {}, ending soon: {}, \
                 start overdue: {}, end overdue: {})",
                report.total(),
                report.start_approaching,
                report.end_approaching,
                report.start_overdue,
                report.end_overdue,
            );
        }

        Commands::Detect { project_id } => {
            let detection = engine
                .detector
                .run_for_project(ProjectId::from(project_id))
                .await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "has_conflict": detection.has_conflict,
                    "spatial_conflicts": detection
                        .spatial_conflicts
                        .iter()
                        .map(|p| p.id)
                        .collect::<Vec<_>>(),
                    "temporal_conflicts": detection
                        .temporal_conflicts
                        .iter()
                        .map(|p| p.id)
                        .collect::<Vec<_>>(),
                    "moratorium_violations": detection
                        .moratorium_violations
                        .iter()
                        .map(|m| m.id)
                        .collect::<Vec<_>>(),
                }))?
            );
        }

        Commands::Batch { project_ids } => {
            let ids: Vec<ProjectId> = project_ids.into_iter().map(ProjectId::from).collect();
            let results = engine.detector.run_batch(&ids).await;
            for id in &ids {
                match results.get(id) {
                    Some(detection) => println!(
                        "{id}: has_conflict={} ({} spatial, {} moratorium)",
                        detection.has_conflict,
                        detection.spatial_conflicts.len(),
                        detection.moratorium_violations.len(),
                    ),
                    None => println!("{id}: failed (see logs)"),
                }
            }
        }

        Commands::Stats { municipality } => {
            let stats = exco_db::moratoriums::statistics(&pool, &municipality).await?;
            println!(
                "{municipality}: {} moratoriums ({} active, {} expiring within 30 days, \
                 {:.0} m² active area)",
                stats.total, stats.active, stats.expiring_soon, stats.total_area_m2,
            );
        }
    }

    Ok(())
}
