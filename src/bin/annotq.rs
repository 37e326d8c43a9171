//! annotq CLI: operator and scripting interface to the engine.

use annotq::config::Config;
use annotq::db::Db;
use annotq::model::{BatchId, Decision, UnitId, WorkOutcome};
use annotq::telemetry::{TelemetryConfig, init_telemetry};
use annotq::{Coordinator, EngineConfig};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "annotq", about = "Shared annotation work distribution")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// List batches with progress
    Batches,
    /// Show progress for one batch
    Progress { batch: BatchId },
    /// Get or assign work for a user
    Work {
        batch: BatchId,
        #[arg(long)]
        user: String,
    },
    /// Record a decision for a unit
    Record {
        batch: BatchId,
        unit: UnitId,
        #[arg(long)]
        user: String,
        #[arg(long)]
        label: String,
        /// Category tag (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Skip the user's current unit
    Skip {
        batch: BatchId,
        #[arg(long)]
        user: String,
    },
    /// Retire a completed section and take the next one
    NextSection {
        batch: BatchId,
        #[arg(long)]
        user: String,
    },
    /// Show a user's annotation statistics
    Stats {
        #[arg(long)]
        user: String,
    },
    /// Show the batch a user is currently working in
    Active {
        #[arg(long)]
        user: String,
    },
    /// Leave the current batch
    Abandon {
        #[arg(long)]
        user: String,
    },
    /// Create a batch from a file, one unit per non-empty line
    Ingest {
        name: String,
        file: PathBuf,
        #[arg(long, default_value = "")]
        description: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "annotq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;
    if matches!(cli.command, Command::Migrate) {
        db.health_check().await?;
        println!("migrations applied");
        return Ok(());
    }

    let engine = Coordinator::new(Arc::new(db), EngineConfig::from(&config));
    run(&engine, cli.command, cli.json).await
}

async fn run(engine: &Coordinator<Db>, command: Command, json: bool) -> anyhow::Result<()> {
    match command {
        Command::Migrate => Ok(()),
        Command::Batches => {
            let batches = engine.list_batches_with_progress().await?;
            if json {
                let rows: Vec<_> = batches
                    .iter()
                    .map(|(b, p)| serde_json::json!({ "batch": b, "progress": p }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            if batches.is_empty() {
                println!("No batches available.");
                return Ok(());
            }
            println!("{:<36}  {:<24}  {:>11}  {:>5}", "ID", "NAME", "ANNOTATED", "PCT");
            println!("{}", "-".repeat(84));
            for (batch, progress) in &batches {
                println!(
                    "{:<36}  {:<24}  {:>11}  {:>4.0}%",
                    batch.id,
                    truncate(&batch.name, 24),
                    format!("{}/{}", progress.annotated, progress.total),
                    progress.ratio() * 100.0
                );
            }
            Ok(())
        }
        Command::Progress { batch } => {
            let progress = engine.get_progress(batch).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&progress)?);
            } else {
                println!("{}/{} annotated", progress.annotated, progress.total);
            }
            Ok(())
        }
        Command::Work { batch, user } => {
            let outcome = engine.get_or_assign_work(batch, &user).await?;
            print_work(&outcome, json)
        }
        Command::Record {
            batch,
            unit,
            user,
            label,
            categories,
            notes,
        } => {
            let decision = Decision {
                unit_id: unit,
                label,
                categories,
                notes,
            };
            let annotation = engine.record_decision(batch, &user, decision).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&annotation)?);
            } else {
                println!("Recorded: {} ({})", annotation.id, annotation.label);
            }
            Ok(())
        }
        Command::Skip { batch, user } => {
            engine.skip_current(batch, &user).await?;
            println!("Skipped.");
            Ok(())
        }
        Command::NextSection { batch, user } => {
            let outcome = engine.next_section(batch, &user).await?;
            print_work(&outcome, json)
        }
        Command::Stats { user } => {
            let stats = engine.user_stats(&user).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }
            println!("Total annotations: {}", stats.total_annotations);
            for (label, count) in &stats.counts_by_label {
                println!("  {label}: {count}");
            }
            Ok(())
        }
        Command::Active { user } => {
            match engine.active_batch(&user).await? {
                Some(batch) => println!("{}  {}", batch.id, batch.name),
                None => println!("No active batch."),
            }
            Ok(())
        }
        Command::Abandon { user } => {
            engine.abandon_batch(&user).await?;
            println!("Active batch cleared.");
            Ok(())
        }
        Command::Ingest {
            name,
            file,
            description,
        } => {
            let content = std::fs::read_to_string(&file)?;
            let texts: Vec<String> = content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            let batch = engine.ingest_batch(&name, &description, &texts).await?;
            println!("Created: {} ({} units)", batch.id, batch.total_unit_count);
            Ok(())
        }
    }
}

fn print_work(outcome: &WorkOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    let handle = match outcome {
        WorkOutcome::Assigned(handle) => handle,
        WorkOutcome::Exhausted => {
            println!("Batch complete. Nothing left to assign.");
            return Ok(());
        }
    };

    if let Some(section) = handle.section_number {
        println!(
            "Section {section}: {} of {} done",
            handle.resume_index.min(handle.units.len()),
            handle.units.len()
        );
    }
    if let Some(expires) = handle.lease_expires_at {
        println!("Lease expires: {}", expires.format("%Y-%m-%d %H:%M:%S"));
    }
    match handle.current() {
        Some(unit) => {
            println!("Unit:  {} (#{})", unit.id, unit.original_index);
            println!("Text:  {}", unit.text);
        }
        None => println!("Section complete. Run next-section for more work."),
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max - 1).chain(std::iter::once('…')).collect()
    }
}
