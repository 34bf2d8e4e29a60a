use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod config;
mod engine;

use config::Config;
use engine::ScanEngine;

#[derive(Parser)]
#[command(name = "scanlens", about = "Scanlens visual recognition CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and initialize all perception backends
    Preload,
    /// Scan an image file for objects, emotions and poses
    Scan {
        /// Path to the image to scan
        image: PathBuf,
        /// Persist the top detection to scan history
        #[arg(long)]
        save: bool,
        /// User id to record with the scan
        #[arg(short, long)]
        user: Option<String>,
    },
    /// List scan history, newest first
    History {
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Remove a history record by id
    Remove {
        id: String,
    },
    /// Clear a user's scan history
    Clear {
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Show configuration and history status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Preload => {
            println!("Loading perception backends...");
            let engine = ScanEngine::bootstrap(&config, |pct| {
                println!("  {pct}%");
            })
            .await?;
            match engine.active_backend() {
                Some(backend) => println!("Ready (classifier: {backend})"),
                None => println!("Ready"),
            }
        }
        Commands::Scan { image, save, user } => {
            let decoded = image::open(&image)?.to_rgb8();

            let engine = ScanEngine::bootstrap(&config, |pct| {
                tracing::info!(pct, "loading perception backends");
            })
            .await?;
            let report = engine.scan(&decoded).await?;

            if report.objects.is_empty() {
                println!("No objects recognized.");
            } else {
                println!("Objects:");
                for det in &report.objects {
                    println!("  {:<44} {:>5.1}%", det.label, det.confidence * 100.0);
                }
                if report.used_fallback {
                    println!("  (using fallback classifier)");
                }
            }

            if !report.emotions.is_empty() {
                println!("Emotions:");
                for reading in &report.emotions {
                    println!(
                        "  {:<44} {:>5.1}%",
                        reading.emotion,
                        reading.confidence * 100.0
                    );
                }
            }

            if !report.poses.is_empty() {
                println!("Poses:");
                for pose in &report.poses {
                    let visible = pose
                        .keypoints
                        .iter()
                        .filter(|kp| kp.score >= config.pose_score_threshold)
                        .count();
                    println!(
                        "  score {:>5.2}, {visible}/{} keypoints visible",
                        pose.score,
                        pose.keypoints.len()
                    );
                }
            }

            if save {
                if let Some(top) = report.objects.first() {
                    let store = scanlens_store::HistoryStore::open(&config.db_path).await?;
                    let user = user.unwrap_or_else(|| config.default_user.clone());
                    let id = store
                        .save_record(
                            &user,
                            &image.to_string_lossy(),
                            &top.label,
                            top.confidence,
                        )
                        .await?;
                    println!("Saved to history: {id}");
                } else {
                    println!("Nothing to save.");
                }
            }
        }
        Commands::History { user } => {
            let store = scanlens_store::HistoryStore::open(&config.db_path).await?;
            let user = user.unwrap_or_else(|| config.default_user.clone());
            let records = store.list_for_user(&user).await?;
            if records.is_empty() {
                println!("No scan history for {user}");
            } else {
                for record in records {
                    println!(
                        "{}  {}  {:<32} {:>5.1}%  {}",
                        record.id,
                        record.created_at.format("%Y-%m-%d %H:%M:%S"),
                        record.label,
                        record.confidence * 100.0,
                        record.image_ref,
                    );
                }
            }
        }
        Commands::Remove { id } => {
            let store = scanlens_store::HistoryStore::open(&config.db_path).await?;
            if store.remove(&id).await? {
                println!("Removed {id}");
            } else {
                println!("No record with id {id}");
            }
        }
        Commands::Clear { user } => {
            let store = scanlens_store::HistoryStore::open(&config.db_path).await?;
            let user = user.unwrap_or_else(|| config.default_user.clone());
            let deleted = store.clear_user(&user).await?;
            println!("Removed {deleted} record(s) for {user}");
        }
        Commands::Status => {
            let store = scanlens_store::HistoryStore::open(&config.db_path).await?;
            let records = store.list_for_user(&config.default_user).await?;
            println!(
                "{}",
                serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "model_dir": config.model_dir.as_ref().map(|p| p.display().to_string()),
                    "cache_dir": config.cache_dir.display().to_string(),
                    "db_path": config.db_path.display().to_string(),
                    "default_user": config.default_user,
                    "history_records": records.len(),
                })
            );
        }
    }

    Ok(())
}
