use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::FeatureExtractor;
use rollcall_engine::{
    spawn_trainer, AttendanceResponse, Config, Coordinator, ProgressTracker, RecognitionService,
};
use rollcall_store::Store;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod extractor;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a dataset archive, enroll identities, and retrain.
    Enroll {
        /// ZIP archive of face images (folder or filename encodes the identity).
        archive: PathBuf,
        /// Task id for progress reporting.
        #[arg(long)]
        task_id: Option<String>,
    },
    /// Retrain the model from all active face samples.
    Train,
    /// Mark attendance from a single capture image.
    Attend {
        capture: PathBuf,
    },
    /// Show model and enrollment status.
    Status,
    /// Register a roster identity.
    Register {
        external_id: String,
        display_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.ensure_dirs().context("creating data directories")?;

    let command = std::env::var("ROLLCALL_EXTRACTOR_CMD").context(
        "ROLLCALL_EXTRACTOR_CMD is not set — point it at the external face extractor command",
    )?;
    let extractor: Arc<dyn FeatureExtractor> = Arc::new(extractor::CommandExtractor::new(command));

    let store = Store::open(&config.db_path)?;
    let service = Arc::new(RecognitionService::load_active(&store, config.tolerance));
    let progress = Arc::new(ProgressTracker::new(Duration::from_secs(
        config.progress_ttl_secs,
    )));
    let trainer = spawn_trainer(
        config.db_path.clone(),
        config.model_dir.clone(),
        Arc::clone(&extractor),
        Arc::clone(&service),
        Arc::clone(&progress),
    )?;
    let coordinator = Coordinator::new(store, extractor, service, trainer, progress, config);

    match cli.command {
        Commands::Enroll { archive, task_id } => {
            let report = coordinator
                .enroll_archive(&archive, task_id.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Train => {
            let summary = coordinator.retrain(None).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Attend { capture } => match coordinator.mark_attendance(&capture)? {
            AttendanceResponse::Recorded {
                identity,
                display_name,
                result,
                ..
            } => {
                println!(
                    "recorded: {display_name} ({identity}), confidence {:.2}",
                    result.confidence
                );
            }
            AttendanceResponse::AlreadyRecorded {
                identity,
                display_name,
            } => {
                println!("already recorded today: {display_name} ({identity})");
            }
            AttendanceResponse::NotRecognized { result, .. } => {
                println!(
                    "not recognized (best distance {:.4}, confidence {:.2}); capture stored for review",
                    result.distance, result.confidence
                );
                std::process::exit(1);
            }
        },
        Commands::Status => {
            let status = coordinator.model_status()?;
            println!("index loaded:        {}", status.index.loaded);
            if let Some(version) = &status.index.version {
                println!("index version:       {version}");
            }
            println!("descriptors:         {}", status.index.descriptor_count);
            println!("identities in model: {}", status.index.identity_count);
            println!("enrolled identities: {}", status.enrolled_identities);
            if let Some(active) = &status.active_version {
                println!(
                    "active version:      {} (built {}, {} samples, {:.2}s)",
                    active.version, active.created_at, active.sample_count, active.build_seconds
                );
            }
        }
        Commands::Register {
            external_id,
            display_name,
        } => {
            coordinator.register_identity(&external_id, &display_name)?;
            println!("registered {external_id}");
        }
    }

    Ok(())
}
