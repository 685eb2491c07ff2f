//! Command-line producer: uploads a local image and requests its conversion.
//!
//! By default the original is stored and a job is queued for the worker.
//! With `--sync` the formats are converted and stored before exiting.

use anyhow::{Context, Result as AnyResult};
use clap::Parser;
use image_saver::convert::ConversionEngine;
use image_saver::models::Config;
use image_saver::producer::ImageSaver;
use image_saver::queue::AmqpConnection;
use image_saver::storage::S3BlobStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "enqueue")]
#[command(about = "Upload an image and convert it to the requested formats")]
struct CliArgs {
    /// Image file to upload.
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Base key for derived images. Defaults to a random UUID.
    #[arg(long)]
    save_name: Option<String>,

    /// Target format; repeat for several (jpg, jpeg, png, webp, avif).
    #[arg(short = 'f', long = "format", required = true)]
    formats: Vec<String>,

    /// Convert in-process instead of queueing a job.
    #[arg(long)]
    sync: bool,
}

impl CliArgs {
    fn original_filename(&self) -> String {
        self.file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_saver=info,enqueue=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();
    let config = Config::from_env()?;

    let file = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let save_name = args
        .save_name
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let store = Arc::new(S3BlobStore::new(&config.storage).await?);
    let connection = AmqpConnection::connect(&config.queue).await?;
    let publisher = Arc::new(connection.publisher(config.queue.publish_timeout));
    let saver = ImageSaver::new(store, publisher, ConversionEngine::new(&config.codec));

    if args.sync {
        let stored = saver.save_sync(&file, &save_name, &args.formats).await?;
        info!("Stored {}", stored.join(", "));
    } else {
        let job = saver
            .save_async(&file, &args.original_filename(), &save_name, &args.formats)
            .await?;
        info!("Queued {}", serde_json::to_string(&job)?);
    }

    connection.close().await?;
    Ok(())
}
