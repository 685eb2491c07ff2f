use anyhow::Result;
use clap::Parser;
use image_saver::convert::ConversionEngine;
use image_saver::models::Config;
use image_saver::queue::AmqpConnection;
use image_saver::storage::S3BlobStore;
use image_saver::worker::Worker;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "image-saver")]
#[command(about = "Convert queued images into their requested formats")]
struct CliArgs {
    /// Consumer tag announced to the broker.
    #[arg(long, default_value = "image-saver")]
    consumer_tag: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_saver=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting image-saver worker");

    let args = CliArgs::parse();

    match run_worker(&args).await {
        Ok(()) => {
            info!("Worker stopped");
            Ok(())
        }
        Err(e) => {
            error!("Worker failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_worker(args: &CliArgs) -> image_saver::Result<()> {
    let config = Config::from_env()?;

    let store = Arc::new(S3BlobStore::new(&config.storage).await?);
    let engine = ConversionEngine::new(&config.codec);
    let worker = Worker::new(store, engine, &config.worker);

    let connection = AmqpConnection::connect(&config.queue).await?;
    let mut source = connection.consume(&args.consumer_tag).await?;

    tokio::select! {
        result = worker.run(&mut source) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested, unsettled deliveries go back to the broker");
        }
    }

    connection.close().await
}

#[cfg(test)]
mod tests {
    use super::CliArgs;
    use clap::Parser;

    #[test]
    fn test_default_consumer_tag() {
        let args = CliArgs::try_parse_from(["image-saver"]).unwrap();
        assert_eq!(args.consumer_tag, "image-saver");
    }

    #[test]
    fn test_custom_consumer_tag() {
        let args =
            CliArgs::try_parse_from(["image-saver", "--consumer-tag", "worker-2"]).unwrap();
        assert_eq!(args.consumer_tag, "worker-2");
    }
}
