//! Producer-side storage of uploaded images.
//!
//! The asynchronous path stores the original and enqueues a
//! [`ConversionJob`] for the worker. The synchronous path converts in-process
//! before returning. Both silently drop formats outside the supported set
//! (with a warning), unlike the worker, which rejects a job naming one.

use crate::convert::ConversionEngine;
use crate::models::{derived_key, is_supported_format, ConversionJob};
use crate::queue::JobPublisher;
use crate::storage::BlobStore;
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Key the original upload is stored under: `<save_name>-original.<ext>`.
pub fn original_key(save_name: &str, original_filename: &str) -> String {
    let extension = Path::new(original_filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if extension.is_empty() {
        format!("{}-original", save_name)
    } else {
        format!("{}-original.{}", save_name, extension)
    }
}

fn supported_only(formats: &[String]) -> Vec<String> {
    formats
        .iter()
        .filter(|format| {
            let supported = is_supported_format(format);
            if !supported {
                warn!("Format {} is not supported, skipping", format);
            }
            supported
        })
        .cloned()
        .collect()
}

pub struct ImageSaver {
    store: Arc<dyn BlobStore>,
    publisher: Arc<dyn JobPublisher>,
    engine: ConversionEngine,
}

impl ImageSaver {
    pub fn new(
        store: Arc<dyn BlobStore>,
        publisher: Arc<dyn JobPublisher>,
        engine: ConversionEngine,
    ) -> Self {
        Self {
            store,
            publisher,
            engine,
        }
    }

    /// Store the original and enqueue its conversion. Returns the published job.
    pub async fn save_async(
        &self,
        file: &[u8],
        original_filename: &str,
        save_name: &str,
        formats: &[String],
    ) -> Result<ConversionJob> {
        let original = original_key(save_name, original_filename);
        self.store.store(&original, file).await?;

        let job = ConversionJob::new(original, save_name.to_string(), supported_only(formats));
        self.publisher.publish(&job).await?;

        info!(
            "Queued conversion of '{}' to {:?}",
            job.original_image_name, job.save_formats
        );
        Ok(job)
    }

    /// Convert and upload every supported format now. Returns the stored keys.
    pub async fn save_sync(
        &self,
        file: &[u8],
        save_name: &str,
        formats: &[String],
    ) -> Result<Vec<String>> {
        let mut stored = Vec::new();

        for format in supported_only(formats) {
            let derived = self.engine.convert(file, save_name, save_name, &format).await?;
            self.store.store(&derived.name, &derived.bytes).await?;
            stored.push(derived.name);
        }

        info!("Stored {} derived images for '{}'", stored.len(), save_name);
        Ok(stored)
    }

    /// Remove every derived blob of `save_name`. Failures are logged only.
    pub async fn delete_derived(&self, save_name: &str, formats: &[String]) {
        for format in formats {
            let key = derived_key(save_name, format);
            if let Err(e) = self.store.delete(&key).await {
                warn!("Failed to delete derived image {}: {}", key, e);
            }
        }
    }
}
