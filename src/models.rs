//! Data models and structures
//!
//! Defines the conversion job message, derived image output and the
//! runtime configuration shared by the worker and the producer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Output formats the engine knows how to produce. Matching is case-sensitive.
pub const SUPPORTED_FORMATS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "avif"];

pub fn is_supported_format(format: &str) -> bool {
    SUPPORTED_FORMATS.contains(&format)
}

/// Key of the blob produced for `format` from `save_name`.
pub fn derived_key(save_name: &str, format: &str) -> String {
    format!("{}.{}", save_name, format)
}

/// Queue message asking the worker to derive `save_formats` from a stored original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionJob {
    pub original_image_name: String,
    pub save_name: String,
    pub save_formats: Vec<String>,
}

impl ConversionJob {
    pub fn new(original_image_name: String, save_name: String, save_formats: Vec<String>) -> Self {
        Self {
            original_image_name,
            save_name,
            save_formats,
        }
    }

    pub fn from_slice(payload: &[u8]) -> crate::Result<Self> {
        serde_json::from_slice(payload).map_err(|e| crate::Error::MalformedMessage(e.to_string()))
    }

    pub fn to_vec(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// One encoded output, owned until it is uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

// Configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub force_path_style: bool,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub url: String,
    pub queue_name: String,
    pub publish_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub webp_encoder: String,
    pub avif_encoder: String,
    pub scratch_dir: PathBuf,
    pub process_timeout: Duration,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            webp_encoder: "cwebp".to_string(),
            avif_encoder: "convert".to_string(),
            scratch_dir: std::env::temp_dir(),
            process_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub job_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub codec: CodecConfig,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| crate::Error::Config(format!("{} not set", key)))
        };
        let secs = |key: &str, default: u64| -> crate::Result<Duration> {
            match lookup(key) {
                Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                    crate::Error::Config(format!("{} must be a whole number of seconds", key))
                }),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let force_path_style = match lookup("S3_FORCE_PATH_STYLE").as_deref() {
            None => true,
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => {
                return Err(crate::Error::Config(format!(
                    "S3_FORCE_PATH_STYLE must be true or false, got '{}'",
                    other
                )))
            }
        };

        let defaults = CodecConfig::default();

        Ok(Self {
            storage: StorageConfig {
                bucket: required("S3_BUCKET")?,
                access_key_id: required("S3_ACCESS_KEY_ID")?,
                secret_access_key: required("S3_SECRET_ACCESS_KEY")?,
                endpoint: lookup("S3_ENDPOINT").filter(|value| !value.is_empty()),
                region: lookup("S3_REGION").unwrap_or_else(|| "us-east-2".to_string()),
                force_path_style,
            },
            queue: QueueConfig {
                url: required("AMQP_URL")?,
                queue_name: required("QUEUE_NAME")?,
                publish_timeout: secs("PUBLISH_TIMEOUT_SECS", 5)?,
            },
            codec: CodecConfig {
                webp_encoder: lookup("WEBP_ENCODER").unwrap_or(defaults.webp_encoder),
                avif_encoder: lookup("AVIF_ENCODER").unwrap_or(defaults.avif_encoder),
                scratch_dir: lookup("SCRATCH_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.scratch_dir),
                process_timeout: secs("PROCESS_TIMEOUT_SECS", 120)?,
            },
            worker: WorkerConfig {
                job_timeout: secs("JOB_TIMEOUT_SECS", 600)?,
            },
        })
    }
}
