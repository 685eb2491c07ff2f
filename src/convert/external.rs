//! Command-line encoder codec.
//!
//! Every invocation gets a private scratch directory holding the source bytes
//! and the encoder's output. The directory is removed when the invocation
//! ends, whatever the outcome. Sources are decoded in-process first and
//! rejected before any encoder runs when they are not an image.

use super::Codec;
use crate::models::CodecConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tokio::time::timeout;
use uuid::Uuid;

/// How the encoder expects its input and output paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgStyle {
    /// `<program> <input> -o <output>` (cwebp)
    OutputFlag,
    /// `<program> <input> <output>` (ImageMagick convert)
    Positional,
}

impl ArgStyle {
    fn build_args(self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy().to_string();
        let output = output.to_string_lossy().to_string();
        match self {
            ArgStyle::OutputFlag => vec![input, "-o".to_string(), output],
            ArgStyle::Positional => vec![input, output],
        }
    }
}

pub struct ExternalCodec {
    program: String,
    style: ArgStyle,
    extension: String,
    scratch_dir: PathBuf,
    process_timeout: Duration,
}

impl ExternalCodec {
    pub fn new(
        program: impl Into<String>,
        style: ArgStyle,
        extension: impl Into<String>,
        config: &CodecConfig,
    ) -> Self {
        Self {
            program: program.into(),
            style,
            extension: extension.into(),
            scratch_dir: config.scratch_dir.clone(),
            process_timeout: config.process_timeout,
        }
    }

    async fn run_encoder(&self, input: &Path, output: &Path) -> Result<()> {
        let args = self.style.build_args(input, output);
        tracing::debug!("Running {} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalProcess {
                program: self.program.clone(),
                reason: format!("spawn failed: {}", e),
            })?;

        // Dropping the child on timeout kills it
        let output_result = timeout(self.process_timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::ExternalProcessTimeout {
                program: self.program.clone(),
                timeout_secs: self.process_timeout.as_secs(),
            })?
            .map_err(|e| Error::ExternalProcess {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            return Err(Error::ExternalProcess {
                program: self.program.clone(),
                reason: format!(
                    "exited with {}: {}",
                    output_result.status,
                    stderr.trim()
                ),
            });
        }

        Ok(())
    }
}

/// External encoders are only wired up for POSIX hosts.
pub fn ensure_posix_host() -> Result<()> {
    if cfg!(unix) {
        Ok(())
    } else {
        Err(Error::UnsupportedHost(format!(
            "external encoders need a POSIX host, running on {}",
            std::env::consts::OS
        )))
    }
}

/// Full decode of the source, so bytes that are not an image never reach
/// an encoder.
async fn ensure_decodable(source: &[u8]) -> Result<()> {
    let source = source.to_vec();

    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&source)
            .map(|_| ())
            .map_err(|e| Error::Decode(e.to_string()))
    })
    .await
    .map_err(|e| Error::Task(format!("decode task join error: {}", e)))?
}

/// Base file name of a blob key, safe to join onto a scratch directory.
fn scratch_input_name(original_name: &str) -> String {
    Path::new(original_name)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "source".to_string())
}

#[async_trait]
impl Codec for ExternalCodec {
    async fn encode(&self, source: &[u8], original_name: &str) -> Result<Vec<u8>> {
        ensure_posix_host()?;
        ensure_decodable(source).await?;

        let scratch = tempfile::Builder::new()
            .prefix("image-saver-")
            .tempdir_in(&self.scratch_dir)
            .map_err(|e| self.scratch_error(&self.scratch_dir, e))?;

        let result = self.encode_in(&scratch, source, original_name).await;

        if let Err(e) = scratch.close() {
            tracing::warn!("Failed to remove scratch directory: {}", e);
        }

        result
    }
}

impl ExternalCodec {
    fn scratch_error(&self, path: &Path, e: std::io::Error) -> Error {
        Error::ExternalProcess {
            program: self.program.clone(),
            reason: format!("scratch dir {}: {}", path.display(), e),
        }
    }

    async fn encode_in(
        &self,
        scratch: &TempDir,
        source: &[u8],
        original_name: &str,
    ) -> Result<Vec<u8>> {
        let input = scratch.path().join(scratch_input_name(original_name));
        tokio::fs::write(&input, source)
            .await
            .map_err(|e| self.scratch_error(&input, e))?;

        let output = scratch
            .path()
            .join(format!("{}.{}", Uuid::new_v4(), self.extension));

        self.run_encoder(&input, &output).await?;

        tokio::fs::read(&output)
            .await
            .map_err(|e| Error::ExternalProcess {
                program: self.program.clone(),
                reason: format!("unreadable output {}: {}", output.display(), e),
            })
    }
}
