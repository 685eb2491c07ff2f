//! Image format conversion
//!
//! Turns source image bytes into one derived encoding per requested format.
//! Each format maps to a [`Codec`]: raster formats are encoded in-process,
//! webp and avif are delegated to command-line encoders.

pub mod external;
pub mod mime;
pub mod mock;
pub mod native;

pub use external::{ArgStyle, ExternalCodec};
pub use mock::MockCodec;
pub use native::NativeCodec;

use crate::models::{derived_key, CodecConfig, DerivedImage};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait Codec: Send + Sync {
    /// Encode `source` into this codec's format. `original_name` is the
    /// source blob key and only informs scratch file naming.
    async fn encode(&self, source: &[u8], original_name: &str) -> Result<Vec<u8>>;
}

/// Lookup table from format string to codec.
#[derive(Clone, Default)]
pub struct ConversionEngine {
    codecs: HashMap<String, Arc<dyn Codec>>,
}

impl ConversionEngine {
    /// Engine with no codecs registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `jpg`, `jpeg`, `png` in-process; `webp`, `avif` through external encoders.
    pub fn new(config: &CodecConfig) -> Self {
        let jpeg: Arc<dyn Codec> = Arc::new(NativeCodec::jpeg());

        Self::empty()
            .with_shared_codec("jpg", jpeg.clone())
            .with_shared_codec("jpeg", jpeg)
            .with_codec("png", NativeCodec::png())
            .with_codec(
                "webp",
                ExternalCodec::new(
                    config.webp_encoder.clone(),
                    ArgStyle::OutputFlag,
                    "webp",
                    config,
                ),
            )
            .with_codec(
                "avif",
                ExternalCodec::new(
                    config.avif_encoder.clone(),
                    ArgStyle::Positional,
                    "avif",
                    config,
                ),
            )
    }

    pub fn with_codec(self, format: &str, codec: impl Codec + 'static) -> Self {
        self.with_shared_codec(format, Arc::new(codec))
    }

    pub fn with_shared_codec(mut self, format: &str, codec: Arc<dyn Codec>) -> Self {
        self.codecs.insert(format.to_string(), codec);
        self
    }

    pub fn supports(&self, format: &str) -> bool {
        self.codecs.contains_key(format)
    }

    pub async fn convert(
        &self,
        source: &[u8],
        original_name: &str,
        save_name: &str,
        format: &str,
    ) -> Result<DerivedImage> {
        let codec = self
            .codecs
            .get(format)
            .ok_or_else(|| Error::UnsupportedFormat(format.to_string()))?;

        let bytes = codec.encode(source, original_name).await?;

        Ok(DerivedImage {
            name: derived_key(save_name, format),
            bytes,
        })
    }
}
