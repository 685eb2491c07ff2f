use super::Codec;
use crate::{Error, Result};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// In-process encoder for raster formats the `image` crate writes natively.
pub struct NativeCodec {
    format: ImageFormat,
}

impl NativeCodec {
    pub fn jpeg() -> Self {
        Self {
            format: ImageFormat::Jpeg,
        }
    }

    pub fn png() -> Self {
        Self {
            format: ImageFormat::Png,
        }
    }

    fn encode_sync(format: ImageFormat, source: Vec<u8>) -> Result<Vec<u8>> {
        // Signature sniffing, the source key's extension plays no part
        let image = image::load_from_memory(&source).map_err(|e| Error::Decode(e.to_string()))?;

        let mut bytes = Vec::new();
        let encoded = match format {
            ImageFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb = image.to_rgb8();
                JpegEncoder::new(&mut bytes).encode_image(&rgb)
            }
            ImageFormat::Png => {
                let image = match image {
                    DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
                        DynamicImage::ImageRgba16(image.to_rgba16())
                    }
                    other => other,
                };
                image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            }
            other => image.write_to(&mut Cursor::new(&mut bytes), other),
        };

        encoded.map_err(|e| Error::Encode {
            format: format_name(format).to_string(),
            reason: e.to_string(),
        })?;

        Ok(bytes)
    }
}

fn format_name(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("image")
}

#[async_trait]
impl Codec for NativeCodec {
    async fn encode(&self, source: &[u8], _original_name: &str) -> Result<Vec<u8>> {
        let format = self.format;
        let source = source.to_vec();

        tokio::task::spawn_blocking(move || Self::encode_sync(format, source))
            .await
            .map_err(|e| {
                Error::Task(format!(
                    "{} encode task join error: {}",
                    format_name(self.format),
                    e
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn encode_fixture(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    fn rgba_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 128, 255, 128]));
        encode_fixture(DynamicImage::ImageRgba8(img), ImageFormat::Png)
    }

    #[tokio::test]
    async fn test_png_with_alpha_to_jpeg() {
        let bytes = NativeCodec::jpeg()
            .encode(&rgba_png(16, 9), "photo.png")
            .await
            .unwrap();

        assert_eq!(
            image::guess_format(&bytes).unwrap(),
            ImageFormat::Jpeg
        );
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (16, 9));
    }

    #[tokio::test]
    async fn test_jpeg_to_png() {
        let jpeg = encode_fixture(
            DynamicImage::ImageRgb8(image::RgbImage::from_pixel(5, 3, image::Rgb([9, 9, 9]))),
            ImageFormat::Jpeg,
        );

        let bytes = NativeCodec::png().encode(&jpeg, "photo.jpg").await.unwrap();

        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (5, 3));
    }

    #[tokio::test]
    async fn test_extension_does_not_drive_decoding() {
        // PNG bytes stored under a misleading key still decode
        let bytes = NativeCodec::png()
            .encode(&rgba_png(4, 4), "upload-original.jpeg")
            .await
            .unwrap();

        assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (4, 4));
    }

    #[tokio::test]
    async fn test_corrupt_source_is_decode_error() {
        let err = NativeCodec::jpeg()
            .encode(b"definitely not an image", "cat.png")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn test_encoding_is_deterministic() {
        let source = rgba_png(8, 8);
        let codec = NativeCodec::jpeg();

        let first = codec.encode(&source, "a.png").await.unwrap();
        let second = codec.encode(&source, "a.png").await.unwrap();

        assert_eq!(first, second);
    }
}
