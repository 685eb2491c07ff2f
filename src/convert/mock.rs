use super::Codec;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Codec that echoes its input, optionally failing.
#[derive(Clone)]
pub struct MockCodec {
    encode_count: Arc<Mutex<usize>>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockCodec {
    pub fn new() -> Self {
        Self {
            encode_count: Arc::new(Mutex::new(0)),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_encode_count(&self) -> usize {
        *self.encode_count.lock().unwrap()
    }
}

impl Default for MockCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Codec for MockCodec {
    async fn encode(&self, source: &[u8], _original_name: &str) -> Result<Vec<u8>> {
        *self.encode_count.lock().unwrap() += 1;

        if *self.should_fail.lock().unwrap() {
            return Err(Error::Encode {
                format: "mock".to_string(),
                reason: "Mock failure".to_string(),
            });
        }

        Ok(source.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_codec_counts_calls() {
        let codec = MockCodec::new();
        let probe = codec.clone();

        assert_eq!(codec.encode(b"data", "a.png").await.unwrap(), b"data".to_vec());
        assert_eq!(probe.get_encode_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_codec_failure() {
        let codec = MockCodec::new().with_failure(true);

        let err = codec.encode(b"data", "a.png").await.unwrap_err();
        assert!(err.is_conversion_failure());
        assert_eq!(codec.get_encode_count(), 1);
    }
}
