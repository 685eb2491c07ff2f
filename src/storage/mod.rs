//! Blob storage for original and derived images
//!
//! Key-addressed byte storage backed by any S3-compatible object store.
//! Errors are handed back verbatim; nothing here retries or caches.

pub mod client;
pub mod mock;

pub use client::S3BlobStore;
pub use mock::MockBlobStore;

use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;
    /// Overwrites any existing blob at `key`.
    async fn store(&self, key: &str, data: &[u8]) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}
