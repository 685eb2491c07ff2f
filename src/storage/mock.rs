use super::BlobStore;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// In-memory store recording every operation in call order.
#[derive(Clone)]
pub struct MockBlobStore {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    operations: Arc<Mutex<Vec<String>>>,
    failing_uploads: Arc<Mutex<HashSet<String>>>,
    fail_deletes: Arc<Mutex<bool>>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            failing_uploads: Arc::new(Mutex::new(HashSet::new())),
            fail_deletes: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_file(self, key: String, content: Vec<u8>) -> Self {
        self.files.lock().unwrap().insert(key, content);
        self
    }

    /// Make uploads to `key` fail.
    pub fn with_failing_upload(self, key: String) -> Self {
        self.failing_uploads.lock().unwrap().insert(key);
        self
    }

    pub fn with_failing_deletes(self, fail: bool) -> Self {
        *self.fail_deletes.lock().unwrap() = fail;
        self
    }

    pub fn get_files(&self) -> HashMap<String, Vec<u8>> {
        self.files.lock().unwrap().clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.files.lock().unwrap().contains_key(key)
    }

    /// Operations as `"fetch:<key>"`, `"store:<key>"`, `"delete:<key>"`.
    pub fn get_operations(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }

    pub fn get_upload_count(&self) -> usize {
        self.operations
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.starts_with("store:"))
            .count()
    }

    fn record(&self, op: &str, key: &str) {
        self.operations
            .lock()
            .unwrap()
            .push(format!("{}:{}", op, key));
    }
}

impl Default for MockBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        self.record("fetch", key);

        let files = self.files.lock().unwrap();
        files.get(key).cloned().ok_or_else(|| Error::StoreFetch {
            key: key.to_string(),
            reason: "NoSuchKey".to_string(),
        })
    }

    async fn store(&self, key: &str, data: &[u8]) -> Result<()> {
        self.record("store", key);

        if self.failing_uploads.lock().unwrap().contains(key) {
            return Err(Error::StoreUpload {
                key: key.to_string(),
                reason: "Mock upload failure".to_string(),
            });
        }

        self.files
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.record("delete", key);

        if *self.fail_deletes.lock().unwrap() {
            return Err(Error::StoreDelete {
                key: key.to_string(),
                reason: "Mock delete failure".to_string(),
            });
        }

        // S3 deletes are idempotent, missing keys are not an error
        self.files.lock().unwrap().remove(key);
        Ok(())
    }
}
