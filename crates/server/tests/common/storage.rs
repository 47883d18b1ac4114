//! Storage test utilities.

use async_trait::async_trait;
use bytes::Bytes;
use portal_storage::{ByteStream, ObjectMeta, ObjectStore, StorageError, StorageResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Object store wrapper that fails every `put` after a number of successes.
///
/// Deleted keys are recorded so tests can assert compensating deletes.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct FailingStore {
    inner: Arc<dyn ObjectStore>,
    successful_puts: usize,
    puts: AtomicUsize,
    deleted: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn new(inner: Arc<dyn ObjectStore>, successful_puts: usize) -> Self {
        Self {
            inner,
            successful_puts,
            puts: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.inner.get_stream(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        if self.puts.fetch_add(1, Ordering::SeqCst) >= self.successful_puts {
            return Err(StorageError::Io(std::io::Error::other("injected write failure")));
        }
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.deleted.lock().unwrap().push(key.to_string());
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}
