//! Storage test utilities.

use async_trait::async_trait;
use bytes::Bytes;
use chunkyard_storage::{
    ByteStream, ObjectMeta, ObjectStore, StorageError, StorageResult, StreamingUpload,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

/// Object store wrapper that can be told to fail reads or writes, or to
/// hold writes until released.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct FaultyStore {
    inner: Arc<dyn ObjectStore>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    write_gate: Mutex<Option<Arc<Semaphore>>>,
    write_held: Notify,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            write_gate: Mutex::new(None),
            write_held: Notify::new(),
        }
    }

    /// Block every write started from now on until [`Self::release_writes`].
    pub fn hold_writes(&self) {
        *self.write_gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_writes(&self) {
        if let Some(gate) = self.write_gate.lock().unwrap().take() {
            gate.close();
        }
    }

    /// Wait until a write is blocked by [`Self::hold_writes`].
    pub async fn wait_for_held_write(&self) {
        self.write_held.notified().await;
    }

    async fn pass_write_gate(&self) {
        let gate = self.write_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.write_held.notify_one();
            // Closing the semaphore is the release signal
            let _ = gate.acquire().await;
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> StorageResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other(format!(
                "injected {op} failure"
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        self.check(&self.fail_reads, "read")?;
        self.inner.get_stream(key).await
    }

    async fn get_range_stream(
        &self,
        key: &str,
        offset: u64,
        len: u64,
    ) -> StorageResult<ByteStream> {
        self.check(&self.fail_reads, "read")?;
        self.inner.get_range_stream(key, offset, len).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.check(&self.fail_writes, "write")?;
        self.pass_write_gate().await;
        self.inner.put(key, data).await
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        self.check(&self.fail_writes, "write")?;
        self.pass_write_gate().await;
        self.inner.put_stream(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.inner.health_check().await
    }
}
