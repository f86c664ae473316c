//! Helpers shared by unit tests.

use std::future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_compression::tokio::write::GzipEncoder;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::backend::{
    Backend, BackendError, BackendResult, ContainerMetadata, ContainerSummary, InMemoryBackend,
    ObjectMetadata, ObjectSummary, PutResponse, ReadRange,
};

/// Compresses a payload into a single gzip member.
pub async fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzipEncoder::new(Vec::new());
    encoder.write_all(data).await.unwrap();
    encoder.shutdown().await.unwrap();
    encoder.into_inner()
}

/// An in-memory backend whose objects only become readable after a number of failed reads.
///
/// Every metadata lookup counts as one attempt. The first `failures` attempts report the object
/// as missing, regardless of whether it exists.
#[derive(Debug, Clone)]
pub struct FlakyBackend {
    inner: InMemoryBackend,
    failures: usize,
    attempts: Arc<AtomicUsize>,
}

impl FlakyBackend {
    pub fn new(inner: InMemoryBackend, failures: usize) -> Self {
        Self {
            inner,
            failures,
            attempts: Arc::default(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Backend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn list_objects(
        &self,
        container: &str,
        max_results: Option<usize>,
    ) -> BackendResult<Vec<ObjectSummary>> {
        self.inner.list_objects(container, max_results).await
    }

    async fn list_containers(&self) -> BackendResult<Vec<ContainerSummary>> {
        self.inner.list_containers().await
    }

    async fn get_container_metadata(&self, container: &str) -> BackendResult<ContainerMetadata> {
        self.inner.get_container_metadata(container).await
    }

    async fn get_object_metadata(
        &self,
        container: &str,
        object: &str,
    ) -> BackendResult<ObjectMetadata> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(BackendError::ObjectNotFound {
                container: container.to_owned(),
                object: object.to_owned(),
            });
        }
        self.inner.get_object_metadata(container, object).await
    }

    async fn put_object(
        &self,
        container: &str,
        object: &str,
        contents: Bytes,
    ) -> BackendResult<PutResponse> {
        self.inner.put_object(container, object, contents).await
    }

    async fn get_object(
        &self,
        container: &str,
        object: &str,
        range: ReadRange,
    ) -> BackendResult<Bytes> {
        self.inner.get_object(container, object, range).await
    }

    async fn delete_object(&self, container: &str, object: &str) -> BackendResult<()> {
        self.inner.delete_object(container, object).await
    }
}

/// A backend whose requests never complete.
#[derive(Debug)]
pub struct HangingBackend;

#[async_trait::async_trait]
impl Backend for HangingBackend {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn list_objects(&self, _: &str, _: Option<usize>) -> BackendResult<Vec<ObjectSummary>> {
        future::pending().await
    }

    async fn list_containers(&self) -> BackendResult<Vec<ContainerSummary>> {
        future::pending().await
    }

    async fn get_container_metadata(&self, _: &str) -> BackendResult<ContainerMetadata> {
        future::pending().await
    }

    async fn get_object_metadata(&self, _: &str, _: &str) -> BackendResult<ObjectMetadata> {
        future::pending().await
    }

    async fn put_object(&self, _: &str, _: &str, _: Bytes) -> BackendResult<PutResponse> {
        future::pending().await
    }

    async fn get_object(&self, _: &str, _: &str, _: ReadRange) -> BackendResult<Bytes> {
        future::pending().await
    }

    async fn delete_object(&self, _: &str, _: &str) -> BackendResult<()> {
        future::pending().await
    }
}

/// Calls made to one or more [`RecordingBackend`]s, in order.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    /// Takes all entries recorded so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// An in-memory backend that appends `"<name> <operation> <object>"` to a [`CallLog`] for every
/// call.
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    inner: InMemoryBackend,
    log: CallLog,
}

impl RecordingBackend {
    pub fn new(inner: InMemoryBackend, log: CallLog) -> Self {
        Self { inner, log }
    }

    fn record(&self, operation: &str, object: &str) {
        let name = self.inner.name();
        self.log.push(format!("{name} {operation} {object}").trim_end().to_owned());
    }
}

#[async_trait::async_trait]
impl Backend for RecordingBackend {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn list_objects(
        &self,
        container: &str,
        max_results: Option<usize>,
    ) -> BackendResult<Vec<ObjectSummary>> {
        self.record("list", "");
        self.inner.list_objects(container, max_results).await
    }

    async fn list_containers(&self) -> BackendResult<Vec<ContainerSummary>> {
        self.record("list_containers", "");
        self.inner.list_containers().await
    }

    async fn get_container_metadata(&self, container: &str) -> BackendResult<ContainerMetadata> {
        self.record("container_metadata", "");
        self.inner.get_container_metadata(container).await
    }

    async fn get_object_metadata(
        &self,
        container: &str,
        object: &str,
    ) -> BackendResult<ObjectMetadata> {
        self.record("metadata", object);
        self.inner.get_object_metadata(container, object).await
    }

    async fn put_object(
        &self,
        container: &str,
        object: &str,
        contents: Bytes,
    ) -> BackendResult<PutResponse> {
        self.record("put", object);
        self.inner.put_object(container, object, contents).await
    }

    async fn get_object(
        &self,
        container: &str,
        object: &str,
        range: ReadRange,
    ) -> BackendResult<Bytes> {
        self.record("get", object);
        self.inner.get_object(container, object, range).await
    }

    async fn delete_object(&self, container: &str, object: &str) -> BackendResult<()> {
        self.record("delete", object);
        self.inner.delete_object(container, object).await
    }
}
