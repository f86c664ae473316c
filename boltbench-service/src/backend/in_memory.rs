//! In-memory backend for development and tests.
//!
//! This provides a [`Backend`] backed by a `BTreeMap` per container. The backend is [`Clone`] so
//! tests can hold a handle for direct inspection and seeding while the engine owns a boxed copy.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use md5::{Digest, Md5};

use super::common::{
    Backend, BackendError, BackendResult, ContainerMetadata, ContainerSummary, ObjectMetadata,
    ObjectSummary, PutResponse, ReadRange,
};

type Containers = BTreeMap<String, BTreeMap<String, StoredObject>>;

#[derive(Debug, Clone)]
struct StoredObject {
    contents: Bytes,
    content_encoding: Option<String>,
    md5_hash: String,
    etag: String,
    time_created: SystemTime,
    updated: SystemTime,
}

impl StoredObject {
    fn new(contents: Bytes, content_encoding: Option<String>, time_created: SystemTime) -> Self {
        let digest = Md5::digest(&contents);
        Self {
            md5_hash: BASE64.encode(digest),
            etag: format!("{digest:x}"),
            contents,
            content_encoding,
            time_created,
            updated: SystemTime::now(),
        }
    }

    fn metadata(&self) -> ObjectMetadata {
        ObjectMetadata {
            content_encoding: self.content_encoding.clone(),
            etag: Some(self.etag.clone()),
            md5_hash: Some(self.md5_hash.clone()),
            size: self.contents.len() as u64,
            storage_class: Some("STANDARD".into()),
            time_created: Some(humantime::format_rfc3339_millis(self.time_created).to_string()),
            updated: Some(humantime::format_rfc3339_millis(self.updated).to_string()),
            retention_expiration: None,
        }
    }
}

/// A [`Backend`] holding all containers and objects in memory.
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    name: &'static str,
    containers: Arc<Mutex<Containers>>,
}

impl InMemoryBackend {
    /// Creates an empty backend without any containers.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            containers: Arc::default(),
        }
    }

    /// Creates a backend with the given, initially empty, containers.
    pub fn with_containers<I, S>(name: &'static str, containers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::new(name);
        for container in containers {
            backend.create_container(container);
        }
        backend
    }

    fn lock(&self) -> MutexGuard<'_, Containers> {
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a container if it does not exist yet.
    pub fn create_container(&self, container: impl Into<String>) {
        self.lock().entry(container.into()).or_default();
    }

    /// Stores an object directly, creating its container if needed.
    ///
    /// Unlike [`Backend::put_object`], this allows setting a content-encoding.
    pub fn insert_object(
        &self,
        container: &str,
        object: &str,
        contents: impl Into<Bytes>,
        content_encoding: Option<&str>,
    ) {
        let stored = StoredObject::new(
            contents.into(),
            content_encoding.map(str::to_owned),
            SystemTime::now(),
        );
        self.lock()
            .entry(container.to_owned())
            .or_default()
            .insert(object.to_owned(), stored);
    }

    /// Returns `true` if the container holds the given object.
    pub fn contains(&self, container: &str, object: &str) -> bool {
        self.lock()
            .get(container)
            .is_some_and(|objects| objects.contains_key(object))
    }

    /// Removes an object directly, bypassing the `Backend` trait.
    pub fn remove(&self, container: &str, object: &str) {
        if let Some(objects) = self.lock().get_mut(container) {
            objects.remove(object);
        }
    }
}

fn not_found(container: &str, object: &str) -> BackendError {
    BackendError::ObjectNotFound {
        container: container.to_owned(),
        object: object.to_owned(),
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn list_objects(
        &self,
        container: &str,
        max_results: Option<usize>,
    ) -> BackendResult<Vec<ObjectSummary>> {
        let containers = self.lock();
        let objects = containers
            .get(container)
            .ok_or_else(|| BackendError::ContainerNotFound(container.to_owned()))?;

        Ok(objects
            .keys()
            .take(max_results.unwrap_or(usize::MAX))
            .map(|name| ObjectSummary { name: name.clone() })
            .collect())
    }

    async fn list_containers(&self) -> BackendResult<Vec<ContainerSummary>> {
        Ok(self
            .lock()
            .keys()
            .map(|name| ContainerSummary { name: name.clone() })
            .collect())
    }

    async fn get_container_metadata(&self, container: &str) -> BackendResult<ContainerMetadata> {
        if !self.lock().contains_key(container) {
            return Err(BackendError::ContainerNotFound(container.to_owned()));
        }

        Ok(ContainerMetadata {
            name: container.to_owned(),
            location: Some("LOCAL".into()),
            storage_class: Some("STANDARD".into()),
            versioning_enabled: false,
        })
    }

    async fn get_object_metadata(
        &self,
        container: &str,
        object: &str,
    ) -> BackendResult<ObjectMetadata> {
        self.lock()
            .get(container)
            .and_then(|objects| objects.get(object))
            .map(StoredObject::metadata)
            .ok_or_else(|| not_found(container, object))
    }

    async fn put_object(
        &self,
        container: &str,
        object: &str,
        contents: Bytes,
    ) -> BackendResult<PutResponse> {
        let mut containers = self.lock();
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| BackendError::ContainerNotFound(container.to_owned()))?;

        let time_created = objects
            .get(object)
            .map_or_else(SystemTime::now, |existing| existing.time_created);
        let stored = StoredObject::new(contents, None, time_created);
        let response = PutResponse {
            etag: Some(stored.etag.clone()),
            md5_hash: Some(stored.md5_hash.clone()),
        };
        objects.insert(object.to_owned(), stored);

        Ok(response)
    }

    async fn get_object(
        &self,
        container: &str,
        object: &str,
        range: ReadRange,
    ) -> BackendResult<Bytes> {
        let containers = self.lock();
        let stored = containers
            .get(container)
            .and_then(|objects| objects.get(object))
            .ok_or_else(|| not_found(container, object))?;

        Ok(match range {
            ReadRange::Full => stored.contents.clone(),
            ReadRange::FirstByte => stored.contents.slice(..stored.contents.len().min(1)),
        })
    }

    async fn delete_object(&self, container: &str, object: &str) -> BackendResult<()> {
        self.lock()
            .get_mut(container)
            .and_then(|objects| objects.remove(object))
            .map(drop)
            .ok_or_else(|| not_found(container, object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_objects() {
        let backend = InMemoryBackend::with_containers("memory", ["bucket"]);

        let response = backend
            .put_object("bucket", "testing", Bytes::from_static(b"oh hai!"))
            .await
            .unwrap();
        assert!(response.md5_hash.is_some());

        let contents = backend
            .get_object("bucket", "testing", ReadRange::Full)
            .await
            .unwrap();
        assert_eq!(contents.as_ref(), b"oh hai!");

        let first = backend
            .get_object("bucket", "testing", ReadRange::FirstByte)
            .await
            .unwrap();
        assert_eq!(first.as_ref(), b"o");

        let metadata = backend
            .get_object_metadata("bucket", "testing")
            .await
            .unwrap();
        assert_eq!(metadata.size, 7);
        assert_eq!(metadata.content_encoding, None);
    }

    #[tokio::test]
    async fn lists_sorted_and_capped() {
        let backend = InMemoryBackend::new("memory");
        for name in ["c", "a", "b"] {
            backend.insert_object("bucket", name, "x", None);
        }

        let names: Vec<_> = backend
            .list_objects("bucket", Some(2))
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[tokio::test]
    async fn reports_missing_objects_and_containers() {
        let backend = InMemoryBackend::with_containers("memory", ["bucket"]);

        let err = backend
            .get_object("bucket", "missing", ReadRange::Full)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ObjectNotFound { .. }));

        let err = backend.list_objects("nope", None).await.unwrap_err();
        assert!(matches!(err, BackendError::ContainerNotFound(_)));

        let err = backend.delete_object("bucket", "missing").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
