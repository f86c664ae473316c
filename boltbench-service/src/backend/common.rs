use std::fmt::Debug;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("boltbench/", env!("CARGO_PKG_VERSION"));

/// A type-erased [`Backend`] instance.
pub type BoxedBackend = Box<dyn Backend>;

/// The storage capabilities the engine requires from an endpoint.
///
/// Both the primary store and the accelerator implement this trait, so every workload can be run
/// against either of them without knowing which one it talks to.
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Lists objects in a container, returning at most `max_results` entries if given.
    async fn list_objects(
        &self,
        container: &str,
        max_results: Option<usize>,
    ) -> BackendResult<Vec<ObjectSummary>>;

    /// Lists all containers visible to the caller.
    async fn list_containers(&self) -> BackendResult<Vec<ContainerSummary>>;

    /// Retrieves the metadata of a container.
    async fn get_container_metadata(&self, container: &str) -> BackendResult<ContainerMetadata>;

    /// Retrieves the metadata of an object without reading its contents.
    async fn get_object_metadata(
        &self,
        container: &str,
        object: &str,
    ) -> BackendResult<ObjectMetadata>;

    /// Stores or overwrites an object.
    async fn put_object(
        &self,
        container: &str,
        object: &str,
        contents: Bytes,
    ) -> BackendResult<PutResponse>;

    /// Reads the stored bytes of an object, or only its first byte.
    ///
    /// Content-encoded objects are returned as stored, without transcoding.
    async fn get_object(&self, container: &str, object: &str, range: ReadRange)
    -> BackendResult<Bytes>;

    /// Deletes an object.
    async fn delete_object(&self, container: &str, object: &str) -> BackendResult<()>;
}

/// The portion of an object requested by [`Backend::get_object`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadRange {
    /// The entire object.
    #[default]
    Full,
    /// Only the first byte, for time-to-first-byte measurements.
    FirstByte,
}

/// An entry of an object listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    /// The object name.
    pub name: String,
}

/// An entry of a container listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    /// The container name.
    pub name: String,
}

/// Metadata describing a container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerMetadata {
    /// The container name.
    #[serde(rename = "BucketName")]
    pub name: String,
    /// The location (region or multi-region) of the container.
    pub location: Option<String>,
    /// The default storage class of the container.
    pub storage_class: Option<String>,
    /// Whether object versioning is enabled.
    pub versioning_enabled: bool,
}

/// Metadata describing a stored object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectMetadata {
    /// The `Content-Encoding` the object was stored with, e.g. `gzip`.
    pub content_encoding: Option<String>,
    /// The entity tag of the current object generation.
    #[serde(rename = "ETag")]
    pub etag: Option<String>,
    /// Base64-encoded MD5 of the stored bytes.
    pub md5_hash: Option<String>,
    /// Size of the stored bytes.
    #[serde(rename = "Size")]
    pub size: u64,
    /// The storage class of the object.
    pub storage_class: Option<String>,
    /// RFC 3339 creation timestamp.
    pub time_created: Option<String>,
    /// RFC 3339 timestamp of the last metadata or content update.
    pub updated: Option<String>,
    /// RFC 3339 timestamp after which a retention policy no longer protects the object.
    #[serde(rename = "RetentionExpirationTime", skip_serializing_if = "Option::is_none")]
    pub retention_expiration: Option<String>,
}

/// Response of a successful [`Backend::put_object`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PutResponse {
    /// The entity tag of the written object.
    #[serde(rename = "ETag")]
    pub etag: Option<String>,
    /// Base64-encoded MD5 of the written bytes.
    #[serde(rename = "Md5Hash")]
    pub md5_hash: Option<String>,
}

/// Errors returned by storage backends.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The requested object does not exist.
    #[error("object `{object}` not found in container `{container}`")]
    ObjectNotFound {
        /// The container that was searched.
        container: String,
        /// The missing object name.
        object: String,
    },

    /// The requested container does not exist.
    #[error("container `{0}` not found")]
    ContainerNotFound(String),

    /// The endpoint answered with a status code the backend does not handle.
    #[error("unexpected status {status} from {context}: {message}")]
    Status {
        /// Describes the request that failed.
        context: String,
        /// The HTTP status code.
        status: reqwest::StatusCode,
        /// The response body, if it could be read.
        message: String,
    },

    /// IO errors related to payload streaming.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors related to de/serialization.
    #[error("serde error: {context}")]
    Serde {
        /// Describes what was being decoded.
        context: String,
        /// The underlying error.
        #[source]
        cause: serde_json::Error,
    },

    /// All errors stemming from the reqwest client.
    ///
    /// These are network errors encountered when sending the requests or reading responses.
    #[error("reqwest error: {context}")]
    Reqwest {
        /// Describes the request that failed.
        context: String,
        /// The underlying error.
        #[source]
        cause: reqwest::Error,
    },

    /// Errors encountered when attempting to authenticate with GCP.
    #[error("GCP authentication error: {0}")]
    GcpAuth(#[from] gcp_auth::Error),

    /// The backend was configured with invalid or incomplete settings.
    #[error("backend configuration error: {0}")]
    Config(String),
}

impl BackendError {
    /// Returns `true` if the error indicates that an object or container does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound { .. } | Self::ContainerNotFound(_))
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Creates a reqwest client with required defaults.
pub fn reqwest_client() -> BackendResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|cause| BackendError::Reqwest {
            context: "building HTTP client".into(),
            cause,
        })
}
