//! Content validation of one object across both endpoints.
//!
//! Validation compares what each endpoint actually serves: both copies are read in full,
//! gzip-decompressed where applicable, and hashed. Unlike the benchmark phases, validation never
//! fails with an error. Failures become a [`ValidationResult::Failed`] record so that callers can
//! report them in the same shape as a successful comparison.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::backend::{Backend, Backends, ObjectMetadata, ReadRange};
use crate::encoding::{gunzip, is_compressed, md5_hex};
use crate::error::EngineResult;

/// Digests of one object as served by each endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectDigests {
    /// Uppercase hex MD5 from the primary store, absent if the primary was skipped.
    pub primary: Option<String>,
    /// Uppercase hex MD5 from the accelerator.
    pub accelerator: String,
}

impl ObjectDigests {
    /// Returns whether both copies are identical, or `None` if the primary was skipped.
    pub fn is_consistent(&self) -> Option<bool> {
        self.primary
            .as_ref()
            .map(|primary| *primary == self.accelerator)
    }
}

/// Outcome of [`validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationResult {
    /// Both reads succeeded.
    Digests(ObjectDigests),
    /// A read or decompression failed.
    Failed {
        /// Description of the failure.
        message: String,
    },
}

impl Serialize for ValidationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ValidationResult::Digests(digests) => {
                let mut map = serializer.serialize_map(None)?;
                if let Some(primary) = &digests.primary {
                    map.serialize_entry("gs-md5", primary)?;
                }
                map.serialize_entry("bolt-md5", &digests.accelerator)?;
                map.end()
            }
            ValidationResult::Failed { message } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("errorMessage", message)?;
                map.serialize_entry("errorCode", "1")?;
                map.end()
            }
        }
    }
}

/// Reads an object from the accelerator, and from the primary unless `skip_primary` is set, and
/// computes the digests of their contents.
///
/// Contents are decompressed before hashing if the object is compressed. When both copies are
/// read, the primary's content-encoding decides, since the primary is authoritative.
pub async fn validate(
    backends: &Backends,
    container: &str,
    key: &str,
    skip_primary: bool,
) -> ValidationResult {
    match compare(backends, container, key, skip_primary).await {
        Ok(digests) => {
            if digests.is_consistent() == Some(false) {
                tracing::warn!(container, key, ?digests, "object differs between endpoints");
            }
            ValidationResult::Digests(digests)
        }
        Err(error) => {
            tracing::debug!(
                container,
                key,
                error = &error as &dyn std::error::Error,
                "validation failed"
            );
            ValidationResult::Failed {
                message: error.to_string(),
            }
        }
    }
}

async fn compare(
    backends: &Backends,
    container: &str,
    key: &str,
    skip_primary: bool,
) -> EngineResult<ObjectDigests> {
    let (accelerator_meta, accelerator_data) =
        fetch(backends.accelerator(), container, key).await?;

    let primary = if skip_primary {
        None
    } else {
        Some(fetch(backends.primary(), container, key).await?)
    };

    let encoding_source = primary.as_ref().map_or(&accelerator_meta, |(meta, _)| meta);
    let compressed = is_compressed(encoding_source.content_encoding.as_deref(), key);

    let accelerator = digest(&accelerator_data, compressed).await?;
    let primary = match primary {
        Some((_, data)) => Some(digest(&data, compressed).await?),
        None => None,
    };

    Ok(ObjectDigests {
        primary,
        accelerator,
    })
}

/// Reads an object from one endpoint and returns the digest of its contents.
///
/// The contents are decompressed first if the object is compressed.
pub async fn object_digest(
    backend: &dyn Backend,
    container: &str,
    key: &str,
) -> EngineResult<String> {
    let (metadata, data) = fetch(backend, container, key).await?;
    let compressed = is_compressed(metadata.content_encoding.as_deref(), key);
    digest(&data, compressed).await
}

async fn fetch(
    backend: &dyn Backend,
    container: &str,
    key: &str,
) -> EngineResult<(ObjectMetadata, bytes::Bytes)> {
    let metadata = backend.get_object_metadata(container, key).await?;
    let data = backend.get_object(container, key, ReadRange::Full).await?;
    Ok((metadata, data))
}

async fn digest(data: &[u8], compressed: bool) -> EngineResult<String> {
    if compressed {
        Ok(md5_hex(&gunzip(data).await?))
    } else {
        Ok(md5_hex(data))
    }
}
