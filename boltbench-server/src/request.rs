//! The JSON request body shared by all benchmark endpoints.
//!
//! All endpoints accept the same flat object and use the fields relevant to them:
//!
//! ```json
//! {"requestType": "download_object", "sdkType": "BOLT", "bucket": "<bucket>", "key": "<key>"}
//! ```
//!
//! Selector values (`requestType`, `sdkType`, `bucketClean`) are case-insensitive.

use std::fmt;
use std::str::FromStr;

use boltbench_service::BackendKind;
use boltbench_service::keys::MAX_DISCOVERED_KEYS;
use boltbench_service::runner::DEFAULT_OBJECT_LENGTH;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};

/// Number of keys used by perf requests that do not specify `numKeys`.
pub const DEFAULT_NUM_KEYS: usize = 1000;

/// The request body of all benchmark endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchRequest {
    /// The container to operate on.
    pub bucket: Option<String>,
    /// A single object name.
    pub key: Option<String>,
    /// The payload of an ops upload.
    pub value: Option<String>,
    /// The operation to perform.
    pub request_type: Option<String>,
    /// The endpoint of an ops request, `GS` or `BOLT`.
    pub sdk_type: Option<String>,
    /// Number of synthetic keys for perf requests.
    #[serde(default, deserialize_with = "lenient_usize")]
    pub num_keys: Option<usize>,
    /// Payload length of perf uploads.
    #[serde(default, deserialize_with = "lenient_usize")]
    pub obj_length: Option<usize>,
    /// Explicit keys for perf requests, replacing generated or discovered ones.
    pub keys: Option<Vec<String>>,
    /// `ON` to validate against the accelerator only.
    pub bucket_clean: Option<String>,
}

impl BenchRequest {
    /// The container, which every request needs.
    pub fn bucket(&self) -> ApiResult<&str> {
        self.bucket
            .as_deref()
            .ok_or(ApiError::MissingParameter("bucket"))
    }

    /// The object name.
    pub fn key(&self) -> ApiResult<&str> {
        self.key.as_deref().ok_or(ApiError::MissingParameter("key"))
    }

    /// The upload payload.
    pub fn value(&self) -> ApiResult<&str> {
        self.value
            .as_deref()
            .ok_or(ApiError::MissingParameter("value"))
    }

    /// The endpoint of an ops request. Defaults to the accelerator.
    pub fn backend_kind(&self) -> ApiResult<BackendKind> {
        match &self.sdk_type {
            Some(sdk_type) => Ok(sdk_type.parse()?),
            None => Ok(BackendKind::Accelerator),
        }
    }

    /// The operation of an ops request, which is required.
    pub fn ops_request_type(&self) -> ApiResult<OpsRequestType> {
        let request_type = self
            .request_type
            .as_deref()
            .ok_or(ApiError::MissingParameter("requestType"))?;
        request_type.parse()
    }

    /// The operation of a perf request. Defaults to [`PerfRequestType::All`].
    pub fn perf_request_type(&self) -> ApiResult<PerfRequestType> {
        match &self.request_type {
            Some(request_type) => request_type.parse(),
            None => Ok(PerfRequestType::All),
        }
    }

    /// The number of keys for perf requests, at most [`MAX_DISCOVERED_KEYS`].
    pub fn num_keys(&self) -> usize {
        self.num_keys
            .unwrap_or(DEFAULT_NUM_KEYS)
            .min(MAX_DISCOVERED_KEYS)
    }

    /// The payload length of perf uploads.
    pub fn obj_length(&self) -> usize {
        self.obj_length.unwrap_or(DEFAULT_OBJECT_LENGTH)
    }

    /// Whether validation should skip the primary store.
    pub fn skip_primary(&self) -> bool {
        self.bucket_clean
            .as_deref()
            .is_some_and(|value| value.eq_ignore_ascii_case("ON"))
    }
}

/// Operations of the `/ops` endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpsRequestType {
    /// List all object names in a container.
    ListObjects,
    /// List all container names.
    ListBuckets,
    /// Describe a container.
    GetBucketMd,
    /// Describe an object.
    GetObjectMd,
    /// Store an object.
    UploadObject,
    /// Read an object and return the digest of its contents.
    DownloadObject,
    /// Delete an object.
    DeleteObject,
}

impl FromStr for OpsRequestType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "LIST_OBJECTS" => Self::ListObjects,
            "LIST_BUCKETS" => Self::ListBuckets,
            "GET_BUCKET_MD" => Self::GetBucketMd,
            "GET_OBJECT_MD" => Self::GetObjectMd,
            "UPLOAD_OBJECT" => Self::UploadObject,
            "DOWNLOAD_OBJECT" => Self::DownloadObject,
            "DELETE_OBJECT" => Self::DeleteObject,
            _ => return Err(ApiError::UnsupportedRequestType(s.to_owned())),
        })
    }
}

/// Benchmarks of the `/perf` endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PerfRequestType {
    /// Repeatedly list the container.
    ListObjects,
    /// Read whole objects from both endpoints.
    DownloadObject,
    /// Read the first byte of objects from both endpoints.
    DownloadObjectTtfb,
    /// Read whole objects through the accelerator only.
    DownloadObjectPassthrough,
    /// Read the first byte of objects through the accelerator only.
    DownloadObjectPassthroughTtfb,
    /// Write random payloads to both endpoints.
    UploadObject,
    /// Delete objects from both endpoints.
    DeleteObject,
    /// Upload, delete, list and download in sequence.
    All,
}

impl PerfRequestType {
    /// Whether the benchmark reads existing objects, discovered by listing if not given.
    pub fn reads_existing(self) -> bool {
        matches!(
            self,
            Self::DownloadObject
                | Self::DownloadObjectTtfb
                | Self::DownloadObjectPassthrough
                | Self::DownloadObjectPassthroughTtfb
        )
    }
}

impl FromStr for PerfRequestType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "LIST_OBJECTS" => Self::ListObjects,
            "DOWNLOAD_OBJECT" => Self::DownloadObject,
            "DOWNLOAD_OBJECT_TTFB" => Self::DownloadObjectTtfb,
            "DOWNLOAD_OBJECT_PASSTHROUGH" => Self::DownloadObjectPassthrough,
            "DOWNLOAD_OBJECT_PASSTHROUGH_TTFB" => Self::DownloadObjectPassthroughTtfb,
            "UPLOAD_OBJECT" => Self::UploadObject,
            "DELETE_OBJECT" => Self::DeleteObject,
            "ALL" => Self::All,
            _ => return Err(ApiError::UnsupportedRequestType(s.to_owned())),
        })
    }
}

/// Accepts a non-negative integer given either as a JSON number or as a numeric string.
fn lenient_usize<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    struct LenientUsize;

    impl Visitor<'_> for LenientUsize {
        type Value = Option<usize>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative integer or a numeric string")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            usize::try_from(v).map(Some).map_err(E::custom)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            usize::try_from(v).map(Some).map_err(E::custom)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            v.trim().parse().map(Some).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(LenientUsize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> BenchRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn numbers_or_strings() {
        let request = parse(r#"{"bucket": "b", "numKeys": 5, "objLength": "64"}"#);
        assert_eq!(request.num_keys(), 5);
        assert_eq!(request.obj_length(), 64);

        let request = parse(r#"{"numKeys": null}"#);
        assert_eq!(request.num_keys(), DEFAULT_NUM_KEYS);
        assert_eq!(request.obj_length(), DEFAULT_OBJECT_LENGTH);

        assert!(serde_json::from_str::<BenchRequest>(r#"{"numKeys": "many"}"#).is_err());
        assert!(serde_json::from_str::<BenchRequest>(r#"{"numKeys": -1}"#).is_err());
    }

    #[test]
    fn num_keys_is_clamped() {
        assert_eq!(parse(r#"{"numKeys": 5000}"#).num_keys(), 1000);
    }

    #[test]
    fn selectors_ignore_case() {
        let request = parse(
            r#"{"requestType": "download_object_ttfb", "sdkType": "gs", "bucketClean": "on"}"#,
        );
        assert_eq!(
            request.perf_request_type().unwrap(),
            PerfRequestType::DownloadObjectTtfb
        );
        assert_eq!(request.backend_kind().unwrap(), BackendKind::Primary);
        assert!(request.skip_primary());
    }

    #[test]
    fn defaults() {
        let request = parse(r#"{"bucket": "b"}"#);
        assert_eq!(request.perf_request_type().unwrap(), PerfRequestType::All);
        assert_eq!(request.backend_kind().unwrap(), BackendKind::Accelerator);
        assert!(!request.skip_primary());
        assert!(matches!(
            request.ops_request_type(),
            Err(ApiError::MissingParameter("requestType"))
        ));
        assert!(matches!(
            request.key(),
            Err(ApiError::MissingParameter("key"))
        ));
    }

    #[test]
    fn unknown_selectors() {
        let request = parse(r#"{"requestType": "COPY_OBJECT", "sdkType": "S3"}"#);
        assert!(matches!(
            request.ops_request_type(),
            Err(ApiError::UnsupportedRequestType(ref t)) if t == "COPY_OBJECT"
        ));
        assert!(matches!(
            request.perf_request_type(),
            Err(ApiError::UnsupportedRequestType(_))
        ));
        assert!(matches!(
            request.backend_kind(),
            Err(ApiError::UnsupportedSdkType(_))
        ));

        // Ops-only operations are not benchmarks.
        assert!("LIST_BUCKETS".parse::<PerfRequestType>().is_err());
    }
}
