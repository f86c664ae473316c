use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_TYPE, RANGE};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use super::common::{
    Backend, BackendError, BackendResult, ContainerMetadata, ContainerSummary, ObjectMetadata,
    ObjectSummary, PutResponse, ReadRange, reqwest_client,
};

/// The public Google Cloud Storage endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// OAuth scope requested for all storage operations.
const TOKEN_SCOPES: &[&str] = &["https://www.googleapis.com/auth/devstorage.read_write"];

/// The maximum page size the JSON API accepts for listings.
const MAX_PAGE_SIZE: usize = 1000;

/// Configuration to initialize a [`GcsBackend`].
#[derive(Debug, Clone, Copy)]
pub struct GcsConfig<'a> {
    /// Base URL of the endpoint speaking the GCS JSON API.
    pub endpoint: &'a str,
    /// Whether to authenticate requests with Application Default Credentials.
    ///
    /// Disable this for emulators that reject or ignore bearer tokens.
    pub authenticated: bool,
    /// Project used for container listings. Defaults to the credentials' project.
    pub project: Option<&'a str>,
}

impl Default for GcsConfig<'_> {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT,
            authenticated: true,
            project: None,
        }
    }
}

/// A backend talking to the Google Cloud Storage JSON API.
///
/// The accelerator exposes the same API under a different base URL, so both endpoints under
/// comparison are instances of this backend.
pub struct GcsBackend {
    name: &'static str,
    client: reqwest::Client,
    endpoint: Url,
    project: Option<String>,
    token_provider: Option<Arc<dyn gcp_auth::TokenProvider>>,
}

impl GcsBackend {
    /// Creates a new backend for the configured endpoint.
    ///
    /// With `authenticated` set, this resolves Application Default Credentials up front.
    pub async fn new(name: &'static str, config: GcsConfig<'_>) -> BackendResult<Self> {
        let endpoint = Url::parse(config.endpoint).map_err(|err| {
            BackendError::Config(format!("invalid endpoint `{}`: {err}", config.endpoint))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(BackendError::Config(format!(
                "endpoint `{}` cannot be used as a base URL",
                config.endpoint
            )));
        }

        let token_provider = if config.authenticated {
            Some(gcp_auth::provider().await?)
        } else {
            None
        };

        Ok(Self {
            name,
            client: reqwest_client()?,
            endpoint,
            project: config.project.map(str::to_owned),
            token_provider,
        })
    }

    /// Builds a URL below the endpoint from unencoded path segments.
    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.endpoint.clone();
        // `new` rejects endpoints that cannot be a base, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn object_url(&self, container: &str, object: &str) -> Url {
        self.url(["storage", "v1", "b", container, "o", object])
    }

    async fn send(&self, builder: RequestBuilder, context: &str) -> BackendResult<Response> {
        let builder = match &self.token_provider {
            Some(provider) => {
                let token = provider.token(TOKEN_SCOPES).await?;
                builder.bearer_auth(token.as_str())
            }
            None => builder,
        };

        builder.send().await.map_err(|cause| BackendError::Reqwest {
            context: context.to_owned(),
            cause,
        })
    }

    async fn project(&self) -> BackendResult<String> {
        if let Some(project) = &self.project {
            return Ok(project.clone());
        }
        match &self.token_provider {
            Some(provider) => Ok(provider.project_id().await?.to_string()),
            None => Err(BackendError::Config(
                "no project configured for listing containers".into(),
            )),
        }
    }
}

impl fmt::Debug for GcsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsBackend")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.token_provider.is_some())
            .finish_non_exhaustive()
    }
}

/// Turns non-success responses into [`BackendError::Status`].
async fn check_status(response: Response, context: &str) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        context: context.to_owned(),
        status,
        message,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response, context: &str) -> BackendResult<T> {
    let body = read_bytes(response, context).await?;
    serde_json::from_slice(&body).map_err(|cause| BackendError::Serde {
        context: context.to_owned(),
        cause,
    })
}

async fn read_bytes(response: Response, context: &str) -> BackendResult<Bytes> {
    response.bytes().await.map_err(|cause| BackendError::Reqwest {
        context: context.to_owned(),
        cause,
    })
}

#[async_trait::async_trait]
impl Backend for GcsBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    #[tracing::instrument(level = "trace", skip(self), fields(backend = self.name))]
    async fn list_objects(
        &self,
        container: &str,
        max_results: Option<usize>,
    ) -> BackendResult<Vec<ObjectSummary>> {
        let context = format!("listing objects in `{container}`");
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page_size = match max_results {
                Some(max) if objects.len() >= max => break,
                Some(max) => (max - objects.len()).min(MAX_PAGE_SIZE),
                None => MAX_PAGE_SIZE,
            };

            let mut url = self.url(["storage", "v1", "b", container, "o"]);
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("maxResults", &page_size.to_string());
                query.append_pair("fields", "items(name),nextPageToken");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self.send(self.client.get(url), &context).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(BackendError::ContainerNotFound(container.to_owned()));
            }
            let response = check_status(response, &context).await?;
            let page: ListResponse<GcsObject> = read_json(response, &context).await?;

            objects.extend(page.items.into_iter().map(|o| ObjectSummary { name: o.name }));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        if let Some(max) = max_results {
            objects.truncate(max);
        }
        Ok(objects)
    }

    #[tracing::instrument(level = "trace", skip(self), fields(backend = self.name))]
    async fn list_containers(&self) -> BackendResult<Vec<ContainerSummary>> {
        let context = "listing containers";
        let project = self.project().await?;
        let mut containers = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.url(["storage", "v1", "b"]);
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("project", &project);
                query.append_pair("fields", "items(name),nextPageToken");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self.send(self.client.get(url), context).await?;
            let response = check_status(response, context).await?;
            let page: ListResponse<GcsBucket> = read_json(response, context).await?;

            containers.extend(
                page.items
                    .into_iter()
                    .map(|b| ContainerSummary { name: b.name }),
            );
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(containers)
    }

    #[tracing::instrument(level = "trace", skip(self), fields(backend = self.name))]
    async fn get_container_metadata(&self, container: &str) -> BackendResult<ContainerMetadata> {
        let context = format!("reading metadata of container `{container}`");
        let url = self.url(["storage", "v1", "b", container]);

        let response = self.send(self.client.get(url), &context).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::ContainerNotFound(container.to_owned()));
        }
        let response = check_status(response, &context).await?;
        let bucket: GcsBucket = read_json(response, &context).await?;

        Ok(ContainerMetadata {
            name: bucket.name,
            location: bucket.location,
            storage_class: bucket.storage_class,
            versioning_enabled: bucket.versioning.is_some_and(|v| v.enabled),
        })
    }

    #[tracing::instrument(level = "trace", skip(self), fields(backend = self.name))]
    async fn get_object_metadata(
        &self,
        container: &str,
        object: &str,
    ) -> BackendResult<ObjectMetadata> {
        let context = format!("reading metadata of `{container}/{object}`");
        let url = self.object_url(container, object);

        let response = self.send(self.client.get(url), &context).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(not_found(container, object));
        }
        let response = check_status(response, &context).await?;
        let object: GcsObject = read_json(response, &context).await?;

        Ok(object.into())
    }

    #[tracing::instrument(level = "trace", skip(self, contents), fields(backend = self.name, len = contents.len()))]
    async fn put_object(
        &self,
        container: &str,
        object: &str,
        contents: Bytes,
    ) -> BackendResult<PutResponse> {
        let context = format!("uploading `{container}/{object}`");
        let mut url = self.url(["upload", "storage", "v1", "b", container, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object);

        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(contents);
        let response = self.send(request, &context).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::ContainerNotFound(container.to_owned()));
        }
        let response = check_status(response, &context).await?;
        let object: GcsObject = read_json(response, &context).await?;

        Ok(PutResponse {
            etag: object.etag,
            md5_hash: object.md5_hash,
        })
    }

    #[tracing::instrument(level = "trace", skip(self), fields(backend = self.name))]
    async fn get_object(
        &self,
        container: &str,
        object: &str,
        range: ReadRange,
    ) -> BackendResult<Bytes> {
        let context = format!("downloading `{container}/{object}`");
        let mut url = self.url(["download", "storage", "v1", "b", container, "o", object]);
        url.query_pairs_mut().append_pair("alt", "media");

        // Asking for gzip disables decompressive transcoding, so we always see the stored bytes.
        let mut request = self.client.get(url).header(ACCEPT_ENCODING, "gzip");
        if range == ReadRange::FirstByte {
            request = request.header(RANGE, "bytes=0-0");
        }

        let response = self.send(request, &context).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(not_found(container, object));
        }
        let response = check_status(response, &context).await?;
        read_bytes(response, &context).await
    }

    #[tracing::instrument(level = "trace", skip(self), fields(backend = self.name))]
    async fn delete_object(&self, container: &str, object: &str) -> BackendResult<()> {
        let context = format!("deleting `{container}/{object}`");
        let url = self.object_url(container, object);

        let response = self.send(self.client.delete(url), &context).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(not_found(container, object));
        }
        check_status(response, &context).await?;
        Ok(())
    }
}

fn not_found(container: &str, object: &str) -> BackendError {
    BackendError::ObjectNotFound {
        container: container.to_owned(),
        object: object.to_owned(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsBucket {
    name: String,
    location: Option<String>,
    storage_class: Option<String>,
    versioning: Option<GcsVersioning>,
}

#[derive(Debug, Deserialize)]
struct GcsVersioning {
    #[serde(default)]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObject {
    name: String,
    content_encoding: Option<String>,
    etag: Option<String>,
    md5_hash: Option<String>,
    #[serde(default, deserialize_with = "u64_from_string")]
    size: u64,
    storage_class: Option<String>,
    time_created: Option<String>,
    updated: Option<String>,
    retention_expiration_time: Option<String>,
}

impl From<GcsObject> for ObjectMetadata {
    fn from(object: GcsObject) -> Self {
        Self {
            content_encoding: object.content_encoding,
            etag: object.etag,
            md5_hash: object.md5_hash,
            size: object.size,
            storage_class: object.storage_class,
            time_created: object.time_created,
            updated: object.updated,
            retention_expiration: object.retention_expiration_time,
        }
    }
}

/// The JSON API encodes 64-bit integers as strings.
fn u64_from_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    value.parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn unauthenticated(endpoint: &str) -> GcsBackend {
        let config = GcsConfig {
            endpoint,
            authenticated: false,
            project: Some("test-project"),
        };
        GcsBackend::new("gcs", config).await.unwrap()
    }

    #[tokio::test]
    async fn encodes_object_names_as_single_segment() {
        let backend = unauthenticated("http://localhost:4443").await;
        let url = backend.object_url("bucket", "dir/data.json.gz");

        assert_eq!(
            url.as_str(),
            "http://localhost:4443/storage/v1/b/bucket/o/dir%2Fdata.json.gz"
        );
    }

    #[tokio::test]
    async fn keeps_endpoint_path_prefix() {
        let backend = unauthenticated("https://bolt.us-central1.example.com/gcs/").await;
        let url = backend.url(["storage", "v1", "b"]);

        assert_eq!(
            url.as_str(),
            "https://bolt.us-central1.example.com/gcs/storage/v1/b"
        );
    }

    #[tokio::test]
    async fn rejects_invalid_endpoint() {
        let config = GcsConfig {
            endpoint: "not a url",
            authenticated: false,
            project: None,
        };
        let err = GcsBackend::new("gcs", config).await.unwrap_err();
        assert!(matches!(err, BackendError::Config(_)));
    }

    #[test]
    fn parses_object_resource() {
        let json = br#"{
            "name": "data.json.gz",
            "contentEncoding": "gzip",
            "etag": "CJa1",
            "md5Hash": "XrY7u+Ae7tCTyyK7j1rNww==",
            "size": "1024",
            "storageClass": "STANDARD",
            "timeCreated": "2024-01-01T00:00:00.000Z",
            "updated": "2024-01-02T00:00:00.000Z"
        }"#;

        let object: GcsObject = serde_json::from_slice(json).unwrap();
        let metadata = ObjectMetadata::from(object);

        assert_eq!(metadata.size, 1024);
        assert_eq!(metadata.content_encoding.as_deref(), Some("gzip"));
        assert_eq!(metadata.retention_expiration, None);
    }

    #[test]
    fn parses_empty_listing() {
        let page: ListResponse<GcsObject> = serde_json::from_slice(b"{}").unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }
}
