//! Pass-through storage operations against one endpoint, selected by `sdkType`.

use axum::extract::State;
use axum::response::Response;
use axum::{Router, routing};
use boltbench_service::validation::object_digest;
use bytes::Bytes;
use serde_json::json;

use crate::endpoints::common::{Payload, parse, pretty_json};
use crate::error::ApiResult;
use crate::request::OpsRequestType;
use crate::state::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new().route("/ops", routing::post(ops))
}

async fn ops(State(state): State<ServiceState>, payload: Payload) -> ApiResult<Response> {
    let request = parse(payload)?;
    let request_type = request.ops_request_type()?;
    let kind = request.backend_kind()?;
    let bucket = request.bucket()?;
    let backend = state.backends.get(kind);

    tracing::debug!(?request_type, backend = %kind, bucket, "ops request");

    match request_type {
        OpsRequestType::ListObjects => {
            let objects = backend.list_objects(bucket, None).await?;
            let names: Vec<_> = objects.into_iter().map(|object| object.name).collect();
            pretty_json(&json!({ "objects": names }))
        }
        OpsRequestType::ListBuckets => {
            let containers = backend.list_containers().await?;
            let names: Vec<_> = containers.into_iter().map(|c| c.name).collect();
            pretty_json(&json!({ "buckets": names }))
        }
        OpsRequestType::GetBucketMd => {
            let metadata = backend.get_container_metadata(bucket).await?;
            pretty_json(&metadata)
        }
        OpsRequestType::GetObjectMd => {
            let metadata = backend.get_object_metadata(bucket, request.key()?).await?;
            pretty_json(&metadata)
        }
        OpsRequestType::UploadObject => {
            let key = request.key()?;
            let contents = Bytes::copy_from_slice(request.value()?.as_bytes());
            let response = backend.put_object(bucket, key, contents).await?;
            pretty_json(&response)
        }
        OpsRequestType::DownloadObject => {
            let md5 = object_digest(backend, bucket, request.key()?).await?;
            pretty_json(&json!({ "md5": md5 }))
        }
        OpsRequestType::DeleteObject => {
            backend.delete_object(bucket, request.key()?).await?;
            pretty_json(&json!({ "Deleted": "True" }))
        }
    }
}
