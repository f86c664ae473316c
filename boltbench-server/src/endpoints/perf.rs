use axum::extract::State;
use axum::response::Response;
use axum::{Router, routing};
use boltbench_service::keys::{discover_key_names, generate_key_names};
use boltbench_service::runner::LIST_ITERATIONS;
use boltbench_service::{DownloadMode, PerfReport, PerfRunner, PhaseSamples};

use crate::endpoints::common::{Payload, parse, pretty_json};
use crate::error::ApiResult;
use crate::request::{BenchRequest, PerfRequestType};
use crate::state::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new().route("/perf", routing::post(perf))
}

/// Runs one benchmark, or all of them, against both endpoints.
async fn perf(State(state): State<ServiceState>, payload: Payload) -> ApiResult<Response> {
    let request = parse(payload)?;
    let request_type = request.perf_request_type()?;
    let bucket = request.bucket()?;

    let keys = select_keys(&state, &request, request_type, bucket).await?;
    tracing::info!(?request_type, bucket, keys = keys.len(), "starting benchmark");

    let mut runner = PerfRunner::new(&state.backends);
    let mut samples = PhaseSamples::new();
    let report = run(&mut runner, &mut samples, &request, request_type, bucket, &keys).await?;

    pretty_json(&report)
}

/// Returns the keys a benchmark operates on.
///
/// Explicit keys always win. Downloads otherwise read what the primary store lists, and all other
/// benchmarks use generated names.
async fn select_keys(
    state: &ServiceState,
    request: &BenchRequest,
    request_type: PerfRequestType,
    bucket: &str,
) -> ApiResult<Vec<String>> {
    if let Some(keys) = &request.keys {
        return Ok(keys.clone());
    }

    let num_keys = request.num_keys();
    if request_type.reads_existing() {
        let keys = discover_key_names(state.backends.primary(), bucket, num_keys).await?;
        Ok(keys)
    } else {
        Ok(generate_key_names(num_keys))
    }
}

async fn run(
    runner: &mut PerfRunner<'_>,
    samples: &mut PhaseSamples,
    request: &BenchRequest,
    request_type: PerfRequestType,
    bucket: &str,
    keys: &[String],
) -> ApiResult<PerfReport> {
    let report = match request_type {
        PerfRequestType::ListObjects => runner.run_list(bucket, LIST_ITERATIONS, samples).await?,
        PerfRequestType::DownloadObject => {
            runner
                .run_download(bucket, keys, DownloadMode::Full, samples)
                .await?
        }
        PerfRequestType::DownloadObjectTtfb => {
            runner
                .run_download(bucket, keys, DownloadMode::Ttfb, samples)
                .await?
        }
        PerfRequestType::DownloadObjectPassthrough => {
            runner
                .run_download_passthrough(bucket, keys, DownloadMode::Full, samples)
                .await?
        }
        PerfRequestType::DownloadObjectPassthroughTtfb => {
            runner
                .run_download_passthrough(bucket, keys, DownloadMode::Ttfb, samples)
                .await?
        }
        PerfRequestType::UploadObject => {
            runner
                .run_upload(bucket, keys, request.obj_length(), samples)
                .await?
        }
        PerfRequestType::DeleteObject => runner.run_delete(bucket, keys, samples).await?,
        PerfRequestType::All => {
            runner
                .run_all(bucket, keys, request.obj_length(), samples)
                .await?
        }
    };

    Ok(report)
}
