use std::sync::Arc;

use anyhow::{Context, Result};
use boltbench_service::backend::{GcsBackend, GcsConfig, InMemoryBackend, reqwest_client};
use boltbench_service::{Backends, BoxedBackend, RetryPolicy};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, Storage};
use crate::region;

/// Shared reference to the boltbench [service state](State).
pub type ServiceState = Arc<State>;

/// Reference to the benchmark engine and its endpoints.
///
/// This structure is created during server startup and shared with all HTTP request handlers.
///
/// In request handlers, use `axum::extract::State<ServiceState>` to retrieve a shared reference to
/// this structure.
#[derive(Debug)]
pub struct State {
    /// The server configuration.
    pub config: Config,
    /// The primary store and the accelerator.
    pub backends: Backends,
    /// Retry policy of the auto-heal poll.
    pub retry_policy: RetryPolicy,
    /// Cancelled when the server shuts down, to stop long-running polls.
    pub shutdown: CancellationToken,
}

impl State {
    /// Connects to both configured endpoints.
    ///
    /// If an endpoint URL contains a `{region}` placeholder and no region is configured, the
    /// region is looked up from the GCE metadata server first.
    pub async fn new(config: Config) -> Result<ServiceState> {
        let region = resolve_region(&config).await?;

        let primary = build_backend("gcs", &config.primary, region.as_deref())
            .await
            .context("failed to initialize the primary store")?;
        let accelerator = build_backend("bolt", &config.accelerator, region.as_deref())
            .await
            .context("failed to initialize the accelerator")?;

        Ok(Self::with_backends(
            config,
            Backends::new(primary, accelerator),
        ))
    }

    /// Creates the state from already constructed endpoints.
    pub fn with_backends(config: Config, backends: Backends) -> ServiceState {
        let retry_policy = config.convergence.policy();
        tracing::info!(mode = %retry_policy.mode, "auto-heal retry policy");

        Arc::new(Self {
            config,
            backends,
            retry_policy,
            shutdown: CancellationToken::new(),
        })
    }
}

async fn resolve_region(config: &Config) -> Result<Option<String>> {
    if let Some(region) = &config.region {
        return Ok(Some(region.clone()));
    }

    let templated = [&config.primary, &config.accelerator]
        .into_iter()
        .any(|storage| match storage {
            Storage::Gcs {
                endpoint: Some(endpoint),
                ..
            } => region::needs_region(endpoint),
            _ => false,
        });

    if !templated {
        return Ok(None);
    }

    let client = reqwest_client()?;
    let region = region::discover_region(&client).await?;
    Ok(Some(region))
}

async fn build_backend(
    name: &'static str,
    storage: &Storage,
    region: Option<&str>,
) -> Result<BoxedBackend> {
    let backend: BoxedBackend = match storage {
        Storage::Gcs {
            endpoint,
            authenticated,
            project,
        } => {
            let endpoint = match (endpoint.as_deref(), region) {
                (Some(endpoint), Some(region)) => Some(region::expand_endpoint(endpoint, region)),
                (endpoint, _) => endpoint.map(str::to_owned),
            };

            let mut gcs_config = GcsConfig {
                authenticated: *authenticated,
                project: project.as_deref(),
                ..GcsConfig::default()
            };
            if let Some(endpoint) = endpoint.as_deref() {
                gcs_config.endpoint = endpoint;
            }

            tracing::info!(name, endpoint = gcs_config.endpoint, "connecting to endpoint");
            Box::new(GcsBackend::new(name, gcs_config).await?)
        }
        Storage::Memory { containers } => {
            tracing::info!(name, "using in-memory storage");
            Box::new(InMemoryBackend::with_containers(name, containers))
        }
    };

    Ok(backend)
}
