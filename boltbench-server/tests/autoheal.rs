//! Blackbox tests for the auto-heal poll.

use std::time::Duration;

use anyhow::Result;
use boltbench_server::config::{Config, Convergence};
use boltbench_service::RetryMode;
use boltbench_service::backend::InMemoryBackend;
use boltbench_test::server::TestServer;
use reqwest::StatusCode;
use serde_json::{Value, json};

const BUCKET: &str = "bench";

fn config(deadline: Duration) -> Config {
    Config {
        convergence: Convergence {
            mode: RetryMode::Bounded,
            deadline: Some(deadline),
            max_attempts: None,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_autoheal_converges() -> Result<()> {
    boltbench_test::tracing::init();

    let primary = InMemoryBackend::with_containers("gcs", [BUCKET]);
    let accelerator = InMemoryBackend::with_containers("bolt", [BUCKET]);
    let server = TestServer::with_config(
        config(Duration::from_secs(10)),
        primary,
        accelerator.clone(),
    )
    .await;

    // The accelerator fetches the object some time after the first request.
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        accelerator.insert_object(BUCKET, "k", "healed", None);
    });

    let response = reqwest::Client::new()
        .post(server.url("/autoheal"))
        .json(&json!({"bucket": BUCKET, "key": "k"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["retry_mode"], "bounded");
    let time = body["auto_heal_time"].as_str().unwrap();
    assert!(time.ends_with(" secs"), "{time}");
    let secs: f64 = time.trim_end_matches(" secs").parse()?;
    assert!(secs >= 0.05, "{secs}");

    Ok(())
}

#[tokio::test]
async fn test_autoheal_gives_up() -> Result<()> {
    boltbench_test::tracing::init();

    let server = TestServer::with_config(
        config(Duration::from_millis(100)),
        InMemoryBackend::with_containers("gcs", [BUCKET]),
        InMemoryBackend::with_containers("bolt", [BUCKET]),
    )
    .await;

    let response = reqwest::Client::new()
        .post(server.url("/autoheal"))
        .json(&json!({"bucket": BUCKET, "key": "never"}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

    let body: Value = response.json().await?;
    assert_eq!(body["errorCode"], "1");

    Ok(())
}

#[tokio::test]
async fn test_autoheal_requires_key() -> Result<()> {
    let server = TestServer::new().await;

    let response = reqwest::Client::new()
        .post(server.url("/autoheal"))
        .json(&json!({"bucket": BUCKET}))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}
