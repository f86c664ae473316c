//! Discovery of the deployment region for templated endpoint URLs.

use anyhow::{Context, Result};

/// Placeholder in endpoint URLs that is replaced with the deployment region.
pub const REGION_PLACEHOLDER: &str = "{region}";

/// GCE metadata server URL returning the zone of the current instance.
const ZONE_URL: &str = "http://metadata.google.internal/computeMetadata/v1/instance/zone";

/// Returns `true` if the endpoint needs a region to be substituted.
pub fn needs_region(endpoint: &str) -> bool {
    endpoint.contains(REGION_PLACEHOLDER)
}

/// Replaces every `{region}` placeholder in `endpoint`.
pub fn expand_endpoint(endpoint: &str, region: &str) -> String {
    endpoint.replace(REGION_PLACEHOLDER, region)
}

/// Extracts the region from a zone as returned by the metadata server.
///
/// The metadata server responds with `projects/<number>/zones/<zone>`, and a zone is its region
/// followed by a single-letter suffix, e.g. `us-central1-a`.
pub fn region_from_zone(zone: &str) -> Option<&str> {
    let zone = zone.trim().rsplit('/').next()?;
    let (region, _suffix) = zone.rsplit_once('-')?;
    (!region.is_empty()).then_some(region)
}

/// Queries the metadata server for the region this process is deployed in.
pub async fn discover_region(client: &reqwest::Client) -> Result<String> {
    tracing::debug!("querying metadata server for the deployment zone");

    let zone = client
        .get(ZONE_URL)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .context("failed to query the metadata server")?
        .text()
        .await
        .context("failed to read the zone from the metadata server")?;

    let region = region_from_zone(&zone)
        .with_context(|| format!("unexpected zone `{zone}` from the metadata server"))?;

    tracing::info!(region, "discovered deployment region");
    Ok(region.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_of_zone() {
        assert_eq!(
            region_from_zone("projects/123456/zones/us-central1-a"),
            Some("us-central1")
        );
        assert_eq!(region_from_zone("europe-west4-b\n"), Some("europe-west4"));
        assert_eq!(region_from_zone("nodash"), None);
        assert_eq!(region_from_zone("-a"), None);
    }

    #[test]
    fn expands_placeholder() {
        let endpoint = "https://bolt.{region}.example.com";
        assert!(needs_region(endpoint));
        assert_eq!(
            expand_endpoint(endpoint, "us-east1"),
            "https://bolt.us-east1.example.com"
        );
        assert!(!needs_region("https://storage.googleapis.com"));
    }
}
