//! Object names and payloads for workloads.

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::slice::Choose;

use crate::backend::{Backend, BackendResult};

/// Prefix of all synthetic object names.
pub const KEY_PREFIX: &str = "bolt-gs-perf";

/// Upper bound for the number of names discovered from a listing.
pub const MAX_DISCOVERED_KEYS: usize = 1000;

/// The default alphabet for random payloads.
pub const ASCII_LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Generates `count` deterministic object names, `bolt-gs-perf0` through `bolt-gs-perf{count-1}`.
pub fn generate_key_names(count: usize) -> Vec<String> {
    (0..count).map(|index| format!("{KEY_PREFIX}{index}")).collect()
}

/// Lists up to `max_results` existing object names from a container.
///
/// Requests for more than [`MAX_DISCOVERED_KEYS`] names are clamped.
pub async fn discover_key_names(
    backend: &dyn Backend,
    container: &str,
    max_results: usize,
) -> BackendResult<Vec<String>> {
    let max_results = max_results.min(MAX_DISCOVERED_KEYS);
    let objects = backend.list_objects(container, Some(max_results)).await?;
    Ok(objects.into_iter().map(|object| object.name).collect())
}

/// Generates a random string of `length` characters drawn uniformly from `alphabet`.
///
/// The alphabet must be ASCII. An empty alphabet yields an empty payload.
pub fn random_payload<R: Rng + ?Sized>(rng: &mut R, alphabet: &[u8], length: usize) -> String {
    let Ok(choose) = Choose::new(alphabet) else {
        return String::new();
    };

    choose
        .sample_iter(rng)
        .take(length)
        .map(|&byte| char::from(byte))
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::backend::InMemoryBackend;

    #[test]
    fn synthetic_names_are_deterministic() {
        let names = generate_key_names(5);

        assert_eq!(
            names,
            [
                "bolt-gs-perf0",
                "bolt-gs-perf1",
                "bolt-gs-perf2",
                "bolt-gs-perf3",
                "bolt-gs-perf4"
            ]
        );
        assert_eq!(names, generate_key_names(5));
        assert!(generate_key_names(0).is_empty());
    }

    #[tokio::test]
    async fn discovery_is_clamped() {
        let backend = InMemoryBackend::new("memory");
        for index in 0..1200 {
            backend.insert_object("bucket", &format!("object-{index:04}"), "x", None);
        }

        let clamped = discover_key_names(&backend, "bucket", 5000).await.unwrap();
        let capped = discover_key_names(&backend, "bucket", 1000).await.unwrap();
        assert_eq!(clamped.len(), 1000);
        assert_eq!(clamped, capped);

        let few = discover_key_names(&backend, "bucket", 3).await.unwrap();
        assert_eq!(few, ["object-0000", "object-0001", "object-0002"]);
    }

    #[test]
    fn payload_uses_alphabet() {
        let mut rng = SmallRng::seed_from_u64(42);
        let payload = random_payload(&mut rng, ASCII_LOWERCASE, 100);

        assert_eq!(payload.len(), 100);
        assert!(payload.bytes().all(|b| b.is_ascii_lowercase()));
        assert_eq!(random_payload(&mut rng, b"x", 3), "xxx");
        assert_eq!(random_payload(&mut rng, b"", 3), "");
    }
}
