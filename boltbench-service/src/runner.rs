//! Workloads that exercise the primary store and the accelerator side by side.
//!
//! Every phase visits the same keys on both endpoints, primary first, and records one sample per
//! operation and endpoint. Samples accumulate in a [`PhaseSamples`] owned by the caller, so a
//! sequence of phases can reuse one allocation and must [clear](PhaseSamples::clear) it between
//! phases.

use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::backend::{Backend, BackendKind, Backends, ReadRange};
use crate::encoding::is_compressed;
use crate::error::EngineResult;
use crate::keys::{ASCII_LOWERCASE, MAX_DISCOVERED_KEYS, discover_key_names, random_payload};
use crate::report::PerfReport;
use crate::stats::{StatsSummary, compute_stats};

/// Number of listings per endpoint in the list phase of a full run.
pub const LIST_ITERATIONS: usize = 10;

/// Maximum number of entries requested by each listing.
pub const LIST_MAX_RESULTS: usize = 1000;

/// Payload length of uploads when the request does not specify one.
pub const DEFAULT_OBJECT_LENGTH: usize = 100;

/// How much of each object a download phase reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DownloadMode {
    /// Read whole objects.
    #[default]
    Full,
    /// Read only the first byte, measuring time to first byte.
    Ttfb,
}

impl DownloadMode {
    fn range(self) -> ReadRange {
        match self {
            DownloadMode::Full => ReadRange::Full,
            DownloadMode::Ttfb => ReadRange::FirstByte,
        }
    }

    fn label_suffix(self) -> &'static str {
        match self {
            DownloadMode::Full => "",
            DownloadMode::Ttfb => "_ttfb",
        }
    }
}

/// A single measured operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    /// Wall-clock time of the operation.
    pub duration: Duration,
    /// Objects per second achieved by this operation, if meaningful.
    pub throughput: Option<f64>,
    /// Size of the object involved, in bytes.
    pub size: Option<u64>,
    /// Whether the object involved was gzip-compressed.
    pub compressed: Option<bool>,
}

impl Sample {
    fn new(duration: Duration) -> Self {
        Self {
            duration,
            throughput: None,
            size: None,
            compressed: None,
        }
    }
}

/// Samples recorded for one endpoint.
#[derive(Clone, Debug, Default)]
pub struct SampleSet {
    durations: Vec<f64>,
    throughputs: Vec<f64>,
    sizes: Vec<u64>,
    compressed: u64,
    uncompressed: u64,
}

impl SampleSet {
    /// Records a sample.
    pub fn record(&mut self, sample: Sample) {
        self.durations.push(sample.duration.as_secs_f64());
        if let Some(throughput) = sample.throughput {
            self.throughputs.push(throughput);
        }
        if let Some(size) = sample.size {
            self.sizes.push(size);
        }
        match sample.compressed {
            Some(true) => self.compressed += 1,
            Some(false) => self.uncompressed += 1,
            None => (),
        }
    }

    /// Number of recorded samples.
    pub fn len(&self) -> usize {
        self.durations.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    /// Number of samples of compressed objects.
    pub fn compressed_count(&self) -> u64 {
        self.compressed
    }

    /// Number of samples of uncompressed objects.
    pub fn uncompressed_count(&self) -> u64 {
        self.uncompressed
    }

    /// Discards all samples and counters.
    pub fn clear(&mut self) {
        self.durations.clear();
        self.throughputs.clear();
        self.sizes.clear();
        self.compressed = 0;
        self.uncompressed = 0;
    }

    /// Computes the statistics summary over the recorded samples.
    pub fn summarize(&mut self) -> EngineResult<StatsSummary> {
        compute_stats(
            &mut self.durations,
            Some(&mut self.throughputs),
            Some(&mut self.sizes),
        )
    }
}

/// Samples recorded for both endpoints during one phase.
#[derive(Clone, Debug, Default)]
pub struct PhaseSamples {
    primary: SampleSet,
    accelerator: SampleSet,
}

impl PhaseSamples {
    /// Creates empty sample sets.
    pub fn new() -> Self {
        Self::default()
    }

    /// The samples of one endpoint.
    pub fn get(&self, kind: BackendKind) -> &SampleSet {
        match kind {
            BackendKind::Primary => &self.primary,
            BackendKind::Accelerator => &self.accelerator,
        }
    }

    /// The samples of one endpoint, mutably.
    pub fn get_mut(&mut self, kind: BackendKind) -> &mut SampleSet {
        match kind {
            BackendKind::Primary => &mut self.primary,
            BackendKind::Accelerator => &mut self.accelerator,
        }
    }

    /// Discards the samples of both endpoints.
    pub fn clear(&mut self) {
        self.primary.clear();
        self.accelerator.clear();
    }
}

/// Runs benchmark phases against a pair of endpoints.
#[derive(Debug)]
pub struct PerfRunner<'a> {
    backends: &'a Backends,
    rng: SmallRng,
}

impl<'a> PerfRunner<'a> {
    /// Creates a runner with a randomly seeded payload generator.
    pub fn new(backends: &'a Backends) -> Self {
        Self::with_seed(backends, rand::random())
    }

    /// Creates a runner whose upload payloads are reproducible from `seed`.
    pub fn with_seed(backends: &'a Backends, seed: u64) -> Self {
        Self {
            backends,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Lists the container `iterations` times on each endpoint.
    ///
    /// Each listing requests up to [`LIST_MAX_RESULTS`] entries and records its latency and the
    /// number of listed objects per second.
    #[tracing::instrument(level = "debug", skip(self, samples))]
    pub async fn run_list(
        &mut self,
        container: &str,
        iterations: usize,
        samples: &mut PhaseSamples,
    ) -> EngineResult<PerfReport> {
        for _ in 0..iterations {
            for kind in BackendKind::ALL {
                let backend = self.backends.get(kind);

                let start = Instant::now();
                let objects = backend
                    .list_objects(container, Some(LIST_MAX_RESULTS))
                    .await?;
                let duration = start.elapsed();

                let throughput = objects.len() as f64 / duration.as_secs_f64();
                samples.get_mut(kind).record(Sample {
                    throughput: Some(throughput),
                    ..Sample::new(duration)
                });
            }
        }

        let mut report = PerfReport::new();
        for kind in BackendKind::ALL {
            let stats = samples.get_mut(kind).summarize()?;
            report.insert(format!("{kind}_list_objs_perf_stats"), stats);
        }
        Ok(report)
    }

    /// Downloads every key from both endpoints.
    ///
    /// Empty objects are skipped. The report counts compressed and uncompressed objects per
    /// endpoint, as determined by their content-encoding or a `.gz` suffix.
    #[tracing::instrument(level = "debug", skip(self, keys, samples), fields(keys = keys.len()))]
    pub async fn run_download(
        &mut self,
        container: &str,
        keys: &[String],
        mode: DownloadMode,
        samples: &mut PhaseSamples,
    ) -> EngineResult<PerfReport> {
        for key in keys {
            for kind in BackendKind::ALL {
                let sample = download_one(self.backends.get(kind), container, key, mode).await?;
                if let Some(sample) = sample {
                    samples.get_mut(kind).record(sample);
                }
            }
        }

        let mut report = PerfReport::new();
        for kind in BackendKind::ALL {
            download_report(&mut report, kind, "", mode, samples.get_mut(kind))?;
        }
        Ok(report)
    }

    /// Downloads every key from the accelerator only, letting it pass reads through to the
    /// primary store for objects it does not hold yet.
    #[tracing::instrument(level = "debug", skip(self, keys, samples), fields(keys = keys.len()))]
    pub async fn run_download_passthrough(
        &mut self,
        container: &str,
        keys: &[String],
        mode: DownloadMode,
        samples: &mut PhaseSamples,
    ) -> EngineResult<PerfReport> {
        let kind = BackendKind::Accelerator;
        for key in keys {
            let sample = download_one(self.backends.get(kind), container, key, mode).await?;
            if let Some(sample) = sample {
                samples.get_mut(kind).record(sample);
            }
        }

        let mut report = PerfReport::new();
        download_report(&mut report, kind, "_pt", mode, samples.get_mut(kind))?;
        Ok(report)
    }

    /// Uploads a fresh random payload of `object_length` lowercase letters under every key, to
    /// both endpoints.
    #[tracing::instrument(level = "debug", skip(self, keys, samples), fields(keys = keys.len()))]
    pub async fn run_upload(
        &mut self,
        container: &str,
        keys: &[String],
        object_length: usize,
        samples: &mut PhaseSamples,
    ) -> EngineResult<PerfReport> {
        for key in keys {
            let payload = Bytes::from(random_payload(
                &mut self.rng,
                ASCII_LOWERCASE,
                object_length,
            ));

            for kind in BackendKind::ALL {
                let backend = self.backends.get(kind);

                let start = Instant::now();
                backend.put_object(container, key, payload.clone()).await?;
                samples.get_mut(kind).record(Sample::new(start.elapsed()));
            }
        }

        let mut report = PerfReport::new();
        report.insert("object_size", format!("{object_length} bytes"));
        for kind in BackendKind::ALL {
            let stats = samples.get_mut(kind).summarize()?;
            report.insert(format!("{kind}_upload_obj_perf_stats"), stats);
        }
        Ok(report)
    }

    /// Deletes every key from both endpoints.
    #[tracing::instrument(level = "debug", skip(self, keys, samples), fields(keys = keys.len()))]
    pub async fn run_delete(
        &mut self,
        container: &str,
        keys: &[String],
        samples: &mut PhaseSamples,
    ) -> EngineResult<PerfReport> {
        for key in keys {
            for kind in BackendKind::ALL {
                let backend = self.backends.get(kind);

                let start = Instant::now();
                backend.delete_object(container, key).await?;
                samples.get_mut(kind).record(Sample::new(start.elapsed()));
            }
        }

        let mut report = PerfReport::new();
        for kind in BackendKind::ALL {
            let stats = samples.get_mut(kind).summarize()?;
            report.insert(format!("{kind}_del_obj_perf_stats"), stats);
        }
        Ok(report)
    }

    /// Runs upload, delete, list and download back to back and merges their reports.
    ///
    /// Upload and delete use `keys`. The download phase reads whatever the primary store lists
    /// after the list phase, up to [`MAX_DISCOVERED_KEYS`] objects.
    pub async fn run_all(
        &mut self,
        container: &str,
        keys: &[String],
        object_length: usize,
        samples: &mut PhaseSamples,
    ) -> EngineResult<PerfReport> {
        tracing::info!(container, keys = keys.len(), "running all benchmark phases");

        let upload = self
            .run_upload(container, keys, object_length, samples)
            .await?;
        samples.clear();
        let delete = self.run_delete(container, keys, samples).await?;
        samples.clear();
        let list = self
            .run_list(container, LIST_ITERATIONS, samples)
            .await?;
        samples.clear();

        let existing =
            discover_key_names(self.backends.primary(), container, MAX_DISCOVERED_KEYS).await?;
        let download = self
            .run_download(container, &existing, DownloadMode::Full, samples)
            .await?;

        Ok(PerfReport::merge([upload, download, delete, list]))
    }
}

/// Downloads one object, returning `None` if it is empty.
async fn download_one(
    backend: &dyn Backend,
    container: &str,
    key: &str,
    mode: DownloadMode,
) -> EngineResult<Option<Sample>> {
    let metadata = backend.get_object_metadata(container, key).await?;
    if metadata.size == 0 {
        tracing::trace!(backend = backend.name(), key, "skipping empty object");
        return Ok(None);
    }

    let start = Instant::now();
    backend.get_object(container, key, mode.range()).await?;
    let duration = start.elapsed();

    Ok(Some(Sample {
        size: Some(metadata.size),
        compressed: Some(is_compressed(metadata.content_encoding.as_deref(), key)),
        ..Sample::new(duration)
    }))
}

fn download_report(
    report: &mut PerfReport,
    kind: BackendKind,
    variant: &str,
    mode: DownloadMode,
    set: &mut SampleSet,
) -> EngineResult<()> {
    let stats = set.summarize()?;
    let suffix = mode.label_suffix();
    report.insert(format!("{kind}_download_obj{variant}{suffix}_perf_stats"), stats);
    report.insert(
        format!("{kind}_object_count (compressed)"),
        set.compressed_count(),
    );
    report.insert(
        format!("{kind}_object_count (uncompressed)"),
        set.uncompressed_count(),
    );
    Ok(())
}
