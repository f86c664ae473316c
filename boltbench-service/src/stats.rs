//! Summary statistics over recorded samples.
//!
//! The percentile definitions are fixed for comparability with earlier benchmark runs:
//!
//! - `p50` is the *low median*, the element at ascending index `⌊(n - 1) / 2⌋`. For even lengths
//!   this is the lower of the two middle values, never their interpolation.
//! - `p90` is the element at ascending index `⌊0.9 · n⌋`. For some small `n` this is the maximum
//!   rather than a conventional p90; it is kept as-is on purpose.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::{EngineError, EngineResult};

/// Mean, low median and p90 of one series.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Percentiles {
    /// Arithmetic mean.
    pub average: f64,
    /// Low median.
    pub p50: f64,
    /// Value at ascending index `⌊0.9 · n⌋`.
    pub p90: f64,
}

impl Percentiles {
    /// Sorts `values` in place and extracts the summary. Returns `None` for an empty slice.
    pub fn of(values: &mut [f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let average = values.iter().sum::<f64>() / values.len() as f64;
        values.sort_unstable_by(f64::total_cmp);

        Some(Self {
            average,
            p50: values[median_low_index(values.len())],
            p90: values[p90_index(values.len())],
        })
    }

    /// Like [`of`](Self::of), for integral values such as object sizes.
    pub fn of_sizes(values: &mut [u64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let average = values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64;
        values.sort_unstable();

        Some(Self {
            average,
            p50: values[median_low_index(values.len())] as f64,
            p90: values[p90_index(values.len())] as f64,
        })
    }

    fn serialize_with_unit<S>(&self, serializer: S, unit: &str) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("average", &format!("{:.2} {unit}", self.average))?;
        map.serialize_entry("p50", &format!("{:.2} {unit}", self.p50))?;
        map.serialize_entry("p90", &format!("{:.2} {unit}", self.p90))?;
        map.end()
    }
}

fn median_low_index(len: usize) -> usize {
    (len - 1) / 2
}

fn p90_index(len: usize) -> usize {
    // ⌊0.9 · n⌋ is always a valid index for n ≥ 1, since 0.9 · n < n.
    (len * 9) / 10
}

/// Throughput of a phase, in objects per second.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Throughput {
    /// Per-sample throughputs were recorded, e.g. objects listed per second of each listing.
    Distribution(Percentiles),
    /// No per-sample throughputs: the number of operations divided by their total duration.
    Aggregate(f64),
}

/// Statistics of one phase against one backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatsSummary {
    /// Operation latency in seconds.
    pub latency: Percentiles,
    /// Throughput in objects per second.
    pub throughput: Throughput,
    /// Object sizes in bytes, if sizes were recorded.
    pub object_size: Option<Percentiles>,
}

/// Computes the statistics summary for a sample set.
///
/// `durations` are in seconds and must not be empty. Empty `throughputs` or `sizes` are treated
/// like absent ones. All slices are sorted in place.
pub fn compute_stats(
    durations: &mut [f64],
    throughputs: Option<&mut [f64]>,
    sizes: Option<&mut [u64]>,
) -> EngineResult<StatsSummary> {
    let total: f64 = durations.iter().sum();
    let count = durations.len();
    let latency = Percentiles::of(durations).ok_or(EngineError::EmptySampleSet)?;

    let throughput = match throughputs.and_then(Percentiles::of) {
        Some(percentiles) => Throughput::Distribution(percentiles),
        None => Throughput::Aggregate(count as f64 / total),
    };

    Ok(StatsSummary {
        latency,
        throughput,
        object_size: sizes.and_then(Percentiles::of_sizes),
    })
}

struct WithUnit<'a>(&'a Percentiles, &'static str);

impl Serialize for WithUnit<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize_with_unit(serializer, self.1)
    }
}

impl Serialize for StatsSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.object_size.is_some() { 3 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;

        map.serialize_entry("latency", &WithUnit(&self.latency, "secs"))?;
        match &self.throughput {
            Throughput::Distribution(percentiles) => {
                map.serialize_entry("throughput", &WithUnit(percentiles, "objects/sec"))?
            }
            Throughput::Aggregate(rate) => {
                map.serialize_entry("throughput", &format!("{rate:.2} objects/sec"))?
            }
        }
        if let Some(sizes) = &self.object_size {
            map.serialize_entry("object_size", &WithUnit(sizes, "bytes"))?;
        }

        map.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn four_durations() {
        let mut durations = [4.0, 1.0, 3.0, 2.0];
        let stats = compute_stats(&mut durations, None, None).unwrap();

        assert_eq!(stats.latency.average, 2.5);
        assert_eq!(stats.latency.p50, 2.0);
        assert_eq!(stats.latency.p90, 4.0);
        assert_eq!(stats.throughput, Throughput::Aggregate(0.4));
        assert_eq!(stats.object_size, None);
    }

    #[test]
    fn percentile_indices_match_definition() {
        for n in 1..=25usize {
            let mut values: Vec<f64> = (0..n).rev().map(|v| v as f64).collect();
            let stats = Percentiles::of(&mut values).unwrap();

            let sum: f64 = (0..n).map(|v| v as f64).sum();
            assert_eq!(stats.average, sum / n as f64);
            assert_eq!(stats.p50, ((n - 1) / 2) as f64, "p50 for n = {n}");
            assert_eq!(stats.p90, (n * 9 / 10) as f64, "p90 for n = {n}");
        }
    }

    #[test]
    fn empty_durations_fail() {
        let err = compute_stats(&mut [], None, None).unwrap_err();
        assert!(matches!(err, EngineError::EmptySampleSet));
    }

    #[test]
    fn empty_optional_series_are_absent() {
        let mut durations = [0.5, 0.5];
        let stats = compute_stats(&mut durations, Some(&mut []), Some(&mut [])).unwrap();

        assert_eq!(stats.throughput, Throughput::Aggregate(2.0));
        assert_eq!(stats.object_size, None);
    }

    #[test]
    fn sorts_callers_series() {
        let mut durations = [3.0, 1.0, 2.0];
        let mut throughputs = [30.0, 10.0, 20.0];
        let mut sizes = [300, 100, 200];

        let stats =
            compute_stats(&mut durations, Some(&mut throughputs), Some(&mut sizes)).unwrap();

        assert_eq!(durations, [1.0, 2.0, 3.0]);
        assert_eq!(throughputs, [10.0, 20.0, 30.0]);
        assert_eq!(sizes, [100, 200, 300]);
        assert_eq!(
            stats.throughput,
            Throughput::Distribution(Percentiles {
                average: 20.0,
                p50: 20.0,
                p90: 30.0
            })
        );
    }

    #[test]
    fn serializes_with_units() {
        let mut durations = [1.0, 2.0, 3.0, 4.0];
        let mut sizes = [100, 200, 300, 400];
        let stats = compute_stats(&mut durations, None, Some(&mut sizes)).unwrap();

        assert_eq!(
            serde_json::to_value(stats).unwrap(),
            json!({
                "latency": {
                    "average": "2.50 secs",
                    "p50": "2.00 secs",
                    "p90": "4.00 secs",
                },
                "throughput": "0.40 objects/sec",
                "object_size": {
                    "average": "250.00 bytes",
                    "p50": "200.00 bytes",
                    "p90": "400.00 bytes",
                },
            })
        );
    }
}
