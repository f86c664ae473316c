//! Merging per-phase results into one report.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::stats::StatsSummary;

/// One entry of a [`PerfReport`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportValue {
    /// Statistics of one phase against one backend.
    Stats(StatsSummary),
    /// A counter, such as the number of compressed objects downloaded.
    Count(u64),
    /// A free-form note, such as the payload size of an upload phase.
    Text(String),
}

impl From<StatsSummary> for ReportValue {
    fn from(stats: StatsSummary) -> Self {
        Self::Stats(stats)
    }
}

impl From<u64> for ReportValue {
    fn from(count: u64) -> Self {
        Self::Count(count)
    }
}

impl From<String> for ReportValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Results of one or more benchmark phases, keyed by a descriptive label.
///
/// Labels are kept sorted, so serialized reports are stable across runs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PerfReport(BTreeMap<String, ReportValue>);

impl PerfReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, replacing any previous entry with the same label.
    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<ReportValue>) {
        self.0.insert(label.into(), value.into());
    }

    /// Returns the entry for a label.
    pub fn get(&self, label: &str) -> Option<&ReportValue> {
        self.0.get(label)
    }

    /// Returns the statistics stored under a label, if it holds statistics.
    pub fn stats(&self, label: &str) -> Option<&StatsSummary> {
        match self.get(label)? {
            ReportValue::Stats(stats) => Some(stats),
            _ => None,
        }
    }

    /// Returns the counter stored under a label, if it holds a counter.
    pub fn count(&self, label: &str) -> Option<u64> {
        match self.get(label)? {
            ReportValue::Count(count) => Some(*count),
            _ => None,
        }
    }

    /// Iterates over all labels in sorted order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the report has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merges reports into one. Later reports win when labels collide.
    pub fn merge(reports: impl IntoIterator<Item = PerfReport>) -> PerfReport {
        let mut merged = PerfReport::new();
        for report in reports {
            merged.0.extend(report.0);
        }
        merged
    }

    /// Renders the report as JSON with sorted keys and four-space indentation.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        to_json_pretty(self)
    }
}

/// Renders a value as JSON indented by four spaces, the format of all benchmark responses.
pub fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;

    String::from_utf8(buffer).map_err(<serde_json::Error as serde::ser::Error>::custom)
}

impl Serialize for PerfReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}
