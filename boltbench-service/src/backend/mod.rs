//! Storage backends and the pair of endpoints under comparison.

use std::fmt;
use std::str::FromStr;

mod common;
mod gcs;
mod in_memory;

pub use common::*;
pub use gcs::{GcsBackend, GcsConfig};
pub use in_memory::InMemoryBackend;

/// Selects one of the two endpoints under comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// The durable cloud object store.
    Primary,
    /// The accelerator / cache endpoint in front of the primary store.
    Accelerator,
}

impl BackendKind {
    /// Both kinds, in the order workloads visit them.
    pub const ALL: [BackendKind; 2] = [BackendKind::Primary, BackendKind::Accelerator];

    /// The prefix used for this endpoint in report labels.
    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Primary => "gs",
            BackendKind::Accelerator => "bolt",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when parsing an unknown [`BackendKind`].
#[derive(Debug, thiserror::Error)]
#[error("unsupported sdk type `{0}`")]
pub struct UnknownBackendKind(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackendKind;

    /// Parses the `sdkType` request values `GS` and `BOLT`, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GS" => Ok(BackendKind::Primary),
            "BOLT" => Ok(BackendKind::Accelerator),
            _ => Err(UnknownBackendKind(s.to_owned())),
        }
    }
}

/// The primary store and the accelerator, addressed by [`BackendKind`].
#[derive(Debug)]
pub struct Backends {
    primary: BoxedBackend,
    accelerator: BoxedBackend,
}

impl Backends {
    /// Creates the endpoint pair from two backends.
    pub fn new(primary: BoxedBackend, accelerator: BoxedBackend) -> Self {
        Self {
            primary,
            accelerator,
        }
    }

    /// Returns the backend for the given endpoint.
    pub fn get(&self, kind: BackendKind) -> &dyn Backend {
        match kind {
            BackendKind::Primary => self.primary.as_ref(),
            BackendKind::Accelerator => self.accelerator.as_ref(),
        }
    }

    /// Returns the primary backend.
    pub fn primary(&self) -> &dyn Backend {
        self.get(BackendKind::Primary)
    }

    /// Returns the accelerator backend.
    pub fn accelerator(&self) -> &dyn Backend {
        self.get(BackendKind::Accelerator)
    }
}
