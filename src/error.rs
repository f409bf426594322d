//! Error classification shared by every subsystem.
//!
//! Each module owns its own `thiserror` enum; this module only provides the
//! coarse [`ErrorKind`] used to decide how a failure is reported. None of the
//! kinds is fatal on its own: a failed pass or request is returned to its
//! caller, and only a failure to keep the server running ends the process.

use serde::{Deserialize, Serialize};

/// Coarse category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed atom or missing required state (e.g. no current context).
    Validation,
    /// The identifier allocator ran out of probes.
    AllocationExhausted,
    /// Log, capture or blob-store access failed.
    Io,
    /// Illegal action transition or duplicate registration.
    Protocol,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::AllocationExhausted => "allocation_exhausted",
            ErrorKind::Io => "io",
            ErrorKind::Protocol => "protocol",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
