//! Cursor record and CAS result types (§3 "Cursor record").

use serde::{Deserialize, Serialize};

/// The cursor value as persisted in Redis: an opaque token plus the
/// version counter it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRecord {
    pub value: String,
    pub version: u64,
}

impl CursorRecord {
    /// The empty cursor — what `LoadCursor` returns for a key that was
    /// never written.
    pub fn empty() -> Self {
        Self {
            value: String::new(),
            version: 0,
        }
    }
}

/// Outcome of `UpdateCursorCAS` (§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The update applied; carries the new version (`expect_version + 1`).
    Ok { new_version: u64 },
    /// The caller's epoch no longer matches the held lease.
    Lost,
    /// `expect_version` didn't match the stored version.
    Conflict,
}
