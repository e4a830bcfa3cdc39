//! Local shadow record (§3, §6): an on-disk mirror of the cursor used as a
//! fallback during remote outages, written atomically via temp-file +
//! rename + fsync on the containing directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pipeline_core::error::CursorError;
use serde::{Deserialize, Serialize};

/// `{app_id, epoch, version, cursor, dirty, updated_at}` per §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowRecord {
    pub app_id: Option<String>,
    pub epoch: u64,
    pub version: u64,
    pub cursor: String,
    /// True when this shadow is ahead of the remote KV (written during an
    /// outage and not yet reconciled).
    pub dirty: bool,
    pub updated_at: DateTime<Utc>,
}

impl ShadowRecord {
    pub fn new(app_id: Option<String>, epoch: u64, version: u64, cursor: String, dirty: bool) -> Self {
        Self {
            app_id,
            epoch,
            version,
            cursor,
            dirty,
            updated_at: Utc::now(),
        }
    }

    /// Reads and parses the shadow file, if it exists.
    pub fn load(path: &Path) -> Result<Option<Self>, CursorError> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        let record: ShadowRecord = serde_json::from_slice(&bytes)
            .map_err(|e| CursorError::ShadowCorrupt(e.to_string()))?;
        Ok(Some(record))
    }

    /// Writes the shadow record atomically: serialize to a temp file in
    /// the same directory, `fsync` it, `rename` over the destination, then
    /// `fsync` the parent directory so the rename itself is durable.
    pub fn write_atomic(&self, path: &Path) -> Result<(), CursorError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let tmp_path = tmp_path_for(path);
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| CursorError::ShadowCorrupt(e.to_string()))?;

        {
            let mut file = std::fs::File::create(&tmp_path)?;
            use std::io::Write;
            file.write_all(&json)?;
            file.sync_all()?;
        }

        std::fs::rename(&tmp_path, path)?;

        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }

        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "shadow".to_string());
    path.with_file_name(format!(".{}.tmp", file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_atomic_write_and_load() {
        let dir = std::env::temp_dir().join(format!("cursor-store-shadow-test-{}", std::process::id()));
        let path = dir.join("shadow.json");

        let record = ShadowRecord::new(Some("app-1".into()), 3, 7, "c-token".into(), true);
        record.write_atomic(&path).expect("write shadow");

        let loaded = ShadowRecord::load(&path).expect("load shadow").expect("present");
        assert_eq!(loaded.app_id, record.app_id);
        assert_eq!(loaded.epoch, 3);
        assert_eq!(loaded.version, 7);
        assert_eq!(loaded.cursor, "c-token");
        assert!(loaded.dirty);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_loads_as_none() {
        let path = std::env::temp_dir().join("cursor-store-shadow-test-missing/shadow.json");
        assert!(ShadowRecord::load(&path).unwrap().is_none());
    }
}
