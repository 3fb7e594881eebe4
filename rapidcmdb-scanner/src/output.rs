//! Scan document persistence.

use std::fs;
use std::path::Path;

use rapidcmdb_common::{Error, Result, ScanDocument};

/// Write a scan document to `path`, creating parent directories on demand.
///
/// The document is written to a temporary sibling first and renamed into
/// place so a cancelled run never leaves a partial file.
pub fn write_scan_document(path: &Path, document: &ScanDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::WriterFailed(format!("create '{}': {}", parent.display(), e)))?;
        }
    }

    let json = serde_json::to_vec_pretty(document)?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &json)
        .map_err(|e| Error::WriterFailed(format!("write '{}': {}", tmp_path.display(), e)))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| Error::WriterFailed(format!("rename to '{}': {}", path.display(), e)))?;

    Ok(())
}
