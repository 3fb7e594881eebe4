//! Per-device result persistence.
//!
//! Every device gets its own directory under the capture root, which also
//! keeps concurrent workers from contending on shared files.

use std::fs;
use std::path::{Path, PathBuf};

use rapidcmdb_common::{CollectionRun, Error, Result, safe_device_name};

pub struct ResultWriter {
    capture_root: PathBuf,
}

impl ResultWriter {
    pub fn new(capture_root: impl Into<PathBuf>) -> Self {
        Self {
            capture_root: capture_root.into(),
        }
    }

    /// Persist one device's collection output.
    ///
    /// Layout: `<root>/<safe-name>/<safe-name>_complete.json` plus one
    /// file per method (`get_config` keys as plaintext, everything else
    /// as JSON documents).
    pub fn save(&self, run: &CollectionRun) -> Result<()> {
        if !run.success {
            tracing::debug!(device = %run.device_name, "Skipping save for failed collection");
            return Ok(());
        }

        let safe_name = safe_device_name(&run.device_name);
        let device_dir = self.capture_root.join(&safe_name);
        fs::create_dir_all(&device_dir)
            .map_err(|e| Error::WriterFailed(format!("create '{}': {}", device_dir.display(), e)))?;

        let complete = device_dir.join(format!("{}_complete.json", safe_name));
        write_atomic(&complete, &serde_json::to_vec_pretty(run)?)?;

        for (method, data) in &run.data {
            if method == "get_config" {
                match data.as_object() {
                    Some(configs) => {
                        for (config_type, content) in configs {
                            let path = device_dir
                                .join(format!("{}_{}_config.txt", safe_name, config_type));
                            let text = match content.as_str() {
                                Some(text) => text.to_string(),
                                None => content.to_string(),
                            };
                            write_atomic(&path, text.as_bytes())?;
                        }
                    }
                    None => {
                        let path = device_dir.join(format!("{}_config.txt", safe_name));
                        write_atomic(&path, data.to_string().as_bytes())?;
                    }
                }
            } else {
                let path = device_dir.join(format!("{}_{}.json", safe_name, method));
                write_atomic(&path, &serde_json::to_vec_pretty(data)?)?;
            }
        }

        tracing::info!(
            device = %run.device_name,
            ip = %run.device_ip,
            dir = %device_dir.display(),
            "Saved collection output"
        );
        Ok(())
    }
}

/// Write via a temporary sibling and rename, so cancellation never leaves
/// a partial file.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents)
        .map_err(|e| Error::WriterFailed(format!("write '{}': {}", tmp_path.display(), e)))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| Error::WriterFailed(format!("rename to '{}': {}", path.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapidcmdb_common::MethodOutcome;
    use serde_json::json;

    fn successful_run(device_name: &str) -> CollectionRun {
        let mut run = CollectionRun::started("10.0.0.1", device_name);
        run.methods_collected
            .push(MethodOutcome::collected("get_facts", 0.2, 64));
        run.data
            .insert("get_facts".to_string(), json!({ "hostname": device_name }));
        run.data.insert(
            "get_config".to_string(),
            json!({
                "running": "hostname core-sw-01\n!",
                "startup": "hostname core-sw-01\n!",
            }),
        );
        run.finalize();
        run
    }

    #[test]
    fn test_save_layout() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());

        writer.save(&successful_run("core-sw-01")).unwrap();

        let device_dir = dir.path().join("core-sw-01");
        assert!(device_dir.join("core-sw-01_complete.json").exists());
        assert!(device_dir.join("core-sw-01_get_facts.json").exists());
        assert!(device_dir.join("core-sw-01_running_config.txt").exists());
        assert!(device_dir.join("core-sw-01_startup_config.txt").exists());

        let config = fs::read_to_string(device_dir.join("core-sw-01_running_config.txt")).unwrap();
        assert_eq!(config, "hostname core-sw-01\n!");
    }

    #[test]
    fn test_save_sanitizes_device_name() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());

        writer.save(&successful_run("edge//fw:02.site.local")).unwrap();

        assert!(dir.path().join("edge_fw_02").exists());
        assert!(
            dir.path()
                .join("edge_fw_02/edge_fw_02_complete.json")
                .exists()
        );
    }

    #[test]
    fn test_failed_run_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());

        let mut run = CollectionRun::started("10.0.0.1", "dead-sw-01");
        run.finalize();
        writer.save(&run).unwrap();

        assert!(!dir.path().join("dead-sw-01").exists());
        assert!(!dir.path().join("dead_sw_01").exists());
    }

    #[test]
    fn test_complete_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());
        let run = successful_run("core-sw-01");

        writer.save(&run).unwrap();

        let content =
            fs::read_to_string(dir.path().join("core-sw-01/core-sw-01_complete.json")).unwrap();
        let reloaded: CollectionRun = serde_json::from_str(&content).unwrap();
        assert_eq!(run, reloaded);
    }

    #[test]
    fn test_no_temp_files_left() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());
        writer.save(&successful_run("core-sw-01")).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("core-sw-01"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
