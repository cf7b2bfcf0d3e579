//! Atomic temp-file-rename write discipline shared by every persistence
//! layer (memory tiers, dreaming archives/manifest, scheduler queue,
//! opencode state) per spec §5/§6: write to `<path>.tmp`, fsync, rename
//! over the final name. Readers never observe a partial write.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Write `contents` to `path` atomically. Creates parent directories if
/// missing. The temp file is unlinked on any failure path per spec §9's
/// "temp files for atomic writes are unlinked on failure".
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_path_for(path);
    let result = (|| -> Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Serialise `value` as pretty-printed UTF-8 JSON and write it atomically.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| CoreError::State {
        path: path.display().to_string(),
        reason: format!("failed to serialise: {e}"),
    })?;
    write_atomic(path, &bytes)
}

/// Read and parse a pretty-printed JSON file written by [`write_json_atomic`].
/// Returns `Ok(None)` if the file does not exist (callers distinguish
/// "never written" from "corrupt").
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    let value = serde_json::from_slice(&bytes).map_err(|e| CoreError::State {
        path: path.display().to_string(),
        reason: format!("failed to parse: {e}"),
    })?;
    Ok(Some(value))
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tmp.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        n: u32,
        label: String,
    }

    #[test]
    fn round_trips_and_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/state.json");

        let value = Sample {
            n: 7,
            label: "hi".into(),
        };
        write_json_atomic(&path, &value).unwrap();

        let loaded: Sample = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded, value);
        assert!(!tmp_path_for(&path).exists());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let loaded: Option<Sample> = read_json(&path).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn overwrite_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_json_atomic(&path, &Sample { n: 1, label: "a".into() }).unwrap();
        write_json_atomic(&path, &Sample { n: 2, label: "b".into() }).unwrap();

        let loaded: Sample = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded, Sample { n: 2, label: "b".into() });
    }
}
