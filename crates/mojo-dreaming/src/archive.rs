//! Versioned archive storage + manifest bookkeeping (spec §3/§4.4): write
//! `archive_v<N>.json` atomically, then update `manifest.json` — the
//! manifest is the authoritative current view. Grounded on
//! `mojo-core::atomic_write`'s temp-write/fsync/rename discipline, which the
//! teacher's own raw-SQLite file handling inspired.

use std::path::PathBuf;

use mojo_core::atomic_write::{read_json, write_json_atomic};

use crate::error::{DreamingError, Result};
use crate::types::{Archive, ArchiveStatus, ArchiveSummary, Manifest, ManifestVersionEntry, QualityLevel, StorageLocation};

pub struct ArchiveStore {
    data_dir: PathBuf,
}

impl ArchiveStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    fn conversation_dir(&self, conversation_id: &str) -> PathBuf {
        self.data_dir.join("dreams").join(conversation_id)
    }

    fn manifest_path(&self, conversation_id: &str) -> PathBuf {
        self.conversation_dir(conversation_id).join("manifest.json")
    }

    fn archive_path(&self, conversation_id: &str, version: u32) -> PathBuf {
        self.conversation_dir(conversation_id).join(format!("archive_v{version}.json"))
    }

    /// Load the manifest, bootstrapping it from on-disk `archive_v<N>.json`
    /// files if the manifest is missing or its `latest_version` lags what's
    /// actually on disk, per spec §3's "Manifest bootstraps from the
    /// on-disk archive files if missing or stale."
    pub fn load_manifest(&self, conversation_id: &str) -> Result<Manifest> {
        let on_disk_latest = self.max_version_on_disk(conversation_id)?;
        let existing = read_json::<Manifest>(&self.manifest_path(conversation_id)).map_err(state_err)?;

        match existing {
            Some(manifest) if manifest.latest_version >= on_disk_latest => Ok(manifest),
            _ => self.bootstrap_manifest(conversation_id, on_disk_latest),
        }
    }

    fn max_version_on_disk(&self, conversation_id: &str) -> Result<u32> {
        let dir = self.conversation_dir(conversation_id);
        if !dir.exists() {
            return Ok(0);
        }
        let mut max_version = 0u32;
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name.strip_prefix("archive_v").and_then(|s| s.strip_suffix(".json")) {
                if let Ok(v) = rest.parse::<u32>() {
                    max_version = max_version.max(v);
                }
            }
        }
        Ok(max_version)
    }

    fn bootstrap_manifest(&self, conversation_id: &str, latest: u32) -> Result<Manifest> {
        let mut manifest = Manifest::empty(conversation_id);
        if latest == 0 {
            return Ok(manifest);
        }
        for version in 1..=latest {
            let archive: Archive = read_json(&self.archive_path(conversation_id, version))
                .map_err(state_err)?
                .ok_or_else(|| DreamingError::State {
                    path: self.archive_path(conversation_id, version).display().to_string(),
                    reason: "referenced by version scan but missing on disk".to_string(),
                })?;
            manifest.versions.insert(
                version.to_string(),
                ManifestVersionEntry {
                    is_latest: version == latest,
                    status: if version == latest { ArchiveStatus::Active } else { ArchiveStatus::Superseded },
                    storage_location: if version == latest { StorageLocation::Hot } else { StorageLocation::Cold },
                    previous_version: (version > 1).then_some(version - 1),
                    supersedes_version: (version > 1).then_some(version - 1),
                    superseded_by_version: (version < latest).then_some(version + 1),
                    quality_level: archive.quality_level,
                    created_at: archive.created_at,
                },
            );
        }
        manifest.latest_version = latest;
        Ok(manifest)
    }

    /// Determine the next version number for a conversation (1 if none
    /// exist yet).
    pub fn next_version(&self, conversation_id: &str) -> Result<u32> {
        Ok(self.load_manifest(conversation_id)?.latest_version + 1)
    }

    /// Write `archive` (whose `version` must already be `next_version`) as
    /// `archive_v<N>.json`, then update the manifest: the previous latest
    /// becomes superseded/cold, the new version becomes active/hot.
    pub fn write_new_version(&self, archive: &Archive) -> Result<()> {
        let conversation_id = &archive.conversation_id;
        let mut manifest = self.load_manifest(conversation_id)?;
        let previous_latest = manifest.latest_version;

        write_json_atomic(&self.archive_path(conversation_id, archive.version), archive).map_err(state_err)?;

        if previous_latest > 0 {
            if let Some(prev) = manifest.versions.get_mut(&previous_latest.to_string()) {
                prev.is_latest = false;
                prev.status = ArchiveStatus::Superseded;
                prev.storage_location = StorageLocation::Cold;
                prev.superseded_by_version = Some(archive.version);
            }
        }

        manifest.versions.insert(
            archive.version.to_string(),
            ManifestVersionEntry {
                is_latest: true,
                status: ArchiveStatus::Active,
                storage_location: StorageLocation::Hot,
                previous_version: (previous_latest > 0).then_some(previous_latest),
                supersedes_version: (previous_latest > 0).then_some(previous_latest),
                superseded_by_version: None,
                quality_level: archive.quality_level,
                created_at: archive.created_at,
            },
        );
        manifest.latest_version = archive.version;

        write_json_atomic(&self.manifest_path(conversation_id), &manifest).map_err(state_err)?;
        Ok(())
    }

    /// Returns the given version, or the latest if `version` is `None`.
    pub fn get_archive(&self, conversation_id: &str, version: Option<u32>) -> Result<Archive> {
        let manifest = self.load_manifest(conversation_id)?;
        let target = version.unwrap_or(manifest.latest_version);
        if target == 0 || !manifest.versions.contains_key(&target.to_string()) {
            return Err(DreamingError::ArchiveNotFound {
                conversation_id: conversation_id.to_string(),
                version,
            });
        }
        read_json(&self.archive_path(conversation_id, target))
            .map_err(state_err)?
            .ok_or_else(|| DreamingError::ArchiveNotFound {
                conversation_id: conversation_id.to_string(),
                version: Some(target),
            })
    }

    pub fn list_archives(&self, conversation_id: &str) -> Result<Vec<ArchiveSummary>> {
        let manifest = self.load_manifest(conversation_id)?;
        let mut summaries: Vec<ArchiveSummary> = manifest
            .versions
            .iter()
            .map(|(version, entry)| ArchiveSummary {
                version: version.parse().unwrap_or(0),
                is_latest: entry.is_latest,
                status: entry.status,
                storage_location: entry.storage_location,
                quality_level: entry.quality_level,
                created_at: entry.created_at,
            })
            .collect();
        summaries.sort_by_key(|s| s.version);
        Ok(summaries)
    }
}

fn state_err(e: mojo_core::error::CoreError) -> DreamingError {
    DreamingError::State {
        path: "dreaming archive store".to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn sample_archive(conversation_id: &str, version: u32) -> Archive {
        Archive {
            conversation_id: conversation_id.to_string(),
            version,
            created_at: Utc::now(),
            quality_level: QualityLevel::Basic,
            chunks: vec![],
            clusters: vec![],
            entities: vec![],
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn first_write_creates_version_one_active_hot() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::new(dir.path());
        assert_eq!(store.next_version("c1").unwrap(), 1);

        let archive = sample_archive("c1", 1);
        store.write_new_version(&archive).unwrap();

        let manifest = store.load_manifest("c1").unwrap();
        assert_eq!(manifest.latest_version, 1);
        let entry = &manifest.versions["1"];
        assert!(entry.is_latest);
        assert_eq!(entry.status, ArchiveStatus::Active);
        assert_eq!(entry.storage_location, StorageLocation::Hot);
    }

    #[test]
    fn second_write_supersedes_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::new(dir.path());
        store.write_new_version(&sample_archive("c1", 1)).unwrap();
        assert_eq!(store.next_version("c1").unwrap(), 2);
        store.write_new_version(&sample_archive("c1", 2)).unwrap();

        let manifest = store.load_manifest("c1").unwrap();
        assert_eq!(manifest.latest_version, 2);
        let v1 = &manifest.versions["1"];
        assert!(!v1.is_latest);
        assert_eq!(v1.status, ArchiveStatus::Superseded);
        assert_eq!(v1.storage_location, StorageLocation::Cold);
        assert_eq!(v1.superseded_by_version, Some(2));

        let v2 = &manifest.versions["2"];
        assert!(v2.is_latest);
        assert_eq!(v2.previous_version, Some(1));
    }

    #[test]
    fn get_archive_defaults_to_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::new(dir.path());
        store.write_new_version(&sample_archive("c1", 1)).unwrap();
        store.write_new_version(&sample_archive("c1", 2)).unwrap();

        let latest = store.get_archive("c1", None).unwrap();
        assert_eq!(latest.version, 2);
        let v1 = store.get_archive("c1", Some(1)).unwrap();
        assert_eq!(v1.version, 1);
    }

    #[test]
    fn unknown_conversation_version_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::new(dir.path());
        let err = store.get_archive("nope", None).unwrap_err();
        assert!(matches!(err, DreamingError::ArchiveNotFound { .. }));
    }

    #[test]
    fn manifest_bootstraps_from_disk_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::new(dir.path());
        store.write_new_version(&sample_archive("c1", 1)).unwrap();
        std::fs::remove_file(store.manifest_path("c1")).unwrap();

        let manifest = store.load_manifest("c1").unwrap();
        assert_eq!(manifest.latest_version, 1);
        assert!(manifest.versions["1"].is_latest);
    }
}
