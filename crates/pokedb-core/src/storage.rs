use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::document::Document;
use crate::types::{Generation, ResourceKind};
use crate::{Error, Result};

/// File name of a category summary inside its kind directory.
pub const SUMMARY_FILE: &str = "summary.json";
/// File name of the top-level index inside a generation directory.
pub const INDEX_FILE: &str = "index.json";
/// File name of the run report inside a generation directory.
pub const REPORT_FILE: &str = "report.json";

/// Writer for one generation snapshot under an output root.
///
/// Layout: `<root>/gen-<N>/<kind-dir>/<name>.json`, a `summary.json` per kind
/// directory, and `index.json` plus `report.json` at the generation level.
/// Every file is written to a temporary sibling first and renamed into place.
pub struct OutputStorage {
    generation_dir: PathBuf,
}

impl OutputStorage {
    /// Storage for `generation` under `output_root`. Nothing is touched on disk.
    pub fn new(output_root: impl AsRef<Path>, generation: Generation) -> Self {
        Self {
            generation_dir: output_root.as_ref().join(generation.dir_name()),
        }
    }

    /// Directory holding this generation's snapshot.
    pub fn generation_dir(&self) -> &Path {
        &self.generation_dir
    }

    /// Create the generation directory.
    ///
    /// An existing non-empty directory is an error unless `force` is set, in
    /// which case it is removed first.
    pub fn prepare(&self, force: bool) -> Result<()> {
        let occupied = fs::read_dir(&self.generation_dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if occupied {
            if !force {
                return Err(Error::Storage(format!(
                    "Output directory '{}' already exists (use --force to replace it)",
                    self.generation_dir.display()
                )));
            }
            info!("Replacing existing snapshot at {}", self.generation_dir.display());
            fs::remove_dir_all(&self.generation_dir).map_err(|e| {
                Error::Storage(format!(
                    "Failed to remove '{}': {e}",
                    self.generation_dir.display()
                ))
            })?;
        }
        fs::create_dir_all(&self.generation_dir).map_err(|e| {
            Error::Storage(format!(
                "Failed to create '{}': {e}",
                self.generation_dir.display()
            ))
        })
    }

    /// Relative pointer to an entity document, as recorded in summaries.
    pub fn entity_pointer(kind: ResourceKind, name: &str) -> String {
        format!("{}/{}.json", kind.output_dir(), sanitize_file_stem(name))
    }

    /// Relative pointer to a kind's summary, as recorded in the index.
    pub fn summary_pointer(kind: ResourceKind) -> String {
        format!("{}/{SUMMARY_FILE}", kind.output_dir())
    }

    /// Write an entity document; returns its relative pointer.
    pub fn write_entity(&self, kind: ResourceKind, name: &str, document: &Document) -> Result<String> {
        let pointer = Self::entity_pointer(kind, name);
        self.write_json(&pointer, document)?;
        Ok(pointer)
    }

    /// Serialize `value` as pretty JSON to `relative` inside the generation directory.
    pub fn write_json<T: Serialize + ?Sized>(&self, relative: &str, value: &T) -> Result<()> {
        let path = self.generation_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create '{}': {e}", parent.display()))
            })?;
        }

        let json = serde_json::to_string_pretty(value)
            .map_err(|e| Error::Storage(format!("Failed to serialize {relative}: {e}")))?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .map_err(|e| Error::Storage(format!("Failed to write temp file for {relative}: {e}")))?;

        #[cfg(target_os = "windows")]
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| Error::Storage(format!("Failed to remove existing {relative}: {e}")))?;
        }
        fs::rename(&tmp_path, &path)
            .map_err(|e| Error::Storage(format!("Failed to persist {relative}: {e}")))?;

        debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// Restrict entity names to a conservative file-name alphabet.
fn sanitize_file_stem(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", "_");
    }
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn storage() -> (OutputStorage, TempDir) {
        let dir = TempDir::new().unwrap();
        (OutputStorage::new(dir.path(), Generation::new(3)), dir)
    }

    #[test]
    fn test_layout_and_pointers() {
        let (storage, dir) = storage();
        assert_eq!(storage.generation_dir(), dir.path().join("gen-3"));
        assert_eq!(
            OutputStorage::entity_pointer(ResourceKind::Species, "mr-mime"),
            "pokemon/mr-mime.json"
        );
        assert_eq!(OutputStorage::summary_pointer(ResourceKind::Move), "move/summary.json");
    }

    #[test]
    fn test_write_entity_is_pretty_with_sorted_keys() {
        let (storage, _dir) = storage();
        storage.prepare(false).unwrap();
        let doc = Document::new(json!({"name": "tackle", "accuracy": 95}));
        let pointer = storage.write_entity(ResourceKind::Move, "tackle", &doc).unwrap();

        let written = fs::read_to_string(storage.generation_dir().join(&pointer)).unwrap();
        assert!(written.find("accuracy").unwrap() < written.find("name").unwrap());
        assert!(written.contains('\n'));
        assert!(!storage.generation_dir().join("move/tackle.json.tmp").exists());
    }

    #[test]
    fn test_existing_directory_requires_force() {
        let (storage, _dir) = storage();
        storage.prepare(false).unwrap();
        storage.write_json("index.json", &json!({})).unwrap();

        let err = storage.prepare(false).unwrap_err();
        assert!(err.to_string().contains("--force"));

        storage.prepare(true).unwrap();
        assert!(!storage.generation_dir().join("index.json").exists());
        assert!(storage.generation_dir().exists());
    }

    #[test]
    fn test_empty_directory_is_reused() {
        let (storage, _dir) = storage();
        fs::create_dir_all(storage.generation_dir()).unwrap();
        storage.prepare(false).unwrap();
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("farfetch'd"), "farfetch_d");
        assert_eq!(sanitize_file_stem("../etc/passwd"), "__etc_passwd");
        assert_eq!(sanitize_file_stem("Nidoran♀"), "nidoran_");
        assert_eq!(sanitize_file_stem(""), "_");
    }
}
