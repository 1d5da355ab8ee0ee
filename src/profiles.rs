//! Configuration profile persistence
//!
//! Save/load/list/delete `CodecConfig` profiles as pretty JSON files
//! (`<name>.json`) in a single directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{CodecConfig, DtmfError, DtmfResult};

/// Sanitize a profile name to prevent path traversal.
/// Rejects anything with path separators, "..", or empty strings.
fn sanitize_name(name: &str) -> DtmfResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DtmfError::Config("Profile name cannot be empty".into()));
    }
    if trimmed.contains("..") || trimmed.contains('/') || trimmed.contains('\\') {
        return Err(DtmfError::Config("Invalid profile name".into()));
    }
    // Only allow alphanumeric, spaces, hyphens, underscores
    if !trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '_')
    {
        return Err(DtmfError::Config(
            "Profile name contains invalid characters".into(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Directory of named configuration profiles
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    /// Open (and create if needed) the profile directory
    pub fn open(dir: impl Into<PathBuf>) -> DtmfResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            DtmfError::Config(format!("Failed to create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> DtmfResult<PathBuf> {
        let name = sanitize_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Validate and write `config` under `name`, replacing any existing profile
    pub fn save(&self, name: &str, config: &CodecConfig) -> DtmfResult<()> {
        config.validate()?;
        let path = self.path_for(name)?;
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| DtmfError::Config(format!("Serialization error: {e}")))?;
        fs::write(&path, json)
            .map_err(|e| DtmfError::Config(format!("Failed to write profile: {e}")))?;
        log::debug!("Saved profile {name:?} to {}", path.display());
        Ok(())
    }

    pub fn load(&self, name: &str) -> DtmfResult<CodecConfig> {
        let path = self.path_for(name)?;
        let json = fs::read_to_string(&path)
            .map_err(|e| DtmfError::Config(format!("Failed to read profile '{name}': {e}")))?;
        let config: CodecConfig = serde_json::from_str(&json)
            .map_err(|e| DtmfError::Config(format!("Failed to parse profile '{name}': {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Profile names, sorted
    pub fn list(&self) -> DtmfResult<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(&self.dir)
            .map_err(|e| DtmfError::Config(format!("Failed to read profile dir: {e}")))?
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let path = entry.path();
                if path.extension()?.to_str()? == "json" {
                    path.file_stem()?.to_str().map(String::from)
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn delete(&self, name: &str) -> DtmfResult<()> {
        let path = self.path_for(name)?;
        fs::remove_file(&path)
            .map_err(|e| DtmfError::Config(format!("Failed to delete profile '{name}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_rejects_traversal_and_odd_characters() {
        assert!(sanitize_name("../etc/passwd").is_err());
        assert!(sanitize_name("a/b").is_err());
        assert!(sanitize_name("   ").is_err());
        assert!(sanitize_name("loud;rm").is_err());
        assert_eq!(sanitize_name("  Phone Line-2_ ").unwrap(), "Phone Line-2_");
    }

    #[test]
    fn test_save_load_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("profiles")).unwrap();

        let slow = CodecConfig {
            tone_duration_ms: 400,
            intertone_gap_ms: 200,
            required_persistence_count: 4,
            ..CodecConfig::default()
        };
        store.save("slow", &slow).unwrap();
        store.save("default", &CodecConfig::default()).unwrap();
        std::fs::write(store.dir().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.list().unwrap(), vec!["default", "slow"]);
        assert_eq!(store.load("slow").unwrap(), slow);

        store.delete("slow").unwrap();
        assert_eq!(store.list().unwrap(), vec!["default"]);
        assert!(store.load("slow").is_err());
    }

    #[test]
    fn test_invalid_profiles_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path()).unwrap();

        let bad = CodecConfig {
            buffer_size: 1000,
            ..CodecConfig::default()
        };
        assert!(store.save("bad", &bad).is_err());

        std::fs::write(dir.path().join("broken.json"), r#"{"buffer_size": 3}"#).unwrap();
        assert!(matches!(store.load("broken"), Err(DtmfError::Config(_))));
    }
}
