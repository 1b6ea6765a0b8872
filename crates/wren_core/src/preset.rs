//! Presets
//!
//! A preset is a named snapshot of one pipeline: its ordered unit tags and
//! every unit's parameters. Files live at `<root>/<direction>/<name>.json`.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use wren_dsp::ParamValue;
use wren_platform::Direction;

/// Parameters of one unit inside a preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPreset {
    pub tag: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub direction: Direction,

    /// Units in processing order
    pub units: Vec<UnitPreset>,

    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Preset {
    pub fn new(name: &str, direction: Direction) -> Self {
        Self {
            name: name.to_string(),
            direction,
            units: Vec::new(),
            saved_at: None,
        }
    }

    pub fn tags(&self) -> Vec<String> {
        self.units.iter().map(|u| u.tag.clone()).collect()
    }

    pub fn unit(&self, tag: &str) -> Option<&UnitPreset> {
        self.units.iter().find(|u| u.tag == tag)
    }
}

/// Named preset storage per direction
pub trait PresetStore: Send + Sync {
    fn load(&self, direction: Direction, name: &str) -> EngineResult<Preset>;

    fn save(&self, preset: &Preset) -> EngineResult<()>;

    /// Preset names for a direction, sorted
    fn list(&self, direction: Direction) -> EngineResult<Vec<String>>;

    fn exists(&self, direction: Direction, name: &str) -> bool;
}

/// Presets stored as JSON files
#[derive(Debug, Clone)]
pub struct FilePresetStore {
    root: PathBuf,
}

impl FilePresetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Platform-specific preset directory
    pub fn default_root() -> Option<PathBuf> {
        EngineConfig::config_dir().map(|dir| dir.join("presets"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, direction: Direction) -> PathBuf {
        self.root.join(direction.as_str())
    }

    fn path(&self, direction: Direction, name: &str) -> EngineResult<PathBuf> {
        validate_name(name)?;
        Ok(self.dir(direction).join(format!("{}.json", name)))
    }
}

fn validate_name(name: &str) -> EngineResult<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(|c: char| c == '/' || c == '\\') {
        return Err(EngineError::InvalidPresetName(name.to_string()));
    }
    Ok(())
}

impl PresetStore for FilePresetStore {
    fn load(&self, direction: Direction, name: &str) -> EngineResult<Preset> {
        let path = self.path(direction, name)?;

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(EngineError::PresetNotFound {
                    direction,
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| EngineError::PresetCorrupt {
            name: name.to_string(),
            reason,
        };

        let preset: Preset = serde_json::from_str(&text).map_err(|e| corrupt(e.to_string()))?;
        if preset.direction != direction {
            return Err(corrupt(format!(
                "stored as {} preset, requested {}",
                preset.direction, direction
            )));
        }

        debug!("Preset {}/{} read from {:?}", direction, name, path);
        Ok(preset)
    }

    fn save(&self, preset: &Preset) -> EngineResult<()> {
        let path = self.path(preset.direction, &preset.name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = fs::File::create(&path)?;
        serde_json::to_writer_pretty(file, preset)?;

        info!("Preset saved to {:?}", path);
        Ok(())
    }

    fn list(&self, direction: Direction) -> EngineResult<Vec<String>> {
        let entries = match fs::read_dir(self.dir(direction)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, direction: Direction, name: &str) -> bool {
        self.path(direction, name)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, direction: Direction) -> Preset {
        let mut limiter = BTreeMap::new();
        limiter.insert("threshold".to_string(), ParamValue::Float(-6.0));

        Preset {
            name: name.to_string(),
            direction,
            units: vec![
                UnitPreset {
                    tag: "equalizer".into(),
                    params: BTreeMap::new(),
                },
                UnitPreset {
                    tag: "limiter".into(),
                    params: limiter,
                },
            ],
            saved_at: None,
        }
    }

    #[test]
    fn test_save_load_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePresetStore::new(dir.path());

        store.save(&sample("Music", Direction::Output)).unwrap();
        store.save(&sample("Bass", Direction::Output)).unwrap();
        store.save(&sample("Voice", Direction::Input)).unwrap();

        let loaded = store.load(Direction::Output, "Music").unwrap();
        assert_eq!(loaded.tags(), ["equalizer", "limiter"]);
        assert_eq!(
            loaded.unit("limiter").unwrap().params["threshold"],
            ParamValue::Float(-6.0)
        );

        assert_eq!(store.list(Direction::Output).unwrap(), ["Bass", "Music"]);
        assert_eq!(store.list(Direction::Input).unwrap(), ["Voice"]);
        assert!(store.exists(Direction::Input, "Voice"));
        assert!(!store.exists(Direction::Output, "Voice"));
    }

    #[test]
    fn test_missing_preset_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePresetStore::new(dir.path().join("nowhere"));

        assert!(store.list(Direction::Output).unwrap().is_empty());
        assert!(matches!(
            store.load(Direction::Output, "Music"),
            Err(EngineError::PresetNotFound { .. })
        ));
    }

    #[test]
    fn test_corrupt_and_mismatched_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePresetStore::new(dir.path());
        fs::create_dir_all(dir.path().join("output")).unwrap();
        fs::write(dir.path().join("output").join("Broken.json"), "{ \"name\": ").unwrap();

        assert!(matches!(
            store.load(Direction::Output, "Broken"),
            Err(EngineError::PresetCorrupt { .. })
        ));

        let input = sample("Voice", Direction::Input);
        fs::write(
            dir.path().join("output").join("Voice.json"),
            serde_json::to_string(&input).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            store.load(Direction::Output, "Voice"),
            Err(EngineError::PresetCorrupt { .. })
        ));
    }

    #[test]
    fn test_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePresetStore::new(dir.path());

        for bad in ["", "../escape", "a/b", "a\\b", ".hidden"] {
            assert!(matches!(
                store.load(Direction::Output, bad),
                Err(EngineError::InvalidPresetName(_))
            ));
            assert!(!store.exists(Direction::Output, bad));
        }
    }

    #[test]
    fn test_older_files_without_timestamp() {
        let json = r#"{ "name": "Old", "direction": "input", "units": [ { "tag": "limiter" } ] }"#;
        let preset: Preset = serde_json::from_str(json).unwrap();
        assert!(preset.saved_at.is_none());
        assert!(preset.units[0].params.is_empty());
    }
}
