//! Persistent Settings
//!
//! Hierarchical key/value store holding the app, pipeline and per-unit
//! configuration. Keys are written as paths:
//!
//! | Scope    | Path                          | Example                               |
//! |----------|-------------------------------|---------------------------------------|
//! | App      | `app/<name>`                  | `app/bypass`                          |
//! | Pipeline | `<direction>/<name>`          | `output/plugins`                      |
//! | Unit     | `<direction>/<tag>/<name>`    | `input/multiband_gate#0/band2-enable` |
//!
//! Listeners run on the thread that changed the value, after the store's lock
//! has been released, so they may write back into the store.
//!
//! # Storage Locations
//! - Linux: `~/.config/wren/settings.json`
//! - Windows: `%APPDATA%\wren\config\settings.json`
//! - macOS: `~/Library/Application Support/com.wren.wren/settings.json`

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use wren_dsp::ParamValue;
use wren_platform::Direction;

/// Ordered unit tags of a pipeline
pub const PLUGINS: &str = "plugins";

/// Global bypass (app scope)
pub const BYPASS: &str = "bypass";

/// Leave streams that record a monitor source unprocessed (app scope)
pub const EXCLUDE_MONITOR_STREAMS: &str = "exclude-monitor-streams";

/// Name of the preset most recently loaded into a pipeline
pub const LAST_LOADED_PRESET: &str = "last-loaded-preset";

/// Endpoint feeding a unit's external side-channel (unit scope)
pub const SIDECHAIN_INPUT_DEVICE: &str = "sidechain-input-device";

/// Prefix of autoload associations (pipeline scope)
pub const AUTOLOAD_PREFIX: &str = "autoload::";

/// Key holding the selected endpoint name of a pipeline
pub fn selected_device_key(direction: Direction) -> SettingKey {
    let name = match direction {
        Direction::Output => "output-device",
        Direction::Input => "input-device",
    };
    SettingKey::pipeline(direction, name)
}

/// Key telling whether a pipeline follows the server default
pub fn use_default_key(direction: Direction) -> SettingKey {
    let name = match direction {
        Direction::Output => "use-default-output-device",
        Direction::Input => "use-default-input-device",
    };
    SettingKey::pipeline(direction, name)
}

/// A stored setting value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    List(Vec<String>),
}

impl SettingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            SettingValue::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Int(i) => Some(*i as f64),
            SettingValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Parameter form of this value; lists have none
    pub fn to_param(&self) -> Option<ParamValue> {
        match self {
            SettingValue::Bool(b) => Some(ParamValue::Bool(*b)),
            SettingValue::Int(i) => Some(ParamValue::Float(*i as f64)),
            SettingValue::Double(d) => Some(ParamValue::Float(*d)),
            SettingValue::Str(s) => Some(ParamValue::Text(s.clone())),
            SettingValue::List(_) => None,
        }
    }
}

impl From<ParamValue> for SettingValue {
    fn from(value: ParamValue) -> Self {
        match value {
            ParamValue::Bool(b) => SettingValue::Bool(b),
            ParamValue::Float(f) => SettingValue::Double(f),
            ParamValue::Text(s) => SettingValue::Str(s),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Str(value.to_string())
    }
}

impl From<Vec<String>> for SettingValue {
    fn from(value: Vec<String>) -> Self {
        SettingValue::List(value)
    }
}

/// Where a setting lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    App,
    Pipeline(Direction),
    Unit(Direction, String),
}

/// Fully qualified setting name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SettingKey {
    pub scope: Scope,
    pub name: String,
}

impl SettingKey {
    pub fn app(name: &str) -> Self {
        Self {
            scope: Scope::App,
            name: name.to_string(),
        }
    }

    pub fn pipeline(direction: Direction, name: &str) -> Self {
        Self {
            scope: Scope::Pipeline(direction),
            name: name.to_string(),
        }
    }

    pub fn unit(direction: Direction, tag: &str, name: &str) -> Self {
        Self {
            scope: Scope::Unit(direction, tag.to_string()),
            name: name.to_string(),
        }
    }

    pub fn path(&self) -> String {
        match &self.scope {
            Scope::App => format!("app/{}", self.name),
            Scope::Pipeline(direction) => format!("{}/{}", direction, self.name),
            Scope::Unit(direction, tag) => format!("{}/{}/{}", direction, tag, self.name),
        }
    }

    pub fn parse(path: &str) -> EngineResult<Self> {
        let invalid = || EngineError::InvalidSettingKey(path.to_string());

        let (scope, rest) = path.split_once('/').ok_or_else(invalid)?;
        if rest.is_empty() {
            return Err(invalid());
        }
        if scope == "app" {
            return Ok(Self::app(rest));
        }

        let direction: Direction = scope.parse().map_err(|_| invalid())?;
        match rest.split_once('/') {
            Some((tag, name)) if !tag.is_empty() && !name.is_empty() => {
                Ok(Self::unit(direction, tag, name))
            }
            Some(_) => Err(invalid()),
            None => Ok(Self::pipeline(direction, rest)),
        }
    }

    /// Direction for pipeline and unit keys
    pub fn direction(&self) -> Option<Direction> {
        match &self.scope {
            Scope::App => None,
            Scope::Pipeline(direction) | Scope::Unit(direction, _) => Some(*direction),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Handle returned by [`SettingsStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

pub type SettingsListener = Arc<dyn Fn(&SettingKey, &SettingValue) + Send + Sync>;

/// Hierarchical settings with change notification
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &SettingKey) -> Option<SettingValue>;

    /// Store a value; listeners run only when the value actually changed
    ///
    /// Returns whether it changed.
    fn set(&self, key: &SettingKey, value: SettingValue) -> bool;

    /// Returns whether the key existed
    fn remove(&self, key: &SettingKey) -> bool;

    /// Every key stored directly under `scope`, sorted
    fn keys(&self, scope: &Scope) -> Vec<SettingKey>;

    fn subscribe(&self, listener: SettingsListener) -> ListenerId;

    fn unsubscribe(&self, id: ListenerId) -> bool;

    /// Persist pending changes, for stores with a backing file
    fn flush(&self) -> EngineResult<()> {
        Ok(())
    }
}

/// JSON-file backed settings store
pub struct JsonSettings {
    values: RwLock<BTreeMap<String, SettingValue>>,
    listeners: Mutex<Vec<(ListenerId, SettingsListener)>>,
    next_listener: AtomicU64,
    path: Option<PathBuf>,
}

impl JsonSettings {
    /// Store that is never written to disk
    pub fn in_memory() -> Self {
        Self::with_values(BTreeMap::new(), None)
    }

    fn with_values(values: BTreeMap<String, SettingValue>, path: Option<PathBuf>) -> Self {
        Self {
            values: RwLock::new(values),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            path,
        }
    }

    /// Load settings from disk
    ///
    /// A missing or unreadable file yields empty settings; `save` will then
    /// write to `path`.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match fs::File::open(path) {
                Ok(file) => match serde_json::from_reader(file) {
                    Ok(values) => {
                        info!("Settings loaded from {:?}", path);
                        return Self::with_values(values, Some(path.to_path_buf()));
                    }
                    Err(e) => {
                        error!("Failed to parse settings file: {}", e);
                    }
                },
                Err(e) => {
                    error!("Failed to open settings file: {}", e);
                }
            }
        }

        info!("Using default settings");
        Self::with_values(BTreeMap::new(), Some(path.to_path_buf()))
    }

    /// Write the settings back to the file they were loaded from
    pub fn save(&self) -> EngineResult<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| EngineError::ConfigError("Settings have no backing file".into()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, &*self.values.read())?;

        info!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Platform-specific settings file path
    pub fn default_path() -> Option<PathBuf> {
        EngineConfig::config_dir().map(|dir| dir.join("settings.json"))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn notify(&self, key: &SettingKey, value: &SettingValue) {
        let listeners: Vec<SettingsListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(key, value);
        }
    }
}

impl SettingsStore for JsonSettings {
    fn get(&self, key: &SettingKey) -> Option<SettingValue> {
        self.values.read().get(&key.path()).cloned()
    }

    fn set(&self, key: &SettingKey, value: SettingValue) -> bool {
        {
            let mut values = self.values.write();
            let path = key.path();
            if values.get(&path) == Some(&value) {
                return false;
            }
            values.insert(path, value.clone());
        }

        self.notify(key, &value);
        true
    }

    fn remove(&self, key: &SettingKey) -> bool {
        self.values.write().remove(&key.path()).is_some()
    }

    fn keys(&self, scope: &Scope) -> Vec<SettingKey> {
        self.values
            .read()
            .keys()
            .filter_map(|path| SettingKey::parse(path).ok())
            .filter(|key| &key.scope == scope)
            .collect()
    }

    fn subscribe(&self, listener: SettingsListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn flush(&self) -> EngineResult<()> {
        match self.path {
            Some(_) => self.save(),
            None => Ok(()),
        }
    }
}
