//! Wren Core - Engine, Configuration and Presets
//!
//! This crate ties the processing chains to the outside world:
//! - Settings store with change notification, and JSON persistence
//! - Preset files and the bridge that applies them through the settings
//! - Per-direction pipelines owning side-channel links in the audio graph
//! - Preset autoloading when devices or routes change
//! - The `Engine` facade and its command surface
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Control Context                         │
//! │  Command ──▶ Engine ──▶ ConfigurationBridge ◀── Settings     │
//! │                │             │        ▲                     │
//! │        GraphEvent ──▶ Mirror ─┴──▶ PresetAutoloader          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ rtrb (chain state, notices)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Processing Context                       │
//! │        input ──▶ [unit] ──▶ [unit] ──▶ ... ──▶ output       │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod autoload;
mod bridge;
mod config;
mod context;
mod engine;
mod error;
mod message;
mod pipeline;
mod preset;
mod settings;

pub mod logging;

pub use autoload::{Association, PresetAutoloader, PresetLoader};
pub use bridge::ConfigurationBridge;
pub use config::{EngineConfig, StreamConfig};
pub use context::EngineContext;
pub use engine::{Engine, ProcessingChains, EVENT_CAPACITY};
pub use error::{EngineError, EngineResult};
pub use message::{Command, Event, Reply};
pub use pipeline::{AuxLinks, Pipeline};
pub use preset::{FilePresetStore, Preset, PresetStore, UnitPreset};
pub use settings::{
    selected_device_key, use_default_key, JsonSettings, ListenerId, Scope, SettingKey,
    SettingValue, SettingsListener, SettingsStore, AUTOLOAD_PREFIX, BYPASS,
    EXCLUDE_MONITOR_STREAMS, LAST_LOADED_PRESET, PLUGINS, SIDECHAIN_INPUT_DEVICE,
};

// Re-export the types callers need to drive the engine
pub use wren_dsp::{DspError, ParamValue, PluginChain, PluginHost, PluginInstance, StereoIo};
pub use wren_platform::{
    Availability, Device, Direction, Endpoint, GraphBackend, GraphEvent, OfflineBackend,
    PlatformError,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify public API is accessible
        let _config = EngineConfig::default();
        let _key = SettingKey::pipeline(Direction::Output, PLUGINS);
    }
}
