//! Message Types
//!
//! Commands flow from the process-level caller -> Engine
//! Events flow from Engine -> subscribers (UI, D-Bus front end, logs)

use serde::{Deserialize, Serialize};

use wren_dsp::{ChainNotice, MeterSnapshot};
use wren_platform::Direction;

/// Commands accepted by [`Engine::execute`](crate::Engine::execute)
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Bypass all processing on both pipelines
    SetBypass(bool),

    QueryBypass,

    /// List stored presets for a direction
    ListPresets(Direction),

    /// Name of the preset last loaded into a pipeline
    ActivePreset(Direction),

    /// Load a preset by name
    ///
    /// Without a direction the input presets are tried first, then output.
    LoadPreset {
        direction: Option<Direction>,
        name: String,
    },

    /// Save the current state of a pipeline as a preset
    SavePreset { direction: Direction, name: String },

    /// Every unit back to its defaults, bypass off
    Reset,

    /// Shutdown the engine
    Shutdown,
}

/// Successful outcome of a [`Command`]
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Done,
    Bypass(bool),
    Presets(Vec<String>),
    ActivePreset(Option<String>),
    PresetLoaded { direction: Direction, name: String },
}

/// Events sent from the engine to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// A preset was applied to a pipeline
    PresetLoaded { direction: Direction, name: String },

    /// One unit reported a new latency
    LatencyChanged {
        direction: Direction,
        tag: String,
        samples: u32,
        seconds: f64,
    },

    /// Total latency of a chain changed
    ChainLatencyChanged {
        direction: Direction,
        samples: u32,
        seconds: f64,
    },

    /// Fresh meter values for a unit
    MetersUpdated {
        direction: Direction,
        tag: String,
        meters: MeterSnapshot,
    },

    BypassChanged { bypassed: bool },

    /// The server's default endpoint for a direction changed
    DefaultDeviceChanged { direction: Direction, name: String },

    /// Error occurred
    Error { message: String },
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }

    /// Event for a notice drained from a chain
    pub fn from_notice(direction: Direction, notice: ChainNotice) -> Self {
        match notice {
            ChainNotice::LatencyChanged {
                tag,
                samples,
                seconds,
            } => Event::LatencyChanged {
                direction,
                tag,
                samples,
                seconds,
            },
            ChainNotice::ChainLatencyChanged { samples, seconds } => Event::ChainLatencyChanged {
                direction,
                samples,
                seconds,
            },
            ChainNotice::Meters { tag, meters } => Event::MetersUpdated {
                direction,
                tag,
                meters,
            },
        }
    }
}
