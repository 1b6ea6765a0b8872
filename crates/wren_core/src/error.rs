//! Engine Error Types

use thiserror::Error;
use wren_platform::Direction;

/// Errors that can occur in the engine's control context
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Preset not found: {direction}/{name}")]
    PresetNotFound { direction: Direction, name: String },

    #[error("Preset '{name}' is corrupt: {reason}")]
    PresetCorrupt { name: String, reason: String },

    #[error("Invalid preset name: {0:?}")]
    InvalidPresetName(String),

    #[error("Invalid setting key: {0}")]
    InvalidSettingKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("DSP error: {0}")]
    DspError(#[from] wren_dsp::DspError),

    #[error("Platform error: {0}")]
    PlatformError(#[from] wren_platform::PlatformError),

    #[error("Engine is shutting down")]
    ShutDown,
}

impl EngineError {
    /// Unknown parameter, wrong value type, or unknown enum variant
    pub fn is_parameter_error(&self) -> bool {
        matches!(self, EngineError::DspError(e) if e.is_parameter_error())
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::PresetNotFound {
            direction: Direction::Output,
            name: "Music".into(),
        };
        assert_eq!(err.to_string(), "Preset not found: output/Music");

        let err = EngineError::PresetCorrupt {
            name: "Broken".into(),
            reason: "expected value".into(),
        };
        assert!(err.to_string().contains("Broken"));
    }

    #[test]
    fn test_error_from_dsp() {
        let dsp_err = wren_dsp::DspError::UnknownParameter {
            unit: "limiter".into(),
            name: "volume".into(),
        };
        let engine_err: EngineError = dsp_err.into();
        assert!(matches!(engine_err, EngineError::DspError(_)));
        assert!(engine_err.is_parameter_error());

        let engine_err: EngineError = wren_dsp::DspError::UnknownUnit("reverb".into()).into();
        assert!(!engine_err.is_parameter_error());
    }
}
