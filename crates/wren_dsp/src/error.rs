//! DSP Error Types

use thiserror::Error;

/// Errors that can occur while configuring processing units
///
/// The real-time path never produces these; they are returned from the
/// control-side calls that bind parameters or reshape a chain.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Unit '{unit}' has no parameter named '{name}'")]
    UnknownParameter { unit: String, name: String },

    #[error("Parameter '{name}' expects a {expected} value")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("Invalid value for parameter '{name}': {value}")]
    InvalidValue { name: String, value: String },

    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Unit '{0}' appears more than once in the chain")]
    DuplicateUnit(String),

    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),

    #[error("Chain update pending - the processing context has not picked up earlier updates")]
    UpdatePending,
}

impl DspError {
    /// Whether this error came from a rejected parameter binding
    pub fn is_parameter_error(&self) -> bool {
        matches!(
            self,
            DspError::UnknownParameter { .. }
                | DspError::TypeMismatch { .. }
                | DspError::InvalidValue { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DspError::UnknownParameter {
            unit: "multiband_gate#0".into(),
            name: "knee".into(),
        };
        assert!(err.to_string().contains("knee"));
        assert!(err.to_string().contains("multiband_gate#0"));

        let err = DspError::InvalidSampleRate(0);
        assert!(err.to_string().contains('0'));
    }

    #[test]
    fn test_parameter_error_classification() {
        assert!(DspError::TypeMismatch {
            name: "dry".into(),
            expected: "decibel"
        }
        .is_parameter_error());
        assert!(!DspError::UpdatePending.is_parameter_error());
        assert!(!DspError::UnknownUnit("reverb".into()).is_parameter_error());
    }
}
