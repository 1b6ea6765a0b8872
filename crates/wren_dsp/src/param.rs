//! Unit Parameters
//!
//! Every unit declares an ordered table of [`ParamDescriptor`]s. Values arrive
//! from configuration as loosely typed [`ParamValue`]s and are validated and
//! encoded into a single `f64` per parameter, which is what the processing
//! context reads back from atomics:
//!
//! | Kind       | Encoded as                         |
//! |------------|------------------------------------|
//! | `Bool`     | `0.0` / `1.0`                      |
//! | `Enum`     | variant index                      |
//! | `Decibel`  | dB (clamped), `-inf` for exact mute |
//! | `Float`    | value (clamped)                    |

use serde::{Deserialize, Serialize};

use crate::error::DspError;

/// Text form of an exact mute for decibel parameters
pub const NEG_INF_TEXT: &str = "-inf";

/// A configuration value as stored in settings and presets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Decibel value, accepting the `"-inf"` spelling used for mutes
    pub fn db(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Text(s) if s == NEG_INF_TEXT => Some(f64::NEG_INFINITY),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Value domain of a parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    Bool,
    Enum(&'static [&'static str]),
    Decibel { min: f64, max: f64, allow_mute: bool },
    Float { min: f64, max: f64 },
}

impl ParamKind {
    /// Name used in type-mismatch errors
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamKind::Bool => "boolean",
            ParamKind::Enum(_) => "enumerated",
            ParamKind::Decibel { .. } => "decibel",
            ParamKind::Float { .. } => "float",
        }
    }
}

/// Declaration of one named parameter of a unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDescriptor {
    /// Configuration name, e.g. `band2-external-sidechain`
    pub name: &'static str,

    /// Control-port symbol on a hosted plugin (unused by built-in units)
    pub port: &'static str,

    pub kind: ParamKind,

    /// Encoded default
    pub default: f64,
}

impl ParamDescriptor {
    pub const fn new(name: &'static str, port: &'static str, kind: ParamKind, default: f64) -> Self {
        Self {
            name,
            port,
            kind,
            default,
        }
    }

    /// Validate a configuration value and encode it
    ///
    /// Continuous values outside the declared range are clamped rather than
    /// rejected. Type mismatches and unknown enum variants are errors.
    pub fn encode(&self, value: &ParamValue) -> Result<f64, DspError> {
        let mismatch = || DspError::TypeMismatch {
            name: self.name.to_string(),
            expected: self.kind.type_name(),
        };
        let invalid = || DspError::InvalidValue {
            name: self.name.to_string(),
            value: value.to_string(),
        };

        match self.kind {
            ParamKind::Bool => value
                .as_bool()
                .map(|b| if b { 1.0 } else { 0.0 })
                .ok_or_else(mismatch),
            ParamKind::Enum(variants) => {
                let text = value.as_text().ok_or_else(mismatch)?;
                variants
                    .iter()
                    .position(|v| *v == text)
                    .map(|i| i as f64)
                    .ok_or_else(invalid)
            }
            ParamKind::Decibel { min, max, allow_mute } => {
                let db = match value {
                    ParamValue::Float(_) => value.db(),
                    ParamValue::Text(_) => Some(value.db().ok_or_else(invalid)?),
                    ParamValue::Bool(_) => None,
                }
                .ok_or_else(mismatch)?;

                if db.is_nan() {
                    return Err(invalid());
                }
                if db == f64::NEG_INFINITY {
                    return if allow_mute { Ok(db) } else { Err(invalid()) };
                }
                Ok(db.clamp(min, max))
            }
            ParamKind::Float { min, max } => match value {
                ParamValue::Float(v) if v.is_finite() => Ok(v.clamp(min, max)),
                ParamValue::Float(_) => Err(invalid()),
                _ => Err(mismatch()),
            },
        }
    }

    /// Turn an encoded value back into its configuration form
    pub fn decode(&self, encoded: f64) -> ParamValue {
        match self.kind {
            ParamKind::Bool => ParamValue::Bool(encoded >= 0.5),
            ParamKind::Enum(variants) => {
                let index = (encoded.max(0.0) as usize).min(variants.len().saturating_sub(1));
                ParamValue::Text(variants.get(index).copied().unwrap_or_default().to_string())
            }
            ParamKind::Decibel { .. } if encoded == f64::NEG_INFINITY => {
                ParamValue::Text(NEG_INF_TEXT.to_string())
            }
            ParamKind::Decibel { .. } | ParamKind::Float { .. } => ParamValue::Float(encoded),
        }
    }
}

/// Convert decibels to linear amplitude; `-inf` maps to exactly zero
#[inline]
pub fn db_to_linear(db: f64) -> f32 {
    if db == f64::NEG_INFINITY {
        0.0
    } else {
        10.0_f64.powf(db / 20.0) as f32
    }
}

/// Level reported for silence by [`linear_to_db`]
pub const MIN_LEVEL_DB: f32 = -100.0;

/// Convert a linear amplitude to decibels, floored at [`MIN_LEVEL_DB`]
#[inline]
pub fn linear_to_db(amplitude: f32) -> f32 {
    if amplitude <= 1e-5 {
        MIN_LEVEL_DB
    } else {
        (20.0 * amplitude.log10()).max(MIN_LEVEL_DB)
    }
}
