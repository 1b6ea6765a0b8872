//! Wren DSP - Processing Units and Plugin Chains
//!
//! This crate provides the processing side of Wren:
//! - Parameter descriptors with typed validation and lock-free storage
//! - Built-in equalizer and limiter units, plus hosted multiband units
//! - A plugin-host seam for externally provided algorithms
//! - The real-time plugin chain and its control handle
//!
//! # Architecture
//!
//! The processing path follows a strict "no allocation in audio callback" rule.
//! Parameters are atomics written by the control side and read once per block;
//! unit lists are rebuilt off the audio thread and swapped in through a queue.

mod algorithm;
mod chain;
mod controls;
mod eq;
mod error;
mod host;
mod limiter;
mod notice;
mod param;
mod unit;

pub use algorithm::{UnitKind, EXTERNAL_SIDECHAIN_SUFFIX};
pub use chain::{plugin_chain, ChainControls, ChainHandle, PluginChain, DEFAULT_NOTICE_CAPACITY};
pub use controls::{MeterSnapshot, UnitControls, UnitId, BYPASS, INPUT_GAIN, MAX_BANDS, OUTPUT_GAIN};
pub use eq::{BandType, Equalizer, EQ_BANDS, MAX_BAND_GAIN_DB};
pub use error::DspError;
pub use host::{NullHost, PluginHost, PluginInstance, StereoIo};
pub use limiter::Limiter;
pub use notice::{ChainNotice, Notice};
pub use param::{
    db_to_linear, linear_to_db, ParamDescriptor, ParamKind, ParamValue, MIN_LEVEL_DB, NEG_INF_TEXT,
};
pub use unit::DspUnit;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _eq = Equalizer::new(48000.0);
        let _limiter = Limiter::default();
        assert_eq!(UnitKind::ALL.len(), 4);
    }
}
