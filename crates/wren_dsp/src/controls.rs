//! Shared Unit Controls
//!
//! Parameter state of one unit, shared between the control context (which
//! validates and writes) and the processing context (which only reads).
//!
//! # Update protocol
//!
//! Values are stored as `f64` bits in `AtomicU64`. After writing, the control
//! side bumps `version`; the unit adapter compares versions once per block
//! and re-syncs its algorithm when they differ. A write becomes audible on the
//! next block or the one after, and is never torn.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::algorithm::{UnitKind, EXTERNAL_SIDECHAIN_SUFFIX};
use crate::error::DspError;
use crate::param::{
    db_to_linear, linear_to_db, ParamDescriptor, ParamKind, ParamValue, MIN_LEVEL_DB,
};

/// Upper bound of metered sub-bands across all families
pub const MAX_BANDS: usize = 8;

/// Reserved parameter addressing the unit's bypass flag
pub const BYPASS: &str = "bypass";
/// Reserved parameter addressing the unit's input gain (dB)
pub const INPUT_GAIN: &str = "input-gain";
/// Reserved parameter addressing the unit's output gain (dB)
pub const OUTPUT_GAIN: &str = "output-gain";

static BYPASS_PARAM: ParamDescriptor = ParamDescriptor::new(BYPASS, "", ParamKind::Bool, 0.0);
static INPUT_GAIN_PARAM: ParamDescriptor = ParamDescriptor::new(INPUT_GAIN, "", GAIN_DB, 0.0);
static OUTPUT_GAIN_PARAM: ParamDescriptor = ParamDescriptor::new(OUTPUT_GAIN, "", GAIN_DB, 0.0);

const GAIN_DB: ParamKind = ParamKind::Decibel {
    min: -36.0,
    max: 36.0,
    allow_mute: true,
};

/// Opaque per-process unit identifier carried by processing notices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub u32);

static NEXT_UNIT_ID: AtomicU32 = AtomicU32::new(1);

/// Where a parameter name lands
enum Target {
    Param(usize),
    Bypass,
    InputGain,
    OutputGain,
}

/// Per-band metering arrays, f32 bits
pub struct Meters {
    frequency: [AtomicU32; MAX_BANDS],
    envelope: [AtomicU32; MAX_BANDS],
    curve: [AtomicU32; MAX_BANDS],
    reduction: [AtomicU32; MAX_BANDS],
    /// Linear peaks: input left/right, output left/right
    peaks: [AtomicU32; 4],
}

impl Meters {
    fn new() -> Self {
        Self {
            frequency: core::array::from_fn(|_| AtomicU32::new(0)),
            envelope: core::array::from_fn(|_| AtomicU32::new(0)),
            curve: core::array::from_fn(|_| AtomicU32::new(0)),
            reduction: core::array::from_fn(|_| AtomicU32::new(0)),
            peaks: core::array::from_fn(|_| AtomicU32::new(0)),
        }
    }

    pub(crate) fn store_peaks(&self, input: [f32; 2], output: [f32; 2]) {
        for (slot, peak) in self.peaks.iter().zip(input.into_iter().chain(output)) {
            slot.store(peak.to_bits(), Ordering::Relaxed);
        }
    }

    fn peak_db(&self, index: usize) -> f32 {
        linear_to_db(f32::from_bits(self.peaks[index].load(Ordering::Relaxed)))
    }

    pub(crate) fn store(&self, band: usize, frequency: f32, envelope: f32, curve: f32, reduction: f32) {
        if band >= MAX_BANDS {
            return;
        }
        self.frequency[band].store(frequency.to_bits(), Ordering::Relaxed);
        self.envelope[band].store(envelope.to_bits(), Ordering::Relaxed);
        self.curve[band].store(curve.to_bits(), Ordering::Relaxed);
        self.reduction[band].store(reduction.to_bits(), Ordering::Relaxed);
    }

    fn read(values: &[AtomicU32; MAX_BANDS], bands: usize) -> Vec<f32> {
        values[..bands]
            .iter()
            .map(|v| f32::from_bits(v.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Copy of a unit's meters, taken on the control side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterSnapshot {
    pub frequency_range_end: Vec<f32>,
    pub envelope: Vec<f32>,
    pub curve: Vec<f32>,
    pub reduction: Vec<f32>,
    /// Input level after input gain, dB (left, right)
    #[serde(default = "silent_pair")]
    pub input_peak: [f32; 2],
    /// Output level after output gain, dB (left, right)
    #[serde(default = "silent_pair")]
    pub output_peak: [f32; 2],
}

fn silent_pair() -> [f32; 2] {
    [MIN_LEVEL_DB; 2]
}

impl Default for MeterSnapshot {
    fn default() -> Self {
        Self {
            frequency_range_end: Vec::new(),
            envelope: Vec::new(),
            curve: Vec::new(),
            reduction: Vec::new(),
            input_peak: silent_pair(),
            output_peak: silent_pair(),
        }
    }
}

/// Parameter, gain, bypass, latency and meter state of one unit
pub struct UnitControls {
    id: UnitId,
    tag: String,
    kind: UnitKind,
    values: Box<[AtomicU64]>,
    version: AtomicU32,

    bypass: AtomicBool,
    input_gain_db: AtomicU64,
    output_gain_db: AtomicU64,
    input_gain: AtomicU32,
    output_gain: AtomicU32,

    available: AtomicBool,
    unavailable_logged: AtomicBool,
    latency_samples: AtomicU32,
    sample_rate: AtomicU32,

    send_telemetry: AtomicBool,
    meters_pending: AtomicBool,
    meters: Meters,
}

impl UnitControls {
    /// Create controls for a unit tag with every parameter at its default
    pub fn new(tag: &str) -> Result<Self, DspError> {
        let kind = UnitKind::from_tag(tag)?;
        let values = kind
            .descriptors()
            .iter()
            .map(|d| AtomicU64::new(d.default.to_bits()))
            .collect();

        Ok(Self {
            id: UnitId(NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed)),
            tag: tag.to_string(),
            kind,
            values,
            version: AtomicU32::new(0),
            bypass: AtomicBool::new(false),
            input_gain_db: AtomicU64::new(0.0_f64.to_bits()),
            output_gain_db: AtomicU64::new(0.0_f64.to_bits()),
            input_gain: AtomicU32::new(1.0_f32.to_bits()),
            output_gain: AtomicU32::new(1.0_f32.to_bits()),
            available: AtomicBool::new(true),
            unavailable_logged: AtomicBool::new(false),
            latency_samples: AtomicU32::new(0),
            sample_rate: AtomicU32::new(0),
            send_telemetry: AtomicBool::new(false),
            meters_pending: AtomicBool::new(false),
            meters: Meters::new(),
        })
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    fn target(&self, name: &str) -> Result<(Target, &ParamDescriptor), DspError> {
        match name {
            BYPASS => Ok((Target::Bypass, &BYPASS_PARAM)),
            INPUT_GAIN => Ok((Target::InputGain, &INPUT_GAIN_PARAM)),
            OUTPUT_GAIN => Ok((Target::OutputGain, &OUTPUT_GAIN_PARAM)),
            _ => self
                .kind
                .descriptors()
                .iter()
                .enumerate()
                .find(|(_, d)| d.name == name)
                .map(|(i, d)| (Target::Param(i), d))
                .ok_or_else(|| DspError::UnknownParameter {
                    unit: self.tag.clone(),
                    name: name.to_string(),
                }),
        }
    }

    /// Check a value without applying it
    pub fn validate(&self, name: &str, value: &ParamValue) -> Result<(), DspError> {
        let (_, desc) = self.target(name)?;
        desc.encode(value).map(|_| ())
    }

    /// Bind a configuration value to a parameter
    ///
    /// On error nothing changes.
    pub fn bind(&self, name: &str, value: &ParamValue) -> Result<(), DspError> {
        let (target, desc) = self.target(name)?;
        let encoded = desc.encode(value)?;

        match target {
            Target::Param(index) => {
                self.values[index].store(encoded.to_bits(), Ordering::Relaxed);
                self.version.fetch_add(1, Ordering::Release);
            }
            Target::Bypass => self.bypass.store(encoded >= 0.5, Ordering::Relaxed),
            Target::InputGain => {
                self.input_gain_db.store(encoded.to_bits(), Ordering::Relaxed);
                self.input_gain
                    .store(db_to_linear(encoded).to_bits(), Ordering::Relaxed);
            }
            Target::OutputGain => {
                self.output_gain_db.store(encoded.to_bits(), Ordering::Relaxed);
                self.output_gain
                    .store(db_to_linear(encoded).to_bits(), Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Current value of a parameter in configuration form
    pub fn value(&self, name: &str) -> Option<ParamValue> {
        let (target, desc) = self.target(name).ok()?;
        let encoded = match target {
            Target::Param(index) => f64::from_bits(self.values[index].load(Ordering::Relaxed)),
            Target::Bypass => {
                if self.is_bypassed() {
                    1.0
                } else {
                    0.0
                }
            }
            Target::InputGain => f64::from_bits(self.input_gain_db.load(Ordering::Relaxed)),
            Target::OutputGain => f64::from_bits(self.output_gain_db.load(Ordering::Relaxed)),
        };
        Some(desc.decode(encoded))
    }

    /// Every parameter, including the reserved ones
    pub fn snapshot(&self) -> BTreeMap<String, ParamValue> {
        [BYPASS, INPUT_GAIN, OUTPUT_GAIN]
            .into_iter()
            .chain(self.kind.descriptors().iter().map(|d| d.name))
            .filter_map(|name| self.value(name).map(|v| (name.to_string(), v)))
            .collect()
    }

    /// Put every parameter back to its default
    pub fn reset(&self) {
        for (slot, desc) in self.values.iter().zip(self.kind.descriptors()) {
            slot.store(desc.default.to_bits(), Ordering::Relaxed);
        }
        self.version.fetch_add(1, Ordering::Release);
        self.bypass.store(false, Ordering::Relaxed);
        for (db, linear) in [
            (&self.input_gain_db, &self.input_gain),
            (&self.output_gain_db, &self.output_gain),
        ] {
            db.store(0.0_f64.to_bits(), Ordering::Relaxed);
            linear.store(1.0_f32.to_bits(), Ordering::Relaxed);
        }
    }

    /// Whether any band routes its detector to the external side-channel
    pub fn external_sidechain_enabled(&self) -> bool {
        self.kind
            .descriptors()
            .iter()
            .zip(self.values.iter())
            .any(|(d, v)| {
                d.name.ends_with(EXTERNAL_SIDECHAIN_SUFFIX)
                    && f64::from_bits(v.load(Ordering::Relaxed)) >= 0.5
            })
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass.load(Ordering::Relaxed)
    }

    pub fn set_bypass(&self, bypassed: bool) {
        self.bypass.store(bypassed, Ordering::Relaxed);
    }

    /// Whether the algorithm could be instantiated
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Last latency reported by the unit
    pub fn latency_samples(&self) -> u32 {
        self.latency_samples.load(Ordering::Relaxed)
    }

    pub fn latency_seconds(&self) -> f64 {
        let rate = self.sample_rate.load(Ordering::Relaxed);
        if rate == 0 {
            return 0.0;
        }
        self.latency_samples() as f64 / rate as f64
    }

    /// Enable or disable meter refresh in the processing context
    pub fn set_send_telemetry(&self, enabled: bool) {
        self.send_telemetry.store(enabled, Ordering::Relaxed);
    }

    pub fn send_telemetry(&self) -> bool {
        self.send_telemetry.load(Ordering::Relaxed)
    }

    /// Read the meters and re-arm the "meters ready" notice
    pub fn take_meters(&self) -> MeterSnapshot {
        self.meters_pending.store(false, Ordering::Release);
        let bands = self.kind.bands();
        MeterSnapshot {
            frequency_range_end: Meters::read(&self.meters.frequency, bands),
            envelope: Meters::read(&self.meters.envelope, bands),
            curve: Meters::read(&self.meters.curve, bands),
            reduction: Meters::read(&self.meters.reduction, bands),
            input_peak: [self.meters.peak_db(0), self.meters.peak_db(1)],
            output_peak: [self.meters.peak_db(2), self.meters.peak_db(3)],
        }
    }

    // Processing-context accessors

    pub(crate) fn encoded(&self, index: usize) -> f64 {
        self.values
            .get(index)
            .map(|v| f64::from_bits(v.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    pub(crate) fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    pub(crate) fn input_gain(&self) -> f32 {
        f32::from_bits(self.input_gain.load(Ordering::Relaxed))
    }

    pub(crate) fn output_gain(&self) -> f32 {
        f32::from_bits(self.output_gain.load(Ordering::Relaxed))
    }

    pub(crate) fn meters(&self) -> &Meters {
        &self.meters
    }

    /// Returns true the first time meters become ready since the last take
    pub(crate) fn mark_meters_ready(&self) -> bool {
        !self.meters_pending.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn store_latency(&self, samples: u32) {
        self.latency_samples.store(samples, Ordering::Relaxed);
    }

    pub(crate) fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::Relaxed);
    }

    /// Returns true if this is the first time the unit is marked unavailable
    pub(crate) fn mark_unavailable(&self) -> bool {
        self.available.store(false, Ordering::Relaxed);
        !self.unavailable_logged.swap(true, Ordering::Relaxed)
    }

    pub(crate) fn mark_available(&self) {
        self.available.store(true, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for UnitControls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitControls")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("bypass", &self.is_bypassed())
            .field("latency", &self.latency_samples())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let controls = UnitControls::new("multiband_gate#0").unwrap();
        assert_eq!(controls.value("gate-mode"), Some(ParamValue::Text("Classic".into())));
        assert_eq!(controls.value("dry"), Some(ParamValue::Text("-inf".into())));
        assert_eq!(controls.value("wet"), Some(ParamValue::Float(0.0)));
        assert_eq!(controls.value(BYPASS), Some(ParamValue::Bool(false)));
        assert!(!controls.external_sidechain_enabled());
    }

    #[test]
    fn test_unknown_parameter_leaves_state_intact() {
        let controls = UnitControls::new("multiband_gate#0").unwrap();
        controls.bind("wet", &ParamValue::Float(-6.0)).unwrap();
        let before = controls.snapshot();
        let version = controls.version();

        let err = controls.bind("knee", &ParamValue::Float(1.0)).unwrap_err();
        assert!(matches!(err, DspError::UnknownParameter { .. }));

        let err = controls.bind("stereo-split", &ParamValue::Float(1.0)).unwrap_err();
        assert!(matches!(err, DspError::TypeMismatch { .. }));

        assert_eq!(controls.snapshot(), before);
        assert_eq!(controls.version(), version);
    }

    #[test]
    fn test_bind_bumps_version() {
        let controls = UnitControls::new("limiter").unwrap();
        let version = controls.version();
        controls.bind("threshold", &ParamValue::Float(-6.0)).unwrap();
        assert_ne!(controls.version(), version);
        assert_eq!(controls.encoded(0), -6.0);
    }

    #[test]
    fn test_gains_are_linear_and_mute_exactly() {
        let controls = UnitControls::new("equalizer").unwrap();
        controls.bind(INPUT_GAIN, &ParamValue::Float(-6.0)).unwrap();
        assert!((controls.input_gain() - 0.501).abs() < 0.01);

        controls.bind(OUTPUT_GAIN, &"-inf".into()).unwrap();
        assert_eq!(controls.output_gain(), 0.0);
        assert_eq!(controls.value(OUTPUT_GAIN), Some(ParamValue::Text("-inf".into())));
    }

    #[test]
    fn test_external_sidechain_detection() {
        let controls = UnitControls::new("multiband_compressor#1").unwrap();
        controls
            .bind("band2-external-sidechain", &ParamValue::Bool(true))
            .unwrap();
        assert!(controls.external_sidechain_enabled());
        controls
            .bind("band2-external-sidechain", &ParamValue::Bool(false))
            .unwrap();
        assert!(!controls.external_sidechain_enabled());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let controls = UnitControls::new("multiband_gate").unwrap();
        let defaults = controls.snapshot();
        controls.bind("stereo-split", &ParamValue::Bool(true)).unwrap();
        controls.bind(BYPASS, &ParamValue::Bool(true)).unwrap();

        controls.reset();

        assert_eq!(controls.snapshot(), defaults);
    }

    #[test]
    fn test_meters_ready_is_edge_triggered() {
        let controls = UnitControls::new("multiband_gate").unwrap();
        assert!(controls.mark_meters_ready());
        assert!(!controls.mark_meters_ready());
        let snapshot = controls.take_meters();
        assert_eq!(snapshot.reduction.len(), 8);
        assert!(controls.mark_meters_ready());
    }

    #[test]
    fn test_unavailable_logged_once() {
        let controls = UnitControls::new("multiband_gate").unwrap();
        assert!(controls.mark_unavailable());
        assert!(!controls.mark_unavailable());
        assert!(!controls.is_available());
    }

    #[test]
    fn test_unique_ids() {
        let a = UnitControls::new("limiter").unwrap();
        let b = UnitControls::new("limiter").unwrap();
        assert_ne!(a.id(), b.id());
    }
}
