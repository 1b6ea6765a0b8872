//! Algorithm Families
//!
//! The set of unit families is closed. Built-in families run in-crate; hosted
//! families are instantiated through a [`PluginHost`] by URI. Every family
//! exposes the same capability surface to the unit adapter: sync parameters,
//! run a block, report latency, fill meters.

use std::sync::Arc;

use crate::controls::{Meters, UnitControls, MAX_BANDS};
use crate::eq::Equalizer;
use crate::error::DspError;
use crate::host::{PluginHost, PluginInstance, StereoIo};
use crate::limiter::Limiter;
use crate::param::{db_to_linear, ParamDescriptor, ParamKind};

const MULTIBAND_MODES: &[&str] = &["Classic", "Modern", "Linear Phase"];
const ENVELOPE_BOOSTS: &[&str] = &["None", "Pink BT", "Pink MT", "Brown BT", "Brown MT"];

const MIX_DB: ParamKind = ParamKind::Decibel {
    min: -80.0,
    max: 20.0,
    allow_mute: true,
};
const BAND_GAIN_DB: ParamKind = ParamKind::Decibel {
    min: -24.0,
    max: 24.0,
    allow_mute: false,
};

macro_rules! eq_band {
    ($n:literal) => {
        ParamDescriptor::new(concat!("band", $n, "-gain"), "", BAND_GAIN_DB, 0.0)
    };
}

macro_rules! band_enable {
    ($n:literal, $on:literal) => {
        ParamDescriptor::new(
            concat!("band", $n, "-enable"),
            concat!("cbe_", $n),
            ParamKind::Bool,
            $on,
        )
    };
}

macro_rules! band_sidechain {
    ($n:literal) => {
        ParamDescriptor::new(
            concat!("band", $n, "-external-sidechain"),
            concat!("sce_", $n),
            ParamKind::Bool,
            0.0,
        )
    };
}

macro_rules! multiband_params {
    ($mode:literal) => {
        [
            ParamDescriptor::new($mode, "mode", ParamKind::Enum(MULTIBAND_MODES), 0.0),
            ParamDescriptor::new("envelope-boost", "envb", ParamKind::Enum(ENVELOPE_BOOSTS), 0.0),
            ParamDescriptor::new("stereo-split", "ssplit", ParamKind::Bool, 0.0),
            ParamDescriptor::new("dry", "g_dry", MIX_DB, f64::NEG_INFINITY),
            ParamDescriptor::new("wet", "g_wet", MIX_DB, 0.0),
            band_enable!(0, 1.0),
            band_enable!(1, 1.0),
            band_enable!(2, 0.0),
            band_enable!(3, 0.0),
            band_enable!(4, 0.0),
            band_enable!(5, 0.0),
            band_enable!(6, 0.0),
            band_enable!(7, 0.0),
            band_sidechain!(0),
            band_sidechain!(1),
            band_sidechain!(2),
            band_sidechain!(3),
            band_sidechain!(4),
            band_sidechain!(5),
            band_sidechain!(6),
            band_sidechain!(7),
        ]
    };
}

static EQUALIZER_PARAMS: [ParamDescriptor; 10] = [
    eq_band!(0),
    eq_band!(1),
    eq_band!(2),
    eq_band!(3),
    eq_band!(4),
    eq_band!(5),
    eq_band!(6),
    eq_band!(7),
    eq_band!(8),
    eq_band!(9),
];

static LIMITER_PARAMS: [ParamDescriptor; 1] = [ParamDescriptor::new(
    "threshold",
    "",
    ParamKind::Decibel {
        min: -24.0,
        max: 0.0,
        allow_mute: false,
    },
    -3.0,
)];

static GATE_PARAMS: [ParamDescriptor; 21] = multiband_params!("gate-mode");
static COMPRESSOR_PARAMS: [ParamDescriptor; 21] = multiband_params!("compressor-mode");

/// Suffix shared by the per-band side-channel switches
pub const EXTERNAL_SIDECHAIN_SUFFIX: &str = "-external-sidechain";

/// Closed set of unit families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Equalizer,
    Limiter,
    MultibandGate,
    MultibandCompressor,
}

impl UnitKind {
    pub const ALL: [UnitKind; 4] = [
        UnitKind::Equalizer,
        UnitKind::Limiter,
        UnitKind::MultibandGate,
        UnitKind::MultibandCompressor,
    ];

    /// Family name as used in unit tags
    pub fn family(&self) -> &'static str {
        match self {
            UnitKind::Equalizer => "equalizer",
            UnitKind::Limiter => "limiter",
            UnitKind::MultibandGate => "multiband_gate",
            UnitKind::MultibandCompressor => "multiband_compressor",
        }
    }

    /// Resolve a unit tag (`family` or `family#n`) to its family
    pub fn from_tag(tag: &str) -> Result<Self, DspError> {
        let family = match tag.split_once('#') {
            Some((family, index)) if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) => {
                family
            }
            Some(_) => return Err(DspError::UnknownUnit(tag.to_string())),
            None => tag,
        };

        Self::ALL
            .into_iter()
            .find(|kind| kind.family() == family)
            .ok_or_else(|| DspError::UnknownUnit(tag.to_string()))
    }

    /// Plugin URI for hosted families
    pub fn plugin_uri(&self) -> Option<&'static str> {
        match self {
            UnitKind::Equalizer | UnitKind::Limiter => None,
            UnitKind::MultibandGate => Some("http://lsp-plug.in/plugins/lv2/sc_mb_gate_stereo"),
            UnitKind::MultibandCompressor => {
                Some("http://lsp-plug.in/plugins/lv2/sc_mb_compressor_stereo")
            }
        }
    }

    pub fn descriptors(&self) -> &'static [ParamDescriptor] {
        match self {
            UnitKind::Equalizer => &EQUALIZER_PARAMS,
            UnitKind::Limiter => &LIMITER_PARAMS,
            UnitKind::MultibandGate => &GATE_PARAMS,
            UnitKind::MultibandCompressor => &COMPRESSOR_PARAMS,
        }
    }

    /// Number of metered sub-bands
    pub fn bands(&self) -> usize {
        match self {
            UnitKind::MultibandGate | UnitKind::MultibandCompressor => MAX_BANDS,
            UnitKind::Equalizer | UnitKind::Limiter => 0,
        }
    }

    pub fn supports_sidechain(&self) -> bool {
        self.descriptors()
            .iter()
            .any(|d| d.name.ends_with(EXTERNAL_SIDECHAIN_SUFFIX))
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.family())
    }
}

/// Port indices resolved once at instantiation
struct MeterPorts {
    frequency: [Option<usize>; MAX_BANDS],
    envelope: [(Option<usize>, Option<usize>); MAX_BANDS],
    curve: [(Option<usize>, Option<usize>); MAX_BANDS],
    reduction: [(Option<usize>, Option<usize>); MAX_BANDS],
}

impl MeterPorts {
    fn resolve(instance: &dyn PluginInstance) -> Self {
        let pair = |prefix: &str, n: usize| {
            (
                instance.port_index(&format!("{}_{}l", prefix, n)),
                instance.port_index(&format!("{}_{}r", prefix, n)),
            )
        };
        Self {
            frequency: core::array::from_fn(|n| instance.port_index(&format!("fre_{}", n))),
            envelope: core::array::from_fn(|n| pair("elm", n)),
            curve: core::array::from_fn(|n| pair("clm", n)),
            reduction: core::array::from_fn(|n| pair("rlm", n)),
        }
    }
}

/// A unit algorithm hosted through the plugin seam
pub(crate) struct Hosted {
    instance: Box<dyn PluginInstance>,
    kind: UnitKind,
    /// Control port per descriptor, same order as `kind.descriptors()`
    ports: Vec<Option<usize>>,
    latency_port: Option<usize>,
    meters: MeterPorts,
}

impl Hosted {
    fn new(kind: UnitKind, mut instance: Box<dyn PluginInstance>, max_block: usize) -> Self {
        instance.set_max_block_size(max_block);
        let ports = kind
            .descriptors()
            .iter()
            .map(|d| instance.port_index(d.port))
            .collect();
        let latency_port = instance.port_index("out_latency");
        let meters = MeterPorts::resolve(instance.as_ref());

        Self {
            instance,
            kind,
            ports,
            latency_port,
            meters,
        }
    }

    fn average(&self, pair: (Option<usize>, Option<usize>)) -> f32 {
        let read = |port: Option<usize>| port.map(|p| self.instance.control(p)).unwrap_or(0.0);
        0.5 * (read(pair.0) + read(pair.1))
    }
}

/// Instantiated algorithm of a unit
pub(crate) enum Algorithm {
    Equalizer(Box<Equalizer>),
    Limiter(Limiter),
    Hosted(Hosted),
}

impl Algorithm {
    /// Create the algorithm for a family
    ///
    /// Returns `None` when a hosted plugin cannot be instantiated.
    pub(crate) fn instantiate(
        kind: UnitKind,
        host: &Arc<dyn PluginHost>,
        sample_rate: u32,
        max_block: usize,
    ) -> Option<Self> {
        match kind {
            UnitKind::Equalizer => Some(Algorithm::Equalizer(Box::new(Equalizer::new(
                sample_rate as f32,
            )))),
            UnitKind::Limiter => Some(Algorithm::Limiter(Limiter::default())),
            UnitKind::MultibandGate | UnitKind::MultibandCompressor => {
                let uri = kind.plugin_uri()?;
                let instance = host.instantiate(uri, sample_rate)?;
                Some(Algorithm::Hosted(Hosted::new(kind, instance, max_block)))
            }
        }
    }

    /// Push the current parameter values into the algorithm
    ///
    /// # Real-time Safety
    /// Reads atomics only; no allocation.
    pub(crate) fn sync(&mut self, controls: &UnitControls) {
        match self {
            Algorithm::Equalizer(eq) => {
                for band in 0..EQUALIZER_PARAMS.len() {
                    eq.set_band_gain(band, controls.encoded(band) as f32);
                }
            }
            Algorithm::Limiter(limiter) => limiter.set_threshold_db(controls.encoded(0) as f32),
            Algorithm::Hosted(hosted) => {
                for (index, desc) in hosted.kind.descriptors().iter().enumerate() {
                    let Some(port) = hosted.ports[index] else {
                        continue;
                    };
                    let encoded = controls.encoded(index);
                    let value = match desc.kind {
                        ParamKind::Decibel { .. } => db_to_linear(encoded),
                        _ => encoded as f32,
                    };
                    hosted.instance.set_control(port, value);
                }
            }
        }
    }

    pub(crate) fn run(&mut self, io: StereoIo<'_>) {
        match self {
            Algorithm::Equalizer(eq) => {
                io.out_left.copy_from_slice(io.in_left);
                io.out_right.copy_from_slice(io.in_right);
                eq.process_planar(io.out_left, io.out_right);
            }
            Algorithm::Limiter(limiter) => {
                io.out_left.copy_from_slice(io.in_left);
                io.out_right.copy_from_slice(io.in_right);
                limiter.process_planar(io.out_left, io.out_right);
            }
            Algorithm::Hosted(hosted) => hosted.instance.run(io),
        }
    }

    /// Latency introduced by the algorithm, in samples
    pub(crate) fn latency(&self) -> u32 {
        match self {
            Algorithm::Equalizer(_) | Algorithm::Limiter(_) => 0,
            Algorithm::Hosted(hosted) => hosted
                .latency_port
                .map(|port| hosted.instance.control(port).max(0.0) as u32)
                .unwrap_or(0),
        }
    }

    /// Recompute state that depends on the reported latency
    ///
    /// Hosted plugins derive their band filters from the control inputs, so
    /// every control is written again.
    pub(crate) fn latency_changed(&mut self, controls: &UnitControls) {
        if let Algorithm::Hosted(_) = self {
            self.sync(controls);
        }
    }

    pub(crate) fn refresh_meters(&self, meters: &Meters) {
        let Algorithm::Hosted(hosted) = self else {
            return;
        };

        for band in 0..hosted.kind.bands() {
            let frequency = hosted.meters.frequency[band]
                .map(|p| hosted.instance.control(p))
                .unwrap_or(0.0);
            meters.store(
                band,
                frequency,
                hosted.average(hosted.meters.envelope[band]),
                hosted.average(hosted.meters.curve[band]),
                hosted.average(hosted.meters.reduction[band]),
            );
        }
    }
}
