//! DSP Unit Adapter
//!
//! Wraps one algorithm instance for the processing context. Construction and
//! `prepare()` happen in the control context (they may allocate or talk to the
//! plugin host); `process()` is real-time safe.

use std::sync::Arc;

use rtrb::Producer;
use tracing::{debug, warn};

use crate::algorithm::Algorithm;
use crate::controls::UnitControls;
use crate::host::{PluginHost, StereoIo};
use crate::notice::Notice;

/// One processing unit of a chain
pub struct DspUnit {
    controls: Arc<UnitControls>,
    host: Arc<dyn PluginHost>,
    algorithm: Option<Algorithm>,
    prepared_rate: Option<u32>,
    max_block: usize,
    synced_version: Option<u32>,
    last_latency: u32,
}

impl DspUnit {
    /// Create an unprepared unit
    ///
    /// Hosted units whose plugin is not installed are marked unavailable here
    /// and stay passthroughs.
    pub fn new(controls: Arc<UnitControls>, host: Arc<dyn PluginHost>) -> Self {
        // A unit rebuilt for surviving controls only reports real changes
        let controls_latency = controls.latency_samples();
        if let Some(uri) = controls.kind().plugin_uri() {
            if !host.is_installed(uri) {
                if controls.mark_unavailable() {
                    warn!(
                        "{} is not installed, unit '{}' will pass audio through",
                        uri,
                        controls.tag()
                    );
                }
            } else {
                controls.mark_available();
            }
        }

        Self {
            controls,
            host,
            algorithm: None,
            prepared_rate: None,
            max_block: 0,
            synced_version: None,
            last_latency: controls_latency,
        }
    }

    /// (Re)instantiate the algorithm for a sample rate
    ///
    /// Instantiates on the first call and whenever the rate or the maximum
    /// block size changes. A failed
    /// instantiation leaves the unit unavailable; it is logged, not returned.
    pub fn prepare(&mut self, sample_rate: u32, max_block: usize) {
        let block_changed = self.max_block != max_block;
        self.max_block = max_block;
        self.controls.set_sample_rate(sample_rate);

        if self.prepared_rate == Some(sample_rate) && !block_changed {
            return;
        }
        if self.prepared_rate.is_some_and(|rate| rate != sample_rate) {
            debug!(
                "Sample rate changed for '{}': {:?} -> {}",
                self.controls.tag(),
                self.prepared_rate,
                sample_rate
            );
        }
        self.prepared_rate = Some(sample_rate);

        if !self.controls.is_available() && self.controls.kind().plugin_uri().is_some() {
            return;
        }

        self.algorithm = Algorithm::instantiate(self.controls.kind(), &self.host, sample_rate, max_block);
        self.synced_version = None;

        match self.algorithm {
            Some(_) => self.controls.mark_available(),
            None => {
                if self.controls.mark_unavailable() {
                    warn!(
                        "Could not instantiate '{}', it will pass audio through",
                        self.controls.tag()
                    );
                }
            }
        }
    }

    pub fn controls(&self) -> &Arc<UnitControls> {
        &self.controls
    }

    pub fn tag(&self) -> &str {
        self.controls.tag()
    }

    /// Whether an algorithm instance is running
    pub fn is_available(&self) -> bool {
        self.algorithm.is_some()
    }

    /// Last latency reported by `process()`, in samples
    pub fn latency(&self) -> u32 {
        self.last_latency
    }

    /// Process one block
    ///
    /// All spans must have the same length. The input spans are scratch and
    /// receive the input gain in place.
    ///
    /// # Real-time Safety
    /// No allocations, no locks. Notices are pushed best-effort.
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        &mut self,
        in_left: &mut [f32],
        in_right: &mut [f32],
        out_left: &mut [f32],
        out_right: &mut [f32],
        probe_left: &[f32],
        probe_right: &[f32],
        notices: &mut Producer<Notice>,
    ) {
        let controls = &self.controls;

        let Some(algorithm) = self.algorithm.as_mut().filter(|_| !controls.is_bypassed()) else {
            out_left.copy_from_slice(in_left);
            out_right.copy_from_slice(in_right);
            self.report_latency(0, notices);
            return;
        };

        apply_gain(in_left, in_right, controls.input_gain());

        let telemetry = controls.send_telemetry();
        let input_peaks = if telemetry {
            [peak(in_left), peak(in_right)]
        } else {
            [0.0; 2]
        };

        let version = controls.version();
        if self.synced_version != Some(version) {
            algorithm.sync(controls);
            self.synced_version = Some(version);
        }

        algorithm.run(StereoIo {
            in_left,
            in_right,
            out_left: &mut *out_left,
            out_right: &mut *out_right,
            probe_left,
            probe_right,
        });

        apply_gain(out_left, out_right, controls.output_gain());

        let latency = algorithm.latency();
        if latency != self.last_latency {
            algorithm.latency_changed(controls);
        }

        if telemetry {
            algorithm.refresh_meters(controls.meters());
            controls
                .meters()
                .store_peaks(input_peaks, [peak(out_left), peak(out_right)]);
            if controls.mark_meters_ready() {
                let _ = notices.push(Notice::MetersReady { unit: controls.id() });
            }
        }
        self.report_latency(latency, notices);
    }

    fn report_latency(&mut self, latency: u32, notices: &mut Producer<Notice>) {
        if latency == self.last_latency {
            return;
        }
        self.last_latency = latency;
        self.controls.store_latency(latency);
        let _ = notices.push(Notice::LatencyChanged {
            unit: self.controls.id(),
            samples: latency,
        });
    }
}

#[inline]
fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |max, s| max.max(s.abs()))
}

#[inline]
fn apply_gain(left: &mut [f32], right: &mut [f32], gain: f32) {
    if gain == 1.0 {
        return;
    }
    for sample in left.iter_mut().chain(right.iter_mut()) {
        *sample *= gain;
    }
}
