//! Plugin Chain
//!
//! An ordered sequence of units for one signal direction, split in two halves:
//!
//! ```text
//! Control context                       Processing context
//! ───────────────                       ──────────────────
//! ChainHandle                           PluginChain
//!   ├── units (Arc<UnitControls>) ───►    reads atomics per block
//!   ├── updates ──────── rtrb ───────►    swaps in new unit lists
//!   ├── retired ◄─────── rtrb ────────    hands old lists back
//!   └── notices ◄─────── rtrb ────────    latency / meter notices
//! ```
//!
//! The processing half never allocates, locks, or frees: new unit lists are
//! built by the handle, and replaced lists are returned to the handle to be
//! dropped there. Units that survive a list change are not rebuilt; the new
//! list names their slot in the previous one and the processing half moves
//! them across when it swaps, keeping their filter state and latency.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, info, warn};

use crate::algorithm::UnitKind;
use crate::controls::UnitControls;
use crate::error::DspError;
use crate::host::PluginHost;
use crate::notice::{ChainNotice, Notice};
use crate::unit::DspUnit;

/// Default capacity of the notice queue
pub const DEFAULT_NOTICE_CAPACITY: usize = 64;

/// Unit-list updates that may be in flight at once
const UPDATE_CAPACITY: usize = 4;

/// Chain-wide state shared by both halves
#[derive(Debug, Default)]
pub struct ChainControls {
    bypass: AtomicBool,
    latency: AtomicU32,
    sample_rate: AtomicU32,
    max_block: AtomicU32,
}

impl ChainControls {
    pub fn is_bypassed(&self) -> bool {
        self.bypass.load(Ordering::Relaxed)
    }

    /// Total latency of the chain in samples
    pub fn latency(&self) -> u32 {
        self.latency.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn max_block(&self) -> usize {
        self.max_block.load(Ordering::Relaxed) as usize
    }
}

/// Preallocated ping-pong buffers
struct Scratch {
    a_left: Vec<f32>,
    a_right: Vec<f32>,
    b_left: Vec<f32>,
    b_right: Vec<f32>,
    silence: Vec<f32>,
}

impl Scratch {
    fn new(frames: usize) -> Self {
        Self {
            a_left: vec![0.0; frames],
            a_right: vec![0.0; frames],
            b_left: vec![0.0; frames],
            b_right: vec![0.0; frames],
            silence: vec![0.0; frames],
        }
    }
}

/// Everything the processing half owns, swapped as one piece
struct ChainState {
    /// Empty slots are filled from `carry` when the state is swapped in
    units: Vec<Option<DspUnit>>,
    /// Slot of each unit in the state this one replaces
    carry: Vec<Option<usize>>,
    scratch: Scratch,
    max_block: usize,
}

impl ChainState {
    fn empty() -> Self {
        Self {
            units: Vec::new(),
            carry: Vec::new(),
            scratch: Scratch::new(0),
            max_block: 0,
        }
    }
}

/// Create the two halves of a chain
pub fn plugin_chain(host: Arc<dyn PluginHost>, notice_capacity: usize) -> (PluginChain, ChainHandle) {
    let shared = Arc::new(ChainControls::default());
    let (update_tx, update_rx) = RingBuffer::new(UPDATE_CAPACITY);
    let (retired_tx, retired_rx) = RingBuffer::new(UPDATE_CAPACITY);
    let (notice_tx, notice_rx) = RingBuffer::new(notice_capacity.max(1));

    let chain = PluginChain {
        shared: Arc::clone(&shared),
        state: ChainState::empty(),
        updates: update_rx,
        retired: retired_tx,
        notices: notice_tx,
        reported_latency: 0,
    };

    let handle = ChainHandle {
        host,
        shared,
        units: Vec::new(),
        updates: update_tx,
        retired: retired_rx,
        notices: notice_rx,
        outstanding: 0,
        stale: false,
        published: Vec::new(),
        published_format: None,
    };

    (chain, handle)
}

/// Processing half of a chain
pub struct PluginChain {
    shared: Arc<ChainControls>,
    state: ChainState,
    updates: Consumer<ChainState>,
    retired: Producer<ChainState>,
    notices: Producer<Notice>,
    reported_latency: u32,
}

impl PluginChain {
    /// Run one block through every unit in order
    ///
    /// # Real-time Safety
    /// No allocations, no locks, no I/O.
    pub fn process_block(
        &mut self,
        in_left: &[f32],
        in_right: &[f32],
        out_left: &mut [f32],
        out_right: &mut [f32],
    ) {
        self.process_block_with_probe(in_left, in_right, out_left, out_right, &[], &[]);
    }

    /// Like [`process_block`](Self::process_block), with side-channel input
    ///
    /// Probe spans shorter than the block are replaced by silence.
    pub fn process_block_with_probe(
        &mut self,
        in_left: &[f32],
        in_right: &[f32],
        out_left: &mut [f32],
        out_right: &mut [f32],
        probe_left: &[f32],
        probe_right: &[f32],
    ) {
        self.apply_updates();

        let frames = in_left
            .len()
            .min(in_right.len())
            .min(out_left.len())
            .min(out_right.len());
        let (in_left, in_right) = (&in_left[..frames], &in_right[..frames]);
        let (out_left, out_right) = (&mut out_left[..frames], &mut out_right[..frames]);

        if self.shared.is_bypassed() {
            out_left.copy_from_slice(in_left);
            out_right.copy_from_slice(in_right);
            return;
        }

        let ChainState {
            units,
            scratch,
            max_block,
            ..
        } = &mut self.state;

        if units.is_empty() || frames > *max_block {
            out_left.copy_from_slice(in_left);
            out_right.copy_from_slice(in_right);
            if units.is_empty() {
                self.report_latency(0);
            }
            return;
        }

        scratch.a_left[..frames].copy_from_slice(in_left);
        scratch.a_right[..frames].copy_from_slice(in_right);

        let use_probe = probe_left.len() >= frames && probe_right.len() >= frames;

        for unit in units.iter_mut().flatten() {
            let (probe_l, probe_r) = if use_probe {
                (&probe_left[..frames], &probe_right[..frames])
            } else {
                (&scratch.silence[..frames], &scratch.silence[..frames])
            };
            unit.process(
                &mut scratch.a_left[..frames],
                &mut scratch.a_right[..frames],
                &mut scratch.b_left[..frames],
                &mut scratch.b_right[..frames],
                probe_l,
                probe_r,
                &mut self.notices,
            );
            std::mem::swap(&mut scratch.a_left, &mut scratch.b_left);
            std::mem::swap(&mut scratch.a_right, &mut scratch.b_right);
        }

        out_left.copy_from_slice(&scratch.a_left[..frames]);
        out_right.copy_from_slice(&scratch.a_right[..frames]);

        let total = units
            .iter()
            .flatten()
            .fold(0_u32, |sum, unit| sum.saturating_add(unit.latency()));
        self.report_latency(total);
    }

    /// Shared chain state
    pub fn controls(&self) -> &Arc<ChainControls> {
        &self.shared
    }

    /// Number of units currently installed in the processing half
    pub fn len(&self) -> usize {
        self.state.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.units.is_empty()
    }

    fn apply_updates(&mut self) {
        while let Ok(mut next) = self.updates.pop() {
            for (slot, from) in next.units.iter_mut().zip(next.carry.iter()) {
                if let (true, Some(index)) = (slot.is_none(), *from) {
                    *slot = self.state.units.get_mut(index).and_then(Option::take);
                }
            }
            let old = std::mem::replace(&mut self.state, next);
            // Never full: the handle caps in-flight updates at the queue capacity
            let _ = self.retired.push(old);
        }
    }

    fn report_latency(&mut self, total: u32) {
        if total == self.reported_latency {
            return;
        }
        self.reported_latency = total;
        self.shared.latency.store(total, Ordering::Relaxed);
        let _ = self.notices.push(Notice::ChainLatencyChanged { samples: total });
    }
}

/// Control half of a chain
pub struct ChainHandle {
    host: Arc<dyn PluginHost>,
    shared: Arc<ChainControls>,
    units: Vec<Arc<UnitControls>>,
    updates: Producer<ChainState>,
    retired: Consumer<ChainState>,
    notices: Consumer<Notice>,
    outstanding: usize,
    stale: bool,
    /// Tags of the last list handed to the processing half, by slot
    published: Vec<String>,
    /// Rate and block size that list was prepared for
    published_format: Option<(u32, usize)>,
}

impl ChainHandle {
    /// Set the stream format and rebuild the units for it
    pub fn prepare(&mut self, sample_rate: u32, max_block: usize) -> Result<(), DspError> {
        if sample_rate == 0 {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }

        self.shared.sample_rate.store(sample_rate, Ordering::Relaxed);
        self.shared
            .max_block
            .store(max_block.min(u32::MAX as usize) as u32, Ordering::Relaxed);
        debug!("Chain prepared: {} Hz, {} frames", sample_rate, max_block);
        self.publish()
    }

    /// Replace the ordered unit list
    ///
    /// Units whose tag survives keep their parameter state. The whole list is
    /// validated first; on error nothing changes.
    pub fn set_units<S: AsRef<str>>(&mut self, tags: &[S]) -> Result<(), DspError> {
        let mut seen = HashSet::new();
        for tag in tags {
            let tag = tag.as_ref();
            UnitKind::from_tag(tag)?;
            if !seen.insert(tag) {
                return Err(DspError::DuplicateUnit(tag.to_string()));
            }
        }

        let mut units = Vec::with_capacity(tags.len());
        for tag in tags {
            let tag = tag.as_ref();
            let controls = match self.unit(tag) {
                Some(existing) => Arc::clone(existing),
                None => Arc::new(UnitControls::new(tag)?),
            };
            units.push(controls);
        }
        self.units = units;

        info!("Chain units: [{}]", self.tags().join(", "));
        self.publish()
    }

    /// Build a fresh processing state and hand it to the processing half
    ///
    /// While the processing half is behind, the update is held back and
    /// sent by a later [`flush`](Self::flush).
    fn publish(&mut self) -> Result<(), DspError> {
        self.collect_retired();
        if self.outstanding >= UPDATE_CAPACITY {
            debug!("Chain update deferred, {} in flight", self.outstanding);
            self.stale = true;
            return Ok(());
        }

        let sample_rate = self.shared.sample_rate();
        let max_block = self.shared.max_block();
        // A format change needs fresh instances; otherwise survivors move over
        let reuse = self.published_format == Some((sample_rate, max_block));

        let mut units = Vec::with_capacity(self.units.len());
        let mut carry = Vec::with_capacity(self.units.len());
        for controls in &self.units {
            let previous = reuse
                .then(|| self.published.iter().position(|tag| tag == controls.tag()))
                .flatten();
            match previous {
                Some(index) => {
                    units.push(None);
                    carry.push(Some(index));
                }
                None => {
                    let mut unit = DspUnit::new(Arc::clone(controls), Arc::clone(&self.host));
                    if sample_rate > 0 {
                        unit.prepare(sample_rate, max_block);
                    }
                    units.push(Some(unit));
                    carry.push(None);
                }
            }
        }
        let built = units.iter().filter(|unit| unit.is_some()).count();

        let state = ChainState {
            units,
            carry,
            scratch: Scratch::new(max_block),
            max_block,
        };
        self.updates
            .push(state)
            .map_err(|_| DspError::UpdatePending)?;
        self.outstanding += 1;
        self.stale = false;
        self.published = self.tags();
        self.published_format = Some((sample_rate, max_block));
        debug!(
            "Chain update sent: {} units, {} instantiated",
            self.units.len(),
            built
        );
        Ok(())
    }

    /// Send a held-back update if the processing half has caught up
    ///
    /// Returns true when nothing is left pending.
    pub fn flush(&mut self) -> Result<bool, DspError> {
        if self.stale {
            self.publish()?;
        } else {
            self.collect_retired();
        }
        Ok(!self.stale)
    }

    /// True while the processing half runs an older unit list
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Drop unit lists the processing half has let go of
    pub fn collect_retired(&mut self) {
        while let Ok(state) = self.retired.pop() {
            self.outstanding = self.outstanding.saturating_sub(1);
            drop(state);
        }
    }

    pub fn unit(&self, tag: &str) -> Option<&Arc<UnitControls>> {
        self.units.iter().find(|u| u.tag() == tag)
    }

    pub fn units(&self) -> &[Arc<UnitControls>] {
        &self.units
    }

    pub fn tags(&self) -> Vec<String> {
        self.units.iter().map(|u| u.tag().to_string()).collect()
    }

    pub fn set_bypass(&self, bypassed: bool) {
        self.shared.bypass.store(bypassed, Ordering::Relaxed);
    }

    pub fn is_bypassed(&self) -> bool {
        self.shared.is_bypassed()
    }

    /// Total latency in samples, as last reported by the processing half
    pub fn latency(&self) -> u32 {
        self.shared.latency()
    }

    pub fn latency_seconds(&self) -> f64 {
        samples_to_seconds(self.shared.latency(), self.shared.sample_rate())
    }

    pub fn controls(&self) -> &Arc<ChainControls> {
        &self.shared
    }

    /// Drain and resolve pending notices
    ///
    /// Notices for units that have since been removed are discarded.
    pub fn drain_notices(&mut self) -> Vec<ChainNotice> {
        if let Err(e) = self.flush() {
            warn!("Chain update failed: {}", e);
        }

        let rate = self.shared.sample_rate();
        let mut resolved = Vec::new();
        while let Ok(notice) = self.notices.pop() {
            match notice {
                Notice::LatencyChanged { unit, samples } => {
                    if let Some(controls) = self.units.iter().find(|u| u.id() == unit) {
                        resolved.push(ChainNotice::LatencyChanged {
                            tag: controls.tag().to_string(),
                            samples,
                            seconds: samples_to_seconds(samples, rate),
                        });
                    }
                }
                Notice::ChainLatencyChanged { samples } => {
                    resolved.push(ChainNotice::ChainLatencyChanged {
                        samples,
                        seconds: samples_to_seconds(samples, rate),
                    });
                }
                Notice::MetersReady { unit } => {
                    if let Some(controls) = self.units.iter().find(|u| u.id() == unit) {
                        resolved.push(ChainNotice::Meters {
                            tag: controls.tag().to_string(),
                            meters: controls.take_meters(),
                        });
                    }
                }
            }
        }
        resolved
    }
}

fn samples_to_seconds(samples: u32, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        0.0
    } else {
        samples as f64 / sample_rate as f64
    }
}
