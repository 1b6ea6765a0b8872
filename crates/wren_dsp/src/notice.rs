//! Processing Notices
//!
//! Things the processing context wants the control context to know about.
//! They travel through a bounded SPSC queue; when the queue is full the
//! notice is dropped.

use crate::controls::{MeterSnapshot, UnitId};

/// Raw notice as pushed from the processing context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// A unit's reported latency changed
    LatencyChanged { unit: UnitId, samples: u32 },

    /// The sum of all unit latencies changed
    ChainLatencyChanged { samples: u32 },

    /// Fresh meter values are available for a unit
    MetersReady { unit: UnitId },
}

/// Notice resolved on the control side
#[derive(Debug, Clone, PartialEq)]
pub enum ChainNotice {
    LatencyChanged {
        tag: String,
        samples: u32,
        seconds: f64,
    },
    ChainLatencyChanged {
        samples: u32,
        seconds: f64,
    },
    Meters {
        tag: String,
        meters: MeterSnapshot,
    },
}
