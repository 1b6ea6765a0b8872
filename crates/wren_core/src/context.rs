//! Engine Context
//!
//! State shared by every control-side component. Replaces the process-wide
//! "application is exiting" and "exclude monitor streams" flags with an
//! explicit value handed to whoever needs it.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct EngineContext {
    exiting: AtomicBool,
    exclude_monitor_streams: AtomicBool,
}

impl EngineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Once set, link rebuilds and autoloads are skipped
    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    /// Returns the previous value
    pub fn set_exiting(&self) -> bool {
        self.exiting.swap(true, Ordering::AcqRel)
    }

    /// Whether streams recording a monitor source are left out of processing
    pub fn excludes_monitor_streams(&self) -> bool {
        self.exclude_monitor_streams.load(Ordering::Acquire)
    }

    /// Returns the previous value
    pub fn set_exclude_monitor_streams(&self, exclude: bool) -> bool {
        self.exclude_monitor_streams.swap(exclude, Ordering::AcqRel)
    }
}
