//! Offline Backend
//!
//! A graph backend that talks to no server. Links are recorded in memory so
//! the engine can run (and be tested) without PipeWire.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::PlatformError;
use crate::traits::{GraphBackend, LinkHandle};

/// A link recorded by [`OfflineBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedLink {
    pub output_node: u32,
    pub input_node: u32,
    pub probe: bool,
}

/// Channels linked per `link_nodes` call
const CHANNELS: u32 = 2;

#[derive(Debug, Default)]
pub struct OfflineBackend {
    links: Mutex<BTreeMap<LinkHandle, RecordedLink>>,
    next_handle: AtomicU32,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    fail_links: AtomicBool,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `link_nodes` calls fail
    pub fn set_fail_links(&self, fail: bool) {
        self.fail_links.store(fail, Ordering::Relaxed);
    }

    /// Links currently alive, in creation order
    pub fn links(&self) -> Vec<RecordedLink> {
        self.links.lock().values().copied().collect()
    }

    /// Total links ever created
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Total links ever destroyed
    pub fn destroyed_count(&self) -> usize {
        self.destroyed.load(Ordering::Relaxed)
    }
}

impl GraphBackend for OfflineBackend {
    fn name(&self) -> &'static str {
        "Offline"
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn link_nodes(
        &self,
        output_node: u32,
        input_node: u32,
        probe: bool,
    ) -> Result<Vec<LinkHandle>, PlatformError> {
        if self.fail_links.load(Ordering::Relaxed) {
            return Err(PlatformError::LinkCreationFailed(format!(
                "{} -> {}",
                output_node, input_node
            )));
        }

        let record = RecordedLink {
            output_node,
            input_node,
            probe,
        };
        let mut links = self.links.lock();
        let handles: Vec<LinkHandle> = (0..CHANNELS)
            .map(|_| LinkHandle(self.next_handle.fetch_add(1, Ordering::Relaxed)))
            .collect();
        for handle in &handles {
            links.insert(*handle, record);
        }
        self.created.fetch_add(handles.len(), Ordering::Relaxed);
        Ok(handles)
    }

    fn destroy_links(&self, handles: &[LinkHandle]) -> Result<(), PlatformError> {
        let mut links = self.links.lock();
        for handle in handles {
            if links.remove(handle).is_some() {
                self.destroyed.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_backend_records_links() {
        let backend = OfflineBackend::new();
        assert_eq!(backend.name(), "Offline");
        assert!(!backend.is_connected());

        let handles = backend.link_nodes(3, 8, true).unwrap();
        assert_eq!(handles.len(), 2);
        assert_eq!(backend.created_count(), 2);
        assert!(backend.links().iter().all(|l| l.probe && l.output_node == 3));

        backend.destroy_links(&handles).unwrap();
        backend.destroy_links(&handles).unwrap();
        assert_eq!(backend.destroyed_count(), 2);
        assert!(backend.links().is_empty());
    }

    #[test]
    fn test_offline_backend_failure_mode() {
        let backend = OfflineBackend::new();
        backend.set_fail_links(true);
        assert!(matches!(
            backend.link_nodes(1, 2, false),
            Err(PlatformError::LinkCreationFailed(_))
        ));
        assert_eq!(backend.created_count(), 0);
    }
}
