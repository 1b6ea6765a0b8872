//! Wren Platform - Audio Graph Mirror and Link Management
//!
//! This crate provides:
//! - A local mirror of the audio server's graph (endpoints, devices, links,
//!   routes, defaults) with typed change notifications
//! - The `GraphBackend` trait for creating and destroying links
//! - An offline backend, and a PipeWire backend behind the `pipewire` feature
//!
//! # Architecture
//!
//! Transports never call into the mirror directly. They send `GraphEvent`s
//! over a channel; the control context feeds them to `DeviceGraphMirror::on_event`.

mod error;
mod event;
mod graph;
mod mirror;
mod offline;
mod traits;

#[cfg(all(target_os = "linux", feature = "pipewire"))]
pub mod linux;

pub use error::PlatformError;
pub use event::{GraphEvent, GraphNotification, SubscriptionId};
pub use graph::GraphState;
pub use mirror::{compare_versions, DeviceGraphMirror, DEFAULT_MIN_SERVER_VERSION};
pub use offline::{OfflineBackend, RecordedLink};
pub use traits::{Availability, Device, Direction, Endpoint, GraphBackend, Link, LinkHandle};

use std::sync::Arc;

use crossbeam_channel::Sender;

/// Connect to the audio server for the current build
///
/// Graph changes are delivered on `events`. Without the `pipewire` feature the
/// offline backend is returned and no events are ever sent.
pub fn connect_backend(events: Sender<GraphEvent>) -> Result<Arc<dyn GraphBackend>, PlatformError> {
    #[cfg(all(target_os = "linux", feature = "pipewire"))]
    {
        Ok(Arc::new(linux::PipeWireBackend::new(events)?))
    }

    #[cfg(not(all(target_os = "linux", feature = "pipewire")))]
    {
        drop(events);
        tracing::info!("PipeWire support not built, using the offline backend");
        Ok(Arc::new(OfflineBackend::new()))
    }
}
