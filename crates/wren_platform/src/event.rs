//! Graph Events
//!
//! `GraphEvent` is what a transport reports; `GraphNotification` is what the
//! mirror re-emits after its tables are updated.

use serde::{Deserialize, Serialize};

use crate::traits::{Availability, Device, Direction, Endpoint, Link};

/// Topology change reported by the audio server transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphEvent {
    /// A sink or source appeared (re-sending an id updates it)
    EndpointAdded(Endpoint),

    EndpointRemoved(u32),

    /// The active route of the endpoint's device changed
    EndpointRouteChanged {
        endpoint_id: u32,
        direction: Direction,
        route: String,
        availability: Availability,
    },

    DefaultEndpointChanged {
        direction: Direction,
        name: String,
    },

    DeviceAdded(Device),
    DeviceRemoved(u32),
    LinkAdded(Link),
    LinkRemoved(u32),

    ServerInfo {
        version: String,
    },
}

/// Change notification delivered to mirror subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphNotification {
    EndpointAdded(Endpoint),
    EndpointRemoved(Endpoint),
    EndpointRouteChanged {
        endpoint_id: u32,
        device_id: Option<u32>,
        direction: Direction,
        route: String,
        availability: Availability,
    },
    DefaultEndpointChanged {
        direction: Direction,
        name: String,
    },
    DeviceAdded(Device),
    DeviceRemoved(Device),
}

/// Handle returned by a mirror subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);
