//! Device Graph Mirror
//!
//! Keeps a local snapshot of the external audio graph and re-emits typed
//! notifications once the snapshot reflects each change.
//!
//! ```text
//! Transport thread          Control context
//! ────────────────          ───────────────
//! GraphEvent ── channel ──► on_event() ─► tables (RwLock)
//!                                     └─► listeners (lock released first)
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver};
use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::event::{GraphEvent, GraphNotification, SubscriptionId};
use crate::graph::GraphState;
use crate::traits::Endpoint;

/// Oldest audio server version known to work
pub const DEFAULT_MIN_SERVER_VERSION: &str = "0.3.58";

type Listener = Arc<dyn Fn(&GraphNotification) + Send + Sync>;

pub struct DeviceGraphMirror {
    state: RwLock<GraphState>,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
    desync_count: AtomicU64,
    min_server_version: String,
}

impl Default for DeviceGraphMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceGraphMirror {
    pub fn new() -> Self {
        Self::with_min_server_version(DEFAULT_MIN_SERVER_VERSION)
    }

    pub fn with_min_server_version(version: &str) -> Self {
        Self {
            state: RwLock::new(GraphState::new()),
            listeners: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            desync_count: AtomicU64::new(0),
            min_server_version: version.to_string(),
        }
    }

    /// Apply one topology change and notify subscribers
    ///
    /// Subscribers run after the table lock is released and may query the
    /// mirror from inside their callback.
    pub fn on_event(&self, event: GraphEvent) {
        if let Some(notification) = self.apply(event) {
            self.dispatch(&notification);
        }
    }

    fn apply(&self, event: GraphEvent) -> Option<GraphNotification> {
        let mut state = self.state.write();

        match event {
            GraphEvent::EndpointAdded(endpoint) => {
                debug!(
                    "Endpoint added: {} (id={}, {})",
                    endpoint.name, endpoint.id, endpoint.direction
                );
                state.endpoints.insert(endpoint.id, endpoint.clone());
                Some(GraphNotification::EndpointAdded(endpoint))
            }

            GraphEvent::EndpointRemoved(id) => match state.endpoints.remove(&id) {
                Some(endpoint) => {
                    debug!("Endpoint removed: {} (id={})", endpoint.name, id);
                    Some(GraphNotification::EndpointRemoved(endpoint))
                }
                None => {
                    self.desync(format_args!("removal of unknown endpoint {}", id));
                    None
                }
            },

            GraphEvent::EndpointRouteChanged {
                endpoint_id,
                direction,
                route,
                availability,
            } => {
                let Some(device_id) = state.endpoints.get(&endpoint_id).map(|e| e.device_id) else {
                    self.desync(format_args!("route change for unknown endpoint {}", endpoint_id));
                    return None;
                };

                // Routes belong to the device: every endpoint of it follows
                for endpoint in state.endpoints.values_mut() {
                    let sibling = device_id.is_some() && endpoint.device_id == device_id;
                    if endpoint.direction == direction && (endpoint.id == endpoint_id || sibling) {
                        endpoint.route = route.clone();
                        endpoint.availability = availability;
                    }
                }
                if let Some(device) = device_id.and_then(|id| state.devices.get_mut(&id)) {
                    device.set_route(direction, &route, availability);
                }

                debug!(
                    "Route changed on endpoint {} ({}): '{}' {:?}",
                    endpoint_id, direction, route, availability
                );
                Some(GraphNotification::EndpointRouteChanged {
                    endpoint_id,
                    device_id,
                    direction,
                    route,
                    availability,
                })
            }

            GraphEvent::DefaultEndpointChanged { direction, name } => {
                if !state.set_default_endpoint(direction, &name) {
                    return None;
                }
                info!("Default {} endpoint: {}", direction, name);
                Some(GraphNotification::DefaultEndpointChanged { direction, name })
            }

            GraphEvent::DeviceAdded(device) => {
                debug!("Device added: {} (id={})", device.name, device.id);
                state.devices.insert(device.id, device.clone());
                Some(GraphNotification::DeviceAdded(device))
            }

            GraphEvent::DeviceRemoved(id) => match state.devices.remove(&id) {
                Some(device) => {
                    debug!("Device removed: {} (id={})", device.name, id);
                    Some(GraphNotification::DeviceRemoved(device))
                }
                None => {
                    self.desync(format_args!("removal of unknown device {}", id));
                    None
                }
            },

            GraphEvent::LinkAdded(link) => {
                state.links.insert(link.id, link);
                None
            }

            GraphEvent::LinkRemoved(id) => {
                if state.links.remove(&id).is_none() {
                    self.desync(format_args!("removal of unknown link {}", id));
                }
                None
            }

            GraphEvent::ServerInfo { version } => {
                match compare_versions(&version, &self.min_server_version) {
                    Some(CmpOrdering::Less) => self.desync(format_args!(
                        "server version {} is lower than {} minimum supported",
                        version, self.min_server_version
                    )),
                    Some(_) => debug!("Audio server version {}", version),
                    None => debug!(
                        "Cannot check server version '{}' against the minimum supported",
                        version
                    ),
                }
                state.server_version = Some(version);
                None
            }
        }
    }

    fn dispatch(&self, notification: &GraphNotification) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(notification);
        }
    }

    fn desync(&self, what: std::fmt::Arguments<'_>) {
        self.desync_count.fetch_add(1, Ordering::Relaxed);
        warn!("Graph desync: {}", what);
    }

    /// Register a callback for every notification
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&GraphNotification) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Receive notifications on a channel, for consumers on other threads
    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<GraphNotification>) {
        let (tx, rx) = unbounded();
        let id = self.subscribe(move |notification| {
            let _ = tx.send(notification.clone());
        });
        (id, rx)
    }

    /// Returns false if the subscription was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Read access to the tables
    ///
    /// Do not hold the guard across a call that feeds events to the mirror.
    pub fn state(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read()
    }

    /// Lowest-id endpoint with this name
    pub fn find_endpoint_by_name(&self, name: &str) -> Option<Endpoint> {
        self.state.read().find_endpoint_by_name(name).cloned()
    }

    /// Number of inconsistencies seen so far
    pub fn desync_count(&self) -> u64 {
        self.desync_count.load(Ordering::Relaxed)
    }
}

/// Compare dotted numeric versions ("0.3.58" vs "1.0")
///
/// Missing components count as zero. Returns `None` if either side has a
/// non-numeric component.
pub fn compare_versions(a: &str, b: &str) -> Option<CmpOrdering> {
    let parse = |v: &str| -> Option<Vec<u64>> {
        v.trim().split('.').map(|part| part.parse().ok()).collect()
    };
    let (a, b) = (parse(a)?, parse(b)?);

    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            CmpOrdering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(CmpOrdering::Equal)
}
