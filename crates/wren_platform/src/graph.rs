//! Graph Snapshot
//!
//! Local copy of the external graph. Tables are ordered by id so that name
//! lookups are deterministic: the first match is always the lowest id.

use std::collections::BTreeMap;

use crate::traits::{Device, Direction, Endpoint, Link};

#[derive(Debug, Clone, Default)]
pub struct GraphState {
    pub endpoints: BTreeMap<u32, Endpoint>,
    pub devices: BTreeMap<u32, Device>,
    pub links: BTreeMap<u32, Link>,

    /// Name of the default sink
    pub default_output: String,

    /// Name of the default source
    pub default_input: String,

    /// Audio server version, once reported
    pub server_version: Option<String>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self, id: u32) -> Option<&Endpoint> {
        self.endpoints.get(&id)
    }

    pub fn device(&self, id: u32) -> Option<&Device> {
        self.devices.get(&id)
    }

    /// Lowest-id endpoint with this name
    pub fn find_endpoint_by_name(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.values().find(|e| e.name == name)
    }

    /// Lowest-id endpoint with this name and direction
    pub fn find_endpoint(&self, direction: Direction, name: &str) -> Option<&Endpoint> {
        self.endpoints
            .values()
            .find(|e| e.direction == direction && e.name == name)
    }

    /// Endpoints of a device for one direction, in id order
    pub fn endpoints_for_device(
        &self,
        device_id: u32,
        direction: Direction,
    ) -> impl Iterator<Item = &Endpoint> {
        self.endpoints
            .values()
            .filter(move |e| e.device_id == Some(device_id) && e.direction == direction)
    }

    /// Lowest-id device whose bus path or bus id appears in `name`
    pub fn find_device_for_name(&self, name: &str) -> Option<&Device> {
        self.devices.values().find(|d| d.matches_name(name))
    }

    pub fn default_endpoint(&self, direction: Direction) -> &str {
        match direction {
            Direction::Output => &self.default_output,
            Direction::Input => &self.default_input,
        }
    }

    pub(crate) fn set_default_endpoint(&mut self, direction: Direction, name: &str) -> bool {
        let slot = match direction {
            Direction::Output => &mut self.default_output,
            Direction::Input => &mut self.default_input,
        };
        if slot == name {
            return false;
        }
        *slot = name.to_string();
        true
    }
}
