//! Graph Data Model and Backend Trait
//!
//! Types mirrored from the audio server and the interface used to create and
//! destroy links in it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// Signal direction of an endpoint or a processing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Playback sinks (speakers, headphones)
    Output,
    /// Capture sources (microphones)
    Input,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Output, Direction::Input];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Output => "output",
            Direction::Input => "input",
        }
    }

    /// Map a media class ("Audio/Sink", "Audio/Source") to a direction
    pub fn from_media_class(class: &str) -> Option<Self> {
        match class {
            "Audio/Sink" => Some(Direction::Output),
            "Audio/Source" => Some(Direction::Input),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "output" => Ok(Direction::Output),
            "input" => Ok(Direction::Input),
            other => Err(PlatformError::Internal(format!("Unknown direction: {}", other))),
        }
    }
}

/// Availability of a device route (e.g. headphones plugged in)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    #[default]
    Unknown,
    Unavailable,
    Available,
}

/// An audio endpoint (sink or source node) in the external graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Server-assigned id, stable for the endpoint's lifetime
    pub id: u32,

    /// Node name (e.g. "alsa_output.pci-0000_00_1f.3.analog-stereo")
    pub name: String,

    /// Human-readable description
    pub description: String,

    pub direction: Direction,

    /// Owning device, if any
    pub device_id: Option<u32>,

    /// Current route name ("headphones", "speaker"); empty when unknown
    pub route: String,

    pub availability: Availability,
}

/// A hardware or virtual device owning one or more endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: u32,
    pub name: String,

    /// Bus path ("pci-0000:00:1f.3"); empty when not reported
    pub bus_path: String,

    /// Bus id ("usb-Focusrite_Scarlett"); empty when not reported
    pub bus_id: String,

    pub output_route: String,
    pub output_availability: Availability,
    pub input_route: String,
    pub input_availability: Availability,
}

impl Device {
    /// Current route and its availability for a direction
    pub fn route(&self, direction: Direction) -> (&str, Availability) {
        match direction {
            Direction::Output => (self.output_route.as_str(), self.output_availability),
            Direction::Input => (self.input_route.as_str(), self.input_availability),
        }
    }

    pub fn set_route(&mut self, direction: Direction, route: &str, availability: Availability) {
        match direction {
            Direction::Output => {
                self.output_route = route.to_string();
                self.output_availability = availability;
            }
            Direction::Input => {
                self.input_route = route.to_string();
                self.input_availability = availability;
            }
        }
    }

    /// Whether `name` contains this device's non-empty bus path or bus id
    pub fn matches_name(&self, name: &str) -> bool {
        (!self.bus_path.is_empty() && name.contains(&self.bus_path))
            || (!self.bus_id.is_empty() && name.contains(&self.bus_id))
    }
}

/// A directed connection between two ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: u32,
    pub output_node: u32,
    pub output_port: u32,
    pub input_node: u32,
    pub input_port: u32,
}

/// Handle of a link created through a [`GraphBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkHandle(pub u32);

/// Link management against the audio server
///
/// The graph itself is observed through [`GraphEvent`](crate::GraphEvent)s;
/// this trait only covers the mutations the engine performs.
pub trait GraphBackend: Send + Sync {
    /// Get the name of this backend (e.g., "PipeWire", "Offline")
    fn name(&self) -> &'static str;

    /// Check if the backend is connected and ready
    fn is_connected(&self) -> bool;

    /// Link the output ports of one node to the input ports of another
    ///
    /// Ports are paired by channel. With `probe` set, the targets are the
    /// input node's side-channel ports instead of its main inputs.
    fn link_nodes(
        &self,
        output_node: u32,
        input_node: u32,
        probe: bool,
    ) -> Result<Vec<LinkHandle>, PlatformError>;

    /// Destroy links previously returned by [`link_nodes`](Self::link_nodes)
    fn destroy_links(&self, links: &[LinkHandle]) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_round_trip() {
        for direction in Direction::ALL {
            assert_eq!(direction.as_str().parse::<Direction>().unwrap(), direction);
        }
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(Direction::from_media_class("Audio/Sink"), Some(Direction::Output));
        assert_eq!(Direction::from_media_class("Stream/Output/Audio"), None);
    }

    #[test]
    fn test_device_matches_name() {
        let device = Device {
            id: 7,
            name: "alsa_card.usb-Focusrite".into(),
            bus_path: "pci-0000:00:14.0-usb-0:2:1.0".into(),
            bus_id: String::new(),
            ..Default::default()
        };

        assert!(device.matches_name("alsa_output.pci-0000:00:14.0-usb-0:2:1.0.analog-stereo"));
        assert!(!device.matches_name("alsa_output.pci-0000_00_1f.3.analog-stereo"));

        // Empty identifiers never match
        let anonymous = Device::default();
        assert!(!anonymous.matches_name("anything"));
    }

    #[test]
    fn test_endpoint_serialization() {
        let endpoint = Endpoint {
            id: 42,
            name: "HeadphonesA".into(),
            description: "Headphones".into(),
            direction: Direction::Output,
            device_id: Some(3),
            route: "headphones".into(),
            availability: Availability::Available,
        };

        let json = serde_json::to_string(&endpoint).unwrap();
        assert!(json.contains("\"direction\":\"output\""));
        assert!(json.contains("\"availability\":\"available\""));

        let back: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, endpoint);
    }
}
