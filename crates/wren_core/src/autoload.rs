//! Preset Autoloading
//!
//! Associations map (endpoint name, route) to a preset name per direction.
//! They are stored in the pipeline scope of the settings as
//! `autoload::<endpoint>::<route>` = `<preset>`.
//!
//! Two things trigger an autoload:
//! - the route of the selected endpoint's device becomes available
//!   (e.g. headphones plugged in)
//! - the selected endpoint itself changes

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::context::EngineContext;
use crate::error::EngineResult;
use crate::settings::{
    selected_device_key, ListenerId, Scope, SettingKey, SettingValue, SettingsStore,
    AUTOLOAD_PREFIX,
};
use wren_platform::{Availability, DeviceGraphMirror, Direction, GraphNotification, SubscriptionId};

/// Something that can load a named preset into a pipeline
pub trait PresetLoader: Send + Sync {
    fn load_preset(&self, direction: Direction, name: &str) -> EngineResult<()>;
}

/// One stored association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    /// Endpoint name, or a fragment of one
    pub endpoint: String,
    pub route: String,
    pub preset: String,
}

fn association_key(direction: Direction, endpoint: &str, route: &str) -> SettingKey {
    SettingKey::pipeline(
        direction,
        &format!("{}{}::{}", AUTOLOAD_PREFIX, endpoint, route),
    )
}

pub struct PresetAutoloader {
    settings: Arc<dyn SettingsStore>,
    mirror: Arc<DeviceGraphMirror>,
    loader: Arc<dyn PresetLoader>,
    context: Arc<EngineContext>,
    graph_subscription: Mutex<Option<SubscriptionId>>,
    settings_subscription: Mutex<Option<ListenerId>>,
}

impl PresetAutoloader {
    /// Create the autoloader and subscribe it to graph and settings changes
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        mirror: Arc<DeviceGraphMirror>,
        loader: Arc<dyn PresetLoader>,
        context: Arc<EngineContext>,
    ) -> Arc<Self> {
        let autoloader = Arc::new(Self {
            settings,
            mirror,
            loader,
            context,
            graph_subscription: Mutex::new(None),
            settings_subscription: Mutex::new(None),
        });

        let weak: Weak<Self> = Arc::downgrade(&autoloader);
        let graph_id = autoloader.mirror.subscribe(move |notification| {
            if let Some(autoloader) = weak.upgrade() {
                autoloader.on_graph_notification(notification);
            }
        });

        let weak: Weak<Self> = Arc::downgrade(&autoloader);
        let settings_id = autoloader.settings.subscribe(Arc::new(
            move |key: &SettingKey, value: &SettingValue| {
                if let Some(autoloader) = weak.upgrade() {
                    autoloader.on_setting_changed(key, value);
                }
            },
        ));

        *autoloader.graph_subscription.lock() = Some(graph_id);
        *autoloader.settings_subscription.lock() = Some(settings_id);
        autoloader
    }

    /// Drop both subscriptions
    pub fn detach(&self) {
        if let Some(id) = self.graph_subscription.lock().take() {
            self.mirror.unsubscribe(id);
        }
        if let Some(id) = self.settings_subscription.lock().take() {
            self.settings.unsubscribe(id);
        }
    }

    fn on_graph_notification(&self, notification: &GraphNotification) {
        if let GraphNotification::EndpointRouteChanged {
            device_id,
            direction,
            route,
            availability,
            ..
        } = notification
        {
            self.on_route_changed(*direction, *device_id, route, *availability);
        }
    }

    fn on_route_changed(
        &self,
        direction: Direction,
        device_id: Option<u32>,
        route: &str,
        availability: Availability,
    ) {
        if availability != Availability::Available {
            debug!("Route '{}' not available, no autoload", route);
            return;
        }

        let Some(selected) = self.selected_device(direction) else {
            return;
        };

        let endpoint = {
            let state = self.mirror.state();
            state
                .endpoints
                .values()
                .find(|e| e.direction == direction && e.device_id == device_id && e.name == selected)
                .map(|e| e.name.clone())
        };
        let Some(endpoint) = endpoint else {
            debug!(
                "Route change on a device not backing the selected {} endpoint '{}'",
                direction, selected
            );
            return;
        };

        self.autoload_logged(direction, &endpoint, route);
    }

    fn on_setting_changed(&self, key: &SettingKey, value: &SettingValue) {
        let Some(direction) = key.direction() else {
            return;
        };
        if *key != selected_device_key(direction) {
            return;
        }

        let name = match value.as_str() {
            Some(name) if !name.is_empty() => name,
            _ => return,
        };

        let route = {
            let state = self.mirror.state();
            state
                .find_device_for_name(name)
                .map(|device| device.route(direction).0.to_string())
        };
        match route {
            Some(route) => self.autoload_logged(direction, name, &route),
            None => debug!("No device found for selected {} endpoint '{}'", direction, name),
        }
    }

    fn selected_device(&self, direction: Direction) -> Option<String> {
        self.settings
            .get(&selected_device_key(direction))
            .and_then(|value| value.as_str().map(str::to_string))
            .filter(|name| !name.is_empty())
    }

    fn autoload_logged(&self, direction: Direction, endpoint: &str, route: &str) {
        if let Err(e) = self.autoload(direction, endpoint, route) {
            error!(
                "Autoload for {} endpoint '{}' route '{}' failed: {}",
                direction, endpoint, route, e
            );
        }
    }

    /// Load the preset associated with an endpoint and route, if any
    ///
    /// Returns the loaded preset's name.
    pub fn autoload(
        &self,
        direction: Direction,
        endpoint: &str,
        route: &str,
    ) -> EngineResult<Option<String>> {
        if self.context.is_exiting() {
            return Ok(None);
        }

        let Some(preset) = self.find_association(direction, endpoint, route) else {
            debug!(
                "No {} preset associated with '{}' route '{}'",
                direction, endpoint, route
            );
            return Ok(None);
        };

        self.loader.load_preset(direction, &preset)?;
        info!(
            "Autoloaded {} preset '{}' for '{}' route '{}'",
            direction, preset, endpoint, route
        );
        Ok(Some(preset))
    }

    /// Exact endpoint name first, then the first fragment contained in it
    pub fn find_association(&self, direction: Direction, endpoint: &str, route: &str) -> Option<String> {
        let exact = self
            .settings
            .get(&association_key(direction, endpoint, route))
            .and_then(|value| value.as_str().map(str::to_string));
        if exact.is_some() {
            return exact;
        }

        self.associations(direction)
            .into_iter()
            .find(|a| a.route == route && !a.endpoint.is_empty() && endpoint.contains(&a.endpoint))
            .map(|a| a.preset)
    }

    pub fn set_association(&self, direction: Direction, endpoint: &str, route: &str, preset: &str) {
        self.settings
            .set(&association_key(direction, endpoint, route), preset.into());
    }

    pub fn remove_association(&self, direction: Direction, endpoint: &str, route: &str) -> bool {
        self.settings
            .remove(&association_key(direction, endpoint, route))
    }

    /// Stored associations in key order
    pub fn associations(&self, direction: Direction) -> Vec<Association> {
        self.settings
            .keys(&Scope::Pipeline(direction))
            .into_iter()
            .filter_map(|key| {
                let rest = key.name.strip_prefix(AUTOLOAD_PREFIX)?;
                let (endpoint, route) = rest.rsplit_once("::")?;
                let preset = self.settings.get(&key)?.as_str()?.to_string();
                Some(Association {
                    endpoint: endpoint.to_string(),
                    route: route.to_string(),
                    preset,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::JsonSettings;
    use crate::EngineError;
    use wren_platform::{Device, Endpoint, GraphEvent};

    #[derive(Default)]
    struct RecordingLoader {
        loads: Mutex<Vec<(Direction, String)>>,
        fail: bool,
    }

    impl PresetLoader for RecordingLoader {
        fn load_preset(&self, direction: Direction, name: &str) -> EngineResult<()> {
            if self.fail {
                return Err(EngineError::PresetCorrupt {
                    name: name.to_string(),
                    reason: "scripted".into(),
                });
            }
            self.loads.lock().push((direction, name.to_string()));
            Ok(())
        }
    }

    fn endpoint(id: u32, name: &str, device_id: Option<u32>) -> Endpoint {
        Endpoint {
            id,
            name: name.to_string(),
            description: name.to_string(),
            direction: Direction::Output,
            device_id,
            route: String::new(),
            availability: Availability::Unknown,
        }
    }

    struct Fixture {
        settings: Arc<JsonSettings>,
        mirror: Arc<DeviceGraphMirror>,
        loader: Arc<RecordingLoader>,
        autoloader: Arc<PresetAutoloader>,
    }

    fn fixture(fail: bool) -> Fixture {
        let settings = Arc::new(JsonSettings::in_memory());
        let mirror = Arc::new(DeviceGraphMirror::new());
        let loader = Arc::new(RecordingLoader {
            fail,
            ..Default::default()
        });
        let autoloader = PresetAutoloader::new(
            settings.clone(),
            Arc::clone(&mirror),
            loader.clone(),
            Arc::new(EngineContext::new()),
        );
        Fixture {
            settings,
            mirror,
            loader,
            autoloader,
        }
    }

    fn route_changed(id: u32, availability: Availability) -> GraphEvent {
        GraphEvent::EndpointRouteChanged {
            endpoint_id: id,
            direction: Direction::Output,
            route: "headphones".into(),
            availability,
        }
    }

    #[test]
    fn test_route_change_loads_associated_preset_once() {
        let f = fixture(false);
        f.mirror.on_event(GraphEvent::EndpointAdded(endpoint(1, "HeadphonesA", None)));
        f.settings
            .set(&selected_device_key(Direction::Output), "HeadphonesA".into());
        f.autoloader
            .set_association(Direction::Output, "HeadphonesA", "headphones", "MusicPreset");

        f.mirror.on_event(route_changed(1, Availability::Available));

        assert_eq!(
            *f.loader.loads.lock(),
            [(Direction::Output, "MusicPreset".to_string())]
        );
    }

    #[test]
    fn test_unavailable_route_does_nothing() {
        let f = fixture(false);
        f.mirror.on_event(GraphEvent::EndpointAdded(endpoint(1, "HeadphonesA", None)));
        f.settings
            .set(&selected_device_key(Direction::Output), "HeadphonesA".into());
        f.autoloader
            .set_association(Direction::Output, "HeadphonesA", "headphones", "MusicPreset");

        f.mirror.on_event(route_changed(1, Availability::Unavailable));
        f.mirror.on_event(route_changed(1, Availability::Unknown));
        assert!(f.loader.loads.lock().is_empty());
    }

    #[test]
    fn test_route_change_on_other_device_is_ignored() {
        let f = fixture(false);
        f.mirror.on_event(GraphEvent::EndpointAdded(endpoint(1, "HeadphonesA", Some(10))));
        f.mirror.on_event(GraphEvent::EndpointAdded(endpoint(2, "Speakers", Some(20))));
        f.settings
            .set(&selected_device_key(Direction::Output), "HeadphonesA".into());
        f.autoloader
            .set_association(Direction::Output, "Speakers", "headphones", "Loud");

        f.mirror.on_event(route_changed(2, Availability::Available));
        assert!(f.loader.loads.lock().is_empty());
    }

    #[test]
    fn test_fragment_match_in_key_order() {
        let f = fixture(false);
        f.autoloader
            .set_association(Direction::Output, "usb-Focusrite", "line", "Studio");
        f.autoloader
            .set_association(Direction::Output, "Focusrite", "line", "Other");
        f.autoloader
            .set_association(Direction::Output, "Focusrite", "speaker", "Wrong");

        let found = f
            .autoloader
            .find_association(Direction::Output, "alsa_output.usb-Focusrite_Scarlett", "line");
        // "Focusrite" sorts before "usb-Focusrite"
        assert_eq!(found.as_deref(), Some("Other"));

        f.autoloader.set_association(
            Direction::Output,
            "alsa_output.usb-Focusrite_Scarlett",
            "line",
            "Exact",
        );
        let found = f
            .autoloader
            .find_association(Direction::Output, "alsa_output.usb-Focusrite_Scarlett", "line");
        assert_eq!(found.as_deref(), Some("Exact"));

        assert!(f
            .autoloader
            .find_association(Direction::Input, "alsa_output.usb-Focusrite_Scarlett", "line")
            .is_none());
    }

    #[test]
    fn test_selecting_device_autoloads_its_route() {
        let f = fixture(false);
        f.mirror.on_event(GraphEvent::DeviceAdded(Device {
            id: 10,
            name: "alsa_card.pci-0000_00_1f.3".into(),
            bus_path: "pci-0000_00_1f.3".into(),
            output_route: "speaker".into(),
            output_availability: Availability::Available,
            ..Default::default()
        }));
        let name = "alsa_output.pci-0000_00_1f.3.analog-stereo";
        f.autoloader
            .set_association(Direction::Output, name, "speaker", "Laptop");

        f.settings.set(&selected_device_key(Direction::Output), name.into());
        f.settings.set(&selected_device_key(Direction::Output), "".into());

        assert_eq!(*f.loader.loads.lock(), [(Direction::Output, "Laptop".to_string())]);
    }

    #[test]
    fn test_no_association_is_not_an_error() {
        let f = fixture(false);
        let loaded = f
            .autoloader
            .autoload(Direction::Input, "mic", "analog-input")
            .unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_loader_errors_reach_direct_callers() {
        let f = fixture(true);
        f.autoloader
            .set_association(Direction::Input, "mic", "analog-input", "Voice");

        let err = f
            .autoloader
            .autoload(Direction::Input, "mic", "analog-input")
            .unwrap_err();
        assert!(matches!(err, EngineError::PresetCorrupt { .. }));
    }

    #[test]
    fn test_detach_stops_autoloading() {
        let f = fixture(false);
        f.mirror.on_event(GraphEvent::EndpointAdded(endpoint(1, "HeadphonesA", None)));
        f.settings
            .set(&selected_device_key(Direction::Output), "HeadphonesA".into());
        f.autoloader
            .set_association(Direction::Output, "HeadphonesA", "headphones", "MusicPreset");

        f.autoloader.detach();
        f.mirror.on_event(route_changed(1, Availability::Available));

        assert!(f.loader.loads.lock().is_empty());
        assert_eq!(f.mirror.subscriber_count(), 0);
    }

    #[test]
    fn test_associations_listing() {
        let f = fixture(false);
        f.autoloader
            .set_association(Direction::Output, "HeadphonesA", "headphones", "MusicPreset");
        assert!(!f
            .autoloader
            .remove_association(Direction::Output, "Nope", "headphones"));

        let all = f.autoloader.associations(Direction::Output);
        assert_eq!(
            all,
            [Association {
                endpoint: "HeadphonesA".into(),
                route: "headphones".into(),
                preset: "MusicPreset".into(),
            }]
        );
    }
}
