//! Configuration Bridge
//!
//! Keeps both pipelines in step with the settings store:
//!
//! ```text
//! SettingsStore ──(key, value)──► on_setting_changed ──► Pipeline (Mutex)
//!       ▲                                                   │
//!       │ load_preset / reset write settings                ▼
//!  PresetStore                                        ChainHandle / links
//! ```
//!
//! Presets are never applied to a chain directly. Loading one validates it in
//! full, then writes every value into the settings store; the settings
//! listener binds them like any other change. Settings are therefore never
//! written while a pipeline lock is held.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use chrono::Utc;
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::autoload::PresetLoader;
use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::message::Event;
use crate::pipeline::Pipeline;
use crate::preset::{Preset, PresetStore, UnitPreset};
use crate::settings::{
    selected_device_key, use_default_key, ListenerId, Scope, SettingKey, SettingValue,
    SettingsStore, BYPASS, EXCLUDE_MONITOR_STREAMS, LAST_LOADED_PRESET, PLUGINS,
    SIDECHAIN_INPUT_DEVICE,
};
use wren_dsp::{DspError, ParamValue, UnitControls};
use wren_platform::{DeviceGraphMirror, Direction, GraphNotification, SubscriptionId};

pub struct ConfigurationBridge {
    settings: Arc<dyn SettingsStore>,
    presets: Arc<dyn PresetStore>,
    mirror: Arc<DeviceGraphMirror>,
    context: Arc<EngineContext>,
    events: Sender<Event>,

    output: Mutex<Pipeline>,
    input: Mutex<Pipeline>,

    /// Serializes preset loads per direction
    output_preset_lock: Mutex<()>,
    input_preset_lock: Mutex<()>,

    settings_subscription: Mutex<Option<ListenerId>>,
    graph_subscription: Mutex<Option<SubscriptionId>>,
}

impl ConfigurationBridge {
    /// Create the bridge and subscribe it to settings and graph changes
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        presets: Arc<dyn PresetStore>,
        mirror: Arc<DeviceGraphMirror>,
        output: Pipeline,
        input: Pipeline,
        context: Arc<EngineContext>,
        events: Sender<Event>,
    ) -> Arc<Self> {
        let bridge = Arc::new(Self {
            settings,
            presets,
            mirror,
            context,
            events,
            output: Mutex::new(output),
            input: Mutex::new(input),
            output_preset_lock: Mutex::new(()),
            input_preset_lock: Mutex::new(()),
            settings_subscription: Mutex::new(None),
            graph_subscription: Mutex::new(None),
        });

        let weak: Weak<Self> = Arc::downgrade(&bridge);
        let settings_id = bridge.settings.subscribe(Arc::new(
            move |key: &SettingKey, value: &SettingValue| {
                if let Some(bridge) = weak.upgrade() {
                    bridge.on_setting_changed(key, value);
                }
            },
        ));

        let weak: Weak<Self> = Arc::downgrade(&bridge);
        let graph_id = bridge.mirror.subscribe(move |notification| {
            if let Some(bridge) = weak.upgrade() {
                bridge.on_graph_notification(notification);
            }
        });

        *bridge.settings_subscription.lock() = Some(settings_id);
        *bridge.graph_subscription.lock() = Some(graph_id);
        bridge
    }

    /// Lock one direction's pipeline
    ///
    /// Do not write settings while holding the guard.
    pub fn pipeline(&self, direction: Direction) -> MutexGuard<'_, Pipeline> {
        match direction {
            Direction::Output => self.output.lock(),
            Direction::Input => self.input.lock(),
        }
    }

    fn preset_lock(&self, direction: Direction) -> MutexGuard<'_, ()> {
        match direction {
            Direction::Output => self.output_preset_lock.lock(),
            Direction::Input => self.input_preset_lock.lock(),
        }
    }

    fn emit(&self, event: Event) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => debug!("Event queue full, dropped {:?}", event),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    // ---- settings -> pipelines ----

    fn on_setting_changed(&self, key: &SettingKey, value: &SettingValue) {
        if self.context.is_exiting() {
            return;
        }

        let result = match &key.scope {
            Scope::App if key.name == BYPASS => {
                if let Some(bypassed) = value.as_bool() {
                    self.apply_bypass(bypassed);
                }
                Ok(())
            }
            Scope::App if key.name == EXCLUDE_MONITOR_STREAMS => {
                if let Some(exclude) = value.as_bool() {
                    self.apply_exclude_monitor_streams(exclude);
                }
                Ok(())
            }
            Scope::Pipeline(direction) if key.name == PLUGINS => match value.as_list() {
                Some(tags) => self.apply_plugins(*direction, tags),
                None => Err(EngineError::ConfigError(format!("{} must be a list", key))),
            },
            Scope::Unit(direction, tag) => {
                let mut pipeline = self.pipeline(*direction);
                apply_unit_value(&mut pipeline, tag, &key.name, value)
            }
            _ => Ok(()),
        };

        match result {
            Ok(()) => {}
            Err(EngineError::DspError(DspError::UnknownUnit(tag))) => {
                debug!("Setting {} stored for {} which is not in the chain", key, tag);
            }
            Err(e) => {
                warn!("Failed to apply setting {}: {}", key, e);
                self.emit(Event::error(&e));
            }
        }
    }

    fn apply_bypass(&self, bypassed: bool) {
        let mut changed = false;
        for direction in Direction::ALL {
            let pipeline = self.pipeline(direction);
            changed |= pipeline.is_bypassed() != bypassed;
            pipeline.set_bypass(bypassed);
        }

        if changed {
            info!("Bypass {}", if bypassed { "enabled" } else { "disabled" });
            self.emit(Event::BypassChanged { bypassed });
        }
    }

    fn apply_exclude_monitor_streams(&self, exclude: bool) {
        if self.context.set_exclude_monitor_streams(exclude) != exclude {
            info!(
                "Monitor streams {}",
                if exclude { "excluded" } else { "included" }
            );
        }
    }

    pub fn excludes_monitor_streams(&self) -> bool {
        self.context.excludes_monitor_streams()
    }

    /// Reshape a chain, then bind every stored value of its units
    fn apply_plugins(&self, direction: Direction, tags: &[String]) -> EngineResult<()> {
        let mut pipeline = self.pipeline(direction);
        pipeline.set_units(tags)?;

        for tag in tags {
            let mut keys = self.settings.keys(&Scope::Unit(direction, tag.clone()));
            // Source first so enabling a band links straight to it
            keys.sort_by_key(|key| key.name != SIDECHAIN_INPUT_DEVICE);

            for key in keys {
                let Some(value) = self.settings.get(&key) else {
                    continue;
                };
                if let Err(e) = apply_unit_value(&mut pipeline, tag, &key.name, &value) {
                    warn!("Failed to apply setting {}: {}", key, e);
                }
            }
        }
        Ok(())
    }

    /// Apply everything currently stored
    pub fn sync_from_settings(&self) -> EngineResult<()> {
        let bypassed = self
            .settings
            .get(&SettingKey::app(BYPASS))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        self.apply_bypass(bypassed);

        let exclude = self
            .settings
            .get(&SettingKey::app(EXCLUDE_MONITOR_STREAMS))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        self.apply_exclude_monitor_streams(exclude);

        for direction in Direction::ALL {
            let tags = self
                .settings
                .get(&SettingKey::pipeline(direction, PLUGINS))
                .and_then(|v| v.as_list().map(<[String]>::to_vec))
                .unwrap_or_default();
            self.apply_plugins(direction, &tags)?;
        }
        Ok(())
    }

    // ---- graph -> pipelines ----

    fn on_graph_notification(&self, notification: &GraphNotification) {
        if self.context.is_exiting() {
            return;
        }

        match notification {
            GraphNotification::DefaultEndpointChanged { direction, name } => {
                self.emit(Event::DefaultDeviceChanged {
                    direction: *direction,
                    name: name.clone(),
                });

                let follow = self
                    .settings
                    .get(&use_default_key(*direction))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if follow && !name.is_empty() {
                    debug!("Following default {} endpoint '{}'", direction, name);
                    self.settings
                        .set(&selected_device_key(*direction), name.as_str().into());
                }

                if *direction == Direction::Input {
                    self.refresh_links();
                }
            }
            GraphNotification::EndpointAdded(_) | GraphNotification::EndpointRemoved(_) => {
                self.refresh_links();
            }
            _ => {}
        }
    }

    /// Re-resolve side-channel sources of both pipelines
    pub fn refresh_links(&self) {
        for direction in Direction::ALL {
            self.pipeline(direction).refresh_links();
        }
    }

    // ---- operations ----

    /// Validate a stored preset and apply it through the settings store
    ///
    /// Nothing is written unless the whole preset is valid.
    pub fn load_preset(&self, direction: Direction, name: &str) -> EngineResult<()> {
        if self.context.is_exiting() {
            return Err(EngineError::ShutDown);
        }

        let _guard = self.preset_lock(direction);

        let preset = self.presets.load(direction, name)?;
        let defaults = validate_preset(&preset).map_err(|reason| EngineError::PresetCorrupt {
            name: name.to_string(),
            reason,
        })?;

        for (unit, mut params) in preset.units.iter().zip(defaults) {
            params.extend(unit.params.clone());
            for (param, value) in params {
                self.settings.set(
                    &SettingKey::unit(direction, &unit.tag, &param),
                    value.into(),
                );
            }
        }

        self.settings.set(
            &SettingKey::pipeline(direction, PLUGINS),
            SettingValue::List(preset.tags()),
        );
        self.settings.set(
            &SettingKey::pipeline(direction, LAST_LOADED_PRESET),
            name.into(),
        );

        info!("Loaded {} preset '{}'", direction, name);
        self.emit(Event::PresetLoaded {
            direction,
            name: name.to_string(),
        });
        Ok(())
    }

    /// Snapshot a pipeline into a preset and store it
    pub fn save_preset(&self, direction: Direction, name: &str) -> EngineResult<Preset> {
        let units = {
            let pipeline = self.pipeline(direction);
            pipeline
                .chain()
                .units()
                .iter()
                .map(|unit| {
                    let mut params = unit.snapshot();
                    if let Some(source) = pipeline.sidechain_source(unit.tag()) {
                        params.insert(
                            SIDECHAIN_INPUT_DEVICE.to_string(),
                            ParamValue::Text(source.to_string()),
                        );
                    }
                    UnitPreset {
                        tag: unit.tag().to_string(),
                        params,
                    }
                })
                .collect()
        };

        let preset = Preset {
            name: name.to_string(),
            direction,
            units,
            saved_at: Some(Utc::now()),
        };
        self.presets.save(&preset)?;
        info!("Saved {} preset '{}'", direction, name);
        Ok(preset)
    }

    /// Every unit parameter back to its default and bypass off
    pub fn reset(&self) -> EngineResult<()> {
        for direction in Direction::ALL {
            let tags = {
                let mut pipeline = self.pipeline(direction);
                pipeline.reset_units();
                pipeline.tags()
            };

            for tag in tags {
                let controls = UnitControls::new(&tag)?;
                for (param, value) in controls.snapshot() {
                    self.settings
                        .set(&SettingKey::unit(direction, &tag, &param), value.into());
                }
                if controls.kind().supports_sidechain() {
                    self.settings.set(
                        &SettingKey::unit(direction, &tag, SIDECHAIN_INPUT_DEVICE),
                        "".into(),
                    );
                }
            }
        }

        self.set_bypass(false);
        info!("All units reset to defaults");
        Ok(())
    }

    pub fn set_bypass(&self, bypassed: bool) {
        self.apply_bypass(bypassed);
        self.settings.set(&SettingKey::app(BYPASS), bypassed.into());
    }

    pub fn is_bypassed(&self) -> bool {
        self.pipeline(Direction::Output).is_bypassed()
    }

    pub fn last_loaded_preset(&self, direction: Direction) -> Option<String> {
        self.settings
            .get(&SettingKey::pipeline(direction, LAST_LOADED_PRESET))
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|name| !name.is_empty())
    }

    pub fn list_presets(&self, direction: Direction) -> EngineResult<Vec<String>> {
        self.presets.list(direction)
    }

    pub fn preset_exists(&self, direction: Direction, name: &str) -> bool {
        self.presets.exists(direction, name)
    }

    /// Stop following settings and graph changes
    pub fn detach(&self) {
        if let Some(id) = self.settings_subscription.lock().take() {
            self.settings.unsubscribe(id);
        }
        if let Some(id) = self.graph_subscription.lock().take() {
            self.mirror.unsubscribe(id);
        }
    }

    /// Detach and destroy every owned link
    pub fn teardown(&self) {
        self.detach();
        for direction in Direction::ALL {
            self.pipeline(direction).teardown();
        }
    }
}

impl PresetLoader for ConfigurationBridge {
    fn load_preset(&self, direction: Direction, name: &str) -> EngineResult<()> {
        ConfigurationBridge::load_preset(self, direction, name)
    }
}

fn apply_unit_value(
    pipeline: &mut Pipeline,
    tag: &str,
    name: &str,
    value: &SettingValue,
) -> EngineResult<()> {
    if name == SIDECHAIN_INPUT_DEVICE {
        let source = value.as_str().ok_or_else(|| DspError::TypeMismatch {
            name: name.to_string(),
            expected: "text",
        })?;
        return pipeline.set_sidechain_source(tag, source);
    }

    let param = value.to_param().ok_or_else(|| DspError::TypeMismatch {
        name: name.to_string(),
        expected: "scalar",
    })?;
    pipeline.bind(tag, name, &param)
}

/// Check every unit and value of a preset
///
/// Returns each unit's default parameters, in preset order.
fn validate_preset(preset: &Preset) -> Result<Vec<BTreeMap<String, ParamValue>>, String> {
    let mut seen = BTreeSet::new();
    let mut defaults = Vec::with_capacity(preset.units.len());

    for unit in &preset.units {
        if !seen.insert(unit.tag.as_str()) {
            return Err(DspError::DuplicateUnit(unit.tag.clone()).to_string());
        }
        let controls = UnitControls::new(&unit.tag).map_err(|e| e.to_string())?;

        for (name, value) in &unit.params {
            if name == SIDECHAIN_INPUT_DEVICE {
                if value.as_text().is_none() {
                    return Err(format!("{}: {} must be text", unit.tag, name));
                }
                continue;
            }
            controls
                .validate(name, value)
                .map_err(|e| format!("{}: {}", unit.tag, e))?;
        }

        let mut unit_defaults = controls.snapshot();
        if controls.kind().supports_sidechain() {
            unit_defaults.insert(
                SIDECHAIN_INPUT_DEVICE.to_string(),
                ParamValue::Text(String::new()),
            );
        }
        defaults.push(unit_defaults);
    }
    Ok(defaults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::FilePresetStore;
    use crate::settings::JsonSettings;
    use crossbeam_channel::{bounded, Receiver};
    use wren_dsp::{plugin_chain, NullHost};
    use wren_platform::OfflineBackend;

    struct Fixture {
        settings: Arc<JsonSettings>,
        presets: Arc<FilePresetStore>,
        bridge: Arc<ConfigurationBridge>,
        events: Receiver<Event>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(JsonSettings::in_memory());
        let presets = Arc::new(FilePresetStore::new(dir.path()));
        let mirror = Arc::new(DeviceGraphMirror::new());
        let backend = Arc::new(OfflineBackend::new());
        let context = Arc::new(EngineContext::new());

        let mut pipelines = Direction::ALL.map(|direction| {
            let (_chain, mut handle) = plugin_chain(Arc::new(NullHost), 16);
            handle.prepare(48000, 256).unwrap();
            Some(Pipeline::new(
                direction,
                handle,
                Arc::clone(&mirror),
                backend.clone(),
                Arc::clone(&context),
            ))
        });

        let (tx, rx) = bounded(64);
        let bridge = ConfigurationBridge::new(
            settings.clone(),
            presets.clone(),
            mirror,
            pipelines[0].take().unwrap(),
            pipelines[1].take().unwrap(),
            context,
            tx,
        );
        Fixture {
            settings,
            presets,
            bridge,
            events: rx,
            _dir: dir,
        }
    }

    fn threshold(bridge: &ConfigurationBridge, direction: Direction) -> Option<ParamValue> {
        bridge
            .pipeline(direction)
            .chain()
            .unit("limiter")
            .and_then(|u| u.value("threshold"))
    }

    fn plugins(tags: &[&str]) -> SettingValue {
        SettingValue::List(tags.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn test_plugins_setting_shapes_chain() {
        let f = fixture();
        f.settings.set(
            &SettingKey::pipeline(Direction::Output, PLUGINS),
            plugins(&["equalizer", "limiter"]),
        );

        assert_eq!(f.bridge.pipeline(Direction::Output).tags(), ["equalizer", "limiter"]);
        assert!(f.bridge.pipeline(Direction::Input).tags().is_empty());
    }

    #[test]
    fn test_stored_unit_values_apply_when_unit_appears() {
        let f = fixture();
        f.settings.set(
            &SettingKey::unit(Direction::Output, "limiter", "threshold"),
            SettingValue::Double(-9.0),
        );
        assert_eq!(threshold(&f.bridge, Direction::Output), None);

        f.settings.set(
            &SettingKey::pipeline(Direction::Output, PLUGINS),
            plugins(&["limiter"]),
        );
        assert_eq!(
            threshold(&f.bridge, Direction::Output),
            Some(ParamValue::Float(-9.0))
        );
    }

    #[test]
    fn test_unknown_parameter_reports_error_and_keeps_others() {
        let f = fixture();
        f.settings.set(
            &SettingKey::pipeline(Direction::Output, PLUGINS),
            plugins(&["limiter"]),
        );
        f.settings.set(
            &SettingKey::unit(Direction::Output, "limiter", "threshold"),
            SettingValue::Int(-6),
        );
        f.settings.set(
            &SettingKey::unit(Direction::Output, "limiter", "volume"),
            SettingValue::Double(1.0),
        );

        assert_eq!(
            threshold(&f.bridge, Direction::Output),
            Some(ParamValue::Float(-6.0))
        );
        let errors: Vec<_> = f
            .events
            .try_iter()
            .filter(|e| matches!(e, Event::Error { .. }))
            .collect();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_bypass_setting() {
        let f = fixture();
        f.bridge.set_bypass(true);

        assert!(f.bridge.is_bypassed());
        assert!(f.bridge.pipeline(Direction::Input).is_bypassed());
        assert_eq!(
            f.settings.get(&SettingKey::app(BYPASS)),
            Some(SettingValue::Bool(true))
        );

        let changes: Vec<_> = f
            .events
            .try_iter()
            .filter(|e| matches!(e, Event::BypassChanged { .. }))
            .collect();
        assert_eq!(changes, [Event::BypassChanged { bypassed: true }]);
    }

    #[test]
    fn test_exclude_monitor_streams_setting() {
        let f = fixture();
        assert!(!f.bridge.excludes_monitor_streams());

        f.settings
            .set(&SettingKey::app(EXCLUDE_MONITOR_STREAMS), true.into());
        assert!(f.bridge.excludes_monitor_streams());

        f.settings
            .set(&SettingKey::app(EXCLUDE_MONITOR_STREAMS), false.into());
        assert!(!f.bridge.excludes_monitor_streams());
    }

    #[test]
    fn test_stored_exclude_flag_applies_on_sync() {
        let f = fixture();
        f.bridge.detach();
        f.settings
            .set(&SettingKey::app(EXCLUDE_MONITOR_STREAMS), true.into());
        assert!(!f.bridge.excludes_monitor_streams());

        f.bridge.sync_from_settings().unwrap();
        assert!(f.bridge.excludes_monitor_streams());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let f = fixture();
        f.settings.set(
            &SettingKey::pipeline(Direction::Input, PLUGINS),
            plugins(&["equalizer", "limiter"]),
        );
        f.settings.set(
            &SettingKey::unit(Direction::Input, "limiter", "threshold"),
            SettingValue::Double(-12.0),
        );
        f.bridge.save_preset(Direction::Input, "Voice").unwrap();

        f.settings.set(
            &SettingKey::unit(Direction::Input, "limiter", "threshold"),
            SettingValue::Double(-1.0),
        );
        f.settings.set(
            &SettingKey::pipeline(Direction::Input, PLUGINS),
            plugins(&["limiter"]),
        );

        f.bridge.load_preset(Direction::Input, "Voice").unwrap();
        assert_eq!(f.bridge.pipeline(Direction::Input).tags(), ["equalizer", "limiter"]);
        assert_eq!(
            threshold(&f.bridge, Direction::Input),
            Some(ParamValue::Float(-12.0))
        );
        assert_eq!(f.bridge.last_loaded_preset(Direction::Input).as_deref(), Some("Voice"));
        assert!(f.bridge.last_loaded_preset(Direction::Output).is_none());
    }

    #[test]
    fn test_missing_values_fall_back_to_defaults() {
        let f = fixture();
        f.settings.set(
            &SettingKey::pipeline(Direction::Output, PLUGINS),
            plugins(&["limiter"]),
        );
        f.settings.set(
            &SettingKey::unit(Direction::Output, "limiter", "threshold"),
            SettingValue::Double(-20.0),
        );

        let mut preset = Preset::new("Plain", Direction::Output);
        preset.units.push(UnitPreset {
            tag: "limiter".into(),
            params: BTreeMap::new(),
        });
        f.presets.save(&preset).unwrap();

        f.bridge.load_preset(Direction::Output, "Plain").unwrap();
        assert_eq!(
            threshold(&f.bridge, Direction::Output),
            Some(ParamValue::Float(-3.0))
        );
    }

    #[test]
    fn test_invalid_preset_changes_nothing() {
        let f = fixture();
        f.settings.set(
            &SettingKey::pipeline(Direction::Output, PLUGINS),
            plugins(&["limiter"]),
        );
        f.settings.set(
            &SettingKey::unit(Direction::Output, "limiter", "threshold"),
            SettingValue::Double(-9.0),
        );

        let mut params = BTreeMap::new();
        params.insert("band0-gain".to_string(), ParamValue::Text("loud".into()));
        let mut preset = Preset::new("Broken", Direction::Output);
        preset.units.push(UnitPreset {
            tag: "limiter".into(),
            params: BTreeMap::from([("threshold".to_string(), ParamValue::Float(-1.0))]),
        });
        preset.units.push(UnitPreset {
            tag: "equalizer".into(),
            params,
        });
        f.presets.save(&preset).unwrap();

        let err = f.bridge.load_preset(Direction::Output, "Broken").unwrap_err();
        assert!(matches!(err, EngineError::PresetCorrupt { .. }));
        assert_eq!(f.bridge.pipeline(Direction::Output).tags(), ["limiter"]);
        assert_eq!(
            threshold(&f.bridge, Direction::Output),
            Some(ParamValue::Float(-9.0))
        );
        assert!(f.bridge.last_loaded_preset(Direction::Output).is_none());
    }

    #[test]
    fn test_duplicate_and_unknown_units_are_corrupt() {
        let f = fixture();
        for (name, tags) in [("Dup", ["limiter", "limiter"]), ("Odd", ["limiter", "reverb"])] {
            let mut preset = Preset::new(name, Direction::Output);
            for tag in tags {
                preset.units.push(UnitPreset {
                    tag: tag.into(),
                    params: BTreeMap::new(),
                });
            }
            f.presets.save(&preset).unwrap();

            assert!(matches!(
                f.bridge.load_preset(Direction::Output, name),
                Err(EngineError::PresetCorrupt { .. })
            ));
        }
    }

    #[test]
    fn test_missing_preset() {
        let f = fixture();
        assert!(matches!(
            f.bridge.load_preset(Direction::Output, "Nope"),
            Err(EngineError::PresetNotFound { .. })
        ));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let f = fixture();
        f.settings.set(
            &SettingKey::pipeline(Direction::Output, PLUGINS),
            plugins(&["limiter"]),
        );
        f.settings.set(
            &SettingKey::unit(Direction::Output, "limiter", "threshold"),
            SettingValue::Double(-9.0),
        );
        f.bridge.set_bypass(true);

        f.bridge.reset().unwrap();
        assert_eq!(
            threshold(&f.bridge, Direction::Output),
            Some(ParamValue::Float(-3.0))
        );
        assert_eq!(
            f.settings.get(&SettingKey::unit(Direction::Output, "limiter", "threshold")),
            Some(SettingValue::Double(-3.0))
        );
        assert!(!f.bridge.is_bypassed());
    }

    #[test]
    fn test_teardown_unsubscribes() {
        let f = fixture();
        f.bridge.teardown();
        f.settings.set(
            &SettingKey::pipeline(Direction::Output, PLUGINS),
            plugins(&["limiter"]),
        );
        assert!(f.bridge.pipeline(Direction::Output).tags().is_empty());
    }
}
