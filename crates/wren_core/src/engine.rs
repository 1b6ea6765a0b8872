//! Engine - Control Context Entry Point
//!
//! The `Engine` owns everything on the control side: the graph mirror, both
//! pipelines (through the configuration bridge), the preset autoloader and the
//! event queue. The processing halves of the two chains are handed back to the
//! caller, who runs them on the audio thread.
//!
//! # Architecture
//!
//! ```text
//!  transport thread ──GraphEvent──► process_pending() ──► DeviceGraphMirror
//!                                                          │ notifications
//!                       ┌──────────────────────────────────┤
//!                       ▼                                  ▼
//!               PresetAutoloader ──load_preset──► ConfigurationBridge ◄── SettingsStore
//!                                                          │
//!                                              Pipeline (output / input)
//!                                                          │ rtrb
//!  audio thread ◄──────────────── ProcessingChains ◄───────┘
//! ```
//!
//! Nothing here blocks the audio thread; chain updates and notices travel
//! through wait-free queues.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::autoload::PresetAutoloader;
use crate::bridge::ConfigurationBridge;
use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::message::{Command, Event, Reply};
use crate::pipeline::Pipeline;
use crate::preset::{FilePresetStore, PresetStore};
use crate::settings::{JsonSettings, SettingsStore};
use wren_dsp::{plugin_chain, ChainNotice, PluginChain, PluginHost};
use wren_platform::{connect_backend, DeviceGraphMirror, Direction, GraphBackend, GraphEvent};

/// Capacity of the engine's event queue; events beyond it are dropped
pub const EVENT_CAPACITY: usize = 256;

/// Processing halves of both chains, for the audio thread
pub struct ProcessingChains {
    pub output: PluginChain,
    pub input: PluginChain,
}

pub struct Engine {
    config: EngineConfig,
    context: Arc<EngineContext>,
    mirror: Arc<DeviceGraphMirror>,
    backend: Arc<dyn GraphBackend>,
    settings: Arc<dyn SettingsStore>,
    bridge: Arc<ConfigurationBridge>,
    autoloader: Arc<PresetAutoloader>,
    event_sender: Sender<Event>,
    event_receiver: Receiver<Event>,
}

impl Engine {
    /// Build an engine from its collaborators
    pub fn new(
        config: EngineConfig,
        settings: Arc<dyn SettingsStore>,
        presets: Arc<dyn PresetStore>,
        backend: Arc<dyn GraphBackend>,
        host: Arc<dyn PluginHost>,
    ) -> EngineResult<(Self, ProcessingChains)> {
        config.validate()?;

        let context = Arc::new(EngineContext::new());
        let mirror = Arc::new(DeviceGraphMirror::with_min_server_version(
            &config.min_server_version,
        ));

        let build = |direction: Direction| -> EngineResult<(PluginChain, Pipeline)> {
            let (chain, mut handle) = plugin_chain(Arc::clone(&host), config.notice_capacity);
            handle.prepare(config.stream.sample_rate, config.stream.block_size as usize)?;
            let pipeline = Pipeline::new(
                direction,
                handle,
                Arc::clone(&mirror),
                Arc::clone(&backend),
                Arc::clone(&context),
            );
            Ok((chain, pipeline))
        };
        let (output_chain, output) = build(Direction::Output)?;
        let (input_chain, input) = build(Direction::Input)?;

        let (event_sender, event_receiver) = bounded::<Event>(EVENT_CAPACITY);

        let bridge = ConfigurationBridge::new(
            Arc::clone(&settings),
            presets,
            Arc::clone(&mirror),
            output,
            input,
            Arc::clone(&context),
            event_sender.clone(),
        );
        let autoloader = PresetAutoloader::new(
            Arc::clone(&settings),
            Arc::clone(&mirror),
            bridge.clone(),
            Arc::clone(&context),
        );

        if let Err(e) = bridge.sync_from_settings() {
            warn!("Stored configuration could not be fully applied: {}", e);
        }

        info!(
            "Engine ready ({} backend, {} Hz, {} frame blocks)",
            backend.name(),
            config.stream.sample_rate,
            config.stream.block_size
        );

        let engine = Self {
            config,
            context,
            mirror,
            backend,
            settings,
            bridge,
            autoloader,
            event_sender,
            event_receiver,
        };
        Ok((
            engine,
            ProcessingChains {
                output: output_chain,
                input: input_chain,
            },
        ))
    }

    /// Build an engine with file-backed settings and presets and the
    /// backend of the current build
    ///
    /// Graph events arrive on the returned receiver; feed them to
    /// [`process_pending`](Self::process_pending).
    pub fn connect(
        config: EngineConfig,
        host: Arc<dyn PluginHost>,
    ) -> EngineResult<(Self, ProcessingChains, Receiver<GraphEvent>)> {
        let settings: Arc<dyn SettingsStore> = match config.settings_file() {
            Some(path) => Arc::new(JsonSettings::load(&path)),
            None => {
                warn!("No configuration directory, settings will not be saved");
                Arc::new(JsonSettings::in_memory())
            }
        };

        let presets_root = config.presets_path().ok_or_else(|| {
            EngineError::ConfigError("Could not determine preset directory".into())
        })?;
        let presets: Arc<dyn PresetStore> = Arc::new(FilePresetStore::new(presets_root));

        let (graph_sender, graph_receiver) = crossbeam_channel::unbounded();
        let backend = connect_backend(graph_sender)?;

        let (engine, chains) = Self::new(config, settings, presets, backend, host)?;
        Ok((engine, chains, graph_receiver))
    }

    /// Run one command
    pub fn execute(&mut self, command: Command) -> EngineResult<Reply> {
        if self.context.is_exiting() && command != Command::Shutdown {
            return Err(EngineError::ShutDown);
        }

        debug!("Command: {:?}", command);
        match command {
            Command::SetBypass(bypassed) => {
                self.bridge.set_bypass(bypassed);
                Ok(Reply::Done)
            }
            Command::QueryBypass => Ok(Reply::Bypass(self.bridge.is_bypassed())),
            Command::ListPresets(direction) => {
                Ok(Reply::Presets(self.bridge.list_presets(direction)?))
            }
            Command::ActivePreset(direction) => {
                Ok(Reply::ActivePreset(self.bridge.last_loaded_preset(direction)))
            }
            Command::LoadPreset {
                direction: Some(direction),
                name,
            } => {
                self.bridge.load_preset(direction, &name)?;
                Ok(Reply::PresetLoaded { direction, name })
            }
            Command::LoadPreset {
                direction: None,
                name,
            } => {
                for direction in [Direction::Input, Direction::Output] {
                    if self.bridge.preset_exists(direction, &name) {
                        self.bridge.load_preset(direction, &name)?;
                        return Ok(Reply::PresetLoaded { direction, name });
                    }
                }
                Err(EngineError::PresetNotFound {
                    direction: Direction::Output,
                    name,
                })
            }
            Command::SavePreset { direction, name } => {
                self.bridge.save_preset(direction, &name)?;
                Ok(Reply::Done)
            }
            Command::Reset => {
                self.bridge.reset()?;
                Ok(Reply::Done)
            }
            Command::Shutdown => {
                self.shutdown();
                Ok(Reply::Done)
            }
        }
    }

    /// Feed one transport event to the mirror
    pub fn handle_graph_event(&self, event: GraphEvent) {
        if self.context.is_exiting() {
            return;
        }
        self.mirror.on_event(event);
    }

    /// Apply every graph event waiting on `events`
    ///
    /// Returns how many were applied.
    pub fn process_pending(&self, events: &Receiver<GraphEvent>) -> usize {
        let mut applied = 0;
        while let Ok(event) = events.try_recv() {
            self.handle_graph_event(event);
            applied += 1;
        }
        applied
    }

    /// Turn pending chain notices into events
    ///
    /// Also releases chain states the audio thread has retired.
    pub fn drain_notices(&self) -> usize {
        let mut drained = 0;
        for direction in Direction::ALL {
            let notices = self.bridge.pipeline(direction).drain_notices();
            drained += notices.len();

            for notice in notices {
                match &notice {
                    ChainNotice::LatencyChanged { tag, samples, .. } => {
                        debug!("{} latency of {}: {} samples", direction, tag, samples)
                    }
                    ChainNotice::ChainLatencyChanged { samples, .. } => {
                        debug!("{} chain latency: {} samples", direction, samples)
                    }
                    ChainNotice::Meters { .. } => {}
                }
                self.emit(Event::from_notice(direction, notice));
            }
        }
        drained
    }

    fn emit(&self, event: Event) {
        if let Err(TrySendError::Full(event)) = self.event_sender.try_send(event) {
            debug!("Event queue full, dropped {:?}", event);
        }
    }

    /// Poll for events (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Wait for the next event
    pub fn wait_event(&self, timeout: Duration) -> Option<Event> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    /// Record the graph node hosting a pipeline's chain
    pub fn set_pipeline_node(&self, direction: Direction, node: Option<u32>) {
        self.bridge.pipeline(direction).set_pipeline_node(node);
    }

    /// Record the graph node of one unit
    pub fn set_unit_node(&self, direction: Direction, tag: &str, node: Option<u32>) {
        self.bridge.pipeline(direction).set_unit_node(tag, node);
    }

    /// Whether streams recording a monitor source are left unprocessed
    pub fn excludes_monitor_streams(&self) -> bool {
        self.context.excludes_monitor_streams()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mirror(&self) -> &Arc<DeviceGraphMirror> {
        &self.mirror
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub fn bridge(&self) -> &Arc<ConfigurationBridge> {
        &self.bridge
    }

    pub fn autoloader(&self) -> &Arc<PresetAutoloader> {
        &self.autoloader
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn is_shut_down(&self) -> bool {
        self.context.is_exiting()
    }

    /// Unsubscribe everything, then destroy owned links
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.context.is_exiting() {
            return;
        }

        info!("Shutting down engine");
        self.autoloader.detach();
        self.bridge.detach();
        self.context.set_exiting();
        self.bridge.teardown();

        if let Err(e) = self.settings.flush() {
            warn!("Failed to save settings: {}", e);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{SettingKey, SettingValue, PLUGINS};
    use wren_dsp::NullHost;
    use wren_platform::OfflineBackend;

    fn engine(dir: &tempfile::TempDir) -> (Engine, ProcessingChains) {
        Engine::new(
            EngineConfig::default(),
            Arc::new(JsonSettings::in_memory()),
            Arc::new(FilePresetStore::new(dir.path())),
            Arc::new(OfflineBackend::new()),
            Arc::new(NullHost),
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig {
            notice_capacity: 0,
            ..Default::default()
        };
        let result = Engine::new(
            config,
            Arc::new(JsonSettings::in_memory()),
            Arc::new(FilePresetStore::new("/nonexistent")),
            Arc::new(OfflineBackend::new()),
            Arc::new(NullHost),
        );
        assert!(matches!(result, Err(EngineError::ConfigError(_))));
    }

    #[test]
    fn test_bypass_commands() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, _chains) = engine(&dir);

        assert_eq!(engine.execute(Command::QueryBypass).unwrap(), Reply::Bypass(false));
        engine.execute(Command::SetBypass(true)).unwrap();
        assert_eq!(engine.execute(Command::QueryBypass).unwrap(), Reply::Bypass(true));
        assert_eq!(engine.poll_event(), Some(Event::BypassChanged { bypassed: true }));
    }

    #[test]
    fn test_load_without_direction_prefers_input() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, _chains) = engine(&dir);
        engine
            .settings()
            .set(&SettingKey::pipeline(Direction::Input, PLUGINS), SettingValue::List(vec!["limiter".into()]));

        for direction in Direction::ALL {
            engine
                .execute(Command::SavePreset {
                    direction,
                    name: "Both".into(),
                })
                .unwrap();
        }

        let reply = engine
            .execute(Command::LoadPreset {
                direction: None,
                name: "Both".into(),
            })
            .unwrap();
        assert_eq!(
            reply,
            Reply::PresetLoaded {
                direction: Direction::Input,
                name: "Both".into()
            }
        );
        assert_eq!(
            engine.execute(Command::ActivePreset(Direction::Input)).unwrap(),
            Reply::ActivePreset(Some("Both".into()))
        );
        assert_eq!(
            engine.execute(Command::ActivePreset(Direction::Output)).unwrap(),
            Reply::ActivePreset(None)
        );

        let err = engine
            .execute(Command::LoadPreset {
                direction: None,
                name: "Missing".into(),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::PresetNotFound { .. }));
    }

    #[test]
    fn test_list_presets() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, _chains) = engine(&dir);
        for name in ["b", "a"] {
            engine
                .execute(Command::SavePreset {
                    direction: Direction::Output,
                    name: name.into(),
                })
                .unwrap();
        }

        assert_eq!(
            engine.execute(Command::ListPresets(Direction::Output)).unwrap(),
            Reply::Presets(vec!["a".into(), "b".into()])
        );
        assert_eq!(
            engine.execute(Command::ListPresets(Direction::Input)).unwrap(),
            Reply::Presets(vec![])
        );
    }

    #[test]
    fn test_graph_events_reach_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _chains) = engine(&dir);
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(GraphEvent::DefaultEndpointChanged {
            direction: Direction::Output,
            name: "speakers".into(),
        })
        .unwrap();
        tx.send(GraphEvent::ServerInfo {
            version: "1.0.0".into(),
        })
        .unwrap();

        assert_eq!(engine.process_pending(&rx), 2);
        assert_eq!(engine.mirror().state().default_output, "speakers");
        assert_eq!(
            engine.poll_event(),
            Some(Event::DefaultDeviceChanged {
                direction: Direction::Output,
                name: "speakers".into()
            })
        );
    }

    #[test]
    fn test_commands_fail_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, _chains) = engine(&dir);

        assert_eq!(engine.execute(Command::Shutdown).unwrap(), Reply::Done);
        assert!(engine.is_shut_down());
        assert!(matches!(
            engine.execute(Command::QueryBypass),
            Err(EngineError::ShutDown)
        ));
        assert_eq!(engine.execute(Command::Shutdown).unwrap(), Reply::Done);
    }
}
