//! PipeWire Thread
//!
//! Runs the PipeWire main loop, translates registry globals into
//! [`GraphEvent`]s and serves link commands.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use pipewire as pw;
use pw::properties::properties;
use pw::spa::param::ParamType;
use pw::spa::pod::deserialize::PodDeserializer;
use pw::spa::pod::{Pod, Value};
use pw::spa::utils::dict::DictRef;
use pw::spa::utils::Id;

use super::message::{PwCommand, PwResponse};
use crate::event::GraphEvent;
use crate::traits::{Availability, Device, Direction, Endpoint, Link};

/// Prefix of side-channel input ports on processing nodes
const PROBE_PORT_PREFIX: &str = "probe_";

#[derive(Debug, Clone)]
struct PortInfo {
    node_id: u32,
    name: String,
    is_input: bool,
    channel: String,
}

/// Thread-local view of the graph (not Send/Sync)
#[derive(Default)]
struct LocalState {
    endpoints: HashMap<u32, Endpoint>,
    devices: HashMap<u32, Device>,
    ports: HashMap<u32, PortInfo>,

    /// Device proxies kept alive for their Route param listener
    device_proxies: HashMap<u32, (pw::device::Device, pw::device::DeviceListener)>,

    /// The "default" metadata object and its listener
    metadata: Option<(pw::metadata::Metadata, pw::metadata::MetadataListener)>,

    /// Links we created, by handle. Dropping a proxy destroys its link.
    our_links: HashMap<u32, pw::link::Link>,
    next_link_handle: u32,
}

pub fn pipewire_thread_main(
    command_rx: pw::channel::Receiver<PwCommand>,
    response_tx: Sender<PwResponse>,
    events: Sender<GraphEvent>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
) {
    pw::init();

    tracing::info!("PipeWire thread starting");

    let mainloop = match pw::main_loop::MainLoop::new(None) {
        Ok(ml) => ml,
        Err(e) => {
            tracing::error!("Failed to create PipeWire MainLoop: {}", e);
            return;
        }
    };

    let context = match pw::context::Context::new(&mainloop) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!("Failed to create PipeWire Context: {}", e);
            return;
        }
    };

    let core = match context.connect(None) {
        Ok(core) => core,
        Err(e) => {
            tracing::error!("Failed to connect to PipeWire: {}", e);
            return;
        }
    };

    tracing::info!("Connected to PipeWire daemon");
    connected.store(true, Ordering::Release);

    let events_for_info = events.clone();
    let _core_listener = core
        .add_listener_local()
        .info(move |info| {
            let _ = events_for_info.send(GraphEvent::ServerInfo {
                version: info.version().to_string(),
            });
        })
        .register();

    let registry = match core.get_registry() {
        Ok(reg) => Rc::new(reg),
        Err(e) => {
            tracing::error!("Failed to get PipeWire registry: {}", e);
            return;
        }
    };

    let local_state = Rc::new(RefCell::new(LocalState::default()));

    let local_for_global = Rc::clone(&local_state);
    let local_for_remove = Rc::clone(&local_state);
    let registry_for_global = Rc::downgrade(&registry);
    let events_for_global = events.clone();
    let events_for_remove = events;

    let _registry_listener = registry
        .add_listener_local()
        .global(move |global| {
            let props = global.props;

            match global.type_ {
                pw::types::ObjectType::Node => {
                    let Some(direction) = get_prop(props, "media.class")
                        .as_deref()
                        .and_then(Direction::from_media_class)
                    else {
                        return;
                    };

                    let mut local = local_for_global.borrow_mut();
                    let device_id = get_prop_u32(props, "device.id");
                    let (route, availability) = device_id
                        .and_then(|id| local.devices.get(&id))
                        .map(|d| {
                            let (route, availability) = d.route(direction);
                            (route.to_string(), availability)
                        })
                        .unwrap_or_default();

                    let endpoint = Endpoint {
                        id: global.id,
                        name: get_prop(props, "node.name").unwrap_or_default(),
                        description: get_prop(props, "node.description").unwrap_or_default(),
                        direction,
                        device_id,
                        route,
                        availability,
                    };

                    tracing::debug!(
                        "Node added: {} (id={}, {})",
                        endpoint.name,
                        endpoint.id,
                        endpoint.direction
                    );

                    local.endpoints.insert(global.id, endpoint.clone());
                    let _ = events_for_global.send(GraphEvent::EndpointAdded(endpoint));
                }
                pw::types::ObjectType::Device => {
                    if get_prop(props, "media.class").as_deref() != Some("Audio/Device") {
                        return;
                    }

                    let device = Device {
                        id: global.id,
                        name: get_prop(props, "device.name").unwrap_or_default(),
                        bus_path: get_prop(props, "device.bus-path").unwrap_or_default(),
                        bus_id: get_prop(props, "device.bus-id").unwrap_or_default(),
                        ..Default::default()
                    };

                    tracing::debug!("Device added: {} (id={})", device.name, device.id);

                    let Some(registry) = registry_for_global.upgrade() else {
                        return;
                    };
                    match registry.bind::<pw::device::Device, _>(global) {
                        Ok(proxy) => {
                            let device_id = global.id;
                            let local_for_param = Rc::clone(&local_for_global);
                            let events_for_param = events_for_global.clone();
                            let listener = proxy
                                .add_listener_local()
                                .param(move |_seq, id, _index, _next, param| {
                                    if id != ParamType::Route {
                                        return;
                                    }
                                    if let Some(param) = param {
                                        on_route_param(
                                            device_id,
                                            param,
                                            &local_for_param,
                                            &events_for_param,
                                        );
                                    }
                                })
                                .register();
                            proxy.subscribe_params(&[ParamType::Route]);

                            let mut local = local_for_global.borrow_mut();
                            local.device_proxies.insert(global.id, (proxy, listener));
                            local.devices.insert(global.id, device.clone());
                        }
                        Err(e) => {
                            tracing::warn!("Failed to bind device {}: {}", global.id, e);
                            local_for_global.borrow_mut().devices.insert(global.id, device.clone());
                        }
                    }

                    let _ = events_for_global.send(GraphEvent::DeviceAdded(device));
                }
                pw::types::ObjectType::Port => {
                    let info = PortInfo {
                        node_id: get_prop_u32(props, "node.id").unwrap_or(0),
                        name: get_prop(props, "port.name").unwrap_or_default(),
                        is_input: get_prop(props, "port.direction").as_deref() == Some("in"),
                        channel: get_prop(props, "audio.channel").unwrap_or_else(|| "MONO".to_string()),
                    };
                    local_for_global.borrow_mut().ports.insert(global.id, info);
                }
                pw::types::ObjectType::Link => {
                    let link = Link {
                        id: global.id,
                        output_node: get_prop_u32(props, "link.output.node").unwrap_or(0),
                        output_port: get_prop_u32(props, "link.output.port").unwrap_or(0),
                        input_node: get_prop_u32(props, "link.input.node").unwrap_or(0),
                        input_port: get_prop_u32(props, "link.input.port").unwrap_or(0),
                    };
                    let _ = events_for_global.send(GraphEvent::LinkAdded(link));
                }
                pw::types::ObjectType::Metadata => {
                    if get_prop(props, "metadata.name").as_deref() != Some("default") {
                        return;
                    }
                    let Some(registry) = registry_for_global.upgrade() else {
                        return;
                    };
                    match registry.bind::<pw::metadata::Metadata, _>(global) {
                        Ok(metadata) => {
                            let events_for_meta = events_for_global.clone();
                            let listener = metadata
                                .add_listener_local()
                                .property(move |_subject, key, _type, value| {
                                    on_default_property(key, value, &events_for_meta);
                                    0
                                })
                                .register();
                            local_for_global.borrow_mut().metadata = Some((metadata, listener));
                        }
                        Err(e) => tracing::warn!("Failed to bind default metadata: {}", e),
                    }
                }
                _ => {}
            }
        })
        .global_remove(move |id| {
            let mut local = local_for_remove.borrow_mut();

            let event = if local.endpoints.remove(&id).is_some() {
                Some(GraphEvent::EndpointRemoved(id))
            } else if local.devices.remove(&id).is_some() {
                local.device_proxies.remove(&id);
                Some(GraphEvent::DeviceRemoved(id))
            } else if local.ports.remove(&id).is_some() {
                None
            } else {
                Some(GraphEvent::LinkRemoved(id))
            };

            if let Some(event) = event {
                tracing::debug!("Global removed: id={}", id);
                let _ = events_for_remove.send(event);
            }
        })
        .register();

    let local_for_cmd = Rc::clone(&local_state);
    let shutdown_for_cmd = Arc::clone(&shutdown);
    let core_rc = Rc::new(core);
    let core_for_cmd = Rc::clone(&core_rc);

    let _cmd_source = command_rx.attach(mainloop.loop_(), move |cmd| {
        handle_command(cmd, &core_for_cmd, &local_for_cmd, &response_tx, &shutdown_for_cmd);
    });

    tracing::info!("PipeWire main loop starting");

    while !shutdown.load(Ordering::Relaxed) {
        let _ = mainloop.loop_().iterate(std::time::Duration::from_millis(100));
    }

    tracing::info!("PipeWire thread shutting down");

    // Drop our link proxies while the core is still alive
    local_state.borrow_mut().our_links.clear();
    connected.store(false, Ordering::Release);
}

/// Handle a command from the control context
fn handle_command(
    cmd: PwCommand,
    core: &pw::core::Core,
    local_state: &Rc<RefCell<LocalState>>,
    response_tx: &Sender<PwResponse>,
    shutdown: &AtomicBool,
) {
    match cmd {
        PwCommand::LinkNodes {
            output_node,
            input_node,
            probe,
            response_id,
        } => {
            let pairs = pair_ports(&local_state.borrow(), output_node, input_node, probe);
            if pairs.is_empty() {
                let _ = response_tx.send(PwResponse::Error {
                    response_id,
                    message: format!("No matching ports between nodes {} and {}", output_node, input_node),
                });
                return;
            }

            let mut created = Vec::with_capacity(pairs.len());
            for (output_port, input_port) in pairs {
                let props = properties! {
                    "link.output.node" => output_node.to_string().as_str(),
                    "link.output.port" => output_port.to_string().as_str(),
                    "link.input.node" => input_node.to_string().as_str(),
                    "link.input.port" => input_port.to_string().as_str(),
                    "object.linger" => "false",
                };

                match core.create_object::<pw::link::Link>("link-factory", &props) {
                    Ok(link) => {
                        let mut local = local_state.borrow_mut();
                        let handle = local.next_link_handle;
                        local.next_link_handle = local.next_link_handle.wrapping_add(1);
                        local.our_links.insert(handle, link);
                        created.push(handle);
                    }
                    Err(e) => {
                        tracing::error!("Failed to create link: {}", e);
                        // Roll back the links made for this request
                        let mut local = local_state.borrow_mut();
                        for handle in &created {
                            local.our_links.remove(handle);
                        }
                        let _ = response_tx.send(PwResponse::Error {
                            response_id,
                            message: format!("Failed to create link: {}", e),
                        });
                        return;
                    }
                }
            }

            tracing::debug!(
                "Linked node {} -> {} ({} links, probe={})",
                output_node,
                input_node,
                created.len(),
                probe
            );
            let _ = response_tx.send(PwResponse::LinksCreated {
                response_id,
                links: created,
            });
        }

        PwCommand::DestroyLinks { links, response_id } => {
            let mut local = local_state.borrow_mut();
            for handle in links {
                local.our_links.remove(&handle);
            }
            let _ = response_tx.send(PwResponse::Ok { response_id });
        }

        PwCommand::Shutdown => {
            shutdown.store(true, Ordering::Relaxed);
        }
    }
}

/// Pair output ports of one node with input ports of another by channel
///
/// Falls back to positional pairing when channels do not line up.
fn pair_ports(local: &LocalState, output_node: u32, input_node: u32, probe: bool) -> Vec<(u32, u32)> {
    let mut outputs: Vec<(u32, &PortInfo)> = local
        .ports
        .iter()
        .filter(|(_, p)| p.node_id == output_node && !p.is_input)
        .map(|(id, p)| (*id, p))
        .collect();
    let mut inputs: Vec<(u32, &PortInfo)> = local
        .ports
        .iter()
        .filter(|(_, p)| {
            p.node_id == input_node && p.is_input && p.name.starts_with(PROBE_PORT_PREFIX) == probe
        })
        .map(|(id, p)| (*id, p))
        .collect();
    outputs.sort_by_key(|(id, _)| *id);
    inputs.sort_by_key(|(id, _)| *id);

    let by_channel: Vec<(u32, u32)> = outputs
        .iter()
        .filter_map(|(out_id, out)| {
            inputs
                .iter()
                .find(|(_, inp)| inp.channel == out.channel)
                .map(|(in_id, _)| (*out_id, *in_id))
        })
        .collect();

    if !by_channel.is_empty() {
        return by_channel;
    }
    outputs
        .iter()
        .zip(inputs.iter())
        .map(|((out_id, _), (in_id, _))| (*out_id, *in_id))
        .collect()
}

/// Apply a device Route param and report the change
fn on_route_param(
    device_id: u32,
    param: &Pod,
    local_state: &Rc<RefCell<LocalState>>,
    events: &Sender<GraphEvent>,
) {
    let Some((direction, route, availability)) = parse_route(param) else {
        return;
    };

    let mut local = local_state.borrow_mut();
    let Some(device) = local.devices.get_mut(&device_id) else {
        return;
    };
    if device.route(direction) == (route.as_str(), availability) {
        return;
    }
    device.set_route(direction, &route, availability);
    let device = device.clone();

    let endpoint_id = local
        .endpoints
        .values()
        .filter(|e| e.device_id == Some(device_id) && e.direction == direction)
        .map(|e| e.id)
        .min();
    drop(local);

    let _ = events.send(GraphEvent::DeviceAdded(device));
    if let Some(endpoint_id) = endpoint_id {
        let _ = events.send(GraphEvent::EndpointRouteChanged {
            endpoint_id,
            direction,
            route,
            availability,
        });
    }
}

/// Extract (direction, name, availability) from a Route object
fn parse_route(param: &Pod) -> Option<(Direction, String, Availability)> {
    let (_, value) = PodDeserializer::deserialize_any_from(param.as_bytes()).ok()?;
    let Value::Object(object) = value else {
        return None;
    };

    let mut direction = None;
    let mut name = None;
    let mut availability = Availability::Unknown;

    for prop in object.properties {
        match (prop.key, prop.value) {
            (pw::spa::sys::SPA_PARAM_ROUTE_direction, Value::Id(Id(raw))) => {
                direction = match raw {
                    pw::spa::sys::SPA_DIRECTION_OUTPUT => Some(Direction::Output),
                    pw::spa::sys::SPA_DIRECTION_INPUT => Some(Direction::Input),
                    _ => None,
                };
            }
            (pw::spa::sys::SPA_PARAM_ROUTE_name, Value::String(value)) => name = Some(value),
            (pw::spa::sys::SPA_PARAM_ROUTE_available, Value::Id(Id(raw))) => {
                availability = match raw {
                    pw::spa::sys::SPA_PARAM_AVAILABILITY_yes => Availability::Available,
                    pw::spa::sys::SPA_PARAM_AVAILABILITY_no => Availability::Unavailable,
                    _ => Availability::Unknown,
                };
            }
            _ => {}
        }
    }

    Some((direction?, name?, availability))
}

/// Parse `default.audio.sink` / `default.audio.source` metadata values
fn on_default_property(key: Option<&str>, value: Option<&str>, events: &Sender<GraphEvent>) {
    let direction = match key {
        Some("default.audio.sink") => Direction::Output,
        Some("default.audio.source") => Direction::Input,
        _ => return,
    };

    let Some(name) = value.and_then(default_name_from_json) else {
        return;
    };
    let _ = events.send(GraphEvent::DefaultEndpointChanged { direction, name });
}

/// `{"name":"alsa_output..."}` -> `alsa_output...`
fn default_name_from_json(value: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(value).ok()?;
    parsed.get("name")?.as_str().map(String::from)
}

/// Extract a property value from a PipeWire properties dictionary
fn get_prop(props: Option<&DictRef>, key: &str) -> Option<String> {
    props.and_then(|p| p.get(key).map(String::from))
}

/// Extract a property as u32 from PipeWire properties
fn get_prop_u32(props: Option<&DictRef>, key: &str) -> Option<u32> {
    get_prop(props, key).and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name_from_json() {
        assert_eq!(
            default_name_from_json(r#"{"name":"alsa_output.pci-0000_00_1f.3.analog-stereo"}"#),
            Some("alsa_output.pci-0000_00_1f.3.analog-stereo".to_string())
        );
        assert_eq!(default_name_from_json("not json"), None);
        assert_eq!(default_name_from_json(r#"{"other":1}"#), None);
    }

    #[test]
    fn test_pair_ports_by_channel_and_probe() {
        let mut local = LocalState::default();
        let port = |node_id, name: &str, is_input, channel: &str| PortInfo {
            node_id,
            name: name.into(),
            is_input,
            channel: channel.into(),
        };
        local.ports.insert(10, port(1, "capture_FL", false, "FL"));
        local.ports.insert(11, port(1, "capture_FR", false, "FR"));
        local.ports.insert(20, port(2, "input_FL", true, "FL"));
        local.ports.insert(21, port(2, "input_FR", true, "FR"));
        local.ports.insert(22, port(2, "probe_FL", true, "FL"));
        local.ports.insert(23, port(2, "probe_FR", true, "FR"));

        assert_eq!(pair_ports(&local, 1, 2, false), vec![(10, 20), (11, 21)]);
        assert_eq!(pair_ports(&local, 1, 2, true), vec![(10, 22), (11, 23)]);
        assert!(pair_ports(&local, 1, 3, false).is_empty());
    }
}
