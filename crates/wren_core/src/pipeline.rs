//! Pipeline - Control Side of One Direction
//!
//! Owns the chain handle of one direction together with the graph links the
//! chain needs outside its own node: the auxiliary (side-channel) links that
//! feed a unit's detector from another endpoint.
//!
//! ```text
//!   capture endpoint ──(aux link, probe ports)──► unit / pipeline node
//!                                                   │
//!   stream ──► [ unit 0 ] ──► [ unit 1 ] ──► ... ───┘──► stream
//! ```
//!
//! All methods run in the control context. Callers serialize access (the
//! bridge keeps each pipeline behind its own mutex).

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::EngineContext;
use crate::error::EngineResult;
use wren_dsp::{ChainHandle, ChainNotice, DspError, ParamValue, EXTERNAL_SIDECHAIN_SUFFIX};
use wren_platform::{DeviceGraphMirror, Direction, GraphBackend, LinkHandle};

/// Side-channel links currently owned for one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxLinks {
    /// Endpoint the detector signal comes from
    pub source: u32,

    /// Node whose probe ports receive it
    pub target: u32,

    pub handles: Vec<LinkHandle>,
}

pub struct Pipeline {
    direction: Direction,
    chain: ChainHandle,
    mirror: Arc<DeviceGraphMirror>,
    backend: Arc<dyn GraphBackend>,
    context: Arc<EngineContext>,

    /// Dedicated graph node of a unit, when it has one
    unit_nodes: BTreeMap<String, u32>,

    /// Node hosting the whole chain
    pipeline_node: Option<u32>,

    /// Capture endpoint used when a side-channel source cannot be resolved
    fallback_source: Option<String>,

    sidechain_sources: BTreeMap<String, String>,
    aux_links: BTreeMap<String, AuxLinks>,
}

impl Pipeline {
    pub fn new(
        direction: Direction,
        chain: ChainHandle,
        mirror: Arc<DeviceGraphMirror>,
        backend: Arc<dyn GraphBackend>,
        context: Arc<EngineContext>,
    ) -> Self {
        Self {
            direction,
            chain,
            mirror,
            backend,
            context,
            unit_nodes: BTreeMap::new(),
            pipeline_node: None,
            fallback_source: None,
            sidechain_sources: BTreeMap::new(),
            aux_links: BTreeMap::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn chain(&self) -> &ChainHandle {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut ChainHandle {
        &mut self.chain
    }

    pub fn tags(&self) -> Vec<String> {
        self.chain.tags()
    }

    /// Replace the ordered unit list
    ///
    /// Links of units that are no longer present are destroyed; the rest are
    /// re-checked.
    pub fn set_units<S: AsRef<str>>(&mut self, tags: &[S]) -> EngineResult<()> {
        self.chain.set_units(tags)?;

        let current = self.chain.tags();
        let removed: Vec<String> = self
            .aux_links
            .keys()
            .filter(|tag| !current.contains(*tag))
            .cloned()
            .collect();
        for tag in removed {
            self.destroy_aux_links(&tag);
        }
        self.sidechain_sources.retain(|tag, _| current.contains(tag));

        self.refresh_links();
        Ok(())
    }

    /// Bind one parameter of a unit
    ///
    /// Side-channel switches also re-check the unit's auxiliary links.
    pub fn bind(&mut self, tag: &str, name: &str, value: &ParamValue) -> EngineResult<()> {
        let unit = self
            .chain
            .unit(tag)
            .ok_or_else(|| DspError::UnknownUnit(tag.to_string()))?;
        unit.bind(name, value)?;

        if name.ends_with(EXTERNAL_SIDECHAIN_SUFFIX) {
            self.rebuild_auxiliary_links(tag)?;
        }
        Ok(())
    }

    /// Set the endpoint name feeding a unit's side-channel
    pub fn set_sidechain_source(&mut self, tag: &str, endpoint: &str) -> EngineResult<()> {
        if self.chain.unit(tag).is_none() {
            return Err(DspError::UnknownUnit(tag.to_string()).into());
        }

        if endpoint.is_empty() {
            self.sidechain_sources.remove(tag);
        } else {
            self.sidechain_sources
                .insert(tag.to_string(), endpoint.to_string());
        }
        self.rebuild_auxiliary_links(tag)
    }

    pub fn sidechain_source(&self, tag: &str) -> Option<&str> {
        self.sidechain_sources.get(tag).map(String::as_str)
    }

    /// Record the graph node created for a unit
    pub fn set_unit_node(&mut self, tag: &str, node: Option<u32>) {
        match node {
            Some(node) => self.unit_nodes.insert(tag.to_string(), node),
            None => self.unit_nodes.remove(tag),
        };
        if self.chain.unit(tag).is_some() {
            self.rebuild_or_warn(tag);
        }
    }

    /// Record the graph node hosting the chain
    pub fn set_pipeline_node(&mut self, node: Option<u32>) {
        self.pipeline_node = node;
        self.refresh_links();
    }

    pub fn set_fallback_source(&mut self, endpoint: Option<String>) {
        self.fallback_source = endpoint;
        self.refresh_links();
    }

    pub fn set_bypass(&self, bypassed: bool) {
        self.chain.set_bypass(bypassed);
    }

    pub fn is_bypassed(&self) -> bool {
        self.chain.is_bypassed()
    }

    /// Every unit back to its defaults, side-channel sources cleared
    pub fn reset_units(&mut self) {
        for unit in self.chain.units() {
            unit.reset();
        }
        self.sidechain_sources.clear();
        self.refresh_links();
    }

    pub fn aux_links(&self, tag: &str) -> Option<&AuxLinks> {
        self.aux_links.get(tag)
    }

    /// Recreate the side-channel links of one unit if its inputs changed
    ///
    /// Creates nothing and destroys nothing when the resolved source and
    /// target are the same as the links already owned.
    pub fn rebuild_auxiliary_links(&mut self, tag: &str) -> EngineResult<()> {
        if self.context.is_exiting() {
            return Ok(());
        }

        let wanted = match self.chain.unit(tag) {
            Some(unit) => unit.external_sidechain_enabled(),
            None => false,
        };
        if !wanted {
            self.destroy_aux_links(tag);
            return Ok(());
        }

        let Some(target) = self.unit_nodes.get(tag).copied().or(self.pipeline_node) else {
            debug!("No graph node for {} yet, side-channel links deferred", tag);
            self.destroy_aux_links(tag);
            return Ok(());
        };

        let Some(source) = self.resolve_source(tag) else {
            warn!(
                "No side-channel source for {} ({} pipeline), links removed",
                tag, self.direction
            );
            self.destroy_aux_links(tag);
            return Ok(());
        };

        if let Some(existing) = self.aux_links.get(tag) {
            if existing.source == source && existing.target == target && !existing.handles.is_empty() {
                return Ok(());
            }
        }

        self.destroy_aux_links(tag);
        let handles = self.backend.link_nodes(source, target, true)?;
        info!(
            "Side-channel for {}: {} -> {} ({} links)",
            tag,
            source,
            target,
            handles.len()
        );
        self.aux_links.insert(
            tag.to_string(),
            AuxLinks {
                source,
                target,
                handles,
            },
        );
        Ok(())
    }

    fn resolve_source(&self, tag: &str) -> Option<u32> {
        if let Some(name) = self.sidechain_sources.get(tag) {
            if let Some(endpoint) = self.mirror.find_endpoint_by_name(name) {
                return Some(endpoint.id);
            }
            warn!("Side-channel source '{}' for {} not found, using fallback", name, tag);
        }

        let fallback = match &self.fallback_source {
            Some(name) => name.clone(),
            None => self
                .mirror
                .state()
                .default_endpoint(Direction::Input)
                .to_string(),
        };
        if fallback.is_empty() {
            return None;
        }
        self.mirror.find_endpoint_by_name(&fallback).map(|e| e.id)
    }

    /// Re-check the side-channel links of every unit
    pub fn refresh_links(&mut self) {
        for tag in self.chain.tags() {
            self.rebuild_or_warn(&tag);
        }
    }

    fn rebuild_or_warn(&mut self, tag: &str) {
        if let Err(e) = self.rebuild_auxiliary_links(tag) {
            warn!("Failed to rebuild side-channel links for {}: {}", tag, e);
        }
    }

    fn destroy_aux_links(&mut self, tag: &str) {
        let Some(links) = self.aux_links.remove(tag) else {
            return;
        };
        if links.handles.is_empty() {
            return;
        }
        match self.backend.destroy_links(&links.handles) {
            Ok(()) => debug!("Removed {} side-channel links of {}", links.handles.len(), tag),
            Err(e) => warn!("Failed to remove side-channel links of {}: {}", tag, e),
        }
    }

    /// Destroy every owned link
    pub fn teardown(&mut self) {
        let tags: Vec<String> = self.aux_links.keys().cloned().collect();
        for tag in tags {
            self.destroy_aux_links(&tag);
        }
    }

    pub fn drain_notices(&mut self) -> Vec<ChainNotice> {
        self.chain.drain_notices()
    }
}
