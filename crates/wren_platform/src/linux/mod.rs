//! Linux Platform Backend - PipeWire
//!
//! PipeWire objects are not `Send`/`Sync`, so all PipeWire operations run in a
//! dedicated thread. The `PipeWireBackend` communicates with this thread via
//! channels:
//!
//! ```text
//! Control context                 PipeWire Thread
//! ───────────────                 ───────────────
//!                                 MainLoop::iterate()
//!   events (crossbeam) ◄───────── Registry / device / metadata listeners
//!   PipeWireBackend
//!     ├── command_tx ───────────► Command handler
//!     └── response_rx ◄────────── Response sender
//! ```

mod message;
mod thread;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use pipewire as pw;

use crate::error::PlatformError;
use crate::event::GraphEvent;
use crate::traits::{GraphBackend, LinkHandle};

use message::{PwCommand, PwResponse};

/// PipeWire backend implementation
///
/// # Thread Safety
///
/// Requests are serialized by `request_lock` so responses can be matched
/// to their command in order.
pub struct PipeWireBackend {
    command_tx: pw::channel::Sender<PwCommand>,
    response_rx: Receiver<PwResponse>,
    request_lock: Mutex<()>,
    thread_handle: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    next_response_id: AtomicU64,
}

impl PipeWireBackend {
    /// Timeout for waiting on responses from the PipeWire thread
    const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Spawn the PipeWire thread
    ///
    /// Graph changes are sent to `events` as they are observed.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn new(events: Sender<GraphEvent>) -> Result<Self, PlatformError> {
        tracing::info!("Initializing PipeWire backend");

        let connected = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        // pipewire::channel integrates with MainLoop for wake-up
        let (pw_cmd_tx, pw_cmd_rx) = pw::channel::channel::<PwCommand>();
        let (response_tx, response_rx) = bounded::<PwResponse>(32);

        let connected_clone = Arc::clone(&connected);
        let shutdown_clone = Arc::clone(&shutdown);

        let thread_handle = std::thread::Builder::new()
            .name("pipewire-main".into())
            .spawn(move || {
                thread::pipewire_thread_main(
                    pw_cmd_rx,
                    response_tx,
                    events,
                    connected_clone,
                    shutdown_clone,
                );
            })
            .map_err(|e| PlatformError::Internal(format!("Failed to spawn thread: {}", e)))?;

        // Wait a moment for connection to establish
        std::thread::sleep(Duration::from_millis(100));

        if !connected.load(Ordering::Acquire) {
            tracing::warn!("PipeWire connection not yet established, continuing anyway");
        }

        Ok(Self {
            command_tx: pw_cmd_tx,
            response_rx,
            request_lock: Mutex::new(()),
            thread_handle: Some(thread_handle),
            connected,
            shutdown,
            next_response_id: AtomicU64::new(1),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_response_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send a command and wait for the correlated response
    fn send_and_wait(&self, cmd: PwCommand, expected_id: u64) -> Result<PwResponse, PlatformError> {
        if !self.is_connected() {
            return Err(PlatformError::ConnectionFailed(
                "PipeWire daemon not connected".into(),
            ));
        }

        let _guard = self.request_lock.lock();

        self.command_tx
            .send(cmd)
            .map_err(|_| PlatformError::Internal("PipeWire thread channel closed".into()))?;

        match self.response_rx.recv_timeout(Self::RESPONSE_TIMEOUT) {
            Ok(response) if response.response_id() == expected_id => Ok(response),
            Ok(response) => Err(PlatformError::Internal(format!(
                "Response ID mismatch: expected {}, got {}",
                expected_id,
                response.response_id()
            ))),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(PlatformError::Internal(
                "Timeout waiting for PipeWire response".into(),
            )),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Err(PlatformError::Internal("PipeWire thread disconnected".into()))
            }
        }
    }
}

impl Drop for PipeWireBackend {
    fn drop(&mut self) {
        tracing::debug!("Shutting down PipeWire backend");
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.command_tx.send(PwCommand::Shutdown);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl GraphBackend for PipeWireBackend {
    fn name(&self) -> &'static str {
        "PipeWire"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn link_nodes(
        &self,
        output_node: u32,
        input_node: u32,
        probe: bool,
    ) -> Result<Vec<LinkHandle>, PlatformError> {
        let response_id = self.next_id();
        let response = self.send_and_wait(
            PwCommand::LinkNodes {
                output_node,
                input_node,
                probe,
                response_id,
            },
            response_id,
        )?;

        match response {
            PwResponse::LinksCreated { links, .. } => Ok(links.into_iter().map(LinkHandle).collect()),
            PwResponse::Error { message, .. } => Err(PlatformError::LinkCreationFailed(message)),
            _ => Err(PlatformError::Internal("Unexpected response type".into())),
        }
    }

    fn destroy_links(&self, links: &[LinkHandle]) -> Result<(), PlatformError> {
        if links.is_empty() {
            return Ok(());
        }

        let response_id = self.next_id();
        let response = self.send_and_wait(
            PwCommand::DestroyLinks {
                links: links.iter().map(|l| l.0).collect(),
                response_id,
            },
            response_id,
        )?;

        match response {
            PwResponse::Ok { .. } => Ok(()),
            PwResponse::Error { message, .. } => Err(PlatformError::CommandFailed(message)),
            _ => Err(PlatformError::Internal("Unexpected response type".into())),
        }
    }
}
