//! Plugin Host Seam
//!
//! Externally implemented algorithms (LV2-style plugins) are reached through
//! these two traits. The host is shared by every chain; an instance belongs to
//! exactly one unit and is driven from the processing context.

/// One block of stereo audio handed to a plugin instance
///
/// All spans have the same length. The probe pair carries the side-channel
/// signal (silence when nothing is linked).
pub struct StereoIo<'a> {
    pub in_left: &'a [f32],
    pub in_right: &'a [f32],
    pub out_left: &'a mut [f32],
    pub out_right: &'a mut [f32],
    pub probe_left: &'a [f32],
    pub probe_right: &'a [f32],
}

impl StereoIo<'_> {
    pub fn len(&self) -> usize {
        self.out_left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out_left.is_empty()
    }
}

/// A live plugin instance
///
/// # Real-time Safety Contract
///
/// `set_control`, `control` and `run` are called from the processing context
/// and must not allocate, lock, or perform I/O.
pub trait PluginInstance: Send {
    /// Index of the control port with this symbol
    fn port_index(&self, symbol: &str) -> Option<usize>;

    /// Largest block `run` will be called with
    fn set_max_block_size(&mut self, _frames: usize) {}

    /// Write an input control port
    fn set_control(&mut self, port: usize, value: f32);

    /// Read a control port (output ports report latency and meters)
    fn control(&self, port: usize) -> f32;

    /// Process one block
    fn run(&mut self, io: StereoIo<'_>);
}

/// Something that can find and instantiate plugins by URI
pub trait PluginHost: Send + Sync {
    /// Whether the plugin is installed on this system
    fn is_installed(&self, uri: &str) -> bool;

    /// Instantiate a plugin at the given sample rate
    ///
    /// Called from the control context only.
    fn instantiate(&self, uri: &str, sample_rate: u32) -> Option<Box<dyn PluginInstance>>;
}

/// Host with no plugins installed
///
/// Hosted units become permanent passthroughs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl PluginHost for NullHost {
    fn is_installed(&self, _uri: &str) -> bool {
        false
    }

    fn instantiate(&self, _uri: &str, _sample_rate: u32) -> Option<Box<dyn PluginInstance>> {
        None
    }
}
