// ============================================================================
// Output Devices - one 16-bit output stream per opened channel
// ============================================================================

pub mod capture;
pub mod cpal_output;

pub use capture::{CaptureBuffer, CaptureDevice};
pub use cpal_output::{CpalOutputDevice, default_output_device_name, list_output_devices};

use thiserror::Error;

/// Layout of an output stream; samples are always signed 16-bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub channels: usize,
    pub sample_rate: u32,
}

impl OutputSpec {
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OutputError {
    #[error("No output device available")]
    NoDevice,

    #[error("Failed to enumerate output devices: {0}")]
    Enumerate(String),

    #[error("Failed to build output stream: {0}")]
    BuildStream(String),

    #[error("Failed to start output stream: {0}")]
    PlayStream(String),

    #[error("Output stream failed: {0}")]
    Stream(String),

    #[error("Output stream is closed")]
    Closed,

    #[error("Output thread error: {0}")]
    Thread(String),
}

/// An open output channel accepting interleaved chunks
pub trait OutputStream: Send {
    fn spec(&self) -> OutputSpec;

    /// Queue samples for playback.
    ///
    /// Blocks while the device cannot accept more data; a write to a closed
    /// stream fails with [`OutputError::Closed`].
    fn write(&mut self, samples: &[i16]) -> Result<(), OutputError>;

    /// Stop the stream and release its device resources. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), OutputError>;

    fn is_closed(&self) -> bool;
}

/// Something that can open output streams
pub trait OutputDevice: Send + Sync {
    fn name(&self) -> String;

    fn open(&self, spec: OutputSpec) -> Result<Box<dyn OutputStream>, OutputError>;
}
