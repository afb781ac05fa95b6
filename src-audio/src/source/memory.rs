// ============================================================================
// In-memory track source
// ============================================================================

use super::{TrackResult, TrackSource, TrackSpec, slice_frames};
use std::path::{Path, PathBuf};

/// Track source backed by interleaved samples held in memory
#[derive(Debug, Clone)]
pub struct MemoryTrackSource {
    label: PathBuf,
    frame_rate: u32,
    channels: usize,
    samples: Vec<i16>,
}

impl MemoryTrackSource {
    /// Create a source from interleaved samples.
    ///
    /// A trailing partial frame is dropped.
    pub fn new(
        label: impl Into<PathBuf>,
        frame_rate: u32,
        channels: usize,
        mut samples: Vec<i16>,
    ) -> Self {
        let channels = channels.max(1);
        samples.truncate(samples.len() - samples.len() % channels);
        Self {
            label: label.into(),
            frame_rate,
            channels,
            samples,
        }
    }

    /// Borrow the interleaved samples
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }
}

impl TrackSource for MemoryTrackSource {
    fn path(&self) -> &Path {
        &self.label
    }

    fn spec(&self) -> TrackSpec {
        TrackSpec {
            frame_rate: self.frame_rate,
            channels: self.channels,
            total_frames: (self.samples.len() / self.channels) as u64,
        }
    }

    fn read(&mut self, start_frame: u64, frame_count: usize) -> TrackResult<Vec<i16>> {
        Ok(slice_frames(
            &self.samples,
            self.channels,
            start_frame,
            frame_count,
        ))
    }

    fn read_all(&mut self) -> TrackResult<Vec<i16>> {
        Ok(self.samples.clone())
    }
}
