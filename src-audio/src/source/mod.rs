// ============================================================================
// Track Sources - Random-access 16-bit PCM readers
// ============================================================================
//
// A track source exposes the sample rate, channel count and length of an
// audio file and serves interleaved i16 frames by absolute frame index.
// Reading past the end is not an error: the result is short, then empty.

mod error;
mod formats;
mod memory;
mod wav;

pub use error::{TrackError, TrackResult};
pub use formats::{AudioFormat, decode_file};
pub use memory::MemoryTrackSource;
pub use wav::WavTrackSource;

use std::path::Path;

/// Static description of an opened track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSpec {
    /// Frames per second
    pub frame_rate: u32,
    /// Interleaved channels per frame
    pub channels: usize,
    /// Total number of frames in the file
    pub total_frames: u64,
}

impl TrackSpec {
    /// Total duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.frame_rate == 0 {
            return 0.0;
        }
        self.total_frames as f64 / self.frame_rate as f64
    }

    /// Convert a time in seconds to a frame index clamped to the track length
    pub fn frames_at(&self, seconds: f64) -> u64 {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        ((seconds * self.frame_rate as f64) as u64).min(self.total_frames)
    }
}

/// Random-access reader over an audio file
pub trait TrackSource: Send {
    /// Path (or label) the source was opened from
    fn path(&self) -> &Path;

    /// Sample rate, channel count and length
    fn spec(&self) -> TrackSpec;

    /// Read up to `frame_count` frames starting at `start_frame`.
    ///
    /// Returns interleaved samples; fewer than requested near the end of the
    /// stream and none once `start_frame` reaches the end.
    fn read(&mut self, start_frame: u64, frame_count: usize) -> TrackResult<Vec<i16>>;

    /// Read the whole track
    fn read_all(&mut self) -> TrackResult<Vec<i16>> {
        let total = self.spec().total_frames;
        self.read(0, total as usize)
    }
}

/// Open an audio file for random-access reading.
///
/// 16-bit integer WAV files are streamed straight from disk. Every other
/// supported format is decoded once into memory.
pub fn open_track<P: AsRef<Path>>(path: P) -> TrackResult<Box<dyn TrackSource>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TrackError::FileNotFound(path.display().to_string()));
    }

    let format = AudioFormat::from_path(path)?;
    if format == AudioFormat::Wav {
        match WavTrackSource::open(path) {
            Ok(source) => return Ok(Box::new(source)),
            Err(TrackError::UnsupportedFormat(reason)) => {
                log::debug!(
                    "[Track] {} is not 16-bit PCM ({}), decoding instead",
                    path.display(),
                    reason
                );
            }
            Err(e) => return Err(e),
        }
    }

    log::debug!("[Track] Decoding {} as {}", path.display(), format.as_str());
    Ok(Box::new(decode_file(path)?))
}

/// Slice `frame_count` frames starting at `start_frame` out of interleaved samples
pub(crate) fn slice_frames(
    samples: &[i16],
    channels: usize,
    start_frame: u64,
    frame_count: usize,
) -> Vec<i16> {
    if channels == 0 {
        return Vec::new();
    }
    let start = (start_frame as usize).saturating_mul(channels);
    if start >= samples.len() {
        return Vec::new();
    }
    let end = start
        .saturating_add(frame_count.saturating_mul(channels))
        .min(samples.len());
    samples[start..end].to_vec()
}
