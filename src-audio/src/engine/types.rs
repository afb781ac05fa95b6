// ============================================================================
// Playback Engine Types
// ============================================================================

use super::ConfigError;
use crate::output::OutputError;
use crate::source::TrackError;
use misst_iir::IirError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Playback state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// How processed chunks reach the output device
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Routing {
    /// Every track gets its own output stream (stems played side by side)
    #[default]
    PerTrack,
    /// All tracks are summed into a single output stream
    MixedBus,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Track error: {0}")]
    Track(#[from] TrackError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Filter design failed: {0}")]
    Filter(#[from] IirError),

    #[error("Invalid track index {index} (session has {count} tracks)")]
    InvalidTrackIndex { index: usize, count: usize },

    #[error("Got {volumes} volumes for {tracks} tracks")]
    VolumeCountMismatch { tracks: usize, volumes: usize },

    #[error("Tracks cannot share one output: {0}")]
    IncompatibleTracks(String),

    #[error("Failed to spawn streaming thread: {0}")]
    ThreadSpawn(String),

    #[error("Streaming thread panicked")]
    ThreadPanic,

    #[error("No track session loaded")]
    NoSession,
}

pub type EngineResult<T> = Result<T, EngineError>;
