// ============================================================================
// Playback Engine - multi-track streaming
// ============================================================================
//
// Architecture:
//   Control calls (any thread) → SessionShared (atomics + locks)
//   Streaming thread: read chunk → volume → effects → equalizer → output
//   Output threads: one per cpal stream (see crate::output)

mod types;
pub use types::*;

mod config;
pub use config::{ConfigError, EngineConfig};

mod streaming_thread;

mod playback_engine;
pub use playback_engine::PlaybackEngine;
