// ============================================================================
// Playback Engine - multi-track session control
// ============================================================================
//
// State machine: Stopped → Playing ⇄ Paused → Stopped.
//
// At most one streaming worker exists. Resuming or stopping always joins the
// previous worker before touching the track sources or output streams it
// owned, so two workers never drive the same stream.

use super::streaming_thread::{
    Session, SessionShared, StreamEnd, StreamingThread, WorkerContext,
};
use super::{EngineConfig, EngineError, EngineResult, PlaybackState, Routing};
use crate::dsp::ChunkProcessor;
use crate::output::{OutputDevice, OutputSpec};
use crate::settings::SettingsStore;
use crate::source::{TrackSource, TrackSpec, open_track};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Multi-track player driving one output stream per track
pub struct PlaybackEngine {
    config: EngineConfig,
    device: Arc<dyn OutputDevice>,
    settings: Arc<dyn SettingsStore>,
    shared: Arc<SessionShared>,
    specs: Vec<TrackSpec>,
    paths: Vec<PathBuf>,
    /// Tracks and streams while no worker owns them
    session: Option<Session>,
    worker: Option<StreamingThread>,
    state: PlaybackState,
}

impl PlaybackEngine {
    /// Open every file and prepare a stopped session.
    ///
    /// Any file that cannot be opened fails here, before a stream exists.
    pub fn new<P: AsRef<Path>>(
        files: &[P],
        volumes: &[f32],
        config: EngineConfig,
        device: Arc<dyn OutputDevice>,
        settings: Arc<dyn SettingsStore>,
    ) -> EngineResult<Self> {
        check_volume_count(files.len(), volumes.len())?;
        let tracks = open_tracks(files)?;
        Self::from_sources(tracks, volumes, config, device, settings)
    }

    /// Build a stopped session over already opened sources
    pub fn from_sources(
        tracks: Vec<Box<dyn TrackSource>>,
        volumes: &[f32],
        config: EngineConfig,
        device: Arc<dyn OutputDevice>,
        settings: Arc<dyn SettingsStore>,
    ) -> EngineResult<Self> {
        check_volume_count(tracks.len(), volumes.len())?;
        config.validate()?;
        let specs: Vec<TrackSpec> = tracks.iter().map(|t| t.spec()).collect();
        check_routing(config.routing, &specs)?;

        log::info!(
            "[Engine] Loaded {} tracks ({:?} routing)",
            tracks.len(),
            config.routing
        );

        Ok(Self {
            paths: tracks.iter().map(|t| t.path().to_path_buf()).collect(),
            specs,
            shared: Arc::new(SessionShared::new(volumes, false)),
            session: Some(Session {
                tracks,
                outputs: Vec::new(),
            }),
            worker: None,
            state: PlaybackState::Stopped,
            config,
            device,
            settings,
        })
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    /// Start or continue streaming.
    ///
    /// From `Stopped` the output streams are opened first; from `Paused` the
    /// previous worker is joined first. A no-op while playing.
    pub fn resume(&mut self) -> EngineResult<()> {
        match self.state() {
            PlaybackState::Playing => return Ok(()),
            PlaybackState::Paused => self.join_worker()?,
            PlaybackState::Stopped => {
                self.join_worker()?;
                self.open_outputs()?;
            }
        }

        let session = self.session.take().ok_or(EngineError::NoSession)?;
        let processor = match ChunkProcessor::new() {
            Ok(processor) => processor,
            Err(e) => {
                self.session = Some(session);
                return Err(e.into());
            }
        };

        let context = WorkerContext {
            shared: Arc::clone(&self.shared),
            settings: Arc::clone(&self.settings),
            processor,
            chunk_size: self.config.chunk_size,
            routing: self.config.routing,
        };

        // A failed spawn drops the session; the streams inside it close on drop
        let worker = StreamingThread::spawn(session, context)?;
        self.worker = Some(worker);
        self.state = PlaybackState::Playing;
        log::debug!("[Engine] Playing");
        Ok(())
    }

    /// Ask the worker to stop after its in-flight chunk.
    ///
    /// The worker is joined on the next `resume`/`stop`, or here if it has
    /// already exited.
    pub fn pause(&mut self) -> EngineResult<()> {
        self.shared.paused.store(true, Ordering::Release);
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
        if self.worker.as_ref().is_some_and(|w| w.is_finished()) {
            self.join_worker()?;
        }
        Ok(())
    }

    /// Stop streaming and close every output stream. Positions are kept.
    pub fn stop(&mut self) -> EngineResult<()> {
        self.shared.paused.store(true, Ordering::Release);
        let joined = self.join_worker();
        let closed = self.close_outputs();
        self.state = PlaybackState::Stopped;
        log::debug!("[Engine] Stopped");
        joined.and(closed)
    }

    /// Replace the whole session: open the new files, tear down the current
    /// streams, reset positions and start playing.
    ///
    /// If a new file cannot be opened the current session is left untouched.
    pub fn change_files<P: AsRef<Path>>(
        &mut self,
        files: &[P],
        volumes: &[f32],
    ) -> EngineResult<()> {
        check_volume_count(files.len(), volumes.len())?;
        let tracks = open_tracks(files)?;
        let specs: Vec<TrackSpec> = tracks.iter().map(|t| t.spec()).collect();
        check_routing(self.config.routing, &specs)?;

        if let Err(e) = self.stop() {
            log::warn!("[Engine] Previous session ended with error: {}", e);
        }

        let effects = self.effects_enabled();
        self.paths = tracks.iter().map(|t| t.path().to_path_buf()).collect();
        self.specs = specs;
        self.shared = Arc::new(SessionShared::new(volumes, effects));
        self.session = Some(Session {
            tracks,
            outputs: Vec::new(),
        });
        log::info!("[Engine] Switched to {} tracks", self.specs.len());

        self.resume()
    }

    // ------------------------------------------------------------------------
    // Per-track controls
    // ------------------------------------------------------------------------

    pub fn set_volume(&self, index: usize, volume: f32) -> EngineResult<()> {
        self.check_index(index)?;
        *self.shared.volumes[index].write() = volume;
        Ok(())
    }

    pub fn volume(&self, index: usize) -> EngineResult<f32> {
        self.check_index(index)?;
        Ok(*self.shared.volumes[index].read())
    }

    /// Move a track's read position, clamped to its length
    pub fn seek(&self, index: usize, seconds: f64) -> EngineResult<()> {
        self.check_index(index)?;
        let frame = self.specs[index].frames_at(seconds);
        self.shared.positions[index].store(frame, Ordering::Release);
        Ok(())
    }

    /// Read position in seconds
    pub fn position(&self, index: usize) -> EngineResult<f64> {
        let frames = self.position_frames(index)?;
        let rate = self.specs[index].frame_rate;
        Ok(if rate == 0 {
            0.0
        } else {
            frames as f64 / rate as f64
        })
    }

    pub fn position_frames(&self, index: usize) -> EngineResult<u64> {
        self.check_index(index)?;
        Ok(self.shared.positions[index].load(Ordering::Acquire))
    }

    pub fn track_spec(&self, index: usize) -> EngineResult<TrackSpec> {
        self.check_index(index)?;
        Ok(self.specs[index])
    }

    /// Track length in seconds
    pub fn duration(&self, index: usize) -> EngineResult<f64> {
        Ok(self.track_spec(index)?.duration_seconds())
    }

    pub fn track_path(&self, index: usize) -> EngineResult<&Path> {
        self.check_index(index)?;
        Ok(&self.paths[index])
    }

    // ------------------------------------------------------------------------
    // Session-wide settings
    // ------------------------------------------------------------------------

    pub fn set_effects(&self, enabled: bool) {
        self.shared.effects.store(enabled, Ordering::Release);
    }

    pub fn effects_enabled(&self) -> bool {
        self.shared.effects.load(Ordering::Acquire)
    }

    /// Current state; a worker that ran out of audio counts as paused
    pub fn state(&self) -> PlaybackState {
        match self.state {
            PlaybackState::Playing if self.shared.paused.load(Ordering::Acquire) => {
                PlaybackState::Paused
            }
            state => state,
        }
    }

    pub fn track_count(&self) -> usize {
        self.specs.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    pub fn routing(&self) -> Routing {
        self.config.routing
    }

    /// True once every track's position reached its end
    pub fn all_tracks_finished(&self) -> bool {
        self.specs.iter().enumerate().all(|(i, spec)| {
            self.shared.positions[i].load(Ordering::Acquire) >= spec.total_frames
        })
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn check_index(&self, index: usize) -> EngineResult<()> {
        if index >= self.specs.len() {
            return Err(EngineError::InvalidTrackIndex {
                index,
                count: self.specs.len(),
            });
        }
        Ok(())
    }

    /// Join the worker if there is one and take its session back
    fn join_worker(&mut self) -> EngineResult<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        let exit = worker.join()?;
        self.session = Some(exit.session);
        match exit.result {
            Ok(StreamEnd::Exhausted) => {
                log::debug!("[Engine] Worker joined after end of all tracks");
                Ok(())
            }
            Ok(StreamEnd::Paused) => Ok(()),
            Err(e) => {
                log::error!("[Engine] Streaming failed: {}", e);
                Err(e)
            }
        }
    }

    fn open_outputs(&mut self) -> EngineResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if !session.outputs.is_empty() {
            return Ok(());
        }

        let specs: Vec<OutputSpec> = match self.config.routing {
            Routing::PerTrack => self
                .specs
                .iter()
                .map(|s| OutputSpec::new(s.channels, s.frame_rate))
                .collect(),
            Routing::MixedBus => self
                .specs
                .first()
                .map(|s| OutputSpec::new(s.channels, s.frame_rate))
                .into_iter()
                .collect(),
        };

        for spec in specs {
            match self.device.open(spec) {
                Ok(stream) => session.outputs.push(stream),
                Err(e) => {
                    for mut stream in session.outputs.drain(..) {
                        stream.close().ok();
                    }
                    return Err(e.into());
                }
            }
        }

        log::debug!(
            "[Engine] Opened {} output streams on '{}'",
            session.outputs.len(),
            self.device.name()
        );
        Ok(())
    }

    fn close_outputs(&mut self) -> EngineResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let mut result = Ok(());
        for mut stream in session.outputs.drain(..) {
            if let Err(e) = stream.close() {
                log::warn!("[Engine] Failed to close output: {}", e);
                if result.is_ok() {
                    result = Err(e.into());
                }
            }
        }
        result
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("[Engine] Error during shutdown: {}", e);
        }
    }
}

fn check_volume_count(tracks: usize, volumes: usize) -> EngineResult<()> {
    if tracks != volumes {
        return Err(EngineError::VolumeCountMismatch { tracks, volumes });
    }
    Ok(())
}

/// Mixed-bus routing needs every track to share one output layout
fn check_routing(routing: Routing, specs: &[TrackSpec]) -> EngineResult<()> {
    if routing != Routing::MixedBus {
        return Ok(());
    }
    let Some(first) = specs.first() else {
        return Ok(());
    };
    match specs
        .iter()
        .find(|s| s.channels != first.channels || s.frame_rate != first.frame_rate)
    {
        Some(other) => Err(EngineError::IncompatibleTracks(format!(
            "{}Hz/{}ch vs {}Hz/{}ch",
            first.frame_rate, first.channels, other.frame_rate, other.channels
        ))),
        None => Ok(()),
    }
}

fn open_tracks<P: AsRef<Path>>(files: &[P]) -> EngineResult<Vec<Box<dyn TrackSource>>> {
    files
        .iter()
        .map(|path| {
            let track = open_track(path)?;
            let spec = track.spec();
            log::debug!(
                "[Engine] Opened {} ({}Hz, {}ch, {:.2}s)",
                path.as_ref().display(),
                spec.frame_rate,
                spec.channels,
                spec.duration_seconds()
            );
            Ok(track)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CaptureDevice;
    use crate::settings::InMemorySettings;
    use crate::source::MemoryTrackSource;
    use std::time::{Duration, Instant};

    fn tone(label: &str, frames: usize, channels: usize, value: i16) -> Box<dyn TrackSource> {
        Box::new(MemoryTrackSource::new(
            label,
            44100,
            channels,
            vec![value; frames * channels],
        ))
    }

    fn engine_with(
        tracks: Vec<Box<dyn TrackSource>>,
        volumes: &[f32],
        device: &CaptureDevice,
        config: EngineConfig,
    ) -> PlaybackEngine {
        PlaybackEngine::from_sources(
            tracks,
            volumes,
            config,
            Arc::new(device.clone()),
            Arc::new(InMemorySettings::new()),
        )
        .unwrap()
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_starts_stopped_without_streams() {
        let device = CaptureDevice::new();
        let engine = engine_with(
            vec![tone("a", 100, 2, 1)],
            &[1.0],
            &device,
            EngineConfig::default(),
        );
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.track_count(), 1);
        assert_eq!(device.stream_count(), 0);
    }

    #[test]
    fn test_volume_count_mismatch() {
        let device = CaptureDevice::new();
        let result = PlaybackEngine::from_sources(
            vec![tone("a", 10, 1, 0)],
            &[1.0, 0.5],
            EngineConfig::default(),
            Arc::new(device),
            Arc::new(InMemorySettings::new()),
        );
        assert!(matches!(
            result,
            Err(EngineError::VolumeCountMismatch {
                tracks: 1,
                volumes: 2
            })
        ));
    }

    #[test]
    fn test_plays_every_track_to_its_own_stream() {
        let device = CaptureDevice::new();
        let mut engine = engine_with(
            vec![tone("a", 3000, 2, 100), tone("b", 1500, 1, -100)],
            &[0.5, 1.0],
            &device,
            EngineConfig::default(),
        );

        engine.resume().unwrap();
        wait_until(|| engine.state() == PlaybackState::Paused);

        let streams = device.streams();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].samples(), vec![50; 6000]);
        assert_eq!(streams[1].samples(), vec![-100; 1500]);
        // 3000 frames in chunks of 1024
        assert_eq!(streams[0].write_count(), 3);
        assert_eq!(engine.position_frames(0).unwrap(), 3000);
        assert!(engine.all_tracks_finished());
    }

    #[test]
    fn test_stop_closes_streams_and_keeps_positions() {
        let device = CaptureDevice::new().with_write_delay(Duration::from_millis(2));
        let mut engine = engine_with(
            vec![tone("a", 441_000, 1, 7)],
            &[1.0],
            &device,
            EngineConfig::default(),
        );

        engine.resume().unwrap();
        wait_until(|| engine.position_frames(0).unwrap() > 0);
        engine.stop().unwrap();

        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(device.streams().iter().all(|s| s.is_closed()));
        let position = engine.position_frames(0).unwrap();
        assert!(position > 0 && position < 441_000);

        // Resuming opens fresh streams and continues from the kept position
        engine.resume().unwrap();
        assert_eq!(device.stream_count(), 2);
        engine.stop().unwrap();
        assert!(engine.position_frames(0).unwrap() >= position);
    }

    #[test]
    fn test_pause_and_resume_reuse_streams() {
        let device = CaptureDevice::new().with_write_delay(Duration::from_millis(2));
        let mut engine = engine_with(
            vec![tone("a", 441_000, 1, 7)],
            &[1.0],
            &device,
            EngineConfig::default(),
        );

        engine.resume().unwrap();
        engine.pause().unwrap();
        assert_eq!(engine.state(), PlaybackState::Paused);

        engine.resume().unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
        engine.resume().unwrap();
        assert_eq!(device.stream_count(), 1);
        engine.stop().unwrap();
    }

    #[test]
    fn test_seek_is_clamped() {
        let device = CaptureDevice::new();
        let engine = engine_with(
            vec![tone("a", 44100, 1, 0)],
            &[1.0],
            &device,
            EngineConfig::default(),
        );

        engine.seek(0, 0.5).unwrap();
        assert_eq!(engine.position_frames(0).unwrap(), 22050);
        assert!((engine.position(0).unwrap() - 0.5).abs() < 1e-9);

        engine.seek(0, 30.0).unwrap();
        assert_eq!(engine.position_frames(0).unwrap(), 44100);
        engine.seek(0, -1.0).unwrap();
        assert_eq!(engine.position_frames(0).unwrap(), 0);

        assert!(matches!(
            engine.seek(3, 1.0),
            Err(EngineError::InvalidTrackIndex { index: 3, count: 1 })
        ));
    }

    #[test]
    fn test_write_failure_surfaces_on_join() {
        let device = CaptureDevice::new().failing_after(2);
        let mut engine = engine_with(
            vec![tone("a", 44100, 1, 1)],
            &[1.0],
            &device,
            EngineConfig::default(),
        );

        engine.resume().unwrap();
        wait_until(|| engine.state() == PlaybackState::Paused);
        assert!(matches!(engine.stop(), Err(EngineError::Output(_))));
        assert_eq!(engine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_mixed_bus_sums_tracks() {
        let device = CaptureDevice::new();
        let config = EngineConfig {
            routing: Routing::MixedBus,
            ..EngineConfig::default()
        };
        let mut engine = engine_with(
            vec![tone("a", 2048, 2, 100), tone("b", 1024, 2, 20)],
            &[1.0, 1.0],
            &device,
            config,
        );

        engine.resume().unwrap();
        wait_until(|| engine.state() == PlaybackState::Paused);

        let streams = device.streams();
        assert_eq!(streams.len(), 1);
        let samples = streams[0].samples();
        assert_eq!(samples.len(), 4096);
        assert!(samples[..2048].iter().all(|&s| s == 120));
        assert!(samples[2048..].iter().all(|&s| s == 100));
    }

    #[test]
    fn test_mixed_bus_rejects_mismatched_layouts() {
        let device = CaptureDevice::new();
        let config = EngineConfig {
            routing: Routing::MixedBus,
            ..EngineConfig::default()
        };
        let result = PlaybackEngine::from_sources(
            vec![tone("a", 10, 2, 0), tone("b", 10, 1, 0)],
            &[1.0, 1.0],
            config,
            Arc::new(device),
            Arc::new(InMemorySettings::new()),
        );
        assert!(matches!(result, Err(EngineError::IncompatibleTracks(_))));
    }
}
