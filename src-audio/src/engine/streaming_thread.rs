// ============================================================================
// Streaming Thread - chunked read → process → write loop
// ============================================================================
//
// The worker takes ownership of every track source and output stream for as
// long as it runs and hands them back when joined. Control calls reach it
// only through `SessionShared`: the pause flag and effects flag are atomics,
// positions are atomics advanced by compare-and-swap once a chunk has been
// written (a concurrent seek wins), volumes sit behind a read/write lock. All of them are observed at
// the next chunk boundary.

use super::{EngineError, Routing};
use crate::dsp::ChunkProcessor;
use crate::dsp::saturate_i16;
use crate::output::OutputStream;
use crate::settings::{ChunkSettings, SettingsStore};
use crate::source::TrackSource;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

/// Session state shared between control calls and the worker
pub(crate) struct SessionShared {
    pub paused: AtomicBool,
    pub effects: AtomicBool,
    pub positions: Vec<AtomicU64>,
    pub volumes: Vec<RwLock<f32>>,
}

impl SessionShared {
    pub fn new(volumes: &[f32], effects: bool) -> Self {
        Self {
            paused: AtomicBool::new(true),
            effects: AtomicBool::new(effects),
            positions: volumes.iter().map(|_| AtomicU64::new(0)).collect(),
            volumes: volumes.iter().map(|&v| RwLock::new(v)).collect(),
        }
    }
}

/// Track sources and output streams, owned by the worker while it runs
pub(crate) struct Session {
    pub tracks: Vec<Box<dyn TrackSource>>,
    pub outputs: Vec<Box<dyn OutputStream>>,
}

/// Why the worker loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    Paused,
    Exhausted,
}

/// What a joined worker hands back
pub(crate) struct WorkerExit {
    pub session: Session,
    pub result: Result<StreamEnd, EngineError>,
}

/// Everything the worker needs besides the session itself
pub(crate) struct WorkerContext {
    pub shared: Arc<SessionShared>,
    pub settings: Arc<dyn SettingsStore>,
    pub processor: ChunkProcessor,
    pub chunk_size: usize,
    pub routing: Routing,
}

/// Handle to the single running worker
pub(crate) struct StreamingThread {
    handle: Option<JoinHandle<WorkerExit>>,
}

impl StreamingThread {
    /// Clear the pause flag and start streaming `session`
    pub fn spawn(session: Session, context: WorkerContext) -> Result<Self, EngineError> {
        context.shared.paused.store(false, Ordering::Release);
        let handle = std::thread::Builder::new()
            .name("streaming".to_string())
            .spawn(move || run_streaming_thread(session, context))
            .map_err(|e| EngineError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Wait for the worker to exit and take back its session
    pub fn join(mut self) -> Result<WorkerExit, EngineError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| EngineError::ThreadPanic),
            None => Err(EngineError::ThreadPanic),
        }
    }
}

/// Worker body: stream until paused, exhausted or failed
fn run_streaming_thread(mut session: Session, mut context: WorkerContext) -> WorkerExit {
    log::debug!(
        "[Streaming] Started - {} tracks, {} frames per chunk",
        session.tracks.len(),
        context.chunk_size
    );

    let result = stream_loop(&mut session, &mut context);
    match &result {
        Ok(StreamEnd::Paused) => log::debug!("[Streaming] Paused"),
        Ok(StreamEnd::Exhausted) => log::info!("[Streaming] All tracks finished"),
        Err(e) => log::error!("[Streaming] Stopped on error: {}", e),
    }

    context.shared.paused.store(true, Ordering::Release);
    WorkerExit { session, result }
}

fn stream_loop(
    session: &mut Session,
    context: &mut WorkerContext,
) -> Result<StreamEnd, EngineError> {
    let shared = Arc::clone(&context.shared);

    loop {
        if shared.paused.load(Ordering::Acquire) {
            return Ok(StreamEnd::Paused);
        }

        let mut any_active = false;
        let mut bus: Vec<i32> = Vec::new();
        let mut delivered: Vec<(usize, u64, u64)> = Vec::new();

        for (index, track) in session.tracks.iter_mut().enumerate() {
            let spec = track.spec();
            let position = shared.positions[index].load(Ordering::Acquire);
            let chunk = track.read(position, context.chunk_size)?;
            if chunk.is_empty() {
                continue;
            }
            any_active = true;

            let frames = (chunk.len() / spec.channels.max(1)) as u64;
            let next = (position + frames).min(spec.total_frames);

            let settings = ChunkSettings::snapshot(context.settings.as_ref());
            let volume = *shared.volumes[index].read();
            let effects = shared.effects.load(Ordering::Acquire);
            let processed =
                context
                    .processor
                    .process(chunk, spec.channels, volume, effects, &settings);

            match context.routing {
                Routing::PerTrack => {
                    session.outputs[index].write(&processed)?;
                    advance_position(&shared, index, position, next);
                }
                Routing::MixedBus => {
                    mix_into(&mut bus, &processed);
                    delivered.push((index, position, next));
                }
            }
        }

        if !any_active {
            return Ok(StreamEnd::Exhausted);
        }

        if context.routing == Routing::MixedBus && !bus.is_empty() {
            let mixed: Vec<i16> = bus.iter().map(|&s| saturate_i16(s as f64)).collect();
            if let Some(output) = session.outputs.first_mut() {
                output.write(&mixed)?;
            }
        }
        for (index, from, to) in delivered {
            advance_position(&shared, index, from, to);
        }
    }
}

/// Move a track position forward once its chunk has reached the output.
///
/// A failed exchange means a seek landed meanwhile; the seek target is kept.
fn advance_position(shared: &SessionShared, index: usize, from: u64, to: u64) {
    let _ = shared.positions[index].compare_exchange(
        from,
        to,
        Ordering::AcqRel,
        Ordering::Acquire,
    );
}

/// Add `chunk` onto the bus accumulator, growing it to the longer length
fn mix_into(bus: &mut Vec<i32>, chunk: &[i16]) {
    if bus.len() < chunk.len() {
        bus.resize(chunk.len(), 0);
    }
    for (acc, &sample) in bus.iter_mut().zip(chunk) {
        *acc += sample as i32;
    }
}
