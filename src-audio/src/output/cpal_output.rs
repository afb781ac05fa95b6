// ============================================================================
// cpal Output - hardware streams fed through a ring buffer
// ============================================================================
//
// A cpal::Stream cannot leave the thread that built it, so every opened
// stream gets its own `output-N` thread that owns the stream until close.
// Writers push converted samples into a shared ring buffer which the device
// callback drains; underruns are filled with silence.

use super::{OutputDevice, OutputError, OutputSpec, OutputStream};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Sleep between attempts while the ring buffer is full
const WRITE_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Fixed-capacity sample queue shared with the device callback
struct RingBuffer {
    data: Vec<f32>,
    head: usize,
    len: usize,
}

impl RingBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    fn free(&self) -> usize {
        self.data.len() - self.len
    }

    /// Push as many samples as fit, returning how many were taken
    fn push(&mut self, samples: &[f32]) -> usize {
        let count = samples.len().min(self.free());
        let capacity = self.data.len();
        for (i, &sample) in samples[..count].iter().enumerate() {
            self.data[(self.head + self.len + i) % capacity] = sample;
        }
        self.len += count;
        count
    }

    /// Fill `out` from the queue, padding with silence on underrun
    fn pop_into(&mut self, out: &mut [f32]) -> bool {
        let capacity = self.data.len();
        let count = out.len().min(self.len);
        for (i, slot) in out[..count].iter_mut().enumerate() {
            *slot = self.data[(self.head + i) % capacity];
        }
        out[count..].fill(0.0);
        self.head = (self.head + count) % capacity;
        self.len -= count;
        count < out.len()
    }
}

/// State shared between the writer, the owning thread and the callback
struct SharedOutput {
    ring: Mutex<RingBuffer>,
    running: AtomicBool,
    error: Mutex<Option<String>>,
    underruns: AtomicUsize,
}

/// Output device backed by the default cpal host
pub struct CpalOutputDevice {
    device_name: Option<String>,
    buffer_ms: u32,
    next_stream_id: AtomicUsize,
}

impl CpalOutputDevice {
    /// `device_name` selects the first device whose name contains it; the
    /// default device is used otherwise. `buffer_ms` sizes each stream's
    /// ring buffer.
    pub fn new(device_name: Option<String>, buffer_ms: u32) -> Self {
        Self {
            device_name,
            buffer_ms: buffer_ms.max(10),
            next_stream_id: AtomicUsize::new(0),
        }
    }
}

impl OutputDevice for CpalOutputDevice {
    fn name(&self) -> String {
        self.device_name
            .clone()
            .or_else(default_output_device_name)
            .unwrap_or_else(|| "default".to_string())
    }

    fn open(&self, spec: OutputSpec) -> Result<Box<dyn OutputStream>, OutputError> {
        let id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let buffer_frames = (spec.sample_rate as usize * self.buffer_ms as usize) / 1000;
        let shared = Arc::new(SharedOutput {
            ring: Mutex::new(RingBuffer::with_capacity(buffer_frames * spec.channels)),
            running: AtomicBool::new(true),
            error: Mutex::new(None),
            underruns: AtomicUsize::new(0),
        });

        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_shared = Arc::clone(&shared);
        let device_name = self.device_name.clone();
        let handle = std::thread::Builder::new()
            .name(format!("output-{}", id))
            .spawn(move || run_output_thread(device_name, spec, thread_shared, ready_tx))
            .map_err(|e| OutputError::Thread(format!("Failed to spawn output thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalOutputStream {
                spec,
                shared,
                handle: Some(handle),
            })),
            Ok(Err(e)) => {
                handle.join().ok();
                Err(e)
            }
            Err(_) => {
                handle.join().ok();
                Err(OutputError::Thread(
                    "output thread exited during startup".to_string(),
                ))
            }
        }
    }
}

/// Names of every output device of the default host
pub fn list_output_devices() -> Result<Vec<String>, OutputError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| OutputError::Enumerate(e.to_string()))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

pub fn default_output_device_name() -> Option<String> {
    cpal::default_host()
        .default_output_device()
        .and_then(|d| d.name().ok())
}

fn select_device(host: &Host, device_name: Option<&str>) -> Result<Device, OutputError> {
    if let Some(wanted) = device_name {
        let found = host
            .output_devices()
            .map_err(|e| OutputError::Enumerate(e.to_string()))?
            .find(|d| d.name().is_ok_and(|name| name.contains(wanted)));

        match found {
            Some(device) => return Ok(device),
            None => log::warn!("[Output] Device '{}' not found, using default", wanted),
        }
    }

    host.default_output_device().ok_or(OutputError::NoDevice)
}

/// Body of an `output-N` thread: build, play, then park until closed
fn run_output_thread(
    device_name: Option<String>,
    spec: OutputSpec,
    shared: Arc<SharedOutput>,
    ready_tx: mpsc::Sender<Result<(), OutputError>>,
) {
    let stream = match start_stream(device_name.as_deref(), spec, Arc::clone(&shared)) {
        Ok(stream) => stream,
        Err(e) => {
            ready_tx.send(Err(e)).ok();
            return;
        }
    };
    ready_tx.send(Ok(())).ok();

    while shared.running.load(Ordering::Acquire) {
        std::thread::park();
    }

    drop(stream);
    log::debug!(
        "[Output] Stream closed ({} underruns)",
        shared.underruns.load(Ordering::Relaxed)
    );
}

fn start_stream(
    device_name: Option<&str>,
    spec: OutputSpec,
    shared: Arc<SharedOutput>,
) -> Result<Stream, OutputError> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name)?;
    let config = StreamConfig {
        channels: spec.channels as u16,
        sample_rate: cpal::SampleRate(spec.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let callback_shared = Arc::clone(&shared);
    let error_shared = Arc::clone(&shared);
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if callback_shared.ring.lock().pop_into(data) {
                    callback_shared.underruns.fetch_add(1, Ordering::Relaxed);
                }
            },
            move |err| {
                log::error!("[Output] Stream error: {}", err);
                *error_shared.error.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| OutputError::BuildStream(e.to_string()))?;

    stream
        .play()
        .map_err(|e| OutputError::PlayStream(e.to_string()))?;

    log::info!(
        "[Output] Started on '{}' - {}Hz, {} channels",
        device.name().unwrap_or_else(|_| "Unknown".to_string()),
        spec.sample_rate,
        spec.channels
    );
    Ok(stream)
}

/// Writer half of a cpal stream
pub struct CpalOutputStream {
    spec: OutputSpec,
    shared: Arc<SharedOutput>,
    handle: Option<JoinHandle<()>>,
}

impl CpalOutputStream {
    fn check_error(&self) -> Result<(), OutputError> {
        match self.shared.error.lock().as_ref() {
            Some(message) => Err(OutputError::Stream(message.clone())),
            None => Ok(()),
        }
    }
}

impl OutputStream for CpalOutputStream {
    fn spec(&self) -> OutputSpec {
        self.spec
    }

    fn write(&mut self, samples: &[i16]) -> Result<(), OutputError> {
        let converted: Vec<f32> = samples.iter().map(|&s| s as f32 / 32768.0).collect();
        let mut remaining = converted.as_slice();

        while !remaining.is_empty() {
            if self.is_closed() {
                return Err(OutputError::Closed);
            }
            self.check_error()?;

            let taken = self.shared.ring.lock().push(remaining);
            remaining = &remaining[taken..];
            if !remaining.is_empty() {
                std::thread::sleep(WRITE_RETRY_INTERVAL);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        self.shared.running.store(false, Ordering::Release);
        handle.thread().unpark();
        handle
            .join()
            .map_err(|_| OutputError::Thread("output thread panicked".to_string()))
    }

    fn is_closed(&self) -> bool {
        self.handle.is_none()
    }
}

impl Drop for CpalOutputStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("[Output] {}", e);
        }
    }
}
