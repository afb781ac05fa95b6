// ============================================================================
// Capture Output - headless device recording every write
// ============================================================================

use super::{OutputDevice, OutputError, OutputSpec, OutputStream};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Everything written to one captured stream
#[derive(Debug)]
pub struct CaptureBuffer {
    spec: OutputSpec,
    samples: Mutex<Vec<i16>>,
    writes: AtomicUsize,
    closed: AtomicBool,
}

impl CaptureBuffer {
    pub fn spec(&self) -> OutputSpec {
        self.spec
    }

    /// Copy of every sample written so far
    pub fn samples(&self) -> Vec<i16> {
        self.samples.lock().clone()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }

    /// Number of successful `write` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Output device that keeps audio in memory instead of playing it.
///
/// Cloning shares the recorded streams, so a test can keep one handle and
/// give the other to the engine.
#[derive(Debug, Clone, Default)]
pub struct CaptureDevice {
    streams: Arc<Mutex<Vec<Arc<CaptureBuffer>>>>,
    write_delay: Option<Duration>,
    fail_after: Option<usize>,
}

impl CaptureDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long in every write, roughly pacing the writer like a device would
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Fail every write on a stream after `writes` successful ones
    pub fn failing_after(mut self, writes: usize) -> Self {
        self.fail_after = Some(writes);
        self
    }

    /// Every stream opened so far, in opening order
    pub fn streams(&self) -> Vec<Arc<CaptureBuffer>> {
        self.streams.lock().clone()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }
}

impl OutputDevice for CaptureDevice {
    fn name(&self) -> String {
        "capture".to_string()
    }

    fn open(&self, spec: OutputSpec) -> Result<Box<dyn OutputStream>, OutputError> {
        let buffer = Arc::new(CaptureBuffer {
            spec,
            samples: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });
        self.streams.lock().push(Arc::clone(&buffer));

        Ok(Box::new(CaptureStream {
            buffer,
            write_delay: self.write_delay,
            fail_after: self.fail_after,
        }))
    }
}

struct CaptureStream {
    buffer: Arc<CaptureBuffer>,
    write_delay: Option<Duration>,
    fail_after: Option<usize>,
}

impl OutputStream for CaptureStream {
    fn spec(&self) -> OutputSpec {
        self.buffer.spec
    }

    fn write(&mut self, samples: &[i16]) -> Result<(), OutputError> {
        if self.is_closed() {
            return Err(OutputError::Closed);
        }
        if self
            .fail_after
            .is_some_and(|limit| self.buffer.write_count() >= limit)
        {
            return Err(OutputError::Stream("capture write limit reached".to_string()));
        }
        if let Some(delay) = self.write_delay {
            std::thread::sleep(delay);
        }

        self.buffer.samples.lock().extend_from_slice(samples);
        self.buffer.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.buffer.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.buffer.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_records_writes() {
        let device = CaptureDevice::new();
        let mut stream = device.open(OutputSpec::new(2, 44100)).unwrap();
        stream.write(&[1, 2, 3, 4]).unwrap();
        stream.write(&[5, 6]).unwrap();

        let captured = &device.streams()[0];
        assert_eq!(captured.samples(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(captured.write_count(), 2);
        assert_eq!(captured.spec(), OutputSpec::new(2, 44100));
    }

    #[test]
    fn test_write_after_close_fails() {
        let device = CaptureDevice::new();
        let mut stream = device.open(OutputSpec::new(1, 8000)).unwrap();
        stream.close().unwrap();
        stream.close().unwrap();
        assert!(stream.is_closed());
        assert_eq!(stream.write(&[1]), Err(OutputError::Closed));
        assert_eq!(device.streams()[0].sample_count(), 0);
    }

    #[test]
    fn test_failing_device() {
        let device = CaptureDevice::new().failing_after(1);
        let mut stream = device.open(OutputSpec::new(1, 8000)).unwrap();
        assert!(stream.write(&[1]).is_ok());
        assert!(matches!(stream.write(&[2]), Err(OutputError::Stream(_))));
    }
}
