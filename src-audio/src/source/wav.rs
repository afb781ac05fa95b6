// ============================================================================
// WAV track source - streams 16-bit PCM straight from disk
// ============================================================================

use super::{TrackError, TrackResult, TrackSource, TrackSpec};
use hound::{SampleFormat, WavReader};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Random-access reader for 16-bit integer PCM WAV files
pub struct WavTrackSource {
    path: PathBuf,
    reader: WavReader<BufReader<File>>,
    spec: TrackSpec,
}

impl WavTrackSource {
    /// Open a WAV file.
    ///
    /// Returns `UnsupportedFormat` for anything other than 16-bit integer PCM so
    /// the caller can fall back to a full decoder.
    pub fn open<P: AsRef<Path>>(path: P) -> TrackResult<Self> {
        let path = path.as_ref();
        let reader = WavReader::open(path)?;
        let wav_spec = reader.spec();

        if wav_spec.sample_format != SampleFormat::Int || wav_spec.bits_per_sample != 16 {
            return Err(TrackError::UnsupportedFormat(format!(
                "{:?} {}-bit WAV",
                wav_spec.sample_format, wav_spec.bits_per_sample
            )));
        }
        if wav_spec.channels == 0 {
            return Err(TrackError::InvalidFile("WAV file has no channels".to_string()));
        }

        let spec = TrackSpec {
            frame_rate: wav_spec.sample_rate,
            channels: wav_spec.channels as usize,
            total_frames: reader.duration() as u64,
        };

        log::debug!(
            "[Track] Opened WAV {}: {}Hz, {}ch, {} frames",
            path.display(),
            spec.frame_rate,
            spec.channels,
            spec.total_frames
        );

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            spec,
        })
    }
}

impl TrackSource for WavTrackSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn spec(&self) -> TrackSpec {
        self.spec
    }

    fn read(&mut self, start_frame: u64, frame_count: usize) -> TrackResult<Vec<i16>> {
        if start_frame >= self.spec.total_frames || frame_count == 0 {
            return Ok(Vec::new());
        }

        let available = (self.spec.total_frames - start_frame) as usize;
        let frames = frame_count.min(available);
        self.reader.seek(start_frame as u32)?;

        let samples = self
            .reader
            .samples::<i16>()
            .take(frames * self.spec.channels)
            .collect::<Result<Vec<i16>, hound::Error>>()?;
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_fixture(path: &Path, bits: u16, format: SampleFormat) {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: bits,
            sample_format: format,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..10i32 {
            match format {
                SampleFormat::Int => {
                    writer.write_sample(i).unwrap();
                    writer.write_sample(-i).unwrap();
                }
                SampleFormat::Float => {
                    writer.write_sample(i as f32 / 10.0).unwrap();
                    writer.write_sample(-(i as f32) / 10.0).unwrap();
                }
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_wav_random_access() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_fixture(&path, 16, SampleFormat::Int);

        let mut source = WavTrackSource::open(&path).unwrap();
        assert_eq!(
            source.spec(),
            TrackSpec {
                frame_rate: 22050,
                channels: 2,
                total_frames: 10
            }
        );

        assert_eq!(source.read(3, 2).unwrap(), vec![3, -3, 4, -4]);
        // Going backwards works as well
        assert_eq!(source.read(0, 1).unwrap(), vec![0, 0]);
        // Short read at the end, then empty
        assert_eq!(source.read(9, 4).unwrap(), vec![9, -9]);
        assert!(source.read(10, 4).unwrap().is_empty());
    }

    #[test]
    fn test_wav_float_is_rejected_as_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        write_fixture(&path, 32, SampleFormat::Float);

        assert!(matches!(
            WavTrackSource::open(&path),
            Err(TrackError::UnsupportedFormat(_))
        ));
    }
}
