use super::{MemoryTrackSource, TrackError, TrackResult};
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecRegistry, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::{Hint, Probe};

/// Create a probe with all supported format readers registered
fn create_probe() -> Probe {
    let mut probe = Probe::default();

    // AAC is supported both in MP4/M4A containers and as raw ADTS streams
    probe.register_all::<symphonia_bundle_flac::FlacReader>();
    probe.register_all::<symphonia_bundle_mp3::MpaReader>();
    probe.register_all::<symphonia_format_riff::WavReader>();
    probe.register_all::<symphonia_format_ogg::OggReader>();
    probe.register_all::<symphonia_format_isomp4::IsoMp4Reader>();
    probe.register_all::<symphonia_codec_aac::AdtsReader>();

    probe
}

/// Create a codec registry with all supported codecs
fn create_codec_registry() -> CodecRegistry {
    let mut registry = CodecRegistry::new();

    registry.register_all::<symphonia_bundle_flac::FlacDecoder>();
    registry.register_all::<symphonia_bundle_mp3::MpaDecoder>();
    registry.register_all::<symphonia_codec_pcm::PcmDecoder>();
    registry.register_all::<symphonia_codec_aac::AacDecoder>();
    registry.register_all::<symphonia_codec_vorbis::VorbisDecoder>();

    registry
}

/// Decode a whole file into an in-memory 16-bit source
pub fn decode_file<P: AsRef<Path>>(path: P) -> TrackResult<MemoryTrackSource> {
    let path = path.as_ref();

    let file = File::open(path)?;
    let media_source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probe_result = create_probe()
        .format(
            &hint,
            media_source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| match e {
            SymphoniaError::Unsupported(_) => TrackError::UnsupportedFormat(format!(
                "{} is not a supported audio file",
                path.display()
            )),
            _ => TrackError::from(e),
        })?;
    let mut format_reader = probe_result.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| TrackError::InvalidFile("No valid audio track found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| TrackError::InvalidFile("No sample rate found".to_string()))?;
    let mut channels = codec_params.channels.map(|layout| layout.count());

    let mut decoder = create_codec_registry()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| {
            TrackError::UnsupportedFormat(format!("Cannot create decoder for codec: {:?}", e))
        })?;

    let mut samples: Vec<i16> = Vec::new();
    let mut sample_buffer: Option<SampleBuffer<i16>> = None;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(TrackError::from(err)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                // A corrupt packet is skipped, the rest of the stream is still usable
                log::warn!(
                    "[Track] Skipping undecodable packet in {}: {}",
                    path.display(),
                    reason
                );
                continue;
            }
            Err(err) => return Err(TrackError::from(err)),
        };

        let spec = *decoded.spec();
        channels.get_or_insert(spec.channels.count());

        if sample_buffer.is_none() {
            sample_buffer = Some(SampleBuffer::<i16>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buffer) = sample_buffer.as_mut() {
            buffer.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buffer.samples());
        }
    }

    let channels = channels
        .filter(|&c| c > 0)
        .ok_or_else(|| TrackError::InvalidFile("No channel information found".to_string()))?;

    let source = MemoryTrackSource::new(path, sample_rate, channels, samples);
    log::debug!(
        "[Track] Decoded {}: {}Hz, {}ch, {} samples",
        path.display(),
        sample_rate,
        channels,
        source.samples().len()
    );
    Ok(source)
}

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Flac,
    Mp3,
    Aac,
    Wav,
    Vorbis,
}

impl AudioFormat {
    /// Detect audio format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> TrackResult<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .ok_or_else(|| TrackError::UnsupportedFormat("No file extension found".to_string()))?;

        match extension.as_str() {
            "flac" => Ok(AudioFormat::Flac),
            "mp3" => Ok(AudioFormat::Mp3),
            "aac" | "m4a" | "mp4" => Ok(AudioFormat::Aac),
            "wav" => Ok(AudioFormat::Wav),
            "ogg" | "oga" => Ok(AudioFormat::Vorbis),
            _ => Err(TrackError::UnsupportedFormat(format!(
                "Unsupported file extension: {} (supported: {})",
                extension,
                Self::supported_formats_string()
            ))),
        }
    }

    /// Get the format name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Flac => "FLAC",
            AudioFormat::Mp3 => "MP3",
            AudioFormat::Aac => "AAC",
            AudioFormat::Wav => "WAV",
            AudioFormat::Vorbis => "Vorbis",
        }
    }

    /// Comma separated list of supported format names
    pub fn supported_formats_string() -> String {
        [
            AudioFormat::Wav,
            AudioFormat::Flac,
            AudioFormat::Mp3,
            AudioFormat::Aac,
            AudioFormat::Vorbis,
        ]
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
    }
}
