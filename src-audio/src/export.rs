// ============================================================================
// Exporter - offline multi-track mixdown
// ============================================================================
//
// Loads whole tracks (no chunking, no effects), scales each by its volume,
// sums them into a buffer as long as the longest track and writes a 16-bit
// WAV at the first track's sample rate. Optional cover art arrives base64
// encoded and is embedded after the audio is written.

use crate::source::{TrackError, TrackSource, TrackSpec, open_track};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hound::{SampleFormat, WavSpec, WavWriter};
use lofty::config::WriteOptions;
use lofty::file::{FileType, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::probe::Probe;
use lofty::tag::{Tag, TagExt, TagType};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No tracks to export")]
    NoTracks,

    #[error("Got {volumes} volumes for {tracks} tracks")]
    VolumeCountMismatch { tracks: usize, volumes: usize },

    #[error("Track {index} has {found} channels, expected {expected}")]
    ChannelMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Unsupported output format: {0} (only .wav is written)")]
    UnsupportedOutputFormat(String),

    #[error("Track error: {0}")]
    Track(#[from] TrackError),

    #[error("WAV write failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("Invalid cover art encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Failed to embed cover art: {0}")]
    Tagging(String),
}

/// Embeds cover art into a finished file
pub trait CoverArtTagger: Send + Sync {
    fn embed_cover_art(&self, path: &Path, image: &[u8]) -> Result<(), ExportError>;
}

/// Cover art tagger backed by lofty.
///
/// The image becomes the front cover of the file's primary tag; WAV files
/// get an ID3v2 chunk since RIFF INFO cannot carry pictures.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagger;

impl CoverArtTagger for LoftyTagger {
    fn embed_cover_art(&self, path: &Path, image: &[u8]) -> Result<(), ExportError> {
        let tagging = |e: lofty::error::LoftyError| ExportError::Tagging(e.to_string());

        let mut picture = Picture::from_reader(&mut &image[..]).map_err(tagging)?;
        picture.set_pic_type(PictureType::CoverFront);

        let mut tagged_file = Probe::open(path).map_err(tagging)?.read().map_err(tagging)?;
        let tag_type = match tagged_file.file_type() {
            FileType::Wav | FileType::Aiff => TagType::Id3v2,
            _ => tagged_file.primary_tag_type(),
        };

        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .tag_mut(tag_type)
            .ok_or_else(|| ExportError::Tagging(format!("no {:?} tag available", tag_type)))?;
        tag.push_picture(picture);
        tag.save_to_path(path, WriteOptions::default())
            .map_err(tagging)?;

        log::debug!("[Export] Embedded {} bytes of cover art", image.len());
        Ok(())
    }
}

/// Sum volume-scaled interleaved tracks into one buffer.
///
/// The result is as long as the longest track; shorter tracks contribute
/// silence past their end.
pub fn mixdown(tracks: &[Vec<i16>], volumes: &[f32]) -> Vec<f32> {
    let length = tracks.iter().map(Vec::len).max().unwrap_or(0);
    let mut mix = vec![0.0f32; length];
    for (samples, &volume) in tracks.iter().zip(volumes) {
        for (acc, &sample) in mix.iter_mut().zip(samples) {
            *acc += sample as f32 * volume;
        }
    }
    mix
}

/// Offline renderer for a set of tracks
pub struct Exporter {
    tagger: Box<dyn CoverArtTagger>,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter {
    pub fn new() -> Self {
        Self::with_tagger(Box::new(LoftyTagger))
    }

    pub fn with_tagger(tagger: Box<dyn CoverArtTagger>) -> Self {
        Self { tagger }
    }

    /// Mix `files` down into `output_path`.
    ///
    /// `cover_art` is a base64 image; `None`, an empty string or `"null"`
    /// skip tagging. If anything fails after the output file was created it
    /// is removed again.
    pub fn save<P: AsRef<Path>>(
        &self,
        files: &[P],
        volumes: &[f32],
        output_path: &Path,
        cover_art: Option<&str>,
    ) -> Result<(), ExportError> {
        if files.is_empty() {
            return Err(ExportError::NoTracks);
        }
        let tracks = files
            .iter()
            .map(open_track)
            .collect::<Result<Vec<_>, _>>()?;
        self.save_sources(tracks, volumes, output_path, cover_art)
    }

    /// Same as [`Exporter::save`] for already opened sources
    pub fn save_sources(
        &self,
        mut tracks: Vec<Box<dyn TrackSource>>,
        volumes: &[f32],
        output_path: &Path,
        cover_art: Option<&str>,
    ) -> Result<(), ExportError> {
        let Some(first) = tracks.first().map(|t| t.spec()) else {
            return Err(ExportError::NoTracks);
        };
        if tracks.len() != volumes.len() {
            return Err(ExportError::VolumeCountMismatch {
                tracks: tracks.len(),
                volumes: volumes.len(),
            });
        }
        check_output_format(output_path)?;

        for (index, track) in tracks.iter().enumerate().skip(1) {
            let spec = track.spec();
            if spec.channels != first.channels {
                return Err(ExportError::ChannelMismatch {
                    index,
                    expected: first.channels,
                    found: spec.channels,
                });
            }
            if spec.frame_rate != first.frame_rate {
                log::warn!(
                    "[Export] Track {} runs at {}Hz, written at {}Hz",
                    index,
                    spec.frame_rate,
                    first.frame_rate
                );
            }
        }

        let samples = tracks
            .iter_mut()
            .map(|t| t.read_all())
            .collect::<Result<Vec<_>, _>>()?;
        let mix = mixdown(&samples, volumes);

        let image = decode_cover_art(cover_art)?;

        let result = write_wav(output_path, first, &mix).and_then(|()| match &image {
            Some(bytes) => self.tagger.embed_cover_art(output_path, bytes),
            None => Ok(()),
        });

        if let Err(e) = result {
            if output_path.exists() {
                if let Err(remove_err) = std::fs::remove_file(output_path) {
                    log::warn!(
                        "[Export] Could not remove partial {}: {}",
                        output_path.display(),
                        remove_err
                    );
                }
            }
            return Err(e);
        }

        log::info!(
            "[Export] Wrote {} ({} tracks, {:.2}s)",
            output_path.display(),
            tracks.len(),
            mix.len() as f64 / (first.channels.max(1) as f64 * first.frame_rate.max(1) as f64)
        );
        Ok(())
    }
}

fn check_output_format(path: &Path) -> Result<(), ExportError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if extension != "wav" {
        return Err(ExportError::UnsupportedOutputFormat(path.display().to_string()));
    }
    Ok(())
}

/// Decode optional base64 cover art; absent or `"null"` means none
fn decode_cover_art(cover_art: Option<&str>) -> Result<Option<Vec<u8>>, ExportError> {
    match cover_art.map(str::trim) {
        None | Some("") | Some("null") => Ok(None),
        Some(encoded) => Ok(Some(STANDARD.decode(encoded)?)),
    }
}

fn write_wav(path: &Path, spec: TrackSpec, mix: &[f32]) -> Result<(), ExportError> {
    let wav_spec = WavSpec {
        channels: spec.channels as u16,
        sample_rate: spec.frame_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, wav_spec)?;
    for &sample in mix {
        writer.write_sample(crate::dsp::saturate_i16(sample as f64))?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixdown_pads_shorter_tracks() {
        let mix = mixdown(&[vec![100, 200], vec![10, 20, 30, 40]], &[0.5, 2.0]);
        assert_eq!(mix, vec![70.0, 140.0, 60.0, 80.0]);
        assert!(mixdown(&[], &[]).is_empty());
    }

    #[test]
    fn test_cover_art_decoding() {
        assert_eq!(decode_cover_art(None).unwrap(), None);
        assert_eq!(decode_cover_art(Some("null")).unwrap(), None);
        assert_eq!(decode_cover_art(Some("")).unwrap(), None);
        assert_eq!(
            decode_cover_art(Some("aGVsbG8=")).unwrap(),
            Some(b"hello".to_vec())
        );
        assert!(matches!(
            decode_cover_art(Some("*not base64*")),
            Err(ExportError::Base64(_))
        ));
    }

    #[test]
    fn test_output_format_check() {
        assert!(check_output_format(Path::new("mix.wav")).is_ok());
        assert!(check_output_format(Path::new("MIX.WAV")).is_ok());
        assert!(matches!(
            check_output_format(Path::new("mix.mp3")),
            Err(ExportError::UnsupportedOutputFormat(_))
        ));
    }
}
