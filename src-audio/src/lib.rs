pub mod source;
pub use source::{
    AudioFormat, MemoryTrackSource, TrackError, TrackResult, TrackSource, TrackSpec,
    WavTrackSource, decode_file, open_track,
};

pub mod settings;
pub use settings::{
    ChunkSettings, EQ_BAND_COUNT, EffectParameters, EqualizerSettings, InMemorySettings,
    JsonFileSettings, Setting, SettingsStore,
};

pub mod dsp;
pub use dsp::{ChunkProcessor, EffectChain, Equalizer, REFERENCE_SAMPLE_RATE};

pub mod output;
pub use output::{
    CaptureDevice, CpalOutputDevice, OutputDevice, OutputError, OutputSpec, OutputStream,
    list_output_devices,
};

pub mod engine;
pub use engine::{
    ConfigError, EngineConfig, EngineError, EngineResult, PlaybackEngine, PlaybackState, Routing,
};

pub mod export;
pub use export::{CoverArtTagger, ExportError, Exporter, LoftyTagger, mixdown};
