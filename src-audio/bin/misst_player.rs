use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use misst_audio::{
    CpalOutputDevice, EngineConfig, Exporter, InMemorySettings, JsonFileSettings,
    PlaybackEngine, PlaybackState, Routing, SettingsStore, list_output_devices,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "misst_player")]
#[command(about = "Multi-track stem player with live effects and offline mixdown", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available output devices
    Devices,

    /// Play several tracks in parallel, one output stream per track
    Play {
        /// Audio files (WAV, FLAC, MP3, AAC/M4A, Vorbis/OGG)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Volume per track, in file order (default 1.0 for all)
        #[arg(short, long = "volume", value_name = "VOLUME")]
        volumes: Vec<f32>,

        /// Enable the speed/pitch/reverb/bass chain
        #[arg(short, long)]
        effects: bool,

        /// JSON settings file with speed, pitch, reverb, bass, eq and eq_1..eq_9
        #[arg(short, long, value_name = "FILE")]
        settings: Option<PathBuf>,

        /// YAML engine config (chunk_size, routing, output_device, buffer_ms)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(short, long, value_name = "SECONDS")]
        duration: Option<f64>,

        /// Sum all tracks into one output stream
        #[arg(short, long)]
        mixed: bool,
    },

    /// Mix tracks down into a single WAV file
    Export {
        /// Audio files to mix
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Output WAV path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Volume per track, in file order (default 1.0 for all)
        #[arg(short, long = "volume", value_name = "VOLUME")]
        volumes: Vec<f32>,

        /// Image to embed as front cover
        #[arg(long, value_name = "IMAGE")]
        cover_art: Option<PathBuf>,
    },
}

/// One volume per file, defaulting to unity gain
fn resolve_volumes(files: &[PathBuf], volumes: Vec<f32>) -> Result<Vec<f32>> {
    match volumes.len() {
        0 => Ok(vec![1.0; files.len()]),
        n if n == files.len() => Ok(volumes),
        n => bail!("Got {} volumes for {} files", n, files.len()),
    }
}

fn list_devices() -> Result<()> {
    let default = misst_audio::output::default_output_device_name();
    println!("Output devices:");
    for name in list_output_devices()? {
        let marker = if Some(&name) == default.as_ref() { " (default)" } else { "" };
        println!("  {}{}", name, marker);
    }
    Ok(())
}

fn play(
    files: Vec<PathBuf>,
    volumes: Vec<f32>,
    effects: bool,
    settings: Option<PathBuf>,
    config: Option<PathBuf>,
    duration: Option<f64>,
    mixed: bool,
) -> Result<()> {
    let volumes = resolve_volumes(&files, volumes)?;
    let mut config = match config {
        Some(path) => EngineConfig::from_yaml_file(&path)?,
        None => EngineConfig::default(),
    };
    if mixed {
        config.routing = Routing::MixedBus;
    }

    let settings: Arc<dyn SettingsStore> = match settings {
        Some(path) => Arc::new(JsonFileSettings::new(path)),
        None => Arc::new(InMemorySettings::new()),
    };
    let device = Arc::new(CpalOutputDevice::new(
        config.output_device.clone(),
        config.buffer_ms,
    ));
    let buffer = Duration::from_millis(config.buffer_ms as u64);

    let mut engine = PlaybackEngine::new(&files, &volumes, config, device, settings)?;
    engine.set_effects(effects);
    for i in 0..engine.track_count() {
        println!(
            "  [{}] {} ({:.1}s)",
            i,
            engine.track_path(i)?.display(),
            engine.duration(i)?
        );
    }

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
        .context("Failed to install Ctrl-C handler")?;

    engine.resume()?;
    let started = Instant::now();
    while running.load(Ordering::SeqCst) {
        if engine.state() != PlaybackState::Playing {
            // Let the device drain what is still buffered
            std::thread::sleep(buffer);
            break;
        }
        if duration.is_some_and(|limit| started.elapsed().as_secs_f64() >= limit) {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    let position = engine.position(0)?;
    engine.stop()?;
    println!("Stopped at {:.1}s", position);
    Ok(())
}

fn export(
    files: Vec<PathBuf>,
    output: PathBuf,
    volumes: Vec<f32>,
    cover_art: Option<PathBuf>,
) -> Result<()> {
    let volumes = resolve_volumes(&files, volumes)?;
    let cover_art = cover_art
        .map(|path| {
            std::fs::read(&path)
                .map(|bytes| STANDARD.encode(bytes))
                .with_context(|| format!("Cannot read cover art {}", path.display()))
        })
        .transpose()?;

    Exporter::new().save(&files, &volumes, &output, cover_art.as_deref())?;
    println!("Exported {}", output.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Play {
            files,
            volumes,
            effects,
            settings,
            config,
            duration,
            mixed,
        } => play(files, volumes, effects, settings, config, duration, mixed),
        Commands::Export {
            files,
            output,
            volumes,
            cover_art,
        } => export(files, output, volumes, cover_art),
    }
}
