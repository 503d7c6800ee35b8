//! tlib guest runner
//!
//! Loads a tlib WebAssembly guest (`index.wasm` or a `.wat` file), drives its
//! `os_main` loop on the headless platform, and optionally saves the last frame
//! as PNG and the audio stream as WAV.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tlib_host::{CommandPolicy, DrivingLoop, HeadlessPlatform, HostConfig, ManualClock, Outcome, SystemClock};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tlib-run")]
#[command(author, version, about = "Run a tlib WebAssembly guest", long_about = None)]
struct Cli {
    /// Guest module, or a directory containing index.wasm
    artifact: Option<PathBuf>,

    /// JSON host configuration; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many os_main calls
    #[arg(long)]
    max_frames: Option<u64>,

    /// Run on virtual time instead of the wall clock (no real sleeping)
    #[arg(long)]
    virtual_time: bool,

    /// Write the last presented frame to this PNG file
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Record the audio stream to this WAV file
    #[arg(long)]
    record_audio: Option<PathBuf>,

    /// How guest host commands (wasm_system / wasm_eval) are handled
    #[arg(long, value_enum)]
    commands: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Commands {
    /// Run with `sh -c`
    Shell,
    /// Log and succeed without running
    Record,
    /// Refuse every command
    Deny,
}

impl From<Commands> for CommandPolicy {
    fn from(c: Commands) -> Self {
        match c {
            Commands::Shell => CommandPolicy::Shell,
            Commands::Record => CommandPolicy::Record,
            Commands::Deny => CommandPolicy::Deny,
        }
    }
}

fn build_config(cli: &Cli) -> Result<HostConfig> {
    let mut config = match &cli.config {
        Some(path) => HostConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => HostConfig::default(),
    };
    if let Some(artifact) = &cli.artifact {
        config = config.artifact(artifact);
    }
    if let Some(frames) = cli.max_frames {
        config = config.max_frames(frames);
    }
    if let Some(commands) = cli.commands {
        config = config.commands(commands.into());
    }
    Ok(config)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging; guest console output is logged at info
    let log_level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = build_config(&cli)?;
    let artifact = config.artifact.clone();

    let mut platform = HeadlessPlatform::new();
    if let Some(path) = &cli.record_audio {
        platform = platform.capture_audio(path);
    }
    let monitor = platform.monitor();

    let mut driver = if cli.virtual_time {
        DrivingLoop::new(config, platform, ManualClock::default())
    } else {
        DrivingLoop::new(config, platform, SystemClock)
    }
    .context("failed to set up host")?;

    let outcome = driver
        .run()
        .with_context(|| format!("failed to run {}", artifact.display()))?;

    if let Some(path) = &cli.screenshot {
        if monitor
            .save_png(path)
            .with_context(|| format!("failed to write {}", path.display()))?
        {
            info!("saved screenshot to {}", path.display());
        } else {
            warn!("guest never presented a frame; no screenshot written");
        }
    }

    let stats = monitor.snapshot();
    info!(
        frames = driver.frames(),
        presented = stats.frames_presented,
        audio_frames = stats.audio_frames,
        "{outcome:?}"
    );

    Ok(match outcome {
        Outcome::Exited | Outcome::FrameLimit => ExitCode::SUCCESS,
        Outcome::Failed(_) => ExitCode::FAILURE,
    })
}
