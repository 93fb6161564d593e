//! keyglass: headless input overlay.
//!
//! Prints the pressed keys and moving axes of every input device, one frame
//! at a time, whenever the rendered text changes.

mod logging;
mod overlay;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use keyglass_input::{Arena, HooksConfig, InputHooks, RawEventSource, SystemClock};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "keyglass", about = "Show live keyboard and mouse input")]
struct Args {
    /// Path to a hooks config JSON file.
    #[arg(long, default_value = "keyglass.json")]
    config: PathBuf,

    /// Override the input device directory from the config.
    #[arg(long)]
    device_dir: Option<PathBuf>,

    /// Frames per second.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Stop after this many seconds instead of running until killed.
    #[arg(long)]
    duration: Option<u64>,

    /// Also write logs to a daily file in this directory.
    #[arg(long, env = "KEYGLASS_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[cfg(target_os = "linux")]
fn input_source(config: &HooksConfig) -> Result<Arc<dyn RawEventSource>> {
    Ok(Arc::new(keyglass_input::source::EvdevSource::new(
        config.device_dir.clone(),
    )))
}

#[cfg(not(target_os = "linux"))]
fn input_source(_config: &HooksConfig) -> Result<Arc<dyn RawEventSource>> {
    anyhow::bail!("no input backend for this platform")
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.log_dir.as_deref(), args.verbose)?;
    info!("keyglass starting");

    let mut config = HooksConfig::load_from(&args.config)?;
    if let Some(dir) = args.device_dir {
        config.device_dir = dir;
    }
    info!(dir = %config.device_dir.display(), "Using input device directory");

    let source = input_source(&config)?;
    let mut hooks = InputHooks::initialize(source, Arc::new(SystemClock::new()), config)
        .context("Failed to initialize input hooks")?;
    for device in hooks.devices() {
        info!(
            device = %device.index,
            name = %device.name,
            path = %device.physical_path,
            kind = ?device.device_type,
            "Input device"
        );
    }

    let frame = Duration::from_secs(1) / args.fps.max(1);
    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut arena = Arena::new();
    let mut last = String::new();

    while deadline.is_none_or(|d| Instant::now() < d) {
        arena.save();
        let text = overlay::describe(&hooks.snapshot(&mut arena), hooks.devices());
        arena.rewind();

        if text != last {
            println!("{}", if text.is_empty() { "(idle)\n" } else { text.as_str() });
            last = text;
        }
        thread::sleep(frame);
    }

    hooks.shutdown();
    info!("keyglass stopped");
    Ok(())
}
