//! bytebeat CLI - live player and offline renderer

use bytebeat::config::LiveConfig;
use bytebeat::error::LiveResult;
use bytebeat::{live, render};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, Level};

#[derive(Parser)]
#[command(name = "bytebeat")]
#[command(about = "Live-reloading bytebeat player", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/bytebeat/config.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log render loop transitions and unchanged reloads
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a formula file and reload it whenever it changes
    Play {
        /// Formula file (created with a default formula if missing)
        file: PathBuf,

        /// Logical sample rate `t` advances at (default: 8000)
        rate: Option<u32>,

        /// Output device sample rate (default: 44100)
        #[arg(long)]
        physical_rate: Option<u32>,

        /// Samples per rendered frame (default: 1024)
        #[arg(long)]
        frame_size: Option<usize>,

        /// Restart `t` at 0 after every successful reload
        #[arg(long)]
        reset_time_on_reload: bool,

        /// Let audio queued by the old formula play out after a reload
        #[arg(long)]
        no_flush_on_reload: bool,
    },

    /// Render a formula file to WAV
    Render {
        /// Formula file
        file: PathBuf,

        /// Output WAV file path
        output: PathBuf,

        /// Logical sample rate `t` advances at (default: 8000)
        rate: Option<u32>,

        /// Duration in seconds
        #[arg(short, long, default_value = "10.0")]
        seconds: f64,

        /// Output sample rate (default: 44100)
        #[arg(long)]
        physical_rate: Option<u32>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> LiveResult<()> {
    let mut config = LiveConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Play {
            file,
            rate,
            physical_rate,
            frame_size,
            reset_time_on_reload,
            no_flush_on_reload,
        } => {
            if let Some(rate) = rate {
                config.logical_rate = rate;
            }
            if let Some(rate) = physical_rate {
                config.physical_rate = rate;
            }
            if let Some(samples) = frame_size {
                config.frame_samples = samples;
            }
            config.reset_time_on_reload |= reset_time_on_reload;
            if no_flush_on_reload {
                config.flush_on_reload = false;
            }
            config.validate()?;

            live::run_live(&file, &config)
        }

        Commands::Render {
            file,
            output,
            rate,
            seconds,
            physical_rate,
        } => {
            if let Some(rate) = rate {
                config.logical_rate = rate;
            }
            if let Some(rate) = physical_rate {
                config.physical_rate = rate;
            }
            config.validate()?;

            render::render_to_wav(&file, &output, &config, seconds)?;
            Ok(())
        }
    }
}
