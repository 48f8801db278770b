//! # SBC HAL Binary
//!
//! Command-line access to the pin HAL for bring-up and wiring checks.
//!
//! # Usage
//!
//! ```bash
//! # Read / drive a digital pin
//! sbc_hal read 17
//! sbc_hal write 17 1
//!
//! # 25 % PWM level on pin 18 until Ctrl-C
//! sbc_hal pwm 18 25 --range 512
//!
//! # Log rising edges on pin 27 until Ctrl-C
//! sbc_hal -v watch 27 --edge rising
//!
//! # Board and configuration summary
//! sbc_hal --config /etc/sbc/hal.toml info
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use sbc_common::config::{ConfigError, ConfigLoader, HalConfig};
use sbc_common::consts::DEFAULT_CONFIG_PATH;
use sbc_common::types::{Edge, Level, PinId};
use sbc_hal::{Hal, clock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level as TraceLevel, error, info};
use tracing_subscriber::EnvFilter;

/// SBC HAL - userspace digital I/O, PWM and edge interrupts
#[derive(Parser, Debug)]
#[command(name = "sbc_hal")]
#[command(version)]
#[command(about = "Userspace pin HAL over the kernel sysfs interface")]
#[command(long_about = None)]
struct Args {
    /// Path to the HAL configuration file. Missing file means defaults.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read the level of a digital pin
    Read {
        /// Pin number
        pin: u16,
    },
    /// Drive a digital pin low (0) or high (1)
    Write {
        /// Pin number
        pin: u16,
        /// Level
        #[arg(value_parser = clap::value_parser!(u8).range(0..=1))]
        value: u8,
    },
    /// Set a PWM level (0-100) and hold it until Ctrl-C
    Pwm {
        /// Pin number
        pin: u16,
        /// Level in percent
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,
        /// PWM range
        #[arg(long)]
        range: Option<u32>,
        /// PWM clock divisor
        #[arg(long)]
        clock: Option<u32>,
    },
    /// Log edges on a pin until Ctrl-C
    Watch {
        /// Pin number
        pin: u16,
        /// Edge to watch
        #[arg(long, value_enum, default_value_t = EdgeArg::Both)]
        edge: EdgeArg,
    },
    /// Print board identification and configuration
    Info,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EdgeArg {
    Rising,
    Falling,
    Both,
}

impl From<EdgeArg> for Edge {
    fn from(edge: EdgeArg) -> Self {
        match edge {
            EdgeArg::Rising => Edge::Rising,
            EdgeArg::Falling => Edge::Falling,
            EdgeArg::Both => Edge::Both,
        }
    }
}

fn main() {
    if let Err(e) = run() {
        error!("sbc_hal failed: {}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let (config, from_file) = load_config(&args.config)?;

    setup_tracing(&args, &config);
    info!("SBC HAL v{} starting...", env!("CARGO_PKG_VERSION"));
    if !from_file {
        info!("No config at {}, using defaults", args.config.display());
    }

    let hal = Hal::new(config)?;
    hal.setup();

    match args.command {
        Command::Read { pin } => {
            let level = hal.read(PinId(pin))?;
            println!("{}", level.as_char());
        }
        Command::Write { pin, value } => {
            hal.write(PinId(pin), Level::from(value == 1))?;
        }
        Command::Pwm {
            pin,
            level,
            range,
            clock: divisor,
        } => {
            let pin = PinId(pin);
            if let Some(range) = range {
                hal.set_range(pin, range)?;
            }
            if let Some(divisor) = divisor {
                hal.set_clock(pin, divisor)?;
            }
            hal.pwm_write(pin, level)?;
            if let Some(state) = hal.pwm_state(pin) {
                info!(
                    "PWM {} on {}: period {} ns, duty {} ns",
                    pin, state.channel, state.period as u64, state.duty_cycle as u64
                );
            }
            wait_for_shutdown()?;
        }
        Command::Watch { pin, edge } => {
            hal.register(PinId(pin), edge.into(), |pin: PinId| {
                info!("Edge on pin {} at {} ms", pin, clock::millis());
            })?;
            info!("Watching pin {} ({:?} edges), Ctrl-C to stop", pin, edge);
            wait_for_shutdown()?;
        }
        Command::Info => {
            println!("board: {}", hal.board_model().unwrap_or("unknown"));
            print!("{}", toml::to_string_pretty(hal.config())?);
        }
    }

    hal.teardown();
    info!("SBC HAL shutdown complete");
    Ok(())
}

/// Load the config file; a missing file yields the defaults.
fn load_config(path: &Path) -> Result<(HalConfig, bool), ConfigError> {
    match HalConfig::load(path) {
        Ok(config) => Ok((config, true)),
        Err(ConfigError::FileNotFound) => Ok((HalConfig::default(), false)),
        Err(e) => Err(e),
    }
}

/// Block until Ctrl-C.
fn wait_for_shutdown() -> Result<(), ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        clock::delay(100);
    }
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the config log level.
fn setup_tracing(args: &Args, config: &HalConfig) {
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(TraceLevel::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_directive()))
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
