//! Configuration loading traits and types.
//!
//! This module provides TOML configuration for the pin HAL.
//!
//! # Usage
//!
//! ```rust,no_run
//! use sbc_common::config::{ConfigError, ConfigLoader, HalConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = HalConfig::load(Path::new("/etc/sbc/hal.toml"))?;
//!     config.validate()?;
//!     println!("gpio root: {}", config.gpio_root.display());
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_BOARD_MODEL_PATH, DEFAULT_GPIO_ROOT, DEFAULT_I2C_DEVICE, DEFAULT_PWM_ROOT,
    DEFAULT_SPI_DEVICE_PREFIX, DEFAULT_WAIT_TIMEOUT_MS, FIXED_FREQUENCY_HZ, MAX_PIN,
};
use crate::types::PinId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Filter directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// One entry of the pin to PWM-channel table.
///
/// # TOML Example
///
/// ```toml
/// [[pwm_channels]]
/// pin = 18
/// channel = "pwmchip0/pwm0"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PwmChannelConfig {
    /// Logical pin.
    pub pin: PinId,
    /// Channel directory relative to `pwm_root`.
    pub channel: String,
}

fn default_gpio_root() -> PathBuf {
    PathBuf::from(DEFAULT_GPIO_ROOT)
}

fn default_pwm_root() -> PathBuf {
    PathBuf::from(DEFAULT_PWM_ROOT)
}

fn default_board_model_path() -> PathBuf {
    PathBuf::from(DEFAULT_BOARD_MODEL_PATH)
}

fn default_i2c_device() -> PathBuf {
    PathBuf::from(DEFAULT_I2C_DEVICE)
}

fn default_spi_device_prefix() -> String {
    DEFAULT_SPI_DEVICE_PREFIX.to_string()
}

fn default_max_pin() -> u16 {
    MAX_PIN
}

fn default_wait_timeout_ms() -> u16 {
    DEFAULT_WAIT_TIMEOUT_MS
}

fn default_fixed_frequency_hz() -> f64 {
    FIXED_FREQUENCY_HZ
}

fn default_pwm_channels() -> Vec<PwmChannelConfig> {
    vec![
        PwmChannelConfig {
            pin: PinId(18),
            channel: "pwmchip0/pwm0".to_string(),
        },
        PwmChannelConfig {
            pin: PinId(19),
            channel: "pwmchip0/pwm1".to_string(),
        },
    ]
}

/// HAL configuration loaded from `hal.toml`.
///
/// Every field has a default, so an empty file is a valid configuration.
///
/// # TOML Example
///
/// ```toml
/// log_level = "debug"
/// gpio_root = "/sys/class/gpio"
/// max_pin = 127
/// wait_timeout_ms = 1000
///
/// [[pwm_channels]]
/// pin = 12
/// channel = "pwmchip0/pwm0"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HalConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Root of the kernel GPIO interface (holds `export`, `unexport`, `gpioN/`).
    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,

    /// Root of the kernel PWM interface.
    #[serde(default = "default_pwm_root")]
    pub pwm_root: PathBuf,

    /// Highest valid pin number.
    #[serde(default = "default_max_pin")]
    pub max_pin: u16,

    /// Interrupt wait-set capacity. Defaults to `max_pin / 2`.
    #[serde(default)]
    pub wait_set_capacity: Option<usize>,

    /// Timeout of one dispatch-thread wait in milliseconds.
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u16,

    /// PWM controller input clock in Hz.
    #[serde(default = "default_fixed_frequency_hz")]
    pub fixed_frequency_hz: f64,

    /// File holding the board identification string.
    #[serde(default = "default_board_model_path")]
    pub board_model_path: PathBuf,

    /// I2C character device used by the bus primitives.
    #[serde(default = "default_i2c_device")]
    pub i2c_device: PathBuf,

    /// SPI character device prefix; the channel number is appended.
    #[serde(default = "default_spi_device_prefix")]
    pub spi_device_prefix: String,

    /// Pin to PWM-channel table. Pins not listed are not PWM capable.
    #[serde(default = "default_pwm_channels")]
    pub pwm_channels: Vec<PwmChannelConfig>,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            gpio_root: default_gpio_root(),
            pwm_root: default_pwm_root(),
            max_pin: default_max_pin(),
            wait_set_capacity: None,
            wait_timeout_ms: default_wait_timeout_ms(),
            fixed_frequency_hz: default_fixed_frequency_hz(),
            board_model_path: default_board_model_path(),
            i2c_device: default_i2c_device(),
            spi_device_prefix: default_spi_device_prefix(),
            pwm_channels: default_pwm_channels(),
        }
    }
}

impl HalConfig {
    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `wait_timeout_ms` > 0
    /// 2. `fixed_frequency_hz` finite and > 0
    /// 3. `wait_set_capacity` >= 1 when given
    /// 4. Every PWM channel pin <= `max_pin`, unique, with a non-empty name
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wait_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "wait_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if !self.fixed_frequency_hz.is_finite() || self.fixed_frequency_hz <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "fixed_frequency_hz must be positive, got {}",
                self.fixed_frequency_hz
            )));
        }

        if self.wait_set_capacity() == 0 {
            return Err(ConfigError::ValidationError(
                "wait_set_capacity must be at least 1".to_string(),
            ));
        }

        let mut pins = HashSet::new();
        for entry in &self.pwm_channels {
            if entry.pin.0 > self.max_pin {
                return Err(ConfigError::ValidationError(format!(
                    "PWM channel pin {} exceeds max_pin {}",
                    entry.pin, self.max_pin
                )));
            }
            if entry.channel.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "PWM channel for pin {} has an empty name",
                    entry.pin
                )));
            }
            if !pins.insert(entry.pin) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate PWM channel pin: {}",
                    entry.pin
                )));
            }
        }

        Ok(())
    }

    /// Effective interrupt wait-set capacity.
    pub fn wait_set_capacity(&self) -> usize {
        self.wait_set_capacity
            .unwrap_or(self.max_pin as usize / 2)
    }

    /// Channel name mapped to `pin`, if any.
    pub fn pwm_channel(&self, pin: PinId) -> Option<&str> {
        self.pwm_channels
            .iter()
            .find(|entry| entry.pin == pin)
            .map(|entry| entry.channel.as_str())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
