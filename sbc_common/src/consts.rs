//! System-wide constants for the SBC pin HAL.
//!
//! Single source of truth for numeric limits, board constants and default
//! kernel-interface paths. Configuration defaults are derived from these.

/// Highest valid pin number (inclusive).
pub const MAX_PIN: u16 = 255;

/// Default wait-set capacity (one notification handle per two pins).
pub const DEFAULT_WAIT_SET_CAPACITY: usize = MAX_PIN as usize / 2;

/// Default timeout of one multiplexed wait in the dispatch thread (ms).
pub const DEFAULT_WAIT_TIMEOUT_MS: u16 = 5000;

/// PWM controller input clock in Hz.
pub const FIXED_FREQUENCY_HZ: f64 = 100_000_000.0;

/// PWM range applied to a freshly allocated channel.
pub const DEFAULT_PWM_RANGE: u32 = 256;

/// PWM clock divisor applied to a freshly allocated channel.
pub const DEFAULT_PWM_CLOCK: u32 = 1;

/// Duty level written when a PWM pin is switched to output mode (percent).
pub const DEFAULT_PWM_LEVEL: u8 = 50;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Below this many microseconds `delay_us` busy-polls instead of sleeping.
pub const BUSY_WAIT_THRESHOLD_US: u64 = 100;

/// Default root of the kernel GPIO interface.
pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

/// Default root of the kernel PWM interface.
pub const DEFAULT_PWM_ROOT: &str = "/sys/class/pwm";

/// Default source of the board identification string.
pub const DEFAULT_BOARD_MODEL_PATH: &str = "/proc/device-tree/model";

/// Default I2C character device.
pub const DEFAULT_I2C_DEVICE: &str = "/dev/i2c-1";

/// Default SPI character device prefix; the channel number is appended.
pub const DEFAULT_SPI_DEVICE_PREFIX: &str = "/dev/spidev0.";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sbc/hal.toml";
