//! HAL and bus error types.
//!
//! This module defines:
//! - `HalError` - errors of the allocation manager, digital/PWM transfers and
//!   the interrupt dispatcher
//! - `BusError` - errors of the I2C/SPI bus primitives
//! - `HalResult` type alias

use crate::config::ConfigError;
use crate::types::{PinId, PinKind};
use std::path::PathBuf;
use thiserror::Error;

/// Error types for HAL operations.
#[derive(Debug, Error)]
pub enum HalError {
    /// Pin number outside `[0, max]`
    #[error("Pin {pin} out of range (max {max})")]
    OutOfRange {
        /// Requested pin
        pin: PinId,
        /// Highest valid pin
        max: u16,
    },

    /// Exclusive allocation of a pin that already has a record
    #[error("Pin {pin} is already owned")]
    AlreadyOwned {
        /// Requested pin
        pin: PinId,
    },

    /// Release of a pin that has no record
    #[error("Pin {pin} is not owned")]
    NotOwned {
        /// Requested pin
        pin: PinId,
    },

    /// Pin cannot be used in the requested kind
    #[error("Pin {pin} unsupported: {reason}")]
    Unsupported {
        /// Requested pin
        pin: PinId,
        /// Why the request cannot be served
        reason: String,
    },

    /// Pin record exists with a different kind than the operation needs
    #[error("Pin {pin} is allocated as {actual}, expected {expected}")]
    KindMismatch {
        /// Requested pin
        pin: PinId,
        /// Kind the operation needs
        expected: PinKind,
        /// Kind of the existing record
        actual: PinKind,
    },

    /// Export, open or transfer on a kernel-interface node failed
    #[error("Kernel interface error on {}: {source}", path.display())]
    KernelInterface {
        /// Node that failed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Interrupt wait-set has no free slot
    #[error("Interrupt wait-set full (capacity {capacity})")]
    WaitSetFull {
        /// Wait-set capacity
        capacity: usize,
    },

    /// Argument outside its valid domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Dispatch thread or its wake channel could not be set up
    #[error("Interrupt dispatcher error: {0}")]
    Dispatcher(String),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HalError {
    /// Wrap an IO error raised on the kernel-interface node at `path`.
    pub fn kernel(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HalError::KernelInterface {
            path: path.into(),
            source,
        }
    }
}

/// Result type for HAL operations
pub type HalResult<T> = Result<T, HalError>;

/// Errors raised by the I2C/SPI bus primitives.
#[derive(Debug, Error)]
pub enum BusError {
    /// Bus character device could not be opened
    #[error("Failed to open bus device {}: {source}", path.display())]
    Open {
        /// Device path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Bus ioctl failed
    #[error("Bus ioctl {op} failed: {source}")]
    Ioctl {
        /// Name of the failed operation
        op: &'static str,
        /// Underlying errno
        #[source]
        source: nix::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hal_error_display() {
        let err = HalError::OutOfRange {
            pin: PinId(300),
            max: 255,
        };
        assert!(err.to_string().contains("300"));
        assert!(err.to_string().contains("255"));

        let err = HalError::kernel(
            "/sys/class/gpio/export",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("/sys/class/gpio/export"));
    }

    #[test]
    fn test_kind_mismatch_display() {
        let err = HalError::KindMismatch {
            pin: PinId(18),
            expected: PinKind::Digital,
            actual: PinKind::Pwm,
        };
        assert_eq!(err.to_string(), "Pin 18 is allocated as pwm, expected digital");
    }

    #[test]
    fn test_config_error_converts() {
        let err: HalError = ConfigError::FileNotFound.into();
        assert!(matches!(err, HalError::Config(ConfigError::FileNotFound)));
    }
}
