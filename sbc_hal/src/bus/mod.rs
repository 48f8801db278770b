//! Bus-transaction primitives consumed by chip drivers.
//!
//! Both devices are thin wrappers around a character device and its ioctls.
//! They keep no state besides the open descriptor and never touch the
//! resource table.

pub mod i2c;
pub mod spi;

pub use i2c::I2cDevice;
pub use spi::SpiDevice;

use sbc_common::error::BusError;
use std::fs::{File, OpenOptions};
use std::path::Path;

fn open_rw(path: &Path) -> Result<File, BusError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| BusError::Open {
            path: path.to_path_buf(),
            source,
        })
}
