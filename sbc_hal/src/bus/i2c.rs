//! I2C register access over the SMBus ioctl.

use super::open_rw;
use sbc_common::config::HalConfig;
use sbc_common::error::BusError;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::ptr;
use tracing::debug;

const I2C_SLAVE: u32 = 0x0703;
const I2C_SMBUS: u32 = 0x0720;

const SMBUS_WRITE: u8 = 0;
const SMBUS_READ: u8 = 1;

const SMBUS_BYTE: u32 = 1;
const SMBUS_BYTE_DATA: u32 = 2;
const SMBUS_WORD_DATA: u32 = 3;

/// `union i2c_smbus_data`
#[repr(C)]
#[derive(Clone, Copy)]
union SmbusData {
    byte: u8,
    word: u16,
    block: [u8; 34],
}

impl SmbusData {
    fn zeroed() -> Self {
        SmbusData { block: [0; 34] }
    }
}

/// `struct i2c_smbus_ioctl_data`
#[repr(C)]
struct SmbusIoctlData {
    read_write: u8,
    command: u8,
    size: u32,
    data: *mut SmbusData,
}

mod ioctl {
    use super::{I2C_SLAVE, I2C_SMBUS, SmbusIoctlData};

    nix::ioctl_write_int_bad!(set_slave, I2C_SLAVE);
    nix::ioctl_write_ptr_bad!(smbus, I2C_SMBUS, SmbusIoctlData);
}

/// One slave device on an I2C adapter.
#[derive(Debug)]
pub struct I2cDevice {
    file: File,
    address: u16,
}

impl I2cDevice {
    /// Open `device_path` and address the slave at `device_id`.
    pub fn setup(device_path: impl AsRef<Path>, device_id: u16) -> Result<Self, BusError> {
        let path = device_path.as_ref();
        let file = open_rw(path)?;

        // SAFETY: valid descriptor; I2C_SLAVE takes the address by value.
        unsafe { ioctl::set_slave(file.as_raw_fd(), i32::from(device_id)) }.map_err(|source| {
            BusError::Ioctl {
                op: "I2C_SLAVE",
                source,
            }
        })?;

        debug!("I2C device 0x{:02x} opened on {}", device_id, path.display());
        Ok(Self {
            file,
            address: device_id,
        })
    }

    /// [`I2cDevice::setup`] on the configured adapter.
    pub fn from_config(config: &HalConfig, device_id: u16) -> Result<Self, BusError> {
        Self::setup(&config.i2c_device, device_id)
    }

    /// Slave address this device was set up with.
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Receive one byte without a register address.
    pub fn read(&self) -> Result<u8, BusError> {
        let mut data = SmbusData::zeroed();
        self.transfer(SMBUS_READ, 0, SMBUS_BYTE, &mut data)?;
        // SAFETY: every variant is plain bytes and the union was zero-initialized.
        Ok(unsafe { data.byte })
    }

    /// Send one byte without a register address.
    pub fn write(&self, value: u8) -> Result<(), BusError> {
        self.transfer_raw(SMBUS_WRITE, value, SMBUS_BYTE, ptr::null_mut())
    }

    /// Read the 8-bit register `reg`.
    pub fn read8(&self, reg: u8) -> Result<u8, BusError> {
        let mut data = SmbusData::zeroed();
        self.transfer(SMBUS_READ, reg, SMBUS_BYTE_DATA, &mut data)?;
        // SAFETY: see `read`.
        Ok(unsafe { data.byte })
    }

    /// Read the 16-bit register `reg` (SMBus word order, little endian).
    pub fn read16(&self, reg: u8) -> Result<u16, BusError> {
        let mut data = SmbusData::zeroed();
        self.transfer(SMBUS_READ, reg, SMBUS_WORD_DATA, &mut data)?;
        // SAFETY: see `read`.
        Ok(unsafe { data.word })
    }

    /// Write `value` to the 8-bit register `reg`.
    pub fn write8(&self, reg: u8, value: u8) -> Result<(), BusError> {
        let mut data = SmbusData { byte: value };
        self.transfer(SMBUS_WRITE, reg, SMBUS_BYTE_DATA, &mut data)
    }

    /// Write `value` to the 16-bit register `reg`.
    pub fn write16(&self, reg: u8, value: u16) -> Result<(), BusError> {
        let mut data = SmbusData { word: value };
        self.transfer(SMBUS_WRITE, reg, SMBUS_WORD_DATA, &mut data)
    }

    fn transfer(
        &self,
        read_write: u8,
        command: u8,
        size: u32,
        data: &mut SmbusData,
    ) -> Result<(), BusError> {
        self.transfer_raw(read_write, command, size, data)
    }

    fn transfer_raw(
        &self,
        read_write: u8,
        command: u8,
        size: u32,
        data: *mut SmbusData,
    ) -> Result<(), BusError> {
        let args = SmbusIoctlData {
            read_write,
            command,
            size,
            data,
        };
        // SAFETY: `args` and the buffer it points to outlive the call; the
        // kernel accepts a null buffer for SMBUS_BYTE writes.
        unsafe { ioctl::smbus(self.file.as_raw_fd(), &args) }
            .map(drop)
            .map_err(|source| BusError::Ioctl {
                op: "I2C_SMBUS",
                source,
            })
    }
}
