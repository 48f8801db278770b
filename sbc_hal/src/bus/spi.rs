//! SPI full-duplex block transfer over spidev.

use super::open_rw;
use sbc_common::config::HalConfig;
use sbc_common::error::BusError;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use tracing::debug;

const SPI_MODE_0: u8 = 0;
const BITS_PER_WORD: u8 = 8;

/// `struct spi_ioc_transfer`
#[repr(C)]
#[derive(Debug, Default)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    pad: u8,
}

fn ioctl_err(op: &'static str) -> impl FnOnce(nix::Error) -> BusError {
    move |source| BusError::Ioctl { op, source }
}

mod ioctl {
    use super::SpiIocTransfer;

    const SPI_IOC_MAGIC: u8 = b'k';

    nix::ioctl_write_ptr!(write_mode, SPI_IOC_MAGIC, 1, u8);
    nix::ioctl_write_ptr!(write_bits_per_word, SPI_IOC_MAGIC, 3, u8);
    nix::ioctl_write_ptr!(write_max_speed_hz, SPI_IOC_MAGIC, 4, u32);
    nix::ioctl_write_buf!(message, SPI_IOC_MAGIC, 0, SpiIocTransfer);
}

/// One chip-select channel of an SPI controller.
#[derive(Debug)]
pub struct SpiDevice {
    file: File,
    channel: u8,
    speed_hz: u32,
}

impl SpiDevice {
    /// Open `<prefix><channel>` in mode 0 with 8-bit words at `speed_hz`.
    pub fn setup(prefix: &str, channel: u8, speed_hz: u32) -> Result<Self, BusError> {
        let path = PathBuf::from(format!("{prefix}{channel}"));
        let file = open_rw(&path)?;
        let fd = file.as_raw_fd();

        // SAFETY: valid descriptor; each argument lives across its call.
        unsafe {
            ioctl::write_mode(fd, &SPI_MODE_0).map_err(ioctl_err("SPI_IOC_WR_MODE"))?;
            ioctl::write_bits_per_word(fd, &BITS_PER_WORD)
                .map_err(ioctl_err("SPI_IOC_WR_BITS_PER_WORD"))?;
            ioctl::write_max_speed_hz(fd, &speed_hz)
                .map_err(ioctl_err("SPI_IOC_WR_MAX_SPEED_HZ"))?;
        }

        debug!(
            "SPI channel {} opened on {} at {} Hz",
            channel,
            path.display(),
            speed_hz
        );
        Ok(Self {
            file,
            channel,
            speed_hz,
        })
    }

    /// [`SpiDevice::setup`] on the configured controller.
    pub fn from_config(config: &HalConfig, channel: u8, speed_hz: u32) -> Result<Self, BusError> {
        Self::setup(&config.spi_device_prefix, channel, speed_hz)
    }

    /// Chip-select channel.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Clock speed set at setup.
    pub fn speed_hz(&self) -> u32 {
        self.speed_hz
    }

    /// Clock `buffer` out and replace its contents with the bytes clocked in.
    pub fn transfer(&self, buffer: &mut [u8]) -> Result<(), BusError> {
        let transfer = SpiIocTransfer {
            tx_buf: buffer.as_ptr() as u64,
            rx_buf: buffer.as_mut_ptr() as u64,
            len: buffer.len() as u32,
            speed_hz: self.speed_hz,
            bits_per_word: BITS_PER_WORD,
            ..SpiIocTransfer::default()
        };
        // SAFETY: tx and rx point into `buffer`, which outlives the call and
        // is `len` bytes long.
        unsafe { ioctl::message(self.file.as_raw_fd(), std::slice::from_ref(&transfer)) }
            .map(drop)
            .map_err(|source| BusError::Ioctl {
                op: "SPI_IOC_MESSAGE",
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn transfer_struct_matches_kernel_layout() {
        assert_eq!(size_of::<SpiIocTransfer>(), 32);
    }

    #[test]
    fn setup_opens_prefix_plus_channel() {
        let dir = tempfile::TempDir::new().unwrap();
        let prefix = format!("{}/spidev0.", dir.path().display());
        let err = SpiDevice::setup(&prefix, 1, 1_000_000).unwrap_err();
        assert!(matches!(err, BusError::Open { .. }));
        assert!(err.to_string().contains("spidev0.1"));
    }
}
