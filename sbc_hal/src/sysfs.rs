//! Kernel pin interface backend.
//!
//! The HAL never touches the pin filesystem directly; it goes through two
//! seams so tests can substitute their own nodes:
//!
//! - [`PinNode`] - one opened attribute node (`value`, `direction`, `edge`,
//!   `enable`, `period`, `duty_cycle`)
//! - [`PinBackend`] - export/unexport and opening of a pin's nodes
//!
//! [`SysfsBackend`] is the production implementation:
//!
//! ```text
//! <gpio_root>/export              write "N" to export pin N
//! <gpio_root>/unexport            write "N" to unexport pin N
//! <gpio_root>/gpioN/value         '0' / '1'
//! <gpio_root>/gpioN/direction     "in" / "out"
//! <gpio_root>/gpioN/edge          "none" / "rising" / "falling" / "both"
//! <pwm_root>/<channel>/enable     "0" / "1"
//! <pwm_root>/<channel>/period     integer nanoseconds
//! <pwm_root>/<channel>/duty_cycle integer nanoseconds
//! ```

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::poll::PollFlags;
use sbc_common::error::{HalError, HalResult};
use sbc_common::types::PinId;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// One opened kernel attribute node.
///
/// All transfers are positioned at offset 0, so a node may be shared between
/// caller threads and the dispatch thread without racing on a file offset.
pub trait PinNode: Send + Sync {
    /// Path of the node, for error reporting.
    fn path(&self) -> &Path;

    /// Write `value` at the start of the node.
    fn write_str(&self, value: &str) -> io::Result<()>;

    /// Read the first byte of the node. Also acknowledges a pending edge.
    fn read_byte(&self) -> io::Result<u8>;

    /// Switch the node to non-blocking reads.
    fn set_nonblocking(&self) -> io::Result<()>;

    /// Descriptor watched by the interrupt dispatcher.
    fn poll_fd(&self) -> BorrowedFd<'_>;

    /// Poll events that signal an edge on this node.
    fn poll_events(&self) -> PollFlags {
        PollFlags::POLLPRI | PollFlags::POLLERR
    }
}

/// Nodes of an exported digital pin.
pub struct DigitalNodes {
    /// Value node.
    pub value: Arc<dyn PinNode>,
    /// Direction node.
    pub direction: Arc<dyn PinNode>,
}

/// Nodes of a PWM channel.
pub struct PwmNodes {
    /// Run control (`enable`).
    pub run: Arc<dyn PinNode>,
    /// Period in nanoseconds.
    pub period: Arc<dyn PinNode>,
    /// Duty cycle in nanoseconds.
    pub duty: Arc<dyn PinNode>,
}

/// Access to the kernel pin interface.
///
/// Implementations must be usable from any thread; the HAL serializes calls
/// for a given pin under its table lock.
pub trait PinBackend: Send + Sync {
    /// Export `pin` so its nodes appear. Exporting an exported pin succeeds.
    fn export(&self, pin: PinId) -> HalResult<()>;

    /// Unexport `pin`. Unexporting a pin that is not exported succeeds.
    fn unexport(&self, pin: PinId) -> HalResult<()>;

    /// Open the value and direction nodes of an exported pin.
    fn open_digital(&self, pin: PinId) -> HalResult<DigitalNodes>;

    /// Open the edge-configuration node of an exported pin.
    fn open_edge(&self, pin: PinId) -> HalResult<Arc<dyn PinNode>>;

    /// Open the run/period/duty nodes of a PWM channel.
    fn open_pwm(&self, channel: &str) -> HalResult<PwmNodes>;
}

/// A kernel attribute file.
#[derive(Debug)]
pub struct SysfsNode {
    path: PathBuf,
    file: File,
}

impl SysfsNode {
    /// Open the node at `path`, read-write when `writable`.
    pub fn open(path: impl Into<PathBuf>, writable: bool) -> HalResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(&path)
            .map_err(|e| HalError::kernel(&path, e))?;
        trace!("Opened {}", path.display());
        Ok(Self { path, file })
    }

    /// Open the node at `path` for writing only.
    pub fn open_write_only(path: impl Into<PathBuf>) -> HalResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|e| HalError::kernel(&path, e))?;
        trace!("Opened {} (write-only)", path.display());
        Ok(Self { path, file })
    }
}

impl PinNode for SysfsNode {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_str(&self, value: &str) -> io::Result<()> {
        self.file.write_all_at(value.as_bytes(), 0)
    }

    fn read_byte(&self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        match self.file.read_at(&mut buf, 0)? {
            0 => Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            _ => Ok(buf[0]),
        }
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        let flags = OFlag::from_bits_truncate(fcntl(&self.file, FcntlArg::F_GETFL)?);
        fcntl(&self.file, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
        Ok(())
    }

    fn poll_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

/// Kernel pin interface rooted at configurable directories.
#[derive(Debug, Clone)]
pub struct SysfsBackend {
    gpio_root: PathBuf,
    pwm_root: PathBuf,
}

impl SysfsBackend {
    /// Create a backend over `gpio_root` and `pwm_root`.
    pub fn new(gpio_root: impl Into<PathBuf>, pwm_root: impl Into<PathBuf>) -> Self {
        Self {
            gpio_root: gpio_root.into(),
            pwm_root: pwm_root.into(),
        }
    }

    /// Directory of an exported pin.
    pub fn pin_dir(&self, pin: PinId) -> PathBuf {
        self.gpio_root.join(format!("gpio{}", pin.0))
    }

    fn write_control(&self, node: &str, pin: PinId, tolerated: i32) -> HalResult<()> {
        let path = self.gpio_root.join(node);
        let control = SysfsNode::open_write_only(&path)?;
        match control.write_str(&pin.0.to_string()) {
            Ok(()) => Ok(()),
            Err(e) if e.raw_os_error() == Some(tolerated) => {
                debug!("{} of pin {} ignored: {}", node, pin, e);
                Ok(())
            }
            Err(e) => Err(HalError::kernel(path, e)),
        }
    }
}

impl PinBackend for SysfsBackend {
    fn export(&self, pin: PinId) -> HalResult<()> {
        if self.pin_dir(pin).is_dir() {
            trace!("Pin {} already exported", pin);
            return Ok(());
        }
        self.write_control("export", pin, libc::EBUSY)
    }

    fn unexport(&self, pin: PinId) -> HalResult<()> {
        self.write_control("unexport", pin, libc::EINVAL)
    }

    fn open_digital(&self, pin: PinId) -> HalResult<DigitalNodes> {
        let dir = self.pin_dir(pin);
        let value = SysfsNode::open(dir.join("value"), true)?;
        let direction = SysfsNode::open_write_only(dir.join("direction"))?;
        Ok(DigitalNodes {
            value: Arc::new(value),
            direction: Arc::new(direction),
        })
    }

    fn open_edge(&self, pin: PinId) -> HalResult<Arc<dyn PinNode>> {
        let edge = SysfsNode::open_write_only(self.pin_dir(pin).join("edge"))?;
        Ok(Arc::new(edge))
    }

    fn open_pwm(&self, channel: &str) -> HalResult<PwmNodes> {
        let dir = self.pwm_root.join(channel);
        let run = SysfsNode::open_write_only(dir.join("enable"))?;
        let period = SysfsNode::open_write_only(dir.join("period"))?;
        let duty = SysfsNode::open_write_only(dir.join("duty_cycle"))?;
        Ok(PwmNodes {
            run: Arc::new(run),
            period: Arc::new(period),
            duty: Arc::new(duty),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fake_gpio_tree(pins: &[u16]) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("export"), "").unwrap();
        fs::write(dir.path().join("unexport"), "").unwrap();
        for pin in pins {
            let pin_dir = dir.path().join(format!("gpio{pin}"));
            fs::create_dir(&pin_dir).unwrap();
            fs::write(pin_dir.join("value"), "0").unwrap();
            fs::write(pin_dir.join("direction"), "in").unwrap();
            fs::write(pin_dir.join("edge"), "none").unwrap();
        }
        dir
    }

    #[test]
    fn export_writes_pin_number() {
        let dir = fake_gpio_tree(&[]);
        let backend = SysfsBackend::new(dir.path(), dir.path());
        backend.export(PinId(17)).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("export")).unwrap(), "17");

        backend.unexport(PinId(17)).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("unexport")).unwrap(), "17");
    }

    #[test]
    fn export_skips_already_exported_pin() {
        let dir = fake_gpio_tree(&[4]);
        let backend = SysfsBackend::new(dir.path(), dir.path());
        backend.export(PinId(4)).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("export")).unwrap(), "");
    }

    #[test]
    fn export_without_control_node_is_kernel_error() {
        let dir = TempDir::new().unwrap();
        let backend = SysfsBackend::new(dir.path(), dir.path());
        assert!(matches!(
            backend.export(PinId(4)),
            Err(HalError::KernelInterface { .. })
        ));
    }

    #[test]
    fn digital_nodes_transfer_at_offset_zero() {
        let dir = fake_gpio_tree(&[5]);
        let backend = SysfsBackend::new(dir.path(), dir.path());
        let nodes = backend.open_digital(PinId(5)).unwrap();

        nodes.direction.write_str("out").unwrap();
        nodes.value.write_str("1").unwrap();
        nodes.value.write_str("1").unwrap();

        assert_eq!(nodes.value.read_byte().unwrap(), b'1');
        assert_eq!(
            fs::read_to_string(dir.path().join("gpio5/value")).unwrap(),
            "1"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("gpio5/direction")).unwrap(),
            "out"
        );
        nodes.value.set_nonblocking().unwrap();
    }

    #[test]
    fn set_nonblocking_keeps_access_mode() {
        let dir = fake_gpio_tree(&[6]);
        let node = SysfsNode::open(dir.path().join("gpio6/value"), true).unwrap();
        let flags = |node: &SysfsNode| {
            OFlag::from_bits_truncate(fcntl(&node.file, FcntlArg::F_GETFL).unwrap())
        };
        assert!(!flags(&node).contains(OFlag::O_NONBLOCK));

        node.set_nonblocking().unwrap();
        assert!(flags(&node).contains(OFlag::O_NONBLOCK));
        assert!(flags(&node).contains(OFlag::O_RDWR));
        assert_eq!(node.read_byte().unwrap(), b'0');
    }

    #[test]
    fn missing_pwm_channel_is_kernel_error() {
        let dir = TempDir::new().unwrap();
        let backend = SysfsBackend::new(dir.path(), dir.path());
        let err = backend.open_pwm("pwmchip0/pwm0").err().unwrap();
        assert!(err.to_string().contains("pwmchip0/pwm0/enable"));
    }
}
