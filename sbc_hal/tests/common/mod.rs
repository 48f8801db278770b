//! In-memory kernel interface for integration tests.
//!
//! Every node is backed by an eventfd so the dispatch thread can poll it;
//! [`MockNode::trigger`] raises one edge notification.

#![allow(dead_code)]

use nix::poll::PollFlags;
use nix::sys::eventfd::{EfdFlags, EventFd};
use parking_lot::Mutex;
use sbc_common::config::HalConfig;
use sbc_common::error::{HalError, HalResult};
use sbc_common::types::PinId;
use sbc_hal::{DigitalNodes, Hal, PinBackend, PinNode, PwmNodes};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, channel};
use std::time::Duration;

pub const EDGE_TIMEOUT: Duration = Duration::from_secs(2);
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

pub struct MockNode {
    path: PathBuf,
    event: EventFd,
    contents: Mutex<String>,
    writes: Mutex<Vec<String>>,
}

impl MockNode {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            event: EventFd::from_value_and_flags(0, EfdFlags::EFD_NONBLOCK | EfdFlags::EFD_CLOEXEC)
                .expect("eventfd"),
            contents: Mutex::new(String::from("0")),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Raise one edge notification.
    pub fn trigger(&self) {
        self.event.write(1).expect("eventfd write");
    }

    /// Set the value returned by reads without recording a write.
    pub fn set_contents(&self, value: &str) {
        *self.contents.lock() = value.to_string();
    }

    pub fn contents(&self) -> String {
        self.contents.lock().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    pub fn last_write(&self) -> Option<String> {
        self.writes.lock().last().cloned()
    }
}

impl PinNode for MockNode {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_str(&self, value: &str) -> io::Result<()> {
        *self.contents.lock() = value.to_string();
        self.writes.lock().push(value.to_string());
        Ok(())
    }

    fn read_byte(&self) -> io::Result<u8> {
        // Acknowledge any pending edge.
        let _ = self.event.read();
        Ok(self.contents.lock().bytes().next().unwrap_or(b'0'))
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        Ok(())
    }

    fn poll_fd(&self) -> BorrowedFd<'_> {
        self.event.as_fd()
    }

    fn poll_events(&self) -> PollFlags {
        PollFlags::POLLIN
    }
}

#[derive(Default)]
struct Inner {
    nodes: Mutex<HashMap<PathBuf, Arc<MockNode>>>,
    exported: Mutex<BTreeSet<u16>>,
    export_calls: Mutex<Vec<u16>>,
    unexport_calls: Mutex<Vec<u16>>,
    failing_exports: Mutex<HashSet<u16>>,
}

/// Cloneable handle; clones share the same nodes.
#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<Inner>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, path: &str) -> Arc<MockNode> {
        let path = PathBuf::from(path);
        Arc::clone(
            self.inner
                .nodes
                .lock()
                .entry(path.clone())
                .or_insert_with(|| Arc::new(MockNode::new(path))),
        )
    }

    pub fn value(&self, pin: u16) -> Arc<MockNode> {
        self.node(&format!("gpio{pin}/value"))
    }

    pub fn direction(&self, pin: u16) -> Arc<MockNode> {
        self.node(&format!("gpio{pin}/direction"))
    }

    pub fn edge(&self, pin: u16) -> Arc<MockNode> {
        self.node(&format!("gpio{pin}/edge"))
    }

    pub fn is_exported(&self, pin: u16) -> bool {
        self.inner.exported.lock().contains(&pin)
    }

    pub fn export_calls(&self) -> Vec<u16> {
        self.inner.export_calls.lock().clone()
    }

    pub fn unexport_calls(&self) -> Vec<u16> {
        self.inner.unexport_calls.lock().clone()
    }

    pub fn fail_export(&self, pin: u16) {
        self.inner.failing_exports.lock().insert(pin);
    }
}

impl PinBackend for MockBackend {
    fn export(&self, pin: PinId) -> HalResult<()> {
        if self.inner.failing_exports.lock().contains(&pin.0) {
            return Err(HalError::kernel(
                "export",
                io::Error::from(io::ErrorKind::PermissionDenied),
            ));
        }
        self.inner.export_calls.lock().push(pin.0);
        self.inner.exported.lock().insert(pin.0);
        Ok(())
    }

    fn unexport(&self, pin: PinId) -> HalResult<()> {
        self.inner.unexport_calls.lock().push(pin.0);
        self.inner.exported.lock().remove(&pin.0);
        Ok(())
    }

    fn open_digital(&self, pin: PinId) -> HalResult<DigitalNodes> {
        Ok(DigitalNodes {
            value: self.value(pin.0),
            direction: self.direction(pin.0),
        })
    }

    fn open_edge(&self, pin: PinId) -> HalResult<Arc<dyn PinNode>> {
        Ok(self.edge(pin.0))
    }

    fn open_pwm(&self, channel: &str) -> HalResult<PwmNodes> {
        Ok(PwmNodes {
            run: self.node(&format!("{channel}/enable")),
            period: self.node(&format!("{channel}/period")),
            duty: self.node(&format!("{channel}/duty_cycle")),
        })
    }
}

pub fn test_config() -> HalConfig {
    HalConfig {
        max_pin: 63,
        wait_timeout_ms: 50,
        board_model_path: PathBuf::from("/nonexistent/model"),
        ..HalConfig::default()
    }
}

pub fn hal_with(config: HalConfig) -> (Hal, MockBackend) {
    let backend = MockBackend::new();
    let hal = Hal::with_backend(config, backend.clone()).expect("hal");
    hal.setup();
    (hal, backend)
}

pub fn mock_hal() -> (Hal, MockBackend) {
    hal_with(test_config())
}

/// Edge handler that forwards each delivered pin to a channel.
pub fn edge_channel() -> (impl Fn(PinId) + Send + Sync + 'static, Receiver<PinId>) {
    let (tx, rx) = channel();
    let tx = Mutex::new(tx);
    let handler = move |pin: PinId| {
        let _ = tx.lock().send(pin);
    };
    (handler, rx)
}
