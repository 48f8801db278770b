//! HAL core: the component that owns the resource table.
//!
//! `Hal` is the entry point for all pin operations. The operations
//! themselves live in their own modules as further `impl Hal` blocks:
//!
//! - [`crate::alloc`] - allocate / release / teardown
//! - [`crate::digital`] - read / write / set_direction
//! - [`crate::pwm`] - pwm_write / set_range / set_clock
//! - [`crate::interrupt`] - register / unregister and the dispatch thread
//!
//! # Locking
//!
//! One mutex guards the resource table and the interrupt wait-set together.
//! Transfers on an existing record clone the node handle under the lock and
//! perform the I/O after releasing it.

use crate::clock;
use crate::interrupt::{Dispatcher, WaitSet};
use crate::sysfs::{PinBackend, SysfsBackend};
use crate::table::ResourceTable;
use parking_lot::Mutex;
use sbc_common::config::HalConfig;
use sbc_common::error::{HalError, HalResult};
use sbc_common::types::{PinId, PinKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// State guarded by the HAL lock.
pub(crate) struct HalState {
    pub table: ResourceTable,
    pub wait_set: WaitSet,
    /// A dispatch thread is alive and will notice new wait-set entries.
    pub dispatcher_active: bool,
    /// Bumped by teardown; a dispatch thread from an older generation exits.
    pub dispatcher_generation: u64,
}

/// Everything shared between caller threads and the dispatch thread.
pub(crate) struct Shared {
    pub config: HalConfig,
    pub backend: Box<dyn PinBackend>,
    pub state: Mutex<HalState>,
    pub dispatcher: Dispatcher,
}

/// Userspace pin HAL.
///
/// Create one per process, call [`Hal::setup`] once, and share it by
/// reference (or `Arc<Hal>`) between threads. Dropping it runs
/// [`Hal::teardown`].
pub struct Hal {
    pub(crate) shared: Arc<Shared>,
    initialized: AtomicBool,
    board_model: OnceLock<Option<String>>,
}

impl Hal {
    /// Create a HAL over the kernel pin interface described by `config`.
    ///
    /// # Errors
    /// Returns error if configuration validation fails or the dispatcher's
    /// wake channel cannot be created.
    pub fn new(config: HalConfig) -> HalResult<Self> {
        let backend = SysfsBackend::new(&config.gpio_root, &config.pwm_root);
        Self::with_backend(config, backend)
    }

    /// Create a HAL over a custom kernel-interface backend.
    pub fn with_backend(config: HalConfig, backend: impl PinBackend + 'static) -> HalResult<Self> {
        config.validate()?;

        let dispatcher = Dispatcher::new(config.wait_timeout_ms)?;
        let state = HalState {
            table: ResourceTable::new(config.max_pin),
            wait_set: WaitSet::new(config.wait_set_capacity()),
            dispatcher_active: false,
            dispatcher_generation: 0,
        };

        info!(
            "Hal created: max_pin={}, wait_set_capacity={}, {} PWM channel(s)",
            config.max_pin,
            config.wait_set_capacity(),
            config.pwm_channels.len()
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                backend: Box::new(backend),
                state: Mutex::new(state),
                dispatcher,
            }),
            initialized: AtomicBool::new(false),
            board_model: OnceLock::new(),
        })
    }

    /// One-time initialization: captures the epoch clock and identifies the
    /// board. Later calls are no-ops.
    ///
    /// The clock baseline is process-wide and only the first `setup` in the
    /// process captures it. Board identification is per instance, since each
    /// `Hal` reads its own `board_model_path`.
    pub fn setup(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        clock::capture();
        let model = self.board_model.get_or_init(|| {
            let path = &self.shared.config.board_model_path;
            match std::fs::read_to_string(path) {
                Ok(raw) => Some(raw.trim_matches(|c: char| c == '\0' || c.is_whitespace()).to_string()),
                Err(e) => {
                    warn!("Board identification unavailable ({}): {}", path.display(), e);
                    None
                }
            }
        });

        info!(
            "Hal setup complete (board: {})",
            model.as_deref().unwrap_or("unknown")
        );
    }

    /// Whether [`Hal::setup`] has run.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Board identification read during setup.
    pub fn board_model(&self) -> Option<&str> {
        self.board_model.get().and_then(|model| model.as_deref())
    }

    /// Configuration this HAL was created with.
    pub fn config(&self) -> &HalConfig {
        &self.shared.config
    }

    /// Whether `pin` currently has a resource record.
    pub fn is_allocated(&self, pin: PinId) -> bool {
        self.shared.state.lock().table.contains(pin)
    }

    /// Shared-owner count of `pin`'s record (0 = single owner).
    pub fn share_count(&self, pin: PinId) -> Option<u32> {
        self.shared
            .state
            .lock()
            .table
            .get(pin)
            .map(|record| record.share_count)
    }

    /// Kind of `pin`'s record.
    pub fn kind(&self, pin: PinId) -> Option<PinKind> {
        self.shared.state.lock().table.get(pin).map(|record| record.kind())
    }

    /// Pins that currently have a record.
    pub fn allocated_pins(&self) -> Vec<PinId> {
        self.shared.state.lock().table.occupied()
    }

    /// Fail with `OutOfRange` unless `pin` is within the configured range.
    pub(crate) fn check_range(&self, pin: PinId) -> HalResult<()> {
        let max = self.shared.config.max_pin;
        if pin.0 > max {
            return Err(HalError::OutOfRange { pin, max });
        }
        Ok(())
    }
}

impl Drop for Hal {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> HalConfig {
        HalConfig {
            gpio_root: dir.path().to_path_buf(),
            pwm_root: dir.path().to_path_buf(),
            board_model_path: dir.path().join("model"),
            max_pin: 31,
            ..HalConfig::default()
        }
    }

    #[test]
    fn new_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.wait_timeout_ms = 0;
        assert!(matches!(Hal::new(config), Err(HalError::Config(_))));
    }

    #[test]
    fn setup_reads_board_model_once() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("model"), "Test Board Rev 2\0").unwrap();
        let hal = Hal::new(config_in(&dir)).unwrap();
        assert!(!hal.is_initialized());

        hal.setup();
        assert!(hal.is_initialized());
        assert_eq!(hal.board_model(), Some("Test Board Rev 2"));

        fs::write(dir.path().join("model"), "Other Board").unwrap();
        hal.setup();
        assert_eq!(hal.board_model(), Some("Test Board Rev 2"));
    }

    #[test]
    fn setup_tolerates_missing_board_model() {
        let dir = TempDir::new().unwrap();
        let hal = Hal::new(config_in(&dir)).unwrap();
        hal.setup();
        assert!(hal.is_initialized());
        assert_eq!(hal.board_model(), None);
    }

    #[test]
    fn each_instance_identifies_its_board_against_one_clock() {
        let first_dir = TempDir::new().unwrap();
        let second_dir = TempDir::new().unwrap();
        fs::write(first_dir.path().join("model"), "Board A").unwrap();
        fs::write(second_dir.path().join("model"), "Board B").unwrap();
        let first = Hal::new(config_in(&first_dir)).unwrap();
        let second = Hal::new(config_in(&second_dir)).unwrap();

        first.setup();
        let baseline = clock::millis();
        second.setup();

        assert_eq!(first.board_model(), Some("Board A"));
        assert_eq!(second.board_model(), Some("Board B"));
        // The baseline was captured before the second setup and is kept.
        assert!(!clock::capture());
        assert!(clock::millis() >= baseline);
    }

    #[test]
    fn range_check_uses_configured_max() {
        let dir = TempDir::new().unwrap();
        let hal = Hal::new(config_in(&dir)).unwrap();
        assert!(hal.check_range(PinId(31)).is_ok());
        assert!(matches!(
            hal.check_range(PinId(32)),
            Err(HalError::OutOfRange { max: 31, .. })
        ));
    }
}
