//! # SBC HAL Library
//!
//! Userspace pin HAL for single-board computers: digital I/O, PWM and
//! edge-triggered interrupts over the kernel's sysfs pin interface.
//!
//! # Module Structure
//!
//! - [`core`] - `Hal` struct, setup and record queries
//! - [`alloc`] - Allocation manager (allocate / release / teardown)
//! - [`digital`] - Digital read / write / set_direction
//! - [`pwm`] - PWM level, range and clock divisor
//! - [`interrupt`] - Edge handler registration and the dispatch thread
//! - [`clock`] - Epoch clock and delays
//! - [`sysfs`] - Kernel interface backend (`PinNode`, `PinBackend`)
//! - [`bus`] - I2C / SPI transaction primitives for chip drivers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        sbc_hal (single crate)                    │
//! │  ┌─────────────┐    ┌──────────────────┐    ┌─────────────────┐  │
//! │  │ alloc       │───►│  Hal             │◄───│ interrupt       │  │
//! │  │ digital     │    │  Mutex<HalState> │    │ (dispatch       │  │
//! │  │ pwm         │───►│  table, wait-set │◄───│  thread)        │  │
//! │  └─────────────┘    └────────┬─────────┘    └─────────────────┘  │
//! │                              │                                   │
//! │                              ▼                                   │
//! │                     ┌────────────────┐                           │
//! │                     │  PinBackend    │ (trait object)            │
//! │                     │  SysfsBackend  │                           │
//! │                     └────────────────┘                           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sbc_hal::prelude::*;
//!
//! let hal = Hal::new(HalConfig::default())?;
//! hal.setup();
//! hal.allocate(PinId(17), AllocPolicy::Exclusive, PinKind::Digital)?;
//! hal.write(PinId(17), Level::High)?;
//! hal.register(PinId(27), Edge::Rising, |pin: PinId| println!("edge on {pin}"))?;
//! # Ok::<(), HalError>(())
//! ```

#![warn(missing_docs)]

pub mod alloc;
pub mod bus;
pub mod clock;
pub mod core;
pub mod digital;
pub mod interrupt;
pub mod pwm;
pub mod sysfs;
pub(crate) mod table;

// Re-export key types for convenience
pub use crate::core::Hal;
pub use crate::interrupt::EdgeHandler;
pub use crate::pwm::PwmSnapshot;
pub use crate::sysfs::{DigitalNodes, PinBackend, PinNode, PwmNodes, SysfsBackend, SysfsNode};

/// Common re-exports for HAL users.
pub mod prelude {
    pub use crate::{EdgeHandler, Hal, PwmSnapshot};
    pub use sbc_common::prelude::*;
}
