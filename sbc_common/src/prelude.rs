//! Prelude module for common re-exports.
//!
//! ```rust
//! use sbc_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, HalConfig, LogLevel, PwmChannelConfig};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::{BusError, HalError, HalResult};

// ─── Pin vocabulary ─────────────────────────────────────────────────
pub use crate::types::{AllocPolicy, Edge, Level, Mode, PinId, PinKind};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{FIXED_FREQUENCY_HZ, MAX_PIN};
