//! SBC Common Library
//!
//! Shared constants, pin vocabulary, error types and configuration loading
//! for the SBC pin HAL workspace.
//!
//! # Module Structure
//!
//! - [`consts`] - Numeric limits, board constants and default paths
//! - [`types`] - `PinId`, `Level`, `Mode`, `Edge`, `PinKind`, `AllocPolicy`
//! - [`error`] - `HalError`, `BusError`
//! - [`config`] - `HalConfig` and the `ConfigLoader` trait
//! - [`prelude`] - Common re-exports for convenience

pub mod config;
pub mod consts;
pub mod error;
pub mod prelude;
pub mod types;
