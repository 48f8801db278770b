//! PWM control.
//!
//! The channel period follows from the controller clock, the clock divisor
//! and the range:
//!
//! ```text
//! period_ns = 1e9 / (fixed_frequency_hz / clock / range)
//! ```
//!
//! With the defaults (100 MHz, clock 1, range 256) that is 2560 ns.
//!
//! The duty cycle written for a level is `period * (100 - level) / 100`, so
//! level 100 writes 0 ns and level 0 writes a full period. Consumers depend
//! on this inverted polarity; do not "fix" it here.

use crate::alloc::write_node;
use crate::core::Hal;
use crate::sysfs::PinNode;
use crate::table::{PwmState, RecordState};
use sbc_common::consts::NANOS_PER_SEC;
use sbc_common::error::{HalError, HalResult};
use sbc_common::types::{PinId, PinKind};
use tracing::trace;

/// Period in nanoseconds for a controller clock, divisor and range.
pub fn period_ns(fixed_frequency_hz: f64, clock: u32, range: u32) -> f64 {
    NANOS_PER_SEC / (fixed_frequency_hz / clock as f64 / range as f64)
}

/// Duty cycle in nanoseconds for `level` percent (inverted polarity).
pub fn duty_ns(period: f64, level: u8) -> f64 {
    period * f64::from(100u8.saturating_sub(level)) / 100.0
}

/// Write a nanosecond value, truncated to an integer.
pub(crate) fn write_ns(node: &dyn PinNode, ns: f64) -> HalResult<()> {
    write_node(node, &(ns as u64).to_string())
}

/// Snapshot of a PWM channel's configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PwmSnapshot {
    /// Channel directory relative to the PWM root.
    pub channel: String,
    /// Range.
    pub range: u32,
    /// Clock divisor.
    pub clock: u32,
    /// Period in nanoseconds.
    pub period: f64,
    /// Duty cycle in nanoseconds.
    pub duty_cycle: f64,
}

impl From<&PwmState> for PwmSnapshot {
    fn from(state: &PwmState) -> Self {
        Self {
            channel: state.channel.clone(),
            range: state.range,
            clock: state.clock,
            period: state.period,
            duty_cycle: state.duty_cycle,
        }
    }
}

impl Hal {
    /// Set the output level of a PWM pin, `0..=100`.
    ///
    /// Allocates the pin as PWM on demand.
    ///
    /// # Errors
    /// `InvalidArgument` for a level above 100, `Unsupported` if the pin has
    /// no PWM channel, `KindMismatch` if it is allocated as digital.
    pub fn pwm_write(&self, pin: PinId, level: u8) -> HalResult<()> {
        if level > 100 {
            return Err(HalError::InvalidArgument(format!(
                "PWM level {level} exceeds 100"
            )));
        }

        self.with_pwm(pin, |channel| {
            let duty = duty_ns(channel.period, level);
            write_ns(channel.nodes.duty.as_ref(), duty)?;
            channel.duty_cycle = duty;
            trace!("Pin {} PWM level {} (duty {} ns)", pin, level, duty as u64);
            Ok(())
        })
    }

    /// Set the PWM range of `pin` and rewrite its period.
    pub fn set_range(&self, pin: PinId, range: u32) -> HalResult<()> {
        if range == 0 {
            return Err(HalError::InvalidArgument("PWM range must be non-zero".to_string()));
        }
        let frequency = self.shared.config.fixed_frequency_hz;
        self.with_pwm(pin, |channel| {
            let period = period_ns(frequency, channel.clock, range);
            write_ns(channel.nodes.period.as_ref(), period)?;
            channel.range = range;
            channel.period = period;
            trace!("Pin {} PWM range {} (period {} ns)", pin, range, period as u64);
            Ok(())
        })
    }

    /// Set the PWM clock divisor of `pin` and rewrite its period.
    pub fn set_clock(&self, pin: PinId, divisor: u32) -> HalResult<()> {
        if divisor == 0 {
            return Err(HalError::InvalidArgument(
                "PWM clock divisor must be non-zero".to_string(),
            ));
        }
        let frequency = self.shared.config.fixed_frequency_hz;
        self.with_pwm(pin, |channel| {
            let period = period_ns(frequency, divisor, channel.range);
            write_ns(channel.nodes.period.as_ref(), period)?;
            channel.clock = divisor;
            channel.period = period;
            trace!("Pin {} PWM clock {} (period {} ns)", pin, divisor, period as u64);
            Ok(())
        })
    }

    /// Current configuration of `pin`'s PWM channel.
    pub fn pwm_state(&self, pin: PinId) -> Option<PwmSnapshot> {
        let state = self.shared.state.lock();
        match &state.table.get(pin)?.state {
            RecordState::Pwm(channel) => Some(PwmSnapshot::from(channel)),
            RecordState::Digital(_) => None,
        }
    }

    /// Run `f` on `pin`'s PWM record under the HAL lock, allocating on demand.
    fn with_pwm<T>(
        &self,
        pin: PinId,
        f: impl FnOnce(&mut PwmState) -> HalResult<T>,
    ) -> HalResult<T> {
        self.check_range(pin)?;

        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        if !state.table.contains(pin) {
            self.allocate_on_demand(state, pin, PinKind::Pwm, None)?;
        }
        let record = state
            .table
            .get_mut(pin)
            .ok_or(HalError::NotOwned { pin })?;

        match &mut record.state {
            RecordState::Pwm(channel) => f(channel),
            RecordState::Digital(_) => Err(HalError::KindMismatch {
                pin,
                expected: PinKind::Pwm,
                actual: PinKind::Digital,
            }),
        }
    }
}
