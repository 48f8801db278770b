//! Allocation manager: creates and destroys resource records.
//!
//! | Policy       | No record     | Record exists                      |
//! |--------------|---------------|------------------------------------|
//! | `Exclusive`  | create        | `AlreadyOwned`, record untouched   |
//! | `Shared`     | create        | `share_count += 1`                 |
//! | `BestEffort` | create        | Ok, record untouched               |
//!
//! Creating a digital record exports the pin and opens its value/direction
//! nodes. Creating a PWM record resolves the pin's channel from the
//! configured table, opens run/period/duty nodes and writes the default
//! period. Destroying a record unexports the pin (digital) or stops the
//! channel (PWM) before its nodes are closed.

use crate::core::{Hal, HalState};
use crate::pwm;
use crate::sysfs::PinNode;
use crate::table::{DigitalState, PwmState, RecordState, ResourceRecord};
use sbc_common::consts::{DEFAULT_PWM_CLOCK, DEFAULT_PWM_RANGE};
use sbc_common::error::{HalError, HalResult};
use sbc_common::types::{AllocPolicy, Mode, PinId, PinKind};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Hal {
    /// Allocate `pin` as `kind` under `policy`.
    ///
    /// # Errors
    /// - `OutOfRange` if `pin` exceeds the configured maximum
    /// - `AlreadyOwned` for an exclusive request on an owned pin
    /// - `KindMismatch` for a shared request of a different kind
    /// - `Unsupported` for analog pins or PWM pins with no mapped channel
    /// - `KernelInterface` if export or opening a node fails
    pub fn allocate(&self, pin: PinId, policy: AllocPolicy, kind: PinKind) -> HalResult<()> {
        self.check_range(pin)?;
        if kind == PinKind::Analog {
            return Err(HalError::Unsupported {
                pin,
                reason: "analog pins are not implemented".to_string(),
            });
        }

        let mut state = self.shared.state.lock();
        if let Some(record) = state.table.get_mut(pin) {
            return match policy {
                AllocPolicy::Exclusive => Err(HalError::AlreadyOwned { pin }),
                AllocPolicy::Shared if record.kind() != kind => Err(HalError::KindMismatch {
                    pin,
                    expected: kind,
                    actual: record.kind(),
                }),
                AllocPolicy::Shared => {
                    record.share_count += 1;
                    debug!("Pin {} shared (share_count={})", pin, record.share_count);
                    Ok(())
                }
                AllocPolicy::BestEffort => Ok(()),
            };
        }

        let record = self.create_record(pin, kind)?;
        state.table.insert(record);
        debug!("Pin {} allocated as {} ({:?})", pin, kind, policy);
        Ok(())
    }

    /// Release one ownership of `pin`.
    ///
    /// A shared record loses one owner; the last owner destroys it. If an
    /// interrupt was registered, no callback for `pin` runs once this returns.
    ///
    /// # Errors
    /// - `NotOwned` if `pin` has no record
    /// - `KernelInterface` if unexport or stopping the channel fails; the
    ///   record is destroyed regardless
    pub fn release(&self, pin: PinId) -> HalResult<()> {
        self.check_range(pin)?;

        let mut state = self.shared.state.lock();
        match state.table.get_mut(pin) {
            None => return Err(HalError::NotOwned { pin }),
            Some(record) if record.share_count > 0 => {
                record.share_count -= 1;
                debug!("Pin {} unshared (share_count={})", pin, record.share_count);
                return Ok(());
            }
            Some(_) => {}
        }

        let record = state.table.take(pin).ok_or(HalError::NotOwned { pin })?;
        let had_interrupt = state.wait_set.remove(pin).is_some();
        let result = self.destroy_record(record);
        drop(state);

        if had_interrupt {
            self.shared.dispatcher.quiesce();
        }
        debug!("Pin {} released", pin);
        result
    }

    /// Destroy every record, ignoring share counts, and stop the dispatcher.
    ///
    /// Safe to call more than once; an empty table is a no-op.
    pub fn teardown(&self) {
        let (released, dispatcher) = {
            let mut state = self.shared.state.lock();
            let pins = state.table.occupied();
            for &pin in &pins {
                if let Some(record) = state.table.take(pin) {
                    if let Err(e) = self.destroy_record(record) {
                        warn!("Teardown of pin {} failed: {}", pin, e);
                    }
                }
            }
            state.wait_set.clear();
            state.dispatcher_generation += 1;
            state.dispatcher_active = false;
            (pins.len(), self.shared.dispatcher.take_thread())
        };

        self.shared.dispatcher.stop(dispatcher);
        if released > 0 {
            info!("Teardown released {} pin(s)", released);
        }
    }

    /// Create the record for `pin` on behalf of a transfer that found none.
    ///
    /// For digital records `mode` is written to the direction node; if that
    /// fails the new record is destroyed again.
    pub(crate) fn allocate_on_demand<'a>(
        &self,
        state: &'a mut HalState,
        pin: PinId,
        kind: PinKind,
        mode: Option<Mode>,
    ) -> HalResult<&'a mut ResourceRecord> {
        let record = self.create_record(pin, kind)?;

        let direction = match (&record.state, mode) {
            (RecordState::Digital(digital), Some(mode)) => Some((Arc::clone(&digital.direction), mode)),
            _ => None,
        };
        if let Some((node, mode)) = direction {
            if let Err(e) = write_node(node.as_ref(), mode.as_str()) {
                drop(node);
                if let Err(cleanup) = self.destroy_record(record) {
                    warn!("Cleanup of pin {} failed: {}", pin, cleanup);
                }
                return Err(e);
            }
        }

        debug!("Pin {} allocated on demand as {}", pin, kind);
        Ok(state.table.insert(record))
    }

    fn create_record(&self, pin: PinId, kind: PinKind) -> HalResult<ResourceRecord> {
        let state = match kind {
            PinKind::Digital => RecordState::Digital(self.create_digital(pin)?),
            PinKind::Pwm => RecordState::Pwm(self.create_pwm(pin)?),
            PinKind::Analog => {
                return Err(HalError::Unsupported {
                    pin,
                    reason: "analog pins are not implemented".to_string(),
                });
            }
        };
        Ok(ResourceRecord {
            pin,
            share_count: 0,
            state,
        })
    }

    fn create_digital(&self, pin: PinId) -> HalResult<DigitalState> {
        let backend = &self.shared.backend;
        backend.export(pin)?;

        match backend.open_digital(pin) {
            Ok(nodes) => Ok(DigitalState {
                value: nodes.value,
                direction: nodes.direction,
                edge: None,
                interrupt: None,
            }),
            Err(e) => {
                if let Err(cleanup) = backend.unexport(pin) {
                    warn!("Unexport of pin {} after failed open failed: {}", pin, cleanup);
                }
                Err(e)
            }
        }
    }

    fn create_pwm(&self, pin: PinId) -> HalResult<PwmState> {
        let config = &self.shared.config;
        let channel = config.pwm_channel(pin).ok_or_else(|| HalError::Unsupported {
            pin,
            reason: "no PWM channel mapped".to_string(),
        })?;

        let nodes = self.shared.backend.open_pwm(channel)?;
        let period = pwm::period_ns(config.fixed_frequency_hz, DEFAULT_PWM_CLOCK, DEFAULT_PWM_RANGE);
        pwm::write_ns(nodes.period.as_ref(), period)?;

        Ok(PwmState {
            channel: channel.to_string(),
            nodes,
            range: DEFAULT_PWM_RANGE,
            clock: DEFAULT_PWM_CLOCK,
            period,
            duty_cycle: 0.0,
        })
    }

    /// Kernel-side teardown of a record that has left the table.
    fn destroy_record(&self, record: ResourceRecord) -> HalResult<()> {
        match record.state {
            RecordState::Digital(digital) => {
                drop(digital);
                self.shared.backend.unexport(record.pin)
            }
            RecordState::Pwm(pwm) => write_node(pwm.nodes.run.as_ref(), "0"),
        }
    }
}

/// Write `value` to `node`, mapping failures to `KernelInterface`.
pub(crate) fn write_node(node: &dyn PinNode, value: &str) -> HalResult<()> {
    node.write_str(value)
        .map_err(|e| HalError::kernel(node.path(), e))
}
