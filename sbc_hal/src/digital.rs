//! Digital I/O.
//!
//! `read` and `write` need no prior `allocate`: a pin without a record is
//! allocated on demand (input for `read`, output for `write`). Failures of
//! that allocation are returned to the caller rather than masked by a
//! default level.

use crate::alloc::write_node;
use crate::core::Hal;
use crate::pwm;
use crate::sysfs::PinNode;
use crate::table::RecordState;
use sbc_common::consts::DEFAULT_PWM_LEVEL;
use sbc_common::error::{HalError, HalResult};
use sbc_common::types::{Level, Mode, PinId, PinKind};
use std::sync::Arc;
use tracing::trace;

impl Hal {
    /// Read the level of `pin`. Only a `'0'` on the value node reads as low.
    pub fn read(&self, pin: PinId) -> HalResult<Level> {
        let node = self.value_node(pin, Mode::Input)?;
        let byte = node
            .read_byte()
            .map_err(|e| HalError::kernel(node.path(), e))?;
        let level = Level::from_byte(byte);
        trace!("Pin {} read {:?}", pin, level);
        Ok(level)
    }

    /// Drive `pin` to `level`.
    pub fn write(&self, pin: PinId, level: Level) -> HalResult<()> {
        let node = self.value_node(pin, Mode::Output)?;
        let mut buf = [0u8; 4];
        write_node(node.as_ref(), level.as_char().encode_utf8(&mut buf))?;
        trace!("Pin {} wrote {:?}", pin, level);
        Ok(())
    }

    /// Set the direction of `pin`.
    ///
    /// On a PWM pin `Output` writes a 50 % duty cycle and starts the channel;
    /// `Input` stops it.
    pub fn set_direction(&self, pin: PinId, mode: Mode) -> HalResult<()> {
        self.check_range(pin)?;

        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        if !state.table.contains(pin) {
            self.allocate_on_demand(state, pin, PinKind::Digital, Some(mode))?;
            return Ok(());
        }
        let record = state
            .table
            .get_mut(pin)
            .ok_or(HalError::NotOwned { pin })?;

        match &mut record.state {
            RecordState::Digital(digital) => write_node(digital.direction.as_ref(), mode.as_str())?,
            RecordState::Pwm(channel) => match mode {
                Mode::Output => {
                    let duty = pwm::duty_ns(channel.period, DEFAULT_PWM_LEVEL);
                    pwm::write_ns(channel.nodes.duty.as_ref(), duty)?;
                    channel.duty_cycle = duty;
                    write_node(channel.nodes.run.as_ref(), "1")?;
                }
                Mode::Input => write_node(channel.nodes.run.as_ref(), "0")?,
            },
        }
        trace!("Pin {} direction {:?}", pin, mode);
        Ok(())
    }

    /// Value node of `pin`'s digital record, allocating it in `mode` if absent.
    fn value_node(&self, pin: PinId, mode: Mode) -> HalResult<Arc<dyn PinNode>> {
        self.check_range(pin)?;

        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        if !state.table.contains(pin) {
            self.allocate_on_demand(state, pin, PinKind::Digital, Some(mode))?;
        }
        let record = state.table.get(pin).ok_or(HalError::NotOwned { pin })?;

        match &record.state {
            RecordState::Digital(digital) => Ok(Arc::clone(&digital.value)),
            RecordState::Pwm(_) => Err(HalError::KindMismatch {
                pin,
                expected: PinKind::Digital,
                actual: PinKind::Pwm,
            }),
        }
    }
}
