//! Resource table: one optional record per pin.
//!
//! A record owns every kernel-interface handle of its pin. Dropping the
//! record drops the handles; the allocation manager performs the matching
//! unexport / channel stop before that happens.

use crate::interrupt::EdgeHandler;
use crate::sysfs::{PinNode, PwmNodes};
use sbc_common::types::{Edge, PinId, PinKind};
use std::sync::Arc;

/// Interrupt registration stored on a digital record.
pub(crate) struct Registration {
    pub handler: Arc<dyn EdgeHandler>,
    pub edge: Edge,
    /// Matches the token of this pin's wait-set entry.
    pub token: u64,
}

pub(crate) struct DigitalState {
    pub value: Arc<dyn PinNode>,
    pub direction: Arc<dyn PinNode>,
    /// Opened on first interrupt registration.
    pub edge: Option<Arc<dyn PinNode>>,
    pub interrupt: Option<Registration>,
}

pub(crate) struct PwmState {
    pub channel: String,
    pub nodes: PwmNodes,
    pub range: u32,
    pub clock: u32,
    /// Nanoseconds.
    pub period: f64,
    /// Nanoseconds.
    pub duty_cycle: f64,
}

pub(crate) enum RecordState {
    Digital(DigitalState),
    Pwm(PwmState),
}

pub(crate) struct ResourceRecord {
    pub pin: PinId,
    /// Extra shared owners; 0 means a single owner.
    pub share_count: u32,
    pub state: RecordState,
}

impl ResourceRecord {
    pub fn kind(&self) -> PinKind {
        match self.state {
            RecordState::Digital(_) => PinKind::Digital,
            RecordState::Pwm(_) => PinKind::Pwm,
        }
    }
}

/// Fixed-capacity arena indexed by pin number.
pub(crate) struct ResourceTable {
    slots: Vec<Option<ResourceRecord>>,
}

impl ResourceTable {
    /// Table for pins `0..=max_pin`.
    pub fn new(max_pin: u16) -> Self {
        let mut slots = Vec::with_capacity(max_pin as usize + 1);
        slots.resize_with(max_pin as usize + 1, || None);
        Self { slots }
    }

    pub fn get(&self, pin: PinId) -> Option<&ResourceRecord> {
        self.slots.get(pin.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, pin: PinId) -> Option<&mut ResourceRecord> {
        self.slots.get_mut(pin.index()).and_then(Option::as_mut)
    }

    pub fn contains(&self, pin: PinId) -> bool {
        self.get(pin).is_some()
    }

    /// Store `record` in its pin's slot. The slot must be empty.
    pub fn insert(&mut self, record: ResourceRecord) -> &mut ResourceRecord {
        let slot = &mut self.slots[record.pin.index()];
        debug_assert!(slot.is_none(), "pin {} already has a record", record.pin);
        slot.insert(record)
    }

    pub fn take(&mut self, pin: PinId) -> Option<ResourceRecord> {
        self.slots.get_mut(pin.index()).and_then(Option::take)
    }

    /// Pins with a record, in ascending order.
    pub fn occupied(&self) -> Vec<PinId> {
        self.slots
            .iter()
            .filter_map(|slot| slot.as_ref().map(|record| record.pin))
            .collect()
    }
}
