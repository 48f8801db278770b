//! Interrupt dispatcher.
//!
//! Registering an edge handler adds the pin's value node to a bounded
//! wait-set. One background thread, started lazily by the first
//! registration, blocks in `poll(2)` on every node in the set plus a wake
//! eventfd, and calls the matching handler when a node reports an edge.
//!
//! ```text
//!  caller threads                         dispatch thread
//!  ──────────────                         ───────────────
//!  register ──► wait-set.push ─┐          loop {
//!  release  ──► wait-set.remove├─ wake ─►   snapshot wait-set (exit if empty)
//!  teardown ──► wait-set.clear ┘            poll(wake + nodes, timeout)
//!                                           for each ready node:
//!                                             read 1 byte (ack)
//!                                             re-check entry under lock
//!                                             handler.on_edge(pin)
//!                                         }
//! ```
//!
//! Handlers run on the dispatch thread and delay every other pending edge
//! while they run. Simultaneous edges are delivered in wait-set order.
//!
//! Once `release`/`unregister` returns, the pin's handler is neither running
//! nor going to run: entries carry a token that is re-validated under the
//! HAL lock, and the releasing thread waits out an in-flight handler.
//!
//! Teardown retires the running thread by bumping the dispatcher generation
//! under the HAL lock. A registration racing with teardown starts a fresh
//! thread for the new generation; the retired one exits at its next pass.

use crate::alloc::write_node;
use crate::core::{Hal, Shared};
use crate::sysfs::PinNode;
use crate::table::{DigitalState, RecordState, Registration};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::eventfd::{EfdFlags, EventFd};
use parking_lot::Mutex;
use sbc_common::error::{HalError, HalResult};
use sbc_common::types::{Edge, Mode, PinId, PinKind};
use std::cell::Cell;
use std::os::fd::AsFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

/// Handler invoked on the dispatch thread when a registered edge occurs.
///
/// Implemented for every `Fn(PinId) + Send + Sync` closure; state the
/// handler needs travels inside the closure or the implementing type.
pub trait EdgeHandler: Send + Sync {
    /// Called once per delivered edge on `pin`. Must not block.
    fn on_edge(&self, pin: PinId);
}

impl<F> EdgeHandler for F
where
    F: Fn(PinId) + Send + Sync,
{
    fn on_edge(&self, pin: PinId) {
        self(pin)
    }
}

/// One watched notification handle.
#[derive(Clone)]
pub(crate) struct WaitSetEntry {
    pub pin: PinId,
    pub node: Arc<dyn PinNode>,
    pub token: u64,
}

/// Bounded set of watched notification handles, in registration order.
pub(crate) struct WaitSet {
    entries: Vec<WaitSetEntry>,
    capacity: usize,
    next_token: u64,
}

impl WaitSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            next_token: 1,
        }
    }

    /// Watch `node` for `pin`; returns the entry's token.
    pub fn push(&mut self, pin: PinId, node: Arc<dyn PinNode>) -> HalResult<u64> {
        if self.is_full() {
            return Err(HalError::WaitSetFull {
                capacity: self.capacity,
            });
        }
        let token = self.next_token;
        self.next_token += 1;
        self.entries.push(WaitSetEntry { pin, node, token });
        Ok(token)
    }

    pub fn remove(&mut self, pin: PinId) -> Option<WaitSetEntry> {
        let idx = self.entries.iter().position(|entry| entry.pin == pin)?;
        Some(self.entries.remove(idx))
    }

    pub fn contains(&self, pin: PinId, token: u64) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.pin == pin && entry.token == token)
    }

    pub fn pins(&self) -> Vec<PinId> {
        self.entries.iter().map(|entry| entry.pin).collect()
    }

    pub fn snapshot(&self) -> Vec<WaitSetEntry> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

thread_local! {
    static ON_DISPATCH_THREAD: Cell<bool> = const { Cell::new(false) };
}

fn on_dispatch_thread() -> bool {
    ON_DISPATCH_THREAD.with(Cell::get)
}

/// Dispatch thread handle, wake channel and handler gate.
pub(crate) struct Dispatcher {
    wake: EventFd,
    /// Held while a handler runs.
    gate: Mutex<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
    timeout_ms: u16,
}

impl Dispatcher {
    pub fn new(timeout_ms: u16) -> HalResult<Self> {
        let wake = EventFd::from_value_and_flags(0, EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK)
            .map_err(|e| HalError::Dispatcher(format!("failed to create wake eventfd: {e}")))?;
        Ok(Self {
            wake,
            gate: Mutex::new(()),
            thread: Mutex::new(None),
            timeout_ms,
        })
    }

    /// Interrupt the current wait so the thread re-reads the wait-set.
    pub fn wake(&self) {
        match self.wake.write(1) {
            Ok(_) | Err(Errno::EAGAIN) => {}
            Err(e) => warn!("Failed to wake interrupt dispatcher: {}", e),
        }
    }

    /// Wake the thread and wait for an in-flight handler to return.
    pub fn quiesce(&self) {
        self.wake();
        if !on_dispatch_thread() {
            drop(self.gate.lock());
        }
    }

    /// Detach the current thread handle from the dispatcher.
    ///
    /// Called under the HAL lock together with a generation bump, so a
    /// registration racing with teardown starts its own thread instead of
    /// feeding the one being stopped.
    pub fn take_thread(&self) -> Option<JoinHandle<()>> {
        self.thread.lock().take()
    }

    /// Wake a retired thread and join it.
    pub fn stop(&self, handle: Option<JoinHandle<()>>) {
        self.wake();
        let Some(handle) = handle else {
            return;
        };
        if on_dispatch_thread() {
            return;
        }
        if handle.join().is_err() {
            error!("Interrupt dispatcher panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Start a dispatch thread serving `generation`.
    ///
    /// Called under the HAL lock. A handle left in the slot belongs to a
    /// thread that already cleared `dispatcher_active` and is on its way
    /// out, so it is detached rather than joined.
    fn spawn(&self, shared: Arc<Shared>, generation: u64) -> HalResult<()> {
        let handle = thread::Builder::new()
            .name("sbc-irq".to_string())
            .spawn(move || dispatch_loop(shared, generation))
            .map_err(|e| HalError::Dispatcher(format!("failed to spawn dispatch thread: {e}")))?;
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Block until the wake channel or an entry is ready, or the timeout
    /// passes. Returns the indices of entries that reported an edge.
    fn wait(&self, entries: &[WaitSetEntry]) -> nix::Result<Vec<usize>> {
        let mut fds = Vec::with_capacity(entries.len() + 1);
        fds.push(PollFd::new(self.wake.as_fd(), PollFlags::POLLIN));
        fds.extend(
            entries
                .iter()
                .map(|entry| PollFd::new(entry.node.poll_fd(), entry.node.poll_events())),
        );

        loop {
            match poll(&mut fds, PollTimeout::from(self.timeout_ms)) {
                Ok(0) => return Ok(Vec::new()),
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e),
            }
        }

        if fds[0]
            .revents()
            .is_some_and(|events| events.contains(PollFlags::POLLIN))
        {
            let _ = self.wake.read();
        }

        Ok(fds[1..]
            .iter()
            .zip(entries)
            .enumerate()
            .filter(|(_, (fd, entry))| {
                fd.revents()
                    .is_some_and(|events| events.intersects(entry.node.poll_events()))
            })
            .map(|(idx, _)| idx)
            .collect())
    }
}

fn dispatch_loop(shared: Arc<Shared>, generation: u64) {
    ON_DISPATCH_THREAD.with(|flag| flag.set(true));
    info!("Interrupt dispatcher started");

    loop {
        let entries = {
            let mut state = shared.state.lock();
            if state.dispatcher_generation != generation {
                break;
            }
            if state.wait_set.is_empty() {
                state.dispatcher_active = false;
                break;
            }
            state.wait_set.snapshot()
        };

        let ready = match shared.dispatcher.wait(&entries) {
            Ok(ready) => ready,
            Err(e) => {
                warn!("Interrupt wait failed, dispatcher exiting: {}", e);
                let mut state = shared.state.lock();
                if state.dispatcher_generation == generation {
                    state.dispatcher_active = false;
                }
                break;
            }
        };

        for idx in ready {
            deliver(&shared, &entries[idx]);
        }
    }

    info!("Interrupt dispatcher stopped");
}

fn deliver(shared: &Shared, entry: &WaitSetEntry) {
    let _gate = shared.dispatcher.gate.lock();

    // The read clears the notification; the next poll only reports new edges.
    if let Err(e) = entry.node.read_byte() {
        if e.kind() != std::io::ErrorKind::WouldBlock {
            debug!("Acknowledge read on pin {} failed: {}", entry.pin, e);
        }
    }

    let handler = {
        let state = shared.state.lock();
        if !state.wait_set.contains(entry.pin, entry.token) {
            trace!("Dropping stale edge on pin {}", entry.pin);
            return;
        }
        match state.table.get(entry.pin).map(|record| &record.state) {
            Some(RecordState::Digital(digital)) => digital
                .interrupt
                .as_ref()
                .map(|registration| (Arc::clone(&registration.handler), registration.edge)),
            _ => None,
        }
    };

    if let Some((handler, edge)) = handler {
        trace!("Edge on pin {} ({})", entry.pin, edge.as_str());
        if panic::catch_unwind(AssertUnwindSafe(|| handler.on_edge(entry.pin))).is_err() {
            error!("Edge handler for pin {} panicked", entry.pin);
        }
    }
}

/// Make `digital`'s value node pollable and give it a wait-set slot,
/// reusing the slot of an existing registration.
fn arm(digital: &mut DigitalState, wait_set: &mut WaitSet, pin: PinId) -> HalResult<u64> {
    digital
        .value
        .set_nonblocking()
        .map_err(|e| HalError::kernel(digital.value.path(), e))?;
    // Clears the pending state a freshly opened node reports on first poll.
    let _ = digital.value.read_byte();

    match &digital.interrupt {
        Some(existing) => Ok(existing.token),
        None => wait_set.push(pin, Arc::clone(&digital.value)),
    }
}

impl Hal {
    /// Register `handler` for `edge` transitions on `pin`.
    ///
    /// The pin is allocated as a digital input on demand and switched to
    /// input if it was an output. Registering again on the same pin
    /// replaces the handler and edge without taking another wait-set slot.
    ///
    /// # Errors
    /// - `InvalidArgument` for `Edge::None` (use [`Hal::unregister`])
    /// - `KindMismatch` if the pin is allocated as PWM
    /// - `WaitSetFull` if every wait-set slot is taken
    /// - `KernelInterface` if the edge or direction node cannot be written
    /// - `Dispatcher` if the dispatch thread cannot be started
    pub fn register<H>(&self, pin: PinId, edge: Edge, handler: H) -> HalResult<()>
    where
        H: EdgeHandler + 'static,
    {
        self.register_handler(pin, edge, Arc::new(handler))
    }

    /// [`Hal::register`] for an already shared handler.
    pub fn register_handler(
        &self,
        pin: PinId,
        edge: Edge,
        handler: Arc<dyn EdgeHandler>,
    ) -> HalResult<()> {
        self.check_range(pin)?;
        if edge == Edge::None {
            return Err(HalError::InvalidArgument(
                "cannot register for edge 'none'; unregister instead".to_string(),
            ));
        }

        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let registered = matches!(
            state.table.get(pin).map(|record| &record.state),
            Some(RecordState::Digital(digital)) if digital.interrupt.is_some()
        );
        if !registered && state.wait_set.is_full() {
            return Err(HalError::WaitSetFull {
                capacity: state.wait_set.capacity(),
            });
        }

        if !state.table.contains(pin) {
            self.allocate_on_demand(state, pin, PinKind::Digital, Some(Mode::Input))?;
        }
        let record = state
            .table
            .get_mut(pin)
            .ok_or(HalError::NotOwned { pin })?;
        let RecordState::Digital(digital) = &mut record.state else {
            return Err(HalError::KindMismatch {
                pin,
                expected: PinKind::Digital,
                actual: PinKind::Pwm,
            });
        };

        write_node(digital.direction.as_ref(), Mode::Input.as_str())?;
        let edge_node = match &digital.edge {
            Some(node) => Arc::clone(node),
            None => {
                let node = self.shared.backend.open_edge(pin)?;
                digital.edge = Some(Arc::clone(&node));
                node
            }
        };
        write_node(edge_node.as_ref(), edge.as_str())?;

        let mut armed = arm(digital, &mut state.wait_set, pin);
        if armed.is_ok() && !state.dispatcher_active {
            let spawned = self
                .shared
                .dispatcher
                .spawn(Arc::clone(&self.shared), state.dispatcher_generation);
            match spawned {
                Ok(()) => state.dispatcher_active = true,
                Err(e) => armed = Err(e),
            }
        }
        let token = match armed {
            Ok(token) => token,
            Err(e) => {
                if !registered {
                    state.wait_set.remove(pin);
                    if let Err(disarm) = write_node(edge_node.as_ref(), Edge::None.as_str()) {
                        warn!("Failed to disarm edge on pin {}: {}", pin, disarm);
                    }
                }
                return Err(e);
            }
        };
        digital.interrupt = Some(Registration {
            handler,
            edge,
            token,
        });
        drop(guard);
        self.shared.dispatcher.wake();

        debug!("Registered {} edge handler on pin {}", edge.as_str(), pin);
        Ok(())
    }

    /// Remove `pin`'s edge handler and disable edge reporting.
    ///
    /// Succeeds without effect if no handler is registered.
    ///
    /// # Errors
    /// `NotOwned` if `pin` has no record.
    pub fn unregister(&self, pin: PinId) -> HalResult<()> {
        self.check_range(pin)?;

        let (removed, result) = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            let record = state
                .table
                .get_mut(pin)
                .ok_or(HalError::NotOwned { pin })?;
            match &mut record.state {
                RecordState::Digital(digital) if digital.interrupt.is_some() => {
                    digital.interrupt = None;
                    state.wait_set.remove(pin);
                    let result = match &digital.edge {
                        Some(node) => write_node(node.as_ref(), Edge::None.as_str()),
                        None => Ok(()),
                    };
                    (true, result)
                }
                _ => (false, Ok(())),
            }
        };

        if removed {
            self.shared.dispatcher.quiesce();
            debug!("Unregistered edge handler on pin {}", pin);
        }
        result
    }

    /// Pins with a registered edge handler, in wait-set order.
    pub fn registered_interrupts(&self) -> Vec<PinId> {
        self.shared.state.lock().wait_set.pins()
    }

    /// Number of occupied wait-set slots.
    pub fn wait_set_len(&self) -> usize {
        self.shared.state.lock().wait_set.len()
    }

    /// Whether a dispatch thread is currently alive.
    pub fn dispatcher_running(&self) -> bool {
        self.shared.dispatcher.is_running()
    }
}
