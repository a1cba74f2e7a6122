//! Maps wall-clock time to beacon-chain slots.
//!
//! `SystemTimeSlotClock` drives production; `ManualSlotClock` lets tests tick
//! slots deterministically.

use dv_types::Slot;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait SlotClock: Send + Sync + Clone + 'static {
    /// The current slot, or `None` before genesis.
    fn now(&self) -> Option<Slot>;

    /// Duration until the next slot starts.
    fn duration_to_next_slot(&self) -> Option<Duration>;

    /// Duration until `slot` starts; `None` if it already started.
    fn duration_to_slot(&self, slot: Slot) -> Option<Duration>;

    fn slot_duration(&self) -> Duration;

    /// Unix timestamp of the start of `slot`.
    fn start_of(&self, slot: Slot) -> Duration;
}

#[derive(Clone)]
pub struct SystemTimeSlotClock {
    genesis: Duration,
    slot_duration: Duration,
}

impl SystemTimeSlotClock {
    pub fn new(genesis_time: u64, slot_duration: Duration) -> Self {
        Self {
            genesis: Duration::from_secs(genesis_time),
            slot_duration,
        }
    }

    fn now_duration(&self) -> Option<Duration> {
        SystemTime::now().duration_since(UNIX_EPOCH).ok()
    }
}

impl SlotClock for SystemTimeSlotClock {
    fn now(&self) -> Option<Slot> {
        let now = self.now_duration()?;
        let since_genesis = now.checked_sub(self.genesis)?;
        Some(Slot::new(
            since_genesis.as_secs() / self.slot_duration.as_secs(),
        ))
    }

    fn duration_to_next_slot(&self) -> Option<Duration> {
        let next = self.now()? + 1;
        self.duration_to_slot(next)
    }

    fn duration_to_slot(&self, slot: Slot) -> Option<Duration> {
        let now = self.now_duration()?;
        self.start_of(slot).checked_sub(now)
    }

    fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    fn start_of(&self, slot: Slot) -> Duration {
        self.genesis + self.slot_duration * slot.as_u64() as u32
    }
}

/// A clock that only advances when told to. Shared between the test body and
/// the components holding clones.
#[derive(Clone)]
pub struct ManualSlotClock {
    slot: Arc<RwLock<Slot>>,
    slot_duration: Duration,
}

impl ManualSlotClock {
    pub fn new(slot: Slot, slot_duration: Duration) -> Self {
        Self {
            slot: Arc::new(RwLock::new(slot)),
            slot_duration,
        }
    }

    pub fn set_slot(&self, slot: Slot) {
        *self.slot.write() = slot;
    }

    pub fn advance_slot(&self) {
        let mut guard = self.slot.write();
        *guard = *guard + 1;
    }
}

impl SlotClock for ManualSlotClock {
    fn now(&self) -> Option<Slot> {
        Some(*self.slot.read())
    }

    fn duration_to_next_slot(&self) -> Option<Duration> {
        // Manual clocks never advance on their own; report a full slot so
        // schedulers sleep until the test ticks them.
        Some(self.slot_duration)
    }

    fn duration_to_slot(&self, slot: Slot) -> Option<Duration> {
        let now = (*self.slot.read()).as_u64();
        let target = slot.as_u64();
        (target > now).then(|| self.slot_duration * (target - now) as u32)
    }

    fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    fn start_of(&self, slot: Slot) -> Duration {
        self.slot_duration * slot.as_u64() as u32
    }
}
