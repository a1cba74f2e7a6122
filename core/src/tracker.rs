//! Per-duty lifecycle tracking.
//!
//! Every stage reports progress; transitions are monotonic. Duties that miss
//! their deadline are logged and garbage-collected on slot ticks.

use dv_types::{Duty, Slot};
use parking_lot::Mutex;
use slog::{debug, info, warn, Logger};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DutyState {
    Pending,
    Fetched,
    Decided,
    PartialsCollected,
    Aggregated,
    Broadcast,
    Done,
    Failed,
}

impl std::fmt::Display for DutyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DutyState::Pending => "pending",
            DutyState::Fetched => "fetched",
            DutyState::Decided => "decided",
            DutyState::PartialsCollected => "partials_collected",
            DutyState::Aggregated => "aggregated",
            DutyState::Broadcast => "broadcast",
            DutyState::Done => "done",
            DutyState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

pub struct Tracker {
    duties: Mutex<HashMap<Duty, DutyState>>,
    deadline_slots: u64,
    log: Logger,
}

impl Tracker {
    pub fn new(deadline_slots: u64, log: Logger) -> Self {
        Self {
            duties: Mutex::new(HashMap::new()),
            deadline_slots,
            log,
        }
    }

    /// Advances `duty` to `state`; regressions are ignored.
    pub fn transition(&self, duty: Duty, state: DutyState) {
        let mut duties = self.duties.lock();
        let current = duties.entry(duty).or_insert(DutyState::Pending);
        if state <= *current {
            return;
        }
        *current = state;
        match state {
            DutyState::Done => info!(self.log, "Duty completed"; "duty" => %duty),
            DutyState::Failed => warn!(self.log, "Duty failed"; "duty" => %duty),
            _ => debug!(self.log, "Duty progressed"; "duty" => %duty, "state" => %state),
        }
    }

    pub fn state(&self, duty: Duty) -> Option<DutyState> {
        self.duties.lock().get(&duty).copied()
    }

    /// Garbage-collects duties whose deadline has passed, logging the ones
    /// that never completed.
    pub fn on_slot(&self, slot: Slot) {
        let mut duties = self.duties.lock();
        duties.retain(|duty, state| {
            if duty.deadline_slot(self.deadline_slots) >= slot {
                return true;
            }
            if *state < DutyState::Done {
                warn!(
                    self.log, "Duty expired before completion";
                    "duty" => %duty, "state" => %*state,
                );
            }
            false
        });
    }
}
