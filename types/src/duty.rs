//! Duties: the `(slot, type)` obligations of the cluster towards the beacon
//! chain.

use crate::Slot;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumIter, EnumString};

/// The kind of work a duty demands.
///
/// Ordering matters only for deterministic iteration in logs and tests.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DutyType {
    Proposer,
    Attester,
    Aggregator,
    SyncMessage,
    SyncContribution,
    PrepareAggregator,
    PrepareSyncContribution,
    Randao,
    BuilderRegistration,
    VoluntaryExit,
    InfoSync,
}

impl DutyType {
    /// Whether the aggregated signed data of this duty is submitted to the
    /// beacon node. Prepare duties and RANDAO only feed later stages.
    pub fn is_broadcastable(&self) -> bool {
        matches!(
            self,
            DutyType::Proposer
                | DutyType::Attester
                | DutyType::Aggregator
                | DutyType::SyncMessage
                | DutyType::SyncContribution
                | DutyType::BuilderRegistration
                | DutyType::VoluntaryExit
        )
    }

    /// Whether unsigned data must be fetched from the beacon node and agreed
    /// via consensus before validator clients may sign.
    pub fn requires_consensus(&self) -> bool {
        matches!(
            self,
            DutyType::Proposer
                | DutyType::Attester
                | DutyType::Aggregator
                | DutyType::SyncContribution
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Duty {
    pub slot: Slot,
    #[serde(rename = "type")]
    pub duty_type: DutyType,
}

impl Duty {
    pub fn new(slot: Slot, duty_type: DutyType) -> Self {
        Self { slot, duty_type }
    }

    pub fn attester(slot: Slot) -> Self {
        Self::new(slot, DutyType::Attester)
    }

    pub fn proposer(slot: Slot) -> Self {
        Self::new(slot, DutyType::Proposer)
    }

    pub fn aggregator(slot: Slot) -> Self {
        Self::new(slot, DutyType::Aggregator)
    }

    pub fn randao(slot: Slot) -> Self {
        Self::new(slot, DutyType::Randao)
    }

    pub fn sync_message(slot: Slot) -> Self {
        Self::new(slot, DutyType::SyncMessage)
    }

    pub fn sync_contribution(slot: Slot) -> Self {
        Self::new(slot, DutyType::SyncContribution)
    }

    pub fn prepare_aggregator(slot: Slot) -> Self {
        Self::new(slot, DutyType::PrepareAggregator)
    }

    pub fn prepare_sync_contribution(slot: Slot) -> Self {
        Self::new(slot, DutyType::PrepareSyncContribution)
    }

    pub fn builder_registration(slot: Slot) -> Self {
        Self::new(slot, DutyType::BuilderRegistration)
    }

    pub fn voluntary_exit(slot: Slot) -> Self {
        Self::new(slot, DutyType::VoluntaryExit)
    }

    /// The slot after which all state for this duty is dropped.
    pub fn deadline_slot(&self, deadline_slots: u64) -> Slot {
        self.slot + deadline_slots
    }
}

impl fmt::Display for Duty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.duty_type, self.slot)
    }
}
