//! Submits aggregated signed data to the beacon node.
//!
//! Subscribes to new AggSigDB entries. Broadcastable duty types are submitted
//! at most once per `(duty, pubkey)`; transient submission failures retry
//! with exponential backoff until the duty deadline.

use crate::Error;
use beacon_client::BeaconApi;
use dv_types::{Duty, PublicKeyBytes, SignedData};
use parking_lot::Mutex;
use slog::{debug, info, warn, Logger};
use slot_clock::SlotClock;
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Broadcaster<B: BeaconApi, C: SlotClock> {
    beacon: B,
    clock: C,
    deadline_slots: u64,
    submitted: Mutex<HashSet<(Duty, PublicKeyBytes)>>,
    shutdown: CancellationToken,
    log: Logger,
}

impl<B: BeaconApi, C: SlotClock> Broadcaster<B, C> {
    pub fn new(
        beacon: B,
        clock: C,
        deadline_slots: u64,
        shutdown: CancellationToken,
        log: Logger,
    ) -> Self {
        Self {
            beacon,
            clock,
            deadline_slots,
            submitted: Mutex::new(HashSet::new()),
            shutdown,
            log,
        }
    }

    /// Submits `signed` to the beacon node, once per `(duty, pubkey)`.
    pub async fn broadcast(
        &self,
        duty: Duty,
        pubkey: PublicKeyBytes,
        signed: SignedData,
    ) -> Result<(), Error> {
        if !duty.duty_type.is_broadcastable() {
            debug!(self.log, "Duty type not broadcastable"; "duty" => %duty);
            return Ok(());
        }

        if !self.submitted.lock().insert((duty, pubkey)) {
            debug!(self.log, "Duty already submitted"; "duty" => %duty, "pubkey" => ?pubkey);
            return Ok(());
        }

        let deadline = duty.deadline_slot(self.deadline_slots);
        let mut backoff = Duration::from_millis(500);

        loop {
            match self.submit(&signed).await {
                Ok(()) => {
                    info!(
                        self.log, "Broadcast signed duty data";
                        "duty" => %duty, "pubkey" => ?pubkey,
                    );
                    return Ok(());
                }
                Err(e) if e.is_transient() => {
                    if self.clock.now().is_some_and(|now| now > deadline) {
                        warn!(
                            self.log, "Broadcast abandoned at duty deadline";
                            "duty" => %duty, "error" => ?e,
                        );
                        return Err(Error::DeadlineExceeded(duty));
                    }
                    warn!(
                        self.log, "Broadcast failed; retrying";
                        "duty" => %duty, "error" => ?e, "backoff_millis" => backoff.as_millis(),
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = std::cmp::min(backoff * 2, self.clock.slot_duration());
                }
                Err(e) => return Err(Error::BeaconApi(e)),
            }
        }
    }

    async fn submit(&self, signed: &SignedData) -> Result<(), beacon_client::Error> {
        match signed {
            SignedData::Attestation(att) => {
                self.beacon.submit_attestations(std::slice::from_ref(att)).await
            }
            SignedData::Proposal(proposal) => self.beacon.submit_proposal(proposal).await,
            SignedData::AggregateAndProof(aggregate) => {
                self.beacon
                    .submit_aggregates(std::slice::from_ref(aggregate))
                    .await
            }
            SignedData::SyncMessage(message) => {
                self.beacon
                    .submit_sync_messages(std::slice::from_ref(message))
                    .await
            }
            SignedData::SyncContribution(contribution) => {
                self.beacon
                    .submit_sync_contributions(std::slice::from_ref(contribution))
                    .await
            }
            SignedData::VoluntaryExit(exit) => self.beacon.submit_voluntary_exit(exit).await,
            SignedData::Registration(registration) => {
                self.beacon
                    .register_validators(std::slice::from_ref(registration))
                    .await
            }
            // Guarded by `is_broadcastable` above.
            SignedData::Randao(_)
            | SignedData::BeaconCommitteeSelection(_)
            | SignedData::SyncCommitteeSelection(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use beacon_client::mock::MockBeaconNode;
    use dv_types::{Epoch, Slot};
    use slot_clock::ManualSlotClock;
    use std::sync::Arc;

    fn broadcaster(
        slot: u64,
    ) -> (Arc<Broadcaster<MockBeaconNode, ManualSlotClock>>, MockBeaconNode) {
        let node = MockBeaconNode::new();
        let clock = ManualSlotClock::new(Slot::new(slot), Duration::from_millis(100));
        let broadcaster = Broadcaster::new(
            node.clone(),
            clock,
            2,
            CancellationToken::new(),
            null_logger(),
        );
        (Arc::new(broadcaster), node)
    }

    fn pubkey() -> PublicKeyBytes {
        PublicKeyBytes::from([7u8; 48])
    }

    #[tokio::test]
    async fn attestation_submitted_exactly_once() {
        let (broadcaster, node) = broadcaster(32);
        let duty = Duty::attester(Slot::new(32));
        let signed = signed_attestation(32, 0x0a, 0xcc);

        broadcaster
            .broadcast(duty, pubkey(), signed.clone())
            .await
            .unwrap();
        // A duplicate event (e.g. replayed subscriber call) is swallowed.
        broadcaster.broadcast(duty, pubkey(), signed).await.unwrap();

        assert_eq!(node.submitted_attestations().len(), 1);
    }

    #[tokio::test]
    async fn transient_failure_retried() {
        let (broadcaster, node) = broadcaster(32);
        node.fail_next_submissions(2);

        let duty = Duty::attester(Slot::new(32));
        broadcaster
            .broadcast(duty, pubkey(), signed_attestation(32, 0x0a, 0xcc))
            .await
            .unwrap();

        assert_eq!(node.submitted_attestations().len(), 1);
    }

    #[tokio::test]
    async fn non_broadcastable_completes_silently() {
        let (broadcaster, node) = broadcaster(32);
        let duty = Duty::randao(Slot::new(32));

        broadcaster
            .broadcast(duty, pubkey(), signed_randao(Epoch::new(1), 1))
            .await
            .unwrap();

        assert!(node.submitted_attestations().is_empty());
        assert!(node.submitted_proposals().is_empty());
    }

    #[tokio::test]
    async fn deadline_abandons_retries() {
        let (broadcaster, node) = broadcaster(40);
        node.fail_next_submissions(u32::MAX);

        // Slot 32's deadline (34) is long past at slot 40.
        let duty = Duty::attester(Slot::new(32));
        let result = broadcaster
            .broadcast(duty, pubkey(), signed_attestation(32, 0x0a, 0xcc))
            .await;

        assert!(matches!(result, Err(Error::DeadlineExceeded(_))));
        assert!(node.submitted_attestations().is_empty());
    }
}
