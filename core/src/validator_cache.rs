//! Per-epoch cache of the cluster's validators on the beacon chain.
//!
//! Reads take the shared lock; refills take the exclusive lock and are
//! idempotent, so concurrent readers racing a refill observe one consistent
//! fill. Only the scheduler calls `trim`, on epoch transitions.

use crate::Error;
use beacon_client::{BeaconApi, StateId};
use dv_types::{PublicKeyBytes, Slot, ValidatorData, ValidatorStatus};
use slog::{debug, warn, Logger};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct CacheState {
    head: Option<Vec<ValidatorData>>,
    /// Active subset of the head response, by validator index.
    active_by_index: HashMap<u64, (PublicKeyBytes, ValidatorStatus)>,
    by_slot: HashMap<Slot, Vec<ValidatorData>>,
}

pub struct ValidatorCache<B: BeaconApi> {
    beacon: B,
    pubkeys: Vec<PublicKeyBytes>,
    inner: RwLock<CacheState>,
    log: Logger,
}

impl<B: BeaconApi> ValidatorCache<B> {
    pub fn new(beacon: B, pubkeys: Vec<PublicKeyBytes>, log: Logger) -> Self {
        Self {
            beacon,
            pubkeys,
            inner: RwLock::new(CacheState::default()),
            log,
        }
    }

    /// Cluster validators at the head state, cached until the next trim.
    pub async fn get_by_head(&self) -> Result<Vec<ValidatorData>, Error> {
        if let Some(cached) = self.inner.read().await.head.clone() {
            return Ok(cached);
        }

        let mut state = self.inner.write().await;
        // Another refill may have won the write lock first.
        if let Some(cached) = state.head.clone() {
            return Ok(cached);
        }

        let validators = self
            .beacon
            .validators(StateId::Head, &self.pubkeys)
            .await
            .map_err(Error::BeaconApi)?;
        fill_head(&mut state, validators.clone());
        debug!(self.log, "Refreshed validator cache"; "validators" => validators.len());
        Ok(validators)
    }

    /// Cluster validators at `slot`. On beacon-node failure falls back to the
    /// head response and reports `refreshed_by_slot = false` so the caller
    /// can retry next slot.
    pub async fn get_by_slot(&self, slot: Slot) -> Result<(Vec<ValidatorData>, bool), Error> {
        if let Some(cached) = self.inner.read().await.by_slot.get(&slot).cloned() {
            return Ok((cached, true));
        }

        let mut state = self.inner.write().await;
        if let Some(cached) = state.by_slot.get(&slot).cloned() {
            return Ok((cached, true));
        }

        match self.beacon.validators(StateId::Slot(slot), &self.pubkeys).await {
            Ok(validators) => {
                state.by_slot.insert(slot, validators.clone());
                Ok((validators, true))
            }
            Err(e) => {
                warn!(
                    self.log, "Validator lookup by slot failed; falling back to head";
                    "slot" => %slot, "error" => ?e,
                );
                let head = match state.head.clone() {
                    Some(head) => head,
                    None => {
                        let validators = self
                            .beacon
                            .validators(StateId::Head, &self.pubkeys)
                            .await
                            .map_err(Error::BeaconApi)?;
                        fill_head(&mut state, validators.clone());
                        validators
                    }
                };
                Ok((head, false))
            }
        }
    }

    /// `(pubkey, status)` of an active cluster validator by index.
    pub async fn active_validator(
        &self,
        index: u64,
    ) -> Result<Option<(PublicKeyBytes, ValidatorStatus)>, Error> {
        self.get_by_head().await?;
        Ok(self.inner.read().await.active_by_index.get(&index).copied())
    }

    /// Invalidates both caches. Called by the scheduler on epoch boundaries.
    pub async fn trim(&self) {
        let mut state = self.inner.write().await;
        state.head = None;
        state.active_by_index.clear();
        state.by_slot.clear();
    }
}

fn fill_head(state: &mut CacheState, validators: Vec<ValidatorData>) {
    state.active_by_index = validators
        .iter()
        .filter(|v| v.status.is_active())
        .map(|v| (v.index, (v.validator.pubkey, v.status)))
        .collect();
    state.head = Some(validators);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{null_logger, validator_data};
    use beacon_client::mock::MockBeaconNode;
    use std::sync::Arc;

    fn cache_with(
        validators: Vec<ValidatorData>,
    ) -> (Arc<ValidatorCache<MockBeaconNode>>, MockBeaconNode) {
        let node = MockBeaconNode::new();
        node.set_validators(validators.clone());
        let pubkeys = validators.iter().map(|v| v.validator.pubkey).collect();
        let cache = Arc::new(ValidatorCache::new(node.clone(), pubkeys, null_logger()));
        (cache, node)
    }

    #[tokio::test]
    async fn head_lookup_and_active_subset() {
        let (cache, _) = cache_with(vec![
            validator_data(1, 0x11, ValidatorStatus::ActiveOngoing),
            validator_data(2, 0x22, ValidatorStatus::ExitedUnslashed),
        ]);

        let all = cache.get_by_head().await.unwrap();
        assert_eq!(all.len(), 2);

        let active = cache.active_validator(1).await.unwrap();
        assert_eq!(
            active,
            Some((
                PublicKeyBytes::from([0x11; 48]),
                ValidatorStatus::ActiveOngoing
            ))
        );
        assert_eq!(cache.active_validator(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn slot_failure_falls_back_to_head() {
        let (cache, node) = cache_with(vec![validator_data(
            1,
            0x11,
            ValidatorStatus::ActiveOngoing,
        )]);
        node.set_fail_validators_by_slot(true);

        let (validators, refreshed_by_slot) = cache.get_by_slot(Slot::new(64)).await.unwrap();
        assert_eq!(validators.len(), 1);
        assert!(!refreshed_by_slot);

        node.set_fail_validators_by_slot(false);
        let (_, refreshed_by_slot) = cache.get_by_slot(Slot::new(64)).await.unwrap();
        assert!(refreshed_by_slot);
    }

    #[tokio::test]
    async fn concurrent_reads_observe_identical_entries() {
        let (cache, _) = cache_with(vec![validator_data(
            7,
            0x33,
            ValidatorStatus::ActiveOngoing,
        )]);

        let handles = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.active_validator(7).await.unwrap() })
            })
            .collect::<Vec<_>>();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert!(results[0].is_some());
    }

    #[tokio::test]
    async fn trim_invalidates() {
        let (cache, node) = cache_with(vec![validator_data(
            1,
            0x11,
            ValidatorStatus::ActiveOngoing,
        )]);
        cache.get_by_head().await.unwrap();

        // New chain state becomes visible only after a trim.
        node.set_validators(vec![
            validator_data(1, 0x11, ValidatorStatus::ActiveOngoing),
            validator_data(2, 0x22, ValidatorStatus::ActiveOngoing),
        ]);
        assert_eq!(cache.get_by_head().await.unwrap().len(), 1);

        cache.trim().await;
        assert_eq!(cache.get_by_head().await.unwrap().len(), 2);
    }
}
