//! Threshold aggregation of partial signatures.
//!
//! Given at least `threshold` partials over one payload for a `(duty,
//! pubkey)`, verifies every partial against its share's public key, combines
//! them into the group signature, verifies the result against the group
//! public key and hands the aggregated signed data to subscribers.

use crate::{Error, SignedSubscriber};
use dv_types::{Cluster, Duty, ParSignedData, PublicKeyBytes};
use slog::{debug, error, warn, Logger};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct SigAgg {
    cluster: Arc<Cluster>,
    /// Disables BLS verification of partials and aggregates. Only settable in
    /// insecure test builds of the node; never in production configs.
    verify_signatures: bool,
    subscribers: Vec<SignedSubscriber>,
    log: Logger,
}

impl SigAgg {
    pub fn new(cluster: Arc<Cluster>, log: Logger) -> Self {
        Self {
            cluster,
            verify_signatures: true,
            subscribers: Vec::new(),
            log,
        }
    }

    /// Insecure test mode: skips BLS verification of partials and the
    /// aggregate. Loudly logged so it can never hide in production.
    pub fn new_insecure(cluster: Arc<Cluster>, log: Logger) -> Self {
        warn!(log, "Signature verification DISABLED; this mode is for tests only");
        Self {
            cluster,
            verify_signatures: false,
            subscribers: Vec::new(),
            log,
        }
    }

    /// Registers a subscriber for aggregated signatures. Must complete before
    /// duty flow starts; not thread-safe.
    pub fn subscribe(&mut self, subscriber: SignedSubscriber) {
        self.subscribers.push(subscriber);
    }

    pub async fn aggregate(
        &self,
        duty: Duty,
        pubkey: PublicKeyBytes,
        partials: BTreeMap<u64, ParSignedData>,
    ) -> Result<(), Error> {
        let threshold = self.cluster.threshold;
        if partials.len() < threshold {
            return Err(Error::InsufficientPartialSignatures {
                duty,
                got: partials.len(),
                required: threshold,
            });
        }

        // All partials must sign the same payload; combining signatures over
        // different payloads would yield garbage, and disagreement here means
        // something upstream violated the single-payload invariant.
        let mut roots = partials.values().map(|p| p.message_root());
        let first_root = roots.next().ok_or(Error::InsufficientPartialSignatures {
            duty,
            got: 0,
            required: threshold,
        })?;
        if roots.any(|root| root != first_root) {
            error!(
                self.log, "Refusing to aggregate conflicting payloads";
                "duty" => %duty, "pubkey" => ?pubkey,
            );
            return Err(Error::ConflictingSignatures { duty, pubkey });
        }

        let validator = self
            .cluster
            .validator_by_pubkey(&pubkey)
            .ok_or(Error::UnknownPubkey(pubkey))?;

        // Representative payload; all partials carry the same message.
        let representative = partials
            .values()
            .next()
            .ok_or(Error::InsufficientPartialSignatures {
                duty,
                got: 0,
                required: threshold,
            })?
            .signed
            .clone();
        let signing_root = representative.signing_root(&self.cluster.signing);

        if self.verify_signatures {
            for (share_index, partial) in &partials {
                let pubshare = validator
                    .pubshares
                    .get((*share_index - 1) as usize)
                    .ok_or(Error::InvalidShareIndex {
                        duty,
                        share_index: *share_index,
                    })?;
                tbls::verify_compressed(
                    pubshare,
                    signing_root.as_slice(),
                    &partial.signature(),
                )
                .map_err(|_| Error::InvalidPartialSignature {
                    duty,
                    pubkey,
                    share_index: *share_index,
                })?;
            }
        }

        let signatures = partials
            .iter()
            .map(|(share_index, partial)| {
                tbls::Signature::from_bytes(partial.signature().as_slice())
                    .map(|sig| (*share_index, sig))
                    .map_err(Error::Tbls)
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let aggregate = tbls::combine_partial_signatures(&signatures, threshold)
            .map_err(Error::Tbls)?;

        if self.verify_signatures {
            tbls::verify_compressed(
                &pubkey,
                signing_root.as_slice(),
                &aggregate.compressed(),
            )
            .map_err(|_| Error::InvalidAggregateSignature { duty, pubkey })?;
        }

        debug!(
            self.log, "Aggregated threshold signature";
            "duty" => %duty, "pubkey" => ?pubkey, "partials" => partials.len(),
        );

        let signed = representative.with_signature(aggregate.compressed());
        for subscriber in &self.subscribers {
            subscriber(duty, pubkey, signed.clone()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{null_logger, test_cluster_with_keys, unsigned_attestation_data};
    use dv_types::{Attestation, ParSignedData, SignedData, Slot};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn partial_attestation(
        cluster: &Cluster,
        shares: &[tbls::SecretKey],
        share_index: u64,
        data_byte: u8,
    ) -> ParSignedData {
        let data = unsigned_attestation_data(32, data_byte);
        let unsigned = SignedData::Attestation(Attestation::unsigned(data, 0, 4).unwrap());
        let root = unsigned.signing_root(&cluster.signing);
        let signature = shares[(share_index - 1) as usize].sign(root.as_slice());
        ParSignedData::new(unsigned.with_signature(signature.compressed()), share_index)
    }

    fn aggregated(sigagg: &mut SigAgg) -> Arc<AtomicUsize> {
        let counter = Arc::new(AtomicUsize::new(0));
        let clone = counter.clone();
        sigagg.subscribe(Box::new(move |_, _, _| {
            let clone = clone.clone();
            Box::pin(async move {
                clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }));
        counter
    }

    #[tokio::test]
    async fn aggregates_threshold_partials() {
        let (cluster, shares) = test_cluster_with_keys(4, 3);
        let cluster = Arc::new(cluster);
        let mut sigagg = SigAgg::new(cluster.clone(), null_logger());
        let counter = aggregated(&mut sigagg);

        let duty = Duty::attester(Slot::new(32));
        let pubkey = cluster.validators[0].public_key;
        let partials = [1u64, 2, 4]
            .iter()
            .map(|i| (*i, partial_attestation(&cluster, &shares, *i, 0x0a)))
            .collect();

        sigagg.aggregate(duty, pubkey, partials).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refuses_conflicting_payloads() {
        let (cluster, shares) = test_cluster_with_keys(4, 3);
        let cluster = Arc::new(cluster);
        let mut sigagg = SigAgg::new(cluster.clone(), null_logger());
        let counter = aggregated(&mut sigagg);

        let duty = Duty::attester(Slot::new(32));
        let pubkey = cluster.validators[0].public_key;
        let mut partials: BTreeMap<u64, ParSignedData> = [1u64, 2]
            .iter()
            .map(|i| (*i, partial_attestation(&cluster, &shares, *i, 0x0a)))
            .collect();
        // The third share signs a different payload.
        partials.insert(3, partial_attestation(&cluster, &shares, 3, 0x0b));

        let result = sigagg.aggregate(duty, pubkey, partials).await;
        assert!(matches!(result, Err(Error::ConflictingSignatures { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refuses_invalid_partial() {
        let (cluster, shares) = test_cluster_with_keys(4, 3);
        let cluster = Arc::new(cluster);
        let mut sigagg = SigAgg::new(cluster.clone(), null_logger());
        let counter = aggregated(&mut sigagg);

        let duty = Duty::attester(Slot::new(32));
        let pubkey = cluster.validators[0].public_key;
        let mut partials: BTreeMap<u64, ParSignedData> = [1u64, 2]
            .iter()
            .map(|i| (*i, partial_attestation(&cluster, &shares, *i, 0x0a)))
            .collect();
        // Share 3's partial is signed by share 4's key: same payload, bad sig.
        let mut forged = partial_attestation(&cluster, &shares, 4, 0x0a);
        forged.share_index = 3;
        partials.insert(3, forged);

        let result = sigagg.aggregate(duty, pubkey, partials).await;
        assert!(matches!(
            result,
            Err(Error::InvalidPartialSignature { share_index: 3, .. })
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refuses_below_threshold() {
        let (cluster, shares) = test_cluster_with_keys(4, 3);
        let cluster = Arc::new(cluster);
        let sigagg = SigAgg::new(cluster.clone(), null_logger());

        let duty = Duty::attester(Slot::new(32));
        let pubkey = cluster.validators[0].public_key;
        let partials = [1u64, 2]
            .iter()
            .map(|i| (*i, partial_attestation(&cluster, &shares, *i, 0x0a)))
            .collect();

        let result = sigagg.aggregate(duty, pubkey, partials).await;
        assert!(matches!(
            result,
            Err(Error::InsufficientPartialSignatures { got: 2, .. })
        ));
    }

    #[tokio::test]
    async fn unknown_pubkey_rejected() {
        let (cluster, shares) = test_cluster_with_keys(4, 3);
        let cluster = Arc::new(cluster);
        let sigagg = SigAgg::new(cluster.clone(), null_logger());

        let duty = Duty::attester(Slot::new(32));
        let partials = [1u64, 2, 3]
            .iter()
            .map(|i| (*i, partial_attestation(&cluster, &shares, *i, 0x0a)))
            .collect();

        let result = sigagg
            .aggregate(duty, PublicKeyBytes::from([9u8; 48]), partials)
            .await;
        assert!(matches!(result, Err(Error::UnknownPubkey(_))));
    }
}
