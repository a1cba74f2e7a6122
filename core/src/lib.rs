//! The duty pipeline of the distributed validator middleware.
//!
//! Stages are constructed bare and wired with subscriber callbacks in
//! dependency order by [`wire`]; the wiring is single-threaded and must
//! complete before the scheduler starts. Each subscriber receives owned
//! clones of the data sets, so no mutation leaks between subscribers.
//!
//! ```text
//! Scheduler ─► Fetcher ─► Consensus ─► DutyDB ─► Validator-API ─► ParSigDB ─► ParSigEx
//!                                                       ▲                │
//!                                                       │                ▼
//!                                 Broadcaster ◄── AggSigDB ◄── SigAgg ◄── (threshold)
//! ```

pub mod aggsigdb;
pub mod broadcaster;
pub mod consensus;
pub mod dutydb;
pub mod fetcher;
pub mod parsigdb;
pub mod parsigex;
pub mod scheduler;
pub mod sigagg;
pub mod tracker;
pub mod validator_cache;

pub use aggsigdb::AggSigDb;
pub use broadcaster::Broadcaster;
pub use consensus::{proposer_of_record, Consensus, MemoryConsensus};
pub use dutydb::DutyDb;
pub use fetcher::{fetch_with_retry, Fetcher};
pub use parsigdb::ParSigDb;
pub use parsigex::{MemoryParSigEx, ParSigEx};
pub use scheduler::Scheduler;
pub use sigagg::SigAgg;
pub use tracker::{DutyState, Tracker};
pub use validator_cache::ValidatorCache;

use beacon_client::BeaconApi;
use dv_types::{
    Cluster, Duty, DutyDefinitionSet, DutyType, Hash256, ParSignedData, ParSignedDataSet,
    PublicKeyBytes, SignedData, Slot, UnsignedDataSet,
};
use futures::future::BoxFuture;
use slog::{crit, debug, error, o, warn, Logger};
use slot_clock::SlotClock;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum Error {
    /// Shutdown was requested; blocking waits return this promptly.
    Cancelled,
    /// The duty's deadline passed before the operation completed.
    DeadlineExceeded(Duty),
    /// The duty was never scheduled and its deadline has passed.
    DutyNotFound(Duty),
    BeaconApi(beacon_client::Error),
    Tbls(tbls::Error),
    /// A store observed a different value under an existing key. Fatal: the
    /// single-payload invariant is broken and the node must abort.
    ConflictingStore { duty_type: DutyType, key: String },
    /// The same share produced two distinct payloads for one duty.
    DoubleSign {
        duty: Duty,
        pubkey: PublicKeyBytes,
        share_index: u64,
    },
    /// Threshold partials disagree on the payload; aggregation refused.
    ConflictingSignatures { duty: Duty, pubkey: PublicKeyBytes },
    InsufficientPartialSignatures {
        duty: Duty,
        got: usize,
        required: usize,
    },
    InvalidPartialSignature {
        duty: Duty,
        pubkey: PublicKeyBytes,
        share_index: u64,
    },
    InvalidAggregateSignature { duty: Duty, pubkey: PublicKeyBytes },
    InvalidShareIndex { duty: Duty, share_index: u64 },
    UnknownPubkey(PublicKeyBytes),
    /// AggSigDB yielded a different signed-data kind than the stage expected.
    UnexpectedSignedData { duty: Duty, expected: &'static str },
    /// The fetcher has no fetch logic for this duty type.
    UnsupportedDuty(Duty),
    /// The beacon node does not know the aggregate for this root yet.
    AggregateNotFound { slot: Slot, root: Hash256 },
    /// The beacon node does not know the sync contribution yet.
    SyncContributionNotFound { slot: Slot, subcommittee_index: u64 },
}

impl Error {
    /// Errors worth retrying on the next tick within the duty deadline.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::BeaconApi(e) => e.is_transient(),
            Error::AggregateNotFound { .. } | Error::SyncContributionNotFound { .. } => true,
            _ => false,
        }
    }

    /// Errors that break a DB invariant and must abort the node.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ConflictingStore { .. })
    }
}

impl From<beacon_client::Error> for Error {
    fn from(e: beacon_client::Error) -> Self {
        Error::BeaconApi(e)
    }
}

impl From<tbls::Error> for Error {
    fn from(e: tbls::Error) -> Self {
        Error::Tbls(e)
    }
}

/// Subscriber invoked with emitted duty definitions.
pub type DefinitionSubscriber =
    Box<dyn Fn(Duty, DutyDefinitionSet) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

/// Subscriber invoked with fetched or decided unsigned data sets.
pub type UnsignedSubscriber =
    Box<dyn Fn(Duty, UnsignedDataSet) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

/// Subscriber invoked with partial-signature sets.
pub type ParSigSubscriber =
    Box<dyn Fn(Duty, ParSignedDataSet) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

/// Subscriber invoked when a `(duty, pubkey)` reaches the threshold.
pub type ThresholdSubscriber = Box<
    dyn Fn(Duty, PublicKeyBytes, BTreeMap<u64, ParSignedData>) -> BoxFuture<'static, Result<(), Error>>
        + Send
        + Sync,
>;

/// Subscriber invoked with aggregated signed data.
pub type SignedSubscriber = Box<
    dyn Fn(Duty, PublicKeyBytes, SignedData) -> BoxFuture<'static, Result<(), Error>> + Send + Sync,
>;

/// Per-slot hook (garbage collection, tracking).
pub type SlotSubscriber = Box<dyn Fn(Slot) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// This operator's position in the cluster (0-indexed; share index is
    /// `node_index + 1`).
    pub node_index: usize,
    /// Duty deadline in slots after the duty slot.
    pub deadline_slots: u64,
    pub graffiti: Option<Hash256>,
    pub builder_api: bool,
    /// Skip BLS verification. Test clusters only.
    pub insecure_signatures: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            node_index: 0,
            deadline_slots: 2,
            graffiti: None,
            builder_api: false,
            insecure_signatures: false,
        }
    }
}

/// The wired pipeline. Hand the relevant stage handles to the validator API
/// and spawn [`Scheduler::run`] to start duty flow.
pub struct Pipeline<B: BeaconApi, C: SlotClock, Cons: Consensus, Ex: ParSigEx> {
    pub scheduler: Arc<Scheduler<B, C>>,
    pub fetcher: Arc<Fetcher<B>>,
    pub consensus: Arc<Cons>,
    pub dutydb: Arc<DutyDb>,
    pub parsigdb: Arc<ParSigDb>,
    pub parsigex: Arc<Ex>,
    pub sigagg: Arc<SigAgg>,
    pub aggsigdb: Arc<AggSigDb>,
    pub broadcaster: Arc<Broadcaster<B, C>>,
    pub cache: Arc<ValidatorCache<B>>,
    pub tracker: Arc<Tracker>,
}

/// Two-phase construction: builds every stage bare, then registers the
/// subscriber callbacks in dependency order. Must run to completion before
/// the scheduler task is spawned; registration is not thread-safe.
pub fn wire<B, C, Cons, Ex>(
    beacon: B,
    clock: C,
    cluster: Arc<Cluster>,
    mut consensus: Cons,
    mut parsigex: Ex,
    config: PipelineConfig,
    shutdown: CancellationToken,
    log: &Logger,
) -> Pipeline<B, C, Cons, Ex>
where
    B: BeaconApi,
    C: SlotClock,
    Cons: Consensus,
    Ex: ParSigEx,
{
    let deadline_slots = config.deadline_slots;

    // Storage leaves and collaborators first.
    let cache = Arc::new(ValidatorCache::new(
        beacon.clone(),
        cluster.group_pubkeys(),
        log.new(o!("service" => "validator_cache")),
    ));
    let tracker = Arc::new(Tracker::new(
        deadline_slots,
        log.new(o!("service" => "tracker")),
    ));
    let dutydb = Arc::new(DutyDb::new(
        shutdown.clone(),
        log.new(o!("service" => "dutydb")),
    ));
    let broadcaster = Arc::new(Broadcaster::new(
        beacon.clone(),
        clock.clone(),
        deadline_slots,
        shutdown.clone(),
        log.new(o!("service" => "bcast")),
    ));

    // AggSigDB feeds the broadcaster. Broadcasts retry within the deadline,
    // so they run in their own task rather than blocking the store.
    let mut aggsigdb = AggSigDb::new(shutdown.clone(), log.new(o!("service" => "aggsigdb")));
    {
        let broadcaster = broadcaster.clone();
        let tracker = tracker.clone();
        let log = log.new(o!("service" => "bcast"));
        aggsigdb.subscribe(Box::new(move |duty, pubkey, signed| {
            let broadcaster = broadcaster.clone();
            let tracker = tracker.clone();
            let log = log.clone();
            Box::pin(async move {
                tracker.transition(duty, DutyState::Aggregated);
                if !duty.duty_type.is_broadcastable() {
                    tracker.transition(duty, DutyState::Done);
                    return Ok(());
                }
                tokio::spawn(async move {
                    match broadcaster.broadcast(duty, pubkey, signed).await {
                        Ok(()) => {
                            tracker.transition(duty, DutyState::Broadcast);
                            tracker.transition(duty, DutyState::Done);
                        }
                        Err(e) => {
                            warn!(log, "Broadcast failed"; "duty" => %duty, "error" => ?e);
                            tracker.transition(duty, DutyState::Failed);
                        }
                    }
                });
                Ok(())
            })
        }));
    }
    let aggsigdb = Arc::new(aggsigdb);

    // SigAgg writes to AggSigDB; a conflicting write means the single-payload
    // invariant is broken, so it aborts the node.
    let mut sigagg = if config.insecure_signatures {
        SigAgg::new_insecure(cluster.clone(), log.new(o!("service" => "sigagg")))
    } else {
        SigAgg::new(cluster.clone(), log.new(o!("service" => "sigagg")))
    };
    {
        let aggsigdb = aggsigdb.clone();
        let shutdown = shutdown.clone();
        let log = log.new(o!("service" => "sigagg"));
        sigagg.subscribe(Box::new(move |duty, pubkey, signed| {
            let aggsigdb = aggsigdb.clone();
            let shutdown = shutdown.clone();
            let log = log.clone();
            Box::pin(async move {
                match aggsigdb.store(duty, pubkey, signed).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_fatal() => {
                        crit!(log, "Aggregated signature store conflict"; "duty" => %duty, "error" => ?e);
                        shutdown.cancel();
                        Err(e)
                    }
                    Err(e) => Err(e),
                }
            })
        }));
    }
    let sigagg = Arc::new(sigagg);

    // ParSigDB: threshold sets feed SigAgg; first local inserts feed the
    // exchange. The exchange's receive side needs the ParSigDB back, so that
    // reference is late-bound through a cell populated below, before any duty
    // flows.
    let parsigdb_cell: Arc<OnceLock<Arc<ParSigDb>>> = Arc::new(OnceLock::new());
    {
        let cell = parsigdb_cell.clone();
        let log = log.new(o!("service" => "parsigex"));
        parsigex.subscribe(Box::new(move |duty, set| {
            let cell = cell.clone();
            let log = log.clone();
            Box::pin(async move {
                let Some(parsigdb) = cell.get() else {
                    return Ok(());
                };
                match parsigdb.store_external(duty, set).await {
                    // Peer state is never allowed to poison local flow; a
                    // detected double-sign is logged by the DB and dropped.
                    Err(Error::DoubleSign { .. }) => Ok(()),
                    other => other,
                }
            })
        }));
    }
    let parsigex = Arc::new(parsigex);

    let mut parsigdb = ParSigDb::new(cluster.threshold, log.new(o!("service" => "parsigdb")));
    {
        let parsigex = parsigex.clone();
        parsigdb.subscribe_internal(Box::new(move |duty, set| {
            let parsigex = parsigex.clone();
            Box::pin(async move { parsigex.broadcast(duty, set).await })
        }));
    }
    {
        let sigagg = sigagg.clone();
        let tracker = tracker.clone();
        let log = log.new(o!("service" => "sigagg"));
        parsigdb.subscribe_threshold(Box::new(move |duty, pubkey, partials| {
            let sigagg = sigagg.clone();
            let tracker = tracker.clone();
            let log = log.clone();
            Box::pin(async move {
                tracker.transition(duty, DutyState::PartialsCollected);
                match sigagg.aggregate(duty, pubkey, partials).await {
                    Ok(()) => Ok(()),
                    Err(e @ Error::ConflictingSignatures { .. }) => {
                        // Slashing-critical: refuse and abort the duty, but
                        // do not poison the submitting validator client.
                        error!(log, "Conflicting partial signatures"; "duty" => %duty, "error" => ?e);
                        tracker.transition(duty, DutyState::Failed);
                        Ok(())
                    }
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => {
                        error!(log, "Aggregation failed"; "duty" => %duty, "error" => ?e);
                        tracker.transition(duty, DutyState::Failed);
                        Ok(())
                    }
                }
            })
        }));
    }
    let parsigdb = Arc::new(parsigdb);
    let _ = parsigdb_cell.set(parsigdb.clone());

    // Consensus decisions land in the DutyDB.
    {
        let dutydb = dutydb.clone();
        let tracker = tracker.clone();
        let shutdown = shutdown.clone();
        let log = log.new(o!("service" => "dutydb"));
        consensus.subscribe(Box::new(move |duty, set| {
            let dutydb = dutydb.clone();
            let tracker = tracker.clone();
            let shutdown = shutdown.clone();
            let log = log.clone();
            Box::pin(async move {
                match dutydb.store(duty, &set) {
                    Ok(()) => {
                        tracker.transition(duty, DutyState::Decided);
                        Ok(())
                    }
                    Err(e) if e.is_fatal() => {
                        crit!(log, "Decided data store conflict"; "duty" => %duty, "error" => ?e);
                        shutdown.cancel();
                        Err(e)
                    }
                    Err(e) => Err(e),
                }
            })
        }));
    }
    let consensus = Arc::new(consensus);

    // The fetcher proposes fetched values; only the proposer-of-record for
    // the slot actually calls into consensus.
    let mut fetcher = Fetcher::new(
        beacon.clone(),
        dutydb.clone(),
        aggsigdb.clone(),
        cluster.clone(),
        config.graffiti,
        config.builder_api,
        log.new(o!("service" => "fetcher")),
    );
    {
        let consensus = consensus.clone();
        let tracker = tracker.clone();
        let node_index = config.node_index;
        let node_count = cluster.node_count();
        fetcher.subscribe(Box::new(move |duty, set| {
            let consensus = consensus.clone();
            let tracker = tracker.clone();
            Box::pin(async move {
                tracker.transition(duty, DutyState::Fetched);
                if proposer_of_record(duty.slot, node_count) == node_index {
                    consensus.propose(duty, set).await?;
                }
                Ok(())
            })
        }));
    }
    let fetcher = Arc::new(fetcher);

    // The scheduler drives fetches and garbage collection.
    let mut scheduler = Scheduler::new(
        beacon,
        clock.clone(),
        cluster.clone(),
        cache.clone(),
        deadline_slots,
        shutdown.clone(),
        log.new(o!("service" => "scheduler")),
    );
    {
        let fetcher = fetcher.clone();
        let tracker = tracker.clone();
        let clock = clock.clone();
        let shutdown = shutdown.clone();
        let log = log.new(o!("service" => "fetcher"));
        scheduler.subscribe(Box::new(move |duty, definitions| {
            let fetcher = fetcher.clone();
            let tracker = tracker.clone();
            let clock = clock.clone();
            let shutdown = shutdown.clone();
            let log = log.clone();
            Box::pin(async move {
                tracker.transition(duty, DutyState::Pending);
                // Fetches block on aggregated prerequisites (RANDAO,
                // selections), so they run off the scheduler tick.
                tokio::spawn(async move {
                    let result = fetch_with_retry(
                        fetcher,
                        clock,
                        shutdown,
                        deadline_slots,
                        duty,
                        definitions,
                    )
                    .await;
                    match result {
                        Ok(()) | Err(Error::Cancelled) => {}
                        Err(e) => {
                            debug!(log, "Duty fetch abandoned"; "duty" => %duty, "error" => ?e);
                            tracker.transition(duty, DutyState::Failed);
                        }
                    }
                });
                Ok(())
            })
        }));
    }
    {
        let tracker = tracker.clone();
        let dutydb = dutydb.clone();
        let parsigdb = parsigdb.clone();
        let aggsigdb = aggsigdb.clone();
        scheduler.subscribe_slot(Box::new(move |slot| {
            let tracker = tracker.clone();
            let dutydb = dutydb.clone();
            let parsigdb = parsigdb.clone();
            let aggsigdb = aggsigdb.clone();
            Box::pin(async move {
                tracker.on_slot(slot);
                if slot.as_u64() > deadline_slots {
                    let deadline = slot.saturating_sub(deadline_slots + 1);
                    dutydb.prune(deadline);
                    parsigdb.prune(deadline);
                    aggsigdb.prune(deadline);
                }
            })
        }));
    }
    let scheduler = Arc::new(scheduler);

    Pipeline {
        scheduler,
        fetcher,
        consensus,
        dutydb,
        parsigdb,
        parsigex,
        sigagg,
        aggsigdb,
        broadcaster,
        cache,
        tracker,
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use dv_types::{
        Address, Attestation, AttestationData, AttestationDuty, AttesterDefinition,
        BeaconCommitteeSelection, Checkpoint, Cluster, ClusterValidator, DutyDefinition, Epoch,
        Hash256, Operator, ParSignedData, ProposerDefinition, PublicKeyBytes, SignatureBytes,
        SignedData, SignedRandao, SigningContext, Slot, SyncCommitteeDefinition, UnsignedData,
        ValidatorData, ValidatorStatus, ValidatorSummary,
    };
    use slog::{o, Logger};

    pub fn null_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    pub fn unsigned_attestation_data(slot: u64, byte: u8) -> AttestationData {
        AttestationData {
            slot: Slot::new(slot),
            index: 0,
            beacon_block_root: Hash256::repeat_byte(byte),
            source: Checkpoint {
                epoch: Epoch::new(0),
                root: Hash256::ZERO,
            },
            target: Checkpoint {
                epoch: Epoch::new(1),
                root: Hash256::repeat_byte(0x01),
            },
        }
    }

    pub fn attester_definition_with_length(
        pubkey: PublicKeyBytes,
        validator_index: u64,
        slot: u64,
        committee_index: u64,
        validator_committee_index: u64,
        committee_length: u64,
    ) -> DutyDefinition {
        DutyDefinition::Attester(AttesterDefinition {
            pubkey,
            validator_index,
            committee_index,
            committee_length,
            committees_at_slot: 1,
            validator_committee_index,
            slot: Slot::new(slot),
        })
    }

    pub fn attester_definition(
        pubkey: PublicKeyBytes,
        validator_index: u64,
        slot: u64,
        committee_index: u64,
        validator_committee_index: u64,
    ) -> DutyDefinition {
        attester_definition_with_length(
            pubkey,
            validator_index,
            slot,
            committee_index,
            validator_committee_index,
            4,
        )
    }

    pub fn proposer_definition(
        pubkey: PublicKeyBytes,
        validator_index: u64,
        slot: u64,
    ) -> DutyDefinition {
        DutyDefinition::Proposer(ProposerDefinition {
            pubkey,
            validator_index,
            slot: Slot::new(slot),
        })
    }

    pub fn sync_definition(
        pubkey: PublicKeyBytes,
        validator_index: u64,
        indices: Vec<u64>,
    ) -> SyncCommitteeDefinition {
        SyncCommitteeDefinition {
            pubkey,
            validator_index,
            validator_sync_committee_indices: indices,
        }
    }

    pub fn attestation_duty_unsigned_with(
        data: AttestationData,
        pubkey: PublicKeyBytes,
        validator_index: u64,
        committee_index: u64,
    ) -> (PublicKeyBytes, UnsignedData) {
        let definition = match attester_definition(pubkey, validator_index, data.slot.as_u64(), committee_index, 1)
        {
            DutyDefinition::Attester(d) => d,
            _ => unreachable!(),
        };
        (
            pubkey,
            UnsignedData::Attestation(AttestationDuty { data, definition }),
        )
    }

    pub fn attestation_duty_unsigned(
        slot: u64,
        committee_index: u64,
        validator_index: u64,
    ) -> (PublicKeyBytes, UnsignedData) {
        let pubkey = PublicKeyBytes::from([0xf0; 48]);
        attestation_duty_unsigned_with(
            unsigned_attestation_data(slot, 0xaa),
            pubkey,
            validator_index,
            committee_index,
        )
    }

    pub fn proposal_unsigned(slot: u64, proposer_index: u64) -> (PublicKeyBytes, UnsignedData) {
        use dv_types::{
            ExecutionSummary, ForkName, ProposalBody, ProposalMessage, VersionedProposal,
        };
        let pubkey = PublicKeyBytes::from([0xf0; 48]);
        let proposal = VersionedProposal {
            version: ForkName::Deneb,
            blinded: false,
            message: ProposalMessage {
                slot: Slot::new(slot),
                proposer_index,
                parent_root: Hash256::repeat_byte(0x01),
                state_root: Hash256::repeat_byte(0x02),
                body: ProposalBody {
                    randao_reveal: SignatureBytes::empty(),
                    graffiti: Hash256::ZERO,
                    execution: ExecutionSummary {
                        fee_recipient: Address::repeat_byte(0x42),
                        block_hash: Hash256::repeat_byte(0x03),
                        block_number: 1,
                        gas_limit: 30_000_000,
                    },
                },
            },
            execution_payload_value: 0,
            consensus_block_value: 0,
        };
        (pubkey, UnsignedData::Proposal(proposal))
    }

    pub fn signed_randao(epoch: Epoch, byte: u8) -> SignedData {
        SignedData::Randao(SignedRandao {
            epoch,
            signature: SignatureBytes::from([byte; 96]),
        })
    }

    pub fn signed_attestation(slot: u64, data_byte: u8, sig_byte: u8) -> SignedData {
        let data = unsigned_attestation_data(slot, data_byte);
        let att = Attestation::unsigned(data, 0, 4).unwrap();
        SignedData::Attestation(att).with_signature(SignatureBytes::from([sig_byte; 96]))
    }

    pub fn par_signed_attestation(slot: u64, share_index: u64) -> ParSignedData {
        ParSignedData::new(
            signed_attestation(slot, 0xaa, share_index as u8),
            share_index,
        )
    }

    pub fn par_signed_attestation_root(slot: u64, share_index: u64, root_byte: u8) -> ParSignedData {
        ParSignedData::new(signed_attestation(slot, root_byte, 0x99), share_index)
    }

    pub fn beacon_committee_selection(
        validator_index: u64,
        slot: Slot,
        proof: SignatureBytes,
    ) -> SignedData {
        SignedData::BeaconCommitteeSelection(BeaconCommitteeSelection {
            validator_index,
            slot,
            selection_proof: proof,
        })
    }

    pub fn validator_data_with_pubkey(
        index: u64,
        pubkey: PublicKeyBytes,
        status: ValidatorStatus,
    ) -> ValidatorData {
        ValidatorData {
            index,
            balance: 32_000_000_000,
            status,
            validator: ValidatorSummary {
                pubkey,
                effective_balance: 32_000_000_000,
                slashed: false,
            },
        }
    }

    pub fn validator_data(index: u64, pubkey_byte: u8, status: ValidatorStatus) -> ValidatorData {
        validator_data_with_pubkey(index, PublicKeyBytes::from([pubkey_byte; 48]), status)
    }

    /// A cluster with one validator whose shares are real threshold-BLS keys.
    pub fn test_cluster_with_keys(n: usize, threshold: usize) -> (Cluster, Vec<tbls::SecretKey>) {
        let shares = tbls::generate_insecure_key_shares(42, n, threshold).unwrap();
        let pubshares = shares
            .shares
            .iter()
            .map(|s| s.public_key().compressed())
            .collect();
        let cluster = Cluster {
            name: "test".into(),
            operators: (0..n)
                .map(|i| Operator {
                    enr: format!("enr:-operator-{i}"),
                })
                .collect(),
            threshold,
            validators: vec![ClusterValidator {
                public_key: shares.group_public.compressed(),
                pubshares,
                fee_recipient: Address::repeat_byte(0x42),
                builder_enabled: false,
                gas_limit: 30_000_000,
            }],
            signing: SigningContext {
                fork_version: [0, 0, 0, 0],
                genesis_validators_root: Hash256::repeat_byte(0x4b),
                genesis_time: 1_606_824_023,
            },
        };
        (cluster, shares.shares)
    }
}
