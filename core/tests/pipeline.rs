//! End-to-end pipeline tests over an in-process four-operator cluster.
//!
//! Four pipelines share the in-memory consensus and exchange buses; each
//! operator has its own beacon node, as in a real deployment. Validator
//! clients are simulated by storing share-signed partials directly.

use beacon_client::mock::MockBeaconNode;
use dv_core::{
    wire, DutyState, MemoryConsensus, MemoryParSigEx, Pipeline, PipelineConfig,
};
use dv_types::{
    Address, Attestation, AttestationData, AttesterDefinition, Checkpoint, Cluster,
    ClusterValidator, Duty, Epoch, Hash256, Operator, ParSignedData, ParSignedDataSet,
    PublicKeyBytes, SignedData, SigningContext, Slot, ValidatorData, ValidatorStatus,
    ValidatorSummary,
};
use slog::{o, Logger};
use slot_clock::ManualSlotClock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const NODES: usize = 4;
const THRESHOLD: usize = 3;

type TestPipeline =
    Pipeline<MockBeaconNode, ManualSlotClock, MemoryConsensus, MemoryParSigEx>;

struct TestCluster {
    cluster: Arc<Cluster>,
    shares: Vec<tbls::SecretKey>,
    nodes: Vec<TestPipeline>,
    beacons: Vec<MockBeaconNode>,
    clock: ManualSlotClock,
    shutdown: CancellationToken,
}

fn null_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}

fn build_cluster() -> TestCluster {
    let key_shares = tbls::generate_insecure_key_shares(11, NODES, THRESHOLD).unwrap();
    let cluster = Arc::new(Cluster {
        name: "pipeline-test".into(),
        operators: (0..NODES)
            .map(|i| Operator {
                enr: format!("enr:-operator-{i}"),
            })
            .collect(),
        threshold: THRESHOLD,
        validators: vec![ClusterValidator {
            public_key: key_shares.group_public.compressed(),
            pubshares: key_shares
                .shares
                .iter()
                .map(|s| s.public_key().compressed())
                .collect(),
            fee_recipient: Address::repeat_byte(0x42),
            builder_enabled: false,
            gas_limit: 30_000_000,
        }],
        signing: SigningContext {
            fork_version: [0, 0, 0, 0],
            genesis_validators_root: Hash256::repeat_byte(0x4b),
            genesis_time: 1_606_824_023,
        },
    });

    let log = null_logger();
    let clock = ManualSlotClock::new(Slot::new(32), Duration::from_secs(12));
    let shutdown = CancellationToken::new();
    let consensus_handles = MemoryConsensus::cluster(NODES, log.clone());
    let exchange_handles = MemoryParSigEx::cluster(NODES, log.clone());

    let mut nodes = Vec::new();
    let mut beacons = Vec::new();
    for (node_index, (consensus, parsigex)) in consensus_handles
        .into_iter()
        .zip(exchange_handles)
        .enumerate()
    {
        let beacon = MockBeaconNode::new();
        seed_beacon(&beacon, &cluster);
        let pipeline = wire(
            beacon.clone(),
            clock.clone(),
            cluster.clone(),
            consensus,
            parsigex,
            PipelineConfig {
                node_index,
                ..PipelineConfig::default()
            },
            shutdown.clone(),
            &log,
        );
        nodes.push(pipeline);
        beacons.push(beacon);
    }

    TestCluster {
        cluster,
        shares: key_shares.shares,
        nodes,
        beacons,
        clock,
        shutdown,
    }
}

fn seed_beacon(beacon: &MockBeaconNode, cluster: &Cluster) {
    let group = cluster.validators[0].public_key;
    beacon.set_validators(vec![ValidatorData {
        index: 5,
        balance: 32_000_000_000,
        status: ValidatorStatus::ActiveOngoing,
        validator: ValidatorSummary {
            pubkey: group,
            effective_balance: 32_000_000_000,
            slashed: false,
        },
    }]);
    beacon.set_attester_duties(
        Epoch::new(1),
        vec![AttesterDefinition {
            pubkey: group,
            validator_index: 5,
            committee_index: 0,
            committee_length: 4,
            committees_at_slot: 1,
            validator_committee_index: 1,
            slot: Slot::new(32),
        }],
    );
    beacon.set_attestation_data(Slot::new(32), 0, attestation_data());
}

fn attestation_data() -> AttestationData {
    AttestationData {
        slot: Slot::new(32),
        index: 0,
        beacon_block_root: Hash256::repeat_byte(0xaa),
        source: Checkpoint {
            epoch: Epoch::new(0),
            root: Hash256::ZERO,
        },
        target: Checkpoint {
            epoch: Epoch::new(1),
            root: Hash256::repeat_byte(0xbb),
        },
    }
}

impl TestCluster {
    fn group_pubkey(&self) -> PublicKeyBytes {
        self.cluster.validators[0].public_key
    }

    /// Simulates node `i`'s validator client submitting its partial
    /// attestation for slot 32.
    async fn submit_partial_attestation(&self, node_index: usize) {
        let data = attestation_data();
        let mut attestation = Attestation::unsigned(data, 1, 4).unwrap();
        let unsigned = SignedData::Attestation(attestation.clone());
        let root = unsigned.signing_root(&self.cluster.signing);
        attestation.signature = self.shares[node_index].sign(root.as_slice()).compressed();

        let set = ParSignedDataSet::from([(
            self.group_pubkey(),
            ParSignedData::new(
                SignedData::Attestation(attestation),
                node_index as u64 + 1,
            ),
        )]);
        self.nodes[node_index]
            .parsigdb
            .store_internal(Duty::attester(Slot::new(32)), set)
            .await
            .unwrap();
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn attester_happy_path_reaches_every_beacon_node_once() {
    let cluster = build_cluster();
    let duty = Duty::attester(Slot::new(32));

    // Slot tick on every node: duties resolve, data is fetched, the
    // proposer-of-record proposes and consensus decides on all nodes.
    for node in &cluster.nodes {
        node.scheduler.handle_slot(Slot::new(32)).await;
    }
    let nodes = &cluster.nodes;
    wait_until(|| {
        nodes
            .iter()
            .all(|n| n.dutydb.att_data(Slot::new(32), 0).is_some())
    })
    .await;

    // Three of four validator clients submit partial attestations.
    for node_index in [0, 1, 3] {
        cluster.submit_partial_attestation(node_index).await;
    }

    // Every node aggregates and submits exactly one attestation to its own
    // beacon node.
    for (node_index, beacon) in cluster.beacons.iter().enumerate() {
        let beacon = beacon.clone();
        wait_until(move || beacon.submitted_attestations().len() == 1).await;

        let submitted = cluster.beacons[node_index].submitted_attestations();
        assert_eq!(submitted.len(), 1, "node {node_index}");
        let attestation = &submitted[0];
        assert_eq!(attestation.data, attestation_data());

        // The aggregate is a valid group signature, indistinguishable from a
        // single-key validator's.
        let root = SignedData::Attestation(attestation.clone())
            .signing_root(&cluster.cluster.signing);
        tbls::verify_compressed(
            &cluster.group_pubkey(),
            root.as_slice(),
            &attestation.signature,
        )
        .expect("aggregate verifies against group pubkey");
    }

    for node in &cluster.nodes {
        let tracker = node.tracker.clone();
        wait_until(move || tracker.state(duty) == Some(DutyState::Done)).await;
    }

    cluster.shutdown.cancel();
}

#[tokio::test]
async fn threshold_not_met_produces_nothing_and_gcs() {
    let cluster = build_cluster();
    let duty = Duty::attester(Slot::new(32));

    for node in &cluster.nodes {
        node.scheduler.handle_slot(Slot::new(32)).await;
    }
    let nodes = &cluster.nodes;
    wait_until(|| {
        nodes
            .iter()
            .all(|n| n.dutydb.att_data(Slot::new(32), 0).is_some())
    })
    .await;

    // Only two of four operators submit; threshold is three.
    for node_index in [0, 2] {
        cluster.submit_partial_attestation(node_index).await;
    }

    // Give the exchange time to deliver, then check nothing aggregated.
    tokio::time::sleep(Duration::from_millis(100)).await;
    for (node_index, beacon) in cluster.beacons.iter().enumerate() {
        assert!(
            beacon.submitted_attestations().is_empty(),
            "node {node_index} must not submit below threshold"
        );
        assert_eq!(
            cluster.nodes[node_index]
                .parsigdb
                .partial_count(duty, cluster.group_pubkey()),
            2
        );
    }

    // Past the deadline all partial state is garbage collected.
    cluster.clock.set_slot(Slot::new(35));
    for node in &cluster.nodes {
        node.scheduler.handle_slot(Slot::new(35)).await;
    }
    for node in &cluster.nodes {
        assert_eq!(node.parsigdb.partial_count(duty, cluster.group_pubkey()), 0);
        assert_eq!(node.tracker.state(duty), None);
    }
    assert!(cluster.beacons[0].submitted_attestations().is_empty());
}

#[tokio::test]
async fn late_partial_after_threshold_changes_nothing() {
    let cluster = build_cluster();

    for node in &cluster.nodes {
        node.scheduler.handle_slot(Slot::new(32)).await;
    }
    let nodes = &cluster.nodes;
    wait_until(|| {
        nodes
            .iter()
            .all(|n| n.dutydb.att_data(Slot::new(32), 0).is_some())
    })
    .await;

    for node_index in [0, 1, 2] {
        cluster.submit_partial_attestation(node_index).await;
    }
    let beacon = cluster.beacons[0].clone();
    wait_until(move || beacon.submitted_attestations().len() == 1).await;

    // The fourth, late partial must not trigger a second aggregation or
    // submission anywhere.
    cluster.submit_partial_attestation(3).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    for beacon in &cluster.beacons {
        assert_eq!(beacon.submitted_attestations().len(), 1);
    }
}
