//! The validator-client-facing HTTP API.
//!
//! Presents the standard beacon-node REST surface to validator clients,
//! rewriting duty responses so VCs sign with their key share, blocking
//! data-producing endpoints on cluster consensus, and converting VC
//! submissions into partial signatures for the pipeline. Everything not
//! handled here is reverse-proxied to the real beacon node.

mod error;
mod proxy;
mod query;


pub use error::{ErrorMessage, handle_rejection};
pub use proxy::Proxy;

use crate::error::{from_core, parse_body, ApiError};
use crate::query::{
    opt_root_query, opt_uint_query, root_query, signature_query, uint_path, uint_query, QueryMap,
};
use beacon_client::{BeaconApi, DutiesResponse, GenericResponse};
use dv_core::{AggSigDb, DutyDb, ParSigDb, Scheduler, ValidatorCache};
use dv_types::{
    Attestation, BeaconCommitteeSelection, Cluster, Duty, Epoch, Hash256, ParSignedData,
    ParSignedDataSet, PublicKeyBytes, SignedAggregateAndProof, SignedContributionAndProof,
    SignedData, SignedRandao, SignedValidatorRegistration, SignedVoluntaryExit, Slot,
    SyncCommitteeMessage, SyncCommitteeSelection, ValidatorRegistration, VersionedSignedProposal,
};
use slog::{debug, info, Logger};
use slot_clock::SlotClock;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;
use warp::http::header::CONTENT_TYPE;
use warp::http::StatusCode;
use warp::reply::Reply;
use warp::{Filter, Rejection};

/// Everything the handlers need. One per node, shared across requests.
pub struct Context<B: BeaconApi, C: SlotClock> {
    pub beacon: B,
    pub clock: C,
    pub cluster: Arc<Cluster>,
    pub node_index: usize,
    pub scheduler: Arc<Scheduler<B, C>>,
    pub dutydb: Arc<DutyDb>,
    pub parsigdb: Arc<ParSigDb>,
    pub aggsigdb: Arc<AggSigDb>,
    pub cache: Arc<ValidatorCache<B>>,
    /// Skip partial-signature verification. Test clusters only.
    pub insecure_signatures: bool,
    pub log: Logger,
    unknown_registration_logged: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Base URL of the beacon node, used by the fallback proxy.
    pub beacon_url: Url,
}

impl<B: BeaconApi, C: SlotClock> Context<B, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        beacon: B,
        clock: C,
        cluster: Arc<Cluster>,
        node_index: usize,
        scheduler: Arc<Scheduler<B, C>>,
        dutydb: Arc<DutyDb>,
        parsigdb: Arc<ParSigDb>,
        aggsigdb: Arc<AggSigDb>,
        cache: Arc<ValidatorCache<B>>,
        insecure_signatures: bool,
        log: Logger,
    ) -> Self {
        Self {
            beacon,
            clock,
            cluster,
            node_index,
            scheduler,
            dutydb,
            parsigdb,
            aggsigdb,
            cache,
            insecure_signatures,
            log,
            unknown_registration_logged: AtomicBool::new(false),
        }
    }

    /// This operator's 1-indexed share index.
    fn share_index(&self) -> u64 {
        self.node_index as u64 + 1
    }

    /// Replaces a validator group pubkey with this operator's pubshare, so
    /// the VC signs with the share it actually holds.
    fn to_pubshare(&self, pubkey: PublicKeyBytes) -> PublicKeyBytes {
        self.cluster
            .pubshare(self.node_index, &pubkey)
            .unwrap_or(pubkey)
    }

    /// Resolves an active cluster validator index to its group pubkey.
    async fn pubkey_by_index(&self, index: u64) -> Result<PublicKeyBytes, ApiError> {
        match self.cache.active_validator(index).await {
            Ok(Some((pubkey, _))) => Ok(pubkey),
            Ok(None) => Err(ApiError::bad_request(format!(
                "unknown validator index {}",
                index
            ))),
            Err(e) => Err(from_core(e)),
        }
    }

    /// Verifies a VC-supplied partial signature against this operator's
    /// pubshare for the validator.
    fn verify_partial(
        &self,
        pubkey: &PublicKeyBytes,
        signed: &SignedData,
    ) -> Result<(), ApiError> {
        let pubshare = self
            .cluster
            .pubshare(self.node_index, pubkey)
            .ok_or_else(|| ApiError::bad_request(format!("unknown validator {:?}", pubkey)))?;
        if self.insecure_signatures {
            return Ok(());
        }
        let root = signed.signing_root(&self.cluster.signing);
        tbls::verify_compressed(&pubshare, root.as_slice(), &signed.signature())
            .map_err(|_| ApiError::bad_request("invalid partial signature"))
    }

    /// Verifies and stores one duty's partials, stamped with this operator's
    /// share index.
    ///
    /// Validators are independent: a failing entry (bad signature, unknown
    /// pubkey, double sign) is reported back as the request's error, but the
    /// remaining validators' partials are still stored and processed.
    async fn store_partials(
        &self,
        duty: Duty,
        entries: Vec<(PublicKeyBytes, SignedData)>,
    ) -> Result<(), ApiError> {
        let mut set = ParSignedDataSet::new();
        let mut first_error = None;
        for (pubkey, signed) in entries {
            match self.verify_partial(&pubkey, &signed) {
                Ok(()) => {
                    set.insert(pubkey, ParSignedData::new(signed, self.share_index()));
                }
                Err(e) => first_error = first_error.or(Some(e)),
            }
        }

        if !set.is_empty() {
            if let Err(e) = self.parsigdb.store_internal(duty, set).await {
                first_error = first_error.or(Some(from_core(e)));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Pinned registration timestamp: genesis plus one slot, overriding any
    /// timestamp pre-generated by the VC.
    fn registration_timestamp(&self) -> u64 {
        self.cluster.signing.genesis_time + self.clock.slot_duration().as_secs()
    }
}

fn json_reply<T: serde::Serialize>(value: &T) -> warp::reply::Response {
    warp::reply::json(value).into_response()
}

fn accepted() -> warp::reply::Response {
    StatusCode::OK.into_response()
}

/// Binds the server and returns its address plus the serving future.
///
/// The future completes when `shutdown` fires; in-flight proxied requests
/// are cancelled with it.
pub fn serve<B: BeaconApi, C: SlotClock>(
    ctx: Arc<Context<B, C>>,
    config: Config,
    shutdown: CancellationToken,
) -> Result<(SocketAddr, impl std::future::Future<Output = ()>), String> {
    let log = ctx.log.clone();
    let routes = routes(ctx, &config, shutdown.clone());

    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(config.listen_addr, async move {
            shutdown.cancelled().await;
        })
        .map_err(|e| format!("failed to bind validator api: {}", e))?;

    info!(log, "Validator API started"; "listen_addr" => %addr);
    Ok((addr, server))
}

/// The full route tree, ending in the beacon-node proxy and the rejection
/// handler that renders the `{code, message}` envelope.
pub fn routes<B: BeaconApi, C: SlotClock>(
    ctx: Arc<Context<B, C>>,
    config: &Config,
    shutdown: CancellationToken,
) -> impl Filter<Extract = (impl Reply,), Error = std::convert::Infallible> + Clone {
    let ctx_filter = {
        let ctx = ctx.clone();
        warp::any().map(move || ctx.clone())
    };
    let query = warp::query::<QueryMap>();
    let raw_query = warp::query::raw()
        .or(warp::any().map(String::new))
        .unify();
    let body = warp::body::bytes();

    let attester_duties = warp::post()
        .and(warp::path!("eth" / "v1" / "validator" / "duties" / "attester" / String))
        .and(body)
        .and(ctx_filter.clone())
        .and_then(attester_duties_handler);

    let proposer_duties = warp::get()
        .and(warp::path!("eth" / "v1" / "validator" / "duties" / "proposer" / String))
        .and(ctx_filter.clone())
        .and_then(proposer_duties_handler);

    let sync_duties = warp::post()
        .and(warp::path!("eth" / "v1" / "validator" / "duties" / "sync" / String))
        .and(body)
        .and(ctx_filter.clone())
        .and_then(sync_duties_handler);

    let attestation_data = warp::get()
        .and(warp::path!("eth" / "v1" / "validator" / "attestation_data"))
        .and(query)
        .and(ctx_filter.clone())
        .and_then(attestation_data_handler);

    let produce_block = warp::get()
        .and(warp::path!("eth" / "v3" / "validator" / "blocks" / String))
        .and(query)
        .and(ctx_filter.clone())
        .and_then(produce_block_handler);

    let aggregate_attestation = warp::get()
        .and(warp::path!("eth" / "v1" / "validator" / "aggregate_attestation"))
        .and(query)
        .and(ctx_filter.clone())
        .and_then(aggregate_attestation_handler);

    let sync_contribution = warp::get()
        .and(warp::path!("eth" / "v1" / "validator" / "sync_committee_contribution"))
        .and(query)
        .and(ctx_filter.clone())
        .and_then(sync_contribution_handler);

    let submit_attestations = warp::post()
        .and(warp::path!("eth" / "v1" / "beacon" / "pool" / "attestations"))
        .and(body)
        .and(ctx_filter.clone())
        .and_then(submit_attestations_handler);

    let submit_block = warp::post()
        .and(warp::path!("eth" / "v2" / "beacon" / "blocks"))
        .and(body)
        .and(ctx_filter.clone())
        .and_then(|body, ctx| submit_proposal_handler(body, ctx, false));

    let submit_blinded_block = warp::post()
        .and(warp::path!("eth" / "v2" / "beacon" / "blinded_blocks"))
        .and(body)
        .and(ctx_filter.clone())
        .and_then(|body, ctx| submit_proposal_handler(body, ctx, true));

    let submit_aggregates = warp::post()
        .and(warp::path!("eth" / "v1" / "validator" / "aggregate_and_proofs"))
        .and(body)
        .and(ctx_filter.clone())
        .and_then(submit_aggregates_handler);

    let submit_sync_messages = warp::post()
        .and(warp::path!("eth" / "v1" / "beacon" / "pool" / "sync_committees"))
        .and(body)
        .and(ctx_filter.clone())
        .and_then(submit_sync_messages_handler);

    let submit_contributions = warp::post()
        .and(warp::path!("eth" / "v1" / "validator" / "contribution_and_proofs"))
        .and(body)
        .and(ctx_filter.clone())
        .and_then(submit_contributions_handler);

    let submit_exit = warp::post()
        .and(warp::path!("eth" / "v1" / "beacon" / "pool" / "voluntary_exits"))
        .and(body)
        .and(ctx_filter.clone())
        .and_then(submit_exit_handler);

    let register_validator = warp::post()
        .and(warp::path!("eth" / "v1" / "validator" / "register_validator"))
        .and(body)
        .and(ctx_filter.clone())
        .and_then(register_validator_handler);

    let beacon_committee_selections = warp::post()
        .and(warp::path!("eth" / "v1" / "validator" / "beacon_committee_selections"))
        .and(body)
        .and(ctx_filter.clone())
        .and_then(beacon_committee_selections_handler);

    let sync_committee_selections = warp::post()
        .and(warp::path!("eth" / "v1" / "validator" / "sync_committee_selections"))
        .and(body)
        .and(ctx_filter.clone())
        .and_then(sync_committee_selections_handler);

    let proposer_config = warp::get()
        .and(warp::path!("proposer_config"))
        .and(ctx_filter)
        .and_then(proposer_config_handler);

    let proxy = Proxy::new(
        config.beacon_url.clone(),
        shutdown,
        ctx.log.clone(),
    );
    let proxy_filter = warp::any().map(move || proxy.clone());
    let passthrough = warp::any()
        .and(warp::method())
        .and(warp::path::full())
        .and(raw_query)
        .and(warp::body::bytes())
        .and(proxy_filter)
        .and_then(
            |method, path, raw_query, body, proxy: Proxy| async move {
                proxy.forward(method, path, raw_query, body).await
            },
        );

    attester_duties
        .or(proposer_duties)
        .or(sync_duties)
        .or(attestation_data)
        .or(produce_block)
        .or(aggregate_attestation)
        .or(sync_contribution)
        .or(submit_attestations)
        .or(submit_block)
        .or(submit_blinded_block)
        .or(submit_aggregates)
        .or(submit_sync_messages)
        .or(submit_contributions)
        .or(submit_exit)
        .or(register_validator)
        .or(beacon_committee_selections)
        .or(sync_committee_selections)
        .or(proposer_config)
        .or(passthrough)
        .recover(handle_rejection)
}

async fn attester_duties_handler<B: BeaconApi, C: SlotClock>(
    epoch: String,
    body: warp::hyper::body::Bytes,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let epoch = Epoch::new(uint_path("epoch", &epoch).map_err(ApiError::reject)?);
    let indices: Vec<String> = parse_body(&body).map_err(ApiError::reject)?;
    let indices = indices
        .iter()
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| ApiError::bad_request("failed parsing json request body").reject())
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut duties = ctx
        .beacon
        .attester_duties(epoch, &indices)
        .await
        .map_err(|e| ApiError::service_unavailable(format!("beacon node: {:?}", e)).reject())?;
    for duty in duties.iter_mut() {
        duty.pubkey = ctx.to_pubshare(duty.pubkey);
    }

    Ok(json_reply(&DutiesResponse {
        dependent_root: Hash256::ZERO,
        execution_optimistic: false,
        data: duties,
    }))
}

async fn proposer_duties_handler<B: BeaconApi, C: SlotClock>(
    epoch: String,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let epoch = Epoch::new(uint_path("epoch", &epoch).map_err(ApiError::reject)?);
    let mut duties = ctx
        .beacon
        .proposer_duties(epoch)
        .await
        .map_err(|e| ApiError::service_unavailable(format!("beacon node: {:?}", e)).reject())?;
    for duty in duties.iter_mut() {
        duty.pubkey = ctx.to_pubshare(duty.pubkey);
    }

    Ok(json_reply(&DutiesResponse {
        dependent_root: Hash256::ZERO,
        execution_optimistic: false,
        data: duties,
    }))
}

async fn sync_duties_handler<B: BeaconApi, C: SlotClock>(
    epoch: String,
    body: warp::hyper::body::Bytes,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let epoch = Epoch::new(uint_path("epoch", &epoch).map_err(ApiError::reject)?);
    let indices: Vec<String> = parse_body(&body).map_err(ApiError::reject)?;
    let indices = indices
        .iter()
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| ApiError::bad_request("failed parsing json request body").reject())
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut duties = ctx
        .beacon
        .sync_duties(epoch, &indices)
        .await
        .map_err(|e| ApiError::service_unavailable(format!("beacon node: {:?}", e)).reject())?;
    for duty in duties.iter_mut() {
        duty.pubkey = ctx.to_pubshare(duty.pubkey);
    }

    Ok(json_reply(&GenericResponse::new(duties)))
}

async fn attestation_data_handler<B: BeaconApi, C: SlotClock>(
    query: QueryMap,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let slot = Slot::new(uint_query(&query, "slot").map_err(ApiError::reject)?);
    let committee_index = uint_query(&query, "committee_index").map_err(ApiError::reject)?;

    let data = ctx
        .dutydb
        .await_att_data(slot, committee_index)
        .await
        .map_err(|e| from_core(e).reject())?;
    Ok(json_reply(&GenericResponse::new(data)))
}

async fn produce_block_handler<B: BeaconApi, C: SlotClock>(
    slot: String,
    query: QueryMap,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let slot = Slot::new(uint_path("slot", &slot).map_err(ApiError::reject)?);
    let randao_reveal = signature_query(&query, "randao_reveal").map_err(ApiError::reject)?;
    // Accepted for API compatibility; the fetcher uses the configured values.
    let _graffiti = opt_root_query(&query, "graffiti").map_err(ApiError::reject)?;
    let _boost = opt_uint_query(&query, "builder_boost_factor").map_err(ApiError::reject)?;

    // The VC's randao reveal is this operator's partial RANDAO signature.
    let definitions = ctx
        .scheduler
        .get_duty_definition(Duty::randao(slot))
        .await
        .map_err(|e| from_core(e).reject())?;
    let entries = definitions
        .keys()
        .map(|pubkey| {
            (
                *pubkey,
                SignedData::Randao(SignedRandao {
                    epoch: slot.epoch(),
                    signature: randao_reveal,
                }),
            )
        })
        .collect();
    ctx.store_partials(Duty::randao(slot), entries)
        .await
        .map_err(ApiError::reject)?;

    // Once the aggregated reveal exists, the fetcher produces the block and
    // consensus stores it here.
    let proposal = ctx
        .dutydb
        .await_proposal(slot)
        .await
        .map_err(|e| from_core(e).reject())?;

    let body = serde_json::to_vec(&proposal)
        .map_err(|e| ApiError::internal(format!("encoding proposal: {}", e)).reject())?;
    warp::http::Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .header("Eth-Consensus-Version", proposal.version.to_string())
        .header(
            "Eth-Execution-Payload-Blinded",
            if proposal.blinded { "true" } else { "false" },
        )
        .header(
            "Eth-Execution-Payload-Value",
            proposal.execution_payload_value.to_string(),
        )
        .header(
            "Eth-Consensus-Block-Value",
            proposal.consensus_block_value.to_string(),
        )
        .body(warp::hyper::Body::from(body))
        .map_err(|e| ApiError::internal(format!("building response: {}", e)).reject())
}

async fn aggregate_attestation_handler<B: BeaconApi, C: SlotClock>(
    query: QueryMap,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let slot = Slot::new(uint_query(&query, "slot").map_err(ApiError::reject)?);
    let root = root_query(&query, "attestation_data_root").map_err(ApiError::reject)?;

    let aggregate = ctx
        .dutydb
        .await_agg_attestation(slot, root)
        .await
        .map_err(|e| from_core(e).reject())?;
    Ok(json_reply(&GenericResponse::new(aggregate)))
}

async fn sync_contribution_handler<B: BeaconApi, C: SlotClock>(
    query: QueryMap,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let slot = Slot::new(uint_query(&query, "slot").map_err(ApiError::reject)?);
    let subcommittee_index = uint_query(&query, "subcommittee_index").map_err(ApiError::reject)?;
    let block_root = root_query(&query, "beacon_block_root").map_err(ApiError::reject)?;

    let contribution = ctx
        .dutydb
        .await_sync_contribution(slot, subcommittee_index, block_root)
        .await
        .map_err(|e| from_core(e).reject())?;
    Ok(json_reply(&GenericResponse::new(contribution)))
}

async fn submit_attestations_handler<B: BeaconApi, C: SlotClock>(
    body: warp::hyper::body::Bytes,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let attestations: Vec<Attestation> = parse_body(&body).map_err(ApiError::reject)?;

    let mut by_slot: BTreeMap<Slot, Vec<(PublicKeyBytes, SignedData)>> = BTreeMap::new();
    for attestation in attestations {
        let slot = attestation.data.slot;
        let committee_index = attestation.data.index;

        let set_bits = attestation
            .aggregation_bits
            .iter()
            .enumerate()
            .filter(|(_, bit)| *bit)
            .map(|(i, _)| i as u64)
            .collect::<Vec<_>>();
        let [position] = set_bits.as_slice() else {
            return Err(ApiError::bad_request(
                "attestation must have exactly one aggregation bit set",
            )
            .reject());
        };

        let pubkey = ctx
            .dutydb
            .pubkey_by_attestation(slot, committee_index, *position)
            .ok_or_else(|| {
                ApiError::bad_request(format!(
                    "unknown attester at slot {} committee {} position {}",
                    slot, committee_index, position
                ))
                .reject()
            })?;

        by_slot
            .entry(slot)
            .or_default()
            .push((pubkey, SignedData::Attestation(attestation)));
    }

    let mut first_error = None;
    for (slot, entries) in by_slot {
        if let Err(e) = ctx.store_partials(Duty::attester(slot), entries).await {
            first_error = first_error.or(Some(e));
        }
    }
    if let Some(e) = first_error {
        return Err(e.reject());
    }
    Ok(accepted())
}

async fn submit_proposal_handler<B: BeaconApi, C: SlotClock>(
    body: warp::hyper::body::Bytes,
    ctx: Arc<Context<B, C>>,
    blinded_route: bool,
) -> Result<warp::reply::Response, Rejection> {
    let proposal: VersionedSignedProposal = parse_body(&body).map_err(ApiError::reject)?;
    let slot = proposal.slot();

    if proposal.blinded != blinded_route {
        return Err(ApiError::bad_request(format!(
            "blinded flag mismatch: proposal says {}, endpoint expects {}",
            proposal.blinded, blinded_route
        ))
        .reject());
    }

    // The submission must match the proposal the cluster agreed on, field by
    // field: any deviation means the VC signed something else.
    let stored = ctx
        .dutydb
        .await_proposal(slot)
        .await
        .map_err(|e| from_core(e).reject())?;
    if stored.proposer_index() != proposal.proposer_index() {
        return Err(ApiError::bad_request("proposal validator index mismatch").reject());
    }
    if stored.blinded != proposal.blinded {
        return Err(ApiError::bad_request("proposal blinded flag mismatch").reject());
    }
    if stored.version != proposal.version {
        return Err(ApiError::bad_request("proposal version mismatch").reject());
    }
    if stored.hash_tree_root() != proposal.hash_tree_root() {
        return Err(ApiError::bad_request("proposal hash tree root mismatch").reject());
    }

    let definitions = ctx
        .scheduler
        .get_duty_definition(Duty::proposer(slot))
        .await
        .map_err(|e| from_core(e).reject())?;
    let pubkey = definitions
        .iter()
        .find(|(_, def)| def.validator_index() == proposal.proposer_index())
        .map(|(pubkey, _)| *pubkey)
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "no proposer duty for validator index {}",
                proposal.proposer_index()
            ))
            .reject()
        })?;

    ctx.store_partials(
        Duty::proposer(slot),
        vec![(pubkey, SignedData::Proposal(proposal))],
    )
    .await
    .map_err(ApiError::reject)?;
    Ok(accepted())
}

async fn submit_aggregates_handler<B: BeaconApi, C: SlotClock>(
    body: warp::hyper::body::Bytes,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let aggregates: Vec<SignedAggregateAndProof> = parse_body(&body).map_err(ApiError::reject)?;

    let mut by_slot: BTreeMap<Slot, Vec<(PublicKeyBytes, SignedData)>> = BTreeMap::new();
    for aggregate in aggregates {
        let slot = aggregate.message.aggregate.data.slot;
        let pubkey = ctx
            .pubkey_by_index(aggregate.message.aggregator_index)
            .await
            .map_err(ApiError::reject)?;
        by_slot
            .entry(slot)
            .or_default()
            .push((pubkey, SignedData::AggregateAndProof(aggregate)));
    }

    let mut first_error = None;
    for (slot, entries) in by_slot {
        if let Err(e) = ctx.store_partials(Duty::aggregator(slot), entries).await {
            first_error = first_error.or(Some(e));
        }
    }
    if let Some(e) = first_error {
        return Err(e.reject());
    }
    Ok(accepted())
}

async fn submit_sync_messages_handler<B: BeaconApi, C: SlotClock>(
    body: warp::hyper::body::Bytes,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let messages: Vec<SyncCommitteeMessage> = parse_body(&body).map_err(ApiError::reject)?;

    let mut by_slot: BTreeMap<Slot, Vec<(PublicKeyBytes, SignedData)>> = BTreeMap::new();
    for message in messages {
        let slot = message.slot;
        let pubkey = ctx
            .pubkey_by_index(message.validator_index)
            .await
            .map_err(ApiError::reject)?;
        by_slot
            .entry(slot)
            .or_default()
            .push((pubkey, SignedData::SyncMessage(message)));
    }

    let mut first_error = None;
    for (slot, entries) in by_slot {
        if let Err(e) = ctx.store_partials(Duty::sync_message(slot), entries).await {
            first_error = first_error.or(Some(e));
        }
    }
    if let Some(e) = first_error {
        return Err(e.reject());
    }
    Ok(accepted())
}

async fn submit_contributions_handler<B: BeaconApi, C: SlotClock>(
    body: warp::hyper::body::Bytes,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let contributions: Vec<SignedContributionAndProof> =
        parse_body(&body).map_err(ApiError::reject)?;

    let mut by_slot: BTreeMap<Slot, Vec<(PublicKeyBytes, SignedData)>> = BTreeMap::new();
    for contribution in contributions {
        let slot = contribution.message.contribution.slot;
        let pubkey = ctx
            .pubkey_by_index(contribution.message.aggregator_index)
            .await
            .map_err(ApiError::reject)?;
        by_slot
            .entry(slot)
            .or_default()
            .push((pubkey, SignedData::SyncContribution(contribution)));
    }

    let mut first_error = None;
    for (slot, entries) in by_slot {
        if let Err(e) = ctx.store_partials(Duty::sync_contribution(slot), entries).await {
            first_error = first_error.or(Some(e));
        }
    }
    if let Some(e) = first_error {
        return Err(e.reject());
    }
    Ok(accepted())
}

async fn submit_exit_handler<B: BeaconApi, C: SlotClock>(
    body: warp::hyper::body::Bytes,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let exit: SignedVoluntaryExit = parse_body(&body).map_err(ApiError::reject)?;
    let pubkey = ctx
        .pubkey_by_index(exit.message.validator_index)
        .await
        .map_err(ApiError::reject)?;

    // Keyed by the exit epoch so every operator derives the same duty.
    let duty = Duty::voluntary_exit(exit.message.epoch.start_slot());
    ctx.store_partials(duty, vec![(pubkey, SignedData::VoluntaryExit(exit))])
        .await
        .map_err(ApiError::reject)?;
    Ok(accepted())
}

async fn register_validator_handler<B: BeaconApi, C: SlotClock>(
    body: warp::hyper::body::Bytes,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let registrations: Vec<SignedValidatorRegistration> =
        parse_body(&body).map_err(ApiError::reject)?;

    // Deterministic duty key across operators within the epoch.
    let now = ctx.clock.now().unwrap_or(Slot::new(0));
    let duty = Duty::builder_registration(now.epoch().start_slot());

    let mut entries = Vec::new();
    for registration in registrations {
        // VCs send registrations keyed by what they believe is the validator
        // pubkey, i.e. this operator's pubshare.
        let Some(validator) = ctx
            .cluster
            .validator_by_pubshare(ctx.node_index, &registration.message.pubkey)
        else {
            // Some VCs register keys outside the cluster; swallowing keeps
            // them happy.
            if !ctx
                .unknown_registration_logged
                .swap(true, Ordering::Relaxed)
            {
                debug!(
                    ctx.log, "Ignoring registration for unknown pubkey";
                    "pubkey" => ?registration.message.pubkey,
                );
            }
            continue;
        };

        // The canonical registration every operator signs: cluster policy
        // values and the group pubkey, with the pinned timestamp.
        let canonical = SignedValidatorRegistration {
            message: ValidatorRegistration {
                fee_recipient: validator.fee_recipient,
                gas_limit: validator.gas_limit,
                timestamp: ctx.registration_timestamp(),
                pubkey: validator.public_key,
            },
            signature: registration.signature,
        };
        entries.push((validator.public_key, SignedData::Registration(canonical)));
    }

    if !entries.is_empty() {
        ctx.store_partials(duty, entries)
            .await
            .map_err(ApiError::reject)?;
    }
    Ok(accepted())
}

async fn beacon_committee_selections_handler<B: BeaconApi, C: SlotClock>(
    body: warp::hyper::body::Bytes,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let selections: Vec<BeaconCommitteeSelection> = parse_body(&body).map_err(ApiError::reject)?;

    let mut keyed = Vec::new();
    for selection in &selections {
        let pubkey = ctx
            .pubkey_by_index(selection.validator_index)
            .await
            .map_err(ApiError::reject)?;
        keyed.push((pubkey, selection.clone()));
    }

    let mut by_slot: BTreeMap<Slot, Vec<(PublicKeyBytes, SignedData)>> = BTreeMap::new();
    for (pubkey, selection) in &keyed {
        by_slot
            .entry(selection.slot)
            .or_default()
            .push((*pubkey, SignedData::BeaconCommitteeSelection(selection.clone())));
    }
    let mut first_error = None;
    for (slot, entries) in by_slot {
        if let Err(e) = ctx.store_partials(Duty::prepare_aggregator(slot), entries).await {
            first_error = first_error.or(Some(e));
        }
    }
    // Do not block on aggregated proofs that a failed store can never
    // produce; the healthy validators' partials are already on their way.
    if let Some(e) = first_error {
        return Err(e.reject());
    }

    // Block until the cluster's aggregated selection proofs are available;
    // that is the whole point of this endpoint.
    let mut aggregated = Vec::with_capacity(keyed.len());
    for (pubkey, selection) in keyed {
        let signed = ctx
            .aggsigdb
            .await_signed(Duty::prepare_aggregator(selection.slot), pubkey)
            .await
            .map_err(|e| from_core(e).reject())?;
        let SignedData::BeaconCommitteeSelection(selection) = signed else {
            return Err(ApiError::internal("unexpected aggregated data kind").reject());
        };
        aggregated.push(selection);
    }

    Ok(json_reply(&GenericResponse::new(aggregated)))
}

async fn sync_committee_selections_handler<B: BeaconApi, C: SlotClock>(
    body: warp::hyper::body::Bytes,
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let selections: Vec<SyncCommitteeSelection> = parse_body(&body).map_err(ApiError::reject)?;

    let mut keyed = Vec::new();
    for selection in &selections {
        let pubkey = ctx
            .pubkey_by_index(selection.validator_index)
            .await
            .map_err(ApiError::reject)?;
        keyed.push((pubkey, selection.clone()));
    }

    let mut by_slot: BTreeMap<Slot, Vec<(PublicKeyBytes, SignedData)>> = BTreeMap::new();
    for (pubkey, selection) in &keyed {
        by_slot
            .entry(selection.slot)
            .or_default()
            .push((*pubkey, SignedData::SyncCommitteeSelection(selection.clone())));
    }
    let mut first_error = None;
    for (slot, entries) in by_slot {
        if let Err(e) = ctx.store_partials(Duty::prepare_sync_contribution(slot), entries).await {
            first_error = first_error.or(Some(e));
        }
    }
    // Do not block on aggregated proofs that a failed store can never
    // produce; the healthy validators' partials are already on their way.
    if let Some(e) = first_error {
        return Err(e.reject());
    }

    let mut aggregated = Vec::with_capacity(keyed.len());
    for (pubkey, selection) in keyed {
        let signed = ctx
            .aggsigdb
            .await_signed(Duty::prepare_sync_contribution(selection.slot), pubkey)
            .await
            .map_err(|e| from_core(e).reject())?;
        let SignedData::SyncCommitteeSelection(selection) = signed else {
            return Err(ApiError::internal("unexpected aggregated data kind").reject());
        };
        aggregated.push(selection);
    }

    Ok(json_reply(&GenericResponse::new(aggregated)))
}

#[derive(serde::Serialize)]
struct BuilderOverrides {
    #[serde(with = "serde_utils::quoted_u64")]
    timestamp: u64,
    public_key: PublicKeyBytes,
}

#[derive(serde::Serialize)]
struct BuilderConfig {
    enabled: bool,
    gas_limit: u64,
    overrides: BuilderOverrides,
}

#[derive(serde::Serialize)]
struct ProposerEntry {
    fee_recipient: dv_types::Address,
    builder: BuilderConfig,
}

#[derive(serde::Serialize)]
struct ProposerConfigResponse {
    proposer_config: BTreeMap<PublicKeyBytes, ProposerEntry>,
}

async fn proposer_config_handler<B: BeaconApi, C: SlotClock>(
    ctx: Arc<Context<B, C>>,
) -> Result<warp::reply::Response, Rejection> {
    let timestamp = ctx.registration_timestamp();
    let mut proposer_config = BTreeMap::new();

    for validator in &ctx.cluster.validators {
        let Some(pubshare) = validator.pubshares.get(ctx.node_index) else {
            continue;
        };
        proposer_config.insert(
            *pubshare,
            ProposerEntry {
                fee_recipient: validator.fee_recipient,
                builder: BuilderConfig {
                    enabled: validator.builder_enabled,
                    gas_limit: validator.gas_limit,
                    overrides: BuilderOverrides {
                        timestamp,
                        public_key: validator.public_key,
                    },
                },
            },
        );
    }

    Ok(json_reply(&ProposerConfigResponse { proposer_config }))
}
