//! Beacon-node REST API consumer.
//!
//! `BeaconApi` is the surface the pipeline depends on; `BeaconNodeHttpClient`
//! implements it over HTTP and `mock::MockBeaconNode` implements it in memory
//! for tests and local simnets.

pub mod mock;
mod types;

pub use types::{
    DutiesResponse, ErrorMessage, GenericResponse, GenesisData, StateId, SyncingData,
    ValidatorsRequest, VersionData,
};

use dv_types::{
    Attestation, AttestationData, AttesterDefinition, Epoch, Hash256, ProposerDefinition,
    SignatureBytes, SignedAggregateAndProof, SignedContributionAndProof,
    SignedValidatorRegistration, SignedVoluntaryExit, Slot, SyncCommitteeContribution,
    SyncCommitteeDefinition, SyncCommitteeMessage, ValidatorData, VersionedProposal,
    VersionedSignedProposal,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use url::Url;

#[derive(Debug)]
pub enum Error {
    /// The beacon node could not be reached or the request timed out.
    Reqwest(reqwest::Error),
    /// The beacon node returned a non-2xx status with a parseable error body.
    ServerMessage { status: u16, message: String },
    /// The beacon node returned a non-2xx status without a parseable body.
    StatusCode { status: u16 },
    InvalidUrl(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Reqwest(e)
    }
}

impl Error {
    /// Server-side failures worth retrying within the duty deadline.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Reqwest(e) => e.is_timeout() || e.is_connect(),
            Error::ServerMessage { status, .. } | Error::StatusCode { status } => *status >= 500,
            Error::InvalidUrl(_) => false,
        }
    }
}

/// The beacon-node operations the duty pipeline consumes.
///
/// Root-indexed lookups (`aggregate_attestation`, `sync_contribution`) return
/// `Ok(None)` when the beacon node does not know the root yet; callers retry
/// on the next slot tick.
pub trait BeaconApi: Clone + Send + Sync + 'static {
    fn genesis(&self) -> impl Future<Output = Result<GenesisData, Error>> + Send;

    fn node_version(&self) -> impl Future<Output = Result<VersionData, Error>> + Send;

    fn validators(
        &self,
        state: StateId,
        pubkeys: &[dv_types::PublicKeyBytes],
    ) -> impl Future<Output = Result<Vec<ValidatorData>, Error>> + Send;

    fn attester_duties(
        &self,
        epoch: Epoch,
        indices: &[u64],
    ) -> impl Future<Output = Result<Vec<AttesterDefinition>, Error>> + Send;

    fn proposer_duties(
        &self,
        epoch: Epoch,
    ) -> impl Future<Output = Result<Vec<ProposerDefinition>, Error>> + Send;

    fn sync_duties(
        &self,
        epoch: Epoch,
        indices: &[u64],
    ) -> impl Future<Output = Result<Vec<SyncCommitteeDefinition>, Error>> + Send;

    fn attestation_data(
        &self,
        slot: Slot,
        committee_index: u64,
    ) -> impl Future<Output = Result<AttestationData, Error>> + Send;

    fn produce_proposal(
        &self,
        slot: Slot,
        randao_reveal: SignatureBytes,
        graffiti: Option<Hash256>,
        builder_boost_factor: Option<u64>,
    ) -> impl Future<Output = Result<VersionedProposal, Error>> + Send;

    fn aggregate_attestation(
        &self,
        slot: Slot,
        attestation_data_root: Hash256,
    ) -> impl Future<Output = Result<Option<Attestation>, Error>> + Send;

    fn sync_contribution(
        &self,
        slot: Slot,
        subcommittee_index: u64,
        beacon_block_root: Hash256,
    ) -> impl Future<Output = Result<Option<SyncCommitteeContribution>, Error>> + Send;

    fn submit_attestations(
        &self,
        attestations: &[Attestation],
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn submit_proposal(
        &self,
        proposal: &VersionedSignedProposal,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn submit_aggregates(
        &self,
        aggregates: &[SignedAggregateAndProof],
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn submit_sync_messages(
        &self,
        messages: &[SyncCommitteeMessage],
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn submit_sync_contributions(
        &self,
        contributions: &[SignedContributionAndProof],
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn submit_voluntary_exit(
        &self,
        exit: &SignedVoluntaryExit,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn register_validators(
        &self,
        registrations: &[SignedValidatorRegistration],
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

/// HTTP implementation of [`BeaconApi`].
#[derive(Clone)]
pub struct BeaconNodeHttpClient {
    client: reqwest::Client,
    server: Url,
    timeout: Duration,
}

impl BeaconNodeHttpClient {
    pub fn new(server: Url, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            server,
            timeout,
        }
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        self.server
            .join(path)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", path, e)))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match response.json::<ErrorMessage>().await {
            Ok(body) => Err(Error::ServerMessage {
                status: status.as_u16(),
                message: body.message,
            }),
            Err(_) => Err(Error::StatusCode {
                status: status.as_u16(),
            }),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    /// GET that treats 404 as "not known yet".
    async fn get_opt_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, Error> {
        let response = self.client.get(url).timeout(self.timeout).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_status(response).await?;
        Ok(Some(response.json().await?))
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, Error> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn post_json_unit<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<(), Error> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }
}

impl BeaconApi for BeaconNodeHttpClient {
    async fn genesis(&self) -> Result<GenesisData, Error> {
        let url = self.url("eth/v1/beacon/genesis")?;
        Ok(self.get_json::<GenericResponse<GenesisData>>(url).await?.data)
    }

    async fn node_version(&self) -> Result<VersionData, Error> {
        let url = self.url("eth/v1/node/version")?;
        Ok(self.get_json::<GenericResponse<VersionData>>(url).await?.data)
    }

    async fn validators(
        &self,
        state: StateId,
        pubkeys: &[dv_types::PublicKeyBytes],
    ) -> Result<Vec<ValidatorData>, Error> {
        let url = self.url(&format!("eth/v1/beacon/states/{}/validators", state))?;
        let request = ValidatorsRequest {
            ids: pubkeys.to_vec(),
        };
        Ok(self
            .post_json::<_, GenericResponse<Vec<ValidatorData>>>(url, &request)
            .await?
            .data)
    }

    async fn attester_duties(
        &self,
        epoch: Epoch,
        indices: &[u64],
    ) -> Result<Vec<AttesterDefinition>, Error> {
        let url = self.url(&format!("eth/v1/validator/duties/attester/{}", epoch))?;
        let body = indices.iter().map(|i| i.to_string()).collect::<Vec<_>>();
        Ok(self
            .post_json::<_, DutiesResponse<Vec<AttesterDefinition>>>(url, &body)
            .await?
            .data)
    }

    async fn proposer_duties(&self, epoch: Epoch) -> Result<Vec<ProposerDefinition>, Error> {
        let url = self.url(&format!("eth/v1/validator/duties/proposer/{}", epoch))?;
        Ok(self
            .get_json::<DutiesResponse<Vec<ProposerDefinition>>>(url)
            .await?
            .data)
    }

    async fn sync_duties(
        &self,
        epoch: Epoch,
        indices: &[u64],
    ) -> Result<Vec<SyncCommitteeDefinition>, Error> {
        let url = self.url(&format!("eth/v1/validator/duties/sync/{}", epoch))?;
        let body = indices.iter().map(|i| i.to_string()).collect::<Vec<_>>();
        Ok(self
            .post_json::<_, GenericResponse<Vec<SyncCommitteeDefinition>>>(url, &body)
            .await?
            .data)
    }

    async fn attestation_data(
        &self,
        slot: Slot,
        committee_index: u64,
    ) -> Result<AttestationData, Error> {
        let mut url = self.url("eth/v1/validator/attestation_data")?;
        url.query_pairs_mut()
            .append_pair("slot", &slot.to_string())
            .append_pair("committee_index", &committee_index.to_string());
        Ok(self
            .get_json::<GenericResponse<AttestationData>>(url)
            .await?
            .data)
    }

    async fn produce_proposal(
        &self,
        slot: Slot,
        randao_reveal: SignatureBytes,
        graffiti: Option<Hash256>,
        builder_boost_factor: Option<u64>,
    ) -> Result<VersionedProposal, Error> {
        let mut url = self.url(&format!("eth/v3/validator/blocks/{}", slot))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("randao_reveal", &randao_reveal.to_string());
            if let Some(graffiti) = graffiti {
                pairs.append_pair("graffiti", &format!("{:?}", graffiti));
            }
            if let Some(factor) = builder_boost_factor {
                pairs.append_pair("builder_boost_factor", &factor.to_string());
            }
        }
        // The v3 envelope is the proposal type itself.
        self.get_json::<VersionedProposal>(url).await
    }

    async fn aggregate_attestation(
        &self,
        slot: Slot,
        attestation_data_root: Hash256,
    ) -> Result<Option<Attestation>, Error> {
        let mut url = self.url("eth/v1/validator/aggregate_attestation")?;
        url.query_pairs_mut()
            .append_pair("slot", &slot.to_string())
            .append_pair("attestation_data_root", &format!("{:?}", attestation_data_root));
        Ok(self
            .get_opt_json::<GenericResponse<Attestation>>(url)
            .await?
            .map(|r| r.data))
    }

    async fn sync_contribution(
        &self,
        slot: Slot,
        subcommittee_index: u64,
        beacon_block_root: Hash256,
    ) -> Result<Option<SyncCommitteeContribution>, Error> {
        let mut url = self.url("eth/v1/validator/sync_committee_contribution")?;
        url.query_pairs_mut()
            .append_pair("slot", &slot.to_string())
            .append_pair("subcommittee_index", &subcommittee_index.to_string())
            .append_pair("beacon_block_root", &format!("{:?}", beacon_block_root));
        Ok(self
            .get_opt_json::<GenericResponse<SyncCommitteeContribution>>(url)
            .await?
            .map(|r| r.data))
    }

    async fn submit_attestations(&self, attestations: &[Attestation]) -> Result<(), Error> {
        let url = self.url("eth/v1/beacon/pool/attestations")?;
        self.post_json_unit(url, attestations).await
    }

    async fn submit_proposal(&self, proposal: &VersionedSignedProposal) -> Result<(), Error> {
        let path = if proposal.blinded {
            "eth/v2/beacon/blinded_blocks"
        } else {
            "eth/v2/beacon/blocks"
        };
        let url = self.url(path)?;
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header("Eth-Consensus-Version", proposal.version.to_string())
            .json(proposal)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn submit_aggregates(&self, aggregates: &[SignedAggregateAndProof]) -> Result<(), Error> {
        let url = self.url("eth/v1/validator/aggregate_and_proofs")?;
        self.post_json_unit(url, aggregates).await
    }

    async fn submit_sync_messages(&self, messages: &[SyncCommitteeMessage]) -> Result<(), Error> {
        let url = self.url("eth/v1/beacon/pool/sync_committees")?;
        self.post_json_unit(url, messages).await
    }

    async fn submit_sync_contributions(
        &self,
        contributions: &[SignedContributionAndProof],
    ) -> Result<(), Error> {
        let url = self.url("eth/v1/validator/contribution_and_proofs")?;
        self.post_json_unit(url, contributions).await
    }

    async fn submit_voluntary_exit(&self, exit: &SignedVoluntaryExit) -> Result<(), Error> {
        let url = self.url("eth/v1/beacon/pool/voluntary_exits")?;
        self.post_json_unit(url, exit).await
    }

    async fn register_validators(
        &self,
        registrations: &[SignedValidatorRegistration],
    ) -> Result<(), Error> {
        let url = self.url("eth/v1/validator/register_validator")?;
        self.post_json_unit(url, registrations).await
    }
}
