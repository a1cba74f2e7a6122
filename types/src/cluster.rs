//! The cluster manifest: operators, threshold, validators and their share
//! public keys. Stored as JSON in the node data directory and identical on
//! every operator node.

use crate::{Address, PublicKeyBytes, SigningContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub const DEFAULT_GAS_LIMIT: u64 = 30_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    /// Operator identity record (derived from the cluster-lock public keys).
    pub enr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterValidator {
    /// The group public key visible on the beacon chain.
    pub public_key: PublicKeyBytes,
    /// One share public key per operator, in operator order.
    pub pubshares: Vec<PublicKeyBytes>,
    pub fee_recipient: Address,
    #[serde(default)]
    pub builder_enabled: bool,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub operators: Vec<Operator>,
    pub threshold: usize,
    pub validators: Vec<ClusterValidator>,
    pub signing: SigningContext,
}

#[derive(Debug)]
pub enum ClusterError {
    Io(std::io::Error),
    Json(serde_json::Error),
    NoOperators,
    InvalidThreshold { threshold: usize, operators: usize },
    PubshareCountMismatch { validator: PublicKeyBytes, got: usize },
    DuplicateValidator(PublicKeyBytes),
    NoValidators,
}

impl From<std::io::Error> for ClusterError {
    fn from(e: std::io::Error) -> Self {
        ClusterError::Io(e)
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(e: serde_json::Error) -> Self {
        ClusterError::Json(e)
    }
}

impl Cluster {
    pub fn load(path: &Path) -> Result<Self, ClusterError> {
        let bytes = fs::read(path)?;
        let cluster: Cluster = serde_json::from_slice(&bytes)?;
        cluster.validate()?;
        Ok(cluster)
    }

    pub fn save(&self, path: &Path) -> Result<(), ClusterError> {
        self.validate()?;
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ClusterError> {
        let operators = self.operators.len();
        if operators == 0 {
            return Err(ClusterError::NoOperators);
        }
        if self.threshold == 0 || self.threshold > operators {
            return Err(ClusterError::InvalidThreshold {
                threshold: self.threshold,
                operators,
            });
        }
        if self.validators.is_empty() {
            return Err(ClusterError::NoValidators);
        }

        let mut seen = BTreeSet::new();
        for validator in &self.validators {
            if !seen.insert(validator.public_key) {
                return Err(ClusterError::DuplicateValidator(validator.public_key));
            }
            if validator.pubshares.len() != operators {
                return Err(ClusterError::PubshareCountMismatch {
                    validator: validator.public_key,
                    got: validator.pubshares.len(),
                });
            }
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.operators.len()
    }

    pub fn group_pubkeys(&self) -> Vec<PublicKeyBytes> {
        self.validators.iter().map(|v| v.public_key).collect()
    }

    pub fn validator_by_pubkey(&self, pubkey: &PublicKeyBytes) -> Option<&ClusterValidator> {
        self.validators.iter().find(|v| &v.public_key == pubkey)
    }

    /// Resolves the validator whose share at `node_index` is `pubshare`.
    pub fn validator_by_pubshare(
        &self,
        node_index: usize,
        pubshare: &PublicKeyBytes,
    ) -> Option<&ClusterValidator> {
        self.validators
            .iter()
            .find(|v| v.pubshares.get(node_index) == Some(pubshare))
    }

    /// The share public key of `pubkey`'s validator held by `node_index`.
    pub fn pubshare(&self, node_index: usize, pubkey: &PublicKeyBytes) -> Option<PublicKeyBytes> {
        self.validator_by_pubkey(pubkey)
            .and_then(|v| v.pubshares.get(node_index))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Hash256;

    fn pubkey(byte: u8) -> PublicKeyBytes {
        PublicKeyBytes::from([byte; 48])
    }

    pub(crate) fn test_cluster(operators: usize, threshold: usize) -> Cluster {
        Cluster {
            name: "test".into(),
            operators: (0..operators)
                .map(|i| Operator {
                    enr: format!("enr:-operator-{i}"),
                })
                .collect(),
            threshold,
            validators: vec![ClusterValidator {
                public_key: pubkey(0xf0),
                pubshares: (0..operators).map(|i| pubkey(0x10 + i as u8)).collect(),
                fee_recipient: Address::repeat_byte(0x42),
                builder_enabled: false,
                gas_limit: DEFAULT_GAS_LIMIT,
            }],
            signing: SigningContext {
                fork_version: [0, 0, 0, 0],
                genesis_validators_root: Hash256::repeat_byte(0x4b),
                genesis_time: 1_606_824_023,
            },
        }
    }

    #[test]
    fn validate_checks_threshold() {
        assert!(test_cluster(4, 3).validate().is_ok());
        assert!(matches!(
            test_cluster(4, 5).validate(),
            Err(ClusterError::InvalidThreshold { .. })
        ));
        assert!(matches!(
            test_cluster(4, 0).validate(),
            Err(ClusterError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn validate_checks_pubshare_count() {
        let mut cluster = test_cluster(4, 3);
        cluster.validators[0].pubshares.pop();
        assert!(matches!(
            cluster.validate(),
            Err(ClusterError::PubshareCountMismatch { got: 3, .. })
        ));
    }

    #[test]
    fn validate_rejects_duplicates() {
        let mut cluster = test_cluster(4, 3);
        let dup = cluster.validators[0].clone();
        cluster.validators.push(dup);
        assert!(matches!(
            cluster.validate(),
            Err(ClusterError::DuplicateValidator(_))
        ));
    }

    #[test]
    fn pubshare_lookups() {
        let cluster = test_cluster(4, 3);
        let group = cluster.validators[0].public_key;
        let share2 = cluster.validators[0].pubshares[2];

        assert_eq!(cluster.pubshare(2, &group), Some(share2));
        assert_eq!(
            cluster
                .validator_by_pubshare(2, &share2)
                .map(|v| v.public_key),
            Some(group)
        );
        assert_eq!(cluster.validator_by_pubshare(1, &share2), None);
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster-manifest.json");
        let cluster = test_cluster(4, 3);

        cluster.save(&path).unwrap();
        let loaded = Cluster::load(&path).unwrap();
        assert_eq!(cluster, loaded);
    }
}
