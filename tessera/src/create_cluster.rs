//! Simnet cluster generation.
//!
//! Produces everything a local cluster needs in one directory: the manifest
//! shared by all operators, per-operator key-share files for the validator
//! clients, and deposit data for chain activation. Key shares come from the
//! insecure deterministic generator; real clusters run a DKG ceremony
//! instead.

use crate::CreateClusterArgs;
use dv_types::{
    compute_domain, deposit_file_name, signing_root, Address, Cluster, ClusterValidator,
    DepositMessage, Hash256, Operator, SigningContext, DOMAIN_DEPOSIT,
    MAX_STANDARD_DEPOSIT_GWEI,
};
use serde_json::json;
use slog::{info, Logger};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tree_hash::TreeHash;

const CLUSTER_MANIFEST_FILE: &str = "cluster-manifest.json";

pub fn run(args: CreateClusterArgs, log: Logger) -> Result<(), String> {
    let threshold = args.threshold.unwrap_or_else(|| bft_threshold(args.nodes));
    if args.nodes == 0 || args.validators == 0 {
        return Err("cluster needs at least one node and one validator".into());
    }
    if threshold == 0 || threshold > args.nodes {
        return Err(format!(
            "threshold {} invalid for {} nodes",
            threshold, args.nodes
        ));
    }

    let fee_recipient = parse_address("fee-recipient", &args.fee_recipient)?;
    let withdrawal_address = parse_address("withdrawal-address", &args.withdrawal_address)?;

    fs::create_dir_all(&args.output_dir)
        .map_err(|e| format!("failed to create output dir: {}", e))?;

    let signing = SigningContext {
        fork_version: [0, 0, 0, 0],
        genesis_validators_root: Hash256::ZERO,
        genesis_time: now_unix()?,
    };

    let mut validators = Vec::new();
    let mut deposits = Vec::new();
    for validator_index in 0..args.validators {
        let seed = args
            .seed
            .wrapping_mul(1000)
            .wrapping_add(validator_index as u64 + 1);
        let shares = tbls::generate_insecure_key_shares(seed, args.nodes, threshold)
            .map_err(|e| format!("keygen failed: {:?}", e))?;

        let group_pubkey = shares.group_public.compressed();
        validators.push(ClusterValidator {
            public_key: group_pubkey,
            pubshares: shares
                .shares
                .iter()
                .map(|s| s.public_key().compressed())
                .collect(),
            fee_recipient,
            builder_enabled: false,
            gas_limit: 30_000_000,
        });

        write_share_secrets(&args.output_dir, validator_index, &shares.shares)?;

        let deposit = DepositMessage::new(
            group_pubkey,
            withdrawal_address,
            MAX_STANDARD_DEPOSIT_GWEI,
            false,
        )
        .map_err(|e| format!("deposit message: {:?}", e))?;
        let domain = compute_domain(DOMAIN_DEPOSIT, signing.fork_version, Hash256::ZERO);
        let root = signing_root(deposit.tree_hash_root(), domain);
        let signature = shares.group_secret.sign(root.as_slice()).compressed();
        deposits.push(json!({
            "pubkey": deposit.pubkey,
            "withdrawal_credentials": deposit.withdrawal_credentials,
            "amount": deposit.amount.to_string(),
            "signature": signature,
        }));
    }

    let cluster = Cluster {
        name: format!("simnet-{}", args.seed),
        operators: (0..args.nodes)
            .map(|i| Operator {
                enr: format!("enr:-simnet-operator-{i}"),
            })
            .collect(),
        threshold,
        validators,
        signing,
    };

    let manifest_path = args.output_dir.join(CLUSTER_MANIFEST_FILE);
    cluster
        .save(&manifest_path)
        .map_err(|e| format!("failed to write manifest: {:?}", e))?;

    let deposit_path = args
        .output_dir
        .join(deposit_file_name(Some(MAX_STANDARD_DEPOSIT_GWEI)));
    fs::write(
        &deposit_path,
        serde_json::to_vec_pretty(&deposits).map_err(|e| e.to_string())?,
    )
    .map_err(|e| format!("failed to write deposit data: {}", e))?;

    info!(
        log, "Created simnet cluster";
        "output_dir" => %args.output_dir.display(),
        "nodes" => args.nodes,
        "threshold" => threshold,
        "validators" => args.validators,
    );
    Ok(())
}

/// Smallest quorum tolerating `(nodes - 1) / 3` byzantine operators.
fn bft_threshold(nodes: usize) -> usize {
    nodes - (nodes.saturating_sub(1)) / 3
}

fn parse_address(name: &str, value: &str) -> Result<Address, String> {
    Address::from_str(value).map_err(|e| format!("invalid {}: {}", name, e))
}

fn now_unix() -> Result<u64, String> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| format!("system clock before epoch: {}", e))
}

fn write_share_secrets(
    output_dir: &Path,
    validator_index: usize,
    shares: &[tbls::SecretKey],
) -> Result<(), String> {
    for (node_index, share) in shares.iter().enumerate() {
        let dir = output_dir.join(format!("node{}", node_index)).join("validator_keys");
        fs::create_dir_all(&dir).map_err(|e| format!("failed to create {:?}: {}", dir, e))?;
        let path = dir.join(format!("keyshare-{}.json", validator_index));
        let body = json!({
            "share_index": node_index + 1,
            "secret": format!("0x{}", hex::encode(share.to_bytes())),
            "pubkey": share.public_key().compressed(),
        });
        fs::write(&path, serde_json::to_vec_pretty(&body).map_err(|e| e.to_string())?)
            .map_err(|e| format!("failed to write {:?}: {}", path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::o;

    fn null_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    #[test]
    fn quorum_thresholds() {
        assert_eq!(bft_threshold(1), 1);
        assert_eq!(bft_threshold(3), 3);
        assert_eq!(bft_threshold(4), 3);
        assert_eq!(bft_threshold(7), 5);
        assert_eq!(bft_threshold(10), 7);
    }

    #[test]
    fn creates_manifest_shares_and_deposits() {
        let dir = tempfile::tempdir().unwrap();
        let args = CreateClusterArgs {
            output_dir: dir.path().to_path_buf(),
            nodes: 4,
            threshold: None,
            validators: 2,
            fee_recipient: "0x4242424242424242424242424242424242424242".into(),
            withdrawal_address: "0x1111111111111111111111111111111111111111".into(),
            seed: 9,
        };
        run(args, null_logger()).unwrap();

        let cluster = Cluster::load(&dir.path().join(CLUSTER_MANIFEST_FILE)).unwrap();
        assert_eq!(cluster.node_count(), 4);
        assert_eq!(cluster.threshold, 3);
        assert_eq!(cluster.validators.len(), 2);
        assert_eq!(cluster.validators[0].pubshares.len(), 4);

        // One key share per node per validator.
        for node in 0..4 {
            for validator in 0..2 {
                let path = dir
                    .path()
                    .join(format!("node{}", node))
                    .join("validator_keys")
                    .join(format!("keyshare-{}.json", validator));
                assert!(path.exists(), "{:?}", path);
            }
        }

        let deposits: serde_json::Value = serde_json::from_slice(
            &std::fs::read(dir.path().join("deposit-data-32eth.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(deposits.as_array().unwrap().len(), 2);
        assert_eq!(deposits[0]["amount"], "32000000000");
    }

    #[test]
    fn reproducible_from_seed() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        for dir in [&dir_a, &dir_b] {
            run(
                CreateClusterArgs {
                    output_dir: dir.path().to_path_buf(),
                    nodes: 3,
                    threshold: Some(2),
                    validators: 1,
                    fee_recipient: "0x4242424242424242424242424242424242424242".into(),
                    withdrawal_address: "0x1111111111111111111111111111111111111111".into(),
                    seed: 77,
                },
                null_logger(),
            )
            .unwrap();
        }

        let a = Cluster::load(&dir_a.path().join(CLUSTER_MANIFEST_FILE)).unwrap();
        let b = Cluster::load(&dir_b.path().join(CLUSTER_MANIFEST_FILE)).unwrap();
        assert_eq!(a.validators, b.validators);
    }
}
