//! Node assembly: loads the cluster, wires the pipeline and serves the
//! validator API until interrupted.

use crate::RunArgs;
use beacon_client::BeaconNodeHttpClient;
use dv_core::{wire, MemoryConsensus, MemoryParSigEx, PipelineConfig};
use dv_types::{Cluster, Hash256};
use slog::{info, warn, Logger};
use slot_clock::SystemTimeSlotClock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use validator_api::{Config as ApiConfig, Context as ApiContext};

const CLUSTER_MANIFEST_FILE: &str = "cluster-manifest.json";

pub async fn run(args: RunArgs, log: Logger) -> Result<(), String> {
    let manifest_path = args.data_dir.join(CLUSTER_MANIFEST_FILE);
    let cluster = Cluster::load(&manifest_path)
        .map_err(|e| format!("failed to load {}: {:?}", manifest_path.display(), e))?;
    let cluster = Arc::new(cluster);

    if args.node_index >= cluster.node_count() {
        return Err(format!(
            "node index {} out of range for a {}-operator cluster",
            args.node_index,
            cluster.node_count()
        ));
    }
    info!(
        log, "Loaded cluster";
        "name" => &cluster.name,
        "operators" => cluster.node_count(),
        "threshold" => cluster.threshold,
        "validators" => cluster.validators.len(),
        "node_index" => args.node_index,
    );

    let beacon_url = Url::parse(&args.beacon_node_url)
        .map_err(|e| format!("invalid beacon node url: {}", e))?;
    let slot_duration = Duration::from_secs(args.slot_duration_secs);
    let beacon = BeaconNodeHttpClient::new(beacon_url.clone(), slot_duration);
    let clock = SystemTimeSlotClock::new(cluster.signing.genesis_time, slot_duration);

    let graffiti = args.graffiti.as_deref().map(parse_graffiti).transpose()?;
    let shutdown = CancellationToken::new();

    // The in-process consensus and exchange are the solo-cluster
    // implementations; multi-operator deployments plug the wire protocols in
    // through the same interfaces.
    if cluster.node_count() > 1 {
        warn!(
            log,
            "No peer transport configured; only single-operator clusters are serviceable"
        );
    }
    let consensus = MemoryConsensus::solo(log.clone());
    let parsigex = MemoryParSigEx::solo(log.clone());

    let pipeline = wire(
        beacon.clone(),
        clock.clone(),
        cluster.clone(),
        consensus,
        parsigex,
        PipelineConfig {
            node_index: args.node_index,
            deadline_slots: args.duty_deadline_slots,
            graffiti,
            builder_api: args.builder_api,
            insecure_signatures: args.insecure_keys,
        },
        shutdown.clone(),
        &log,
    );

    let api_ctx = Arc::new(ApiContext::new(
        beacon,
        clock,
        cluster,
        args.node_index,
        pipeline.scheduler.clone(),
        pipeline.dutydb.clone(),
        pipeline.parsigdb.clone(),
        pipeline.aggsigdb.clone(),
        pipeline.cache.clone(),
        args.insecure_keys,
        log.new(slog::o!("service" => "validator_api")),
    ));
    let (_addr, api_server) = validator_api::serve(
        api_ctx,
        ApiConfig {
            listen_addr: args.validator_api_addr,
            beacon_url,
        },
        shutdown.clone(),
    )?;

    let scheduler = pipeline.scheduler.clone();
    let scheduler_handle = tokio::spawn(scheduler.run());
    let api_handle = tokio::spawn(api_server);

    wait_for_signal(&log).await;
    info!(log, "Shutting down");
    shutdown.cancel();

    let _ = api_handle.await;
    let _ = scheduler_handle.await;
    Ok(())
}

/// Left-aligns up to 32 bytes of UTF-8 into the graffiti field.
fn parse_graffiti(s: &str) -> Result<Hash256, String> {
    let bytes = s.as_bytes();
    if bytes.len() > 32 {
        return Err(format!(
            "graffiti exceeds 32 bytes: {} bytes given",
            bytes.len()
        ));
    }
    let mut graffiti = [0u8; 32];
    graffiti[..bytes.len()].copy_from_slice(bytes);
    Ok(Hash256::from(graffiti))
}

async fn wait_for_signal(log: &Logger) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut terminate =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!(log, "Failed to install SIGTERM handler"; "error" => %e);
                    let _ = ctrl_c.await;
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graffiti_parsing() {
        let graffiti = parse_graffiti("tessera").unwrap();
        assert_eq!(&graffiti[0..7], b"tessera");
        assert_eq!(graffiti[7], 0);

        assert!(parse_graffiti(&"x".repeat(33)).is_err());
        assert_eq!(parse_graffiti("").unwrap(), Hash256::ZERO);
    }
}
