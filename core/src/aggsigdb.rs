//! Storage for threshold-aggregated signed data with blocking reads.
//!
//! Entries are immutable: storing an equal value twice is a no-op, an unequal
//! value for the same `(duty, pubkey)` aborts the node. The fetcher blocks
//! here for RANDAO reveals, selection proofs and sync-message roots; the
//! broadcaster subscribes for everything that must reach the beacon node.

use crate::{Error, SignedSubscriber};
use dv_types::{Duty, PublicKeyBytes, SignedData, Slot};
use parking_lot::Mutex;
use slog::{debug, Logger};
use std::collections::HashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

struct Inner {
    values: HashMap<(Duty, PublicKeyBytes), SignedData>,
    waiters: Vec<((Duty, PublicKeyBytes), oneshot::Sender<SignedData>)>,
}

pub struct AggSigDb {
    inner: Mutex<Inner>,
    subscribers: Vec<SignedSubscriber>,
    shutdown: CancellationToken,
    log: Logger,
}

impl AggSigDb {
    pub fn new(shutdown: CancellationToken, log: Logger) -> Self {
        Self {
            inner: Mutex::new(Inner {
                values: HashMap::new(),
                waiters: Vec::new(),
            }),
            subscribers: Vec::new(),
            shutdown,
            log,
        }
    }

    /// Registers a subscriber for newly stored entries. Must complete before
    /// duty flow starts; not thread-safe.
    pub fn subscribe(&mut self, subscriber: SignedSubscriber) {
        self.subscribers.push(subscriber);
    }

    /// Stores an aggregated signature and notifies waiters and subscribers.
    pub async fn store(
        &self,
        duty: Duty,
        pubkey: PublicKeyBytes,
        data: SignedData,
    ) -> Result<(), Error> {
        {
            let mut inner = self.inner.lock();
            match inner.values.get(&(duty, pubkey)) {
                None => {
                    inner.values.insert((duty, pubkey), data.clone());
                }
                Some(existing) if *existing == data => return Ok(()),
                Some(_) => {
                    return Err(Error::ConflictingStore {
                        duty_type: duty.duty_type,
                        key: format!("{}/{:?}", duty, pubkey),
                    })
                }
            }

            let mut kept = Vec::with_capacity(inner.waiters.len());
            for (key, sender) in inner.waiters.drain(..) {
                if key == (duty, pubkey) {
                    let _ = sender.send(data.clone());
                } else if !sender.is_closed() {
                    kept.push((key, sender));
                }
            }
            inner.waiters = kept;
        }

        debug!(self.log, "Stored aggregated signature"; "duty" => %duty, "pubkey" => ?pubkey);

        for subscriber in &self.subscribers {
            subscriber(duty, pubkey, data.clone()).await?;
        }
        Ok(())
    }

    /// Blocks until an aggregated signature for `(duty, pubkey)` is stored.
    pub async fn await_signed(
        &self,
        duty: Duty,
        pubkey: PublicKeyBytes,
    ) -> Result<SignedData, Error> {
        let rx = {
            let mut inner = self.inner.lock();
            if let Some(data) = inner.values.get(&(duty, pubkey)) {
                return Ok(data.clone());
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(((duty, pubkey), tx));
            rx
        };

        tokio::select! {
            _ = self.shutdown.cancelled() => Err(Error::Cancelled),
            value = rx => value.map_err(|_| Error::Cancelled),
        }
    }

    /// Drops all entries whose duty slot is at or before `deadline`.
    pub fn prune(&self, deadline: Slot) {
        self.inner
            .lock()
            .values
            .retain(|(duty, _), _| duty.slot > deadline);
    }
}
