//! Live drone registry.
//!
//! Keyed by drone id; re-registration replaces the previous entry, so a
//! reconnect storm can never accumulate duplicates. Each entry carries a
//! registration epoch: the link task that registered it passes the epoch
//! back at deregistration, and a stale link closing late cannot evict the
//! entry that replaced it.
//!
//! The lock is a plain `std::sync::RwLock`; it is never held across an
//! await.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use gitfleet_id::DroneId;
use gitfleet_wire::{CommandReply, DroneCommand, Selector};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Why a hub-to-drone call did not produce a reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The link dropped before (or while) the call was in flight.
    #[error("drone link lost")]
    Disconnected,

    /// The drone did not answer within the call deadline.
    #[error("drone call timed out")]
    Timeout,
}

/// One command handed to a link task for transmission.
pub struct OutboundCall {
    pub command: DroneCommand,
    pub reply: oneshot::Sender<CommandReply>,
}

/// Handle to one registered drone's link.
#[derive(Clone)]
pub struct DroneLink {
    pub id: DroneId,
    pub addr: String,
    epoch: u64,
    calls: mpsc::Sender<OutboundCall>,
}

impl DroneLink {
    /// Registration epoch, used to guard deregistration.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Issue one command and wait for its reply.
    ///
    /// Completes with [`CallError::Disconnected`] the moment the link task
    /// ends, because the task drops the pending reply senders; a dead drone
    /// never stalls a fan-in barrier.
    pub async fn call(
        &self,
        command: DroneCommand,
        timeout: Duration,
    ) -> Result<CommandReply, CallError> {
        let (reply, rx) = oneshot::channel();
        self.calls
            .send(OutboundCall { command, reply })
            .await
            .map_err(|_| CallError::Disconnected)?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(CallError::Disconnected),
            Err(_) => Err(CallError::Timeout),
        }
    }
}

/// The registry of currently-linked drones.
pub struct Registry {
    drones: RwLock<HashMap<DroneId, DroneLink>>,
    next_epoch: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            drones: RwLock::new(HashMap::new()),
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Insert (or replace) the entry for `id`, returning the new link
    /// handle.
    pub fn register(
        &self,
        id: DroneId,
        addr: String,
        calls: mpsc::Sender<OutboundCall>,
    ) -> DroneLink {
        let link = DroneLink {
            id,
            addr,
            epoch: self.next_epoch.fetch_add(1, Ordering::Relaxed),
            calls,
        };
        let replaced = {
            let mut drones = self.drones.write().unwrap_or_else(|e| e.into_inner());
            drones.insert(id, link.clone()).is_some()
        };
        info!(drone_id = %id, addr = %link.addr, replaced, "drone registered");
        link
    }

    /// Remove the entry for `id` if it still belongs to `epoch`.
    pub fn deregister(&self, id: DroneId, epoch: u64) {
        let removed = {
            let mut drones = self.drones.write().unwrap_or_else(|e| e.into_inner());
            match drones.get(&id) {
                Some(link) if link.epoch == epoch => {
                    drones.remove(&id);
                    true
                }
                _ => false,
            }
        };
        if removed {
            info!(drone_id = %id, "drone deregistered");
        } else {
            debug!(drone_id = %id, "stale link closed after replacement");
        }
    }

    /// All registered drones, ordered by id.
    pub fn list(&self) -> Vec<DroneLink> {
        let drones = self.drones.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<DroneLink> = drones.values().cloned().collect();
        all.sort_by_key(|d| d.id);
        all
    }

    /// Resolve a selector against the current registry.
    ///
    /// `all` selects every drone; a name list selects matching ids (unknown
    /// names are silently dropped, duplicates collapse); the default selects
    /// one drone uniformly at random, or nothing when the registry is empty.
    pub fn select(&self, selector: &Selector) -> Vec<DroneLink> {
        match selector {
            Selector::All => self.list(),
            Selector::Named { names } => {
                let wanted: BTreeSet<DroneId> =
                    names.iter().filter_map(|n| n.parse().ok()).collect();
                let drones = self.drones.read().unwrap_or_else(|e| e.into_inner());
                wanted
                    .into_iter()
                    .filter_map(|id| drones.get(&id).cloned())
                    .collect()
            }
            Selector::Random => {
                let all = self.list();
                if all.is_empty() {
                    return Vec::new();
                }
                use ::rand::Rng as _;
                let idx = ::rand::rng().random_range(0..all.len());
                vec![all[idx].clone()]
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
