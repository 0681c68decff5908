//! Control-API request and response bodies.

use std::collections::BTreeMap;

use gitfleet_id::{DroneId, ProcessId};
use serde::{Deserialize, Serialize};

use crate::{DeployFailure, ProcessInfo, Selector, SpawnRequest, StopTarget};

/// One registry entry, as reported by `GET /v1/drones`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroneSummary {
    pub id: DroneId,
    pub addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDronesResponse {
    pub drones: Vec<DroneSummary>,
}

/// Body of `POST /v1/deploy`. The selector defaults to the whole fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployParams {
    #[serde(default = "Selector::all")]
    pub selector: Selector,
    pub repo: String,
    pub commit: String,
}

/// An empty failure list means every selected drone deployed cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResponse {
    pub failures: Vec<DeployFailure>,
}

/// Body of `POST /v1/spawn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnParams {
    #[serde(default)]
    pub selector: Selector,
    #[serde(flatten)]
    pub spawn: SpawnRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnResponse {
    /// Process ids spawned, per drone.
    pub procs: BTreeMap<DroneId, Vec<ProcessId>>,
}

/// Body of `POST /v1/stop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopParams {
    #[serde(default)]
    pub selector: Selector,
    pub target: StopTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopResponse {
    /// Process ids actually stopped, per drone.
    pub procs: BTreeMap<DroneId, Vec<ProcessId>>,
}

/// Events streamed by `GET /v1/ps`.
///
/// One `addr` per selected drone is emitted eagerly, one `data` per drone as
/// it answers, and exactly one terminal `end` once every drone has answered
/// or failed. There is no ordering guarantee among `addr`/`data` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PsEvent {
    Addr {
        drone: DroneId,
        addr: String,
    },
    Data {
        drone: DroneId,
        procs: BTreeMap<ProcessId, ProcessInfo>,
    },
    End,
}
