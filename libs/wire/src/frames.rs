//! Link frames exchanged between the hub and a drone over the WebSocket.
//!
//! The drone speaks first with `hello`; the hub answers `ready` or `denied`.
//! After `ready`, the hub sends `command` frames and the drone answers
//! `reply` frames correlated by `call_id`, in any order.

use std::collections::BTreeMap;

use gitfleet_id::{DroneId, ProcessId};
use serde::{Deserialize, Serialize};

use crate::{DeployRequest, ProcessInfo, SpawnRequest, StopTarget, SubprocessFailure};

/// Correlates a command frame with its reply frame on one link.
pub type CallId = u64;

/// Frames sent by a drone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DroneFrame {
    /// Handshake: authenticate and register.
    Hello { secret: String, drone_id: DroneId },

    /// Reply to a hub command.
    Reply { call_id: CallId, reply: CommandReply },
}

/// Frames sent by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubFrame {
    /// Handshake accepted; carries the git base URL drones fetch from.
    Ready { git_url: String },

    /// Handshake rejected; the hub closes the socket after this frame.
    Denied { reason: String },

    /// A command to execute; answer with a `reply` carrying the same
    /// `call_id`.
    Command { call_id: CallId, command: DroneCommand },
}

/// Commands the hub issues to a drone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DroneCommand {
    /// Update the local bare mirror for a repository.
    Fetch { repo: String },

    /// Clone the mirror and check out a commit.
    Deploy(DeployRequest),

    /// Spawn workload processes.
    Spawn(SpawnRequest),

    /// Stop tracked processes.
    Stop { target: StopTarget },

    /// Restart one tracked process.
    Restart { pid: ProcessId },

    /// Snapshot the process table.
    Ps,
}

/// Replies to hub commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CommandReply {
    Fetch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<SubprocessFailure>,
    },
    Deploy {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<SubprocessFailure>,
    },
    Spawn {
        pids: Vec<ProcessId>,
    },
    Stop {
        pids: Vec<ProcessId>,
    },
    Restart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Ps {
        procs: BTreeMap<ProcessId, ProcessInfo>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_frame_shape() {
        let frame = DroneFrame::Hello {
            secret: "beepboop".into(),
            drone_id: "3fa91c07".parse().unwrap(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "hello",
                "secret": "beepboop",
                "drone_id": "3fa91c07",
            })
        );
    }

    #[test]
    fn test_command_frame_nested_tagging() {
        let frame = HubFrame::Command {
            call_id: 7,
            command: DroneCommand::Fetch {
                repo: "webapp".into(),
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "command",
                "call_id": 7,
                "command": {"op": "fetch", "repo": "webapp"},
            })
        );
    }

    #[test]
    fn test_reply_roundtrip() {
        let frame = DroneFrame::Reply {
            call_id: 3,
            reply: CommandReply::Spawn {
                pids: vec!["b2e4d1".parse().unwrap()],
            },
        };
        let json = serde_json::to_string(&frame).unwrap();
        let parsed: DroneFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, parsed);
    }
}
