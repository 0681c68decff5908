//! # gitfleet-wire
//!
//! Shared wire vocabulary for the gitfleet control plane.
//!
//! Everything that crosses a process boundary lives here: the drone selector,
//! per-call request bodies, the hub↔drone link frames, process status/info
//! snapshots, and the control-API request/response types. All types are plain
//! serde JSON values; enums that appear on the wire are internally tagged so
//! the protocol stays self-describing.

mod api;
mod frames;
mod process;
mod requests;
mod selector;

pub use api::*;
pub use frames::*;
pub use process::*;
pub use requests::*;
pub use selector::Selector;
