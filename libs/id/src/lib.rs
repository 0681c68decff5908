//! # gitfleet-id
//!
//! Identifier types, parsing, and validation for the gitfleet control plane.
//!
//! ## Design Principles
//!
//! - IDs are system-generated random tokens; names are user-controlled labels
//! - All IDs have a canonical lowercase-hex string representation with strict
//!   parsing
//! - IDs support roundtrip serialization (parse → format → parse)
//! - IDs are typed to prevent mixing drones and processes
//!
//! ## ID Format
//!
//! Every ID is a fixed-width lowercase hex token drawn uniformly at random
//! from its value range:
//!
//! - `DroneId` — 8 hex digits, e.g. `3fa91c07`
//! - `ProcessId` — 6 hex digits in `0x100000..=0xffffff`, e.g. `b2e4d1`
//!
//! There is no central allocator and no collision retry; global uniqueness is
//! assumed, not guaranteed. The value spaces are large relative to realistic
//! fleet and process-table sizes.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;
