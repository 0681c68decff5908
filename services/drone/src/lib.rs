//! gitfleet drone agent
//!
//! A drone mirrors repositories from the hub, checks commits out into
//! per-deployment working trees, and runs caller-specified workloads under a
//! local process supervisor. It connects out to the hub's link endpoint,
//! registers itself, and serves fetch/deploy/spawn/stop/restart/ps commands
//! over that link.
//!
//! ## Architecture
//!
//! - **Supervisor**: single-owner process table behind an mpsc mailbox;
//!   spawn/respawn/stop/restart/inspect state machine
//! - **Pipeline**: git mirror fetch and clone+checkout deploys
//! - **Agent**: the hub link client with backoff reconnect
//! - **Events**: typed observability channel consumed by a logging observer

pub mod agent;
pub mod config;
pub mod events;
pub mod pipeline;
pub mod supervisor;

pub use agent::run;
pub use config::Config;
