//! relay: request/response correlation between a producer and a polling executor.

mod liveness;
mod queue;
mod store;
mod version;
mod work;

pub mod client;
pub mod config;
pub mod service;
pub mod transport;

pub use client::{ClientError, ConnectionReport, Outcome, RelayClient};
pub use config::{ConfigError, RelayConfig};
pub use liveness::{LivenessSnapshot, LivenessTracker};
pub use queue::PendingQueue;
pub use service::{DepositError, RelayService, StatusSnapshot};
pub use store::CorrelationStore;
pub use version::{RELAY_VERSION, VersionInfo};
pub use work::{RelayResult, TIMEOUT_MESSAGE, WorkItem};
