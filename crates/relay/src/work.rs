//! Work items and results exchanged between producer and executor.

use serde::{Deserialize, Serialize};

/// Message returned to the producer when the executor never answered.
pub const TIMEOUT_MESSAGE: &str = "Timeout: the executor didn't respond in time. \
     Is the executor running and activated? Check that it is polling the relay.";

/// A unit of work waiting in the pending queue.
///
/// The id is always assigned by the relay, never by the producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub payload: String,
    #[serde(default)]
    pub label: String,
}

impl WorkItem {
    pub fn new(payload: String, label: String) -> Self {
        Self {
            id: generate_work_id(),
            payload,
            label,
        }
    }
}

fn generate_work_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Outcome of a work item, deposited by the executor or synthesized on timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayResult {
    pub id: String,
    pub success: bool,
    /// Executor output on success.
    #[serde(default)]
    pub result: String,
    /// Failure message.
    #[serde(default)]
    pub error: String,
    /// Set only on results the relay synthesized after the wait ceiling.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,
}

impl RelayResult {
    pub fn succeeded(id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: result.into(),
            error: String::new(),
            timed_out: false,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: String::new(),
            error: error.into(),
            timed_out: false,
        }
    }

    pub fn timed_out(id: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            ..Self::failed(id, TIMEOUT_MESSAGE)
        }
    }
}
