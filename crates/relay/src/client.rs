//! HTTP client for the relay.
//!
//! Producer side: `execute()` submits a payload and waits for the result,
//! `status()` reads liveness. Executor side: `next_command()` and
//! `deposit()`. `Outcome` turns a producer call into the user-facing text,
//! keeping "relay unreachable" distinct from "executor timed out" since the
//! fixes differ (start the relay vs. start the executor).

use std::fmt;
use std::time::Duration;

use crate::config::RelayConfig;
use crate::transport::http::{ExecuteRequest, StatusResponse};
use crate::version::RELAY_VERSION;
use crate::work::{RelayResult, WorkItem};

/// Margin on top of the relay's own wait ceiling for the HTTP round trip.
const EXECUTE_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Relay not reachable at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Relay request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("Relay returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl ClientError {
    fn from_send(url: &str, e: reqwest::Error) -> Self {
        if e.is_connect() {
            Self::Unreachable {
                url: url.to_string(),
                source: e,
            }
        } else {
            Self::Request(e)
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RelayClient {
    base_url: String,
    client: reqwest::Client,
    execute_timeout: Duration,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_wait_timeout(base_url, RelayConfig::default().wait_timeout)
    }

    /// Client whose execute calls outlast a relay configured with `wait_timeout`.
    pub fn with_wait_timeout(
        base_url: impl Into<String>,
        wait_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let user_agent = format!("relay-client/{}", RELAY_VERSION);
        if let Ok(value) = reqwest::header::HeaderValue::from_str(&user_agent) {
            headers.insert(reqwest::header::USER_AGENT, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            execute_timeout: wait_timeout.saturating_add(EXECUTE_TIMEOUT_MARGIN),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::from_send(&self.base_url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(ClientError::Request)
    }

    /// Submit a payload and wait for the executor's result.
    pub async fn execute(
        &self,
        payload: impl Into<String>,
        label: impl Into<String>,
    ) -> Result<RelayResult, ClientError> {
        let body = ExecuteRequest {
            payload: payload.into(),
            label: label.into(),
        };
        tracing::debug!(label = %body.label, "Submitting payload to relay");
        let request = self
            .client
            .post(self.url("/api/execute"))
            .timeout(self.execute_timeout)
            .json(&body);
        self.send(request).await
    }

    pub async fn status(&self) -> Result<StatusResponse, ClientError> {
        let request = self
            .client
            .get(self.url("/api/status"))
            .timeout(STATUS_TIMEOUT);
        self.send(request).await
    }

    /// Poll for the next work item (executor side).
    pub async fn next_command(&self) -> Result<Option<WorkItem>, ClientError> {
        let request = self
            .client
            .get(self.url("/api/command"))
            .timeout(STATUS_TIMEOUT);
        self.send(request).await
    }

    /// Report a result for a previously received work item (executor side).
    pub async fn deposit(&self, result: &RelayResult) -> Result<(), ClientError> {
        let request = self
            .client
            .post(self.url("/api/result"))
            .timeout(STATUS_TIMEOUT)
            .json(result);
        let _ack: serde_json::Value = self.send(request).await?;
        Ok(())
    }

    /// `execute()` folded into a user-facing outcome.
    pub async fn run(&self, payload: impl Into<String>, label: impl Into<String>) -> Outcome {
        Outcome::from_execute(self.execute(payload, label).await)
    }

    /// `status()` folded into a user-facing connection report.
    pub async fn check_connection(&self) -> ConnectionReport {
        ConnectionReport::from_status(self.status().await)
    }
}

/// Producer-facing classification of an execute call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded(String),
    ExecutorFailed(String),
    TimedOut(String),
    RelayUnreachable(String),
    RelayError(String),
}

impl Outcome {
    pub fn from_execute(result: Result<RelayResult, ClientError>) -> Self {
        match result {
            Ok(r) if r.success => Self::Succeeded(r.result),
            Ok(r) if r.timed_out => Self::TimedOut(r.error),
            Ok(r) => Self::ExecutorFailed(r.error),
            Err(e) if e.is_unreachable() => Self::RelayUnreachable(e.to_string()),
            Err(e) => Self::RelayError(e.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded(output) if output.is_empty() => write!(f, "✅ Done"),
            Self::Succeeded(output) => write!(f, "✅ {output}"),
            Self::ExecutorFailed(message) if message.is_empty() => write!(f, "❌ Unknown error"),
            Self::ExecutorFailed(message) => write!(f, "❌ {message}"),
            Self::TimedOut(message) => write!(f, "❌ {message}"),
            Self::RelayUnreachable(_) => write!(
                f,
                "❌ Relay server not running. Start it with: relay-server"
            ),
            Self::RelayError(message) => write!(f, "❌ Relay error: {message}"),
        }
    }
}

/// Producer-facing view of executor connectivity.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionReport {
    Connected,
    NeverConnected,
    Stale { seconds_since_last_seen: f64 },
    RelayUnreachable,
}

impl ConnectionReport {
    pub fn from_status(status: Result<StatusResponse, ClientError>) -> Self {
        match status {
            Ok(s) if s.executor_connected => Self::Connected,
            Ok(s) => match s.seconds_since_last_seen {
                None => Self::NeverConnected,
                Some(lag) => Self::Stale {
                    seconds_since_last_seen: lag,
                },
            },
            Err(e) => {
                tracing::debug!(error = %e, "Relay status check failed");
                Self::RelayUnreachable
            }
        }
    }
}

impl fmt::Display for ConnectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "✅ Executor is connected and ready!"),
            Self::NeverConnected => write!(
                f,
                "⚠️  Executor hasn't connected yet.\n\
                 Steps:\n  \
                 1. Start the executor\n  \
                 2. Make sure it polls this relay\n  \
                 3. Activate it so it begins polling"
            ),
            Self::Stale {
                seconds_since_last_seen,
            } => write!(
                f,
                "⚠️  Executor last seen {seconds_since_last_seen}s ago, it may have disconnected. Re-activate it."
            ),
            Self::RelayUnreachable => {
                write!(f, "❌ Relay server not running. Start it with: relay-server")
            }
        }
    }
}
