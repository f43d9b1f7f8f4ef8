//! Client for the in-container tunnel protocol (§6).
//!
//! Lifecycle and setup steps running inside the dev container call back out
//! over a local HTTP endpoint to ask the host-side daemon for bootstrap data:
//! git identity, git/docker credentials, a commit signature, and similar
//! secrets that should never be baked into an image. The byte-level
//! transport that exposes this endpoint inside the container (an SSH
//! forwarded port) is someone else's concern; this module only implements
//! the message-dispatch contract that rides on top of it.
//!
//! Wire format: POST a JSON object `{"message": <kind>, ...fields}` to the
//! endpoint; the response is `{"message": <string>}`, where an empty string
//! means "no data available". An unrecognized `message` kind is answered
//! with HTTP 500 by the daemon.

use crate::errors::{DeaconError, Result, TunnelTimeout};
use crate::retry::{default_classifier, retry_async, JitterStrategy, RetryConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Message kinds recognized by the tunnel dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TunnelMessageKind {
    GitUser,
    GitCredentials,
    DockerCredentials,
    GitSshSignature,
    LoftConfig,
    GpgPublicKeys,
    KubeConfig,
}

impl TunnelMessageKind {
    /// The wire string for this kind, as it appears in the `message` field.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Self::GitUser => "git-user",
            Self::GitCredentials => "git-credentials",
            Self::DockerCredentials => "docker-credentials",
            Self::GitSshSignature => "git-ssh-signature",
            Self::LoftConfig => "loft-config",
            Self::GpgPublicKeys => "gpg-public-keys",
            Self::KubeConfig => "kube-config",
        }
    }
}

#[derive(Debug, Serialize)]
struct TunnelRequest {
    message: TunnelMessageKind,
    #[serde(flatten)]
    fields: Value,
}

#[derive(Debug, Deserialize)]
struct TunnelResponse {
    #[serde(default)]
    message: String,
}

/// Client for the in-container tunnel endpoint.
///
/// `base_url` is the local address the tunnel is forwarded to, e.g.
/// `http://127.0.0.1:10999`.
#[derive(Debug, Clone)]
pub struct TunnelClient {
    base_url: String,
    http: reqwest::Client,
    readiness_budget: Duration,
}

impl TunnelClient {
    /// Create a client with the default ~60s readiness budget (§9).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            readiness_budget: Duration::from_secs(60),
        }
    }

    /// Override the readiness probe budget (used in tests to avoid waiting
    /// out the default 60s).
    pub fn with_readiness_budget(mut self, budget: Duration) -> Self {
        self.readiness_budget = budget;
        self
    }

    async fn probe_once(&self) -> std::result::Result<(), ()> {
        match self.http.get(format!("{}/healthz", self.base_url)).send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            _ => Err(()),
        }
    }

    /// Wait for the tunnel endpoint to come up, probing with exponential
    /// backoff and jitter (initial delay 500ms, doubling, capped at 10s)
    /// instead of blocking on a single connect attempt. Gives up with a
    /// [`TunnelTimeout`] once the readiness budget elapses.
    #[instrument(skip(self))]
    pub async fn wait_until_ready(&self) -> Result<()> {
        let start = Instant::now();
        let config = RetryConfig::new(
            u32::MAX, // actual bound comes from the outer tokio::time::timeout below
            Duration::from_millis(500),
            Duration::from_secs(10),
            JitterStrategy::FullJitter,
        );

        let probe = retry_async(&config, || self.probe_once(), default_classifier);

        match tokio::time::timeout(self.readiness_budget, probe).await {
            Ok(Ok(())) => {
                debug!("tunnel endpoint ready after {:?}", start.elapsed());
                Ok(())
            }
            _ => {
                warn!(
                    "tunnel endpoint not ready after {:?} (budget {:?})",
                    start.elapsed(),
                    self.readiness_budget
                );
                Err(DeaconError::TunnelTimeout(TunnelTimeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                    budget_ms: self.readiness_budget.as_millis() as u64,
                }))
            }
        }
    }

    /// Send a tunnel request and return the raw response message. An empty
    /// string means the daemon had no data for this kind.
    #[instrument(skip(self, fields))]
    pub async fn request(&self, kind: TunnelMessageKind, fields: Value) -> Result<String> {
        debug!("tunnel request: {}", kind.as_wire_str());

        let body = TunnelRequest { message: kind, fields };

        let response = self
            .http
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeaconError::Tunnel {
                message: format!("tunnel request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeaconError::Tunnel {
                message: format!(
                    "tunnel endpoint rejected '{}' with HTTP {}",
                    kind.as_wire_str(),
                    status
                ),
            });
        }

        let parsed: TunnelResponse = response.json().await.map_err(|e| DeaconError::Tunnel {
            message: format!("malformed tunnel response: {}", e),
        })?;

        Ok(parsed.message)
    }

    /// Fetch the host's configured git user name/email.
    pub async fn git_user(&self) -> Result<String> {
        self.request(TunnelMessageKind::GitUser, Value::Null).await
    }

    /// Fetch git credentials for the given host (the `host` field matches
    /// the git credential helper protocol's `host` key).
    pub async fn git_credentials(&self, host: &str) -> Result<String> {
        self.request(
            TunnelMessageKind::GitCredentials,
            serde_json::json!({ "host": host }),
        )
        .await
    }

    /// Fetch docker registry credentials for the given registry host.
    pub async fn docker_credentials(&self, host: &str) -> Result<String> {
        self.request(
            TunnelMessageKind::DockerCredentials,
            serde_json::json!({ "host": host }),
        )
        .await
    }

    /// Request a detached signature over `data` using the host's git
    /// signing key (`gpg.format = ssh` commit signing).
    pub async fn git_ssh_signature(&self, data: &str) -> Result<String> {
        self.request(
            TunnelMessageKind::GitSshSignature,
            serde_json::json!({ "data": data }),
        )
        .await
    }

    /// Fetch the host's loft/DevPod platform configuration.
    pub async fn loft_config(&self) -> Result<String> {
        self.request(TunnelMessageKind::LoftConfig, Value::Null)
            .await
    }

    /// Fetch the host's GPG public keys (for verifying signed commits).
    pub async fn gpg_public_keys(&self) -> Result<String> {
        self.request(TunnelMessageKind::GpgPublicKeys, Value::Null)
            .await
    }

    /// Fetch the host's kubeconfig.
    pub async fn kube_config(&self) -> Result<String> {
        self.request(TunnelMessageKind::KubeConfig, Value::Null)
            .await
    }
}
