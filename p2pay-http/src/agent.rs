//! HTTP bridge to a locally installed notarization agent.
//!
//! The agent listens on a local port and exposes four endpoints:
//!
//! | Method | Path            | Body                | Reply                        |
//! |--------|-----------------|---------------------|------------------------------|
//! | GET    | `/status`       |                     | `{"connected": bool}`        |
//! | POST   | `/connection`   |                     | `{"approved": bool}`         |
//! | POST   | `/proofs`       | [`ProofRequest`]    | [`ProofHandle`]              |
//! | GET    | `/proofs/{id}`  |                     | [`NotarizedProof`]           |

use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, Method};
use p2pay::Error;
use p2pay::agent::{
    AgentHost, AgentStatus, NotarizedProof, NotaryAgent, ProofHandle, ProofRequest,
};
use serde::Deserialize;
use url::Url;

use crate::transport::{HttpTransport, Reply, endpoint, parse_base_url};

/// Where the agent listens by default.
pub const DEFAULT_AGENT_URL: &str = "http://127.0.0.1:7411";

#[derive(Debug, Deserialize)]
struct StatusReply {
    #[serde(default)]
    connected: bool,
}

#[derive(Debug, Deserialize)]
struct ConnectionReply {
    approved: bool,
}

/// A [`NotaryAgent`] reached over HTTP.
#[derive(Clone, Debug)]
pub struct HttpNotaryAgent {
    base_url: Url,
    transport: HttpTransport,
}

impl HttpNotaryAgent {
    /// An agent client rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the URL is invalid.
    pub fn try_new(base_url: &str) -> Result<Self, Error> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            transport: HttpTransport::default(),
        })
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.transport.set_headers(headers);
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport.set_timeout(timeout);
        self
    }

    async fn call<R>(
        &self,
        method: Method,
        path: &str,
        body: Option<&ProofRequest>,
        context: &'static str,
    ) -> Result<R, Error>
    where
        R: serde::de::DeserializeOwned,
    {
        let url = endpoint(&self.base_url, path)?;
        let mut req = self.transport.request(method, &url);
        if let Some(body) = body {
            req = req.json(body);
        }
        match self.transport.send_json::<R>(req, context).await? {
            Reply::Ok(reply) => Ok(reply),
            Reply::Status { status, body } => {
                Err(Error::Agent(format!("{context}: {status} {body}")))
            }
        }
    }

    /// Probes the agent once. An unreachable agent is absent.
    pub async fn probe(&self) -> AgentStatus {
        match self
            .call::<StatusReply>(Method::GET, "status", None, "GET /status")
            .await
        {
            Ok(StatusReply { connected: true }) => AgentStatus::InstalledReady,
            Ok(StatusReply { connected: false }) => AgentStatus::InstalledDisconnected,
            Err(_) => AgentStatus::Absent,
        }
    }
}

#[async_trait::async_trait]
impl NotaryAgent for HttpNotaryAgent {
    async fn request_connection(&self) -> Result<bool, Error> {
        let reply: ConnectionReply = self
            .call(Method::POST, "connection", None, "POST /connection")
            .await?;
        Ok(reply.approved)
    }

    async fn generate_proof(&self, request: &ProofRequest) -> Result<ProofHandle, Error> {
        self.call(Method::POST, "proofs", Some(request), "POST /proofs")
            .await
    }

    async fn fetch_proof_by_id(&self, proof_id: &str) -> Result<NotarizedProof, Error> {
        if matches!(proof_id, "" | "." | "..") || proof_id.contains(['/', '\\', '?', '#']) {
            return Err(Error::Agent(format!("invalid proof id {proof_id:?}")));
        }
        self.call(
            Method::GET,
            &format!("proofs/{proof_id}"),
            None,
            "GET /proofs/{id}",
        )
        .await
    }
}

/// An [`AgentHost`] whose agent is an [`HttpNotaryAgent`].
///
/// Detection is a single `GET /status`; an unreachable agent reports
/// [`AgentStatus::Absent`]. The host cannot push an initialization
/// notification, so waiters fall back to polling.
#[derive(Clone, Debug)]
pub struct HttpAgentHost {
    agent: Arc<HttpNotaryAgent>,
}

impl HttpAgentHost {
    /// A host for `agent`.
    #[must_use]
    pub fn new(agent: HttpNotaryAgent) -> Self {
        Self {
            agent: Arc::new(agent),
        }
    }

    /// A host for an agent on the default local port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the default URL cannot be parsed.
    pub fn local() -> Result<Self, Error> {
        Ok(Self::new(HttpNotaryAgent::try_new(DEFAULT_AGENT_URL)?))
    }
}

#[async_trait::async_trait]
impl AgentHost for HttpAgentHost {
    async fn status(&self) -> AgentStatus {
        let status = self.agent.probe().await;
        #[cfg(feature = "telemetry")]
        tracing::debug!(?status, url = %self.agent.base_url, "probed notarization agent");
        status
    }

    fn agent(&self) -> Option<Arc<dyn NotaryAgent>> {
        Some(Arc::clone(&self.agent) as Arc<dyn NotaryAgent>)
    }
}
