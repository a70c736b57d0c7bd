//! The local notarization agent and its availability.
//!
//! Proofs of fiat payment come from a signing agent installed next to the
//! payer (a browser extension or a local daemon). An [`AgentHost`] is the
//! environment that may carry such an agent; [`wait_for_agent`] gives a late
//! starting agent a bounded window to appear.

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Error;

/// Parameters for a proof request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest {
    /// Hex intent hash the proof must name.
    pub intent_hash: String,
    /// Index of the payment among the user's recent transactions.
    pub original_index: u32,
    /// Lower-cased payment platform.
    pub platform: String,
}

/// Identifier of a proof the agent started generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofHandle {
    /// Agent-assigned proof id.
    pub proof_id: String,
    /// Platform the proof was generated for.
    pub platform: String,
}

/// A completed notarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotarizedProof {
    /// The notarized request; opaque to this crate.
    pub notary_request: Value,
}

/// Operations exposed by a notarization agent.
#[async_trait::async_trait]
pub trait NotaryAgent: Send + Sync {
    /// Asks the user to approve a connection. Returns `false` when declined.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Agent`] or a transport error if the agent cannot be reached.
    async fn request_connection(&self) -> Result<bool, Error>;

    /// Starts proof generation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Agent`] or a transport error on failure.
    async fn generate_proof(&self, request: &ProofRequest) -> Result<ProofHandle, Error>;

    /// Fetches a finished proof.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Agent`] or a transport error on failure.
    async fn fetch_proof_by_id(&self, proof_id: &str) -> Result<NotarizedProof, Error>;
}

/// What a host currently knows about its agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentStatus {
    /// No agent is installed.
    Absent,
    /// The agent is installed but has not been approved for this origin.
    InstalledDisconnected,
    /// The agent is installed and connected.
    InstalledReady,
}

impl AgentStatus {
    /// Whether an agent is present, connected or not.
    #[must_use]
    pub const fn is_installed(self) -> bool {
        !matches!(self, Self::Absent)
    }
}

/// An environment that may carry a notarization agent.
#[async_trait::async_trait]
pub trait AgentHost: Send + Sync {
    /// Detects the agent with a single probe.
    async fn status(&self) -> AgentStatus;

    /// The agent handle, when one is installed.
    fn agent(&self) -> Option<Arc<dyn NotaryAgent>>;

    /// Subscribes to the agent's initialization notification.
    ///
    /// Hosts that cannot notify return `None` and are polled instead.
    fn subscribe(&self) -> Option<broadcast::Receiver<()>> {
        None
    }
}

/// An in-process host whose agent is injected at runtime.
///
/// [`AgentSlot::install`] emits the initialization notification.
pub struct AgentSlot {
    agent: RwLock<Option<Arc<dyn NotaryAgent>>>,
    connected: RwLock<bool>,
    ready: broadcast::Sender<()>,
}

impl Debug for AgentSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSlot")
            .field("installed", &self.agent().is_some())
            .finish_non_exhaustive()
    }
}

impl Default for AgentSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentSlot {
    /// An empty slot.
    #[must_use]
    pub fn new() -> Self {
        let (ready, _) = broadcast::channel(1);
        Self {
            agent: RwLock::new(None),
            connected: RwLock::new(false),
            ready,
        }
    }

    /// Installs `agent` and notifies every subscriber.
    pub fn install(&self, agent: Arc<dyn NotaryAgent>) {
        if let Ok(mut slot) = self.agent.write() {
            *slot = Some(agent);
        }
        let _ = self.ready.send(());
    }

    /// Records whether the user approved the connection.
    pub fn set_connected(&self, connected: bool) {
        if let Ok(mut flag) = self.connected.write() {
            *flag = connected;
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.ready.receiver_count()
    }
}

#[async_trait::async_trait]
impl AgentHost for AgentSlot {
    async fn status(&self) -> AgentStatus {
        if self.agent().is_none() {
            return AgentStatus::Absent;
        }
        match self.connected.read() {
            Ok(flag) if *flag => AgentStatus::InstalledReady,
            _ => AgentStatus::InstalledDisconnected,
        }
    }

    fn agent(&self) -> Option<Arc<dyn NotaryAgent>> {
        self.agent.read().ok().and_then(|slot| slot.clone())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<()>> {
        Some(self.ready.subscribe())
    }
}

/// Timing of [`wait_for_agent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Give up after this long.
    pub timeout: Duration,
    /// Probe the host this often.
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(3000),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Waits until the host reports an installed agent, or the timeout elapses.
///
/// Never fails. Returns `false` immediately when there is no host, `true`
/// immediately when the agent is already there. Otherwise the host's
/// initialization notification races periodic polling; the subscription and
/// the poll timer are both released before this returns.
pub async fn wait_for_agent(host: Option<&dyn AgentHost>, options: WaitOptions) -> bool {
    let Some(host) = host else {
        return false;
    };
    if host.status().await.is_installed() {
        return true;
    }

    let mut notifications = host.subscribe();
    let mut poll = tokio::time::interval(options.poll_interval.max(Duration::from_millis(1)));
    poll.tick().await;
    let deadline = tokio::time::sleep(options.timeout);
    tokio::pin!(deadline);

    let available = loop {
        tokio::select! {
            () = &mut deadline => break host.status().await.is_installed(),
            notified = next_notification(notifications.as_mut()) => {
                match notified {
                    Ok(()) => break true,
                    Err(_) => notifications = None,
                }
            }
            _ = poll.tick() => {
                if host.status().await.is_installed() {
                    break true;
                }
            }
        }
    };
    drop(notifications);
    drop(poll);

    #[cfg(feature = "telemetry")]
    tracing::debug!(available, "notarization agent wait finished");
    available
}

/// Resolves on the next notification, or never when there is no subscription.
async fn next_notification(
    receiver: Option<&mut broadcast::Receiver<()>>,
) -> Result<(), broadcast::error::RecvError> {
    match receiver {
        Some(receiver) => match receiver.recv().await {
            Err(broadcast::error::RecvError::Lagged(_)) => Ok(()),
            other => other,
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct IdleAgent;

    #[async_trait::async_trait]
    impl NotaryAgent for IdleAgent {
        async fn request_connection(&self) -> Result<bool, Error> {
            Ok(true)
        }

        async fn generate_proof(&self, request: &ProofRequest) -> Result<ProofHandle, Error> {
            Ok(ProofHandle {
                proof_id: "1".to_owned(),
                platform: request.platform.clone(),
            })
        }

        async fn fetch_proof_by_id(&self, _proof_id: &str) -> Result<NotarizedProof, Error> {
            Ok(NotarizedProof {
                notary_request: Value::Null,
            })
        }
    }

    /// A host that cannot notify and becomes ready after a number of probes.
    struct PolledHost {
        probes: AtomicUsize,
        ready_after: usize,
    }

    #[async_trait::async_trait]
    impl AgentHost for PolledHost {
        async fn status(&self) -> AgentStatus {
            let n = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.ready_after {
                AgentStatus::InstalledDisconnected
            } else {
                AgentStatus::Absent
            }
        }

        fn agent(&self) -> Option<Arc<dyn NotaryAgent>> {
            None
        }
    }

    #[tokio::test]
    async fn test_no_host_returns_immediately() {
        assert!(!wait_for_agent(None, WaitOptions::default()).await);
    }

    #[tokio::test]
    async fn test_present_agent_returns_without_subscribing() {
        let slot = AgentSlot::new();
        slot.install(Arc::new(IdleAgent));
        assert!(wait_for_agent(Some(&slot), WaitOptions::default()).await);
        assert_eq!(slot.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_and_detaches() {
        let slot = AgentSlot::new();
        let started = tokio::time::Instant::now();
        assert!(!wait_for_agent(Some(&slot), WaitOptions::default()).await);
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert_eq!(slot.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_wins_before_deadline() {
        let slot = Arc::new(AgentSlot::new());
        let installer = Arc::clone(&slot);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            installer.install(Arc::new(IdleAgent));
        });
        let started = tokio::time::Instant::now();
        let options = WaitOptions {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
        };
        assert!(wait_for_agent(Some(slot.as_ref()), options).await);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(slot.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_detects_agent() {
        let host = PolledHost {
            probes: AtomicUsize::new(0),
            ready_after: 3,
        };
        assert!(wait_for_agent(Some(&host), WaitOptions::default()).await);
        assert_eq!(host.probes.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_slot_status_tracks_connection() {
        let slot = AgentSlot::new();
        assert_eq!(slot.status().await, AgentStatus::Absent);
        slot.install(Arc::new(IdleAgent));
        assert_eq!(slot.status().await, AgentStatus::InstalledDisconnected);
        slot.set_connected(true);
        assert_eq!(slot.status().await, AgentStatus::InstalledReady);
    }
}
