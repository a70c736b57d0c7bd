//! Error types for payment settlement.
//!
//! Every component in the workspace reports failures through the single
//! [`Error`] enum so that callers can branch on the originating kind no matter
//! how deep in the settlement flow the failure happened. The orchestrator
//! passes errors through untouched.

use alloy_primitives::TxHash;

/// Install page for the notarization agent, embedded in [`Error::AgentUnavailable`].
pub const AGENT_INSTALL_URL: &str =
    "https://chromewebstore.google.com/detail/zkp2p-extension/ijpgccednehjpeclfcllnjjcmiohdjih";

/// Boxed source error for transport-level failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Base error type for payment settlement operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The recipient is a name but no resolution provider is available.
    #[error(
        "name resolution requires a provider; pass a resolver when the recipient is a name such as `myapp.fkey.eth`"
    )]
    ResolutionUnavailable,

    /// The resolution provider returned no address for the name.
    #[error("failed to resolve name: {0}")]
    NameNotFound(String),

    /// The quote service rejected the request or returned no quotes.
    #[error("{}", quote_message(.status, .message))]
    QuoteUnavailable {
        /// Upstream HTTP status, when the failure came from a non-success response.
        status: Option<u16>,
        /// Upstream response text or a short reason.
        message: String,
    },

    /// The off-chain verifier did not authorize the intent.
    #[error("intent verification failed: {0}")]
    VerificationFailed(String),

    /// The signing capability is not bound to a live network connection.
    #[error("invalid signer: {0}")]
    InvalidSigner(String),

    /// A contract call reverted or could not be broadcast.
    #[error("on-chain call failed: {context}: {message}")]
    OnChainCallFailed {
        /// Which entry point failed (e.g. `"signalIntent"`).
        context: &'static str,
        /// Underlying failure text.
        message: String,
        /// Transaction hash, if the transaction was mined.
        transaction: Option<TxHash>,
    },

    /// No notarization agent is installed.
    #[error("payment proof generation requires the notarization agent; install it from {install_url}")]
    AgentUnavailable {
        /// Where the user can install the agent.
        install_url: &'static str,
    },

    /// The user declined the agent's connection request.
    #[error("notarization agent connection was not approved")]
    ConnectionDeclined,

    /// The notarization agent failed while generating or fetching a proof.
    #[error("notarization agent error: {0}")]
    Agent(String),

    /// No RPC endpoint is known for the chain and no override was given.
    #[error("no RPC URL for chain id {0}; pass an RPC URL or use a supported chain")]
    NoRpcEndpoint(u64),

    /// An address string is not 20 bytes of hex.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A fiat or token amount could not be interpreted.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A 402 challenge body is missing required fields.
    #[error("invalid 402 body: {0}")]
    MalformedChallengeBody(String),

    /// The node returned a JSON-RPC error or a non-success status.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// HTTP transport failure.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context (e.g. `"POST /quote/exact-fiat"`).
        context: &'static str,
        /// The underlying transport error.
        #[source]
        source: BoxError,
    },

    /// The payment record store failed.
    #[error("record store error: {0}")]
    Storage(String),
}

impl Error {
    /// Creates an [`Error::AgentUnavailable`] pointing at the default install page.
    #[must_use]
    pub const fn agent_unavailable() -> Self {
        Self::AgentUnavailable {
            install_url: AGENT_INSTALL_URL,
        }
    }

    /// Creates an [`Error::OnChainCallFailed`] without a mined transaction.
    #[must_use]
    pub fn on_chain(context: &'static str, message: impl Into<String>) -> Self {
        Self::OnChainCallFailed {
            context,
            message: message.into(),
            transaction: None,
        }
    }

    /// Creates an [`Error::Http`] from any transport error.
    #[must_use]
    pub fn http(context: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Http {
            context,
            source: source.into(),
        }
    }
}

fn quote_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("quote failed: {status} {message}"),
        None => format!("quote failed: {message}"),
    }
}
