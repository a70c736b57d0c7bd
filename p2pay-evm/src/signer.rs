//! The payer's signing capability.
//!
//! [`PaymentSigner`] is what the escrow client and the orchestrator need from
//! a wallet: an address, a live connection, read-only calls, and
//! send-and-wait. [`WalletSigner`] implements it over an alloy provider with:
//! - Full filler stack (gas, blob gas, nonce, chain ID, wallet)
//! - [`PendingNonceManager`] seeded from the pending transaction count
//! - Automatic nonce reset on send or receipt failures
//! - Configurable EIP-1559/legacy gas, flashblocks, receipt timeouts

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use alloy_network::{EthereumWallet, Network, ReceiptResponse, TransactionBuilder};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, NonceManager,
    WalletFiller,
};
use alloy_provider::{Identity, PendingTransactionError, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::{BlockId, TransactionRequest};
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::layers::{FallbackLayer, ThrottleLayer};
use alloy_transport::{TransportError, TransportResult};
use alloy_transport_http::Http;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use url::Url;

/// Nonce manager that seeds each address from its *pending* transaction count.
///
/// The first nonce for an address comes from `eth_getTransactionCount` at the
/// `pending` tag, so transactions still in the mempool after a restart are
/// not reused. Later nonces are incremented locally until
/// [`reset_nonce`](Self::reset_nonce) forces a fresh query.
#[derive(Clone, Debug, Default)]
pub struct PendingNonceManager {
    nonces: Arc<DashMap<Address, Arc<Mutex<u64>>>>,
}

const NONCE_UNSET: u64 = u64::MAX;

#[async_trait::async_trait]
impl NonceManager for PendingNonceManager {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: Network,
    {
        let slot = {
            let entry = self
                .nonces
                .entry(address)
                .or_insert_with(|| Arc::new(Mutex::new(NONCE_UNSET)));
            Arc::clone(entry.value())
        };

        let mut nonce = slot.lock().await;
        let next = if *nonce == NONCE_UNSET {
            provider.get_transaction_count(address).pending().await?
        } else {
            *nonce + 1
        };
        *nonce = next;
        Ok(next)
    }
}

impl PendingNonceManager {
    /// Forgets the cached nonce for `address`; the next send re-queries it.
    pub async fn reset_nonce(&self, address: Address) {
        let slot = self.nonces.get(&address).map(|entry| Arc::clone(entry.value()));
        if let Some(slot) = slot {
            *slot.lock().await = NONCE_UNSET;
        }
    }
}

/// A transaction the payer signs and sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTransaction {
    /// Target address.
    pub to: Address,
    /// Native value to attach.
    pub value: U256,
    /// Encoded call data; empty for plain transfers.
    pub calldata: Bytes,
    /// Block confirmations to wait for.
    pub confirmations: u64,
}

impl MetaTransaction {
    /// A contract call with no attached value.
    #[must_use]
    pub const fn call(to: Address, calldata: Bytes) -> Self {
        Self {
            to,
            value: U256::ZERO,
            calldata,
            confirmations: 1,
        }
    }

    /// A plain native transfer.
    #[must_use]
    pub const fn transfer(to: Address, value: U256) -> Self {
        Self {
            to,
            value,
            calldata: Bytes::new(),
            confirmations: 1,
        }
    }
}

/// Result of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOutcome {
    /// Hash of the mined transaction.
    pub transaction_hash: TxHash,
    /// Whether execution succeeded.
    pub success: bool,
}

/// Errors from the signing capability.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The signer has no network connection.
    #[error("signer is not connected to a network")]
    NotConnected,
    /// No usable RPC endpoint was configured.
    #[error("no HTTP RPC endpoint configured")]
    NoEndpoints,
    /// RPC transport or submission error.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Error waiting for the receipt (timeout, dropped transaction).
    #[error(transparent)]
    PendingTransaction(#[from] PendingTransactionError),
    /// Any other refusal, e.g. from a wallet UI or a test double.
    #[error("{0}")]
    Rejected(String),
}

/// Signing capability bound (or not) to a network.
#[async_trait::async_trait]
pub trait PaymentSigner: Send + Sync {
    /// The signing address.
    fn address(&self) -> Address;

    /// Whether the signer can reach a network.
    fn is_connected(&self) -> bool;

    /// Simulates `tx` from the signer and returns the raw return data.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] if the call reverts or cannot be sent.
    async fn call(&self, tx: &MetaTransaction) -> Result<Bytes, SignerError>;

    /// Signs, broadcasts and waits for `tx` to be mined.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] if the transaction cannot be sent or its
    /// receipt never arrives.
    async fn send_transaction(&self, tx: MetaTransaction) -> Result<TxOutcome, SignerError>;
}

/// Combined filler type: Gas + `BlobGas` + Nonce([`PendingNonceManager`]) + `ChainId`.
pub type InnerFiller = JoinFill<
    GasFiller,
    JoinFill<BlobGasFiller, JoinFill<NonceFiller<PendingNonceManager>, ChainIdFiller>>,
>;

/// Fully composed Ethereum provider with all fillers and wallet signing.
pub type FullProvider = FillProvider<
    JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>,
    RootProvider,
>;

/// Configuration for [`WalletSigner`].
#[derive(Debug, Clone, Copy)]
pub struct WalletSignerConfig {
    /// Whether the chain supports EIP-1559 gas pricing (default: `true`).
    pub eip1559: bool,
    /// Whether the chain uses flashblocks; estimates against `latest` (default: `false`).
    pub flashblocks: bool,
    /// How long to wait for a receipt (default: 30s).
    pub receipt_timeout: Duration,
}

impl Default for WalletSignerConfig {
    fn default() -> Self {
        Self {
            eip1559: true,
            flashblocks: false,
            receipt_timeout: Duration::from_secs(30),
        }
    }
}

/// Builds an RPC client over HTTP endpoints with optional per-endpoint rate limits.
///
/// Each entry is a `(url, requests_per_second)` pair; non-HTTP(S) URLs are
/// skipped. Requests fail over between the remaining endpoints.
///
/// # Errors
///
/// Returns [`SignerError::NoEndpoints`] if no HTTP endpoint remains.
pub fn rpc_client(endpoints: &[(Url, Option<u32>)]) -> Result<RpcClient, SignerError> {
    let transports = endpoints
        .iter()
        .filter(|(url, _)| matches!(url.scheme(), "http" | "https"))
        .map(|(url, rate_limit)| {
            #[cfg(feature = "telemetry")]
            tracing::debug!(rpc_url = %url, rate_limit = ?rate_limit, "using HTTP transport");
            ServiceBuilder::new()
                .layer(ThrottleLayer::new(rate_limit.unwrap_or(u32::MAX)))
                .service(Http::new(url.clone()))
        })
        .collect::<Vec<_>>();
    let count = NonZeroUsize::new(transports.len()).ok_or(SignerError::NoEndpoints)?;
    let fallback = ServiceBuilder::new()
        .layer(FallbackLayer::default().with_active_transport_count(count))
        .service(transports);
    Ok(RpcClient::new(fallback, false))
}

/// A local private-key signer, optionally connected to a chain.
pub struct WalletSigner {
    address: Address,
    inner: Option<FullProvider>,
    config: WalletSignerConfig,
    nonce_manager: PendingNonceManager,
}

impl std::fmt::Debug for WalletSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSigner")
            .field("address", &self.address)
            .field("connected", &self.inner.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WalletSigner {
    /// A signer with no network connection.
    ///
    /// It reports [`is_connected`](PaymentSigner::is_connected) as `false`
    /// and refuses to call or send.
    #[must_use]
    pub fn offline(signer: &PrivateKeySigner) -> Self {
        Self {
            address: signer.address(),
            inner: None,
            config: WalletSignerConfig::default(),
            nonce_manager: PendingNonceManager::default(),
        }
    }

    /// Connects `signer` through a pre-built RPC client.
    #[must_use]
    pub fn connect(signer: PrivateKeySigner, client: RpcClient, config: WalletSignerConfig) -> Self {
        let address = signer.address();
        let nonce_manager = PendingNonceManager::default();
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                BlobGasFiller::default(),
                JoinFill::new(
                    NonceFiller::new(nonce_manager.clone()),
                    ChainIdFiller::default(),
                ),
            ),
        );
        let inner: FullProvider = ProviderBuilder::default()
            .filler(filler)
            .wallet(EthereumWallet::from(signer))
            .connect_client(client);

        #[cfg(feature = "telemetry")]
        tracing::info!(signer = %address, "wallet signer connected");

        Self {
            address,
            inner: Some(inner),
            config,
            nonce_manager,
        }
    }

    /// Connects `signer` to a single HTTP endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::NoEndpoints`] if `rpc_url` is not HTTP(S).
    pub fn connect_http(
        signer: PrivateKeySigner,
        rpc_url: Url,
        config: WalletSignerConfig,
    ) -> Result<Self, SignerError> {
        let client = rpc_client(&[(rpc_url, None)])?;
        Ok(Self::connect(signer, client, config))
    }

    fn provider(&self) -> Result<&FullProvider, SignerError> {
        self.inner.as_ref().ok_or(SignerError::NotConnected)
    }

    fn request(&self, tx: &MetaTransaction) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.address)
            .with_to(tx.to)
            .with_value(tx.value)
            .with_input(tx.calldata.clone())
    }
}

#[async_trait::async_trait]
impl PaymentSigner for WalletSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn is_connected(&self) -> bool {
        self.inner.is_some()
    }

    async fn call(&self, tx: &MetaTransaction) -> Result<Bytes, SignerError> {
        let provider = self.provider()?;
        Ok(provider.call(self.request(tx)).await?)
    }

    async fn send_transaction(&self, tx: MetaTransaction) -> Result<TxOutcome, SignerError> {
        let provider = self.provider()?;
        let mut txr = self.request(&tx);

        if !self.config.eip1559 {
            let gas = provider.get_gas_price().await?;
            txr.set_gas_price(gas);
        }

        let block_id = if self.config.flashblocks {
            BlockId::latest()
        } else {
            BlockId::pending()
        };
        let gas_limit = provider.estimate_gas(txr.clone()).block(block_id).await?;
        txr.set_gas_limit(gas_limit);

        let pending = match provider.send_transaction(txr).await {
            Ok(pending) => pending,
            Err(e) => {
                self.nonce_manager.reset_nonce(self.address).await;
                return Err(SignerError::Transport(e));
            }
        };
        #[cfg(feature = "telemetry")]
        tracing::debug!(tx = %pending.tx_hash(), "transaction broadcast");

        let watcher = pending
            .with_required_confirmations(tx.confirmations)
            .with_timeout(Some(self.config.receipt_timeout));
        match watcher.get_receipt().await {
            Ok(receipt) => Ok(TxOutcome {
                transaction_hash: receipt.transaction_hash(),
                success: receipt.status(),
            }),
            Err(e) => {
                self.nonce_manager.reset_nonce(self.address).await;
                Err(SignerError::PendingTransaction(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> PrivateKeySigner {
        "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_offline_signer_is_not_connected() {
        let key = test_key();
        let signer = WalletSigner::offline(&key);
        assert!(!signer.is_connected());
        assert_eq!(signer.address(), key.address());
    }

    #[tokio::test]
    async fn test_offline_signer_refuses_to_send() {
        let signer = WalletSigner::offline(&test_key());
        let tx = MetaTransaction::transfer(Address::ZERO, U256::from(1));
        assert!(matches!(
            signer.send_transaction(tx).await,
            Err(SignerError::NotConnected)
        ));
    }

    #[test]
    fn test_rpc_client_requires_http_endpoint() {
        let ws: Url = "wss://example.com".parse().unwrap();
        assert!(matches!(
            rpc_client(&[(ws, None)]),
            Err(SignerError::NoEndpoints)
        ));
    }

    #[tokio::test]
    async fn test_connected_signer() {
        let key = test_key();
        let address = key.address();
        let signer = WalletSigner::connect_http(
            key,
            "http://127.0.0.1:8545".parse().unwrap(),
            WalletSignerConfig::default(),
        )
        .unwrap();
        assert!(signer.is_connected());
        assert_eq!(signer.address(), address);
    }
}
