//! Axum route handlers for the gateway.
//!
//! The gateway is the trusted half of a fiat settlement: it holds the
//! verifier credential so the payer never sees it, and it lets a merchant
//! confirm a direct payment from its transaction hash.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, TxHash};
use axum::Json;
use axum::extract::State;
use p2pay::resolver::is_canonical_address;
use p2pay::{IntentDescriptor, VerifiedIntent};
use p2pay_evm::{PaymentReceiptVerifier, VerifyPaymentTx};
use p2pay_http::IntentVerifierClient;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// Services behind the gateway's routes.
#[derive(Debug, Clone, Default)]
pub struct Gateway {
    verifier: Option<IntentVerifierClient>,
    receipts: PaymentReceiptVerifier,
    rpc_overrides: HashMap<u64, String>,
}

/// Shared application state.
pub type GatewayState = Arc<Gateway>;

impl Gateway {
    /// A gateway with the given verifier and receipt checker.
    #[must_use]
    pub fn new(
        verifier: Option<IntentVerifierClient>,
        receipts: PaymentReceiptVerifier,
    ) -> Self {
        Self {
            verifier,
            receipts,
            rpc_overrides: HashMap::new(),
        }
    }

    /// Uses `rpc_url` for payment checks on `chain_id`.
    #[must_use]
    pub fn with_rpc_override(mut self, chain_id: u64, rpc_url: String) -> Self {
        self.rpc_overrides.insert(chain_id, rpc_url);
        self
    }

    /// Builds the services described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`p2pay::Error::Http`] if the verifier URL is invalid or the
    /// HTTP client cannot be built.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, p2pay::Error> {
        let timeout = config.request_timeout();
        let verifier = config
            .api_key
            .clone()
            .map(|key| {
                let client = match &config.verifier_url {
                    Some(url) => IntentVerifierClient::with_api(url, key)?,
                    None => IntentVerifierClient::new(key)?,
                };
                Ok::<_, p2pay::Error>(match timeout {
                    Some(timeout) => client.with_timeout(timeout),
                    None => client,
                })
            })
            .transpose()?;
        let receipts = match timeout {
            Some(timeout) => PaymentReceiptVerifier::with_timeout(timeout)?,
            None => PaymentReceiptVerifier::new(),
        };
        Ok(Self {
            verifier,
            receipts,
            rpc_overrides: config.rpc_overrides(),
        })
    }

    /// Whether `POST /verify/intent` is served.
    #[must_use]
    pub const fn verifies_intents(&self) -> bool {
        self.verifier.is_some()
    }
}

/// Body of `POST /verify/payment`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentBody {
    /// Transaction to inspect.
    pub tx_hash: TxHash,
    /// Chain the transaction is on.
    pub chain_id: u64,
    /// Canonical address that must have been paid.
    pub recipient: String,
    /// ERC-20 token, for token payments.
    #[serde(default)]
    pub token: Option<Address>,
}

/// Reply of `POST /verify/payment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerifyPaymentReply {
    /// Whether the transaction paid the recipient.
    pub valid: bool,
}

/// `POST /verify/intent`: signs a descriptor with the configured credential.
///
/// Replies with the bare signed intent.
///
/// # Errors
///
/// 503 without a credential, 400 if `toAddress` is not canonical, 422 if the
/// verifier refuses.
pub async fn post_verify_intent(
    State(gateway): State<GatewayState>,
    Json(descriptor): Json<IntentDescriptor>,
) -> Result<Json<VerifiedIntent>, GatewayError> {
    let verifier = gateway
        .verifier
        .as_ref()
        .ok_or(GatewayError::VerifierNotConfigured)?;
    if !is_canonical_address(&descriptor.to_address) {
        return Err(p2pay::Error::InvalidAddress(descriptor.to_address).into());
    }
    tracing::info!(
        deposit_id = %descriptor.deposit_id,
        processor = %descriptor.processor_name,
        "verifying intent"
    );
    let verified = verifier.verify(&descriptor).await?;
    Ok(Json(verified))
}

/// `POST /verify/payment`: checks that a transaction paid the recipient.
///
/// # Errors
///
/// 400 for a non-canonical recipient or an unknown chain, 502 if the node
/// cannot be reached.
pub async fn post_verify_payment(
    State(gateway): State<GatewayState>,
    Json(body): Json<VerifyPaymentBody>,
) -> Result<Json<VerifyPaymentReply>, GatewayError> {
    if !is_canonical_address(&body.recipient) {
        return Err(p2pay::Error::InvalidAddress(body.recipient).into());
    }
    let recipient = Address::from_str(&body.recipient)
        .map_err(|_| p2pay::Error::InvalidAddress(body.recipient.clone()))?;
    let request = VerifyPaymentTx {
        tx_hash: body.tx_hash,
        chain_id: body.chain_id,
        recipient,
        token: body.token,
        rpc_url: gateway.rpc_overrides.get(&body.chain_id).cloned(),
    };
    let valid = gateway.receipts.verify(&request).await?;
    tracing::info!(tx = %body.tx_hash, chain_id = body.chain_id, valid, "payment checked");
    Ok(Json(VerifyPaymentReply { valid }))
}

/// `GET /health`.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Creates an Axum [`axum::Router`] with all gateway endpoints.
///
/// Endpoints:
/// - `POST /verify/intent` - sign an intent descriptor
/// - `POST /verify/payment` - confirm a direct payment
/// - `GET /health` - liveness
pub fn gateway_router(state: GatewayState) -> axum::Router {
    axum::Router::new()
        .route("/verify/intent", axum::routing::post(post_verify_intent))
        .route("/verify/payment", axum::routing::post(post_verify_payment))
        .route("/health", axum::routing::get(health))
        .with_state(state)
}
