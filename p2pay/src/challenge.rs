//! The versioned 402 challenge/response contract (v1).
//!
//! A server that wants payment answers with HTTP 402 and a
//! [`PaymentRequiredBody`]. The client pays and retries with a
//! [`PaymentProof`]. Both shapes are frozen: later versions may add optional
//! fields but never remove or retype existing ones.
//!
//! # Challenge
//!
//! ```json
//! {
//!   "paymentRequired": true,
//!   "recipient": "shop.fkey.eth",
//!   "chainId": 8453,
//!   "amountWei": "1000000000000000",
//!   "amountFormatted": "$5.00",
//!   "label": "Pro plan",
//!   "zkp2p": { "enabled": true, "verifyUrl": "https://shop.example/verify" }
//! }
//! ```
//!
//! # Proof
//!
//! ```json
//! { "type": "zkp2p", "chainId": 8453, "txHash": "0x...", "recipient": "0x..." }
//! ```

use alloy_primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Off-chain fiat options carried by a challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkP2pOptions {
    /// Whether the server accepts fiat settlement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Backend endpoint that authorizes intents for this server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_url: Option<String>,
}

/// A 402 Payment Required response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredBody {
    /// Always `true`.
    pub payment_required: bool,
    /// Canonical address or alias to pay.
    pub recipient: String,
    /// Chain the payment must land on.
    pub chain_id: u64,
    /// Native amount in wei, as a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_wei: Option<String>,
    /// Display amount, e.g. `"$5.00"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_formatted: Option<String>,
    /// What the payment is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Off-chain fiat options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zkp2p: Option<ZkP2pOptions>,
}

impl PaymentRequiredBody {
    /// Whether the server accepts off-chain fiat settlement.
    #[must_use]
    pub fn fiat_enabled(&self) -> bool {
        self.zkp2p
            .as_ref()
            .and_then(|z| z.enabled)
            .unwrap_or(false)
    }

    /// The verify URL announced by the server, if any.
    #[must_use]
    pub fn verify_url(&self) -> Option<&str> {
        self.zkp2p.as_ref().and_then(|z| z.verify_url.as_deref())
    }
}

/// How a challenge was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofKind {
    /// Direct on-chain transfer.
    Crypto,
    /// Off-chain fiat payment settled through the escrow.
    Zkp2p,
}

/// Proof of payment sent back on retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    /// Payment path taken.
    #[serde(rename = "type")]
    pub kind: ProofKind,
    /// Chain the transaction landed on.
    pub chain_id: u64,
    /// Hash of the paying or settling transaction.
    pub tx_hash: TxHash,
    /// Resolved recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Address>,
    /// Amount paid, in wei, for direct transfers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

/// Validates and parses a 402 body.
///
/// The body must have `paymentRequired: true`, a string `recipient`, and a
/// numeric `chainId`. Unknown fields are ignored.
///
/// # Errors
///
/// Returns [`Error::MalformedChallengeBody`] when a required field is missing
/// or mistyped.
pub fn parse_challenge(body: &Value) -> Result<PaymentRequiredBody, Error> {
    let Some(object) = body.as_object() else {
        return Err(malformed("body is not an object"));
    };
    if object.get("paymentRequired").and_then(Value::as_bool) != Some(true) {
        return Err(malformed("missing paymentRequired"));
    }
    if !object.get("recipient").is_some_and(Value::is_string) {
        return Err(malformed("missing recipient"));
    }
    if !object.get("chainId").is_some_and(Value::is_u64) {
        return Err(malformed("missing chainId"));
    }
    PaymentRequiredBody::deserialize(body).map_err(|e| malformed(&e.to_string()))
}

fn malformed(reason: &str) -> Error {
    Error::MalformedChallengeBody(reason.to_owned())
}
