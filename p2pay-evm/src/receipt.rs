//! Independent confirmation that a transaction paid a recipient.
//!
//! [`PaymentReceiptVerifier`] talks plain JSON-RPC to a node, so a server can
//! check a client's [`PaymentProof`](p2pay::challenge::PaymentProof) without a
//! wallet or a full provider stack.

use std::time::Duration;

use alloy_primitives::{Address, TxHash, U256};
use p2pay::Error;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::chains::{ChainId, ERC20_TRANSFER_TOPIC, chain_config};

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Log entry of a receipt; only the fields the check needs.
#[derive(Debug, Clone, Deserialize)]
struct RpcLog {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
}

/// Receipt fields the check needs.
#[derive(Debug, Clone, Deserialize)]
struct RpcReceipt {
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

/// Transaction fields the check needs.
#[derive(Debug, Clone, Deserialize)]
struct RpcTransaction {
    to: Option<String>,
    value: Option<String>,
}

/// What to check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyPaymentTx {
    /// Transaction to inspect.
    pub tx_hash: TxHash,
    /// Chain the transaction is on.
    pub chain_id: ChainId,
    /// Who must have been paid.
    pub recipient: Address,
    /// ERC-20 token that must have been transferred; native value otherwise.
    pub token: Option<Address>,
    /// Endpoint to use instead of the chain registry's.
    pub rpc_url: Option<String>,
}

/// Left-pads an address to a 32-byte log topic.
///
/// Accepts the address with or without `0x`; the result is `0x` followed by
/// 24 zeros and the 40 address digits, as given.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] unless the input is exactly 40 hex digits.
pub fn address_to_topic(address: &str) -> Result<String, Error> {
    let digits = address.strip_prefix("0x").unwrap_or(address);
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidAddress(address.to_owned()));
    }
    Ok(format!("0x{digits:0>64}"))
}

/// Confirms on-chain that a transaction delivered funds to a recipient.
#[derive(Debug, Clone)]
pub struct PaymentReceiptVerifier {
    client: Client,
}

impl Default for PaymentReceiptVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentReceiptVerifier {
    /// A verifier with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// A verifier whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http("build RPC client", e))?;
        Ok(Self { client })
    }

    /// Returns `true` only if the transaction succeeded and paid the recipient.
    ///
    /// With a token, some log of the receipt must be that token's `Transfer`
    /// event with the recipient as its `to`. Without one, the transaction
    /// itself must send non-zero native value to the recipient.
    ///
    /// # Errors
    ///
    /// - [`Error::NoRpcEndpoint`] if no endpoint is known for the chain and no
    ///   override is given; raised before any network call.
    /// - [`Error::Rpc`] if the node cannot be queried or answers with an error.
    pub async fn verify(&self, request: &VerifyPaymentTx) -> Result<bool, Error> {
        let rpc_url = match &request.rpc_url {
            Some(url) => url.as_str(),
            None => chain_config(request.chain_id)
                .map(|c| c.rpc_url)
                .ok_or(Error::NoRpcEndpoint(request.chain_id))?,
        };
        let tx_hash = request.tx_hash.to_string();

        let receipt: Option<RpcReceipt> = self
            .rpc(rpc_url, "eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        let Some(receipt) = receipt else {
            return Ok(false);
        };
        if receipt.status.as_deref() != Some("0x1") {
            return Ok(false);
        }

        if let Some(token) = request.token {
            let recipient_topic = address_to_topic(&request.recipient.to_string())?;
            let transfer_topic = ERC20_TRANSFER_TOPIC.to_string();
            let token = token.to_string();
            let paid = receipt.logs.iter().any(|log| {
                log.address.eq_ignore_ascii_case(&token)
                    && log
                        .topics
                        .first()
                        .is_some_and(|t| t.eq_ignore_ascii_case(&transfer_topic))
                    && log
                        .topics
                        .get(2)
                        .is_some_and(|t| t.eq_ignore_ascii_case(&recipient_topic))
            });
            return Ok(paid);
        }

        let tx: Option<RpcTransaction> = self
            .rpc(rpc_url, "eth_getTransactionByHash", json!([tx_hash]))
            .await?;
        let Some(RpcTransaction {
            to: Some(to),
            value: Some(value),
        }) = tx
        else {
            return Ok(false);
        };
        let value = U256::from_str_radix(value.trim_start_matches("0x"), 16).unwrap_or_default();
        Ok(!value.is_zero() && to.eq_ignore_ascii_case(&request.recipient.to_string()))
    }

    async fn rpc<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, Error> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Rpc(format!("{method}: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Rpc(format!("{method}: HTTP {}", response.status())));
        }
        let body: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::Rpc(format!("{method}: malformed response: {e}")))?;
        if let Some(err) = body.error {
            return Err(Error::Rpc(format!("{method}: {} {}", err.code, err.message)));
        }
        Ok(body.result)
    }
}
