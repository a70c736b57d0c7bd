//! Wire and domain types shared by every stage of a settlement.
//!
//! These mirror the JSON shapes used by the quote service and the intent
//! verifier (camelCase field names) so that the same values can be passed
//! between stages without conversion.

use alloy_primitives::{Address, B256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 32-byte identifier of a registered intent, returned by `signalIntent`.
///
/// Correlates proof generation and fulfillment with the registration.
pub type IntentHash = B256;

/// Intent descriptor returned by the quote service.
///
/// `to_address` must hold a canonical address before the descriptor is sent
/// to the verifier; an unresolved alias breaks signature matching downstream.
///
/// # JSON Format
///
/// ```json
/// {
///   "depositId": "42",
///   "processorName": "venmo",
///   "amount": "4950000",
///   "toAddress": "0x...",
///   "payeeDetails": "0x...",
///   "fiatCurrencyCode": "USD",
///   "chainId": "8453"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentDescriptor {
    /// Escrow deposit the intent draws from.
    pub deposit_id: String,
    /// Payment processor (e.g. `"venmo"`).
    pub processor_name: String,
    /// Token amount in base units.
    pub amount: String,
    /// Where the released tokens go.
    pub to_address: String,
    /// Hashed payee details for the processor.
    pub payee_details: String,
    /// Processor-specific data, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_intent_data: Option<Map<String, Value>>,
    /// ISO currency code of the fiat leg.
    pub fiat_currency_code: String,
    /// Destination chain id, as a decimal string.
    pub chain_id: String,
}

/// A single fiat-to-token quote.
///
/// Fiat amounts are decimal strings with 6 implied fractional digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Fiat amount in millionths.
    pub fiat_amount: String,
    /// Fiat amount for display (e.g. `"5.00"`).
    pub fiat_amount_formatted: String,
    /// Token amount in base units.
    pub token_amount: String,
    /// Token amount for display.
    pub token_amount_formatted: String,
    /// Payment platform the payer uses (e.g. `"venmo"`).
    pub payment_method: String,
    /// Payee handle or address on the payment platform.
    pub payee_address: String,
    /// Fiat-per-token conversion rate.
    pub conversion_rate: String,
    /// Intent descriptor to be verified and registered.
    pub intent: IntentDescriptor,
}

/// Parameters of a quote request.
///
/// `recipient` is already resolved; unset optional fields fall back to the
/// quote service defaults (Base, Base USDC, Venmo + Cash App).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    /// Canonical recipient of the tokens.
    pub recipient: Address,
    /// Fiat amount in US dollars.
    pub amount_usd: Decimal,
    /// The paying user's address.
    pub user: Address,
    /// Single payment platform to quote for.
    pub platform: Option<String>,
    /// Destination chain id.
    pub chain_id: Option<u64>,
    /// Destination token contract.
    pub destination_token: Option<Address>,
}

/// Authorization data produced by the off-chain verifier.
///
/// Each field is consumed positionally by the escrow's `signalIntent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentData {
    /// Escrow deposit id (uint256, decimal string).
    pub deposit_id: String,
    /// Token amount (uint256, decimal string).
    pub token_amount: String,
    /// Recipient of released funds; must be a canonical address.
    pub recipient_address: String,
    /// Payment verifier contract for the platform.
    pub verifier_address: String,
    /// Keccak hash of the fiat currency code (bytes32).
    pub currency_code_hash: String,
    /// The verifier's signature over the intent.
    pub gating_service_signature: String,
}

/// An intent signed by the trusted verifier, ready for on-chain registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedIntent {
    /// Opaque signed intent blob.
    pub signed_intent: String,
    /// Positional arguments for `signalIntent`.
    pub intent_data: IntentData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_uses_camel_case() {
        let json = serde_json::json!({
            "depositId": "42",
            "processorName": "venmo",
            "amount": "4950000",
            "toAddress": "alice.eth",
            "payeeDetails": "0xabc",
            "fiatCurrencyCode": "USD",
            "chainId": "8453",
        });
        let descriptor: IntentDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(descriptor.deposit_id, "42");
        assert_eq!(descriptor.to_address, "alice.eth");
        assert!(descriptor.processor_intent_data.is_none());

        let back = serde_json::to_value(&descriptor).unwrap();
        assert!(back.get("processorIntentData").is_none());
        assert_eq!(back["fiatCurrencyCode"], "USD");
    }

    #[test]
    fn test_verified_intent_deserializes() {
        let json = serde_json::json!({
            "signedIntent": "0xsigned",
            "intentData": {
                "depositId": "1",
                "tokenAmount": "5000000",
                "recipientAddress": "0x0000000000000000000000000000000000000001",
                "verifierAddress": "0x9a733B55a875D0DB4915c6B36350b24F8AB99dF5",
                "currencyCodeHash": "0xc4ae21aac0c6549d71dd96035b7e0bdb6c79ebdba8891b666115bc976d16a29e",
                "gatingServiceSignature": "0x1234",
            }
        });
        let verified: VerifiedIntent = serde_json::from_value(json).unwrap();
        assert_eq!(verified.intent_data.token_amount, "5000000");
    }
}
