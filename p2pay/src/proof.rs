//! Payment proof generation and byte encoding.
//!
//! A notarized proof is serialized to compact JSON with object keys in sorted
//! order, then hex-encoded as `0x`-prefixed lowercase bytes for `fulfillIntent`.
//! Sorting makes the encoding depend only on the proof's content, never on the
//! order in which the agent happened to emit its fields.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use alloy_primitives::{Bytes, hex};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::agent::{AgentHost, ProofRequest};
use crate::error::Error;
use crate::types::IntentHash;

/// Proof bytes ready to be passed to `fulfillIntent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedProof(Bytes);

impl EncodedProof {
    /// The raw UTF-8 bytes of the canonical JSON.
    #[must_use]
    pub const fn bytes(&self) -> &Bytes {
        &self.0
    }

    /// Consumes the proof, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Display for EncodedProof {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

/// Encodes a notarized proof: canonical JSON, then UTF-8 bytes.
///
/// # Errors
///
/// Returns [`Error::Agent`] if the value cannot be serialized.
pub fn encode_proof(proof: &Value) -> Result<EncodedProof, Error> {
    let text = serde_json::to_vec(&Canonical(proof))
        .map_err(|e| Error::Agent(format!("unencodable proof: {e}")))?;
    Ok(EncodedProof(Bytes::from(text)))
}

/// Serializes a JSON value with every object's keys in sorted order,
/// whatever map representation `serde_json` was built with.
struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let sorted: BTreeMap<&String, Canonical<'_>> =
                    map.iter().map(|(k, v)| (k, Canonical(v))).collect();
                sorted.serialize(serializer)
            }
            Value::Array(items) => serializer.collect_seq(items.iter().map(Canonical)),
            other => other.serialize(serializer),
        }
    }
}

/// Inverts [`EncodedProof`]'s `0x` hex form back to the JSON value.
///
/// # Errors
///
/// Returns [`Error::Agent`] if the input is not hex of a UTF-8 JSON document.
pub fn decode_proof(encoded: &str) -> Result<Value, Error> {
    let bytes = hex::decode(encoded).map_err(|e| Error::Agent(format!("invalid proof hex: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Agent(format!("invalid proof JSON: {e}")))
}

/// Produces encoded payment proofs through the host's notarization agent.
#[derive(Clone)]
pub struct ProofGenerator {
    host: Arc<dyn AgentHost>,
}

impl std::fmt::Debug for ProofGenerator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofGenerator").finish_non_exhaustive()
    }
}

impl ProofGenerator {
    /// Creates a generator bound to `host`.
    #[must_use]
    pub fn new(host: Arc<dyn AgentHost>) -> Self {
        Self { host }
    }

    /// The host the agent is looked up on.
    #[must_use]
    pub fn host(&self) -> &dyn AgentHost {
        self.host.as_ref()
    }

    /// Generates a proof that the fiat payment for `intent_hash` happened.
    ///
    /// `platform` is lower-cased before it reaches the agent. `proof_index`
    /// selects which of the payer's recent payments to notarize, usually `0`.
    ///
    /// # Errors
    ///
    /// - [`Error::AgentUnavailable`] if no agent is installed.
    /// - [`Error::ConnectionDeclined`] if the user rejects the connection.
    /// - Any agent error from generation or retrieval.
    pub async fn generate(
        &self,
        intent_hash: IntentHash,
        platform: &str,
        proof_index: u32,
    ) -> Result<EncodedProof, Error> {
        if !self.host.status().await.is_installed() {
            return Err(Error::agent_unavailable());
        }
        let agent = self.host.agent().ok_or_else(Error::agent_unavailable)?;

        if !agent.request_connection().await? {
            return Err(Error::ConnectionDeclined);
        }

        let request = ProofRequest {
            intent_hash: intent_hash.to_string(),
            original_index: proof_index,
            platform: platform.to_lowercase(),
        };
        #[cfg(feature = "telemetry")]
        tracing::info!(intent_hash = %request.intent_hash, platform = %request.platform, "requesting payment proof");
        let handle = agent.generate_proof(&request).await?;
        let proof = agent.fetch_proof_by_id(&handle.proof_id).await?;
        encode_proof(&proof.notary_request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentSlot, NotarizedProof, NotaryAgent, ProofHandle};
    use alloy_primitives::B256;
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedAgent {
        approve: bool,
        requests: Mutex<Vec<ProofRequest>>,
        notary_request: Value,
    }

    impl ScriptedAgent {
        fn new(approve: bool, notary_request: Value) -> Self {
            Self {
                approve,
                requests: Mutex::new(Vec::new()),
                notary_request,
            }
        }
    }

    #[async_trait::async_trait]
    impl NotaryAgent for ScriptedAgent {
        async fn request_connection(&self) -> Result<bool, Error> {
            Ok(self.approve)
        }

        async fn generate_proof(&self, request: &ProofRequest) -> Result<ProofHandle, Error> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(ProofHandle {
                proof_id: "proof-1".to_owned(),
                platform: request.platform.clone(),
            })
        }

        async fn fetch_proof_by_id(&self, proof_id: &str) -> Result<NotarizedProof, Error> {
            assert_eq!(proof_id, "proof-1");
            Ok(NotarizedProof {
                notary_request: self.notary_request.clone(),
            })
        }
    }

    #[test]
    fn test_encoding_is_lowercase_hex_of_compact_json() {
        let encoded = encode_proof(&json!({"a": 1})).unwrap();
        assert_eq!(encoded.to_string(), "0x7b2261223a317d");
    }

    #[test]
    fn test_encoding_sorts_keys() {
        let a: Value = serde_json::from_str(r#"{"b":{"y":2,"x":1},"a":[3]}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":[3],"b":{"x":1,"y":2}}"#).unwrap();
        assert_eq!(encode_proof(&a).unwrap(), encode_proof(&b).unwrap());
        assert_eq!(
            &encode_proof(&a).unwrap().bytes()[..],
            br#"{"a":[3],"b":{"x":1,"y":2}}"#
        );
    }

    #[test]
    fn test_decode_inverts_encode() {
        let value = json!({"claim": {"amount": "5.00"}, "sig": "0xab"});
        let encoded = encode_proof(&value).unwrap();
        assert_eq!(decode_proof(&encoded.to_string()).unwrap(), value);
    }

    #[tokio::test]
    async fn test_absent_agent() {
        let generator = ProofGenerator::new(Arc::new(AgentSlot::new()));
        let err = generator.generate(B256::ZERO, "venmo", 0).await.unwrap_err();
        assert!(matches!(err, Error::AgentUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_declined_connection() {
        let slot = AgentSlot::new();
        slot.install(Arc::new(ScriptedAgent::new(false, json!({}))));
        let generator = ProofGenerator::new(Arc::new(slot));
        let err = generator.generate(B256::ZERO, "venmo", 0).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionDeclined));
    }

    #[tokio::test]
    async fn test_generates_with_lowercase_platform() {
        let agent = Arc::new(ScriptedAgent::new(true, json!({"a": 1})));
        let slot = AgentSlot::new();
        slot.install(Arc::clone(&agent) as Arc<dyn NotaryAgent>);
        let generator = ProofGenerator::new(Arc::new(slot));
        let hash = B256::repeat_byte(0x11);

        let proof = generator.generate(hash, "Venmo", 2).await.unwrap();
        assert_eq!(proof.to_string(), "0x7b2261223a317d");

        let requests = agent.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].platform, "venmo");
        assert_eq!(requests[0].original_index, 2);
        assert_eq!(requests[0].intent_hash, hash.to_string());
    }
}
