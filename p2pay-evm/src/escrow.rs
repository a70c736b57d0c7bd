//! Escrow contract client.
//!
//! Two fixed entry points: `signalIntent` registers a verified intent and
//! yields its hash, `fulfillIntent` submits the payment proof and releases
//! the deposit. Both go through the payer's [`PaymentSigner`].

use std::str::FromStr;

use alloy_primitives::{Address, B256, Bytes, TxHash, U256};
use alloy_sol_types::SolCall;
use p2pay::resolver::is_canonical_address;
use p2pay::{EncodedProof, Error, IntentHash, VerifiedIntent};

use crate::chains::ESCROW_ADDRESS;
use crate::contract::IEscrow;
use crate::signer::{MetaTransaction, PaymentSigner, SignerError, TxOutcome};

/// Awaits a future, optionally instrumenting it with a tracing span.
macro_rules! traced {
    ($fut:expr, $span:expr) => {{
        #[cfg(feature = "telemetry")]
        {
            use tracing::Instrument;
            $fut.instrument($span).await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            $fut.await
        }
    }};
}

/// Maps a signer failure onto the shared error taxonomy.
pub(crate) fn signer_error(context: &'static str, err: SignerError) -> Error {
    match err {
        SignerError::NotConnected => Error::InvalidSigner(SignerError::NotConnected.to_string()),
        other => Error::on_chain(context, other.to_string()),
    }
}

/// Fails with [`Error::InvalidSigner`] unless the signer has a network.
pub(crate) fn require_connected(signer: &dyn PaymentSigner) -> Result<(), Error> {
    if signer.is_connected() {
        Ok(())
    } else {
        Err(Error::InvalidSigner(
            "signer must be connected to a provider".to_owned(),
        ))
    }
}

/// Sends `tx` and turns a mined-but-failed transaction into an error.
pub(crate) async fn send_checked(
    signer: &dyn PaymentSigner,
    context: &'static str,
    tx: MetaTransaction,
) -> Result<TxHash, Error> {
    let TxOutcome {
        transaction_hash,
        success,
    } = signer
        .send_transaction(tx)
        .await
        .map_err(|e| signer_error(context, e))?;
    if success {
        Ok(transaction_hash)
    } else {
        Err(Error::OnChainCallFailed {
            context,
            message: "transaction reverted".to_owned(),
            transaction: Some(transaction_hash),
        })
    }
}

/// Client for one escrow deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowClient {
    address: Address,
}

impl Default for EscrowClient {
    fn default() -> Self {
        Self::new(ESCROW_ADDRESS)
    }
}

impl EscrowClient {
    /// A client for the escrow at `address`.
    #[must_use]
    pub const fn new(address: Address) -> Self {
        Self { address }
    }

    /// The escrow contract address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Registers a verified intent and returns the contract-computed intent hash.
    ///
    /// The hash is read by simulating the call from the signer before the
    /// transaction is broadcast.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] if the recipient or verifier is not a
    ///   canonical address; raised before any network call.
    /// - [`Error::InvalidAmount`] if the deposit id or amount is not a number.
    /// - [`Error::VerificationFailed`] if the currency hash or signature is
    ///   not valid hex.
    /// - [`Error::InvalidSigner`] if the signer is not connected.
    /// - [`Error::OnChainCallFailed`] if simulation, broadcast or execution fails.
    pub async fn signal_intent(
        &self,
        signer: &dyn PaymentSigner,
        verified: &VerifiedIntent,
    ) -> Result<IntentHash, Error> {
        let call = signal_intent_call(verified)?;
        require_connected(signer)?;

        let tx = MetaTransaction::call(self.address, Bytes::from(call.abi_encode()));
        let output = traced!(
            signer.call(&tx),
            tracing::info_span!("simulate_signal_intent", escrow = %self.address)
        )
        .map_err(|e| signer_error("signalIntent", e))?;
        let intent_hash = IEscrow::signalIntentCall::abi_decode_returns(&output)
            .map_err(|e| Error::on_chain("signalIntent", e.to_string()))?;

        traced!(
            send_checked(signer, "signalIntent", tx),
            tracing::info_span!("signal_intent", escrow = %self.address, %intent_hash)
        )?;
        #[cfg(feature = "telemetry")]
        tracing::info!(%intent_hash, "intent signaled");
        Ok(intent_hash)
    }

    /// Submits `proof` for `intent_hash` and returns the settlement transaction.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSigner`] if the signer is not connected.
    /// - [`Error::OnChainCallFailed`] if the send fails or the transaction reverts.
    pub async fn fulfill_intent(
        &self,
        signer: &dyn PaymentSigner,
        proof: &EncodedProof,
        intent_hash: IntentHash,
    ) -> Result<TxHash, Error> {
        require_connected(signer)?;
        let call = IEscrow::fulfillIntentCall {
            paymentProof: proof.bytes().clone(),
            intentHash: intent_hash,
        };
        let tx = MetaTransaction::call(self.address, Bytes::from(call.abi_encode()));
        traced!(
            send_checked(signer, "fulfillIntent", tx),
            tracing::info_span!("fulfill_intent", escrow = %self.address, %intent_hash)
        )
    }
}

/// Parses the verified intent's fields positionally into `signalIntent` arguments.
fn signal_intent_call(verified: &VerifiedIntent) -> Result<IEscrow::signalIntentCall, Error> {
    let data = &verified.intent_data;
    Ok(IEscrow::signalIntentCall {
        depositId: parse_uint("depositId", &data.deposit_id)?,
        amount: parse_uint("tokenAmount", &data.token_amount)?,
        to: parse_address(&data.recipient_address)?,
        verifier: parse_address(&data.verifier_address)?,
        fiatCurrency: B256::from_str(&data.currency_code_hash).map_err(|_| {
            Error::VerificationFailed(format!(
                "malformed currencyCodeHash {}",
                data.currency_code_hash
            ))
        })?,
        gatingServiceSignature: Bytes::from_str(&data.gating_service_signature).map_err(
            |_| Error::VerificationFailed("malformed gatingServiceSignature".to_owned()),
        )?,
    })
}

fn parse_uint(field: &str, value: &str) -> Result<U256, Error> {
    U256::from_str(value).map_err(|_| Error::InvalidAmount(format!("{field} {value}")))
}

fn parse_address(value: &str) -> Result<Address, Error> {
    if !is_canonical_address(value) {
        return Err(Error::InvalidAddress(value.to_owned()));
    }
    Address::from_str(value).map_err(|_| Error::InvalidAddress(value.to_owned()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy_sol_types::SolValue;
    use p2pay::IntentData;
    use p2pay::proof::encode_proof;
    use std::sync::Mutex;

    /// Scripted signer that records every transaction it sees.
    pub(crate) struct MockSigner {
        pub connected: bool,
        pub call_output: Bytes,
        pub succeed: bool,
        pub calls: Mutex<Vec<MetaTransaction>>,
        pub sent: Mutex<Vec<MetaTransaction>>,
    }

    impl MockSigner {
        pub(crate) fn returning(hash: B256) -> Self {
            Self {
                connected: true,
                call_output: Bytes::from(hash.abi_encode()),
                succeed: true,
                calls: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl PaymentSigner for MockSigner {
        fn address(&self) -> Address {
            Address::repeat_byte(0x50)
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn call(&self, tx: &MetaTransaction) -> Result<Bytes, SignerError> {
            self.calls.lock().unwrap().push(tx.clone());
            Ok(self.call_output.clone())
        }

        async fn send_transaction(&self, tx: MetaTransaction) -> Result<TxOutcome, SignerError> {
            let mut sent = self.sent.lock().unwrap();
            sent.push(tx);
            Ok(TxOutcome {
                transaction_hash: TxHash::with_last_byte(u8::try_from(sent.len()).unwrap()),
                success: self.succeed,
            })
        }
    }

    pub(crate) fn verified_intent(recipient: &str) -> VerifiedIntent {
        VerifiedIntent {
            signed_intent: "0xsigned".to_owned(),
            intent_data: IntentData {
                deposit_id: "42".to_owned(),
                token_amount: "4950000".to_owned(),
                recipient_address: recipient.to_owned(),
                verifier_address: "0x9a733B55a875D0DB4915c6B36350b24F8AB99dF5".to_owned(),
                currency_code_hash:
                    "0xc4ae21aac0c6549d71dd96035b7e0bdb6c79ebdba8891b666115bc976d16a29e"
                        .to_owned(),
                gating_service_signature: "0xdeadbeef".to_owned(),
            },
        }
    }

    const RECIPIENT: &str = "0x1111111111111111111111111111111111111111";

    #[tokio::test]
    async fn test_signal_intent_returns_simulated_hash() {
        let hash = B256::repeat_byte(0x77);
        let signer = MockSigner::returning(hash);
        let escrow = EscrowClient::default();

        let got = escrow
            .signal_intent(&signer, &verified_intent(RECIPIENT))
            .await
            .unwrap();
        assert_eq!(got, hash);

        let sent = signer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, ESCROW_ADDRESS);
        let decoded = IEscrow::signalIntentCall::abi_decode(&sent[0].calldata).unwrap();
        assert_eq!(decoded.depositId, U256::from(42));
        assert_eq!(decoded.amount, U256::from(4_950_000));
        assert_eq!(decoded.to, Address::repeat_byte(0x11));
        assert_eq!(decoded.gatingServiceSignature, Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(signer.calls.lock().unwrap()[0], sent[0]);
    }

    #[tokio::test]
    async fn test_alias_recipient_rejected_before_any_call() {
        let signer = MockSigner::returning(B256::ZERO);
        let err = EscrowClient::default()
            .signal_intent(&signer, &verified_intent("alice.eth"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(a) if a == "alice.eth"));
        assert!(signer.calls.lock().unwrap().is_empty());
        assert!(signer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_signer() {
        let mut signer = MockSigner::returning(B256::ZERO);
        signer.connected = false;
        let err = EscrowClient::default()
            .signal_intent(&signer, &verified_intent(RECIPIENT))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSigner(_)));
    }

    #[tokio::test]
    async fn test_reverted_signal() {
        let mut signer = MockSigner::returning(B256::ZERO);
        signer.succeed = false;
        let err = EscrowClient::default()
            .signal_intent(&signer, &verified_intent(RECIPIENT))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::OnChainCallFailed {
                context: "signalIntent",
                transaction: Some(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fulfill_intent() {
        let signer = MockSigner::returning(B256::ZERO);
        let proof = encode_proof(&serde_json::json!({"a": 1})).unwrap();
        let intent_hash = B256::repeat_byte(0x42);

        let tx = EscrowClient::default()
            .fulfill_intent(&signer, &proof, intent_hash)
            .await
            .unwrap();
        assert_eq!(tx, TxHash::with_last_byte(1));

        let sent = signer.sent.lock().unwrap();
        let decoded = IEscrow::fulfillIntentCall::abi_decode(&sent[0].calldata).unwrap();
        assert_eq!(decoded.intentHash, intent_hash);
        assert_eq!(&decoded.paymentProof[..], br#"{"a":1}"#);
    }
}
