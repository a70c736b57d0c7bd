//! The settlement state machine.
//!
//! An off-chain fiat settlement moves through five stages, each carrying what
//! the next one needs:
//!
//! ```text
//! Quoted -> Verified -> Signaled -> Proven -> Fulfilled
//! ```
//!
//! [`PaymentOrchestrator::run`] drives all of them. Split mode stops after
//! `Signaled` ([`PaymentOrchestrator::begin`]) so the caller can show "pay $X
//! to Y", then finishes later from the intent hash alone
//! ([`PaymentOrchestrator::complete`]). A failure at any stage aborts the
//! flow with the stage's own error; nothing is retried, and a failed flow is
//! restarted from a fresh quote.
//!
//! The direct path ([`PaymentOrchestrator::send_direct`]) skips all of this
//! and sends a single transfer.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_sol_types::SolCall;
use p2pay::agent::{WaitOptions, wait_for_agent};
use p2pay::amount::parse_amount_formatted;
use p2pay::challenge::{PaymentProof, ProofKind, parse_challenge};
use p2pay::{
    AddressResolver, EncodedProof, Error, IntentAuthorizer, IntentHash, NameResolver, ProofGenerator,
    Quote, QuoteRequest, QuoteSource, VerifiedIntent,
};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::contract::IERC20;
use crate::escrow::{EscrowClient, require_connected, send_checked};
use crate::signer::{MetaTransaction, PaymentSigner};

/// What the payer wants to settle through the escrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRequest {
    /// Canonical address or alias of the recipient.
    pub recipient: String,
    /// Fiat amount in US dollars.
    pub amount_usd: Decimal,
    /// Single payment platform, e.g. `"venmo"`.
    pub platform: Option<String>,
    /// Destination chain.
    pub chain_id: Option<u64>,
    /// Destination token.
    pub destination_token: Option<Address>,
}

/// A single on-chain transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectTransfer {
    /// Canonical address or alias of the recipient.
    pub recipient: String,
    /// Amount in the token's base units (wei for native transfers).
    pub amount: U256,
    /// ERC-20 token to transfer; native value when `None`.
    pub token: Option<Address>,
}

/// One stage of an off-chain fiat settlement.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementStage {
    /// A quote was obtained for a resolved recipient.
    Quoted {
        /// The quote, including the intent descriptor.
        quote: Quote,
    },
    /// The verifier signed the intent.
    Verified {
        /// The quote the intent came from.
        quote: Quote,
        /// The signed intent.
        verified: VerifiedIntent,
    },
    /// The intent is registered on the escrow.
    Signaled {
        /// Hash returned by `signalIntent`.
        intent_hash: IntentHash,
        /// Platform the fiat payment is made on.
        payment_method: String,
    },
    /// A notarized proof of the fiat payment exists.
    Proven {
        /// The intent the proof names.
        intent_hash: IntentHash,
        /// Encoded proof for `fulfillIntent`.
        proof: EncodedProof,
    },
    /// Funds were released.
    Fulfilled {
        /// The settled intent.
        intent_hash: IntentHash,
        /// Settlement transaction.
        transaction_hash: TxHash,
    },
}

impl SettlementStage {
    /// Short stage name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Quoted { .. } => "quoted",
            Self::Verified { .. } => "verified",
            Self::Signaled { .. } => "signaled",
            Self::Proven { .. } => "proven",
            Self::Fulfilled { .. } => "fulfilled",
        }
    }

    /// Whether no further transition exists.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Fulfilled { .. })
    }
}

/// A registered intent awaiting the payer's fiat payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSettlement {
    /// Hash to pass to [`PaymentOrchestrator::complete`].
    pub intent_hash: IntentHash,
    /// Platform to pay on; also passed to `complete`.
    pub payment_method: String,
    /// Who to pay on that platform.
    pub payee_address: String,
    /// Fiat amount to pay, for display.
    pub fiat_amount_formatted: String,
    /// Tokens the recipient will receive, for display.
    pub token_amount_formatted: String,
}

/// A completed settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// The settled intent.
    pub intent_hash: IntentHash,
    /// Settlement transaction.
    pub transaction_hash: TxHash,
}

/// How to answer a 402 challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChallengeOptions {
    /// Prefer off-chain fiat settlement when the server offers it.
    pub use_offchain: bool,
    /// Verify URL to use when the challenge does not name one.
    pub verify_url: Option<String>,
}

/// Drives settlements for one payer.
pub struct PaymentOrchestrator {
    signer: Arc<dyn PaymentSigner>,
    quotes: Arc<dyn QuoteSource>,
    proofs: ProofGenerator,
    resolver: AddressResolver,
    name_resolver: Option<Arc<dyn NameResolver>>,
    escrow: EscrowClient,
    agent_wait: Option<WaitOptions>,
}

impl std::fmt::Debug for PaymentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentOrchestrator")
            .field("signer", &self.signer.address())
            .field("escrow", &self.escrow)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl PaymentOrchestrator {
    /// An orchestrator with the default escrow and no name resolution.
    #[must_use]
    pub fn new(
        signer: Arc<dyn PaymentSigner>,
        quotes: Arc<dyn QuoteSource>,
        proofs: ProofGenerator,
    ) -> Self {
        Self {
            signer,
            quotes,
            proofs,
            resolver: AddressResolver::new(),
            name_resolver: None,
            escrow: EscrowClient::default(),
            agent_wait: None,
        }
    }

    /// Resolves aliases through `resolver` (and its default handle).
    #[must_use]
    pub fn with_resolver(mut self, resolver: AddressResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Uses `name_resolver` ahead of the resolver's default handle.
    #[must_use]
    pub fn with_name_resolver(mut self, name_resolver: Arc<dyn NameResolver>) -> Self {
        self.name_resolver = Some(name_resolver);
        self
    }

    /// Targets a different escrow deployment.
    #[must_use]
    pub const fn with_escrow(mut self, escrow: EscrowClient) -> Self {
        self.escrow = escrow;
        self
    }

    /// Gives a late-starting notarization agent time to appear before proving.
    #[must_use]
    pub const fn with_agent_wait(mut self, options: WaitOptions) -> Self {
        self.agent_wait = Some(options);
        self
    }

    async fn resolve(&self, identifier: &str) -> Result<Address, Error> {
        self.resolver
            .resolve(identifier, self.name_resolver.as_deref())
            .await
    }

    /// Sends a single native or ERC-20 transfer and returns its hash.
    ///
    /// # Errors
    ///
    /// Resolution errors, [`Error::InvalidSigner`], or
    /// [`Error::OnChainCallFailed`].
    pub async fn send_direct(&self, transfer: &DirectTransfer) -> Result<TxHash, Error> {
        let recipient = self.resolve(&transfer.recipient).await?;
        require_connected(self.signer.as_ref())?;
        let tx = match transfer.token {
            Some(token) => {
                let call = IERC20::transferCall {
                    to: recipient,
                    amount: transfer.amount,
                };
                MetaTransaction::call(token, Bytes::from(call.abi_encode()))
            }
            None => MetaTransaction::transfer(recipient, transfer.amount),
        };
        let tx_hash = send_checked(self.signer.as_ref(), "transfer", tx).await?;
        #[cfg(feature = "telemetry")]
        tracing::info!(%recipient, tx = %tx_hash, "direct transfer sent");
        Ok(tx_hash)
    }

    /// Enters the state machine: resolves the recipient and fetches a quote.
    ///
    /// # Errors
    ///
    /// Resolution errors or [`Error::QuoteUnavailable`].
    pub async fn quote(&self, request: &SettlementRequest) -> Result<SettlementStage, Error> {
        let quote = self.fetch_quote(request).await?;
        Ok(SettlementStage::Quoted { quote })
    }

    async fn fetch_quote(&self, request: &SettlementRequest) -> Result<Quote, Error> {
        let recipient = self.resolve(&request.recipient).await?;
        let quote_request = QuoteRequest {
            recipient,
            amount_usd: request.amount_usd,
            user: self.signer.address(),
            platform: request.platform.clone(),
            chain_id: request.chain_id,
            destination_token: request.destination_token,
        };
        self.quotes.get_quote(&quote_request).await
    }

    /// Performs exactly one transition.
    ///
    /// `authorizer` is only consulted when leaving `Quoted`. A `Fulfilled`
    /// stage is returned unchanged.
    ///
    /// # Errors
    ///
    /// The error of the failing stage, unmodified. Leaving `Quoted` without an
    /// authorizer fails with [`Error::VerificationFailed`].
    pub async fn advance(
        &self,
        stage: SettlementStage,
        authorizer: Option<&dyn IntentAuthorizer>,
    ) -> Result<SettlementStage, Error> {
        let next = match stage {
            SettlementStage::Quoted { quote } => {
                let authorizer = authorizer.ok_or_else(|| {
                    Error::VerificationFailed("no intent authorizer configured".to_owned())
                })?;
                let mut descriptor = quote.intent.clone();
                descriptor.to_address = self.resolve(&descriptor.to_address).await?.to_string();
                let verified = authorizer.authorize(&descriptor).await?;
                SettlementStage::Verified { quote, verified }
            }
            SettlementStage::Verified { quote, verified } => {
                let intent_hash = self
                    .escrow
                    .signal_intent(self.signer.as_ref(), &verified)
                    .await?;
                SettlementStage::Signaled {
                    intent_hash,
                    payment_method: quote.payment_method,
                }
            }
            SettlementStage::Signaled {
                intent_hash,
                payment_method,
            } => {
                if let Some(options) = self.agent_wait {
                    wait_for_agent(Some(self.proofs.host()), options).await;
                }
                let proof = self
                    .proofs
                    .generate(intent_hash, &payment_method, 0)
                    .await?;
                SettlementStage::Proven { intent_hash, proof }
            }
            SettlementStage::Proven { intent_hash, proof } => {
                let transaction_hash = self
                    .escrow
                    .fulfill_intent(self.signer.as_ref(), &proof, intent_hash)
                    .await?;
                SettlementStage::Fulfilled {
                    intent_hash,
                    transaction_hash,
                }
            }
            fulfilled @ SettlementStage::Fulfilled { .. } => fulfilled,
        };
        #[cfg(feature = "telemetry")]
        tracing::info!(stage = next.name(), "settlement advanced");
        Ok(next)
    }

    /// Runs the whole off-chain fiat flow, from quote to release.
    ///
    /// # Errors
    ///
    /// The error of the first failing stage, unmodified.
    pub async fn run(
        &self,
        request: &SettlementRequest,
        authorizer: &dyn IntentAuthorizer,
    ) -> Result<Settlement, Error> {
        let mut stage = self.quote(request).await?;
        while !stage.is_terminal() {
            stage = self.advance(stage, Some(authorizer)).await?;
        }
        settlement(stage)
    }

    /// Runs the flow up to on-chain registration and hands control back.
    ///
    /// # Errors
    ///
    /// The error of the first failing stage, unmodified.
    pub async fn begin(
        &self,
        request: &SettlementRequest,
        authorizer: &dyn IntentAuthorizer,
    ) -> Result<PendingSettlement, Error> {
        let quote = self.fetch_quote(request).await?;
        let pending = PendingSettlement {
            intent_hash: IntentHash::ZERO,
            payment_method: quote.payment_method.clone(),
            payee_address: quote.payee_address.clone(),
            fiat_amount_formatted: quote.fiat_amount_formatted.clone(),
            token_amount_formatted: quote.token_amount_formatted.clone(),
        };
        let verified = self
            .advance(SettlementStage::Quoted { quote }, Some(authorizer))
            .await?;
        match self.advance(verified, None).await? {
            SettlementStage::Signaled { intent_hash, .. } => Ok(PendingSettlement {
                intent_hash,
                ..pending
            }),
            other => Err(Error::on_chain(
                "signalIntent",
                format!("unexpected stage {}", other.name()),
            )),
        }
    }

    /// Proves the fiat payment for a registered intent and releases the funds.
    ///
    /// # Errors
    ///
    /// The error of the first failing stage, unmodified.
    pub async fn complete(
        &self,
        intent_hash: IntentHash,
        payment_method: &str,
    ) -> Result<Settlement, Error> {
        let mut stage = SettlementStage::Signaled {
            intent_hash,
            payment_method: payment_method.to_owned(),
        };
        while !stage.is_terminal() {
            stage = self.advance(stage, None).await?;
        }
        settlement(stage)
    }

    /// Pays a 402 challenge and returns the proof to retry with.
    ///
    /// The body is validated before anything touches the network. Fiat
    /// settlement is used when `options.use_offchain` is set, the server
    /// enables it, and a verify URL is known (the challenge's first, then
    /// `options.verify_url`); `make_authorizer` turns that URL into an
    /// authorizer. Otherwise `amountWei` (default zero) is sent natively.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedChallengeBody`] for an invalid body, otherwise the
    /// error of the chosen path.
    pub async fn handle_challenge<A, F>(
        &self,
        body: &Value,
        options: &ChallengeOptions,
        make_authorizer: F,
    ) -> Result<PaymentProof, Error>
    where
        A: IntentAuthorizer,
        F: FnOnce(&str) -> Result<A, Error>,
    {
        let body = parse_challenge(body)?;
        let recipient = self.resolve(&body.recipient).await?;

        let verify_url = body.verify_url().or(options.verify_url.as_deref());
        if let Some(verify_url) = verify_url.filter(|_| options.use_offchain && body.fiat_enabled())
        {
            let authorizer = make_authorizer(verify_url)?;
            let request = SettlementRequest {
                recipient: recipient.to_string(),
                amount_usd: parse_amount_formatted(body.amount_formatted.as_deref()),
                platform: None,
                chain_id: Some(body.chain_id),
                destination_token: None,
            };
            let settlement = self.run(&request, &authorizer).await?;
            return Ok(PaymentProof {
                kind: ProofKind::Zkp2p,
                chain_id: body.chain_id,
                tx_hash: settlement.transaction_hash,
                recipient: Some(recipient),
                amount: None,
            });
        }

        let amount = match body.amount_wei.as_deref() {
            Some(wei) => wei
                .parse::<U256>()
                .map_err(|_| Error::InvalidAmount(format!("amountWei {wei}")))?,
            None => U256::ZERO,
        };
        let tx_hash = self
            .send_direct(&DirectTransfer {
                recipient: recipient.to_string(),
                amount,
                token: None,
            })
            .await?;
        Ok(PaymentProof {
            kind: ProofKind::Crypto,
            chain_id: body.chain_id,
            tx_hash,
            recipient: Some(recipient),
            amount: body.amount_wei,
        })
    }
}

fn settlement(stage: SettlementStage) -> Result<Settlement, Error> {
    match stage {
        SettlementStage::Fulfilled {
            intent_hash,
            transaction_hash,
        } => Ok(Settlement {
            intent_hash,
            transaction_hash,
        }),
        other => Err(Error::on_chain(
            "fulfillIntent",
            format!("settlement stopped at {}", other.name()),
        )),
    }
}
