#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EVM support for fiat-to-escrow settlement.
//!
//! This crate puts the core types of [`p2pay`] on chain: it talks to the
//! escrow contract, signs and broadcasts transactions, resolves ENS names,
//! checks payment receipts, and drives the full settlement state machine.
//!
//! # Architecture
//!
//! - [`chains`] - Supported networks, tokens, verifiers and the escrow address
//! - [`contract`] - Solidity interfaces (`sol!` bindings)
//! - [`signer`] - The [`PaymentSigner`] seam and its alloy-backed wallet implementation
//! - [`escrow`] - `signalIntent` / `fulfillIntent`
//! - [`ens`] - ENS name resolution through the mainnet registry
//! - [`receipt`] - Confirms a direct payment from its transaction receipt
//! - [`orchestrator`] - Quote, verify, signal, prove, fulfill
//!
//! # Feature Flags
//!
//! - `telemetry` - `tracing` spans and events for chain interactions
//!
pub mod chains;
pub mod contract;
pub mod ens;
pub mod escrow;
pub mod orchestrator;
pub mod receipt;
pub mod signer;

pub use chains::{ChainConfig, ChainId, TokenInfo, chain_config, supported_chains, verifier_for};
pub use ens::EnsResolver;
pub use escrow::EscrowClient;
pub use orchestrator::{
    ChallengeOptions, DirectTransfer, PaymentOrchestrator, PendingSettlement, Settlement,
    SettlementRequest, SettlementStage,
};
pub use receipt::{PaymentReceiptVerifier, VerifyPaymentTx};
pub use signer::{
    MetaTransaction, PaymentSigner, SignerError, TxOutcome, WalletSigner, WalletSignerConfig,
};
