#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for fiat-to-escrow payment settlement.
//!
//! This crate holds the chain-agnostic half of the settlement protocol: the
//! data that flows between stages, the shared error taxonomy, and the
//! abstractions the chain and HTTP crates plug into.
//!
//! # Overview
//!
//! A payer pays a recipient in fiat (Venmo, Cash App, ...) and the recipient
//! receives tokens from an on-chain escrow. The flow is:
//!
//! 1. resolve the recipient to a canonical address;
//! 2. fetch a quote and an intent descriptor from the quote service;
//! 3. have the trusted verifier sign the intent;
//! 4. register the signed intent on the escrow, yielding an intent hash;
//! 5. obtain a notarized proof of the fiat payment from the local agent;
//! 6. submit the proof to the escrow to release the funds.
//!
//! Steps 4 and 6 live in `p2pay-evm`; the HTTP services behind steps 2, 3 and
//! 5 live in `p2pay-http`.
//!
//! # Modules
//!
//! - [`agent`] - Notarization agent abstraction and the availability waiter
//! - [`amount`] - Fiat amount conversions
//! - [`challenge`] - The versioned 402 challenge/response contract
//! - [`error`] - Shared error type
//! - [`proof`] - Proof generation and canonical byte encoding
//! - [`record`] - Per-account payment records
//! - [`resolver`] - Recipient name resolution
//! - [`service`] - Quote and verification service seams
//! - [`timestamp`] - Unix timestamps
//! - [`types`] - Quotes, intents and verified intents
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod agent;
pub mod amount;
pub mod challenge;
pub mod error;
pub mod proof;
pub mod record;
pub mod resolver;
pub mod service;
pub mod timestamp;
pub mod types;

pub use error::Error;
pub use proof::{EncodedProof, ProofGenerator};
pub use resolver::{AddressResolver, DefaultResolver, NameResolver};
pub use service::{IntentAuthorizer, QuoteSource};
pub use types::{IntentData, IntentDescriptor, IntentHash, Quote, QuoteRequest, VerifiedIntent};
