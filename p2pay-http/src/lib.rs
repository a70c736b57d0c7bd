#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP clients for the services a fiat settlement depends on.
//!
//! - [`QuoteClient`] fetches exact-fiat quotes and implements [`p2pay::QuoteSource`].
//! - [`IntentVerifierClient`] signs intents with an API key; run it only in a
//!   trusted backend.
//! - [`RemoteIntentVerifier`] forwards intents to such a backend.
//! - [`HttpNotaryAgent`] and [`HttpAgentHost`] reach a locally installed
//!   notarization agent.
//!
//! Every client accepts `with_headers` and `with_timeout`; requests have no
//! timeout unless one is set.
//!
//! # Feature Flags
//!
//! - `telemetry` - `tracing` spans around each request
//!
pub mod agent;
pub mod quote;
mod transport;
pub mod verify;

pub use agent::{HttpAgentHost, HttpNotaryAgent};
pub use quote::QuoteClient;
pub use verify::{ApiKey, IntentVerifierClient, RemoteIntentVerifier};
