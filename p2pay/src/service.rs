//! Seams to the external quote and verification services.
//!
//! The settlement flow only sees these traits; the HTTP clients in
//! `p2pay-http` implement them, and tests swap in scripted doubles.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::types::{IntentDescriptor, Quote, QuoteRequest, VerifiedIntent};

/// Boxed, sendable future returned by the service traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of fiat-to-token quotes.
pub trait QuoteSource: Send + Sync {
    /// Returns the best quote for `request`.
    ///
    /// Fails with [`Error::QuoteUnavailable`] when the service rejects the
    /// request or offers nothing.
    fn get_quote<'a>(&'a self, request: &'a QuoteRequest) -> BoxFuture<'a, Result<Quote, Error>>;
}

/// A party that can authorize an intent for on-chain registration.
///
/// The descriptor's `to_address` is already canonical when this is called.
pub trait IntentAuthorizer: Send + Sync {
    /// Authorizes `descriptor`.
    ///
    /// Fails with [`Error::VerificationFailed`] when the verifier refuses.
    fn authorize<'a>(
        &'a self,
        descriptor: &'a IntentDescriptor,
    ) -> BoxFuture<'a, Result<VerifiedIntent, Error>>;
}

impl<T: QuoteSource + ?Sized> QuoteSource for Arc<T> {
    fn get_quote<'a>(&'a self, request: &'a QuoteRequest) -> BoxFuture<'a, Result<Quote, Error>> {
        self.as_ref().get_quote(request)
    }
}

impl<T: IntentAuthorizer + ?Sized> IntentAuthorizer for Arc<T> {
    fn authorize<'a>(
        &'a self,
        descriptor: &'a IntentDescriptor,
    ) -> BoxFuture<'a, Result<VerifiedIntent, Error>> {
        self.as_ref().authorize(descriptor)
    }
}
