//! Intent verification clients.
//!
//! Two ways to turn an intent descriptor into a signed intent:
//!
//! - [`IntentVerifierClient`] calls the verifier directly with an API key.
//!   The key must never reach the payer, so this client belongs in a trusted
//!   backend such as `p2pay-gateway`.
//! - [`RemoteIntentVerifier`] posts the descriptor to such a backend and
//!   accepts its reply either wrapped in `responseObject` or bare.

use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;

use http::{HeaderMap, HeaderValue, Method};
use p2pay::service::BoxFuture;
use p2pay::{Error, IntentAuthorizer, IntentDescriptor, VerifiedIntent};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::quote::DEFAULT_QUOTE_API_URL;
use crate::transport::{HttpTransport, Reply, endpoint, parse_base_url};

/// Header carrying the verifier credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Verifier credential. Redacted in `Debug` and `Display`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a raw key.
    #[must_use]
    pub const fn new(key: String) -> Self {
        Self(key)
    }

    /// Whether the key is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the key is still an unexpanded `$VAR` reference.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.0.starts_with('$')
    }

    fn header_value(&self) -> Result<HeaderValue, Error> {
        let mut value = HeaderValue::from_str(&self.0).map_err(|_| {
            Error::VerificationFailed("API key is not a valid header value".to_owned())
        })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl Debug for ApiKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl Display for ApiKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyIntentBody<'a> {
    processor_name: &'a str,
    deposit_id: &'a str,
    token_amount: &'a str,
    payee_details: &'a str,
    to_address: &'a str,
    fiat_currency_code: &'a str,
    chain_id: &'a str,
}

impl<'a> From<&'a IntentDescriptor> for VerifyIntentBody<'a> {
    fn from(intent: &'a IntentDescriptor) -> Self {
        Self {
            processor_name: &intent.processor_name,
            deposit_id: &intent.deposit_id,
            token_amount: &intent.amount,
            payee_details: &intent.payee_details,
            to_address: &intent.to_address,
            fiat_currency_code: &intent.fiat_currency_code,
            chain_id: &intent.chain_id,
        }
    }
}

/// The payload stays raw until `success` is known, so a refusal carrying an
/// error object is reported as a refusal.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    response_object: Option<serde_json::Value>,
}

impl VerifyEnvelope {
    fn into_verified(self) -> Result<VerifiedIntent, Error> {
        if self.success != Some(true) {
            let detail = self
                .response_object
                .map(|payload| payload.to_string())
                .unwrap_or_default();
            return Err(Error::VerificationFailed(
                format!("verifier refused the intent {detail}")
                    .trim_end()
                    .to_owned(),
            ));
        }
        let payload = self.response_object.ok_or_else(|| {
            Error::VerificationFailed("verifier returned no signed intent".to_owned())
        })?;
        serde_json::from_value(payload)
            .map_err(|e| Error::VerificationFailed(format!("malformed signed intent: {e}")))
    }
}

/// Direct client for `POST /verify/intent`.
#[derive(Clone, Debug)]
pub struct IntentVerifierClient {
    verify_url: Url,
    api_key: ApiKey,
    transport: HttpTransport,
}

impl IntentVerifierClient {
    /// A client for the public verifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the default URL cannot be parsed.
    pub fn new(api_key: ApiKey) -> Result<Self, Error> {
        Self::with_api(DEFAULT_QUOTE_API_URL, api_key)
    }

    /// A client for the verifier rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the base URL is invalid.
    pub fn with_api(base_url: &str, api_key: ApiKey) -> Result<Self, Error> {
        let base_url = parse_base_url(base_url)?;
        Ok(Self {
            verify_url: endpoint(&base_url, "verify/intent")?,
            api_key,
            transport: HttpTransport::default(),
        })
    }

    /// Points the client at a different deployment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the base URL is invalid.
    pub fn with_base_url(self, base_url: &str) -> Result<Self, Error> {
        let mut next = Self::with_api(base_url, self.api_key)?;
        next.transport = self.transport;
        Ok(next)
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.transport.set_headers(headers);
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport.set_timeout(timeout);
        self
    }

    /// The full `verify/intent` URL.
    #[must_use]
    pub const fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// Asks the verifier to sign `intent`.
    ///
    /// # Errors
    ///
    /// [`Error::VerificationFailed`] for a non-success status, an
    /// unsuccessful envelope, or a missing or malformed payload;
    /// [`Error::Http`] for transport failures and non-JSON bodies.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "p2pay.verifier_client.verify", skip_all, err)
    )]
    pub async fn verify(&self, intent: &IntentDescriptor) -> Result<VerifiedIntent, Error> {
        let req = self
            .transport
            .request(Method::POST, &self.verify_url)
            .header(API_KEY_HEADER, self.api_key.header_value()?)
            .json(&VerifyIntentBody::from(intent));
        match self
            .transport
            .send_json::<VerifyEnvelope>(req, "POST /verify/intent")
            .await?
        {
            Reply::Ok(envelope) => envelope.into_verified(),
            Reply::Status { status, body } => {
                Err(Error::VerificationFailed(format!("{status} {body}")))
            }
        }
    }
}

impl IntentAuthorizer for IntentVerifierClient {
    fn authorize<'a>(
        &'a self,
        descriptor: &'a IntentDescriptor,
    ) -> BoxFuture<'a, Result<VerifiedIntent, Error>> {
        Box::pin(self.verify(descriptor))
    }
}

/// A backend reply, wrapped or bare.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BackendReply {
    Wrapped {
        #[serde(rename = "responseObject")]
        response_object: VerifiedIntent,
    },
    Bare(VerifiedIntent),
}

impl From<BackendReply> for VerifiedIntent {
    fn from(reply: BackendReply) -> Self {
        match reply {
            BackendReply::Wrapped { response_object } => response_object,
            BackendReply::Bare(verified) => verified,
        }
    }
}

/// Authorizes intents through an application backend's verify URL.
#[derive(Clone, Debug)]
pub struct RemoteIntentVerifier {
    url: Url,
    transport: HttpTransport,
}

impl RemoteIntentVerifier {
    /// Posts descriptors to `url` as given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the URL is invalid.
    pub fn try_new(url: &str) -> Result<Self, Error> {
        Ok(Self {
            url: Url::parse(url).map_err(|e| Error::http("parse verify URL", e))?,
            transport: HttpTransport::default(),
        })
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.transport.set_headers(headers);
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport.set_timeout(timeout);
        self
    }

    /// Sends `descriptor` to the backend.
    ///
    /// # Errors
    ///
    /// [`Error::VerificationFailed`] for a non-success status or a reply
    /// that is not a signed intent; [`Error::Http`] for transport failures
    /// and non-JSON bodies.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "p2pay.remote_verifier.verify", skip_all, fields(url = %self.url), err)
    )]
    pub async fn verify(&self, descriptor: &IntentDescriptor) -> Result<VerifiedIntent, Error> {
        let req = self.transport.request(Method::POST, &self.url).json(descriptor);
        match self
            .transport
            .send_json::<serde_json::Value>(req, "POST verify URL")
            .await?
        {
            Reply::Ok(reply) => serde_json::from_value::<BackendReply>(reply)
                .map(VerifiedIntent::from)
                .map_err(|_| {
                    Error::VerificationFailed("backend reply is not a signed intent".to_owned())
                }),
            Reply::Status { status, .. } => Err(Error::VerificationFailed(format!(
                "verify intent failed: {status}"
            ))),
        }
    }
}

impl IntentAuthorizer for RemoteIntentVerifier {
    fn authorize<'a>(
        &'a self,
        descriptor: &'a IntentDescriptor,
    ) -> BoxFuture<'a, Result<VerifiedIntent, Error>> {
        Box::pin(self.verify(descriptor))
    }
}
