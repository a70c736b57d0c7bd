//! Client for the exact-fiat quote service.
//!
//! [`QuoteClient`] implements [`QuoteSource`]: it converts the requested
//! dollar amount to fiat millionths, asks `POST /quote/exact-fiat` for offers,
//! and returns the first one.

use std::time::Duration;

use alloy_primitives::{Address, address};
use http::{HeaderMap, Method};
use p2pay::amount::usd_to_millionths;
use p2pay::service::BoxFuture;
use p2pay::{Error, Quote, QuoteRequest, QuoteSource};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::transport::{HttpTransport, Reply, endpoint, parse_base_url};

/// Public quote API.
pub const DEFAULT_QUOTE_API_URL: &str = "https://api.zkp2p.xyz/v1";

/// Chain quoted when the request names none (Base).
pub const DEFAULT_DESTINATION_CHAIN_ID: u64 = 8453;

/// Token quoted when the request names none (USDC on Base).
pub const DEFAULT_DESTINATION_TOKEN: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// Platforms offered when the request names none.
pub const DEFAULT_PAYMENT_PLATFORMS: [&str; 2] = ["venmo", "cashapp"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExactFiatQuoteBody {
    payment_platforms: Vec<String>,
    fiat_currency: &'static str,
    user: Address,
    recipient: Address,
    destination_chain_id: u64,
    destination_token: Address,
    exact_fiat_amount: String,
}

impl ExactFiatQuoteBody {
    fn from_request(request: &QuoteRequest) -> Result<Self, Error> {
        let payment_platforms = request.platform.as_ref().map_or_else(
            || DEFAULT_PAYMENT_PLATFORMS.map(str::to_owned).to_vec(),
            |platform| vec![platform.to_lowercase()],
        );
        Ok(Self {
            payment_platforms,
            fiat_currency: "USD",
            user: request.user,
            recipient: request.recipient,
            destination_chain_id: request.chain_id.unwrap_or(DEFAULT_DESTINATION_CHAIN_ID),
            destination_token: request.destination_token.unwrap_or(DEFAULT_DESTINATION_TOKEN),
            exact_fiat_amount: usd_to_millionths(request.amount_usd)?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    response_object: Option<serde_json::Value>,
}

/// Entries stay raw so that only the first one has to be well-formed.
#[derive(Debug, Deserialize)]
struct QuoteList {
    #[serde(default)]
    quotes: Vec<serde_json::Value>,
}

fn unavailable(message: impl Into<String>) -> Error {
    Error::QuoteUnavailable {
        status: None,
        message: message.into(),
    }
}

impl QuoteEnvelope {
    fn into_first_quote(self) -> Result<Quote, Error> {
        if self.success != Some(true) {
            return Err(unavailable("quote service reported failure"));
        }
        let list: QuoteList = self
            .response_object
            .map(serde_json::from_value::<QuoteList>)
            .transpose()
            .map_err(|e| unavailable(format!("malformed quote list: {e}")))?
            .ok_or_else(|| unavailable("no quotes returned"))?;
        let first = list
            .quotes
            .into_iter()
            .next()
            .ok_or_else(|| unavailable("no quotes returned"))?;
        serde_json::from_value(first).map_err(|e| unavailable(format!("malformed quote: {e}")))
    }
}

/// A client for the quote service.
#[derive(Clone, Debug)]
pub struct QuoteClient {
    base_url: Url,
    quote_url: Url,
    transport: HttpTransport,
}

impl QuoteClient {
    /// Constructs a client for the service rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the base URL is invalid.
    pub fn try_new(base_url: &str) -> Result<Self, Error> {
        let base_url = parse_base_url(base_url)?;
        let quote_url = endpoint(&base_url, "quote/exact-fiat")?;
        Ok(Self {
            base_url,
            quote_url,
            transport: HttpTransport::default(),
        })
    }

    /// Points the client at a different deployment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the base URL is invalid.
    pub fn with_base_url(self, base_url: &str) -> Result<Self, Error> {
        let mut next = Self::try_new(base_url)?;
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

    /// Returns the base URL used by this client.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the configured timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.transport.timeout()
    }

    /// Fetches the first quote for `request`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAmount`] for a negative amount.
    /// - [`Error::QuoteUnavailable`] for a non-success status, an unsuccessful
    ///   envelope, an empty quote list or a malformed first quote.
    /// - [`Error::Http`] for transport failures and non-JSON bodies.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "p2pay.quote_client.quote", skip_all, err)
    )]
    pub async fn quote(&self, request: &QuoteRequest) -> Result<Quote, Error> {
        let body = ExactFiatQuoteBody::from_request(request)?;
        let req = self.transport.request(Method::POST, &self.quote_url).json(&body);
        match self
            .transport
            .send_json::<QuoteEnvelope>(req, "POST /quote/exact-fiat")
            .await?
        {
            Reply::Ok(envelope) => envelope.into_first_quote(),
            Reply::Status { status, body } => Err(Error::QuoteUnavailable {
                status: Some(status.as_u16()),
                message: body,
            }),
        }
    }
}

impl Default for QuoteClient {
    fn default() -> Self {
        Self::try_new(DEFAULT_QUOTE_API_URL).expect("default quote URL is valid")
    }
}

impl QuoteSource for QuoteClient {
    fn get_quote<'a>(&'a self, request: &'a QuoteRequest) -> BoxFuture<'a, Result<Quote, Error>> {
        Box::pin(self.quote(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(amount_usd: Decimal, platform: Option<&str>) -> QuoteRequest {
        QuoteRequest {
            recipient: Address::repeat_byte(0x11),
            amount_usd,
            user: Address::repeat_byte(0x22),
            platform: platform.map(str::to_owned),
            chain_id: None,
            destination_token: None,
        }
    }

    fn quote_json() -> serde_json::Value {
        json!({
            "fiatAmount": "5000000",
            "fiatAmountFormatted": "5.00",
            "tokenAmount": "4950000",
            "tokenAmountFormatted": "4.95",
            "paymentMethod": "venmo",
            "payeeAddress": "@maker",
            "conversionRate": "1.01",
            "intent": {
                "depositId": "42",
                "processorName": "venmo",
                "amount": "4950000",
                "toAddress": "0x1111111111111111111111111111111111111111",
                "payeeDetails": "0xabc",
                "fiatCurrencyCode": "USD",
                "chainId": "8453"
            }
        })
    }

    #[tokio::test]
    async fn test_quote_request_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/quote/exact-fiat"))
            .and(body_partial_json(json!({
                "paymentPlatforms": ["venmo", "cashapp"],
                "fiatCurrency": "USD",
                "destinationChainId": 8453,
                "exactFiatAmount": "5000000",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "responseObject": {"quotes": [quote_json(), quote_json()]},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = QuoteClient::try_new(&format!("{}/v1", server.uri())).unwrap();
        let quote = client.quote(&request(Decimal::from(5), None)).await.unwrap();
        assert_eq!(quote.fiat_amount, "5000000");
        assert_eq!(quote.intent.deposit_id, "42");
        assert_eq!(quote.payee_address, "@maker");
    }

    #[tokio::test]
    async fn test_explicit_platform_is_lowercased_and_alone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "paymentPlatforms": ["venmo"],
                "exactFiatAmount": "1234568",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "responseObject": {"quotes": [quote_json()]},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = QuoteClient::try_new(&server.uri()).unwrap();
        client
            .quote(&request(Decimal::new(12_345_675, 7), Some("Venmo")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejected_request_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad amount"))
            .mount(&server)
            .await;

        let client = QuoteClient::try_new(&server.uri()).unwrap();
        let err = client
            .quote(&request(Decimal::from(5), None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::QuoteUnavailable { status: Some(400), ref message } if message == "bad amount"
        ));
    }

    #[tokio::test]
    async fn test_empty_quotes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "responseObject": {"quotes": []},
            })))
            .mount(&server)
            .await;

        let client = QuoteClient::try_new(&server.uri()).unwrap();
        let err = client
            .quote(&request(Decimal::from(5), None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuoteUnavailable { status: None, .. }));
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "responseObject": {"quotes": [quote_json()]},
            })))
            .mount(&server)
            .await;

        let client = QuoteClient::try_new(&server.uri()).unwrap();
        assert!(matches!(
            client.quote(&request(Decimal::from(5), None)).await,
            Err(Error::QuoteUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_with_error_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "responseObject": {"error": "no liquidity"},
            })))
            .mount(&server)
            .await;

        let client = QuoteClient::try_new(&server.uri()).unwrap();
        assert!(matches!(
            client.quote(&request(Decimal::from(5), None)).await,
            Err(Error::QuoteUnavailable { status: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_first_quote() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "responseObject": {"quotes": [{"fiatAmount": "5000000"}, quote_json()]},
            })))
            .mount(&server)
            .await;

        let client = QuoteClient::try_new(&server.uri()).unwrap();
        let err = client
            .quote(&request(Decimal::from(5), None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::QuoteUnavailable { status: None, ref message } if message.starts_with("malformed quote")
        ));
    }

    #[tokio::test]
    async fn test_only_first_quote_is_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "responseObject": {"quotes": [quote_json(), {"ignored": true}]},
            })))
            .mount(&server)
            .await;

        let client = QuoteClient::try_new(&server.uri()).unwrap();
        let quote = client.quote(&request(Decimal::from(5), None)).await.unwrap();
        assert_eq!(quote.payment_method, "venmo");
    }

    #[tokio::test]
    async fn test_oversized_amount_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = QuoteClient::try_new(&server.uri()).unwrap();
        let err = client
            .quote(&request(Decimal::MAX, None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn test_negative_amount_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = QuoteClient::try_new(&server.uri()).unwrap();
        let err = client
            .quote(&request(Decimal::from(-1), None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn test_custom_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("x-client", "p2pay"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "responseObject": {"quotes": [quote_json()]},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-client", "p2pay".parse().unwrap());
        let client = QuoteClient::try_new(&server.uri())
            .unwrap()
            .with_headers(headers)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(client.timeout(), Some(Duration::from_secs(5)));
        client.quote(&request(Decimal::from(5), None)).await.unwrap();
    }

    #[test]
    fn test_default_base_url() {
        assert_eq!(
            QuoteClient::default().base_url().as_str(),
            "https://api.zkp2p.xyz/v1/"
        );
    }
}
