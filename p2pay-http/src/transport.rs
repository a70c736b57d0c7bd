//! Shared JSON-over-HTTP plumbing for the service clients.
//!
//! Every client holds one [`HttpTransport`]: a `reqwest` client plus the
//! headers and timeout applied to each request. Responses come back as a
//! [`Reply`] so each client can map a non-success status onto its own error
//! kind.

use std::fmt::Display;
use std::time::Duration;

use http::{HeaderMap, Method, StatusCode};
use p2pay::Error;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::Span;

/// A decoded success body, or the status and text of a failed response.
#[derive(Debug)]
pub(crate) enum Reply<R> {
    Ok(R),
    Status { status: StatusCode, body: String },
}

/// Request defaults shared by every call a client makes.
#[derive(Clone, Debug, Default)]
pub(crate) struct HttpTransport {
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl HttpTransport {
    pub(crate) fn set_headers(&mut self, headers: HeaderMap) {
        self.headers = headers;
    }

    pub(crate) const fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    pub(crate) const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Starts a request carrying the configured headers and timeout.
    pub(crate) fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        let mut req = self.client.request(method, url.clone());
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        req
    }

    /// Sends `req` and decodes a 2xx body as `R`.
    ///
    /// `context` names the endpoint in errors and spans (e.g. `"POST /verify/intent"`).
    pub(crate) async fn send_json<R>(
        &self,
        req: RequestBuilder,
        context: &'static str,
    ) -> Result<Reply<R>, Error>
    where
        R: DeserializeOwned,
    {
        let result = Self::send_inner(req, context).await;
        record_result_on_span(&result);
        result
    }

    async fn send_inner<R>(req: RequestBuilder, context: &'static str) -> Result<Reply<R>, Error>
    where
        R: DeserializeOwned,
    {
        let response = req.send().await.map_err(|e| Error::http(context, e))?;
        let status = response.status();
        if status.is_success() {
            let body = response
                .json::<R>()
                .await
                .map_err(|e| Error::http(context, e))?;
            Ok(Reply::Ok(body))
        } else {
            let body = response.text().await.map_err(|e| Error::http(context, e))?;
            Ok(Reply::Status { status, body })
        }
    }
}

/// Parses a service base URL, normalizing it to end in exactly one slash so
/// that relative endpoint paths join under it.
pub(crate) fn parse_base_url(value: &str) -> Result<Url, Error> {
    let mut normalized = value.trim_end_matches('/').to_owned();
    normalized.push('/');
    Url::parse(&normalized).map_err(|e| Error::http("parse base URL", e))
}

/// Joins a relative endpoint path onto a normalized base URL.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, Error> {
    base.join(path).map_err(|e| Error::http("construct endpoint URL", e))
}

#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "request failed");
        }
    }
}

#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}
