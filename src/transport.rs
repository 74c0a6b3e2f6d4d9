// Copyright 2021 Dmitry Tantsur <dtantsur@protonmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Low-level HTTP transport: one JSON or binary request/response cycle.

use std::fmt::Debug;
#[cfg(any(feature = "native-tls", feature = "rustls"))]
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use log::{trace, warn};
#[cfg(any(feature = "native-tls", feature = "rustls"))]
use reqwest::Certificate;
use reqwest::{Client, Method, StatusCode, Url};
use static_assertions::assert_obj_safe;

use super::request::{http_error, RequestData};
use super::retry::{Decision, RetryPolicy};
use super::{Error, ErrorKind};

/// Content type of JSON requests.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// Content type of binary requests.
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";
/// Default timeout of a single request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const GOOSE_AGENT: &str = concat!("goose (", env!("CARGO_PKG_VERSION"), ")");

/// Name of the authentication token header.
pub static X_AUTH_TOKEN: HeaderName = HeaderName::from_static("x-auth-token");

/// Strategy for building request headers.
///
/// Services differ in the headers they want, so the transport does not hardcode them.
pub trait HeadersProvider: Debug + Send + Sync {
    /// Build headers for a request.
    ///
    /// `extra` are the caller-supplied headers, `content_type` depends on the request kind,
    /// `has_payload` tells whether a body is sent.
    fn headers(
        &self,
        method: &Method,
        extra: &HeaderMap,
        content_type: &'static str,
        token: Option<&str>,
        has_payload: bool,
    ) -> HeaderMap;
}

assert_obj_safe!(HeadersProvider);

/// Default headers.
///
/// Sets `User-Agent`, then the caller-supplied headers, then `X-Auth-Token` (if a token is
/// present), `Content-Type` (if a payload is present) and `Accept` unless the caller has
/// provided them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHeaders;

impl HeadersProvider for DefaultHeaders {
    fn headers(
        &self,
        _method: &Method,
        extra: &HeaderMap,
        content_type: &'static str,
        token: Option<&str>,
        has_payload: bool,
    ) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(USER_AGENT, HeaderValue::from_static(GOOSE_AGENT));
        for name in extra.keys() {
            let _ = headers.remove(name);
            for value in extra.get_all(name) {
                let _ = headers.append(name.clone(), value.clone());
            }
        }

        if let Some(token) = token {
            match HeaderValue::from_str(token) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    let _ = headers.insert(X_AUTH_TOKEN.clone(), value);
                }
                Err(e) => warn!("Token cannot be used as a header value: {}", e),
            }
        }

        if has_payload && !headers.contains_key(CONTENT_TYPE) {
            let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        if !headers.contains_key(ACCEPT) {
            let _ = headers.insert(ACCEPT, HeaderValue::from_static(content_type));
        }
        headers
    }
}

/// HTTP client sending JSON and binary requests.
///
/// Wraps a `reqwest::Client` (and thus its connection pool). Uses `Arc` internally and should
/// be reused when possible by cloning it.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    headers: Arc<dyn HeadersProvider>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Default for HttpClient {
    fn default() -> HttpClient {
        HttpClient::new(Client::new())
    }
}

impl HttpClient {
    /// Create a transport around an existing HTTP client.
    pub fn new(client: Client) -> HttpClient {
        HttpClient {
            client,
            headers: Arc::new(DefaultHeaders),
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Use a different headers provider.
    #[inline]
    pub fn with_headers_provider<H: HeadersProvider + 'static>(mut self, provider: H) -> Self {
        self.headers = Arc::new(provider);
        self
    }

    /// Use a shared headers provider.
    #[inline]
    pub(crate) fn with_shared_headers_provider(mut self, provider: Arc<dyn HeadersProvider>) -> Self {
        self.headers = provider;
        self
    }

    /// Use a different retry policy.
    #[inline]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Use a different timeout for each request.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get a reference to the inner HTTP client.
    #[inline]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Retry policy in use.
    #[inline]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Timeout of each request.
    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a JSON request.
    ///
    /// Sends `req_value` (if any) as the body, stores the status and headers in `data` and
    /// decodes the response into `resp_value` when `expect_json` is set.
    pub async fn json_request(
        &self,
        method: Method,
        url: &str,
        token: Option<&str>,
        data: &mut RequestData,
    ) -> Result<(), Error> {
        data.reset_response();
        let body = match data.req_value {
            Some(ref value) => Some(Bytes::from(serde_json::to_vec(value).map_err(|e| {
                Error::new(
                    ErrorKind::InvalidInput,
                    format!("failed marshalling the request body: {}", e),
                )
            })?)),
            None => None,
        };
        let headers = self.headers.headers(
            &method,
            &data.req_headers,
            CONTENT_TYPE_JSON,
            token.filter(|t| !t.is_empty()),
            body.is_some(),
        );

        let (status, resp_headers, raw) = self.send(method, url, headers, body, data).await?;
        data.resp_status = Some(status);
        data.resp_headers = resp_headers;
        if data.expect_json && !raw.is_empty() {
            let value = serde_json::from_slice(&raw).map_err(|e| {
                Error::new(
                    ErrorKind::MalformedResponse,
                    format!(
                        "failed unmarshaling the response body from {}: {}: {}",
                        url,
                        e,
                        String::from_utf8_lossy(&raw)
                    ),
                )
                .with_status(status)
            })?;
            data.resp_value = Some(value);
        }
        Ok(())
    }

    /// Send a binary request.
    ///
    /// Sends `req_data` (if any) as the body, stores the status, headers and the raw body in
    /// `data`.
    pub async fn binary_request(
        &self,
        method: Method,
        url: &str,
        token: Option<&str>,
        data: &mut RequestData,
    ) -> Result<(), Error> {
        data.reset_response();
        let body = data.req_data.clone();
        let has_payload = body.as_ref().map(|b| !b.is_empty()).unwrap_or(false);
        let headers = self.headers.headers(
            &method,
            &data.req_headers,
            CONTENT_TYPE_OCTET_STREAM,
            token.filter(|t| !t.is_empty()),
            has_payload,
        );

        let (status, resp_headers, raw) = self.send(method, url, headers, body, data).await?;
        data.resp_status = Some(status);
        data.resp_headers = resp_headers;
        data.resp_data = Some(raw);
        Ok(())
    }

    /// Send a request, retrying if rate limited, and check the resulting status.
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<Bytes>,
        data: &RequestData,
    ) -> Result<(StatusCode, HeaderMap, Bytes), Error> {
        let mut full_url = Url::parse(url).map_err(|e| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("failed creating the request {}: {}", url, e),
            )
        })?;
        if !data.params.is_empty() {
            let _ = full_url.query_pairs_mut().extend_pairs(&data.params);
        }

        let mut waited = Duration::ZERO;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut builder = self
                .client
                .request(method.clone(), full_url.clone())
                .headers(headers.clone())
                .timeout(self.timeout);
            if let Some(ref body) = body {
                builder = builder.body(body.clone());
            }

            trace!("Sending HTTP {} request to {}", method, full_url);
            let response = builder
                .send()
                .await
                .map_err(|e| request_error(&method, &full_url, e))?;
            let status = response.status();
            let resp_headers = response.headers().clone();
            // Always read the body to the end so that the connection can be reused.
            let raw = response
                .bytes()
                .await
                .map_err(|e| request_error(&method, &full_url, e))?;
            trace!(
                "HTTP {} request to {} returned {}",
                method,
                full_url,
                status
            );

            let decision = self
                .retry
                .decide(full_url.as_str(), status, &resp_headers, attempt, waited)
                .map_err(|e| {
                    e.with_status(status).with_response(
                        resp_headers.clone(),
                        String::from_utf8_lossy(&raw).into_owned(),
                    )
                })?;
            match decision {
                Decision::Accept => {
                    return if data.is_expected(status) {
                        Ok((status, resp_headers, raw))
                    } else {
                        Err(http_error(full_url.as_str(), status, resp_headers, raw))
                    };
                }
                Decision::Retry(delay) => {
                    warn!(
                        "Too many requests to {} (status {}), retrying in {:?} (attempt {} of {})",
                        full_url,
                        status,
                        delay,
                        attempt + 1,
                        self.retry.max_attempts()
                    );
                    tokio::time::sleep(delay).await;
                    waited += delay;
                }
            }
        }
    }
}

fn request_error(method: &Method, url: &Url, error: reqwest::Error) -> Error {
    Error::from(error).context(format!("failed executing the request {} {}", method, url))
}

/// Create an HTTP client with the provided CA certificate and verification mode.
#[allow(unused_mut)] // mut builder unused with --no-default-features
pub(crate) fn build_client(cacert: Option<&Path>, insecure: bool) -> Result<Client, Error> {
    let mut builder = Client::builder();
    #[cfg(any(feature = "native-tls", feature = "rustls"))]
    {
        if let Some(cert_path) = cacert {
            let cert_content = fs::read(cert_path).map_err(|e| {
                Error::new(
                    ErrorKind::InvalidConfig,
                    format!("Cannot open cacert file {}: {}", cert_path.display(), e),
                )
            })?;

            let cert = Certificate::from_pem(&cert_content).map_err(|e| {
                Error::new(
                    ErrorKind::InvalidConfig,
                    format!("Cannot parse {} as PEM: {}", cert_path.display(), e),
                )
            })?;

            builder = builder.add_root_certificate(cert);
        }

        if insecure {
            warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    #[cfg(not(any(feature = "native-tls", feature = "rustls")))]
    if cacert.is_some() || insecure {
        return Err(Error::new(
            ErrorKind::InvalidConfig,
            "TLS support is disabled",
        ));
    }

    builder.build().map_err(|e| {
        Error::new(
            ErrorKind::InvalidConfig,
            format!("Cannot initialize HTTP backend: {}", e),
        )
    })
}

#[cfg(test)]
#[allow(missing_docs)]
pub mod test {
    use http::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
    use reqwest::Method;

    use super::{
        build_client, DefaultHeaders, HeadersProvider, CONTENT_TYPE_JSON,
        CONTENT_TYPE_OCTET_STREAM, X_AUTH_TOKEN,
    };
    use crate::ErrorKind;

    #[test]
    fn test_default_headers_json() {
        let headers =
            DefaultHeaders.headers(&Method::POST, &HeaderMap::new(), CONTENT_TYPE_JSON, Some("tok"), true);
        assert!(headers[USER_AGENT].to_str().unwrap().starts_with("goose ("));
        assert_eq!(headers[&X_AUTH_TOKEN], "tok");
        assert!(headers[&X_AUTH_TOKEN].is_sensitive());
        assert_eq!(headers[CONTENT_TYPE], CONTENT_TYPE_JSON);
        assert_eq!(headers[ACCEPT], CONTENT_TYPE_JSON);
    }

    #[test]
    fn test_default_headers_no_payload_no_token() {
        let headers = DefaultHeaders.headers(
            &Method::GET,
            &HeaderMap::new(),
            CONTENT_TYPE_OCTET_STREAM,
            None,
            false,
        );
        assert!(!headers.contains_key(&X_AUTH_TOKEN));
        assert!(!headers.contains_key(CONTENT_TYPE));
        assert_eq!(headers[ACCEPT], CONTENT_TYPE_OCTET_STREAM);
    }

    #[test]
    fn test_default_headers_extra_override() {
        let mut extra = HeaderMap::new();
        let _ = extra.insert(ACCEPT, HeaderValue::from_static("text/plain"));
        let _ = extra.insert(USER_AGENT, HeaderValue::from_static("my-tool"));
        let _ = extra.append("x-object-meta-a", HeaderValue::from_static("1"));
        let _ = extra.append("x-object-meta-a", HeaderValue::from_static("2"));
        let headers =
            DefaultHeaders.headers(&Method::PUT, &extra, CONTENT_TYPE_OCTET_STREAM, Some("t"), true);
        assert_eq!(headers[ACCEPT], "text/plain");
        assert_eq!(headers[USER_AGENT], "my-tool");
        assert_eq!(headers.get_all("x-object-meta-a").iter().count(), 2);
        assert_eq!(headers[CONTENT_TYPE], CONTENT_TYPE_OCTET_STREAM);
    }

    #[test]
    fn test_build_client_missing_cacert() {
        let err = build_client(Some("/nonexistent/ca.pem".as_ref()), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }
}
