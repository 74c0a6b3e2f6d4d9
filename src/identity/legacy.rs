// Copyright 2019 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! Legacy header-based authentication.

use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use log::{debug, error};
use reqwest::{Method, StatusCode};
use static_assertions::assert_impl_all;

use super::{AuthDetails, Credentials};
use crate::transport::{HttpClient, X_AUTH_TOKEN};
use crate::{Authenticator, Error, ErrorKind, RequestData};

static X_AUTH_USER: HeaderName = HeaderName::from_static("x-auth-user");
static X_AUTH_KEY: HeaderName = HeaderName::from_static("x-auth-key");
static X_SERVER_MANAGEMENT_URL: HeaderName = HeaderName::from_static("x-server-management-url");
static X_STORAGE_URL: HeaderName = HeaderName::from_static("x-storage-url");

/// Legacy authentication using `X-Auth-User` and `X-Auth-Key` headers.
///
/// The token and the service URLs are returned in the response headers. Only the compute and
/// object-store services are known, both under the empty region.
#[derive(Debug, Clone)]
pub struct Legacy {
    client: HttpClient,
}

assert_impl_all!(Legacy: Send, Sync);

impl Legacy {
    /// Create a legacy authenticator using the provided transport.
    #[inline]
    pub fn new(client: HttpClient) -> Legacy {
        Legacy { client }
    }
}

#[async_trait]
impl Authenticator for Legacy {
    async fn auth(&self, creds: &Credentials) -> Result<AuthDetails, Error> {
        let mut data = RequestData::new()
            .with_header(X_AUTH_USER.clone(), header_value(&creds.user)?)
            .with_header(X_AUTH_KEY.clone(), sensitive(header_value(&creds.secrets)?))
            .with_expected_status(&[StatusCode::OK, StatusCode::NO_CONTENT]);

        debug!("Requesting a legacy token from {}", creds.url);
        self.client
            .binary_request(Method::GET, &creds.url, None, &mut data)
            .await
            .map_err(|e| match e.status() {
                Some(status) if e.kind() != ErrorKind::RateLimited => Error::new(
                    ErrorKind::Unauthorized,
                    format!(
                        "Failed to Authenticate (code {}): {}",
                        status.as_u16(),
                        e.body().unwrap_or_default()
                    ),
                )
                .with_status(status),
                _ => e,
            })?;

        details_from_headers(&data.resp_headers, &creds.url)
    }
}

fn details_from_headers(headers: &HeaderMap, url: &str) -> Result<AuthDetails, Error> {
    let token = header_str(headers, &X_AUTH_TOKEN);
    if token.is_empty() {
        error!("No X-Auth-Token header received from {}", url);
        return Err(Error::new(
            ErrorKind::Unauthorized,
            "Did not get valid Token from auth request",
        ));
    }

    let storage_url = header_str(headers, &X_STORAGE_URL);
    if storage_url.is_empty() {
        error!("No X-Storage-Url header received from {}", url);
        return Err(Error::new(
            ErrorKind::Unauthorized,
            "Did not get valid swift management URL from auth request",
        ));
    }

    let mut details = AuthDetails {
        token: token.to_string(),
        ..AuthDetails::default()
    };
    details.add_service_url("", "compute", header_str(headers, &X_SERVER_MANAGEMENT_URL));
    details.add_service_url("", "object-store", storage_url);
    Ok(details)
}

fn header_str<'h>(headers: &'h HeaderMap, name: &HeaderName) -> &'h str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|e| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("Credentials cannot be sent in a header: {}", e),
        )
    })
}

#[inline]
fn sensitive(mut value: HeaderValue) -> HeaderValue {
    value.set_sensitive(true);
    value
}

#[cfg(test)]
pub mod test {
    use http::header::{HeaderMap, HeaderValue};

    use super::details_from_headers;
    use crate::ErrorKind;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut result = HeaderMap::new();
        for (name, value) in pairs {
            let _ = result.insert(*name, HeaderValue::from_static(value));
        }
        result
    }

    #[test]
    fn test_details_from_headers() {
        let details = details_from_headers(
            &headers(&[
                ("x-auth-token", "tok"),
                ("x-server-management-url", "http://nova"),
                ("x-storage-url", "http://swift"),
            ]),
            "http://auth",
        )
        .unwrap();
        assert_eq!(details.token, "tok");
        assert_eq!(details.region_service_urls[""]["compute"], "http://nova");
        assert_eq!(details.region_service_urls[""]["object-store"], "http://swift");
    }

    #[test]
    fn test_missing_token() {
        let err = details_from_headers(&headers(&[("x-storage-url", "http://swift")]), "http://auth")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.message(), "Did not get valid Token from auth request");
    }

    #[test]
    fn test_missing_storage_url() {
        let err = details_from_headers(&headers(&[("x-auth-token", "tok")]), "http://auth")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            err.message(),
            "Did not get valid swift management URL from auth request"
        );
    }
}
