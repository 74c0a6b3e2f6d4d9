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

//! Per-request data and conversion of failed responses into errors.

use std::collections::HashMap;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Error, ErrorKind};

/// Maximum length of a response body quoted in an error message.
const MAX_EXCERPT: usize = 1024;

/// Data of a single request and its response.
///
/// A request goes through the JSON path when it carries a JSON body or expects a JSON response
/// (see [expecting_json](#method.expecting_json)), otherwise through the binary path.
///
/// ```rust
/// use goose::RequestData;
/// use reqwest::StatusCode;
///
/// let data = RequestData::new()
///     .with_json(&serde_json::json!({"server": {"name": "vm1"}}))
///     .expect("Cannot serialize")
///     .with_expected_status(&[StatusCode::ACCEPTED]);
/// assert!(data.is_json());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    /// Additional request headers.
    pub req_headers: HeaderMap,
    /// Query parameters.
    pub params: Vec<(String, String)>,
    /// Statuses considered successful, `200 OK` if empty.
    pub expected_status: Vec<StatusCode>,
    /// JSON request body.
    pub req_value: Option<Value>,
    /// Binary request body.
    pub req_data: Option<Bytes>,
    /// Whether the response body should be decoded as JSON.
    pub expect_json: bool,
    /// Response status (populated on return).
    pub resp_status: Option<StatusCode>,
    /// Response headers (populated on return).
    pub resp_headers: HeaderMap,
    /// Decoded JSON response (populated on return, if the body was not empty).
    pub resp_value: Option<Value>,
    /// Raw response body (populated on return for binary requests).
    pub resp_data: Option<Bytes>,
}

impl RequestData {
    /// Create empty request data.
    #[inline]
    pub fn new() -> RequestData {
        RequestData::default()
    }

    /// Use a JSON body for the request.
    ///
    /// Also makes the response decoded as JSON.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<RequestData, Error> {
        let value = serde_json::to_value(value).map_err(|e| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("failed marshalling the request body: {}", e),
            )
        })?;
        self.req_value = Some(value);
        self.expect_json = true;
        Ok(self)
    }

    /// Use a binary body for the request.
    #[inline]
    pub fn with_body<B: Into<Bytes>>(mut self, body: B) -> RequestData {
        self.req_data = Some(body.into());
        self
    }

    /// Decode the response as JSON.
    #[inline]
    pub fn expecting_json(mut self) -> RequestData {
        self.expect_json = true;
        self
    }

    /// Add an extra request header.
    #[inline]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> RequestData {
        let _ = self.req_headers.append(name, value);
        self
    }

    /// Add a query parameter.
    #[inline]
    pub fn with_param<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> RequestData {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Set the statuses considered successful.
    #[inline]
    pub fn with_expected_status(mut self, statuses: &[StatusCode]) -> RequestData {
        self.expected_status = statuses.to_vec();
        self
    }

    /// Whether the request uses the JSON path.
    #[inline]
    pub fn is_json(&self) -> bool {
        self.req_value.is_some() || self.expect_json
    }

    /// Whether the status is considered successful for this request.
    pub fn is_expected(&self, status: StatusCode) -> bool {
        if self.expected_status.is_empty() {
            status == StatusCode::OK
        } else {
            self.expected_status.contains(&status)
        }
    }

    /// Convert the JSON response into a typed value.
    ///
    /// An empty response body is treated as JSON `null`.
    pub fn resp_json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let value = self.resp_value.clone().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            let raw = self
                .resp_value
                .as_ref()
                .map(Value::to_string)
                .unwrap_or_default();
            Error::new(
                ErrorKind::MalformedResponse,
                format!("failed unmarshaling the response body: {}: {}", e, raw),
            )
        })
    }

    /// Clear the results of a previous attempt.
    pub(crate) fn reset_response(&mut self) {
        self.resp_status = None;
        self.resp_headers = HeaderMap::new();
        self.resp_value = None;
        self.resp_data = None;
    }
}

#[derive(Debug, Deserialize)]
struct Message {
    message: Option<String>,
    faultstring: Option<String>,
    title: Option<String>,
    code: Option<u16>,
    // Ironic legacy format: JSON inside JSON
    error_message: Option<Value>,
}

impl Message {
    fn convert(self, key: Option<&str>) -> Option<String> {
        let title = key.map(ToString::to_string).or(self.title);
        if let (Some(code), Some(message)) = (self.code, &self.message) {
            return Some(format!(
                "Failed: {} {}: {}",
                code,
                title.unwrap_or_default(),
                message
            ));
        }

        if let Some(value) = self.message.or(self.faultstring).or(title) {
            return Some(value);
        }

        match self.error_message {
            Some(Value::String(json)) => serde_json::from_str::<Message>(&json)
                .ok()
                .and_then(|msg| msg.convert(None)),
            Some(value @ Value::Object(_)) => serde_json::from_value::<Message>(value)
                .ok()
                .and_then(|msg| msg.convert(None)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorResponse {
    Map(HashMap<String, Message>),
    Message(Message),
}

/// Extract a human-readable message from an OpenStack error body.
fn extract_message(text: &str) -> String {
    serde_json::from_str::<ErrorResponse>(text)
        .ok()
        .and_then(|body| match body {
            ErrorResponse::Map(map) => map
                .into_iter()
                .next()
                .and_then(|(k, v)| v.convert(Some(&k))),
            ErrorResponse::Message(msg) => msg.convert(None),
        })
        .unwrap_or_else(|| text.to_string())
}

fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(MAX_EXCERPT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("json"))
        .unwrap_or(false)
}

/// Classify an HTTP status that was not expected.
pub(crate) fn classify(status: StatusCode, body: &str) -> ErrorKind {
    if status == StatusCode::BAD_REQUEST && body.contains("already exists") {
        ErrorKind::DuplicateValue
    } else {
        ErrorKind::from(status)
    }
}

/// Convert a failed response into an error.
pub(crate) fn http_error(url: &str, status: StatusCode, headers: HeaderMap, body: Bytes) -> Error {
    let text = String::from_utf8_lossy(&body).into_owned();
    let info = if is_json(&headers) {
        extract_message(&text)
    } else {
        text.clone()
    };
    let info = if info.trim().is_empty() {
        status.canonical_reason().unwrap_or("no details").to_string()
    } else {
        excerpt(&info).to_string()
    };

    Error::new(
        classify(status, &text),
        format!(
            "request ({}) returned unexpected status: {}; error info: {}",
            url,
            status.as_u16(),
            info
        ),
    )
    .with_status(status)
    .with_response(headers, text)
}


#[cfg(test)]
mod test_http_error {
    use bytes::Bytes;
    use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use reqwest::StatusCode;

    use super::{http_error, RequestData};
    use crate::ErrorKind;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn test_not_found() {
        let body = Bytes::from_static(br#"{"itemNotFound": {"message": "No server", "code": 404}}"#);
        let err = http_error("http://cloud/servers/1", StatusCode::NOT_FOUND, json_headers(), body);
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(
            err.message(),
            "request (http://cloud/servers/1) returned unexpected status: 404; \
             error info: Failed: 404 itemNotFound: No server"
        );
        assert!(err.body().unwrap().contains("itemNotFound"));
        assert!(err.headers().unwrap().contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_duplicate() {
        let body = Bytes::from_static(
            br#"{"badRequest": {"message": "Key pair 'k' already exists.", "code": 400}}"#,
        );
        let err = http_error("http://cloud/keys", StatusCode::BAD_REQUEST, json_headers(), body);
        assert_eq!(err.kind(), ErrorKind::DuplicateValue);
    }

    #[test]
    fn test_plain_bad_request() {
        let body = Bytes::from_static(b"bad things happened");
        let err = http_error("http://cloud/x", StatusCode::BAD_REQUEST, HeaderMap::new(), body);
        assert_eq!(err.kind(), ErrorKind::HttpError);
        assert!(err.message().ends_with("error info: bad things happened"));
    }

    #[test]
    fn test_classification() {
        for (status, kind) in &[
            (StatusCode::UNAUTHORIZED, ErrorKind::Unauthorized),
            (StatusCode::FORBIDDEN, ErrorKind::Unauthorized),
            (StatusCode::TOO_MANY_REQUESTS, ErrorKind::RateLimited),
            (StatusCode::PAYLOAD_TOO_LARGE, ErrorKind::RateLimited),
            (StatusCode::MULTIPLE_CHOICES, ErrorKind::VersionMismatch),
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::HttpError),
        ] {
            let err = http_error("http://cloud", *status, HeaderMap::new(), Bytes::new());
            assert_eq!(err.kind(), *kind, "{}", status);
            assert_eq!(err.status(), Some(*status));
        }
    }

    #[test]
    fn test_long_body_is_cut() {
        let body = Bytes::from("x".repeat(5000));
        let err = http_error("http://cloud", StatusCode::BAD_GATEWAY, HeaderMap::new(), body);
        assert!(err.message().len() < 1200);
        assert_eq!(err.body().unwrap().len(), 5000);
    }

    #[test]
    fn test_request_data_defaults() {
        let data = RequestData::new();
        assert!(!data.is_json());
        assert!(data.is_expected(StatusCode::OK));
        assert!(!data.is_expected(StatusCode::CREATED));
        let data = data.with_expected_status(&[StatusCode::CREATED]);
        assert!(data.is_expected(StatusCode::CREATED));
        assert!(!data.is_expected(StatusCode::OK));
    }

    #[test]
    fn test_resp_json() {
        let mut data = RequestData::new().expecting_json();
        data.resp_value = Some(serde_json::json!({"id": 42}));
        #[derive(serde::Deserialize)]
        struct Res {
            id: u32,
        }
        assert_eq!(data.resp_json::<Res>().unwrap().id, 42);
        let err = data.resp_json::<Vec<String>>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert!(err.message().contains("{\"id\":42}"));
    }
}
