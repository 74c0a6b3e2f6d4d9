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

//! Error and result implementations.

use std::error::Error as StdError;
use std::fmt;

use http::header::HeaderMap;
use reqwest::StatusCode;

/// Kind of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Authentication against the identity service failed.
    ///
    /// Covers both rejected credentials and an unreachable identity endpoint.
    AuthenticationFailed,

    /// Access to the resource was denied.
    ///
    /// Maps to HTTP 401 and 403.
    Unauthorized,

    /// Requested resource was not found.
    ///
    /// Maps to HTTP 404.
    NotFound,

    /// A resource with the same identity already exists.
    ///
    /// Maps to HTTP 400 with an "already exists" body.
    DuplicateValue,

    /// The cloud refuses to accept more requests for now.
    ///
    /// Maps to HTTP 413 and 429 once the retries are exhausted.
    RateLimited,

    /// The URL version does not match what the endpoint expects.
    ///
    /// Maps to HTTP 300.
    VersionMismatch,

    /// Response received from the server is malformed.
    MalformedResponse,

    /// Any other unexpected HTTP status.
    HttpError,

    /// Requested service endpoint was not found.
    EndpointNotFound,

    /// An operation requires authentication that has not happened yet.
    NotAuthenticated,

    /// Invalid value passed to one of parameters.
    InvalidInput,

    /// Invalid client configuration.
    InvalidConfig,

    /// Operation has timed out.
    OperationTimedOut,

    /// Generic protocol error.
    ProtocolError,
}

/// Error from an OpenStack call.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: Option<StatusCode>,
    headers: Option<HeaderMap>,
    body: Option<String>,
}

impl ErrorKind {
    /// Short description of the error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::AuthenticationFailed => "Failed to authenticate",
            ErrorKind::Unauthorized => "Access to the resource is denied",
            ErrorKind::NotFound => "Requested resource was not found",
            ErrorKind::DuplicateValue => "Resource already exists",
            ErrorKind::RateLimited => "Too many requests",
            ErrorKind::VersionMismatch => "Multiple choices for the requested URL",
            ErrorKind::MalformedResponse => "Malformed response received",
            ErrorKind::HttpError => "Unexpected HTTP status",
            ErrorKind::EndpointNotFound => "Requested endpoint was not found",
            ErrorKind::NotAuthenticated => "Client is not authenticated",
            ErrorKind::InvalidInput => "Input value(s) are invalid or missing",
            ErrorKind::InvalidConfig => "Invalid client configuration",
            ErrorKind::OperationTimedOut => "Operation timed out",
            ErrorKind::ProtocolError => "Error when accessing the server",
        }
    }
}

impl Error {
    /// Create a new error of the provided kind.
    #[inline]
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Error {
        Error {
            kind,
            message: message.into(),
            status: None,
            headers: None,
            body: None,
        }
    }

    /// Error kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Error message without the kind description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status code (if present).
    #[inline]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Response headers of the failed request (if present).
    #[inline]
    pub fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }

    /// Raw response body of the failed request (if present).
    #[inline]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Add an HTTP status code to the error.
    #[inline]
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Add an HTTP status code to the error.
    #[inline]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.set_status(status);
        self
    }

    /// Attach the response headers and body of the failed request.
    #[inline]
    pub fn with_response(mut self, headers: HeaderMap, body: String) -> Self {
        self.headers = Some(headers);
        self.body = Some(body);
        self
    }

    /// Convert the error into another kind, prefixing the message.
    ///
    /// The HTTP details are preserved.
    pub fn wrap<S: fmt::Display>(self, kind: ErrorKind, context: S) -> Error {
        Error {
            kind,
            message: format!("{}: {}", context, self.message),
            ..self
        }
    }

    /// Prefix the message with some context, keeping the kind.
    #[inline]
    pub fn context<S: fmt::Display>(self, context: S) -> Error {
        let kind = self.kind;
        self.wrap(kind, context)
    }

    /// Create an error for a missing service type.
    pub(crate) fn new_endpoint_not_found<D: fmt::Display>(service_type: D) -> Error {
        Error::new(
            ErrorKind::EndpointNotFound,
            format!("no endpoints known for service type: {}", service_type),
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.message.is_empty() {
            fmt::Display::fmt(&self.kind, f)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl StdError for Error {}

impl From<ErrorKind> for Error {
    fn from(value: ErrorKind) -> Error {
        Error::new(value, String::new())
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Error {
        let msg = value.to_string();
        let kind = match value.status() {
            Some(status) => ErrorKind::from(status),
            None if value.is_timeout() => ErrorKind::OperationTimedOut,
            None if value.is_decode() => ErrorKind::MalformedResponse,
            None if value.is_builder() => ErrorKind::InvalidInput,
            None => ErrorKind::ProtocolError,
        };

        let error = Error::new(kind, msg);
        if let Some(status) = value.status() {
            error.with_status(status)
        } else {
            error
        }
    }
}

impl From<StatusCode> for ErrorKind {
    fn from(value: StatusCode) -> ErrorKind {
        match value {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Unauthorized,
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::TOO_MANY_REQUESTS | StatusCode::PAYLOAD_TOO_LARGE => {
                ErrorKind::RateLimited
            }
            StatusCode::MULTIPLE_CHOICES => ErrorKind::VersionMismatch,
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                ErrorKind::OperationTimedOut
            }
            _ => ErrorKind::HttpError,
        }
    }
}
