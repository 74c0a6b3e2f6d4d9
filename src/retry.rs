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

//! Retry policy for rate-limited requests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use http::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

use super::{Error, ErrorKind};

/// Bounded retry policy applied to rate-limited requests.
///
/// A request is retried when the cloud answers with `429 Too Many Requests`, or with
/// `413 Payload Too Large`, `403 Forbidden` or `503 Service Unavailable` accompanied by
/// a `Retry-After` header (some clouds signal rate limiting that way).
///
/// ```rust
/// use std::time::Duration;
///
/// let policy = goose::RetryPolicy::default()
///     .with_max_attempts(5)
///     .with_max_elapsed(Duration::from_secs(30));
/// assert_eq!(policy.max_attempts(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    default_delay: Duration,
    max_delay: Duration,
    max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            default_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(600),
            max_elapsed: Duration::from_secs(120),
        }
    }
}

/// What to do with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    /// Return the response to the caller.
    Accept,
    /// Sleep and repeat the request.
    Retry(Duration),
}

impl RetryPolicy {
    /// Policy that never sleeps, useful for tests.
    pub fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            default_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_elapsed: Duration::MAX,
        }
    }

    /// Maximum number of attempts (including the first one).
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Set the maximum number of attempts (including the first one).
    #[inline]
    pub fn with_max_attempts(mut self, value: u32) -> RetryPolicy {
        self.max_attempts = value.max(1);
        self
    }

    /// Set the delay used when the server does not provide `Retry-After`.
    #[inline]
    pub fn with_default_delay(mut self, value: Duration) -> RetryPolicy {
        self.default_delay = value;
        self
    }

    /// Set the longest single delay the client agrees to wait.
    ///
    /// Server hints above it fail the request. With a zero value, hints are ignored and
    /// retries happen immediately.
    #[inline]
    pub fn with_max_delay(mut self, value: Duration) -> RetryPolicy {
        self.max_delay = value;
        self
    }

    /// Set the budget for the total time spent waiting between attempts.
    #[inline]
    pub fn with_max_elapsed(mut self, value: Duration) -> RetryPolicy {
        self.max_elapsed = value;
        self
    }

    /// Decide whether a response should be retried.
    ///
    /// `attempt` is the 1-based number of the attempt that produced the response, `waited` is
    /// the time already spent sleeping.
    pub(crate) fn decide(
        &self,
        url: &str,
        status: StatusCode,
        headers: &HeaderMap,
        attempt: u32,
        waited: Duration,
    ) -> Result<Decision, Error> {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let limited = match status {
            StatusCode::TOO_MANY_REQUESTS => true,
            StatusCode::PAYLOAD_TOO_LARGE
            | StatusCode::FORBIDDEN
            | StatusCode::SERVICE_UNAVAILABLE => retry_after.is_some(),
            _ => false,
        };
        if !limited {
            return Ok(Decision::Accept);
        }

        if attempt >= self.max_attempts {
            return Err(rate_limited(format!(
                "Maximum number of attempts ({}) reached sending request to {}",
                self.max_attempts, url
            )));
        }

        let delay = match retry_after {
            Some(value) => self.hinted_delay(url, value)?,
            None => self.default_delay,
        };

        if waited.saturating_add(delay) > self.max_elapsed {
            return Err(rate_limited(format!(
                "Retrying request to {} would exceed the time budget of {:?}",
                url, self.max_elapsed
            )));
        }

        Ok(Decision::Retry(delay))
    }

    fn hinted_delay(&self, url: &str, value: &str) -> Result<Duration, Error> {
        let delay = if let Ok(seconds) = value.parse::<f64>() {
            if seconds <= 0.0 || !seconds.is_finite() {
                return Err(rate_limited(format!(
                    "Resource limit exceeded at URL {}",
                    url
                )));
            }
            Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
        } else {
            let date = DateTime::parse_from_rfc2822(value).map_err(|e| {
                Error::new(
                    ErrorKind::MalformedResponse,
                    format!("Invalid Retry-After header {:?} from {}: {}", value, url, e),
                )
            })?;
            // A date in the past means "retry now"
            (date.with_timezone(&Utc) - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
        };

        if self.max_delay.is_zero() {
            Ok(Duration::ZERO)
        } else if delay > self.max_delay {
            Err(rate_limited(format!(
                "Cloud is not accepting further requests to {} for {:?}, \
                 it is recommended to verify your account rate limits",
                url, delay
            )))
        } else {
            Ok(delay)
        }
    }
}

#[inline]
fn rate_limited(message: String) -> Error {
    Error::new(ErrorKind::RateLimited, message).with_status(StatusCode::TOO_MANY_REQUESTS)
}

#[cfg(test)]
pub mod test {
    use std::time::Duration;

    use chrono::Utc;
    use http::header::{HeaderMap, HeaderValue, RETRY_AFTER};
    use reqwest::StatusCode;

    use super::{Decision, RetryPolicy};
    use crate::ErrorKind;

    const URL: &str = "http://cloud/servers";

    fn retry_after(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(RETRY_AFTER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_accept_normal_statuses() {
        let policy = RetryPolicy::default();
        for status in &[
            StatusCode::OK,
            StatusCode::NOT_FOUND,
            StatusCode::FORBIDDEN,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let decision = policy
                .decide(URL, *status, &HeaderMap::new(), 1, Duration::ZERO)
                .unwrap();
            assert_eq!(decision, Decision::Accept, "{}", status);
        }
    }

    #[test]
    fn test_retry_429_without_header() {
        let policy = RetryPolicy::default();
        let decision = policy
            .decide(URL, StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), 1, Duration::ZERO)
            .unwrap();
        assert_eq!(decision, Decision::Retry(Duration::from_secs(1)));
    }

    #[test]
    fn test_retry_after_seconds() {
        let policy = RetryPolicy::default();
        let decision = policy
            .decide(URL, StatusCode::SERVICE_UNAVAILABLE, &retry_after("3"), 1, Duration::ZERO)
            .unwrap();
        assert_eq!(decision, Decision::Retry(Duration::from_secs(3)));
    }

    #[test]
    fn test_retry_after_zero_fails() {
        let err = RetryPolicy::default()
            .decide(URL, StatusCode::TOO_MANY_REQUESTS, &retry_after("0"), 1, Duration::ZERO)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
    }

    #[test]
    fn test_retry_after_date() {
        let when = Utc::now() + chrono::Duration::seconds(30);
        let value = when.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let decision = RetryPolicy::default()
            .decide(URL, StatusCode::PAYLOAD_TOO_LARGE, &retry_after(&value), 1, Duration::ZERO)
            .unwrap();
        match decision {
            Decision::Retry(delay) => assert!(delay <= Duration::from_secs(30)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_retry_after_too_far() {
        let when = Utc::now() + chrono::Duration::minutes(30);
        let value = when.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let err = RetryPolicy::default()
            .decide(URL, StatusCode::TOO_MANY_REQUESTS, &retry_after(&value), 1, Duration::ZERO)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.message().contains("not accepting further requests"));
    }

    #[test]
    fn test_invalid_retry_after() {
        let err = RetryPolicy::default()
            .decide(URL, StatusCode::TOO_MANY_REQUESTS, &retry_after("soon"), 1, Duration::ZERO)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_max_attempts() {
        let err = RetryPolicy::default()
            .decide(URL, StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), 3, Duration::ZERO)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(
            err.message(),
            "Maximum number of attempts (3) reached sending request to http://cloud/servers"
        );
    }

    #[test]
    fn test_time_budget() {
        let policy = RetryPolicy::default()
            .with_max_attempts(100)
            .with_max_elapsed(Duration::from_secs(10));
        let err = policy
            .decide(URL, StatusCode::TOO_MANY_REQUESTS, &retry_after("5"), 2, Duration::from_secs(6))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
    }

    #[test]
    fn test_no_wait_ignores_hints() {
        let decision = RetryPolicy::no_wait(5)
            .decide(URL, StatusCode::TOO_MANY_REQUESTS, &retry_after("120"), 4, Duration::ZERO)
            .unwrap();
        assert_eq!(decision, Decision::Retry(Duration::ZERO));
    }
}
