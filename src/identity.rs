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

//! Credentials, authentication results and the built-in authenticators.
//!
//! Three authentication modes are supported:
//! * [Legacy](struct.Legacy.html) header-based authentication,
//! * [UserPass](struct.UserPass.html) password authentication using Identity API v2,
//! * [V3UserPass](struct.V3UserPass.html) password authentication using Identity API v3.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use log::debug;
use reqwest::{Method, StatusCode, Url};

use crate::protocol::{VersionInfo, VersionsRoot};
use crate::transport::HttpClient;
use crate::{Authenticator, Error, ErrorKind, RequestData};

mod legacy;
mod protocol;
mod userpass;
mod v3userpass;

pub use self::legacy::Legacy;
pub use self::userpass::UserPass;
pub use self::v3userpass::V3UserPass;

/// Service type → base URL.
pub type ServiceUrls = HashMap<String, String>;

/// Region → service type → base URL.
pub type RegionServiceUrls = HashMap<String, ServiceUrls>;

/// Domain used when no user or project domain is provided.
pub const DEFAULT_DOMAIN: &str = "default";

/// Credentials used to authenticate against the identity service.
///
/// ```rust
/// let creds = goose::identity::Credentials::new("https://cloud.local/identity", "admin", "pa$$w0rd")
///     .with_tenant_name("project1")
///     .with_region("RegionOne");
/// assert_eq!(creds.region(), "RegionOne");
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Identity endpoint URL.
    pub url: String,
    /// User name.
    pub user: String,
    /// Password or key.
    pub secrets: String,
    /// Region to use.
    pub region: Option<String>,
    /// Tenant (project) name.
    pub tenant_name: Option<String>,
    /// Tenant (project) ID.
    pub tenant_id: Option<String>,
    /// Domain to scope the token to (v3 only).
    pub domain: Option<String>,
    /// Domain of the user (v3 only).
    pub user_domain: Option<String>,
    /// Domain of the project (v3 only).
    pub project_domain: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("secrets", &"<hidden>")
            .field("region", &self.region)
            .field("tenant_name", &self.tenant_name)
            .field("tenant_id", &self.tenant_id)
            .field("domain", &self.domain)
            .field("user_domain", &self.user_domain)
            .field("project_domain", &self.project_domain)
            .finish()
    }
}

impl Credentials {
    /// Create credentials with a URL, user name and secret.
    pub fn new<U, S1, S2>(url: U, user: S1, secrets: S2) -> Credentials
    where
        U: Into<String>,
        S1: Into<String>,
        S2: Into<String>,
    {
        Credentials {
            url: url.into(),
            user: user.into(),
            secrets: secrets.into(),
            ..Credentials::default()
        }
    }

    /// Region (empty if not set).
    #[inline]
    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or_default()
    }

    /// Use the region.
    #[inline]
    pub fn with_region<S: Into<String>>(mut self, value: S) -> Self {
        self.region = Some(value.into());
        self
    }

    /// Scope to the tenant with this name.
    #[inline]
    pub fn with_tenant_name<S: Into<String>>(mut self, value: S) -> Self {
        self.tenant_name = Some(value.into());
        self
    }

    /// Scope to the tenant with this ID.
    #[inline]
    pub fn with_tenant_id<S: Into<String>>(mut self, value: S) -> Self {
        self.tenant_id = Some(value.into());
        self
    }

    /// Scope to the domain (overrides the tenant scope with Identity API v3).
    #[inline]
    pub fn with_domain<S: Into<String>>(mut self, value: S) -> Self {
        self.domain = Some(value.into());
        self
    }

    /// Set the domain of the user.
    #[inline]
    pub fn with_user_domain<S: Into<String>>(mut self, value: S) -> Self {
        self.user_domain = Some(value.into());
        self
    }

    /// Set the domain of the project.
    #[inline]
    pub fn with_project_domain<S: Into<String>>(mut self, value: S) -> Self {
        self.project_domain = Some(value.into());
        self
    }

    /// Parse the identity URL.
    pub(crate) fn parsed_url(&self) -> Result<Url, Error> {
        Url::parse(&self.url).map_err(|e| {
            Error::new(
                ErrorKind::InvalidConfig,
                format!("Invalid identity URL {:?}: {}", self.url, e),
            )
        })
    }
}

/// Result of a successful authentication.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthDetails {
    /// Authentication token.
    pub token: String,
    /// Tenant (project) ID.
    pub tenant_id: String,
    /// Tenant (project) name.
    pub tenant_name: String,
    /// User ID.
    pub user_id: String,
    /// Domain name for domain-scoped tokens.
    pub domain: String,
    /// Token expiration time (if reported).
    pub expires_at: Option<DateTime<FixedOffset>>,
    /// Service URLs for each region.
    pub region_service_urls: RegionServiceUrls,
}

impl fmt::Debug for AuthDetails {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut hasher = DefaultHasher::new();
        self.token.hash(&mut hasher);
        f.debug_struct("AuthDetails")
            .field("token", &format_args!("hash({})", hasher.finish()))
            .field("tenant_id", &self.tenant_id)
            .field("tenant_name", &self.tenant_name)
            .field("user_id", &self.user_id)
            .field("domain", &self.domain)
            .field("expires_at", &self.expires_at)
            .field("region_service_urls", &self.region_service_urls)
            .finish()
    }
}

impl AuthDetails {
    /// Register a URL for a service in a region.
    pub fn add_service_url<R, S, U>(&mut self, region: R, service_type: S, url: U)
    where
        R: Into<String>,
        S: Into<String>,
        U: Into<String>,
    {
        let _ = self
            .region_service_urls
            .entry(region.into())
            .or_default()
            .insert(service_type.into(), url.into());
    }
}

/// Authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMode {
    /// Legacy header-based authentication.
    Legacy,
    /// Password authentication with Identity API v2.
    UserPass,
    /// Password authentication with Identity API v3.
    V3UserPass,
}

impl AuthMode {
    /// Create the authenticator for this mode using the provided transport.
    pub fn authenticator(self, client: HttpClient) -> Arc<dyn Authenticator> {
        match self {
            AuthMode::Legacy => Arc::new(Legacy::new(client)),
            AuthMode::UserPass => Arc::new(UserPass::new(client)),
            AuthMode::V3UserPass => Arc::new(V3UserPass::new(client)),
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            AuthMode::Legacy => "Legacy Authentication",
            AuthMode::UserPass => "Username/password Authentication",
            AuthMode::V3UserPass => "Username/password Authentication (Version 3)",
        })
    }
}

/// Authentication option advertised by an identity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOption {
    /// Authentication mode to use.
    pub mode: AuthMode,
    /// Versioned identity endpoint.
    pub endpoint: Url,
}

/// Fetch the authentication options advertised by the identity service at `url`.
///
/// Identity API v3 options come first.
pub async fn fetch_auth_options(client: &HttpClient, url: &str) -> Result<Vec<AuthOption>, Error> {
    let mut data = RequestData::new()
        .expecting_json()
        .with_expected_status(&[StatusCode::OK, StatusCode::MULTIPLE_CHOICES]);
    client
        .json_request(Method::GET, url, None, &mut data)
        .await
        .map_err(|e| e.context("request available auth options"))?;
    let versions: Vec<VersionInfo> = data.resp_json::<VersionsRoot>()?.into();

    let mut options = versions
        .into_iter()
        .filter_map(|info| {
            let mode = match info.version.major {
                Some(3) => AuthMode::V3UserPass,
                Some(2) => AuthMode::UserPass,
                _ => return None,
            };
            info.self_link().map(|link| AuthOption {
                mode,
                endpoint: link.href.clone(),
            })
        })
        .collect::<Vec<_>>();
    if options.is_empty() {
        return Err(Error::new(
            ErrorKind::EndpointNotFound,
            format!("No supported authentication options advertised by {}", url),
        ));
    }

    options.sort_by_key(|opt| opt.mode != AuthMode::V3UserPass);
    debug!("Authentication options for {}: {:?}", url, options);
    Ok(options)
}

#[cfg(test)]
#[allow(missing_docs)]
pub mod test {
    use super::{AuthDetails, AuthMode, Credentials};

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let creds = Credentials::new("http://127.0.0.1/identity", "admin", "pa$$w0rd");
        let dbg = format!("{:?}", creds);
        assert!(dbg.contains("admin"));
        assert!(!dbg.contains("pa$$w0rd"));
        assert_eq!(creds.region(), "");
    }

    #[test]
    fn test_auth_details_debug_hides_token() {
        let details = AuthDetails {
            token: "super-secret-token".to_string(),
            ..AuthDetails::default()
        };
        assert!(!format!("{:?}", details).contains("super-secret-token"));
    }

    #[test]
    fn test_add_service_url() {
        let mut details = AuthDetails::default();
        details.add_service_url("RegionOne", "compute", "http://nova");
        details.add_service_url("RegionOne", "network", "http://neutron");
        details.add_service_url("RegionTwo", "compute", "http://nova2");
        assert_eq!(details.region_service_urls.len(), 2);
        assert_eq!(details.region_service_urls["RegionOne"]["network"], "http://neutron");
        assert_eq!(details.region_service_urls["RegionTwo"]["compute"], "http://nova2");
    }

    #[test]
    fn test_auth_mode_display() {
        assert_eq!(AuthMode::Legacy.to_string(), "Legacy Authentication");
        assert_eq!(
            AuthMode::V3UserPass.to_string(),
            "Username/password Authentication (Version 3)"
        );
    }
}
