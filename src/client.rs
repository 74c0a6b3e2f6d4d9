// Copyright 2020 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! Authenticating client.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use log::{debug, warn};
use reqwest::{Client, Method};
use static_assertions::{assert_eq_size, assert_impl_all};
use tokio::sync::Mutex;

use super::cache::VersionCache;
use super::catalog::{check_required_services, select_region};
use super::identity::{AuthDetails, AuthMode, Credentials, ServiceUrls};
use super::transport::{build_client, HeadersProvider, HttpClient, DEFAULT_TIMEOUT};
use super::url::append_parts;
use super::{ApiVersion, Authenticator, Error, ErrorKind, RequestData, RetryPolicy};

/// Default time limit for authentication (including waiting for a concurrent one).
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(60);

const OBJECT_STORE: &str = "object-store";

/// Builder for [AuthenticatingClient](struct.AuthenticatingClient.html).
///
/// ```rust,no_run
/// # async fn example() -> Result<(), goose::Error> {
/// use goose::identity::{AuthMode, Credentials};
///
/// let creds = Credentials::new("https://cloud.local/identity", "admin", "pa$$w0rd")
///     .with_tenant_name("project1")
///     .with_region("RegionOne");
/// let client = goose::ClientBuilder::new(creds, AuthMode::V3UserPass)
///     .with_required_service_types(&["compute", "object-store"])
///     .build()?;
/// client.authenticate().await?;
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    creds: Option<Credentials>,
    mode: AuthMode,
    authenticator: Option<Arc<dyn Authenticator>>,
    required_service_types: Vec<String>,
    version_discovery: bool,
    timeout: Duration,
    auth_timeout: Duration,
    retry: RetryPolicy,
    headers: Option<Arc<dyn HeadersProvider>>,
    client: Option<Client>,
    cacert: Option<PathBuf>,
    insecure: bool,
}

impl Default for ClientBuilder {
    fn default() -> ClientBuilder {
        ClientBuilder {
            creds: None,
            mode: AuthMode::V3UserPass,
            authenticator: None,
            required_service_types: Vec::new(),
            version_discovery: true,
            timeout: DEFAULT_TIMEOUT,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            retry: RetryPolicy::default(),
            headers: None,
            client: None,
            cacert: None,
            insecure: false,
        }
    }
}

impl ClientBuilder {
    /// Start building a client with credentials and an authentication mode.
    pub fn new(creds: Credentials, mode: AuthMode) -> ClientBuilder {
        ClientBuilder::default()
            .with_credentials(creds)
            .with_auth_mode(mode)
    }

    /// Set the credentials.
    ///
    /// A client without credentials never authenticates.
    #[inline]
    pub fn set_credentials(&mut self, creds: Credentials) {
        self.creds = Some(creds);
    }

    /// Set the authentication mode (defaults to Identity API v3).
    #[inline]
    pub fn set_auth_mode(&mut self, mode: AuthMode) {
        self.mode = mode;
    }

    /// Set the services that must be available in the configured region.
    pub fn set_required_service_types<S: AsRef<str>>(&mut self, service_types: &[S]) {
        self.required_service_types = service_types
            .iter()
            .map(|s| s.as_ref().to_string())
            .collect();
    }

    /// Set the credentials.
    #[inline]
    pub fn with_credentials(mut self, creds: Credentials) -> Self {
        self.set_credentials(creds);
        self
    }

    /// Set the authentication mode (defaults to Identity API v3).
    #[inline]
    pub fn with_auth_mode(mut self, mode: AuthMode) -> Self {
        self.set_auth_mode(mode);
        self
    }

    /// Use a custom authenticator instead of the one for the authentication mode.
    #[inline]
    pub fn with_authenticator<A: Authenticator + 'static>(mut self, authenticator: A) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Require services to be available in the configured region.
    #[inline]
    pub fn with_required_service_types<S: AsRef<str>>(mut self, service_types: &[S]) -> Self {
        self.set_required_service_types(service_types);
        self
    }

    /// Enable or disable API version discovery.
    ///
    /// When disabled, catalog URLs are always used verbatim.
    #[inline]
    pub fn with_version_discovery(mut self, value: bool) -> Self {
        self.version_discovery = value;
        self
    }

    /// Set the timeout of each HTTP request.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the time limit for authentication.
    #[inline]
    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Set the retry policy for rate-limited requests.
    #[inline]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Use a custom headers provider.
    #[inline]
    pub fn with_headers_provider<H: HeadersProvider + 'static>(mut self, provider: H) -> Self {
        self.headers = Some(Arc::new(provider));
        self
    }

    /// Use an existing HTTP client (and its connection pool).
    #[inline]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Trust an additional CA certificate (PEM file).
    #[inline]
    pub fn with_cacert<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cacert = Some(path.as_ref().to_path_buf());
        self
    }

    /// Disable TLS certificate verification.
    #[inline]
    pub fn with_insecure(mut self, value: bool) -> Self {
        self.insecure = value;
        self
    }

    /// Create the client.
    ///
    /// No network requests are made.
    pub fn build(self) -> Result<AuthenticatingClient, Error> {
        if let Some(ref creds) = self.creds {
            let _ = creds.parsed_url()?;
        }

        let client = match self.client {
            Some(client) => {
                if self.cacert.is_some() || self.insecure {
                    return Err(Error::new(
                        ErrorKind::InvalidConfig,
                        "TLS options cannot be used with a custom HTTP client",
                    ));
                }
                client
            }
            None => build_client(self.cacert.as_deref(), self.insecure)?,
        };

        let mut http = HttpClient::new(client)
            .with_retry_policy(self.retry)
            .with_timeout(self.timeout);
        if let Some(headers) = self.headers {
            http = http.with_shared_headers_provider(headers);
        }

        let authenticator = match self.authenticator {
            Some(authenticator) => authenticator,
            None => self.mode.authenticator(http.clone()),
        };

        Ok(AuthenticatingClient {
            inner: Arc::new(ClientInner {
                http,
                creds: self.creds,
                authenticator,
                required_service_types: self.required_service_types,
                version_discovery: self.version_discovery,
                auth_timeout: self.auth_timeout,
                auth_lock: Mutex::new(()),
                state: RwLock::new(None),
                versions: VersionCache::new(),
            }),
        })
    }
}

#[derive(Debug, Clone)]
struct AuthState {
    details: AuthDetails,
    service_urls: ServiceUrls,
}

#[derive(Debug)]
struct ClientInner {
    http: HttpClient,
    creds: Option<Credentials>,
    authenticator: Arc<dyn Authenticator>,
    required_service_types: Vec<String>,
    version_discovery: bool,
    auth_timeout: Duration,
    auth_lock: Mutex<()>,
    state: RwLock<Option<AuthState>>,
    versions: VersionCache,
}

/// Client that authenticates and resolves service URLs.
///
/// Uses `Arc` internally and should be reused when possible by cloning it. Clones share the
/// authentication state, the API version cache and the connection pool.
#[derive(Debug, Clone)]
pub struct AuthenticatingClient {
    inner: Arc<ClientInner>,
}

assert_eq_size!(AuthenticatingClient, Option<AuthenticatingClient>);
assert_impl_all!(AuthenticatingClient: Send, Sync);

impl AuthenticatingClient {
    /// Credentials in use (if any).
    #[inline]
    pub fn credentials(&self) -> Option<&Credentials> {
        self.inner.creds.as_ref()
    }

    /// HTTP transport in use.
    #[inline]
    pub fn http_client(&self) -> &HttpClient {
        &self.inner.http
    }

    /// Authenticate if not done yet.
    ///
    /// Only one authentication runs at a time, concurrent callers wait for it and reuse its
    /// result. The whole operation is bounded by the authentication timeout.
    pub async fn authenticate(&self) -> Result<(), Error> {
        let creds = match self.inner.creds {
            Some(ref creds) => creds,
            None => return Ok(()),
        };
        if self.is_authenticated() {
            return Ok(());
        }

        tokio::time::timeout(self.inner.auth_timeout, self.do_authenticate(creds))
            .await
            .map_err(|_| {
                Error::new(
                    ErrorKind::OperationTimedOut,
                    format!(
                        "authentication against {} did not finish in {:?}",
                        creds.url, self.inner.auth_timeout
                    ),
                )
            })?
    }

    async fn do_authenticate(&self, creds: &Credentials) -> Result<(), Error> {
        let _guard = self.inner.auth_lock.lock().await;
        // Somebody else may have authenticated while we were waiting for the lock.
        if self.is_authenticated() {
            return Ok(());
        }

        debug!(
            "Authenticating user {} at {} using {:?}",
            creds.user, creds.url, self.inner.authenticator
        );
        let details = self
            .inner
            .authenticator
            .auth(creds)
            .await
            .map_err(|e| e.wrap(ErrorKind::AuthenticationFailed, "authentication failed"))?;

        let region = creds.region();
        let service_urls = select_region(&details.region_service_urls, region)?;
        check_required_services(
            &details.region_service_urls,
            region,
            &service_urls,
            &self.inner.required_service_types,
        )?;

        self.inner.versions.clear().await;
        debug!(
            "Authenticated as user {} (tenant {:?})",
            details.user_id, details.tenant_name
        );
        *self.write_state() = Some(AuthState {
            details,
            service_urls,
        });
        Ok(())
    }

    /// Whether a token is available.
    pub fn is_authenticated(&self) -> bool {
        self.read_state()
            .as_ref()
            .map(|state| !state.details.token.is_empty())
            .unwrap_or(false)
    }

    /// Drop the authentication so that the next request authenticates again.
    pub fn invalidate(&self) {
        debug!("Dropping the authentication token");
        *self.write_state() = None;
    }

    /// Authentication token (empty if not authenticated).
    #[inline]
    pub fn token(&self) -> String {
        self.details_field(|d| &d.token)
    }

    /// User ID (empty if not authenticated).
    #[inline]
    pub fn user_id(&self) -> String {
        self.details_field(|d| &d.user_id)
    }

    /// Tenant ID (empty if not authenticated).
    #[inline]
    pub fn tenant_id(&self) -> String {
        self.details_field(|d| &d.tenant_id)
    }

    /// Tenant name (empty if not authenticated).
    #[inline]
    pub fn tenant_name(&self) -> String {
        self.details_field(|d| &d.tenant_name)
    }

    /// Domain name for domain-scoped tokens (empty otherwise).
    #[inline]
    pub fn domain(&self) -> String {
        self.details_field(|d| &d.domain)
    }

    /// Full URL for a service, an API version and a path.
    ///
    /// An empty `api_version` means the catalog URL is used as is. Otherwise the version is
    /// discovered (once per catalog URL) and inserted into the URL. `parts` are appended
    /// separated by slashes, a trailing slash of the last part is preserved.
    pub async fn make_service_url<S: AsRef<str>>(
        &self,
        service_type: &str,
        api_version: &str,
        parts: &[S],
    ) -> Result<String, Error> {
        let (token, base, object_store) = {
            let state = self.read_state();
            let state = state.as_ref().ok_or_else(|| {
                Error::new(
                    ErrorKind::NotAuthenticated,
                    "cannot get endpoint URL without being authenticated",
                )
            })?;
            let base = state
                .service_urls
                .get(service_type)
                .cloned()
                .ok_or_else(|| Error::new_endpoint_not_found(service_type))?;
            (
                state.details.token.clone(),
                base,
                state.service_urls.get(OBJECT_STORE).cloned(),
            )
        };

        let requested: ApiVersion = api_version.parse()?;
        if requested.is_unspecified() || !self.inner.version_discovery {
            return Ok(append_parts(&base, parts));
        }

        let info = self
            .inner
            .versions
            .get_api_versions(&self.inner.http, &token, &base, object_store.as_deref())
            .await?;
        if info.versions.is_empty() {
            debug!(
                "No versions known for {}, using the catalog URL as is",
                base
            );
            return Ok(append_parts(&base, parts));
        }

        let url = info.version_url(requested)?;
        Ok(append_parts(url.as_str(), parts))
    }

    /// Send a request to a service.
    ///
    /// Authenticates if needed and resolves the URL of `service_type` at `api_version`. If the
    /// service answers `300 Multiple Choices`, the request is repeated once against the catalog
    /// URL without version resolution.
    pub async fn send_request(
        &self,
        method: Method,
        service_type: &str,
        api_version: &str,
        api_call: &str,
        data: &mut RequestData,
    ) -> Result<(), Error> {
        self.authenticate().await?;
        let url = self
            .make_service_url(service_type, api_version, &[api_call])
            .await?;

        match self.dispatch(method.clone(), &url, data).await {
            Err(e) if e.kind() == ErrorKind::VersionMismatch => {
                let fallback = append_parts(&self.catalog_url(service_type)?, &[api_call]);
                warn!(
                    "{} {} returned multiple choices, retrying with {}",
                    method, url, fallback
                );
                self.dispatch(method, &fallback, data).await
            }
            other => other,
        }
    }

    /// Send an authenticated JSON request to a full URL.
    pub async fn json_request(
        &self,
        method: Method,
        url: &str,
        data: &mut RequestData,
    ) -> Result<(), Error> {
        self.authenticate().await?;
        self.inner
            .http
            .json_request(method, url, Some(&self.token()), data)
            .await
    }

    /// Send an authenticated binary request to a full URL.
    pub async fn binary_request(
        &self,
        method: Method,
        url: &str,
        data: &mut RequestData,
    ) -> Result<(), Error> {
        self.authenticate().await?;
        self.inner
            .http
            .binary_request(method, url, Some(&self.token()), data)
            .await
    }

    async fn dispatch(&self, method: Method, url: &str, data: &mut RequestData) -> Result<(), Error> {
        let token = self.token();
        if data.is_json() {
            self.inner
                .http
                .json_request(method, url, Some(&token), data)
                .await
        } else {
            self.inner
                .http
                .binary_request(method, url, Some(&token), data)
                .await
        }
    }

    fn catalog_url(&self, service_type: &str) -> Result<String, Error> {
        self.read_state()
            .as_ref()
            .and_then(|state| state.service_urls.get(service_type).cloned())
            .ok_or_else(|| Error::new_endpoint_not_found(service_type))
    }

    fn details_field<F>(&self, getter: F) -> String
    where
        F: FnOnce(&AuthDetails) -> &String,
    {
        self.read_state()
            .as_ref()
            .map(|state| getter(&state.details).clone())
            .unwrap_or_default()
    }

    #[inline]
    fn read_state(&self) -> RwLockReadGuard<'_, Option<AuthState>> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write_state(&self) -> RwLockWriteGuard<'_, Option<AuthState>> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
