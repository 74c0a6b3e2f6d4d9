// Copyright 2019-2020 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! Password authentication using Identity API v3.

use async_trait::async_trait;
use http::header::HeaderName;
use log::{debug, error, trace};
use reqwest::{Method, StatusCode};
use static_assertions::assert_impl_all;

use super::protocol::{
    Domain, PasswordAuth, PasswordIdentity, Project, Scope, Token, TokenRoot, UserAndPassword,
    V3Auth, V3AuthRoot,
};
use super::{AuthDetails, Credentials, DEFAULT_DOMAIN};
use crate::transport::HttpClient;
use crate::{Authenticator, Error, ErrorKind, RequestData};

static X_SUBJECT_TOKEN: HeaderName = HeaderName::from_static("x-subject-token");

const PUBLIC_INTERFACE: &str = "public";

/// Password authentication using Identity API v3.
///
/// The token is scoped to the project given by `tenant_id` or `tenant_name` (with
/// `project_domain`), or to `domain` when it is set. User and project domains default to
/// `default`.
///
/// ```rust,no_run
/// # async fn example() -> Result<(), goose::Error> {
/// use goose::Authenticator;
/// use goose::identity::{Credentials, V3UserPass};
///
/// let creds = Credentials::new("https://cloud.local/identity", "admin", "pa$$w0rd")
///     .with_tenant_name("project1")
///     .with_project_domain("Default");
/// let details = V3UserPass::new(goose::HttpClient::default()).auth(&creds).await?;
/// println!("Token for user {}", details.user_id);
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct V3UserPass {
    client: HttpClient,
}

assert_impl_all!(V3UserPass: Send, Sync);

impl V3UserPass {
    /// Create a password authenticator using the provided transport.
    #[inline]
    pub fn new(client: HttpClient) -> V3UserPass {
        V3UserPass { client }
    }
}

#[async_trait]
impl Authenticator for V3UserPass {
    async fn auth(&self, creds: &Credentials) -> Result<AuthDetails, Error> {
        let url = token_endpoint(creds)?;
        let mut data = RequestData::new()
            .with_json(&auth_body(creds))?
            .with_expected_status(&[StatusCode::CREATED]);

        debug!("Requesting a v3 token from {}", url);
        self.client
            .json_request(Method::POST, &url, None, &mut data)
            .await
            .map_err(|e| e.context("requesting token"))?;

        let token = data
            .resp_headers
            .get(&X_SUBJECT_TOKEN)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if token.is_empty() {
            error!("No X-Subject-Token header received from {}", url);
            return Err(Error::new(
                ErrorKind::Unauthorized,
                "empty auth token received.",
            ));
        }

        let root = data.resp_json::<TokenRoot>()?;
        if let Some(expires_at) = root.token.expires_at {
            debug!("Received a token expiring at {}", expires_at);
        }
        Ok(details_from_token(token, root.token))
    }
}

fn token_endpoint(creds: &Credentials) -> Result<String, Error> {
    let auth_url = creds.parsed_url()?;
    let base = auth_url.as_str().trim_end_matches('/');
    Ok(if base.ends_with("/v3") {
        format!("{}/auth/tokens", base)
    } else {
        format!("{}/v3/auth/tokens", base)
    })
}

fn auth_body(creds: &Credentials) -> V3AuthRoot {
    let user_domain = creds.user_domain.as_deref().unwrap_or(DEFAULT_DOMAIN);
    let project_domain = creds.project_domain.as_deref().unwrap_or(DEFAULT_DOMAIN);

    let mut scope = if let Some(ref id) = creds.tenant_id {
        Some(Scope::Project(Project {
            id: Some(id.clone()),
            name: None,
            domain: None,
        }))
    } else {
        creds.tenant_name.as_ref().map(|name| {
            Scope::Project(Project {
                id: None,
                name: Some(name.clone()),
                domain: Some(Domain {
                    name: project_domain.to_string(),
                }),
            })
        })
    };
    if let Some(ref domain) = creds.domain {
        scope = Some(Scope::Domain(Domain {
            name: domain.clone(),
        }));
    }

    V3AuthRoot {
        auth: V3Auth {
            identity: PasswordIdentity {
                methods: vec![String::from("password")],
                password: PasswordAuth {
                    user: UserAndPassword {
                        name: creds.user.clone(),
                        password: creds.secrets.clone(),
                        domain: Domain {
                            name: user_domain.to_string(),
                        },
                    },
                },
            },
            scope,
        },
    }
}

fn details_from_token(token: String, body: Token) -> AuthDetails {
    let project = body.project.unwrap_or_default();
    let mut details = AuthDetails {
        token,
        tenant_id: project.id,
        tenant_name: project.name,
        user_id: body.user.map(|u| u.id).unwrap_or_default(),
        domain: body.domain.map(|d| d.name).unwrap_or_default(),
        expires_at: body.expires_at,
        ..AuthDetails::default()
    };

    for record in body.catalog {
        for endpoint in record.endpoints {
            if endpoint.interface != PUBLIC_INTERFACE {
                continue;
            }
            let region = endpoint.region_id.or(endpoint.region).unwrap_or_default();
            details.add_service_url(region, record.service_type.clone(), endpoint.url);
        }
    }
    trace!("Received catalog: {:?}", details.region_service_urls);
    details
}

#[cfg(test)]
pub mod test {
    use serde_json::json;

    use super::{auth_body, details_from_token, token_endpoint};
    use crate::identity::protocol::TokenRoot;
    use crate::identity::Credentials;

    fn creds(url: &str) -> Credentials {
        Credentials::new(url, "user", "pa$$w0rd")
    }

    #[test]
    fn test_token_endpoint() {
        assert_eq!(
            token_endpoint(&creds("http://127.0.0.1:8080/identity")).unwrap(),
            "http://127.0.0.1:8080/identity/v3/auth/tokens"
        );
        assert_eq!(
            token_endpoint(&creds("http://127.0.0.1:8080/")).unwrap(),
            "http://127.0.0.1:8080/v3/auth/tokens"
        );
    }

    #[test]
    fn test_token_endpoint_with_trailing_slash() {
        assert_eq!(
            token_endpoint(&creds("http://127.0.0.1:8080/identity/")).unwrap(),
            "http://127.0.0.1:8080/identity/v3/auth/tokens"
        );
    }

    #[test]
    fn test_token_endpoint_with_v3() {
        assert_eq!(
            token_endpoint(&creds("http://127.0.0.1:8080/identity/v3")).unwrap(),
            "http://127.0.0.1:8080/identity/v3/auth/tokens"
        );
        assert_eq!(
            token_endpoint(&creds("http://127.0.0.1:8080/identity/v3/")).unwrap(),
            "http://127.0.0.1:8080/identity/v3/auth/tokens"
        );
    }

    #[test]
    fn test_token_endpoint_invalid() {
        let _ = token_endpoint(&creds("http://127.0.0.1 8080/")).unwrap_err();
    }

    #[test]
    fn test_auth_body_unscoped() {
        let body = serde_json::to_value(auth_body(&creds("http://x"))).unwrap();
        assert_eq!(
            body,
            json!({"auth": {"identity": {
                "methods": ["password"],
                "password": {"user": {
                    "name": "user",
                    "password": "pa$$w0rd",
                    "domain": {"name": "default"}
                }}
            }}})
        );
    }

    #[test]
    fn test_auth_body_project_name() {
        let c = creds("http://x")
            .with_tenant_name("cool project")
            .with_user_domain("users")
            .with_project_domain("example.com");
        let body = serde_json::to_value(auth_body(&c)).unwrap();
        assert_eq!(body["auth"]["identity"]["password"]["user"]["domain"]["name"], "users");
        assert_eq!(
            body["auth"]["scope"],
            json!({"project": {"name": "cool project", "domain": {"name": "example.com"}}})
        );
    }

    #[test]
    fn test_auth_body_project_id() {
        let c = creds("http://x").with_tenant_id("abcd").with_tenant_name("ignored");
        let body = serde_json::to_value(auth_body(&c)).unwrap();
        assert_eq!(body["auth"]["scope"], json!({"project": {"id": "abcd"}}));
    }

    #[test]
    fn test_auth_body_domain_overrides_project() {
        let c = creds("http://x").with_tenant_name("p1").with_domain("d1");
        let body = serde_json::to_value(auth_body(&c)).unwrap();
        assert_eq!(body["auth"]["scope"], json!({"domain": {"name": "d1"}}));
    }

    #[test]
    fn test_details_from_token() {
        let root: TokenRoot = serde_json::from_value(json!({"token": {
            "expires_at": "2030-01-01T00:00:00Z",
            "project": {"id": "p-id", "name": "p1"},
            "user": {"id": "u-id", "name": "user"},
            "catalog": [
                {"type": "compute", "endpoints": [
                    {"interface": "public", "region_id": "RegionOne", "url": "http://nova"},
                    {"interface": "internal", "region_id": "RegionOne", "url": "http://nova-int"},
                    {"interface": "public", "region": "RegionTwo", "url": "http://nova2"}
                ]}
            ]
        }}))
        .unwrap();
        let details = details_from_token("tok".to_string(), root.token);
        assert_eq!(details.token, "tok");
        assert_eq!(details.tenant_id, "p-id");
        assert_eq!(details.tenant_name, "p1");
        assert_eq!(details.user_id, "u-id");
        assert_eq!(details.domain, "");
        assert!(details.expires_at.is_some());
        assert_eq!(details.region_service_urls["RegionOne"]["compute"], "http://nova");
        assert_eq!(details.region_service_urls["RegionTwo"]["compute"], "http://nova2");
    }
}
