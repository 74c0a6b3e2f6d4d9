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

//! Password authentication using Identity API v2.

use async_trait::async_trait;
use log::{debug, trace};
use reqwest::Method;
use static_assertions::assert_impl_all;

use super::protocol::{PasswordCredentials, V2Access, V2AccessRoot, V2Auth, V2AuthRoot};
use super::{AuthDetails, Credentials};
use crate::transport::HttpClient;
use crate::{Authenticator, Error, ErrorKind, RequestData};

/// Password authentication using Identity API v2.
///
/// Posts the credentials to `<url>/tokens`.
#[derive(Debug, Clone)]
pub struct UserPass {
    client: HttpClient,
}

assert_impl_all!(UserPass: Send, Sync);

impl UserPass {
    /// Create a password authenticator using the provided transport.
    #[inline]
    pub fn new(client: HttpClient) -> UserPass {
        UserPass { client }
    }
}

#[async_trait]
impl Authenticator for UserPass {
    async fn auth(&self, creds: &Credentials) -> Result<AuthDetails, Error> {
        let body = V2AuthRoot {
            auth: V2Auth {
                password_credentials: PasswordCredentials {
                    username: creds.user.clone(),
                    password: creds.secrets.clone(),
                },
                tenant_name: creds.tenant_name.clone(),
                tenant_id: creds.tenant_id.clone(),
            },
        };
        let url = format!("{}/tokens", creds.url.trim_end_matches('/'));

        let mut data = RequestData::new().with_json(&body)?;
        debug!("Requesting a v2 token from {}", url);
        self.client
            .json_request(Method::POST, &url, None, &mut data)
            .await
            .map_err(|e| e.context("requesting token"))?;

        let root = data.resp_json::<V2AccessRoot>()?;
        details_from_access(root.access)
    }
}

fn details_from_access(access: V2Access) -> Result<AuthDetails, Error> {
    if access.token.id.is_empty() {
        return Err(Error::new(
            ErrorKind::Unauthorized,
            "Did not get valid Token from auth request",
        ));
    }

    let tenant = access.token.tenant.unwrap_or_default();
    let mut details = AuthDetails {
        token: access.token.id,
        tenant_id: tenant.id,
        tenant_name: tenant.name,
        user_id: access.user.map(|u| u.id).unwrap_or_default(),
        ..AuthDetails::default()
    };

    for service in access.service_catalog {
        for endpoint in service.endpoints {
            if let Some(url) = endpoint
                .public_url
                .filter(|u| !u.is_empty())
                .or(endpoint.internal_url)
            {
                details.add_service_url(endpoint.region, service.service_type.clone(), url);
            }
        }
    }
    trace!("Received catalog: {:?}", details.region_service_urls);
    Ok(details)
}
