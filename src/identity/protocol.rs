// Copyright 2018 Dmitry Tantsur <dtantsur@protonmail.com>
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

//! JSON structures and protocol bits for the Identity V2 and V3 APIs.

#![allow(missing_docs)]

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// Identity API v2

#[derive(Clone, Debug, Serialize)]
pub struct PasswordCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct V2Auth {
    pub password_credentials: PasswordCredentials,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct V2AuthRoot {
    pub auth: V2Auth,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct V2Tenant {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct V2Token {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tenant: Option<V2Tenant>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct V2User {
    #[serde(default)]
    pub id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct V2Endpoint {
    #[serde(default)]
    pub region: String,
    #[serde(rename = "publicURL", default)]
    pub public_url: Option<String>,
    #[serde(rename = "internalURL", default)]
    pub internal_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct V2Service {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub endpoints: Vec<V2Endpoint>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct V2Access {
    pub token: V2Token,
    #[serde(default)]
    pub user: Option<V2User>,
    #[serde(rename = "serviceCatalog", default)]
    pub service_catalog: Vec<V2Service>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct V2AccessRoot {
    pub access: V2Access,
}

// Identity API v3

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Domain {
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct UserAndPassword {
    pub name: String,
    pub password: String,
    pub domain: Domain,
}

#[derive(Clone, Debug, Serialize)]
pub struct PasswordAuth {
    pub user: UserAndPassword,
}

#[derive(Clone, Debug, Serialize)]
pub struct PasswordIdentity {
    pub methods: Vec<String>,
    pub password: PasswordAuth,
}

#[derive(Clone, Debug, Serialize)]
pub struct Project {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Project(Project),
    Domain(Domain),
}

#[derive(Clone, Debug, Serialize)]
pub struct V3Auth {
    pub identity: PasswordIdentity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

#[derive(Clone, Debug, Serialize)]
pub struct V3AuthRoot {
    pub auth: V3Auth,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct IdAndName {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Endpoint {
    pub interface: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    pub url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CatalogRecord {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub project: Option<IdAndName>,
    #[serde(default)]
    pub user: Option<IdAndName>,
    #[serde(default)]
    pub domain: Option<IdAndName>,
    #[serde(default)]
    pub expires_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub catalog: Vec<CatalogRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TokenRoot {
    pub token: Token,
}

#[cfg(test)]
pub mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_v2_auth_serialize() {
        let body = V2AuthRoot {
            auth: V2Auth {
                password_credentials: PasswordCredentials {
                    username: "joe".to_string(),
                    password: "secret".to_string(),
                },
                tenant_name: Some("tenant".to_string()),
                tenant_id: None,
            },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"auth": {
                "passwordCredentials": {"username": "joe", "password": "secret"},
                "tenantName": "tenant"
            }})
        );
    }

    #[test]
    fn test_v3_scope_serialize() {
        let project = Scope::Project(Project {
            id: None,
            name: Some("p1".to_string()),
            domain: Some(Domain {
                name: "default".to_string(),
            }),
        });
        assert_eq!(
            serde_json::to_value(&project).unwrap(),
            json!({"project": {"name": "p1", "domain": {"name": "default"}}})
        );
        let domain = Scope::Domain(Domain {
            name: "d1".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&domain).unwrap(),
            json!({"domain": {"name": "d1"}})
        );
    }

    #[test]
    fn test_v3_token_deserialize() {
        let root: TokenRoot = serde_json::from_value(json!({"token": {
            "expires_at": "2015-11-05T22:00:11.000000Z",
            "project": {"id": "p-id", "name": "p1", "domain": {"id": "default"}},
            "user": {"id": "u-id", "name": "joe"},
            "catalog": [{"type": "compute", "endpoints": [
                {"interface": "public", "region_id": "RegionOne", "url": "http://nova"}
            ]}]
        }}))
        .unwrap();
        assert_eq!(root.token.project.unwrap().id, "p-id");
        assert_eq!(root.token.catalog[0].endpoints[0].region_id.as_deref(), Some("RegionOne"));
        assert!(root.token.expires_at.is_some());
    }
}
