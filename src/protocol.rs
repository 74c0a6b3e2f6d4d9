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

//! JSON structures for API version discovery.

use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};

use crate::ApiVersion;

/// A link to a resource.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct Link {
    /// Resource URL.
    pub href: Url,
    /// Relationship between the referencing and the referenced object.
    pub rel: String,
}

/// Status of a major version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VersionStatus {
    /// The current version.
    Current,
    /// Supported version (that is not current).
    Supported,
    /// Deprecated version.
    Deprecated,
    /// Unknown version status.
    #[default]
    Unknown,
}

impl<T> From<T> for VersionStatus
where
    T: Into<String>,
{
    fn from(value: T) -> VersionStatus {
        match value.into().to_uppercase().as_ref() {
            "CURRENT" => VersionStatus::Current,
            "SUPPORTED" | "STABLE" => VersionStatus::Supported,
            "DEPRECATED" => VersionStatus::Deprecated,
            _ => VersionStatus::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for VersionStatus {
    fn deserialize<D>(deserializer: D) -> Result<VersionStatus, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: String = Deserialize::deserialize(deserializer)?;
        Ok(value.into())
    }
}

/// A version reported by a version discovery document.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct VersionInfo {
    /// API version.
    #[serde(rename = "id")]
    pub version: ApiVersion,
    /// Links, the `self` one points to the versioned endpoint.
    #[serde(default)]
    pub links: Vec<Link>,
    /// Version status.
    #[serde(default)]
    pub status: VersionStatus,
}

impl VersionInfo {
    /// The link with the `self` relationship.
    pub fn self_link(&self) -> Option<&Link> {
        self.links.iter().find(|link| link.rel == "self")
    }
}

/// Either a plain list of versions or a `values` wrapper (Keystone style).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Versions {
    Values { values: Vec<VersionInfo> },
    List(Vec<VersionInfo>),
}

/// Root of a version discovery document.
#[derive(Debug, Deserialize)]
pub(crate) struct VersionsRoot {
    versions: Versions,
}

impl From<VersionsRoot> for Vec<VersionInfo> {
    fn from(value: VersionsRoot) -> Vec<VersionInfo> {
        match value.versions {
            Versions::Values { values } => values,
            Versions::List(list) => list,
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::{VersionInfo, VersionStatus, VersionsRoot};
    use crate::ApiVersion;

    const LIST_BODY: &str = r#"{
        "versions": [
            {"id": "v2.0", "status": "SUPPORTED", "updated": "2011-01-21T11:33:21Z",
             "links": [{"href": "http://localhost:3000/v2.0/", "rel": "self"}]},
            {"id": "v2.1", "status": "CURRENT",
             "links": [{"href": "http://localhost:3000/v2.1/", "rel": "self"},
                       {"href": "http://docs.openstack.org/", "rel": "describedby"}]}
        ]
    }"#;

    const VALUES_BODY: &str = r#"{
        "versions": {"values": [
            {"id": "v3.4", "status": "stable",
             "links": [{"href": "http://localhost:3003/v3/", "rel": "self"}]}
        ]}
    }"#;

    #[test]
    fn test_parse_list() {
        let root: VersionsRoot = serde_json::from_str(LIST_BODY).unwrap();
        let versions: Vec<VersionInfo> = root.into();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version, ApiVersion::new(2, 0));
        assert_eq!(versions[0].status, VersionStatus::Supported);
        assert_eq!(versions[1].status, VersionStatus::Current);
        let link = versions[1].self_link().unwrap();
        assert_eq!(link.href.path(), "/v2.1/");
    }

    #[test]
    fn test_parse_values() {
        let root: VersionsRoot = serde_json::from_str(VALUES_BODY).unwrap();
        let versions: Vec<VersionInfo> = root.into();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, ApiVersion::new(3, 4));
        assert_eq!(versions[0].status, VersionStatus::Supported);
    }

    #[test]
    fn test_parse_invalid_version() {
        let body = r#"{"versions": [{"id": "latest", "links": []}]}"#;
        assert!(serde_json::from_str::<VersionsRoot>(body).is_err());
    }
}
