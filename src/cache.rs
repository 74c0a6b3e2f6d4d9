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

//! API version discovery and its cache.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace, warn};
use reqwest::{Method, StatusCode, Url};
use tokio::sync::Mutex;

use crate::protocol::{Link, VersionInfo, VersionStatus, VersionsRoot};
use crate::transport::HttpClient;
use crate::url::{clean_path, segments, with_path};
use crate::{ApiVersion, Error, ErrorKind, RequestData};

const SELF_REL: &str = "self";

/// Version information for one service catalog URL.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ApiUrlVersion {
    /// URL without the version and the suffix.
    pub root: Url,
    /// Part of the catalog URL that follows the version (e.g. the project ID).
    pub suffix: String,
    /// Versions reported by the service, in server order.
    pub versions: Vec<VersionInfo>,
}

impl ApiUrlVersion {
    /// Split a catalog URL around its version segment.
    ///
    /// `http://host:8774/v2/010ab` becomes `http://host:8774/` with suffix `010ab`,
    /// `http://host/image` becomes `http://host/image/` with an empty suffix.
    pub fn from_catalog_url(catalog_url: &Url) -> ApiUrlVersion {
        let parts = segments(catalog_url.path()).collect::<Vec<_>>();
        let (root, suffix) = match parts.iter().position(|p| p.parse::<ApiVersion>().is_ok()) {
            Some(idx) => (&parts[..idx], &parts[idx + 1..]),
            None => (&parts[..], &parts[parts.len()..]),
        };

        let mut root_path = clean_path(root);
        if !root_path.ends_with('/') {
            root_path.push('/');
        }
        ApiUrlVersion {
            root: with_path(catalog_url, &root_path),
            suffix: suffix.join("/"),
            versions: Vec::new(),
        }
    }

    /// Pseudo-discovery result for object-store endpoints.
    ///
    /// Satisfies requests for `""`, `v1` and `v1.0`.
    pub fn object_store(catalog_url: &Url) -> ApiUrlVersion {
        let root = with_path(catalog_url, "/");
        let link = Link {
            href: root.clone(),
            rel: SELF_REL.to_string(),
        };
        let info = |version| VersionInfo {
            version,
            links: vec![link.clone()],
            status: VersionStatus::Supported,
        };
        ApiUrlVersion {
            suffix: segments(catalog_url.path()).collect::<Vec<_>>().join("/"),
            versions: vec![
                info(ApiVersion::new(1, 0)),
                info(ApiVersion::UNSPECIFIED),
            ],
            root,
        }
    }

    /// Build a versioned service URL for the requested version.
    ///
    /// The first version (in server order) that satisfies the request wins.
    pub fn version_url(&self, requested: ApiVersion) -> Result<Url, Error> {
        let link_path = self
            .versions
            .iter()
            .filter(|info| info.version.satisfies(&requested))
            .find_map(|info| info.self_link())
            .map(|link| link.href.path())
            .ok_or_else(|| {
                Error::new(ErrorKind::EndpointNotFound, "could not find matching URL")
            })?;

        let mut root_path = self.root.path();
        // Some services return links that already include the root path.
        if root_path != "/" && link_path.starts_with(root_path) {
            trace!(
                "version href path {:?} overlaps with url path {:?}, using version href",
                link_path,
                root_path
            );
            root_path = "/";
        }

        let path = clean_path(&[root_path, link_path, self.suffix.as_str()]);
        Ok(with_path(&self.root, &path))
    }
}

/// Per-client cache of version information keyed by the catalog URL.
///
/// One lock guards the whole cache and is held during discovery, so a slow service root
/// delays lookups for all services (up to the request timeout).
#[derive(Debug, Default)]
pub(crate) struct VersionCache {
    info: Mutex<HashMap<String, Arc<ApiUrlVersion>>>,
}

impl VersionCache {
    /// Create a new empty cache.
    #[inline]
    pub fn new() -> VersionCache {
        VersionCache::default()
    }

    /// Forget all cached information.
    pub async fn clear(&self) {
        self.info.lock().await.clear();
    }

    /// Get the API versions for a catalog URL, fetching them if needed.
    ///
    /// A failed discovery is cached as an empty version list.
    pub async fn get_api_versions(
        &self,
        client: &HttpClient,
        token: &str,
        catalog_url: &str,
        object_store_url: Option<&str>,
    ) -> Result<Arc<ApiUrlVersion>, Error> {
        // The lock is held during discovery so that concurrent callers do not repeat it.
        let mut lock = self.info.lock().await;
        if let Some(info) = lock.get(catalog_url) {
            return Ok(Arc::clone(info));
        }

        let url = Url::parse(catalog_url).map_err(|e| {
            Error::new(
                ErrorKind::InvalidConfig,
                format!("Invalid URL {:?} in the service catalog: {}", catalog_url, e),
            )
        })?;

        let info = match object_store_url {
            Some(swift) if !swift.is_empty() && catalog_url.contains(swift) => {
                ApiUrlVersion::object_store(&url)
            }
            _ => {
                let mut info = ApiUrlVersion::from_catalog_url(&url);
                debug!(
                    "No cached version information for {}, fetching from {}",
                    catalog_url, info.root
                );
                info.versions = discover(client, token, &info.root).await;
                info
            }
        };

        let info = Arc::new(info);
        let _ = lock.insert(catalog_url.to_string(), Arc::clone(&info));
        Ok(info)
    }
}

async fn discover(client: &HttpClient, token: &str, root: &Url) -> Vec<VersionInfo> {
    let mut data = RequestData::new()
        .expecting_json()
        .with_expected_status(&[StatusCode::OK, StatusCode::MULTIPLE_CHOICES]);
    if let Err(e) = client
        .json_request(Method::GET, root.as_str(), Some(token), &mut data)
        .await
    {
        warn!("API version discovery failed: {}", e);
        return Vec::new();
    }

    match data.resp_json::<VersionsRoot>() {
        Ok(root) => {
            let versions: Vec<VersionInfo> = root.into();
            debug!("Discovered API versions: {:?}", versions);
            versions
        }
        Err(e) => {
            warn!("API version discovery returned an unexpected body: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod test {
    use reqwest::Url;
    use serde_json::json;

    use super::ApiUrlVersion;
    use crate::protocol::VersionsRoot;
    use crate::{ApiVersion, ErrorKind};

    fn parse(url: &str) -> ApiUrlVersion {
        ApiUrlVersion::from_catalog_url(&Url::parse(url).unwrap())
    }

    fn with_versions(mut info: ApiUrlVersion, host: &str) -> ApiUrlVersion {
        let root: VersionsRoot = serde_json::from_value(json!({"versions": [
            {"id": "v2.0", "status": "SUPPORTED",
             "links": [{"href": format!("{}/v2/", host), "rel": "self"}]},
            {"id": "v2.1", "status": "CURRENT",
             "links": [{"href": format!("{}/v2.1/", host), "rel": "self"}]},
        ]}))
        .unwrap();
        info.versions = root.into();
        info
    }

    #[test]
    fn test_split_catalog_url() {
        let info = parse("http://localhost:8774/v2/010ab46135ba414882641f663ec917b6");
        assert_eq!(info.root.as_str(), "http://localhost:8774/");
        assert_eq!(info.suffix, "010ab46135ba414882641f663ec917b6");

        let info = parse("http://localhost/compute/v2/9032a0051293421eb20b64da69d46252");
        assert_eq!(info.root.as_str(), "http://localhost/compute/");
        assert_eq!(info.suffix, "9032a0051293421eb20b64da69d46252");

        let info = parse("http://localhost/image");
        assert_eq!(info.root.as_str(), "http://localhost/image/");
        assert_eq!(info.suffix, "");

        let info = parse("http://localhost/volumev1/v2");
        assert_eq!(info.root.as_str(), "http://localhost/volumev1/");
        assert_eq!(info.suffix, "");

        let info = parse("http://localhost:9292");
        assert_eq!(info.root.as_str(), "http://localhost:9292/");
        assert_eq!(info.suffix, "");
    }

    #[test]
    fn test_version_url() {
        let info = with_versions(parse("http://localhost:8774/v2/010ab"), "http://localhost:8774");
        assert_eq!(
            info.version_url(ApiVersion::new(2, 1)).unwrap().as_str(),
            "http://localhost:8774/v2.1/010ab"
        );
        assert_eq!(
            info.version_url(ApiVersion::new(2, 0)).unwrap().as_str(),
            "http://localhost:8774/v2/010ab"
        );
    }

    #[test]
    fn test_version_url_first_match_wins() {
        let mut info = parse("http://localhost:8774");
        let root: VersionsRoot = serde_json::from_value(json!({"versions": {"values": [
            {"id": "v2.1", "links": [{"href": "http://localhost:8774/v2.1/", "rel": "self"}]},
            {"id": "v2.0", "links": [{"href": "http://localhost:8774/v2/", "rel": "self"}]},
        ]}}))
        .unwrap();
        info.versions = root.into();
        assert_eq!(
            info.version_url(ApiVersion::major_only(2)).unwrap().as_str(),
            "http://localhost:8774/v2.1"
        );
    }

    #[test]
    fn test_version_url_overlapping_root() {
        let mut info = parse("http://localhost/compute");
        let root: VersionsRoot = serde_json::from_value(json!({"versions": [
            {"id": "v4.2", "links": [{"href": "http://localhost/compute/v4.2/", "rel": "self"}]},
            {"id": "v2.1", "links": [{"href": "http://localhost/v2.1/", "rel": "self"}]},
        ]}))
        .unwrap();
        info.versions = root.into();
        assert_eq!(
            info.version_url(ApiVersion::new(4, 2)).unwrap().as_str(),
            "http://localhost/compute/v4.2"
        );
        assert_eq!(
            info.version_url(ApiVersion::new(2, 1)).unwrap().as_str(),
            "http://localhost/compute/v2.1"
        );
    }

    #[test]
    fn test_version_url_no_match() {
        let info = with_versions(parse("http://localhost:8774/v2/010ab"), "http://localhost:8774");
        for version in &[ApiVersion::major_only(0), ApiVersion::new(25, 4), ApiVersion::new(2, 5)] {
            let err = info.version_url(*version).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::EndpointNotFound);
            assert_eq!(err.message(), "could not find matching URL");
        }
    }

    #[test]
    fn test_object_store() {
        let url = Url::parse("http://localhost/swift/v1/AUTH_tenant").unwrap();
        let info = ApiUrlVersion::object_store(&url);
        assert_eq!(info.root.as_str(), "http://localhost/");
        assert_eq!(info.suffix, "swift/v1/AUTH_tenant");
        assert_eq!(
            info.version_url(ApiVersion::major_only(1)).unwrap().as_str(),
            "http://localhost/swift/v1/AUTH_tenant"
        );
        assert_eq!(
            info.version_url(ApiVersion::new(1, 0)).unwrap().as_str(),
            "http://localhost/swift/v1/AUTH_tenant"
        );
        let _ = info.version_url(ApiVersion::new(1, 7)).unwrap_err();
    }
}
