// Copyright 2017 Dmitry Tantsur <divius.inside@gmail.com>
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

//! Low-level code to work with the service catalog.

use log::{debug, error};

use super::identity::{RegionServiceUrls, ServiceUrls};
use super::{Error, ErrorKind};

/// Whether a catalog region applies to the configured region.
///
/// `zone1.RegionOne` accepts both `zone1.RegionOne` and `RegionOne`.
#[inline]
fn region_matches(configured: &str, candidate: &str) -> bool {
    configured == candidate
        || configured
            .strip_suffix(candidate)
            .map(|prefix| prefix.ends_with('.'))
            .unwrap_or(false)
}

/// Select the service URLs available in the configured region.
///
/// All matching regions are merged, URLs of an exact match take precedence. A catalog with
/// only one region is accepted as is when no region is configured or when that region is
/// unnamed.
pub(crate) fn select_region(urls: &RegionServiceUrls, region: &str) -> Result<ServiceUrls, Error> {
    let mut matching = urls
        .keys()
        .filter(|candidate| region_matches(region, candidate))
        .collect::<Vec<_>>();
    // Exact match last so that it wins.
    matching.sort_by_key(|candidate| (candidate.as_str() == region, candidate.as_str()));

    if matching.is_empty() {
        if urls.len() == 1 {
            // A catalog without region names (legacy authentication) serves any region.
            if let Some((name, services)) = urls
                .iter()
                .find(|(name, _)| region.is_empty() || name.is_empty())
            {
                debug!("Using the only available region {:?}", name);
                return Ok(services.clone());
            }
        }
        error!(
            "Region {:?} not found, available regions: {:?}",
            region,
            urls.keys().collect::<Vec<_>>()
        );
        return Err(Error::new(
            ErrorKind::EndpointNotFound,
            format!("invalid region {:?}", region),
        ));
    }

    let mut result = ServiceUrls::new();
    for name in matching {
        result.extend(
            urls[name]
                .iter()
                .map(|(service, url)| (service.clone(), url.clone())),
        );
    }
    debug!("Services available in region {:?}: {:?}", region, result);
    Ok(result)
}

/// Verify that all required services are available in the selected region.
pub(crate) fn check_required_services<S: AsRef<str>>(
    urls: &RegionServiceUrls,
    region: &str,
    selected: &ServiceUrls,
    required: &[S],
) -> Result<(), Error> {
    let missing = required
        .iter()
        .map(AsRef::as_ref)
        .filter(|service| !selected.contains_key(*service))
        .collect::<Vec<_>>();
    if missing.is_empty() {
        return Ok(());
    }

    let mut message = format!(
        "the configured region {:?} does not allow access to all required services, namely: {}\n\
         access to these services is missing: {}",
        region,
        required
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", "),
        missing.join(", ")
    );

    let mut suitable = urls
        .iter()
        .filter(|(name, _)| !region_matches(region, name))
        .filter(|(_, services)| missing.iter().all(|s| services.contains_key(*s)))
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>();
    if !suitable.is_empty() {
        suitable.sort_unstable();
        message.push_str(&format!(
            "\none of these regions may be suitable instead: {}",
            suitable.join(", ")
        ));
    }

    Err(Error::new(ErrorKind::EndpointNotFound, message))
}
