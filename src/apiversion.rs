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

//! ApiVersion implementation.

use std::fmt;
use std::str::FromStr;

use serde::de::{Error as DeserError, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Error, ErrorKind};

/// API version as found in service URLs (`v2.1`, `v3`).
///
/// Either component may be unspecified. An empty string parses into a version with both
/// components unspecified, which means "use the catalog URL as it is".
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ApiVersion {
    /// Major version, `None` if unspecified.
    pub major: Option<u16>,
    /// Minor version, `None` if unspecified.
    pub minor: Option<u16>,
}

impl ApiVersion {
    /// Version with both components unspecified.
    pub const UNSPECIFIED: ApiVersion = ApiVersion {
        major: None,
        minor: None,
    };

    /// Create a version with both components specified.
    #[inline]
    pub const fn new(major: u16, minor: u16) -> ApiVersion {
        ApiVersion {
            major: Some(major),
            minor: Some(minor),
        }
    }

    /// Create a version with only the major component.
    #[inline]
    pub const fn major_only(major: u16) -> ApiVersion {
        ApiVersion {
            major: Some(major),
            minor: None,
        }
    }

    /// Whether no component is specified.
    #[inline]
    pub fn is_unspecified(&self) -> bool {
        self.major.is_none() && self.minor.is_none()
    }

    /// Whether this (discovered) version satisfies the requested one.
    ///
    /// Majors must be equal, minors only if the request specifies one.
    pub fn satisfies(&self, requested: &ApiVersion) -> bool {
        self.major == requested.major
            && (requested.minor.is_none() || self.minor == requested.minor)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.major, self.minor) {
            (Some(major), Some(minor)) => write!(f, "v{}.{}", major, minor),
            (Some(major), None) => write!(f, "v{}", major),
            _ => Ok(()),
        }
    }
}

fn parse_component(component: &str) -> Result<u16, Error> {
    component.parse().map_err(|e| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("invalid version component {:?}: {}", component, e),
        )
    })
}

impl FromStr for ApiVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<ApiVersion, Error> {
        if s.is_empty() {
            return Ok(ApiVersion::UNSPECIFIED);
        }

        let version_part = s.strip_prefix('v').unwrap_or(s);
        let mut parts = version_part.splitn(2, '.');
        // splitn always yields at least one item
        let major = parse_component(parts.next().unwrap_or_default())?;
        let minor = parts.next().map(parse_component).transpose()?;

        Ok(ApiVersion {
            major: Some(major),
            minor,
        })
    }
}

impl Serialize for ApiVersion {
    fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

struct ApiVersionVisitor;

impl<'de> Visitor<'de> for ApiVersionVisitor {
    type Value = ApiVersion;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a string in format vX.Y or vX")
    }

    fn visit_str<E>(self, value: &str) -> ::std::result::Result<ApiVersion, E>
    where
        E: DeserError,
    {
        ApiVersion::from_str(value).map_err(DeserError::custom)
    }
}

impl<'de> Deserialize<'de> for ApiVersion {
    fn deserialize<D>(deserializer: D) -> ::std::result::Result<ApiVersion, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(ApiVersionVisitor)
    }
}
