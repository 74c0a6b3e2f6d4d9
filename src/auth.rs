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

//! Base code for authentication.

use std::fmt::Debug;

use async_trait::async_trait;
use static_assertions::assert_obj_safe;

use super::identity::{AuthDetails, Credentials};
use super::Error;

/// Trait for an authentication strategy.
///
/// An authenticator exchanges credentials for an [AuthDetails](identity/struct.AuthDetails.html)
/// record: a token, the identity of the caller and the service catalog grouped by region.
/// It does not cache anything, the [AuthenticatingClient](struct.AuthenticatingClient.html)
/// takes care of that.
///
/// ```rust
/// use async_trait::async_trait;
/// use goose::identity::{AuthDetails, Credentials};
///
/// #[derive(Debug)]
/// struct FixedToken(String);
///
/// #[async_trait]
/// impl goose::Authenticator for FixedToken {
///     async fn auth(&self, creds: &Credentials) -> Result<AuthDetails, goose::Error> {
///         let mut details = AuthDetails {
///             token: self.0.clone(),
///             ..AuthDetails::default()
///         };
///         details.add_service_url(creds.region(), "compute", "http://127.0.0.1/compute");
///         Ok(details)
///     }
/// }
/// ```
#[async_trait]
pub trait Authenticator: Debug + Sync + Send {
    /// Authenticate with the provided credentials.
    async fn auth(&self, creds: &Credentials) -> Result<AuthDetails, Error>;
}

assert_obj_safe!(Authenticator);
