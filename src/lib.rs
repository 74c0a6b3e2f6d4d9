// Copyright 2019 Dmitry Tantsur <divius.inside@gmail.com>
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

//! Asynchronous authenticating OpenStack client core.
//!
//! The [AuthenticatingClient](struct.AuthenticatingClient.html) authenticates against an
//! identity service using one of the [authentication modes](identity/enum.AuthMode.html),
//! resolves service types and API versions into URLs of the configured region and sends JSON
//! or binary requests, retrying rate-limited ones.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), goose::Error> {
//! use goose::identity::{AuthMode, Credentials};
//!
//! let creds = Credentials::new("https://cloud.local/identity", "admin", "pa$$w0rd")
//!     .with_tenant_name("project1")
//!     .with_region("RegionOne");
//! let client = goose::ClientBuilder::new(creds, AuthMode::V3UserPass).build()?;
//!
//! let mut data = goose::RequestData::new().expecting_json();
//! client
//!     .send_request(reqwest::Method::GET, "compute", "v2.1", "flavors", &mut data)
//!     .await?;
//! println!("{:?}", data.resp_value);
//! # Ok(()) }
//! ```

#![crate_name = "goose"]
#![crate_type = "lib"]
// NOTE: we do not use generic deny(warnings) to avoid breakages with new
// versions of the compiler. Add more warnings here as you discover them.
// Taken from https://github.com/rust-unofficial/patterns/
#![deny(
    dead_code,
    improper_ctypes,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    trivial_casts,
    trivial_numeric_casts,
    unconditional_recursion,
    unsafe_code,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_doc_comments,
    unused_import_braces,
    unused_parens,
    unused_qualifications,
    unused_results,
    while_true
)]
#![allow(
    clippy::new_ret_no_self,
    clippy::should_implement_trait,
    clippy::wrong_self_convention
)]

mod apiversion;
mod auth;
mod cache;
mod catalog;
pub mod client;
mod error;
pub mod identity;
mod protocol;
mod request;
mod retry;
pub mod transport;
mod url;

pub use crate::apiversion::ApiVersion;
pub use crate::auth::Authenticator;
pub use crate::client::{AuthenticatingClient, ClientBuilder};
pub use crate::error::{Error, ErrorKind};
pub use crate::protocol::{Link, VersionInfo, VersionStatus};
pub use crate::request::RequestData;
pub use crate::retry::RetryPolicy;
pub use crate::transport::{DefaultHeaders, HeadersProvider, HttpClient};
