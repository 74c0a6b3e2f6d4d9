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

//! Handy primitives for working with URLs.

use reqwest::Url;

/// Non-empty segments of a URL path.
#[inline]
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|x| !x.is_empty())
}

/// Join path pieces, collapsing redundant slashes and dropping the trailing one.
///
/// The result always starts with a slash.
pub fn clean_path<I>(pieces: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut result = String::new();
    for piece in pieces {
        for segment in segments(piece.as_ref()) {
            result.push('/');
            result.push_str(segment);
        }
    }
    if result.is_empty() {
        result.push('/');
    }
    result
}

/// Replace the path of a URL, dropping its query and fragment.
#[inline]
pub fn with_path(url: &Url, path: &str) -> Url {
    let mut result = url.clone();
    result.set_path(path);
    result.set_query(None);
    result.set_fragment(None);
    result
}

/// Append `parts` to `base` separated by slashes.
///
/// A trailing slash of the last part is preserved. Without parts `base` is returned as is.
pub fn append_parts<S: AsRef<str>>(base: &str, parts: &[S]) -> String {
    if parts.is_empty() {
        return base.to_string();
    }

    let mut result = base.trim_end_matches('/').to_string();
    for part in parts {
        for segment in segments(part.as_ref()) {
            result.push('/');
            result.push_str(segment);
        }
    }
    let keep_slash = parts
        .last()
        .map(|p| p.as_ref().ends_with('/'))
        .unwrap_or(false);
    if keep_slash && !result.ends_with('/') {
        result.push('/');
    }
    result
}
