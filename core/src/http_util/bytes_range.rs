// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// BytesRange carries the byte window of a transfer as the absolute
/// interval `[first, last]`, with `last` possibly unknown.
///
/// BytesRange implements `ToString` which can be used as the value part of
/// a `Range` HTTP header directly via [`BytesRange::to_header`].
///
/// `<unit>` is always `bytes`. The accepted input shapes are:
///
/// ```text
/// Range: bytes=<first>-<last>
/// Range: bytes=<first>-
/// Range: bytes=-<last>
/// ```
///
/// # Notes
///
/// The suffix shape `bytes=-<n>` is mapped to the window `[0, n]`, i.e.
/// the first `n + 1` bytes. This intentionally diverges from the RFC 7233
/// reading ("the last n bytes") and matches what the rest of the transfer
/// pipeline expects; multi-range headers are rejected outright.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BytesRange(
    /// First byte offset of the window.
    u64,
    /// Last byte offset of the window, inclusive. `None` means the window
    /// extends to the end of the resource.
    Option<u64>,
);

impl Default for BytesRange {
    fn default() -> Self {
        BytesRange(0, None)
    }
}

impl BytesRange {
    /// Create a new `BytesRange`.
    ///
    /// `last` is inclusive: `BytesRange::new(0, Some(0))` is a one-byte
    /// window.
    pub fn new(first: u64, last: Option<u64>) -> Self {
        BytesRange(first, last)
    }

    /// First byte offset of the window.
    pub fn first(&self) -> u64 {
        self.0
    }

    /// Last byte offset of the window, if known.
    pub fn last(&self) -> Option<u64> {
        self.1
    }

    /// Window length in bytes, when the window is bounded.
    pub fn len(&self) -> Option<u64> {
        self.1.map(|last| last - self.0 + 1)
    }

    /// Check if this range covers the full resource.
    ///
    /// If this range is full, we don't need to specify it in an http
    /// request.
    pub fn is_full(&self) -> bool {
        self.0 == 0 && self.1.is_none()
    }

    /// The window shifted forward by `n` bytes of progress, keeping the
    /// same end. Used to request the not-yet-delivered suffix.
    pub fn advance(&self, n: u64) -> Self {
        BytesRange(self.0 + n, self.1)
    }

    /// Convert bytes range into a `Range` header value.
    pub fn to_header(&self) -> String {
        format!("bytes={self}")
    }
}

impl Display for BytesRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.1 {
            Some(last) => write!(f, "{}-{}", self.0, last),
            None => write!(f, "{}-", self.0),
        }
    }
}

impl FromStr for BytesRange {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = || {
            Error::new(ErrorKind::RangeInvalid, "range header is invalid")
                .with_operation("BytesRange::from_str")
                .with_context("value", value)
        };

        let s = value.strip_prefix("bytes=").ok_or_else(invalid)?;

        if s.contains(',') {
            return Err(invalid().with_context("reason", "multiple ranges are not supported"));
        }

        let v = s.split('-').collect::<Vec<_>>();
        if v.len() != 2 {
            return Err(invalid());
        }

        let parse_int_error = |e: std::num::ParseIntError| invalid().set_source(e);

        if v[1].is_empty() {
            // <first>-
            Ok(BytesRange::new(
                v[0].parse().map_err(parse_int_error)?,
                None,
            ))
        } else if v[0].is_empty() {
            // -<last>, mapped to [0, last] (see the type-level notes).
            Ok(BytesRange::new(
                0,
                Some(v[1].parse().map_err(parse_int_error)?),
            ))
        } else {
            // <first>-<last>
            let first: u64 = v[0].parse().map_err(parse_int_error)?;
            let last: u64 = v[1].parse().map_err(parse_int_error)?;
            if last < first {
                return Err(invalid().with_context("reason", "last is smaller than first"));
            }
            Ok(BytesRange::new(first, Some(last)))
        }
    }
}
