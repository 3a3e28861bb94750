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

/// BytesContentRange is the parsed value of a `Content-Range` response
/// header in its satisfied form:
///
/// ```text
/// Content-Range: bytes <start>-<end>/<total>
/// Content-Range: bytes <start>-<end>/*
/// ```
///
/// `start` and `end` are inclusive byte offsets; `total` is the complete
/// resource length when the upstream knows it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BytesContentRange {
    start: u64,
    end: u64,
    total: Option<u64>,
}

impl BytesContentRange {
    /// Create a new `BytesContentRange`.
    pub fn new(start: u64, end: u64, total: Option<u64>) -> Self {
        BytesContentRange { start, end, total }
    }

    /// First byte offset the response body starts at.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte offset the response body covers, inclusive.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Complete resource length, if the upstream reported one.
    pub fn total(&self) -> Option<u64> {
        self.total
    }
}

impl Display for BytesContentRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.total {
            Some(total) => write!(f, "bytes {}-{}/{}", self.start, self.end, total),
            None => write!(f, "bytes {}-{}/*", self.start, self.end),
        }
    }
}

impl FromStr for BytesContentRange {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = || {
            Error::new(ErrorKind::Unexpected, "content-range header is invalid")
                .with_operation("BytesContentRange::from_str")
                .with_context("value", value)
        };

        let s = value.strip_prefix("bytes ").ok_or_else(invalid)?;

        let (range, total) = s.split_once('/').ok_or_else(invalid)?;
        let (start, end) = range.split_once('-').ok_or_else(invalid)?;

        let parse_int_error = |e: std::num::ParseIntError| invalid().set_source(e);

        let start: u64 = start.parse().map_err(parse_int_error)?;
        let end: u64 = end.parse().map_err(parse_int_error)?;
        if end < start {
            return Err(invalid());
        }

        let total = match total {
            "*" => None,
            v => Some(v.parse().map_err(parse_int_error)?),
        };

        Ok(BytesContentRange::new(start, end, total))
    }
}
