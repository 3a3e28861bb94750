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

use http::HeaderMap;
use http::StatusCode;

use crate::http_util::parse_content_length;
use crate::http_util::parse_content_range;
use crate::http_util::parse_etag;
use crate::http_util::parse_last_modified;
use crate::http_util::BytesRange;
use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// Whether the upstream honors byte-range requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RangeSupport {
    /// Not probed yet.
    Unknown,
    /// The upstream answered with `Accept-Ranges: bytes` or a
    /// `Content-Range`.
    Supported,
    /// The upstream answered without either marker.
    Unsupported,
}

/// The content identity of one resource version: the raw `ETag` and
/// `Last-Modified` values as the upstream sent them.
///
/// Either value may be empty. Comparison is byte-for-byte on the observed
/// strings; no date or tag parsing is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContentIdentity {
    etag: String,
    last_modified: String,
}

impl ContentIdentity {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        ContentIdentity {
            etag: parse_etag(headers).unwrap_or_default().to_string(),
            last_modified: parse_last_modified(headers).unwrap_or_default().to_string(),
        }
    }
}

/// The per-request state of one transfer, exclusively owned by the task
/// serving that request.
#[derive(Debug)]
pub(crate) struct TransferContext {
    /// Opaque resource identifier, forwarded verbatim to the upstream.
    pub path: String,
    /// The byte window the client asked for. Defaults to the full
    /// resource when no `Range` header was sent.
    pub requested: BytesRange,
    /// Whether the client sent a `Range` header at all. Drives the probe
    /// and the synthesized partial view.
    pub client_sent_range: bool,
    /// Total resource size, once learned from an upstream
    /// `Content-Length` or `Content-Range`.
    pub resource_length: Option<u64>,
    /// Upstream byte-range capability.
    pub ranges_supported: RangeSupport,
    /// Payload bytes already handed to the client. Monotonically
    /// non-decreasing, relative to `requested.first()`.
    pub bytes_sent: u64,
    /// Content identity latched from the first upstream response.
    pub identity: Option<ContentIdentity>,
    /// Whether the client response head has been sent. Once true, the
    /// status and headers are frozen; later failures can only surface as
    /// a severed connection.
    pub headers_committed: bool,
    /// Current retry ordinal. Grows on failures, shrinks on forward
    /// progress.
    pub attempt: u32,
}

impl TransferContext {
    pub fn new(path: &str, requested: Option<BytesRange>) -> Self {
        TransferContext {
            path: path.to_string(),
            client_sent_range: requested.is_some(),
            requested: requested.unwrap_or_default(),
            resource_length: None,
            ranges_supported: RangeSupport::Unknown,
            bytes_sent: 0,
            identity: None,
            headers_committed: false,
            attempt: 1,
        }
    }

    /// The absolute offset of the next byte the client is owed.
    pub fn needed_offset(&self) -> u64 {
        self.requested.first() + self.bytes_sent
    }

    /// Bytes still owed to the client, when the window is bounded.
    pub fn remaining(&self) -> Option<u64> {
        self.requested.len().map(|len| len - self.bytes_sent)
    }

    /// Latch the identity of `headers` on first sight, or verify it
    /// against the latched value.
    ///
    /// A mismatch is terminal for the transfer: the upstream is now
    /// serving a different resource version and resuming would splice
    /// bytes from two versions.
    pub fn latch_identity(&mut self, headers: &HeaderMap) -> Result<()> {
        let observed = ContentIdentity::from_headers(headers);

        match &self.identity {
            None => {
                self.identity = Some(observed);
                Ok(())
            }
            Some(latched) if *latched == observed => Ok(()),
            Some(latched) => Err(Error::new(
                ErrorKind::ConditionNotMatch,
                "upstream content changed between attempts",
            )
            .with_operation("TransferContext::latch_identity")
            .with_context("latched", format!("{latched:?}"))
            .with_context("observed", format!("{observed:?}"))),
        }
    }

    /// Learn the total resource length from an upstream response: from
    /// the `Content-Range` total when present, else from `Content-Length`
    /// on a full (200) response.
    pub fn learn_length(&mut self, status: StatusCode, headers: &HeaderMap) {
        if self.resource_length.is_some() {
            return;
        }

        if let Ok(Some(content_range)) = parse_content_range(headers) {
            self.resource_length = content_range.total();
        } else if status == StatusCode::OK {
            self.resource_length = parse_content_length(headers).unwrap_or(None);
        }
    }

    /// Bound an open-ended client window once the resource length is
    /// known, so delivery can be capped at the promised slice.
    ///
    /// When the upstream does not honor ranges, an oversized end is also
    /// clamped to the resource: the synthesized partial view must promise
    /// exactly what the full-body fetch can deliver. A range-capable
    /// upstream keeps the original window and gets to answer 416 itself.
    pub fn refine_window(&mut self) {
        let Some(length) = self.resource_length else {
            return;
        };
        if length <= self.requested.first() {
            return;
        }

        let end = length - 1;
        match self.requested.last() {
            None => self.requested = BytesRange::new(self.requested.first(), Some(end)),
            Some(last) if last > end && self.ranges_supported == RangeSupport::Unsupported => {
                self.requested = BytesRange::new(self.requested.first(), Some(end));
            }
            _ => {}
        }
    }
}
