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

use http::header::HeaderName;
use http::header::HeaderValue;
use http::header::ACCEPT_RANGES;
use http::header::CONTENT_RANGE;
use http::HeaderMap;
use http::StatusCode;

use super::context::TransferContext;
use crate::http_util::parse_content_length;
use crate::http_util::parse_content_range;
use crate::http_util::BytesContentRange;

/// The head of the client response, composed exactly once per transfer.
#[derive(Debug)]
pub(crate) struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Carried apart from `headers` so the serving layer frames the body
    /// consistently with what the transfer will deliver.
    pub content_length: Option<u64>,
}

/// Compose the client response head from the first upstream response that
/// passed validation.
///
/// Every end-to-end upstream header is copied through. When the client
/// asked for a range the upstream did not honor, the partial view is
/// synthesized on top: `Accept-Ranges`, a `Content-Length` for the slice
/// the client expects, and a `Content-Range` whose total comes from the
/// learned resource length. The synthesized `Content-Range` is omitted
/// when the total is unknown rather than invented.
pub(crate) fn compose(
    ctx: &TransferContext,
    status: StatusCode,
    upstream: &HeaderMap,
) -> ResponseHead {
    let mut headers = copy_end_to_end(upstream);
    let mut content_length = parse_content_length(upstream).unwrap_or(None);

    let honored = matches!(parse_content_range(upstream), Ok(Some(_)));
    if ctx.client_sent_range && !honored {
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));

        let first = ctx.requested.first();
        match (ctx.requested.last(), ctx.resource_length) {
            (Some(last), total) => {
                content_length = Some(last - first + 1);
                if let Some(total) = total {
                    let range = BytesContentRange::new(first, last, Some(total));
                    headers.insert(
                        CONTENT_RANGE,
                        HeaderValue::from_str(&range.to_string())
                            .expect("content-range value must be a valid header"),
                    );
                }
            }
            (None, Some(total)) => {
                content_length = Some(total.saturating_sub(first));
            }
            (None, None) => {}
        }
    }

    ResponseHead {
        status,
        headers,
        content_length,
    }
}

/// Compose the head for an authoritative upstream answer that is passed
/// through untouched (no synthesis, no resumption).
pub(crate) fn forwarded(status: StatusCode, upstream: &HeaderMap) -> ResponseHead {
    ResponseHead {
        status,
        headers: copy_end_to_end(upstream),
        content_length: parse_content_length(upstream).unwrap_or(None),
    }
}

/// Headers that must not travel through a proxy hop, plus
/// `Content-Length` which is carried as a typed field instead.
fn is_dropped(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}

fn copy_end_to_end(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    let mut dropped = false;
    for (name, value) in upstream.iter() {
        if is_dropped(name) {
            dropped = true;
            continue;
        }
        headers.append(name, value.clone());
    }
    if dropped {
        log::debug!(target: "rangerelay::framing", "dropped hop-by-hop upstream headers");
    }
    headers
}
