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

use http::header::RANGE;
use http::Method;
use http::Request;
use http::Response;
use http::StatusCode;
use log::debug;
use log::warn;

use super::backoff::Backoff;
use crate::http_util::new_request_build_error;
use crate::http_util::ByteStream;
use crate::http_util::BytesRange;
use crate::http_util::HttpClient;
use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// The upstream answered with content we can stream: 200 or 206.
pub(crate) fn is_success(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::PARTIAL_CONTENT
}

/// The upstream answer is authoritative and must be taken at face value:
/// client errors and the lower server-error band. Statuses above 549 are
/// gateway noise and treated as transient instead.
pub(crate) fn is_authoritative(status: StatusCode) -> bool {
    (400..550).contains(&status.as_u16())
}

/// Issue one upstream request, retrying connection-level failures and
/// non-authoritative statuses with the quadratic backoff.
///
/// Returns the first response in the success band (200/206) or the
/// authoritative band (4xx through 549); the caller dispatches on the
/// status. Permanent send errors abort immediately; everything else is
/// retried up to `max_retries` times before the last error is returned,
/// marked persistent.
pub(crate) async fn fetch_with_retry(
    client: &HttpClient,
    method: Method,
    url: &str,
    range: Option<&BytesRange>,
    max_retries: u32,
    backoff: &Backoff,
) -> Result<Response<ByteStream>> {
    let max_retries = max_retries.max(1);
    let mut last_err: Option<Error> = None;

    for attempt in 1..=max_retries {
        let mut builder = Request::builder().method(method.clone()).uri(url);
        if let Some(range) = range {
            if !range.is_full() {
                builder = builder.header(RANGE, range.to_header());
            }
        }
        let req = builder.body(()).map_err(new_request_build_error)?;

        match client.send(req).await {
            Ok(resp) if is_success(resp.status()) => {
                debug!(
                    target: "rangerelay::fetch",
                    "{method} {url}: {} {:?}",
                    resp.status(),
                    resp.headers()
                );
                return Ok(resp);
            }
            Ok(resp) if is_authoritative(resp.status()) => {
                debug!(
                    target: "rangerelay::fetch",
                    "{method} {url}: authoritative {}",
                    resp.status()
                );
                return Ok(resp);
            }
            Ok(resp) => {
                last_err = Some(
                    Error::new(
                        ErrorKind::Unexpected,
                        format!("upstream returned status {}", resp.status()),
                    )
                    .with_operation("fetch_with_retry")
                    .with_context("url", url)
                    .set_temporary(),
                );
            }
            Err(err) => {
                if !err.is_temporary() {
                    return Err(err.with_operation("fetch_with_retry"));
                }
                last_err = Some(err);
            }
        }

        if attempt < max_retries {
            let delay = backoff.delay(attempt);
            if let Some(err) = &last_err {
                warn!(
                    target: "rangerelay::fetch",
                    "upstream fetch failed, retrying in {delay:?} ({attempt}/{max_retries}): {err}"
                );
            }
            tokio::time::sleep(delay).await;
        }
    }

    Err(last_err
        .unwrap_or_else(|| {
            Error::new(ErrorKind::Unexpected, "upstream fetch failed")
                .with_operation("fetch_with_retry")
                .with_context("url", url)
        })
        .set_persistent())
}
