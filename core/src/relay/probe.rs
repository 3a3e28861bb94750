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

use http::Method;
use log::debug;

use super::backoff::Backoff;
use super::context::RangeSupport;
use super::context::TransferContext;
use super::fetch::fetch_with_retry;
use super::fetch::is_success;
use crate::http_util::parse_accept_ranges;
use crate::http_util::parse_content_range;
use crate::http_util::BytesRange;
use crate::http_util::HttpClient;
use crate::Result;

/// Size of the ranged GET used when HEAD is not usable.
const PROBE_WINDOW: u64 = 1024;

/// Determine whether the upstream honors byte ranges for `url`, and pin
/// the initial content identity.
///
/// Runs only for requests that carry a `Range` header. A HEAD with the
/// client's range is tried first; if it is not usable (transport failure
/// or a status outside the success band), a small ranged GET takes its
/// place. An upstream that stays unreachable through the GET's retry
/// budget fails the request before anything is promised to the client.
pub(crate) async fn probe(
    client: &HttpClient,
    url: &str,
    ctx: &mut TransferContext,
    max_retries: u32,
    backoff: &Backoff,
) -> Result<()> {
    let head = fetch_with_retry(
        client,
        Method::HEAD,
        url,
        Some(&ctx.requested),
        1,
        backoff,
    )
    .await;

    let resp = match head {
        Ok(resp) if is_success(resp.status()) => resp,
        _ => {
            debug!(
                target: "rangerelay::probe",
                "HEAD not usable for {url}, probing with a {PROBE_WINDOW} byte GET"
            );
            let window = BytesRange::new(
                ctx.requested.first(),
                Some(ctx.requested.first() + PROBE_WINDOW),
            );
            fetch_with_retry(client, Method::GET, url, Some(&window), max_retries, backoff)
                .await
                .map_err(|err| err.with_operation("probe"))?
        }
    };

    let status = resp.status();
    if !is_success(status) {
        // An authoritative upstream answer (404 and friends): the fetch
        // loop will obtain and forward it, the probe learns nothing.
        debug!(target: "rangerelay::probe", "probe for {url} answered {status}");
        return Ok(());
    }

    let headers = resp.headers();
    ctx.ranges_supported = if parse_accept_ranges(headers)
        || matches!(parse_content_range(headers), Ok(Some(_)))
    {
        RangeSupport::Supported
    } else {
        RangeSupport::Unsupported
    };
    ctx.latch_identity(headers)?;
    ctx.learn_length(status, headers);
    ctx.refine_window();

    debug!(
        target: "rangerelay::probe",
        "range support for {url}: {:?}, resource length {:?}",
        ctx.ranges_supported,
        ctx.resource_length
    );

    Ok(())
}
