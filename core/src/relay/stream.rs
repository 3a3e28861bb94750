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

use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use bytes::Bytes;
use futures::Stream;
use futures::StreamExt;
use http::HeaderMap;
use http::Method;
use http::StatusCode;
use log::debug;
use log::error;
use log::warn;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use super::backoff::Backoff;
use super::context::RangeSupport;
use super::context::TransferContext;
use super::fetch;
use super::framing;
use crate::http_util::parse_accept_ranges;
use crate::http_util::parse_content_range;
use crate::http_util::ByteStream;
use crate::http_util::BytesRange;
use crate::http_util::HttpClient;
use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// How many body chunks may sit between the transfer task and the client
/// socket. Kept small so `bytes_sent` stays an honest measure of client
/// progress.
const BODY_CHANNEL_DEPTH: usize = 2;

/// A committed response for one client request: the frozen head plus the
/// stream of payload bytes.
///
/// Dropping the body cancels the transfer; the engine observes the closed
/// channel as the client being gone.
#[derive(Debug)]
pub struct Delivery {
    /// Status code the client receives.
    pub status: StatusCode,
    /// Response headers, upstream copies plus any synthesized range view.
    pub headers: HeaderMap,
    /// Body length promised to the client, when known. Carried apart from
    /// `headers` so the serving layer can frame the body accordingly.
    pub content_length: Option<u64>,
    /// The payload stream. Yields an error exactly when the transfer must
    /// sever the connection after the head was committed.
    pub body: DeliveryBody,
}

/// The payload byte stream of a [`Delivery`].
#[derive(Debug)]
pub struct DeliveryBody {
    rx: mpsc::Receiver<Result<Bytes>>,
}

impl Stream for DeliveryBody {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Outcome of forwarding one upstream body.
enum Pump {
    /// The upstream body finished, or the client window is complete.
    Done,
    /// The upstream body failed mid-read; worth another attempt.
    Again(Error),
    /// The client stopped reading; nothing left to retry against.
    ClientGone,
}

/// Outcome of pushing one chunk towards the client.
enum Forward {
    Sent,
    WindowDone,
    Gone,
}

/// One client transfer: fetches the not-yet-delivered suffix of the
/// requested window from the upstream, across as many connection
/// attempts as the retry budget allows, and feeds it to the client in
/// strict offset order.
pub(crate) struct Transfer {
    client: HttpClient,
    url: String,
    ctx: TransferContext,
    max_retries: u32,
    backoff: Backoff,
    body_tx: Option<mpsc::Sender<Result<Bytes>>>,
}

impl Transfer {
    pub(crate) fn new(
        client: HttpClient,
        url: String,
        ctx: TransferContext,
        max_retries: u32,
        backoff: Backoff,
    ) -> Self {
        Transfer {
            client,
            url,
            ctx,
            max_retries,
            backoff,
            body_tx: None,
        }
    }

    /// Drive the transfer to completion.
    ///
    /// `commit` receives the composed response head exactly once: either
    /// the committed `Delivery` or the error that ended the request
    /// before anything was promised to the client. Failures after the
    /// commit surface as an error on the delivery body instead, so the
    /// serving layer severs the connection rather than silently
    /// truncating.
    pub(crate) async fn run(mut self, commit: oneshot::Sender<Result<Delivery>>) {
        let mut commit = Some(commit);
        let mut last_err: Option<Error> = None;
        let mut first_response = true;

        while self.ctx.attempt <= self.max_retries {
            let range = self.plan();
            let resp = match fetch::fetch_with_retry(
                &self.client,
                Method::GET,
                &self.url,
                range.as_ref(),
                self.max_retries,
                &self.backoff,
            )
            .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    // The fetch exhausted its own connection budget.
                    last_err = Some(err);
                    break;
                }
            };
            let (parts, body) = resp.into_parts();

            if !fetch::is_success(parts.status) {
                if self.ctx.headers_committed {
                    last_err = Some(
                        Error::new(
                            ErrorKind::Unexpected,
                            format!(
                                "upstream turned authoritative mid transfer: {}",
                                parts.status
                            ),
                        )
                        .with_context("url", &self.url),
                    );
                    break;
                }
                let tx = commit.take().expect("commit must be pending before the head is sent");
                self.deliver_authoritative(parts.status, parts.headers, body, tx)
                    .await;
                return;
            }

            if first_response {
                first_response = false;
                // The probe's verdict is provisional; the first streamed
                // response is what the upstream actually does.
                self.ctx.ranges_supported = if parse_accept_ranges(&parts.headers)
                    || matches!(parse_content_range(&parts.headers), Ok(Some(_)))
                {
                    RangeSupport::Supported
                } else {
                    RangeSupport::Unsupported
                };
                self.ctx.learn_length(parts.status, &parts.headers);
                self.ctx.refine_window();
            }

            if let Err(err) = self.ctx.latch_identity(&parts.headers) {
                self.fail(err, &mut commit).await;
                return;
            }

            let (mut body, carried) = match self.align(&parts.headers, body).await {
                Ok(v) => v,
                Err(err) => {
                    warn!(
                        target: "rangerelay::stream",
                        "alignment failed at offset {}: {err}",
                        self.ctx.needed_offset()
                    );
                    last_err = Some(err);
                    self.back_off().await;
                    continue;
                }
            };

            if !self.ctx.headers_committed {
                let head = framing::compose(&self.ctx, parts.status, &parts.headers);
                let (tx, rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
                self.body_tx = Some(tx);
                self.ctx.headers_committed = true;
                debug!(
                    target: "rangerelay::stream",
                    "committing response head: {} content-length {:?}",
                    head.status,
                    head.content_length
                );
                let delivery = Delivery {
                    status: head.status,
                    headers: head.headers,
                    content_length: head.content_length,
                    body: DeliveryBody { rx },
                };
                let tx = commit.take().expect("commit must be pending before the head is sent");
                if tx.send(Ok(delivery)).is_err() {
                    debug!(
                        target: "rangerelay::stream",
                        "request abandoned before the head was sent"
                    );
                    return;
                }
            }

            match self.pump(&mut body, carried).await {
                Pump::Done => {
                    debug!(
                        target: "rangerelay::stream",
                        "transfer of {} complete, {} bytes delivered",
                        self.ctx.path,
                        self.ctx.bytes_sent
                    );
                    return;
                }
                Pump::ClientGone => {
                    debug!(
                        target: "rangerelay::stream",
                        "client went away after {} bytes of {}",
                        self.ctx.bytes_sent,
                        self.ctx.path
                    );
                    return;
                }
                Pump::Again(err) => {
                    warn!(
                        target: "rangerelay::stream",
                        "upstream stream broke after {} bytes: {err}",
                        self.ctx.bytes_sent
                    );
                    last_err = Some(err);
                    self.back_off().await;
                }
            }
        }

        let err = last_err
            .unwrap_or_else(|| {
                Error::new(ErrorKind::Unexpected, "upstream retry budget exhausted")
                    .with_context("url", &self.url)
            })
            .set_persistent();
        self.fail(err, &mut commit).await;
    }

    /// The range header for the next attempt.
    fn plan(&self) -> Option<BytesRange> {
        match self.ctx.ranges_supported {
            RangeSupport::Supported if self.ctx.bytes_sent > 0 => {
                Some(self.ctx.requested.advance(self.ctx.bytes_sent))
            }
            RangeSupport::Supported if self.ctx.client_sent_range => Some(self.ctx.requested),
            _ => None,
        }
    }

    async fn back_off(&mut self) {
        self.ctx.attempt += 1;
        let delay = self.backoff.delay(self.ctx.attempt);
        debug!(
            target: "rangerelay::stream",
            "retrying transfer in {delay:?} (attempt {}/{})",
            self.ctx.attempt,
            self.max_retries
        );
        tokio::time::sleep(delay).await;
    }

    /// Bring the upstream body in line with the next byte the client is
    /// owed, discarding any prefix overlap.
    ///
    /// A chunk can straddle the boundary; its kept tail is returned so
    /// the pump forwards it first. A response that starts past the needed
    /// offset cannot be repaired and is retried, as is any read failure
    /// during the discard.
    async fn align(
        &mut self,
        headers: &HeaderMap,
        mut body: ByteStream,
    ) -> Result<(ByteStream, Option<Bytes>)> {
        // A response without (or with an unparseable) content range
        // starts at the beginning of the resource.
        let start = match parse_content_range(headers) {
            Ok(Some(content_range)) => content_range.start(),
            _ => 0,
        };
        let needed = self.ctx.needed_offset();

        if start > needed {
            return Err(Error::new(
                ErrorKind::Unexpected,
                "upstream response starts past the resumption offset",
            )
            .with_operation("Transfer::align")
            .with_context("response_start", start)
            .with_context("needed", needed)
            .set_temporary());
        }

        let mut to_discard = needed - start;
        if to_discard == 0 {
            return Ok((body, None));
        }
        debug!(
            target: "rangerelay::stream",
            "discarding {to_discard} bytes to align with offset {needed}"
        );

        while to_discard > 0 {
            match body.next().await {
                Some(Ok(mut chunk)) => {
                    if (chunk.len() as u64) <= to_discard {
                        to_discard -= chunk.len() as u64;
                    } else {
                        let kept = chunk.split_off(to_discard as usize);
                        return Ok((body, Some(kept)));
                    }
                }
                Some(Err(err)) => return Err(err.set_temporary()),
                None => {
                    return Err(Error::new(
                        ErrorKind::Unexpected,
                        "upstream body ended during alignment",
                    )
                    .with_operation("Transfer::align")
                    .set_temporary())
                }
            }
        }

        Ok((body, None))
    }

    /// Forward the upstream body to the client until it ends, fails, or
    /// the window is complete.
    async fn pump(&mut self, body: &mut ByteStream, carried: Option<Bytes>) -> Pump {
        if let Some(chunk) = carried {
            match self.forward(chunk).await {
                Forward::Sent => {}
                Forward::WindowDone => return Pump::Done,
                Forward::Gone => return Pump::ClientGone,
            }
        }

        loop {
            match body.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => match self.forward(chunk).await {
                    Forward::Sent => {}
                    Forward::WindowDone => return Pump::Done,
                    Forward::Gone => return Pump::ClientGone,
                },
                Some(Err(err)) => return Pump::Again(err),
                None => return Pump::Done,
            }
        }
    }

    /// Push one chunk to the client, capped at the promised window, and
    /// account for the progress. Forward progress earns retry budget
    /// back.
    async fn forward(&mut self, mut chunk: Bytes) -> Forward {
        if let Some(remaining) = self.ctx.remaining() {
            if remaining == 0 {
                return Forward::WindowDone;
            }
            if (chunk.len() as u64) > remaining {
                chunk.truncate(remaining as usize);
            }
        }

        let n = chunk.len() as u64;
        let tx = self
            .body_tx
            .as_ref()
            .expect("body channel must exist after the head is committed");
        if tx.send(Ok(chunk)).await.is_err() {
            return Forward::Gone;
        }

        self.ctx.bytes_sent += n;
        self.ctx.attempt = self.ctx.attempt.saturating_sub(1);

        if self.ctx.remaining() == Some(0) {
            return Forward::WindowDone;
        }
        Forward::Sent
    }

    /// Pass an authoritative upstream answer through untouched. Its body
    /// is taken at face value and never resumed.
    async fn deliver_authoritative(
        &mut self,
        status: StatusCode,
        headers: HeaderMap,
        mut body: ByteStream,
        commit: oneshot::Sender<Result<Delivery>>,
    ) {
        warn!(
            target: "rangerelay::stream",
            "forwarding authoritative upstream answer {status} for {}",
            self.ctx.path
        );

        let head = framing::forwarded(status, &headers);
        let (tx, rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
        self.ctx.headers_committed = true;
        let delivery = Delivery {
            status: head.status,
            headers: head.headers,
            content_length: head.content_length,
            body: DeliveryBody { rx },
        };
        if commit.send(Ok(delivery)).is_err() {
            return;
        }

        loop {
            match body.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    if tx.send(Ok(chunk)).await.is_err() {
                        return;
                    }
                }
                Some(Err(err)) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
                None => return,
            }
        }
    }

    /// End the transfer in failure. Before the commit the error travels
    /// in band; afterwards the only honest signal left is severing the
    /// client connection.
    async fn fail(&mut self, err: Error, commit: &mut Option<oneshot::Sender<Result<Delivery>>>) {
        match commit.take() {
            Some(tx) => {
                let _ = tx.send(Err(err));
            }
            None => {
                error!(
                    target: "rangerelay::stream",
                    "terminating committed transfer of {} after {} bytes: {err}",
                    self.ctx.path,
                    self.ctx.bytes_sent
                );
                if let Some(tx) = self.body_tx.take() {
                    let _ = tx.send(Err(err)).await;
                }
            }
        }
    }
}
