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

use std::fmt::Debug;
use std::fmt::Formatter;
use std::mem;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use futures::TryStreamExt;
use http::Request;
use http::Response;

use crate::Error;
use crate::ErrorKind;
use crate::RelayConfig;
use crate::Result;

/// The streaming body an upstream response is read through.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Create a new error happened during building a request.
pub fn new_request_build_error(err: http::Error) -> Error {
    Error::new(ErrorKind::Unexpected, "building http request")
        .with_operation("http_util::new_request_build_error")
        .set_source(err)
}

/// HttpClient that is used for all upstream traffic.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

/// We don't want users to know details about our clients.
impl Debug for HttpClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").finish()
    }
}

impl HttpClient {
    /// Build a new http client honoring the configured TLS trust policy.
    pub fn build(config: &RelayConfig) -> Result<Self> {
        let mut builder = reqwest::ClientBuilder::new();
        if config.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build().map_err(|err| {
                Error::new(ErrorKind::Unexpected, "http client build failed").set_source(err)
            })?,
        })
    }

    /// Send an http request and get the response in streaming.
    ///
    /// Transport-level failures are classified as temporary so the caller
    /// can retry them; builder, redirect-policy and status-handling errors
    /// stay permanent.
    pub async fn send(&self, req: Request<()>) -> Result<Response<ByteStream>> {
        // Uri stores all string alike data in `Bytes` which means
        // the clone here is cheap.
        let uri = req.uri().clone();
        let (parts, _) = req.into_parts();

        let url = reqwest::Url::parse(&uri.to_string()).map_err(|err| {
            Error::new(ErrorKind::Unexpected, "request url is invalid")
                .with_operation("http_util::Client::send")
                .with_context("url", uri.to_string())
                .set_source(err)
        })?;

        let req_builder = self
            .client
            .request(parts.method, url)
            .headers(parts.headers);

        let mut resp = req_builder.send().await.map_err(|err| {
            let is_temporary = !(
                // Builder related error should not be retried.
                err.is_builder() ||
                // Error returned by RedirectPolicy.
                //
                // Don't retry error if we redirect too many.
                err.is_redirect() ||
                // We never use `Response::error_for_status`, just don't
                // allow retry.
                //
                // Status should be checked by our transfer loop.
                err.is_status()
            );

            let mut oerr = Error::new(ErrorKind::Unexpected, "send http request")
                .with_operation("http_util::Client::send")
                .with_context("url", uri.to_string())
                .set_source(err);
            if is_temporary {
                oerr = oerr.set_temporary();
            }

            oerr
        })?;

        let mut hr = Response::builder().status(resp.status());

        // Swap headers directly instead of copy the entire map.
        mem::swap(hr.headers_mut().unwrap(), resp.headers_mut());

        let stream = resp
            .bytes_stream()
            .map_err(move |err| {
                Error::new(ErrorKind::Unexpected, "read data from http response")
                    .with_operation("http_util::Client::send")
                    .with_context("url", uri.to_string())
                    .set_source(err)
                    .set_temporary()
            })
            .boxed();

        let resp = hr.body(stream).expect("response must build succeed");
        Ok(resp)
    }
}
