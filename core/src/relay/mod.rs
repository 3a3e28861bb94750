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

//! The transfer engine: request intake, the range-support probe, the
//! retrying fetch loop, and response framing.

mod backoff;
mod context;
mod fetch;
mod framing;
mod intake;
mod probe;
mod stream;

pub use stream::Delivery;
pub use stream::DeliveryBody;

use tokio::sync::oneshot;

use self::backoff::Backoff;
use self::stream::Transfer;
use crate::http_util::HttpClient;
use crate::Error;
use crate::ErrorKind;
use crate::RelayConfig;
use crate::Result;

/// The streaming relay engine.
///
/// One `Relay` serves a whole process; every call to [`Relay::fetch`]
/// owns its transfer state independently, so requests never share
/// anything beyond the configuration and the upstream client.
///
/// # Examples
///
/// ```no_run
/// use rangerelay::{Relay, RelayConfig};
///
/// # async fn example() -> rangerelay::Result<()> {
/// let relay = Relay::new(RelayConfig {
///     upstream: Some("http://127.0.0.1:9000".to_string()),
///     ..Default::default()
/// })?;
///
/// let delivery = relay.fetch("/generate/100000", Some("bytes=0-9999")).await?;
/// println!("{} {:?}", delivery.status, delivery.content_length);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Relay {
    client: HttpClient,
    endpoint: String,
    config: RelayConfig,
}

impl Relay {
    /// Build an engine from config.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` when the upstream endpoint is missing or
    /// not a valid URL.
    pub fn new(config: RelayConfig) -> Result<Self> {
        let endpoint = config
            .upstream
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::new(ErrorKind::ConfigInvalid, "upstream endpoint is required")
                    .with_operation("Relay::new")
            })?;

        reqwest::Url::parse(&endpoint).map_err(|err| {
            Error::new(ErrorKind::ConfigInvalid, "upstream endpoint is not a valid URL")
                .with_operation("Relay::new")
                .with_context("endpoint", &endpoint)
                .set_source(err)
        })?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        let client = HttpClient::build(&config)?;

        Ok(Relay {
            client,
            endpoint,
            config,
        })
    }

    /// The config this engine was built from.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Serve one client request: fetch `path` from the upstream,
    /// optionally narrowed by the client's `Range` header, and return the
    /// committed response head with a body stream that survives upstream
    /// failures.
    ///
    /// The returned future resolves when the response head is final,
    /// which may take as long as the retry budget allows if the upstream
    /// is slow to appear. Errors returned here happened before anything
    /// was promised to the client and can still be reported in band;
    /// later failures surface on the delivery body.
    pub async fn fetch(&self, path: &str, range_header: Option<&str>) -> Result<Delivery> {
        let mut ctx = intake::accept(path, range_header)?;
        let url = format!("{}{}", self.endpoint, ctx.path);
        let backoff = Backoff::new(self.config.retry_base());

        if ctx.client_sent_range {
            probe::probe(
                &self.client,
                &url,
                &mut ctx,
                self.config.max_retries,
                &backoff,
            )
            .await?;
        }

        let (commit_tx, commit_rx) = oneshot::channel();
        let transfer = Transfer::new(
            self.client.clone(),
            url,
            ctx,
            self.config.max_retries,
            backoff,
        );
        tokio::spawn(transfer.run(commit_tx));

        commit_rx.await.map_err(|_| {
            Error::new(
                ErrorKind::Unexpected,
                "transfer ended before a response was composed",
            )
            .with_operation("Relay::fetch")
        })?
    }
}
