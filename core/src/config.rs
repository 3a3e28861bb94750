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

use std::time::Duration;

use serde::Deserialize;

/// Config for the relay engine and its gateway.
///
/// The gateway fills this from command line flags; it can equally be
/// deserialized from a config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the gateway listens on.
    ///
    /// Default: `127.0.0.1:3000`.
    pub listen: String,
    /// Upstream base URL: scheme and authority prepended to each client
    /// path, e.g. `https://origin.example:8443`.
    ///
    /// Required for building a [`crate::Relay`].
    pub upstream: Option<String>,
    /// Cap on retry attempts, shared by the range-support probe and the
    /// fetch loop.
    ///
    /// Default: `120`.
    pub max_retries: u32,
    /// Base multiplier of the quadratic retry backoff, in milliseconds.
    ///
    /// The n-th retry sleeps `retry_base_ms * min(60, n^2)` milliseconds.
    ///
    /// Default: `1000`.
    pub retry_base_ms: u64,
    /// Skip verification of upstream TLS certificates.
    ///
    /// Default: `false`.
    pub insecure_skip_verify: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3000".to_string(),
            upstream: None,
            max_retries: 120,
            retry_base_ms: 1000,
            insecure_skip_verify: false,
        }
    }
}

impl RelayConfig {
    /// The backoff base as a [`Duration`].
    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }
}
