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

use clap::Parser;
use log::info;
use rangerelay::RelayConfig;
use rgate::service::Service;

/// Resilient streaming proxy: forwards GET requests to the configured
/// upstream and transparently resumes interrupted downloads.
#[derive(Debug, Parser)]
#[command(name = "rgate", version, about)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:3000")]
    listen: String,

    /// Upstream base URL: scheme and authority, e.g. https://origin:8443.
    #[arg(long)]
    upstream: String,

    /// Cap on upstream retry attempts.
    #[arg(long, default_value_t = 120)]
    max_retries: u32,

    /// Base delay of the quadratic retry backoff, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    retry_delay_ms: u64,

    /// Skip verification of upstream TLS certificates.
    #[arg(long)]
    insecure: bool,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = RelayConfig {
        listen: args.listen,
        upstream: Some(args.upstream),
        max_retries: args.max_retries,
        retry_base_ms: args.retry_delay_ms,
        insecure_skip_verify: args.insecure,
    };

    info!(
        "starting gateway on {} for upstream {}",
        config.listen,
        config.upstream.as_deref().unwrap_or_default()
    );

    Service::new(config)?.start().await?;

    Ok(())
}
