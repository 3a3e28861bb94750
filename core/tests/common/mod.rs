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

//! A deterministic origin for exercising the relay: serves
//! `/generate/<n>` with `n` fixed-seed pseudo random bytes, honors single
//! byte ranges, and can misbehave on demand.

use std::net::SocketAddr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use actix_web::body::SizedStream;
use actix_web::http::header;
use actix_web::http::Method;
use actix_web::web;
use actix_web::App;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::HttpServer;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::RngCore;
use rand::SeedableRng;

/// Fixed timestamp every stable response carries.
pub const LAST_MODIFIED: &str = "Thu, 02 Jan 2025 03:04:05 GMT";

/// The reference bytes of `/generate/<total>`.
pub fn payload(total: usize) -> Bytes {
    let mut rng = StdRng::seed_from_u64(7);
    let mut buf = vec![0u8; total];
    rng.fill_bytes(&mut buf);
    Bytes::from(buf)
}

/// Misbehavior knobs for the origin.
#[derive(Debug, Clone, Default)]
pub struct OriginOptions {
    /// Ignore `Range` headers and never advertise `Accept-Ranges`.
    pub disable_ranges: bool,
    /// Sever the connection after this many body bytes have been sent...
    pub cut_after: Option<usize>,
    /// ...on each of the first this-many GET responses.
    pub cut_times: usize,
    /// Stamp a fresh entity tag on every response, as if the resource
    /// changed between attempts.
    pub fresh_etag: bool,
}

struct OriginState {
    options: OriginOptions,
    /// GET responses served so far, for the cut budget.
    served: AtomicUsize,
    /// Responses stamped so far, for fresh entity tags.
    stamped: AtomicUsize,
}

/// A running origin server on an ephemeral port.
pub struct Origin {
    addr: SocketAddr,
}

impl Origin {
    pub async fn start(options: OriginOptions) -> Origin {
        Self::start_on("127.0.0.1:0", options).await
    }

    pub async fn start_on(addr: &str, options: OriginOptions) -> Origin {
        let state = web::Data::new(OriginState {
            options,
            served: AtomicUsize::new(0),
            stamped: AtomicUsize::new(0),
        });

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .route("/generate/{total}", web::get().to(generate))
                .route("/generate/{total}", web::head().to(generate))
        })
        .workers(1)
        .disable_signals()
        .bind(addr)
        .expect("origin must bind");

        let addr = *server
            .addrs()
            .first()
            .expect("bound origin must have an address");

        actix_web::rt::spawn(server.run());

        Origin { addr }
    }

    /// Base URL for pointing a relay at this origin.
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }
}

async fn generate(
    req: HttpRequest,
    path: web::Path<usize>,
    state: web::Data<OriginState>,
) -> HttpResponse {
    let total = path.into_inner();
    let options = &state.options;

    let mut start = 0usize;
    let mut end = total.saturating_sub(1);
    let mut ranged = false;

    if !options.disable_ranges {
        if let Some(value) = req
            .headers()
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
        {
            let Some(rest) = value.strip_prefix("bytes=") else {
                return HttpResponse::BadRequest().finish();
            };
            let Some((first, last)) = rest.split_once('-') else {
                return HttpResponse::BadRequest().finish();
            };
            // Suffix ranges are not understood here, matching the
            // strictest origins the relay must cope with.
            let Ok(first) = first.parse::<usize>() else {
                return HttpResponse::BadRequest().finish();
            };
            if first >= total {
                return HttpResponse::RangeNotSatisfiable().finish();
            }
            start = first;
            if !last.is_empty() {
                match last.parse::<usize>() {
                    Ok(last) if last < total && start <= last => end = last,
                    _ => return HttpResponse::RangeNotSatisfiable().finish(),
                }
            }
            ranged = true;
        }
    }

    let etag = if options.fresh_etag {
        format!(
            "\"gen-{total}-{}\"",
            state.stamped.fetch_add(1, Ordering::SeqCst)
        )
    } else {
        format!("\"gen-{total}\"")
    };

    let mut builder = if ranged {
        let mut builder = HttpResponse::PartialContent();
        builder.insert_header((
            header::CONTENT_RANGE,
            format!("bytes {start}-{end}/{total}"),
        ));
        builder
    } else {
        let mut builder = HttpResponse::Ok();
        if !options.disable_ranges {
            builder.insert_header((header::ACCEPT_RANGES, "bytes"));
        }
        builder
    };
    builder
        .insert_header((header::CONTENT_TYPE, "application/octet-stream"))
        .insert_header((header::ETAG, etag))
        .insert_header((header::LAST_MODIFIED, LAST_MODIFIED));

    let body = payload(total).slice(start..(end + 1).min(total));
    let declared = body.len() as u64;

    let cut = req.method() == Method::GET
        && options.cut_after.is_some()
        && state.served.fetch_add(1, Ordering::SeqCst) < options.cut_times;

    if cut {
        let keep = options.cut_after.unwrap().min(body.len());
        let stream = futures::stream::iter(vec![
            Ok::<Bytes, std::io::Error>(body.slice(0..keep)),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "injected connection cut",
            )),
        ]);
        builder.body(SizedStream::new(declared, stream))
    } else {
        builder.body(body)
    }
}
