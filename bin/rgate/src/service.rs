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

use std::net::SocketAddr;

use actix_web::body::SizedStream;
use actix_web::dev::Server;
use actix_web::http::header;
use actix_web::http::header::HeaderName;
use actix_web::http::header::HeaderValue;
use actix_web::http::Method;
use actix_web::http::StatusCode;
use actix_web::middleware;
use actix_web::web;
use actix_web::web::Data;
use actix_web::App;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::HttpServer;
use log::error;
use log::info;
use log::warn;
use rangerelay::Delivery;
use rangerelay::ErrorKind;
use rangerelay::Relay;
use rangerelay::RelayConfig;

/// The gateway service: one relay engine behind an actix-web server.
#[derive(Debug, Clone)]
pub struct Service {
    addr: String,
    relay: Relay,
}

impl Service {
    /// Build the service from config.
    pub fn new(config: RelayConfig) -> rangerelay::Result<Service> {
        Ok(Service {
            addr: config.listen.clone(),
            relay: Relay::new(config)?,
        })
    }

    /// Bind the listener and hand back the server together with the
    /// address it actually bound, so callers can await it wherever they
    /// like.
    pub fn into_server(self) -> std::io::Result<(SocketAddr, Server)> {
        let relay = Data::new(self.relay);
        let server = HttpServer::new(move || {
            App::new()
                .app_data(relay.clone())
                .wrap(middleware::Logger::default())
                .service(web::resource(r"{path:.*}").to(index))
        })
        .bind(&self.addr)?;

        let bound = *server
            .addrs()
            .first()
            .expect("bound server must have an address");
        Ok((bound, server.run()))
    }

    /// Run the server until it is shut down.
    pub async fn start(self) -> std::io::Result<()> {
        let (addr, server) = self.into_server()?;
        info!("gateway listening on {addr}");
        server.await
    }
}

async fn index(relay: Data<Relay>, req: HttpRequest) -> HttpResponse {
    // The relay speaks exactly one verb.
    if req.method() != Method::GET {
        return HttpResponse::MethodNotAllowed().finish();
    }

    let range = match req.headers().get(header::RANGE) {
        Some(value) => match value.to_str() {
            Ok(v) => Some(v),
            Err(_) => {
                return HttpResponse::BadRequest()
                    .body("Bad Request: range header is not valid")
            }
        },
        None => None,
    };

    let target = match req.query_string() {
        "" => req.path().to_string(),
        query => format!("{}?{query}", req.path()),
    };

    match relay.fetch(&target, range).await {
        Ok(delivery) => into_response(delivery),
        Err(err) if err.kind() == ErrorKind::RangeInvalid => {
            warn!("rejecting request for {target}: {err}");
            HttpResponse::BadRequest().body(format!("Bad Request: {err}"))
        }
        Err(err) if err.kind() == ErrorKind::ConfigInvalid => {
            error!("engine misconfigured: {err}");
            HttpResponse::InternalServerError().finish()
        }
        Err(err) => {
            error!("upstream fetch for {target} failed: {err}");
            HttpResponse::BadGateway().body(format!("Bad Gateway: {err}"))
        }
    }
}

/// Turn a committed delivery into the client response. The body length
/// decides the framing: sized when the transfer promised a length,
/// chunked otherwise.
fn into_response(delivery: Delivery) -> HttpResponse {
    let status = StatusCode::from_u16(delivery.status.as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut builder = HttpResponse::build(status);
    for (name, value) in delivery.headers.iter() {
        match (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            (Ok(name), Ok(value)) => {
                builder.append_header((name, value));
            }
            _ => warn!("dropping upstream header {name} with an unrepresentable value"),
        }
    }

    match delivery.content_length {
        Some(len) => builder.body(SizedStream::new(len, delivery.body)),
        None => builder.streaming(delivery.body),
    }
}
