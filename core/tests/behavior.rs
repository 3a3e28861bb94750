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

//! End-to-end behavior of the transfer engine against a real origin over
//! HTTP, with and without injected faults.

mod common;

use std::time::Duration;

use futures::StreamExt;
use http::header::ACCEPT_RANGES;
use http::header::CONTENT_RANGE;
use http::StatusCode;
use pretty_assertions::assert_eq;
use rangerelay::DeliveryBody;
use rangerelay::ErrorKind;
use rangerelay::Relay;
use rangerelay::RelayConfig;

use common::payload;
use common::Origin;
use common::OriginOptions;

const TOTAL: usize = 100_000;
const BLOCK: usize = 10_000;

fn relay_for(endpoint: String) -> Relay {
    let _ = env_logger::builder().is_test(true).try_init();

    Relay::new(RelayConfig {
        upstream: Some(endpoint),
        max_retries: 8,
        retry_base_ms: 10,
        ..Default::default()
    })
    .expect("relay must build")
}

/// Drain a delivery body, returning the bytes received and the error that
/// severed the stream, if any.
async fn collect(mut body: DeliveryBody) -> (Vec<u8>, Option<rangerelay::Error>) {
    let mut out = Vec::new();
    while let Some(next) = body.next().await {
        match next {
            Ok(chunk) => out.extend_from_slice(&chunk),
            Err(err) => return (out, Some(err)),
        }
    }
    (out, None)
}

#[actix_web::test]
async fn test_plain_fetch_delivers_identical_bytes() {
    let origin = Origin::start(OriginOptions::default()).await;
    let relay = relay_for(origin.endpoint());

    let delivery = relay
        .fetch(&format!("/generate/{TOTAL}"), None)
        .await
        .unwrap();

    assert_eq!(delivery.status, StatusCode::OK);
    assert_eq!(delivery.content_length, Some(TOTAL as u64));
    // Identity headers travel through untouched.
    assert_eq!(
        delivery.headers.get(http::header::ETAG).unwrap(),
        "\"gen-100000\""
    );
    assert_eq!(
        delivery.headers.get(http::header::LAST_MODIFIED).unwrap(),
        common::LAST_MODIFIED
    );

    let (bytes, err) = collect(delivery.body).await;
    assert!(err.is_none());
    assert_eq!(bytes, payload(TOTAL).to_vec());
}

#[actix_web::test]
async fn test_ranged_fetch_delivers_slice() {
    let origin = Origin::start(OriginOptions::default()).await;
    let relay = relay_for(origin.endpoint());

    let delivery = relay
        .fetch(&format!("/generate/{TOTAL}"), Some("bytes=20000-29999"))
        .await
        .unwrap();

    assert_eq!(delivery.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(delivery.content_length, Some(10_000));
    assert_eq!(
        delivery.headers.get(CONTENT_RANGE).unwrap(),
        "bytes 20000-29999/100000"
    );

    let (bytes, err) = collect(delivery.body).await;
    assert!(err.is_none());
    assert_eq!(bytes, payload(TOTAL).slice(20_000..30_000).to_vec());
}

#[actix_web::test]
async fn test_tiled_fetch_matches_full_download() {
    let origin = Origin::start(OriginOptions::default()).await;
    let relay = relay_for(origin.endpoint());

    let mut assembled = Vec::with_capacity(TOTAL);
    for block in 0..TOTAL / BLOCK {
        let first = block * BLOCK;
        let last = first + BLOCK - 1;
        let delivery = relay
            .fetch(
                &format!("/generate/{TOTAL}"),
                Some(&format!("bytes={first}-{last}")),
            )
            .await
            .unwrap();

        assert_eq!(delivery.status, StatusCode::PARTIAL_CONTENT);

        let (bytes, err) = collect(delivery.body).await;
        assert!(err.is_none());
        assert_eq!(bytes.len(), BLOCK);
        assembled.extend_from_slice(&bytes);
    }

    assert_eq!(assembled, payload(TOTAL).to_vec());
}

#[actix_web::test]
async fn test_single_byte_range() {
    let origin = Origin::start(OriginOptions::default()).await;
    let relay = relay_for(origin.endpoint());

    let delivery = relay
        .fetch(&format!("/generate/{TOTAL}"), Some("bytes=42-42"))
        .await
        .unwrap();

    assert_eq!(delivery.content_length, Some(1));

    let (bytes, err) = collect(delivery.body).await;
    assert!(err.is_none());
    assert_eq!(bytes, vec![payload(TOTAL)[42]]);
}

#[actix_web::test]
async fn test_open_ended_range() {
    let origin = Origin::start(OriginOptions::default()).await;
    let relay = relay_for(origin.endpoint());

    let delivery = relay
        .fetch(&format!("/generate/{TOTAL}"), Some("bytes=90000-"))
        .await
        .unwrap();

    assert_eq!(delivery.status, StatusCode::PARTIAL_CONTENT);

    let (bytes, err) = collect(delivery.body).await;
    assert!(err.is_none());
    assert_eq!(bytes, payload(TOTAL).slice(90_000..).to_vec());
}

#[actix_web::test]
async fn test_full_range_header_matches_plain_fetch() {
    let origin = Origin::start(OriginOptions::default()).await;
    let relay = relay_for(origin.endpoint());

    let plain = relay
        .fetch(&format!("/generate/{TOTAL}"), None)
        .await
        .unwrap();
    let (plain_bytes, _) = collect(plain.body).await;

    let ranged = relay
        .fetch(&format!("/generate/{TOTAL}"), Some("bytes=0-"))
        .await
        .unwrap();
    let (ranged_bytes, err) = collect(ranged.body).await;

    assert!(err.is_none());
    assert_eq!(plain_bytes, ranged_bytes);
}

#[actix_web::test]
async fn test_resume_after_mid_stream_cuts() {
    let origin = Origin::start(OriginOptions {
        cut_after: Some(20_000),
        cut_times: 2,
        ..Default::default()
    })
    .await;
    let relay = relay_for(origin.endpoint());

    let delivery = relay
        .fetch(&format!("/generate/{TOTAL}"), None)
        .await
        .unwrap();

    assert_eq!(delivery.status, StatusCode::OK);

    // Two upstream connections die mid-body; the client still sees one
    // uninterrupted, byte-identical download.
    let (bytes, err) = collect(delivery.body).await;
    assert!(err.is_none(), "unexpected severed stream: {err:?}");
    assert_eq!(bytes, payload(TOTAL).to_vec());
}

#[actix_web::test]
async fn test_resume_without_range_support() {
    let origin = Origin::start(OriginOptions {
        disable_ranges: true,
        cut_after: Some(30_000),
        cut_times: 1,
        ..Default::default()
    })
    .await;
    let relay = relay_for(origin.endpoint());

    let delivery = relay
        .fetch(&format!("/generate/{TOTAL}"), None)
        .await
        .unwrap();

    // The retry has to refetch from byte zero and discard the prefix the
    // client already holds.
    let (bytes, err) = collect(delivery.body).await;
    assert!(err.is_none(), "unexpected severed stream: {err:?}");
    assert_eq!(bytes, payload(TOTAL).to_vec());
}

#[actix_web::test]
async fn test_range_against_non_ranging_origin_is_synthesized() {
    let origin = Origin::start(OriginOptions {
        disable_ranges: true,
        ..Default::default()
    })
    .await;
    let relay = relay_for(origin.endpoint());

    let delivery = relay
        .fetch(&format!("/generate/{TOTAL}"), Some("bytes=10000-19999"))
        .await
        .unwrap();

    // The upstream answered 200 with the full body; the relay promises
    // the requested slice anyway and discards around it.
    assert_eq!(delivery.status, StatusCode::OK);
    assert_eq!(delivery.content_length, Some(10_000));
    assert_eq!(delivery.headers.get(ACCEPT_RANGES).unwrap(), "bytes");
    assert_eq!(
        delivery.headers.get(CONTENT_RANGE).unwrap(),
        "bytes 10000-19999/100000"
    );

    let (bytes, err) = collect(delivery.body).await;
    assert!(err.is_none());
    assert_eq!(bytes, payload(TOTAL).slice(10_000..20_000).to_vec());
}

#[actix_web::test]
async fn test_identity_flip_before_commit_is_reported_in_band() {
    let origin = Origin::start(OriginOptions {
        fresh_etag: true,
        ..Default::default()
    })
    .await;
    let relay = relay_for(origin.endpoint());

    // The probe pins one entity tag, the first streamed response shows
    // another: nothing has been promised yet, so the request fails
    // cleanly.
    let err = relay
        .fetch(&format!("/generate/{TOTAL}"), Some("bytes=0-9999"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConditionNotMatch);
}

#[actix_web::test]
async fn test_identity_flip_after_commit_severs_the_stream() {
    let origin = Origin::start(OriginOptions {
        fresh_etag: true,
        cut_after: Some(20_000),
        cut_times: 1,
        ..Default::default()
    })
    .await;
    let relay = relay_for(origin.endpoint());

    let delivery = relay
        .fetch(&format!("/generate/{TOTAL}"), None)
        .await
        .unwrap();

    let (bytes, err) = collect(delivery.body).await;

    // The resumed response carried a different entity tag. The stream
    // must end in an error, and every delivered byte must still belong
    // to the first version.
    let err = err.expect("stream must be severed");
    assert_eq!(err.kind(), ErrorKind::ConditionNotMatch);
    assert!(bytes.len() < TOTAL);
    assert_eq!(bytes, payload(TOTAL).slice(0..bytes.len()).to_vec());
}

#[actix_web::test]
async fn test_oversized_range_surfaces_the_origin_answer() {
    let origin = Origin::start(OriginOptions::default()).await;
    let relay = relay_for(origin.endpoint());

    let delivery = relay
        .fetch(&format!("/generate/{TOTAL}"), Some("bytes=0-100000"))
        .await
        .unwrap();

    assert_eq!(delivery.status, StatusCode::RANGE_NOT_SATISFIABLE);
}

#[actix_web::test]
async fn test_late_origin_is_awaited() {
    // Reserve an ephemeral port, then bring the origin up on it only
    // after the relay has started knocking.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let relay = relay_for(format!("http://{addr}"));
    start_origin_later(addr);

    let delivery = relay
        .fetch(&format!("/generate/{BLOCK}"), None)
        .await
        .unwrap();

    let (bytes, err) = collect(delivery.body).await;
    assert!(err.is_none());
    assert_eq!(bytes, payload(BLOCK).to_vec());
}

fn start_origin_later(addr: std::net::SocketAddr) {
    actix_web::rt::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Origin::start_on(&addr.to_string(), OriginOptions::default()).await;
    });
}

#[actix_web::test]
async fn test_unreachable_upstream_fails_for_ranged_requests() {
    // Nothing listens here.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let relay = Relay::new(RelayConfig {
        upstream: Some(format!("http://{addr}")),
        max_retries: 2,
        retry_base_ms: 5,
        ..Default::default()
    })
    .unwrap();

    let err = relay
        .fetch("/generate/100", Some("bytes=0-9"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unexpected);
    assert!(!err.is_temporary());

    let err = relay.fetch("/generate/100", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unexpected);
    assert!(!err.is_temporary());
}
