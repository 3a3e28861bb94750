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

use http::header::ACCEPT_RANGES;
use http::header::CONTENT_LENGTH;
use http::header::CONTENT_RANGE;
use http::header::ETAG;
use http::header::LAST_MODIFIED;
use http::HeaderMap;
use http::HeaderName;

use super::BytesContentRange;
use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// Parse header value to string according to name.
///
/// Values that are not valid utf-8 are treated as absent.
#[inline]
pub fn parse_header_to_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(&name).and_then(|v| v.to_str().ok())
}

/// Parse content length from header map.
pub fn parse_content_length(headers: &HeaderMap) -> Result<Option<u64>> {
    parse_header_to_str(headers, CONTENT_LENGTH)
        .map(|v| {
            v.parse::<u64>().map_err(|e| {
                Error::new(ErrorKind::Unexpected, "header value is not valid integer")
                    .with_operation("http_util::parse_content_length")
                    .set_source(e)
            })
        })
        .transpose()
}

/// Parse content range from header map.
pub fn parse_content_range(headers: &HeaderMap) -> Result<Option<BytesContentRange>> {
    parse_header_to_str(headers, CONTENT_RANGE)
        .map(|v| v.parse())
        .transpose()
}

/// Parse etag from header map, as the raw observed string.
pub fn parse_etag(headers: &HeaderMap) -> Option<&str> {
    parse_header_to_str(headers, ETAG)
}

/// Parse last modified from header map, as the raw observed string.
///
/// The value is never interpreted as a date: the identity guard compares
/// what the upstream sent, byte for byte.
pub fn parse_last_modified(headers: &HeaderMap) -> Option<&str> {
    parse_header_to_str(headers, LAST_MODIFIED)
}

/// Check whether the header map advertises byte-range support via
/// `Accept-Ranges: bytes`.
pub fn parse_accept_ranges(headers: &HeaderMap) -> bool {
    parse_header_to_str(headers, ACCEPT_RANGES) == Some("bytes")
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_content_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_content_length(&headers).unwrap(), None);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("100000"));
        assert_eq!(parse_content_length(&headers).unwrap(), Some(100000));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("many"));
        assert!(parse_content_length(&headers).is_err());
    }

    #[test]
    fn test_parse_content_range() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_content_range(&headers).unwrap(), None);

        headers.insert(
            CONTENT_RANGE,
            HeaderValue::from_static("bytes 0-9999/100000"),
        );
        assert_eq!(
            parse_content_range(&headers).unwrap(),
            Some(BytesContentRange::new(0, 9999, Some(100000)))
        );
    }

    #[test]
    fn test_parse_accept_ranges() {
        let mut headers = HeaderMap::new();
        assert!(!parse_accept_ranges(&headers));

        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("none"));
        assert!(!parse_accept_ranges(&headers));

        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        assert!(parse_accept_ranges(&headers));
    }

    #[test]
    fn test_parse_identity_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_etag(&headers), None);
        assert_eq!(parse_last_modified(&headers), None);

        headers.insert(ETAG, HeaderValue::from_static("\"v1\""));
        headers.insert(
            LAST_MODIFIED,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_etag(&headers), Some("\"v1\""));
        assert_eq!(
            parse_last_modified(&headers),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
    }
}
