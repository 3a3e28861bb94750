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

//! http_util contains the util types and functions shared by the transfer
//! pipeline: byte-window and content-range values, header extraction, and
//! the upstream client.

mod client;
pub use client::new_request_build_error;
pub use client::ByteStream;
pub use client::HttpClient;

mod bytes_range;
pub use bytes_range::BytesRange;

mod content_range;
pub use content_range::BytesContentRange;

mod header;
pub use header::parse_accept_ranges;
pub use header::parse_content_length;
pub use header::parse_content_range;
pub use header::parse_etag;
pub use header::parse_header_to_str;
pub use header::parse_last_modified;
