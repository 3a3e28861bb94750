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

//! rangerelay is a resilient streaming relay for HTTP byte-stream
//! downloads.
//!
//! A client asks the relay for a resource; the relay fetches it from a
//! configured upstream origin and streams it back. When the upstream
//! connection breaks mid-transfer, the relay re-establishes the fetch and
//! resumes from the exact byte already delivered, so the client sees one
//! uninterrupted body. If the upstream starts serving a different version
//! of the resource between attempts, the relay aborts rather than splice
//! bytes from two versions.
//!
//! The crate exposes the engine only; serving it over HTTP is the job of
//! a thin gateway (see the `rgate` binary), which turns a [`Delivery`]
//! into a response and maps pre-commit errors to client statuses.
//!
//! # Examples
//!
//! ```no_run
//! use rangerelay::{Relay, RelayConfig};
//!
//! # async fn example() -> rangerelay::Result<()> {
//! let relay = Relay::new(RelayConfig {
//!     upstream: Some("https://origin.example".to_string()),
//!     ..Default::default()
//! })?;
//!
//! let delivery = relay.fetch("/videos/clip.bin", None).await?;
//! # let _ = delivery;
//! # Ok(())
//! # }
//! ```

mod config;
pub use config::RelayConfig;

mod error;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;

pub mod http_util;

mod relay;
pub use relay::Delivery;
pub use relay::DeliveryBody;
pub use relay::Relay;
