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

/// Cap on the quadratic growth factor. With the default one-second base
/// the longest sleep between attempts is one minute.
const QUADRATIC_CAP: u32 = 60;

/// Quadratic retry schedule: attempt `n` sleeps `base * min(60, n^2)`.
///
/// Early retries are near-immediate so a short network blip costs little;
/// a long outage quickly settles at the capped interval.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Backoff {
    base: Duration,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Backoff { base }
    }

    /// The sleep before retry ordinal `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = attempt.saturating_mul(attempt).min(QUADRATIC_CAP);
        self.base.saturating_mul(factor)
    }
}
