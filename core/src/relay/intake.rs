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

use super::context::TransferContext;
use crate::Result;

/// Accept a client request and normalize it into a [`TransferContext`].
///
/// This performs no I/O: a malformed `Range` header fails here, before
/// any upstream traffic, and surfaces to the client as a bad request.
pub(crate) fn accept(path: &str, range_header: Option<&str>) -> Result<TransferContext> {
    let requested = range_header
        .map(|value| value.parse())
        .transpose()
        .map_err(|err: crate::Error| err.with_operation("intake::accept"))?;

    Ok(TransferContext::new(path, requested))
}
