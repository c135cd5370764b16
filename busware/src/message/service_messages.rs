/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use serde::{Deserialize, Serialize};

use crate::message::Header;

/// A service request; `header.id` is the request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest<Q> {
    /// Correlation metadata.
    pub header: Header,
    /// Application payload.
    pub payload: Q,
}

/// Outcome metadata of a service response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    /// `header.id` echoes the request id.
    pub header: Header,
    /// Whether the handler returned normally.
    pub success: bool,
    /// Empty on success, the handler's error text otherwise.
    pub error_message: String,
}

/// A service response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse<P> {
    /// Outcome metadata.
    pub response_header: ResponseHeader,
    /// Present when `response_header.success` is true.
    pub payload: Option<P>,
}
