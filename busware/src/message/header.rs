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

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Metadata carried by every Busware message.
///
/// `id` is the correlation id: the goal id for action traffic and the
/// request id for service traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Microseconds since the Unix epoch at the moment the message was stamped.
    pub timestamp_us: i64,
    /// Correlation id.
    pub id: String,
}

impl Header {
    /// Creates a header for `id` stamped with the current time.
    #[must_use]
    pub fn stamped(id: impl Into<String>) -> Self {
        Self {
            timestamp_us: now_us(),
            id: id.into(),
        }
    }
}

/// Current wall-clock time in microseconds since the Unix epoch.
///
/// Clocks set before the epoch report `0`.
#[must_use]
pub fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
