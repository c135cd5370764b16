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

use std::time::Duration;

/// Errors raised by Busware clients, servers and transports.
///
/// Construction errors (`EmptyPath`, `ClientNameTooLong`) are returned
/// immediately from constructors and never deferred. Goal and call outcomes
/// other than success (`Aborted`, `Canceled`, `ServiceFailed`) are carried
/// as values through the handle's result slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuswareError {
    /// An action or service base path was empty.
    EmptyPath,
    /// A client name exceeded the configured maximum length.
    ClientNameTooLong {
        /// Length of the rejected name, in characters.
        length: usize,
        /// The configured maximum.
        max: usize,
    },
    /// The handler cannot be replaced while the server is running.
    ServerRunning,
    /// No result arrived within the caller's timeout.
    Timeout(Duration),
    /// The goal's handler failed; `message` carries its error text.
    Aborted {
        /// The goal that failed.
        goal_id: String,
        /// The handler's error description.
        message: String,
    },
    /// The goal was canceled before producing a result.
    Canceled {
        /// The canceled goal.
        goal_id: String,
        /// Text reported by the server.
        message: String,
    },
    /// A service handler reported failure.
    ServiceFailed(String),
    /// The owning client was dropped before the result arrived.
    ClientClosed,
    /// Encoding or decoding a message failed.
    Codec(String),
    /// The transport rejected an operation.
    Transport(String),
}

impl std::fmt::Display for BuswareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyPath => write!(f, "Path cannot be empty"),
            Self::ClientNameTooLong { length, max } => write!(
                f,
                "Client name must be {max} characters or less, got {length}"
            ),
            Self::ServerRunning => write!(f, "Cannot register a handler while the server is running"),
            Self::Timeout(after) => write!(f, "Timed out after {after:?}"),
            Self::Aborted { goal_id, message } => {
                write!(f, "Goal {goal_id} aborted: {message}")
            }
            Self::Canceled { goal_id, message } => {
                write!(f, "Goal {goal_id} canceled: {message}")
            }
            Self::ServiceFailed(msg) => write!(f, "Service call failed: {msg}"),
            Self::ClientClosed => write!(f, "Client closed before a result arrived"),
            Self::Codec(msg) => write!(f, "Codec error: {msg}"),
            Self::Transport(msg) => write!(f, "Transport error: {msg}"),
        }
    }
}

impl std::error::Error for BuswareError {}

impl From<serde_json::Error> for BuswareError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for BuswareError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for BuswareError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
