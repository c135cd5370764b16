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

//! Channel naming for actions and services.
//!
//! Given a base path `P`, an action uses two shared channels (`P/goal`,
//! `P/cancel`) and two per-goal channels (`P/fb/{goal_id}`,
//! `P/res/{goal_id}`). Only the originating client subscribes to the
//! per-goal channels, so clients never filter each other's feedback.
//! Services use `P/req` and `P/rsp/{request_id}`.

use rand::Rng;

use crate::message::BuswareError;

/// The channel family derived from one action base path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionChannels {
    base: String,
}

impl ActionChannels {
    /// Creates the channel family for `base`.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::EmptyPath`] if `base` is empty.
    pub fn new(base: impl Into<String>) -> Result<Self, BuswareError> {
        let base = base.into();
        if base.is_empty() {
            return Err(BuswareError::EmptyPath);
        }
        Ok(Self { base })
    }

    /// The base path.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Channel every client publishes goals on.
    #[must_use]
    pub fn goal(&self) -> String {
        format!("{}/goal", self.base)
    }

    /// Channel every client publishes cancel requests on.
    #[must_use]
    pub fn cancel(&self) -> String {
        format!("{}/cancel", self.base)
    }

    /// Feedback channel for one goal.
    #[must_use]
    pub fn feedback(&self, goal_id: &str) -> String {
        format!("{}/fb/{goal_id}", self.base)
    }

    /// Result channel for one goal.
    #[must_use]
    pub fn result(&self, goal_id: &str) -> String {
        format!("{}/res/{goal_id}", self.base)
    }
}

/// The channel family derived from one service base path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceChannels {
    base: String,
}

impl ServiceChannels {
    /// Creates the channel family for `base`.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::EmptyPath`] if `base` is empty.
    pub fn new(base: impl Into<String>) -> Result<Self, BuswareError> {
        let base = base.into();
        if base.is_empty() {
            return Err(BuswareError::EmptyPath);
        }
        Ok(Self { base })
    }

    /// The base path.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Channel requests are published on.
    #[must_use]
    pub fn request(&self) -> String {
        format!("{}/req", self.base)
    }

    /// Response channel for one request.
    #[must_use]
    pub fn response(&self, request_id: &str) -> String {
        format!("{}/rsp/{request_id}", self.base)
    }
}

/// Validates a requested client name or generates one.
///
/// A missing or empty name becomes `{prefix}_` plus five random hex digits.
pub(crate) fn resolve_client_name(
    requested: Option<&str>,
    prefix: &str,
    max_length: usize,
) -> Result<String, BuswareError> {
    match requested {
        Some(name) if !name.is_empty() => {
            let length = name.chars().count();
            if length > max_length {
                return Err(BuswareError::ClientNameTooLong {
                    length,
                    max: max_length,
                });
            }
            Ok(name.to_string())
        }
        _ => {
            let suffix: u32 = rand::rng().random_range(0..=0xF_FFFF);
            Ok(format!("{prefix}_{suffix:05x}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_channels_are_bit_exact() {
        let channels = ActionChannels::new("/robot/act/move").unwrap();
        assert_eq!(channels.goal(), "/robot/act/move/goal");
        assert_eq!(channels.cancel(), "/robot/act/move/cancel");
        assert_eq!(channels.feedback("arm_3"), "/robot/act/move/fb/arm_3");
        assert_eq!(channels.result("arm_3"), "/robot/act/move/res/arm_3");
    }

    #[test]
    fn service_channels_are_bit_exact() {
        let channels = ServiceChannels::new("/robot/svc/add").unwrap();
        assert_eq!(channels.request(), "/robot/svc/add/req");
        assert_eq!(channels.response("cli_1"), "/robot/svc/add/rsp/cli_1");
    }

    #[test]
    fn empty_base_is_rejected() {
        assert_eq!(ActionChannels::new(""), Err(BuswareError::EmptyPath));
        assert_eq!(ServiceChannels::new(String::new()), Err(BuswareError::EmptyPath));
    }

    #[test]
    fn generated_names_use_prefix_and_five_hex_digits() {
        let name = resolve_client_name(None, "act", 16).unwrap();
        assert_eq!(name.len(), 9);
        assert!(name.starts_with("act_"));
        assert!(name[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert!(resolve_client_name(Some(""), "cli", 16).unwrap().starts_with("cli_"));
    }

    #[test]
    fn long_names_are_rejected() {
        assert_eq!(resolve_client_name(Some("sixteen_chars_ok"), "act", 16).unwrap(), "sixteen_chars_ok");
        assert_eq!(
            resolve_client_name(Some("seventeen_chars_x"), "act", 16),
            Err(BuswareError::ClientNameTooLong { length: 17, max: 16 })
        );
    }
}
