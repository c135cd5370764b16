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

//! Messages exchanged on an action's goal, feedback, cancel and result channels.

use serde::{Deserialize, Serialize};

use crate::message::Header;

/// Lifecycle status of one goal.
///
/// Serialized as its integer status code. `Accepted` is the initial
/// client-local state, `Executing` is set by the client on the first
/// feedback it receives, and the remaining three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ActionStatus {
    /// Goal sent, nothing heard back yet.
    #[default]
    Accepted,
    /// Feedback has been received.
    Executing,
    /// The handler returned normally.
    Succeeded,
    /// The handler failed.
    Aborted,
    /// The goal was canceled.
    Canceled,
}

impl ActionStatus {
    /// The wire status code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Accepted => 1,
            Self::Executing => 2,
            Self::Succeeded => 3,
            Self::Aborted => 4,
            Self::Canceled => 5,
        }
    }

    /// Whether this status is absorbing.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Aborted | Self::Canceled)
    }

    /// Whether a cancel request may still be sent for a goal in this status.
    #[must_use]
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::Accepted | Self::Executing)
    }
}

impl From<ActionStatus> for i32 {
    fn from(status: ActionStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i32> for ActionStatus {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Accepted),
            2 => Ok(Self::Executing),
            3 => Ok(Self::Succeeded),
            4 => Ok(Self::Aborted),
            5 => Ok(Self::Canceled),
            other => Err(format!("unknown action status code {other}")),
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Executing => write!(f, "executing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Aborted => write!(f, "aborted"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// A request to start work. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal<G> {
    /// `header.id` is the goal id.
    pub header: Header,
    /// Application payload.
    pub payload: G,
}

impl<G> Goal<G> {
    /// The goal id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.header.id
    }
}

/// Intermediate progress for one goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback<F> {
    /// `header.id` is the goal id.
    pub header: Header,
    /// Application payload.
    pub payload: F,
}

/// Advisory request to stop a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    /// Stamped with the goal id.
    pub header: Header,
    /// The goal to cancel.
    pub goal_id: String,
}

impl CancelRequest {
    /// A cancel request for `goal_id`, stamped now.
    #[must_use]
    pub fn new(goal_id: impl Into<String>) -> Self {
        let goal_id = goal_id.into();
        Self {
            header: Header::stamped(goal_id.clone()),
            goal_id,
        }
    }
}

/// Terminal status block of an [`ActionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalStatus {
    /// `header.id` is the goal id.
    pub header: Header,
    /// One of the terminal statuses.
    pub status_code: ActionStatus,
    /// Empty on success, the error text otherwise.
    pub message: String,
}

/// The single terminal outcome of one goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult<R> {
    /// Outcome metadata.
    pub status: GoalStatus,
    /// Present when the handler returned normally.
    pub payload: Option<R>,
}

impl<R> ActionResult<R> {
    /// The goal id this result belongs to.
    #[must_use]
    pub fn goal_id(&self) -> &str {
        &self.status.header.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_wire_values() {
        let codes: Vec<i32> = [
            ActionStatus::Accepted,
            ActionStatus::Executing,
            ActionStatus::Succeeded,
            ActionStatus::Aborted,
            ActionStatus::Canceled,
        ]
        .into_iter()
        .map(i32::from)
        .collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5]);
        assert!(ActionStatus::try_from(9).is_err());
    }

    #[test]
    fn status_serializes_as_integer() {
        let status = GoalStatus {
            header: Header {
                timestamp_us: 7,
                id: "c_1".to_string(),
            },
            status_code: ActionStatus::Aborted,
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status_code"], 4);
        assert_eq!(json["header"]["id"], "c_1");
    }

    #[test]
    fn cancel_request_is_stamped_with_goal_id() {
        let cancel = CancelRequest::new("g1_1");
        assert_eq!(cancel.header.id, "g1_1");
        assert_eq!(cancel.goal_id, "g1_1");
        assert!(cancel.header.timestamp_us > 0);
    }
}
