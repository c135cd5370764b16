//! Long-running, cancellable, feedback-emitting actions.
//!
//! A client sends a [`Goal`](crate::message::Goal) on `{base}/goal` and gets
//! back an [`ActionHandle`]. The server runs the goal in an execution unit,
//! publishing progress on `{base}/fb/{goal_id}` and exactly one result on
//! `{base}/res/{goal_id}`. Cancellation is advisory: the client publishes on
//! `{base}/cancel` and the handler observes it through its [`GoalContext`].

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

pub use client::ActionClient;
pub use execution::GoalContext;
pub(crate) use execution::panic_message;
pub use handle::{ActionHandle, FeedbackCallback};
pub use server::ActionServer;

mod client;
mod execution;
mod handle;
mod server;
