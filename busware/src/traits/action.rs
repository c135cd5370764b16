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

use crate::traits::BusMessage;

/// Binds the three payload types of one action.
///
/// Usually implemented on a unit marker type with `#[bus_action(...)]`.
pub trait Action: Send + Sync + 'static {
    /// Payload of the goal.
    type Goal: BusMessage;
    /// Payload of each feedback message.
    type Feedback: BusMessage;
    /// Payload of a successful result.
    type Result: BusMessage;
}
