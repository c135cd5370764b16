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

use busware::prelude::*;

/// Goal of the [`Divide`](super::Divide) action.
#[bus_message]
#[derive(PartialEq)]
pub struct DivideGoal {
    pub numerator: f64,
    pub denominator: f64,
    /// Number of progress messages to emit first.
    pub steps: u32,
}

/// Feedback of the [`Divide`](super::Divide) action.
#[bus_message]
#[derive(PartialEq, Eq)]
pub struct Progress {
    pub step: u32,
    pub of: u32,
}

/// Result of the [`Divide`](super::Divide) action.
#[bus_message]
#[derive(PartialEq)]
pub struct Quotient {
    pub value: f64,
}

/// Request of the [`AddTwoInts`](super::AddTwoInts) service.
#[bus_message]
pub struct AddRequest {
    pub a: i64,
    pub b: i64,
}
