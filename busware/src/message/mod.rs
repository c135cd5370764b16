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

//! Message types, channel naming, codecs and errors.
//!
//! Every message starts with a [`Header`] whose `id` is the correlation id
//! used to route feedback, results and responses back to their origin.

pub use action_messages::{ActionResult, ActionStatus, CancelRequest, Feedback, Goal, GoalStatus};
pub use channels::{ActionChannels, ServiceChannels};
pub(crate) use channels::resolve_client_name;
pub use codec::{JsonCodec, MessagePackCodec};
pub use error::BuswareError;
pub use header::{now_us, Header};
pub use service_messages::{ResponseHeader, ServiceRequest, ServiceResponse};

mod action_messages;
mod channels;
mod codec;
mod error;
mod header;
mod service_messages;
