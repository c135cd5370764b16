//! Core traits of Busware.
//!
//! * [`BusMessage`]: marker for anything that may travel on the bus.
//! * [`Action`] / [`Service`]: bind the payload types of one action or service.
//! * [`ActionHandler`] / [`ServiceHandler`]: the server-side work.
//! * [`PayloadCodec`]: turns typed messages into bytes.
//! * [`Transport`]: the publish/subscribe bus underneath.

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

pub use action::Action;
pub use action_handler::{handler_fn, ActionHandler, FnHandler};
pub use bus_message::BusMessage;
pub use payload_codec::PayloadCodec;
pub use service::Service;
pub use service_handler::{service_handler_fn, FnServiceHandler, ServiceHandler};
pub use transport::Transport;

mod action;
/// Defines the [`ActionHandler`] trait and its closure adapter.
mod action_handler;
mod bus_message;
mod payload_codec;
mod service;
/// Defines the [`ServiceHandler`] trait and its closure adapter.
mod service_handler;
/// Defines the [`Transport`] trait.
mod transport;
