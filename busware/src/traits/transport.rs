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

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::common::{MessageHandler, SubscriptionId};
use crate::message::BuswareError;

/// The publish/subscribe bus Busware is layered on.
///
/// Implementations must deliver every published message to every live
/// subscriber of that exact channel name, preserve per-channel publish order,
/// and never invoke a handler from inside `publish`. Handlers run only from
/// `dispatch`.
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// Publishes `payload` on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::Transport`] if the bus rejects the message.
    fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BuswareError>;

    /// Registers `handler` for messages on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::Transport`] if the subscription cannot be created.
    fn subscribe(&self, channel: &str, handler: MessageHandler)
        -> Result<SubscriptionId, BuswareError>;

    /// Removes a subscription. Unknown ids are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::Transport`] if the bus fails to remove it.
    fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), BuswareError>;

    /// Waits up to `timeout` for pending messages and invokes their handlers.
    ///
    /// Returns the number of messages handled. Must be cancel-safe: dropping
    /// the future before it completes may not lose a message.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::Transport`] if the bus is closed or broken.
    async fn dispatch(&self, timeout: Duration) -> Result<usize, BuswareError>;
}
