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

use std::fmt::{Debug, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, trace};

use crate::common::{MessageHandler, SubscriptionId};
use crate::message::BuswareError;
use crate::traits::Transport;

type Queued = (String, Vec<u8>);

/// Delivery counters of a [`MemoryBus`].
#[derive(Debug, Default)]
pub struct BusStats {
    published: AtomicUsize,
    delivered: AtomicUsize,
    unrouted: AtomicUsize,
}

impl BusStats {
    /// Messages accepted by `publish`.
    pub fn published(&self) -> usize {
        self.published.load(Ordering::Relaxed)
    }

    /// Handler invocations performed by `dispatch`.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Dispatched messages that found no subscriber.
    pub fn unrouted(&self) -> usize {
        self.unrouted.load(Ordering::Relaxed)
    }
}

/// An in-process [`Transport`].
///
/// Publishing only enqueues; handlers run when [`Transport::dispatch`] drains
/// the queue, in publish order. Every live subscriber of the exact channel
/// name receives each message.
pub struct MemoryBus {
    subscribers: DashMap<String, Vec<(SubscriptionId, MessageHandler)>>,
    channels: DashMap<SubscriptionId, String>,
    next_id: AtomicU64,
    sender: mpsc::UnboundedSender<Queued>,
    receiver: Mutex<mpsc::UnboundedReceiver<Queued>>,
    stats: BusStats,
}

impl Debug for MemoryBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBus")
            .field("channels", &self.subscribers.len())
            .field("subscriptions", &self.channels.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            subscribers: DashMap::new(),
            channels: DashMap::new(),
            next_id: AtomicU64::new(1),
            sender,
            receiver: Mutex::new(receiver),
            stats: BusStats::default(),
        }
    }

    /// Delivery counters.
    pub const fn stats(&self) -> &BusStats {
        &self.stats
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers.get(channel).map_or(0, |entry| entry.len())
    }

    fn deliver(&self, channel: &str, payload: &[u8]) {
        // Snapshot so handlers may subscribe or unsubscribe while running.
        let handlers: Vec<MessageHandler> = self
            .subscribers
            .get(channel)
            .map(|entry| entry.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            trace!(channel, "No subscriber, dropping message");
            self.stats.unrouted.fetch_add(1, Ordering::Relaxed);
            return;
        }

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(channel, payload))).is_err() {
                error!(channel, "Message handler panicked");
            }
            self.stats.delivered.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl Transport for MemoryBus {
    fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BuswareError> {
        trace!(channel, bytes = payload.len(), "Publishing");
        self.sender
            .send((channel.to_string(), payload))
            .map_err(|_| BuswareError::Transport("memory bus queue closed".to_string()))?;
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn subscribe(
        &self,
        channel: &str,
        handler: MessageHandler,
    ) -> Result<SubscriptionId, BuswareError> {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .entry(channel.to_string())
            .or_default()
            .push((id, handler));
        self.channels.insert(id, channel.to_string());
        trace!(channel, %id, "Subscribed");
        Ok(id)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), BuswareError> {
        let Some((_, channel)) = self.channels.remove(&subscription) else {
            return Ok(());
        };
        if let Some(mut entry) = self.subscribers.get_mut(&channel) {
            entry.retain(|(id, _)| *id != subscription);
        }
        self.subscribers.remove_if(&channel, |_, handlers| handlers.is_empty());
        trace!(channel, %subscription, "Unsubscribed");
        Ok(())
    }

    async fn dispatch(&self, timeout: Duration) -> Result<usize, BuswareError> {
        let mut receiver = self.receiver.lock().await;
        let (channel, payload) = match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(message)) => message,
            Ok(None) => return Err(BuswareError::Transport("memory bus queue closed".to_string())),
            Err(_) => return Ok(0),
        };

        self.deliver(&channel, &payload);
        let mut handled = 1;
        while let Ok((channel, payload)) = receiver.try_recv() {
            self.deliver(&channel, &payload);
            handled += 1;
        }
        Ok(handled)
    }
}
