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
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, instrument, trace, warn};

use crate::common::config::BuswareConfig;
use crate::common::dispatch::DispatchLoop;
use crate::common::{DispatchGuard, MessageHandler, SubscriptionId};
use crate::message::BuswareError;
use crate::traits::Transport;

/// The shared context every client and server is built from.
///
/// Owns the transport, the configuration, the background dispatch loop and
/// the task tracker that execution units run on. Cloning is cheap; all
/// clones share the same state. Created by [`BuswareApp`](crate::common::BuswareApp).
#[derive(Clone)]
pub struct BusRuntime(pub(crate) Arc<RuntimeInner>);

pub(crate) struct RuntimeInner {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: BuswareConfig,
    pub(crate) cancellation_token: CancellationToken,
    // Cancelled once shutdown has drained the bus; stops dispatch.
    pub(crate) closed: CancellationToken,
    pub(crate) tracker: TaskTracker,
    pub(crate) dispatch_tracker: TaskTracker,
    pub(crate) handle: Handle,
    pub(crate) dispatch: Arc<DispatchLoop>,
    _owned: OwnedRuntime,
}

/// A Tokio runtime created by [`BuswareApp::launch`](crate::common::BuswareApp::launch).
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

impl Debug for BusRuntime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusRuntime")
            .field("transport", &self.0.transport)
            .field("cancelled", &self.0.cancellation_token.is_cancelled())
            .field("closed", &self.0.closed.is_cancelled())
            .field("tasks", &self.0.tracker.len())
            .finish_non_exhaustive()
    }
}

impl BusRuntime {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        config: BuswareConfig,
        handle: Handle,
        owned: Option<Runtime>,
    ) -> Self {
        let cancellation_token = CancellationToken::new();
        let closed = CancellationToken::new();
        let tracker = TaskTracker::new();
        let dispatch_tracker = TaskTracker::new();
        let dispatch = Arc::new(DispatchLoop::new(
            Arc::clone(&transport),
            handle.clone(),
            dispatch_tracker.clone(),
            closed.clone(),
            config.dispatch_poll(),
        ));
        Self(Arc::new(RuntimeInner {
            transport,
            config,
            cancellation_token,
            closed,
            tracker,
            dispatch_tracker,
            handle,
            dispatch,
            _owned: OwnedRuntime(owned),
        }))
    }

    /// The transport underneath.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.0.transport
    }

    /// The configuration this runtime was launched with.
    #[must_use]
    pub fn config(&self) -> &BuswareConfig {
        &self.0.config
    }

    /// The Tokio handle tasks are spawned on.
    ///
    /// Synchronous callers can use it to `block_on` Busware futures.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.0.handle
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.0.cancellation_token
    }

    /// Token cancelled when [`shutdown`](Self::shutdown) has finished
    /// delivering the last results.
    pub(crate) fn closed_token(&self) -> &CancellationToken {
        &self.0.closed
    }

    /// Starts the background dispatch loop if needed and keeps it running
    /// while the guard is alive.
    pub fn acquire_dispatch(&self) -> DispatchGuard {
        self.0.dispatch.acquire()
    }

    /// Number of live dispatch guards.
    #[must_use]
    pub fn dispatch_guards(&self) -> usize {
        self.0.dispatch.guard_count()
    }

    /// Whether the background dispatch loop is running.
    #[must_use]
    pub fn is_dispatching(&self) -> bool {
        self.0.dispatch.is_running()
    }

    /// Drains the transport once, waiting up to `timeout` for the first message.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if dispatch fails.
    pub async fn dispatch_once(&self, timeout: Duration) -> Result<usize, BuswareError> {
        self.0.transport.dispatch(timeout).await
    }

    /// Publishes raw bytes on `channel`.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if publishing fails.
    pub fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BuswareError> {
        self.0.transport.publish(channel, payload)
    }

    /// Subscribes a raw handler to `channel`.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the subscription fails.
    pub fn subscribe(
        &self,
        channel: &str,
        handler: MessageHandler,
    ) -> Result<SubscriptionId, BuswareError> {
        self.0.transport.subscribe(channel, handler)
    }

    /// Removes a subscription, logging instead of failing.
    pub(crate) fn unsubscribe_quietly(&self, subscription: SubscriptionId) {
        if let Err(e) = self.0.transport.unsubscribe(subscription) {
            warn!(%subscription, "Failed to unsubscribe: {e}");
        }
    }

    /// Spawns a task on the runtime's tracker.
    pub(crate) fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.0.tracker.spawn_on(task, &self.0.handle)
    }

    /// Cancels every server and execution unit, waits for their tasks, then
    /// delivers what they published and stops dispatching.
    ///
    /// Dispatch keeps running while execution units wind down so their final
    /// results still reach clients. Handles left without a result afterwards
    /// resolve with [`BuswareError::ClientClosed`]. Waits at most
    /// `timeouts.shutdown_timeout_ms` in total.
    ///
    /// # Errors
    ///
    /// Returns an error if tasks are still running when the timeout expires.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let timeout = self.0.config.shutdown_timeout();
        let deadline = tokio::time::Instant::now() + timeout;
        debug!(tasks = self.0.tracker.len(), "Shutting down bus runtime");
        self.0.cancellation_token.cancel();
        self.0.tracker.close();
        let units_done = tokio::time::timeout_at(deadline, self.0.tracker.wait())
            .await
            .is_ok();

        // Results published by the last units may still be queued.
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, self.0.transport.dispatch(Duration::ZERO)).await {
            Ok(Ok(drained)) => trace!(drained, "Final dispatch pass"),
            Ok(Err(e)) => warn!("Final dispatch failed: {e}"),
            Err(_) => warn!("No time left for a final dispatch pass"),
        }

        self.0.closed.cancel();
        self.0.dispatch_tracker.close();
        let dispatch_done = tokio::time::timeout_at(deadline, self.0.dispatch_tracker.wait())
            .await
            .is_ok();

        if !(units_done && dispatch_done) {
            error!(
                "Shutdown timeout expired after {:?} with {} tasks still running",
                timeout,
                self.0.tracker.len() + self.0.dispatch_tracker.len()
            );
            return Err(anyhow::anyhow!(
                "Timeout while waiting for bus runtime tasks to finish after {timeout:?}"
            ));
        }
        trace!("Bus runtime shut down");
        Ok(())
    }
}
