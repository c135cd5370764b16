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
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::action::panic_message;
use crate::common::{BusRuntime, MessageHandler, SubscriptionId};
use crate::message::{
    BuswareError, Header, JsonCodec, ResponseHeader, ServiceChannels, ServiceRequest,
    ServiceResponse,
};
use crate::traits::{PayloadCodec, Service, ServiceHandler};

struct ServiceServerCore<S: Service, C: PayloadCodec> {
    runtime: BusRuntime,
    channels: ServiceChannels,
    codec: C,
    handler: RwLock<Arc<dyn ServiceHandler<S>>>,
    subscription: Mutex<Option<SubscriptionId>>,
    tracker: TaskTracker,
    token: Mutex<CancellationToken>,
}

/// Answers requests for one service.
///
/// Each request is handled in its own task. A handler error or panic becomes
/// a response with `success == false` carrying the error text.
pub struct ServiceServer<S: Service, C: PayloadCodec = JsonCodec> {
    core: Arc<ServiceServerCore<S, C>>,
}

impl<S: Service, C: PayloadCodec> Debug for ServiceServer<S, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceServer")
            .field("base", &self.core.channels.base())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl<S: Service> ServiceServer<S, JsonCodec> {
    /// Creates a stopped server for the service at `path` using JSON payloads.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::EmptyPath`] if `path` is empty.
    pub fn new(
        runtime: &BusRuntime,
        path: &str,
        handler: impl ServiceHandler<S>,
    ) -> Result<Self, BuswareError> {
        Self::with_codec(runtime, path, handler, JsonCodec)
    }
}

impl<S: Service, C: PayloadCodec> ServiceServer<S, C> {
    /// Creates a stopped server that encodes payloads with `codec`.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::EmptyPath`] if `path` is empty.
    pub fn with_codec(
        runtime: &BusRuntime,
        path: &str,
        handler: impl ServiceHandler<S>,
        codec: C,
    ) -> Result<Self, BuswareError> {
        let channels = ServiceChannels::new(path)?;
        debug!(base = channels.base(), codec = codec.name(), "Creating service server");
        Ok(Self {
            core: Arc::new(ServiceServerCore {
                runtime: runtime.clone(),
                channels,
                codec,
                handler: RwLock::new(Arc::new(handler)),
                subscription: Mutex::new(None),
                tracker: TaskTracker::new(),
                token: Mutex::new(runtime.cancellation_token().child_token()),
            }),
        })
    }

    /// Replaces the handler.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::ServerRunning`] while the server is running.
    pub fn register(&self, handler: impl ServiceHandler<S>) -> Result<(), BuswareError> {
        let subscription = self.core.subscription.lock();
        if subscription.is_some() {
            return Err(BuswareError::ServerRunning);
        }
        *self.core.handler.write() = Arc::new(handler);
        Ok(())
    }

    /// Whether the server is subscribed to its request channel.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.core.subscription.lock().is_some()
    }

    /// Token that ends [`spin`](Self::spin) when cancelled.
    #[must_use]
    pub fn stop_token(&self) -> CancellationToken {
        self.core.token.lock().clone()
    }

    /// Subscribes to the request channel. Does nothing if already running.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the subscription fails.
    pub fn start(&self) -> Result<(), BuswareError> {
        let mut subscription = self.core.subscription.lock();
        if subscription.is_some() {
            return Ok(());
        }
        {
            let mut token = self.core.token.lock();
            if token.is_cancelled() {
                *token = self.core.runtime.cancellation_token().child_token();
                self.core.tracker.reopen();
            }
        }

        let weak = Arc::downgrade(&self.core);
        let on_request: MessageHandler = Arc::new(move |_channel: &str, payload: &[u8]| {
            if let Some(core) = weak.upgrade() {
                core.on_request(payload);
            }
        });
        *subscription = Some(
            self.core
                .runtime
                .subscribe(&self.core.channels.request(), on_request)?,
        );
        info!(base = self.core.channels.base(), "Service server started");
        Ok(())
    }

    /// Unsubscribes and waits for in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::Timeout`] if requests were still running when
    /// `timeouts.shutdown_timeout_ms` expired.
    #[instrument(skip(self), fields(base = self.core.channels.base()))]
    pub async fn stop(&self) -> Result<(), BuswareError> {
        let subscription = self.core.subscription.lock().take();
        if let Some(subscription) = subscription {
            self.core.runtime.unsubscribe_quietly(subscription);
        }
        self.core.token.lock().cancel();

        let timeout = self.core.runtime.config().shutdown_timeout();
        self.core.tracker.close();
        let waited = tokio::time::timeout(timeout, self.core.tracker.wait()).await;
        self.core.tracker.reopen();

        if waited.is_err() {
            warn!(remaining = self.core.tracker.len(), "Requests still running after {timeout:?}");
            return Err(BuswareError::Timeout(timeout));
        }
        info!("Service server stopped");
        Ok(())
    }

    /// Starts if needed, then dispatches pending bus messages once.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if starting or dispatching fails.
    pub async fn handle_once(&self, timeout: Duration) -> Result<bool, BuswareError> {
        self.start()?;
        Ok(self.core.runtime.dispatch_once(timeout).await? > 0)
    }

    /// Starts and serves until [`stop_token`](Self::stop_token) is cancelled
    /// or the runtime shuts down, then stops.
    ///
    /// # Errors
    ///
    /// Returns the error of [`start`](Self::start) or [`stop`](Self::stop).
    pub async fn spin(&self) -> Result<(), BuswareError> {
        self.start()?;
        let _dispatch = self.core.runtime.acquire_dispatch();
        let token = self.stop_token();
        token.cancelled().await;
        self.stop().await
    }
}

impl<S: Service, C: PayloadCodec> ServiceServerCore<S, C> {
    fn on_request(&self, payload: &[u8]) {
        let request: ServiceRequest<S::Request> = match self.codec.decode(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(base = self.channels.base(), "Dropping undecodable request: {e}");
                return;
            }
        };
        let request_id = request.header.id.clone();
        trace!(request_id, "Request received");

        let handler = self.handler.read().clone();
        let runtime = self.runtime.clone();
        let codec = self.codec.clone();
        let channel = self.channels.response(&request_id);
        let task = self.tracker.track_future(async move {
            let outcome = AssertUnwindSafe(handler.handle(request)).catch_unwind().await;
            let (success, payload, error_message) = match outcome {
                Ok(Ok(value)) => (true, Some(value), String::new()),
                Ok(Err(e)) => {
                    error!(request_id, "Service handler failed: {e:#}");
                    (false, None, e.to_string())
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(request_id, "Service handler panicked: {message}");
                    (false, None, message)
                }
            };
            let response = ServiceResponse {
                response_header: ResponseHeader {
                    header: Header::stamped(request_id.clone()),
                    success,
                    error_message,
                },
                payload,
            };
            let sent = codec
                .encode(&response)
                .and_then(|bytes| runtime.publish(&channel, bytes));
            if let Err(e) = sent {
                error!(request_id, "Failed to publish response: {e}");
            }
        });
        self.runtime.spawn(task);
    }
}

impl<S: Service, C: PayloadCodec> Drop for ServiceServer<S, C> {
    fn drop(&mut self) {
        if let Some(subscription) = self.core.subscription.lock().take() {
            self.core.runtime.unsubscribe_quietly(subscription);
        }
        self.core.token.lock().cancel();
    }
}
