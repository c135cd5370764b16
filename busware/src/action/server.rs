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
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, trace, warn};

use crate::action::execution::{ExecutionUnit, FeedbackPublisher, ResultPublisher};
use crate::common::{BusRuntime, MessageHandler, SubscriptionId};
use crate::message::{
    ActionChannels, ActionResult, BuswareError, CancelRequest, Feedback, Goal, JsonCodec,
};
use crate::traits::{Action, ActionHandler, PayloadCodec};

struct UnitEntry {
    token: CancellationToken,
    // Kept until the unit finishes so a repeated goal id is still refused.
    canceled: bool,
}

struct ServerCore<A: Action, C: PayloadCodec> {
    runtime: BusRuntime,
    channels: ActionChannels,
    codec: C,
    handler: RwLock<Arc<dyn ActionHandler<A>>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    units: DashMap<String, UnitEntry>,
    tracker: TaskTracker,
    token: Mutex<CancellationToken>,
    permits: Option<Arc<Semaphore>>,
}

/// Accepts goals for one action and runs each in its own execution unit.
///
/// The handler is bound at construction. Every goal runs as a separate Tokio
/// task, never on the dispatch loop, and publishes exactly one result.
/// Concurrency is unbounded unless `limits.max_concurrent_goals` is set, in
/// which case excess goals queue for a slot.
///
/// ```rust,ignore
/// let server = ActionServer::<Countdown>::new(&runtime, "/demo/countdown", handler_fn(
///     |goal: Goal<u64>, ctx: GoalContext<Countdown>| async move {
///         for n in (1..=goal.payload).rev() {
///             ctx.emit_feedback(n)?;
///         }
///         Ok("liftoff".to_string())
///     },
/// ))?;
/// server.start()?;
/// ```
pub struct ActionServer<A: Action, C: PayloadCodec = JsonCodec> {
    core: Arc<ServerCore<A, C>>,
}

impl<A: Action, C: PayloadCodec> Debug for ActionServer<A, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionServer")
            .field("base", &self.core.channels.base())
            .field("codec", &self.core.codec.name())
            .field("running", &self.is_running())
            .field("active_goals", &self.active_goals())
            .finish_non_exhaustive()
    }
}

impl<A: Action> ActionServer<A, JsonCodec> {
    /// Creates a stopped server for the action at `path` using JSON payloads.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::EmptyPath`] if `path` is empty.
    pub fn new(
        runtime: &BusRuntime,
        path: &str,
        handler: impl ActionHandler<A>,
    ) -> Result<Self, BuswareError> {
        Self::with_codec(runtime, path, handler, JsonCodec)
    }
}

impl<A: Action, C: PayloadCodec> ActionServer<A, C> {
    /// Creates a stopped server that encodes payloads with `codec`.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::EmptyPath`] if `path` is empty.
    pub fn with_codec(
        runtime: &BusRuntime,
        path: &str,
        handler: impl ActionHandler<A>,
        codec: C,
    ) -> Result<Self, BuswareError> {
        let channels = ActionChannels::new(path)?;
        let permits = runtime
            .config()
            .goal_limit()
            .map(|limit| Arc::new(Semaphore::new(limit)));
        debug!(base = channels.base(), codec = codec.name(), ?permits, "Creating action server");

        Ok(Self {
            core: Arc::new(ServerCore {
                runtime: runtime.clone(),
                channels,
                codec,
                handler: RwLock::new(Arc::new(handler)),
                subscriptions: Mutex::new(Vec::new()),
                units: DashMap::new(),
                tracker: TaskTracker::new(),
                token: Mutex::new(runtime.cancellation_token().child_token()),
                permits,
            }),
        })
    }

    /// Replaces the handler.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::ServerRunning`] while the server is running.
    pub fn register(&self, handler: impl ActionHandler<A>) -> Result<(), BuswareError> {
        let subscriptions = self.core.subscriptions.lock();
        if !subscriptions.is_empty() {
            return Err(BuswareError::ServerRunning);
        }
        *self.core.handler.write() = Arc::new(handler);
        trace!(base = self.core.channels.base(), "Handler registered");
        Ok(())
    }

    /// Whether the server is subscribed to its goal and cancel channels.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.core.subscriptions.lock().is_empty()
    }

    /// Number of goals currently executing or queued, not counting goals
    /// whose cancellation has been requested.
    #[must_use]
    pub fn active_goals(&self) -> usize {
        self.core.units.iter().filter(|unit| !unit.canceled).count()
    }

    /// The channels this server listens on.
    #[must_use]
    pub fn channels(&self) -> &ActionChannels {
        &self.core.channels
    }

    /// Token that ends [`spin`](Self::spin) when cancelled.
    ///
    /// Cancelling it also cancels every running goal. A new token is issued
    /// when the server is started again after [`stop`](Self::stop).
    #[must_use]
    pub fn stop_token(&self) -> CancellationToken {
        self.core.token.lock().clone()
    }

    /// Subscribes to the goal and cancel channels. Does nothing if already running.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a subscription fails.
    pub fn start(&self) -> Result<(), BuswareError> {
        let mut subscriptions = self.core.subscriptions.lock();
        if !subscriptions.is_empty() {
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
        let on_goal: MessageHandler = Arc::new(move |_channel: &str, payload: &[u8]| {
            if let Some(core) = weak.upgrade() {
                core.on_goal(payload);
            }
        });
        let goal = self.core.runtime.subscribe(&self.core.channels.goal(), on_goal)?;

        let weak = Arc::downgrade(&self.core);
        let on_cancel: MessageHandler = Arc::new(move |_channel: &str, payload: &[u8]| {
            if let Some(core) = weak.upgrade() {
                core.on_cancel(payload);
            }
        });
        let cancel = match self.core.runtime.subscribe(&self.core.channels.cancel(), on_cancel) {
            Ok(cancel) => cancel,
            Err(e) => {
                self.core.runtime.unsubscribe_quietly(goal);
                return Err(e);
            }
        };

        subscriptions.extend([goal, cancel]);
        info!(base = self.core.channels.base(), "Action server started");
        Ok(())
    }

    /// Unsubscribes, cancels every running goal and waits for them to finish.
    ///
    /// Waits at most `timeouts.shutdown_timeout_ms`. Unsubscribe failures are
    /// logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::Timeout`] if goals were still running when the
    /// wait expired.
    #[instrument(skip(self), fields(base = self.core.channels.base()))]
    pub async fn stop(&self) -> Result<(), BuswareError> {
        let subscriptions = std::mem::take(&mut *self.core.subscriptions.lock());
        for subscription in subscriptions {
            self.core.runtime.unsubscribe_quietly(subscription);
        }
        self.core.token.lock().cancel();

        let timeout = self.core.runtime.config().shutdown_timeout();
        self.core.tracker.close();
        let waited = tokio::time::timeout(timeout, self.core.tracker.wait()).await;
        self.core.tracker.reopen();

        if waited.is_err() {
            warn!(remaining = self.core.tracker.len(), "Goals still running after {timeout:?}");
            return Err(BuswareError::Timeout(timeout));
        }
        info!("Action server stopped");
        Ok(())
    }

    /// Starts if needed, then dispatches pending bus messages once.
    ///
    /// Returns whether any message was handled within `timeout`.
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

impl<A: Action, C: PayloadCodec> ServerCore<A, C> {
    fn on_goal(self: Arc<Self>, payload: &[u8]) {
        let goal: Goal<A::Goal> = match self.codec.decode(payload) {
            Ok(goal) => goal,
            Err(e) => {
                warn!(base = self.channels.base(), "Dropping undecodable goal: {e}");
                return;
            }
        };
        let goal_id = goal.id().to_string();
        let token = match self.units.entry(goal_id.clone()) {
            Entry::Occupied(_) => {
                warn!(goal_id, "Duplicate goal id, ignoring");
                return;
            }
            Entry::Vacant(slot) => {
                let token = self.token.lock().child_token();
                slot.insert(UnitEntry {
                    token: token.clone(),
                    canceled: false,
                });
                token
            }
        };
        info!(goal_id, "Goal accepted");

        let unit = ExecutionUnit {
            goal,
            token,
            handler: self.handler.read().clone(),
            feedback: self.feedback_publisher(&goal_id),
            result: self.result_publisher(&goal_id),
            permits: self.permits.clone(),
        };
        let core = Arc::clone(&self);
        let task = self.tracker.track_future(async move {
            unit.run().await;
            core.units.remove(&goal_id);
        });
        self.runtime.spawn(task);
    }

    fn on_cancel(&self, payload: &[u8]) {
        let request: CancelRequest = match self.codec.decode(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(base = self.channels.base(), "Dropping undecodable cancel request: {e}");
                return;
            }
        };
        match self.units.get_mut(&request.goal_id) {
            Some(mut unit) if !unit.canceled => {
                unit.canceled = true;
                unit.token.cancel();
                info!(goal_id = %request.goal_id, "Goal cancel signalled");
            }
            Some(_) => trace!(goal_id = %request.goal_id, "Goal already canceled"),
            None => trace!(goal_id = %request.goal_id, "Cancel for unknown goal, ignoring"),
        }
    }

    fn feedback_publisher(&self, goal_id: &str) -> FeedbackPublisher<A::Feedback> {
        let runtime = self.runtime.clone();
        let codec = self.codec.clone();
        let channel = self.channels.feedback(goal_id);
        Arc::new(move |feedback: Feedback<A::Feedback>| {
            let bytes = codec.encode(&feedback)?;
            runtime.publish(&channel, bytes)
        })
    }

    fn result_publisher(&self, goal_id: &str) -> ResultPublisher<A::Result> {
        let runtime = self.runtime.clone();
        let codec = self.codec.clone();
        let channel = self.channels.result(goal_id);
        Box::new(move |result: ActionResult<A::Result>| {
            let bytes = codec.encode(&result)?;
            runtime.publish(&channel, bytes)
        })
    }
}

impl<A: Action, C: PayloadCodec> Drop for ActionServer<A, C> {
    fn drop(&mut self) {
        let subscriptions = std::mem::take(&mut *self.core.subscriptions.lock());
        for subscription in subscriptions {
            self.core.runtime.unsubscribe_quietly(subscription);
        }
        self.core.token.lock().cancel();
    }
}
