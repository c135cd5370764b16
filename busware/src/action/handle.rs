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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace, warn};

use crate::message::{ActionResult, ActionStatus, BuswareError, Feedback};
use crate::traits::Action;

/// Callback invoked for each feedback message of one goal.
pub type FeedbackCallback<F> = Arc<dyn Fn(&Feedback<F>) -> anyhow::Result<()> + Send + Sync + 'static>;

/// Publishes a cancel request for a goal id on behalf of the owning client.
pub(crate) type CancelPublisher = Arc<dyn Fn(&str) -> Result<(), BuswareError> + Send + Sync + 'static>;

type Outcome<R> = Result<ActionResult<R>, BuswareError>;

/// Client-side state of one goal, shared by the client's goal table and
/// every clone of its [`ActionHandle`].
pub(crate) struct GoalSlot<A: Action> {
    goal_id: String,
    status: Mutex<ActionStatus>,
    cancel_requested: AtomicBool,
    callbacks: Mutex<Vec<FeedbackCallback<A::Feedback>>>,
    // Serializes feedback delivery and resolution for this goal. Reentrant so
    // a callback may drop the owning client, which closes this slot.
    delivery: ReentrantMutex<()>,
    resolved: AtomicBool,
    outcome: watch::Sender<Option<Outcome<A::Result>>>,
}

impl<A: Action> GoalSlot<A> {
    pub(crate) fn new(goal_id: String) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            goal_id,
            status: Mutex::new(ActionStatus::Accepted),
            cancel_requested: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
            delivery: ReentrantMutex::new(()),
            resolved: AtomicBool::new(false),
            outcome,
        }
    }

    pub(crate) fn goal_id(&self) -> &str {
        &self.goal_id
    }

    /// Runs every callback registered so far. Dropped once the goal is resolved.
    pub(crate) fn deliver_feedback(&self, feedback: &Feedback<A::Feedback>) {
        let _delivery = self.delivery.lock();
        if self.resolved.load(Ordering::Acquire) {
            trace!(goal_id = %self.goal_id, "Feedback after result, dropping");
            return;
        }
        {
            let mut status = self.status.lock();
            if *status == ActionStatus::Accepted {
                *status = ActionStatus::Executing;
            }
        }

        // Snapshot so a callback may register further callbacks.
        let callbacks = self.callbacks.lock().clone();
        for (index, callback) in callbacks.iter().enumerate() {
            if self.resolved.load(Ordering::Acquire) {
                trace!(goal_id = %self.goal_id, "Goal resolved during feedback delivery");
                return;
            }
            match catch_unwind(AssertUnwindSafe(|| callback(feedback))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(goal_id = %self.goal_id, index, "Feedback callback failed: {e:#}");
                }
                Err(_) => {
                    error!(goal_id = %self.goal_id, index, "Feedback callback panicked");
                }
            }
        }
    }

    /// Stores the terminal result. Only the first call has any effect.
    pub(crate) fn resolve(&self, result: ActionResult<A::Result>) -> bool {
        let status = match result.status.status_code {
            status if status.is_terminal() => status,
            other => {
                warn!(goal_id = %self.goal_id, %other, "Result carried a non-terminal status, treating as aborted");
                ActionStatus::Aborted
            }
        };
        let outcome = match status {
            ActionStatus::Succeeded => Ok(result),
            ActionStatus::Canceled => Err(BuswareError::Canceled {
                goal_id: self.goal_id.clone(),
                message: result.status.message,
            }),
            _ => Err(BuswareError::Aborted {
                goal_id: self.goal_id.clone(),
                message: result.status.message,
            }),
        };
        self.settle(Some(status), outcome)
    }

    /// Resolves with [`BuswareError::ClientClosed`] if nothing else has.
    pub(crate) fn close(&self) -> bool {
        self.settle(None, Err(BuswareError::ClientClosed))
    }

    fn settle(&self, status: Option<ActionStatus>, outcome: Outcome<A::Result>) -> bool {
        let _delivery = self.delivery.lock();
        if self.resolved.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(status) = status {
            *self.status.lock() = status;
        }
        self.outcome.send_replace(Some(outcome));
        true
    }
}

/// The client's proxy for one goal.
///
/// Cheap to clone; clones observe the same goal. Dropping a handle does not
/// affect the goal.
pub struct ActionHandle<A: Action> {
    slot: Arc<GoalSlot<A>>,
    canceller: CancelPublisher,
    closed: CancellationToken,
}

impl<A: Action> Clone for ActionHandle<A> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            canceller: Arc::clone(&self.canceller),
            closed: self.closed.clone(),
        }
    }
}

impl<A: Action> Debug for ActionHandle<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHandle")
            .field("goal_id", &self.slot.goal_id)
            .field("status", &self.status())
            .field("cancel_requested", &self.is_cancel_requested())
            .finish_non_exhaustive()
    }
}

impl<A: Action> ActionHandle<A> {
    pub(crate) fn new(
        slot: Arc<GoalSlot<A>>,
        canceller: CancelPublisher,
        closed: CancellationToken,
    ) -> Self {
        Self {
            slot,
            canceller,
            closed,
        }
    }

    /// The goal id shared by every message of this goal.
    #[must_use]
    pub fn goal_id(&self) -> &str {
        &self.slot.goal_id
    }

    /// The goal's current status as seen by this client.
    #[must_use]
    pub fn status(&self) -> ActionStatus {
        *self.slot.status.lock()
    }

    /// Whether [`cancel`](Self::cancel) has sent a cancel request.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.slot.cancel_requested.load(Ordering::Acquire)
    }

    /// Registers a callback for feedback arriving from now on.
    ///
    /// Past feedback is not replayed. Callbacks run on the dispatch loop in
    /// arrival order and must not block. A callback returning `Err` or
    /// panicking is logged and does not affect other callbacks.
    pub fn add_feedback_callback<F>(&self, callback: F)
    where
        F: Fn(&Feedback<A::Feedback>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.slot.callbacks.lock().push(Arc::new(callback));
    }

    /// Asks the server to stop this goal.
    ///
    /// Sends at most one cancel request per goal, and only while the goal is
    /// accepted or executing; every other call is a no-op. The local status
    /// is unchanged until the server's result arrives.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::ClientClosed`] if the client is gone, or the
    /// codec/transport error if the request could not be published.
    pub fn cancel(&self) -> Result<(), BuswareError> {
        if !self.status().is_cancellable() {
            trace!(goal_id = %self.slot.goal_id, "Goal already finished, not canceling");
            return Ok(());
        }
        if self.slot.cancel_requested.swap(true, Ordering::AcqRel) {
            trace!(goal_id = %self.slot.goal_id, "Cancel already requested");
            return Ok(());
        }
        (self.canceller)(&self.slot.goal_id)
    }

    /// Waits for the goal's terminal result.
    ///
    /// `None` waits indefinitely. On timeout the goal stays outstanding and
    /// the server is not told to cancel. May be called more than once.
    ///
    /// # Errors
    ///
    /// * [`BuswareError::Timeout`] if `timeout` elapsed first
    /// * [`BuswareError::Aborted`] if the handler failed
    /// * [`BuswareError::Canceled`] if the goal was canceled
    /// * [`BuswareError::ClientClosed`] if the client was dropped or the
    ///   runtime shut down first
    pub async fn get_result(
        &self,
        timeout: Option<Duration>,
    ) -> Result<ActionResult<A::Result>, BuswareError> {
        let mut receiver = self.slot.outcome.subscribe();
        let slot = Arc::clone(&self.slot);
        let closed = self.closed.clone();
        let wait = async move {
            let arrived = async {
                receiver
                    .wait_for(Option::is_some)
                    .await
                    .ok()
                    .and_then(|outcome| (*outcome).clone())
            };
            let outcome = tokio::select! {
                biased;
                outcome = arrived => outcome,
                // The runtime shut down and drained the bus; nothing more can arrive.
                () = closed.cancelled() => {
                    slot.close();
                    None
                }
            };
            outcome
                .or_else(|| slot.outcome.borrow().clone())
                .unwrap_or(Err(BuswareError::ClientClosed))
        };
        match timeout {
            None => wait.await,
            Some(after) => tokio::time::timeout(after, wait)
                .await
                .unwrap_or(Err(BuswareError::Timeout(after))),
        }
    }

    /// The outcome if it has already arrived.
    #[must_use]
    pub fn try_result(&self) -> Option<Result<ActionResult<A::Result>, BuswareError>> {
        self.slot.outcome.borrow().clone()
    }
}
