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

use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::message::{ActionResult, ActionStatus, BuswareError, Feedback, Goal, GoalStatus, Header};
use crate::traits::{Action, ActionHandler};

/// Publishes one feedback message on the goal's feedback channel.
pub(crate) type FeedbackPublisher<F> =
    Arc<dyn Fn(Feedback<F>) -> Result<(), BuswareError> + Send + Sync + 'static>;

/// Publishes the goal's single result on its result channel.
pub(crate) type ResultPublisher<R> =
    Box<dyn FnOnce(ActionResult<R>) -> Result<(), BuswareError> + Send + 'static>;

/// What a handler can do while running one goal.
///
/// Passed to [`ActionHandler::execute`]. Cloning is cheap; clones may be
/// moved into helper tasks.
pub struct GoalContext<A: Action> {
    goal_id: String,
    token: CancellationToken,
    publisher: FeedbackPublisher<A::Feedback>,
}

impl<A: Action> Clone for GoalContext<A> {
    fn clone(&self) -> Self {
        Self {
            goal_id: self.goal_id.clone(),
            token: self.token.clone(),
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<A: Action> Debug for GoalContext<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoalContext")
            .field("goal_id", &self.goal_id)
            .field("canceled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<A: Action> GoalContext<A> {
    pub(crate) fn new(
        goal_id: String,
        token: CancellationToken,
        publisher: FeedbackPublisher<A::Feedback>,
    ) -> Self {
        Self {
            goal_id,
            token,
            publisher,
        }
    }

    /// The goal being executed.
    #[must_use]
    pub fn goal_id(&self) -> &str {
        &self.goal_id
    }

    /// Sends progress to the client that owns this goal.
    ///
    /// # Errors
    ///
    /// Returns the codec or transport error if the message could not be published.
    pub fn emit_feedback(&self, payload: A::Feedback) -> Result<(), BuswareError> {
        (self.publisher)(Feedback {
            header: Header::stamped(self.goal_id.clone()),
            payload,
        })
    }

    /// Cancelled when the client cancels this goal or the server stops.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when cancellation is requested.
    pub async fn canceled(&self) {
        self.token.cancelled().await;
    }
}

/// Runs one goal and publishes its one result.
pub(crate) struct ExecutionUnit<A: Action> {
    pub(crate) goal: Goal<A::Goal>,
    pub(crate) token: CancellationToken,
    pub(crate) handler: Arc<dyn ActionHandler<A>>,
    pub(crate) feedback: FeedbackPublisher<A::Feedback>,
    pub(crate) result: ResultPublisher<A::Result>,
    pub(crate) permits: Option<Arc<Semaphore>>,
}

impl<A: Action> ExecutionUnit<A> {
    pub(crate) async fn run(self) -> ActionStatus {
        let Self {
            goal,
            token,
            handler,
            feedback,
            result,
            permits,
        } = self;
        let goal_id = goal.id().to_string();

        let _permit = match permits {
            Some(permits) => {
                trace!(goal_id, "Waiting for an execution slot");
                tokio::select! {
                    permit = permits.acquire_owned() => permit.ok(),
                    () = token.cancelled() => {
                        debug!(goal_id, "Canceled while queued");
                        return publish(
                            result,
                            &goal_id,
                            ActionStatus::Canceled,
                            None,
                            "canceled before execution".to_string(),
                        );
                    }
                }
            }
            None => None,
        };

        let ctx = GoalContext::new(goal_id.clone(), token.clone(), feedback);
        let outcome = AssertUnwindSafe(handler.execute(goal, ctx))
            .catch_unwind()
            .await;

        let (status, payload, message) = match outcome {
            Ok(Ok(value)) => (ActionStatus::Succeeded, Some(value), String::new()),
            Ok(Err(e)) if token.is_cancelled() => (ActionStatus::Canceled, None, e.to_string()),
            Ok(Err(e)) => {
                error!(goal_id, "Goal handler failed: {e:#}");
                (ActionStatus::Aborted, None, e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(goal_id, "Goal handler panicked: {message}");
                (ActionStatus::Aborted, None, message)
            }
        };
        publish(result, &goal_id, status, payload, message)
    }
}

fn publish<R>(
    result: ResultPublisher<R>,
    goal_id: &str,
    status_code: ActionStatus,
    payload: Option<R>,
    message: String,
) -> ActionStatus {
    let outcome = ActionResult {
        status: GoalStatus {
            header: Header::stamped(goal_id),
            status_code,
            message,
        },
        payload,
    };
    match result(outcome) {
        Ok(()) => info!(goal_id, status = %status_code, "Goal finished"),
        Err(e) => error!(goal_id, "Failed to publish goal result: {e}"),
    }
    status_code
}

/// Best-effort text of a caught panic.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::traits::handler_fn;

    #[derive(Debug)]
    struct Halve;

    impl Action for Halve {
        type Goal = i64;
        type Feedback = String;
        type Result = i64;
    }

    type Captured = Arc<Mutex<Vec<ActionResult<i64>>>>;

    fn unit(
        payload: i64,
        handler: Arc<dyn ActionHandler<Halve>>,
        token: CancellationToken,
    ) -> (ExecutionUnit<Halve>, Captured, Arc<Mutex<Vec<String>>>) {
        let results: Captured = Arc::default();
        let feedback_seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        let fb_sink = Arc::clone(&feedback_seen);
        let unit = ExecutionUnit {
            goal: Goal {
                header: Header::stamped("t_1"),
                payload,
            },
            token,
            handler,
            feedback: Arc::new(move |fb: Feedback<String>| {
                fb_sink.lock().push(fb.payload);
                Ok(())
            }),
            result: Box::new(move |result: ActionResult<i64>| {
                sink.lock().push(result);
                Ok(())
            }),
            permits: None,
        };
        (unit, results, feedback_seen)
    }

    fn halve() -> Arc<dyn ActionHandler<Halve>> {
        Arc::new(handler_fn(|goal: Goal<i64>, ctx: GoalContext<Halve>| async move {
            ctx.emit_feedback("halving".to_string())?;
            if goal.payload % 2 != 0 {
                anyhow::bail!("{} is odd", goal.payload);
            }
            Ok(goal.payload / 2)
        }))
    }

    #[tokio::test]
    async fn success_publishes_payload_once() {
        let (unit, results, feedback) = unit(8, halve(), CancellationToken::new());
        assert_eq!(unit.run().await, ActionStatus::Succeeded);

        let results = results.lock();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload, Some(4));
        assert_eq!(results[0].goal_id(), "t_1");
        assert!(results[0].status.message.is_empty());
        assert_eq!(feedback.lock().as_slice(), &["halving".to_string()]);
    }

    #[tokio::test]
    async fn error_becomes_aborted_with_text() {
        let (unit, results, _) = unit(3, halve(), CancellationToken::new());
        assert_eq!(unit.run().await, ActionStatus::Aborted);
        let results = results.lock();
        assert_eq!(results[0].status.message, "3 is odd");
        assert_eq!(results[0].payload, None);
    }

    #[tokio::test]
    async fn panic_becomes_aborted() {
        let handler: Arc<dyn ActionHandler<Halve>> =
            Arc::new(handler_fn(|_: Goal<i64>, _: GoalContext<Halve>| async move {
                if true {
                    panic!("gears jammed");
                }
                Ok::<_, anyhow::Error>(0)
            }));
        let (unit, results, _) = unit(2, handler, CancellationToken::new());
        assert_eq!(unit.run().await, ActionStatus::Aborted);
        assert_eq!(results.lock()[0].status.message, "gears jammed");
    }

    #[tokio::test]
    async fn cooperative_cancel_becomes_canceled() {
        let handler: Arc<dyn ActionHandler<Halve>> =
            Arc::new(handler_fn(|_: Goal<i64>, ctx: GoalContext<Halve>| async move {
                ctx.canceled().await;
                anyhow::bail!("stopped early")
            }));
        let token = CancellationToken::new();
        let (unit, results, _) = unit(2, handler, token.clone());
        let running = tokio::spawn(unit.run());
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        assert_eq!(running.await.unwrap(), ActionStatus::Canceled);
        assert_eq!(results.lock()[0].status.message, "stopped early");
    }

    #[tokio::test]
    async fn success_after_cancel_stays_succeeded() {
        let token = CancellationToken::new();
        token.cancel();
        let (unit, _, _) = unit(2, halve(), token);
        assert_eq!(unit.run().await, ActionStatus::Succeeded);
    }

    #[tokio::test]
    async fn queued_goal_canceled_before_running() {
        let token = CancellationToken::new();
        token.cancel();
        let (mut unit, results, feedback) = unit(2, halve(), token);
        unit.permits = Some(Arc::new(Semaphore::new(0)));
        assert_eq!(unit.run().await, ActionStatus::Canceled);
        assert!(feedback.lock().is_empty());
        assert_eq!(results.lock().len(), 1);
    }
}
