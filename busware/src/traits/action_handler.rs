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

use async_trait::async_trait;

use crate::action::GoalContext;
use crate::message::Goal;
use crate::traits::Action;

/// The work an [`ActionServer`](crate::action::ActionServer) performs for each goal.
///
/// One handler is bound to a server and shared by every execution unit, so
/// `execute` may run for several goals at once. Long-running handlers should
/// check [`GoalContext::is_canceled`] (or await
/// [`GoalContext::cancellation_token`]) and return early when asked to stop.
///
/// Returning `Ok` completes the goal as succeeded. Returning `Err` aborts it
/// with the error's text, or reports it canceled if a cancel request arrived.
#[async_trait]
pub trait ActionHandler<A: Action>: Send + Sync + 'static {
    /// Runs one goal to completion.
    async fn execute(&self, goal: Goal<A::Goal>, ctx: GoalContext<A>) -> anyhow::Result<A::Result>;
}

/// An [`ActionHandler`] backed by an async closure. Built with [`handler_fn`].
#[derive(Clone)]
pub struct FnHandler<F> {
    f: F,
}

impl<F> Debug for FnHandler<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Wraps an async closure as an [`ActionHandler`].
///
/// ```rust,ignore
/// let handler = handler_fn(|goal: Goal<u64>, ctx: GoalContext<Countdown>| async move {
///     for step in (0..goal.payload).rev() {
///         ctx.emit_feedback(step)?;
///     }
///     Ok(goal.payload)
/// });
/// ```
pub fn handler_fn<A, F, Fut>(f: F) -> FnHandler<F>
where
    A: Action,
    F: Fn(Goal<A::Goal>, GoalContext<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<A::Result>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<A, F, Fut> ActionHandler<A> for FnHandler<F>
where
    A: Action,
    F: Fn(Goal<A::Goal>, GoalContext<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<A::Result>> + Send + 'static,
{
    async fn execute(&self, goal: Goal<A::Goal>, ctx: GoalContext<A>) -> anyhow::Result<A::Result> {
        (self.f)(goal, ctx).await
    }
}
