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

use std::time::Duration;

use busware::prelude::*;

use super::{AddRequest, DivideGoal, Progress, Quotient, SETTLE};

/// Divides two numbers, reporting progress along the way.
#[bus_action(goal = DivideGoal, feedback = Progress, result = Quotient)]
pub struct Divide;

/// Holds a goal until canceled or until the given number of milliseconds passes.
#[bus_action(goal = u64, feedback = u64, result = u64)]
pub struct Hold;

/// Adds two integers; fails on overflow.
#[bus_service(request = AddRequest, response = i64)]
pub struct AddTwoInts;

pub const DIVIDE_PATH: &str = "/test/act/divide";
pub const HOLD_PATH: &str = "/test/act/hold";
pub const ADD_PATH: &str = "/test/svc/add";

/// Emits `steps` progress messages, then divides. Dividing by zero fails.
pub fn divide_handler() -> impl ActionHandler<Divide> {
    handler_fn(|goal: Goal<DivideGoal>, ctx: GoalContext<Divide>| async move {
        tokio::time::sleep(SETTLE).await;
        let DivideGoal {
            numerator,
            denominator,
            steps,
        } = goal.payload;
        for step in 1..=steps {
            ctx.emit_feedback(Progress { step, of: steps })?;
        }
        if denominator == 0.0 {
            anyhow::bail!("divide by zero");
        }
        Ok(Quotient {
            value: numerator / denominator,
        })
    })
}

/// Emits the elapsed milliseconds every 10ms until canceled or the goal's
/// duration passes. Cancellation ends with an error so the goal reports canceled.
pub fn hold_handler() -> impl ActionHandler<Hold> {
    handler_fn(|goal: Goal<u64>, ctx: GoalContext<Hold>| async move {
        let mut elapsed = 0;
        while elapsed < goal.payload {
            tokio::select! {
                () = ctx.canceled() => anyhow::bail!("stopped after {elapsed}ms"),
                () = tokio::time::sleep(Duration::from_millis(10)) => {
                    elapsed += 10;
                    ctx.emit_feedback(elapsed)?;
                }
            }
        }
        Ok(elapsed)
    })
}

/// Adds the request's operands with overflow checking.
pub fn add_handler() -> impl ServiceHandler<AddTwoInts> {
    service_handler_fn::<AddTwoInts, _, _>(|request: ServiceRequest<AddRequest>| async move {
        request
            .payload
            .a
            .checked_add(request.payload.b)
            .ok_or_else(|| anyhow::anyhow!("integer overflow"))
    })
}
