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

//! Construction errors, server start/stop/register and the shared dispatch loop.

use std::time::Duration;

use busware::prelude::*;
use busware_test::prelude::*;

use crate::setup::*;

mod setup;

#[busware_test]
async fn empty_paths_are_rejected() -> anyhow::Result<()> {
    let (runtime, _bus) = launch().await;

    assert_eq!(
        ActionClient::<Divide>::new(&runtime, "", None).unwrap_err(),
        BuswareError::EmptyPath
    );
    assert_eq!(
        ActionServer::<Divide>::new(&runtime, "", divide_handler()).unwrap_err(),
        BuswareError::EmptyPath
    );
    assert_eq!(
        ServiceClient::<AddTwoInts>::new(&runtime, "", None).unwrap_err(),
        BuswareError::EmptyPath
    );
    assert_eq!(
        ServiceServer::<AddTwoInts>::new(&runtime, "", add_handler()).unwrap_err(),
        BuswareError::EmptyPath
    );

    runtime.shutdown().await
}

#[busware_test]
async fn client_names_are_validated_or_generated() -> anyhow::Result<()> {
    let (runtime, _bus) = launch().await;

    let err = ActionClient::<Divide>::new(&runtime, DIVIDE_PATH, Some("a_name_that_is_too_long"))
        .unwrap_err();
    assert_eq!(err, BuswareError::ClientNameTooLong { length: 23, max: 16 });
    assert!(ServiceClient::<AddTwoInts>::new(&runtime, ADD_PATH, Some("x".repeat(17).as_str())).is_err());

    let action_client = ActionClient::<Divide>::new(&runtime, DIVIDE_PATH, None)?;
    let service_client = ServiceClient::<AddTwoInts>::new(&runtime, ADD_PATH, None)?;
    assert!(action_client.name().starts_with("act_"));
    assert!(service_client.name().starts_with("cli_"));
    assert_eq!(action_client.name().len(), 9);

    let handle = action_client.send_goal(DivideGoal {
        numerator: 1.0,
        denominator: 1.0,
        steps: 0,
    })?;
    assert_eq!(handle.goal_id(), format!("{}_1", action_client.name()));

    runtime.shutdown().await
}

#[busware_test]
async fn configured_name_limit_is_capped_at_sixteen() -> anyhow::Result<()> {
    let mut config = test_config();
    config.limits.max_client_name_length = 40;
    let (runtime, _bus) = launch_with_config(config).await;

    let err = ActionClient::<Divide>::new(&runtime, DIVIDE_PATH, Some("seventeen_chars_x"))
        .unwrap_err();
    assert_eq!(err, BuswareError::ClientNameTooLong { length: 17, max: 16 });
    assert!(ActionClient::<Divide>::new(&runtime, DIVIDE_PATH, Some("sixteen_chars_xx")).is_ok());

    runtime.shutdown().await
}

#[busware_test]
async fn handler_cannot_be_replaced_while_running() -> anyhow::Result<()> {
    let (runtime, _bus) = launch().await;
    let server = ActionServer::<Divide>::new(&runtime, DIVIDE_PATH, divide_handler())?;

    server.register(divide_handler())?;
    server.start()?;
    server.start()?;
    assert!(server.is_running());
    assert_eq!(server.register(divide_handler()), Err(BuswareError::ServerRunning));

    server.stop().await?;
    server.register(handler_fn(|goal: Goal<DivideGoal>, _ctx: GoalContext<Divide>| async move {
        Ok(Quotient {
            value: goal.payload.numerator * goal.payload.denominator,
        })
    }))?;
    server.start()?;

    let client = ActionClient::<Divide>::new(&runtime, DIVIDE_PATH, None)?;
    let handle = client.send_goal(DivideGoal {
        numerator: 3.0,
        denominator: 4.0,
        steps: 0,
    })?;
    assert_eq!(handle.get_result(None).await?.payload, Some(Quotient { value: 12.0 }));

    runtime.shutdown().await
}

#[busware_test]
async fn started_server_receives_goals_through_handle_once() -> anyhow::Result<()> {
    let (runtime, _bus) = launch().await;
    let server = ActionServer::<Divide>::new(&runtime, DIVIDE_PATH, divide_handler())?;
    assert!(!server.is_running());

    // No client yet, so nothing dispatches in the background.
    assert!(!server.handle_once(Duration::from_millis(10)).await?);
    assert!(server.is_running());

    runtime.publish(
        &server.channels().goal(),
        JsonCodec.encode(&Goal {
            header: Header::stamped("manual_1"),
            payload: DivideGoal {
                numerator: 1.0,
                denominator: 1.0,
                steps: 0,
            },
        })?,
    )?;
    assert!(server.handle_once(Duration::from_millis(100)).await?);
    assert_eq!(server.active_goals(), 1);

    runtime.shutdown().await
}

#[busware_test]
async fn spin_runs_until_stop_token_is_cancelled() -> anyhow::Result<()> {
    let (runtime, _bus) = launch().await;
    let server = std::sync::Arc::new(ActionServer::<Divide>::new(
        &runtime,
        DIVIDE_PATH,
        divide_handler(),
    )?);
    let stop = server.stop_token();
    let spinning = {
        let server = server.clone();
        tokio::spawn(async move { server.spin().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(server.is_running());
    assert!(runtime.is_dispatching());

    let client = ActionClient::<Divide>::new(&runtime, DIVIDE_PATH, None)?;
    let handle = client.send_goal(DivideGoal {
        numerator: 9.0,
        denominator: 3.0,
        steps: 0,
    })?;
    assert_eq!(handle.get_result(None).await?.payload, Some(Quotient { value: 3.0 }));

    stop.cancel();
    spinning.await??;
    assert!(!server.is_running());

    runtime.shutdown().await
}

#[busware_test]
async fn dispatch_loop_follows_guard_count() -> anyhow::Result<()> {
    let (runtime, _bus) = launch().await;
    assert_eq!(runtime.dispatch_guards(), 0);
    assert!(!runtime.is_dispatching());

    let first = ActionClient::<Divide>::new(&runtime, DIVIDE_PATH, None)?;
    let second = ServiceClient::<AddTwoInts>::new(&runtime, ADD_PATH, None)?;
    assert_eq!(runtime.dispatch_guards(), 2);
    assert!(runtime.is_dispatching());

    drop(first);
    assert_eq!(runtime.dispatch_guards(), 1);
    assert!(runtime.is_dispatching());

    drop(second);
    assert_eq!(runtime.dispatch_guards(), 0);
    assert!(!runtime.is_dispatching());

    let guard = runtime.acquire_dispatch();
    assert!(runtime.is_dispatching());
    drop(guard);

    runtime.shutdown().await
}

#[busware_test]
async fn shutdown_delivers_final_results_before_stopping_dispatch() -> anyhow::Result<()> {
    let (runtime, _bus) = launch().await;
    let server = ActionServer::<Hold>::new(&runtime, HOLD_PATH, hold_handler())?;
    server.start()?;
    let client = ActionClient::<Hold>::new(&runtime, HOLD_PATH, None)?;
    let handle = client.send_goal(5_000)?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    runtime.shutdown().await?;
    assert!(runtime.cancellation_token().is_cancelled());
    assert!(server.stop_token().is_cancelled());
    assert!(!runtime.is_dispatching());
    assert_eq!(server.active_goals(), 0);

    // The unit's canceled result reached the client during shutdown.
    assert_eq!(client.active_goals(), 0);
    assert_eq!(handle.status(), ActionStatus::Canceled);
    match handle.get_result(Some(Duration::from_millis(100))).await {
        Err(BuswareError::Canceled { message, .. }) => {
            assert!(message.starts_with("stopped after"), "unexpected message: {message}");
        }
        other => panic!("expected a canceled goal, got {other:?}"),
    }
    Ok(())
}

#[busware_test]
async fn unanswered_handles_close_after_shutdown() -> anyhow::Result<()> {
    let (runtime, _bus) = launch().await;
    // No server listens, so no result will ever be published.
    let client = ActionClient::<Hold>::new(&runtime, HOLD_PATH, None)?;
    let handle = client.send_goal(10)?;
    let waiting = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.get_result(None).await })
    };
    let call = {
        let runtime = runtime.clone();
        tokio::spawn(async move {
            let service = ServiceClient::<AddTwoInts>::new(&runtime, ADD_PATH, None)?;
            service
                .call(AddRequest { a: 1, b: 2 }, Some(Duration::from_secs(30)))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    runtime.shutdown().await?;
    assert_eq!(waiting.await?, Err(BuswareError::ClientClosed));
    assert_eq!(call.await?, Err(BuswareError::ClientClosed));
    assert_eq!(handle.try_result(), Some(Err(BuswareError::ClientClosed)));
    Ok(())
}
