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

//! Request/response services.

use std::time::Duration;

use busware::prelude::*;
use busware_test::prelude::*;

use crate::setup::*;

mod setup;

#[busware_test]
async fn call_returns_response() -> anyhow::Result<()> {
    let (runtime, _bus) = launch().await;
    let server = ServiceServer::<AddTwoInts>::new(&runtime, ADD_PATH, add_handler())?;
    server.start()?;
    let client = ServiceClient::<AddTwoInts>::new(&runtime, ADD_PATH, Some("adder"))?;

    let sum = client.call(AddRequest { a: 2, b: 40 }, None).await?;
    assert_eq!(sum, 42);
    let sum = client
        .call(AddRequest { a: -5, b: 3 }, Some(Duration::from_secs(1)))
        .await?;
    assert_eq!(sum, -2);

    runtime.shutdown().await
}

#[busware_test]
async fn handler_error_becomes_service_failure() -> anyhow::Result<()> {
    let (runtime, _bus) = launch().await;
    let server = ServiceServer::<AddTwoInts>::new(&runtime, ADD_PATH, add_handler())?;
    server.start()?;
    let client = ServiceClient::<AddTwoInts>::new(&runtime, ADD_PATH, None)?;

    let outcome = client.call(AddRequest { a: i64::MAX, b: 1 }, None).await;
    assert_eq!(outcome, Err(BuswareError::ServiceFailed("integer overflow".to_string())));

    runtime.shutdown().await
}

#[busware_test]
async fn call_without_server_times_out_and_cleans_up() -> anyhow::Result<()> {
    let (runtime, bus) = launch().await;
    let client = ServiceClient::<AddTwoInts>::new(&runtime, ADD_PATH, Some("lonely"))?;

    let outcome = client
        .call(AddRequest { a: 1, b: 1 }, Some(Duration::from_millis(30)))
        .await;
    assert_eq!(outcome, Err(BuswareError::Timeout(Duration::from_millis(30))));
    assert_eq!(bus.subscriber_count(&format!("{ADD_PATH}/rsp/lonely_1")), 0);

    // The configured default applies when no timeout is given.
    let started = tokio::time::Instant::now();
    let outcome = client.call(AddRequest { a: 1, b: 1 }, None).await;
    assert_eq!(outcome, Err(BuswareError::Timeout(Duration::from_millis(500))));
    assert!(started.elapsed() >= Duration::from_millis(500));

    runtime.shutdown().await
}

#[busware_test]
async fn concurrent_calls_are_correlated() -> anyhow::Result<()> {
    let (runtime, _bus) = launch().await;
    let server = ServiceServer::<AddTwoInts>::new(
        &runtime,
        ADD_PATH,
        service_handler_fn::<AddTwoInts, _, _>(|request: ServiceRequest<AddRequest>| async move {
            // Answer later requests first.
            let delay = 60u64.saturating_sub(u64::try_from(request.payload.a)? * 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(request.payload.a + request.payload.b)
        }),
    )?;
    server.start()?;
    let client = ServiceClient::<AddTwoInts>::new(&runtime, ADD_PATH, None)?;

    let (one, two, three) = tokio::join!(
        client.call(AddRequest { a: 1, b: 100 }, None),
        client.call(AddRequest { a: 2, b: 200 }, None),
        client.call(AddRequest { a: 3, b: 300 }, None),
    );
    assert_eq!((one?, two?, three?), (101, 202, 303));

    runtime.shutdown().await
}

#[busware_test]
async fn service_server_stops_answering_after_stop() -> anyhow::Result<()> {
    let (runtime, _bus) = launch().await;
    let server = ServiceServer::<AddTwoInts>::new(&runtime, ADD_PATH, add_handler())?;
    server.start()?;
    assert_eq!(server.register(add_handler()), Err(BuswareError::ServerRunning));
    let client = ServiceClient::<AddTwoInts>::new(&runtime, ADD_PATH, None)?;
    assert_eq!(client.call(AddRequest { a: 1, b: 2 }, None).await?, 3);

    server.stop().await?;
    assert!(!server.is_running());
    let outcome = client
        .call(AddRequest { a: 1, b: 2 }, Some(Duration::from_millis(50)))
        .await;
    assert!(matches!(outcome, Err(BuswareError::Timeout(_))));

    runtime.shutdown().await
}
