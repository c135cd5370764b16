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
#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use busware::prelude::*;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub mod actions;
pub mod messages;

pub use actions::*;
pub use messages::*;

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// How long handlers wait before their first feedback, so tests can attach
/// callbacks after `send_goal` returns.
pub const SETTLE: Duration = Duration::from_millis(30);

/// Initializes the global tracing subscriber for tests.
///
/// Logs go to `logs/busware_tests.txt`. Uses `std::sync::Once` so repeated
/// calls from different tests are harmless.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "busware_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard so the non-blocking writer is not dropped before process exit
        Box::leak(Box::new(guard));

        let filter = EnvFilter::new("debug")
            .add_directive("busware::action=trace".parse().unwrap())
            .add_directive("busware::service=trace".parse().unwrap())
            .add_directive("busware::common::memory_bus=debug".parse().unwrap())
            .add_directive("tokio=info".parse().unwrap());

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// Configuration with a short dispatch poll and shutdown wait.
pub fn test_config() -> BuswareConfig {
    let mut config = BuswareConfig::default();
    config.timeouts.dispatch_poll_ms = 10;
    config.timeouts.shutdown_timeout_ms = 2_000;
    config.timeouts.service_call_timeout_ms = 500;
    config
}

/// A runtime on a fresh in-process bus, plus that bus for inspection.
pub async fn launch() -> (BusRuntime, Arc<MemoryBus>) {
    launch_with_config(test_config()).await
}

/// Like [`launch`], with a custom configuration.
pub async fn launch_with_config(config: BuswareConfig) -> (BusRuntime, Arc<MemoryBus>) {
    initialize_tracing();
    let bus = Arc::new(MemoryBus::new());
    let runtime = BuswareApp::launch_with(bus.clone(), config).await;
    (runtime, bus)
}
