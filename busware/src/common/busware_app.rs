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

use std::sync::Arc;

use tracing::trace;

use crate::common::config::{BuswareConfig, CONFIG};
use crate::common::{BusRuntime, MemoryBus};
use crate::traits::Transport;

/// Entry point for creating a [`BusRuntime`].
///
/// - [`BuswareApp::launch_async()`]: preferred inside an async context
/// - [`BuswareApp::launch()`]: from synchronous code, owns its own Tokio runtime
/// - [`BuswareApp::launch_with()`]: a custom transport and configuration
#[derive(Default, Debug, Clone)]
pub struct BuswareApp;

impl BuswareApp {
    /// Creates a runtime on an in-process [`MemoryBus`] with the global configuration.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use busware::prelude::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let runtime = BuswareApp::launch_async().await;
    ///     // build clients and servers...
    ///     runtime.shutdown().await
    /// }
    /// ```
    pub async fn launch_async() -> BusRuntime {
        Self::launch_with(Arc::new(MemoryBus::new()), CONFIG.clone()).await
    }

    /// Creates a runtime on `transport` with `config`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub async fn launch_with(transport: Arc<dyn Transport>, config: BuswareConfig) -> BusRuntime {
        trace!("Starting Busware initialization (async)");
        trace!("Configuration: {:?}", config);
        let runtime =
            BusRuntime::new(transport, config, tokio::runtime::Handle::current(), None);
        trace!("Busware initialization complete");
        runtime
    }

    /// Creates a runtime on an in-process [`MemoryBus`] from synchronous code.
    ///
    /// Builds a dedicated multi-thread Tokio runtime owned by the returned
    /// [`BusRuntime`]. Use [`BusRuntime::handle`] to block on futures.
    ///
    /// # Panics
    ///
    /// Panics if called from within an existing Tokio runtime, or if the
    /// Tokio runtime cannot be created.
    #[must_use]
    pub fn launch() -> BusRuntime {
        assert!(
            tokio::runtime::Handle::try_current().is_err(),
            "BuswareApp::launch() was called from within a Tokio runtime. \
             Use BuswareApp::launch_async().await instead when in an async context."
        );

        trace!("Starting Busware initialization (sync)");
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("Failed to create Tokio runtime for Busware");
        let handle = rt.handle().clone();
        BusRuntime::new(Arc::new(MemoryBus::new()), CONFIG.clone(), handle, Some(rt))
    }
}
