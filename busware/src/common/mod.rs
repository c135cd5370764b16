//! Runtime plumbing shared by actions and services.
//!
//! *   [`BuswareApp`]: entry point that creates a [`BusRuntime`].
//! *   [`BusRuntime`]: the explicit shared context (transport, dispatch loop,
//!     task tracker, configuration) passed to every client and server.
//! *   [`MemoryBus`]: the in-process [`Transport`](crate::traits::Transport).
//! *   [`DispatchGuard`]: keeps the background dispatch loop alive.

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

pub use bus_runtime::BusRuntime;
pub use busware_app::BuswareApp;
pub use config::{BuswareConfig, CONFIG};
pub use dispatch::DispatchGuard;
pub use memory_bus::{BusStats, MemoryBus};
pub use types::*;

mod types;

/// Defines the `BusRuntime` shared context.
mod bus_runtime;
/// Defines the `BuswareApp` entry point.
mod busware_app;
/// Defines the configuration system for Busware.
pub mod config;
/// Reference-counted background dispatch.
mod dispatch;
/// In-process transport.
mod memory_bus;
