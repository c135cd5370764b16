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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Busware
//!
//! Request/response services and long-running, cancellable,
//! feedback-emitting actions layered on a publish/subscribe bus, built on
//! Tokio.
//!
//! ## Key Concepts
//!
//! - **Runtime (`BusRuntime`)**: the explicit shared context holding the
//!   transport, configuration and a reference-counted background dispatch loop.
//! - **Actions (`ActionClient`, `ActionHandle`, `ActionServer`)**: a client
//!   sends a goal, receives feedback through callbacks and awaits exactly one
//!   result; the server runs each goal in its own execution unit.
//! - **Services (`ServiceClient`, `ServiceServer`)**: single request, single
//!   response, with a timeout.
//! - **Transport**: the bus underneath. `MemoryBus` ships in-process; other
//!   buses plug in through the `Transport` trait.
//! - **Codecs**: payloads are JSON by default, `MessagePack` on request.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use busware::prelude::*;
//!
//! #[bus_action(goal = u32, feedback = u32, result = String)]
//! struct Countdown;
//!
//! let runtime = BuswareApp::launch_async().await;
//! let server = ActionServer::<Countdown>::new(&runtime, "/demo/countdown", handler_fn(
//!     |goal: Goal<u32>, ctx: GoalContext<Countdown>| async move {
//!         for n in (1..=goal.payload).rev() {
//!             ctx.emit_feedback(n)?;
//!         }
//!         Ok("liftoff".to_string())
//!     },
//! ))?;
//! server.start()?;
//!
//! let client = ActionClient::<Countdown>::new(&runtime, "/demo/countdown", None)?;
//! let handle = client.send_goal(3)?;
//! handle.add_feedback_callback(|fb| { println!("{}", fb.payload); Ok(()) });
//! let result = handle.get_result(None).await?;
//! ```

/// Actions: clients, handles, servers and execution units.
pub(crate) mod action;

/// Runtime, dispatch, configuration and the in-process bus.
pub(crate) mod common;

/// Message types, channel naming, codecs and errors.
pub(crate) mod message;

/// Request/response services.
pub(crate) mod service;

/// Core traits.
pub(crate) mod traits;

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## Macros (from `busware-macro`)
/// *   [`busware_macro::bus_message`]: derives what a payload type needs.
/// *   [`busware_macro::bus_action`]: implements [`Action`](crate::traits::Action) for a marker type.
/// *   [`busware_macro::bus_service`]: implements [`Service`](crate::traits::Service) for a marker type.
///
/// ## External Crates
/// *   [`async_trait::async_trait`](https://docs.rs/async-trait/latest/async_trait/attr.async_trait.html)
/// *   `serde` and `tokio`, so generated code and handlers need no direct dependency.
pub mod prelude {
    // Macros from busware-macro
    pub use busware_macro::*;

    // External crate re-exports
    pub use async_trait::async_trait;
    pub use serde;
    pub use tokio;
    pub use tokio_util::sync::CancellationToken;

    // Core types
    pub use crate::action::{ActionClient, ActionHandle, ActionServer, FeedbackCallback, GoalContext};
    pub use crate::common::{
        BusRuntime, BusStats, BuswareApp, BuswareConfig, DispatchGuard, MemoryBus, MessageHandler,
        SubscriptionId, CONFIG,
    };
    pub use crate::message::{
        now_us, ActionChannels, ActionResult, ActionStatus, BuswareError, CancelRequest, Feedback,
        Goal, GoalStatus, Header, JsonCodec, MessagePackCodec, ResponseHeader, ServiceChannels,
        ServiceRequest, ServiceResponse,
    };
    pub use crate::service::{ServiceClient, ServiceServer};
    pub use crate::traits::{
        handler_fn, service_handler_fn, Action, ActionHandler, BusMessage, FnHandler,
        FnServiceHandler, PayloadCodec, Service, ServiceHandler, Transport,
    };
}
