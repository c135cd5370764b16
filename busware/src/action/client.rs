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

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use crate::action::handle::{ActionHandle, CancelPublisher, GoalSlot};
use crate::common::{BusRuntime, DispatchGuard, MessageHandler, SubscriptionId};
use crate::message::{
    resolve_client_name, ActionChannels, ActionResult, BuswareError, CancelRequest, Feedback, Goal,
    Header, JsonCodec,
};
use crate::traits::{Action, PayloadCodec};

struct GoalEntry<A: Action> {
    slot: Arc<GoalSlot<A>>,
    subscriptions: Vec<SubscriptionId>,
}

struct ClientCore<A: Action, C: PayloadCodec> {
    runtime: BusRuntime,
    channels: ActionChannels,
    name: String,
    codec: C,
    counter: AtomicU64,
    goals: Mutex<HashMap<String, GoalEntry<A>>>,
}

/// Sends goals to an action server and tracks them until their results arrive.
///
/// Each client instance has a name of at most
/// [`BuswareConfig::client_name_limit`](crate::common::BuswareConfig::client_name_limit)
/// characters that prefixes its goal ids, so ids never collide between
/// clients. The client keeps the runtime's dispatch loop running for as long
/// as it lives; feedback and results are delivered from that loop.
///
/// Dropping the client releases every goal subscription. Handles of goals
/// still outstanding then resolve with [`BuswareError::ClientClosed`].
pub struct ActionClient<A: Action, C: PayloadCodec = JsonCodec> {
    core: Arc<ClientCore<A, C>>,
    canceller: CancelPublisher,
    _dispatch: DispatchGuard,
}

impl<A: Action, C: PayloadCodec> Debug for ActionClient<A, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionClient")
            .field("name", &self.core.name)
            .field("base", &self.core.channels.base())
            .field("codec", &self.core.codec.name())
            .field("active_goals", &self.active_goals())
            .finish_non_exhaustive()
    }
}

impl<A: Action> ActionClient<A, JsonCodec> {
    /// Creates a client for the action at `path` using JSON payloads.
    ///
    /// `None` (or an empty name) generates `act_` plus five random hex digits.
    ///
    /// # Errors
    ///
    /// * [`BuswareError::EmptyPath`] if `path` is empty
    /// * [`BuswareError::ClientNameTooLong`] if `client_name` is too long
    pub fn new(
        runtime: &BusRuntime,
        path: &str,
        client_name: Option<&str>,
    ) -> Result<Self, BuswareError> {
        Self::with_codec(runtime, path, client_name, JsonCodec)
    }
}

impl<A: Action, C: PayloadCodec> ActionClient<A, C> {
    /// Creates a client that encodes payloads with `codec`.
    ///
    /// # Errors
    ///
    /// Same as [`ActionClient::new`].
    pub fn with_codec(
        runtime: &BusRuntime,
        path: &str,
        client_name: Option<&str>,
        codec: C,
    ) -> Result<Self, BuswareError> {
        let channels = ActionChannels::new(path)?;
        let config = runtime.config();
        let name = resolve_client_name(
            client_name,
            &config.defaults.action_client_prefix,
            config.client_name_limit(),
        )?;
        debug!(name = %name, base = channels.base(), codec = codec.name(), "Creating action client");

        let core = Arc::new(ClientCore {
            runtime: runtime.clone(),
            channels,
            name,
            codec,
            counter: AtomicU64::new(0),
            goals: Mutex::new(HashMap::new()),
        });
        let weak = Arc::downgrade(&core);
        let canceller: CancelPublisher = Arc::new(move |goal_id: &str| {
            weak.upgrade()
                .ok_or(BuswareError::ClientClosed)?
                .cancel_goal(goal_id)
        });

        Ok(Self {
            core,
            canceller,
            _dispatch: runtime.acquire_dispatch(),
        })
    }

    /// This client's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// The channels this client talks on.
    #[must_use]
    pub fn channels(&self) -> &ActionChannels {
        &self.core.channels
    }

    /// Number of goals sent whose result has not arrived yet.
    #[must_use]
    pub fn active_goals(&self) -> usize {
        self.core.goals.lock().len()
    }

    /// Sends a goal and returns its handle without waiting.
    ///
    /// The goal id is `{name}_{n}` with `n` counting up from 1. The goal is
    /// tracked before it is published, so feedback can never outrun it.
    ///
    /// # Errors
    ///
    /// Returns the codec or transport error if the goal could not be sent;
    /// the goal is then not tracked.
    #[instrument(skip(self, payload), fields(client = %self.core.name))]
    pub fn send_goal(&self, payload: A::Goal) -> Result<ActionHandle<A>, BuswareError> {
        let core = &self.core;
        let goal_id = format!("{}_{}", core.name, core.counter.fetch_add(1, Ordering::Relaxed) + 1);
        let goal = Goal {
            header: Header::stamped(goal_id.clone()),
            payload,
        };
        let bytes = core.codec.encode(&goal)?;

        let slot = Arc::new(GoalSlot::new(goal_id.clone()));
        core.goals.lock().insert(
            goal_id.clone(),
            GoalEntry {
                slot: Arc::clone(&slot),
                subscriptions: Vec::new(),
            },
        );

        let subscriptions = match core.subscribe_goal(&goal_id) {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                core.goals.lock().remove(&goal_id);
                return Err(e);
            }
        };
        if let Some(entry) = core.goals.lock().get_mut(&goal_id) {
            entry.subscriptions.clone_from(&subscriptions);
        }

        if let Err(e) = core.runtime.publish(&core.channels.goal(), bytes) {
            core.goals.lock().remove(&goal_id);
            for subscription in subscriptions {
                core.runtime.unsubscribe_quietly(subscription);
            }
            return Err(e);
        }

        info!(goal_id, "Goal sent");
        Ok(ActionHandle::new(
            slot,
            Arc::clone(&self.canceller),
            core.runtime.closed_token().clone(),
        ))
    }
}

impl<A: Action, C: PayloadCodec> ClientCore<A, C> {
    fn subscribe_goal(self: &Arc<Self>, goal_id: &str) -> Result<Vec<SubscriptionId>, BuswareError> {
        let weak = Arc::downgrade(self);
        let on_feedback: MessageHandler = Arc::new(move |_channel: &str, payload: &[u8]| {
            if let Some(core) = weak.upgrade() {
                core.on_feedback(payload);
            }
        });
        let feedback = self
            .runtime
            .subscribe(&self.channels.feedback(goal_id), on_feedback)?;

        let weak = Arc::downgrade(self);
        let on_result: MessageHandler = Arc::new(move |_channel: &str, payload: &[u8]| {
            if let Some(core) = weak.upgrade() {
                core.on_result(payload);
            }
        });
        match self.runtime.subscribe(&self.channels.result(goal_id), on_result) {
            Ok(result) => Ok(vec![feedback, result]),
            Err(e) => {
                self.runtime.unsubscribe_quietly(feedback);
                Err(e)
            }
        }
    }

    fn on_feedback(&self, payload: &[u8]) {
        let feedback: Feedback<A::Feedback> = match self.codec.decode(payload) {
            Ok(feedback) => feedback,
            Err(e) => {
                warn!(client = %self.name, "Dropping undecodable feedback: {e}");
                return;
            }
        };
        // Look up under the table lock, deliver without it.
        let slot = self
            .goals
            .lock()
            .get(&feedback.header.id)
            .map(|entry| Arc::clone(&entry.slot));
        match slot {
            Some(slot) => slot.deliver_feedback(&feedback),
            None => trace!(goal_id = %feedback.header.id, "Feedback for unknown goal, dropping"),
        }
    }

    fn on_result(&self, payload: &[u8]) {
        let result: ActionResult<A::Result> = match self.codec.decode(payload) {
            Ok(result) => result,
            Err(e) => {
                warn!(client = %self.name, "Dropping undecodable result: {e}");
                return;
            }
        };
        let Some(entry) = self.goals.lock().remove(result.goal_id()) else {
            trace!(goal_id = %result.goal_id(), "Result for unknown goal, dropping");
            return;
        };

        let status = result.status.status_code;
        if entry.slot.resolve(result) {
            info!(goal_id = %entry.slot.goal_id(), %status, "Goal resolved");
        }
        for subscription in entry.subscriptions {
            self.runtime.unsubscribe_quietly(subscription);
        }
    }

    fn cancel_goal(&self, goal_id: &str) -> Result<(), BuswareError> {
        let bytes = self.codec.encode(&CancelRequest::new(goal_id))?;
        self.runtime.publish(&self.channels.cancel(), bytes)?;
        info!(goal_id, "Cancel requested");
        Ok(())
    }
}

impl<A: Action, C: PayloadCodec> Drop for ActionClient<A, C> {
    fn drop(&mut self) {
        let outstanding: Vec<GoalEntry<A>> =
            self.core.goals.lock().drain().map(|(_, entry)| entry).collect();
        if !outstanding.is_empty() {
            debug!(client = %self.core.name, count = outstanding.len(), "Closing client with outstanding goals");
        }
        for entry in outstanding {
            for subscription in entry.subscriptions {
                self.core.runtime.unsubscribe_quietly(subscription);
            }
            entry.slot.close();
        }
    }
}
