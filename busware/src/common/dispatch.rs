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
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use crate::traits::Transport;

/// Reference-counted background dispatch loop.
///
/// The first [`DispatchGuard`] spawns a task that drives
/// [`Transport::dispatch`] repeatedly; dropping the last guard stops it.
#[derive(Debug)]
pub(crate) struct DispatchLoop {
    transport: Arc<dyn Transport>,
    handle: Handle,
    tracker: TaskTracker,
    parent: CancellationToken,
    poll: Duration,
    state: Mutex<DispatchState>,
}

#[derive(Debug, Default)]
struct DispatchState {
    guards: usize,
    running: Option<CancellationToken>,
}

/// Keeps the runtime's dispatch loop alive while held.
///
/// Clients hold one for their whole lifetime; [`spin`](crate::action::ActionServer::spin)
/// holds one while spinning.
#[derive(Debug)]
#[must_use = "the dispatch loop stops when the last guard is dropped"]
pub struct DispatchGuard {
    dispatch: Arc<DispatchLoop>,
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.dispatch.release();
    }
}

impl DispatchLoop {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        handle: Handle,
        tracker: TaskTracker,
        parent: CancellationToken,
        poll: Duration,
    ) -> Self {
        Self {
            transport,
            handle,
            tracker,
            parent,
            poll,
            state: Mutex::new(DispatchState::default()),
        }
    }

    pub(crate) fn acquire(self: &Arc<Self>) -> DispatchGuard {
        let mut state = self.state.lock();
        state.guards += 1;
        if state.running.is_none() && !self.parent.is_cancelled() {
            let token = self.parent.child_token();
            state.running = Some(token.clone());
            self.spawn_loop(token);
        }
        trace!(guards = state.guards, "Dispatch guard acquired");
        DispatchGuard {
            dispatch: Arc::clone(self),
        }
    }

    pub(crate) fn guard_count(&self) -> usize {
        self.state.lock().guards
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state
            .lock()
            .running
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.guards = state.guards.saturating_sub(1);
        trace!(guards = state.guards, "Dispatch guard released");
        if state.guards == 0 {
            if let Some(token) = state.running.take() {
                debug!("Last dispatch guard dropped, stopping dispatch loop");
                token.cancel();
            }
        }
    }

    fn spawn_loop(&self, token: CancellationToken) {
        let transport = Arc::clone(&self.transport);
        let poll = self.poll;
        debug!(?poll, "Starting dispatch loop");
        self.tracker.spawn_on(
            async move {
                loop {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => break,
                        result = transport.dispatch(poll) => {
                            if let Err(e) = result {
                                warn!("Dispatch failed: {e}");
                                tokio::time::sleep(poll).await;
                            }
                        }
                    }
                }
                trace!("Dispatch loop exited");
            },
            &self.handle,
        );
    }
}
