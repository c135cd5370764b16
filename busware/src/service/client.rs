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
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, instrument, trace, warn};

use crate::common::{BusRuntime, DispatchGuard, MessageHandler, SubscriptionId};
use crate::message::{
    resolve_client_name, BuswareError, Header, JsonCodec, ServiceChannels, ServiceRequest,
    ServiceResponse,
};
use crate::traits::{PayloadCodec, Service};

type Pending<P> = Mutex<HashMap<String, oneshot::Sender<ServiceResponse<P>>>>;

struct ServiceClientCore<S: Service, C: PayloadCodec> {
    runtime: BusRuntime,
    channels: ServiceChannels,
    name: String,
    codec: C,
    counter: AtomicU64,
    pending: Pending<S::Response>,
}

/// Calls a service and waits for its response.
///
/// Construction follows the same rules as
/// [`ActionClient`](crate::action::ActionClient); generated names use the
/// `cli_` prefix.
pub struct ServiceClient<S: Service, C: PayloadCodec = JsonCodec> {
    core: Arc<ServiceClientCore<S, C>>,
    _dispatch: DispatchGuard,
}

impl<S: Service, C: PayloadCodec> Debug for ServiceClient<S, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("name", &self.core.name)
            .field("base", &self.core.channels.base())
            .field("pending", &self.core.pending.lock().len())
            .finish_non_exhaustive()
    }
}

/// Removes a call's bookkeeping however the call ends.
struct PendingCall<'a, S: Service, C: PayloadCodec> {
    core: &'a ServiceClientCore<S, C>,
    request_id: String,
    subscription: SubscriptionId,
}

impl<S: Service, C: PayloadCodec> Drop for PendingCall<'_, S, C> {
    fn drop(&mut self) {
        self.core.pending.lock().remove(&self.request_id);
        self.core.runtime.unsubscribe_quietly(self.subscription);
    }
}

impl<S: Service> ServiceClient<S, JsonCodec> {
    /// Creates a client for the service at `path` using JSON payloads.
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

impl<S: Service, C: PayloadCodec> ServiceClient<S, C> {
    /// Creates a client that encodes payloads with `codec`.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceClient::new`].
    pub fn with_codec(
        runtime: &BusRuntime,
        path: &str,
        client_name: Option<&str>,
        codec: C,
    ) -> Result<Self, BuswareError> {
        let channels = ServiceChannels::new(path)?;
        let config = runtime.config();
        let name = resolve_client_name(
            client_name,
            &config.defaults.service_client_prefix,
            config.client_name_limit(),
        )?;
        debug!(name = %name, base = channels.base(), "Creating service client");
        Ok(Self {
            core: Arc::new(ServiceClientCore {
                runtime: runtime.clone(),
                channels,
                name,
                codec,
                counter: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
            }),
            _dispatch: runtime.acquire_dispatch(),
        })
    }

    /// This client's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Sends `request` and waits for the response.
    ///
    /// `None` waits `timeouts.service_call_timeout_ms`.
    ///
    /// # Errors
    ///
    /// * [`BuswareError::Timeout`] if no response arrived in time
    /// * [`BuswareError::ServiceFailed`] if the handler reported failure
    /// * [`BuswareError::ClientClosed`] if the runtime shut down first
    /// * the codec or transport error if the request could not be sent
    #[instrument(skip(self, request), fields(client = %self.core.name))]
    pub async fn call(
        &self,
        request: S::Request,
        timeout: Option<Duration>,
    ) -> Result<S::Response, BuswareError> {
        let core = &*self.core;
        let timeout = timeout.unwrap_or_else(|| core.runtime.config().service_call_timeout());
        let request_id = format!("{}_{}", core.name, core.counter.fetch_add(1, Ordering::Relaxed) + 1);
        let bytes = core.codec.encode(&ServiceRequest {
            header: Header::stamped(request_id.clone()),
            payload: request,
        })?;

        let (sender, receiver) = oneshot::channel();
        core.pending.lock().insert(request_id.clone(), sender);

        let weak = Arc::downgrade(&self.core);
        let on_response: MessageHandler = Arc::new(move |_channel: &str, payload: &[u8]| {
            if let Some(core) = weak.upgrade() {
                core.on_response(payload);
            }
        });
        let subscription = match core
            .runtime
            .subscribe(&core.channels.response(&request_id), on_response)
        {
            Ok(subscription) => subscription,
            Err(e) => {
                core.pending.lock().remove(&request_id);
                return Err(e);
            }
        };
        let _pending = PendingCall {
            core,
            request_id: request_id.clone(),
            subscription,
        };

        core.runtime.publish(&core.channels.request(), bytes)?;
        trace!(request_id, "Request sent");

        let closed = core.runtime.closed_token();
        let response = tokio::select! {
            biased;
            waited = tokio::time::timeout(timeout, receiver) => match waited {
                Ok(Ok(response)) => response,
                Ok(Err(_)) => return Err(BuswareError::ClientClosed),
                Err(_) => {
                    debug!(request_id, "Service call timed out after {timeout:?}");
                    return Err(BuswareError::Timeout(timeout));
                }
            },
            () = closed.cancelled() => {
                debug!(request_id, "Runtime shut down before the response arrived");
                return Err(BuswareError::ClientClosed);
            }
        };

        if !response.response_header.success {
            return Err(BuswareError::ServiceFailed(
                response.response_header.error_message,
            ));
        }
        response.payload.ok_or_else(|| {
            BuswareError::Codec("successful response carried no payload".to_string())
        })
    }
}

impl<S: Service, C: PayloadCodec> ServiceClientCore<S, C> {
    fn on_response(&self, payload: &[u8]) {
        let response: ServiceResponse<S::Response> = match self.codec.decode(payload) {
            Ok(response) => response,
            Err(e) => {
                warn!(client = %self.name, "Dropping undecodable response: {e}");
                return;
            }
        };
        let id = response.response_header.header.id.clone();
        let Some(sender) = self.pending.lock().remove(&id) else {
            trace!(request_id = %id, "Response for unknown request, dropping");
            return;
        };
        if sender.send(response).is_err() {
            trace!(request_id = %id, "Caller stopped waiting");
        }
    }
}
