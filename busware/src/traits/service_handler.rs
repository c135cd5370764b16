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

use std::fmt::{Debug, Formatter};
use std::future::Future;

use async_trait::async_trait;

use crate::message::ServiceRequest;
use crate::traits::Service;

/// The work a [`ServiceServer`](crate::service::ServiceServer) performs for each request.
///
/// `Ok` becomes a successful response; `Err` becomes a response with
/// `success == false` carrying the error's text.
#[async_trait]
pub trait ServiceHandler<S: Service>: Send + Sync + 'static {
    /// Answers one request.
    async fn handle(&self, request: ServiceRequest<S::Request>) -> anyhow::Result<S::Response>;
}

/// A [`ServiceHandler`] backed by an async closure. Built with [`service_handler_fn`].
#[derive(Clone)]
pub struct FnServiceHandler<F> {
    f: F,
}

impl<F> Debug for FnServiceHandler<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnServiceHandler").finish_non_exhaustive()
    }
}

/// Wraps an async closure as a [`ServiceHandler`].
pub fn service_handler_fn<S, F, Fut>(f: F) -> FnServiceHandler<F>
where
    S: Service,
    F: Fn(ServiceRequest<S::Request>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<S::Response>> + Send + 'static,
{
    FnServiceHandler { f }
}

#[async_trait]
impl<S, F, Fut> ServiceHandler<S> for FnServiceHandler<F>
where
    S: Service,
    F: Fn(ServiceRequest<S::Request>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<S::Response>> + Send + 'static,
{
    async fn handle(&self, request: ServiceRequest<S::Request>) -> anyhow::Result<S::Response> {
        (self.f)(request).await
    }
}
