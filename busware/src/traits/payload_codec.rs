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

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::message::BuswareError;

/// Turns typed messages into bus payloads and back.
///
/// Clients and servers are generic over a codec, so one engine serves every
/// message schema. Both ends of a channel must use the same codec.
pub trait PayloadCodec: Clone + Default + Debug + Send + Sync + 'static {
    /// Serializes `value` into bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::Codec`] if the value cannot be serialized.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, BuswareError>;

    /// Deserializes bytes into a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`BuswareError::Codec`] if the bytes are not a valid `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, BuswareError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
