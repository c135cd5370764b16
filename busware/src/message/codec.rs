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

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::message::BuswareError;
use crate::traits::PayloadCodec;

/// JSON payloads (UTF-8, human-readable). The default codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, BuswareError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, BuswareError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// `MessagePack` payloads (compact binary).
///
/// Structs are encoded as maps so payload types may gain optional fields
/// without breaking older peers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackCodec;

impl PayloadCodec for MessagePackCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, BuswareError> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, BuswareError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    fn name(&self) -> &'static str {
        "messagepack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ActionResult, ActionStatus, GoalStatus, Header};

    fn aborted() -> ActionResult<u64> {
        ActionResult {
            status: GoalStatus {
                header: Header::stamped("x_1"),
                status_code: ActionStatus::Aborted,
                message: "divide by zero".to_string(),
            },
            payload: None,
        }
    }

    #[test]
    fn messagepack_is_smaller_than_json() {
        let result = aborted();
        let json = JsonCodec.encode(&result).unwrap();
        let packed = MessagePackCodec.encode(&result).unwrap();
        assert!(packed.len() < json.len());
        let back: ActionResult<u64> = MessagePackCodec.decode(&packed).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let err = JsonCodec.decode::<ActionResult<u64>>(b"not json").unwrap_err();
        assert!(matches!(err, BuswareError::Codec(_)));
    }
}
