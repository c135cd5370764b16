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

//! Testing utilities for Busware.
//!
//! `#[busware_test]` turns an `async fn` returning `anyhow::Result<()>` into
//! a regular test that runs on a multi-thread Tokio runtime inside a
//! `busware_test` tracing span, and reports any panic with its location.
//!
//! A panic on the test's own threads fails the test, even if Busware caught
//! it. Panics on other threads, including those of concurrently running
//! tests, do not. Tests that panic on purpose should use `#[tokio::test]`
//! instead.

pub use busware_test_macro::busware_test;

/// Items the generated test code refers to.
#[doc(hidden)]
pub mod __private {
    pub use parking_lot;
    pub use tokio;
    pub use tracing;
}

/// Re-exports for test modules.
pub mod prelude {
    pub use busware_test_macro::busware_test;
}
