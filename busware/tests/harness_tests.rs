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

//! `#[busware_test]` only fails a test for panics on that test's own threads.

use busware_test::prelude::*;

mod setup;

#[busware_test]
async fn panics_on_unrelated_threads_do_not_fail_the_test() -> anyhow::Result<()> {
    setup::initialize_tracing();
    let joined = std::thread::Builder::new()
        .name("unrelated-worker".to_string())
        .spawn(|| panic!("unrelated failure"))?
        .join();
    assert!(joined.is_err());
    Ok(())
}
