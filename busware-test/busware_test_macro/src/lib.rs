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

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Runs an async test on a multi-thread Tokio runtime.
///
/// A panic on the test thread or on one of the runtime's worker threads
/// fails the test, even when Busware catches it. Panics on other threads,
/// such as those of tests running concurrently, are left to the previously
/// installed hook.
///
/// ```ignore
/// #[busware_test]
/// async fn goal_succeeds() -> anyhow::Result<()> {
///     let runtime = BuswareApp::launch_async().await;
///     // ...
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn busware_test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let sig = &input.sig;
    let body = &input.block;
    let attrs = &input.attrs;
    let name = &sig.ident;
    let inputs = &sig.inputs;
    let output = &sig.output;

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            sig.fn_token,
            "the async keyword is missing from the function declaration",
        )
        .to_compile_error()
        .into();
    }

    let async_name = syn::Ident::new(&format!("__{name}_async"), name.span());

    let output = quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() {
            use std::panic;
            use std::sync::atomic::{AtomicBool, Ordering};
            use std::sync::Arc;
            use ::busware_test::__private::{parking_lot, tokio, tracing};

            #[derive(Clone, Default)]
            struct PanicInfo {
                occurred: Arc<AtomicBool>,
                message: Arc<parking_lot::Mutex<Option<String>>>,
                location: Arc<parking_lot::Mutex<Option<String>>>,
            }

            let panic_info = Arc::new(PanicInfo::default());
            let panic_info_clone = Arc::clone(&panic_info);

            // The hook is process-wide; only panics on this test's own
            // threads fail it. Others pass through to the previous hook.
            let worker_name = concat!("busware-test-", stringify!(#name));
            let owner = std::thread::current().id();
            let orig_hook = panic::take_hook();
            panic::set_hook(Box::new(move |info| {
                let current = std::thread::current();
                if current.id() != owner && current.name() != Some(worker_name) {
                    orig_hook(info);
                    return;
                }
                panic_info_clone.occurred.store(true, Ordering::SeqCst);
                *panic_info_clone.message.lock() = info
                    .payload()
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| info.payload().downcast_ref::<String>().cloned());
                *panic_info_clone.location.lock() = info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));

                let message = panic_info_clone.message.lock().clone();
                let cleaned_message = message
                    .unwrap_or_else(|| "No error message".to_string())
                    .trim()
                    .replace('\n', " ");
                tracing::error!("Panic: {}", cleaned_message);
                orig_hook(info);
            }));

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .thread_name(worker_name)
                .enable_all()
                .build()
                .unwrap();

            let result = runtime.block_on(async {
                let test_span = tracing::info_span!("busware_test", name = stringify!(#name));
                let _enter = test_span.enter();

                #async_name().await
            });

            if panic_info.occurred.load(Ordering::SeqCst) {
                let message = panic_info.message.lock().clone();
                let location = panic_info.location.lock().clone();
                let location_str = location.unwrap_or_else(|| "unknown location".to_string());
                let cleaned_message = message
                    .unwrap_or_else(|| "No error message".to_string())
                    .trim()
                    .replace('\n', " ");
                panic!("Panic at {}: {}", location_str, cleaned_message);
            }

            result.unwrap()
        }

        async fn #async_name(#inputs) #output #body
    };

    output.into()
}
