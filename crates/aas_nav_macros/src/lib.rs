use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, ItemFn, LitInt};

/// Time a navigation routine when the `perf_stats` feature is enabled.
///
/// Wraps the function body in a guard that logs `[PERF] name: duration` through
/// Bevy's `info!` when the call took longer than the threshold. Without the
/// feature the function is emitted unchanged.
///
/// # Example
/// ```ignore
/// #[profile]
/// fn compute_area_table(...) { ... }
///
/// #[profile(20)] // threshold in milliseconds
/// pub fn compute(...) { ... }
/// ```
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let threshold_ms: u128 = if attr.is_empty() {
        1
    } else {
        match syn::parse::<LitInt>(attr) {
            Ok(lit) => lit.base10_parse().unwrap_or(1),
            Err(err) => return err.to_compile_error().into(),
        }
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let fn_name_str = sig.ident.to_string();

    let guard = profile_guard(&fn_name_str, threshold_ms);

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _profile_timer = {
                #guard
            };

            #block
        }
    };

    output.into()
}

fn profile_guard(name: &str, threshold_ms: u128) -> TokenStream2 {
    quote! {
        struct ProfileGuard {
            name: &'static str,
            start: std::time::Instant,
        }
        impl Drop for ProfileGuard {
            fn drop(&mut self) {
                let elapsed = self.start.elapsed();
                if elapsed.as_millis() >= #threshold_ms {
                    bevy::prelude::info!("[PERF] {}: {:?}", self.name, elapsed);
                }
            }
        }
        ProfileGuard {
            name: #name,
            start: std::time::Instant::now(),
        }
    }
}
