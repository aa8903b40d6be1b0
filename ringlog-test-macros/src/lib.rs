//! Test macros for ringlog tests
//!
//! This crate provides procedural macros for test prerequisites like a kernel
//! that allows `io_uring`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn, ReturnType};

/// Skip this test when the kernel refuses `io_uring_setup`
///
/// Containers with a default seccomp profile, kernels older than 5.1 and
/// hosts with `kernel.io_uring_disabled` set all reject ring creation. On
/// those, the test prints a SKIPPED note and returns early instead of
/// failing.
///
/// # Example
///
/// ```ignore
/// use ringlog_test_macros::requires_io_uring;
///
/// #[test]
/// #[requires_io_uring]
/// fn test_uring_writes() {
///     // Test code here - only runs where io_uring is available
/// }
/// ```
///
/// # Implementation
///
/// The macro transforms:
/// ```ignore
/// #[requires_io_uring]
/// fn test_something() -> anyhow::Result<()> {
///     // test body
/// }
/// ```
///
/// Into:
/// ```ignore
/// fn test_something() -> anyhow::Result<()> {
///     if let Err(e) = ::io_uring::IoUring::new(4) {
///         eprintln!("SKIPPED: test_something requires io_uring ({})", e);
///         return Ok(());
///     }
///     // test body
/// }
/// ```
#[proc_macro_attribute]
pub fn requires_io_uring(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let name = sig.ident.to_string();

    let early_return = match &sig.output {
        ReturnType::Default => quote! { return; },
        ReturnType::Type(..) => quote! { return Ok(()); },
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            // Probe with a tiny ring; creation fails the same way at any size
            if let Err(e) = ::io_uring::IoUring::new(4) {
                eprintln!("SKIPPED: {} requires io_uring ({})", #name, e);
                #early_return
            }

            // Original function body
            #block
        }
    };

    output.into()
}
