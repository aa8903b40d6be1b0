// SPDX-License-Identifier: Apache-2.0 OR MIT
fn main() {
    // `cargo tarpaulin` sets `cfg(tarpaulin)`; the long-running concurrency
    // tests use it to opt out of instrumented runs.
    println!("cargo:rustc-check-cfg=cfg(tarpaulin)");
}
