//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `onetask_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    println!("onetask_core version={}", onetask_core::core_version());
    println!(
        "onetask_core default_log_level={}",
        onetask_core::default_log_level()
    );
}
