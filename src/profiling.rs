//! Timing hooks. `#[profile(ms)]` logs calls slower than the threshold when
//! the `perf_stats` feature is enabled and is a no-op otherwise.

pub use aas_nav_macros::profile;
