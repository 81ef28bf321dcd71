//! Small personal-monitoring utilities that poll operating-system counters
//! (network byte counters, display power state, keyboard input) at fixed
//! intervals and append tab-delimited daily/monthly aggregates to flat log
//! files. All three monitors share one accumulator core handling counter
//! deltas, day/month rollover and counter-reset detection.
//!

pub mod accum;
pub mod cli;
pub mod fs;
pub mod monitor;
pub mod samplers;
pub mod store;
pub mod utils;
