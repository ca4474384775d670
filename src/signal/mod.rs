//! Push sources.
//!
//! This module provides the asynchronous side of reduction:
//! - Signals: multi-subscriber streams that replay their last value
//! - Timers: one-shot and periodic signals driven by the tokio runtime

mod signal;
mod timer;

pub use signal::{Signal, SignalOptions};
pub use timer::{delay, delay_error, every, from_future};
