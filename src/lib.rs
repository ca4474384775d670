//! # Sluice
//!
//! Composable transducers over synchronous and push-based sources.
//!
//! Sluice separates *what* happens to values from *where* they come from and
//! *where* they end up:
//!
//! ## Reducers and transducers
//!
//! - `Reducer<T>` - a one-step consumer with a completion that runs exactly once
//! - `Transducer` - a reusable reducer-to-reducer transformation
//! - `map`, `filter`, `take`, `cat` and friends - the standard transducers
//!
//! ## Sources
//!
//! - Vectors, iterators, maps and JSON values are drained synchronously
//! - `Signal<T>` - a push stream with replay of the last value and completion
//! - `delay`, `every` - signals driven by the tokio runtime
//!
//! ## Pipelines
//!
//! The fluent façade chains transducers in call order and drives a source into
//! a destination:
//!
//! ```
//! use sluice::flow;
//!
//! let out = flow(vec![1, 2, 3, 4]).map(|x| x * 2).take(3).to(Vec::new()).unwrap();
//! assert_eq!(out.ready(), Some(vec![2, 4, 6]));
//! ```

pub mod error;
pub mod external;
pub mod pipeline;
pub mod reducer;
pub mod signal;
pub mod source;
pub mod transducer;

// Re-export main types for convenience
pub use error::{Error, UpstreamError};
pub use pipeline::{flow, pipeline, Pipeline};
pub use reducer::{
    compose, fold, for_each, Completion, Destination, Identity, Reducer, Reduction, Step,
    Transducer,
};
pub use signal::{delay, delay_error, every, from_future, Signal, SignalOptions};
pub use source::{iter, range, reduce, results, IntoSource, Source};
