//! The reducer protocol.
//!
//! This module provides the contract every pipeline stage implements:
//! - Reducers: one-step consumers with an exactly-once completion
//! - Transducers: reusable reducer-to-reducer transformations
//! - Collectors: terminal reducers that accumulate into a destination

mod collect;
mod completion;
mod reducer;

pub use collect::{
    fold, for_each, Collect, Destination, Entries, Fold, ForEach, JsonCollect, Merge, PairSink,
};
pub use completion::{completion, Completion, Reduction, Resolver};
pub use reducer::{compose, Compose, Identity, Reducer, Step, Transducer};
