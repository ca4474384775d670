//! Source kinds and the driver that reduces over them.
//!
//! Every source is classified up front into one explicit kind:
//! - Sequences and pull iterators are drained synchronously
//! - Key/value structures yield their entries in enumeration order
//! - Signals are subscribed and deliver on their own schedule

mod driver;
mod source;

pub use driver::reduce;
pub use source::{iter, range, results, Fallible, IntoSource, Pull, Source};
