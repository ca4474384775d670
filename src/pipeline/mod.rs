//! Fluent composition.
//!
//! Pipelines chain the standard transducers method by method and drive a
//! source into a destination in one call.

mod pipeline;

pub use pipeline::{flow, pipeline, Pipeline, Unbound};
