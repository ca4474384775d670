//! Interfaces to collaborators outside the engine.
//!
//! - Module providers: named factories resolved into one-shot signals
//! - Renderers: consume the element lists a drive collects
//! - Routers: turn a location signal into an action signal

mod provider;
mod render;
mod router;

pub use provider::{load, Module, ModuleProvider, ProviderConfig, ProviderError};
pub use render::{Element, Renderer};
pub use router::{PrefixRouter, Router};
