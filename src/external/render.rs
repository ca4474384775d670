use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A lightweight element descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Element name.
    pub tag: String,
    /// Attributes in insertion order.
    #[serde(default)]
    pub attributes: IndexMap<String, Value>,
}

impl Element {
    /// An element without attributes.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: IndexMap::new(),
        }
    }

    /// Set one attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Applies element lists to an existing display.
///
/// The list is usually the terminal vector of a `to(Vec::new())` drive.
pub trait Renderer {
    /// Whatever identifies the display being updated.
    type Handle;

    /// Bring `handle` in line with `elements`.
    fn render(&mut self, handle: &mut Self::Handle, elements: &[Element]);
}
