//! Error types shared by every reduction.

/// A data-level failure carried through a reduction.
///
/// Upstream errors are not raised: a source hands them to the completion of
/// the reducer chain, where an `err` hook may consume them. One that reaches
/// a terminal collector surfaces as [`Error::Upstream`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamError {
    message: String,
}

impl UpstreamError {
    /// Create an upstream error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message this error was created with.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors that fail a reduction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The driver was handed a value that is none of the recognized source kinds.
    #[error("cannot reduce over a {found} value")]
    SourceShape {
        /// Kind of the rejected value
        found: &'static str,
    },

    /// A signal (or flatten stage) was re-entered while it was still delivering.
    #[error("cyclic delivery: a subscriber re-entered the signal it is being delivered from")]
    CyclicDelivery,

    /// An upstream error reached a terminal collector without being handled.
    #[error("unhandled upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}
