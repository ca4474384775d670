use crate::error::{Error, UpstreamError};
use crate::pipeline::pipeline;
use crate::reducer::for_each;
use crate::signal::Signal;
use crate::transducer::Candidate;

/// Selects actions from a location signal.
pub trait Router<A> {
    /// Subscribe to `location` and emit the action of the first matching
    /// `(pattern, action)` row for every location.
    fn route(&self, table: Vec<(String, A)>, location: Signal<String>) -> Result<Signal<A>, Error>;
}

/// Matches patterns literally; a trailing `*` matches any suffix.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixRouter;

fn matches(pattern: &str, location: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => location.starts_with(prefix),
        None => pattern == location,
    }
}

impl<A: Clone + 'static> Router<A> for PrefixRouter {
    fn route(&self, table: Vec<(String, A)>, location: Signal<String>) -> Result<Signal<A>, Error> {
        let actions = Signal::new();
        let candidates: Vec<Candidate<String, A>> = table
            .into_iter()
            .map(|(pattern, action)| -> Candidate<String, A> {
                Box::new(move |location: &String| {
                    matches(&pattern, location).then(|| action.clone())
                })
            })
            .collect();

        let failed = actions.clone();
        let closed = actions.clone();
        let emit = actions.clone();
        let selector = pipeline::<String>()
            .match_first(candidates)
            .err(move |error: &UpstreamError| {
                if let Err(err) = failed.fail(error.clone()) {
                    tracing::warn!(%err, "route failure could not be delivered");
                }
            })
            .done(move |_: &()| {
                if let Err(err) = closed.close() {
                    tracing::warn!(%err, "route close could not be delivered");
                }
            })
            .into_reducer(for_each(move |action: A| {
                if let Err(err) = emit.emit(action) {
                    tracing::warn!(%err, "route action could not be delivered");
                }
            }));
        location.subscribe(selector)?;
        Ok(actions)
    }
}
