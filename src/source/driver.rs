use super::source::{IntoSource, Source};
use crate::error::{Error, UpstreamError};
use crate::reducer::{Reducer, Reduction};

/// Drive `source` through `reducer`.
///
/// Synchronous sources are drained in one call, stopping as soon as the
/// reducer asks to, and the reducer is completed exactly once before this
/// returns. A signal source is subscribed and the result stays pending until
/// the signal completes the subscription. A stage failure aborts the drive
/// without completing the reducer.
///
/// # Examples
///
/// ```
/// use sluice::{fold, reduce};
///
/// let total = reduce(vec![1, 2, 3], fold(0, |acc, x: i32| acc + x)).unwrap();
/// assert_eq!(total.ready(), Some(6));
/// ```
pub fn reduce<S, R>(source: S, reducer: R) -> Result<Reduction<R::Output>, Error>
where
    S: IntoSource,
    S::Item: Clone + 'static,
    R: Reducer<S::Item> + 'static,
    R::Output: 'static,
{
    let source = source.into_source()?;
    tracing::trace!(kind = source.kind(), "driving source");
    match source {
        Source::Seq(items) => drain(items.into_iter(), reducer),
        Source::Iter(iter) | Source::Entries(iter) => drain(iter, reducer),
        Source::Results(iter) => drain_results(iter, reducer),
        Source::Signal(signal) => {
            let (_, completion) = signal.attach(reducer)?;
            Reduction::settled(completion)
        }
    }
}

fn drain<T, R>(items: impl Iterator<Item = T>, mut reducer: R) -> Result<Reduction<R::Output>, Error>
where
    R: Reducer<T>,
{
    for item in items {
        if reducer.step(item)?.is_stop() {
            break;
        }
    }
    reducer.complete(None)
}

fn drain_results<T, R>(
    items: impl Iterator<Item = Result<T, UpstreamError>>,
    mut reducer: R,
) -> Result<Reduction<R::Output>, Error>
where
    R: Reducer<T>,
{
    for item in items {
        match item {
            Ok(item) => {
                if reducer.step(item)?.is_stop() {
                    break;
                }
            }
            Err(error) => {
                tracing::debug!(%error, "source ended with an upstream error");
                return reducer.complete(Some(error));
            }
        }
    }
    reducer.complete(None)
}
