use super::basic::{map, Map};
use super::join::{Branch, Join, Sequential};
use crate::error::{Error, UpstreamError};
use crate::reducer::{completion, compose, Compose, Reducer, Reduction, Resolver, Step, Transducer};
use crate::source::{reduce, IntoSource, Source};
use std::cell::{RefCell, RefMut};
use std::collections::VecDeque;
use std::rc::Rc;

/// Flatten nested sources into one stream under a join policy.
#[derive(Debug, Clone, Default)]
pub struct Cat<J> {
    join: J,
}

/// Flatten nested sources one at a time, in arrival order.
///
/// # Examples
///
/// ```
/// use sluice::flow;
///
/// let out = flow(vec![vec![1, 2], vec![], vec![3]]).cat().to(Vec::new()).unwrap();
/// assert_eq!(out.ready(), Some(vec![1, 2, 3]));
/// ```
pub fn cat() -> Cat<Sequential> {
    Cat {
        join: Sequential::new(),
    }
}

/// Flatten nested sources under `join`.
pub fn cat_with<J: Join>(join: J) -> Cat<J> {
    Cat { join }
}

/// `map(f)` followed by `cat`.
pub type MapCat<F, S, J> = Compose<Map<F>, Cat<J>, S>;

/// Map every value to a nested source and flatten them in arrival order.
pub fn mapcat<F, I, S>(f: F) -> MapCat<F, S, Sequential>
where
    F: Fn(I) -> S,
    S: IntoSource,
{
    compose(map(f), cat())
}

/// Map every value to a nested source and flatten them under `join`.
pub fn mapcat_with<F, I, S, J>(f: F, join: J) -> MapCat<F, S, J>
where
    F: Fn(I) -> S,
    S: IntoSource,
    J: Join,
{
    compose(map(f), cat_with(join))
}

/// State shared by the outer stage and its branches.
struct Flatten<R: Reducer<U>, J, U> {
    next: Option<R>,
    join: J,
    queue: VecDeque<Source<U>>,
    /// Values that arrived while downstream was busy with another one.
    backlog: VecDeque<(Branch, U)>,
    starting: bool,
    /// `next` is out of the cell, handling a value.
    delivering: bool,
    stopped: bool,
    error: Option<UpstreamError>,
    fault: Option<Error>,
    resolver: Option<Resolver<R::Output>>,
}

impl<R: Reducer<U>, J: Join, U> Flatten<R, J, U> {
    fn stop(&mut self) {
        self.stopped = true;
        self.queue.clear();
        self.backlog.clear();
    }

    /// Next queued value whose branch is still admitted.
    fn next_backlogged(&mut self) -> Option<U> {
        while let Some((branch, value)) = self.backlog.pop_front() {
            if self.join.admits(branch) {
                return Some(value);
            }
            tracing::trace!(branch = branch.0, "superseded value dropped");
        }
        None
    }

    /// Whether downstream completion can be forwarded now.
    fn settled(&self) -> bool {
        self.resolver.is_some()
            && self.next.is_some()
            && (self.stopped
                || self.fault.is_some()
                || (self.queue.is_empty() && self.join.drained()))
    }
}

type Shared<R, J, U> = Rc<RefCell<Flatten<R, J, U>>>;

fn lock<R: Reducer<U>, J, U>(flatten: &Shared<R, J, U>) -> Result<RefMut<'_, Flatten<R, J, U>>, Error> {
    flatten.try_borrow_mut().map_err(|_| {
        tracing::warn!("re-entrant delivery into a flatten rejected");
        Error::CyclicDelivery
    })
}

/// The outer stage of a flatten.
pub struct CatStage<R: Reducer<U>, J, U> {
    flatten: Shared<R, J, U>,
}

impl<S, U, R, J> Transducer<S, U, R> for Cat<J>
where
    S: IntoSource<Item = U>,
    U: Clone + 'static,
    R: Reducer<U> + 'static,
    R::Output: 'static,
    J: Join + Clone + 'static,
{
    type Stage = CatStage<R, J, U>;

    fn apply(&self, reducer: R) -> Self::Stage {
        CatStage {
            flatten: Rc::new(RefCell::new(Flatten {
                next: Some(reducer),
                join: self.join.clone(),
                queue: VecDeque::new(),
                backlog: VecDeque::new(),
                starting: false,
                delivering: false,
                stopped: false,
                error: None,
                fault: None,
                resolver: None,
            })),
        }
    }
}

impl<S, U, R, J> Reducer<S> for CatStage<R, J, U>
where
    S: IntoSource<Item = U>,
    U: Clone + 'static,
    R: Reducer<U> + 'static,
    R::Output: 'static,
    J: Join + 'static,
{
    type Output = R::Output;

    fn step(&mut self, input: S) -> Result<Step, Error> {
        let source = input.into_source()?;
        {
            let mut state = lock(&self.flatten)?;
            if let Some(fault) = &state.fault {
                return Err(fault.clone());
            }
            if state.stopped {
                return Ok(Step::Stop);
            }
            state.queue.push_back(source);
        }
        pump(&self.flatten)?;
        Ok(Step::stop_if(lock(&self.flatten)?.stopped))
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<R::Output>, Error> {
        let (resolver, completion) = completion();
        {
            let mut state = lock(&self.flatten)?;
            state.join.end_outer();
            if let Some(error) = error {
                if state.stopped {
                    tracing::debug!(%error, "outer error after stop discarded");
                } else {
                    state.stop();
                    state.error = Some(error);
                }
            }
            state.resolver = Some(resolver);
        }
        settle(&self.flatten);
        Reduction::settled(completion)
    }
}

/// Start queued branches for as long as the policy allows.
fn pump<R, J, U>(flatten: &Shared<R, J, U>) -> Result<(), Error>
where
    U: Clone + 'static,
    R: Reducer<U> + 'static,
    R::Output: 'static,
    J: Join + 'static,
{
    loop {
        let (source, branch) = {
            let mut state = lock(flatten)?;
            // A branch finishing while another starts or delivers leaves the
            // queue to the running loop.
            if state.stopped || state.starting || state.delivering {
                return Ok(());
            }
            if state.join.sequential() && !state.join.drained() {
                return Ok(());
            }
            let Some(source) = state.queue.pop_front() else {
                return Ok(());
            };
            state.starting = true;
            (source, state.join.begin())
        };
        tracing::trace!(branch = branch.0, kind = source.kind(), "branch started");
        let started = reduce(
            source,
            BranchReducer {
                flatten: Rc::clone(flatten),
                branch,
            },
        );
        lock(flatten)?.starting = false;
        started?;
    }
}

/// Start whatever the policy now allows, then settle.
fn resume<R, J, U>(flatten: &Shared<R, J, U>)
where
    U: Clone + 'static,
    R: Reducer<U> + 'static,
    R::Output: 'static,
    J: Join + 'static,
{
    if let Err(err) = pump(flatten) {
        if let Ok(mut state) = flatten.try_borrow_mut() {
            state.fault.get_or_insert(err);
        }
    }
    settle(flatten);
}

/// Forward downstream completion once the outer stream has ended and the
/// policy is drained.
fn settle<R, J, U>(flatten: &Shared<R, J, U>)
where
    R: Reducer<U>,
    R::Output: 'static,
    J: Join,
{
    let (next, resolver, error, fault) = {
        let Ok(mut state) = flatten.try_borrow_mut() else {
            return;
        };
        if !state.settled() {
            return;
        }
        (
            state.next.take(),
            state.resolver.take(),
            state.error.take(),
            state.fault.take(),
        )
    };
    let (Some(next), Some(resolver)) = (next, resolver) else {
        return;
    };
    if let Some(fault) = fault {
        resolver.resolve(Err(fault));
        return;
    }
    tracing::trace!(failed = error.is_some(), "flatten drained");
    match next.complete(error) {
        Ok(reduction) => reduction.forward(resolver),
        Err(err) => resolver.resolve(Err(err)),
    }
}

/// Inner consumer of one nested source.
struct BranchReducer<R: Reducer<U>, J, U> {
    flatten: Shared<R, J, U>,
    branch: Branch,
}

impl<U, R, J> Reducer<U> for BranchReducer<R, J, U>
where
    U: Clone + 'static,
    R: Reducer<U> + 'static,
    R::Output: 'static,
    J: Join + 'static,
{
    type Output = ();

    fn step(&mut self, input: U) -> Result<Step, Error> {
        let mut next = {
            let mut state = lock(&self.flatten)?;
            if state.stopped || state.fault.is_some() {
                return Ok(Step::Stop);
            }
            if !state.join.admits(self.branch) {
                tracing::trace!(branch = self.branch.0, "superseded branch dropped");
                return Ok(Step::Stop);
            }
            let Some(next) = state.next.take() else {
                if state.delivering {
                    state.backlog.push_back((self.branch, input));
                    return Ok(Step::Continue);
                }
                return Ok(Step::Stop);
            };
            state.delivering = true;
            next
        };

        // Downstream runs without the cell borrowed: it may finish or feed
        // other branches of this flatten.
        let mut value = input;
        let outcome = loop {
            let step = next.step(value);
            let mut state = lock(&self.flatten)?;
            match step {
                Err(err) => {
                    state.fault.get_or_insert(err.clone());
                    state.backlog.clear();
                    break Err(err);
                }
                Ok(Step::Stop) => {
                    state.stop();
                    break Ok(Step::Stop);
                }
                Ok(Step::Continue) if state.stopped || state.fault.is_some() => {
                    state.backlog.clear();
                    break Ok(Step::Stop);
                }
                Ok(Step::Continue) => match state.next_backlogged() {
                    Some(queued) => value = queued,
                    None => break Ok(Step::Continue),
                },
            }
        };
        {
            let mut state = lock(&self.flatten)?;
            state.next = Some(next);
            state.delivering = false;
        }
        resume(&self.flatten);
        outcome
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<()>, Error> {
        {
            let mut state = lock(&self.flatten)?;
            let current = state.join.admits(self.branch);
            state.join.end(self.branch);
            tracing::trace!(branch = self.branch.0, "branch finished");
            if let Some(error) = error {
                if !current {
                    tracing::warn!(branch = self.branch.0, %error, "error from superseded branch discarded");
                } else if state.stopped {
                    tracing::debug!(branch = self.branch.0, %error, "branch error after stop discarded");
                } else {
                    state.stop();
                    state.error = Some(error);
                }
            }
        }
        resume(&self.flatten);
        Ok(Reduction::Ready(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::{fold, for_each, Collect, Destination};
    use crate::signal::{delay, delay_error, Signal};
    use crate::transducer::{err, latest, take, wait};
    use std::time::Duration;
    use tokio::task::LocalSet;

    fn collect<X, I>(xf: &X, input: Vec<I>) -> Result<Reduction<Vec<i32>>, Error>
    where
        I: Clone + 'static,
        X: Transducer<I, i32, Collect<i32>>,
        X::Stage: 'static,
    {
        reduce(input, xf.apply(Vec::new().into_reducer()))
    }

    fn after(ms: u64) -> Signal<i32> {
        delay(Duration::from_millis(ms), ms as i32)
    }

    #[test]
    fn flattens_synchronous_sources_in_order() {
        let out = collect(&cat(), vec![vec![1, 2], vec![], vec![3]]).unwrap();
        assert_eq!(out.ready(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn mapcat_maps_then_flattens() {
        let xf = mapcat(|n: i32| vec![n; n as usize]);
        let out = collect(&xf, vec![1, 2, 3]).unwrap();
        assert_eq!(out.ready(), Some(vec![1, 2, 2, 3, 3, 3]));
    }

    #[test]
    fn downstream_stop_ends_outer_stream() {
        let xf = compose::<_, _, i32>(cat(), take(3));
        let out = collect(&xf, vec![vec![1, 2], vec![3, 4], vec![5]]).unwrap();
        assert_eq!(out.ready(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn nested_shape_errors_fail_the_reduction() {
        use serde_json::{json, Value};
        let stage = Transducer::<Value, Value, _>::apply(&cat(), Value::Null.into_reducer());
        let err = reduce(vec![json!([1]), json!(2)], stage).unwrap_err();
        assert_eq!(err, Error::SourceShape { found: "number" });
    }

    #[test]
    fn downstream_closing_a_sibling_branch_still_completes() {
        let first = Signal::new();
        let second = Signal::<i32>::new();
        let closer = second.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let stage = Transducer::<Signal<i32>, i32, _>::apply(
            &cat_with(wait()),
            for_each(move |v: i32| {
                sink.borrow_mut().push(v);
                closer.close().unwrap();
            }),
        );
        let out = reduce(vec![first.clone(), second.clone()], stage).unwrap();
        assert!(!out.is_ready());

        first.finish(1).unwrap();
        assert!(second.is_done());
        assert_eq!(*seen.borrow(), vec![1]);
        assert!(out.is_ready());
    }

    #[test]
    fn values_fed_back_into_a_sibling_are_delivered_in_turn() {
        let first = Signal::new();
        let second = Signal::new();
        let feedback = second.clone();
        let xf = cat_with(wait());
        let stage = Transducer::<Signal<i32>, i32, _>::apply(
            &xf,
            fold(Vec::new(), move |mut acc: Vec<i32>, v: i32| {
                if v < 10 {
                    feedback.emit(v + 10).unwrap();
                }
                acc.push(v);
                acc
            }),
        );
        let out = reduce(vec![first.clone(), second.clone()], stage).unwrap();

        first.emit(1).unwrap();
        first.emit(2).unwrap();
        first.close().unwrap();
        second.close().unwrap();
        assert_eq!(out.ready(), Some(vec![1, 11, 2, 12]));
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_waits_for_each_branch() {
        LocalSet::new()
            .run_until(async {
                let xf = mapcat(after);
                let out = collect(&xf, vec![1000, 300, 400, 2000]).unwrap();
                assert!(!out.is_ready());

                let start = tokio::time::Instant::now();
                assert_eq!(out.await.unwrap(), vec![1000, 300, 400, 2000]);
                assert!(start.elapsed() >= Duration::from_millis(3700));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn wait_completes_after_every_branch() {
        LocalSet::new()
            .run_until(async {
                let xf = mapcat_with(after, wait());
                let out = collect(&xf, vec![1000, 300, 400, 2000]).unwrap();

                let start = tokio::time::Instant::now();
                assert_eq!(out.await.unwrap(), vec![300, 400, 1000, 2000]);
                assert!(start.elapsed() >= Duration::from_millis(2000));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn latest_keeps_only_newest_branch() {
        LocalSet::new()
            .run_until(async {
                let xf = mapcat_with(after, latest());
                let out = collect(&xf, vec![1000, 300, 400, 2000]).unwrap();
                assert_eq!(out.await.unwrap(), vec![2000]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn branch_error_reaches_err_hook() {
        LocalSet::new()
            .run_until(async {
                let caught = Rc::new(RefCell::new(Vec::new()));
                let sink = caught.clone();
                let xf = compose::<_, _, i32>(
                    cat_with(wait()),
                    err(move |e: &UpstreamError| sink.borrow_mut().push(e.clone())),
                );
                let branches = vec![
                    after(10),
                    delay_error(Duration::from_millis(20), UpstreamError::new("branch")),
                    after(30),
                ];
                let out = collect(&xf, branches).unwrap();

                assert_eq!(out.await.unwrap(), vec![10]);
                assert_eq!(*caught.borrow(), vec![UpstreamError::new("branch")]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_branch_errors_are_discarded() {
        LocalSet::new()
            .run_until(async {
                let branches = vec![
                    delay_error(Duration::from_millis(10), UpstreamError::new("stale")),
                    after(50),
                ];
                let out = collect(&cat_with(latest()), branches).unwrap();
                assert_eq!(out.await.unwrap(), vec![50]);
            })
            .await;
    }
}
