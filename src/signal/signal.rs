use crate::error::{Error, UpstreamError};
use crate::reducer::{completion, Completion, Reducer, Resolver, Step};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Per-signal configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalOptions {
    /// Reject re-entrant delivery with [`Error::CyclicDelivery`].
    pub check_cycles: bool,
}

impl Default for SignalOptions {
    fn default() -> Self {
        Self {
            check_cycles: cfg!(feature = "check-cycles"),
        }
    }
}

/// A subscriber as the signal sees it: deliver, then finish exactly once.
trait Lease<T> {
    fn deliver(&mut self, value: T) -> Result<Step, Error>;
    fn finish(self: Box<Self>, error: Option<UpstreamError>);
}

struct Subscriber<R: Reducer<T>, T> {
    reducer: R,
    resolver: Resolver<R::Output>,
    _input: PhantomData<fn(T)>,
}

impl<T, R> Lease<T> for Subscriber<R, T>
where
    R: Reducer<T>,
    R::Output: 'static,
{
    fn deliver(&mut self, value: T) -> Result<Step, Error> {
        self.reducer.step(value)
    }

    fn finish(self: Box<Self>, error: Option<UpstreamError>) {
        let Subscriber { reducer, resolver, .. } = *self;
        match reducer.complete(error) {
            Ok(reduction) => reduction.forward(resolver),
            Err(err) => resolver.resolve(Err(err)),
        }
    }
}

/// One call to `send` or `fail`.
struct Delivery<T> {
    value: Option<T>,
    done: bool,
    failure: Option<UpstreamError>,
}

struct State<T> {
    leases: Vec<Box<dyn Lease<T>>>,
    last: Option<T>,
    done: bool,
    failure: Option<UpstreamError>,
    /// Leases held by the delivery in progress.
    in_flight: usize,
    /// Sends made while a delivery was in progress, in call order.
    deferred: VecDeque<Delivery<T>>,
}

impl<T> State<T> {
    fn listeners(&self) -> usize {
        self.leases.len() + self.in_flight
    }
}

struct Inner<T> {
    id: usize,
    options: SignalOptions,
    state: RefCell<State<T>>,
    depth: Cell<usize>,
}

/// Marks a delivery in progress for as long as it lives.
struct Delivering<'a>(&'a Cell<usize>);

impl<'a> Delivering<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Delivering(depth)
    }
}

impl Drop for Delivering<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// A push source with replay of the last value, completion and multiple
/// subscribers.
///
/// Cloning a signal yields another handle to the same stream. Subscribers are
/// owned by the signal; they never own it back.
///
/// # Examples
///
/// ```
/// use sluice::{for_each, Signal};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let signal = Signal::new();
/// signal.emit(5).unwrap();
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let sink = seen.clone();
/// signal.subscribe(for_each(move |v: i32| sink.borrow_mut().push(v))).unwrap();
///
/// // The cached value is replayed on subscribe.
/// assert_eq!(*seen.borrow(), vec![5]);
/// signal.emit(6).unwrap();
/// assert_eq!(*seen.borrow(), vec![5, 6]);
/// ```
pub struct Signal<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Create a signal with default options.
    pub fn new() -> Self {
        Self::with_options(SignalOptions::default())
    }

    /// Create a signal with the given options.
    pub fn with_options(options: SignalOptions) -> Self {
        Self {
            inner: Rc::new(Inner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                options,
                state: RefCell::new(State {
                    leases: Vec::new(),
                    last: None,
                    done: false,
                    failure: None,
                    in_flight: 0,
                    deferred: VecDeque::new(),
                }),
                depth: Cell::new(0),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// The cached last value, if any.
    pub fn last(&self) -> Option<T> {
        self.inner.state.borrow().last.clone()
    }

    /// Whether the stream has terminated.
    pub fn is_done(&self) -> bool {
        self.inner.state.borrow().done
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.borrow().listeners()
    }

    /// Deliver `value` (if any) to every subscriber, terminating the stream
    /// when `done` is set.
    ///
    /// Returns whether no subscriber is left. A subscriber that fails is
    /// dropped and its error returned; the others keep their place.
    ///
    /// A send made from inside a delivery of the same signal is queued and
    /// delivered to every subscriber once the current delivery is over.
    pub fn send(&self, value: Option<T>, done: bool) -> Result<bool, Error> {
        self.deliver(Delivery {
            value,
            done,
            failure: None,
        })
    }

    /// Deliver one value.
    pub fn emit(&self, value: T) -> Result<bool, Error> {
        self.send(Some(value), false)
    }

    /// Deliver a last value and terminate.
    pub fn finish(&self, value: T) -> Result<bool, Error> {
        self.send(Some(value), true)
    }

    /// Terminate without a value.
    pub fn close(&self) -> Result<bool, Error> {
        self.send(None, true)
    }

    /// Terminate abnormally: every subscriber, current and late, is completed
    /// with `error`.
    pub fn fail(&self, error: UpstreamError) -> Result<bool, Error> {
        self.deliver(Delivery {
            value: None,
            done: true,
            failure: Some(error),
        })
    }

    fn deliver(&self, delivery: Delivery<T>) -> Result<bool, Error> {
        let inner = &*self.inner;
        if inner.depth.get() > 0 {
            if inner.options.check_cycles {
                tracing::warn!(signal = inner.id, "re-entrant delivery rejected");
                return Err(Error::CyclicDelivery);
            }
            let mut state = inner.state.borrow_mut();
            if !state.done {
                tracing::trace!(signal = inner.id, "nested delivery deferred");
                state.deferred.push_back(delivery);
            }
            return Ok(state.listeners() == 0);
        }
        let _delivering = Delivering::enter(&inner.depth);

        let mut outcome = self.pass(delivery);
        loop {
            let next = inner.state.borrow_mut().deferred.pop_front();
            let Some(next) = next else {
                break;
            };
            let drained = self.pass(next);
            if outcome.is_ok() {
                outcome = drained;
            }
        }
        outcome
    }

    /// Deliver once to the current subscribers.
    fn pass(&self, delivery: Delivery<T>) -> Result<bool, Error> {
        let inner = &*self.inner;
        let Delivery {
            value,
            done,
            failure,
        } = delivery;

        let leases = {
            let mut state = inner.state.borrow_mut();
            if state.done {
                tracing::debug!(signal = inner.id, "ignoring delivery to a finished signal");
                return Ok(state.leases.is_empty());
            }
            if let Some(value) = &value {
                state.last = Some(value.clone());
            }
            state.done = done;
            if failure.is_some() {
                state.failure = failure.clone();
            }
            let leases = std::mem::take(&mut state.leases);
            state.in_flight = leases.len();
            leases
        };
        tracing::trace!(signal = inner.id, subscribers = leases.len(), done, "signalled");

        let release = || {
            let mut state = inner.state.borrow_mut();
            state.in_flight = state.in_flight.saturating_sub(1);
        };
        let mut kept = Vec::with_capacity(leases.len());
        let mut fault = None;
        let mut pending = leases.into_iter();
        for mut lease in pending.by_ref() {
            let step = match &value {
                Some(value) => lease.deliver(value.clone()),
                None => Ok(Step::Continue),
            };
            match step {
                Err(err) => {
                    release();
                    fault = Some(err);
                    break;
                }
                Ok(Step::Stop) => {
                    release();
                    lease.finish(None);
                }
                Ok(Step::Continue) if done => {
                    release();
                    lease.finish(failure.clone());
                }
                Ok(Step::Continue) => kept.push(lease),
            }
        }
        kept.extend(pending);

        // Subscribers added during delivery queue up behind the survivors.
        let (finished, error, empty) = {
            let mut state = inner.state.borrow_mut();
            state.in_flight = 0;
            kept.append(&mut state.leases);
            if state.done {
                (kept, state.failure.clone(), true)
            } else {
                let empty = kept.is_empty();
                state.leases = kept;
                (Vec::new(), None, empty)
            }
        };
        for lease in finished {
            lease.finish(error.clone());
        }

        match fault {
            Some(err) => Err(err),
            None => Ok(empty),
        }
    }

    /// Subscribe a reducer.
    ///
    /// The cached last value is replayed first. If the replay asks to stop,
    /// or the stream has already terminated, the reducer is completed at once
    /// and never joins the active set. Returns whether a cached value existed.
    pub fn subscribe<R>(&self, reducer: R) -> Result<bool, Error>
    where
        R: Reducer<T> + 'static,
        R::Output: 'static,
    {
        self.attach(reducer).map(|(replayed, _)| replayed)
    }

    /// Subscribe a reducer and keep a handle to its final value.
    pub(crate) fn attach<R>(&self, reducer: R) -> Result<(bool, Completion<R::Output>), Error>
    where
        R: Reducer<T> + 'static,
        R::Output: 'static,
    {
        let (resolver, completion) = completion();
        let mut lease: Box<dyn Lease<T>> = Box::new(Subscriber {
            reducer,
            resolver,
            _input: PhantomData,
        });

        let (last, done, failure) = {
            let state = self.inner.state.borrow();
            (state.last.clone(), state.done, state.failure.clone())
        };
        let replayed = last.is_some();
        let step = match last {
            Some(value) => lease.deliver(value)?,
            None => Step::Continue,
        };

        if step.is_stop() {
            lease.finish(None);
        } else if done {
            lease.finish(failure);
        } else {
            let mut state = self.inner.state.borrow_mut();
            state.leases.push(lease);
            tracing::trace!(signal = self.inner.id, subscribers = state.leases.len(), "subscribed");
        }
        Ok((replayed, completion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::{for_each, Reduction};

    /// Collects values and counts completions, stopping at `limit` values.
    struct Tally {
        seen: Rc<RefCell<Vec<i32>>>,
        completed: Rc<RefCell<Vec<Option<UpstreamError>>>>,
        limit: usize,
    }

    type Seen = Rc<RefCell<Vec<i32>>>;
    type Completed = Rc<RefCell<Vec<Option<UpstreamError>>>>;

    fn tally(limit: usize) -> (Tally, Seen, Completed) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let completed = Rc::new(RefCell::new(Vec::new()));
        (
            Tally {
                seen: seen.clone(),
                completed: completed.clone(),
                limit,
            },
            seen,
            completed,
        )
    }

    impl Reducer<i32> for Tally {
        type Output = ();

        fn step(&mut self, input: i32) -> Result<Step, Error> {
            let mut seen = self.seen.borrow_mut();
            seen.push(input);
            Ok(Step::stop_if(seen.len() >= self.limit))
        }

        fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<()>, Error> {
            self.completed.borrow_mut().push(error);
            Ok(Reduction::Ready(()))
        }
    }

    #[test]
    fn replays_last_value_before_new_ones() {
        let signal = Signal::new();
        signal.emit(5).unwrap();

        let (sub, seen, _) = tally(usize::MAX);
        assert!(signal.subscribe(sub).unwrap());
        assert_eq!(*seen.borrow(), vec![5]);

        signal.emit(6).unwrap();
        assert_eq!(*seen.borrow(), vec![5, 6]);
    }

    #[test]
    fn subscribe_reports_missing_cache() {
        let signal = Signal::<i32>::new();
        let (sub, _, _) = tally(usize::MAX);
        assert!(!signal.subscribe(sub).unwrap());
        assert_eq!(signal.subscriber_count(), 1);
    }

    #[test]
    fn stop_removes_and_completes_once() {
        let signal = Signal::new();
        let (sub, seen, completed) = tally(2);
        signal.subscribe(sub).unwrap();

        assert!(!signal.emit(1).unwrap());
        assert!(signal.emit(2).unwrap());
        signal.emit(3).unwrap();

        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(completed.borrow().len(), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn stop_during_replay_never_joins() {
        let signal = Signal::new();
        signal.emit(9).unwrap();
        let (sub, _, completed) = tally(1);

        signal.subscribe(sub).unwrap();
        assert_eq!(signal.subscriber_count(), 0);
        assert_eq!(completed.borrow().len(), 1);
    }

    #[test]
    fn done_completes_everyone_exactly_once() {
        let signal = Signal::new();
        let (a, _, a_done) = tally(usize::MAX);
        let (b, _, b_done) = tally(usize::MAX);
        signal.subscribe(a).unwrap();
        signal.subscribe(b).unwrap();

        assert!(signal.close().unwrap());
        signal.close().unwrap();
        signal.emit(1).unwrap();

        assert_eq!(*a_done.borrow(), vec![None]);
        assert_eq!(*b_done.borrow(), vec![None]);
        assert!(signal.is_done());
    }

    #[test]
    fn late_subscriber_to_finished_signal_gets_replay_and_completion() {
        let signal = Signal::new();
        signal.finish(3).unwrap();

        let (sub, seen, completed) = tally(usize::MAX);
        assert!(signal.subscribe(sub).unwrap());
        assert_eq!(*seen.borrow(), vec![3]);
        assert_eq!(completed.borrow().len(), 1);
    }

    #[test]
    fn failure_reaches_current_and_late_subscribers() {
        let signal = Signal::<i32>::new();
        let (early, _, early_done) = tally(usize::MAX);
        signal.subscribe(early).unwrap();

        signal.fail(UpstreamError::new("gone")).unwrap();
        let (late, _, late_done) = tally(usize::MAX);
        signal.subscribe(late).unwrap();

        assert_eq!(*early_done.borrow(), vec![Some(UpstreamError::new("gone"))]);
        assert_eq!(*late_done.borrow(), vec![Some(UpstreamError::new("gone"))]);
    }

    #[test]
    fn cycle_guard_rejects_reentrant_delivery() {
        let signal = Signal::with_options(SignalOptions { check_cycles: true });
        let echo = signal.clone();
        let outcome = Rc::new(RefCell::new(None));
        let record = outcome.clone();
        signal
            .subscribe(for_each(move |v: i32| {
                *record.borrow_mut() = Some(echo.emit(v + 1));
            }))
            .unwrap();

        signal.emit(1).unwrap();
        assert_eq!(*outcome.borrow(), Some(Err(Error::CyclicDelivery)));
        assert_eq!(signal.last(), Some(1));
    }

    #[test]
    fn subscribing_during_delivery_waits_for_next_value() {
        let signal = Signal::new();
        let (late, late_seen, _) = tally(usize::MAX);
        let late = RefCell::new(Some(late));
        let target = signal.clone();
        signal
            .subscribe(for_each(move |_: i32| {
                if let Some(sub) = late.borrow_mut().take() {
                    target.subscribe(sub).unwrap();
                }
            }))
            .unwrap();

        signal.emit(1).unwrap();
        assert_eq!(*late_seen.borrow(), vec![1]);
        signal.emit(2).unwrap();
        assert_eq!(*late_seen.borrow(), vec![1, 2]);
        assert_eq!(signal.subscriber_count(), 2);
    }

    #[test]
    fn nested_send_reaches_every_subscriber_in_order() {
        let signal = Signal::with_options(SignalOptions { check_cycles: false });
        let echo = signal.clone();
        let nested = Rc::new(RefCell::new(Vec::new()));
        let record = nested.clone();
        signal
            .subscribe(for_each(move |v: i32| {
                if v < 3 {
                    let sent = echo.emit(v + 1);
                    record.borrow_mut().push((sent, echo.subscriber_count()));
                }
            }))
            .unwrap();
        let (other, other_seen, _) = tally(usize::MAX);
        signal.subscribe(other).unwrap();

        assert!(!signal.emit(1).unwrap());
        assert_eq!(*other_seen.borrow(), vec![1, 2, 3]);
        assert_eq!(*nested.borrow(), vec![(Ok(false), 2), (Ok(false), 2)]);
        assert_eq!(signal.last(), Some(3));
        assert_eq!(signal.subscriber_count(), 2);
    }

    #[test]
    fn nested_finish_completes_after_current_value() {
        let signal = Signal::with_options(SignalOptions { check_cycles: false });
        let closer = signal.clone();
        signal
            .subscribe(for_each(move |v: i32| {
                if v == 1 {
                    closer.finish(2).unwrap();
                }
            }))
            .unwrap();
        let (other, other_seen, other_done) = tally(usize::MAX);
        signal.subscribe(other).unwrap();

        signal.emit(1).unwrap();
        assert_eq!(*other_seen.borrow(), vec![1, 2]);
        assert_eq!(*other_done.borrow(), vec![None]);
        assert!(signal.is_done());
        assert_eq!(signal.subscriber_count(), 0);
    }
}
