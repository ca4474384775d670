use crate::error::Error;
use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

type Continuation<O> = Box<dyn FnOnce(Result<O, Error>)>;

struct Slot<O> {
    value: Option<Result<O, Error>>,
    then: Option<Continuation<O>>,
    waker: Option<Waker>,
}

/// Create a linked resolver/completion pair.
pub fn completion<O>() -> (Resolver<O>, Completion<O>) {
    let slot = Rc::new(RefCell::new(Slot {
        value: None,
        then: None,
        waker: None,
    }));
    (
        Resolver {
            slot: Rc::clone(&slot),
        },
        Completion { slot },
    )
}

/// Write side of a [`Completion`]. Resolving consumes it, so a final value
/// is produced at most once.
pub struct Resolver<O> {
    slot: Rc<RefCell<Slot<O>>>,
}

impl<O> Resolver<O> {
    /// Hand the final value (or failure) to the waiting completion.
    pub fn resolve(self, result: Result<O, Error>) {
        let then = self.slot.borrow_mut().then.take();
        if let Some(then) = then {
            then(result);
            return;
        }

        // Nobody holds the completion any more.
        if Rc::strong_count(&self.slot) == 1 {
            if let Err(err) = &result {
                tracing::error!(%err, "reduction failed after its completion handle was dropped");
            }
            return;
        }

        let waker = {
            let mut slot = self.slot.borrow_mut();
            slot.value = Some(result);
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// The final value of a reduction that finishes later.
///
/// A completion has exactly one consumer: either a continuation registered
/// with [`on_ready`](Completion::on_ready) / [`map`](Completion::map), or a
/// task awaiting it. Continuations run synchronously inside whatever call
/// resolves the value.
pub struct Completion<O> {
    slot: Rc<RefCell<Slot<O>>>,
}

impl<O: 'static> Completion<O> {
    /// A completion that already holds its result.
    pub fn resolved(result: Result<O, Error>) -> Self {
        let (resolver, completion) = completion();
        resolver.resolve(result);
        completion
    }

    /// Whether the final value has arrived and not been taken yet.
    pub fn is_ready(&self) -> bool {
        self.slot.borrow().value.is_some()
    }

    /// Take the final value if it has arrived.
    pub fn try_take(&self) -> Option<Result<O, Error>> {
        self.slot.borrow_mut().value.take()
    }

    /// Run `f` with the result as soon as it is available.
    pub fn on_ready<F>(self, f: F)
    where
        F: FnOnce(Result<O, Error>) + 'static,
    {
        let ready = {
            let mut slot = self.slot.borrow_mut();
            match slot.value.take() {
                Some(value) => Some(value),
                None => {
                    slot.then = Some(Box::new(f));
                    return;
                }
            }
        };
        if let Some(value) = ready {
            f(value);
        }
    }

    /// Transform the successful result once it arrives.
    pub fn map<P, F>(self, f: F) -> Completion<P>
    where
        P: 'static,
        F: FnOnce(O) -> P + 'static,
    {
        let (resolver, mapped) = completion();
        self.on_ready(move |result| resolver.resolve(result.map(f)));
        mapped
    }
}

impl<O> Future for Completion<O> {
    type Output = Result<O, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        match slot.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

/// What completing a reducer chain produces: the final value now, or a
/// handle to it when asynchronous branches are still running.
pub enum Reduction<O> {
    /// The reduction has finished.
    Ready(O),
    /// The reduction finishes later.
    Pending(Completion<O>),
}

impl<O: 'static> Reduction<O> {
    /// Whether the final value is available without waiting.
    pub fn is_ready(&self) -> bool {
        match self {
            Reduction::Ready(_) => true,
            Reduction::Pending(completion) => completion.is_ready(),
        }
    }

    /// The final value, if it is available without waiting.
    ///
    /// A pending reduction that already failed yields `None`; await it or use
    /// [`into_completion`](Reduction::into_completion) to see the error.
    pub fn ready(self) -> Option<O> {
        match self {
            Reduction::Ready(value) => Some(value),
            Reduction::Pending(completion) => completion.try_take().and_then(Result::ok),
        }
    }

    /// Transform the final value, now or when it arrives.
    pub fn map<P, F>(self, f: F) -> Reduction<P>
    where
        P: 'static,
        F: FnOnce(O) -> P + 'static,
    {
        match self {
            Reduction::Ready(value) => Reduction::Ready(f(value)),
            Reduction::Pending(completion) => Reduction::Pending(completion.map(f)),
        }
    }

    /// Pass the final value on to `resolver`, now or when it arrives.
    pub fn forward(self, resolver: Resolver<O>) {
        match self {
            Reduction::Ready(value) => resolver.resolve(Ok(value)),
            Reduction::Pending(completion) => {
                completion.on_ready(move |result| resolver.resolve(result))
            }
        }
    }

    /// Turn this reduction into a completion handle.
    pub fn into_completion(self) -> Completion<O> {
        match self {
            Reduction::Ready(value) => Completion::resolved(Ok(value)),
            Reduction::Pending(completion) => completion,
        }
    }

    /// Collapse a completion that has already resolved into a ready value.
    pub(crate) fn settled(completion: Completion<O>) -> Result<Self, Error> {
        match completion.try_take() {
            Some(result) => result.map(Reduction::Ready),
            None => Ok(Reduction::Pending(completion)),
        }
    }
}

impl<O: 'static> IntoFuture for Reduction<O> {
    type Output = Result<O, Error>;
    type IntoFuture = Completion<O>;

    fn into_future(self) -> Self::IntoFuture {
        self.into_completion()
    }
}

impl<O> std::fmt::Debug for Reduction<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reduction::Ready(_) => f.write_str("Reduction::Ready(..)"),
            Reduction::Pending(_) => f.write_str("Reduction::Pending(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use std::cell::Cell;

    #[test]
    fn continuation_runs_when_resolved() {
        let (resolver, pending) = completion::<i32>();
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();

        pending.map(|v| v * 2).on_ready(move |r| seen_clone.set(r.unwrap()));
        assert_eq!(seen.get(), 0);

        resolver.resolve(Ok(21));
        assert_eq!(seen.get(), 42);
    }

    #[test]
    fn value_waits_for_late_consumer() {
        let (resolver, pending) = completion::<&str>();
        resolver.resolve(Ok("done"));

        assert!(pending.is_ready());
        assert_eq!(pending.try_take(), Some(Ok("done")));
        assert!(!pending.is_ready());
    }

    #[test]
    fn map_skips_errors() {
        let (resolver, pending) = completion::<i32>();
        let mapped = pending.map(|_| -> i32 { panic!("must not run") });

        resolver.resolve(Err(UpstreamError::new("nope").into()));
        assert!(matches!(mapped.try_take(), Some(Err(Error::Upstream(_)))));
    }

    #[test]
    fn settled_collapses_resolved_completion() {
        let ready = Reduction::settled(Completion::resolved(Ok(3))).unwrap();
        assert_eq!(ready.ready(), Some(3));

        let (_resolver, pending) = completion::<i32>();
        let still_pending = Reduction::settled(pending).unwrap();
        assert!(!still_pending.is_ready());
    }
}
