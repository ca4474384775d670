use super::completion::Reduction;
use crate::error::{Error, UpstreamError};
use std::marker::PhantomData;

/// What a reducer wants after consuming one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep feeding values.
    Continue,
    /// Terminate this reduction early.
    Stop,
}

impl Step {
    /// `Stop` when `stop` holds, `Continue` otherwise.
    pub fn stop_if(stop: bool) -> Self {
        if stop {
            Step::Stop
        } else {
            Step::Continue
        }
    }

    /// Whether termination was requested.
    pub fn is_stop(self) -> bool {
        self == Step::Stop
    }
}

impl From<bool> for Step {
    fn from(stop: bool) -> Self {
        Step::stop_if(stop)
    }
}

/// A one-step consumer of values with a completion that runs exactly once.
///
/// `complete` consumes the reducer: once a stage has been completed there is
/// nothing left to complete again. `error` is `Some` when the source ended
/// abnormally, and the stage decides whether to handle it or pass it on.
pub trait Reducer<T> {
    /// Final value handed back by completion.
    type Output;

    /// Consume one value.
    fn step(&mut self, input: T) -> Result<Step, Error>;

    /// Finish the reduction and produce its final value.
    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<Self::Output>, Error>;
}

/// A reducer-to-reducer transformation, independent of source and destination.
///
/// `apply` borrows the transducer so the same template can be applied to any
/// number of reductions; per-reduction state lives in the returned stage.
pub trait Transducer<I, O, R: Reducer<O>> {
    /// The reducer produced by wrapping `R`.
    type Stage: Reducer<I, Output = R::Output>;

    /// Wrap `reducer` in this transformation.
    fn apply(&self, reducer: R) -> Self::Stage;
}

/// The neutral transducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<T, R: Reducer<T>> Transducer<T, T, R> for Identity {
    type Stage = R;

    fn apply(&self, reducer: R) -> R {
        reducer
    }
}

/// `outer` applied to the result of `inner`; values flow through `outer` first.
pub struct Compose<A, B, M> {
    outer: A,
    inner: B,
    _mid: PhantomData<fn(M)>,
}

impl<A: Clone, B: Clone, M> Clone for Compose<A, B, M> {
    fn clone(&self) -> Self {
        Self {
            outer: self.outer.clone(),
            inner: self.inner.clone(),
            _mid: PhantomData,
        }
    }
}

/// Compose two transducers. `M` is the element type between them.
pub fn compose<A, B, M>(outer: A, inner: B) -> Compose<A, B, M> {
    Compose {
        outer,
        inner,
        _mid: PhantomData,
    }
}

impl<I, M, O, R, A, B> Transducer<I, O, R> for Compose<A, B, M>
where
    R: Reducer<O>,
    B: Transducer<M, O, R>,
    A: Transducer<I, M, B::Stage>,
{
    type Stage = A::Stage;

    fn apply(&self, reducer: R) -> A::Stage {
        self.outer.apply(self.inner.apply(reducer))
    }
}
