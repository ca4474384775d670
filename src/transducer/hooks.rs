use crate::error::{Error, UpstreamError};
use crate::reducer::{Reducer, Reduction, Step, Transducer};
use std::marker::PhantomData;
use std::rc::Rc;

/// Observe the final value of a normal completion.
pub struct Done<F, V> {
    hook: Rc<F>,
    _value: PhantomData<fn(&V)>,
}

impl<F, V> Clone for Done<F, V> {
    fn clone(&self) -> Self {
        Self {
            hook: Rc::clone(&self.hook),
            _value: PhantomData,
        }
    }
}

/// Run `hook` with the final value once the reduction completes normally,
/// then hand the value on unchanged. A completion carrying an error skips
/// the hook.
pub fn done<F, V>(hook: F) -> Done<F, V>
where
    F: Fn(&V),
{
    Done {
        hook: Rc::new(hook),
        _value: PhantomData,
    }
}

/// Stage built by [`Done`].
pub struct DoneStage<F, R> {
    hook: Rc<F>,
    next: R,
}

impl<T, V, F, R> Transducer<T, T, R> for Done<F, V>
where
    F: Fn(&V) + 'static,
    V: 'static,
    R: Reducer<T, Output = V>,
{
    type Stage = DoneStage<F, R>;

    fn apply(&self, reducer: R) -> Self::Stage {
        DoneStage {
            hook: Rc::clone(&self.hook),
            next: reducer,
        }
    }
}

impl<T, V, F, R> Reducer<T> for DoneStage<F, R>
where
    F: Fn(&V) + 'static,
    V: 'static,
    R: Reducer<T, Output = V>,
{
    type Output = V;

    fn step(&mut self, input: T) -> Result<Step, Error> {
        self.next.step(input)
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<V>, Error> {
        let normal = error.is_none();
        let reduction = self.next.complete(error)?;
        if !normal {
            return Ok(reduction);
        }
        let hook = self.hook;
        Ok(reduction.map(move |value| {
            hook(&value);
            value
        }))
    }
}

/// Consume upstream errors.
pub struct Catch<F> {
    hook: Rc<F>,
}

impl<F> Clone for Catch<F> {
    fn clone(&self) -> Self {
        Self {
            hook: Rc::clone(&self.hook),
        }
    }
}

/// Run `hook` when the reduction ends with an upstream error. The error is
/// consumed: downstream stages complete normally. A normal completion skips
/// the hook.
pub fn err<F>(hook: F) -> Catch<F>
where
    F: Fn(&UpstreamError),
{
    Catch { hook: Rc::new(hook) }
}

/// Stage built by [`Catch`].
pub struct CatchStage<F, R> {
    hook: Rc<F>,
    next: R,
}

impl<T, F, R> Transducer<T, T, R> for Catch<F>
where
    F: Fn(&UpstreamError),
    R: Reducer<T>,
{
    type Stage = CatchStage<F, R>;

    fn apply(&self, reducer: R) -> Self::Stage {
        CatchStage {
            hook: Rc::clone(&self.hook),
            next: reducer,
        }
    }
}

impl<T, F, R> Reducer<T> for CatchStage<F, R>
where
    F: Fn(&UpstreamError),
    R: Reducer<T>,
{
    type Output = R::Output;

    fn step(&mut self, input: T) -> Result<Step, Error> {
        self.next.step(input)
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<R::Output>, Error> {
        if let Some(error) = &error {
            tracing::debug!(%error, "upstream error handled");
            (self.hook)(error);
        }
        self.next.complete(None)
    }
}
