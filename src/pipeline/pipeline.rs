use crate::error::{Error, UpstreamError};
use crate::reducer::{compose, Compose, Destination, Identity, Reducer, Reduction, Transducer};
use crate::source::{reduce, IntoSource};
use crate::transducer::{
    cat, cat_with, done, drop_first, drop_while, err, filter, map, mapcat, mapcat_with,
    match_first, scan, take, take_while, Candidate, Cat, Catch, Done, DropFirst, DropWhile,
    Filter, Join, Map, MapCat, MatchFirst, Scan, Sequential, Take, TakeWhile,
};
use std::marker::PhantomData;

/// Marker for a pipeline with no source bound yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// A chain of transducers from `I` to `O`, optionally bound to a source.
///
/// Every chaining method composes one more transducer onto the chain and
/// returns a new pipeline; the first method called transforms the values
/// closest to the source.
///
/// # Examples
///
/// ```
/// use sluice::flow;
///
/// let out = flow(vec![1, 2, 3, 4, 5, 6])
///     .filter(|x| *x <= 3)
///     .map(|x| x + 1)
///     .take(2)
///     .to(Vec::new())
///     .unwrap();
/// assert_eq!(out.ready(), Some(vec![2, 3]));
/// ```
pub struct Pipeline<I, O, X, S = Unbound> {
    xf: X,
    source: S,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O, X: Clone, S: Clone> Clone for Pipeline<I, O, X, S> {
    fn clone(&self) -> Self {
        Self {
            xf: self.xf.clone(),
            source: self.source.clone(),
            _types: PhantomData,
        }
    }
}

/// Start an unbound pipeline over values of type `T`.
pub fn pipeline<T>() -> Pipeline<T, T, Identity> {
    Pipeline {
        xf: Identity,
        source: Unbound,
        _types: PhantomData,
    }
}

/// Start a pipeline bound to `source`.
pub fn flow<S: IntoSource>(source: S) -> Pipeline<S::Item, S::Item, Identity, S> {
    Pipeline {
        xf: Identity,
        source,
        _types: PhantomData,
    }
}

impl<I, O, X, S> Pipeline<I, O, X, S> {
    fn then<Y, P>(self, next: Y) -> Pipeline<I, P, Compose<X, Y, O>, S> {
        Pipeline {
            xf: compose(self.xf, next),
            source: self.source,
            _types: PhantomData,
        }
    }

    /// Transform each value.
    pub fn map<F, P>(self, f: F) -> Pipeline<I, P, Compose<X, Map<F>, O>, S>
    where
        F: Fn(O) -> P,
    {
        self.then(map(f))
    }

    /// Keep the values matching `pred`.
    pub fn filter<P>(self, pred: P) -> Pipeline<I, O, Compose<X, Filter<P>, O>, S>
    where
        P: Fn(&O) -> bool,
    {
        self.then(filter(pred))
    }

    /// Pass the first `n` values, then stop.
    pub fn take(self, n: usize) -> Pipeline<I, O, Compose<X, Take, O>, S> {
        self.then(take(n))
    }

    /// Discard the first `n` values.
    pub fn drop(self, n: usize) -> Pipeline<I, O, Compose<X, DropFirst, O>, S> {
        self.then(drop_first(n))
    }

    /// Pass values while `pred` holds.
    pub fn take_while<P>(self, pred: P) -> Pipeline<I, O, Compose<X, TakeWhile<P>, O>, S>
    where
        P: Fn(&O) -> bool,
    {
        self.then(take_while(pred))
    }

    /// Skip values until `pred` first fails.
    pub fn drop_while<P>(self, pred: P) -> Pipeline<I, O, Compose<X, DropWhile<P>, O>, S>
    where
        P: Fn(&O) -> bool,
    {
        self.then(drop_while(pred))
    }

    /// Forward the result of the first matching candidate.
    pub fn match_first<P>(
        self,
        candidates: Vec<Candidate<O, P>>,
    ) -> Pipeline<I, P, Compose<X, MatchFirst<O, P>, O>, S> {
        self.then(match_first(candidates))
    }

    /// Forward a running accumulation.
    pub fn scan<A, F>(self, seed: A, f: F) -> Pipeline<I, A, Compose<X, Scan<A, F>, O>, S>
    where
        A: Clone,
        F: Fn(A, O) -> A,
    {
        self.then(scan(seed, f))
    }

    /// Observe the final value of a normal completion.
    pub fn done<V, F>(self, hook: F) -> Pipeline<I, O, Compose<X, Done<F, V>, O>, S>
    where
        F: Fn(&V),
    {
        self.then(done(hook))
    }

    /// Consume an upstream error.
    pub fn err<F>(self, hook: F) -> Pipeline<I, O, Compose<X, Catch<F>, O>, S>
    where
        F: Fn(&UpstreamError),
    {
        self.then(err(hook))
    }

    /// Flatten nested sources one at a time.
    pub fn cat(self) -> Pipeline<I, O::Item, Compose<X, Cat<Sequential>, O>, S>
    where
        O: IntoSource,
    {
        self.then(cat())
    }

    /// Flatten nested sources under `join`.
    pub fn cat_with<J: Join>(self, join: J) -> Pipeline<I, O::Item, Compose<X, Cat<J>, O>, S>
    where
        O: IntoSource,
    {
        self.then(cat_with(join))
    }

    /// Map each value to a nested source and flatten them one at a time.
    pub fn mapcat<F, T>(self, f: F) -> Pipeline<I, T::Item, Compose<X, MapCat<F, T, Sequential>, O>, S>
    where
        F: Fn(O) -> T,
        T: IntoSource,
    {
        self.then(mapcat(f))
    }

    /// Map each value to a nested source and flatten them under `join`.
    pub fn mapcat_with<F, T, J>(
        self,
        f: F,
        join: J,
    ) -> Pipeline<I, T::Item, Compose<X, MapCat<F, T, J>, O>, S>
    where
        F: Fn(O) -> T,
        T: IntoSource,
        J: Join,
    {
        self.then(mapcat_with(f, join))
    }

    /// Append another unbound pipeline's chain.
    pub fn comp<P, Y>(self, other: Pipeline<O, P, Y>) -> Pipeline<I, P, Compose<X, Y, O>, S> {
        self.then(other.xf)
    }

    /// The composed transducer.
    pub fn transducer(&self) -> &X {
        &self.xf
    }

    /// Take the composed transducer out of the pipeline.
    pub fn into_transducer(self) -> X {
        self.xf
    }

    /// Wrap the terminal reducer for `dest` in the whole chain.
    pub fn into_reducer<D>(&self, dest: D) -> X::Stage
    where
        D: Destination<O>,
        X: Transducer<I, O, D::Reducer>,
    {
        self.xf.apply(dest.into_reducer())
    }

    /// Drive `source` through the chain into `dest`.
    pub fn apply<T, D>(
        &self,
        source: T,
        dest: D,
    ) -> Result<Reduction<<D::Reducer as Reducer<O>>::Output>, Error>
    where
        T: IntoSource<Item = I>,
        I: Clone + 'static,
        D: Destination<O>,
        <D::Reducer as Reducer<O>>::Output: 'static,
        X: Transducer<I, O, D::Reducer>,
        X::Stage: 'static,
    {
        reduce(source, self.into_reducer(dest))
    }
}

impl<I, O, X, S> Pipeline<I, O, X, S>
where
    S: IntoSource<Item = I>,
{
    /// Drive the bound source through the chain into `dest`.
    ///
    /// A synchronous source is drained before this returns; a signal leaves
    /// the result pending until it completes.
    pub fn to<D>(self, dest: D) -> Result<Reduction<<D::Reducer as Reducer<O>>::Output>, Error>
    where
        I: Clone + 'static,
        D: Destination<O>,
        <D::Reducer as Reducer<O>>::Output: 'static,
        X: Transducer<I, O, D::Reducer>,
        X::Stage: 'static,
    {
        tracing::debug!("driving pipeline");
        reduce(self.source, self.xf.apply(dest.into_reducer()))
    }
}
