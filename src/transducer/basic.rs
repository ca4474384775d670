use crate::error::{Error, UpstreamError};
use crate::reducer::{Reducer, Reduction, Step, Transducer};
use std::rc::Rc;

/// Transform each value with `f`.
pub struct Map<F> {
    f: Rc<F>,
}

impl<F> Clone for Map<F> {
    fn clone(&self) -> Self {
        Self { f: Rc::clone(&self.f) }
    }
}

/// Transform each value with `f`. Downstream stop requests pass through.
pub fn map<F>(f: F) -> Map<F> {
    Map { f: Rc::new(f) }
}

/// Stage built by [`Map`].
pub struct MapStage<F, R> {
    f: Rc<F>,
    next: R,
}

impl<I, O, F, R> Transducer<I, O, R> for Map<F>
where
    F: Fn(I) -> O,
    R: Reducer<O>,
{
    type Stage = MapStage<F, R>;

    fn apply(&self, reducer: R) -> Self::Stage {
        MapStage {
            f: Rc::clone(&self.f),
            next: reducer,
        }
    }
}

impl<I, O, F, R> Reducer<I> for MapStage<F, R>
where
    F: Fn(I) -> O,
    R: Reducer<O>,
{
    type Output = R::Output;

    fn step(&mut self, input: I) -> Result<Step, Error> {
        self.next.step((self.f)(input))
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<R::Output>, Error> {
        self.next.complete(error)
    }
}

/// Keep the values matching a predicate.
pub struct Filter<P> {
    pred: Rc<P>,
}

impl<P> Clone for Filter<P> {
    fn clone(&self) -> Self {
        Self {
            pred: Rc::clone(&self.pred),
        }
    }
}

/// Drop every value for which `pred` is false. Never requests stop itself.
pub fn filter<P>(pred: P) -> Filter<P> {
    Filter { pred: Rc::new(pred) }
}

/// Stage built by [`Filter`].
pub struct FilterStage<P, R> {
    pred: Rc<P>,
    next: R,
}

impl<T, P, R> Transducer<T, T, R> for Filter<P>
where
    P: Fn(&T) -> bool,
    R: Reducer<T>,
{
    type Stage = FilterStage<P, R>;

    fn apply(&self, reducer: R) -> Self::Stage {
        FilterStage {
            pred: Rc::clone(&self.pred),
            next: reducer,
        }
    }
}

impl<T, P, R> Reducer<T> for FilterStage<P, R>
where
    P: Fn(&T) -> bool,
    R: Reducer<T>,
{
    type Output = R::Output;

    fn step(&mut self, input: T) -> Result<Step, Error> {
        if (self.pred)(&input) {
            self.next.step(input)
        } else {
            Ok(Step::Continue)
        }
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<R::Output>, Error> {
        self.next.complete(error)
    }
}

/// Pass the first `n` values, then stop.
#[derive(Debug, Clone, Copy)]
pub struct Take {
    n: usize,
}

/// Pass up to `n` values; the `n`th value is delivered before stop is
/// requested. `take(0)` passes nothing.
pub fn take(n: usize) -> Take {
    Take { n }
}

/// Stage built by [`Take`]; counts down the values still allowed.
pub struct TakeStage<R> {
    remaining: usize,
    next: R,
}

impl<T, R: Reducer<T>> Transducer<T, T, R> for Take {
    type Stage = TakeStage<R>;

    fn apply(&self, reducer: R) -> Self::Stage {
        TakeStage {
            remaining: self.n,
            next: reducer,
        }
    }
}

impl<T, R: Reducer<T>> Reducer<T> for TakeStage<R> {
    type Output = R::Output;

    fn step(&mut self, input: T) -> Result<Step, Error> {
        if self.remaining == 0 {
            return Ok(Step::Stop);
        }
        self.remaining -= 1;
        let step = self.next.step(input)?;
        Ok(Step::stop_if(self.remaining == 0 || step.is_stop()))
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<R::Output>, Error> {
        self.next.complete(error)
    }
}

/// Discard the first `n` values.
#[derive(Debug, Clone, Copy)]
pub struct DropFirst {
    n: usize,
}

/// Discard the first `n` values and pass the rest.
pub fn drop_first(n: usize) -> DropFirst {
    DropFirst { n }
}

/// Stage built by [`DropFirst`].
pub struct DropStage<R> {
    remaining: usize,
    next: R,
}

impl<T, R: Reducer<T>> Transducer<T, T, R> for DropFirst {
    type Stage = DropStage<R>;

    fn apply(&self, reducer: R) -> Self::Stage {
        DropStage {
            remaining: self.n,
            next: reducer,
        }
    }
}

impl<T, R: Reducer<T>> Reducer<T> for DropStage<R> {
    type Output = R::Output;

    fn step(&mut self, input: T) -> Result<Step, Error> {
        if self.remaining > 0 {
            self.remaining -= 1;
            return Ok(Step::Continue);
        }
        self.next.step(input)
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<R::Output>, Error> {
        self.next.complete(error)
    }
}

/// Pass values while a predicate holds.
pub struct TakeWhile<P> {
    pred: Rc<P>,
}

impl<P> Clone for TakeWhile<P> {
    fn clone(&self) -> Self {
        Self {
            pred: Rc::clone(&self.pred),
        }
    }
}

/// Pass values while `pred` holds; the first failing value is not passed and
/// requests stop.
pub fn take_while<P>(pred: P) -> TakeWhile<P> {
    TakeWhile { pred: Rc::new(pred) }
}

/// Stage built by [`TakeWhile`].
pub struct TakeWhileStage<P, R> {
    pred: Rc<P>,
    next: R,
}

impl<T, P, R> Transducer<T, T, R> for TakeWhile<P>
where
    P: Fn(&T) -> bool,
    R: Reducer<T>,
{
    type Stage = TakeWhileStage<P, R>;

    fn apply(&self, reducer: R) -> Self::Stage {
        TakeWhileStage {
            pred: Rc::clone(&self.pred),
            next: reducer,
        }
    }
}

impl<T, P, R> Reducer<T> for TakeWhileStage<P, R>
where
    P: Fn(&T) -> bool,
    R: Reducer<T>,
{
    type Output = R::Output;

    fn step(&mut self, input: T) -> Result<Step, Error> {
        if (self.pred)(&input) {
            self.next.step(input)
        } else {
            Ok(Step::Stop)
        }
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<R::Output>, Error> {
        self.next.complete(error)
    }
}

/// Skip values while a predicate holds.
pub struct DropWhile<P> {
    pred: Rc<P>,
}

impl<P> Clone for DropWhile<P> {
    fn clone(&self) -> Self {
        Self {
            pred: Rc::clone(&self.pred),
        }
    }
}

/// Skip values until `pred` first fails, then pass everything.
pub fn drop_while<P>(pred: P) -> DropWhile<P> {
    DropWhile { pred: Rc::new(pred) }
}

/// Stage built by [`DropWhile`]; latches open at the first failing value.
pub struct DropWhileStage<P, R> {
    pred: Rc<P>,
    passing: bool,
    next: R,
}

impl<T, P, R> Transducer<T, T, R> for DropWhile<P>
where
    P: Fn(&T) -> bool,
    R: Reducer<T>,
{
    type Stage = DropWhileStage<P, R>;

    fn apply(&self, reducer: R) -> Self::Stage {
        DropWhileStage {
            pred: Rc::clone(&self.pred),
            passing: false,
            next: reducer,
        }
    }
}

impl<T, P, R> Reducer<T> for DropWhileStage<P, R>
where
    P: Fn(&T) -> bool,
    R: Reducer<T>,
{
    type Output = R::Output;

    fn step(&mut self, input: T) -> Result<Step, Error> {
        // Latches: once passing, the predicate is never consulted again.
        if !self.passing && (self.pred)(&input) {
            return Ok(Step::Continue);
        }
        self.passing = true;
        self.next.step(input)
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<R::Output>, Error> {
        self.next.complete(error)
    }
}

/// One candidate of [`match_first`].
pub type Candidate<I, O> = Box<dyn Fn(&I) -> Option<O>>;

/// Forward the result of the first matching candidate.
pub struct MatchFirst<I, O> {
    candidates: Rc<[Candidate<I, O>]>,
}

impl<I, O> Clone for MatchFirst<I, O> {
    fn clone(&self) -> Self {
        Self {
            candidates: Rc::clone(&self.candidates),
        }
    }
}

/// Try each candidate in order and forward the first `Some`. A value no
/// candidate matches produces no output.
///
/// # Examples
///
/// ```
/// use sluice::transducer::{match_first, Candidate};
/// use sluice::flow;
///
/// let candidates: Vec<Candidate<i32, String>> = vec![
///     Box::new(|x: &i32| (x % 2 == 0).then(|| format!("even {x}"))),
///     Box::new(|x: &i32| (*x > 4).then(|| format!("big {x}"))),
/// ];
/// let out = flow(vec![1, 2, 5])
///     .match_first(candidates)
///     .to(Vec::new())
///     .unwrap();
/// assert_eq!(out.ready(), Some(vec!["even 2".to_string(), "big 5".to_string()]));
/// ```
pub fn match_first<I, O>(candidates: Vec<Candidate<I, O>>) -> MatchFirst<I, O> {
    MatchFirst {
        candidates: candidates.into(),
    }
}

/// Stage built by [`MatchFirst`].
pub struct MatchStage<I, O, R> {
    candidates: Rc<[Candidate<I, O>]>,
    next: R,
}

impl<I, O, R: Reducer<O>> Transducer<I, O, R> for MatchFirst<I, O> {
    type Stage = MatchStage<I, O, R>;

    fn apply(&self, reducer: R) -> Self::Stage {
        MatchStage {
            candidates: Rc::clone(&self.candidates),
            next: reducer,
        }
    }
}

impl<I, O, R: Reducer<O>> Reducer<I> for MatchStage<I, O, R> {
    type Output = R::Output;

    fn step(&mut self, input: I) -> Result<Step, Error> {
        match self.candidates.iter().find_map(|candidate| candidate(&input)) {
            Some(output) => self.next.step(output),
            None => Ok(Step::Continue),
        }
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<R::Output>, Error> {
        self.next.complete(error)
    }
}

/// Running accumulation forwarded after every value.
pub struct Scan<A, F> {
    seed: A,
    f: Rc<F>,
}

impl<A: Clone, F> Clone for Scan<A, F> {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed.clone(),
            f: Rc::clone(&self.f),
        }
    }
}

/// Fold each value into an accumulator starting at `seed` and forward the
/// accumulator after every step.
pub fn scan<A, F>(seed: A, f: F) -> Scan<A, F> {
    Scan { seed, f: Rc::new(f) }
}

/// Stage built by [`Scan`]; owns the running accumulator.
pub struct ScanStage<A, F, R> {
    acc: A,
    f: Rc<F>,
    next: R,
}

impl<I, A, F, R> Transducer<I, A, R> for Scan<A, F>
where
    A: Clone,
    F: Fn(A, I) -> A,
    R: Reducer<A>,
{
    type Stage = ScanStage<A, F, R>;

    fn apply(&self, reducer: R) -> Self::Stage {
        ScanStage {
            acc: self.seed.clone(),
            f: Rc::clone(&self.f),
            next: reducer,
        }
    }
}

impl<I, A, F, R> Reducer<I> for ScanStage<A, F, R>
where
    A: Clone,
    F: Fn(A, I) -> A,
    R: Reducer<A>,
{
    type Output = R::Output;

    fn step(&mut self, input: I) -> Result<Step, Error> {
        let acc = (self.f)(self.acc.clone(), input);
        self.acc = acc.clone();
        self.next.step(acc)
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<R::Output>, Error> {
        self.next.complete(error)
    }
}
