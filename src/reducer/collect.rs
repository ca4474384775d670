use super::completion::Reduction;
use super::reducer::{Reducer, Step};
use crate::error::{Error, UpstreamError};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::hash::Hash;
use std::marker::PhantomData;

/// Something a pipeline can drain into.
///
/// Vectors append, maps merge `(key, value)` entries, dynamic JSON values do
/// either depending on their shape, and the reducers in this module are used
/// as they are.
pub trait Destination<T> {
    /// The terminal reducer that accumulates into this destination.
    type Reducer: Reducer<T> + 'static;

    /// Build the terminal reducer.
    fn into_reducer(self) -> Self::Reducer;
}

fn finish<O>(value: O, error: Option<UpstreamError>) -> Result<Reduction<O>, Error> {
    match error {
        Some(error) => Err(error.into()),
        None => Ok(Reduction::Ready(value)),
    }
}

/// Appends every value to a vector.
pub struct Collect<T> {
    items: Vec<T>,
}

impl<T> Reducer<T> for Collect<T> {
    type Output = Vec<T>;

    fn step(&mut self, input: T) -> Result<Step, Error> {
        self.items.push(input);
        Ok(Step::Continue)
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<Vec<T>>, Error> {
        finish(self.items, error)
    }
}

impl<T: 'static> Destination<T> for Vec<T> {
    type Reducer = Collect<T>;

    fn into_reducer(self) -> Collect<T> {
        Collect { items: self }
    }
}

/// A map that `(key, value)` entries can be merged into.
pub trait PairSink {
    /// Key type of the map.
    type Key;
    /// Value type of the map.
    type Value;

    /// Insert or overwrite one entry.
    fn insert_pair(&mut self, key: Self::Key, value: Self::Value);
}

impl<K: Hash + Eq, V> PairSink for IndexMap<K, V> {
    type Key = K;
    type Value = V;

    fn insert_pair(&mut self, key: K, value: V) {
        self.insert(key, value);
    }
}

impl<K: Ord, V> PairSink for BTreeMap<K, V> {
    type Key = K;
    type Value = V;

    fn insert_pair(&mut self, key: K, value: V) {
        self.insert(key, value);
    }
}

/// A value that can be merged into a map: a single pair, or a collection of
/// mergeable values, merged recursively.
pub trait Entries<K, V> {
    /// Merge every entry of `self` into `dest`.
    fn merge_into<S: PairSink<Key = K, Value = V>>(self, dest: &mut S);
}

impl<K, V> Entries<K, V> for (K, V) {
    fn merge_into<S: PairSink<Key = K, Value = V>>(self, dest: &mut S) {
        dest.insert_pair(self.0, self.1);
    }
}

impl<K, V, E: Entries<K, V>> Entries<K, V> for Vec<E> {
    fn merge_into<S: PairSink<Key = K, Value = V>>(self, dest: &mut S) {
        for entry in self {
            entry.merge_into(dest);
        }
    }
}

impl<K, V> Entries<K, V> for IndexMap<K, V> {
    fn merge_into<S: PairSink<Key = K, Value = V>>(self, dest: &mut S) {
        for (key, value) in self {
            dest.insert_pair(key, value);
        }
    }
}

/// Merges every emitted entry into a map.
pub struct Merge<M, T> {
    map: M,
    _entry: PhantomData<fn(T)>,
}

impl<M, T> Reducer<T> for Merge<M, T>
where
    M: PairSink,
    T: Entries<M::Key, M::Value>,
{
    type Output = M;

    fn step(&mut self, input: T) -> Result<Step, Error> {
        input.merge_into(&mut self.map);
        Ok(Step::Continue)
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<M>, Error> {
        finish(self.map, error)
    }
}

impl<K, V, T> Destination<T> for IndexMap<K, V>
where
    K: Hash + Eq + 'static,
    V: 'static,
    T: Entries<K, V> + 'static,
{
    type Reducer = Merge<IndexMap<K, V>, T>;

    fn into_reducer(self) -> Self::Reducer {
        Merge {
            map: self,
            _entry: PhantomData,
        }
    }
}

impl<K, V, T> Destination<T> for BTreeMap<K, V>
where
    K: Ord + 'static,
    V: 'static,
    T: Entries<K, V> + 'static,
{
    type Reducer = Merge<BTreeMap<K, V>, T>;

    fn into_reducer(self) -> Self::Reducer {
        Merge {
            map: self,
            _entry: PhantomData,
        }
    }
}

/// Accumulates into a dynamic JSON value.
///
/// An object destination merges pairs: a two-element array whose first
/// element is a string or number is one `[key, value]` entry, any other array
/// or object is merged recursively, and scalars carry no entries. Any other
/// destination appends, starting from an empty array when it is not one.
pub enum JsonCollect {
    /// Merging `[key, value]` entries into an object.
    Merge(Map<String, Value>),
    /// Appending to an array.
    Append(Vec<Value>),
}

impl Destination<Value> for Value {
    type Reducer = JsonCollect;

    fn into_reducer(self) -> JsonCollect {
        match self {
            Value::Object(map) => JsonCollect::Merge(map),
            Value::Array(items) => JsonCollect::Append(items),
            _ => JsonCollect::Append(Vec::new()),
        }
    }
}

fn merge_json(value: Value, dest: &mut Map<String, Value>) {
    match value {
        Value::Array(mut pair) if is_pair(&pair) => {
            let value = pair.pop().unwrap_or(Value::Null);
            let key = match pair.pop() {
                Some(Value::String(key)) => key,
                Some(other) => other.to_string(),
                None => return,
            };
            dest.insert(key, value);
        }
        Value::Array(items) => items.into_iter().for_each(|item| merge_json(item, dest)),
        Value::Object(entries) => dest.extend(entries),
        scalar => tracing::trace!(%scalar, "scalar carries no entries to merge"),
    }
}

fn is_pair(items: &[Value]) -> bool {
    items.len() == 2 && (items[0].is_string() || items[0].is_number())
}

impl Reducer<Value> for JsonCollect {
    type Output = Value;

    fn step(&mut self, input: Value) -> Result<Step, Error> {
        match self {
            JsonCollect::Merge(map) => merge_json(input, map),
            JsonCollect::Append(items) => items.push(input),
        }
        Ok(Step::Continue)
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<Value>, Error> {
        let dest = match self {
            JsonCollect::Merge(map) => Value::Object(map),
            JsonCollect::Append(items) => Value::Array(items),
        };
        finish(dest, error)
    }
}

/// Left fold from a seed. Never stops early; completion yields the accumulator.
pub struct Fold<A, F, T> {
    acc: Option<A>,
    f: F,
    _input: PhantomData<fn(T)>,
}

/// Fold every value into `seed` with `f(acc, input)`.
pub fn fold<A, F, T>(seed: A, f: F) -> Fold<A, F, T>
where
    F: FnMut(A, T) -> A,
{
    Fold {
        acc: Some(seed),
        f,
        _input: PhantomData,
    }
}

impl<A, F, T> Reducer<T> for Fold<A, F, T>
where
    F: FnMut(A, T) -> A,
{
    type Output = A;

    fn step(&mut self, input: T) -> Result<Step, Error> {
        if let Some(acc) = self.acc.take() {
            self.acc = Some((self.f)(acc, input));
        }
        Ok(Step::Continue)
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<A>, Error> {
        match self.acc {
            Some(acc) => finish(acc, error),
            None => unreachable!("fold accumulator is restored after every step"),
        }
    }
}

impl<A: 'static, F, T: 'static> Destination<T> for Fold<A, F, T>
where
    F: FnMut(A, T) -> A + 'static,
{
    type Reducer = Self;

    fn into_reducer(self) -> Self {
        self
    }
}

/// Calls a function for every value.
pub struct ForEach<F, T> {
    f: F,
    _input: PhantomData<fn(T)>,
}

/// A terminal reducer that hands every value to `f`.
pub fn for_each<F, T>(f: F) -> ForEach<F, T>
where
    F: FnMut(T),
{
    ForEach {
        f,
        _input: PhantomData,
    }
}

impl<F, T> Reducer<T> for ForEach<F, T>
where
    F: FnMut(T),
{
    type Output = ();

    fn step(&mut self, input: T) -> Result<Step, Error> {
        (self.f)(input);
        Ok(Step::Continue)
    }

    fn complete(self, error: Option<UpstreamError>) -> Result<Reduction<()>, Error> {
        finish((), error)
    }
}

impl<F, T: 'static> Destination<T> for ForEach<F, T>
where
    F: FnMut(T) + 'static,
{
    type Reducer = Self;

    fn into_reducer(self) -> Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain<T, D: Destination<T>>(dest: D, items: Vec<T>) -> <D::Reducer as Reducer<T>>::Output
    where
        <D::Reducer as Reducer<T>>::Output: 'static,
    {
        let mut reducer = dest.into_reducer();
        for item in items {
            reducer.step(item).unwrap();
        }
        reducer.complete(None).unwrap().ready().unwrap()
    }

    #[test]
    fn vec_appends() {
        assert_eq!(drain(vec![0], vec![1, 2]), vec![0, 1, 2]);
    }

    #[test]
    fn index_map_merges_pairs_in_order() {
        let merged = drain(IndexMap::<&str, i32>::new(), vec![("b", 2), ("a", 1), ("b", 3)]);
        assert_eq!(merged.into_iter().collect::<Vec<_>>(), vec![("b", 3), ("a", 1)]);
    }

    #[test]
    fn nested_pair_collections_merge_recursively() {
        let merged: BTreeMap<&str, i32> = drain(
            BTreeMap::new(),
            vec![vec![("a", 1)], vec![("b", 2), ("c", 3)]],
        );
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["c"], 3);
    }

    #[test]
    fn json_object_destination_merges() {
        let merged = drain(
            json!({}),
            vec![json!(["a", 1]), json!([["b", 2], ["c", 3]]), json!({"d": 4}), json!(5)],
        );
        assert_eq!(merged, json!({"a": 1, "b": 2, "c": 3, "d": 4}));
    }

    #[test]
    fn json_scalar_destination_collects_into_array() {
        assert_eq!(drain(Value::Null, vec![json!(1), json!("x")]), json!([1, "x"]));
    }

    #[test]
    fn fold_sums() {
        assert_eq!(drain(fold(10, |acc, x: i32| acc + x), vec![1, 2, 3]), 16);
    }

    #[test]
    fn upstream_error_surfaces_from_collector() {
        let reducer = Vec::<i32>::new().into_reducer();
        let err = reducer.complete(Some(UpstreamError::new("lost"))).unwrap_err();
        assert_eq!(err, Error::Upstream(UpstreamError::new("lost")));
    }
}
