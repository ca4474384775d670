use crate::error::{Error, UpstreamError};
use crate::signal::Signal;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;

/// A reducible source, tagged with its kind.
pub enum Source<T> {
    /// Ordered, finite sequence.
    Seq(Vec<T>),
    /// Pull iterator.
    Iter(Box<dyn Iterator<Item = T>>),
    /// Key/value entries, in enumeration order.
    Entries(Box<dyn Iterator<Item = T>>),
    /// Push source; driving it subscribes.
    Signal(Signal<T>),
    /// Pull iterator whose first `Err` ends the drive abnormally.
    Results(Box<dyn Iterator<Item = Result<T, UpstreamError>>>),
}

impl<T> Source<T> {
    /// Name of this source kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Source::Seq(_) => "sequence",
            Source::Iter(_) => "iterator",
            Source::Entries(_) => "entries",
            Source::Signal(_) => "signal",
            Source::Results(_) => "results",
        }
    }
}

/// Conversion into a [`Source`].
///
/// Conversion is where shape is checked: a value that is none of the
/// recognized kinds fails with [`Error::SourceShape`].
pub trait IntoSource {
    /// Element type the source yields.
    type Item;

    /// Classify `self` as a source.
    fn into_source(self) -> Result<Source<Self::Item>, Error>;
}

impl<T> IntoSource for Source<T> {
    type Item = T;

    fn into_source(self) -> Result<Source<T>, Error> {
        Ok(self)
    }
}

impl<T> IntoSource for Vec<T> {
    type Item = T;

    fn into_source(self) -> Result<Source<T>, Error> {
        Ok(Source::Seq(self))
    }
}

impl<T, const N: usize> IntoSource for [T; N] {
    type Item = T;

    fn into_source(self) -> Result<Source<T>, Error> {
        Ok(Source::Seq(Vec::from(self)))
    }
}

impl<T> IntoSource for Signal<T> {
    type Item = T;

    fn into_source(self) -> Result<Source<T>, Error> {
        Ok(Source::Signal(self))
    }
}

impl<K: 'static, V: 'static> IntoSource for IndexMap<K, V> {
    type Item = (K, V);

    fn into_source(self) -> Result<Source<(K, V)>, Error> {
        Ok(Source::Entries(Box::new(self.into_iter())))
    }
}

impl<K: 'static, V: 'static> IntoSource for BTreeMap<K, V> {
    type Item = (K, V);

    fn into_source(self) -> Result<Source<(K, V)>, Error> {
        Ok(Source::Entries(Box::new(self.into_iter())))
    }
}

/// Arrays are sequences and objects yield `[key, value]` entries; scalars
/// are not reducible.
impl IntoSource for Value {
    type Item = Value;

    fn into_source(self) -> Result<Source<Value>, Error> {
        match self {
            Value::Array(items) => Ok(Source::Seq(items)),
            Value::Object(map) => Ok(Source::Entries(Box::new(
                map.into_iter()
                    .map(|(key, value)| Value::Array(vec![Value::String(key), value])),
            ))),
            Value::Null => Err(Error::SourceShape { found: "null" }),
            Value::Bool(_) => Err(Error::SourceShape { found: "boolean" }),
            Value::Number(_) => Err(Error::SourceShape { found: "number" }),
            Value::String(_) => Err(Error::SourceShape { found: "string" }),
        }
    }
}

/// A pull iterator wrapped as a source. See [`iter`].
pub struct Pull<I>(I);

/// Drive any iterator as a pull source.
pub fn iter<I>(items: I) -> Pull<I::IntoIter>
where
    I: IntoIterator,
{
    Pull(items.into_iter())
}

/// Pull source yielding `0..n`.
pub fn range(n: usize) -> Pull<std::ops::Range<usize>> {
    Pull(0..n)
}

impl<I> IntoSource for Pull<I>
where
    I: Iterator + 'static,
{
    type Item = I::Item;

    fn into_source(self) -> Result<Source<I::Item>, Error> {
        Ok(Source::Iter(Box::new(self.0)))
    }
}

/// A fallible pull iterator wrapped as a source. See [`results`].
pub struct Fallible<I>(I);

/// Drive an iterator of results; the first `Err` ends the drive and becomes
/// the completion's error.
pub fn results<I, T>(items: I) -> Fallible<I::IntoIter>
where
    I: IntoIterator<Item = Result<T, UpstreamError>>,
{
    Fallible(items.into_iter())
}

impl<I, T> IntoSource for Fallible<I>
where
    I: Iterator<Item = Result<T, UpstreamError>> + 'static,
{
    type Item = T;

    fn into_source(self) -> Result<Source<T>, Error> {
        Ok(Source::Results(Box::new(self.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_scalars_are_rejected() {
        let err = json!(3).into_source().err();
        assert_eq!(err, Some(Error::SourceShape { found: "number" }));
    }

    #[test]
    fn json_objects_become_entries() {
        let source = json!({"a": 1}).into_source().unwrap();
        assert_eq!(source.kind(), "entries");
        match source {
            Source::Entries(mut entries) => {
                assert_eq!(entries.next(), Some(json!(["a", 1])));
                assert_eq!(entries.next(), None);
            }
            _ => panic!("expected entries"),
        }
    }

    #[test]
    fn kinds_are_tagged() {
        assert_eq!(vec![1].into_source().unwrap().kind(), "sequence");
        assert_eq!(range(3).into_source().unwrap().kind(), "iterator");
        assert_eq!(Signal::<i32>::new().into_source().unwrap().kind(), "signal");
    }
}
