//! Dotted-path field extraction.
//!
//! A selector such as `acceleration.x` names a nested field of an event
//! record. Resolving a list of selectors yields exactly one
//! `(selector, value)` pair per selector, in order. A path that runs into
//! a missing key or a non-structured value resolves to `None`; that is a
//! normal outcome, not an error.

use serde_json::Value;

/// Separator between path segments.
pub const PATH_DELIMITER: char = '.';

/// Resolve one selector against a record.
///
/// JSON `null` at the end of the path counts as absent.
pub fn lookup<'v>(record: &'v Value, selector: &str) -> Option<&'v Value> {
    let mut current = record;
    for segment in selector.split(PATH_DELIMITER) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match current {
        Value::Null => None,
        value => Some(value),
    }
}

/// Lazily resolve `selectors` against `record`.
pub fn resolve<'v, 's, I, S>(record: &'v Value, selectors: I) -> ResolvedFields<'v, I::IntoIter>
where
    I: IntoIterator<Item = &'s S>,
    S: AsRef<str> + ?Sized + 's,
{
    ResolvedFields {
        record,
        selectors: selectors.into_iter(),
    }
}

/// Iterator of `(selector, value)` pairs produced by [`resolve`].
///
/// Holds no state beyond the position in the selector list, so cloning
/// it restarts resolution from the same point.
#[derive(Debug, Clone)]
pub struct ResolvedFields<'v, I> {
    record: &'v Value,
    selectors: I,
}

impl<'v, 's, I, S> Iterator for ResolvedFields<'v, I>
where
    I: Iterator<Item = &'s S>,
    S: AsRef<str> + ?Sized + 's,
{
    type Item = (&'s str, Option<&'v Value>);

    fn next(&mut self) -> Option<Self::Item> {
        let selector = self.selectors.next()?.as_ref();
        Some((selector, lookup(self.record, selector)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.selectors.size_hint()
    }
}

impl<'v, 's, I, S> ExactSizeIterator for ResolvedFields<'v, I>
where
    I: ExactSizeIterator<Item = &'s S>,
    S: AsRef<str> + ?Sized + 's,
{
}
