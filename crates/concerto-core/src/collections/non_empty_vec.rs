//! Non-empty vector used for pattern step, task and participant lists.
//!
//! A sequential pattern with no steps or a discussion with no participants
//! has no meaningful output, so the pattern types hold their lists as
//! `NonEmptyVec` and the empty case is rejected when the pattern is built.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// A vector that is guaranteed to contain at least one element.
///
/// ```rust
/// use concerto_core::collections::NonEmptyVec;
///
/// let steps = NonEmptyVec::new("first", vec!["second", "third"]);
/// assert_eq!(steps[0], "first");
/// assert_eq!(steps.len(), 3);
///
/// assert!(NonEmptyVec::<u8>::try_from(Vec::new()).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<T>", into = "Vec<T>")]
#[serde(bound(
    serialize = "T: Clone + Serialize",
    deserialize = "T: Deserialize<'de>"
))]
pub struct NonEmptyVec<T: Clone>(Vec<T>);

impl<T: Clone> NonEmptyVec<T> {
    /// Create a non-empty vector from a head element and the remaining elements.
    pub fn new(head: T, tail: Vec<T>) -> Self {
        let mut items = Vec::with_capacity(tail.len() + 1);
        items.push(head);
        items.extend(tail);
        Self(items)
    }

    /// Create a non-empty vector with a single element.
    pub fn singleton(value: T) -> Self {
        Self(vec![value])
    }

    /// Number of elements (never zero).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Iterate in order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    /// Borrow as a slice.
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    /// Apply `f` to every element, keeping the list non-empty.
    pub fn map<U: Clone>(self, f: impl FnMut(T) -> U) -> NonEmptyVec<U> {
        NonEmptyVec(self.0.into_iter().map(f).collect())
    }
}

impl<T: Clone> TryFrom<Vec<T>> for NonEmptyVec<T> {
    type Error = EmptyVecError;

    fn try_from(vec: Vec<T>) -> Result<Self, Self::Error> {
        if vec.is_empty() {
            Err(EmptyVecError)
        } else {
            Ok(Self(vec))
        }
    }
}

impl<T: Clone> From<NonEmptyVec<T>> for Vec<T> {
    fn from(non_empty: NonEmptyVec<T>) -> Self {
        non_empty.0
    }
}

impl<T: Clone> Index<usize> for NonEmptyVec<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<T: Clone> IntoIterator for NonEmptyVec<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, T: Clone> IntoIterator for &'a NonEmptyVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Error type for attempting to create a `NonEmptyVec` from an empty `Vec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyVecError;

impl fmt::Display for EmptyVecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "list must contain at least one element")
    }
}

impl std::error::Error for EmptyVecError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keeps_order() {
        let v = NonEmptyVec::new(1, vec![2, 3]);
        assert_eq!(v.as_slice(), &[1, 2, 3]);
        assert_eq!(v[1], 2);
    }

    #[test]
    fn test_singleton() {
        let v = NonEmptyVec::singleton("only");
        assert_eq!(v.len(), 1);
        assert_eq!(v[0], "only");
    }

    #[test]
    fn test_map_preserves_length() {
        let v = NonEmptyVec::new(1, vec![2]).map(|n| n * 10);
        assert_eq!(Vec::from(v), vec![10, 20]);
    }

    #[test]
    fn test_try_from_empty_fails() {
        assert_eq!(NonEmptyVec::<i32>::try_from(vec![]), Err(EmptyVecError));
    }

    #[test]
    fn test_serde_as_plain_list() {
        let v = NonEmptyVec::new("a".to_string(), vec!["b".to_string()]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"["a","b"]"#);

        let back: NonEmptyVec<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<NonEmptyVec<String>>("[]").is_err());
    }
}
