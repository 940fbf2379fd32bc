//! Delimiter-separated parameter lists.

use crate::binding::ParseArg;
use crate::pattern::Pattern;
use complyscan_core::Result;

/// An ordered list parsed from a single argument by splitting on `SEP`.
///
/// Splitting happens before element parsing, so the delimiter may not
/// appear inside an element. Empty pieces are handed to the element parser
/// unchanged; it decides whether they are valid.
#[derive(Debug, Clone, PartialEq)]
pub struct Separated<T, const SEP: char> {
    items: Vec<T>,
}

impl<T, const SEP: char> Separated<T, SEP> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: ParseArg, const SEP: char> ParseArg for Separated<T, SEP> {
    fn parse_arg(raw: &str) -> Result<Self> {
        let mut items = Vec::new();
        for piece in raw.split(SEP) {
            items.push(T::parse_arg(piece)?);
        }
        Ok(Self { items })
    }
}

impl<'a, T, const SEP: char> IntoIterator for &'a Separated<T, SEP> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// `|`-separated regex list, the shape owner and group matchers take.
pub type Patterns = Separated<Pattern, '|'>;
