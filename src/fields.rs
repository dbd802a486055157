//! Tokenization of the whitespace-delimited text records shared by every
//! input format of this program

use std::str::{FromStr, SplitWhitespace};

/// Cursor over the fields of one text record
///
/// Runs of spaces and tabs are treated as a single separator, so irregularly
/// aligned files parse the same way as tab-delimited ones.
///
pub struct Fields<'line> {
    iter: SplitWhitespace<'line>,
}
//
impl<'line> Fields<'line> {
    /// Start reading the fields of a line
    pub fn new(line: &'line str) -> Self {
        Self {
            iter: line.split_whitespace(),
        }
    }

    /// Fetch the next raw field, if any
    pub fn next_str(&mut self) -> Option<&'line str> {
        self.iter.next()
    }

    /// Fetch and parse the next field
    ///
    /// Returns None both when the record is exhausted and when the field
    /// does not parse, since callers treat the two cases identically.
    ///
    pub fn next<T: FromStr>(&mut self) -> Option<T> {
        self.iter.next()?.parse::<T>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace() {
        let mut fields = Fields::new("  1ry_vtx \t 3    4.5\t\t7 ");
        assert_eq!(fields.next_str(), Some("1ry_vtx"));
        assert_eq!(fields.next::<i32>(), Some(3));
        assert_eq!(fields.next::<f64>(), Some(4.5));
        assert_eq!(fields.next::<i32>(), Some(7));
        assert_eq!(fields.next::<i32>(), None);
    }

    #[test]
    fn test_unparsable_field() {
        let mut fields = Fields::new("abc 12");
        assert_eq!(fields.next::<i32>(), None);
        assert_eq!(fields.next::<i32>(), Some(12));
    }
}
