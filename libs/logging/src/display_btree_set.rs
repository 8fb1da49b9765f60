use std::{collections::BTreeSet, fmt};

/// Renders a [`BTreeSet`] as `[a, b, c]` for use in `tracing` field values (`%` not `?`), so a
/// set logged at a dial/resolve boundary reads the same as a `Vec` would.
pub struct DisplayBTreeSet<'a, T>(pub &'a BTreeSet<T>);

impl<T: fmt::Display> fmt::Display for DisplayBTreeSet<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;

        let mut items = self.0.iter();
        if let Some(first) = items.next() {
            write!(f, "{first}")?;
            for item in items {
                write!(f, ", {item}")?;
            }
        }

        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_an_empty_set() {
        let set: BTreeSet<u8> = BTreeSet::new();
        assert_eq!(DisplayBTreeSet(&set).to_string(), "[]");
    }

    #[test]
    fn renders_a_populated_set_in_sorted_order() {
        let set = BTreeSet::from([3, 1, 2]);
        assert_eq!(DisplayBTreeSet(&set).to_string(), "[1, 2, 3]");
    }
}
