//! Block-list data model.

use std::collections::HashSet;

use relaymail_mime::{CanonicalAddress, canonicalize};

/// Set of canonical addresses that must never be forwarded to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockList {
    entries: HashSet<CanonicalAddress>,
}

impl BlockList {
    /// Creates an empty block list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the stored object body.
    ///
    /// Each non-blank line is canonicalized; duplicates collapse.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        body.lines()
            .filter(|line| !line.trim().is_empty())
            .map(canonicalize)
            .collect()
    }

    /// Serializes the list as stored: one address per line, each line
    /// newline-terminated, sorted.
    #[must_use]
    pub fn to_object_body(&self) -> String {
        let mut entries: Vec<&str> = self.entries.iter().map(CanonicalAddress::as_str).collect();
        entries.sort_unstable();
        entries.iter().map(|e| format!("{e}\n")).collect()
    }

    /// Returns true if `address` is blocked.
    #[must_use]
    pub fn contains(&self, address: &CanonicalAddress) -> bool {
        self.entries.contains(address)
    }

    /// Returns the first of `raw_addresses` that is blocked, canonicalized.
    #[must_use]
    pub fn first_blocked<I, S>(&self, raw_addresses: I) -> Option<CanonicalAddress>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw_addresses
            .into_iter()
            .map(|raw| canonicalize(raw.as_ref()))
            .find(|address| self.contains(address))
    }

    /// Adds an address. Returns true if it was not already present.
    pub fn insert(&mut self, address: CanonicalAddress) -> bool {
        self.entries.insert(address)
    }

    /// Number of blocked addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is blocked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the blocked addresses in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &CanonicalAddress> {
        self.entries.iter()
    }
}

impl FromIterator<CanonicalAddress> for BlockList {
    fn from_iter<T: IntoIterator<Item = CanonicalAddress>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<CanonicalAddress> for BlockList {
    fn extend<T: IntoIterator<Item = CanonicalAddress>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_canonicalizes() {
        let list = BlockList::parse("shady@mlctrez.com\nspam@mlctrez.com ");

        assert_eq!(list.len(), 2);
        assert!(list.contains(&canonicalize("shady@mlctrez.com")));
        assert!(list.contains(&canonicalize("spam@mlctrez.com")));
    }

    #[test]
    fn test_parse_skips_blank_lines_and_collapses_duplicates() {
        let list = BlockList::parse("\r\nA@Example.com\r\n\n  \nSpammer <a@example.com>\n");

        assert_eq!(list.len(), 1);
        assert!(list.contains(&canonicalize("a@example.com")));
    }

    #[test]
    fn test_object_body_is_sorted_and_terminated() {
        let list: BlockList = ["b@example.com", "a@example.com"]
            .into_iter()
            .map(canonicalize)
            .collect();

        assert_eq!(list.to_object_body(), "a@example.com\nb@example.com\n");
        assert_eq!(BlockList::parse(&list.to_object_body()), list);
        assert_eq!(BlockList::new().to_object_body(), "");
    }

    #[test]
    fn test_first_blocked() {
        let list = BlockList::parse("spam@example.com\n");

        assert_eq!(
            list.first_blocked(["ok@example.com", "Spam <SPAM@example.com>"]),
            Some(canonicalize("spam@example.com"))
        );
        assert_eq!(list.first_blocked(["ok@example.com"]), None);
        assert_eq!(list.first_blocked(Vec::<String>::new()), None);
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn stored_entries_block_every_spelling(
                local in "[a-z0-9]{1,12}",
                domain in "[a-z]{1,10}\\.(com|net|org)",
                name in "[A-Za-z]{1,10}",
            ) {
                let address = format!("{local}@{domain}");
                let list = BlockList::parse(&format!("  {}  \n", address.to_uppercase()));

                let spelled = format!("{name} <{}>", address.to_uppercase());
                prop_assert_eq!(list.first_blocked([spelled]), Some(canonicalize(&address)));
            }
        }
    }
}
