//! Email address types.
//!
//! [`canonicalize`] is the single entry point used for every address
//! comparison: envelope recipients against the block list, the envelope
//! sender against the relay owner, and block-list entries read back from
//! storage.

use std::borrow::Borrow;
use std::fmt;

use crate::error::{Error, Result};

/// Characters allowed in a dot-atom besides alphanumerics.
const ATEXT_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~";

/// Characters that may not appear in an unquoted display name.
const PHRASE_SPECIALS: &str = "()<>[]:;@\\,\"";

/// Bare email address (`local@domain`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(addr: &str) -> Result<()> {
        if addr.is_empty() {
            return Err(Error::InvalidAddress("Address cannot be empty".into()));
        }

        let Some((local, domain)) = addr.split_once('@') else {
            return Err(Error::InvalidAddress(format!("{addr}: missing @")));
        };

        if local.is_empty() || domain.is_empty() {
            return Err(Error::InvalidAddress(format!(
                "{addr}: local and domain parts cannot be empty"
            )));
        }

        if !is_dot_atom(local) {
            return Err(Error::InvalidAddress(format!("{addr}: invalid local part")));
        }

        if !is_dot_atom(domain) {
            return Err(Error::InvalidAddress(format!("{addr}: invalid domain")));
        }

        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dot-separated, non-empty runs of atext.
fn is_dot_atom(s: &str) -> bool {
    s.split('.').all(|atom| {
        !atom.is_empty()
            && atom
                .chars()
                .all(|c| c.is_alphanumeric() || ATEXT_SPECIALS.contains(c))
    })
}

/// Mailbox (optional display name + address).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name (optional).
    pub name: Option<String>,
    /// Email address.
    pub address: Address,
}

impl Mailbox {
    /// Creates a new mailbox with just an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: None,
            address: Address::new(address)?,
        })
    }

    /// Parses a single address header value.
    ///
    /// Accepts a bare `local@domain`, an angle-bracketed `<local@domain>`
    /// and the `Display Name <local@domain>` / `"Display Name" <local@domain>`
    /// forms. Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not exactly one well-formed mailbox.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();

        let Some(inner) = raw.strip_suffix('>') else {
            return Self::new(raw);
        };

        let Some((phrase, addr)) = inner.rsplit_once('<') else {
            return Err(Error::InvalidAddress(format!("{raw}: unbalanced angle brackets")));
        };

        let address = Address::new(addr.trim())?;
        let name = parse_display_name(phrase.trim())?;

        Ok(Self { name, address })
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "\"{}\" <{}>", name.replace('"', "\\\""), self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

fn parse_display_name(phrase: &str) -> Result<Option<String>> {
    if phrase.is_empty() {
        return Ok(None);
    }

    if let Some(quoted) = phrase.strip_prefix('"').and_then(|p| p.strip_suffix('"')) {
        let mut name = String::with_capacity(quoted.len());
        let mut chars = quoted.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(escaped) => name.push(escaped),
                    None => return Err(Error::InvalidDisplayName(phrase.to_string())),
                },
                '"' => return Err(Error::InvalidDisplayName(phrase.to_string())),
                other => name.push(other),
            }
        }
        return Ok(Some(name));
    }

    if phrase.chars().any(|c| PHRASE_SPECIALS.contains(c)) {
        return Err(Error::InvalidDisplayName(phrase.to_string()));
    }

    Ok(Some(phrase.split_whitespace().collect::<Vec<_>>().join(" ")))
}

/// Lowercase, trimmed bare address used for every comparison and for
/// persisted block-list entries.
///
/// Values that do not parse as a mailbox keep their trimmed, lowercased
/// literal form, so a `CanonicalAddress` may not be a valid address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CanonicalAddress(String);

impl CanonicalAddress {
    /// Returns the canonical form as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the canonical form of an empty or blank value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CanonicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CanonicalAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CanonicalAddress {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Reduces a free-form address header value to its canonical form.
///
/// Parsed mailboxes yield their lowercased bare address; anything else yields
/// the trimmed, lowercased input. Never fails.
#[must_use]
pub fn canonicalize(raw: &str) -> CanonicalAddress {
    match Mailbox::parse(raw) {
        Ok(mailbox) => CanonicalAddress(mailbox.address.as_str().to_lowercase()),
        Err(_) => CanonicalAddress(raw.trim().to_lowercase()),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
    }

    #[test]
    fn test_domain_accepts_atext() {
        assert!(Address::new("user@sub_domain.example").is_ok());
        assert!(Address::new("o'brien+tag@mail.example.com").is_ok());
        assert!(Address::new("user@sub domain.example").is_err());
    }

    #[test]
    fn test_invalid_address_no_at() {
        assert!(Address::new("userexample.com").is_err());
    }

    #[test]
    fn test_invalid_address_empty() {
        assert!(Address::new("").is_err());
    }

    #[test]
    fn test_invalid_address_two_at() {
        assert!(Address::new("a@b@example.com").is_err());
    }

    #[test]
    fn test_invalid_address_empty_parts() {
        assert!(Address::new("@example.com").is_err());
        assert!(Address::new("user@").is_err());
        assert!(Address::new("user@example..com").is_err());
        assert!(Address::new("us er@example.com").is_err());
    }

    #[test]
    fn test_mailbox_parse_forms() {
        let bare = Mailbox::parse("shady@mlctrez.com").unwrap();
        assert!(bare.name.is_none());
        assert_eq!(bare.address.as_str(), "shady@mlctrez.com");

        let named = Mailbox::parse(" Matt <matt@mlctrez.com> ").unwrap();
        assert_eq!(named.name.as_deref(), Some("Matt"));
        assert_eq!(named.address.as_str(), "matt@mlctrez.com");

        let quoted = Mailbox::parse("\"Doe, John \\\"JD\\\"\" <john@example.com>").unwrap();
        assert_eq!(quoted.name.as_deref(), Some("Doe, John \"JD\""));

        let angle = Mailbox::parse("<MATT@MLCTREZ.COM>").unwrap();
        assert!(angle.name.is_none());
        assert_eq!(angle.address.as_str(), "MATT@MLCTREZ.COM");
    }

    #[test]
    fn test_mailbox_parse_rejects_malformed() {
        assert!(Mailbox::parse("Invalid Address").is_err());
        assert!(Mailbox::parse("Doe, John <john@example.com>").is_err());
        assert!(Mailbox::parse("john@example.com>").is_err());
        assert!(Mailbox::parse("a@example.com, b@example.com").is_err());
    }

    #[test]
    fn test_mailbox_display() {
        let mailbox = Mailbox::parse("Mail Man <mailman@example.com>").unwrap();
        assert_eq!(mailbox.to_string(), "\"Mail Man\" <mailman@example.com>");
    }

    #[test]
    fn test_canonicalize() {
        let cases = [
            ("shady@mlctrez.com", "shady@mlctrez.com"),
            (" Matt <matt@mlctrez.com> ", "matt@mlctrez.com"),
            ("<MATT@MLCTREZ.COM>", "matt@mlctrez.com"),
            ("Invalid Address", "invalid address"),
            ("   ", ""),
        ];

        for (input, expected) in cases {
            assert_eq!(canonicalize(input).as_str(), expected, "input {input:?}");
        }
    }

    #[test]
    fn test_canonicalize_variants_agree() {
        assert_eq!(canonicalize("Matt <matt@X.com>"), canonicalize("<MATT@x.com>"));
        assert_eq!(canonicalize("<MATT@x.com>").as_str(), "matt@x.com");
    }

    #[test]
    fn test_canonicalize_underscore_domain_forms_agree() {
        let bare = canonicalize("user@sub_domain.example");

        assert_eq!(bare.as_str(), "user@sub_domain.example");
        assert_eq!(canonicalize("<USER@sub_domain.example>"), bare);
        assert_eq!(canonicalize("User <user@Sub_Domain.example>"), bare);
    }

    #[test]
    fn test_canonical_address_borrow() {
        let set: std::collections::HashSet<CanonicalAddress> =
            [canonicalize("Spam <SPAM@example.com>")].into_iter().collect();
        assert!(set.contains("spam@example.com"));
    }

    proptest! {
        #[test]
        fn canonicalize_is_idempotent(raw in "[ a-zA-Z0-9@<>.\"!#$%&'*+/=?^_`{|}~-]{0,40}") {
            let once = canonicalize(&raw);
            prop_assert_eq!(canonicalize(once.as_str()), once);
        }

        #[test]
        fn canonicalize_ignores_case_and_padding(
            local in "[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]{1,12}",
            domain in "[a-zA-Z0-9_-]{1,12}\\.[a-z]{2,4}",
            pad in " {0,3}",
        ) {
            let plain = format!("{local}@{domain}");
            let framed = format!("{pad}Someone <{}>{pad}", plain.to_uppercase());
            prop_assert_eq!(canonicalize(&plain), canonicalize(&framed));
        }
    }
}
