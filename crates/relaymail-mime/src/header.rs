//! Header rewriting for re-sent messages.
//!
//! The rewriter walks a raw RFC 5322 message line by line. While in the
//! header section it groups folded lines into [`HeaderLine`]s and decides per
//! header whether to keep, replace or drop it. The first blank line ends the
//! header section; everything after it is copied unchanged apart from the
//! line terminator, which is always written as CRLF.

use std::io::BufRead;

use crate::error::Result;

/// Header prefixes dropped by default.
///
/// These headers are bound to the original delivery path and become invalid
/// or misleading once the message is re-sent under the relay identity.
pub const DEFAULT_DROP_PREFIXES: &[&str] = &["dkim-", "return-path:", "sender:", "list-owner:"];

const FROM_PREFIX: &[u8] = b"from:";
const TO_PREFIX: &[u8] = b"to:";
const CRLF: &[u8] = b"\r\n";

/// One logical header: its first line plus any folded continuation lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderLine {
    /// The `Name: value` line that opened the header.
    pub first: Vec<u8>,
    /// Continuation lines (starting with a space or tab), unmodified.
    pub additional: Vec<Vec<u8>>,
}

impl HeaderLine {
    /// Starts a header from its first line.
    #[must_use]
    pub fn new(first: impl Into<Vec<u8>>) -> Self {
        Self {
            first: first.into(),
            additional: Vec::new(),
        }
    }

    /// Returns true if the first line starts with `prefix`, ignoring ASCII case.
    #[must_use]
    pub fn has_prefix(&self, prefix: &[u8]) -> bool {
        self.first.len() >= prefix.len() && self.first[..prefix.len()].eq_ignore_ascii_case(prefix)
    }

    /// Returns the value of the first line after `prefix`, trimmed.
    fn value_after(&self, prefix: &[u8]) -> &[u8] {
        self.first.get(prefix.len()..).unwrap_or_default().trim_ascii()
    }
}

/// What happens to a header when it is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Keep,
    ReplaceFrom,
    ReplaceTo,
    Drop,
}

/// Which part of the message the rewriter is reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Headers,
    Body,
}

/// Rewrites the header block of a raw message for re-sending.
///
/// - `From:` becomes `From: <relay_from>` followed by `X-Original-From:` and
///   one `X-Original-From-Cont:` per continuation line.
/// - `To:` becomes `To: <relay_to>` with the matching `X-Original-To` headers.
/// - Headers matching a drop prefix are removed together with their
///   continuations.
/// - Every other header, and the whole body, is kept.
#[derive(Debug, Clone)]
pub struct HeaderRewriter {
    relay_from: String,
    relay_to: String,
    drop_prefixes: Vec<Vec<u8>>,
}

impl HeaderRewriter {
    /// Creates a rewriter for the given relay identity with the default
    /// drop prefixes.
    #[must_use]
    pub fn new(relay_from: impl Into<String>, relay_to: impl Into<String>) -> Self {
        Self {
            relay_from: relay_from.into(),
            relay_to: relay_to.into(),
            drop_prefixes: DEFAULT_DROP_PREFIXES
                .iter()
                .map(|p| p.as_bytes().to_vec())
                .collect(),
        }
    }

    /// Replaces the set of dropped header prefixes.
    ///
    /// Prefixes are matched case-insensitively against the start of a
    /// header's first line, so they normally include the trailing colon.
    #[must_use]
    pub fn with_drop_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.drop_prefixes = prefixes
            .into_iter()
            .map(|p| p.as_ref().to_ascii_lowercase().into_bytes())
            .collect();
        self
    }

    /// Returns the address written into the `From:` header.
    #[must_use]
    pub fn relay_from(&self) -> &str {
        &self.relay_from
    }

    /// Returns the address written into the `To:` header.
    #[must_use]
    pub fn relay_to(&self) -> &str {
        &self.relay_to
    }

    /// Rewrites a message read from `reader`.
    ///
    /// Lines may end in LF or CRLF; the output always uses CRLF.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from `reader` fails.
    pub fn rewrite<R: BufRead>(&self, mut reader: R) -> Result<Vec<u8>> {
        let mut state = Rewrite::new(self);
        let mut line = Vec::new();

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            state.push_line(&line);
        }

        Ok(state.finish())
    }

    /// Rewrites a message held in memory.
    #[must_use]
    pub fn rewrite_bytes(&self, raw: &[u8]) -> Vec<u8> {
        let mut state = Rewrite::new(self);
        let mut rest = raw;

        while !rest.is_empty() {
            let end = rest
                .iter()
                .position(|&b| b == b'\n')
                .map_or(rest.len(), |i| i + 1);
            state.push_line(&rest[..end]);
            rest = &rest[end..];
        }

        state.finish()
    }

    fn disposition(&self, header: &HeaderLine) -> Disposition {
        if header.has_prefix(FROM_PREFIX) {
            Disposition::ReplaceFrom
        } else if header.has_prefix(TO_PREFIX) {
            Disposition::ReplaceTo
        } else if self.drop_prefixes.iter().any(|p| header.has_prefix(p)) {
            Disposition::Drop
        } else {
            Disposition::Keep
        }
    }
}

/// Rewrite state for a single message.
struct Rewrite<'a> {
    rules: &'a HeaderRewriter,
    section: Section,
    pending: Option<HeaderLine>,
    out: Vec<u8>,
}

impl<'a> Rewrite<'a> {
    fn new(rules: &'a HeaderRewriter) -> Self {
        Self {
            rules,
            section: Section::Headers,
            pending: None,
            out: Vec::new(),
        }
    }

    /// Feeds one raw line, terminator included.
    fn push_line(&mut self, raw: &[u8]) {
        let line = strip_terminator(raw);

        match self.section {
            Section::Body => self.write_line(line),
            Section::Headers if line.is_empty() => {
                self.flush();
                self.out.extend_from_slice(CRLF);
                self.section = Section::Body;
            }
            Section::Headers if line.starts_with(b" ") || line.starts_with(b"\t") => {
                // A continuation with nothing to continue is dropped.
                if let Some(header) = self.pending.as_mut() {
                    header.additional.push(line.to_vec());
                }
            }
            Section::Headers => {
                self.flush();
                self.pending = Some(HeaderLine::new(line));
            }
        }
    }

    fn finish(mut self) -> Vec<u8> {
        self.flush();
        self.out
    }

    fn flush(&mut self) {
        let Some(header) = self.pending.take() else {
            return;
        };

        let rules = self.rules;
        match rules.disposition(&header) {
            Disposition::Keep => {
                self.write_line(&header.first);
                for line in &header.additional {
                    self.write_line(line);
                }
            }
            Disposition::ReplaceFrom => {
                self.write_replacement(&header, FROM_PREFIX, "From", &rules.relay_from);
            }
            Disposition::ReplaceTo => {
                self.write_replacement(&header, TO_PREFIX, "To", &rules.relay_to);
            }
            Disposition::Drop => {}
        }
    }

    /// Writes `Name: value`, then the original value as `X-Original-Name`
    /// and each continuation as `X-Original-Name-Cont`.
    fn write_replacement(&mut self, header: &HeaderLine, prefix: &[u8], name: &str, value: &str) {
        self.write_line(format!("{name}: {value}").as_bytes());

        let original = format!("X-Original-{name}: ").into_bytes();
        self.write_line(&[original.as_slice(), header.value_after(prefix)].concat());

        let cont = format!("X-Original-{name}-Cont: ").into_bytes();
        for line in &header.additional {
            self.write_line(&[cont.as_slice(), line.as_slice()].concat());
        }
    }

    fn write_line(&mut self, line: &[u8]) {
        self.out.extend_from_slice(line);
        self.out.extend_from_slice(CRLF);
    }
}

fn strip_terminator(raw: &[u8]) -> &[u8] {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    line.strip_suffix(b"\r").unwrap_or(line)
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

    fn rewriter() -> HeaderRewriter {
        HeaderRewriter::new("forwarder@mlctrez.com", "destination@gmail.com")
    }

    fn rewrite(input: &str) -> String {
        String::from_utf8(rewriter().rewrite(input.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_rewrite_from_and_to() {
        let input = concat!(
            "From: sender@example.com\n",
            "To: original@mlctrez.com\n",
            "Subject: Test Email\n",
            "Date: Mon, 08 Feb 2026 19:48:00 +0000\n",
            "\n",
            "This is the body of the email.\n",
            "To: unchanged.\n",
        );

        let output = rewrite(input);

        assert!(output.contains("From: forwarder@mlctrez.com\r\n"));
        assert!(output.contains("X-Original-From: sender@example.com\r\n"));
        assert!(output.contains("To: destination@gmail.com\r\n"));
        assert!(output.contains("X-Original-To: original@mlctrez.com\r\n"));
        assert!(output.contains("Subject: Test Email\r\n"));
        assert!(output.contains("Date: Mon, 08 Feb 2026 19:48:00 +0000\r\n"));
        assert!(output.contains("\r\n\r\nThis is the body of the email.\r\nTo: unchanged.\r\n"));
    }

    #[test]
    fn test_rewrite_exact_output() {
        let input = "From: a@example.com\r\nSubject: Hi\r\nTo: b@example.com\r\n\r\nBody\r\n";

        assert_eq!(
            rewrite(input),
            concat!(
                "From: forwarder@mlctrez.com\r\n",
                "X-Original-From: a@example.com\r\n",
                "Subject: Hi\r\n",
                "To: destination@gmail.com\r\n",
                "X-Original-To: b@example.com\r\n",
                "\r\n",
                "Body\r\n",
            )
        );
    }

    #[test]
    fn test_rewrite_multiline_to() {
        let input = concat!(
            "From: sender@example.com\n",
            "To: first@mlctrez.com,\n",
            " second@mlctrez.com\n",
            "Subject: Test Email\n",
            "\n",
            "Body",
        );

        let output = rewrite(input);

        assert!(output.contains("To: destination@gmail.com\r\n"));
        assert_eq!(output.matches("X-Original-To: ").count(), 1);
        assert!(output.contains("X-Original-To: first@mlctrez.com,\r\n"));
        assert_eq!(output.matches("X-Original-To-Cont: ").count(), 1);
        assert!(output.contains("X-Original-To-Cont:  second@mlctrez.com\r\n"));
        assert!(output.ends_with("\r\nBody\r\n"));
    }

    #[test]
    fn test_rewrite_multiline_from_with_tab() {
        let input = "From: \"Very Long\"\n\t<long@example.com>\n\nBody\n";

        let output = rewrite(input);

        assert!(output.contains("X-Original-From: \"Very Long\"\r\n"));
        assert!(output.contains("X-Original-From-Cont: \t<long@example.com>\r\n"));
        assert!(!output.contains("\r\n\t<long@example.com>"));
    }

    #[test]
    fn test_rewrite_drops_trust_headers() {
        let input = concat!(
            "Return-Path: <bounce@example.com>\n",
            "DKIM-Signature: v=1; a=rsa-sha256;\n",
            "\tb=abc123\n",
            "Sender: list@example.com\n",
            "List-Owner: <mailto:owner@example.com>\n",
            "Message-ID: <id@example.com>\n",
            "\n",
            "Body\n",
        );

        let output = rewrite(input);

        assert_eq!(output, "Message-ID: <id@example.com>\r\n\r\nBody\r\n");
    }

    #[test]
    fn test_rewrite_header_names_case_insensitive() {
        let output = rewrite("FROM: a@example.com\nto: b@example.com\ndkim-signature: x\n\n");

        assert!(output.contains("From: forwarder@mlctrez.com\r\n"));
        assert!(output.contains("To: destination@gmail.com\r\n"));
        assert!(!output.contains("dkim"));
    }

    #[test]
    fn test_rewrite_keeps_unknown_continuations() {
        let input = "Subject: part one\n part two\nX-Custom: a\n\nbody\n";

        assert_eq!(
            rewrite(input),
            "Subject: part one\r\n part two\r\nX-Custom: a\r\n\r\nbody\r\n"
        );
    }

    #[test]
    fn test_rewrite_leading_continuation_dropped() {
        let output = rewrite(" orphan\nSubject: s\n\nbody\n");

        assert_eq!(output, "Subject: s\r\n\r\nbody\r\n");
    }

    #[test]
    fn test_rewrite_body_is_not_reinterpreted() {
        let input = "Subject: s\n\nFrom: body@example.com\n indented\n\nDKIM-Signature: keep\n";

        let output = rewrite(input);

        assert!(output.ends_with(
            "\r\n\r\nFrom: body@example.com\r\n indented\r\n\r\nDKIM-Signature: keep\r\n"
        ));
    }

    #[test]
    fn test_rewrite_without_body() {
        let output = rewrite("From: a@example.com\nSubject: s");

        assert_eq!(
            output,
            "From: forwarder@mlctrez.com\r\nX-Original-From: a@example.com\r\nSubject: s\r\n"
        );
    }

    #[test]
    fn test_rewrite_custom_drop_prefixes() {
        let rewriter = rewriter().with_drop_prefixes(["X-Spam-"]);

        let output = String::from_utf8(
            rewriter.rewrite_bytes(b"X-Spam-Score: 9\nReturn-Path: <a@b.c>\n\nbody\n"),
        )
        .unwrap();

        assert_eq!(output, "Return-Path: <a@b.c>\r\n\r\nbody\r\n");
    }

    #[test]
    fn test_rewrite_preserves_non_utf8_body() {
        let raw = b"Subject: s\n\n\xff\xfe binary\n";

        let output = rewriter().rewrite_bytes(raw);

        assert!(output.ends_with(b"\r\n\r\n\xff\xfe binary\r\n"));
    }

    #[test]
    fn test_header_line_prefix() {
        let header = HeaderLine::new("DKIM-Signature: v=1");
        assert!(header.has_prefix(b"dkim-"));
        assert!(!header.has_prefix(b"dkim-signature: v=1; longer"));
    }

    proptest! {
        #[test]
        fn reader_and_slice_agree(input in "[a-zA-Z: \t\r\n-]{0,200}") {
            let rewriter = rewriter();
            let via_reader = rewriter.rewrite(input.as_bytes()).unwrap();
            prop_assert_eq!(via_reader, rewriter.rewrite_bytes(input.as_bytes()));
        }

        #[test]
        fn body_passes_through(lines in proptest::collection::vec("[ -~]{0,60}", 0..20)) {
            let body: String = lines.iter().map(|l| format!("{l}\n")).collect();
            let input = format!("From: a@example.com\nSubject: s\n\n{body}");

            let output = rewriter().rewrite_bytes(input.as_bytes());

            let expected: String = lines.iter().map(|l| format!("{l}\r\n")).collect();
            let expected = format!("\r\n\r\n{expected}");
            prop_assert!(output.ends_with(expected.as_bytes()));
        }
    }
}
