//! # relaymail-mime
//!
//! Message-level building blocks for re-sending inbound email from a fixed
//! relay identity.
//!
//! ## Features
//!
//! - **Address canonicalization**: reduce `Name <addr>`, `<ADDR>` or bare
//!   address header values to one lowercase form for comparison and storage
//! - **Header rewriting**: replace `From`/`To`, drop sender-trust headers
//!   (`DKIM-*`, `Return-Path`, `Sender`, `List-Owner`), keep provenance in
//!   `X-Original-*` headers and pass the body through untouched
//!
//! ## Quick Start
//!
//! ### Canonicalizing addresses
//!
//! ```
//! use relaymail_mime::canonicalize;
//!
//! assert_eq!(canonicalize(" Matt <MATT@Example.com> ").as_str(), "matt@example.com");
//! assert_eq!(canonicalize("Invalid Address").as_str(), "invalid address");
//! ```
//!
//! ### Rewriting a stored message
//!
//! ```
//! use relaymail_mime::HeaderRewriter;
//!
//! let rewriter = HeaderRewriter::new("relay@example.com", "owner@example.net");
//! let raw = b"From: someone@example.org\nTo: alias@example.com\n\nHello\n";
//! let out = String::from_utf8(rewriter.rewrite_bytes(raw)).unwrap();
//!
//! assert!(out.starts_with("From: relay@example.com\r\nX-Original-From: someone@example.org\r\n"));
//! assert!(out.ends_with("\r\nHello\r\n"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod address;
mod error;
pub mod header;

pub use address::{Address, CanonicalAddress, Mailbox, canonicalize};
pub use error::{Error, Result};
pub use header::{DEFAULT_DROP_PREFIXES, HeaderLine, HeaderRewriter};
