//! Per-record relay decisions.
//!
//! For every inbound record the engine decides, in order: drop it because a
//! recipient is blocked, apply it as an admin command, or forward it under
//! the relay identity.

mod engine;
mod record;

pub use engine::{BatchReport, RecordOutcome, RecordReport, RelayEngine};
pub use record::{InboundRecord, SesCommonHeaders, SesEvent, SesMail, SesPayload, SesRecord};
