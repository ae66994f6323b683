//! Inbound notification records.

use serde::{Deserialize, Serialize};

use crate::Result;

/// One stored inbound message awaiting a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundRecord {
    /// Storage key of the raw message.
    pub message_id: String,
    /// Envelope sender, unparsed.
    pub source: String,
    /// Envelope recipients, unparsed.
    pub destinations: Vec<String>,
    /// Subject line.
    #[serde(default)]
    pub subject: String,
}

impl InboundRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(
        message_id: impl Into<String>,
        source: impl Into<String>,
        destinations: impl IntoIterator<Item = impl Into<String>>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            source: source.into(),
            destinations: destinations.into_iter().map(Into::into).collect(),
            subject: subject.into(),
        }
    }
}

/// Receipt notification as delivered by the mail receiving service.
///
/// Only the fields the relay uses are decoded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SesEvent {
    /// Notification entries.
    #[serde(rename = "Records", default)]
    pub records: Option<Vec<SesRecord>>,
}

/// One notification entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SesRecord {
    /// Receipt payload.
    pub ses: SesPayload,
}

/// Receipt payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SesPayload {
    /// Stored mail metadata.
    pub mail: SesMail,
}

/// Stored mail metadata.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SesMail {
    /// Storage key of the raw message.
    pub message_id: String,
    /// Envelope sender.
    pub source: String,
    /// Envelope recipients.
    #[serde(default)]
    pub destination: Vec<String>,
    /// Commonly used headers.
    #[serde(default)]
    pub common_headers: SesCommonHeaders,
}

/// Commonly used headers of the stored mail.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SesCommonHeaders {
    /// Subject header, if present.
    #[serde(default)]
    pub subject: Option<String>,
}

impl SesEvent {
    /// Parses a notification from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid notification.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Converts the notification into inbound records, in order.
    #[must_use]
    pub fn into_records(self) -> Vec<InboundRecord> {
        self.records
            .unwrap_or_default()
            .into_iter()
            .map(|record| {
                let mail = record.ses.mail;
                InboundRecord {
                    message_id: mail.message_id,
                    source: mail.source,
                    destinations: mail.destination,
                    subject: mail.common_headers.subject.unwrap_or_default(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event() {
        let event = SesEvent::from_json(
            r#"{
                "Records": [
                    {
                        "eventSource": "aws:ses",
                        "ses": {
                            "mail": {
                                "messageId": "o3vrnil0e2ic28trm7dfhrc2v0clambda4nbp0g1",
                                "source": "sender@example.com",
                                "destination": ["alias@example.com", "other@example.com"],
                                "commonHeaders": {
                                    "from": ["Sender <sender@example.com>"],
                                    "subject": "Hello"
                                }
                            },
                            "receipt": {"action": {"type": "S3"}}
                        }
                    },
                    {
                        "ses": {
                            "mail": {
                                "messageId": "second",
                                "source": "x@example.com",
                                "destination": ["alias@example.com"],
                                "commonHeaders": {}
                            }
                        }
                    }
                ]
            }"#,
        )
        .unwrap();

        let records = event.into_records();

        assert_eq!(
            records,
            vec![
                InboundRecord::new(
                    "o3vrnil0e2ic28trm7dfhrc2v0clambda4nbp0g1",
                    "sender@example.com",
                    ["alias@example.com", "other@example.com"],
                    "Hello",
                ),
                InboundRecord::new("second", "x@example.com", ["alias@example.com"], ""),
            ]
        );
    }

    #[test]
    fn test_empty_or_missing_records() {
        assert!(SesEvent::from_json("{}").unwrap().into_records().is_empty());
        assert!(SesEvent::from_json(r#"{"Records": null}"#).unwrap().into_records().is_empty());
        assert!(SesEvent::from_json(r#"{"Records": []}"#).unwrap().into_records().is_empty());
    }

    #[test]
    fn test_invalid_event() {
        assert!(SesEvent::from_json(r#"{"Records": [{"ses": {}}]}"#).is_err());
    }

    #[test]
    fn test_record_json_round_trip() {
        let record = InboundRecord::new("id", "a@example.com", ["b@example.com"], "block");

        let json = serde_json::to_string(&record).unwrap();

        assert_eq!(serde_json::from_str::<InboundRecord>(&json).unwrap(), record);
    }
}
