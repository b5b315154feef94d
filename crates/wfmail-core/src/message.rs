//! The workflow message: typed headers plus a free-text body.
//!
//! Messages are immutable once delivered. Parsing and serialization live in
//! [`crate::wire`]; this module owns the shape and the validation rules.

use crate::error::{Result, WfmailError};
use crate::types::{Address, EventType, MessageId, WorkflowState};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A header this crate does not interpret, preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub from: Address,
    pub to: Vec<Address>,
    pub subject: String,
    pub date: DateTime<FixedOffset>,
    pub event_type: EventType,
    /// Literal paths or glob patterns relative to the project root, in send order.
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_state: Option<WorkflowState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<MessageId>,
    /// Ancestor ids, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<MessageId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<Extension>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: MessageHeader,
    pub body: String,
}

// ---------------------------------------------------------------------------
// MessageHeader
// ---------------------------------------------------------------------------

impl MessageHeader {
    /// Look up an unrecognised header by name (case-insensitive).
    pub fn extension(&self, name: &str) -> Option<&str> {
        self.extensions
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.value.as_str())
    }

    /// Only the `X-` prefixed extension headers.
    pub fn x_headers(&self) -> impl Iterator<Item = &Extension> {
        self.extensions
            .iter()
            .filter(|e| e.name.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("x-")))
    }

    /// The id this message hangs under in a thread: `In-Reply-To`, falling back to the
    /// last `References` entry.
    pub fn parent_id(&self) -> Option<&MessageId> {
        self.in_reply_to.as_ref().or_else(|| self.references.last())
    }

    pub fn is_addressed_to(&self, role: &str) -> bool {
        self.to.iter().any(|a| a.role == role)
    }

    pub fn validate(&self) -> Result<()> {
        if self.to.is_empty() {
            return Err(WfmailError::MissingRequiredHeader("To".to_string()));
        }
        if self.subject.trim().is_empty() {
            return Err(WfmailError::MissingRequiredHeader("Subject".to_string()));
        }
        if self.event_type.as_str().is_empty() {
            return Err(WfmailError::MissingRequiredHeader("X-Event-Type".to_string()));
        }
        if let EventType::Other(name) = &self.event_type {
            if EventType::from(name.as_str()) != self.event_type {
                return Err(WfmailError::MalformedHeader(format!(
                    "X-Event-Type '{name}' is padded or shadows a known event type"
                )));
            }
        }
        if self.artifacts.is_empty() && self.event_type.requires_artifact() {
            return Err(WfmailError::MissingArtifacts(self.event_type.to_string()));
        }

        // Ids are normally checked on construction; re-check here because the fields are public.
        for id in self
            .message_id
            .iter()
            .chain(self.in_reply_to.iter())
            .chain(self.references.iter())
        {
            id.as_str().parse::<MessageId>()?;
        }

        if let Some(parent) = &self.in_reply_to {
            if let Some(last) = self.references.last() {
                if last != parent {
                    return Err(WfmailError::InconsistentReferences {
                        in_reply_to: parent.to_string(),
                    });
                }
            }
        }

        let single_line = |name: &str, value: &str| -> Result<()> {
            if value.contains(['\r', '\n']) || value.trim() != value {
                return Err(WfmailError::MalformedHeader(format!(
                    "{name} must be a single line without surrounding whitespace"
                )));
            }
            Ok(())
        };
        // The wire date carries whole seconds only.
        if self.date.timestamp_subsec_nanos() != 0 {
            return Err(WfmailError::MalformedHeader(
                "Date must not carry fractional seconds".to_string(),
            ));
        }
        single_line("Subject", &self.subject)?;
        single_line("X-Event-Type", self.event_type.as_str())?;
        if let Some(session) = &self.session_id {
            if session.is_empty() {
                return Err(WfmailError::MalformedHeader(
                    "X-Session-Id must not be empty".to_string(),
                ));
            }
            single_line("X-Session-Id", session)?;
        }
        for artifact in &self.artifacts {
            if artifact.is_empty() || artifact.contains(',') || artifact.trim() != artifact {
                return Err(WfmailError::MalformedHeader(format!(
                    "X-Artifacts entry '{artifact}' is empty, padded, or contains a comma"
                )));
            }
            single_line("X-Artifacts", artifact)?;
        }
        for ext in &self.extensions {
            if ext.name.is_empty() || ext.name.contains([':', ' ', '\t']) {
                return Err(WfmailError::MalformedHeader(format!(
                    "invalid header name '{}'",
                    ext.name
                )));
            }
            single_line(&ext.name, &ext.value)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

impl Message {
    pub fn validate(&self) -> Result<()> {
        self.header.validate()
    }

    pub fn message_id(&self) -> Option<&MessageId> {
        self.header.message_id.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample() -> Message {
        Message {
            header: MessageHeader {
                from: Address::role("spec-writer").unwrap(),
                to: vec![Address::role("spec-reviewer").unwrap()],
                subject: "[REVIEW-REQUEST] auth.md ready for review".to_string(),
                date: DateTime::parse_from_rfc2822("Mon, 03 Nov 2025 10:15:00 +0000").unwrap(),
                event_type: EventType::ReviewRequest,
                artifacts: vec!["specs/*/auth.md".to_string()],
                workflow_state: Some(WorkflowState::Proposed),
                session_id: Some("sess-42".to_string()),
                message_id: Some("<20251103101500.abc.spec-writer@workflow.local>".parse().unwrap()),
                in_reply_to: None,
                references: Vec::new(),
                extensions: Vec::new(),
            },
            body: "Artifact: specs/proposed/auth.md\nState: proposed\n\nPlease review.\n\n-- spec-writer\n"
                .to_string(),
        }
    }

    #[test]
    fn sample_is_valid() {
        sample().validate().unwrap();
    }

    #[test]
    fn review_request_without_artifacts_is_rejected() {
        let mut m = sample();
        m.header.artifacts.clear();
        assert!(matches!(m.validate(), Err(WfmailError::MissingArtifacts(_))));
    }

    #[test]
    fn conversational_messages_may_omit_artifacts() {
        let mut m = sample();
        m.header.artifacts.clear();
        m.header.event_type = EventType::Question;
        m.validate().unwrap();
    }

    #[test]
    fn empty_recipients_is_missing_to() {
        let mut m = sample();
        m.header.to.clear();
        match m.validate() {
            Err(WfmailError::MissingRequiredHeader(h)) => assert_eq!(h, "To"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn in_reply_to_must_close_references() {
        let mut m = sample();
        let parent: MessageId = "<p@workflow.local>".parse().unwrap();
        let other: MessageId = "<o@workflow.local>".parse().unwrap();
        m.header.in_reply_to = Some(parent.clone());
        m.header.references = vec![parent.clone(), other];
        assert!(matches!(
            m.validate(),
            Err(WfmailError::InconsistentReferences { .. })
        ));

        // A bare In-Reply-To without References is accepted.
        m.header.references.clear();
        m.validate().unwrap();
        assert_eq!(m.header.parent_id(), Some(&parent));
    }

    #[test]
    fn multiline_subject_is_rejected() {
        let mut m = sample();
        m.header.subject = "line one\nline two".to_string();
        assert!(matches!(m.validate(), Err(WfmailError::MalformedHeader(_))));
    }

    #[test]
    fn fractional_seconds_are_rejected() {
        let mut m = sample();
        m.header.date += chrono::Duration::milliseconds(250);
        assert!(matches!(m.validate(), Err(WfmailError::MalformedHeader(_))));
    }

    #[test]
    fn empty_session_is_rejected() {
        let mut m = sample();
        m.header.session_id = Some(String::new());
        assert!(matches!(m.validate(), Err(WfmailError::MalformedHeader(_))));
    }

    #[test]
    fn other_event_type_must_be_trimmed_and_unknown() {
        let mut m = sample();
        m.header.event_type = EventType::Other(" panel-decision".to_string());
        assert!(matches!(m.validate(), Err(WfmailError::MalformedHeader(_))));

        m.header.event_type = EventType::Other("approval".to_string());
        assert!(matches!(m.validate(), Err(WfmailError::MalformedHeader(_))));

        m.header.event_type = EventType::Other("panel-decision".to_string());
        m.validate().unwrap();
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        let mut m = sample();
        m.header.extensions.push(Extension {
            name: "X-Priority-Lane".to_string(),
            value: "fast".to_string(),
        });
        m.header.extensions.push(Extension {
            name: "Content-Type".to_string(),
            value: "text/plain".to_string(),
        });
        assert_eq!(m.header.extension("x-priority-lane"), Some("fast"));
        assert_eq!(m.header.x_headers().count(), 1);
    }
}
