//! Building workflow messages from templates and delivering them to recipients.

use crate::artifact;
use crate::error::{Result, WfmailError};
use crate::maildir::{self, MessageKey};
use crate::message::{Extension, Message, MessageHeader};
use crate::paths;
use crate::template;
use crate::types::{Address, EventType, MessageId, WorkflowState};
use chrono::{DateTime, FixedOffset, SubsecRound, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Compose
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    pub from: Address,
    /// Subject text after the `[EVENT-TYPE]` tag.
    pub summary: Option<String>,
    /// Overrides the state inferred from the artifact path.
    pub state: Option<WorkflowState>,
    pub session_id: Option<String>,
    pub in_reply_to: Option<MessageId>,
    pub references: Vec<MessageId>,
    /// Artifacts in addition to the primary artifact path.
    pub artifacts: Vec<String>,
    pub date: Option<DateTime<FixedOffset>>,
    pub extensions: Vec<Extension>,
    /// Body template used instead of the built-in one.
    pub template: Option<String>,
}

impl ComposeOptions {
    pub fn new(from: Address) -> Self {
        Self {
            from,
            summary: None,
            state: None,
            session_id: None,
            in_reply_to: None,
            references: Vec::new(),
            artifacts: Vec::new(),
            date: None,
            extensions: Vec::new(),
            template: None,
        }
    }

    /// Thread the composed message under `parent`, inheriting its session.
    pub fn replying_to(mut self, parent: &MessageHeader) -> Self {
        self.in_reply_to = parent.message_id.clone();
        self.references = parent.references.clone();
        if self.session_id.is_none() {
            self.session_id = parent.session_id.clone();
        }
        self
    }
}

/// Build a validated message. Caller `variables` take precedence over the built-in
/// bindings (`ARTIFACT`, `ARTIFACTS`, `STATE`, `SENDER`, `RECIPIENTS`, `EVENT_TYPE`,
/// `DATE`, `SESSION_ID`).
pub fn compose(
    event_type: EventType,
    artifact_path: Option<&str>,
    recipients: &[Address],
    variables: &BTreeMap<String, String>,
    options: &ComposeOptions,
) -> Result<Message> {
    let mut artifacts: Vec<String> = Vec::new();
    for a in artifact_path.into_iter().chain(options.artifacts.iter().map(String::as_str)) {
        let a = a.trim();
        if !a.is_empty() && !artifacts.iter().any(|x| x == a) {
            artifacts.push(a.to_string());
        }
    }

    let workflow_state = options
        .state
        .or_else(|| artifact_path.and_then(artifact::derive_state));
    let date = options
        .date
        .unwrap_or_else(|| Utc::now().fixed_offset())
        .trunc_subsecs(0);

    let mut references = options.references.clone();
    if let Some(parent) = &options.in_reply_to {
        references.retain(|r| r != parent);
        references.push(parent.clone());
    }

    let mut bindings: BTreeMap<String, String> = BTreeMap::new();
    if let Some(path) = artifact_path {
        bindings.insert("ARTIFACT".into(), path.to_string());
    }
    if !artifacts.is_empty() {
        bindings.insert("ARTIFACTS".into(), artifacts.join(", "));
    }
    if let Some(state) = workflow_state {
        bindings.insert("STATE".into(), state.to_string());
    }
    if let Some(session) = &options.session_id {
        bindings.insert("SESSION_ID".into(), session.clone());
    }
    let to: Vec<String> = recipients.iter().map(|a| a.role.clone()).collect();
    bindings.insert("SENDER".into(), options.from.role.clone());
    bindings.insert("RECIPIENTS".into(), to.join(", "));
    bindings.insert("EVENT_TYPE".into(), event_type.to_string());
    bindings.insert("DATE".into(), date.to_rfc2822());
    bindings.extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));

    let body_template = options
        .template
        .as_deref()
        .unwrap_or_else(|| template::builtin(&event_type));
    let mut body = template::render(body_template, &bindings)?;
    if !body.ends_with('\n') {
        body.push('\n');
    }

    let summary = options
        .summary
        .clone()
        .or_else(|| variables.get("SUMMARY").cloned())
        .or_else(|| artifact_path.map(str::to_string))
        .unwrap_or_else(|| event_type.to_string());
    let summary = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    let subject = format!("[{}] {}", event_type.subject_tag(), summary);

    let message = Message {
        header: MessageHeader {
            from: options.from.clone(),
            to: recipients.to_vec(),
            subject: subject.trim().to_string(),
            date,
            event_type,
            artifacts,
            workflow_state,
            session_id: options.session_id.clone(),
            message_id: Some(MessageId::generate(&options.from)),
            in_reply_to: options.in_reply_to.clone(),
            references,
            extensions: options.extensions.clone(),
        },
        body,
    };
    message.validate()?;

    tracing::debug!(
        event_type = %message.header.event_type,
        from = %message.header.from,
        recipients = message.header.to.len(),
        "composed message"
    );
    Ok(message)
}

// ---------------------------------------------------------------------------
// Send
// ---------------------------------------------------------------------------

/// A named mailbox to deliver into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub name: String,
    pub mailbox: PathBuf,
}

impl Recipient {
    pub fn new(name: impl Into<String>, mailbox: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            mailbox: mailbox.into(),
        }
    }

    /// The mailbox of `role` under the maildir root.
    pub fn for_role(root: &Path, role: &str) -> Self {
        Self::new(role, paths::mailbox_path(root, role))
    }

    /// One recipient per `To:` address.
    pub fn for_message(root: &Path, message: &Message) -> Vec<Self> {
        message
            .header
            .to
            .iter()
            .map(|a| Self::for_role(root, &a.role))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    pub recipient: String,
    pub mailbox: PathBuf,
    pub key: MessageKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDelivery {
    pub recipient: String,
    pub mailbox: PathBuf,
    pub error: String,
}

/// Some recipients did not receive the message. Retry only `failed`; the
/// recipients in `delivered` already hold a copy.
#[derive(Debug, Clone, Serialize)]
pub struct PartialDelivery {
    pub delivered: Vec<Delivery>,
    pub failed: Vec<FailedDelivery>,
}

impl fmt::Display for PartialDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delivery failed for {} of {} recipient(s): ",
            self.failed.len(),
            self.delivered.len() + self.failed.len()
        )?;
        for (i, fd) in self.failed.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{} ({})", fd.recipient, fd.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for PartialDelivery {}

/// Deliver one message into every distinct recipient mailbox.
pub fn send(message: &Message, recipients: &[Recipient]) -> Result<Vec<Delivery>> {
    message.validate()?;

    let mut seen = HashSet::new();
    let mut delivered = Vec::new();
    let mut failed = Vec::new();
    for recipient in recipients {
        if !seen.insert(recipient.mailbox.clone()) {
            continue;
        }
        match maildir::deliver(&recipient.mailbox, message) {
            Ok(key) => delivered.push(Delivery {
                recipient: recipient.name.clone(),
                mailbox: recipient.mailbox.clone(),
                key,
            }),
            Err(e) => {
                tracing::warn!(recipient = %recipient.name, error = %e, "delivery failed");
                failed.push(FailedDelivery {
                    recipient: recipient.name.clone(),
                    mailbox: recipient.mailbox.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    if failed.is_empty() {
        Ok(delivered)
    } else {
        Err(WfmailError::PartialDelivery(PartialDelivery { delivered, failed }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
