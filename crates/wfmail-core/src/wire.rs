//! RFC 5322-style wire format.
//!
//! Headers are written in a fixed order (required, workflow, threading, then
//! extensions), followed by exactly one blank line and the body verbatim. The
//! parser is tolerant of CRLF line endings, folded headers, header-name case and
//! a leading mbox `From ` line. [`parse_header_block`] is the header-only path used
//! by listing, search and threading; it never looks at a body.

use crate::error::{Result, WfmailError};
use crate::message::{Extension, Message, MessageHeader};
use crate::types::{Address, EventType, MessageId, WorkflowState};
use chrono::{DateTime, FixedOffset};
use std::io::BufRead;

const FOLD_WIDTH: usize = 78;

// ---------------------------------------------------------------------------
// Serialize
// ---------------------------------------------------------------------------

pub fn serialize(message: &Message) -> Vec<u8> {
    let h = &message.header;
    let mut out = String::with_capacity(512 + message.body.len());

    push_header(&mut out, "From", &h.from.to_string());
    let to: Vec<String> = h.to.iter().map(Address::to_string).collect();
    push_header(&mut out, "To", &to.join(", "));
    push_header(&mut out, "Subject", &h.subject);
    push_header(&mut out, "Date", &h.date.to_rfc2822());

    push_header(&mut out, "X-Event-Type", h.event_type.as_str());
    if !h.artifacts.is_empty() {
        push_header(&mut out, "X-Artifacts", &h.artifacts.join(", "));
    }
    if let Some(state) = h.workflow_state {
        push_header(&mut out, "X-Workflow-State", state.as_str());
    }
    if let Some(session) = &h.session_id {
        push_header(&mut out, "X-Session-Id", session);
    }

    if let Some(id) = &h.message_id {
        push_header(&mut out, "Message-ID", id.as_str());
    }
    if let Some(parent) = &h.in_reply_to {
        push_header(&mut out, "In-Reply-To", parent.as_str());
    }
    if !h.references.is_empty() {
        let refs: Vec<&str> = h.references.iter().map(MessageId::as_str).collect();
        push_header(&mut out, "References", &refs.join(" "));
    }

    for ext in &h.extensions {
        push_header(&mut out, &ext.name, &ext.value);
    }

    out.push('\n');
    out.push_str(&message.body);
    out.into_bytes()
}

/// Append `Name: value`, folding before a space whenever the line would pass
/// [`FOLD_WIDTH`]. Unfolding (dropping the line break, keeping the space) restores
/// the value exactly.
fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push(':');
    let mut width = name.len() + 1;
    let mut line_has_word = false;
    for word in value.split(' ') {
        if line_has_word && width + 1 + word.len() > FOLD_WIDTH {
            out.push('\n');
            width = 0;
        }
        out.push(' ');
        out.push_str(word);
        width += 1 + word.len();
        line_has_word = true;
    }
    out.push('\n');
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

/// Parse a complete message. The result is validated.
pub fn parse(bytes: &[u8]) -> Result<Message> {
    let text = String::from_utf8_lossy(bytes);
    let (head, body) = split(&text)?;
    let header = parse_header_block(head)?;
    Ok(Message {
        header,
        body: body.to_string(),
    })
}

/// Split raw text at the first empty line into `(headers, body)`.
pub fn split(text: &str) -> Result<(&str, &str)> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line == "\n" || line == "\r\n" {
            return Ok((&text[..offset], &text[offset + line.len()..]));
        }
        offset += line.len();
    }
    Err(WfmailError::MissingBlankLineSeparator)
}

/// Read just the header block from `reader`, stopping at the blank separator line.
pub fn read_header_block<R: BufRead>(mut reader: R) -> Result<String> {
    let mut head = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Err(WfmailError::MissingBlankLineSeparator);
        }
        if buf == b"\n" || buf == b"\r\n" {
            return Ok(head);
        }
        head.push_str(&String::from_utf8_lossy(&buf));
    }
}

/// Unfold a header block into `(name, value)` pairs in source order.
pub fn raw_fields(head: &str) -> Result<Vec<(String, String)>> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for (i, line) in head.lines().enumerate() {
        if i == 0 && line.starts_with("From ") {
            continue;
        }
        if line.starts_with([' ', '\t']) {
            match fields.last_mut() {
                Some((_, value)) => value.push_str(line),
                None => {
                    return Err(WfmailError::MalformedHeader(format!(
                        "continuation line before any header: {line:?}"
                    )))
                }
            }
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(WfmailError::MalformedHeader(line.to_string()));
        };
        if name.is_empty() || name.contains([' ', '\t']) {
            return Err(WfmailError::MalformedHeader(line.to_string()));
        }
        fields.push((name.to_string(), value.to_string()));
    }
    for (_, value) in &mut fields {
        *value = value.trim().to_string();
    }
    Ok(fields)
}

/// Build a typed, validated header from a raw header block.
pub fn parse_header_block(head: &str) -> Result<MessageHeader> {
    let mut from = None;
    let mut to_values: Vec<String> = Vec::new();
    let mut subject = None;
    let mut date = None;
    let mut event_type = None;
    let mut artifacts = Vec::new();
    let mut workflow_state = None;
    let mut session_id = None;
    let mut message_id = None;
    let mut in_reply_to = None;
    let mut references = Vec::new();
    let mut extensions = Vec::new();

    for (name, value) in raw_fields(head)? {
        match name.to_ascii_lowercase().as_str() {
            "from" => from = non_empty(value),
            "to" => to_values.push(value),
            "subject" => subject = non_empty(value),
            "date" => date = non_empty(value),
            "x-event-type" => event_type = non_empty(value),
            "x-artifacts" => artifacts.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string),
            ),
            "x-workflow-state" => {
                workflow_state = non_empty(value)
                    .map(|v| v.parse::<WorkflowState>())
                    .transpose()?
            }
            "x-session-id" => session_id = non_empty(value),
            "message-id" => message_id = non_empty(value).map(|v| v.parse()).transpose()?,
            "in-reply-to" => {
                in_reply_to = value
                    .split_whitespace()
                    .next()
                    .map(str::parse::<MessageId>)
                    .transpose()?
            }
            "references" => {
                references = value
                    .split_whitespace()
                    .map(str::parse::<MessageId>)
                    .collect::<Result<Vec<_>>>()?
            }
            _ => extensions.push(Extension { name, value }),
        }
    }

    let from: Address = required(from, "From")?.parse()?;
    let to = to_values
        .iter()
        .flat_map(|v| split_addresses(v))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::parse::<Address>)
        .collect::<Result<Vec<_>>>()?;
    if to.is_empty() {
        return Err(WfmailError::MissingRequiredHeader("To".to_string()));
    }
    let subject = required(subject, "Subject")?;
    let date = parse_date(&required(date, "Date")?)?;
    let event_type = EventType::from(required(event_type, "X-Event-Type")?);
    if !event_type.is_known() {
        tracing::debug!(event_type = %event_type, "preserving unknown event type");
    }

    let header = MessageHeader {
        from,
        to,
        subject,
        date,
        event_type,
        artifacts,
        workflow_state,
        session_id,
        message_id,
        in_reply_to,
        references,
        extensions,
    };
    header.validate()?;
    Ok(header)
}

/// Split an address list on commas that sit outside quotes and angle brackets.
fn split_addresses(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let (mut start, mut quoted, mut angle) = (0, false, false);
    let mut escaped = false;
    for (i, c) in list.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            '<' if !quoted => angle = true,
            '>' if !quoted => angle = false,
            ',' if !quoted && !angle => {
                parts.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts
}

pub fn parse_date(value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(value.trim())
        .map_err(|_| WfmailError::InvalidDate(value.to_string()))
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value.ok_or_else(|| WfmailError::MissingRequiredHeader(name.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
