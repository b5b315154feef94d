//! Message body templates with `{{NAME}}` and `{{NAME|default}}` placeholders.

use crate::error::{Result, WfmailError};
use crate::types::EventType;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:\|([^}]*))?\}\}").unwrap())
}

/// Names referenced by `template`, in first-appearance order.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder_re().captures_iter(template) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// True when every `{{` opens a well-formed placeholder and no stray `}}` remains.
pub fn is_well_formed(template: &str) -> bool {
    let stripped = placeholder_re().replace_all(template, "");
    !stripped.contains("{{") && !stripped.contains("}}")
}

/// Substitute placeholders. Every name with neither a binding nor a default is
/// reported at once.
pub fn render(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut missing: Vec<String> = Vec::new();
    for caps in placeholder_re().captures_iter(template) {
        let name = &caps[1];
        if caps.get(2).is_none() && !vars.contains_key(name) && !missing.iter().any(|m| m == name) {
            missing.push(name.to_string());
        }
    }
    if !missing.is_empty() {
        return Err(WfmailError::UnresolvedTemplateVariable(missing));
    }

    let rendered = placeholder_re().replace_all(template, |caps: &regex::Captures| {
        match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps.get(2).map(|d| d.as_str().to_string()).unwrap_or_default(),
        }
    });
    Ok(rendered.into_owned())
}

/// Default body for an event type.
pub fn builtin(event_type: &EventType) -> &'static str {
    match event_type {
        EventType::ReviewRequest => {
            "Artifact: {{ARTIFACT}}\n\
             State: {{STATE|proposed}}\n\
             \n\
             {{SENDER}} requests review of {{ARTIFACT}}.\n\
             \n\
             {{NOTES|Reply with an approval, a rejection, or a clarification request.}}\n\
             \n\
             -- {{SENDER}}\n"
        }
        EventType::Approval => {
            "Approved: {{ARTIFACT}}\n\
             New state: {{STATE|todo}}\n\
             \n\
             {{NOTES|No further changes requested.}}\n\
             \n\
             -- {{SENDER}}\n"
        }
        EventType::Rejection => {
            "Rejected: {{ARTIFACT}}\n\
             \n\
             Reason:\n\
             {{REASON}}\n\
             \n\
             -- {{SENDER}}\n"
        }
        EventType::ClarificationRequest => {
            "Artifact: {{ARTIFACT}}\n\
             \n\
             Clarification needed:\n\
             {{QUESTION}}\n\
             \n\
             -- {{SENDER}}\n"
        }
        EventType::BlockerReport => {
            "Blocked on: {{ARTIFACT}}\n\
             State: {{STATE|blocked}}\n\
             \n\
             Blocker:\n\
             {{BLOCKER}}\n\
             \n\
             Needed to proceed:\n\
             {{NEEDED|A decision from the recipient.}}\n\
             \n\
             -- {{SENDER}}\n"
        }
        EventType::StatusUpdate => {
            "Artifacts: {{ARTIFACTS|none}}\n\
             State: {{STATE|unchanged}}\n\
             \n\
             {{STATUS}}\n\
             \n\
             -- {{SENDER}}\n"
        }
        EventType::Question => "{{QUESTION}}\n\n-- {{SENDER}}\n",
        EventType::Answer => "{{ANSWER}}\n\n-- {{SENDER}}\n",
        EventType::Other(_) => {
            "Event: {{EVENT_TYPE}}\n\
             Artifacts: {{ARTIFACTS|none}}\n\
             \n\
             {{BODY|}}\n\
             \n\
             -- {{SENDER}}\n"
        }
    }
}
