use crate::error::{Result, WfmailError};
use crate::paths::{validate_domain, validate_role, DEFAULT_DOMAIN};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A role identifier as addressed on the wire: `role@domain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    pub role: String,
    pub domain: String,
}

impl Address {
    pub fn new(role: impl Into<String>, domain: impl Into<String>) -> Result<Self> {
        let role = role.into();
        let domain = domain.into();
        validate_role(&role)?;
        validate_domain(&domain)?;
        Ok(Self { role, domain })
    }

    /// An address in the default `workflow.local` domain.
    pub fn role(role: impl Into<String>) -> Result<Self> {
        Self::new(role, DEFAULT_DOMAIN)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.role, self.domain)
    }
}

impl FromStr for Address {
    type Err = WfmailError;

    /// Accepts `role@domain`, a bare `role`, or `Display Name <role@domain>`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let addr = match (trimmed.rfind('<'), trimmed.ends_with('>')) {
            (Some(open), true) => &trimmed[open + 1..trimmed.len() - 1],
            _ => trimmed,
        };
        let (role, domain) = addr.rsplit_once('@').unwrap_or((addr, DEFAULT_DOMAIN));
        Self::new(role, domain).map_err(|_| WfmailError::UnknownRoleIdentifier(s.to_string()))
    }
}

impl TryFrom<String> for Address {
    type Error = WfmailError;
    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.to_string()
    }
}

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

static MESSAGE_ID_RE: OnceLock<Regex> = OnceLock::new();

fn message_id_re() -> &'static Regex {
    MESSAGE_ID_RE.get_or_init(|| Regex::new(r"^<[^<>@\s]+@[^<>@\s]+>$").unwrap())
}

/// A `Message-ID` in its angle-bracket form, e.g. `<20251103T101500.ab12.spec-writer@workflow.local>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
    /// Fresh id of the form `<token.sender@domain>`; the token is a UTC timestamp plus
    /// random hex so ids from the same sender never collide.
    pub fn generate(sender: &Address) -> Self {
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        let rand = uuid::Uuid::new_v4().simple().to_string();
        MessageId(format!(
            "<{stamp}.{}.{}@{}>",
            &rand[..12],
            sender.role,
            sender.domain
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MessageId {
    type Err = WfmailError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if !message_id_re().is_match(s) {
            return Err(WfmailError::MalformedMessageId(s.to_string()));
        }
        Ok(MessageId(s.to_string()))
    }
}

impl TryFrom<String> for MessageId {
    type Error = WfmailError;
    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Value of `X-Event-Type`. Values outside the known set are carried in `Other`
/// untouched, so new event types never require a parser change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    ReviewRequest,
    Approval,
    Rejection,
    ClarificationRequest,
    BlockerReport,
    StatusUpdate,
    Question,
    Answer,
    Other(String),
}

impl EventType {
    pub fn known() -> &'static [EventType] {
        &[
            EventType::ReviewRequest,
            EventType::Approval,
            EventType::Rejection,
            EventType::ClarificationRequest,
            EventType::BlockerReport,
            EventType::StatusUpdate,
            EventType::Question,
            EventType::Answer,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventType::ReviewRequest => "review-request",
            EventType::Approval => "approval",
            EventType::Rejection => "rejection",
            EventType::ClarificationRequest => "clarification-request",
            EventType::BlockerReport => "blocker-report",
            EventType::StatusUpdate => "status-update",
            EventType::Question => "question",
            EventType::Answer => "answer",
            EventType::Other(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventType::Other(_))
    }

    /// Conversational messages may omit `X-Artifacts`.
    pub fn is_conversational(&self) -> bool {
        matches!(
            self,
            EventType::Question | EventType::Answer | EventType::StatusUpdate
        )
    }

    /// Artifacts are mandatory only for known, non-conversational types.
    pub fn requires_artifact(&self) -> bool {
        self.is_known() && !self.is_conversational()
    }

    /// Subject prefix tag, e.g. `REVIEW-REQUEST`.
    pub fn subject_tag(&self) -> String {
        self.as_str().to_ascii_uppercase()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        let s = s.trim();
        EventType::known()
            .iter()
            .find(|e| e.as_str() == s)
            .cloned()
            .unwrap_or_else(|| EventType::Other(s.to_string()))
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        EventType::from(s.as_str())
    }
}

impl From<EventType> for String {
    fn from(e: EventType) -> Self {
        e.as_str().to_string()
    }
}

impl FromStr for EventType {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(EventType::from(s))
    }
}

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    Proposed,
    Todo,
    Doing,
    Done,
    Blocked,
    Deferred,
}

impl WorkflowState {
    pub fn all() -> &'static [WorkflowState] {
        &[
            WorkflowState::Proposed,
            WorkflowState::Todo,
            WorkflowState::Doing,
            WorkflowState::Done,
            WorkflowState::Blocked,
            WorkflowState::Deferred,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Proposed => "proposed",
            WorkflowState::Todo => "todo",
            WorkflowState::Doing => "doing",
            WorkflowState::Done => "done",
            WorkflowState::Blocked => "blocked",
            WorkflowState::Deferred => "deferred",
        }
    }

    /// Advisory lifecycle: `proposed → todo → doing → {done | blocked | deferred}`,
    /// and `blocked → doing` once resolved. Messages only announce transitions; nothing
    /// here enforces them.
    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, next),
            (Proposed, Todo)
                | (Todo, Doing)
                | (Doing, Done)
                | (Doing, Blocked)
                | (Doing, Deferred)
                | (Blocked, Doing)
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowState {
    type Err = WfmailError;

    fn from_str(s: &str) -> Result<Self> {
        WorkflowState::all()
            .iter()
            .copied()
            .find(|w| w.as_str() == s.trim())
            .ok_or_else(|| WfmailError::InvalidState(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_forms() {
        let a: Address = "spec-reviewer@workflow.local".parse().unwrap();
        assert_eq!(a.role, "spec-reviewer");
        assert_eq!(a.domain, "workflow.local");

        let bare: Address = "implementer".parse().unwrap();
        assert_eq!(bare.to_string(), "implementer@workflow.local");

        let named: Address = "Spec Writer <spec-writer@panel.local>".parse().unwrap();
        assert_eq!(named.to_string(), "spec-writer@panel.local");
    }

    #[test]
    fn unrecognised_role_is_accepted_malformed_is_not() {
        assert!("brand-new-role@workflow.local".parse::<Address>().is_ok());
        let err = "bad role@workflow.local".parse::<Address>().unwrap_err();
        assert!(matches!(err, WfmailError::UnknownRoleIdentifier(_)));
        assert!("@workflow.local".parse::<Address>().is_err());
    }

    #[test]
    fn message_id_syntax() {
        assert!("<abc.spec-writer@workflow.local>".parse::<MessageId>().is_ok());
        for bad in ["abc@workflow.local", "<abc>", "<a b@x>", "<abc@x", ""] {
            let err = bad.parse::<MessageId>().unwrap_err();
            assert!(matches!(err, WfmailError::MalformedMessageId(_)), "{bad}");
        }
    }

    #[test]
    fn generated_ids_are_well_formed_and_distinct() {
        let sender = Address::role("spec-writer").unwrap();
        let a = MessageId::generate(&sender);
        let b = MessageId::generate(&sender);
        assert_ne!(a, b);
        assert!(a.as_str().parse::<MessageId>().is_ok());
        assert!(a.as_str().ends_with(".spec-writer@workflow.local>"));
    }

    #[test]
    fn event_type_roundtrip_and_unknown() {
        for e in EventType::known() {
            assert_eq!(&EventType::from(e.as_str()), e);
            assert!(e.is_known());
        }
        let other = EventType::from("made-up-type");
        assert_eq!(other, EventType::Other("made-up-type".to_string()));
        assert!(!other.is_known());
        assert_eq!(other.to_string(), "made-up-type");
    }

    #[test]
    fn artifact_requirement() {
        assert!(EventType::ReviewRequest.requires_artifact());
        assert!(!EventType::Question.requires_artifact());
        assert!(!EventType::StatusUpdate.requires_artifact());
        assert!(!EventType::Other("panel-decision".into()).requires_artifact());
        assert_eq!(EventType::BlockerReport.subject_tag(), "BLOCKER-REPORT");
    }

    #[test]
    fn workflow_state_transitions() {
        use WorkflowState::*;
        assert!(Proposed.can_transition_to(Todo));
        assert!(Doing.can_transition_to(Blocked));
        assert!(Blocked.can_transition_to(Doing));
        assert!(!Done.can_transition_to(Doing));
        assert!(!Proposed.can_transition_to(Done));
        assert_eq!("deferred".parse::<WorkflowState>().unwrap(), Deferred);
        assert!("archived".parse::<WorkflowState>().is_err());
    }
}
