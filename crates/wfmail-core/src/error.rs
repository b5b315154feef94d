use crate::notify::PartialDelivery;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WfmailError {
    #[error("not initialized: run 'wfmail init'")]
    NotInitialized,

    // -- validation ---------------------------------------------------------
    #[error("missing required header: {0}")]
    MissingRequiredHeader(String),

    #[error("malformed role identifier '{0}': expected <role>@<domain>")]
    UnknownRoleIdentifier(String),

    #[error("malformed message id '{0}': expected <token@domain>")]
    MalformedMessageId(String),

    #[error("no blank line separates headers from body")]
    MissingBlankLineSeparator,

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("invalid date '{0}': expected an RFC 5322 date")]
    InvalidDate(String),

    #[error("invalid workflow state '{0}': must be proposed, todo, doing, done, blocked, or deferred")]
    InvalidState(String),

    #[error("event type '{0}' requires at least one artifact")]
    MissingArtifacts(String),

    #[error("in-reply-to {in_reply_to} is not the last entry of references")]
    InconsistentReferences { in_reply_to: String },

    #[error("unresolved template variable(s): {}", .0.join(", "))]
    UnresolvedTemplateVariable(Vec<String>),

    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid time window '{0}': use 7d, 24h, 30m, or a date like 2025-11-01")]
    InvalidSince(String),

    #[error("unknown decision model '{0}': must be consensus, majority, or primary-decides")]
    InvalidDecisionModel(String),

    // -- store --------------------------------------------------------------
    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("role not configured: {0}")]
    RoleNotFound(String),

    #[error("panel not configured: {0}")]
    PanelNotFound(String),

    #[error("mailbox path is not usable: {}", .0.display())]
    InvalidMailbox(PathBuf),

    // -- delivery -----------------------------------------------------------
    #[error(transparent)]
    PartialDelivery(#[from] PartialDelivery),

    // -- thread integrity ---------------------------------------------------
    #[error("thread cycle detected at {0}")]
    ThreadCycleDetected(String),

    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Coarse error taxonomy. Callers use this to decide whether a retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Io,
    PartialDelivery,
    ThreadIntegrity,
    NotFound,
    Config,
}

impl WfmailError {
    pub fn category(&self) -> ErrorCategory {
        use WfmailError::*;
        match self {
            MissingRequiredHeader(_)
            | UnknownRoleIdentifier(_)
            | MalformedMessageId(_)
            | MissingBlankLineSeparator
            | MalformedHeader(_)
            | InvalidDate(_)
            | InvalidState(_)
            | MissingArtifacts(_)
            | InconsistentReferences { .. }
            | UnresolvedTemplateVariable(_)
            | InvalidPattern { .. }
            | InvalidSince(_)
            | InvalidDecisionModel(_) => ErrorCategory::Validation,
            Io(_) | InvalidMailbox(_) => ErrorCategory::Io,
            PartialDelivery(_) => ErrorCategory::PartialDelivery,
            ThreadCycleDetected(_) => ErrorCategory::ThreadIntegrity,
            MessageNotFound(_) | ThreadNotFound(_) | RoleNotFound(_) | PanelNotFound(_) => {
                ErrorCategory::NotFound
            }
            NotInitialized | Yaml(_) => ErrorCategory::Config,
        }
    }
}

pub type Result<T> = std::result::Result<T, WfmailError>;
