//! Review panels: several member roles sharing one mailbox and reaching a
//! decision from the `panel-decision` messages they post there.

use crate::config::PanelConfig;
use crate::error::{Result, WfmailError};
use crate::maildir::Envelope;
use crate::search::{self, Query, SortOrder};
use crate::types::EventType;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const PANEL_DECISION: &str = "panel-decision";

// ---------------------------------------------------------------------------
// DecisionModel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionModel {
    /// Every member votes the same way.
    #[default]
    Consensus,
    /// One outcome has strictly more than half of the panel.
    Majority,
    /// The first listed member decides alone.
    PrimaryDecides,
}

impl DecisionModel {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionModel::Consensus => "consensus",
            DecisionModel::Majority => "majority",
            DecisionModel::PrimaryDecides => "primary-decides",
        }
    }
}

impl fmt::Display for DecisionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionModel {
    type Err = WfmailError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "consensus" => Ok(DecisionModel::Consensus),
            "majority" => Ok(DecisionModel::Majority),
            "primary-decides" | "primary" => Ok(DecisionModel::PrimaryDecides),
            other => Err(WfmailError::InvalidDecisionModel(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Vote
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Vote {
    Approve,
    Reject,
    RequestRevision,
}

impl Vote {
    pub fn as_str(self) -> &'static str {
        match self {
            Vote::Approve => "approve",
            Vote::Reject => "reject",
            Vote::RequestRevision => "request-revision",
        }
    }

    /// Read a vote from a decision subject by keyword.
    pub fn from_subject(subject: &str) -> Option<Vote> {
        let s = subject.to_lowercase();
        if s.contains("approve") {
            Some(Vote::Approve)
        } else if s.contains("reject") {
            Some(Vote::Reject)
        } else if s.contains("revision") || s.contains("clarification") {
            Some(Vote::RequestRevision)
        } else {
            None
        }
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tally / decide
// ---------------------------------------------------------------------------

/// Each sender's most recent vote. Messages other than `panel-decision`, and
/// subjects without a recognisable vote, are ignored.
pub fn tally(envelopes: &[Envelope]) -> BTreeMap<String, Vote> {
    let decision = EventType::from(PANEL_DECISION);
    let mut ordered: Vec<&Envelope> = envelopes
        .iter()
        .filter(|e| e.header.event_type == decision)
        .collect();
    ordered.sort_by(|a, b| a.header.date.cmp(&b.header.date));

    let mut votes = BTreeMap::new();
    for env in ordered {
        if let Some(vote) = Vote::from_subject(&env.header.subject) {
            votes.insert(env.header.from.role.clone(), vote);
        }
    }
    votes
}

/// Apply a decision model. Votes from non-members are ignored when `members` is
/// non-empty; `None` means the panel has not decided yet.
pub fn decide(model: DecisionModel, votes: &BTreeMap<String, Vote>, members: &[String]) -> Option<Vote> {
    let counted: Vec<Vote> = if members.is_empty() {
        votes.values().copied().collect()
    } else {
        members.iter().filter_map(|m| votes.get(m).copied()).collect()
    };
    let panel_size = if members.is_empty() { counted.len() } else { members.len() };

    match model {
        DecisionModel::Consensus => {
            let first = *counted.first()?;
            (counted.len() == panel_size && counted.iter().all(|v| *v == first)).then_some(first)
        }
        DecisionModel::Majority => {
            let mut counts: BTreeMap<&'static str, (Vote, usize)> = BTreeMap::new();
            for v in &counted {
                counts.entry(v.as_str()).or_insert((*v, 0)).1 += 1;
            }
            counts
                .into_values()
                .find(|(_, n)| n * 2 > panel_size)
                .map(|(v, _)| v)
        }
        DecisionModel::PrimaryDecides => {
            let primary = members.first()?;
            votes.get(primary).copied()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub panel: String,
    pub model: DecisionModel,
    pub members: Vec<String>,
    pub votes: BTreeMap<String, Vote>,
    pub outcome: Option<Vote>,
}

/// Tally the panel's mailbox since `since` and apply its decision model, or
/// `model` when given.
pub fn check(
    name: &str,
    mailbox: &Path,
    panel: &PanelConfig,
    model: Option<DecisionModel>,
    since: Option<DateTime<FixedOffset>>,
) -> Result<Decision> {
    let query = Query {
        event_type: Some(EventType::from(PANEL_DECISION)),
        since,
        order: SortOrder::Ascending,
        ..Query::default()
    };
    let envelopes: Vec<Envelope> = search::search(&[mailbox.to_path_buf()], &query)?
        .map(|hit| hit.envelope)
        .collect();
    let votes = tally(&envelopes);
    let model = model.unwrap_or(panel.decision_model);
    let outcome = decide(model, &votes, &panel.members);

    tracing::debug!(
        panel = name,
        model = %model,
        votes = votes.len(),
        outcome = ?outcome,
        "checked panel decision"
    );
    Ok(Decision {
        panel: name.to_string(),
        model,
        members: panel.members.clone(),
        votes,
        outcome,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
