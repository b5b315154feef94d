//! Metadata queries over one or more mailboxes.
//!
//! Filtering and ordering run on header-only envelopes; bodies are read only for
//! [`Shape::Full`], and only as results are pulled.

use crate::artifact::{self, Pattern};
use crate::config::RoleConfig;
use crate::error::{Result, WfmailError};
use crate::maildir::{self, Area, Envelope, ScanWarning};
use crate::message::MessageHeader;
use crate::types::{EventType, MessageId, WorkflowState};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Most recent first.
    #[default]
    Descending,
    Ascending,
}

/// What each result carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    #[default]
    Envelope,
    Full,
}

/// Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub message_id: Option<MessageId>,
    pub event_type: Option<EventType>,
    /// Exact role name or a prefix of it.
    pub from_role: Option<String>,
    /// Prefix of any recipient's role name.
    pub to_role: Option<String>,
    /// Glob; a message matches when any of its artifacts could name the same path.
    /// A pattern without `/` also matches by file name or as a path fragment.
    pub artifact: Option<String>,
    pub state: Option<WorkflowState>,
    pub session_id: Option<String>,
    pub since: Option<DateTime<FixedOffset>>,
    pub limit: Option<usize>,
    pub order: SortOrder,
    pub shape: Shape,
    pub area: Area,
}

impl Query {
    pub fn matches(&self, header: &MessageHeader) -> bool {
        if self.message_id.is_some() && header.message_id != self.message_id {
            return false;
        }
        if let Some(event_type) = &self.event_type {
            if &header.event_type != event_type {
                return false;
            }
        }
        if let Some(prefix) = &self.from_role {
            if !header.from.role.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(prefix) = &self.to_role {
            if !header.to.iter().any(|a| a.role.starts_with(prefix.as_str())) {
                return false;
            }
        }
        if let Some(pattern) = &self.artifact {
            if !header
                .artifacts
                .iter()
                .any(|stored| artifact_matches(pattern, stored))
            {
                return false;
            }
        }
        if self.state.is_some() && header.workflow_state != self.state {
            return false;
        }
        if self.session_id.is_some() && header.session_id != self.session_id {
            return false;
        }
        if let Some(since) = &self.since {
            if header.date < *since {
                return false;
            }
        }
        true
    }
}

fn artifact_matches(pattern: &str, stored: &str) -> bool {
    if artifact::overlaps(pattern, stored) {
        return true;
    }
    if pattern.contains('/') {
        return false;
    }
    let name = stored.rsplit('/').next().unwrap_or(stored);
    artifact::overlaps(pattern, name) || stored.contains(pattern)
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Ordered matches. Bodies for [`Shape::Full`] are read as the iterator advances;
/// a message that vanished or became unreadable in the meantime is skipped and
/// recorded in [`SearchResults::warnings`].
#[derive(Debug)]
pub struct SearchResults {
    hits: std::vec::IntoIter<Envelope>,
    shape: Shape,
    warnings: Vec<ScanWarning>,
}

impl SearchResults {
    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }
}

impl Iterator for SearchResults {
    type Item = SearchHit;

    fn next(&mut self) -> Option<SearchHit> {
        loop {
            let envelope = self.hits.next()?;
            if self.shape == Shape::Envelope {
                return Some(SearchHit {
                    envelope,
                    body: None,
                });
            }
            match envelope.read_message() {
                Ok(message) => {
                    return Some(SearchHit {
                        envelope,
                        body: Some(message.body),
                    })
                }
                Err(e) => {
                    tracing::warn!(key = %envelope.key, error = %e, "message unreadable after scan");
                    self.warnings.push(ScanWarning {
                        mailbox: envelope.mailbox,
                        key: Some(envelope.key),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (_, upper) = self.hits.size_hint();
        (0, upper)
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

pub fn search(mailboxes: &[PathBuf], query: &Query) -> Result<SearchResults> {
    run(mailboxes, query, |_| true)
}

fn run(
    mailboxes: &[PathBuf],
    query: &Query,
    extra: impl Fn(&MessageHeader) -> bool,
) -> Result<SearchResults> {
    if let Some(pattern) = &query.artifact {
        Pattern::new(pattern)?;
    }

    let scan = maildir::scan(mailboxes, query.area);
    let mut seen = HashSet::new();
    let mut hits: Vec<Envelope> = scan
        .envelopes
        .into_iter()
        .filter(|e| query.matches(&e.header) && extra(&e.header))
        .filter(|e| match &e.header.message_id {
            Some(id) => seen.insert(id.clone()),
            None => true,
        })
        .collect();

    hits.sort_by(|a, b| {
        a.header
            .date
            .cmp(&b.header.date)
            .then_with(|| a.header.message_id.cmp(&b.header.message_id))
    });
    if query.order == SortOrder::Descending {
        hits.reverse();
    }
    if let Some(limit) = query.limit {
        hits.truncate(limit);
    }

    tracing::debug!(
        mailboxes = mailboxes.len(),
        hits = hits.len(),
        warnings = scan.warnings.len(),
        "search complete"
    );
    Ok(SearchResults {
        hits: hits.into_iter(),
        shape: query.shape,
        warnings: scan.warnings,
    })
}

/// Messages a role still has to act on: addressed to it, of an event type it
/// handles, inside its catch-up window, oldest first.
pub fn pending_for_role(
    mailboxes: &[PathBuf],
    role: &str,
    config: &RoleConfig,
    area: Area,
    now: DateTime<Utc>,
) -> Result<SearchResults> {
    // A window reaching past chrono's range means "everything".
    let since = Duration::try_days(i64::from(config.catchup_days))
        .and_then(|window| now.checked_sub_signed(window))
        .map(|start| start.fixed_offset());
    let query = Query {
        since,
        order: SortOrder::Ascending,
        area,
        ..Query::default()
    };
    run(mailboxes, &query, |h| {
        h.is_addressed_to(role)
            && (config.event_types.is_empty() || config.event_types.contains(&h.event_type))
    })
}

// ---------------------------------------------------------------------------
// Time windows
// ---------------------------------------------------------------------------

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)([dhm])$").unwrap())
}

/// Parse a lower time bound: `7d`, `24h`, `30m` relative to `now`, or an absolute
/// date / timestamp (`2025-11-01`, RFC 3339, RFC 2822). Naive values are UTC.
pub fn parse_since(input: &str, now: DateTime<Utc>) -> Result<DateTime<FixedOffset>> {
    let s = input.trim();
    let invalid = || WfmailError::InvalidSince(input.to_string());

    if let Some(caps) = relative_re().captures(s) {
        let n: i64 = caps[1].parse().map_err(|_| invalid())?;
        let delta = match &caps[2] {
            "d" => Duration::try_days(n),
            "h" => Duration::try_hours(n),
            _ => Duration::try_minutes(n),
        }
        .ok_or_else(invalid)?;
        return now
            .checked_sub_signed(delta)
            .map(|t| t.fixed_offset())
            .ok_or_else(invalid);
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t);
    }
    if let Ok(t) = DateTime::parse_from_rfc2822(s) {
        return Ok(t);
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&t).fixed_offset());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let midnight = d.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
        return Ok(Utc.from_utc_datetime(&midnight).fixed_offset());
    }
    Err(invalid())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::tests::sample;
    use crate::message::Message;
    use crate::types::Address;
    use tempfile::TempDir;

    fn at(minutes: i64, id: &str) -> Message {
        let mut m = sample();
        m.header.date += Duration::minutes(minutes);
        m.header.message_id = Some(format!("<{id}@workflow.local>").parse().unwrap());
        m
    }

    fn ids(results: SearchResults) -> Vec<String> {
        results
            .map(|h| h.envelope.header.message_id.unwrap().to_string())
            .collect()
    }

    fn mid(s: &str) -> String {
        format!("<{s}@workflow.local>")
    }

    #[test]
    fn default_order_is_most_recent_first() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("inbox");
        // Delivery order differs from date order on purpose.
        maildir::deliver(&mb, &at(2, "t2")).unwrap();
        maildir::deliver(&mb, &at(1, "t1")).unwrap();
        maildir::deliver(&mb, &at(3, "t3")).unwrap();
        let boxes = vec![mb];

        let all = search(&boxes, &Query::default()).unwrap();
        assert_eq!(ids(all), vec![mid("t3"), mid("t2"), mid("t1")]);

        let asc = Query {
            order: SortOrder::Ascending,
            limit: Some(2),
            ..Query::default()
        };
        assert_eq!(ids(search(&boxes, &asc).unwrap()), vec![mid("t1"), mid("t2")]);

        let recent = Query {
            limit: Some(1),
            ..Query::default()
        };
        assert_eq!(ids(search(&boxes, &recent).unwrap()), vec![mid("t3")]);
    }

    #[test]
    fn header_filters() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("inbox");
        maildir::deliver(&mb, &at(0, "review")).unwrap();

        let mut approval = at(5, "approval");
        approval.header.event_type = EventType::Approval;
        approval.header.from = Address::role("spec-reviewer").unwrap();
        approval.header.to = vec![Address::role("spec-writer").unwrap()];
        approval.header.artifacts = vec!["specs/todo/auth.md".to_string()];
        approval.header.workflow_state = Some(WorkflowState::Todo);
        approval.header.session_id = None;
        maildir::deliver(&mb, &approval).unwrap();
        let boxes = vec![mb];

        let q = |f: fn(&mut Query)| {
            let mut query = Query::default();
            f(&mut query);
            ids(search(&boxes, &query).unwrap())
        };

        assert_eq!(q(|q| q.event_type = Some(EventType::Approval)), vec![mid("approval")]);
        assert_eq!(
            q(|q| q.message_id = Some("<review@workflow.local>".parse().unwrap())),
            vec![mid("review")]
        );
        assert_eq!(q(|q| q.from_role = Some("spec-w".into())), vec![mid("review")]);
        assert_eq!(q(|q| q.to_role = Some("spec-writer".into())), vec![mid("approval")]);
        assert_eq!(q(|q| q.state = Some(WorkflowState::Proposed)), vec![mid("review")]);
        assert_eq!(q(|q| q.session_id = Some("sess-42".into())), vec![mid("review")]);
        assert_eq!(
            q(|q| q.artifact = Some("specs/proposed/auth.md".into())),
            vec![mid("review")]
        );
        assert_eq!(
            q(|q| q.artifact = Some("specs/**".into())),
            vec![mid("approval"), mid("review")]
        );
        assert!(q(|q| q.artifact = Some("docs/*.md".into())).is_empty());
    }

    #[test]
    fn bare_artifact_names_match_loosely() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("inbox");
        // Stored artifact is the glob `specs/*/auth.md`.
        maildir::deliver(&mb, &at(0, "review")).unwrap();
        let boxes = vec![mb];
        let by_artifact = |pattern: &str| {
            let query = Query {
                artifact: Some(pattern.to_string()),
                ..Query::default()
            };
            ids(search(&boxes, &query).unwrap())
        };

        assert_eq!(by_artifact("auth.md"), vec![mid("review")]);
        assert_eq!(by_artifact("*.md"), vec![mid("review")]);
        assert_eq!(by_artifact("auth"), vec![mid("review")]);
        assert!(by_artifact("billing.md").is_empty());
        assert!(by_artifact("other/auth.md").is_empty());
    }

    #[test]
    fn since_is_an_inclusive_lower_bound() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("inbox");
        maildir::deliver(&mb, &at(0, "old")).unwrap();
        maildir::deliver(&mb, &at(10, "new")).unwrap();

        let query = Query {
            since: Some(at(10, "x").header.date),
            ..Query::default()
        };
        assert_eq!(ids(search(&[mb], &query).unwrap()), vec![mid("new")]);
    }

    #[test]
    fn duplicates_across_mailboxes_are_reported_once() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let m = at(0, "shared");
        maildir::deliver(&a, &m).unwrap();
        maildir::deliver(&b, &m).unwrap();
        assert_eq!(search(&[a, b], &Query::default()).unwrap().count(), 1);
    }

    #[test]
    fn full_shape_reads_bodies_lazily() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("inbox");
        maildir::deliver(&mb, &at(0, "one")).unwrap();

        let env_only = search(&[mb.clone()], &Query::default()).unwrap();
        assert!(env_only.map(|h| h.body).all(|b| b.is_none()));

        let full = Query {
            shape: Shape::Full,
            ..Query::default()
        };
        let hits: Vec<SearchHit> = search(&[mb], &full).unwrap().collect();
        assert_eq!(hits[0].body.as_deref(), Some(sample().body.as_str()));
    }

    #[test]
    fn vanished_message_becomes_a_warning() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("inbox");
        let key = maildir::deliver(&mb, &at(0, "gone")).unwrap();
        maildir::deliver(&mb, &at(1, "kept")).unwrap();
        let full = Query {
            shape: Shape::Full,
            ..Query::default()
        };
        let mut results = search(&[mb.clone()], &full).unwrap();
        std::fs::remove_file(mb.join("new").join(key.as_str())).unwrap();

        assert_eq!(results.by_ref().count(), 1);
        assert_eq!(results.warnings().len(), 1);
    }

    #[test]
    fn corrupt_messages_do_not_abort_search() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("inbox");
        maildir::deliver(&mb, &at(0, "ok")).unwrap();
        std::fs::write(mb.join("new/0000000001.000000.P1Q1Rbad.host"), "garbage").unwrap();

        let results = search(&[mb], &Query::default()).unwrap();
        assert_eq!(results.warnings().len(), 1);
        assert_eq!(ids(results), vec![mid("ok")]);
    }

    #[test]
    fn query_deserializes_from_yaml() {
        let q: Query = serde_yaml::from_str(
            "event_type: approval\nfrom_role: spec\nlimit: 5\norder: ascending\nshape: full\narea: new\n",
        )
        .unwrap();
        assert_eq!(q.event_type, Some(EventType::Approval));
        assert_eq!(q.limit, Some(5));
        assert_eq!(q.order, SortOrder::Ascending);
        assert_eq!(q.shape, Shape::Full);
        assert_eq!(q.area, Area::New);
    }

    #[test]
    fn parse_since_forms() {
        let now = Utc.with_ymd_and_hms(2025, 11, 10, 12, 0, 0).unwrap();
        assert_eq!(
            parse_since("7d", now).unwrap(),
            Utc.with_ymd_and_hms(2025, 11, 3, 12, 0, 0).unwrap().fixed_offset()
        );
        assert_eq!(
            parse_since("24h", now).unwrap(),
            Utc.with_ymd_and_hms(2025, 11, 9, 12, 0, 0).unwrap().fixed_offset()
        );
        assert_eq!(
            parse_since("30m", now).unwrap(),
            Utc.with_ymd_and_hms(2025, 11, 10, 11, 30, 0).unwrap().fixed_offset()
        );
        assert_eq!(
            parse_since("2025-11-01", now).unwrap(),
            Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap().fixed_offset()
        );
        assert!(parse_since("2025-11-01T08:00:00+02:00", now).is_ok());
        assert!(matches!(parse_since("soon", now), Err(WfmailError::InvalidSince(_))));
        assert!(parse_since("7w", now).is_err());
    }

    #[test]
    fn pending_for_role_is_oldest_first_within_window() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("spec-reviewer");
        let now = at(60, "now").header.date.with_timezone(&Utc);

        maildir::deliver(&mb, &at(-60 * 24 * 30, "stale")).unwrap();
        maildir::deliver(&mb, &at(20, "second")).unwrap();
        maildir::deliver(&mb, &at(10, "first")).unwrap();
        let mut chatter = at(15, "chatter");
        chatter.header.event_type = EventType::StatusUpdate;
        maildir::deliver(&mb, &chatter).unwrap();
        let mut elsewhere = at(16, "elsewhere");
        elsewhere.header.to = vec![Address::role("implementer").unwrap()];
        maildir::deliver(&mb, &elsewhere).unwrap();
        let done = maildir::deliver(&mb, &at(12, "done")).unwrap();
        maildir::mark_seen(&mb, &done).unwrap();

        let config = RoleConfig {
            event_types: vec![EventType::ReviewRequest],
            ..RoleConfig::default()
        };
        let pending =
            pending_for_role(&[mb.clone()], "spec-reviewer", &config, Area::New, now).unwrap();
        assert_eq!(ids(pending), vec![mid("first"), mid("second")]);

        let with_seen = pending_for_role(&[mb], "spec-reviewer", &config, Area::Both, now).unwrap();
        assert_eq!(ids(with_seen), vec![mid("first"), mid("done"), mid("second")]);
    }

    #[test]
    fn oversized_catchup_window_covers_everything() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("spec-reviewer");
        let now = at(60, "now").header.date.with_timezone(&Utc);
        maildir::deliver(&mb, &at(-60 * 24 * 365, "ancient")).unwrap();
        maildir::deliver(&mb, &at(10, "recent")).unwrap();

        let config = RoleConfig {
            catchup_days: 200_000_000,
            ..RoleConfig::default()
        };
        let pending =
            pending_for_role(&[mb], "spec-reviewer", &config, Area::New, now).unwrap();
        assert_eq!(ids(pending), vec![mid("ancient"), mid("recent")]);
    }
}
