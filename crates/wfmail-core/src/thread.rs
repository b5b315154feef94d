//! Conversation threads reconstructed from `Message-ID`, `In-Reply-To` and `References`.
//!
//! Threads are computed on demand from a header-only scan; nothing is indexed.

use crate::error::{Result, WfmailError};
use crate::maildir::{self, Area, Envelope, MessageKey, ScanWarning};
use crate::message::Message;
use crate::types::MessageId;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize)]
pub struct ThreadNode {
    pub message: Message,
    pub key: MessageKey,
    pub mailbox: PathBuf,
    /// Set when this node's parent is referenced but not present in any mailbox.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_parent: Option<MessageId>,
    pub children: Vec<ThreadNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadTree {
    /// The id the thread was resolved from.
    pub origin: MessageId,
    pub roots: Vec<ThreadNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ScanWarning>,
}

impl ThreadTree {
    /// Depth-first pre-order, each node paired with its depth.
    pub fn walk(&self) -> Vec<(usize, &ThreadNode)> {
        fn visit<'a>(node: &'a ThreadNode, depth: usize, out: &mut Vec<(usize, &'a ThreadNode)>) {
            out.push((depth, node));
            for child in &node.children {
                visit(child, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        for root in &self.roots {
            visit(root, 0, &mut out);
        }
        out
    }

    pub fn flatten(&self) -> Vec<&Message> {
        self.walk().into_iter().map(|(_, n)| &n.message).collect()
    }

    pub fn len(&self) -> usize {
        self.walk().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Reconstruct the thread containing `origin` from every message in `mailboxes`.
///
/// Any member of a thread resolves to the whole thread. A message whose parent is
/// gone becomes an extra root with `missing_parent` set.
pub fn resolve_thread(mailboxes: &[PathBuf], origin: &MessageId) -> Result<ThreadTree> {
    let scan = maildir::scan(mailboxes, Area::Both);

    // One envelope per id; first occurrence wins when a message was sent to several mailboxes.
    let mut seen = HashSet::new();
    let candidates: Vec<Envelope> = scan
        .envelopes
        .into_iter()
        .filter(|e| match &e.header.message_id {
            Some(id) => seen.insert(id.clone()),
            None => false,
        })
        .collect();

    let members = collect(candidates, origin);
    if members.is_empty() {
        return Err(WfmailError::ThreadNotFound(origin.to_string()));
    }

    let by_id: HashMap<MessageId, Envelope> = members
        .into_iter()
        .filter_map(|e| e.header.message_id.clone().map(|id| (id, e)))
        .collect();
    check_cycles(&by_id)?;

    let mut nodes: HashMap<MessageId, ThreadNode> = HashMap::new();
    for (id, env) in &by_id {
        let message = maildir::read(&env.mailbox, &env.key)?;
        let missing_parent = env
            .header
            .parent_id()
            .filter(|p| !by_id.contains_key(*p))
            .cloned();
        nodes.insert(
            id.clone(),
            ThreadNode {
                message,
                key: env.key.clone(),
                mailbox: env.mailbox.clone(),
                missing_parent,
                children: Vec::new(),
            },
        );
    }

    let mut children: HashMap<MessageId, Vec<MessageId>> = HashMap::new();
    let mut root_ids = Vec::new();
    for (id, env) in &by_id {
        match env.header.parent_id().filter(|p| by_id.contains_key(*p)) {
            Some(parent) => children.entry(parent.clone()).or_default().push(id.clone()),
            None => root_ids.push(id.clone()),
        }
    }

    let mut roots: Vec<ThreadNode> = root_ids
        .iter()
        .filter_map(|id| build(id, &mut nodes, &children))
        .collect();
    sort_nodes(&mut roots);

    tracing::debug!(
        origin = %origin,
        messages = by_id.len(),
        roots = roots.len(),
        "resolved thread"
    );

    Ok(ThreadTree {
        origin: origin.clone(),
        roots,
        warnings: scan.warnings,
    })
}

/// Grow the id set from `origin` until no further envelope touches it.
fn collect(candidates: Vec<Envelope>, origin: &MessageId) -> Vec<Envelope> {
    let mut ids: HashSet<MessageId> = HashSet::from([origin.clone()]);
    let mut pending = candidates;
    let mut members = Vec::new();
    loop {
        let (touching, rest): (Vec<Envelope>, Vec<Envelope>) =
            pending.into_iter().partition(|e| {
                let h = &e.header;
                h.message_id
                    .iter()
                    .chain(h.in_reply_to.iter())
                    .chain(h.references.iter())
                    .any(|id| ids.contains(id))
            });
        if touching.is_empty() {
            return members;
        }
        for env in &touching {
            let h = &env.header;
            ids.extend(
                h.message_id
                    .iter()
                    .chain(h.in_reply_to.iter())
                    .chain(h.references.iter())
                    .cloned(),
            );
        }
        members.extend(touching);
        pending = rest;
    }
}

/// Fail if any ancestry path (`In-Reply-To` or any `References` entry) leads back
/// to a message already on that path.
fn check_cycles(by_id: &HashMap<MessageId, Envelope>) -> Result<()> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        OnPath,
        Done,
    }

    fn visit<'a>(
        id: &'a MessageId,
        by_id: &'a HashMap<MessageId, Envelope>,
        marks: &mut HashMap<&'a MessageId, Mark>,
    ) -> Result<()> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::OnPath) => {
                return Err(WfmailError::ThreadCycleDetected(id.to_string()));
            }
            None => {}
        }
        let Some(env) = by_id.get(id) else {
            return Ok(());
        };
        marks.insert(id, Mark::OnPath);
        let header = &env.header;
        for ancestor in header.in_reply_to.iter().chain(header.references.iter()) {
            if let Some((key, _)) = by_id.get_key_value(ancestor) {
                visit(key, by_id, marks)?;
            }
        }
        marks.insert(id, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for id in by_id.keys() {
        visit(id, by_id, &mut marks)?;
    }
    Ok(())
}

fn build(
    id: &MessageId,
    nodes: &mut HashMap<MessageId, ThreadNode>,
    children: &HashMap<MessageId, Vec<MessageId>>,
) -> Option<ThreadNode> {
    let mut node = nodes.remove(id)?;
    if let Some(kids) = children.get(id) {
        node.children = kids
            .iter()
            .filter_map(|kid| build(kid, nodes, children))
            .collect();
        sort_nodes(&mut node.children);
    }
    Some(node)
}

fn sort_nodes(nodes: &mut [ThreadNode]) {
    nodes.sort_by(|a, b| {
        a.message
            .header
            .date
            .cmp(&b.message.header.date)
            .then_with(|| a.message.message_id().cmp(&b.message.message_id()))
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
