pub mod config;
pub mod consensus;
pub mod init;
pub mod list;
pub mod notify;
pub mod pending;
pub mod read;
pub mod search;
pub mod seen;
pub mod send;
pub mod thread;

use crate::output::print_json;
use anyhow::Context;
use std::path::{Path, PathBuf};
use wfmail_core::{
    maildir,
    message::Message,
    notify::{Delivery, Recipient},
    paths, WfmailError,
};

/// A mailbox argument is either a role or panel name under the root, or a path.
pub fn mailbox_arg(root: &Path, arg: &str) -> anyhow::Result<PathBuf> {
    if arg.contains(std::path::MAIN_SEPARATOR) || arg.contains('/') || arg.starts_with('.') {
        return Ok(PathBuf::from(arg));
    }
    paths::validate_role(arg).with_context(|| format!("invalid mailbox name '{arg}'"))?;
    Ok(paths::mailbox_path(root, arg))
}

pub fn mailbox_args(root: &Path, args: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    if args.is_empty() {
        return all_mailboxes(root);
    }
    args.iter().map(|a| mailbox_arg(root, a)).collect()
}

/// Every maildir directly under the root, sorted by name.
pub fn all_mailboxes(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(root)
        .with_context(|| format!("cannot read maildir root {}", root.display()))?
    {
        let path = entry?.path();
        if maildir::is_mailbox(&path) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

pub fn mailbox_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Send and, on partial delivery, report who already has the message before failing,
/// so a retry can target only the failed recipients.
pub fn send_reporting(
    message: &Message,
    recipients: &[Recipient],
    json: bool,
) -> anyhow::Result<Vec<Delivery>> {
    match wfmail_core::notify::send(message, recipients) {
        Ok(deliveries) => Ok(deliveries),
        Err(WfmailError::PartialDelivery(partial)) => {
            if json {
                print_json(&partial)?;
            } else {
                for d in &partial.delivered {
                    println!("delivered  {:<20} {}", d.recipient, d.key);
                }
                for f in &partial.failed {
                    println!("FAILED     {:<20} {}", f.recipient, f.mailbox.display());
                }
            }
            Err(WfmailError::PartialDelivery(partial).into())
        }
        Err(e) => Err(anyhow::Error::new(e).context("send failed")),
    }
}

pub const ENVELOPE_HEADERS: &[&str] = &["KEY", "MAILBOX", "DATE", "FROM", "EVENT", "STATE", "SUBJECT"];

pub fn envelope_row(env: &maildir::Envelope) -> Vec<String> {
    let h = &env.header;
    let seen = if env.area == maildir::Area::Cur { "" } else { "*" };
    vec![
        format!("{}{}", env.key, seen),
        mailbox_name(&env.mailbox),
        h.date.format("%Y-%m-%d %H:%M").to_string(),
        h.from.role.clone(),
        h.event_type.to_string(),
        h.workflow_state.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
        crate::output::truncate(&h.subject, 60),
    ]
}
