use crate::output::print_json;
use anyhow::Context;
use std::io::Write;
use std::path::Path;
use wfmail_core::{
    maildir::{self, MessageKey},
    wire,
};

pub fn run(
    root: &Path,
    mailbox: &str,
    key: &str,
    raw: bool,
    mark_seen: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mailbox = super::mailbox_arg(root, mailbox)?;
    let key: MessageKey = key.parse()?;
    let message = maildir::read(&mailbox, &key)
        .with_context(|| format!("cannot read {key} from {}", mailbox.display()))?;

    if json {
        print_json(&serde_json::json!({
            "key": key,
            "message": message,
        }))?;
    } else if raw {
        let (_, path) = maildir::locate(&mailbox, &key)?;
        let bytes = std::fs::read(&path)?;
        std::io::stdout().write_all(&bytes)?;
    } else {
        let rendered = wire::serialize(&message);
        std::io::stdout().write_all(&rendered)?;
    }

    if mark_seen {
        maildir::mark_seen(&mailbox, &key)?;
    }
    Ok(())
}
