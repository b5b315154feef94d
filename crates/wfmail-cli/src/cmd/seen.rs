use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use wfmail_core::maildir::{self, MessageKey};

pub fn run(root: &Path, mailbox: &str, keys: &[String], json: bool) -> anyhow::Result<()> {
    if keys.is_empty() {
        anyhow::bail!("no message keys given");
    }
    let mailbox = super::mailbox_arg(root, mailbox)?;
    let mut marked = Vec::new();
    for raw in keys {
        let key: MessageKey = raw.parse()?;
        maildir::mark_seen(&mailbox, &key)
            .with_context(|| format!("cannot mark {key} seen in {}", mailbox.display()))?;
        marked.push(key);
    }

    if json {
        print_json(&serde_json::json!({ "seen": marked }))?;
    } else {
        for key in &marked {
            println!("seen  {key}");
        }
    }
    Ok(())
}
