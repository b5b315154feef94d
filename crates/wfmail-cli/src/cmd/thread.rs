use crate::output::{print_json, print_warnings, truncate};
use std::path::Path;
use wfmail_core::{thread::resolve_thread, types::MessageId};

pub fn run(root: &Path, message_id: &str, mailboxes: &[String], json: bool) -> anyhow::Result<()> {
    let id: MessageId = message_id.parse()?;
    let mailboxes = super::mailbox_args(root, mailboxes)?;
    let tree = resolve_thread(&mailboxes, &id)?;
    print_warnings(&tree.warnings);

    if json {
        print_json(&tree)?;
        return Ok(());
    }
    for (depth, node) in tree.walk() {
        let h = &node.message.header;
        let marker = if h.message_id.as_ref() == Some(&id) { ">" } else { " " };
        print!(
            "{marker} {}{}  {:<16} {}",
            "  ".repeat(depth),
            h.date.format("%Y-%m-%d %H:%M"),
            h.from.role,
            truncate(&h.subject, 60)
        );
        if let Some(parent) = &node.missing_parent {
            print!("  (parent {parent} missing)");
        }
        println!();
    }
    Ok(())
}
