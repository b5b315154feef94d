use crate::output::{print_json, print_table, print_warnings};
use std::path::Path;
use wfmail_core::maildir::{self, Area};

pub fn run(
    root: &Path,
    mailbox: &str,
    area: &str,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let mailbox = super::mailbox_arg(root, mailbox)?;
    let area: Area = area.parse()?;
    if !maildir::is_mailbox(&mailbox) {
        anyhow::bail!("no mailbox at {}", mailbox.display());
    }

    let mut scan = maildir::scan(std::slice::from_ref(&mailbox), area);
    if let Some(n) = limit {
        scan.envelopes.truncate(n);
    }
    print_warnings(&scan.warnings);

    if json {
        print_json(&scan.envelopes)?;
        return Ok(());
    }
    if scan.envelopes.is_empty() {
        println!("No messages.");
        return Ok(());
    }
    let rows = scan.envelopes.iter().map(super::envelope_row).collect();
    print_table(super::ENVELOPE_HEADERS, rows);
    Ok(())
}
