use crate::output::{print_json, print_table, print_warnings};
use anyhow::Context;
use std::path::Path;
use wfmail_core::{
    config::Config,
    maildir::Area,
    paths,
    search::{pending_for_role, SearchHit},
};

pub fn run(root: &Path, role: &str, include_seen: bool, json: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default(root).context("failed to load wfmail.yaml")?;
    let role_config = config.role(role)?;
    let mailbox = paths::mailbox_path(root, role);
    let area = if include_seen { Area::Both } else { Area::New };

    let mut results = pending_for_role(
        std::slice::from_ref(&mailbox),
        role,
        role_config,
        area,
        chrono::Utc::now(),
    )?;
    let hits: Vec<SearchHit> = results.by_ref().collect();
    print_warnings(results.warnings());

    if json {
        print_json(&serde_json::json!({
            "role": role,
            "catchup_days": role_config.catchup_days,
            "catchup_artifacts": role_config.catchup_artifacts,
            "messages": hits,
        }))?;
        return Ok(());
    }

    if !role_config.catchup_artifacts.is_empty() {
        println!("Catch-up artifacts for {role}:");
        for pattern in &role_config.catchup_artifacts {
            println!("  {pattern}");
        }
        println!();
    }
    if hits.is_empty() {
        println!(
            "Nothing pending for {role} in the last {} day(s).",
            role_config.catchup_days
        );
        return Ok(());
    }
    let rows = hits.iter().map(|h| super::envelope_row(&h.envelope)).collect();
    print_table(super::ENVELOPE_HEADERS, rows);
    Ok(())
}
