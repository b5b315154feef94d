use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use wfmail_core::{
    config::{Config, RoleConfig},
    io, maildir, paths,
};

pub fn run(root: &Path, extra_roles: &[String], json: bool) -> anyhow::Result<()> {
    io::ensure_dir(root).with_context(|| format!("failed to create {}", root.display()))?;

    let config_path = paths::config_path(root);
    let existed = config_path.exists();
    let mut config = Config::load_or_default(root).context("failed to load wfmail.yaml")?;

    let mut added = Vec::new();
    for role in extra_roles {
        paths::validate_role(role).with_context(|| format!("invalid role name '{role}'"))?;
        if !config.roles.contains_key(role) {
            config.roles.insert(role.clone(), RoleConfig::default());
            added.push(role.clone());
        }
    }
    if !existed || !added.is_empty() {
        config.save(root).context("failed to write wfmail.yaml")?;
    }

    let mut mailboxes = Vec::new();
    for name in config.roles.keys().chain(config.panels.keys()) {
        let mailbox = paths::mailbox_path(root, name);
        maildir::create(&mailbox)
            .with_context(|| format!("failed to create mailbox {}", mailbox.display()))?;
        mailboxes.push(name.clone());
    }

    if json {
        print_json(&serde_json::json!({
            "root": root,
            "config_created": !existed,
            "roles_added": added,
            "mailboxes": mailboxes,
        }))?;
        return Ok(());
    }

    println!("Initializing wfmail in: {}", root.display());
    if existed {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        println!("  created: {}", paths::CONFIG_FILE);
    }
    for role in &added {
        println!("  added role: {role}");
    }
    for name in &mailboxes {
        println!("  mailbox: {name}/");
    }
    Ok(())
}
