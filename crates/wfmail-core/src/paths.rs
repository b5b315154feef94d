use crate::error::{Result, WfmailError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Layout constants
// ---------------------------------------------------------------------------

pub const TMP_DIR: &str = "tmp";
pub const NEW_DIR: &str = "new";
pub const CUR_DIR: &str = "cur";

pub const CONFIG_FILE: &str = "wfmail.yaml";

pub const DEFAULT_DOMAIN: &str = "workflow.local";
pub const DEFAULT_ROOT: &str = "Maildir/workflow";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Mailbox of a role or panel under the mail root: `<root>/<name>/`.
pub fn mailbox_path(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn tmp_dir(mailbox: &Path) -> PathBuf {
    mailbox.join(TMP_DIR)
}

pub fn new_dir(mailbox: &Path) -> PathBuf {
    mailbox.join(NEW_DIR)
}

pub fn cur_dir(mailbox: &Path) -> PathBuf {
    mailbox.join(CUR_DIR)
}

// ---------------------------------------------------------------------------
// Role / domain validation
// ---------------------------------------------------------------------------

static ROLE_RE: OnceLock<Regex> = OnceLock::new();
static DOMAIN_RE: OnceLock<Regex> = OnceLock::new();

fn role_re() -> &'static Regex {
    ROLE_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").unwrap())
}

fn domain_re() -> &'static Regex {
    DOMAIN_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-]*(\.[A-Za-z0-9\-]+)*$").unwrap())
}

/// Role names double as mailbox directory names, so `..` and `/` are never allowed.
pub fn validate_role(role: &str) -> Result<()> {
    if role.is_empty() || role.len() > 64 || !role_re().is_match(role) || role.contains("..") {
        return Err(WfmailError::UnknownRoleIdentifier(role.to_string()));
    }
    Ok(())
}

pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() || domain.len() > 253 || !domain_re().is_match(domain) {
        return Err(WfmailError::UnknownRoleIdentifier(domain.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
