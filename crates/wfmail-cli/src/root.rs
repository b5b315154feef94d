use std::path::{Path, PathBuf};
use wfmail_core::paths::DEFAULT_ROOT;

/// Resolve the maildir root.
///
/// Priority:
/// 1. `--root` flag / `WORKFLOW_MAILDIR` env var (passed in as `explicit`)
/// 2. `~/Maildir/workflow`
/// 3. `Maildir/workflow` relative to the working directory when no home is known
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    match home::home_dir() {
        Some(home) => home.join(DEFAULT_ROOT),
        None => PathBuf::from(DEFAULT_ROOT),
    }
}
