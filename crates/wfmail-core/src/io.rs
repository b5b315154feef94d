use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` atomically with `data`, flushed to disk first.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Write `data` to a hidden file in `staging`, sync it, then rename it to `dest`.
///
/// Never replaces an existing `dest`. On any error the staging file is removed
/// and `dest` does not exist.
pub fn write_exclusive(staging: &Path, dest: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".deliver-")
        .tempfile_in(staging)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(dest).map_err(|e| e.error)?;
    Ok(())
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WfmailError;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_replaces_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/wfmail.yaml");
        atomic_write(&path, b"domain: workflow.local\n").unwrap();
        atomic_write(&path, b"domain: team.example\n").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "domain: team.example\n"
        );
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn write_exclusive_moves_out_of_staging() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("tmp");
        ensure_dir(&staging).unwrap();
        let dest = dir.path().join("msg");

        write_exclusive(&staging, &dest, b"hello").unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
    }

    #[test]
    fn write_exclusive_never_clobbers() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("tmp");
        ensure_dir(&staging).unwrap();
        let dest = dir.path().join("msg");
        std::fs::write(&dest, b"first").unwrap();

        let err = write_exclusive(&staging, &dest, b"second").unwrap_err();
        assert!(matches!(err, WfmailError::Io(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists));
        assert_eq!(std::fs::read(&dest).unwrap(), b"first");
        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
    }
}
