//! Maildir-backed mailbox store.
//!
//! Layout per mailbox:
//! - `tmp/`: in-flight writes, never listed
//! - `new/`: delivered, unread
//! - `cur/`: delivered and seen; filenames carry the `:2,<flags>` info suffix
//!
//! Delivery writes into `tmp/` and renames into `new/`, so a reader listing `new/`
//! never sees a half-written message. The filesystem is the only source of truth:
//! nothing here caches directory contents between calls.

use crate::error::{Result, WfmailError};
use crate::message::{Message, MessageHeader};
use crate::{io, paths, wire};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const SEEN_INFO: &str = ":2,S";

// ---------------------------------------------------------------------------
// Area
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    New,
    Cur,
    #[default]
    #[serde(alias = "all")]
    Both,
}

impl Area {
    fn dirs(self) -> &'static [Area] {
        match self {
            Area::New => &[Area::New],
            Area::Cur => &[Area::Cur],
            Area::Both => &[Area::New, Area::Cur],
        }
    }

    fn dir(self, mailbox: &Path) -> PathBuf {
        match self {
            Area::Cur => paths::cur_dir(mailbox),
            _ => paths::new_dir(mailbox),
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Area::New => "new",
            Area::Cur => "cur",
            Area::Both => "both",
        })
    }
}

impl FromStr for Area {
    type Err = WfmailError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(Area::New),
            "cur" => Ok(Area::Cur),
            "both" | "all" => Ok(Area::Both),
            _ => Err(WfmailError::MalformedHeader(format!(
                "unknown mailbox area '{s}': must be new, cur, or both"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// MessageKey
// ---------------------------------------------------------------------------

static DELIVERY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Opaque, stable handle for a delivered message: its maildir base filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageKey(String);

impl MessageKey {
    /// `<secs>.<micros>.P<pid>Q<counter>R<rand>.<host>`. Time fields and the counter
    /// are zero-padded so lexical order is delivery order within a process; pid and a
    /// random tag keep concurrent deliveries from different processes apart.
    pub fn generate() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let counter = DELIVERY_COUNTER.fetch_add(1, Ordering::Relaxed);
        let rand = uuid::Uuid::new_v4().simple().to_string();
        MessageKey(format!(
            "{:010}.{:06}.P{}Q{:06}R{}.{}",
            now.as_secs(),
            now.subsec_micros(),
            std::process::id(),
            counter,
            &rand[..8],
            host_tag()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Seconds-since-epoch prefix, when the key follows the maildir naming convention.
    fn delivered_secs(&self) -> Option<u64> {
        let digits: String = self.0.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }
}

fn host_tag() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_default();
    let cleaned: String = host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "localhost".to_string()
    } else {
        cleaned
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MessageKey {
    type Err = WfmailError;

    /// Accepts a bare key or a `cur/` filename with its `:2,<flags>` suffix.
    fn from_str(s: &str) -> Result<Self> {
        let base = s.split(':').next().unwrap_or_default();
        if base.is_empty() || base.starts_with('.') || base.contains(['/', '\\']) {
            return Err(WfmailError::MessageNotFound(s.to_string()));
        }
        Ok(MessageKey(base.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Envelope / Scan
// ---------------------------------------------------------------------------

/// Header-only view of a stored message, produced without reading its body.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub mailbox: PathBuf,
    pub key: MessageKey,
    /// `New` (unread) or `Cur` (seen).
    pub area: Area,
    pub header: MessageHeader,
}

impl Envelope {
    pub fn read_message(&self) -> Result<Message> {
        read(&self.mailbox, &self.key)
    }
}

/// A message that could not be read during a sweep. The sweep carries on.
#[derive(Debug, Clone, Serialize)]
pub struct ScanWarning {
    pub mailbox: PathBuf,
    pub key: Option<MessageKey>,
    pub error: String,
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}: {}: {}", self.mailbox.display(), key, self.error),
            None => write!(f, "{}: {}", self.mailbox.display(), self.error),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scan {
    pub envelopes: Vec<Envelope>,
    pub warnings: Vec<ScanWarning>,
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Snapshot of a mailbox listing, oldest delivery first. Clone it to iterate again.
#[derive(Debug, Clone)]
pub struct Keys {
    inner: std::vec::IntoIter<MessageKey>,
}

impl Iterator for Keys {
    type Item = MessageKey;

    fn next(&mut self) -> Option<MessageKey> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Keys {}

struct Entry {
    key: MessageKey,
    area: Area,
    path: PathBuf,
    order: u64,
}

fn entries(mailbox: &Path, area: Area) -> Result<Vec<Entry>> {
    let mut out = Vec::new();
    for &which in area.dirs() {
        let dir = which.dir(mailbox);
        if !dir.is_dir() {
            continue;
        }
        for dirent in std::fs::read_dir(&dir)? {
            let dirent = dirent?;
            let name = dirent.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !dirent.file_type()?.is_file() {
                continue;
            }
            let Ok(key) = name.parse::<MessageKey>() else {
                continue;
            };
            let order = match key.delivered_secs() {
                Some(secs) => secs,
                None => dirent
                    .metadata()?
                    .modified()?
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default(),
            };
            out.push(Entry {
                key,
                area: which,
                path: dirent.path(),
                order,
            });
        }
    }
    out.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.key.cmp(&b.key)));
    Ok(out)
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Provision `tmp/`, `new/` and `cur/`. Idempotent.
pub fn create(mailbox: &Path) -> Result<()> {
    if mailbox.exists() && !mailbox.is_dir() {
        return Err(WfmailError::InvalidMailbox(mailbox.to_path_buf()));
    }
    io::ensure_dir(&paths::tmp_dir(mailbox))?;
    io::ensure_dir(&paths::new_dir(mailbox))?;
    io::ensure_dir(&paths::cur_dir(mailbox))?;
    Ok(())
}

pub fn is_mailbox(path: &Path) -> bool {
    paths::new_dir(path).is_dir() && paths::cur_dir(path).is_dir()
}

/// Validate, write to `tmp/`, then atomically rename into `new/`.
///
/// On error nothing is visible in `new/` or `cur/`; the caller may retry, which
/// produces a fresh key.
pub fn deliver(mailbox: &Path, message: &Message) -> Result<MessageKey> {
    message.validate()?;
    create(mailbox)?;
    let data = wire::serialize(message);

    let key = MessageKey::generate();
    let dest = paths::new_dir(mailbox).join(key.as_str());
    io::write_exclusive(&paths::tmp_dir(mailbox), &dest, &data)?;

    tracing::debug!(
        mailbox = %mailbox.display(),
        key = %key,
        message_id = ?message.message_id().map(|id| id.as_str()),
        "delivered message"
    );
    Ok(key)
}

/// List keys in delivery order without opening any message.
pub fn list(mailbox: &Path, area: Area) -> Result<Keys> {
    let keys: Vec<MessageKey> = entries(mailbox, area)?.into_iter().map(|e| e.key).collect();
    Ok(Keys {
        inner: keys.into_iter(),
    })
}

/// Find the file currently holding `key`, in `new/` or `cur/`.
pub fn locate(mailbox: &Path, key: &MessageKey) -> Result<(Area, PathBuf)> {
    let in_new = paths::new_dir(mailbox).join(key.as_str());
    if in_new.is_file() {
        return Ok((Area::New, in_new));
    }
    let cur = paths::cur_dir(mailbox);
    for candidate in [
        cur.join(format!("{key}{SEEN_INFO}")),
        cur.join(key.as_str()),
    ] {
        if candidate.is_file() {
            return Ok((Area::Cur, candidate));
        }
    }
    // Other flag combinations (`:2,RS`, ...) written by other maildir clients.
    if cur.is_dir() {
        let prefix = format!("{key}:");
        for dirent in std::fs::read_dir(&cur)? {
            let dirent = dirent?;
            if dirent.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok((Area::Cur, dirent.path()));
            }
        }
    }
    Err(WfmailError::MessageNotFound(key.to_string()))
}

/// Parse one message fully.
pub fn read(mailbox: &Path, key: &MessageKey) -> Result<Message> {
    let (_, path) = locate(mailbox, key)?;
    let data = std::fs::read(&path)?;
    wire::parse(&data)
}

/// Header-only read: stops at the blank separator line.
pub fn read_envelope(mailbox: &Path, key: &MessageKey) -> Result<Envelope> {
    let (area, path) = locate(mailbox, key)?;
    envelope_at(mailbox, key.clone(), area, &path)
}

fn envelope_at(mailbox: &Path, key: MessageKey, area: Area, path: &Path) -> Result<Envelope> {
    let file = std::fs::File::open(path)?;
    let head = wire::read_header_block(BufReader::new(file))?;
    let header = wire::parse_header_block(&head)?;
    Ok(Envelope {
        mailbox: mailbox.to_path_buf(),
        key,
        area,
        header,
    })
}

/// Move a message from `new/` to `cur/`. Marking an already-seen message is a no-op.
pub fn mark_seen(mailbox: &Path, key: &MessageKey) -> Result<()> {
    let from = paths::new_dir(mailbox).join(key.as_str());
    let to = paths::cur_dir(mailbox).join(format!("{key}{SEEN_INFO}"));
    match std::fs::rename(&from, &to) {
        Ok(()) => {
            tracing::debug!(mailbox = %mailbox.display(), key = %key, "marked seen");
            Ok(())
        }
        // Already moved, possibly by a concurrent reader.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => match locate(mailbox, key)? {
            (Area::Cur, _) => Ok(()),
            _ => Err(e.into()),
        },
        Err(e) => Err(e.into()),
    }
}

/// Header-only sweep across mailboxes. Unreadable messages become warnings and
/// never abort the sweep; missing mailboxes contribute nothing.
pub fn scan(mailboxes: &[PathBuf], area: Area) -> Scan {
    let mut scan = Scan::default();
    for mailbox in mailboxes {
        let listed = match entries(mailbox, area) {
            Ok(listed) => listed,
            Err(e) => {
                tracing::warn!(mailbox = %mailbox.display(), error = %e, "cannot list mailbox");
                scan.warnings.push(ScanWarning {
                    mailbox: mailbox.clone(),
                    key: None,
                    error: e.to_string(),
                });
                continue;
            }
        };
        for entry in listed {
            match envelope_at(mailbox, entry.key.clone(), entry.area, &entry.path) {
                Ok(env) => scan.envelopes.push(env),
                Err(e) => {
                    tracing::warn!(
                        mailbox = %mailbox.display(),
                        key = %entry.key,
                        error = %e,
                        "skipping unreadable message"
                    );
                    scan.warnings.push(ScanWarning {
                        mailbox: mailbox.clone(),
                        key: Some(entry.key),
                        error: e.to_string(),
                    });
                }
            }
        }
    }
    scan
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::tests::sample;
    use crate::types::MessageId;
    use tempfile::TempDir;

    fn files_in(dir: PathBuf) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn numbered(n: usize) -> Message {
        let mut m = sample();
        m.header.message_id = Some(format!("<m{n}.spec-writer@workflow.local>").parse().unwrap());
        m
    }

    #[test]
    fn create_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("spec-reviewer");
        create(&mb).unwrap();
        create(&mb).unwrap();
        assert!(is_mailbox(&mb));
        assert!(mb.join("tmp").is_dir());
    }

    #[test]
    fn deliver_lands_in_new_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("spec-reviewer");
        let m = sample();
        let key = deliver(&mb, &m).unwrap();

        assert_eq!(files_in(mb.join("new")), vec![key.to_string()]);
        assert!(files_in(mb.join("tmp")).is_empty());
        assert_eq!(read(&mb, &key).unwrap(), m);
        assert_eq!(read_envelope(&mb, &key).unwrap().header, m.header);
    }

    #[test]
    fn invalid_message_is_never_delivered() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("spec-reviewer");
        let mut m = sample();
        m.header.artifacts.clear();
        assert!(deliver(&mb, &m).is_err());
        assert_eq!(list(&mb, Area::Both).unwrap().count(), 0);
    }

    #[test]
    fn list_is_in_delivery_order_and_restartable() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("inbox");
        let keys: Vec<MessageKey> = (0..5).map(|i| deliver(&mb, &numbered(i)).unwrap()).collect();

        let listed = list(&mb, Area::New).unwrap();
        let again = listed.clone();
        assert_eq!(listed.collect::<Vec<_>>(), keys);
        assert_eq!(again.len(), 5);
    }

    #[test]
    fn partial_write_in_tmp_is_invisible() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("inbox");
        deliver(&mb, &sample()).unwrap();

        // Simulate a sender interrupted halfway through its write.
        let serialized = wire::serialize(&numbered(9));
        std::fs::write(mb.join("tmp/1700000000.000001.P1Q0Rdead.host"), &serialized[..40]).unwrap();

        assert_eq!(list(&mb, Area::Both).unwrap().count(), 1);
        let scan = scan(&[mb.clone()], Area::Both);
        assert_eq!(scan.envelopes.len(), 1);
        assert!(scan.warnings.is_empty());
    }

    #[test]
    fn concurrent_deliveries_never_collide() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("shared");
        create(&mb).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let mb = mb.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .map(|i| deliver(&mb, &numbered(t * 100 + i)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut keys: Vec<MessageKey> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 80);
        let scan = scan(&[mb], Area::New);
        assert_eq!(scan.envelopes.len(), 80);
        assert!(scan.warnings.is_empty());
    }

    #[test]
    fn mark_seen_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("inbox");
        let key = deliver(&mb, &sample()).unwrap();

        mark_seen(&mb, &key).unwrap();
        mark_seen(&mb, &key).unwrap();

        assert!(files_in(mb.join("new")).is_empty());
        assert_eq!(files_in(mb.join("cur")), vec![format!("{key}:2,S")]);
        assert_eq!(list(&mb, Area::Cur).unwrap().collect::<Vec<_>>(), vec![key.clone()]);
        assert_eq!(read_envelope(&mb, &key).unwrap().area, Area::Cur);
        assert!(read(&mb, &key).is_ok());
    }

    #[test]
    fn unknown_key_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("inbox");
        create(&mb).unwrap();
        let key: MessageKey = "1700000000.000000.P1Q1Rabc.host".parse().unwrap();
        assert!(matches!(mark_seen(&mb, &key), Err(WfmailError::MessageNotFound(_))));
        assert!(matches!(read(&mb, &key), Err(WfmailError::MessageNotFound(_))));
    }

    #[test]
    fn foreign_flags_in_cur_are_found() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("inbox");
        create(&mb).unwrap();
        std::fs::write(
            mb.join("cur/1700000000.M1P2Q3.host:2,RS"),
            wire::serialize(&sample()),
        )
        .unwrap();
        let key: MessageKey = "1700000000.M1P2Q3.host".parse().unwrap();
        assert_eq!(read(&mb, &key).unwrap().header.subject, sample().header.subject);
        mark_seen(&mb, &key).unwrap();
    }

    #[test]
    fn scan_skips_corrupt_messages_and_reports_them() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("inbox");
        deliver(&mb, &sample()).unwrap();
        std::fs::write(mb.join("new/0000000001.000000.P1Q1Rbad.host"), "not a message").unwrap();

        let scan = scan(&[mb.clone(), dir.path().join("missing")], Area::Both);
        assert_eq!(scan.envelopes.len(), 1);
        assert_eq!(scan.warnings.len(), 1);
        assert_eq!(
            scan.warnings[0].key.as_ref().map(MessageKey::as_str),
            Some("0000000001.000000.P1Q1Rbad.host")
        );
        let id: &MessageId = scan.envelopes[0].header.message_id.as_ref().unwrap();
        assert_eq!(Some(id), sample().header.message_id.as_ref());
    }

    #[test]
    fn keys_from_one_process_sort_in_generation_order() {
        let keys: Vec<MessageKey> = (0..20).map(|_| MessageKey::generate()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(sorted, keys);
        assert!(keys[0].as_str().contains('Q'));
    }

    #[test]
    fn key_parsing() {
        let key: MessageKey = "1700000000.000001.P1Q2Rab.host:2,S".parse().unwrap();
        assert_eq!(key.as_str(), "1700000000.000001.P1Q2Rab.host");
        assert!("../etc/passwd".parse::<MessageKey>().is_err());
        assert!(".hidden".parse::<MessageKey>().is_err());
        assert!("".parse::<MessageKey>().is_err());
    }

    #[test]
    fn mailbox_path_that_is_a_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mb = dir.path().join("not-a-dir");
        std::fs::write(&mb, "x").unwrap();
        assert!(matches!(
            deliver(&mb, &sample()),
            Err(WfmailError::InvalidMailbox(_))
        ));
    }
}
