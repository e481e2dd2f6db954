//! # Pending Receipts
//!
//! Receipts the operator chose to print later, kept in
//! `pending_receipts.json` under the data directory.
//!
//! Keys are `receipt_<epoch-millis>`. A key is never handed out twice, even
//! after it is deleted: the store remembers the highest key it issued and
//! new keys always go past it.
//!
//! ```
//! use scrap_pos::pending::PendingReceiptStore;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = PendingReceiptStore::open(dir.path().join("pending_receipts.json")).unwrap();
//! let key = store.put("RECEIPT").unwrap();
//! assert_eq!(store.get(&key).unwrap().as_deref(), Some("RECEIPT"));
//! ```

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::error::ScrapPosError;
use crate::printer::{PRINTER_NOT_CONNECTED, Printer};
use crate::storage;

const KEY_PREFIX: &str = "receipt_";

/// `receipt_<epoch-millis>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReceiptKey(i64);

impl ReceiptKey {
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ReceiptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", KEY_PREFIX, self.0)
    }
}

impl FromStr for ReceiptKey {
    type Err = ScrapPosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(KEY_PREFIX)
            .and_then(|millis| millis.parse().ok())
            .map(ReceiptKey)
            .ok_or_else(|| ScrapPosError::InvalidInput(format!("Invalid receipt key: {}", s)))
    }
}

impl TryFrom<String> for ReceiptKey {
    type Error = ScrapPosError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ReceiptKey> for String {
    fn from(key: ReceiptKey) -> Self {
        key.to_string()
    }
}

/// A stored receipt and its key.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReceipt {
    pub key: ReceiptKey,
    pub content: String,
}

impl PendingReceipt {
    /// `Receipt - dd/MM HH:mm` in local time.
    pub fn title(&self) -> String {
        receipt_title(&self.key.to_string())
    }
}

/// Display title for a raw key, falling back to the key itself.
pub fn receipt_title(key: &str) -> String {
    let when = key
        .parse::<ReceiptKey>()
        .ok()
        .and_then(|k| Local.timestamp_millis_opt(k.millis()).single());
    match when {
        Some(dt) => format!("Receipt - {}", dt.format("%d/%m %H:%M")),
        None => format!("Receipt - {}", key),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PendingFile {
    /// Highest key millis ever issued
    last_key_millis: i64,
    receipts: BTreeMap<ReceiptKey, String>,
}

/// File-backed store of receipts awaiting printing.
pub struct PendingReceiptStore {
    path: PathBuf,
    state: Mutex<PendingFile>,
}

impl PendingReceiptStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScrapPosError> {
        let path = path.as_ref().to_path_buf();
        let state: PendingFile = storage::load_or_default(&path)
            .map_err(|e| ScrapPosError::Store(format!("Failed to load {}: {}", path.display(), e)))?;
        tracing::debug!("{} pending receipts in {}", state.receipts.len(), path.display());
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Store `content` under a fresh key derived from the current time.
    pub fn put(&self, content: impl Into<String>) -> Result<ReceiptKey, ScrapPosError> {
        self.put_at(Local::now().timestamp_millis(), content)
    }

    /// Store `content` under a key derived from `now_millis`.
    ///
    /// If that key is not past every key issued so far, the next free
    /// millisecond is used instead.
    pub fn put_at(&self, now_millis: i64, content: impl Into<String>) -> Result<ReceiptKey, ScrapPosError> {
        let mut state = self.lock()?;
        let millis = now_millis.max(state.last_key_millis + 1);
        let key = ReceiptKey(millis);

        let mut next = state.clone();
        next.last_key_millis = millis;
        next.receipts.insert(key, content.into());
        self.commit(&mut state, next)?;

        tracing::info!("Saved {} for later printing", key);
        Ok(key)
    }

    pub fn get(&self, key: &ReceiptKey) -> Result<Option<String>, ScrapPosError> {
        Ok(self.lock()?.receipts.get(key).cloned())
    }

    /// All receipts ordered by key (oldest first). Empty when nothing is
    /// pending.
    pub fn list_all(&self) -> Result<Vec<PendingReceipt>, ScrapPosError> {
        Ok(self
            .lock()?
            .receipts
            .iter()
            .map(|(key, content)| PendingReceipt {
                key: *key,
                content: content.clone(),
            })
            .collect())
    }

    pub fn len(&self) -> Result<usize, ScrapPosError> {
        Ok(self.lock()?.receipts.len())
    }

    pub fn is_empty(&self) -> Result<bool, ScrapPosError> {
        Ok(self.lock()?.receipts.is_empty())
    }

    /// Remove one receipt. Returns false if the key was not present.
    pub fn delete(&self, key: &ReceiptKey) -> Result<bool, ScrapPosError> {
        let mut state = self.lock()?;
        if !state.receipts.contains_key(key) {
            return Ok(false);
        }
        let mut next = state.clone();
        next.receipts.remove(key);
        self.commit(&mut state, next)?;
        tracing::info!("Deleted pending {}", key);
        Ok(true)
    }

    /// Remove every receipt. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, ScrapPosError> {
        let mut state = self.lock()?;
        let count = state.receipts.len();
        let next = PendingFile {
            receipts: BTreeMap::new(),
            ..state.clone()
        };
        self.commit(&mut state, next)?;
        tracing::info!("Cleared {} pending receipts", count);
        Ok(count)
    }

    /// Print a stored receipt and delete it once printed.
    ///
    /// A disconnected printer or failed print leaves the receipt stored.
    pub fn print_now(&self, printer: &dyn Printer, key: &ReceiptKey) -> Result<(), ScrapPosError> {
        let content = self
            .get(key)?
            .ok_or_else(|| ScrapPosError::InvalidInput(format!("No pending receipt {}", key)))?;

        if !printer.is_connected() {
            return Err(ScrapPosError::Transport(PRINTER_NOT_CONNECTED.to_string()));
        }
        printer.print(&content)?;
        self.delete(key)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, PendingFile>, ScrapPosError> {
        self.state
            .lock()
            .map_err(|_| ScrapPosError::Store("Pending receipt lock poisoned".into()))
    }

    /// Write `next` to disk, then make it the live state. A failed write
    /// leaves both untouched.
    fn commit(&self, state: &mut PendingFile, next: PendingFile) -> Result<(), ScrapPosError> {
        storage::save_atomic(&self.path, &next)
            .map_err(|e| ScrapPosError::Store(format!("Failed to write {}: {}", self.path.display(), e)))?;
        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::SimulatedPrinter;

    fn store() -> (tempfile::TempDir, PendingReceiptStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PendingReceiptStore::open(dir.path().join("pending_receipts.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_key_format_roundtrip() {
        let key: ReceiptKey = "receipt_1768910400000".parse().unwrap();
        assert_eq!(key.millis(), 1_768_910_400_000);
        assert_eq!(key.to_string(), "receipt_1768910400000");
        assert!("receipt_abc".parse::<ReceiptKey>().is_err());
        assert!("1768910400000".parse::<ReceiptKey>().is_err());
    }

    #[test]
    fn test_put_get_delete() {
        let (_dir, store) = store();
        let key = store.put("hello").unwrap();
        assert_eq!(store.get(&key).unwrap().as_deref(), Some("hello"));
        assert!(store.delete(&key).unwrap());
        assert_eq!(store.get(&key).unwrap(), None);
        assert!(!store.delete(&key).unwrap());
    }

    #[test]
    fn test_empty_store_lists_nothing() {
        let (_dir, store) = store();
        assert!(store.list_all().unwrap().is_empty());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_clear() {
        let (_dir, store) = store();
        store.put("a").unwrap();
        store.put("b").unwrap();
        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_same_millisecond_gets_distinct_keys() {
        let (_dir, store) = store();
        let a = store.put_at(1000, "a").unwrap();
        let b = store.put_at(1000, "b").unwrap();
        let c = store.put_at(900, "c").unwrap();
        assert_eq!(a.millis(), 1000);
        assert_eq!(b.millis(), 1001);
        assert_eq!(c.millis(), 1002);

        let listed: Vec<_> = store.list_all().unwrap().into_iter().map(|r| r.content).collect();
        assert_eq!(listed, ["a", "b", "c"]);
    }

    #[test]
    fn test_deleted_key_never_reissued_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_receipts.json");
        let deleted = {
            let store = PendingReceiptStore::open(&path).unwrap();
            let key = store.put_at(5000, "gone").unwrap();
            store.delete(&key).unwrap();
            key
        };

        let store = PendingReceiptStore::open(&path).unwrap();
        let next = store.put_at(5000, "new").unwrap();
        assert!(next > deleted);
    }

    #[test]
    fn test_failed_write_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_receipts.json");
        let store = PendingReceiptStore::open(&path).unwrap();
        let key = store.put_at(5000, "R").unwrap();

        // A directory where the temp file goes makes every write fail
        let blocker = path.with_extension("tmp");
        std::fs::create_dir(&blocker).unwrap();

        assert!(store.delete(&key).is_err());
        assert_eq!(store.get(&key).unwrap().as_deref(), Some("R"));
        assert!(store.put_at(6000, "S").is_err());
        assert!(store.clear().is_err());
        assert_eq!(store.len().unwrap(), 1);

        std::fs::remove_dir(&blocker).unwrap();
        assert!(store.delete(&key).unwrap());
        let reopened = PendingReceiptStore::open(&path).unwrap();
        assert_eq!(reopened.get(&key).unwrap(), None);
        assert!(reopened.is_empty().unwrap());
    }

    #[test]
    fn test_title() {
        let receipt = PendingReceipt {
            key: ReceiptKey::from_millis(0),
            content: String::new(),
        };
        assert!(receipt.title().starts_with("Receipt - "));
        assert_eq!(receipt_title("draft"), "Receipt - draft");
    }

    #[test]
    fn test_print_now_deletes_on_success() {
        let (_dir, store) = store();
        let printer = SimulatedPrinter::default();
        let key = store.put("to print").unwrap();

        store.print_now(&printer, &key).unwrap();
        assert_eq!(printer.printed(), vec!["to print".to_string()]);
        assert_eq!(store.get(&key).unwrap(), None);
    }

    #[test]
    fn test_print_now_keeps_receipt_when_disconnected() {
        let (_dir, store) = store();
        let printer = SimulatedPrinter::new(false);
        let key = store.put("to print").unwrap();

        let err = store.print_now(&printer, &key).unwrap_err();
        assert!(err.to_string().contains("Printer not connected"));
        assert!(store.get(&key).unwrap().is_some());
    }
}
