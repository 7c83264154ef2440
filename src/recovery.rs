//! Recovery Store (C7): reads/writes the tiny `{last_ran, last_reset}`
//! binary record, using the write-`.new`/hardlink-`.old`/rename-over
//! dance so a crash mid-write never leaves a torn file.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Result;
use crate::types::RecoveryRecord;

const RECORD_LEN: usize = 16;

pub struct RecoveryStore {
    /// `None` models the `/dev/null` sink: writes are skipped without
    /// error, reads always return the zero record.
    path: Option<PathBuf>,
    /// Guards the rename dance against concurrent readers/writers
    /// (spec §5, `state_files` lock).
    lock: Mutex<()>,
}

impl RecoveryStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path, lock: Mutex::new(()) }
    }

    /// Missing or truncated file is non-fatal: both timestamps read as
    /// zero.
    pub fn read(&self) -> RecoveryRecord {
        let path = match &self.path {
            Some(p) => p,
            None => return RecoveryRecord::default(),
        };
        let _guard = self.lock.lock();
        let mut buf = Vec::new();
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(_) => return RecoveryRecord::default(),
        };
        if file.read_to_end(&mut buf).is_err() || buf.len() < RECORD_LEN {
            return RecoveryRecord::default();
        }
        let last_ran = i64::from_le_bytes(buf[0..8].try_into().unwrap());
        let last_reset = i64::from_le_bytes(buf[8..16].try_into().unwrap());
        RecoveryRecord { last_ran, last_reset }
    }

    /// Writes `.new`, hardlinks the previous primary to `.old`, then
    /// renames `.new` over the primary. Skipped without error when the
    /// store is a null sink.
    pub fn write(&self, record: RecoveryRecord) -> Result<()> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };
        let _guard = self.lock.lock();

        let mut buf = Vec::with_capacity(RECORD_LEN);
        buf.extend_from_slice(&record.last_ran.to_le_bytes());
        buf.extend_from_slice(&record.last_reset.to_le_bytes());

        let new_path = sibling_path(path, "new");
        let old_path = sibling_path(path, "old");

        {
            let mut f = File::create(&new_path)?;
            f.write_all(&buf)?;
            f.sync_all()?;
        }

        if path.exists() {
            let _ = fs::remove_file(&old_path);
            // Best-effort: hardlink failure (e.g. cross-device) falls
            // back to a copy so the rename dance still completes.
            if fs::hard_link(path, &old_path).is_err() {
                let _ = fs::copy(path, &old_path);
            }
        }

        fs::rename(&new_path, path)?;
        Ok(())
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".");
    s.push(suffix);
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_reads_as_zero() {
        let dir = tempdir().unwrap();
        let store = RecoveryStore::new(Some(dir.path().join("priority_last_decay_ran")));
        assert_eq!(store.read(), RecoveryRecord::default());
    }

    #[test]
    fn round_trip() {
        let dir = tempdir().unwrap();
        let store = RecoveryStore::new(Some(dir.path().join("priority_last_decay_ran")));
        let record = RecoveryRecord { last_ran: 12345, last_reset: 6789 };
        store.write(record).unwrap();
        assert_eq!(store.read(), record);
    }

    #[test]
    fn write_then_write_again_preserves_round_trip() {
        let dir = tempdir().unwrap();
        let store = RecoveryStore::new(Some(dir.path().join("priority_last_decay_ran")));
        store.write(RecoveryRecord { last_ran: 1, last_reset: 0 }).unwrap();
        store.write(RecoveryRecord { last_ran: 2, last_reset: 1 }).unwrap();
        assert_eq!(store.read(), RecoveryRecord { last_ran: 2, last_reset: 1 });
        assert!(dir.path().join("priority_last_decay_ran.old").exists());
    }

    #[test]
    fn truncated_file_reads_as_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("priority_last_decay_ran");
        fs::write(&path, [0u8; 3]).unwrap();
        let store = RecoveryStore::new(Some(path));
        assert_eq!(store.read(), RecoveryRecord::default());
    }

    #[test]
    fn null_sink_skips_writes_without_error() {
        let store = RecoveryStore::new(None);
        store.write(RecoveryRecord { last_ran: 5, last_reset: 5 }).unwrap();
        assert_eq!(store.read(), RecoveryRecord::default());
    }
}
