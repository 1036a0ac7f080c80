use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{FailedJobs, LedgerStore, OngoingJobs, StoreError};
use crate::models::job::CompletedRecord;

const ONGOING_FILE: &str = "ongoing.json";
const COMPLETED_FILE: &str = "completed.json";
const FAILED_FILE: &str = "failed.json";
const LOCK_FILE: &str = ".lock";

/// Ledger stored as three JSON files in one directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

/// Exclusive advisory lock on the ledger directory, released on drop.
#[derive(Debug)]
pub struct LedgerLock {
    _file: File,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory and any missing collection as empty.
    ///
    /// Existing files are left untouched. Returns the files that were created.
    pub fn init(&self) -> Result<Vec<PathBuf>, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut created = Vec::new();
        for name in [ONGOING_FILE, COMPLETED_FILE, FAILED_FILE] {
            let path = self.dir.join(name);
            if path.exists() {
                continue;
            }
            if name == COMPLETED_FILE {
                write_json_atomic(&path, &Vec::<CompletedRecord>::new())?;
            } else {
                write_json_atomic(&path, &serde_json::Map::new())?;
            }
            tracing::info!(path = %path.display(), "Created empty ledger collection");
            created.push(path);
        }
        Ok(created)
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl LedgerStore for JsonFileStore {
    type Guard = LedgerLock;

    fn lock(&self) -> Result<LedgerLock, StoreError> {
        let path = self.path(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        match file.try_lock() {
            Ok(()) => Ok(LedgerLock { _file: file }),
            Err(TryLockError::WouldBlock) => Err(StoreError::Locked(self.dir.clone())),
            Err(TryLockError::Error(source)) => Err(StoreError::Io { path, source }),
        }
    }

    fn load_ongoing(&self) -> Result<OngoingJobs, StoreError> {
        read_json(&self.path(ONGOING_FILE))
    }

    fn save_ongoing(&self, jobs: &OngoingJobs) -> Result<(), StoreError> {
        write_json_atomic(&self.path(ONGOING_FILE), jobs)
    }

    fn load_completed(&self) -> Result<Vec<CompletedRecord>, StoreError> {
        read_json(&self.path(COMPLETED_FILE))
    }

    fn save_completed(&self, records: &[CompletedRecord]) -> Result<(), StoreError> {
        write_json_atomic(&self.path(COMPLETED_FILE), records)
    }

    fn load_failed(&self) -> Result<FailedJobs, StoreError> {
        read_json(&self.path(FAILED_FILE))
    }

    fn save_failed(&self, jobs: &FailedJobs) -> Result<(), StoreError> {
        write_json_atomic(&self.path(FAILED_FILE), jobs)
    }
}

/// Read a JSON document, failing loudly when it is missing or unreadable.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let file = File::open(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => StoreError::Missing(path.to_path_buf()),
        _ => StoreError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Write JSON to a sibling temp file, fsync it, then rename over `path`.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush().map_err(io_err)?;
    }
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
