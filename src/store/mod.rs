//! Persistent word→entry storage.
//!
//! An [`EntryStore`] is a per-language directory holding an append-only
//! record log plus a `write.lock` file. Records are length-prefixed
//! `(word, entry)` pairs; the word→offset index is rebuilt by scanning the
//! log on open, with later duplicates of a word overwriting earlier ones
//! (last write wins). Writes go through [`EntryWriter`], which buffers and
//! commits in batches so a multi-gigabyte ingestion never holds more than
//! one batch in memory.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use ahash::AHashMap;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};

use crate::error::{Result, RootFreqError};

/// Name of the record log inside a store directory.
const LOG_FILE: &str = "entries.log";

/// Name of the writer lock file.
const LOCK_FILE: &str = "write.lock";

/// Attempts made when opening a store that another process has locked.
const LOCK_RETRIES: u32 = 5;

/// Base delay between lock retries; attempt `n` waits `n` times this.
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Guard for exclusive write access to a store directory.
///
/// Created with `create_new` so a stale or concurrent writer is detected as
/// an existing lock file. Released on drop or via [`WriteLock::release`].
#[derive(Debug)]
struct WriteLock {
    path: PathBuf,
    held: bool,
}

impl WriteLock {
    fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(WriteLock { path, held: true }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(
                RootFreqError::StoreLocked(format!("lock file exists: {}", path.display())),
            ),
            Err(e) => Err(RootFreqError::store(format!(
                "failed to create lock file: {e}"
            ))),
        }
    }

    fn release(&mut self) -> Result<()> {
        if self.held {
            self.held = false;
            if self.path.exists() {
                std::fs::remove_file(&self.path)
                    .map_err(|e| RootFreqError::store(format!("failed to remove lock: {e}")))?;
            }
        }
        Ok(())
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// Wait for a store's write lock to clear, with bounded linear backoff.
fn wait_for_unlock(dir: &Path) -> Result<()> {
    let lock_path = dir.join(LOCK_FILE);
    for attempt in 1..=LOCK_RETRIES {
        if !lock_path.exists() {
            return Ok(());
        }
        warn!(
            "store {} is locked, retry {attempt}/{LOCK_RETRIES}",
            dir.display()
        );
        thread::sleep(LOCK_RETRY_DELAY * attempt);
    }
    if lock_path.exists() {
        return Err(RootFreqError::StoreLocked(format!(
            "{} still locked after {LOCK_RETRIES} attempts",
            dir.display()
        )));
    }
    Ok(())
}

/// A batched writer over a store's record log.
///
/// Holds the write lock for its whole lifetime. [`EntryWriter::put`] only
/// buffers; durability comes from [`EntryWriter::commit`], which the caller
/// invokes once per batch, and from [`EntryWriter::finish`].
#[derive(Debug)]
pub struct EntryWriter {
    writer: BufWriter<File>,
    lock: WriteLock,
    records: u64,
    uncommitted: u64,
}

impl EntryWriter {
    /// Append one `(word, entry)` record to the current batch.
    pub fn put(&mut self, word: &str, entry: &str) -> Result<()> {
        write_record(&mut self.writer, word, entry)?;
        self.records += 1;
        self.uncommitted += 1;
        Ok(())
    }

    /// Flush the current batch to disk.
    pub fn commit(&mut self) -> Result<()> {
        if self.uncommitted == 0 {
            return Ok(());
        }
        self.writer
            .flush()
            .map_err(|e| RootFreqError::store(format!("failed to flush batch: {e}")))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| RootFreqError::store(format!("failed to sync batch: {e}")))?;
        debug!("committed batch of {} records", self.uncommitted);
        self.uncommitted = 0;
        Ok(())
    }

    /// Number of records written so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Commit any pending records and release the write lock.
    pub fn finish(mut self) -> Result<u64> {
        self.commit()?;
        self.lock.release()?;
        Ok(self.records)
    }
}

fn write_record<W: Write>(writer: &mut W, word: &str, entry: &str) -> Result<()> {
    let word_bytes = word.as_bytes();
    let entry_bytes = entry.as_bytes();
    writer.write_u32::<LittleEndian>(word_bytes.len() as u32)?;
    writer.write_all(word_bytes)?;
    writer.write_u32::<LittleEndian>(entry_bytes.len() as u32)?;
    writer.write_all(entry_bytes)?;
    Ok(())
}

/// Byte span of an entry body inside the record log.
#[derive(Debug, Clone, Copy)]
struct Span {
    offset: u64,
    len: u32,
}

/// Read-only view of a word→entry store.
#[derive(Debug)]
pub struct EntryStore {
    directory: PathBuf,
    index: AHashMap<String, Span>,
    // None once the store is closed; the log's handle is dropped then.
    reader: Mutex<Option<BufReader<File>>>,
}

impl EntryStore {
    /// Create (or truncate) the store in `directory` and return a writer.
    pub fn create<P: AsRef<Path>>(directory: P) -> Result<EntryWriter> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory)
            .map_err(|e| RootFreqError::store(format!("failed to create store dir: {e}")))?;

        // A lock left behind by a crashed build would block the rerun that
        // recovery depends on. Creation always starts a fresh build, so a
        // leftover lock here is stale.
        let lock_path = directory.join(LOCK_FILE);
        if lock_path.exists() {
            warn!("removing stale write lock in {}", directory.display());
            std::fs::remove_file(&lock_path)
                .map_err(|e| RootFreqError::store(format!("failed to clear stale lock: {e}")))?;
        }

        let lock = WriteLock::acquire(directory)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(directory.join(LOG_FILE))
            .map_err(|e| RootFreqError::store(format!("failed to create log: {e}")))?;

        info!("created entry store in {}", directory.display());
        Ok(EntryWriter {
            writer: BufWriter::with_capacity(1 << 16, file),
            lock,
            records: 0,
            uncommitted: 0,
        })
    }

    /// Open the store read-only, rebuilding the in-memory index from the log.
    ///
    /// If a writer currently holds the lock, the open retries a fixed number
    /// of times with linearly increasing delay before failing with
    /// [`RootFreqError::StoreLocked`].
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        wait_for_unlock(&directory)?;

        let log_path = directory.join(LOG_FILE);
        let file = File::open(&log_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RootFreqError::missing_artifact(log_path.display().to_string())
            } else {
                RootFreqError::store(format!("failed to open log: {e}"))
            }
        })?;
        let log_size = file.metadata()?.len();
        let mut reader = BufReader::with_capacity(1 << 16, file);

        let mut index: AHashMap<String, Span> = AHashMap::new();
        let mut pos: u64 = 0;
        let mut overwrites: u64 = 0;
        while pos < log_size {
            let word_len = reader.read_u32::<LittleEndian>()? as u64;
            let mut word_bytes = vec![0u8; word_len as usize];
            reader.read_exact(&mut word_bytes)?;
            let word = String::from_utf8(word_bytes)
                .map_err(|e| RootFreqError::store(format!("non-utf8 word in log: {e}")))?;

            let entry_len = reader.read_u32::<LittleEndian>()?;
            let offset = pos + 4 + word_len + 4;
            reader.seek(SeekFrom::Current(entry_len as i64))?;

            if index
                .insert(
                    word,
                    Span {
                        offset,
                        len: entry_len,
                    },
                )
                .is_some()
            {
                overwrites += 1;
            }
            pos = offset + entry_len as u64;
        }

        if overwrites > 0 {
            debug!("{overwrites} duplicate records superseded while indexing");
        }
        info!(
            "opened entry store in {} with {} words",
            directory.display(),
            index.len()
        );
        Ok(EntryStore {
            directory,
            index,
            reader: Mutex::new(Some(reader)),
        })
    }

    /// Look up the raw entry text for a word.
    pub fn get(&self, word: &str) -> Result<Option<String>> {
        let span = match self.index.get(word) {
            Some(span) => *span,
            None => return Ok(None),
        };
        let mut guard = self
            .reader
            .lock()
            .map_err(|_| RootFreqError::store("reader mutex poisoned"))?;
        let reader = guard
            .as_mut()
            .ok_or_else(|| RootFreqError::store("store is closed"))?;
        reader.seek(SeekFrom::Start(span.offset))?;
        let mut buf = vec![0u8; span.len as usize];
        reader.read_exact(&mut buf)?;
        let entry = String::from_utf8(buf)
            .map_err(|e| RootFreqError::store(format!("non-utf8 entry in log: {e}")))?;
        Ok(Some(entry))
    }

    /// Whether a word exists in the store.
    pub fn contains(&self, word: &str) -> bool {
        self.index.contains_key(word)
    }

    /// Iterate over all stored words.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(|s| s.as_str())
    }

    /// Number of distinct words stored.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The directory backing this store.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Whether a store exists (has a record log) in `directory`.
    pub fn exists<P: AsRef<Path>>(directory: P) -> bool {
        directory.as_ref().join(LOG_FILE).is_file()
    }

    /// Release the backing file handle. Further reads fail.
    pub fn close(&mut self) -> Result<()> {
        let reader = self
            .reader
            .get_mut()
            .map_err(|_| RootFreqError::store("reader mutex poisoned"))?;
        *reader = None;
        Ok(())
    }
}
