//! Slot file I/O
//!
//! A database file is a headerless run of `RECORD_SIZE` slots sorted by id.
//! `SlotFile` wraps one open handle and provides slot-addressed reads and
//! writes, the on-disk binary search, and the shifts that open or close a gap.
//! Slot indexes here are 0-based; ordinals handed to callers are 1-based.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::storage::record::{Employee, RECORD_SIZE};

/// 1-based position of a record in file order
pub type Ordinal = usize;

/// An open database file
pub struct SlotFile {
    path: PathBuf,
    file: File,
    count: usize,
}

impl SlotFile {
    /// Open an existing database file and validate its length
    pub fn open(path: &Path, writable: bool) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)?;
        Self::from_file(path, file)
    }

    /// Create a new, empty database file; fails if it already exists
    pub fn create(path: &Path) -> StoreResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.sync_all()?;
        Self::from_file(path, file)
    }

    fn from_file(path: &Path, file: File) -> StoreResult<Self> {
        let size = file.metadata()?.len();
        if size % RECORD_SIZE as u64 != 0 {
            return Err(StoreError::Format(format!(
                "{}: length {} is not a multiple of {}",
                path.display(),
                size,
                RECORD_SIZE
            )));
        }

        Ok(SlotFile {
            path: path.to_path_buf(),
            file,
            count: (size / RECORD_SIZE as u64) as usize,
        })
    }

    /// Path this handle was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records in the file
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if the file holds no records
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn offset(index: usize) -> u64 {
        (index as u64) * (RECORD_SIZE as u64)
    }

    fn read_raw(&mut self, index: usize, buf: &mut [u8; RECORD_SIZE]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(Self::offset(index)))?;
        self.file.read_exact(buf)
    }

    fn write_raw(&mut self, index: usize, buf: &[u8; RECORD_SIZE]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(Self::offset(index)))?;
        self.file.write_all(buf)
    }

    /// Read and decode the record in a slot
    pub fn read_slot(&mut self, index: usize) -> StoreResult<Employee> {
        let mut buf = [0u8; RECORD_SIZE];
        self.read_raw(index, &mut buf)?;
        Employee::from_bytes(&buf)
    }

    /// Encode a record over an existing slot, or append when `index == len()`
    pub fn write_slot(&mut self, index: usize, record: &Employee) -> StoreResult<()> {
        debug_assert!(index <= self.count);
        self.write_raw(index, &record.to_bytes())?;
        if index == self.count {
            self.count += 1;
        }
        Ok(())
    }

    /// Binary search for `id`, one seek and read per probe
    ///
    /// Returns `Ok(index)` of the matching slot, or `Err(index)` of the slot
    /// where `id` would be inserted to keep the file sorted.
    pub fn search(&mut self, id: i32) -> StoreResult<Result<usize, usize>> {
        let mut low = 0;
        let mut high = self.count;
        let mut probes = 0u32;

        while low < high {
            let mid = low + (high - low) / 2;
            probes += 1;
            let probe = self.read_slot(mid)?;

            match probe.id.cmp(&id) {
                std::cmp::Ordering::Equal => {
                    tracing::trace!("id {} found at slot {} after {} probes", id, mid, probes);
                    return Ok(Ok(mid));
                }
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
            }
        }

        tracing::trace!("id {} absent, insertion slot {} after {} probes", id, low, probes);
        Ok(Err(low))
    }

    /// Move every slot in `from..len()` one slot later, last slot first
    ///
    /// Afterwards slot `from` still holds its old bytes and must be
    /// overwritten by the caller; the file has grown by one slot.
    pub fn shift_up(&mut self, from: usize) -> StoreResult<()> {
        let mut buf = [0u8; RECORD_SIZE];
        for i in (from..self.count).rev() {
            self.read_raw(i, &mut buf)?;
            self.write_raw(i + 1, &buf)?;
        }
        if from < self.count {
            self.count += 1;
        }
        tracing::debug!("{}: shifted slots {}.. up by one", self.path.display(), from);
        Ok(())
    }

    /// Remove slot `index` by moving every later slot one slot earlier,
    /// first slot first, then truncating the file by one slot
    pub fn shift_down(&mut self, index: usize) -> StoreResult<()> {
        let mut buf = [0u8; RECORD_SIZE];
        for i in index..self.count.saturating_sub(1) {
            self.read_raw(i + 1, &mut buf)?;
            self.write_raw(i, &buf)?;
        }
        self.count -= 1;
        self.file.set_len(Self::offset(self.count))?;
        tracing::debug!("{}: removed slot {}", self.path.display(), index);
        Ok(())
    }

    /// Decode every slot in file order
    pub fn read_all(&mut self) -> StoreResult<Vec<Employee>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut self.file);
        let mut records = Vec::with_capacity(self.count);
        let mut buf = [0u8; RECORD_SIZE];

        for _ in 0..self.count {
            reader.read_exact(&mut buf)?;
            records.push(Employee::from_bytes(&buf)?);
        }

        Ok(records)
    }

    /// Force written data to durable storage
    pub fn sync(&mut self) -> StoreResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
