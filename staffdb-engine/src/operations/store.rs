//! Store: CRUD on one database file
//!
//! A `Store` is only a path. Every operation opens the file, works through a
//! `SlotFile`, and drops the handle before returning; nothing is cached
//! between calls. Mutations end with a forced flush. There is no locking:
//! one active writer per path is assumed.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::storage::{Employee, Ordinal, SlotFile};

/// Database file extension
pub const DB_EXT: &str = "db";

/// Handle to a database file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Bind a handle to `path`, creating an empty file if allowed and missing
    pub fn open(path: impl Into<PathBuf>, create_if_missing: bool) -> StoreResult<Self> {
        let path = path.into();

        if create_if_missing && !path.exists() {
            SlotFile::create(&path)?;
            info!("Created database {}", path.display());
        } else {
            SlotFile::open(&path, false)?;
        }

        Ok(Store { path })
    }

    /// Create a new empty database named `name` inside `dir`
    ///
    /// `.db` is appended when missing. Fails if the file already exists.
    pub fn create(dir: &Path, name: &str) -> StoreResult<Self> {
        let file_name = if name.ends_with(&format!(".{}", DB_EXT)) {
            name.to_string()
        } else {
            format!("{}.{}", name, DB_EXT)
        };

        fs::create_dir_all(dir)?;
        let path = dir.join(file_name);
        SlotFile::create(&path)?;
        info!("Created database {}", path.display());

        Ok(Store { path })
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&self) -> StoreResult<SlotFile> {
        SlotFile::open(&self.path, false)
    }

    fn writer(&self) -> StoreResult<SlotFile> {
        SlotFile::open(&self.path, true)
    }

    /// Number of records
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.reader()?.len())
    }

    /// Check if the database holds no records
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Binary-search the ordinal of `id`
    pub fn locate(&self, id: i32) -> StoreResult<Ordinal> {
        match self.reader()?.search(id)? {
            Ok(index) => Ok(index + 1),
            Err(_) => Err(StoreError::NotFound { id }),
        }
    }

    /// Fetch the record stored under `id`
    pub fn get(&self, id: i32) -> StoreResult<Employee> {
        let mut file = self.reader()?;
        match file.search(id)? {
            Ok(index) => file.read_slot(index),
            Err(_) => Err(StoreError::NotFound { id }),
        }
    }

    /// Insert a record at its sorted position, returning its ordinal
    pub fn insert(&self, record: &Employee) -> StoreResult<Ordinal> {
        let mut file = self.writer()?;
        let index = insert_sorted(&mut file, record)?;
        file.sync()?;

        debug!("Inserted id {} at ordinal {}", record.id, index + 1);
        Ok(index + 1)
    }

    /// Delete the record stored under `id`, closing the gap
    pub fn delete(&self, id: i32) -> StoreResult<()> {
        let mut file = self.writer()?;
        let index = file.search(id)?.map_err(|_| StoreError::NotFound { id })?;
        file.shift_down(index)?;
        file.sync()?;

        debug!("Deleted id {} from ordinal {}", id, index + 1);
        Ok(())
    }

    /// Replace every field of the record stored under `record.id` in place
    pub fn update(&self, record: &Employee) -> StoreResult<Ordinal> {
        let mut file = self.writer()?;
        let index = file
            .search(record.id)?
            .map_err(|_| StoreError::NotFound { id: record.id })?;
        file.write_slot(index, record)?;
        file.sync()?;

        debug!("Updated id {} at ordinal {}", record.id, index + 1);
        Ok(index + 1)
    }

    /// Decode every record in file order
    pub fn list_all(&self) -> StoreResult<Vec<Employee>> {
        self.reader()?.read_all()
    }

    /// Read the records at the given ordinals, in the order given
    pub fn records_at(&self, ordinals: &[Ordinal]) -> StoreResult<Vec<Employee>> {
        let mut file = self.reader()?;
        let mut records = Vec::with_capacity(ordinals.len());
        for &ordinal in ordinals {
            let index = slot_index(ordinal, file.len())?;
            records.push(file.read_slot(index)?);
        }
        Ok(records)
    }

    /// Delete the records at a snapshot of ordinals taken from one scan
    ///
    /// Ordinals are validated up front and removed from the highest down, so
    /// a deletion never moves a record that is still waiting to be deleted.
    /// Returns the number of records removed.
    pub fn bulk_delete(&self, ordinals: &[Ordinal]) -> StoreResult<usize> {
        let mut file = self.writer()?;

        let mut indexes = ordinals
            .iter()
            .map(|&ordinal| slot_index(ordinal, file.len()))
            .collect::<StoreResult<Vec<_>>>()?;
        indexes.sort_unstable_by(|a, b| b.cmp(a));
        indexes.dedup();

        for &index in &indexes {
            file.shift_down(index)?;
        }
        file.sync()?;

        debug!("Bulk-deleted {} records", indexes.len());
        Ok(indexes.len())
    }

    /// Delete records by primary key, resolving each id right before removal
    pub fn delete_ids(&self, ids: &[i32]) -> StoreResult<usize> {
        let mut file = self.writer()?;
        let mut deleted = 0;

        let outcome: StoreResult<()> = ids.iter().try_for_each(|&id| {
            let index = file.search(id)?.map_err(|_| StoreError::NotFound { id })?;
            file.shift_down(index)?;
            deleted += 1;
            Ok(())
        });
        file.sync()?;
        outcome?;

        debug!("Deleted {} records by id", deleted);
        Ok(deleted)
    }

    /// Overwrite several records in place, matched by id
    ///
    /// Every id is resolved before the first write; an absent id fails the
    /// whole batch with nothing written.
    pub fn bulk_update(&self, records: &[Employee]) -> StoreResult<usize> {
        let mut file = self.writer()?;

        let mut targets = Vec::with_capacity(records.len());
        for record in records {
            let index = file
                .search(record.id)?
                .map_err(|_| StoreError::NotFound { id: record.id })?;
            targets.push(index);
        }

        for (record, index) in records.iter().zip(targets) {
            file.write_slot(index, record)?;
        }
        file.sync()?;

        debug!("Bulk-updated {} records", records.len());
        Ok(records.len())
    }

    /// Load many records at once, sorting them by id before the first write
    ///
    /// Ids repeated within `records` or already stored in the file are
    /// rejected before anything is written. An empty file is filled by
    /// appending; otherwise each record is inserted at its sorted position.
    pub fn bulk_load(&self, mut records: Vec<Employee>) -> StoreResult<usize> {
        sort_unique(&mut records)?;

        let mut file = self.writer()?;
        if !file.is_empty() {
            for record in &records {
                if file.search(record.id)?.is_ok() {
                    return Err(StoreError::DuplicateKey { id: record.id });
                }
            }
        }
        let outcome: StoreResult<()> = if file.is_empty() {
            records
                .iter()
                .enumerate()
                .try_for_each(|(index, record)| file.write_slot(index, record))
        } else {
            records
                .iter()
                .try_for_each(|record| insert_sorted(&mut file, record).map(|_| ()))
        };
        file.sync()?;
        outcome?;

        info!("Loaded {} records into {}", records.len(), self.path.display());
        Ok(records.len())
    }
}

/// Find the sorted slot for `record`, open a gap there and write it
fn insert_sorted(file: &mut SlotFile, record: &Employee) -> StoreResult<usize> {
    let index = match file.search(record.id)? {
        Ok(_) => return Err(StoreError::DuplicateKey { id: record.id }),
        Err(index) => index,
    };

    if index < file.len() {
        file.shift_up(index)?;
    }
    file.write_slot(index, record)?;
    Ok(index)
}

/// Sort records by id, failing on the first repeated id
pub(crate) fn sort_unique(records: &mut [Employee]) -> StoreResult<()> {
    records.sort_by_key(|r| r.id);
    match records.windows(2).find(|w| w[0].id == w[1].id) {
        Some(pair) => Err(StoreError::DuplicateKey { id: pair[0].id }),
        None => Ok(()),
    }
}

fn slot_index(ordinal: Ordinal, count: usize) -> StoreResult<usize> {
    if ordinal == 0 || ordinal > count {
        return Err(StoreError::OrdinalOutOfRange { ordinal, count });
    }
    Ok(ordinal - 1)
}

/// Database files (`*.db`) in `dir`, sorted by name
pub fn list_databases(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    list_with_extension(dir, DB_EXT)
}

/// Backup files (`*.csv`) in `dir`, sorted by name
pub fn list_backups(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    list_with_extension(dir, crate::exchange::BACKUP_EXT)
}

fn list_with_extension(dir: &Path, ext: &str) -> StoreResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && path.extension().map_or(false, |e| e == ext) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}
