//! Employee records and their fixed-width binary encoding
//!
//! Each record occupies exactly one 53-byte slot, little-endian:
//! - [0..4]   id (i32)
//! - [4..36]  name (UTF-8, truncated to 32 bytes, right-filled with 0x00)
//! - [36..44] salary (f64)
//! - [44..52] working_since (i64 Unix seconds of the date's UTC midnight)
//! - [52]     is_official (0 or 1)

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, NaiveDate, NaiveTime};

use crate::error::{StoreError, StoreResult};

/// Size of one encoded record
pub const RECORD_SIZE: usize = 4 + NAME_LEN + 8 + 8 + 1;
/// Bytes reserved for the name
pub const NAME_LEN: usize = 32;
/// Filler written after a short name and trimmed on decode
pub const NAME_FILLER: u8 = 0x00;

const ID_OFFSET: usize = 0;
const NAME_OFFSET: usize = 4;
const SALARY_OFFSET: usize = NAME_OFFSET + NAME_LEN;
const SINCE_OFFSET: usize = SALARY_OFFSET + 8;
const OFFICIAL_OFFSET: usize = SINCE_OFFSET + 8;

/// One employee entry
#[derive(Debug, Clone, PartialEq)]
pub struct Employee {
    /// Primary key, immutable once stored
    pub id: i32,
    pub name: String,
    pub salary: f64,
    pub working_since: NaiveDate,
    pub is_official: bool,
}

impl Employee {
    /// Create a new record
    pub fn new(
        id: i32,
        name: impl Into<String>,
        salary: f64,
        working_since: NaiveDate,
        is_official: bool,
    ) -> Self {
        Employee {
            id,
            name: name.into(),
            salary,
            working_since,
            is_official,
        }
    }

    /// Encode into a slot
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [NAME_FILLER; RECORD_SIZE];

        LittleEndian::write_i32(&mut buf[ID_OFFSET..NAME_OFFSET], self.id);

        let name = truncate_name(&self.name).as_bytes();
        buf[NAME_OFFSET..NAME_OFFSET + name.len()].copy_from_slice(name);

        LittleEndian::write_f64(&mut buf[SALARY_OFFSET..SINCE_OFFSET], self.salary);
        LittleEndian::write_i64(
            &mut buf[SINCE_OFFSET..OFFICIAL_OFFSET],
            date_to_epoch(self.working_since),
        );
        buf[OFFICIAL_OFFSET] = self.is_official as u8;

        buf
    }

    /// Decode a slot
    pub fn from_bytes(data: &[u8]) -> StoreResult<Self> {
        if data.len() != RECORD_SIZE {
            return Err(StoreError::Format(format!(
                "record buffer is {} bytes, expected {}",
                data.len(),
                RECORD_SIZE
            )));
        }

        let id = LittleEndian::read_i32(&data[ID_OFFSET..NAME_OFFSET]);

        let raw_name = &data[NAME_OFFSET..SALARY_OFFSET];
        let name_end = raw_name
            .iter()
            .rposition(|&b| b != NAME_FILLER)
            .map_or(0, |i| i + 1);
        let name = std::str::from_utf8(&raw_name[..name_end])
            .map_err(|e| StoreError::Format(format!("record {}: name is not UTF-8: {}", id, e)))?
            .to_string();

        let salary = LittleEndian::read_f64(&data[SALARY_OFFSET..SINCE_OFFSET]);

        let epoch = LittleEndian::read_i64(&data[SINCE_OFFSET..OFFICIAL_OFFSET]);
        let working_since = epoch_to_date(epoch).ok_or_else(|| {
            StoreError::Format(format!("record {}: timestamp {} out of range", id, epoch))
        })?;

        Ok(Employee {
            id,
            name,
            salary,
            working_since,
            is_official: data[OFFICIAL_OFFSET] != 0,
        })
    }
}

impl std::fmt::Display for Employee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ID: {}, Name: {}, Salary: {}, Working since: {}, Official: {}",
            self.id,
            self.name.trim(),
            format_salary(self.salary),
            self.working_since.format("%Y-%m-%d"),
            self.is_official
        )
    }
}

/// Replacement values for every field except `id`
///
/// `None` leaves the field as stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub name: Option<String>,
    pub salary: Option<f64>,
    pub working_since: Option<NaiveDate>,
    pub is_official: Option<bool>,
}

impl RecordPatch {
    /// True when the patch would change nothing
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.salary.is_none()
            && self.working_since.is_none()
            && self.is_official.is_none()
    }

    /// Apply the patch to a record in memory
    pub fn apply(&self, record: &mut Employee) {
        if let Some(ref name) = self.name {
            record.name = name.clone();
        }
        if let Some(salary) = self.salary {
            record.salary = salary;
        }
        if let Some(date) = self.working_since {
            record.working_since = date;
        }
        if let Some(official) = self.is_official {
            record.is_official = official;
        }
    }
}

/// Longest prefix of `name` that fits the name field without splitting a character
pub fn truncate_name(name: &str) -> &str {
    if name.len() <= NAME_LEN {
        return name;
    }
    let mut end = NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Render a salary with two decimals, rounding half away from zero
pub fn format_salary(salary: f64) -> String {
    format!("{:.2}", (salary * 100.0).round() / 100.0)
}

fn date_to_epoch(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

fn epoch_to_date(secs: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}
