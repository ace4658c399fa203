//! CSV backup, restore and export, plus XLSX export
//!
//! Text rows use the header `id,name,salary,working_since,is_official`,
//! ISO dates, `true`/`false` flags and salaries with two decimals. Backups of
//! `staff.db` are written as `staff.db.csv`; restoring that file produces
//! `backup_staff.db`. Spreadsheet exports hold the same rows as text cells
//! on a single worksheet.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use rust_xlsxwriter::Workbook;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{ErrorKind, StoreError, StoreResult};
use crate::operations::store::{sort_unique, DB_EXT};
use crate::operations::Store;
use crate::storage::record::format_salary;
use crate::storage::Employee;

/// Column names of the interchange header row
pub const HEADER: [&str; 5] = ["id", "name", "salary", "working_since", "is_official"];
/// Backup file extension
pub const BACKUP_EXT: &str = "csv";
/// Prefix of databases recreated from a backup
pub const RESTORE_PREFIX: &str = "backup_";
/// Date format used in text rows
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Spreadsheet export file extension
pub const SPREADSHEET_EXT: &str = "xlsx";

/// How malformed rows are treated during restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreMode {
    /// The first malformed row aborts the restore
    #[default]
    Strict,
    /// Malformed rows are logged and skipped
    BestEffort,
}

/// One text row before field validation
#[derive(Debug, Deserialize)]
struct RawRow {
    id: String,
    name: String,
    salary: String,
    working_since: String,
    is_official: String,
}

/// Render a record as an interchange row
pub fn to_row(record: &Employee) -> [String; 5] {
    [
        record.id.to_string(),
        record.name.clone(),
        format_salary(record.salary),
        record.working_since.format(DATE_FORMAT).to_string(),
        record.is_official.to_string(),
    ]
}

/// Parse an ISO `YYYY-MM-DD` date
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// Parse a salary; only positive finite amounts are accepted
pub fn parse_salary(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| *v > 0.0 && v.is_finite())
}

/// Parse a boolean flag; accepts `true`/`false` plus the usual short forms
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "true" | "TRUE" | "True" | "t" | "T" | "1" => Some(true),
        "false" | "FALSE" | "False" | "f" | "F" | "0" => Some(false),
        _ => None,
    }
}

/// Write the header and every record of `store` as CSV
pub fn export_csv<W: Write>(store: &Store, writer: W) -> StoreResult<usize> {
    let records = store.list_all()?;
    write_csv(&records, writer)?;
    Ok(records.len())
}

/// Write the header and `records` as CSV
pub fn write_csv<W: Write>(records: &[Employee], writer: W) -> StoreResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(HEADER)?;
    for record in records {
        csv_writer.write_record(to_row(record))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Default spreadsheet file name for an export taken at `at`
pub fn spreadsheet_name(at: NaiveDateTime) -> String {
    format!("Backup_{}.{}", at.format("%Y-%m-%d_%H-%M-%S"), SPREADSHEET_EXT)
}

/// Write the header and every record of `store` to an XLSX workbook at `target`
pub fn export_xlsx(store: &Store, target: &Path) -> StoreResult<usize> {
    let records = store.list_all()?;

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, title) in (0u16..).zip(HEADER) {
        sheet.write_string(0, col, title)?;
    }
    for (row, record) in (1u32..).zip(&records) {
        for (col, cell) in (0u16..).zip(to_row(record)) {
            sheet.write_string(row, col, cell)?;
        }
    }
    workbook.save(target)?;

    info!("Exported {} records to {}", records.len(), target.display());
    Ok(records.len())
}

/// Back up `store` into `backup_dir` as `<database file name>.csv`
pub fn backup(store: &Store, backup_dir: &Path) -> StoreResult<PathBuf> {
    let file_name = store
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StoreError::Format(format!("{}: no file name", store.path().display())))?;

    fs::create_dir_all(backup_dir)?;
    let target = backup_dir.join(format!("{}.{}", file_name, BACKUP_EXT));

    let file = File::create(&target)?;
    let count = export_csv(store, &file)?;
    file.sync_all()?;

    info!("Backed up {} records to {}", count, target.display());
    Ok(target)
}

/// Parse CSV rows (with header) into records
pub fn read_csv<R: Read>(reader: R, mode: RestoreMode) -> StoreResult<Vec<Employee>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let mut records = Vec::new();
    for row in csv_reader.records() {
        let parsed = row
            .map_err(StoreError::from)
            .and_then(|row| parse_row(&row, &headers));

        match parsed {
            Ok(record) => records.push(record),
            Err(e) if mode == RestoreMode::BestEffort && e.kind() == ErrorKind::Parse => {
                warn!("Skipping row: {}", e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(records)
}

fn parse_row(row: &csv::StringRecord, headers: &csv::StringRecord) -> StoreResult<Employee> {
    let line = row.position().map_or(0, |p| p.line());
    let raw: RawRow = row.deserialize(Some(headers))?;

    let invalid = |field: &'static str, value: &str| StoreError::Parse {
        line,
        field,
        message: format!("{:?}", value),
    };

    let id = raw.id.trim().parse::<i32>().map_err(|_| invalid("id", &raw.id))?;
    let salary = parse_salary(&raw.salary).ok_or_else(|| invalid("salary", &raw.salary))?;
    let working_since =
        parse_date(&raw.working_since).ok_or_else(|| invalid("working_since", &raw.working_since))?;
    let is_official =
        parse_bool(&raw.is_official).ok_or_else(|| invalid("is_official", &raw.is_official))?;

    Ok(Employee {
        id,
        name: raw.name,
        salary,
        working_since,
        is_official,
    })
}

/// Name of the database a backup file restores into
pub fn restored_name(backup_path: &Path) -> Option<String> {
    let file_name = backup_path.file_name()?.to_str()?;
    let stem = file_name
        .strip_suffix(&format!(".{}.{}", DB_EXT, BACKUP_EXT))
        .or_else(|| file_name.strip_suffix(&format!(".{}", BACKUP_EXT)))
        .unwrap_or(file_name);
    Some(format!("{}{}.{}", RESTORE_PREFIX, stem, DB_EXT))
}

/// Recreate a database in `storage_dir` from a CSV backup
///
/// Rows are parsed and checked for duplicate ids before the database file is
/// created. An existing target file is never overwritten.
pub fn restore(backup_path: &Path, storage_dir: &Path, mode: RestoreMode) -> StoreResult<Store> {
    let name = restored_name(backup_path).ok_or_else(|| {
        StoreError::Format(format!("{}: not a backup file name", backup_path.display()))
    })?;

    let mut records = read_csv(File::open(backup_path)?, mode)?;
    sort_unique(&mut records)?;

    let store = Store::create(storage_dir, &name)?;
    store.bulk_load(records)?;

    info!("Restored {} into {}", backup_path.display(), store.path().display());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn staff() -> Vec<Employee> {
        vec![
            Employee::new(1, "Anna Ivanova", 1200.5, date(2018, 4, 2), true),
            Employee::new(2, "Smith, John", 999.999, date(2021, 11, 30), false),
        ]
    }

    #[test]
    fn test_write_csv_format() {
        let mut out = Vec::new();
        write_csv(&staff(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,name,salary,working_since,is_official");
        assert_eq!(lines[1], "1,Anna Ivanova,1200.50,2018-04-02,true");
        assert_eq!(lines[2], "2,\"Smith, John\",1000.00,2021-11-30,false");
    }

    #[test]
    fn test_read_csv_strict() {
        let text = "id,name,salary,working_since,is_official\n\
                    7,Ann,10.50,2020-02-29,true\n\
                    8,Bob,abc,2020-01-01,false\n";
        let err = read_csv(text.as_bytes(), RestoreMode::Strict).unwrap_err();
        match err {
            StoreError::Parse { line, field, .. } => {
                assert_eq!(line, 3);
                assert_eq!(field, "salary");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_read_csv_rejects_bad_salaries() {
        for bad in ["NaN", "-5", "inf", "0"] {
            let text = format!(
                "id,name,salary,working_since,is_official\n1,A,{},2020-01-01,true\n",
                bad
            );
            let err = read_csv(text.as_bytes(), RestoreMode::Strict).unwrap_err();
            assert!(
                matches!(err, StoreError::Parse { line: 2, field: "salary", .. }),
                "{} accepted: {}",
                bad,
                err
            );
        }

        let text = "id,name,salary,working_since,is_official\n\
                    1,A,NaN,2020-01-01,true\n\
                    2,B,-5,2020-01-01,true\n\
                    3,C,inf,2020-01-01,true\n\
                    4,D,12.5,2020-01-01,true\n";
        let records = read_csv(text.as_bytes(), RestoreMode::BestEffort).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 4);
    }

    #[test]
    fn test_read_csv_best_effort() {
        let text = "id,name,salary,working_since,is_official\n\
                    7,Ann,10.50,2020-02-29,true\n\
                    8,Bob,12,2020-13-01,false\n\
                    9,Cy,1,2020-01-01\n\
                    x,Dee,5,2020-01-01,true\n\
                    10,Eve,3.25,2001-01-01,F\n";
        let records = read_csv(text.as_bytes(), RestoreMode::BestEffort).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], Employee::new(7, "Ann", 10.5, date(2020, 2, 29), true));
        assert_eq!(records[1], Employee::new(10, "Eve", 3.25, date(2001, 1, 1), false));
    }

    #[test]
    fn test_backup_and_restore() {
        let dir = tempdir().unwrap();
        let storage = dir.path().join("storage");
        let backups = dir.path().join("backup");

        let store = Store::create(&storage, "staff").unwrap();
        for record in staff().into_iter().rev() {
            store.insert(&record).unwrap();
        }

        let path = backup(&store, &backups).unwrap();
        assert_eq!(path, backups.join("staff.db.csv"));

        let restored = restore(&path, &storage, RestoreMode::Strict).unwrap();
        assert_eq!(restored.path(), storage.join("backup_staff.db"));

        let records = restored.list_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], staff()[0]);
        assert_eq!(records[1].salary, 1000.0);

        assert!(matches!(
            restore(&path, &storage, RestoreMode::Strict),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn test_restore_sorts_and_rejects_duplicates() {
        let dir = tempdir().unwrap();
        let unsorted = dir.path().join("u.csv");
        fs::write(
            &unsorted,
            "id,name,salary,working_since,is_official\n\
             5,E,1,2020-01-01,true\n2,B,1,2020-01-01,true\n",
        )
        .unwrap();
        let store = restore(&unsorted, dir.path(), RestoreMode::Strict).unwrap();
        let ids: Vec<i32> = store.list_all().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 5]);

        let dup = dir.path().join("d.db.csv");
        fs::write(
            &dup,
            "id,name,salary,working_since,is_official\n\
             1,A,1,2020-01-01,true\n1,B,1,2020-01-01,true\n",
        )
        .unwrap();
        let err = restore(&dup, dir.path(), RestoreMode::Strict).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { id: 1 }));
        assert!(!dir.path().join("backup_d.db").exists());
    }

    fn zip_entry(path: &Path, name: &str) -> String {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut text = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_export_xlsx() {
        let dir = tempdir().unwrap();
        let store = Store::create(dir.path(), "staff").unwrap();
        for record in staff() {
            store.insert(&record).unwrap();
        }

        let target = dir.path().join("staff.xlsx");
        assert_eq!(export_xlsx(&store, &target).unwrap(), 2);

        let sheet = zip_entry(&target, "xl/worksheets/sheet1.xml");
        assert_eq!(sheet.matches("<row ").count(), 3);

        let strings = zip_entry(&target, "xl/sharedStrings.xml");
        for text in HEADER.iter().copied().chain(["Anna Ivanova", "1200.50", "2021-11-30", "false"]) {
            assert!(strings.contains(text), "missing {}", text);
        }
    }

    #[test]
    fn test_spreadsheet_name() {
        let at = date(2024, 5, 6).and_hms_opt(7, 8, 9).unwrap();
        assert_eq!(spreadsheet_name(at), "Backup_2024-05-06_07-08-09.xlsx");
    }

    #[test]
    fn test_restored_name() {
        assert_eq!(
            restored_name(Path::new("/b/staff.db.csv")).as_deref(),
            Some("backup_staff.db")
        );
        assert_eq!(restored_name(Path::new("plain.csv")).as_deref(), Some("backup_plain.db"));
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_bool(" true "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("yes"), None);
        assert_eq!(parse_salary(" 12.5 "), Some(12.5));
        assert_eq!(parse_salary("-1"), None);
        assert_eq!(parse_salary("NaN"), None);
        assert_eq!(parse_date("2024-02-29"), Some(date(2024, 2, 29)));
        assert_eq!(parse_date("2023-02-29"), None);
    }
}
