//! Subcommands and their handlers
//!
//! All user input is validated here before it reaches the engine: ids,
//! positive salaries, `YYYY-MM-DD` dates and boolean literals.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args as ClapArgs, Subcommand, ValueEnum};
use tracing::info;

use staffdb_engine::exchange::{self, RestoreMode};
use staffdb_engine::operations::{self, list_backups, list_databases, DB_EXT};
use staffdb_engine::{Employee, Query, RecordPatch, Store};

use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty database in the storage directory
    Create { name: String },
    /// List database files in the storage directory
    Databases,
    /// List backup files in the backup directory
    Backups,
    /// Print every record in file order
    List { db: String },
    /// Insert a new record
    Insert {
        db: String,
        #[command(flatten)]
        record: RecordArgs,
    },
    /// Print the record with the given id
    Get { db: String, id: i32 },
    /// Print the ordinal of the record with the given id
    Locate { db: String, id: i32 },
    /// Replace every field of an existing record
    Update {
        db: String,
        #[command(flatten)]
        record: RecordArgs,
    },
    /// Delete the record with the given id
    Delete { db: String, id: i32 },
    /// Print records whose field matches a value
    Find {
        db: String,
        #[arg(value_enum)]
        field: Field,
        value: String,
    },
    /// Delete every record whose field matches a value
    DeleteWhere {
        db: String,
        #[arg(value_enum)]
        field: Field,
        value: String,
    },
    /// Change fields of every record whose field matches a value
    UpdateWhere {
        db: String,
        #[arg(value_enum)]
        field: Field,
        value: String,
        #[command(flatten)]
        patch: PatchArgs,
    },
    /// Write `<db>.csv` into the backup directory
    Backup { db: String },
    /// Recreate `backup_<name>.db` from a CSV backup
    Restore {
        backup: String,
        /// Skip malformed rows instead of failing
        #[arg(long)]
        best_effort: bool,
    },
    /// Write all records as CSV (file or stdout) or as an XLSX workbook
    Export {
        db: String,
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        /// Target file; XLSX defaults to `Backup_<timestamp>.xlsx` in the backup directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Output format of `export`
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

/// Attribute a scan query compares
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Name,
    Salary,
    Date,
    Official,
}

/// A complete record
#[derive(ClapArgs, Debug, Clone)]
pub struct RecordArgs {
    #[arg(long, allow_negative_numbers = true)]
    pub id: i32,
    #[arg(long)]
    pub name: String,
    #[arg(long, value_parser = parse_salary)]
    pub salary: f64,
    /// Start date, YYYY-MM-DD
    #[arg(long, value_parser = parse_date)]
    pub since: NaiveDate,
    #[arg(long, value_parser = parse_bool)]
    pub official: bool,
}

impl RecordArgs {
    fn into_record(self) -> Employee {
        Employee::new(self.id, self.name, self.salary, self.since, self.official)
    }
}

/// New values for the fields to change
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct PatchArgs {
    #[arg(long = "set-name")]
    pub name: Option<String>,
    #[arg(long = "set-salary", value_parser = parse_salary)]
    pub salary: Option<f64>,
    #[arg(long = "set-since", value_parser = parse_date)]
    pub since: Option<NaiveDate>,
    #[arg(long = "set-official", value_parser = parse_bool)]
    pub official: Option<bool>,
}

impl From<PatchArgs> for RecordPatch {
    fn from(args: PatchArgs) -> Self {
        RecordPatch {
            name: args.name,
            salary: args.salary,
            working_since: args.since,
            is_official: args.official,
        }
    }
}

fn parse_salary(text: &str) -> Result<f64, String> {
    exchange::parse_salary(text)
        .ok_or_else(|| format!("salary must be a positive number, got {:?}", text))
}

fn parse_date(text: &str) -> Result<NaiveDate, String> {
    exchange::parse_date(text).ok_or_else(|| format!("expected YYYY-MM-DD, got {:?}", text))
}

fn parse_bool(text: &str) -> Result<bool, String> {
    exchange::parse_bool(text).ok_or_else(|| format!("expected true or false, got {:?}", text))
}

/// Build a scan query from a field name and its textual value
pub fn build_query(field: Field, value: &str) -> Result<Query> {
    let query = match field {
        Field::Name => Query::Name(value.to_string()),
        Field::Salary => Query::Salary(parse_salary(value).map_err(anyhow::Error::msg)?),
        Field::Date => Query::Date(parse_date(value).map_err(anyhow::Error::msg)?),
        Field::Official => Query::Official(parse_bool(value).map_err(anyhow::Error::msg)?),
    };
    Ok(query)
}

/// Resolve a database argument: `.db` is implied, relative names live in `dir`
pub fn resolve_db(dir: &Path, name: &str) -> PathBuf {
    let mut path = PathBuf::from(name);
    if path.extension().map_or(true, |e| e != DB_EXT) {
        path = PathBuf::from(format!("{}.{}", name, DB_EXT));
    }
    if path.is_absolute() {
        path
    } else {
        dir.join(path)
    }
}

fn resolve_in(dir: &Path, name: &str) -> PathBuf {
    let path = PathBuf::from(name);
    if path.is_absolute() {
        path
    } else {
        dir.join(path)
    }
}

fn open_store(config: &Config, db: &str) -> Result<Store> {
    let path = resolve_db(&config.storage_dir, db);
    Store::open(&path, false).with_context(|| format!("opening {}", path.display()))
}

/// Run one subcommand, writing its output to `out`
pub fn execute<W: Write>(command: Command, config: &Config, out: &mut W) -> Result<()> {
    match command {
        Command::Create { name } => {
            let store = Store::create(&config.storage_dir, &name)?;
            writeln!(out, "{}", store.path().display())?;
        }
        Command::Databases => {
            for path in list_databases(&config.storage_dir)? {
                writeln!(out, "{}", path.display())?;
            }
        }
        Command::Backups => {
            for path in list_backups(&config.backup_dir)? {
                writeln!(out, "{}", path.display())?;
            }
        }
        Command::List { db } => {
            let store = open_store(config, &db)?;
            for (index, record) in store.list_all()?.iter().enumerate() {
                writeln!(out, "{}: {}", index + 1, record)?;
            }
        }
        Command::Insert { db, record } => {
            let store = open_store(config, &db)?;
            let record = record.into_record();
            let ordinal = store.insert(&record)?;
            writeln!(out, "Inserted id {} at position {}", record.id, ordinal)?;
        }
        Command::Get { db, id } => {
            let record = open_store(config, &db)?.get(id)?;
            writeln!(out, "{}", record)?;
        }
        Command::Locate { db, id } => {
            let ordinal = open_store(config, &db)?.locate(id)?;
            writeln!(out, "{}", ordinal)?;
        }
        Command::Update { db, record } => {
            let store = open_store(config, &db)?;
            let record = record.into_record();
            let ordinal = store.update(&record)?;
            writeln!(out, "Updated id {} at position {}", record.id, ordinal)?;
        }
        Command::Delete { db, id } => {
            open_store(config, &db)?.delete(id)?;
            writeln!(out, "Deleted id {}", id)?;
        }
        Command::Find { db, field, value } => {
            let store = open_store(config, &db)?;
            let query = build_query(field, &value)?;
            let found = operations::find_records(&store, &query)?;
            for (ordinal, record) in &found {
                writeln!(out, "{}: {}", ordinal, record)?;
            }
            writeln!(out, "{} record(s) matched {}", found.len(), query)?;
        }
        Command::DeleteWhere { db, field, value } => {
            let store = open_store(config, &db)?;
            let query = build_query(field, &value)?;
            let deleted = operations::delete_matching(&store, &query)?;
            writeln!(out, "Deleted {} record(s) where {}", deleted, query)?;
        }
        Command::UpdateWhere { db, field, value, patch } => {
            let patch = RecordPatch::from(patch);
            if patch.is_empty() {
                bail!("nothing to change: pass at least one --set-* option");
            }
            let store = open_store(config, &db)?;
            let query = build_query(field, &value)?;
            let updated = operations::update_matching(&store, &query, &patch)?;
            writeln!(out, "Updated {} record(s) where {}", updated, query)?;
        }
        Command::Backup { db } => {
            let store = open_store(config, &db)?;
            let path = exchange::backup(&store, &config.backup_dir)?;
            writeln!(out, "{}", path.display())?;
        }
        Command::Restore { backup, best_effort } => {
            let path = resolve_in(&config.backup_dir, &backup);
            let mode = if best_effort {
                RestoreMode::BestEffort
            } else {
                RestoreMode::Strict
            };
            let store = exchange::restore(&path, &config.storage_dir, mode)
                .with_context(|| format!("restoring {}", path.display()))?;
            writeln!(out, "{}", store.path().display())?;
        }
        Command::Export { db, format: ExportFormat::Xlsx, output } => {
            let store = open_store(config, &db)?;
            let path = match output {
                Some(path) => path,
                None => {
                    std::fs::create_dir_all(&config.backup_dir)?;
                    config
                        .backup_dir
                        .join(exchange::spreadsheet_name(Local::now().naive_local()))
                }
            };
            exchange::export_xlsx(&store, &path)
                .with_context(|| format!("writing {}", path.display()))?;
            writeln!(out, "{}", path.display())?;
        }
        Command::Export { db, format: ExportFormat::Csv, output } => {
            let store = open_store(config, &db)?;
            let count = match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    let count = exchange::export_csv(&store, &file)?;
                    file.sync_all()?;
                    count
                }
                None => exchange::export_csv(&store, &mut *out)?,
            };
            info!("Exported {} records", count);
        }
    }

    Ok(())
}
