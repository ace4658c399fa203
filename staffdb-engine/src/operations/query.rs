//! Scan queries: find, delete and update by a non-key attribute
//!
//! Every query is a full `list_all` followed by a filter. Ordinals returned
//! here are only valid until the next mutation of the file.

use chrono::NaiveDate;
use tracing::debug;

use crate::error::StoreResult;
use crate::storage::record::format_salary;
use crate::storage::{Employee, Ordinal, RecordPatch};

use super::store::Store;

/// A single-attribute match condition
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Exact name after trimming surrounding whitespace on both sides
    Name(String),
    /// Same value once both are rounded to cents (half away from zero)
    Salary(f64),
    /// Same calendar day
    Date(NaiveDate),
    /// Same official flag
    Official(bool),
}

impl Query {
    /// Check whether a record satisfies this query
    pub fn matches(&self, record: &Employee) -> bool {
        match self {
            Query::Name(name) => record.name.trim() == name.trim(),
            Query::Salary(salary) => format_salary(record.salary) == format_salary(*salary),
            Query::Date(date) => record.working_since == *date,
            Query::Official(official) => record.is_official == *official,
        }
    }

    /// Name of the attribute this query compares
    pub fn field(&self) -> &'static str {
        match self {
            Query::Name(_) => "name",
            Query::Salary(_) => "salary",
            Query::Date(_) => "working_since",
            Query::Official(_) => "is_official",
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = ", self.field())?;
        match self {
            Query::Name(name) => write!(f, "{:?}", name.trim()),
            Query::Salary(salary) => write!(f, "{}", format_salary(*salary)),
            Query::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Query::Official(official) => write!(f, "{}", official),
        }
    }
}

/// Ordinals of every record matching `query`, ascending
pub fn find(store: &Store, query: &Query) -> StoreResult<Vec<Ordinal>> {
    Ok(find_records(store, query)?
        .into_iter()
        .map(|(ordinal, _)| ordinal)
        .collect())
}

/// Matching records paired with their ordinals, from a single scan
pub fn find_records(store: &Store, query: &Query) -> StoreResult<Vec<(Ordinal, Employee)>> {
    let found: Vec<_> = store
        .list_all()?
        .into_iter()
        .enumerate()
        .filter(|(_, record)| query.matches(record))
        .map(|(index, record)| (index + 1, record))
        .collect();

    debug!("Query {} matched {} records", query, found.len());
    Ok(found)
}

/// Delete every record matching `query`, returning how many were removed
pub fn delete_matching(store: &Store, query: &Query) -> StoreResult<usize> {
    let ordinals = find(store, query)?;
    if ordinals.is_empty() {
        return Ok(0);
    }
    store.bulk_delete(&ordinals)
}

/// Apply `patch` to every record matching `query`, returning how many changed
pub fn update_matching(store: &Store, query: &Query, patch: &RecordPatch) -> StoreResult<usize> {
    let mut records: Vec<Employee> = find_records(store, query)?
        .into_iter()
        .map(|(_, record)| record)
        .collect();
    if records.is_empty() || patch.is_empty() {
        return Ok(0);
    }

    for record in &mut records {
        patch.apply(record);
    }
    store.bulk_update(&records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample() -> (TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::create(dir.path(), "q").unwrap();
        store
            .bulk_load(vec![
                Employee::new(1, "Anna", 1000.005, date(2020, 1, 1), true),
                Employee::new(2, " Boris ", 2000.0, date(2021, 5, 5), false),
                Employee::new(3, "Anna", 1500.0, date(2020, 1, 1), false),
                Employee::new(4, "Boris", 1000.01, date(2019, 2, 2), true),
                Employee::new(5, "Vera", 999.99, date(2021, 5, 5), true),
            ])
            .unwrap();
        (dir, store)
    }

    fn ids(store: &Store) -> Vec<i32> {
        store.list_all().unwrap().iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_find_by_name_trims() {
        let (_dir, store) = sample();
        assert_eq!(find(&store, &Query::Name("Anna".into())).unwrap(), vec![1, 3]);
        assert_eq!(find(&store, &Query::Name("  Boris".into())).unwrap(), vec![2, 4]);
        assert!(find(&store, &Query::Name("anna".into())).unwrap().is_empty());
    }

    #[test]
    fn test_find_by_salary_rounding() {
        let (_dir, store) = sample();
        assert_eq!(find(&store, &Query::Salary(1000.01)).unwrap(), vec![1, 4]);
        assert!(find(&store, &Query::Salary(1000.00)).unwrap().is_empty());
        assert_eq!(find(&store, &Query::Salary(999.994)).unwrap(), vec![5]);
    }

    #[test]
    fn test_find_by_date_and_flag() {
        let (_dir, store) = sample();
        assert_eq!(find(&store, &Query::Date(date(2021, 5, 5))).unwrap(), vec![2, 5]);
        assert_eq!(find(&store, &Query::Official(true)).unwrap(), vec![1, 4, 5]);
        assert_eq!(find(&store, &Query::Official(false)).unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_find_records_pairs() {
        let (_dir, store) = sample();
        let found = find_records(&store, &Query::Date(date(2020, 1, 1))).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, 1);
        assert_eq!(found[1].0, 3);
        assert_eq!(found[1].1.salary, 1500.0);
    }

    #[test]
    fn test_delete_matching_removes_right_records() {
        let (_dir, store) = sample();
        // matches ordinals 2 and 4; ascending reuse would have removed id 5
        assert_eq!(delete_matching(&store, &Query::Name("Boris".into())).unwrap(), 2);
        assert_eq!(ids(&store), vec![1, 3, 5]);

        assert_eq!(delete_matching(&store, &Query::Official(true)).unwrap(), 2);
        assert_eq!(ids(&store), vec![3]);
        assert_eq!(delete_matching(&store, &Query::Official(true)).unwrap(), 0);
    }

    #[test]
    fn test_update_matching() {
        let (_dir, store) = sample();
        let patch = RecordPatch {
            salary: Some(3000.0),
            working_since: Some(date(2022, 9, 1)),
            ..Default::default()
        };
        let changed = update_matching(&store, &Query::Name("Anna".into()), &patch).unwrap();
        assert_eq!(changed, 2);

        for id in [1, 3] {
            let r = store.get(id).unwrap();
            assert_eq!(r.salary, 3000.0);
            assert_eq!(r.working_since, date(2022, 9, 1));
            assert_eq!(r.name, "Anna");
        }
        assert_eq!(store.get(2).unwrap().salary, 2000.0);
        assert_eq!(ids(&store), vec![1, 2, 3, 4, 5]);

        let none = update_matching(&store, &Query::Official(true), &RecordPatch::default());
        assert_eq!(none.unwrap(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Query::Salary(12.5).to_string(), "salary = 12.50");
        assert_eq!(Query::Official(false).to_string(), "is_official = false");
        assert_eq!(Query::Name(" Ann ".into()).to_string(), "name = \"Ann\"");
        assert_eq!(
            Query::Date(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()).to_string(),
            "working_since = 2020-01-02"
        );
    }
}
