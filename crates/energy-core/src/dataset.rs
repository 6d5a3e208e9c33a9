// Renewable-share dataset
//
// Rows are read once at startup from the Our World in Data CSV export
// (Entity, Code, Year, Renewables %) and kept immutable afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: missing column {column}")]
    MissingColumn { line: u64, column: &'static str },

    #[error("line {line}: invalid {column} value '{value}'")]
    InvalidValue {
        line: u64,
        column: &'static str,
        value: String,
    },
}

/// One row of the dataset as served to clients.
///
/// Averaged rows (history over all countries) carry no year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearRecord {
    pub name: String,
    #[serde(rename = "isoCode")]
    pub iso_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub percentage: f64,
}

/// A computed response together with the distinct country codes it touches,
/// in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    pub records: Vec<YearRecord>,
    pub touched: Vec<String>,
}

impl RecordSet {
    pub fn new(records: Vec<YearRecord>) -> Self {
        let mut touched: Vec<String> = Vec::new();
        for record in &records {
            if !touched.iter().any(|code| code == &record.iso_code) {
                touched.push(record.iso_code.clone());
            }
        }
        Self { records, touched }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Inclusive year bounds; `None` leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearRange {
    pub begin: Option<i32>,
    pub end: Option<i32>,
}

impl YearRange {
    /// Build a range from query values where `0` means "no bound".
    pub fn new(begin: Option<i32>, end: Option<i32>) -> Self {
        Self {
            begin: begin.filter(|year| *year != 0),
            end: end.filter(|year| *year != 0),
        }
    }

    pub fn contains(&self, year: i32) -> bool {
        self.begin.map_or(true, |begin| year >= begin) && self.end.map_or(true, |end| year <= end)
    }
}

/// Read-only access to the dataset.
pub trait DatasetProvider: Send + Sync {
    /// Newest record of a single country; empty when the code is unknown.
    fn latest(&self, code: &str) -> RecordSet;

    /// Newest record of every country, sorted by name.
    fn latest_all(&self) -> RecordSet;

    /// A country's records inside `range`, by year or by percentage descending.
    fn historic(&self, code: &str, range: YearRange, sort_by_value: bool) -> RecordSet;

    /// Per-country mean over the years in `range`.
    fn historic_average(&self, range: YearRange, sort_by_value: bool) -> RecordSet;

    fn name(&self, code: &str) -> Option<String>;

    fn contains(&self, code: &str) -> bool;
}

#[derive(Debug, Default)]
pub struct RenewableDb {
    countries: HashMap<String, Vec<YearRecord>>,
}

impl RenewableDb {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let db = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            countries = db.countries.len(),
            "Loaded renewable-share dataset"
        );
        Ok(db)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut countries: HashMap<String, Vec<YearRecord>> = HashMap::new();
        let mut skipped = 0usize;

        for row in csv_reader.records() {
            let row = row?;
            let line = row.position().map_or(0, |p| p.line());

            let code = field(&row, 1, "Code", line)?.trim().to_uppercase();
            if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                skipped += 1;
                continue;
            }

            let name = field(&row, 0, "Entity", line)?.trim().to_string();
            let year_raw = field(&row, 2, "Year", line)?.trim();
            let year = year_raw
                .parse::<i32>()
                .map_err(|_| DatasetError::InvalidValue {
                    line,
                    column: "Year",
                    value: year_raw.to_string(),
                })?;
            let pct_raw = field(&row, 3, "Renewables", line)?.trim();
            let percentage = pct_raw
                .parse::<f64>()
                .map_err(|_| DatasetError::InvalidValue {
                    line,
                    column: "Renewables",
                    value: pct_raw.to_string(),
                })?;

            countries.entry(code.clone()).or_default().push(YearRecord {
                name,
                iso_code: code,
                year: Some(year),
                percentage,
            });
        }

        for records in countries.values_mut() {
            records.sort_by_key(|record| record.year);
        }

        debug!(skipped, "Skipped aggregate rows without a country code");
        Ok(Self { countries })
    }

    fn records(&self, code: &str) -> Option<&Vec<YearRecord>> {
        self.countries.get(&code.to_uppercase())
    }
}

fn field<'a>(
    row: &'a csv::StringRecord,
    index: usize,
    column: &'static str,
    line: u64,
) -> Result<&'a str, DatasetError> {
    row.get(index)
        .ok_or(DatasetError::MissingColumn { line, column })
}

fn sort_by_percentage_desc(records: &mut [YearRecord]) {
    records.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
}

fn sort_by_name(records: &mut [YearRecord]) {
    records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.iso_code.cmp(&b.iso_code)));
}

impl DatasetProvider for RenewableDb {
    fn latest(&self, code: &str) -> RecordSet {
        let records = self
            .records(code)
            .and_then(|records| records.last())
            .cloned()
            .into_iter()
            .collect();
        RecordSet::new(records)
    }

    fn latest_all(&self) -> RecordSet {
        let mut records: Vec<YearRecord> = self
            .countries
            .values()
            .filter_map(|records| records.last().cloned())
            .collect();
        sort_by_name(&mut records);
        RecordSet::new(records)
    }

    fn historic(&self, code: &str, range: YearRange, sort_by_value: bool) -> RecordSet {
        let mut records: Vec<YearRecord> = self
            .records(code)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.year.map_or(false, |year| range.contains(year)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if sort_by_value {
            sort_by_percentage_desc(&mut records);
        }
        RecordSet::new(records)
    }

    fn historic_average(&self, range: YearRange, sort_by_value: bool) -> RecordSet {
        let mut records: Vec<YearRecord> = self
            .countries
            .values()
            .filter_map(|records| {
                let in_range: Vec<&YearRecord> = records
                    .iter()
                    .filter(|record| record.year.map_or(false, |year| range.contains(year)))
                    .collect();
                let first = in_range.first()?;
                let sum: f64 = in_range.iter().map(|record| record.percentage).sum();
                Some(YearRecord {
                    name: first.name.clone(),
                    iso_code: first.iso_code.clone(),
                    year: None,
                    percentage: sum / in_range.len() as f64,
                })
            })
            .collect();

        if sort_by_value {
            sort_by_percentage_desc(&mut records);
        } else {
            sort_by_name(&mut records);
        }
        RecordSet::new(records)
    }

    fn name(&self, code: &str) -> Option<String> {
        self.records(code)
            .and_then(|records| records.first())
            .map(|record| record.name.clone())
    }

    fn contains(&self, code: &str) -> bool {
        self.records(code).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Entity,Code,Year,Renewables (% equivalent primary energy)
Norway,NOR,2021,71.56
Norway,NOR,2019,66.0
Norway,NOR,2020,70.9
Sweden,SWE,2020,50.9
Sweden,SWE,2021,49.9
World,OWID_WRL,2021,13.5
Africa,,2021,9.5
";

    fn db() -> RenewableDb {
        RenewableDb::from_reader(SAMPLE.as_bytes()).unwrap()
    }

    #[test]
    fn aggregates_are_skipped_and_years_sorted() {
        let db = db();
        assert!(db.contains("nor"));
        assert!(!db.contains("OWID_WRL"));
        let years: Vec<_> = db
            .historic("NOR", YearRange::default(), false)
            .records
            .iter()
            .map(|r| r.year)
            .collect();
        assert_eq!(years, vec![Some(2019), Some(2020), Some(2021)]);
    }

    #[test]
    fn latest_returns_newest_year() {
        let set = db().latest("nor");
        assert_eq!(set.len(), 1);
        assert_eq!(set.records[0].year, Some(2021));
        assert_eq!(set.touched, vec!["NOR".to_string()]);
        assert!(db().latest("ZZZ").is_empty());
    }

    #[test]
    fn latest_all_is_sorted_by_name() {
        let set = db().latest_all();
        let names: Vec<_> = set.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Norway", "Sweden"]);
        assert_eq!(set.touched, vec!["NOR".to_string(), "SWE".to_string()]);
    }

    #[test]
    fn historic_filters_by_range_and_sorts_by_value() {
        let range = YearRange::new(Some(2020), Some(0));
        let set = db().historic("NOR", range, true);
        let pcts: Vec<_> = set.records.iter().map(|r| r.percentage).collect();
        assert_eq!(pcts, vec![71.56, 70.9]);
    }

    #[test]
    fn average_omits_countries_without_years_in_range() {
        let set = db().historic_average(YearRange::new(Some(2019), Some(2019)), false);
        assert_eq!(set.len(), 1);
        assert_eq!(set.records[0].iso_code, "NOR");
        assert_eq!(set.records[0].year, None);

        let set = db().historic_average(YearRange::new(Some(2020), Some(2021)), true);
        assert_eq!(set.touched, vec!["NOR".to_string(), "SWE".to_string()]);
        assert!((set.records[1].percentage - 50.4).abs() < 1e-9);
    }

    #[test]
    fn malformed_percentage_is_an_error() {
        let bad = "Entity,Code,Year,Renewables\nNorway,NOR,2021,lots\n";
        let err = RenewableDb::from_reader(bad.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::InvalidValue {
                column: "Renewables",
                ..
            }
        ));
    }

    #[test]
    fn record_set_touched_is_distinct_in_first_appearance_order() {
        let record = |code: &str| YearRecord {
            name: code.to_string(),
            iso_code: code.to_string(),
            year: Some(2021),
            percentage: 1.0,
        };
        let set = RecordSet::new(vec![record("SWE"), record("NOR"), record("SWE")]);
        assert_eq!(set.touched, vec!["SWE".to_string(), "NOR".to_string()]);
    }

    #[test]
    fn year_is_omitted_from_json_when_absent() {
        let record = YearRecord {
            name: "Norway".into(),
            iso_code: "NOR".into(),
            year: None,
            percentage: 70.0,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "Norway", "isoCode": "NOR", "percentage": 70.0})
        );
    }
}
