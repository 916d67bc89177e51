//! Loading and writing of the static data files behind the dashboard.

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constants::DATE_FORMAT;
use crate::series::TimePoint;

pub const DATE_COLUMN: &str = "date";

pub const GILTS_CSV: &str = "gilts-data.csv";
pub const HOUSE_PRICES_CSV: &str = "house-prices-data.csv";
pub const INCOME_CSV: &str = "income-data.csv";
pub const AFFORDABILITY_TREND_CSV: &str = "affordability-trend.csv";
pub const AFFORDABILITY_JSON: &str = "affordability-data.json";
pub const HPI_RAW_CSV: &str = "hpi-raw.csv";

const HPI_DATE_COLUMN: &str = "Date";
const HPI_AREA_CODE_COLUMN: &str = "AreaCode";
const HPI_PRICE_COLUMN: &str = "AveragePrice";
const HPI_DATE_FORMAT: &str = "%d/%m/%Y";

/// UK regions tracked by the dashboard, with their ONS area codes.
pub const REGIONS: &[(&str, &str)] = &[
    ("England", "E92000001"),
    ("Scotland", "S92000003"),
    ("Wales", "W92000004"),
    ("Northern Ireland", "N92000002"),
    ("London", "E12000007"),
    ("South East", "E12000008"),
    ("South West", "E12000009"),
    ("East Midlands", "E12000004"),
    ("East of England", "E12000006"),
    ("West Midlands", "E12000005"),
    ("Yorkshire and The Humber", "E12000003"),
    ("North East", "E12000001"),
    ("North West", "E12000002"),
];

pub fn region_names() -> Vec<&'static str> {
    REGIONS.iter().map(|(name, _)| *name).collect()
}

fn region_for_code(code: &str) -> Option<&'static str> {
    REGIONS
        .iter()
        .find(|(_, area_code)| *area_code == code)
        .map(|(name, _)| *name)
}

/// Reads a wide table (a `date` column plus one numeric column per field)
/// into a series of points.
pub fn load_table(path: &Path) -> Result<Vec<TimePoint>, Box<dyn Error>> {
    let file = fs::File::open(path)
        .map_err(|err| format!("Failed to open table {}: {err}", path.display()))?;
    read_table(file).map_err(|err| format!("Failed to read table {}: {err}", path.display()).into())
}

pub(crate) fn read_table<R: Read>(input: R) -> Result<Vec<TimePoint>, Box<dyn Error>> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers()?.clone();
    let date_idx = headers
        .iter()
        .position(|header| header == DATE_COLUMN)
        .ok_or_else(|| format!("Table has no '{DATE_COLUMN}' column"))?;

    let mut points = Vec::new();
    for record in reader.records() {
        let record = record?;
        let date = record.get(date_idx).unwrap_or_default();
        let mut point = TimePoint::new(date);
        for (idx, header) in headers.iter().enumerate() {
            if idx == date_idx {
                continue;
            }
            let raw = record.get(idx).unwrap_or_default().trim();
            // Empty cells mean the field is absent for that date;
            // non-empty cells that do not parse fall back to zero.
            if raw.is_empty() {
                continue;
            }
            let value = raw.parse::<f64>().unwrap_or(0.0);
            point.values.insert(header.to_string(), value);
        }
        points.push(point);
    }
    Ok(points)
}

/// Writes a series back out as a wide table, creating the parent directory
/// when necessary. Absent fields become empty cells.
pub fn write_table(points: &[TimePoint], columns: &[&str], path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|err| format!("Failed to create {}: {err}", parent.display()))?;
    }
    let file = fs::File::create(path)
        .map_err(|err| format!("Failed to create table {}: {err}", path.display()))?;
    write_table_records(points, columns, BufWriter::new(file))
        .map_err(|err| format!("Failed to write table {}: {err}", path.display()))
}

fn write_table_records<W: Write>(
    points: &[TimePoint],
    columns: &[&str],
    output: W,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(output);
    let header: Vec<&str> = std::iter::once(DATE_COLUMN).chain(columns.iter().copied()).collect();
    writer.write_record(&header)?;
    for point in points {
        let mut row = Vec::with_capacity(header.len());
        row.push(point.date.clone());
        for column in columns {
            row.push(point.value(column).map(|value| value.to_string()).unwrap_or_default());
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads the long-form house price index (one row per region and date,
/// `dd/mm/yyyy` dates) and pivots it into the wide series shape, keeping
/// only rows whose area code belongs to a tracked region.
pub fn import_house_prices(path: &Path) -> Result<Vec<TimePoint>, Box<dyn Error>> {
    let file = fs::File::open(path)
        .map_err(|err| format!("Failed to open price index {}: {err}", path.display()))?;
    pivot_house_prices(file)
        .map_err(|err| format!("Failed to read price index {}: {err}", path.display()).into())
}

pub(crate) fn pivot_house_prices<R: Read>(input: R) -> Result<Vec<TimePoint>, Box<dyn Error>> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| format!("Price index has no '{name}' column"))
    };
    let date_idx = column(HPI_DATE_COLUMN)?;
    let code_idx = column(HPI_AREA_CODE_COLUMN)?;
    let price_idx = column(HPI_PRICE_COLUMN)?;

    let mut pivoted: BTreeMap<NaiveDate, TimePoint> = BTreeMap::new();
    for record in reader.records() {
        let record = record?;
        let Some(region) = record.get(code_idx).and_then(region_for_code) else {
            continue;
        };
        let raw_date = record.get(date_idx).unwrap_or_default().trim();
        let Ok(date) = NaiveDate::parse_from_str(raw_date, HPI_DATE_FORMAT) else {
            continue;
        };
        let raw_price = record.get(price_idx).unwrap_or_default().trim();
        if raw_price.is_empty() {
            continue;
        }
        let price = raw_price.parse::<f64>().unwrap_or(0.0);
        pivoted
            .entry(date)
            .or_insert_with(|| TimePoint::new(date.format(DATE_FORMAT).to_string()))
            .values
            .insert(region.to_string(), price);
    }
    Ok(pivoted.into_values().collect())
}

/// Direction of an indicator between its last two observations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
}

/// Latest value of one indicator with its change since the previous
/// observation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub value: f64,
    pub change: f64,
    pub trend: Trend,
}

/// Per-region summary block of `affordability-data.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub affordability: f64,
    pub trend: Trend,
    #[serde(rename = "lastUpdated")]
    pub last_updated: String,
    pub gilts: IndicatorSnapshot,
    #[serde(rename = "housePrice")]
    pub house_price: IndicatorSnapshot,
    pub income: IndicatorSnapshot,
}

pub type Snapshot = BTreeMap<String, RegionSnapshot>;

pub fn load_snapshot(path: &Path) -> Result<Snapshot, Box<dyn Error>> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read snapshot {}: {err}", path.display()))?;
    let snapshot = serde_json::from_str(&raw)
        .map_err(|err| format!("Failed to parse snapshot {}: {err}", path.display()))?;
    Ok(snapshot)
}

pub fn write_snapshot(snapshot: &Snapshot, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|err| format!("Failed to create {}: {err}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(snapshot)
        .map_err(|err| format!("Failed to serialize snapshot: {err}"))?;
    fs::write(path, body)
        .map_err(|err| format!("Failed to write snapshot {}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_table_parses_wide_rows() {
        let csv = "date,England,London\n2024-01-01,285000,512000\n2024-02-01,286500,\n";
        let points = read_table(csv.as_bytes()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, "2024-01-01");
        assert_eq!(points[0].value("England"), Some(285_000.0));
        assert_eq!(points[0].value("London"), Some(512_000.0));
        // Empty cell: the field is absent, not zero.
        assert_eq!(points[1].value("London"), None);
    }

    #[test]
    fn read_table_defaults_unparseable_cells_to_zero() {
        let csv = "date,yield\n2024-01-01,n/a\n2024-01-02,4.25\n";
        let points = read_table(csv.as_bytes()).unwrap();
        assert_eq!(points[0].value("yield"), Some(0.0));
        assert_eq!(points[1].value("yield"), Some(4.25));
    }

    #[test]
    fn read_table_rejects_missing_date_column() {
        let csv = "day,England\n2024-01-01,285000\n";
        assert!(read_table(csv.as_bytes()).is_err());
    }

    #[test]
    fn table_round_trips_through_writer() {
        let points = vec![
            TimePoint::new("2024-01-01")
                .with_value("England", 285_000.0)
                .with_value("London", 512_000.0),
            TimePoint::new("2024-02-01").with_value("England", 286_500.0),
        ];
        let mut buffer = Vec::new();
        write_table_records(&points, &["England", "London"], &mut buffer).unwrap();
        let reread = read_table(buffer.as_slice()).unwrap();
        assert_eq!(reread, points);
    }

    #[test]
    fn pivot_keeps_tracked_area_codes_and_widens_rows() {
        let csv = "Date,RegionName,AreaCode,AveragePrice\n\
                   01/02/2024,London,E12000007,512000\n\
                   01/02/2024,Wales,W92000004,215000\n\
                   01/02/2024,City of London,E09000001,905000\n\
                   01/01/2024,London,E12000007,508000\n";
        let points = pivot_house_prices(csv.as_bytes()).unwrap();
        assert_eq!(points.len(), 2);
        // Sorted ascending, dates rewritten to the canonical form.
        assert_eq!(points[0].date, "2024-01-01");
        assert_eq!(points[0].value("London"), Some(508_000.0));
        assert_eq!(points[1].date, "2024-02-01");
        assert_eq!(points[1].value("London"), Some(512_000.0));
        assert_eq!(points[1].value("Wales"), Some(215_000.0));
        // Borough-level codes are not part of the roster.
        assert_eq!(points[1].value("City of London"), None);
    }

    #[test]
    fn pivot_skips_malformed_rows() {
        let csv = "Date,RegionName,AreaCode,AveragePrice\n\
                   not-a-date,London,E12000007,512000\n\
                   01/02/2024,London,E12000007,\n\
                   01/03/2024,London,E12000007,510000\n";
        let points = pivot_house_prices(csv.as_bytes()).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].date, "2024-03-01");
    }

    #[test]
    fn pivot_rejects_missing_columns() {
        let csv = "Date,RegionName,AveragePrice\n01/02/2024,London,512000\n";
        assert!(pivot_house_prices(csv.as_bytes()).is_err());
    }

    #[test]
    fn snapshot_uses_frontend_field_names() {
        let snapshot: Snapshot = std::iter::once((
            "London".to_string(),
            RegionSnapshot {
                affordability: 7.2,
                trend: Trend::Up,
                last_updated: "2024-06-01T00:00:00Z".to_string(),
                gilts: IndicatorSnapshot {
                    value: 4.1,
                    change: 0.2,
                    trend: Trend::Up,
                },
                house_price: IndicatorSnapshot {
                    value: 512_000.0,
                    change: 2.1,
                    trend: Trend::Up,
                },
                income: IndicatorSnapshot {
                    value: 41_000.0,
                    change: -0.4,
                    trend: Trend::Down,
                },
            },
        ))
        .collect();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"lastUpdated\""));
        assert!(json.contains("\"housePrice\""));
        assert!(json.contains("\"up\""));
        assert!(json.contains("\"down\""));
        let reread: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(reread["London"].gilts.trend, Trend::Up);
    }
}
