//! Affordability score computation: combines house prices, incomes and
//! gilt yields into the per-region trend table and the JSON snapshot.

use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;

use chrono::{NaiveDate, SecondsFormat, Utc};
use tracing::{info, warn};

use crate::constants::{DATE_FORMAT, GILT_YIELD_FIELD};
use crate::data::{
    self, AFFORDABILITY_JSON, AFFORDABILITY_TREND_CSV, GILTS_CSV, HOUSE_PRICES_CSV, HPI_RAW_CSV,
    INCOME_CSV, IndicatorSnapshot, RegionSnapshot, Snapshot, Trend,
};
use crate::series::{TimePoint, parse_point_date};

const DEFAULT_MORTGAGE_SPREAD_PCT: f64 = 2.0;
const DEFAULT_DEPOSIT_SHARE: f64 = 0.1;
const DEFAULT_TERM_YEARS: u32 = 25;
const DEFAULT_PAYMENT_WEIGHT: f64 = 0.7;
const DEFAULT_DEPOSIT_WEIGHT: f64 = 0.3;

const MONTHS_PER_YEAR: f64 = 12.0;
const PERCENT: f64 = 100.0;
const SCORE_ROUNDING: f64 = 10.0;
// Scores above this read as "getting worse" on the dashboard.
const AFFORDABILITY_UP_THRESHOLD: f64 = 6.0;

/// Mortgage assumptions feeding the combined score.
#[derive(Clone, Copy, Debug)]
pub struct AffordabilityConfig {
    /// Spread of typical mortgage rates over the 10-year gilt yield, in
    /// percentage points.
    pub mortgage_spread_pct: f64,
    /// Deposit as a share of the house price.
    pub deposit_share: f64,
    /// Mortgage term in years.
    pub term_years: u32,
    /// Weight of the monthly-payment burden in the combined score.
    pub payment_weight: f64,
    /// Weight of the deposit burden in the combined score.
    pub deposit_weight: f64,
}

impl Default for AffordabilityConfig {
    fn default() -> Self {
        Self {
            mortgage_spread_pct: DEFAULT_MORTGAGE_SPREAD_PCT,
            deposit_share: DEFAULT_DEPOSIT_SHARE,
            term_years: DEFAULT_TERM_YEARS,
            payment_weight: DEFAULT_PAYMENT_WEIGHT,
            deposit_weight: DEFAULT_DEPOSIT_WEIGHT,
        }
    }
}

type FieldIndex = BTreeMap<NaiveDate, f64>;

/// Indexes one named field of a series by parsed date. Rows with
/// unparseable dates or without the field are skipped.
fn field_index(points: &[TimePoint], field: &str) -> FieldIndex {
    points
        .iter()
        .filter_map(|point| {
            let date = parse_point_date(&point.date)?;
            point.value(field).map(|value| (date, value))
        })
        .collect()
}

/// Most recent observation at or before `date`, falling back to the first
/// observation when the series starts later.
fn at_or_before(index: &FieldIndex, date: NaiveDate) -> Option<f64> {
    index
        .range(..=date)
        .next_back()
        .map(|(_, value)| *value)
        .or_else(|| index.values().next().copied())
}

/// Standard annuity payment for a loan at an annual rate over the term.
fn monthly_payment(loan: f64, annual_rate_pct: f64, term_years: u32) -> f64 {
    let monthly_rate = annual_rate_pct / PERCENT / MONTHS_PER_YEAR;
    let n_payments = f64::from(term_years) * MONTHS_PER_YEAR;
    if monthly_rate > 0.0 {
        loan * (monthly_rate * (1.0 + monthly_rate).powf(n_payments))
            / ((1.0 + monthly_rate).powf(n_payments) - 1.0)
    } else {
        loan / n_payments
    }
}

/// Combined affordability score: payment burden (share of monthly income
/// going to the mortgage, in percent) weighted against the deposit burden
/// (deposit as a multiple of annual income). `None` for degenerate rows.
pub fn combined_score(
    house_price: f64,
    annual_income: f64,
    gilt_yield_pct: f64,
    config: &AffordabilityConfig,
) -> Option<f64> {
    if house_price <= 0.0 || annual_income <= 0.0 {
        return None;
    }
    let deposit = house_price * config.deposit_share;
    let loan = house_price - deposit;
    let payment = monthly_payment(
        loan,
        gilt_yield_pct + config.mortgage_spread_pct,
        config.term_years,
    );
    let monthly_income = annual_income / MONTHS_PER_YEAR;
    let payment_pct = payment / monthly_income * PERCENT;
    let deposit_ratio = deposit / annual_income;
    Some(payment_pct * config.payment_weight + deposit_ratio * PERCENT * config.deposit_weight)
}

fn round_score(score: f64) -> f64 {
    (score * SCORE_ROUNDING).round() / SCORE_ROUNDING
}

/// Builds the affordability trend table: one row per gilt-yield date,
/// carrying the yield and the combined score for every region present in
/// both the income and house-price tables.
pub fn build_trend(
    gilts: &[TimePoint],
    house_prices: &[TimePoint],
    incomes: &[TimePoint],
    config: &AffordabilityConfig,
) -> Vec<TimePoint> {
    let regions: Vec<&str> = data::region_names()
        .into_iter()
        .filter(|region| {
            let present = house_prices.iter().any(|p| p.value(region).is_some())
                && incomes.iter().any(|p| p.value(region).is_some());
            if !present {
                warn!(region, "Region missing from income or house-price data, skipping");
            }
            present
        })
        .collect();

    let price_indexes: Vec<FieldIndex> = regions
        .iter()
        .map(|region| field_index(house_prices, region))
        .collect();
    let income_indexes: Vec<FieldIndex> = regions
        .iter()
        .map(|region| field_index(incomes, region))
        .collect();

    let mut rows: Vec<(NaiveDate, TimePoint)> = gilts
        .iter()
        .filter_map(|point| {
            let date = parse_point_date(&point.date)?;
            let yield_pct = point.value(GILT_YIELD_FIELD)?;
            let mut row = TimePoint::new(date.format(DATE_FORMAT).to_string())
                .with_value(GILT_YIELD_FIELD, yield_pct);
            for (idx, region) in regions.iter().enumerate() {
                let price = at_or_before(&price_indexes[idx], date);
                let income = at_or_before(&income_indexes[idx], date);
                if let (Some(price), Some(income)) = (price, income)
                    && let Some(score) = combined_score(price, income, yield_pct, config)
                {
                    row.values.insert((*region).to_string(), round_score(score));
                }
            }
            Some((date, row))
        })
        .collect();
    rows.sort_by_key(|(date, _)| *date);
    rows.into_iter().map(|(_, row)| row).collect()
}

/// Last observation of a field plus the one before it, if any.
fn last_two(index: &FieldIndex) -> Option<(f64, Option<f64>)> {
    let mut tail = index.values().rev();
    let last = *tail.next()?;
    Some((last, tail.next().copied()))
}

fn trend_of(change: f64) -> Trend {
    if change < 0.0 { Trend::Down } else { Trend::Up }
}

/// Snapshot of one indicator: latest value and its percentage change
/// since the previous observation.
fn indicator_pct(index: &FieldIndex) -> Option<IndicatorSnapshot> {
    let (last, previous) = last_two(index)?;
    let change = previous
        .filter(|prev| *prev != 0.0)
        .map_or(0.0, |prev| round_score((last - prev) / prev * PERCENT));
    Some(IndicatorSnapshot {
        value: last,
        change,
        trend: trend_of(change),
    })
}

/// Gilt yields move in percentage points, so their change is absolute.
fn indicator_abs(index: &FieldIndex) -> Option<IndicatorSnapshot> {
    let (last, previous) = last_two(index)?;
    let change = previous.map_or(0.0, |prev| round_score(last - prev));
    Some(IndicatorSnapshot {
        value: last,
        change,
        trend: trend_of(change),
    })
}

/// Builds the per-region JSON snapshot from the trend table and its
/// source series.
pub fn build_snapshot(
    trend: &[TimePoint],
    gilts: &[TimePoint],
    house_prices: &[TimePoint],
    incomes: &[TimePoint],
    generated_at: &str,
) -> Snapshot {
    let gilt_index = field_index(gilts, GILT_YIELD_FIELD);
    let Some(gilt_snapshot) = indicator_abs(&gilt_index) else {
        return Snapshot::new();
    };

    data::region_names()
        .into_iter()
        .filter_map(|region| {
            let score_index = field_index(trend, region);
            let (score, _) = last_two(&score_index)?;
            let house_price = indicator_pct(&field_index(house_prices, region))?;
            let income = indicator_pct(&field_index(incomes, region))?;
            let snapshot = RegionSnapshot {
                affordability: score,
                trend: if score > AFFORDABILITY_UP_THRESHOLD {
                    Trend::Up
                } else {
                    Trend::Down
                },
                last_updated: generated_at.to_string(),
                gilts: gilt_snapshot,
                house_price,
                income,
            };
            Some((region.to_string(), snapshot))
        })
        .collect()
}

/// Outcome counters for logging.
pub struct RefreshOutcome {
    pub trend_rows: usize,
    pub snapshot_regions: usize,
}

/// House prices come from the long-form price index when it is present;
/// its pivoted form replaces `house-prices-data.csv` on disk so the
/// render step sees the same table.
fn load_house_prices(data_dir: &Path) -> Result<Vec<TimePoint>, Box<dyn Error>> {
    let raw_path = data_dir.join(HPI_RAW_CSV);
    if !raw_path.exists() {
        return data::load_table(&data_dir.join(HOUSE_PRICES_CSV));
    }
    let house_prices = data::import_house_prices(&raw_path)?;
    let columns: Vec<&str> = data::region_names()
        .into_iter()
        .filter(|region| house_prices.iter().any(|p| p.value(region).is_some()))
        .collect();
    data::write_table(&house_prices, &columns, &data_dir.join(HOUSE_PRICES_CSV))?;
    info!(rows = house_prices.len(), "Pivoted house prices from {HPI_RAW_CSV}");
    Ok(house_prices)
}

/// Recomputes `affordability-trend.csv` and `affordability-data.json`
/// from the three source tables in `data_dir`.
pub fn refresh_data_dir(
    data_dir: &Path,
    config: &AffordabilityConfig,
) -> Result<RefreshOutcome, Box<dyn Error>> {
    let gilts = data::load_table(&data_dir.join(GILTS_CSV))?;
    let house_prices = load_house_prices(data_dir)?;
    let incomes = data::load_table(&data_dir.join(INCOME_CSV))?;
    info!(
        gilt_rows = gilts.len(),
        house_price_rows = house_prices.len(),
        income_rows = incomes.len(),
        "Loaded source tables"
    );

    let trend = build_trend(&gilts, &house_prices, &incomes, config);
    let mut columns = vec![GILT_YIELD_FIELD];
    for region in data::region_names() {
        if trend.iter().any(|row| row.value(region).is_some()) {
            columns.push(region);
        }
    }
    data::write_table(&trend, &columns, &data_dir.join(AFFORDABILITY_TREND_CSV))?;

    let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let snapshot = build_snapshot(&trend, &gilts, &house_prices, &incomes, &generated_at);
    data::write_snapshot(&snapshot, &data_dir.join(AFFORDABILITY_JSON))?;

    Ok(RefreshOutcome {
        trend_rows: trend.len(),
        snapshot_regions: snapshot.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_rate_config() -> AffordabilityConfig {
        AffordabilityConfig {
            mortgage_spread_pct: 0.0,
            ..AffordabilityConfig::default()
        }
    }

    #[test]
    fn zero_rate_score_uses_linear_repayment() {
        // 100k house, 10k deposit, 90k loan over 300 months = 300/month.
        // Income 24k: payment burden 15 %, deposit burden 0.4167x.
        let score = combined_score(100_000.0, 24_000.0, 0.0, &zero_rate_config()).unwrap();
        assert!((round_score(score) - 23.0).abs() < f64::EPSILON);
    }

    #[test]
    fn higher_yields_mean_worse_affordability() {
        let config = AffordabilityConfig::default();
        let low = combined_score(300_000.0, 36_000.0, 1.0, &config).unwrap();
        let high = combined_score(300_000.0, 36_000.0, 5.0, &config).unwrap();
        assert!(high > low);
    }

    #[test]
    fn degenerate_rows_produce_no_score() {
        let config = AffordabilityConfig::default();
        assert!(combined_score(0.0, 36_000.0, 4.0, &config).is_none());
        assert!(combined_score(300_000.0, 0.0, 4.0, &config).is_none());
    }

    #[test]
    fn alignment_picks_most_recent_prior_observation() {
        let points = vec![
            TimePoint::new("2024-01-01").with_value("London", 1.0),
            TimePoint::new("2024-03-01").with_value("London", 2.0),
        ];
        let index = field_index(&points, "London");
        let date = |raw: &str| NaiveDate::parse_from_str(raw, DATE_FORMAT).unwrap();
        assert_eq!(at_or_before(&index, date("2024-02-15")), Some(1.0));
        assert_eq!(at_or_before(&index, date("2024-03-01")), Some(2.0));
        // Before the series starts: fall back to the first observation.
        assert_eq!(at_or_before(&index, date("2023-12-01")), Some(1.0));
    }

    #[test]
    fn trend_rows_follow_gilt_dates() {
        let gilts = vec![
            TimePoint::new("2024-01-02").with_value(GILT_YIELD_FIELD, 4.0),
            TimePoint::new("2024-01-03").with_value(GILT_YIELD_FIELD, 4.2),
        ];
        let prices = vec![TimePoint::new("2024-01-01").with_value("London", 500_000.0)];
        let incomes = vec![TimePoint::new("2024-01-01").with_value("London", 40_000.0)];
        let trend = build_trend(&gilts, &prices, &incomes, &AffordabilityConfig::default());
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].value(GILT_YIELD_FIELD), Some(4.0));
        let score = trend[0].value("London").unwrap();
        assert!(score > 0.0);
        assert!((score * 10.0).fract().abs() < 1e-9, "score not rounded: {score}");
        // Regions absent from the sources never appear in the rows.
        assert_eq!(trend[0].value("Wales"), None);
    }

    #[test]
    fn snapshot_reports_latest_values_and_changes() {
        let gilts = vec![
            TimePoint::new("2024-01-01").with_value(GILT_YIELD_FIELD, 4.0),
            TimePoint::new("2024-02-01").with_value(GILT_YIELD_FIELD, 4.2),
        ];
        let prices = vec![
            TimePoint::new("2024-01-01").with_value("London", 500_000.0),
            TimePoint::new("2024-02-01").with_value("London", 510_000.0),
        ];
        let incomes = vec![
            TimePoint::new("2024-01-01").with_value("London", 40_000.0),
            TimePoint::new("2024-02-01").with_value("London", 39_000.0),
        ];
        let trend = build_trend(&gilts, &prices, &incomes, &AffordabilityConfig::default());
        let snapshot = build_snapshot(&trend, &gilts, &prices, &incomes, "2024-02-02T00:00:00Z");

        let london = &snapshot["London"];
        assert_eq!(london.last_updated, "2024-02-02T00:00:00Z");
        assert!((london.gilts.change - 0.2).abs() < 1e-9);
        assert_eq!(london.gilts.trend, Trend::Up);
        assert!((london.house_price.change - 2.0).abs() < 1e-9);
        assert_eq!(london.income.trend, Trend::Down);
        // Combined score for these inputs is far above the threshold.
        assert_eq!(london.trend, Trend::Up);
    }
}
