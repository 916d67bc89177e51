//! Chart data-resolution pipeline: range filtering, resolution selection,
//! last-observation-per-bucket downsampling and date normalization.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

use crate::constants::DATE_FORMAT;

const DATE_TIME_FORMAT_T: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_TIME_FORMAT_SPACE: &str = "%Y-%m-%d %H:%M:%S";

const BIWEEKLY_PERIOD_DAYS: i64 = 14;
const MONTHS_PER_QUARTER: u32 = 3;

const DEFAULT_MAX_RAW_POINTS: usize = 300;
const DEFAULT_WEEKLY_SPAN_DAYS: i64 = 365;
const DEFAULT_BIWEEKLY_SPAN_DAYS: i64 = 730;
const DEFAULT_MONTHLY_SPAN_DAYS: i64 = 1095;

#[derive(Clone, Copy, Debug)]
enum DateFormatHint {
    Plain,
    Rfc3339,
    NaiveT,
    NaiveSpace,
}

impl DateFormatHint {
    fn parse(self, raw: &str) -> Option<NaiveDate> {
        match self {
            Self::Plain => NaiveDate::parse_from_str(raw, DATE_FORMAT).ok(),
            Self::Rfc3339 => chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.date_naive()),
            Self::NaiveT => NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT_T)
                .ok()
                .map(|dt| dt.date()),
            Self::NaiveSpace => NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT_SPACE)
                .ok()
                .map(|dt| dt.date()),
        }
    }
}

const FORMAT_HINTS: [DateFormatHint; 4] = [
    DateFormatHint::Plain,
    DateFormatHint::Rfc3339,
    DateFormatHint::NaiveT,
    DateFormatHint::NaiveSpace,
];

/// Parses an ISO-like date string, remembering the successful format to
/// avoid re-probing every variant on homogeneous input.
fn parse_date_with_hint(raw: &str, hint: &mut Option<DateFormatHint>) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(hint) = *hint
        && let Some(parsed) = hint.parse(trimmed)
    {
        return Some(parsed);
    }

    for candidate in FORMAT_HINTS {
        if let Some(parsed) = candidate.parse(trimmed) {
            *hint = Some(candidate);
            return Some(parsed);
        }
    }

    None
}

/// Parses a point's date string; `None` means the point cannot be placed
/// on the time axis and is dropped by the range filter.
pub fn parse_point_date(raw: &str) -> Option<NaiveDate> {
    parse_date_with_hint(raw, &mut None)
}

/// One dated record. Numeric fields are keyed by name so that several
/// regions can share the same date axis.
#[derive(Clone, Debug, PartialEq)]
pub struct TimePoint {
    pub date: String,
    pub values: BTreeMap<String, f64>,
}

impl TimePoint {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            values: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_value(mut self, field: impl Into<String>, value: f64) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    pub fn value(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }
}

/// Optional inclusive bounds restricting which observations are considered.
/// An inverted pair is not an error: it simply matches nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub const UNBOUNDED: Self = Self {
        from: None,
        to: None,
    };

    pub const fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

/// Bucket granularity for downsampling. `Quarterly` is defined but the
/// current selection policy never chooses it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BucketKey {
    Day(NaiveDate),
    Week(NaiveDate),
    Fortnight(i64),
    Month(i32, u32),
    Quarter(i32, u32),
}

impl Resolution {
    fn bucket_key(self, date: NaiveDate) -> BucketKey {
        match self {
            Self::Daily => BucketKey::Day(date),
            Self::Weekly => BucketKey::Week(week_start(date)),
            Self::Biweekly => BucketKey::Fortnight(
                i64::from(date.num_days_from_ce()).div_euclid(BIWEEKLY_PERIOD_DAYS),
            ),
            Self::Monthly => BucketKey::Month(date.year(), date.month()),
            Self::Quarterly => {
                BucketKey::Quarter(date.year(), date.month0() / MONTHS_PER_QUARTER + 1)
            }
        }
    }
}

/// Monday of the week containing `date`.
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Thresholds steering resolution selection. Policy constants, not
/// invariants: overridable from the config file.
#[derive(Clone, Copy, Debug)]
pub struct ResolutionPolicy {
    /// Point counts up to this never get downsampled.
    pub max_raw_points: usize,
    /// Spans longer than this (in days) drop to weekly buckets.
    pub weekly_span_days: i64,
    /// Spans longer than this drop to biweekly buckets.
    pub biweekly_span_days: i64,
    /// Spans longer than this drop to monthly buckets.
    pub monthly_span_days: i64,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            max_raw_points: DEFAULT_MAX_RAW_POINTS,
            weekly_span_days: DEFAULT_WEEKLY_SPAN_DAYS,
            biweekly_span_days: DEFAULT_BIWEEKLY_SPAN_DAYS,
            monthly_span_days: DEFAULT_MONTHLY_SPAN_DAYS,
        }
    }
}

impl ResolutionPolicy {
    /// Picks the bucket granularity for a filtered series. First match
    /// wins; short or sparse ranges never degrade below daily.
    pub fn select_resolution(&self, point_count: usize, span_days: i64) -> Resolution {
        if point_count <= self.max_raw_points {
            Resolution::Daily
        } else if span_days > self.monthly_span_days {
            Resolution::Monthly
        } else if span_days > self.biweekly_span_days {
            Resolution::Biweekly
        } else if span_days > self.weekly_span_days {
            Resolution::Weekly
        } else {
            Resolution::Daily
        }
    }
}

/// Restricts a series to the inclusive window. Input order is not trusted
/// and points whose dates fail to parse are silently dropped.
pub fn filter(series: &[TimePoint], range: DateRange) -> Vec<TimePoint> {
    filter_dated(series, range)
        .into_iter()
        .map(|(_, point)| point)
        .collect()
}

fn filter_dated(series: &[TimePoint], range: DateRange) -> Vec<(NaiveDate, TimePoint)> {
    let mut hint = None;
    series
        .iter()
        .filter_map(|point| {
            let date = parse_date_with_hint(&point.date, &mut hint)?;
            range.contains(date).then(|| (date, point.clone()))
        })
        .collect()
}

/// Collapses the series into one representative per bucket: the point with
/// the greatest date in each bucket survives, everything else is dropped.
/// Output is sorted ascending by date regardless of input order.
pub fn bucketize(series: &[TimePoint], resolution: Resolution) -> Vec<TimePoint> {
    let mut hint = None;
    let dated = series
        .iter()
        .filter_map(|point| {
            parse_date_with_hint(&point.date, &mut hint).map(|date| (date, point.clone()))
        })
        .collect();
    bucketize_dated(dated, resolution)
        .into_iter()
        .map(|(_, point)| point)
        .collect()
}

fn bucketize_dated(
    mut dated: Vec<(NaiveDate, TimePoint)>,
    resolution: Resolution,
) -> Vec<(NaiveDate, TimePoint)> {
    // Stable sort: for duplicate dates the later input row wins the bucket.
    dated.sort_by_key(|(date, _)| *date);

    let mut buckets: BTreeMap<BucketKey, (NaiveDate, TimePoint)> = BTreeMap::new();
    for (date, point) in dated {
        buckets.insert(resolution.bucket_key(date), (date, point));
    }

    let mut representatives: Vec<_> = buckets.into_values().collect();
    representatives.sort_by_key(|(date, _)| *date);
    representatives
}

/// Re-sorts the series and rewrites every parseable date in the canonical
/// `YYYY-MM-DD` form; all other fields pass through unchanged.
pub fn normalize(series: &[TimePoint]) -> Vec<TimePoint> {
    let mut hint = None;
    let mut stamped: Vec<(Option<NaiveDate>, TimePoint)> = series
        .iter()
        .map(|point| {
            let parsed = parse_date_with_hint(&point.date, &mut hint);
            let mut point = point.clone();
            if let Some(date) = parsed {
                point.date = date.format(DATE_FORMAT).to_string();
            }
            (parsed, point)
        })
        .collect();
    stamped.sort_by_key(|(date, _)| *date);
    stamped.into_iter().map(|(_, point)| point).collect()
}

fn restamp(dated: Vec<(NaiveDate, TimePoint)>) -> Vec<TimePoint> {
    dated
        .into_iter()
        .map(|(date, mut point)| {
            point.date = date.format(DATE_FORMAT).to_string();
            point
        })
        .collect()
}

/// Full pipeline: filter, pick a resolution, downsample, normalize.
/// A pure recomputation on every call; degenerate input produces an empty
/// series rather than an error.
pub fn process(series: &[TimePoint], range: DateRange, policy: &ResolutionPolicy) -> Vec<TimePoint> {
    let dated = filter_dated(series, range);
    if dated.is_empty() {
        return Vec::new();
    }

    // Effective endpoints: explicit bounds when set, otherwise the
    // post-filter extremes. Span is an inclusive day count.
    let min_date = dated.iter().map(|(date, _)| *date).min();
    let max_date = dated.iter().map(|(date, _)| *date).max();
    let from = range.from.or(min_date).unwrap_or_default();
    let to = range.to.or(max_date).unwrap_or_default();
    let span_days = (to - from).num_days() + 1;

    let resolution = policy.select_resolution(dated.len(), span_days);
    restamp(bucketize_dated(dated, resolution))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, DATE_FORMAT).unwrap()
    }

    fn point(raw: &str, value: f64) -> TimePoint {
        TimePoint::new(raw).with_value("value", value)
    }

    fn daily_points(start: &str, count: usize) -> Vec<TimePoint> {
        let start = date(start);
        (0..count)
            .map(|offset| {
                let day = start + Duration::days(offset as i64);
                point(&day.format(DATE_FORMAT).to_string(), offset as f64)
            })
            .collect()
    }

    #[test]
    fn filter_keeps_inclusive_bounds() {
        let series = vec![
            point("2020-12-31", 1.0),
            point("2021-01-01", 2.0),
            point("2021-06-30", 3.0),
            point("2021-07-01", 4.0),
        ];
        let range = DateRange::new(Some(date("2021-01-01")), Some(date("2021-06-30")));
        let kept = filter(&series, range);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].date, "2021-01-01");
        assert_eq!(kept[1].date, "2021-06-30");
    }

    #[test]
    fn filter_unset_bounds_impose_no_constraint() {
        let series = vec![point("1999-01-01", 1.0), point("2030-12-31", 2.0)];
        assert_eq!(filter(&series, DateRange::UNBOUNDED).len(), 2);
        let from_only = DateRange::new(Some(date("2000-01-01")), None);
        assert_eq!(filter(&series, from_only).len(), 1);
    }

    #[test]
    fn filter_drops_unparseable_dates() {
        let series = vec![
            point("not-a-date", 1.0),
            point("", 2.0),
            point("2021-05-05", 3.0),
        ];
        let kept = filter(&series, DateRange::UNBOUNDED);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].date, "2021-05-05");
    }

    #[test]
    fn filter_accepts_datetime_variants() {
        let series = vec![
            point("2021-05-05T10:30:00", 1.0),
            point("2021-05-06 23:59:59", 2.0),
            point("2021-05-07T00:00:00+00:00", 3.0),
        ];
        assert_eq!(filter(&series, DateRange::UNBOUNDED).len(), 3);
    }

    #[test]
    fn inverted_range_yields_empty_result() {
        let series = daily_points("2021-01-01", 10);
        let range = DateRange::new(Some(date("2021-02-01")), Some(date("2021-01-01")));
        assert!(process(&series, range, &ResolutionPolicy::default()).is_empty());
    }

    #[test]
    fn resolution_policy_thresholds() {
        let policy = ResolutionPolicy::default();
        assert_eq!(policy.select_resolution(300, 5000), Resolution::Daily);
        assert_eq!(policy.select_resolution(301, 1500), Resolution::Monthly);
        assert_eq!(policy.select_resolution(301, 1095), Resolution::Biweekly);
        assert_eq!(policy.select_resolution(301, 800), Resolution::Biweekly);
        assert_eq!(policy.select_resolution(301, 730), Resolution::Weekly);
        assert_eq!(policy.select_resolution(301, 400), Resolution::Weekly);
        assert_eq!(policy.select_resolution(301, 365), Resolution::Daily);
        assert_eq!(policy.select_resolution(301, 200), Resolution::Daily);
    }

    #[test]
    fn weekly_bucket_keeps_most_recent_observation() {
        // 2021-03-01 is a Monday; the first three points share its week.
        let series = vec![
            point("2021-03-01", 1.0),
            point("2021-03-03", 2.0),
            point("2021-03-07", 3.0),
            point("2021-03-08", 4.0),
        ];
        let out = bucketize(&series, Resolution::Weekly);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].date, "2021-03-07");
        assert_eq!(out[0].value("value"), Some(3.0));
        assert_eq!(out[1].date, "2021-03-08");
    }

    #[test]
    fn biweekly_buckets_are_fourteen_day_epochs() {
        // 29 consecutive days always straddle exactly three 14-day periods.
        let series = daily_points("2021-01-04", 29);
        let out = bucketize(&series, Resolution::Biweekly);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn quarterly_buckets_group_by_year_quarter() {
        let series = vec![
            point("2021-01-15", 1.0),
            point("2021-02-15", 2.0),
            point("2021-03-31", 3.0),
            point("2021-04-01", 4.0),
        ];
        let out = bucketize(&series, Resolution::Quarterly);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].date, "2021-03-31");
        assert_eq!(out[1].date, "2021-04-01");
    }

    #[test]
    fn bucketize_is_deterministic_under_input_order() {
        let mut series = daily_points("2020-01-01", 60);
        let forward = bucketize(&series, Resolution::Monthly);
        series.reverse();
        let backward = bucketize(&series, Resolution::Monthly);
        assert_eq!(forward, backward);
    }

    #[test]
    fn duplicate_dates_last_row_wins() {
        let series = vec![point("2022-03-03", 1.0), point("2022-03-03", 2.0)];
        let out = bucketize(&series, Resolution::Daily);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value("value"), Some(2.0));
    }

    #[test]
    fn identical_dates_collapse_to_single_point() {
        let series: Vec<_> = (0..10).map(|i| point("2022-03-03", f64::from(i))).collect();
        for resolution in [
            Resolution::Daily,
            Resolution::Weekly,
            Resolution::Biweekly,
            Resolution::Monthly,
            Resolution::Quarterly,
        ] {
            let out = bucketize(&series, resolution);
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].date, "2022-03-03");
        }
    }

    #[test]
    fn normalize_is_idempotent_and_sorts() {
        let series = vec![point("2021-06-01T12:00:00", 2.0), point("2021-01-05", 1.0)];
        let once = normalize(&series);
        assert_eq!(once[0].date, "2021-01-05");
        assert_eq!(once[1].date, "2021-06-01");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn low_volume_series_passes_through() {
        let series = vec![
            point("2020-01-01", 1.0),
            point("2020-01-02", 2.0),
            point("2020-06-15", 3.0),
        ];
        let out = process(&series, DateRange::UNBOUNDED, &ResolutionPolicy::default());
        assert_eq!(out, series);
    }

    #[test]
    fn long_span_collapses_to_monthly() {
        // 400 points spread over 1500 days: too many to pass through
        // and beyond the three-year span cutoff.
        let start = date("2020-01-01");
        let series: Vec<_> = (0..400)
            .map(|i| {
                let day = start + Duration::days(i64::from(i) * 1499 / 399);
                point(&day.format(DATE_FORMAT).to_string(), f64::from(i))
            })
            .collect();
        let out = process(&series, DateRange::UNBOUNDED, &ResolutionPolicy::default());
        assert!(out.len() <= 50, "got {} points", out.len());
        let months: Vec<_> = out.iter().map(|p| p.date[..7].to_string()).collect();
        let mut unique = months.clone();
        unique.dedup();
        assert_eq!(months, unique, "more than one point in a month");
        let dates: Vec<_> = out.iter().map(|p| p.date.clone()).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
    }

    #[test]
    fn single_day_range_matches_exactly_one_point() {
        let series = vec![
            point("2020-12-31", 1.0),
            point("2021-01-01", 2.0),
            point("2021-01-02", 3.0),
        ];
        let day = date("2021-01-01");
        let out = process(
            &series,
            DateRange::new(Some(day), Some(day)),
            &ResolutionPolicy::default(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value("value"), Some(2.0));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(process(&[], DateRange::UNBOUNDED, &ResolutionPolicy::default()).is_empty());
        assert!(bucketize(&[], Resolution::Monthly).is_empty());
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn week_start_is_monday() {
        assert_eq!(week_start(date("2021-03-01")), date("2021-03-01"));
        assert_eq!(week_start(date("2021-03-07")), date("2021-03-01"));
        assert_eq!(week_start(date("2021-03-04")), date("2021-03-01"));
    }
}
