//! Series preparation and Plotly figure assembly for the dashboard grid.

use itertools::Itertools;
use plotly::color::{Rgb, Rgba};
use plotly::common::{Anchor, Font, Line, Mode, Orientation, Title};
use plotly::layout::{
    Annotation, Axis, GridPattern, ItemClick, Layout, LayoutGrid, Legend, Margin, RowOrder,
    TicksDirection,
};
use plotly::{Configuration, Plot, Scatter};

use crate::constants::{DATE_FORMAT, GILT_YIELD_FIELD};
use crate::data::{self, Trend};
use crate::series::{self, DateRange, ResolutionPolicy, TimePoint};

use super::DashboardData;

/// Headline figures for the page cards and the per-region table.
#[derive(Clone, Debug)]
pub(super) struct DashboardSummary {
    /// Date of the most recent affordability observation (YYYY-MM-DD).
    pub latest_date: String,
    /// Human-readable label of the selected date range.
    pub range_label: String,
    /// Latest 10-year gilt yield in percent, and its last move.
    pub gilt_yield: Option<f64>,
    pub gilt_change: Option<f64>,
    /// Region whose figures appear on the headline cards.
    pub headline_region: &'static str,
    pub headline_affordability: Option<f64>,
    pub headline_house_price: Option<f64>,
    pub headline_income: Option<f64>,
    pub regions: Vec<RegionRow>,
}

/// One row of the sortable region table.
#[derive(Clone, Debug)]
pub(super) struct RegionRow {
    pub name: String,
    pub affordability: f64,
    pub house_price: Option<f64>,
    pub income: Option<f64>,
    /// Affordability trending up means the region is getting less affordable.
    pub worsening: bool,
}

pub(super) struct ChartOutput {
    pub plot: Plot,
    pub summary: DashboardSummary,
}

const HEADLINE_REGION: &str = "England";

const AXIS_AFFORDABILITY_X: &str = "x1";
const AXIS_AFFORDABILITY_Y: &str = "y1";
const AXIS_PRICES_X: &str = "x2";
const AXIS_PRICES_Y: &str = "y2";
const AXIS_INCOME_X: &str = "x3";
const AXIS_INCOME_Y: &str = "y3";
const AXIS_GILTS_X: &str = "x4";
const AXIS_GILTS_Y: &str = "y4";
const AXIS_REF_PIXEL: &str = "pixel";

const LABEL_GILTS: &str = "10y gilt yield";
const UNIT_SCORE: &str = "Affordability score";
const UNIT_POUNDS_PRICE: &str = "Average price, £";
const UNIT_POUNDS_INCOME: &str = "Median income, £";
const UNIT_PERCENT: &str = "Yield, %";
const RANGE_LABEL_FULL: &str = "Full history";

const FONT_FAMILY: &str = "IBM Plex Sans, Arial, sans-serif";
const TICK_FORMAT_MONTH_YEAR: &str = "%b\n%Y";
const FONT_SIZE_BASE: usize = 12;
const FONT_SIZE_AXIS_TITLE: usize = 13;
const FONT_SIZE_AXIS_TICK: usize = 11;
const FONT_SIZE_ANNOTATION: usize = 11;
const LINE_WIDTH_REGION: f64 = 1.8;
const LINE_WIDTH_GILTS: f64 = 2.2;
const LINE_WIDTH_BORDER: f64 = 1.0;
const ARROW_HEAD: u8 = 2;
const ARROW_SIZE: f64 = 0.9;
const ARROW_WIDTH: f64 = 1.0;
const ANNOTATION_OFFSET_X: f64 = 20.0;
const ANNOTATION_OFFSET_Y: f64 = -30.0;
const LEGEND_X: f64 = 0.5;
const LEGEND_Y: f64 = 1.04;
const LEGEND_FONT_SIZE: usize = 11;
const LEGEND_BORDER_WIDTH: usize = 1;
const MARGIN_LEFT: usize = 70;
const MARGIN_RIGHT: usize = 40;
const MARGIN_TOP: usize = 80;
const MARGIN_BOTTOM: usize = 50;
const MARGIN_PAD: usize = 6;
const TICK_LENGTH: usize = 5;
const AXIS_GRID_WIDTH: usize = 1;
const GRID_ROWS: usize = 2;
const GRID_COLS: usize = 2;
const AXIS_TICKS_COUNT: usize = 6;

const COLOR_TEXT_BASE: (u8, u8, u8) = (31, 36, 48);
const COLOR_TEXT_ANNOTATION: (u8, u8, u8) = (32, 32, 32);
const COLOR_GILTS: (u8, u8, u8) = (200, 67, 46);
const COLOR_ARROW: (u8, u8, u8, f64) = (80, 80, 80, 0.6);
const COLOR_PANEL_BG: (u8, u8, u8, f64) = (255, 255, 255, 0.85);
const COLOR_PANEL_BORDER: (u8, u8, u8, f64) = (200, 200, 200, 0.75);
const COLOR_AXIS_TICK: (u8, u8, u8, f64) = (0, 0, 0, 0.45);
const COLOR_AXIS_LINE: (u8, u8, u8, f64) = (0, 0, 0, 0.35);
const COLOR_AXIS_GRID: (u8, u8, u8, f64) = (0, 0, 0, 0.07);
const COLOR_LEGEND_BG: (u8, u8, u8, f64) = (255, 255, 255, 0.75);
const COLOR_LEGEND_BORDER: (u8, u8, u8, f64) = (210, 210, 210, 0.8);

/// One line color per region, cycled when the list outgrows the palette.
const REGION_PALETTE: &[(u8, u8, u8)] = &[
    (36, 100, 166),
    (214, 39, 40),
    (44, 160, 44),
    (148, 103, 189),
    (255, 127, 14),
    (23, 190, 207),
    (227, 119, 194),
    (127, 127, 127),
    (188, 189, 34),
    (140, 86, 75),
    (31, 119, 180),
    (174, 199, 232),
    (255, 152, 150),
];

fn rgb(color: (u8, u8, u8)) -> Rgb {
    Rgb::new(color.0, color.1, color.2)
}

fn rgba(color: (u8, u8, u8, f64)) -> Rgba {
    Rgba::new(color.0, color.1, color.2, color.3)
}

fn region_color(idx: usize) -> Rgb {
    rgb(REGION_PALETTE[idx % REGION_PALETTE.len()])
}

/// Extracts the plottable (date, value) pairs of one field; points where
/// the field is absent contribute nothing to the trace.
fn trace_series(points: &[TimePoint], field: &str) -> (Vec<String>, Vec<f64>) {
    points
        .iter()
        .filter_map(|point| point.value(field).map(|value| (point.date.clone(), value)))
        .unzip()
}

fn latest_value(points: &[TimePoint], field: &str) -> Option<f64> {
    points.iter().rev().find_map(|point| point.value(field))
}

fn range_label(range: DateRange) -> String {
    match (range.from, range.to) {
        (None, None) => RANGE_LABEL_FULL.to_string(),
        (from, to) => {
            let fmt = |bound: Option<chrono::NaiveDate>| {
                bound.map_or_else(|| "…".to_string(), |d| d.format(DATE_FORMAT).to_string())
            };
            format!("{} – {}", fmt(from), fmt(to))
        }
    }
}

/// Builds the four-panel dashboard figure. Every series runs through the
/// data-resolution pipeline with the same date range before plotting.
pub(super) fn build_dashboard_chart(
    data: &DashboardData,
    range: DateRange,
    policy: &ResolutionPolicy,
) -> ChartOutput {
    let trend = series::process(&data.trend, range, policy);
    let gilts = series::process(&data.gilts, range, policy);
    let house_prices = series::process(&data.house_prices, range, policy);
    let incomes = series::process(&data.incomes, range, policy);

    let mut plot = Plot::new();

    for (idx, region) in data::region_names().into_iter().enumerate() {
        let color = region_color(idx);
        let panels = [
            (&trend, AXIS_AFFORDABILITY_X, AXIS_AFFORDABILITY_Y, true),
            (&house_prices, AXIS_PRICES_X, AXIS_PRICES_Y, false),
            (&incomes, AXIS_INCOME_X, AXIS_INCOME_Y, false),
        ];
        for (points, x_axis, y_axis, show_legend) in panels {
            let (dates, values) = trace_series(points, region);
            if dates.is_empty() {
                continue;
            }
            plot.add_trace(
                Scatter::new(dates, values)
                    .mode(Mode::Lines)
                    .line(
                        Line::new()
                            .color(color)
                            .width(LINE_WIDTH_REGION)
                            .simplify(true),
                    )
                    .name(region)
                    .show_legend(show_legend)
                    .x_axis(x_axis)
                    .y_axis(y_axis),
            );
        }
    }

    let (gilt_dates, gilt_values) = trace_series(&gilts, GILT_YIELD_FIELD);
    if !gilt_dates.is_empty() {
        plot.add_trace(
            Scatter::new(gilt_dates, gilt_values)
                .mode(Mode::Lines)
                .line(
                    Line::new()
                        .color(rgb(COLOR_GILTS))
                        .width(LINE_WIDTH_GILTS)
                        .simplify(true),
                )
                .name(LABEL_GILTS)
                .x_axis(AXIS_GILTS_X)
                .y_axis(AXIS_GILTS_Y),
        );
    }

    let mut annotations = Vec::new();
    let (headline_dates, headline_scores) = trace_series(&trend, HEADLINE_REGION);
    if let (Some(last_date), Some(last_score)) = (headline_dates.last(), headline_scores.last()) {
        annotations.push(
            Annotation::new()
                .text(format!("{HEADLINE_REGION}: {last_score:.1}"))
                .x(last_date.clone())
                .y(*last_score)
                .x_ref(AXIS_AFFORDABILITY_X)
                .y_ref(AXIS_AFFORDABILITY_Y)
                .x_anchor(Anchor::Left)
                .y_anchor(Anchor::Bottom)
                .ax(ANNOTATION_OFFSET_X)
                .ay(ANNOTATION_OFFSET_Y)
                .ax_ref(AXIS_REF_PIXEL)
                .ay_ref(AXIS_REF_PIXEL)
                .show_arrow(true)
                .arrow_head(ARROW_HEAD)
                .arrow_size(ARROW_SIZE)
                .arrow_width(ARROW_WIDTH)
                .arrow_color(rgba(COLOR_ARROW))
                .font(
                    Font::new()
                        .size(FONT_SIZE_ANNOTATION)
                        .color(rgb(COLOR_TEXT_ANNOTATION)),
                )
                .background_color(rgba(COLOR_PANEL_BG))
                .border_color(rgba(COLOR_PANEL_BORDER))
                .border_width(LINE_WIDTH_BORDER),
        );
    }

    let layout = Layout::new()
        .font(
            Font::new()
                .family(FONT_FAMILY)
                .size(FONT_SIZE_BASE)
                .color(rgb(COLOR_TEXT_BASE)),
        )
        .auto_size(true)
        .margin(
            Margin::new()
                .left(MARGIN_LEFT)
                .right(MARGIN_RIGHT)
                .top(MARGIN_TOP)
                .bottom(MARGIN_BOTTOM)
                .pad(MARGIN_PAD),
        )
        .grid(
            LayoutGrid::new()
                .rows(GRID_ROWS)
                .columns(GRID_COLS)
                .pattern(GridPattern::Independent)
                .row_order(RowOrder::TopToBottom),
        )
        .show_legend(true)
        .legend(
            Legend::new()
                .orientation(Orientation::Horizontal)
                .item_click(ItemClick::False)
                .item_double_click(ItemClick::False)
                .x(LEGEND_X)
                .x_anchor(Anchor::Center)
                .y(LEGEND_Y)
                .y_anchor(Anchor::Bottom)
                .font(Font::new().size(LEGEND_FONT_SIZE))
                .background_color(rgba(COLOR_LEGEND_BG))
                .border_color(rgba(COLOR_LEGEND_BORDER))
                .border_width(LEGEND_BORDER_WIDTH),
        )
        .annotations(annotations)
        .x_axis(date_axis())
        .y_axis(value_axis(UNIT_SCORE))
        .x_axis2(date_axis())
        .y_axis2(value_axis(UNIT_POUNDS_PRICE))
        .x_axis3(date_axis())
        .y_axis3(value_axis(UNIT_POUNDS_INCOME))
        .x_axis4(date_axis())
        .y_axis4(value_axis(UNIT_PERCENT));

    plot.set_layout(layout);
    plot.set_configuration(Configuration::new().responsive(true));

    let summary = build_summary(data, range, &trend, &gilts, &house_prices, &incomes);
    ChartOutput { plot, summary }
}

fn date_axis() -> Axis {
    Axis::new()
        .tick_format(TICK_FORMAT_MONTH_YEAR)
        .n_ticks(AXIS_TICKS_COUNT)
        .tick_font(Font::new().size(FONT_SIZE_AXIS_TICK))
        .ticks(TicksDirection::Outside)
        .tick_length(TICK_LENGTH)
        .tick_color(rgba(COLOR_AXIS_TICK))
        .show_line(true)
        .line_color(rgba(COLOR_AXIS_LINE))
        .grid_color(rgba(COLOR_AXIS_GRID))
        .grid_width(AXIS_GRID_WIDTH)
        .auto_margin(true)
}

fn value_axis(title: &str) -> Axis {
    Axis::new()
        .title(Title::with_text(title).font(Font::new().size(FONT_SIZE_AXIS_TITLE)))
        .tick_font(Font::new().size(FONT_SIZE_AXIS_TICK))
        .ticks(TicksDirection::Outside)
        .tick_length(TICK_LENGTH)
        .tick_color(rgba(COLOR_AXIS_TICK))
        .separate_thousands(true)
        .show_line(true)
        .line_color(rgba(COLOR_AXIS_LINE))
        .grid_color(rgba(COLOR_AXIS_GRID))
        .grid_width(AXIS_GRID_WIDTH)
        .auto_margin(true)
}

fn build_summary(
    data: &DashboardData,
    range: DateRange,
    trend: &[TimePoint],
    gilts: &[TimePoint],
    house_prices: &[TimePoint],
    incomes: &[TimePoint],
) -> DashboardSummary {
    let snapshot = data.snapshot.as_ref();
    let headline = snapshot.and_then(|snapshot| snapshot.get(HEADLINE_REGION));

    let gilt_values = gilts
        .iter()
        .filter_map(|point| point.value(GILT_YIELD_FIELD))
        .collect_vec();
    let gilt_yield = gilt_values.last().copied();
    let gilt_change = (gilt_values.len() >= 2)
        .then(|| gilt_values[gilt_values.len() - 1] - gilt_values[gilt_values.len() - 2]);

    let regions = data::region_names()
        .into_iter()
        .filter_map(|region| {
            let affordability = latest_value(trend, region)?;
            let region_snapshot = snapshot.and_then(|snapshot| snapshot.get(region));
            Some(RegionRow {
                name: region.to_string(),
                affordability,
                house_price: latest_value(house_prices, region),
                income: latest_value(incomes, region),
                worsening: region_snapshot.is_some_and(|s| s.trend == Trend::Up),
            })
        })
        .collect_vec();

    DashboardSummary {
        latest_date: trend
            .last()
            .map_or_else(String::new, |point| point.date.clone()),
        range_label: range_label(range),
        gilt_yield: headline.map(|h| h.gilts.value).or(gilt_yield),
        gilt_change: headline.map(|h| h.gilts.change).or(gilt_change),
        headline_region: HEADLINE_REGION,
        headline_affordability: headline
            .map(|h| h.affordability)
            .or_else(|| latest_value(trend, HEADLINE_REGION)),
        headline_house_price: headline
            .map(|h| h.house_price.value)
            .or_else(|| latest_value(house_prices, HEADLINE_REGION)),
        headline_income: headline
            .map(|h| h.income.value)
            .or_else(|| latest_value(incomes, HEADLINE_REGION)),
        regions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(date: &str, field: &str, value: f64) -> TimePoint {
        TimePoint::new(date).with_value(field, value)
    }

    fn sample_data() -> DashboardData {
        DashboardData {
            trend: vec![
                point("2024-01-01", "England", 5.5).with_value(GILT_YIELD_FIELD, 4.0),
                point("2024-02-01", "England", 5.8).with_value(GILT_YIELD_FIELD, 4.2),
            ],
            gilts: vec![
                point("2024-01-01", GILT_YIELD_FIELD, 4.0),
                point("2024-02-01", GILT_YIELD_FIELD, 4.2),
            ],
            house_prices: vec![point("2024-01-01", "England", 285_000.0)],
            incomes: vec![point("2024-01-01", "England", 35_000.0)],
            snapshot: None,
        }
    }

    #[test]
    fn summary_falls_back_to_processed_series() {
        let data = sample_data();
        let output =
            build_dashboard_chart(&data, DateRange::UNBOUNDED, &ResolutionPolicy::default());
        let summary = output.summary;
        assert_eq!(summary.latest_date, "2024-02-01");
        assert_eq!(summary.range_label, RANGE_LABEL_FULL);
        assert_eq!(summary.gilt_yield, Some(4.2));
        assert!((summary.gilt_change.unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(summary.headline_affordability, Some(5.8));
        assert_eq!(summary.regions.len(), 1);
        assert_eq!(summary.regions[0].name, "England");
    }

    #[test]
    fn range_restricts_every_panel() {
        let data = sample_data();
        let to = chrono::NaiveDate::parse_from_str("2024-01-15", DATE_FORMAT).unwrap();
        let range = DateRange::new(None, Some(to));
        let output = build_dashboard_chart(&data, range, &ResolutionPolicy::default());
        assert_eq!(output.summary.latest_date, "2024-01-01");
        assert_eq!(output.summary.gilt_yield, Some(4.0));
        assert_eq!(output.summary.range_label, "… – 2024-01-15");
    }

    #[test]
    fn trace_series_skips_absent_fields() {
        let points = vec![
            point("2024-01-01", "England", 1.0),
            point("2024-02-01", "Wales", 2.0),
            point("2024-03-01", "England", 3.0),
        ];
        let (dates, values) = trace_series(&points, "England");
        assert_eq!(dates, vec!["2024-01-01", "2024-03-01"]);
        assert_eq!(values, vec![1.0, 3.0]);
    }
}
