//! Dashboard rendering: Plotly chart assembly and HTML page generation.

mod chart;
mod page;

use std::error::Error;
use std::fs;
use std::path::Path;

use chrono::Utc;
use minify_html::{Cfg, minify};

use crate::data::Snapshot;
use crate::series::{DateRange, ResolutionPolicy, TimePoint};

/// All series and the optional snapshot feeding the dashboard.
pub struct DashboardData {
    pub trend: Vec<TimePoint>,
    pub gilts: Vec<TimePoint>,
    pub house_prices: Vec<TimePoint>,
    pub incomes: Vec<TimePoint>,
    pub snapshot: Option<Snapshot>,
}

/// File names of the published data tables linked from the page.
#[derive(Clone, Debug)]
pub struct DownloadLinks {
    pub trend: String,
    pub gilts: String,
    pub house_prices: String,
    pub incomes: String,
}

/// Builds the dashboard chart for the selected date range and writes the
/// final HTML page.
pub fn draw_dashboard(
    data: &DashboardData,
    range: DateRange,
    policy: &ResolutionPolicy,
    output_html: &Path,
    download_links: Option<DownloadLinks>,
    minify_html: bool,
) -> Result<(), Box<dyn Error>> {
    let chart::ChartOutput { plot, summary } = chart::build_dashboard_chart(data, range, policy);

    if let Some(parent) = output_html.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let generated_at = Utc::now();
    let page = page::render_dashboard_page(&plot, &summary, generated_at, download_links.as_ref());
    let body = if minify_html {
        let mut cfg = Cfg::new();
        cfg.minify_css = true;
        cfg.minify_js = true;
        minify(page.as_bytes(), &cfg)
    } else {
        page.into_bytes()
    };
    fs::write(output_html, body)?;
    Ok(())
}
