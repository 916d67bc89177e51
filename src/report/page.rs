//! HTML page rendering around the Plotly figure.

use chrono::{DateTime, Utc};
use maud::{DOCTYPE, PreEscaped, html};
use plotly::Plot;

use super::DownloadLinks;
use super::chart::DashboardSummary;

const PAGE_TITLE: &str = "UK Housing Affordability Dashboard";
const PAGE_SUBTITLE: &str = "House prices, incomes and gilt yields per region, on one timeline.";
const PAGE_DESCRIPTION: &str = "Interactive dashboard of UK housing affordability: \
    house-price-to-income scores, 10-year gilt yields, average house prices and median \
    incomes per region.";
const PAGE_KEYWORDS: &str =
    "uk housing, affordability, house prices, gilt yields, income, dashboard, charts";
const SITE_URL: &str = "https://affordash.yimbyalliance.org/";
const SITE_NAME: &str = "Affordash";
const FAVICON_DATA_URI: &str = "data:image/svg+xml,%3Csvg%20xmlns='http://www.w3.org/2000/svg'%20viewBox='0%200%2064%2064'%3E%3Crect%20width='64'%20height='64'%20rx='14'%20fill='%232464a6'/%3E%3Ctext%20x='32'%20y='41'%20font-size='28'%20text-anchor='middle'%20font-family='IBM%20Plex%20Sans,%20Arial,%20sans-serif'%20fill='white'%3EA%3C/text%3E%3C/svg%3E";
const GENERATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M UTC";
const GOOGLE_FONTS_CSS: &str =
    "https://fonts.googleapis.com/css2?family=IBM+Plex+Sans:wght@400;500;600&display=swap";
const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";
const GITHUB_REPO_URL: &str = "https://github.com/yimbyalliance/affordash";
const GITHUB_REPO_TEXT: &str = "github.com/yimbyalliance/affordash";
const MISSING_VALUE: &str = "—";
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[allow(clippy::too_many_lines)]
pub(super) fn render_dashboard_page(
    plot: &Plot,
    summary: &DashboardSummary,
    generated_at: DateTime<Utc>,
    download_links: Option<&DownloadLinks>,
) -> String {
    let plot_html = plot.to_inline_html(Some("dashboard-plot"));
    let generated_label = generated_at.format(GENERATED_AT_FORMAT).to_string();
    let affordability_label = summary
        .headline_affordability
        .map_or_else(|| MISSING_VALUE.to_string(), |score| format!("{score:.1}"));
    let gilt_label = summary
        .gilt_yield
        .map_or_else(|| MISSING_VALUE.to_string(), |y| format!("{y:.2}%"));
    let gilt_change_label = summary
        .gilt_change
        .map_or_else(|| MISSING_VALUE.to_string(), |c| format!("{c:+.2} pp"));
    let house_price_label = format_pounds(summary.headline_house_price);
    let income_label = format_pounds(summary.headline_income);

    let page = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                meta name="description" content=(PAGE_DESCRIPTION);
                meta name="keywords" content=(PAGE_KEYWORDS);
                link rel="canonical" href=(SITE_URL);
                link rel="icon" type="image/svg+xml" href=(FAVICON_DATA_URI);
                meta property="og:title" content=(PAGE_TITLE);
                meta property="og:description" content=(PAGE_DESCRIPTION);
                meta property="og:type" content="website";
                meta property="og:url" content=(SITE_URL);
                meta property="og:site_name" content=(SITE_NAME);
                meta name="twitter:card" content="summary";
                meta name="twitter:title" content=(PAGE_TITLE);
                meta name="twitter:description" content=(PAGE_DESCRIPTION);
                title { (PAGE_TITLE) }
                link rel="preconnect" href="https://fonts.googleapis.com";
                link rel="preconnect" href="https://fonts.gstatic.com" crossorigin;
                link rel="stylesheet" href=(GOOGLE_FONTS_CSS);
                script src=(PLOTLY_CDN) {}
                style {
                    "
                    :root {
                        color-scheme: light;
                        --bg: #f7f6f2;
                        --card: #ffffff;
                        --ink: #1f2430;
                        --muted: #56606f;
                        --accent: #2464a6;
                        --border: rgba(31, 36, 48, 0.08);
                    }
                    * { box-sizing: border-box; }
                    body {
                        margin: 0;
                        background: var(--bg);
                        color: var(--ink);
                        font-family: \"IBM Plex Sans\", Arial, sans-serif;
                    }
                    .page {
                        max-width: 1240px;
                        margin: 40px auto 60px;
                        padding: 0 24px;
                    }
                    .hero {
                        display: flex;
                        flex-wrap: wrap;
                        gap: 16px;
                        align-items: center;
                        justify-content: space-between;
                        margin-bottom: 22px;
                    }
                    .hero-aside {
                        display: flex;
                        flex-direction: column;
                        gap: 10px;
                        align-items: flex-end;
                    }
                    .title {
                        font-size: 26px;
                        font-weight: 600;
                        margin: 0;
                    }
                    .subtitle {
                        margin: 6px 0 0;
                        color: var(--muted);
                        font-size: 13px;
                    }
                    .link {
                        display: inline-flex;
                        align-items: center;
                        gap: 8px;
                        padding: 8px 14px;
                        border-radius: 999px;
                        border: 1px solid rgba(36, 100, 166, 0.25);
                        color: var(--accent);
                        font-weight: 500;
                        text-decoration: none;
                        transition: transform 0.2s ease, background 0.2s ease;
                    }
                    .link:hover {
                        transform: translateY(-1px);
                        background: rgba(36, 100, 166, 0.08);
                    }
                    .link svg {
                        width: 16px;
                        height: 16px;
                        display: block;
                    }
                    .card {
                        background: var(--card);
                        border-radius: 18px;
                        padding: 16px;
                        border: 1px solid var(--border);
                        overflow-x: auto;
                    }
                    .range-badge {
                        display: inline-flex;
                        align-items: center;
                        gap: 8px;
                        padding: 4px 10px;
                        border-radius: 999px;
                        border: 1px solid rgba(36, 100, 166, 0.25);
                        background: rgba(36, 100, 166, 0.08);
                        color: var(--accent);
                        font-size: 11px;
                        font-weight: 600;
                        letter-spacing: 0.02em;
                        margin-bottom: 10px;
                    }
                    .summary {
                        margin: 14px 0 18px;
                    }
                    .summary-grid {
                        display: grid;
                        grid-template-columns: repeat(auto-fit, minmax(220px, 1fr));
                        gap: 14px;
                    }
                    .summary-card {
                        background: var(--card);
                        border-radius: 16px;
                        padding: 14px 16px;
                        border: 1px solid var(--border);
                    }
                    .summary-label {
                        font-size: 11px;
                        text-transform: uppercase;
                        letter-spacing: 0.08em;
                        color: var(--muted);
                    }
                    .summary-value {
                        font-size: 20px;
                        font-weight: 600;
                        margin-top: 6px;
                    }
                    .summary-sub {
                        margin-top: 6px;
                        font-size: 12px;
                        color: var(--muted);
                    }
                    .table-card {
                        background: var(--card);
                        border-radius: 18px;
                        padding: 18px 20px;
                        border: 1px solid var(--border);
                        margin-top: 18px;
                    }
                    .table-title {
                        margin: 0 0 10px;
                        font-size: 16px;
                        font-weight: 600;
                    }
                    .table-controls {
                        display: flex;
                        align-items: center;
                        gap: 10px;
                        margin-bottom: 10px;
                        font-size: 12px;
                        color: var(--muted);
                    }
                    .table-controls select {
                        font: inherit;
                        padding: 6px 8px;
                        border-radius: 8px;
                        border: 1px solid var(--border);
                        background: #fff;
                        color: var(--ink);
                    }
                    .region-table {
                        width: 100%;
                        border-collapse: collapse;
                        font-size: 13px;
                    }
                    .region-table th,
                    .region-table td {
                        padding: 8px 10px;
                        border-bottom: 1px solid var(--border);
                        text-align: left;
                    }
                    .region-table th {
                        color: var(--muted);
                        font-weight: 500;
                        letter-spacing: 0.02em;
                        text-transform: uppercase;
                        font-size: 11px;
                    }
                    .region-table tbody tr:nth-child(even) {
                        background: rgba(31, 36, 48, 0.02);
                    }
                    .worsening {
                        color: #c8432e;
                        font-weight: 600;
                    }
                    .downloads {
                        display: flex;
                        flex-wrap: wrap;
                        gap: 10px;
                        margin-top: 14px;
                    }
                    #dashboard-plot {
                        width: 100%;
                        min-height: 720px;
                    }
                    footer {
                        margin-top: 16px;
                        font-size: 12px;
                        color: var(--muted);
                        text-align: right;
                    }
                    footer a {
                        color: inherit;
                        text-decoration: none;
                        border-bottom: 1px dotted rgba(86, 96, 111, 0.6);
                    }
                    @media (max-width: 900px) {
                        .title { font-size: 22px; }
                        #dashboard-plot { min-height: 560px; }
                        .hero-aside { width: 100%; align-items: flex-start; }
                    }
                    "
                }
            }
            body {
                div class="page" {
                    header class="hero" {
                        div {
                            h1 class="title" { (PAGE_TITLE) }
                            p class="subtitle" { (PAGE_SUBTITLE) }
                        }
                        div class="hero-aside" {
                            a class="link" href=(GITHUB_REPO_URL) aria-label="GitHub repository" {
                                svg viewBox="0 0 24 24" aria-hidden="true" focusable="false" {
                                    path fill="currentColor" d="M12 .5C5.65.5.5 5.8.5 12.3c0 5.2 3.4 9.6 8.1 11.1.6.1.8-.3.8-.6v-2.1c-3.3.7-4-1.6-4-1.6-.5-1.3-1.3-1.7-1.3-1.7-1.1-.8.1-.8.1-.8 1.2.1 1.9 1.3 1.9 1.3 1.1 1.9 2.9 1.3 3.6 1 .1-.8.4-1.3.7-1.6-2.7-.3-5.5-1.4-5.5-6 0-1.3.5-2.3 1.2-3.2-.1-.3-.5-1.5.1-3.1 0 0 1-.3 3.3 1.2 1-.3 2-.4 3-.4s2 .1 3 .4c2.3-1.5 3.3-1.2 3.3-1.2.6 1.6.2 2.8.1 3.1.8.9 1.2 2 1.2 3.2 0 4.6-2.8 5.6-5.5 5.9.4.4.8 1.1.8 2.2v3.3c0 .3.2.7.8.6 4.7-1.5 8.1-5.9 8.1-11.1C23.5 5.8 18.4.5 12 .5z" {}
                                }
                                (GITHUB_REPO_TEXT)
                            }
                        }
                    }
                    section class="summary" {
                        div class="summary-grid" {
                            div class="summary-card" {
                                div class="summary-label" { "Affordability · " (summary.headline_region) }
                                div class="summary-value" { (affordability_label) }
                                div class="summary-sub" { "Combined mortgage and deposit burden score" }
                            }
                            div class="summary-card" {
                                div class="summary-label" { "10-year gilt yield" }
                                div class="summary-value" { (gilt_label) }
                                div class="summary-sub" { (gilt_change_label) " since the previous reading" }
                            }
                            div class="summary-card" {
                                div class="summary-label" { "Average house price · " (summary.headline_region) }
                                div class="summary-value" { (house_price_label) }
                                div class="summary-sub" { "Median income: " (income_label) }
                            }
                            div class="summary-card" {
                                div class="summary-label" { "Latest observation" }
                                div class="summary-value" { (summary.latest_date) }
                                div class="summary-sub" { "Generated: " (generated_label) }
                            }
                        }
                    }
                    div class="card" {
                        span class="range-badge" { "Range: " (summary.range_label) }
                        (PreEscaped(plot_html))
                    }
                    section class="table-card" {
                        h2 class="table-title" { "Regions by affordability" }
                        div class="table-controls" {
                            span { "Sort:" }
                            select id="region-sort" {
                                option value="score" selected { "by score" }
                                option value="name" { "by name" }
                            }
                        }
                        table class="region-table" {
                            thead {
                                tr {
                                    th { "Region" }
                                    th { "Score" }
                                    th { "House price" }
                                    th { "Income" }
                                }
                            }
                            tbody {
                                @for row in &summary.regions {
                                    tr class="region-row" data-name=(row.name) data-score=(row.affordability) {
                                        td { (row.name) }
                                        @if row.worsening {
                                            td class="worsening" { (format!("{:.1}", row.affordability)) " ▲" }
                                        } @else {
                                            td { (format!("{:.1}", row.affordability)) }
                                        }
                                        td { (format_pounds(row.house_price)) }
                                        td { (format_pounds(row.income)) }
                                    }
                                }
                            }
                        }
                        @if let Some(links) = download_links {
                            div class="downloads" {
                                a class="link" href=(&links.trend) download { "Affordability CSV" }
                                a class="link" href=(&links.gilts) download { "Gilt yields CSV" }
                                a class="link" href=(&links.house_prices) download { "House prices CSV" }
                                a class="link" href=(&links.incomes) download { "Incomes CSV" }
                            }
                        }
                        script {
                            (PreEscaped(r"
                            (() => {
                                const select = document.getElementById('region-sort');
                                if (!select) return;
                                const tbody = document.querySelector('.region-table tbody');
                                const sortRows = () => {
                                    if (!tbody) return;
                                    const rows = Array.from(tbody.querySelectorAll('tr.region-row'));
                                    rows.sort((a, b) => {
                                        if (select.value === 'name') {
                                            return a.dataset.name.localeCompare(b.dataset.name, 'en');
                                        }
                                        return parseFloat(b.dataset.score) - parseFloat(a.dataset.score);
                                    });
                                    rows.forEach(row => tbody.appendChild(row));
                                };
                                sortRows();
                                select.addEventListener('change', sortRows);
                            })();
                            "))
                        }
                    }
                    footer {
                        "Version: " (APP_VERSION) " · Generated: " (generated_label) " · Sources: "
                        a href="https://www.ons.gov.uk" { "ONS" }
                        " · "
                        a href="https://www.bankofengland.co.uk" { "Bank of England" }
                        " · "
                        a href="https://landregistry.data.gov.uk" { "Land Registry" }
                    }
                }
            }
        }
    };
    page.into_string()
}

/// Whole pounds with thousands separators; absent values render as a dash.
fn format_pounds(value: Option<f64>) -> String {
    let Some(value) = value else {
        return MISSING_VALUE.to_string();
    };
    let whole = value.round() as i64;
    let digits = whole.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    let offset = digits.len() % 3;
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (idx + 3 - offset) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if whole < 0 { "-" } else { "" };
    format!("{sign}£{grouped}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pounds_formatting_groups_thousands() {
        assert_eq!(format_pounds(Some(285_000.0)), "£285,000");
        assert_eq!(format_pounds(Some(1_234_567.4)), "£1,234,567");
        assert_eq!(format_pounds(Some(950.0)), "£950");
        assert_eq!(format_pounds(Some(-1_500.0)), "-£1,500");
        assert_eq!(format_pounds(None), MISSING_VALUE);
    }
}
