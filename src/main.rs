mod affordability;
mod constants;
mod data;
mod report;
mod series;

use chrono::NaiveDate;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use crate::affordability::AffordabilityConfig;
use crate::data::{
    AFFORDABILITY_JSON, AFFORDABILITY_TREND_CSV, GILTS_CSV, HOUSE_PRICES_CSV, INCOME_CSV,
};
use crate::report::{DashboardData, DownloadLinks};
use crate::series::{DateRange, ResolutionPolicy};

const APP_ABOUT: &str = "Affordash - UK housing affordability dashboard generator";
const DEFAULT_DATA_DIR: &str = "public";
const DEFAULT_OUTPUT_HTML: &str = "dist/index.html";
const DEFAULT_CONFIG: &str = "config/dashboard.toml";
const CSV_ARCHIVE_EXTENSION: &str = "gz";

#[derive(Parser, Debug)]
#[command(name = "affordash", about = APP_ABOUT)]
struct Args {
    /// Gzip the published CSVs and link the archives from the HTML.
    #[arg(long = "archive-csv", global = true)]
    archive_csv: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the dashboard HTML from the data directory.
    Render {
        /// Directory holding the static data files.
        #[arg(
            short = 'd',
            long = "data-dir",
            value_name = "PATH",
            default_value = DEFAULT_DATA_DIR
        )]
        data_dir: PathBuf,
        /// Where to write the HTML.
        #[arg(
            short = 'o',
            long = "output-html",
            value_name = "PATH",
            default_value = DEFAULT_OUTPUT_HTML
        )]
        output_html: PathBuf,
        /// Lower bound of the date range (inclusive, YYYY-MM-DD).
        #[arg(long = "from", value_name = "DATE")]
        from: Option<NaiveDate>,
        /// Upper bound of the date range (inclusive, YYYY-MM-DD).
        #[arg(long = "to", value_name = "DATE")]
        to: Option<NaiveDate>,
        /// Do not minify the HTML (minified by default).
        #[arg(
            long = "no-minify-html",
            default_value_t = true,
            action = ArgAction::SetFalse
        )]
        minify_html: bool,
        /// TOML file with resolution and affordability parameters.
        #[arg(
            long = "config",
            value_name = "PATH",
            default_value = DEFAULT_CONFIG
        )]
        config: PathBuf,
    },
    /// Recompute the affordability trend table and JSON snapshot.
    Refresh {
        /// Directory holding the static data files.
        #[arg(
            short = 'd',
            long = "data-dir",
            value_name = "PATH",
            default_value = DEFAULT_DATA_DIR
        )]
        data_dir: PathBuf,
        /// TOML file with resolution and affordability parameters.
        #[arg(
            long = "config",
            value_name = "PATH",
            default_value = DEFAULT_CONFIG
        )]
        config: PathBuf,
    },
    /// Log the latest per-region snapshot values.
    Summary {
        /// Directory holding the static data files.
        #[arg(
            short = 'd',
            long = "data-dir",
            value_name = "PATH",
            default_value = DEFAULT_DATA_DIR
        )]
        data_dir: PathBuf,
    },
    /// Generate shell completion files.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
        /// Where to save the file (stdout when omitted).
        #[arg(short = 'o', long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    resolution: Option<ResolutionFile>,
    affordability: Option<AffordabilityFile>,
}

#[derive(Debug, Deserialize)]
struct ResolutionFile {
    max_raw_points: Option<usize>,
    weekly_span_days: Option<i64>,
    biweekly_span_days: Option<i64>,
    monthly_span_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AffordabilityFile {
    #[serde(alias = "spread")]
    mortgage_spread_pct: Option<f64>,
    deposit_share: Option<f64>,
    term_years: Option<u32>,
    payment_weight: Option<f64>,
    deposit_weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ResolvedConfig {
    policy: ResolutionPolicy,
    affordability: AffordabilityConfig,
}

fn resolve_policy(overrides: Option<ResolutionFile>) -> ResolutionPolicy {
    let mut policy = ResolutionPolicy::default();
    if let Some(overrides) = overrides {
        if let Some(max_raw_points) = overrides.max_raw_points {
            policy.max_raw_points = max_raw_points;
        }
        if let Some(weekly) = overrides.weekly_span_days {
            policy.weekly_span_days = weekly;
        }
        if let Some(biweekly) = overrides.biweekly_span_days {
            policy.biweekly_span_days = biweekly;
        }
        if let Some(monthly) = overrides.monthly_span_days {
            policy.monthly_span_days = monthly;
        }
    }
    policy
}

fn resolve_affordability(overrides: Option<AffordabilityFile>) -> AffordabilityConfig {
    let mut cfg = AffordabilityConfig::default();
    if let Some(overrides) = overrides {
        if let Some(spread) = overrides.mortgage_spread_pct {
            cfg.mortgage_spread_pct = spread;
        }
        if let Some(deposit_share) = overrides.deposit_share {
            cfg.deposit_share = deposit_share;
        }
        if let Some(term_years) = overrides.term_years {
            cfg.term_years = term_years;
        }
        if let Some(payment_weight) = overrides.payment_weight {
            cfg.payment_weight = payment_weight;
        }
        if let Some(deposit_weight) = overrides.deposit_weight {
            cfg.deposit_weight = deposit_weight;
        }
    }
    cfg
}

fn validate_policy(policy: &ResolutionPolicy) -> Result<(), String> {
    if policy.max_raw_points == 0 {
        return Err("resolution.max_raw_points must be >= 1".to_string());
    }
    if policy.weekly_span_days <= 0 {
        return Err("resolution.weekly_span_days must be > 0".to_string());
    }
    if policy.biweekly_span_days < policy.weekly_span_days {
        return Err("resolution.biweekly_span_days must be >= weekly_span_days".to_string());
    }
    if policy.monthly_span_days < policy.biweekly_span_days {
        return Err("resolution.monthly_span_days must be >= biweekly_span_days".to_string());
    }
    Ok(())
}

fn validate_affordability(cfg: &AffordabilityConfig) -> Result<(), String> {
    if !cfg.mortgage_spread_pct.is_finite() || cfg.mortgage_spread_pct < 0.0 {
        return Err("affordability.mortgage_spread_pct must be >= 0".to_string());
    }
    if !cfg.deposit_share.is_finite() || !(0.0..1.0).contains(&cfg.deposit_share) {
        return Err("affordability.deposit_share must be within 0..1".to_string());
    }
    if cfg.term_years == 0 {
        return Err("affordability.term_years must be >= 1".to_string());
    }
    if !cfg.payment_weight.is_finite() || cfg.payment_weight < 0.0 {
        return Err("affordability.payment_weight must be >= 0".to_string());
    }
    if !cfg.deposit_weight.is_finite() || cfg.deposit_weight < 0.0 {
        return Err("affordability.deposit_weight must be >= 0".to_string());
    }
    if cfg.payment_weight + cfg.deposit_weight <= 0.0 {
        return Err("affordability weights must not both be zero".to_string());
    }
    Ok(())
}

/// The default config path is allowed to be absent; an explicitly
/// requested one is not.
fn missing_config(path: &Path) -> Result<ResolvedConfig, String> {
    if path == Path::new(DEFAULT_CONFIG) {
        tracing::info!("Config {} not found, using built-in defaults", path.display());
        return Ok(ResolvedConfig::default());
    }
    Err(format!("Config {} does not exist", path.display()))
}

fn load_config(path: &Path) -> Result<ResolvedConfig, String> {
    if !path.exists() {
        return missing_config(path);
    }

    let raw = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read config {}: {err}", path.display()))?;
    let config: ConfigFile = toml::from_str(&raw)
        .map_err(|err| format!("Failed to parse config {}: {err}", path.display()))?;

    let policy = resolve_policy(config.resolution);
    validate_policy(&policy).map_err(|err| format!("Invalid config {}: {err}", path.display()))?;
    let affordability = resolve_affordability(config.affordability);
    validate_affordability(&affordability)
        .map_err(|err| format!("Invalid config {}: {err}", path.display()))?;

    Ok(ResolvedConfig {
        policy,
        affordability,
    })
}

fn generate_completions(shell: Shell, output: Option<PathBuf>) -> Result<(), String> {
    let mut cmd = Args::command();
    let bin_name = cmd.get_name().to_string();
    if let Some(path) = output {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .map_err(|err| format!("Failed to create {}: {err}", parent.display()))?;
        }
        let mut file = File::create(&path)
            .map_err(|err| format!("Failed to create {}: {err}", path.display()))?;
        generate(shell, &mut cmd, bin_name, &mut file);
    } else {
        let mut stdout = std::io::stdout();
        generate(shell, &mut cmd, bin_name, &mut stdout);
    }
    Ok(())
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("affordash=info"));
    let ansi = std::io::stdout().is_terminal();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(ansi)
        .compact()
        .init();
}

fn headline(message: &str) {
    tracing::info!(status = "start", "{message}");
}

fn success(message: &str) {
    tracing::info!(status = "ok", "{message}");
}

fn error(message: &str) {
    tracing::error!(status = "err", "{message}");
}

fn file_name_for(path: &Path) -> Result<String, String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| format!("Path {} has no file name", path.display()))
}

/// Copies a source table next to the HTML so the page can link it; with
/// `archive` the copy is gzipped instead. Returns the published file name.
fn publish_table(source: &Path, output_dir: &Path, archive: bool) -> Result<String, String> {
    fs::create_dir_all(output_dir)
        .map_err(|err| format!("Failed to create {}: {err}", output_dir.display()))?;
    let file_name = file_name_for(source)?;
    if !archive {
        fs::copy(source, output_dir.join(&file_name)).map_err(|err| {
            format!(
                "Failed to copy {} to {}: {err}",
                source.display(),
                output_dir.display()
            )
        })?;
        return Ok(file_name);
    }

    let archive_name = format!("{file_name}.{CSV_ARCHIVE_EXTENSION}");
    let archive_path = output_dir.join(&archive_name);
    let mut input = File::open(source)
        .map_err(|err| format!("Failed to open CSV {}: {err}", source.display()))?;
    let output = File::create(&archive_path)
        .map_err(|err| format!("Failed to create archive {}: {err}", archive_path.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut input, &mut encoder)
        .map_err(|err| format!("Failed to write archive {}: {err}", archive_path.display()))?;
    encoder
        .finish()
        .map_err(|err| format!("Failed to finalize archive {}: {err}", archive_path.display()))?;
    Ok(archive_name)
}

fn publish_download_links(
    data_dir: &Path,
    output_dir: &Path,
    archive: bool,
) -> Result<DownloadLinks, String> {
    Ok(DownloadLinks {
        trend: publish_table(&data_dir.join(AFFORDABILITY_TREND_CSV), output_dir, archive)?,
        gilts: publish_table(&data_dir.join(GILTS_CSV), output_dir, archive)?,
        house_prices: publish_table(&data_dir.join(HOUSE_PRICES_CSV), output_dir, archive)?,
        incomes: publish_table(&data_dir.join(INCOME_CSV), output_dir, archive)?,
    })
}

fn load_dashboard_data(data_dir: &Path) -> Result<DashboardData, String> {
    let trend =
        data::load_table(&data_dir.join(AFFORDABILITY_TREND_CSV)).map_err(|err| err.to_string())?;
    let gilts = data::load_table(&data_dir.join(GILTS_CSV)).map_err(|err| err.to_string())?;
    let house_prices =
        data::load_table(&data_dir.join(HOUSE_PRICES_CSV)).map_err(|err| err.to_string())?;
    let incomes = data::load_table(&data_dir.join(INCOME_CSV)).map_err(|err| err.to_string())?;

    let snapshot_path = data_dir.join(AFFORDABILITY_JSON);
    let snapshot = if snapshot_path.exists() {
        match data::load_snapshot(&snapshot_path) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(error = %err, "Snapshot unreadable, cards fall back to series data");
                None
            }
        }
    } else {
        None
    };

    Ok(DashboardData {
        trend,
        gilts,
        house_prices,
        incomes,
        snapshot,
    })
}

fn main() {
    let args = Args::parse();
    let archive_csv = args.archive_csv;
    match args.command {
        Command::Completions { shell, output } => {
            if let Err(err) = generate_completions(shell, output) {
                eprintln!("{err}");
            }
        }
        Command::Render {
            data_dir,
            output_html,
            from,
            to,
            minify_html,
            config: config_path,
        } => {
            init_logging();
            headline(APP_ABOUT);
            let config = match load_config(&config_path) {
                Ok(config) => config,
                Err(err) => {
                    error(&err);
                    return;
                }
            };
            tracing::info!(
                mode = "render",
                archive_csv,
                data_dir = %data_dir.display(),
                output_html = %output_html.display(),
                from = from.map(|d| d.to_string()),
                to = to.map(|d| d.to_string()),
                minify_html,
                config = %config_path.display(),
                "Rendering dashboard"
            );
            let range = DateRange::new(from, to);
            if let (Some(from), Some(to)) = (from, to)
                && from > to
            {
                tracing::warn!("Date range is inverted, the dashboard will be empty");
            }

            let dashboard = match load_dashboard_data(&data_dir) {
                Ok(dashboard) => dashboard,
                Err(err) => {
                    error(&err);
                    return;
                }
            };
            let output_dir = match output_html.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let download_links = match publish_download_links(&data_dir, &output_dir, archive_csv)
            {
                Ok(links) => links,
                Err(err) => {
                    error(&err);
                    return;
                }
            };

            if let Err(err) = report::draw_dashboard(
                &dashboard,
                range,
                &config.policy,
                &output_html,
                Some(download_links),
                minify_html,
            ) {
                error(&format!("Failed to render dashboard: {err}"));
                return;
            }
            success(&format!("Saved dashboard to {}", output_html.display()));
        }
        Command::Refresh {
            data_dir,
            config: config_path,
        } => {
            init_logging();
            headline(APP_ABOUT);
            let config = match load_config(&config_path) {
                Ok(config) => config,
                Err(err) => {
                    error(&err);
                    return;
                }
            };
            tracing::info!(
                mode = "refresh",
                data_dir = %data_dir.display(),
                config = %config_path.display(),
                "Recomputing affordability data"
            );
            match affordability::refresh_data_dir(&data_dir, &config.affordability) {
                Ok(outcome) => success(&format!(
                    "Wrote {} trend rows and {} region snapshots to {}",
                    outcome.trend_rows,
                    outcome.snapshot_regions,
                    data_dir.display()
                )),
                Err(err) => error(&format!("Failed to refresh affordability data: {err}")),
            }
        }
        Command::Summary { data_dir } => {
            init_logging();
            headline(APP_ABOUT);
            let snapshot = match data::load_snapshot(&data_dir.join(AFFORDABILITY_JSON)) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    error(&err.to_string());
                    return;
                }
            };
            if snapshot.is_empty() {
                error("Snapshot holds no regions, run `affordash refresh` first");
                return;
            }
            for (region, entry) in &snapshot {
                tracing::info!(
                    region,
                    affordability = entry.affordability,
                    gilt_yield = entry.gilts.value,
                    house_price = entry.house_price.value,
                    income = entry.income.value,
                    updated = %entry.last_updated,
                    "Region snapshot"
                );
            }
            success(&format!("{} regions in snapshot", snapshot.len()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> ConfigFile {
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn partial_resolution_overrides_merge_onto_defaults() {
        let config = parse("[resolution]\nmax_raw_points = 100\nmonthly_span_days = 2000\n");
        let policy = resolve_policy(config.resolution);
        assert_eq!(policy.max_raw_points, 100);
        assert_eq!(policy.weekly_span_days, 365);
        assert_eq!(policy.biweekly_span_days, 730);
        assert_eq!(policy.monthly_span_days, 2000);
        assert!(validate_policy(&policy).is_ok());
    }

    #[test]
    fn partial_affordability_overrides_merge_onto_defaults() {
        let config = parse("[affordability]\nspread = 1.5\nterm_years = 30\n");
        let cfg = resolve_affordability(config.affordability);
        assert!((cfg.mortgage_spread_pct - 1.5).abs() < f64::EPSILON);
        assert_eq!(cfg.term_years, 30);
        assert!((cfg.deposit_share - 0.1).abs() < f64::EPSILON);
        assert!(validate_affordability(&cfg).is_ok());
    }

    #[test]
    fn empty_config_resolves_to_defaults() {
        let config = parse("");
        let policy = resolve_policy(config.resolution);
        assert_eq!(policy.max_raw_points, 300);
        let cfg = resolve_affordability(config.affordability);
        assert_eq!(cfg.term_years, 25);
    }

    #[test]
    fn validation_rejects_disordered_span_thresholds() {
        let config = parse("[resolution]\nbiweekly_span_days = 200\n");
        let policy = resolve_policy(config.resolution);
        let err = validate_policy(&policy).unwrap_err();
        assert!(err.contains("biweekly_span_days"), "unexpected error: {err}");

        let config = parse("[resolution]\nmonthly_span_days = 700\n");
        assert!(validate_policy(&resolve_policy(config.resolution)).is_err());

        let config = parse("[resolution]\nmax_raw_points = 0\n");
        assert!(validate_policy(&resolve_policy(config.resolution)).is_err());
    }

    #[test]
    fn validation_rejects_bad_affordability_parameters() {
        let config = parse("[affordability]\ndeposit_share = 1.0\n");
        let err = validate_affordability(&resolve_affordability(config.affordability)).unwrap_err();
        assert!(err.contains("deposit_share"), "unexpected error: {err}");

        let config = parse("[affordability]\nterm_years = 0\n");
        assert!(validate_affordability(&resolve_affordability(config.affordability)).is_err());

        let config = parse("[affordability]\npayment_weight = 0.0\ndeposit_weight = 0.0\n");
        assert!(validate_affordability(&resolve_affordability(config.affordability)).is_err());
    }

    #[test]
    fn absent_default_config_falls_back_to_defaults() {
        let resolved = missing_config(Path::new(DEFAULT_CONFIG)).unwrap();
        assert_eq!(resolved.policy.max_raw_points, 300);
        assert_eq!(resolved.affordability.term_years, 25);
        // Only the default path is allowed to be missing.
        assert!(missing_config(Path::new("elsewhere/dashboard.toml")).is_err());
    }
}
