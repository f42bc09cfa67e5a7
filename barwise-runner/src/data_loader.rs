//! Bar loading for the runner.
//!
//! Two sources:
//! 1. A local CSV file with Yahoo-style columns
//! 2. A deterministic synthetic random walk when no file is configured
//!
//! Synthetic data is a developer-only debug mode. Results produced on it are
//! tagged so they are never mistaken for a real backtest.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use barwise_core::domain::Bar;

use crate::config::BacktestSection;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing column '{0}'")]
    MissingColumn(&'static str),
    #[error("row {row}: unparseable date '{value}'")]
    BadDate { row: usize, value: String },
    #[error("row {row}: unparseable {column} '{value}'")]
    BadNumber {
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("no bars in the selected range")]
    Empty,
}

/// Provenance of a loaded series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum DataSource {
    Csv(PathBuf),
    Synthetic,
}

/// Result of loading bars, including data source provenance.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub bars: Vec<Bar>,
    pub source: DataSource,
    /// BLAKE3 over every bar, for fingerprinting.
    pub dataset_hash: String,
}

impl LoadedData {
    pub fn has_synthetic(&self) -> bool {
        self.source == DataSource::Synthetic
    }
}

/// Load the bars a config selects: the CSV if one is set, otherwise a
/// synthetic walk seeded from `symbol`. The date range applies to both.
pub fn load_bars(section: &BacktestSection, symbol: &str) -> Result<LoadedData, LoadError> {
    let (bars, source) = match &section.data {
        Some(path) => {
            let bars = load_csv(path, section.start_date, section.end_date)?;
            (bars, DataSource::Csv(path.clone()))
        }
        None => {
            warn!(symbol, "no data file configured, generating synthetic bars");
            let start = section
                .start_date
                .or_else(|| NaiveDate::from_ymd_opt(2020, 1, 2))
                .ok_or(LoadError::Empty)?;
            let bars = filter_range(
                generate_synthetic_bars(symbol, start, section.synthetic_bars),
                None,
                section.end_date,
            );
            (bars, DataSource::Synthetic)
        }
    };
    if bars.is_empty() {
        return Err(LoadError::Empty);
    }
    let dataset_hash = compute_dataset_hash(&bars);
    debug!(bars = bars.len(), hash = %dataset_hash, "bars loaded");
    Ok(LoadedData {
        bars,
        source,
        dataset_hash,
    })
}

/// Read a CSV file and keep the bars between `start` and `end` inclusive.
pub fn load_csv(
    path: &Path,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Vec<Bar>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = parse_csv(file)?;
    let bars = filter_range(bars, start, end);
    if bars.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(bars)
}

// ─── CSV parsing ────────────────────────────────────────────────────

/// Column positions resolved from the header row.
struct Columns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
    adj_close: Option<usize>,
    dividends: Option<usize>,
}

/// `Adj Close`, `adj_close` and `ADJCLOSE` all become `adjclose`.
fn normalize_header(h: &str) -> String {
    h.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self, LoadError> {
        let names: Vec<String> = headers.iter().map(normalize_header).collect();
        let find = |aliases: &[&str]| names.iter().position(|n| aliases.contains(&n.as_str()));
        let require = |aliases: &[&str], label: &'static str| {
            find(aliases).ok_or(LoadError::MissingColumn(label))
        };
        Ok(Self {
            date: require(&["date", "datetime", "timestamp"], "date")?,
            open: require(&["open"], "open")?,
            high: require(&["high"], "high")?,
            low: require(&["low"], "low")?,
            close: require(&["close"], "close")?,
            volume: require(&["volume"], "volume")?,
            adj_close: find(&["adjclose"]),
            dividends: find(&["dividends", "dividend"]),
        })
    }
}

/// Parse Yahoo-style CSV from any reader. Rows are sorted by date and
/// duplicate dates dropped. Empty or `null` prices become NaN so the engine
/// treats the row as a void bar.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let cols = Columns::resolve(rdr.headers()?)?;

    let mut bars = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record?;
        // header is row 1
        let row = i + 2;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let timestamp = parse_timestamp(field(cols.date)).ok_or_else(|| LoadError::BadDate {
            row,
            value: field(cols.date).to_string(),
        })?;
        let price = |idx: usize, column: &'static str| parse_number(field(idx), row, column);

        let close = price(cols.close, "close")?;
        let adj_close = match cols.adj_close {
            Some(idx) => price(idx, "adj_close")?,
            None => close,
        };
        let volume = price(cols.volume, "volume")?;
        let dividend = match cols.dividends {
            Some(idx) => Some(price(idx, "dividends")?).filter(|d| !d.is_nan() && *d != 0.0),
            None => None,
        };
        bars.push(Bar {
            timestamp,
            open: price(cols.open, "open")?,
            high: price(cols.high, "high")?,
            low: price(cols.low, "low")?,
            close,
            volume: if volume.is_nan() { 0.0 } else { volume },
            adj_close: if adj_close.is_nan() { close } else { adj_close },
            dividend,
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    let before = bars.len();
    bars.dedup_by_key(|b| b.timestamp);
    if bars.len() < before {
        warn!(dropped = before - bars.len(), "duplicate dates in feed");
    }
    Ok(bars)
}

fn parse_number(raw: &str, row: usize, column: &'static str) -> Result<f64, LoadError> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") || raw.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    raw.parse().map_err(|_| LoadError::BadNumber {
        row,
        column,
        value: raw.to_string(),
    })
}

/// `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(midnight(d));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

fn midnight(d: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&d.and_time(chrono::NaiveTime::default()))
}

fn filter_range(bars: Vec<Bar>, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Vec<Bar> {
    bars.into_iter()
        .filter(|b| {
            let d = b.timestamp.date_naive();
            start.map_or(true, |s| d >= s) && end.map_or(true, |e| d <= e)
        })
        .collect()
}

// ─── Fingerprint ────────────────────────────────────────────────────

/// Compute a deterministic BLAKE3 hash over all bar data.
pub fn compute_dataset_hash(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.timestamp.timestamp().to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
        hasher.update(&bar.adj_close.to_le_bytes());
        hasher.update(&bar.dividend.unwrap_or(0.0).to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

// ─── Synthetic feed ─────────────────────────────────────────────────

/// Bars between synthetic dividend payments (roughly quarterly).
const SYNTHETIC_DIVIDEND_EVERY: usize = 63;

/// Generate `count` weekday bars of a random walk starting at 100.0.
///
/// Seeded from the symbol name so the same symbol always yields the same
/// series. A small dividend is paid about once a quarter.
pub fn generate_synthetic_bars(symbol: &str, start: NaiveDate, count: usize) -> Vec<Bar> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut bars = Vec::with_capacity(count);
    let mut price = 100.0_f64;
    let mut current = start;

    while bars.len() < count {
        let weekday = current.weekday();
        if weekday == chrono::Weekday::Sat || weekday == chrono::Weekday::Sun {
            current += chrono::Duration::days(1);
            continue;
        }

        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price * (1.0 + rng.gen_range(-0.005..0.005));
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64) as f64;

        let mut bar = Bar::new(midnight(current), open, high, low, close, volume);
        if (bars.len() + 1) % SYNTHETIC_DIVIDEND_EVERY == 0 {
            bar = bar.with_dividend((close * 0.004 * 100.0).round() / 100.0);
        }
        bars.push(bar);

        price = close;
        current += chrono::Duration::days(1);
    }

    bars
}
