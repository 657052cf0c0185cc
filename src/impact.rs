use crate::codec::{read_artifact_file, ParsedArtifact};
use crate::columns::{
    classify_metric, is_artifact_structural_column, is_raw_identifier_column, MetricClass,
};
use crate::detect::{detect_format, SourcePlatform};
use crate::error::Result;
use crate::table::RawTable;
use chrono::{Duration, Local, NaiveDate};
use log::{error, info, warn};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Default horizon assumed when a file carries no usable date range.
const DEFAULT_RANGE_DAYS: i64 = 90;

/// Share of cells that must parse as numbers before a column counts as a
/// metric.
const NUMERIC_MAJORITY: f64 = 0.5;

/// Raw totals below this are noise, not metrics.
const MIN_TOTAL: f64 = 1e-5;

/// Budget cuts at or past this point get the randomized-variance treatment
/// for efficiency ratios.
const EXTREME_CUT_PCT: f64 = -90.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactMetric {
    pub name: String,
    /// Baseline value, fixed at ingestion.
    pub current: f64,
    /// Recomputed from `current` on every simulation call.
    pub simulated: f64,
    pub impact_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetBaseline {
    /// Budget at ingestion; simulations always scale from this.
    pub original: Option<f64>,
    /// Budget after the latest simulated change.
    pub current: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: i64,
}

impl DateRange {
    fn from_last_date(last: NaiveDate) -> Self {
        Self {
            start: last,
            end: last + Duration::days(DEFAULT_RANGE_DAYS),
            days: DEFAULT_RANGE_DAYS,
        }
    }

    fn default_from_today() -> Self {
        Self::from_last_date(Local::now().date_naive())
    }
}

/// One ingested file in the impact view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactEntry {
    pub id: String,
    pub title: String,
    pub platform: String,
    pub campaign: String,
    pub currency: String,
    pub budget: BudgetBaseline,
    pub metrics: Vec<ImpactMetric>,
    pub date_range: DateRange,
}

/// The unified multi-campaign view. Simulation never mutates the baseline:
/// it returns a recomputed copy so repeated what-ifs always start from the
/// same point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub entries: Vec<ImpactEntry>,
    pub date_range: Option<DateRange>,
}

/// A file handed to impact analysis: the user-visible name (used for
/// campaign/platform inference) and where it landed on disk.
#[derive(Debug, Clone)]
pub struct ImpactFile {
    pub original_name: String,
    pub path: PathBuf,
}

impl ImpactAnalysis {
    /// Sum of entry budgets, floored per entry the way the dashboard
    /// displays them.
    pub fn total_budget(&self) -> f64 {
        self.entries
            .iter()
            .filter_map(|e| e.budget.original)
            .map(f64::floor)
            .sum()
    }

    /// Apply percentage budget changes keyed by entry id. Entries without a
    /// change are recomputed at 0%, which leaves them untouched, so the
    /// call is idempotent and stateless across invocations.
    pub fn simulate(&self, changes: &HashMap<String, f64>) -> ImpactAnalysis {
        let mut out = self.clone();
        let mut rng = rand::thread_rng();

        for entry in &mut out.entries {
            let pct = changes.get(&entry.id).copied().unwrap_or(0.0).max(-100.0);
            entry.budget.current = entry.budget.original.map(|b| b * (1.0 + pct / 100.0));

            for metric in &mut entry.metrics {
                let factor = simulation_factor(&metric.name, pct, &mut rng);
                metric.simulated = metric.current * factor;
                metric.impact_percent = (factor - 1.0) * 100.0;
            }
        }
        out
    }
}

/// Metric-class elasticity rules for interactive what-if simulation. This
/// is a fixed heuristic table, not a fitted model; the branching and
/// coefficients are part of the product definition.
fn simulation_factor<R: Rng>(metric_name: &str, pct: f64, rng: &mut R) -> f64 {
    match classify_metric(metric_name) {
        MetricClass::ReturnOnSpend => {
            if pct > 0.0 {
                // Extra budget buys the cheaper inventory last: efficiency
                // dampens as spend rises.
                1.0 - 0.05 * pct / 100.0
            } else if pct <= EXTREME_CUT_PCT {
                // Near-total cuts behave unpredictably; keep the modest
                // efficiency gain but add variance, floored at zero.
                let base = 1.0 + 0.02 * (-pct) / 100.0;
                let variance = Uniform::new(-0.15, 0.25);
                (base + variance.sample(rng)).max(0.0)
            } else {
                1.0 + 0.02 * (-pct) / 100.0
            }
        }
        MetricClass::CostPerUnit => 1.0 + 0.05 * pct / 100.0,
        MetricClass::Rate => 1.0 - 0.025 * pct / 100.0,
        MetricClass::Count => {
            if pct == 0.0 {
                1.0
            } else {
                let elasticity = if pct <= -90.0 {
                    0.95
                } else if pct <= -75.0 {
                    0.85
                } else if pct < 0.0 {
                    0.7
                } else if pct <= 50.0 {
                    0.9
                } else {
                    0.8
                };
                (1.0 + pct / 100.0).powf(elasticity)
            }
        }
    }
}

/// Display/export precision per metric family: efficiency ratios 1dp,
/// rates 2dp, counts to the nearest whole unit.
pub fn format_metric_value(metric_name: &str, value: f64) -> f64 {
    match classify_metric(metric_name) {
        MetricClass::ReturnOnSpend => (value * 10.0).round() / 10.0,
        MetricClass::Rate => (value * 100.0).round() / 100.0,
        _ => value.round(),
    }
}

/// Build the unified impact view from a batch of files. Each file is either
/// a previously exported forecast (self-describing metadata block) or a raw
/// platform export; one file's failure never aborts the batch.
pub fn build_impact_analysis(files: &[ImpactFile]) -> ImpactAnalysis {
    let mut entries = Vec::new();

    for (index, file) in files.iter().enumerate() {
        match ingest_file(index, file) {
            Ok(entry) => entries.push(entry),
            Err(e) => error!("Error processing file {}: {}", file.original_name, e),
        }
    }

    info!("Processed {} impact entries", entries.len());
    let date_range = entries.first().map(|e| e.date_range.clone());
    ImpactAnalysis {
        entries,
        date_range,
    }
}

fn ingest_file(index: usize, file: &ImpactFile) -> Result<ImpactEntry> {
    info!("Processing file: {}", file.original_name);
    match read_artifact_file(&file.path)? {
        Some(parsed) => {
            info!("Parsed forecast export: {}", file.original_name);
            Ok(entry_from_artifact(index, file, parsed))
        }
        None => {
            info!("Not a forecast export, trying standard parsing");
            entry_from_raw_export(index, file)
        }
    }
}

fn entry_id(index: usize) -> String {
    format!("forecast-{}", index + 1)
}

fn entry_from_artifact(index: usize, file: &ImpactFile, parsed: ParsedArtifact) -> ImpactEntry {
    let id = entry_id(index);
    let metadata = &parsed.metadata;

    let title = metadata
        .get("forecast_title")
        .cloned()
        .unwrap_or_else(|| id.clone());
    let platform = metadata
        .get("platform")
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string());
    let currency = metadata
        .get("currency")
        .cloned()
        .unwrap_or_else(|| "£".to_string());
    let budget = metadata.get("budget").and_then(|v| v.parse::<f64>().ok());
    let campaign = campaign_from_metadata(metadata.get("forecast_title"), &platform, &file.original_name);

    let parse_date = |key: &str| {
        metadata
            .get(key)
            .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
    };
    let date_range = match (parse_date("start_date"), parse_date("end_date")) {
        (Some(start), Some(end)) => DateRange {
            start,
            end,
            days: (end - start).num_days(),
        },
        _ => DateRange::default_from_today(),
    };

    let metrics = extract_metrics(&parsed.body, is_artifact_structural_column);

    ImpactEntry {
        id,
        title,
        platform,
        campaign,
        currency,
        budget: BudgetBaseline {
            original: budget,
            current: budget,
        },
        metrics,
        date_range,
    }
}

fn entry_from_raw_export(index: usize, file: &ImpactFile) -> Result<ImpactEntry> {
    let descriptor = detect_format(&file.path);
    let table = RawTable::from_csv_path(&file.path, descriptor.header_skip_count)?;

    let platform = determine_platform(&table, &file.original_name, descriptor.source_platform);
    let campaign = extract_campaign_name(&table, &file.original_name);
    let metrics = extract_metrics(&table, is_raw_identifier_column);

    // First budget-semantic column, summed, becomes the entry budget.
    let budget = table
        .columns()
        .iter()
        .find(|c| {
            let lower = c.name.to_lowercase();
            ["budget", "cost", "spend", "amount"]
                .iter()
                .any(|term| lower.contains(term))
        })
        .map(|c| c.cells.iter().filter_map(|cell| cell.coerce_number()).sum());

    let date_range = descriptor
        .candidate_date_columns
        .first()
        .and_then(|name| table.column(name))
        .and_then(|column| {
            crate::dates::parse_with_format(column, crate::dates::DateFormat::Auto)
                .into_iter()
                .flatten()
                .max()
        })
        .map(DateRange::from_last_date)
        .unwrap_or_else(DateRange::default_from_today);

    let id = entry_id(index);
    Ok(ImpactEntry {
        id: id.clone(),
        title: id,
        platform,
        campaign,
        currency: "£".to_string(),
        budget: BudgetBaseline {
            original: budget,
            current: budget,
        },
        metrics,
        date_range,
    })
}

/// Extract every metric-like column: over half its cells must parse as
/// numbers. Count metrics aggregate by sum, rate-like metrics by mean, and
/// the well-known derived ratios are recomputed from their summed
/// components instead of trusting a per-row ratio column — summing a ratio
/// is not meaningful.
fn extract_metrics(table: &RawTable, structural: fn(&str) -> bool) -> Vec<ImpactMetric> {
    let row_count = table.row_count();
    if row_count == 0 {
        return Vec::new();
    }

    struct Candidate {
        name: String,
        total: f64,
        count: usize,
    }

    let candidates: Vec<Candidate> = table
        .columns()
        .iter()
        .filter(|c| !structural(&c.name))
        .filter_map(|c| {
            let values: Vec<f64> = c.cells.iter().filter_map(|cell| cell.coerce_number()).collect();
            if values.len() as f64 > row_count as f64 * NUMERIC_MAJORITY {
                Some(Candidate {
                    name: c.name.clone(),
                    total: values.iter().sum(),
                    count: values.len(),
                })
            } else {
                None
            }
        })
        .collect();

    let total_of = |predicate: &dyn Fn(&str) -> bool| {
        candidates
            .iter()
            .find(|c| predicate(&c.name.to_lowercase()))
            .map(|c| c.total)
    };

    let mut metrics = Vec::new();
    for candidate in &candidates {
        if candidate.total.is_nan() || candidate.total.abs() < MIN_TOTAL {
            continue;
        }

        let lower = candidate.name.to_lowercase();
        let mut value = match classify_metric(&candidate.name) {
            MetricClass::Count => candidate.total,
            _ => candidate.total / candidate.count as f64,
        };

        if lower.contains("ctr") || lower.contains("click through rate") {
            let clicks = total_of(&|n| n.contains("click"));
            let impressions = total_of(&|n| n.contains("impr") || n.contains("impression"));
            if let (Some(clicks), Some(impressions)) = (clicks, impressions) {
                if impressions > 0.0 {
                    value = clicks / impressions * 100.0;
                }
            }
        } else if lower.contains("conversion rate") {
            let conversions = total_of(&|n| n.contains("conv") && !n.contains("rate"));
            let clicks = total_of(&|n| n.contains("click"));
            if let (Some(conversions), Some(clicks)) = (conversions, clicks) {
                if clicks > 0.0 {
                    value = conversions / clicks * 100.0;
                }
            }
        } else if lower.contains("roas") {
            let revenue = total_of(&|n| n.contains("value") || n.contains("revenue"));
            let cost = total_of(&|n| n.contains("cost") || n.contains("spend"));
            if let (Some(revenue), Some(cost)) = (revenue, cost) {
                if cost > 0.0 {
                    value = revenue / cost;
                }
            }
        } else if lower.contains("roi") {
            let revenue = total_of(&|n| n.contains("revenue") || n.contains("value"));
            let cost = total_of(&|n| n.contains("cost") || n.contains("spend"));
            if let (Some(revenue), Some(cost)) = (revenue, cost) {
                if cost > 0.0 {
                    value = (revenue - cost) / cost * 100.0;
                }
            }
        }

        let formatted = format_metric_value(&candidate.name, value);
        metrics.push(ImpactMetric {
            name: candidate.name.clone(),
            current: formatted,
            simulated: formatted,
            impact_percent: 0.0,
        });
    }

    if metrics.is_empty() {
        warn!("No metrics could be extracted from table");
    }
    metrics
}

fn determine_platform(table: &RawTable, filename: &str, detected: SourcePlatform) -> String {
    match detected {
        SourcePlatform::GoogleAds => return "Google".to_string(),
        SourcePlatform::Meta => return "Meta".to_string(),
        SourcePlatform::Unknown => {}
    }

    let names_lower: Vec<String> = table
        .column_names()
        .iter()
        .map(|n| n.to_lowercase())
        .collect();
    if names_lower.iter().any(|n| n.contains("google")) {
        return "Google".to_string();
    }
    if names_lower
        .iter()
        .any(|n| n.contains("meta") || n.contains("facebook"))
    {
        return "Meta".to_string();
    }
    if names_lower.iter().any(|n| n.contains("amazon")) {
        return "Amazon".to_string();
    }

    let file_lower = filename.to_lowercase();
    if file_lower.contains("google") || file_lower.contains("ads") {
        "Google".to_string()
    } else if file_lower.contains("meta") || file_lower.contains("facebook") || file_lower.contains("fb") {
        "Meta".to_string()
    } else if file_lower.contains("amazon") {
        "Amazon".to_string()
    } else {
        "Unknown".to_string()
    }
}

fn most_frequent_text(column: &crate::table::Column) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for cell in &column.cells {
        if let Some(text) = cell.as_text() {
            match counts.iter_mut().find(|(value, _)| *value == text) {
                Some((_, count)) => *count += 1,
                None => counts.push((text, 1)),
            }
        }
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(value, _)| value.to_string())
}

fn strip_filename(filename: &str) -> String {
    let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(filename);
    let mut name = stem.to_string();
    for prefix in ["report_", "export_", "data_", "campaign_"] {
        if name.to_lowercase().starts_with(prefix) {
            name = name[prefix.len()..].to_string();
        }
    }
    name
}

fn is_generic_name(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "report" | "export" | "data" | "campaigns"
    )
}

fn extract_campaign_name(table: &RawTable, filename: &str) -> String {
    if let Some(column) = table.column("Campaign") {
        if let Some(campaign) = most_frequent_text(column) {
            return campaign;
        }
    }

    if let Some(column) = table
        .columns()
        .iter()
        .find(|c| c.name.to_lowercase().contains("campaign"))
    {
        if let Some(campaign) = most_frequent_text(column) {
            return campaign;
        }
    }

    let name = strip_filename(filename);
    if is_generic_name(&name) {
        "All Campaigns".to_string()
    } else {
        name
    }
}

fn campaign_from_metadata(title: Option<&String>, platform: &str, filename: &str) -> String {
    if let Some(title) = title {
        if title.to_lowercase().contains("campaign") {
            return title.clone();
        }
    }

    let name = strip_filename(filename);
    if !is_generic_name(&name) && !name.is_empty() {
        return name;
    }

    match platform.to_lowercase().as_str() {
        "meta" | "facebook" => "Meta Awareness".to_string(),
        "google" | "google ads" => "Google Performance".to_string(),
        "amazon" => "Amazon Sponsored".to_string(),
        _ => "All Campaigns".to_string(),
    }
}
