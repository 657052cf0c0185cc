use crate::error::{ForecastBuilderError, Result};
use crate::forecast::ForecastResult;
use crate::table::RawTable;
use chrono::NaiveDate;
use log::warn;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Run metadata carried at the top of every exported forecast, in the fixed
/// order the text format writes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub forecast_title: String,
    pub platform: String,
    pub budget: f64,
    pub currency: String,
    pub forecast_period_days: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub generated_on: String,
}

/// A persisted, self-describing forecast export: metadata plus one dated
/// point-estimate column per metric. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastArtifact {
    pub metadata: ArtifactMetadata,
    pub results: Vec<(String, Vec<(NaiveDate, f64)>)>,
}

impl ForecastArtifact {
    /// Assemble an artifact from forecast results. The date range spans the
    /// first metric's horizon; results keep only point estimates, which is
    /// all the export format carries.
    pub fn from_results(
        forecast_title: &str,
        platform: &str,
        budget: f64,
        currency: &str,
        generated_on: &str,
        results: &[ForecastResult],
    ) -> Result<Self> {
        let first = results
            .iter()
            .find(|r| !r.horizon_points.is_empty())
            .ok_or_else(|| {
                ForecastBuilderError::ArtifactFormat("no forecast points to export".to_string())
            })?;
        let start_date = first.horizon_points.first().expect("non-empty").date;
        let end_date = first.horizon_points.last().expect("non-empty").date;

        let columns = results
            .iter()
            .map(|r| {
                (
                    r.metric_name.clone(),
                    r.horizon_points
                        .iter()
                        .map(|p| (p.date, p.estimate))
                        .collect(),
                )
            })
            .collect();

        Ok(Self {
            metadata: ArtifactMetadata {
                forecast_title: forecast_title.to_string(),
                platform: platform.to_string(),
                budget,
                currency: currency.to_string(),
                forecast_period_days: (end_date - start_date).num_days(),
                start_date,
                end_date,
                generated_on: generated_on.to_string(),
            },
            results: columns,
        })
    }

    pub fn metric_names(&self) -> Vec<&str> {
        self.results.iter().map(|(name, _)| name.as_str()).collect()
    }
}

/// A forecast-export file read back in: the raw metadata key/value map plus
/// the tabular body. Keys are lowercased; values are untyped strings, since
/// partially written artifacts must still be usable by impact analysis.
#[derive(Debug, Clone)]
pub struct ParsedArtifact {
    pub metadata: BTreeMap<String, String>,
    pub body: RawTable,
}

const METADATA_SIGNATURE_KEYS: &[&str] = &["forecast_title", "platform", "budget", "currency"];

/// Minimum signature keys present before a file counts as a forecast export
/// rather than a raw platform export.
const MIN_SIGNATURE_KEYS: usize = 2;

fn is_body_header(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("date") && lower.contains("metric_type")
}

/// Split a metadata candidate line into (key, value). The value keeps any
/// embedded commas; a quoted value (the writer quotes commas) is unwrapped.
/// Raw exports also split this way, but their keys never hit the signature
/// set, so they are still routed to generic parsing.
fn split_metadata_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(',')?;
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    Some((key.trim(), value))
}

/// Serialize an artifact to the export text format: the fixed metadata rows
/// followed by a `date,metric_type,<metrics...>` table with one row per
/// forecasted date.
pub fn serialize_artifact(artifact: &ForecastArtifact) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    let meta = &artifact.metadata;
    let budget = meta.budget.to_string();
    let period = format!("{} days", meta.forecast_period_days);
    let start = meta.start_date.format("%Y-%m-%d").to_string();
    let end = meta.end_date.format("%Y-%m-%d").to_string();

    writer.write_record(["forecast_title", meta.forecast_title.as_str()])?;
    writer.write_record(["platform", meta.platform.as_str()])?;
    writer.write_record(["budget", budget.as_str()])?;
    writer.write_record(["currency", meta.currency.as_str()])?;
    writer.write_record(["forecast_period", period.as_str()])?;
    writer.write_record(["start_date", start.as_str()])?;
    writer.write_record(["end_date", end.as_str()])?;
    writer.write_record(["generated_on", meta.generated_on.as_str()])?;

    if let Some((_, first_points)) = artifact.results.first() {
        let mut header = vec!["date".to_string(), "metric_type".to_string()];
        header.extend(artifact.results.iter().map(|(name, _)| name.clone()));
        writer.write_record(&header)?;

        for (row_idx, (date, _)) in first_points.iter().enumerate() {
            let mut row = vec![date.format("%Y-%m-%d").to_string(), "forecast".to_string()];
            for (name, points) in &artifact.results {
                match points.get(row_idx) {
                    Some((_, value)) => row.push(value.to_string()),
                    None => {
                        warn!("Metric {} is short at row {}; writing empty cell", name, row_idx);
                        row.push(String::new());
                    }
                }
            }
            writer.write_record(&row)?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ForecastBuilderError::ArtifactFormat(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ForecastBuilderError::ArtifactFormat(e.to_string()))
}

/// Parse export text back into metadata + body. Returns `None` when the
/// text does not look like a forecast export (the caller then treats it as
/// a raw platform file).
pub fn parse_artifact(text: &str) -> Option<ParsedArtifact> {
    let lines: Vec<&str> = text.lines().collect();

    let mut metadata = BTreeMap::new();
    let mut body_start: Option<usize> = None;
    let mut metadata_rows = 0usize;

    for (idx, line) in lines.iter().enumerate() {
        if is_body_header(line) {
            body_start = Some(idx);
            break;
        }
        match split_metadata_line(line) {
            Some((key, value)) => {
                if !value.is_empty() {
                    metadata.insert(key.to_lowercase(), value.to_string());
                }
                metadata_rows += 1;
            }
            None => break,
        }
    }

    let signature_hits = METADATA_SIGNATURE_KEYS
        .iter()
        .filter(|key| metadata.contains_key(**key))
        .count();
    if signature_hits < MIN_SIGNATURE_KEYS {
        return None;
    }

    let body_text = match body_start {
        Some(start) => lines[start..].join("\n"),
        None => lines[metadata_rows..].join("\n"),
    };
    let body = match RawTable::from_reader(body_text.as_bytes(), 0, None) {
        Ok(table) => table,
        Err(e) => {
            warn!("Failed to read data portion of forecast export: {}", e);
            RawTable::default()
        }
    };

    Some(ParsedArtifact { metadata, body })
}

/// Read a file and attempt to parse it as a forecast export.
pub fn read_artifact_file(path: &Path) -> Result<Option<ParsedArtifact>> {
    let mut text = String::new();
    File::open(path)?.read_to_string(&mut text)?;
    Ok(parse_artifact(&text))
}

/// Directory-backed create/read-by-id store of forecast artifacts as JSON
/// blobs. Ids are random, so entries are single-writer and never
/// overwritten; cleanup belongs to the owning application.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }

    pub fn create(&self, artifact: &ForecastArtifact) -> Result<String> {
        std::fs::create_dir_all(&self.root)?;
        let id = generate_artifact_id();
        let file = File::create(self.blob_path(&id))?;
        serde_json::to_writer(file, artifact)?;
        Ok(id)
    }

    pub fn read(&self, id: &str) -> Result<ForecastArtifact> {
        let path = self.blob_path(id);
        if !path.exists() {
            return Err(ForecastBuilderError::ArtifactNotFound(id.to_string()));
        }
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}

fn generate_artifact_id() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| format!("{:x}", rng.gen_range(0..16)))
        .collect()
}
