//! # Campaign Forecast Builder
//!
//! A library for turning advertising-platform CSV exports (Google Ads,
//! Meta, generic) into budget-aware forecasts and interactive impact
//! simulations.
//!
//! ## Core Concepts
//!
//! - **Format detection**: vendor exports hide their real header behind
//!   0-3 banner rows and disagree on date conventions; detection and
//!   normalization recover a usable schema without user configuration.
//! - **Budget regressor**: daily spend can be added to the per-metric
//!   time-series model, yielding an elasticity estimate of how budget
//!   changes move the metric.
//! - **Forecast artifact**: a self-describing CSV export (metadata block +
//!   tabular body) that can be downloaded and later re-ingested as an
//!   impact-analysis input.
//! - **Impact simulation**: a fast heuristic what-if model over one or more
//!   ingested files, recomputing every metric from its immutable baseline
//!   on each call.
//!
//! ## Example
//!
//! ```rust,ignore
//! use campaign_forecast_builder::*;
//!
//! let analysis = ForecastPipeline::analyze(Path::new("export.csv"))?;
//! let config = ForecastConfig {
//!     metrics: vec!["Clicks".to_string()],
//!     horizon: 14,
//!     use_budget_regressor: true,
//!     projected_daily_budget: Some(120.0),
//! };
//! let results = ForecastPipeline::forecast(&analysis, &config);
//!
//! let store = ArtifactStore::new("forecast_store");
//! let id = ForecastPipeline::export(&analysis, &results, "Spring push", &store)?;
//! ```

pub mod budget;
pub mod codec;
pub mod columns;
pub mod dates;
pub mod detect;
pub mod error;
pub mod forecast;
pub mod impact;
pub mod normalize;
pub mod table;

pub use budget::{extract_budget, BudgetSummary};
pub use codec::{
    parse_artifact, read_artifact_file, serialize_artifact, ArtifactMetadata, ArtifactStore,
    ForecastArtifact, ParsedArtifact,
};
pub use columns::{classify_metric, MetricClass};
pub use dates::{resolve_date_column, DateFormat};
pub use detect::{detect_format, FormatDescriptor, SourcePlatform};
pub use error::{ForecastBuilderError, Result};
pub use forecast::{
    forecast_metric, forecast_metrics, Direction, Elasticity, ForecastRequest, ForecastResult,
    HorizonPoint, MIN_OBSERVATIONS,
};
pub use impact::{
    build_impact_analysis, format_metric_value, ImpactAnalysis, ImpactEntry, ImpactFile,
    ImpactMetric,
};
pub use normalize::{normalize, prepare_for_forecast, CleanTable, MetricSeries};
pub use table::{Cell, Column, RawTable};

use chrono::Local;
use log::{info, warn};
use std::path::Path;

/// Everything learned from one uploaded export: the normalized table plus
/// the spend baseline derived from it.
#[derive(Debug, Clone)]
pub struct UploadAnalysis {
    pub clean: CleanTable,
    pub budget: BudgetSummary,
}

/// Caller-supplied forecast parameters for one run.
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    /// Metric columns to forecast; the date column is skipped if listed.
    pub metrics: Vec<String>,
    /// Number of future periods to project.
    pub horizon: usize,
    /// Fit the spend column as a regressor and estimate elasticity.
    pub use_budget_regressor: bool,
    /// Daily budget assumed for the future periods; defaults to the
    /// historical average when absent.
    pub projected_daily_budget: Option<f64>,
}

/// Renders a historical series plus its forecast into some artifact and
/// returns an opaque reference to it. Rendering lives outside this crate;
/// the pipeline only hands data across this seam.
pub trait VisualizationSink {
    fn render(
        &self,
        historical: &MetricSeries,
        forecast: &ForecastResult,
        regressor: Option<&MetricSeries>,
    ) -> Result<String>;
}

/// The end-to-end orchestration: detect, normalize, extract the budget
/// baseline, fit and project, export.
pub struct ForecastPipeline;

impl ForecastPipeline {
    /// Detect the export's format, normalize its schema, and derive the
    /// spend baseline. Fails only on the user-actionable terminal
    /// conditions: no date column, no metric columns, unreadable file.
    pub fn analyze(path: &Path) -> Result<UploadAnalysis> {
        let descriptor = detect_format(path);
        let table = RawTable::from_csv_path(path, descriptor.header_skip_count)?;
        let clean = normalize(table, descriptor)?;
        let budget = extract_budget(&clean);
        info!(
            "Analyzed export: date column {}, {} metric columns",
            clean.date_column,
            clean.metric_columns.len()
        );
        Ok(UploadAnalysis { clean, budget })
    }

    /// Forecast the selected metrics. Metrics with insufficient data or
    /// fitting failures are omitted, never fatal; the returned batch may be
    /// smaller than the request.
    pub fn forecast(analysis: &UploadAnalysis, config: &ForecastConfig) -> Vec<ForecastResult> {
        let clean = &analysis.clean;

        let series: Vec<MetricSeries> = config
            .metrics
            .iter()
            .filter(|name| **name != clean.date_column)
            .map(|name| MetricSeries::from_table(&clean.table, &clean.dates, name))
            .collect();

        let budget_series = if config.use_budget_regressor {
            match &analysis.budget.source_column {
                Some(column) => {
                    if !analysis.budget.is_valid_cost_signal {
                        warn!(
                            "Budget regressor {} is a proxy, not true spend; \
                             elasticity should be read with caution",
                            column
                        );
                    }
                    Some(MetricSeries::from_table(&clean.table, &clean.dates, column))
                }
                None => {
                    warn!("Budget regressor requested but no spend column was found");
                    None
                }
            }
        } else {
            None
        };

        forecast_metrics(
            &series,
            budget_series.as_ref(),
            config.horizon,
            config.projected_daily_budget,
        )
    }

    /// Persist a finished run as a forecast artifact and return its id.
    pub fn export(
        analysis: &UploadAnalysis,
        results: &[ForecastResult],
        title: &str,
        store: &ArtifactStore,
    ) -> Result<String> {
        let generated_on = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let artifact = ForecastArtifact::from_results(
            title,
            analysis.clean.descriptor.source_platform.display_name(),
            analysis.budget.daily_average,
            &analysis.budget.currency,
            &generated_on,
            results,
        )?;
        store.create(&artifact)
    }

    /// Push every forecast through the visualization seam. A sink failure
    /// for one metric is logged and skipped, matching the per-metric
    /// isolation of the forecast step itself.
    pub fn render(
        analysis: &UploadAnalysis,
        results: &[ForecastResult],
        sink: &dyn VisualizationSink,
    ) -> Vec<(String, String)> {
        let clean = &analysis.clean;
        let regressor = analysis
            .budget
            .source_column
            .as_ref()
            .map(|column| MetricSeries::from_table(&clean.table, &clean.dates, column));

        let mut references = Vec::new();
        for result in results {
            let historical =
                MetricSeries::from_table(&clean.table, &clean.dates, &result.metric_name);
            match sink.render(&historical, result, regressor.as_ref()) {
                Ok(reference) => references.push((result.metric_name.clone(), reference)),
                Err(e) => warn!("Rendering failed for {}: {}", result.metric_name, e),
            }
        }
        references
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_export(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn google_export(days: usize) -> String {
        let mut out = String::from("Campaign,Day,Clicks,Cost\n");
        for i in 0..days {
            let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                + chrono::Duration::days(i as i64);
            out.push_str(&format!(
                "Brand,{},{},{}\n",
                date.format("%Y-%m-%d"),
                100 + i * 3,
                100.0
            ));
        }
        out
    }

    #[test]
    fn test_analyze_wires_detection_and_budget() {
        let file = write_export(&google_export(10));
        let analysis = ForecastPipeline::analyze(file.path()).unwrap();
        assert_eq!(
            analysis.clean.descriptor.source_platform,
            SourcePlatform::GoogleAds
        );
        assert_eq!(analysis.clean.date_column, "Day");
        assert_eq!(analysis.budget.source_column.as_deref(), Some("Cost"));
        assert!((analysis.budget.daily_average - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_forecast_skips_date_column_in_selection() {
        let file = write_export(&google_export(20));
        let analysis = ForecastPipeline::analyze(file.path()).unwrap();
        let config = ForecastConfig {
            metrics: vec!["Day".to_string(), "Clicks".to_string()],
            horizon: 5,
            use_budget_regressor: false,
            projected_daily_budget: None,
        };
        let results = ForecastPipeline::forecast(&analysis, &config);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metric_name, "Clicks");
    }

    struct RecordingSink;

    impl VisualizationSink for RecordingSink {
        fn render(
            &self,
            historical: &MetricSeries,
            forecast: &ForecastResult,
            _regressor: Option<&MetricSeries>,
        ) -> Result<String> {
            Ok(format!(
                "plot://{}/{}x{}",
                forecast.metric_name,
                historical.len(),
                forecast.horizon_points.len()
            ))
        }
    }

    #[test]
    fn test_render_passes_series_through_seam() {
        let file = write_export(&google_export(20));
        let analysis = ForecastPipeline::analyze(file.path()).unwrap();
        let config = ForecastConfig {
            metrics: vec!["Clicks".to_string()],
            horizon: 7,
            use_budget_regressor: true,
            projected_daily_budget: None,
        };
        let results = ForecastPipeline::forecast(&analysis, &config);
        let references = ForecastPipeline::render(&analysis, &results, &RecordingSink);
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].0, "Clicks");
        assert_eq!(references[0].1, "plot://Clicks/20x7");
    }
}
