use crate::columns::{has_date_name_hint, is_marketing_metric};
use crate::dates::{parse_with_format, resolve_date_column, DateFormat};
use crate::detect::FormatDescriptor;
use crate::error::{ForecastBuilderError, Result};
use crate::table::{Cell, RawTable};
use chrono::NaiveDate;
use log::{info, warn};
use std::path::Path;

/// A table after schema normalization: numeric columns coerced, exactly one
/// date column resolved, and the forecastable metric columns identified.
#[derive(Debug, Clone)]
pub struct CleanTable {
    pub table: RawTable,
    pub date_column: String,
    pub dates: Vec<Option<NaiveDate>>,
    pub metric_columns: Vec<String>,
    pub date_format: DateFormat,
    pub descriptor: FormatDescriptor,
}

/// One metric projected against the resolved date column. Dates are unique
/// and ascending; rows with a null date or null value are dropped.
#[derive(Debug, Clone)]
pub struct MetricSeries {
    pub name: String,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl MetricSeries {
    pub fn from_table(table: &RawTable, dates: &[Option<NaiveDate>], name: &str) -> Self {
        let mut points: Vec<(NaiveDate, f64)> = Vec::new();
        if let Some(column) = table.column(name) {
            for (cell, date) in column.cells.iter().zip(dates.iter()) {
                if let (Some(value), Some(date)) = (cell.coerce_number(), date) {
                    points.push((*date, value));
                }
            }
        }
        points.sort_by_key(|(date, _)| *date);
        points.dedup_by_key(|(date, _)| *date);

        let (dates, values) = points.into_iter().unzip();
        Self {
            name: name.to_string(),
            dates,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }
}

/// Ordered, de-duplicated date-candidate list: the descriptor's suggestions
/// first, then name hints, then string columns whose sampled values contain
/// a date-ish separator.
fn build_date_candidates(table: &RawTable, descriptor: &FormatDescriptor) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();

    for name in &descriptor.candidate_date_columns {
        if table.has_column(name) && !candidates.contains(name) {
            candidates.push(name.clone());
        }
    }

    for column in table.columns() {
        if !candidates.contains(&column.name) && has_date_name_hint(&column.name) {
            candidates.push(column.name.clone());
        }
    }

    for column in table.columns() {
        if candidates.contains(&column.name) || !column.has_text() {
            continue;
        }
        let looks_dated = column
            .sample_text_values(3)
            .iter()
            .any(|v| v.contains('/') || v.contains('-') || v.contains('.'));
        if looks_dated {
            candidates.push(column.name.clone());
        }
    }

    candidates
}

fn adopt_date_column(
    table: &RawTable,
    candidates: &[String],
) -> Option<(String, Vec<Option<NaiveDate>>, DateFormat)> {
    for name in candidates {
        let column = match table.column(name) {
            Some(column) => column,
            None => continue,
        };
        let (parsed, format) = resolve_date_column(column);
        if parsed.iter().any(|d| d.is_some()) {
            info!(
                "Using first valid date column: {} with format {}",
                name,
                format.label()
            );
            return Some((name.clone(), parsed, format));
        }
    }
    None
}

/// Strip thousands separators and coerce every text column (except the date
/// column) to numbers. Failures become empty cells, never errors.
fn coerce_numeric_columns(table: &mut RawTable, date_column: &str) {
    let names: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| c.name != date_column && c.has_text())
        .map(|c| c.name.clone())
        .collect();

    for name in &names {
        if let Some(column) = table.column_mut(name) {
            for cell in &mut column.cells {
                *cell = match cell.coerce_number() {
                    Some(value) => Cell::Number(value),
                    None => Cell::Empty,
                };
            }
            info!("Converted column {} to numeric", name);
        }
    }
}

fn select_metric_columns(table: &RawTable, date_column: &str) -> Vec<String> {
    let numeric: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| c.name != date_column && c.is_numeric())
        .map(|c| c.name.clone())
        .collect();

    let filtered: Vec<String> = numeric
        .iter()
        .filter(|name| is_marketing_metric(name))
        .cloned()
        .collect();

    if filtered.is_empty() {
        warn!("No standard marketing metrics found, using all numeric columns");
        numeric
    } else {
        filtered
    }
}

/// Normalize a loaded export into a [`CleanTable`].
///
/// Terminal conditions: no candidate parses to a single non-null date
/// ([`ForecastBuilderError::NoDateColumn`]) or no numeric column survives
/// ([`ForecastBuilderError::NoMetricColumns`]). Both are user-actionable
/// "fix the file" failures, distinct from processing errors.
pub fn normalize(mut table: RawTable, descriptor: FormatDescriptor) -> Result<CleanTable> {
    let candidates = build_date_candidates(&table, &descriptor);

    // Last resort: columns the candidate pass never considered.
    let mut all_names: Vec<String> = candidates.clone();
    for column in table.columns() {
        if !all_names.contains(&column.name) {
            all_names.push(column.name.clone());
        }
    }

    let (date_column, dates, date_format) =
        adopt_date_column(&table, &all_names).ok_or(ForecastBuilderError::NoDateColumn)?;

    coerce_numeric_columns(&mut table, &date_column);

    let metric_columns = select_metric_columns(&table, &date_column);
    if metric_columns.is_empty() {
        return Err(ForecastBuilderError::NoMetricColumns);
    }
    info!("Marketing metric columns: {:?}", metric_columns);

    Ok(CleanTable {
        table,
        date_column,
        dates,
        metric_columns,
        date_format,
        descriptor,
    })
}

/// Reload a file with a previously detected descriptor and date format,
/// coercing only the selected metrics. Used when the forecast step runs
/// after the upload analysis round-trip.
pub fn prepare_for_forecast(
    path: &Path,
    descriptor: &FormatDescriptor,
    date_column: &str,
    date_format: DateFormat,
    selected_metrics: &[String],
) -> Result<(RawTable, Vec<Option<NaiveDate>>)> {
    let mut table = RawTable::from_csv_path(path, descriptor.header_skip_count)?;

    let dates = match table.column(date_column) {
        Some(column) => parse_with_format(column, date_format),
        None => return Err(ForecastBuilderError::NoDateColumn),
    };

    for name in selected_metrics {
        if let Some(column) = table.column_mut(name) {
            if column.has_text() {
                for cell in &mut column.cells {
                    *cell = match cell.coerce_number() {
                        Some(value) => Cell::Number(value),
                        None => Cell::Empty,
                    };
                }
            }
        }
    }

    Ok((table, dates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::SourcePlatform;

    const EXPORT: &str = "\
Day,Campaign,Clicks,Cost,Notes
01/02/2024,Brand,120,\"1,476.69\",fine
01/03/2024,Brand,95,980.10,ok
01/04/2024,Brand,130,1020.00,ok
";

    fn google_descriptor() -> FormatDescriptor {
        FormatDescriptor {
            header_skip_count: 0,
            source_platform: SourcePlatform::GoogleAds,
            candidate_date_columns: vec!["Day".to_string()],
        }
    }

    fn load(csv: &str) -> RawTable {
        RawTable::from_reader(csv.as_bytes(), 0, None).unwrap()
    }

    #[test]
    fn test_single_date_column_selected() {
        let clean = normalize(load(EXPORT), google_descriptor()).unwrap();
        assert_eq!(clean.date_column, "Day");
        assert_eq!(clean.dates.len(), 3);
        assert!(clean.dates.iter().all(|d| d.is_some()));
    }

    #[test]
    fn test_only_first_parsing_candidate_wins() {
        // Two independently parseable date columns; only the first is adopted.
        let csv = "\
Day,End date,Clicks
2024-01-01,2024-01-31,10
2024-01-02,2024-01-31,12
";
        let clean = normalize(load(csv), FormatDescriptor::unknown()).unwrap();
        assert_eq!(clean.date_column, "Day");
        assert!(!clean.metric_columns.contains(&"End date".to_string()));
    }

    #[test]
    fn test_comma_separated_numbers_coerced() {
        let clean = normalize(load(EXPORT), google_descriptor()).unwrap();
        let cost = clean.table.column("Cost").unwrap();
        assert!(cost.is_numeric());
        assert_eq!(cost.cells[0], Cell::Number(1476.69));
    }

    #[test]
    fn test_metric_filter_keeps_marketing_columns() {
        let clean = normalize(load(EXPORT), google_descriptor()).unwrap();
        assert!(clean.metric_columns.contains(&"Clicks".to_string()));
        assert!(clean.metric_columns.contains(&"Cost".to_string()));
        // Text column coerced to all-empty is not numeric.
        assert!(!clean.metric_columns.contains(&"Notes".to_string()));
    }

    #[test]
    fn test_fallback_to_all_numeric_when_no_marketing_names() {
        let csv = "\
Date,Widgets,Gadgets
2024-01-01,5,7
2024-01-02,6,8
";
        let clean = normalize(load(csv), FormatDescriptor::unknown()).unwrap();
        assert_eq!(
            clean.metric_columns,
            vec!["Widgets".to_string(), "Gadgets".to_string()]
        );
    }

    #[test]
    fn test_no_date_column_is_terminal() {
        let csv = "Alpha,Beta\nfoo,1\nbar,2\n";
        let err = normalize(load(csv), FormatDescriptor::unknown()).unwrap_err();
        assert!(matches!(err, ForecastBuilderError::NoDateColumn));
    }

    #[test]
    fn test_no_metric_column_is_terminal() {
        let csv = "Date,Comment\n2024-01-01,hello\n2024-01-02,there\n";
        let err = normalize(load(csv), FormatDescriptor::unknown()).unwrap_err();
        assert!(matches!(err, ForecastBuilderError::NoMetricColumns));
    }

    #[test]
    fn test_prepare_for_forecast_reloads_with_known_format() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXPORT.as_bytes()).unwrap();

        let (table, dates) = prepare_for_forecast(
            file.path(),
            &google_descriptor(),
            "Day",
            DateFormat::MonthDayYear,
            &["Cost".to_string()],
        )
        .unwrap();

        assert_eq!(dates.len(), 3);
        assert_eq!(dates[0], NaiveDate::from_ymd_opt(2024, 1, 2));
        // Only the selected metric was coerced; other text columns are
        // untouched on this path.
        assert_eq!(
            table.column("Cost").unwrap().cells[0],
            Cell::Number(1476.69)
        );
        assert!(table.column("Notes").unwrap().has_text());
    }

    #[test]
    fn test_metric_series_drops_null_dates_and_sorts() {
        let csv = "\
Day,Clicks
2024-01-03,30
bad,99
2024-01-01,10
2024-01-02,20
2024-01-02,21
";
        let clean = normalize(load(csv), FormatDescriptor::unknown()).unwrap();
        let series = MetricSeries::from_table(&clean.table, &clean.dates, "Clicks");
        assert_eq!(series.len(), 3);
        assert_eq!(
            series.dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            ]
        );
        assert_eq!(series.values, vec![10.0, 20.0, 30.0]);
    }
}
