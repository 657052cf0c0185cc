use crate::detect::SourcePlatform;
use crate::normalize::CleanTable;
use crate::table::RawTable;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Daily-average spend derived from an export, with a flag marking whether
/// the chosen column is true ad spend or a weaker proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub daily_average: f64,
    pub currency: String,
    pub is_valid_cost_signal: bool,
    /// Column the figure came from, for wiring the forecast regressor.
    pub source_column: Option<String>,
}

impl BudgetSummary {
    fn empty() -> Self {
        Self {
            daily_average: 0.0,
            currency: DEFAULT_CURRENCY.to_string(),
            is_valid_cost_signal: false,
            source_column: None,
        }
    }
}

const DEFAULT_CURRENCY: &str = "£";

const GOOGLE_SPEND_COLUMNS: &[&str] = &["Cost", "All conv. value", "Cost / conv."];
const META_SPEND_COLUMNS: &[&str] = &[
    "Amount spent",
    "Amount spent (EUR)",
    "Spend",
    "Cost per result",
];

/// Name fragments that mark a chosen column as a proxy rather than real
/// spend (conversion value, per-result cost).
const PROXY_SIGNAL_FRAGMENTS: &[&str] = &["value", "result", "/ conv"];

fn column_has_nonzero(table: &RawTable, name: &str) -> bool {
    table
        .column(name)
        .map(|column| {
            column
                .cells
                .iter()
                .filter_map(|c| c.coerce_number())
                .any(|v| v != 0.0)
        })
        .unwrap_or(false)
}

fn names_containing(table: &RawTable, fragments: &[&str]) -> Vec<String> {
    table
        .columns()
        .iter()
        .filter(|c| {
            let lower = c.name.to_lowercase();
            fragments.iter().any(|f| lower.contains(f))
        })
        .map(|c| c.name.clone())
        .collect()
}

/// Ordered spend-column candidates for a platform: the exact per-platform
/// names first, then the platform's keyword scan, then the generic scan.
/// Later entries only matter when every earlier one is absent or all-zero.
fn spend_candidates(table: &RawTable, platform: SourcePlatform) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let push = |name: String, candidates: &mut Vec<String>| {
        if !candidates.contains(&name) {
            candidates.push(name);
        }
    };

    match platform {
        SourcePlatform::GoogleAds => {
            for name in GOOGLE_SPEND_COLUMNS {
                if table.has_column(name) {
                    push(name.to_string(), &mut candidates);
                }
            }
            for name in names_containing(table, &["cost"]) {
                push(name, &mut candidates);
            }
        }
        SourcePlatform::Meta => {
            for name in META_SPEND_COLUMNS {
                if table.has_column(name) {
                    push(name.to_string(), &mut candidates);
                }
            }
            for name in names_containing(table, &["spend", "cost", "amount"]) {
                push(name, &mut candidates);
            }
        }
        SourcePlatform::Unknown => {}
    }

    for name in names_containing(table, &["spend", "cost", "budget", "amount"]) {
        push(name, &mut candidates);
    }

    candidates
}

fn sniff_currency(column_name: &str) -> String {
    let lower = column_name.to_lowercase();
    if lower.contains("eur") || lower.contains('€') {
        "€".to_string()
    } else if lower.contains("usd") || lower.contains('$') {
        "$".to_string()
    } else {
        DEFAULT_CURRENCY.to_string()
    }
}

fn is_proxy_signal(column_name: &str) -> bool {
    let lower = column_name.to_lowercase();
    PROXY_SIGNAL_FRAGMENTS.iter().any(|f| lower.contains(f))
}

/// Compute the daily-average spend baseline for a cleaned export.
///
/// The spend column is chosen from per-platform priority lists; the first
/// candidate with at least one non-zero value wins. The daily average
/// divides the column total by the count of distinct dates so that
/// multi-row-per-day exports are not double counted.
pub fn extract_budget(clean: &CleanTable) -> BudgetSummary {
    let candidates = spend_candidates(&clean.table, clean.descriptor.source_platform);
    info!("Identified spend columns: {:?}", candidates);

    let chosen = match candidates
        .iter()
        .find(|name| column_has_nonzero(&clean.table, name))
    {
        Some(name) => name.clone(),
        None => {
            warn!("No spending columns identified in the export");
            return BudgetSummary::empty();
        }
    };
    info!("Using {} as the primary spending column", chosen);

    let total: f64 = clean
        .table
        .column(&chosen)
        .map(|column| column.cells.iter().filter_map(|c| c.coerce_number()).sum())
        .unwrap_or(0.0);

    let distinct_days: usize = {
        let days: BTreeSet<_> = clean.dates.iter().filter_map(|d| *d).collect();
        if days.is_empty() {
            clean.table.row_count()
        } else {
            days.len()
        }
    };

    let daily_average = if distinct_days > 0 {
        total / distinct_days as f64
    } else {
        0.0
    };

    BudgetSummary {
        daily_average,
        currency: sniff_currency(&chosen),
        is_valid_cost_signal: !is_proxy_signal(&chosen),
        source_column: Some(chosen),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::FormatDescriptor;
    use crate::normalize::normalize;

    fn clean_from(csv: &str, platform: SourcePlatform, date_cols: &[&str]) -> CleanTable {
        let table = RawTable::from_reader(csv.as_bytes(), 0, None).unwrap();
        let descriptor = FormatDescriptor {
            header_skip_count: 0,
            source_platform: platform,
            candidate_date_columns: date_cols.iter().map(|s| s.to_string()).collect(),
        };
        normalize(table, descriptor).unwrap()
    }

    #[test]
    fn test_google_cost_column_preferred() {
        let clean = clean_from(
            "Day,Campaign,Cost,All conv. value\n\
             2024-01-01,Brand,100.0,250.0\n\
             2024-01-02,Brand,110.0,260.0\n",
            SourcePlatform::GoogleAds,
            &["Day"],
        );
        let budget = extract_budget(&clean);
        assert_eq!(budget.source_column.as_deref(), Some("Cost"));
        assert!((budget.daily_average - 105.0).abs() < 1e-9);
        assert!(budget.is_valid_cost_signal);
        assert_eq!(budget.currency, "£");
    }

    #[test]
    fn test_proxy_fallback_is_flagged() {
        let clean = clean_from(
            "Day,Campaign,All conv. value\n\
             2024-01-01,Brand,250.0\n\
             2024-01-02,Brand,260.0\n",
            SourcePlatform::GoogleAds,
            &["Day"],
        );
        let budget = extract_budget(&clean);
        assert_eq!(budget.source_column.as_deref(), Some("All conv. value"));
        assert!(!budget.is_valid_cost_signal);
    }

    #[test]
    fn test_all_zero_candidate_is_skipped() {
        let clean = clean_from(
            "Day,Cost,Total spend\n\
             2024-01-01,0.0,50.0\n\
             2024-01-02,0.0,70.0\n",
            SourcePlatform::GoogleAds,
            &["Day"],
        );
        let budget = extract_budget(&clean);
        assert_eq!(budget.source_column.as_deref(), Some("Total spend"));
        assert!((budget.daily_average - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_meta_currency_sniffed_from_column_name() {
        let clean = clean_from(
            "Reporting starts,Amount spent (EUR),Link clicks\n\
             2024-01-01,90.0,10\n\
             2024-01-02,110.0,12\n",
            SourcePlatform::Meta,
            &["Reporting starts"],
        );
        let budget = extract_budget(&clean);
        assert_eq!(budget.currency, "€");
        assert_eq!(budget.source_column.as_deref(), Some("Amount spent (EUR)"));
    }

    #[test]
    fn test_multi_row_per_day_divides_by_distinct_days() {
        let clean = clean_from(
            "Day,Campaign,Cost\n\
             2024-01-01,A,40.0\n\
             2024-01-01,B,60.0\n\
             2024-01-02,A,80.0\n",
            SourcePlatform::GoogleAds,
            &["Day"],
        );
        let budget = extract_budget(&clean);
        // 180 total over 2 distinct days.
        assert!((budget.daily_average - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_spend_column_yields_zero() {
        let clean = clean_from(
            "Day,Clicks\n2024-01-01,10\n2024-01-02,12\n",
            SourcePlatform::Unknown,
            &[],
        );
        let budget = extract_budget(&clean);
        assert_eq!(budget.daily_average, 0.0);
        assert!(budget.source_column.is_none());
        assert!(!budget.is_valid_cost_signal);
    }
}
