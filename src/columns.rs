//! Column-name heuristics shared across the pipeline.
//!
//! Vendor exports never agree on column naming, so every stage that has to
//! decide "is this a metric / a rate / an identifier" consults the ordered
//! rule tables in this module instead of scattering substring checks around
//! the codebase. Rules are evaluated top-to-bottom; the first match wins.

/// Broad behavioral class of a marketing metric, used by the forecast clamp
/// and the impact simulation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricClass {
    /// ROAS / ROI style efficiency ratios.
    ReturnOnSpend,
    /// Cost-per-unit metrics (CPC, CPM, CPA).
    CostPerUnit,
    /// Percentage rates (CTR, conversion rate).
    Rate,
    /// Everything else: clicks, conversions, impressions, spend totals.
    Count,
}

struct ClassRule {
    class: MetricClass,
    keywords: &'static [&'static str],
}

const CLASS_RULES: &[ClassRule] = &[
    ClassRule {
        class: MetricClass::ReturnOnSpend,
        keywords: &["roas", "return on ad spend", "return on adspend", "roi"],
    },
    ClassRule {
        class: MetricClass::CostPerUnit,
        keywords: &[
            "cpc",
            "cpm",
            "cpa",
            "cost per",
            "cost /",
            "cost/",
        ],
    },
    ClassRule {
        class: MetricClass::Rate,
        keywords: &[
            "ctr",
            "click through rate",
            "click-through rate",
            "click rate",
            "conversion rate",
            "conv. rate",
            "conv rate",
            "cvr",
        ],
    },
];

pub fn classify_metric(name: &str) -> MetricClass {
    let lower = name.to_lowercase();
    for rule in CLASS_RULES {
        if rule.keywords.iter().any(|k| lower.contains(k)) {
            return rule.class;
        }
    }
    MetricClass::Count
}

/// Column-name substrings that mark a column as a candidate date column.
pub const DATE_NAME_HINTS: &[&str] = &[
    "date", "day", "time", "report", "start", "end", "period", "month", "year",
];

pub fn has_date_name_hint(name: &str) -> bool {
    let lower = name.to_lowercase();
    DATE_NAME_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Accepted marketing-metric keywords. A numeric column whose name contains
/// none of these is dropped from the forecastable set (unless the filter
/// would drop everything, in which case the caller falls back to the
/// unfiltered numeric columns).
pub const MARKETING_METRIC_KEYWORDS: &[&str] = &[
    "clicks",
    "link clicks",
    "total clicks",
    "conversions",
    "all conv",
    "conv",
    "website purchases",
    "conversion rate",
    "conv. rate",
    "cvr",
    "impressions",
    "impr",
    "imps",
    "cpc",
    "cost per click",
    "avg. cpc",
    "average cpc",
    "ctr",
    "click through rate",
    "click-through rate",
    "cpm",
    "cost per mille",
    "cost per thousand",
    "spend",
    "cost",
    "amount spent",
    "value",
    "conv. value",
];

pub fn is_marketing_metric(name: &str) -> bool {
    let lower = name.to_lowercase();
    MARKETING_METRIC_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Metrics that cannot semantically go negative. Forecast point estimates and
/// lower bounds for these are floored at zero.
const NON_NEGATIVE_KEYWORDS: &[&str] = &[
    "purchase",
    "conversion",
    "add-to-cart",
    "add to cart",
    "click",
    "impression",
    "cost",
    "spend",
    "value",
];

pub fn is_non_negative_metric(name: &str) -> bool {
    let lower = name.to_lowercase();
    NON_NEGATIVE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Dimension/identifier columns in raw exports. Matched on the full
/// lowercased name, not by substring, so that e.g. "ad" does not swallow
/// "ROAS" or "Amount spent".
const RAW_IDENTIFIER_COLUMNS: &[&str] = &[
    "date", "campaign", "ad_group", "ad", "keyword", "platform", "source", "medium", "device",
    "country", "region", "city",
];

pub fn is_raw_identifier_column(name: &str) -> bool {
    let lower = name.to_lowercase();
    RAW_IDENTIFIER_COLUMNS.iter().any(|c| *c == lower)
}

/// Structural columns of the forecast-artifact body that never hold metrics.
const ARTIFACT_STRUCTURAL_COLUMNS: &[&str] =
    &["date", "metric_type", "date_range", "segment", "campaign"];

pub fn is_artifact_structural_column(name: &str) -> bool {
    let lower = name.to_lowercase();
    ARTIFACT_STRUCTURAL_COLUMNS.iter().any(|c| *c == lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_metric_rules_in_order() {
        assert_eq!(classify_metric("ROAS"), MetricClass::ReturnOnSpend);
        assert_eq!(classify_metric("Website ROI"), MetricClass::ReturnOnSpend);
        assert_eq!(classify_metric("Avg. CPC"), MetricClass::CostPerUnit);
        assert_eq!(classify_metric("Cost / conv."), MetricClass::CostPerUnit);
        assert_eq!(classify_metric("CTR"), MetricClass::Rate);
        assert_eq!(classify_metric("Conversion Rate"), MetricClass::Rate);
        assert_eq!(classify_metric("Clicks"), MetricClass::Count);
        assert_eq!(classify_metric("Impressions"), MetricClass::Count);
    }

    #[test]
    fn test_marketing_metric_filter() {
        assert!(is_marketing_metric("Clicks"));
        assert!(is_marketing_metric("Amount spent (EUR)"));
        assert!(is_marketing_metric("All conv. value"));
        assert!(!is_marketing_metric("Quality score"));
    }

    #[test]
    fn test_identifier_is_exact_match() {
        assert!(is_raw_identifier_column("Campaign"));
        assert!(is_raw_identifier_column("Ad"));
        // Substrings of identifiers must not be swallowed.
        assert!(!is_raw_identifier_column("Amount spent"));
        assert!(!is_raw_identifier_column("ROAS"));
    }

    #[test]
    fn test_non_negative_metrics() {
        assert!(is_non_negative_metric("Website purchases"));
        assert!(is_non_negative_metric("Conversions"));
        assert!(is_non_negative_metric("Clicks"));
        assert!(!is_non_negative_metric("Temperature delta"));
    }
}
