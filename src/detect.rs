use crate::table::RawTable;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Advertising platform an export was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourcePlatform {
    GoogleAds,
    Meta,
    Unknown,
}

impl SourcePlatform {
    pub fn display_name(&self) -> &'static str {
        match self {
            SourcePlatform::GoogleAds => "Google",
            SourcePlatform::Meta => "Meta",
            SourcePlatform::Unknown => "Unknown",
        }
    }
}

/// How to re-read a file consistently across pipeline stages: how many
/// leading rows to skip, which platform signature matched, and which
/// columns look like dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub header_skip_count: usize,
    pub source_platform: SourcePlatform,
    pub candidate_date_columns: Vec<String>,
}

impl FormatDescriptor {
    pub fn unknown() -> Self {
        Self {
            header_skip_count: 0,
            source_platform: SourcePlatform::Unknown,
            candidate_date_columns: Vec::new(),
        }
    }
}

/// Header substrings that mark a Meta column as date-bearing.
const META_DATE_HINTS: &[&str] = &["reporting", "date", "day", "starts", "ends"];

/// Rows to sample when probing a file for its header signature.
const SAMPLE_ROWS: usize = 5;

fn matches_google_signature(names: &[&str]) -> bool {
    names.contains(&"Campaign") && names.contains(&"Day")
}

fn meta_date_columns(names: &[&str]) -> Vec<String> {
    names
        .iter()
        .filter(|name| {
            let lower = name.to_lowercase();
            META_DATE_HINTS.iter().any(|hint| lower.contains(hint))
        })
        .map(|name| name.to_string())
        .collect()
}

/// Classify an export file's platform and header offset.
///
/// Google Ads exports carry 0-3 banner rows above the real header; Meta
/// exports never do, so the skip-count retry only re-checks the Google
/// signature. Read failures at any skip count are swallowed and the next
/// count is tried; exhausting all options yields the unknown descriptor,
/// never an error.
pub fn detect_format(path: &Path) -> FormatDescriptor {
    match RawTable::from_csv_path_sampled(path, 0, SAMPLE_ROWS) {
        Ok(sample) => {
            let names = sample.column_names();

            if matches_google_signature(&names) {
                info!("Detected Google Ads format with no header rows");
                return FormatDescriptor {
                    header_skip_count: 0,
                    source_platform: SourcePlatform::GoogleAds,
                    candidate_date_columns: vec!["Day".to_string()],
                };
            }

            if names.iter().any(|n| n.to_lowercase().contains("reporting")) {
                let date_columns = meta_date_columns(&names);
                info!("Detected Meta format. Date columns: {:?}", date_columns);
                return FormatDescriptor {
                    header_skip_count: 0,
                    source_platform: SourcePlatform::Meta,
                    candidate_date_columns: date_columns,
                };
            }
        }
        Err(e) => {
            warn!("Error reading file with no skipped rows: {}", e);
        }
    }

    for skip_rows in 1..=3 {
        match RawTable::from_csv_path_sampled(path, skip_rows, SAMPLE_ROWS) {
            Ok(sample) => {
                if matches_google_signature(&sample.column_names()) {
                    info!("Detected Google Ads format with {} header rows", skip_rows);
                    return FormatDescriptor {
                        header_skip_count: skip_rows,
                        source_platform: SourcePlatform::GoogleAds,
                        candidate_date_columns: vec!["Day".to_string()],
                    };
                }
            }
            Err(e) => {
                warn!("Error reading file with skip_rows={}: {}", skip_rows, e);
            }
        }
    }

    info!("Could not determine specific file format, using generic parsing");
    FormatDescriptor::unknown()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_google_signature_no_banner() {
        let file = write_file("Campaign,Day,Clicks,Cost\nBrand,2024-01-01,10,5.0\n");
        let descriptor = detect_format(file.path());
        assert_eq!(descriptor.source_platform, SourcePlatform::GoogleAds);
        assert_eq!(descriptor.header_skip_count, 0);
        assert_eq!(descriptor.candidate_date_columns, vec!["Day"]);
    }

    #[test]
    fn test_google_signature_behind_two_banner_rows() {
        let file = write_file(
            "Campaign report\nAll time\nCampaign,Day,Clicks,Cost\nBrand,2024-01-01,10,5.0\n",
        );
        let descriptor = detect_format(file.path());
        assert_eq!(descriptor.source_platform, SourcePlatform::GoogleAds);
        assert_eq!(descriptor.header_skip_count, 2);
    }

    #[test]
    fn test_meta_signature() {
        let file = write_file(
            "Reporting starts,Reporting ends,Amount spent,Link clicks\n2024-01-01,2024-01-07,100.0,42\n",
        );
        let descriptor = detect_format(file.path());
        assert_eq!(descriptor.source_platform, SourcePlatform::Meta);
        assert_eq!(descriptor.header_skip_count, 0);
        assert_eq!(
            descriptor.candidate_date_columns,
            vec!["Reporting starts", "Reporting ends"]
        );
    }

    #[test]
    fn test_unknown_format_degrades_gracefully() {
        let file = write_file("colA,colB\n1,2\n");
        let descriptor = detect_format(file.path());
        assert_eq!(descriptor.source_platform, SourcePlatform::Unknown);
        assert_eq!(descriptor.header_skip_count, 0);
        assert!(descriptor.candidate_date_columns.is_empty());
    }

    #[test]
    fn test_missing_file_yields_unknown() {
        let descriptor = detect_format(Path::new("/nonexistent/export.csv"));
        assert_eq!(descriptor.source_platform, SourcePlatform::Unknown);
    }
}
