use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastBuilderError {
    #[error("No date column found. Ensure the export has a column with dates.")]
    NoDateColumn,

    #[error("No numeric metric columns found to forecast.")]
    NoMetricColumns,

    #[error("Forecast artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Malformed forecast artifact: {0}")]
    ArtifactFormat(String),

    #[error("Model fitting error for metric '{metric}': {details}")]
    FittingError { metric: String, details: String },

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ForecastBuilderError>;
