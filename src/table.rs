use crate::error::Result;
use log::debug;
use std::io::Read;
use std::path::Path;

/// A single cell of an export table. Exports mix text, numbers and blanks
/// freely, so cells stay heterogeneous until coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    fn from_field(field: &str) -> Self {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(value) => Cell::Number(value),
            Err(_) => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Coerce the cell to a number the way exports are cleaned: thousands
    /// separators stripped, anything unparseable becomes a missing value.
    pub fn coerce_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            Cell::Text(text) => text.replace(',', "").trim().parse::<f64>().ok(),
            Cell::Empty => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    /// A column is numeric once every non-empty cell holds a number and at
    /// least one value is present.
    pub fn is_numeric(&self) -> bool {
        let mut any = false;
        for cell in &self.cells {
            match cell {
                Cell::Number(_) => any = true,
                Cell::Empty => {}
                Cell::Text(_) => return false,
            }
        }
        any
    }

    pub fn has_text(&self) -> bool {
        self.cells.iter().any(|c| matches!(c, Cell::Text(_)))
    }

    /// First `limit` non-empty text values, used for cheap content sniffing.
    pub fn sample_text_values(&self, limit: usize) -> Vec<&str> {
        self.cells
            .iter()
            .filter_map(Cell::as_text)
            .take(limit)
            .collect()
    }

}

/// An ordered set of named columns loaded from one export file.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    columns: Vec<Column>,
}

impl RawTable {
    /// Read a CSV file, skipping `skip_rows` leading non-data rows before
    /// the header. Ragged rows are tolerated: short rows are padded with
    /// empty cells, long rows truncated to the header width.
    pub fn from_csv_path(path: &Path, skip_rows: usize) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, skip_rows, None)
    }

    /// Like [`RawTable::from_csv_path`] but stops after `max_rows` data
    /// rows. Used by format detection, which only needs a sample.
    pub fn from_csv_path_sampled(path: &Path, skip_rows: usize, max_rows: usize) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, skip_rows, Some(max_rows))
    }

    pub fn from_reader<R: Read>(reader: R, skip_rows: usize, max_rows: Option<usize>) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = csv_reader.records();
        for _ in 0..skip_rows {
            match records.next() {
                Some(record) => {
                    record?;
                }
                None => return Ok(Self::default()),
            }
        }

        let header = match records.next() {
            Some(record) => record?,
            None => return Ok(Self::default()),
        };

        let mut columns: Vec<Column> = header
            .iter()
            .map(|name| Column {
                name: name.trim().to_string(),
                cells: Vec::new(),
            })
            .collect();

        let mut row_count = 0usize;
        for record in records {
            if let Some(limit) = max_rows {
                if row_count >= limit {
                    break;
                }
            }
            let record = record?;
            for (idx, column) in columns.iter_mut().enumerate() {
                let cell = record
                    .get(idx)
                    .map(Cell::from_field)
                    .unwrap_or(Cell::Empty);
                column.cells.push(cell);
            }
            row_count += 1;
        }

        debug!(
            "Loaded table: {} columns, {} rows (skip_rows={})",
            columns.len(),
            row_count,
            skip_rows
        );

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.cells.len()).unwrap_or(0)
    }
}
