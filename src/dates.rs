use crate::table::Column;
use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};

/// The date convention a column was resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateFormat {
    MonthDayYear,
    DayMonthYear,
    DayMonthYearDotted,
    Auto,
}

impl DateFormat {
    pub fn label(&self) -> &'static str {
        match self {
            DateFormat::MonthDayYear => "%m/%d/%Y",
            DateFormat::DayMonthYear => "%d/%m/%Y",
            DateFormat::DayMonthYearDotted => "%d.%m.%Y",
            DateFormat::Auto => "auto",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "%m/%d/%Y" => DateFormat::MonthDayYear,
            "%d/%m/%Y" => DateFormat::DayMonthYear,
            "%d.%m.%Y" => DateFormat::DayMonthYearDotted,
            _ => DateFormat::Auto,
        }
    }
}

/// Formats the automatic strategy walks per value. Ad platforms localize
/// exports inconsistently, so "auto" has to cover ISO, slash and
/// month-name conventions.
const AUTO_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%Y%m%d",
    "%b %d, %Y",
    "%d %b %Y",
    "%B %d, %Y",
];

/// Meta exports sometimes concatenate two date tokens into one cell; only
/// the token before the first space is the reporting date.
fn clean_date_text(text: &str) -> &str {
    match text.find(' ') {
        Some(idx) => &text[..idx],
        None => text,
    }
}

fn parse_auto(text: &str) -> Option<NaiveDate> {
    for format in AUTO_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    None
}

fn parse_cell(text: &str, format: DateFormat) -> Option<NaiveDate> {
    let text = clean_date_text(text);
    match format {
        DateFormat::Auto => parse_auto(text),
        fixed => NaiveDate::parse_from_str(text, fixed.label()).ok(),
    }
}

fn parse_column(column: &Column, format: DateFormat) -> Vec<Option<NaiveDate>> {
    column
        .cells
        .iter()
        .map(|cell| cell.as_text().and_then(|text| parse_cell(text, format)))
        .collect()
}

/// Resolve the date convention of a column by attempting all strategies and
/// keeping whichever parses the most values.
///
/// Ties favor the explicit conventions over the permissive automatic walk,
/// and month/day/year over day/month/year, matching how ambiguous ad-export
/// columns (all day values <= 12) are conventionally read.
pub fn resolve_date_column(column: &Column) -> (Vec<Option<NaiveDate>>, DateFormat) {
    let auto = parse_column(column, DateFormat::Auto);
    let mdy = parse_column(column, DateFormat::MonthDayYear);
    let dmy = parse_column(column, DateFormat::DayMonthYear);
    let dmy_dot = parse_column(column, DateFormat::DayMonthYearDotted);

    let valid_auto = auto.iter().filter(|d| d.is_some()).count();
    let valid_mdy = mdy.iter().filter(|d| d.is_some()).count();
    let valid_dmy = dmy.iter().filter(|d| d.is_some()).count();
    let valid_dmy_dot = dmy_dot.iter().filter(|d| d.is_some()).count();

    if valid_mdy >= valid_auto && valid_mdy >= valid_dmy && valid_mdy >= valid_dmy_dot {
        info!(
            "Detected American date format (MM/DD/YYYY) for column {}",
            column.name
        );
        (mdy, DateFormat::MonthDayYear)
    } else if valid_dmy >= valid_auto && valid_dmy >= valid_dmy_dot {
        info!(
            "Detected European date format (DD/MM/YYYY) for column {}",
            column.name
        );
        (dmy, DateFormat::DayMonthYear)
    } else if valid_dmy_dot >= valid_auto {
        info!(
            "Detected European date format with dots (DD.MM.YYYY) for column {}",
            column.name
        );
        (dmy_dot, DateFormat::DayMonthYearDotted)
    } else {
        info!("Using auto-detected date format for column {}", column.name);
        (auto, DateFormat::Auto)
    }
}

/// Re-parse a column with an already-resolved format, for paths that reload
/// the file after the format was chosen.
pub fn parse_with_format(column: &Column, format: DateFormat) -> Vec<Option<NaiveDate>> {
    parse_column(column, format)
}
