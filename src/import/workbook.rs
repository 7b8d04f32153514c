//! Workbook parsing for schedule imports
//!
//! Row 1 carries headers, normalized to lowercase with spaces replaced by
//! underscores. Common aliases map onto the canonical columns. Merged cells
//! arrive as empty values; dates may be native workbook dates or ISO strings.

use crate::error::{CoreError, CoreResult};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveDate;
use std::io::Cursor;

/// One parsed data row
#[derive(Debug, Clone, Default)]
pub struct ParsedRow {
    pub row_number: usize,
    pub person_name: Option<String>,
    pub assignment_date: Option<NaiveDate>,
    pub rotation_name: Option<String>,
    pub slot: Option<String>,
    /// Row-level parse problems (bad date formats and the like)
    pub errors: Vec<String>,
}

/// Outcome of parsing a workbook
#[derive(Debug, Default)]
pub struct ParsedWorkbook {
    pub rows: Vec<ParsedRow>,
    pub warnings: Vec<String>,
}

/// Canonical column for a normalized header, per the accepted aliases
fn canonical_column(header: &str) -> Option<&'static str> {
    match header {
        "person_name" | "name" | "provider" | "resident" => Some("person_name"),
        "assignment_date" | "date" => Some("assignment_date"),
        "rotation_name" | "rotation" | "activity" => Some("rotation_name"),
        "slot" | "time" | "session" => Some("slot"),
        _ => None,
    }
}

fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Data::Float(f) => Some(format!("{}", f)),
        Data::Int(i) => Some(format!("{}", i)),
        Data::Bool(b) => Some(format!("{}", b)),
        Data::DateTime(dt) => dt.as_datetime().map(|d| d.date().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Error(_) => None,
    }
}

fn cell_to_date(cell: &Data) -> Result<Option<NaiveDate>, String> {
    match cell {
        Data::Empty => Ok(None),
        Data::DateTime(dt) => Ok(dt.as_datetime().map(|d| d.date())),
        Data::DateTimeIso(s) => NaiveDate::parse_from_str(&s[..s.len().min(10)], "%Y-%m-%d")
            .map(Some)
            .map_err(|_| format!("Invalid date format: {}", s)),
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| format!("Invalid date format: {}", trimmed))
        }
        other => Err(format!("Invalid date value: {:?}", other)),
    }
}

/// Parse workbook bytes into rows keyed by the canonical columns
pub fn parse_workbook(bytes: &[u8], sheet_name: Option<&str>) -> CoreResult<ParsedWorkbook> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| CoreError::Parse(format!("failed to open workbook: {}", e)))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let selected = match sheet_name {
        Some(name) => {
            if !sheet_names.iter().any(|s| s == name) {
                return Err(CoreError::Parse(format!(
                    "Sheet '{}' not found. Available: {:?}",
                    name, sheet_names
                )));
            }
            name.to_string()
        }
        None => sheet_names
            .first()
            .cloned()
            .ok_or_else(|| CoreError::Parse("workbook has no sheets".to_string()))?,
    };

    let range = workbook
        .worksheet_range(&selected)
        .map_err(|e| CoreError::Parse(format!("failed to read sheet '{}': {}", selected, e)))?;

    let mut rows_iter = range.rows();
    let Some(header_row) = rows_iter.next() else {
        return Err(CoreError::Parse("No data rows found in workbook".to_string()));
    };

    // Normalized header per column index; unmapped columns are ignored
    let columns: Vec<Option<&'static str>> = header_row
        .iter()
        .map(|cell| {
            cell_to_string(cell)
                .map(|raw| normalize_header(&raw))
                .as_deref()
                .and_then(canonical_column)
        })
        .collect();

    let mut present: Vec<&str> = columns.iter().flatten().copied().collect();
    present.dedup();
    for required in ["person_name", "assignment_date"] {
        if !present.contains(&required) {
            return Err(CoreError::Parse(format!(
                "Missing required column: {}",
                required
            )));
        }
    }

    let mut parsed = ParsedWorkbook::default();
    for (index, row) in rows_iter.enumerate() {
        let mut out = ParsedRow {
            // Data rows are 1-based, matching what reviewers see in the file
            row_number: index + 1,
            ..ParsedRow::default()
        };
        let mut is_empty = true;

        for (column_index, cell) in row.iter().enumerate() {
            let Some(Some(column)) = columns.get(column_index) else {
                continue;
            };
            if !matches!(cell, Data::Empty) {
                is_empty = false;
            }
            match *column {
                "person_name" => out.person_name = cell_to_string(cell),
                "rotation_name" => out.rotation_name = cell_to_string(cell),
                "slot" => out.slot = cell_to_string(cell).map(|s| s.to_uppercase()),
                "assignment_date" => match cell_to_date(cell) {
                    Ok(date) => out.assignment_date = date,
                    Err(message) => out.errors.push(message),
                },
                _ => {}
            }
        }

        if !is_empty {
            parsed.rows.push(out);
        }
    }

    if parsed.rows.is_empty() {
        return Err(CoreError::Parse("No data rows found in workbook".to_string()));
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_normalization_and_aliases() {
        assert_eq!(canonical_column(&normalize_header(" Person Name ")), Some("person_name"));
        assert_eq!(canonical_column(&normalize_header("Provider")), Some("person_name"));
        assert_eq!(canonical_column(&normalize_header("Date")), Some("assignment_date"));
        assert_eq!(canonical_column(&normalize_header("Activity")), Some("rotation_name"));
        assert_eq!(canonical_column(&normalize_header("Session")), Some("slot"));
        assert_eq!(canonical_column("comments"), None);
    }

    #[test]
    fn test_cell_date_parsing() {
        assert_eq!(
            cell_to_date(&Data::String("2025-03-03".to_string())).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 3)
        );
        assert_eq!(cell_to_date(&Data::Empty).unwrap(), None);
        assert!(cell_to_date(&Data::String("March 3rd".to_string())).is_err());
    }

    #[test]
    fn test_string_cells_trimmed() {
        assert_eq!(
            cell_to_string(&Data::String("  Smith  ".to_string())),
            Some("Smith".to_string())
        );
        assert_eq!(cell_to_string(&Data::String("   ".to_string())), None);
        assert_eq!(cell_to_string(&Data::Empty), None);
    }
}
