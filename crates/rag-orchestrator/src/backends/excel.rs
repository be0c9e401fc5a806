//! Spreadsheet backend
//!
//! Loads every sheet of a workbook (xlsx, xls, ods) with calamine. The first
//! non-empty row of a sheet is its header; every other row is a searchable
//! record rendered as `header: value` pairs.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;

use super::{query_terms, term_overlap, SearchBackend, SearchRequest};
use crate::state::{Backend, SearchResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// 1-based spreadsheet row of each entry in `rows`.
    row_numbers: Vec<usize>,
}

impl Sheet {
    /// Rows numbered as if they directly follow a header on row 1.
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let row_numbers = (2..rows.len() + 2).collect();
        Self {
            name: name.into(),
            headers,
            rows,
            row_numbers,
        }
    }

    /// Build a sheet from raw rows starting at spreadsheet row `first_row`
    /// (1-based). Blank rows are skipped but keep their place in the numbering.
    fn from_cells(
        name: impl Into<String>,
        first_row: usize,
        cells: impl IntoIterator<Item = Vec<String>>,
    ) -> Option<Self> {
        let mut numbered = cells
            .into_iter()
            .enumerate()
            .map(|(offset, row)| (first_row + offset, row))
            .filter(|(_, row)| !row.iter().all(|c| c.is_empty()));

        let (_, headers) = numbered.next()?;
        let (row_numbers, rows) = numbered.unzip();
        Some(Self {
            name: name.into(),
            headers,
            rows,
            row_numbers,
        })
    }

    pub fn row_number(&self, idx: usize) -> usize {
        self.row_numbers.get(idx).copied().unwrap_or(idx + 2)
    }

    fn render_row(&self, row: &[String]) -> String {
        row.iter()
            .enumerate()
            .filter(|(_, cell)| !cell.is_empty())
            .map(|(i, cell)| match self.headers.get(i) {
                Some(header) if !header.is_empty() => format!("{}: {}", header, cell),
                _ => cell.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub struct ExcelSearch {
    sheets: Vec<Sheet>,
    source: Option<String>,
}

impl ExcelSearch {
    /// Load all sheets of the workbook at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut workbook = open_workbook_auto(path)
            .with_context(|| format!("Failed to open spreadsheet: {}", path.display()))?;

        let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
        if sheet_names.is_empty() {
            return Err(anyhow!("Spreadsheet has no sheets: {}", path.display()));
        }

        let mut sheets = Vec::new();
        for sheet_name in &sheet_names {
            let range = match workbook.worksheet_range(sheet_name) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(sheet = %sheet_name, error = %e, "Skipping unreadable sheet");
                    continue;
                }
            };

            // Ranges start at the first used cell, not necessarily A1
            let first_row = range.start().map_or(1, |(row, _)| row as usize + 1);
            let cells = range
                .rows()
                .map(|row| row.iter().map(cell_to_string).collect::<Vec<String>>());

            if let Some(sheet) = Sheet::from_cells(sheet_name.clone(), first_row, cells) {
                sheets.push(sheet);
            }
        }

        tracing::info!(
            path = %path.display(),
            sheets = sheets.len(),
            rows = sheets.iter().map(|s| s.rows.len()).sum::<usize>(),
            "Loaded spreadsheet"
        );

        Ok(Self {
            sheets,
            source: Some(path.display().to_string()),
        })
    }

    /// Search rows supplied directly instead of loading a workbook.
    pub fn from_rows(sheets: Vec<Sheet>) -> Self {
        Self {
            sheets,
            source: None,
        }
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }
}

#[async_trait]
impl SearchBackend for ExcelSearch {
    fn backend(&self) -> Backend {
        Backend::Excel
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let terms = query_terms(&request.query);

        let mut scored: Vec<SearchResult> = Vec::new();
        for sheet in &self.sheets {
            for (idx, row) in sheet.rows.iter().enumerate() {
                let content = sheet.render_row(row);
                let score = term_overlap(&terms, &format!("{} {}", sheet.name, content));
                if score <= 0.0 {
                    continue;
                }

                let mut result = SearchResult::new(format!("[{}] {}", sheet.name, content), score)
                    .with_metadata("sheet", sheet.name.clone())
                    .with_metadata("row", sheet.row_number(idx));
                if let Some(source) = &self.source {
                    result = result.with_metadata("source", source.clone());
                }
                scored.push(result);
            }
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(request.limit);
        Ok(scored)
    }
}

/// Convert a calamine cell to a clean string representation.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // 1500.0 → "1500"
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                format!("{:.4}", f).trim_end_matches('0').trim_end_matches('.').to_string()
            }
        }
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#ERR:{:?}", e),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}
