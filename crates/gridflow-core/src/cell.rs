// Document, column, and cell domain types
//
// Documents and columns are read-only lookups from the pipeline's point of
// view: the queue only needs document existence and the ordered column list
// to delimit row width when materializing a grid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// A tabular document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Filename stem for exports: display name with each non-alphanumeric
    /// character replaced by an underscore.
    pub fn export_stem(&self) -> String {
        let mut stem = String::with_capacity(self.name.len());
        for c in self.name.chars() {
            if c.is_ascii_alphanumeric() {
                stem.push(c);
            } else {
                stem.push('_');
            }
        }
        if stem.is_empty() {
            stem.push_str("document");
        }
        stem
    }
}

/// An ordered column of a document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: Uuid,
    pub document_id: Uuid,
    pub title: String,
    pub position: i32,
}

/// One addressable content unit, keyed by (document, row, col)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub document_id: Uuid,
    pub row_index: i32,
    pub col_index: i32,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// Column header in a materialized grid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct GridColumn {
    pub title: String,
    pub position: i32,
}

/// Full rows-by-columns materialization of a document's cells
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Grid {
    pub columns: Vec<GridColumn>,
    pub rows: Vec<Vec<String>>,
    pub row_count: usize,
    pub column_count: usize,
}

impl Grid {
    /// Materialize a grid from sparse cells and the known column list.
    ///
    /// Row width is the larger of the column count and the maximum
    /// populated column index; missing cells backfill as empty strings.
    pub fn materialize(columns: Vec<GridColumn>, cells: &[Cell]) -> Self {
        let max_row = cells.iter().map(|c| c.row_index + 1).max().unwrap_or(0) as usize;
        let max_col = cells.iter().map(|c| c.col_index + 1).max().unwrap_or(0) as usize;
        let column_count = columns.len().max(max_col);

        let mut rows = vec![vec![String::new(); column_count]; max_row];
        for cell in cells {
            let (r, c) = (cell.row_index as usize, cell.col_index as usize);
            if r < max_row && c < column_count {
                rows[r][c] = cell.content.clone();
            }
        }

        Grid {
            columns,
            row_count: rows.len(),
            column_count,
            rows,
        }
    }

    /// Render as flat delimited text: first line is column titles, one
    /// comma-separated line per row.
    pub fn to_delimited(&self) -> String {
        let mut out = String::new();
        let header: Vec<&str> = self.columns.iter().map(|c| c.title.as_str()).collect();
        out.push_str(&header.join(","));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }
}
