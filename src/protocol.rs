// 📦 Serialization Protocol - Board ⇄ plain data
//
// Three shapes share the same row/label layout:
// - BoardDocument: the import/export file `{ name, typeLabels, rows }`
// - EditorState:   the persisted editor snapshot `{ rows, typeLabels }`
// - LibraryEntry:  a saved snapshot plus metadata (see `library`)
//
// Import ALWAYS strips grading: every imported cell starts empty. Restoring
// the editor snapshot does not strip; only import does.

use crate::board::{Board, Cell, Row};
use crate::error::ImportError;
use crate::ranking;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Board title used when a document carries none
pub const DEFAULT_BOARD_TITLE: &str = "Tier List";

// ============================================================================
// DOCUMENT SHAPES
// ============================================================================

/// One row as plain data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowDocument {
    #[serde(default)]
    pub title: String,
    /// Image reference, `""` when the row has none
    #[serde(default)]
    pub img: String,
    /// Item label per cell, `null` for empty cells
    #[serde(default)]
    pub cells: Vec<Option<String>>,
}

impl RowDocument {
    pub fn from_row(row: &Row) -> Self {
        RowDocument {
            title: row.title.clone(),
            img: row.image.clone().unwrap_or_default(),
            cells: row.cell_labels(),
        }
    }

    /// Rebuild a row keeping cell contents. Empty strings are empty cells.
    pub fn to_row(&self) -> Row {
        let cells = self
            .cells
            .iter()
            .map(|c| match c.as_deref() {
                Some(label) if !label.is_empty() => Cell::with_item(label),
                _ => Cell::empty(),
            })
            .collect();
        Row::from_parts(self.title.clone(), image_from_doc(&self.img), cells)
    }
}

fn image_from_doc(img: &str) -> Option<String> {
    if img.is_empty() {
        None
    } else {
        Some(img.to_string())
    }
}

/// Import/export file format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardDocument {
    pub name: String,
    #[serde(rename = "typeLabels")]
    pub type_labels: Vec<String>,
    pub rows: Vec<RowDocument>,
}

/// Persisted editor snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorState {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub rows: Vec<RowDocument>,
    #[serde(rename = "typeLabels", default)]
    pub type_labels: Vec<String>,
}

// ============================================================================
// EXPORT
// ============================================================================

/// Board → export document. Every `cells` array is as long as the row.
pub fn export_board(board: &Board) -> BoardDocument {
    BoardDocument {
        name: board.title.clone(),
        type_labels: board.labels.clone(),
        rows: board.rows.iter().map(RowDocument::from_row).collect(),
    }
}

/// Pretty-printed export file contents
pub fn export_json(board: &Board) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&export_board(board))
}

/// Download name for an export: whitespace runs become `_`
pub fn export_filename(title: &str) -> String {
    let title = title.trim();
    let title = if title.is_empty() { DEFAULT_BOARD_TITLE } else { title };
    let stem = title.split_whitespace().collect::<Vec<_>>().join("_");
    format!("{}.json", stem)
}

/// Board → editor snapshot
pub fn editor_state(board: &Board) -> EditorState {
    EditorState {
        name: board.title.clone(),
        rows: board.rows.iter().map(RowDocument::from_row).collect(),
        type_labels: board.labels.clone(),
    }
}

// ============================================================================
// RESTORE
// ============================================================================

/// Editor snapshot → board, keeping cell contents and each row's cell
/// count. Rows are rescored and re-ranked.
pub fn restore_editor_state(state: &EditorState) -> Board {
    let title = if state.name.is_empty() {
        DEFAULT_BOARD_TITLE.to_string()
    } else {
        state.name.clone()
    };

    let mut board = Board {
        title,
        labels: state.type_labels.clone(),
        rows: state.rows.iter().map(RowDocument::to_row).collect(),
    };
    board.recompute_scores();
    ranking::rank_in_place(&mut board.rows);
    board
}

// ============================================================================
// IMPORT
// ============================================================================

/// Parse an import file. Grading is stripped: each row keeps its cell count
/// but every cell is empty.
pub fn import_json(text: &str) -> Result<Board, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    import_value(&value)
}

/// Validate and rebuild a board from an already-parsed document
pub fn import_value(value: &Value) -> Result<Board, ImportError> {
    let obj = value.as_object().ok_or(ImportError::NotAnObject)?;

    let labels = obj
        .get("typeLabels")
        .filter(|v| !v.is_null())
        .ok_or(ImportError::MissingField("typeLabels"))?;
    let labels = labels.as_array().ok_or_else(|| ImportError::WrongType {
        field: "typeLabels".to_string(),
        expected: "array of strings",
    })?;
    let labels = labels
        .iter()
        .enumerate()
        .map(|(i, l)| {
            l.as_str().map(str::to_string).ok_or_else(|| ImportError::WrongType {
                field: format!("typeLabels[{}]", i),
                expected: "string",
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let rows = obj
        .get("rows")
        .filter(|v| !v.is_null())
        .ok_or(ImportError::MissingField("rows"))?;
    let rows = rows.as_array().ok_or_else(|| ImportError::WrongType {
        field: "rows".to_string(),
        expected: "array",
    })?;
    let rows = rows
        .iter()
        .enumerate()
        .map(|(i, r)| import_row(i, r))
        .collect::<Result<Vec<_>, _>>()?;

    let title = obj
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_BOARD_TITLE)
        .to_string();

    let mut board = Board {
        title,
        labels,
        rows,
    };
    board.recompute_scores();
    ranking::rank_in_place(&mut board.rows);
    Ok(board)
}

fn import_row(index: usize, value: &Value) -> Result<Row, ImportError> {
    let obj = value.as_object().ok_or_else(|| ImportError::WrongType {
        field: format!("rows[{}]", index),
        expected: "object",
    })?;

    let title = optional_string(obj.get("title"), || format!("rows[{}].title", index))?;
    let img = optional_string(obj.get("img"), || format!("rows[{}].img", index))?;

    let cells = obj
        .get("cells")
        .and_then(Value::as_array)
        .ok_or(ImportError::MissingField("rows[].cells"))?;

    // Shape kept, grading dropped
    let cells = vec![Cell::empty(); cells.len()];

    Ok(Row::from_parts(title, image_from_doc(&img), cells))
}

fn optional_string(
    value: Option<&Value>,
    field: impl FnOnce() -> String,
) -> Result<String, ImportError> {
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ImportError::WrongType {
            field: field(),
            expected: "string",
        }),
    }
}

// ============================================================================
// READ-ONLY VIEW
// ============================================================================

/// Cells as shown by the read-only viewer: leading empty (null or
/// whitespace-only) cells are dropped, inner and trailing ones are kept.
/// The editor never trims.
pub fn trim_leading_empty(cells: &[Option<String>]) -> &[Option<String>] {
    let start = cells
        .iter()
        .position(|c| c.as_deref().map_or(false, |s| !s.trim().is_empty()))
        .unwrap_or(cells.len());
    &cells[start..]
}

// ============================================================================
// TESTS
// ============================================================================
