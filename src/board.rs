// 🗂️ Board State Model - label row + ranked rows of cells
//
// Rows built by the editor have one cell per label; "add label" and "add row"
// keep that through `resize_all_rows_to_label_count`. Loaded and imported rows
// keep whatever cell count they came with.

use crate::grade::Grade;
use crate::ranking;

/// Text given to a label created without a name (or renamed to nothing)
pub const DEFAULT_LABEL: &str = "New";

// ============================================================================
// ITEM + CELL
// ============================================================================

/// A dropped item: nothing but its display label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item(String);

impl Item {
    pub fn new(label: impl Into<String>) -> Self {
        Item(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    /// Grade read from the label, if the label is a grade token
    pub fn grade(&self) -> Option<Grade> {
        Grade::parse(&self.0)
    }
}

/// A slot holding at most one item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    item: Option<Item>,
}

impl Cell {
    pub fn empty() -> Self {
        Cell::default()
    }

    pub fn with_item(label: impl Into<String>) -> Self {
        Cell {
            item: Some(Item::new(label)),
        }
    }

    pub fn item(&self) -> Option<&Item> {
        self.item.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.item.is_none()
    }

    /// Place an item. First drop wins: returns false (and changes nothing)
    /// when the cell is already occupied.
    pub fn place(&mut self, item: Item) -> bool {
        if self.item.is_some() {
            return false;
        }
        self.item = Some(item);
        true
    }

    /// Remove and return the item, if any
    pub fn clear(&mut self) -> Option<Item> {
        self.item.take()
    }

    pub fn grade_value(&self) -> Option<u8> {
        self.item.as_ref().and_then(|it| it.grade()).map(|g| g.value())
    }
}

// ============================================================================
// ROW
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub title: String,
    /// Image reference: URL or `data:` URI. `None` renders the placeholder.
    pub image: Option<String>,
    pub cells: Vec<Cell>,
    /// Derived: average grade over graded cells. Kept current by `recompute_score`.
    score: Option<f64>,
}

impl Row {
    /// Empty row with `cell_count` empty cells
    pub fn new(cell_count: usize) -> Self {
        Row {
            title: String::new(),
            image: None,
            cells: vec![Cell::empty(); cell_count],
            score: None,
        }
    }

    /// Row with explicit contents; the score is computed immediately
    pub fn from_parts(title: impl Into<String>, image: Option<String>, cells: Vec<Cell>) -> Self {
        let mut row = Row {
            title: title.into(),
            image,
            cells,
            score: None,
        };
        row.recompute_score();
        row
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn recompute_score(&mut self) {
        self.score = ranking::compute_row_score(self);
    }

    /// Item labels per cell, `None` for empty cells
    pub fn cell_labels(&self) -> Vec<Option<String>> {
        self.cells
            .iter()
            .map(|c| c.item().map(|it| it.label().to_string()))
            .collect()
    }
}

// ============================================================================
// BOARD
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Board {
    pub title: String,
    pub labels: Vec<String>,
    pub rows: Vec<Row>,
}

impl Board {
    /// Empty board: no labels, no rows
    pub fn new(title: impl Into<String>) -> Self {
        Board {
            title: title.into(),
            labels: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Starter board shown when nothing has been persisted yet
    pub fn template() -> Self {
        let mut board = Board::new("Tier List");
        board.labels = vec!["Atk".to_string(), "Def".to_string(), "Spd".to_string()];
        board.rows.push(Row::new(board.labels.len()));
        board
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Pad every row with empty cells up to the label count. Wider rows are
    /// left alone. Returns the number of cells added.
    pub fn resize_all_rows_to_label_count(&mut self) -> usize {
        let target = self.labels.len();
        let mut added = 0;

        for (index, row) in self.rows.iter_mut().enumerate() {
            if row.cells.len() < target {
                added += target - row.cells.len();
                row.cells.resize(target, Cell::empty());
            } else if row.cells.len() > target {
                tracing::debug!(row = index, cells = row.cells.len(), labels = target, "row wider than the label row");
            }
        }

        added
    }

    /// Append an empty row aligned with the label row
    pub fn push_empty_row(&mut self) -> usize {
        self.rows.push(Row::new(0));
        self.resize_all_rows_to_label_count();
        self.rows.len() - 1
    }

    /// Append a label and one empty cell to every row
    pub fn push_label(&mut self, text: Option<&str>) -> usize {
        let text = match text.map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => DEFAULT_LABEL.to_string(),
        };
        self.labels.push(text);
        self.resize_all_rows_to_label_count();
        self.labels.len() - 1
    }

    /// True when every row has exactly one cell per label
    pub fn is_aligned(&self) -> bool {
        self.rows.iter().all(|r| r.cells.len() == self.labels.len())
    }

    /// Recompute every row score (no reordering)
    pub fn recompute_scores(&mut self) {
        for row in &mut self.rows {
            row.recompute_score();
        }
    }

    /// Remove every item from every cell, keeping the shape
    pub fn strip_items(&mut self) {
        for row in &mut self.rows {
            for cell in &mut row.cells {
                cell.clear();
            }
            row.recompute_score();
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
