// 🎮 Commands + Editor controller
//
// UI events (drop, double-click, file load, text edits) arrive as `Command`
// values. Every command runs the same discipline:
//
//     mutate → recompute affected scores → re-rank all rows → persist
//
// `Editor::execute` takes `&mut self`, so one command finishes (including the
// persist) before the next can start.

use crate::board::{Board, Item, DEFAULT_LABEL};
use crate::error::ImportError;
use crate::protocol::{self, EditorState};
use crate::ranking::{self, Movement};
use crate::storage::{Store, KEY_EDITOR_STATE};
use serde::{Deserialize, Serialize};

// ============================================================================
// COMMANDS
// ============================================================================

/// Row indexes always refer to the current (ranked) display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    AddRow,
    AddLabel {
        #[serde(default)]
        text: Option<String>,
    },
    RenameLabel {
        index: usize,
        text: String,
    },
    DropItem {
        row: usize,
        cell: usize,
        label: String,
    },
    RemoveItem {
        row: usize,
        cell: usize,
    },
    SetRowTitle {
        row: usize,
        title: String,
    },
    SetRowImage {
        row: usize,
        #[serde(default)]
        image: Option<String>,
    },
    SetTitle {
        title: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddRow => "add_row",
            Command::AddLabel { .. } => "add_label",
            Command::RenameLabel { .. } => "rename_label",
            Command::DropItem { .. } => "drop_item",
            Command::RemoveItem { .. } => "remove_item",
            Command::SetRowTitle { .. } => "set_row_title",
            Command::SetRowImage { .. } => "set_row_image",
            Command::SetTitle { .. } => "set_title",
        }
    }
}

/// What a command did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    /// False for ignored commands (occupied cell, bad index, empty drop)
    pub changed: bool,
    /// Rows that slid to a new position during the re-rank
    pub movements: Vec<Movement>,
}

impl Board {
    /// Apply one command in place, then rescore and re-rank.
    ///
    /// Structural violations are silent no-ops; the re-rank still runs so
    /// the board is always left consistent.
    pub fn apply(&mut self, command: &Command) -> ApplyOutcome {
        let changed = match command {
            Command::AddRow => {
                self.push_empty_row();
                true
            }
            Command::AddLabel { text } => {
                self.push_label(text.as_deref());
                true
            }
            Command::RenameLabel { index, text } => match self.labels.get_mut(*index) {
                Some(label) => {
                    let text = text.trim();
                    *label = if text.is_empty() { DEFAULT_LABEL.to_string() } else { text.to_string() };
                    true
                }
                None => false,
            },
            Command::DropItem { row, cell, label } => {
                if label.is_empty() {
                    false
                } else {
                    match self.rows.get_mut(*row).and_then(|r| r.cells.get_mut(*cell)) {
                        Some(slot) => slot.place(Item::new(label.clone())),
                        None => false,
                    }
                }
            }
            Command::RemoveItem { row, cell } => self
                .rows
                .get_mut(*row)
                .and_then(|r| r.cells.get_mut(*cell))
                .and_then(|slot| slot.clear())
                .is_some(),
            Command::SetRowTitle { row, title } => match self.rows.get_mut(*row) {
                Some(r) => {
                    r.title = title.clone();
                    true
                }
                None => false,
            },
            Command::SetRowImage { row, image } => match self.rows.get_mut(*row) {
                Some(r) => {
                    r.image = image.clone().filter(|i| !i.is_empty());
                    true
                }
                None => false,
            },
            Command::SetTitle { title } => {
                self.title = title.clone();
                true
            }
        };

        if !changed {
            tracing::debug!(command = command.name(), "command ignored");
        }

        self.recompute_scores();
        let outcome = ranking::rank_in_place(&mut self.rows);

        ApplyOutcome {
            changed,
            movements: outcome.movements,
        }
    }
}

/// Pure form: consume a board, return the board after `command`
pub fn apply_command(mut board: Board, command: &Command) -> Board {
    board.apply(command);
    board
}

// ============================================================================
// EDITOR CONTROLLER
// ============================================================================

/// Owns the live board and persists it after every mutation
#[derive(Debug)]
pub struct Editor {
    board: Board,
    store: Store,
}

impl Editor {
    /// Restore the persisted editor snapshot, or start from the template
    pub fn load(store: Store) -> Self {
        let board = match store.read_json::<EditorState>(KEY_EDITOR_STATE) {
            Some(state) => {
                tracing::info!(rows = state.rows.len(), labels = state.type_labels.len(), "restored editor state");
                protocol::restore_editor_state(&state)
            }
            None => {
                let mut board = Board::template();
                board.recompute_scores();
                board
            }
        };

        Editor { board, store }
    }

    /// Editor over an explicit board (nothing persisted until the first command)
    pub fn with_board(board: Board, store: Store) -> Self {
        Editor { board, store }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run one command: mutate, rescore, re-rank, persist
    pub fn execute(&mut self, command: &Command) -> ApplyOutcome {
        let outcome = self.board.apply(command);
        self.persist();
        outcome
    }

    /// Run several commands in order
    pub fn execute_all<'a>(&mut self, commands: impl IntoIterator<Item = &'a Command>) -> Vec<ApplyOutcome> {
        commands.into_iter().map(|c| self.execute(c)).collect()
    }

    /// Replace the board with an imported document (grades stripped) and
    /// persist the stripped state right away. On error nothing changes.
    pub fn import_json(&mut self, text: &str) -> Result<&Board, ImportError> {
        let board = protocol::import_json(text)?;
        tracing::info!(rows = board.rows.len(), labels = board.labels.len(), "imported board");
        self.board = board;
        self.persist();
        Ok(&self.board)
    }

    /// Replace the board wholesale (library load), keeping cell contents
    pub fn replace(&mut self, mut board: Board) {
        board.recompute_scores();
        ranking::rank_in_place(&mut board.rows);
        self.board = board;
        self.persist();
    }

    /// Write the current snapshot; storage failures are logged, not raised
    pub fn persist(&self) -> bool {
        self.store
            .write_json(KEY_EDITOR_STATE, &protocol::editor_state(&self.board))
    }
}

// ============================================================================
// TESTS
// ============================================================================
