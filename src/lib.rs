// Tier Board - Core Library
// Exposes all modules for use in CLI, TUI browser, API server, and tests

pub mod grade;      // Grade scale + score colors
pub mod board;      // Board / Row / Cell / Item
pub mod ranking;    // Row scores + stable re-ranking
pub mod command;    // Commands + Editor controller
pub mod protocol;   // Import / export / editor snapshot
pub mod storage;    // SQLite key/value snapshots
pub mod identity;   // Viewer id + author name
pub mod library;    // Saved boards (public / private)
pub mod render;     // Render model, rasterizer, share targets
pub mod guard;      // Double-confirm + busy flags
pub mod config;     // Layered configuration
pub mod error;

// Re-export commonly used types
pub use grade::{
    Grade, Rgb, grade_to_value, value_to_color, accent_for,
};
pub use board::{Board, Row, Cell, Item};
pub use ranking::{
    Direction, Movement, RankOutcome,
    compute_row_score, rank, rank_in_place,
};
pub use command::{Command, ApplyOutcome, Editor, apply_command};
pub use protocol::{
    BoardDocument, RowDocument, EditorState,
    export_board, export_json, export_filename, import_json,
};
pub use storage::Store;
pub use library::{DeleteOutcome, LibraryEntry, LibraryIndex, NewEntry, Visibility};
pub use render::{
    RenderedBoard, RasterImage, Rasterizer, SvgRasterizer,
    ImageLoader, DataUriLoader, ShareTarget, FileDownload, CommandTarget,
    render_image, share_everywhere,
};
pub use guard::{BusyFlag, ConfirmGuard, Confirm};
pub use config::Config;
pub use error::{ImportError, StorageError, TierError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
