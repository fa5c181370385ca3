// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use tier_board::identity;
use tier_board::protocol;
use tier_board::render::{self, SHARE_FILE_STEM};
use tier_board::{
    ApplyOutcome, Command, CommandTarget, Config, DataUriLoader, DeleteOutcome, Direction, Editor,
    FileDownload, LibraryIndex, NewEntry, RenderedBoard, ShareTarget, Store, SvgRasterizer, Visibility,
};

#[derive(Parser)]
#[command(name = "tier-board", version, about = "Tier-list boards: grade, rank, save and share")]
struct Cli {
    /// SQLite database (overrides configuration)
    #[arg(long, global = true, env = "TIER_BOARD_DATABASE_PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current board
    Show,
    /// Append an empty row
    AddRow,
    /// Append a label column
    AddLabel { text: Option<String> },
    /// Rename a label
    RenameLabel { index: usize, text: String },
    /// Drop an item (grade) into an empty cell
    Drop { row: usize, cell: usize, label: String },
    /// Clear a cell
    Remove { row: usize, cell: usize },
    /// Set the board title
    Title { title: String },
    /// Set a row title
    RowTitle { row: usize, title: String },
    /// Set a row image (file path or URL); omit to clear
    RowImage { row: usize, image: Option<String> },
    /// Write the board as a JSON export file
    Export {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Replace the board with an export file (grades are cleared)
    Import { file: PathBuf },
    /// Render the board and share it
    Share,
    /// Save the board to the library
    Save {
        name: String,
        #[arg(long)]
        public: bool,
    },
    /// Browse saved boards
    #[command(subcommand)]
    Library(LibraryCommand),
    /// Show (or set) who you are
    Whoami {
        #[arg(long)]
        name: Option<String>,
    },
    /// Interactive library browser
    Browse,
}

#[derive(Subcommand)]
enum LibraryCommand {
    /// List entries visible to you
    List {
        #[arg(long, default_value = "public")]
        visibility: Visibility,
    },
    /// Read-only view of one entry
    View { id: String },
    /// Delete an entry
    Delete {
        id: String,
        #[arg(long)]
        yes: bool,
    },
    /// Load an entry into the editor
    Open { id: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    let store = Store::open(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;

    match cli.command {
        Commands::Show => show(&Editor::load(store)),
        Commands::AddRow => run(store, Command::AddRow),
        Commands::AddLabel { text } => run(store, Command::AddLabel { text }),
        Commands::RenameLabel { index, text } => run(store, Command::RenameLabel { index, text }),
        Commands::Drop { row, cell, label } => run(store, Command::DropItem { row, cell, label }),
        Commands::Remove { row, cell } => run(store, Command::RemoveItem { row, cell }),
        Commands::Title { title } => run(store, Command::SetTitle { title }),
        Commands::RowTitle { row, title } => run(store, Command::SetRowTitle { row, title }),
        Commands::RowImage { row, image } => {
            let image = image.map(|i| image_reference(&i)).transpose()?;
            run(store, Command::SetRowImage { row, image })
        }
        Commands::Export { out } => export(&Editor::load(store), &config, out),
        Commands::Import { file } => import(store, &file),
        Commands::Share => share(&Editor::load(store), &config),
        Commands::Save { name, public } => save(store, &config, &name, public),
        Commands::Library(cmd) => library(store, cmd),
        Commands::Whoami { name } => whoami(&store, &config, name),
        Commands::Browse => run_ui_mode(store),
    }
}

fn author(store: &Store, config: &Config) -> String {
    config
        .user_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| identity::author_name(store))
}

// ============================================================================
// EDITOR COMMANDS
// ============================================================================

fn run(store: Store, command: Command) -> Result<()> {
    let mut editor = Editor::load(store);
    let outcome = editor.execute(&command);
    report(&command, &outcome);
    show(&editor)
}

fn report(command: &Command, outcome: &ApplyOutcome) {
    if !outcome.changed {
        println!("⚠️  {} had no effect (bad index or occupied cell)", command.name());
        return;
    }
    println!("✓ {}", command.name());
    for m in &outcome.movements {
        let arrow = match m.direction {
            Direction::Up => "⬆️ ",
            Direction::Down => "⬇️ ",
        };
        println!("  {} row moved {} → {}", arrow, m.from, m.to);
    }
}

fn show(editor: &Editor) -> Result<()> {
    print_board(&RenderedBoard::from_board(editor.board()), true);
    Ok(())
}

fn print_board(board: &RenderedBoard, with_index: bool) {
    println!("\n📋 {}", board.title);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{:>4}  {:<20} {:>6}  {}", "", "", "score", board.labels.join(" | "));

    for (i, row) in board.rows.iter().enumerate() {
        let index = if with_index { format!("{:>3}.", i) } else { "    ".to_string() };
        let score = row.score.map(|s| format!("{:.2}", s)).unwrap_or_else(|| "-".to_string());
        let cells: Vec<String> = row
            .cells
            .iter()
            .map(|c| c.clone().unwrap_or_else(|| "·".to_string()))
            .collect();
        let accent = row.accent.map(|c| c.to_hex()).unwrap_or_default();
        println!("{}  {:<20} {:>6}  {}  {}", index, row.title, score, cells.join(" | "), accent);
    }

    if let Some(credit) = &board.credit {
        println!("\n{}", credit);
    }
}

/// Local files become embedded data URIs; anything else is kept verbatim
fn image_reference(arg: &str) -> Result<String> {
    let path = Path::new(arg);
    if !path.is_file() {
        return Ok(arg.to_string());
    }

    let bytes = fs::read(path).with_context(|| format!("Failed to read image {:?}", path))?;
    let mime = match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    };
    Ok(format!("data:{};base64,{}", mime, BASE64.encode(bytes)))
}

// ============================================================================
// IMPORT / EXPORT / SHARE
// ============================================================================

fn export(editor: &Editor, config: &Config, out: Option<PathBuf>) -> Result<()> {
    let board = editor.board();
    let json = protocol::export_json(board).context("Failed to encode board")?;
    let path = out.unwrap_or_else(|| config.export_dir.join(protocol::export_filename(&board.title)));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;

    println!("💾 Exported {} rows → {}", board.rows.len(), path.display());
    Ok(())
}

fn import(store: Store, file: &Path) -> Result<()> {
    let text = fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let mut editor = Editor::load(store);

    match editor.import_json(&text) {
        Ok(board) => {
            println!("📂 Imported {} rows, {} labels (grades cleared)", board.rows.len(), board.labels.len());
            show(&editor)
        }
        Err(e) => {
            eprintln!("❌ Import rejected: {}", e);
            eprintln!("   The current board was not changed.");
            std::process::exit(1);
        }
    }
}

fn share(editor: &Editor, config: &Config) -> Result<()> {
    println!("🖼️  Rendering board...");
    let view = RenderedBoard::from_board(editor.board());
    let image = render::render_image(&view, &DataUriLoader, &SvgRasterizer::default())?;
    let filename = image.filename(SHARE_FILE_STEM);

    let commands: Vec<CommandTarget> = config
        .share_commands
        .iter()
        .filter_map(|c| CommandTarget::parse(c))
        .collect();
    let targets: Vec<&dyn ShareTarget> = commands.iter().map(|c| c as &dyn ShareTarget).collect();

    let download = FileDownload::new(&config.export_dir);
    let report = render::share_everywhere(&image, &filename, &targets, &download)?;

    for name in &report.delivered {
        println!("✓ Shared via {}", name);
    }
    for name in &report.failed {
        println!("⚠️  {} failed (see logs)", name);
    }
    if let Some(path) = report.download {
        println!("💾 Saved {}", path.display());
    }
    Ok(())
}

// ============================================================================
// LIBRARY
// ============================================================================

fn save(store: Store, config: &Config, name: &str, public: bool) -> Result<()> {
    let editor = Editor::load(store.clone());
    let library = LibraryIndex::new(store.clone());
    let author = author(&store, config);
    let author_id = identity::viewer_id(&store);

    let new = NewEntry {
        board: editor.board(),
        name,
        is_public: public,
        author: &author,
        author_id: &author_id,
    };

    let entry = if config.thumbnails {
        library.save_with_thumbnail(new, &DataUriLoader, &SvgRasterizer::default())?
    } else {
        library.create(new)?
    };

    println!("📚 Saved \"{}\" as {} ({})", entry.name, entry.id, entry.visibility());
    Ok(())
}

fn library(store: Store, cmd: LibraryCommand) -> Result<()> {
    let library = LibraryIndex::new(store.clone());

    match cmd {
        LibraryCommand::List { visibility } => {
            let viewer = identity::viewer_id(&store);
            let entries = library.list(visibility, &viewer);
            println!("📚 {} boards ({})", entries.len(), visibility);
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            for e in entries {
                let thumb = if e.has_thumbnail() { "🖼️ " } else { "  " };
                println!(
                    "{} {:<28} {:<24} {:<12} {}",
                    thumb,
                    e.id,
                    e.name,
                    e.author,
                    e.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        LibraryCommand::View { id } => match library.get(&id) {
            Some(entry) => print_board(&entry.read_only_view(), false),
            None => println!("🔍 No board with id {}", id),
        },
        LibraryCommand::Delete { id, yes } => {
            if !yes {
                println!("⚠️  Deleting is permanent. Run again with --yes to confirm.");
                return Ok(());
            }
            match library.delete(&id, &identity::viewer_id(&store)) {
                DeleteOutcome::Deleted => println!("🗑️  Deleted {}", id),
                DeleteOutcome::Missing => println!("🔍 No board with id {} (nothing to delete)", id),
                DeleteOutcome::NotOwner => println!("🔒 {} is another author's private board", id),
            }
        }
        LibraryCommand::Open { id } => match library.get(&id) {
            Some(entry) => {
                let mut editor = Editor::load(store);
                editor.replace(entry.to_board());
                println!("📂 Opened \"{}\" in the editor", entry.name);
                show(&editor)?;
            }
            None => println!("🔍 No board with id {}", id),
        },
    }
    Ok(())
}

fn whoami(store: &Store, config: &Config, name: Option<String>) -> Result<()> {
    if let Some(name) = name {
        if identity::set_author_name(store, &name) {
            println!("✓ Author name set to {}", name.trim());
        }
    }
    println!("🪪 {} ({})", author(store, config), identity::viewer_id(store));
    Ok(())
}

// ============================================================================
// TUI
// ============================================================================

#[cfg(feature = "tui")]
fn run_ui_mode(store: Store) -> Result<()> {
    let viewer = identity::viewer_id(&store);
    let mut app = ui::App::new(LibraryIndex::new(store.clone()), viewer);

    println!("Starting library browser... (Press 'q' to quit)\n");
    let opened = ui::run_ui(&mut app)?;

    if let Some(entry) = opened {
        let mut editor = Editor::load(store);
        editor.replace(entry.to_board());
        println!("📂 Opened \"{}\" in the editor", entry.name);
        show(&editor)?;
    }

    println!("\n✅ Browser closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_store: Store) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin tier-server --features server");
    std::process::exit(1);
}
