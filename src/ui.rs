use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;
use tier_board::guard::{Confirm, ConfirmGuard};
use tier_board::{DeleteOutcome, LibraryEntry, LibraryIndex, RenderedBoard, Rgb, Visibility};

pub struct App {
    pub library: LibraryIndex,
    pub viewer_id: String,
    pub tab: Visibility,
    pub entries: Vec<LibraryEntry>,
    pub state: TableState,
    pub show_detail: bool,
    pub confirm: ConfirmGuard,
    pub status: Option<String>,
    /// Entry chosen with `o`, loaded into the editor after the UI closes
    pub opened: Option<LibraryEntry>,
}

impl App {
    pub fn new(library: LibraryIndex, viewer_id: String) -> Self {
        let mut app = Self {
            library,
            viewer_id,
            tab: Visibility::Public,
            entries: Vec::new(),
            state: TableState::default(),
            show_detail: false,
            confirm: ConfirmGuard::default(),
            status: None,
            opened: None,
        };
        app.refresh();
        app
    }

    pub fn refresh(&mut self) {
        self.entries = self.library.list(self.tab, &self.viewer_id);
        let selected = match self.state.selected() {
            _ if self.entries.is_empty() => None,
            Some(i) => Some(i.min(self.entries.len() - 1)),
            None => Some(0),
        };
        self.state.select(selected);
    }

    pub fn toggle_tab(&mut self) {
        self.tab = match self.tab {
            Visibility::Public => Visibility::Private,
            Visibility::Private => Visibility::Public,
        };
        self.state.select(None);
        self.confirm.reset();
        self.refresh();
    }

    pub fn selected_entry(&self) -> Option<&LibraryEntry> {
        self.state.selected().and_then(|i| self.entries.get(i))
    }

    pub fn next(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < self.entries.len() => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => self.entries.len() - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    /// Press twice within the confirm window to delete
    pub fn request_delete(&mut self) {
        let Some(id) = self.selected_entry().map(|e| e.id.clone()) else {
            return;
        };

        match self.confirm.trigger(&id) {
            Confirm::Armed => {
                self.status = Some("Press d again to delete".to_string());
            }
            Confirm::Confirmed => {
                self.status = Some(match self.library.delete(&id, &self.viewer_id) {
                    DeleteOutcome::NotOwner => format!("{} belongs to someone else", id),
                    _ => format!("Deleted {}", id),
                });
                self.refresh();
            }
        }
    }

    pub fn open_selected(&mut self) -> bool {
        self.opened = self.selected_entry().cloned();
        self.opened.is_some()
    }
}

/// Run the browser. Returns the entry the user chose to open, if any.
pub fn run_ui(app: &mut App) -> Result<Option<LibraryEntry>> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(app.opened.take())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            if key.code != KeyCode::Char('d') {
                app.status = None;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.show_detail = !app.show_detail,
                KeyCode::Tab | KeyCode::BackTab => app.toggle_tab(),
                KeyCode::Char('d') => app.request_delete(),
                KeyCode::Char('o') => {
                    if app.open_selected() {
                        return Ok(());
                    }
                }
                KeyCode::Char('r') => app.refresh(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::Home if !app.entries.is_empty() => app.state.select(Some(0)),
                KeyCode::End if !app.entries.is_empty() => app.state.select(Some(app.entries.len() - 1)),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Tabs
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(chunks[1]);

        render_list(f, content[0], app);
        render_board(f, content[1], app);
    } else {
        render_list(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![];
    for (i, tab) in [Visibility::Public, Visibility::Private].iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        let style = if *tab == app.tab {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let name = match tab {
            Visibility::Public => "Public",
            Visibility::Private => "My boards",
        };
        spans.push(Span::styled(name, style));
    }

    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("{} saved", app.entries.len()),
        Style::default().fg(Color::White),
    ));

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_list(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Name", "Author", "Rows", "Saved"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).style(Style::default().bg(Color::DarkGray)).height(1);

    let pending = app.confirm.pending().map(str::to_string);
    let rows = app.entries.iter().map(|e| {
        let name_style = if pending.as_deref() == Some(e.id.as_str()) {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(truncate(&e.name, 28)).style(name_style),
            Cell::from(truncate(&e.author, 16)),
            Cell::from(e.rows.len().to_string()),
            Cell::from(e.created_at.format("%Y-%m-%d").to_string()),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Min(20),
            Constraint::Length(18),
            Constraint::Length(5),
            Constraint::Length(11),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(" Library "))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn accent_color(rgb: Option<Rgb>) -> Color {
    match rgb {
        Some(c) => Color::Rgb(c.r, c.g, c.b),
        None => Color::DarkGray,
    }
}

fn render_board(f: &mut Frame, area: Rect, app: &App) {
    let Some(entry) = app.selected_entry() else {
        let empty = Paragraph::new("No board selected").block(Block::default().borders(Borders::ALL));
        f.render_widget(empty, area);
        return;
    };

    let view: RenderedBoard = entry.read_only_view();
    let columns = view
        .rows
        .iter()
        .map(|r| r.cells.len())
        .chain(std::iter::once(view.labels.len()))
        .max()
        .unwrap_or(0);

    let mut header_cells = vec![Cell::from(""), Cell::from("Title")];
    header_cells.extend(view.labels.iter().map(|l| Cell::from(truncate(l, 6))));
    let header = Row::new(header_cells).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));

    let rows = view.rows.iter().map(|r| {
        let mut cells = vec![
            Cell::from("█").style(Style::default().fg(accent_color(r.accent))),
            Cell::from(truncate(&r.title, 18)),
        ];
        cells.extend(r.cells.iter().map(|c| Cell::from(c.clone().unwrap_or_default())));
        Row::new(cells)
    });

    let mut widths = vec![Constraint::Length(1), Constraint::Length(20)];
    widths.extend(std::iter::repeat(Constraint::Length(6)).take(columns));

    let title = format!(" {} ", view.title);
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title).title_bottom(view.credit.clone().unwrap_or_default()));

    f.render_widget(table, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![];

    if let Some(status) = &app.status {
        spans.push(Span::styled(format!(" {} ", status), Style::default().fg(Color::Green)));
        spans.push(Span::raw(" | "));
    }

    for (key, label, color) in [
        ("Enter", " View | ", Color::Yellow),
        ("Tab", " Public/Mine | ", Color::Yellow),
        ("o", " Open | ", Color::Yellow),
        ("d d", " Delete | ", Color::Yellow),
        ("q", " Quit", Color::Red),
    ] {
        spans.push(Span::styled(key, Style::default().fg(color)));
        spans.push(Span::raw(label));
    }

    let status_bar = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::White)));

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tier_board::{Board, NewEntry, Store};

    fn app_with_entries() -> App {
        let store = Store::open_in_memory().unwrap();
        let library = LibraryIndex::new(store);
        let board = Board::template();
        for (name, public, owner) in [("a", true, "me"), ("b", true, "other"), ("mine", false, "me")] {
            library
                .create(NewEntry {
                    board: &board,
                    name,
                    is_public: public,
                    author: "Ana",
                    author_id: owner,
                })
                .unwrap();
        }
        App::new(library, "me".to_string())
    }

    #[test]
    fn test_tabs_filter_entries() {
        let mut app = app_with_entries();
        assert_eq!(app.entries.len(), 2);
        assert_eq!(app.state.selected(), Some(0));

        app.toggle_tab();

        assert_eq!(app.tab, Visibility::Private);
        assert_eq!(app.entries.len(), 1);
        assert_eq!(app.entries[0].name, "mine");
    }

    #[test]
    fn test_delete_needs_two_presses() {
        let mut app = app_with_entries();

        app.request_delete();
        assert_eq!(app.entries.len(), 2);

        app.request_delete();
        assert_eq!(app.entries.len(), 1);
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app_with_entries();

        app.previous();
        assert_eq!(app.state.selected(), Some(1));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("Anônimo criador", 8), "Anôni...");
        assert_eq!(truncate("short", 8), "short");
    }
}
