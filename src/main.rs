use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use dirscope::crawler::ScanSnapshot;
use dirscope::session::{ScanEvent, ScanOutcome, ScanSession};
use dirscope::tier::{classify_tier, format_size, MAX_TIER};
use dirscope::tree::{DirectoryTree, EntryKind};
use dirscope::treemap::{layout_children, Rect, TreemapAlgorithm};
use dirscope::ScanConfig;
use indextree::NodeId;
use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Layout, Position, Rect as UiRect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Paragraph, Widget};
use ratatui::{DefaultTerminal, Frame};
use std::io::{self, stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const LIST_VIEW_ROWS: usize = 12;
const TICK: Duration = Duration::from_millis(50);

const MAP_BACKGROUND: Color = Color::Rgb(18, 18, 20);
const TILE_EDGE: Color = Color::Rgb(200, 200, 200);
const SELECTED_EDGE: Color = Color::Rgb(246, 211, 101);
const PENDING_FILL: Color = Color::Rgb(70, 70, 76);

/// A child of the viewed directory, placed on the terminal grid.
struct Tile {
    path: PathBuf,
    name: String,
    size: u64,
    kind: EntryKind,
    is_pending: bool,
    cell: UiRect,
}

/// One line of the list view
struct ListRow {
    path: PathBuf,
    name: String,
    size: u64,
    percentage: f64,
    kind: EntryKind,
    is_pending: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Browse,
    EditPath,
}

struct App {
    path_input: String,
    mode: Mode,
    status: String,
    session: ScanSession,
    algorithm: TreemapAlgorithm,
    snapshot: Option<Arc<ScanSnapshot>>,
    finished_at: Option<Instant>,
    /// Directory whose children fill the treemap; the scan root when unset.
    view: Option<PathBuf>,
    selected: Option<PathBuf>,
    tiles: Vec<Tile>,
    path_area: Option<UiRect>,
    quit: bool,
}

impl App {
    fn new(config: ScanConfig, initial_path: Option<String>) -> Self {
        let algorithm = config.treemap;
        let auto_start = initial_path.is_some();
        let mut app = Self {
            path_input: initial_path.unwrap_or_else(|| ".".to_string()),
            mode: if auto_start { Mode::Browse } else { Mode::EditPath },
            status: "Enter a directory and press Enter".to_string(),
            session: ScanSession::new(config),
            algorithm,
            snapshot: None,
            finished_at: None,
            view: None,
            selected: None,
            tiles: Vec::new(),
            path_area: None,
            quit: false,
        };
        if auto_start {
            app.start_scan();
        }
        app
    }

    fn start_scan(&mut self) {
        let path = match self.path_input.trim() {
            "" => ".".to_string(),
            trimmed => trimmed.to_string(),
        };
        self.path_input = path.clone();

        match self.session.start_scan(&path) {
            Ok(handle) => {
                self.status = format!("Scan #{} of {}", handle.id(), path);
                self.view = None;
                self.selected = None;
            }
            Err(err) => self.status = format!("Cannot scan {}: {}", path, err),
        }
    }

    fn cancel_scan(&mut self) {
        if self.session.is_scanning() {
            self.session.cancel_active();
            self.status = "Cancelling...".to_string();
        }
    }

    fn drain_scan_events(&mut self) {
        for event in self.session.poll_events() {
            match event {
                ScanEvent::Snapshot(snapshot) => self.snapshot = Some(snapshot),
                ScanEvent::Finished(outcome) => {
                    self.finished_at = Some(Instant::now());
                    self.status = self.describe_outcome(outcome);
                }
            }
        }
    }

    fn describe_outcome(&self, outcome: ScanOutcome) -> String {
        match (outcome, self.snapshot.as_ref()) {
            (ScanOutcome::Completed, Some(snapshot)) => format!(
                "Done: {} in {} items ({:.1}s)",
                format_size(snapshot.tree.total_size()),
                snapshot.items_visited,
                snapshot.elapsed.as_secs_f32(),
            ),
            (ScanOutcome::Completed, None) => "Done".to_string(),
            (ScanOutcome::Cancelled, _) => "Cancelled; showing the last partial result".to_string(),
            (ScanOutcome::Failed { message }, _) => format!("Failed: {}", message),
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }

        match (self.mode, key.code) {
            (Mode::EditPath, KeyCode::Enter) => {
                self.mode = Mode::Browse;
                self.start_scan();
            }
            (Mode::EditPath, KeyCode::Esc) => self.mode = Mode::Browse,
            (Mode::EditPath, KeyCode::Backspace) => {
                self.path_input.pop();
            }
            (Mode::EditPath, KeyCode::Char(ch)) => self.path_input.push(ch),
            (Mode::EditPath, _) => {}

            (Mode::Browse, KeyCode::Char('q')) => self.quit = true,
            (Mode::Browse, KeyCode::Char('/')) => self.mode = Mode::EditPath,
            (Mode::Browse, KeyCode::Char('s' | 'r')) => self.start_scan(),
            (Mode::Browse, KeyCode::Char('x')) => self.cancel_scan(),
            (Mode::Browse, KeyCode::Char('t')) => self.toggle_algorithm(),
            (Mode::Browse, KeyCode::Char('z') | KeyCode::Enter) => self.zoom_into_selected(),
            (Mode::Browse, KeyCode::Char('u') | KeyCode::Backspace) => self.zoom_out(),
            (Mode::Browse, KeyCode::Char('j') | KeyCode::Down) => self.move_selection(1),
            (Mode::Browse, KeyCode::Char('k') | KeyCode::Up) => self.move_selection(-1),
            (Mode::Browse, KeyCode::Esc) => self.selected = None,
            (Mode::Browse, _) => {}
        }
    }

    fn on_mouse(&mut self, event: MouseEvent) {
        let at = Position::new(event.column, event.row);
        let MouseEventKind::Down(button) = event.kind else {
            return;
        };

        if button == MouseButton::Left && self.path_area.is_some_and(|area| area.contains(at)) {
            self.mode = Mode::EditPath;
            return;
        }
        if button == MouseButton::Middle {
            self.zoom_out();
            return;
        }

        let Some(tile) = self.tile_at(at) else {
            return;
        };
        let (path, zoomable) = (tile.path.clone(), tile.kind == EntryKind::Directory);
        match button {
            MouseButton::Right if zoomable => {
                self.view = Some(path);
                self.selected = None;
            }
            MouseButton::Left => self.selected = Some(path),
            _ => {}
        }
    }

    fn toggle_algorithm(&mut self) {
        self.algorithm = match self.algorithm {
            TreemapAlgorithm::Squarified => TreemapAlgorithm::Slice,
            TreemapAlgorithm::Slice => TreemapAlgorithm::Squarified,
        };
    }

    /// Tree and node currently in view, falling back to the root when the
    /// zoomed directory is not in the snapshot.
    fn view_node(&self) -> Option<(&DirectoryTree, NodeId)> {
        let tree = &self.snapshot.as_ref()?.tree;
        let node = self
            .view
            .as_deref()
            .and_then(|path| tree.get_node(path))
            .unwrap_or_else(|| tree.get_root());
        Some((tree, node))
    }

    /// Children of the viewed directory, largest first.
    fn view_children(&self) -> Vec<ListRow> {
        let Some((tree, node)) = self.view_node() else {
            return Vec::new();
        };
        tree.child_entries(node)
            .into_iter()
            .map(|(_, entry)| ListRow {
                path: entry.path.clone(),
                name: entry.name.clone(),
                size: entry.size,
                percentage: entry.percentage_of_parent,
                kind: entry.kind,
                is_pending: entry.is_pending,
            })
            .collect()
    }

    fn move_selection(&mut self, delta: isize) {
        let rows = self.view_children();
        if rows.is_empty() {
            return;
        }
        let last = rows.len() as isize - 1;
        let next = self
            .selected
            .as_ref()
            .and_then(|selected| rows.iter().position(|row| &row.path == selected))
            .map(|index| (index as isize + delta).clamp(0, last) as usize)
            .unwrap_or(0);
        self.selected = Some(rows[next].path.clone());
    }

    fn zoom_into_selected(&mut self) {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return;
        };
        let Some(selected) = self.selected.clone() else {
            return;
        };
        let tree = &snapshot.tree;
        let has_children = tree
            .get_node(&selected)
            .and_then(|id| tree.get(id))
            .is_some_and(|entry| entry.has_children());
        if has_children {
            self.view = Some(selected);
            self.selected = None;
        }
    }

    fn zoom_out(&mut self) {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return;
        };
        let Some(current) = self.view.take() else {
            return;
        };

        let root = snapshot.tree.root_path();
        self.view = current
            .parent()
            .filter(|parent| parent.starts_with(root) && *parent != root)
            .map(Path::to_path_buf);
        self.selected = Some(current);
    }

    /// Lay out the viewed directory inside `area` and keep the result for
    /// drawing and hit testing.
    fn refresh_tiles(&mut self, area: UiRect) {
        let tiles = match self.view_node() {
            Some((tree, node)) if area.width > 2 && area.height > 2 => {
                let container = Rect::new(0.0, 0.0, f64::from(area.width), f64::from(area.height));
                layout_children(tree, node, container, self.algorithm)
                    .into_iter()
                    .filter_map(|(id, rect)| {
                        let entry = tree.get(id)?;
                        Some(Tile {
                            path: entry.path.clone(),
                            name: entry.name.clone(),
                            size: entry.size,
                            kind: entry.kind,
                            is_pending: entry.is_pending,
                            cell: grid_cells(&rect, area)?,
                        })
                    })
                    .collect()
            }
            _ => Vec::new(),
        };
        self.tiles = tiles;
    }

    fn tile_at(&self, at: Position) -> Option<&Tile> {
        // Later tiles are smaller; prefer them when rounding makes
        // neighbours share a cell.
        self.tiles.iter().rev().find(|tile| tile.cell.contains(at))
    }

    fn sidebar_lines(&self) -> Vec<Line<'static>> {
        let dim = Style::default().fg(Color::Gray);
        let mut lines = Vec::new();

        if let Some((tree, node)) = self.view_node() {
            if let Some(entry) = tree.get(node) {
                lines.push(Line::from(vec![
                    Span::styled("in ", dim),
                    Span::raw(entry.path.display().to_string()),
                ]));
            }
        }

        let selected_tile = self
            .selected
            .as_ref()
            .and_then(|path| self.tiles.iter().find(|tile| &tile.path == path));
        if let Some(tile) = selected_tile {
            lines.push(Line::from(vec![
                Span::styled("> ", Style::default().fg(SELECTED_EDGE)),
                Span::raw(format!(
                    "{} ({}, {})",
                    tile.name,
                    kind_label(tile.kind),
                    format_size(tile.size)
                )),
            ]));
        }
        lines.push(Line::default());

        for row in self.view_children().into_iter().take(LIST_VIEW_ROWS) {
            let highlighted = self.selected.as_ref() == Some(&row.path);
            let style = if highlighted {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            lines.push(Line::styled(
                format!(
                    "{}{:>5.1}% {:>9} {}{}",
                    if row.is_pending { "…" } else { " " },
                    row.percentage,
                    format_size(row.size),
                    row.name,
                    if row.kind == EntryKind::Directory { "/" } else { "" }
                ),
                style,
            ));
        }

        if let Some(finished) = self.finished_at {
            lines.push(Line::default());
            lines.push(Line::styled(
                format!("finished {}s ago", finished.elapsed().as_secs()),
                dim,
            ));
        }
        lines
    }
}

/// Terminal cells covered by a layout rectangle measured from `area`'s
/// corner. Rectangles that round to nothing get no cells.
fn grid_cells(rect: &Rect, area: UiRect) -> Option<UiRect> {
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return None;
    }
    let left = rect.x.round() as u16;
    let top = rect.y.round() as u16;
    let right = (rect.right().round() as u16).min(area.width);
    let bottom = (rect.bottom().round() as u16).min(area.height);
    if right <= left || bottom <= top {
        return None;
    }
    Some(UiRect::new(area.x + left, area.y + top, right - left, bottom - top))
}

fn kind_label(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::File => "file",
        EntryKind::Directory => "directory",
        EntryKind::AtomicUnit => "bundle",
        EntryKind::Unreadable => "unreadable",
    }
}

fn progress_status(snapshot: &ScanSnapshot) -> String {
    format!(
        "Scanning {}  ({} items, {}, {:.1}s)",
        snapshot.current_path.display(),
        snapshot.items_visited,
        format_size(snapshot.tree.total_size()),
        snapshot.elapsed.as_secs_f32(),
    )
}

/// Tile background: hue by kind, brightness by size tier.
fn tile_color(tile: &Tile) -> Color {
    if tile.is_pending {
        return PENDING_FILL;
    }

    let tier = f32::from(classify_tier(tile.size)) / f32::from(MAX_TIER);
    let shade = |base: f32, span: f32| (base + tier * span) as u8;
    match tile.kind {
        EntryKind::Directory => Color::Rgb(shade(35.0, 65.0), shade(95.0, 95.0), shade(145.0, 85.0)),
        EntryKind::AtomicUnit => Color::Rgb(shade(120.0, 100.0), shade(80.0, 50.0), shade(150.0, 80.0)),
        EntryKind::File => Color::Rgb(shade(55.0, 120.0), shade(85.0, 95.0), shade(95.0, 70.0)),
        EntryKind::Unreadable => Color::Rgb(110, 50, 50),
    }
}

struct TreemapWidget<'a> {
    tiles: &'a [Tile],
    selected: Option<&'a PathBuf>,
}

impl Widget for TreemapWidget<'_> {
    fn render(self, area: UiRect, buf: &mut Buffer) {
        buf.set_style(area, Style::default().bg(MAP_BACKGROUND));

        for tile in self.tiles {
            let fill = Style::default().bg(tile_color(tile)).fg(Color::White);
            buf.set_style(tile.cell, fill);
            if tile.cell.width < 2 || tile.cell.height < 2 {
                continue;
            }

            let (border_type, edge) = if self.selected == Some(&tile.path) {
                (BorderType::Thick, SELECTED_EDGE)
            } else {
                (BorderType::Plain, TILE_EDGE)
            };
            let mut outline = Block::bordered()
                .border_type(border_type)
                .border_style(fill.fg(edge));
            // Block truncates titles to the tile width.
            if tile.cell.width >= 6 {
                outline = outline.title(Span::styled(
                    format!("{} {}", tile.name, format_size(tile.size)),
                    fill.add_modifier(Modifier::BOLD),
                ));
            }
            outline.render(tile.cell, buf);
        }
    }
}

fn draw_ui(frame: &mut Frame, app: &mut App) {
    let [body, footer] = Layout::vertical([Constraint::Min(8), Constraint::Length(2)]).areas(frame.area());
    let [map_area, sidebar] = Layout::horizontal([Constraint::Min(30), Constraint::Length(46)]).areas(body);

    draw_treemap(frame, app, map_area);
    draw_sidebar(frame, app, sidebar);
    draw_footer(frame, app, footer);
}

fn draw_treemap(frame: &mut Frame, app: &mut App, area: UiRect) {
    let block = Block::bordered().title(format!(" dirscope: {:?} ", app.algorithm));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    app.refresh_tiles(inner);
    if app.tiles.is_empty() {
        let hint = Paragraph::new("Nothing to show yet. Press / to enter a path, then s to scan.")
            .style(Style::default().fg(Color::Gray));
        frame.render_widget(hint, inner);
    } else {
        let widget = TreemapWidget {
            tiles: &app.tiles,
            selected: app.selected.as_ref(),
        };
        frame.render_widget(widget, inner);
    }
}

fn draw_sidebar(frame: &mut Frame, app: &mut App, area: UiRect) {
    let [path_area, list_area] = Layout::vertical([Constraint::Length(3), Constraint::Min(4)]).areas(area);

    let (title, style) = match app.mode {
        Mode::EditPath => (" Path (Enter to scan) ", Style::default().fg(Color::Yellow)),
        Mode::Browse => (" Path ", Style::default()),
    };
    let path_block = Block::bordered().title(title);
    app.path_area = Some(path_block.inner(path_area));
    frame.render_widget(
        Paragraph::new(app.path_input.as_str()).style(style).block(path_block),
        path_area,
    );

    frame.render_widget(
        Paragraph::new(app.sidebar_lines()).block(Block::bordered().title(" Largest items ")),
        list_area,
    );
}

fn draw_footer(frame: &mut Frame, app: &App, area: UiRect) {
    let status = match (app.session.is_scanning(), app.snapshot.as_ref()) {
        (true, Some(snapshot)) => progress_status(snapshot),
        (true, None) => "Scanning...".to_string(),
        (false, _) => app.status.clone(),
    };
    let keys = "z/Enter zoom  u up  j/k select  / path  s rescan  x cancel  t layout  q quit";
    frame.render_widget(
        Paragraph::new(vec![
            Line::from(status),
            Line::styled(keys, Style::default().fg(Color::DarkGray)),
        ]),
        area,
    );
}

fn run(terminal: &mut DefaultTerminal, mut app: App) -> io::Result<()> {
    while !app.quit {
        app.drain_scan_events();
        terminal.draw(|frame| draw_ui(frame, &mut app))?;

        if !event::poll(TICK)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => app.on_key(key),
            Event::Mouse(mouse) => app.on_mouse(mouse),
            _ => {}
        }
    }
    Ok(())
}

/// Logs go to `DIRSCOPE_LOG_FILE` when set; stderr would draw over the UI.
fn init_logging() {
    let Ok(log_path) = std::env::var("DIRSCOPE_LOG_FILE") else {
        return;
    };
    match std::fs::File::create(&log_path) {
        Ok(file) => env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init(),
        Err(err) => eprintln!("Cannot open log file {}: {}", log_path, err),
    }
}

fn main() -> io::Result<()> {
    init_logging();
    let app = App::new(ScanConfig::load(), std::env::args().nth(1));

    let mut terminal = ratatui::init();
    crossterm::execute!(stdout(), EnableMouseCapture)?;
    let result = run(&mut terminal, app);
    crossterm::execute!(stdout(), DisableMouseCapture)?;
    ratatui::restore();
    result
}
