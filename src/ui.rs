use anyhow::Result;
use chrono::{Duration, Months, NaiveDate, Utc};
use crossterm::{
    event::{self, Event as TermEvent, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use people_dates::{
    filter_by_date_range, filter_by_date_range_and_key, save_changes, sorted_by_date_ascending,
    Birthday, DateRange, Event, Person, SaveSummary, TrackedSet, TrackingStatus,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rusqlite::Connection;
use std::io;
use tracing::{error, info};

const PAGE_STEP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    People,
    Birthdays,
    Events,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::People => Page::Birthdays,
            Page::Birthdays => Page::Events,
            Page::Events => Page::People,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::People => Page::Events,
            Page::Birthdays => Page::People,
            Page::Events => Page::Birthdays,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::People => "People",
            Page::Birthdays => "Birthdays",
            Page::Events => "Events",
        }
    }
}

/// One step of the birth date picker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStep {
    Days(i64),
    Months(i32),
}

impl DateStep {
    fn apply(&self, date: NaiveDate) -> Option<NaiveDate> {
        match *self {
            DateStep::Days(n) => date.checked_add_signed(Duration::days(n)),
            DateStep::Months(n) if n >= 0 => date.checked_add_months(Months::new(n as u32)),
            DateStep::Months(n) => date.checked_sub_months(Months::new(n.unsigned_abs())),
        }
    }
}

/// Modal text panel, closed by any key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBox {
    pub title: String,
    pub body: String,
}

/// What the event loop must do after a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Save,
    Quit,
}

pub struct App {
    /// Working copy of the people table with change tracking
    pub people: TrackedSet<Person>,
    /// Grid rows: positions in `people` that are not deleted
    pub rows: Vec<usize>,
    pub state: TableState,
    pub birthdays: Vec<Birthday>,
    pub events: Vec<Event>,
    pub birthdays_state: TableState,
    pub events_state: TableState,
    pub range: DateRange,
    pub event_id: i32,
    pub current_page: Page,
    pub message: Option<MessageBox>,
    pub status_line: String,
    quit_armed: bool,
}

impl App {
    /// Birthdays and events are filtered to `range` (events also on `event_id`)
    /// and shown oldest first.
    pub fn new(
        people: TrackedSet<Person>,
        all_birthdays: &[Birthday],
        all_events: &[Event],
        range: DateRange,
        event_id: i32,
    ) -> Result<Self> {
        let birthdays = sorted_by_date_ascending(&filter_by_date_range(all_birthdays, range.start, range.end)?);
        let events = sorted_by_date_ascending(&filter_by_date_range_and_key(
            all_events,
            range.start,
            range.end,
            event_id,
        )?);

        let mut app = Self {
            people,
            rows: Vec::new(),
            state: TableState::default(),
            birthdays,
            events,
            birthdays_state: TableState::default(),
            events_state: TableState::default(),
            range,
            event_id,
            current_page: Page::People,
            message: None,
            status_line: String::new(),
            quit_armed: false,
        };
        app.refresh_rows();
        if !app.birthdays.is_empty() {
            app.birthdays_state.select(Some(0));
        }
        if !app.events.is_empty() {
            app.events_state.select(Some(0));
        }

        Ok(app)
    }

    /// Rebuild grid rows after the set changed shape, keeping the cursor in range
    pub fn refresh_rows(&mut self) {
        self.rows = self.people.visible();

        let selected = match self.state.selected() {
            _ if self.rows.is_empty() => None,
            Some(i) if i >= self.rows.len() => Some(self.rows.len() - 1),
            Some(i) => Some(i),
            None => Some(0),
        };
        self.state.select(selected);
    }

    /// Position in `people` of the current grid row
    pub fn selected_index(&self) -> Option<usize> {
        self.state.selected().and_then(|i| self.rows.get(i)).copied()
    }

    pub fn current_person(&self) -> Option<&Person> {
        self.selected_index().and_then(|i| self.people.get(i))
    }

    // ========================================================================
    // NAVIGATION
    // ========================================================================

    fn active_state(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::People => (&mut self.state, self.rows.len()),
            Page::Birthdays => (&mut self.birthdays_state, self.birthdays.len()),
            Page::Events => (&mut self.events_state, self.events.len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.active_state();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.active_state();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) => len - 1,
            Some(i) => i - 1,
            None => 0,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let (state, len) = self.active_state();
        if len == 0 {
            return;
        }
        let i = state.selected().map_or(0, |i| (i + PAGE_STEP).min(len - 1));
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let (state, len) = self.active_state();
        if len == 0 {
            return;
        }
        let i = state.selected().map_or(0, |i| i.saturating_sub(PAGE_STEP));
        state.select(Some(i));
    }

    pub fn first(&mut self) {
        let (state, len) = self.active_state();
        if len > 0 {
            state.select(Some(0));
        }
    }

    pub fn last(&mut self) {
        let (state, len) = self.active_state();
        if len > 0 {
            state.select(Some(len - 1));
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    // ========================================================================
    // EDITING
    // ========================================================================

    /// Move the current person's birth date. A missing date starts from today.
    pub fn shift_birth_date(&mut self, step: DateStep) {
        let Some(index) = self.selected_index() else {
            return;
        };
        let Some(person) = self.people.get(index) else {
            return;
        };

        let base = person.birth_date.unwrap_or_else(|| Utc::now().date_naive());
        let Some(new_date) = step.apply(base) else {
            return;
        };

        match self.people.update(index, |p| p.birth_date = Some(new_date)) {
            Ok(status) => {
                info!(index, date = %new_date, status = %status, "birth date edited");
                self.status_line = format!("Birth date set to {}", new_date.format("%Y-%m-%d"));
            }
            Err(err) => self.status_line = err.to_string(),
        }
    }

    /// Mark the current person for removal
    pub fn delete_current(&mut self) {
        let Some(index) = self.selected_index() else {
            return;
        };

        match self.people.remove(index) {
            Ok(()) => {
                info!(index, "person marked for deletion");
                self.status_line = "Marked for deletion".to_string();
                self.refresh_rows();
            }
            Err(err) => self.status_line = err.to_string(),
        }
    }

    pub fn show_current_person(&mut self) {
        let Some(body) = self.current_person().map(Person::display_card) else {
            return;
        };

        self.message = Some(MessageBox {
            title: "Current person".to_string(),
            body,
        });
    }

    pub fn show_changes(&mut self) {
        let changes = self.people.summarize();
        let body = if changes.trim().is_empty() {
            "No changes detected".to_string()
        } else {
            changes
        };

        self.message = Some(MessageBox {
            title: "Changes".to_string(),
            body,
        });
    }

    pub fn saved(&mut self, summary: SaveSummary) {
        self.status_line = format!(
            "Saved: {} added, {} modified, {} deleted",
            summary.added, summary.modified, summary.deleted
        );
        self.quit_armed = false;
        self.refresh_rows();
    }

    pub fn save_failed(&mut self, err: &anyhow::Error) {
        self.status_line = format!("Save failed: {}", err);
    }

    // ========================================================================
    // KEYS
    // ========================================================================

    pub fn handle_key(&mut self, code: KeyCode) -> Action {
        if self.message.is_some() {
            self.message = None;
            return Action::None;
        }

        let quit_requested = matches!(code, KeyCode::Char('q') | KeyCode::Esc);
        if !quit_requested {
            self.quit_armed = false;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                if self.people.has_changes() && !self.quit_armed {
                    self.quit_armed = true;
                    self.status_line = "Unsaved changes: w saves, q again quits".to_string();
                    return Action::None;
                }
                return Action::Quit;
            }
            KeyCode::Tab => self.next_page(),
            KeyCode::BackTab => self.previous_page(),
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.previous(),
            KeyCode::PageDown => self.page_down(),
            KeyCode::PageUp => self.page_up(),
            KeyCode::Home => self.first(),
            KeyCode::End => self.last(),
            KeyCode::Char('s') => self.show_changes(),
            KeyCode::Char('w') => return Action::Save,
            _ if self.current_page != Page::People => {}
            KeyCode::Char('+') | KeyCode::Char('=') => self.shift_birth_date(DateStep::Days(1)),
            KeyCode::Char('-') => self.shift_birth_date(DateStep::Days(-1)),
            KeyCode::Char(']') => self.shift_birth_date(DateStep::Months(1)),
            KeyCode::Char('[') => self.shift_birth_date(DateStep::Months(-1)),
            KeyCode::Char('}') => self.shift_birth_date(DateStep::Months(12)),
            KeyCode::Char('{') => self.shift_birth_date(DateStep::Months(-12)),
            KeyCode::Char('p') | KeyCode::Enter => self.show_current_person(),
            KeyCode::Char('d') | KeyCode::Delete => self.delete_current(),
            _ => {}
        }

        Action::None
    }
}

pub fn run_ui(app: &mut App, conn: &mut Connection) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app, conn);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    conn: &mut Connection,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let TermEvent::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match app.handle_key(key.code) {
                Action::Quit => return Ok(()),
                Action::Save => match save_changes(conn, &mut app.people) {
                    Ok(summary) => app.saved(summary),
                    Err(err) => {
                        error!(error = %err, "save failed");
                        app.save_failed(&err);
                    }
                },
                Action::None => {}
            }
        }
    }
}

// ============================================================================
// RENDERING
// ============================================================================

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::People => {
            let content_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Percentage(70), // Grid
                    Constraint::Percentage(30), // Date picker
                ])
                .split(chunks[1]);

            render_people(f, content_chunks[0], app);
            render_date_picker(f, content_chunks[1], app);
        }
        Page::Birthdays => render_birthdays(f, chunks[1], app),
        Page::Events => render_events(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);

    if let Some(message) = &app.message {
        render_message(f, message);
    }
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn titled_block(title: String) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(title)
}

fn highlight() -> Style {
    Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD)
}

fn status_color(status: TrackingStatus) -> Color {
    match status {
        TrackingStatus::Unchanged => Color::White,
        TrackingStatus::Added => Color::Green,
        TrackingStatus::Modified => Color::Yellow,
        TrackingStatus::Deleted => Color::Red,
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::People, Page::Birthdays, Page::Events];

    let mut tab_spans = vec![];
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("People: {}", app.rows.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Pending: {}", app.people.pending().len()),
        Style::default().fg(Color::Yellow),
    ));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!(
            "Range: {} .. {}",
            app.range.start.format("%Y-%m-%d"),
            app.range.end.format("%Y-%m-%d")
        ),
        Style::default().fg(Color::Cyan),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_people(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .rows
        .iter()
        .filter_map(|&i| app.people.entries().get(i))
        .map(|entry| {
            let person = &entry.value;
            let color = status_color(entry.status);

            Row::new(vec![
                Cell::from(person.id.to_string()),
                Cell::from(truncate(&person.first_name, 20)),
                Cell::from(truncate(&person.last_name, 20)),
                Cell::from(format_date(person.birth_date)),
                Cell::from(entry.status.as_str()).style(Style::default().fg(color)),
            ])
            .height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(22),
            Constraint::Length(22),
            Constraint::Length(12),
            Constraint::Length(10),
        ],
    )
    .header(header_row(&["Id", "First name", "Last name", "Birth date", "Status"]))
    .block(titled_block(" People ".to_string()))
    .highlight_style(highlight())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_date_picker(f: &mut Frame, area: Rect, app: &App) {
    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let key = Style::default().fg(Color::Yellow);

    let content = match app.current_person() {
        Some(person) => vec![
            Line::from(""),
            Line::from(vec![
                Span::styled("  Name: ", label),
                Span::raw(format!("{} {}", person.first_name, person.last_name)),
            ]),
            Line::from(""),
            Line::from(vec![
                Span::styled("  Birth date: ", label),
                Span::styled(
                    format_date(person.birth_date),
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(""),
            Line::from("  ─────────────────────────"),
            Line::from(vec![Span::styled("  + / -", key), Span::raw("  day")]),
            Line::from(vec![Span::styled("  ] / [", key), Span::raw("  month")]),
            Line::from(vec![Span::styled("  } / {", key), Span::raw("  year")]),
        ],
        None => vec![Line::from("  No person selected")],
    };

    let picker = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Birth date "),
    );

    f.render_widget(picker, area);
}

fn render_birthdays(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .birthdays
        .iter()
        .map(|b| {
            Row::new(vec![
                Cell::from(b.id.to_string()),
                Cell::from(truncate(&b.first_name, 20)),
                Cell::from(truncate(&b.last_name, 20)),
                Cell::from(b.birth_date.format("%Y-%m-%d").to_string()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(22),
            Constraint::Length(22),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&["Id", "First name", "Last name", "Birth date"]))
    .block(titled_block(format!(" Birthdays ({}) ", app.birthdays.len())))
    .highlight_style(highlight())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.birthdays_state);
}

fn render_events(f: &mut Frame, area: Rect, app: &mut App) {
    let rows: Vec<Row> = app
        .events
        .iter()
        .map(|e| {
            Row::new(vec![
                Cell::from(e.id.to_string()),
                Cell::from(e.event_id.to_string()),
                Cell::from(e.start_date.format("%Y-%m-%d").to_string()),
                Cell::from(truncate(&e.description, 40)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(9),
            Constraint::Length(12),
            Constraint::Length(42),
        ],
    )
    .header(header_row(&["Id", "Event id", "Start", "Description"]))
    .block(titled_block(format!(
        " Events #{} ({}) ",
        app.event_id,
        app.events.len()
    )))
    .highlight_style(highlight())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.events_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let key = Style::default().fg(Color::Yellow);

    let (selected, total) = match app.current_page {
        Page::People => (app.state.selected(), app.rows.len()),
        Page::Birthdays => (app.birthdays_state.selected(), app.birthdays.len()),
        Page::Events => (app.events_state.selected(), app.events.len()),
    };

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected.map(|i| i + 1).unwrap_or(0), total),
        Style::default().fg(Color::Cyan),
    )];

    if !app.status_line.is_empty() {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(
            app.status_line.clone(),
            Style::default().fg(Color::Green),
        ));
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("p", key));
    status_spans.push(Span::raw(" Current | "));
    status_spans.push(Span::styled("s", key));
    status_spans.push(Span::raw(" Changes | "));
    status_spans.push(Span::styled("d", key));
    status_spans.push(Span::raw(" Delete | "));
    status_spans.push(Span::styled("w", key));
    status_spans.push(Span::raw(" Save | "));
    status_spans.push(Span::styled("Tab", key));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_message(f: &mut Frame, message: &MessageBox) {
    let area = centered_rect(50, 40, f.size());

    let mut lines: Vec<Line> = vec![Line::from("")];
    lines.extend(message.body.lines().map(|l| Line::from(format!("  {}", l))));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  Press any key to close",
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )));

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(format!(" {} ", message.title)),
    );

    f.render_widget(Clear, area);
    f.render_widget(panel, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
