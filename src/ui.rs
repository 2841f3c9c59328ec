use std::io::{self, Stdout};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;

use crate::api::{Channel, ThreadReport, ThreadSummary};
use crate::config::TimestampMode;
use crate::data::{ChannelService, ReportService, ThreadService};
use crate::session::{
    Browse, ChannelsPane, Command, Event as BrowseEvent, ReportKey, ReportPane, ThreadsPane,
    Ticket,
};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_WARN: Color = Color::Rgb(249, 226, 175);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const TITLE_MAX_CHARS: usize = 120;

const REPORT_PAGE_JUMP: u16 = 10;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pane {
    Channels,
    Threads,
    Report,
}

impl Pane {
    fn title(self) -> &'static str {
        match self {
            Pane::Channels => "Channels",
            Pane::Threads => "Threads",
            Pane::Report => "Report",
        }
    }

    fn next(self) -> Self {
        match self {
            Pane::Channels => Pane::Threads,
            Pane::Threads => Pane::Report,
            Pane::Report => Pane::Report,
        }
    }

    fn previous(self) -> Self {
        match self {
            Pane::Channels => Pane::Channels,
            Pane::Threads => Pane::Channels,
            Pane::Report => Pane::Threads,
        }
    }
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

// Results arriving from the worker threads; the state machine decides
// whether each still applies.
enum AsyncResponse {
    Channels {
        ticket: Ticket,
        result: Result<Vec<Channel>>,
    },
    Threads {
        ticket: Ticket,
        result: Result<Vec<ThreadSummary>>,
    },
    Report {
        ticket: Ticket,
        result: Result<Option<ThreadReport>>,
    },
    Refresh {
        key: ReportKey,
        result: Result<ThreadReport>,
    },
}

pub struct Options {
    pub status_message: String,
    pub channel_service: Arc<dyn ChannelService>,
    pub thread_service: Arc<dyn ThreadService>,
    pub report_service: Arc<dyn ReportService>,
    pub thread_limit: u32,
    // Opened once the channel list arrives; unknown ids fall back to the
    // first listed channel.
    pub bootstrap_channel: Option<String>,
    pub timestamps: TimestampMode,
}

pub struct Model {
    browse: Browse,
    channel_service: Arc<dyn ChannelService>,
    thread_service: Arc<dyn ThreadService>,
    report_service: Arc<dyn ReportService>,
    thread_limit: u32,
    timestamps: TimestampMode,
    focused_pane: Pane,
    channel_cursor: usize,
    thread_cursor: usize,
    channel_offset: usize,
    thread_offset: usize,
    report_scroll: u16,
    last_report_revision: u64,
    status_message: String,
    spinner: Spinner,
    needs_redraw: bool,
    response_tx: Sender<AsyncResponse>,
    response_rx: Receiver<AsyncResponse>,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            browse: Browse::new(options.bootstrap_channel),
            channel_service: options.channel_service,
            thread_service: options.thread_service,
            report_service: options.report_service,
            thread_limit: options.thread_limit,
            timestamps: options.timestamps,
            focused_pane: Pane::Threads,
            channel_cursor: 0,
            thread_cursor: 0,
            channel_offset: 0,
            thread_offset: 0,
            report_scroll: 0,
            last_report_revision: 0,
            status_message: options.status_message,
            spinner: Spinner::new(),
            needs_redraw: true,
            response_tx,
            response_rx,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn start(&mut self) {
        let commands = self.browse.start();
        self.run_commands(commands);
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        self.start();

        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or(Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    TermEvent::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {err}");
                                self.mark_dirty();
                            }
                        }
                    }
                    TermEvent::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            if self.poll_async() {
                self.mark_dirty();
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.browse.loading() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            self.handle_async_response(message);
            changed = true;
        }
        changed
    }

    fn handle_async_response(&mut self, message: AsyncResponse) {
        match message {
            AsyncResponse::Channels { ticket, result } => {
                self.status_message = match &result {
                    Ok(channels) => format!("Loaded {} channels", channels.len()),
                    Err(_) => "Channel list unavailable".to_string(),
                };
                self.dispatch_browse(BrowseEvent::ChannelsLoaded {
                    ticket,
                    result: result.map_err(|err| err.to_string()),
                });
                self.sync_channel_cursor();
            }
            AsyncResponse::Threads { ticket, result } => {
                self.status_message = match &result {
                    Ok(rows) => format!("Loaded {} threads", rows.len()),
                    Err(_) => "Thread list unavailable".to_string(),
                };
                self.dispatch_browse(BrowseEvent::ThreadsLoaded {
                    ticket,
                    result: result.map_err(|err| err.to_string()),
                });
                self.sync_thread_cursor();
            }
            AsyncResponse::Report { ticket, result } => {
                self.status_message = match &result {
                    Ok(Some(_)) => "Report loaded".to_string(),
                    Ok(None) => "No report for this thread yet".to_string(),
                    Err(_) => "Report load failed".to_string(),
                };
                self.dispatch_browse(BrowseEvent::ReportLoaded {
                    ticket,
                    result: result.map_err(|err| err.to_string()),
                });
            }
            AsyncResponse::Refresh { key, result } => {
                // A result for a pair the operator already left is dropped by
                // the state machine; the status strip must not claim it
                // landed either.
                let applies = {
                    let selection = self.browse.selection();
                    selection.channel_id.as_deref() == Some(key.channel_id.as_str())
                        && selection.thread_ts.as_deref() == Some(key.thread_ts.as_str())
                };
                if applies {
                    self.status_message = match &result {
                        Ok(_) => "Report refreshed".to_string(),
                        Err(_) => "Refresh failed".to_string(),
                    };
                }
                self.dispatch_browse(BrowseEvent::RefreshCompleted {
                    key,
                    result: result.map_err(|err| err.to_string()),
                });
            }
        }
        self.mark_dirty();
    }

    fn dispatch_browse(&mut self, event: BrowseEvent) {
        let commands = self.browse.dispatch(event);
        self.run_commands(commands);
        if self.browse.report_revision() != self.last_report_revision {
            self.last_report_revision = self.browse.report_revision();
            self.report_scroll = 0;
        }
        self.mark_dirty();
    }

    fn run_commands(&mut self, commands: Vec<Command>) {
        for command in commands {
            self.run_command(command);
        }
    }

    // Each side effect runs on its own worker thread; results come back over
    // the response channel and are applied by poll_async.
    fn run_command(&mut self, command: Command) {
        match command {
            Command::LoadChannels { ticket } => {
                self.status_message = "Loading channels…".to_string();
                self.spinner.reset();
                let service = self.channel_service.clone();
                let tx = self.response_tx.clone();
                thread::spawn(move || {
                    let result = service.list_channels();
                    let _ = tx.send(AsyncResponse::Channels { ticket, result });
                });
            }
            Command::LoadThreads {
                ticket,
                channel_id,
                autoselect,
            } => {
                if autoselect {
                    self.status_message = format!("Loading threads in {channel_id}…");
                }
                let limit = self.thread_limit;
                let service = self.thread_service.clone();
                let tx = self.response_tx.clone();
                thread::spawn(move || {
                    let result = service.list_threads(&channel_id, limit);
                    let _ = tx.send(AsyncResponse::Threads { ticket, result });
                });
            }
            Command::LoadReport { ticket, key } => {
                self.status_message = "Loading report…".to_string();
                let service = self.report_service.clone();
                let tx = self.response_tx.clone();
                thread::spawn(move || {
                    let result = service.load_report(&key.channel_id, &key.thread_ts);
                    let _ = tx.send(AsyncResponse::Report { ticket, result });
                });
            }
            Command::RefreshReport { key } => {
                self.status_message = format!("Regenerating report for {}…", key.thread_ts);
                self.spinner.reset();
                let service = self.report_service.clone();
                let tx = self.response_tx.clone();
                thread::spawn(move || {
                    let result = service.refresh_report(&key.channel_id, &key.thread_ts);
                    let _ = tx.send(AsyncResponse::Refresh { key, result });
                });
            }
        }
        self.mark_dirty();
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('h') | KeyCode::Left | KeyCode::BackTab => {
                self.focused_pane = self.focused_pane.previous();
                self.mark_dirty();
            }
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
                self.mark_dirty();
            }
            KeyCode::Char('j') | KeyCode::Down => self.move_down(),
            KeyCode::Char('k') | KeyCode::Up => self.move_up(),
            KeyCode::Enter => self.commit_selection(),
            KeyCode::Char('r') => self.reload_threads(),
            KeyCode::Char('g') => self.request_refresh(),
            KeyCode::PageDown => {
                self.report_scroll = self.report_scroll.saturating_add(REPORT_PAGE_JUMP);
                self.mark_dirty();
            }
            KeyCode::PageUp => {
                self.report_scroll = self.report_scroll.saturating_sub(REPORT_PAGE_JUMP);
                self.mark_dirty();
            }
            _ => {}
        }
        Ok(false)
    }

    fn move_down(&mut self) {
        match self.focused_pane {
            Pane::Channels => {
                let len = self.browse.channels().len();
                if len > 0 && self.channel_cursor + 1 < len {
                    self.channel_cursor += 1;
                    self.mark_dirty();
                }
            }
            Pane::Threads => {
                let len = self.browse.threads().len();
                if len > 0 && self.thread_cursor + 1 < len {
                    self.thread_cursor += 1;
                    self.select_thread_at_cursor();
                }
            }
            Pane::Report => {
                self.report_scroll = self.report_scroll.saturating_add(1);
                self.mark_dirty();
            }
        }
    }

    fn move_up(&mut self) {
        match self.focused_pane {
            Pane::Channels => {
                if self.channel_cursor > 0 {
                    self.channel_cursor -= 1;
                    self.mark_dirty();
                }
            }
            Pane::Threads => {
                if self.thread_cursor > 0 {
                    self.thread_cursor -= 1;
                    self.select_thread_at_cursor();
                }
            }
            Pane::Report => {
                self.report_scroll = self.report_scroll.saturating_sub(1);
                self.mark_dirty();
            }
        }
    }

    fn commit_selection(&mut self) {
        match self.focused_pane {
            Pane::Channels => {
                let target = self
                    .browse
                    .channels()
                    .get(self.channel_cursor)
                    .map(|ch| ch.channel_id.clone());
                let Some(channel_id) = target else { return };
                if self.browse.selection().channel_id.as_deref() == Some(channel_id.as_str()) {
                    self.status_message =
                        format!("{channel_id} is already open. Press r to reload its threads.");
                    self.mark_dirty();
                    return;
                }
                self.dispatch_browse(BrowseEvent::ChannelSelected(channel_id));
            }
            // Re-selecting the focused row reloads its report.
            Pane::Threads => self.select_thread_at_cursor(),
            Pane::Report => {}
        }
    }

    fn select_thread_at_cursor(&mut self) {
        let target = self
            .browse
            .threads()
            .get(self.thread_cursor)
            .map(|row| row.thread_ts.clone());
        if let Some(thread_ts) = target {
            self.dispatch_browse(BrowseEvent::ThreadSelected(thread_ts));
        }
    }

    fn reload_threads(&mut self) {
        if self.browse.selection().channel_id.is_none() {
            return;
        }
        self.status_message = "Reloading thread list…".to_string();
        self.dispatch_browse(BrowseEvent::ReloadThreads);
    }

    fn request_refresh(&mut self) {
        self.dispatch_browse(BrowseEvent::RefreshRequested);
    }

    // Called when the channel list lands so the bootstrap choice is
    // highlighted.
    fn sync_channel_cursor(&mut self) {
        if let Some(channel_id) = self.browse.selection().channel_id.as_deref() {
            if let Some(index) = self
                .browse
                .channels()
                .iter()
                .position(|ch| ch.channel_id == channel_id)
            {
                self.channel_cursor = index;
                return;
            }
        }
        self.channel_cursor = self
            .channel_cursor
            .min(self.browse.channels().len().saturating_sub(1));
    }

    // After a reload the selected thread keeps the highlight even when its
    // position in the list moved.
    fn sync_thread_cursor(&mut self) {
        if let Some(thread_ts) = self.browse.selection().thread_ts.as_deref() {
            if let Some(index) = self
                .browse
                .threads()
                .iter()
                .position(|row| row.thread_ts == thread_ts)
            {
                self.thread_cursor = index;
                return;
            }
        }
        self.thread_cursor = self
            .thread_cursor
            .min(self.browse.threads().len().saturating_sub(1));
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let error_rows = if self.browse.error().is_some() { 1 } else { 0 };
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(error_rows),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let status_text = if self.browse.loading() {
            format!("{} {}", self.spinner.frame(), self.status_message)
                .trim()
                .to_string()
        } else {
            self.status_message.clone()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        if let Some(message) = self.browse.error() {
            let banner = Paragraph::new(format!("error: {message}")).style(
                Style::default()
                    .fg(COLOR_ERROR)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::BOLD),
            );
            frame.render_widget(banner, layout[1]);
        }

        let main_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(22),
                Constraint::Percentage(38),
                Constraint::Percentage(40),
            ])
            .split(layout[2]);

        self.draw_channels(frame, main_chunks[0]);
        self.draw_threads(frame, main_chunks[1]);
        self.draw_report(frame, main_chunks[2]);

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(footer, layout[3]);
    }

    fn pane_block(&self, pane: Pane) -> Block<'static> {
        let focused = self.focused_pane == pane;
        let border_style = if focused {
            Style::default().fg(COLOR_BORDER_FOCUSED)
        } else {
            Style::default().fg(COLOR_BORDER_IDLE)
        };
        let title_style = if focused {
            Style::default()
                .fg(COLOR_ACCENT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_TEXT_SECONDARY)
        };
        Block::default()
            .title(Span::styled(pane.title(), title_style))
            .borders(Borders::ALL)
            .border_style(border_style)
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::uniform(1))
    }

    fn placeholder(&self, frame: &mut Frame<'_>, area: Rect, text: &str) {
        let paragraph = Paragraph::new(text.to_string())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .add_modifier(Modifier::ITALIC),
            )
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn draw_channels(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let block = self.pane_block(Pane::Channels);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height == 0 {
            return;
        }

        match self.browse.channels_pane() {
            ChannelsPane::Loading => {
                self.placeholder(frame, inner, "Loading channels…");
                return;
            }
            ChannelsPane::Failed => {
                self.placeholder(frame, inner, "Channel list unavailable.");
                return;
            }
            ChannelsPane::Empty => {
                self.placeholder(
                    frame,
                    inner,
                    "No active channels. Activate a channel in the admin backend, then restart.",
                );
                return;
            }
            ChannelsPane::Ready => {}
        }

        let focused = self.focused_pane == Pane::Channels;
        let active_id = self.browse.selection().channel_id.clone();
        let rows = inner.height as usize;
        self.channel_cursor = self
            .channel_cursor
            .min(self.browse.channels().len().saturating_sub(1));
        self.channel_offset = list_scroll(self.channel_offset, self.channel_cursor, rows);

        let mut lines: Vec<Line<'static>> = Vec::new();
        for (index, channel) in self
            .browse
            .channels()
            .iter()
            .enumerate()
            .skip(self.channel_offset)
            .take(rows)
        {
            let is_active = active_id.as_deref() == Some(channel.channel_id.as_str());
            let is_cursor = index == self.channel_cursor;
            let mut style = if is_active {
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_TEXT_PRIMARY)
            };
            if is_cursor && focused {
                style = style.bg(COLOR_PANEL_SELECTED_BG);
            }
            let label = truncate_chars(&channel.label(), inner.width as usize);
            let mut line = Line::from(Span::styled(label, style));
            if is_cursor && focused {
                pad_lines_to_width(std::slice::from_mut(&mut line), inner.width);
            }
            lines.push(line);
        }
        frame.render_widget(Paragraph::new(Text::from(lines)), inner);
    }

    fn draw_threads(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let block = self.pane_block(Pane::Threads);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height == 0 {
            return;
        }

        match self.browse.threads_pane() {
            ThreadsPane::Idle => {
                self.placeholder(frame, inner, "No channel selected.");
                return;
            }
            ThreadsPane::Failed => {
                self.placeholder(frame, inner, "Failed to load threads.");
                return;
            }
            ThreadsPane::Loading if self.browse.threads().is_empty() => {
                self.placeholder(frame, inner, "Loading threads…");
                return;
            }
            ThreadsPane::Loading | ThreadsPane::Ready => {}
        }
        if self.browse.threads().is_empty() {
            self.placeholder(
                frame,
                inner,
                "No threads in this channel yet. Ingest messages or wait for the next digest run.",
            );
            return;
        }

        let focused = self.focused_pane == Pane::Threads;
        let selected_ts = self.browse.selection().thread_ts.clone();
        // Two lines per row: title + metadata.
        let rows = (inner.height as usize / 2).max(1);
        self.thread_cursor = self
            .thread_cursor
            .min(self.browse.threads().len().saturating_sub(1));
        self.thread_offset = list_scroll(self.thread_offset, self.thread_cursor, rows);

        let mut lines: Vec<Line<'static>> = Vec::new();
        if self.browse.threads_pane() == ThreadsPane::Loading {
            lines.push(Line::from(Span::styled(
                format!("{} refreshing list…", self.spinner.frame()),
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .add_modifier(Modifier::ITALIC),
            )));
        }
        for (index, row) in self
            .browse
            .threads()
            .iter()
            .enumerate()
            .skip(self.thread_offset)
            .take(rows)
        {
            let is_selected = selected_ts.as_deref() == Some(row.thread_ts.as_str());
            let is_cursor = index == self.thread_cursor;
            let row_bg = if is_cursor && focused {
                Some(COLOR_PANEL_SELECTED_BG)
            } else {
                None
            };

            let mut title_style = if is_selected {
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_TEXT_PRIMARY)
            };
            let mut meta_style = Style::default().fg(COLOR_TEXT_SECONDARY);
            if let Some(bg) = row_bg {
                title_style = title_style.bg(bg);
                meta_style = meta_style.bg(bg);
            }

            let title = truncate_chars(row.display_title(), TITLE_MAX_CHARS);
            let title = truncate_chars(&title, inner.width as usize);
            let mut title_line = Line::from(Span::styled(title, title_style));

            let report_mark = if row.has_report { "report ✓" } else { "report ✗" };
            let meta = format!(
                "  replies {} · {} · {}",
                row.reply_count,
                format_timestamp(&row.updated_at, self.timestamps),
                report_mark
            );
            let meta = truncate_chars(&meta, inner.width as usize);
            let mut meta_line = Line::from(Span::styled(meta, meta_style));

            if row_bg.is_some() {
                pad_lines_to_width(std::slice::from_mut(&mut title_line), inner.width);
                pad_lines_to_width(std::slice::from_mut(&mut meta_line), inner.width);
            }
            lines.push(title_line);
            lines.push(meta_line);
        }
        frame.render_widget(Paragraph::new(Text::from(lines)), inner);
    }

    fn draw_report(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let block = self.pane_block(Pane::Report);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height == 0 {
            return;
        }

        let lines = match self.browse.report_pane() {
            ReportPane::Idle => {
                let text = if self.browse.channels_pane() == ChannelsPane::Empty {
                    "Nothing to display."
                } else {
                    "Select a thread to view its report."
                };
                self.placeholder(frame, inner, text);
                return;
            }
            ReportPane::Loading => {
                self.placeholder(frame, inner, "Loading report…");
                return;
            }
            ReportPane::Missing => {
                self.placeholder(
                    frame,
                    inner,
                    "No report for this thread yet. Press g to generate one.",
                );
                return;
            }
            ReportPane::Failed => {
                self.placeholder(frame, inner, "Failed to load report.");
                return;
            }
            ReportPane::Ready(report) => report_lines(
                report,
                self.browse.report_status().stale,
                self.timestamps,
                inner.width as usize,
            ),
        };

        let max_scroll = (lines.len() as u16).saturating_sub(inner.height);
        self.report_scroll = self.report_scroll.min(max_scroll);
        let paragraph = Paragraph::new(Text::from(lines))
            .style(Style::default().fg(COLOR_TEXT_PRIMARY))
            .scroll((self.report_scroll, 0))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, inner);
    }

    fn footer_text(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        match self.focused_pane {
            Pane::Channels => parts.push("Channels: j/k move · Enter open".to_string()),
            Pane::Threads => {
                if self.browse.threads().is_empty() {
                    parts.push("Threads: waiting for list…".to_string());
                } else {
                    parts.push("Threads: j/k select · Enter reload row".to_string());
                }
            }
            Pane::Report => parts.push("Report: j/k scroll · PageUp/PageDown faster".to_string()),
        }

        parts.push(self.browse.status_badge().to_string());
        parts.push(format!("g {}", self.browse.refresh_label()));
        parts.push("r reload threads".to_string());
        parts.push("h/l panes".to_string());
        parts.push("q quit".to_string());

        parts.join(" · ")
    }
}

fn report_lines(
    report: &ThreadReport,
    stale: bool,
    mode: TimestampMode,
    width: usize,
) -> Vec<Line<'static>> {
    let secondary = Style::default().fg(COLOR_TEXT_SECONDARY);
    let heading = Style::default()
        .fg(COLOR_ACCENT)
        .add_modifier(Modifier::BOLD);
    let body = Style::default().fg(COLOR_TEXT_PRIMARY);

    let mut lines: Vec<Line<'static>> = Vec::new();

    let model = if report.model.trim().is_empty() {
        "-"
    } else {
        report.model.trim()
    };
    let source_ts = if report.source_latest_ts.trim().is_empty() {
        "-"
    } else {
        report.source_latest_ts.trim()
    };
    let (badge, badge_color) = if stale {
        ("stale, refresh recommended", COLOR_WARN)
    } else {
        ("up to date", COLOR_SUCCESS)
    };
    lines.push(Line::from(vec![
        Span::styled(
            format!(
                "model {model} · source ts {source_ts} · updated {} · ",
                format_timestamp(&report.updated_at, mode)
            ),
            secondary,
        ),
        Span::styled(badge.to_string(), Style::default().fg(badge_color)),
    ]));
    lines.push(Line::from(Span::styled(String::new(), body)));

    lines.push(Line::from(Span::styled("Topic", heading)));
    let topic = report
        .report_json
        .topic
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if topic.is_empty() {
        lines.push(Line::from(Span::styled("(no data)", secondary)));
    } else {
        lines.extend(wrap_plain(topic, width, body));
    }
    lines.push(Line::from(Span::styled(String::new(), body)));

    lines.push(Line::from(Span::styled("Participants & roles", heading)));
    if report.report_json.participants_roles.is_empty() {
        lines.push(Line::from(Span::styled("(no data)", secondary)));
    } else {
        for participant in &report.report_json.participants_roles {
            let mut entry = format!("{} – {}", participant.name.trim(), participant.role.trim());
            if !participant.evidence.is_empty() {
                entry.push_str(&format!(" (evidence: {})", participant.evidence.join("; ")));
            }
            lines.extend(wrap_with_prefixes(&entry, width, "• ", "  ", body));
        }
    }
    lines.push(Line::from(Span::styled(String::new(), body)));

    lines.push(Line::from(Span::styled("Daily timeline", heading)));
    if report.report_json.timeline_daily.is_empty() {
        lines.push(Line::from(Span::styled("(no data)", secondary)));
    } else {
        for day in &report.report_json.timeline_daily {
            lines.push(Line::from(Span::styled(
                day.date_kst.clone(),
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .add_modifier(Modifier::BOLD),
            )));
            for (label, items) in [
                ("progress", &day.progress),
                ("decisions", &day.decisions),
                ("open questions", &day.open_questions),
            ] {
                if items.is_empty() {
                    continue;
                }
                let entry = format!("{label}: {}", items.join("; "));
                lines.extend(wrap_with_prefixes(&entry, width, "  ", "    ", body));
            }
        }
    }

    lines
}

// The backend emits naive ISO datetimes (UTC without an offset); anything
// unparseable is shown as-is.
fn format_timestamp(raw: &str, mode: TimestampMode) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return "-".to_string();
    }

    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| Utc.from_utc_datetime(&naive))
        });
    let Ok(utc) = parsed else {
        return raw.to_string();
    };

    match mode {
        TimestampMode::Kst => format!(
            "{} KST",
            utc.with_timezone(&kst_offset()).format("%Y-%m-%d %H:%M")
        ),
        TimestampMode::Local => utc
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        TimestampMode::Utc => format!("{} UTC", utc.format("%Y-%m-%d %H:%M")),
    }
}

fn kst_offset() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("KST offset is in range")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

// Scrolls a list window just far enough to keep the cursor visible.
fn list_scroll(offset: usize, cursor: usize, rows: usize) -> usize {
    if rows == 0 {
        return 0;
    }
    if cursor < offset {
        cursor
    } else if cursor >= offset + rows {
        cursor + 1 - rows
    } else {
        offset
    }
}

fn wrap_with_prefixes(
    text: &str,
    width: usize,
    first_prefix: &str,
    rest_prefix: &str,
    style: Style,
) -> Vec<Line<'static>> {
    if text.trim().is_empty() {
        return vec![Line::from(Span::styled(String::new(), style))];
    }

    if width == 0 {
        let mut line = String::with_capacity(first_prefix.len() + text.len());
        line.push_str(first_prefix);
        line.push_str(text);
        return vec![Line::from(Span::styled(line, style))];
    }

    let min_width = first_prefix
        .chars()
        .count()
        .max(rest_prefix.chars().count())
        .saturating_add(1);
    let wrap_width = width.max(min_width);
    let options = WrapOptions::new(wrap_width)
        .break_words(false)
        .initial_indent(first_prefix)
        .subsequent_indent(rest_prefix);

    wrap(text, options)
        .into_iter()
        .map(|cow| Line::from(Span::styled(cow.into_owned(), style)))
        .collect()
}

fn wrap_plain(text: &str, width: usize, style: Style) -> Vec<Line<'static>> {
    wrap_with_prefixes(text, width, "", "", style)
}

fn pad_lines_to_width(lines: &mut [Line<'static>], width: u16) {
    let width = width as usize;
    if width == 0 {
        return;
    }

    for line in lines {
        let mut current_width = 0usize;
        for span in &line.spans {
            current_width =
                current_width.saturating_add(UnicodeWidthStr::width(span.content.as_ref()));
        }
        if current_width >= width {
            continue;
        }
        let pad_style = line.spans.last().map(|span| span.style).unwrap_or_default();
        let padding = " ".repeat(width - current_width);
        line.spans.push(Span::styled(padding, pad_style));
    }
}
