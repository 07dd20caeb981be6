use std::collections::HashMap;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use image::imageops::FilterType;
use image::Rgba;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};
use ratatui::{Frame, Terminal};
use tracing::debug;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::data::Thumbnail;
use crate::hooks::{HookSlot, Hooks};
use crate::span::{AttrKey, SpanId};
use crate::surface::Surface;
use crate::timeline::Timeline;

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_CURSOR_BG: Color = Color::Rgb(45, 46, 64);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);

const PREVIEW_COLS: usize = 24;
const HELP_TEXT: &str =
    "n/p move  tab fold  f fav  b boost  m bookmark  g refresh  u mark  q quit";

pub struct Options {
    pub timeline: Timeline,
    pub hooks: Hooks,
    pub status_message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RowMap {
    cells: Vec<usize>,
    end: usize,
}

#[derive(Default)]
struct Screen {
    lines: Vec<Line<'static>>,
    rows: Vec<RowMap>,
    cursor_row: usize,
}

pub struct Model {
    timeline: Timeline,
    hooks: Hooks,
    bindings: HashMap<KeyCode, HookSlot>,
    status_message: String,
    scroll: usize,
    content_area: Rect,
    rows: Vec<RowMap>,
    follow_cursor: bool,
    needs_redraw: bool,
}

fn default_bindings() -> HashMap<KeyCode, HookSlot> {
    let mut bindings = HashMap::new();
    for key in [KeyCode::Char('n'), KeyCode::Char('j'), KeyCode::Down] {
        bindings.insert(key, HookSlot::NavigateNext);
    }
    for key in [KeyCode::Char('p'), KeyCode::Char('k'), KeyCode::Up] {
        bindings.insert(key, HookSlot::NavigatePrev);
    }
    for key in [KeyCode::Tab, KeyCode::Enter] {
        bindings.insert(key, HookSlot::ToggleFold);
    }
    bindings.insert(KeyCode::Char('f'), HookSlot::ToggleFavourite);
    bindings.insert(KeyCode::Char('b'), HookSlot::ToggleBoost);
    bindings.insert(KeyCode::Char('m'), HookSlot::ToggleBookmark);
    bindings.insert(KeyCode::Char('g'), HookSlot::Refresh);
    bindings.insert(KeyCode::Char('u'), HookSlot::MarkUpdate);
    bindings
}

impl Model {
    pub fn new(opts: Options) -> Self {
        Self {
            timeline: opts.timeline,
            hooks: opts.hooks,
            bindings: default_bindings(),
            status_message: opts.status_message,
            scroll: 0,
            content_area: Rect::default(),
            rows: Vec::new(),
            follow_cursor: true,
            needs_redraw: true,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            if event::poll(tick_rate)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {}", err);
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => {
                        if let Err(err) = self.handle_mouse(mouse) {
                            self.status_message = format!("Error: {}", err);
                            self.mark_dirty();
                        }
                    }
                    Event::Resize(width, _) => {
                        self.timeline.set_width(width as usize);
                        self.mark_dirty();
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = self.timeline.poll_async();
        while let Some(notice) = self.timeline.take_notice() {
            self.status_message = notice;
            changed = true;
        }
        changed
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::PageDown => self.scroll_by(self.page_rows() as isize),
            KeyCode::PageUp => self.scroll_by(-(self.page_rows() as isize)),
            other => {
                let Some(slot) = self.bindings.get(&other).copied() else {
                    return Ok(false);
                };
                self.status_message.clear();
                debug!(slot = slot.name(), "dispatching key");
                if !self.hooks.dispatch(slot, &mut self.timeline) {
                    self.status_message = format!("Nothing bound to {}.", slot.name());
                }
                self.follow_cursor = true;
            }
        }
        self.mark_dirty();
        Ok(false)
    }

    fn handle_mouse(&mut self, event: MouseEvent) -> Result<()> {
        match event.kind {
            MouseEventKind::ScrollDown => self.scroll_by(3),
            MouseEventKind::ScrollUp => self.scroll_by(-3),
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some(pos) = self.position_at(event.column, event.row) {
                    if self.timeline.click(pos) {
                        self.status_message.clear();
                    }
                }
            }
            _ => return Ok(()),
        }
        self.mark_dirty();
        Ok(())
    }

    fn position_at(&self, column: u16, row: u16) -> Option<usize> {
        let area = self.content_area;
        if column < area.x
            || row < area.y
            || column >= area.x + area.width
            || row >= area.y + area.height
        {
            return None;
        }
        let index = self.scroll + (row - area.y) as usize;
        let map = self.rows.get(index)?;
        let col = (column - area.x) as usize;
        Some(map.cells.get(col).copied().unwrap_or(map.end))
    }

    fn page_rows(&self) -> usize {
        (self.content_area.height as usize).max(1)
    }

    fn scroll_by(&mut self, delta: isize) {
        let max = self.rows.len().saturating_sub(1);
        self.scroll = self.scroll.saturating_add_signed(delta).min(max);
        self.follow_cursor = false;
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let header = match self.timeline.current_record() {
            Some(record) => format!(" alt-timeline  {}", record.shown().account.display()),
            None => " alt-timeline".to_string(),
        };
        frame.render_widget(
            Paragraph::new(header).style(
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .bg(COLOR_PANEL_FOCUSED_BG)
                    .add_modifier(Modifier::BOLD),
            ),
            layout[0],
        );

        let area = layout[1];
        self.content_area = area;
        let mut screen = build_screen(
            self.timeline.surface(),
            self.timeline.point(),
            PREVIEW_COLS,
        );
        let height = area.height as usize;
        if self.follow_cursor && height > 0 {
            if screen.cursor_row < self.scroll {
                self.scroll = screen.cursor_row;
            } else if screen.cursor_row >= self.scroll + height {
                self.scroll = screen.cursor_row + 1 - height;
            }
        }
        if let Some(line) = screen.lines.get_mut(screen.cursor_row) {
            for span in &mut line.spans {
                span.style = span.style.patch(Style::default().bg(COLOR_CURSOR_BG));
            }
        }
        pad_lines_to_width(&mut screen.lines, area.width);
        let scroll = self.scroll.min(u16::MAX as usize) as u16;
        frame.render_widget(
            Paragraph::new(screen.lines)
                .style(Style::default().fg(COLOR_TEXT_PRIMARY))
                .scroll((scroll, 0)),
            area,
        );
        self.rows = screen.rows;

        let status = if self.status_message.is_empty() {
            HELP_TEXT.to_string()
        } else {
            self.status_message.clone()
        };
        frame.render_widget(
            Paragraph::new(status).style(Style::default().fg(COLOR_TEXT_SECONDARY)),
            layout[2],
        );
    }
}

fn build_screen(surface: &Surface, point: usize, preview_cols: usize) -> Screen {
    let mut screen = Screen::default();
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut cells: Vec<usize> = Vec::new();
    let mut previews: Vec<Arc<Thumbnail>> = Vec::new();
    let mut last_media: Option<SpanId> = None;
    let mut cursor_row = None;

    for segment in surface.segments() {
        if !segment.visible {
            continue;
        }
        let style = segment.attrs.face.unwrap_or_default();
        if let (Some(column), false) = (segment.attrs.filler, segment.text.contains('\n')) {
            if cursor_row.is_none() && point < segment.range.end {
                cursor_row = Some(screen.rows.len());
            }
            let pad = column.saturating_sub(cells.len());
            spans.push(Span::styled(" ".repeat(pad), style));
            let last = segment.range.end.saturating_sub(1);
            cells.extend((0..pad).map(|n| (segment.range.start + n).min(last)));
            continue;
        }
        let mut run = String::new();
        for (offset, ch) in segment.text.chars().enumerate() {
            let pos = segment.range.start + offset;
            if cursor_row.is_none() && pos >= point {
                cursor_row = Some(screen.rows.len());
            }
            if ch == '\n' {
                if !run.is_empty() {
                    spans.push(Span::styled(std::mem::take(&mut run), style));
                }
                screen.lines.push(Line::from(std::mem::take(&mut spans)));
                screen.rows.push(RowMap {
                    cells: std::mem::take(&mut cells),
                    end: pos,
                });
                for preview in previews.drain(..) {
                    for line in thumbnail_lines(&preview, preview_cols) {
                        screen.lines.push(line);
                        screen.rows.push(RowMap {
                            cells: Vec::new(),
                            end: pos,
                        });
                    }
                }
                continue;
            }
            run.push(ch);
            for _ in 0..ch.width().unwrap_or(0) {
                cells.push(pos);
            }
        }
        if !run.is_empty() {
            spans.push(Span::styled(run, style));
        }

        let media = surface.provider(segment.range.start, AttrKey::Media);
        if media.is_some() && media != last_media {
            last_media = media;
            if let Some(payload) = segment.attrs.media.as_ref().and_then(|slot| slot.payload.clone())
            {
                previews.push(payload);
            }
        }
    }

    if !spans.is_empty() || !cells.is_empty() || screen.rows.is_empty() {
        screen.lines.push(Line::from(spans));
        screen.rows.push(RowMap {
            cells,
            end: surface.len(),
        });
    }
    for preview in previews {
        for line in thumbnail_lines(&preview, preview_cols) {
            screen.lines.push(line);
            screen.rows.push(RowMap {
                cells: Vec::new(),
                end: surface.len(),
            });
        }
    }
    screen.cursor_row = cursor_row.unwrap_or(screen.rows.len().saturating_sub(1));
    screen
}

// Upper half block: top pixel as foreground, bottom pixel as background.
fn thumbnail_lines(thumbnail: &Thumbnail, max_cols: usize) -> Vec<Line<'static>> {
    let (width, height) = thumbnail.dimensions();
    if width == 0 || height == 0 || max_cols == 0 {
        return Vec::new();
    }
    let cols = (max_cols as u32).min(width);
    let mut pixel_rows = ((height as u64 * cols as u64) / width as u64) as u32;
    pixel_rows = pixel_rows.max(2);
    pixel_rows += pixel_rows % 2;
    let scaled = image::imageops::resize(&thumbnail.image, cols, pixel_rows, FilterType::Nearest);

    (0..pixel_rows / 2)
        .map(|row| {
            let spans: Vec<Span<'static>> = (0..cols)
                .map(|col| {
                    let top = scaled.get_pixel(col, row * 2);
                    let bottom = scaled.get_pixel(col, row * 2 + 1);
                    Span::styled(
                        "▀",
                        Style::default().fg(pixel_color(top)).bg(pixel_color(bottom)),
                    )
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}

fn pixel_color(pixel: &Rgba<u8>) -> Color {
    let [r, g, b, _] = pixel.0;
    Color::Rgb(r, g, b)
}

fn pad_lines_to_width(lines: &mut [Line<'static>], width: u16) {
    let width = width as usize;
    if width == 0 {
        return;
    }

    for line in lines {
        let current_width: usize = line
            .spans
            .iter()
            .map(|span| UnicodeWidthStr::width(span.content.as_ref()))
            .sum();
        if current_width >= width {
            continue;
        }
        let pad_style = line.spans.last().map(|span| span.style).unwrap_or_default();
        let padding = " ".repeat(width - current_width);
        line.spans.push(Span::styled(padding, pad_style));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimelineConfig;
    use crate::record::Record;
    use crate::render::{Renderer, MARKER_LEN};
    use image::RgbaImage;

    fn surface_with(records: &[Record]) -> Surface {
        let mut renderer = Renderer::new(TimelineConfig::default());
        let mut surface = Surface::new(50);
        for record in records {
            let fragment = renderer.render(record, surface.width());
            surface.append(fragment);
        }
        surface
    }

    fn line_text(line: &Line<'_>) -> String {
        line.spans.iter().map(|span| span.content.as_ref()).collect()
    }

    #[test]
    fn screen_rows_follow_visible_text() {
        let surface = surface_with(&[Record::new("1", "ada", "hello there")]);
        let screen = build_screen(&surface, MARKER_LEN, 8);
        let text: Vec<String> = screen.lines.iter().map(line_text).collect();
        assert_eq!(text.join("\n"), surface.visible_text());
        // Landing on a record puts the cursor on its author line.
        assert_eq!(text[screen.cursor_row], "@ada");
    }

    #[test]
    fn cells_map_back_to_positions() {
        let surface = surface_with(&[Record::new("1", "ada", "hello")]);
        let screen = build_screen(&surface, 0, 8);
        let author_row = &screen.rows[2];
        assert_eq!(author_row.cells.first(), Some(&MARKER_LEN));
        assert_eq!(surface.char_at(author_row.cells[1]), Some('a'));
        assert_eq!(surface.char_at(author_row.end), Some('\n'));
    }

    #[test]
    fn folded_text_takes_no_rows() {
        let mut record = Record::new("cw", "ada", "secret");
        record.spoiler_text = "careful".into();
        let surface = surface_with(&[record]);
        let screen = build_screen(&surface, 0, 8);
        assert!(screen.lines.iter().all(|line| !line_text(line).contains("secret")));
    }

    #[test]
    fn thumbnails_become_half_blocks() {
        let thumbnail = Thumbnail {
            image: RgbaImage::from_pixel(40, 20, Rgba([10, 20, 30, 255])),
        };
        let lines = thumbnail_lines(&thumbnail, 8);
        assert_eq!(lines.len(), 2);
        assert_eq!(line_text(&lines[0]), "▀".repeat(8));
        assert_eq!(lines[0].spans[0].style.fg, Some(Color::Rgb(10, 20, 30)));
    }

    #[test]
    fn pad_lines_extends_to_width() {
        let mut lines = vec![Line::from("abc")];
        pad_lines_to_width(&mut lines, 6);
        assert_eq!(line_text(&lines[0]), "abc   ");
    }

    #[test]
    fn title_fillers_reach_the_right_border() {
        let mut record = Record::new("cw", "ada", "secret");
        record.spoiler_text = "漢字 spoiler".into();
        let surface = surface_with(&[record]);
        let screen = build_screen(&surface, 0, 8);
        let text: Vec<String> = screen.lines.iter().map(line_text).collect();
        let header = text.iter().position(|line| line.contains('┌')).unwrap();
        let title = &text[header + 1];
        assert!(title.contains("漢字"));
        assert_eq!(title.width(), text[header].width());
        assert_eq!(screen.rows[header + 1].cells.len(), title.width());
    }
}
