//! Terminal sinks for render frames.
//!
//! [`LiveRegion`] keeps a bordered panel redrawn in place at the bottom of the
//! scrollback using an inline ratatui viewport. Finished panels are inserted
//! above the viewport so they stay in the normal terminal history.
//! [`PlainSink`] prints undecorated text for pipes and dumb terminals.

use std::io::{self, IsTerminal, Stdout, Write};

use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph, Widget};
use ratatui::{Terminal, TerminalOptions, Viewport};
use tracing::debug;
use unicode_width::UnicodeWidthChar;

use crate::ui::frame::{Frame, FrameBody, FrameSink};
use crate::ui::markdown::render_markdown;
use crate::ui::theme::PanelTheme;

/// Rows taken by the top and bottom border.
const BORDER_ROWS: u16 = 2;
const BORDER_COLUMNS: u16 = 2;
const TAB_WIDTH: usize = 4;
/// Body rows inserted into the scrollback per `insert_before` call.
const COMMIT_SLICE_ROWS: usize = 4096;

pub type BackendFactory<B> = Box<dyn FnMut() -> io::Result<B> + Send>;

pub struct LiveRegion<B: Backend> {
    theme: PanelTheme,
    live_height: u16,
    open_backend: BackendFactory<B>,
    terminal: Option<Terminal<B>>,
    fallback: bool,
}

impl LiveRegion<CrosstermBackend<Stdout>> {
    /// Live region on stdout tall enough for `body_lines` of output.
    pub fn stdout(theme: PanelTheme, body_lines: usize) -> Self {
        Self::with_backend(
            theme,
            body_lines,
            Box::new(|| Ok(CrosstermBackend::new(io::stdout()))),
        )
    }
}

impl<B: Backend> LiveRegion<B> {
    pub fn with_backend(
        theme: PanelTheme,
        body_lines: usize,
        open_backend: BackendFactory<B>,
    ) -> Self {
        let body = u16::try_from(body_lines).unwrap_or(u16::MAX - BORDER_ROWS);
        Self {
            theme,
            live_height: body.saturating_add(BORDER_ROWS).max(BORDER_ROWS + 1),
            open_backend,
            terminal: None,
            fallback: false,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    fn open(&mut self, height: u16) -> io::Result<Terminal<B>> {
        let backend = (self.open_backend)()?;
        Terminal::with_options(
            backend,
            TerminalOptions {
                viewport: Viewport::Inline(height),
            },
        )
    }

    fn live_terminal(&mut self) -> io::Result<&mut Terminal<B>> {
        if self.terminal.is_none() {
            let terminal = self.open(self.live_height)?;
            self.terminal = Some(terminal);
        }
        self.terminal
            .as_mut()
            .ok_or_else(|| io::Error::other("live region unavailable"))
    }

    /// Insert `frame` into the scrollback above `terminal`, then close the viewport.
    ///
    /// Tall panels go in as consecutive slices: the first carries the top
    /// border and title, the last the bottom border and subtitle.
    fn commit(&self, terminal: &mut Terminal<B>, frame: &Frame) -> io::Result<()> {
        let width = terminal.size()?.width;
        let lines = body_lines(frame, inner_width(width));
        let slices: Vec<&[Line<'static>]> = if lines.is_empty() {
            vec![lines.as_slice()]
        } else {
            lines.chunks(COMMIT_SLICE_ROWS).collect()
        };
        let last = slices.len() - 1;

        for (index, slice) in slices.into_iter().enumerate() {
            let mut panel = Panel::new(frame, slice.to_vec(), &self.theme);
            panel.borders = Borders::LEFT | Borders::RIGHT;
            if index == 0 {
                panel.borders |= Borders::TOP;
            }
            if index == last {
                panel.borders |= Borders::BOTTOM;
            }
            let rows = slice.len()
                + usize::from(panel.borders.contains(Borders::TOP))
                + usize::from(panel.borders.contains(Borders::BOTTOM));
            let height = u16::try_from(rows).map_err(io::Error::other)?;
            terminal.insert_before(height, |buf| panel.render(buf.area, buf))?;
        }
        terminal.clear()?;
        terminal.show_cursor()?;
        Ok(())
    }

    fn degrade(&mut self, err: &io::Error) {
        debug!(error = %err, "live region unavailable; printing plain text");
        self.terminal = None;
        self.fallback = true;
    }

    fn print_plain(&self, frame: &Frame) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(frame.plain_text().as_bytes())?;
        stdout.flush()
    }

    #[cfg(test)]
    fn backend(&self) -> Option<&B> {
        self.terminal.as_ref().map(Terminal::backend)
    }
}

impl<B: Backend> FrameSink for LiveRegion<B> {
    fn draw(&mut self, frame: &Frame) -> io::Result<()> {
        if self.fallback {
            return Ok(());
        }
        let theme = self.theme.clone();
        let visible = usize::from(self.live_height - BORDER_ROWS);
        let result = self.live_terminal().and_then(|terminal| {
            terminal
                .draw(|f| {
                    let area = f.area();
                    let mut lines = body_lines(frame, inner_width(area.width));
                    if lines.len() > visible {
                        lines.drain(..lines.len() - visible);
                    }
                    f.render_widget(Panel::new(frame, lines, &theme), area);
                })
                .map(|_| ())
        });
        if let Err(err) = &result {
            self.degrade(err);
        }
        result
    }

    fn finalize(&mut self, frame: &Frame) -> io::Result<()> {
        if self.fallback {
            return self.print_plain(frame);
        }
        let mut terminal = match self.terminal.take() {
            Some(terminal) => terminal,
            None => match self.open(1) {
                Ok(terminal) => terminal,
                Err(err) => {
                    self.degrade(&err);
                    return self.print_plain(frame);
                }
            },
        };
        if let Err(err) = self.commit(&mut terminal, frame) {
            self.degrade(&err);
            return self.print_plain(frame);
        }
        Ok(())
    }

    fn print_static(&mut self, frame: &Frame) -> io::Result<()> {
        if self.fallback || frame.title.is_empty() {
            return self.print_plain(frame);
        }
        self.finalize(frame)
    }
}

/// Live panels on an interactive stdout, plain text anywhere else.
pub fn stdout_sink(theme: PanelTheme, body_lines: usize) -> Box<dyn FrameSink> {
    let dumb = matches!(std::env::var("TERM").as_deref(), Ok("dumb"));
    if io::stdout().is_terminal() && !dumb {
        Box::new(LiveRegion::stdout(theme, body_lines))
    } else {
        Box::new(PlainSink::stdout())
    }
}

/// Prints frames as plain text; live redraws are skipped.
pub struct PlainSink<W: Write> {
    out: W,
}

impl<W: Write> PlainSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl PlainSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> FrameSink for PlainSink<W> {
    fn draw(&mut self, _frame: &Frame) -> io::Result<()> {
        Ok(())
    }

    fn finalize(&mut self, frame: &Frame) -> io::Result<()> {
        self.out.write_all(frame.plain_text().as_bytes())?;
        self.out.flush()
    }

    fn print_static(&mut self, frame: &Frame) -> io::Result<()> {
        self.finalize(frame)
    }
}

struct Panel<'a> {
    frame: &'a Frame,
    lines: Vec<Line<'static>>,
    borders: Borders,
    border: Style,
    title: Style,
}

impl<'a> Panel<'a> {
    fn new(frame: &'a Frame, lines: Vec<Line<'static>>, theme: &PanelTheme) -> Self {
        Self {
            frame,
            lines,
            borders: Borders::ALL,
            border: theme.border(frame.tone),
            title: theme.title(frame.tone),
        }
    }
}

impl Widget for Panel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut block = Block::default()
            .borders(self.borders)
            .border_type(BorderType::Rounded)
            .border_style(self.border);
        if !self.frame.title.is_empty() && self.borders.contains(Borders::TOP) {
            block = block.title(Line::styled(self.frame.title.clone(), self.title));
        }
        if let Some(subtitle) = self
            .frame
            .subtitle
            .as_ref()
            .filter(|_| self.borders.contains(Borders::BOTTOM))
        {
            block = block.title_bottom(
                Line::styled(format!(" {} ", subtitle.trim()), self.border).right_aligned(),
            );
        }
        let alignment = match self.frame.body {
            FrameBody::Notice(_) => Alignment::Center,
            _ => Alignment::Left,
        };
        Paragraph::new(self.lines)
            .alignment(alignment)
            .block(block)
            .render(area, buf);
    }
}

fn inner_width(width: u16) -> usize {
    usize::from(width.saturating_sub(BORDER_COLUMNS)).max(1)
}

/// Body of `frame` as display lines no wider than `width`.
fn body_lines(frame: &Frame, width: usize) -> Vec<Line<'static>> {
    let lines = match &frame.body {
        FrameBody::Markdown(text) => render_markdown(text, Style::default()),
        FrameBody::Notice(text) => text.lines().map(|l| Line::raw(sanitize(l))).collect(),
        FrameBody::Lines(lines) => lines.iter().map(|l| Line::raw(sanitize(l))).collect(),
    };
    lines
        .into_iter()
        .flat_map(|line| wrap_line(line, width))
        .collect()
}

/// Expand tabs and drop control characters that would corrupt the panel.
fn sanitize(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for ch in line.chars() {
        match ch {
            '\t' => out.push_str(&" ".repeat(TAB_WIDTH)),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

fn wrap_line(line: Line<'static>, width: usize) -> Vec<Line<'static>> {
    if line.width() <= width {
        return vec![line];
    }
    let mut rows = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut used = 0;
    for span in line.spans {
        let mut chunk = String::new();
        for ch in span.content.chars() {
            let w = ch.width().unwrap_or(0);
            if used + w > width && used > 0 {
                if !chunk.is_empty() {
                    current.push(Span::styled(std::mem::take(&mut chunk), span.style));
                }
                rows.push(Line::from(std::mem::take(&mut current)));
                used = 0;
            }
            chunk.push(ch);
            used += w;
        }
        if !chunk.is_empty() {
            current.push(Span::styled(chunk, span.style));
        }
    }
    if !current.is_empty() {
        rows.push(Line::from(current));
    }
    rows
}
