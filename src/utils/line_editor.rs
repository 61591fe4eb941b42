//! Single-line terminal editor used for the REPL prompt and password entry.

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;
use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEditorState {
    pub text: String,
    pub cursor: usize,
    /// Position while browsing history; `None` means editing a fresh line.
    history_index: Option<usize>,
    /// Line being typed before history browsing started.
    draft: String,
}

impl LineEditorState {
    pub fn with_text(text: String) -> Self {
        let cursor = text.chars().count();
        Self {
            text,
            cursor,
            history_index: None,
            draft: String::new(),
        }
    }

    fn replace_text(&mut self, text: String) {
        self.cursor = text.chars().count();
        self.text = text;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMode {
    None,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEditorOptions {
    pub initial_text: String,
    pub allow_cancel: bool,
    pub mask_mode: MaskMode,
    /// Earlier entries, oldest first; Up/Down walk through them.
    pub history: Vec<String>,
}

impl Default for LineEditorOptions {
    fn default() -> Self {
        Self {
            initial_text: String::new(),
            allow_cancel: true,
            mask_mode: MaskMode::None,
            history: Vec::new(),
        }
    }
}

impl LineEditorOptions {
    pub fn masked() -> Self {
        Self {
            mask_mode: MaskMode::Hidden,
            ..Self::default()
        }
    }

    pub fn with_history(history: Vec<String>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEditAction {
    Insert(char),
    Backspace,
    Delete,
    MoveLeft,
    MoveRight,
    MoveStart,
    MoveEnd,
    DeleteToEnd,
    DeleteWord,
    ClearAll,
    HistoryPrev,
    HistoryNext,
    Paste(String),
    Submit,
    Cancel,
    /// Ctrl-D on an empty line.
    EndOfInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEditOutcome {
    Continue { redraw: bool },
    Submit(String),
    Cancelled,
    EndOfInput,
}

#[derive(Debug)]
pub enum LineEditorError {
    Cancelled,
    EndOfInput,
    Io(io::Error),
}

impl fmt::Display for LineEditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineEditorError::Cancelled => write!(f, "Cancelled by user"),
            LineEditorError::EndOfInput => write!(f, "End of input"),
            LineEditorError::Io(err) => write!(f, "Terminal error: {err}"),
        }
    }
}

impl std::error::Error for LineEditorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LineEditorError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for LineEditorError {
    fn from(err: io::Error) -> Self {
        LineEditorError::Io(err)
    }
}

/// Sanitize pasted text so it cannot corrupt the prompt line.
///
/// Tabs become 4 spaces, carriage returns become newlines, and other control
/// characters are dropped.
pub fn sanitize_text_input(text: &str) -> String {
    let mut sanitized = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '\t' => sanitized.push_str("    "),
            '\r' => sanitized.push('\n'),
            '\n' => sanitized.push(c),
            _ if !c.is_control() => sanitized.push(c),
            _ => {}
        }
    }

    sanitized
}

pub fn prompt_line_editor(
    prompt: &str,
    options: &LineEditorOptions,
) -> Result<String, LineEditorError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    if let Err(err) = execute!(stdout, event::EnableBracketedPaste) {
        let _ = disable_raw_mode();
        return Err(err.into());
    }

    let result = edit_loop(prompt, options);

    let disable_raw_result = disable_raw_mode();
    let disable_paste_result = execute!(stdout, event::DisableBracketedPaste);
    println!();

    let value = result?;
    disable_raw_result?;
    disable_paste_result?;
    Ok(value)
}

fn edit_loop(prompt: &str, options: &LineEditorOptions) -> Result<String, LineEditorError> {
    let mut state = LineEditorState::with_text(options.initial_text.clone());
    let mut needs_redraw = true;

    loop {
        if needs_redraw {
            redraw_line(prompt, &state, options)?;
            needs_redraw = false;
        }

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let action = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                map_key_event_to_action(&key, &state, options)
            }
            Event::Paste(text) => Some(LineEditAction::Paste(sanitize_text_input(&text))),
            Event::Resize(..) => {
                needs_redraw = true;
                None
            }
            _ => None,
        };
        let Some(action) = action else {
            continue;
        };
        match apply_line_edit_action(&mut state, action, options) {
            LineEditOutcome::Continue { redraw } => needs_redraw = redraw,
            LineEditOutcome::Submit(value) => return Ok(value),
            LineEditOutcome::Cancelled => return Err(LineEditorError::Cancelled),
            LineEditOutcome::EndOfInput => return Err(LineEditorError::EndOfInput),
        }
    }
}

fn redraw_line(
    prompt: &str,
    state: &LineEditorState,
    options: &LineEditorOptions,
) -> io::Result<()> {
    let display_text = display_text(state, options);
    let prefix: String = display_text.chars().take(state.cursor).collect();
    let cursor_columns = UnicodeWidthStr::width(prompt) + UnicodeWidthStr::width(prefix.as_str());

    let mut stdout = io::stdout().lock();
    write!(stdout, "\r\x1b[K{prompt}{display_text}")?;
    if cursor_columns > 0 {
        write!(stdout, "\r\x1b[{cursor_columns}C")?;
    } else {
        write!(stdout, "\r")?;
    }
    stdout.flush()
}

fn display_text(state: &LineEditorState, options: &LineEditorOptions) -> String {
    match options.mask_mode {
        MaskMode::None => state.text.clone(),
        MaskMode::Hidden => "*".repeat(state.text.chars().count()),
    }
}

pub fn map_key_event_to_action(
    key: &event::KeyEvent,
    state: &LineEditorState,
    options: &LineEditorOptions,
) -> Option<LineEditAction> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let browsing = options.mask_mode == MaskMode::None;
    match key.code {
        KeyCode::Enter => Some(LineEditAction::Submit),
        KeyCode::Esc if options.allow_cancel => Some(LineEditAction::Cancel),
        KeyCode::Backspace => Some(LineEditAction::Backspace),
        KeyCode::Delete => Some(LineEditAction::Delete),
        KeyCode::Left => Some(LineEditAction::MoveLeft),
        KeyCode::Right => Some(LineEditAction::MoveRight),
        KeyCode::Home => Some(LineEditAction::MoveStart),
        KeyCode::End => Some(LineEditAction::MoveEnd),
        KeyCode::Up if browsing => Some(LineEditAction::HistoryPrev),
        KeyCode::Down if browsing => Some(LineEditAction::HistoryNext),
        KeyCode::Char('a') if ctrl => Some(LineEditAction::MoveStart),
        KeyCode::Char('e') if ctrl => Some(LineEditAction::MoveEnd),
        KeyCode::Char('k') if ctrl => Some(LineEditAction::DeleteToEnd),
        KeyCode::Char('w') if ctrl => Some(LineEditAction::DeleteWord),
        KeyCode::Char('u') if ctrl => Some(LineEditAction::ClearAll),
        KeyCode::Char('p') if ctrl && browsing => Some(LineEditAction::HistoryPrev),
        KeyCode::Char('n') if ctrl && browsing => Some(LineEditAction::HistoryNext),
        KeyCode::Char('c') if ctrl && options.allow_cancel => Some(LineEditAction::Cancel),
        KeyCode::Char('d') if ctrl => {
            if state.text.is_empty() {
                Some(LineEditAction::EndOfInput)
            } else {
                Some(LineEditAction::Delete)
            }
        }
        KeyCode::Char(c) if !ctrl => {
            if c == '\n' || c == '\r' {
                Some(LineEditAction::Submit)
            } else {
                Some(LineEditAction::Insert(c))
            }
        }
        _ => None,
    }
}

fn unchanged() -> LineEditOutcome {
    LineEditOutcome::Continue { redraw: false }
}

fn changed() -> LineEditOutcome {
    LineEditOutcome::Continue { redraw: true }
}

pub fn apply_line_edit_action(
    state: &mut LineEditorState,
    action: LineEditAction,
    options: &LineEditorOptions,
) -> LineEditOutcome {
    match action {
        LineEditAction::Insert(c) => {
            let byte_idx = char_to_byte_index(&state.text, state.cursor);
            state.text.insert(byte_idx, c);
            state.cursor += 1;
            changed()
        }
        LineEditAction::Backspace => {
            if state.cursor == 0 {
                return unchanged();
            }
            let end = char_to_byte_index(&state.text, state.cursor);
            let start = char_to_byte_index(&state.text, state.cursor - 1);
            state.text.replace_range(start..end, "");
            state.cursor -= 1;
            changed()
        }
        LineEditAction::Delete => {
            let start = char_to_byte_index(&state.text, state.cursor);
            if start >= state.text.len() {
                return unchanged();
            }
            let end = char_to_byte_index(&state.text, state.cursor + 1);
            state.text.replace_range(start..end, "");
            changed()
        }
        LineEditAction::MoveLeft => {
            if state.cursor == 0 {
                return unchanged();
            }
            state.cursor -= 1;
            changed()
        }
        LineEditAction::MoveRight => {
            if state.cursor >= state.text.chars().count() {
                return unchanged();
            }
            state.cursor += 1;
            changed()
        }
        LineEditAction::MoveStart => {
            if state.cursor == 0 {
                return unchanged();
            }
            state.cursor = 0;
            changed()
        }
        LineEditAction::MoveEnd => {
            let end = state.text.chars().count();
            if state.cursor == end {
                return unchanged();
            }
            state.cursor = end;
            changed()
        }
        LineEditAction::DeleteToEnd => {
            let byte_idx = char_to_byte_index(&state.text, state.cursor);
            if byte_idx >= state.text.len() {
                return unchanged();
            }
            state.text.truncate(byte_idx);
            changed()
        }
        LineEditAction::DeleteWord => {
            if state.cursor == 0 {
                return unchanged();
            }
            state.cursor = delete_word_before_cursor(&mut state.text, state.cursor);
            changed()
        }
        LineEditAction::ClearAll => {
            if state.text.is_empty() {
                return unchanged();
            }
            state.text.clear();
            state.cursor = 0;
            changed()
        }
        LineEditAction::HistoryPrev => {
            let next = match state.history_index {
                None if options.history.is_empty() => return unchanged(),
                None => {
                    state.draft = state.text.clone();
                    options.history.len() - 1
                }
                Some(0) => return unchanged(),
                Some(idx) => idx - 1,
            };
            state.history_index = Some(next);
            state.replace_text(options.history[next].clone());
            changed()
        }
        LineEditAction::HistoryNext => {
            let Some(idx) = state.history_index else {
                return unchanged();
            };
            if idx + 1 < options.history.len() {
                state.history_index = Some(idx + 1);
                state.replace_text(options.history[idx + 1].clone());
            } else {
                state.history_index = None;
                let draft = std::mem::take(&mut state.draft);
                state.replace_text(draft);
            }
            changed()
        }
        LineEditAction::Paste(text) => {
            let before_newline = text.split('\n').next().unwrap_or("");
            if !before_newline.is_empty() {
                let byte_idx = char_to_byte_index(&state.text, state.cursor);
                state.text.insert_str(byte_idx, before_newline);
                state.cursor += before_newline.chars().count();
            }
            if text.contains('\n') {
                LineEditOutcome::Submit(state.text.clone())
            } else {
                LineEditOutcome::Continue {
                    redraw: !before_newline.is_empty(),
                }
            }
        }
        LineEditAction::Submit => LineEditOutcome::Submit(state.text.clone()),
        LineEditAction::Cancel => LineEditOutcome::Cancelled,
        LineEditAction::EndOfInput => LineEditOutcome::EndOfInput,
    }
}

fn delete_word_before_cursor(input: &mut String, cursor: usize) -> usize {
    let mut chars: Vec<char> = input.chars().collect();
    let end = cursor.min(chars.len());
    let mut idx = end;
    while idx > 0 && chars[idx - 1] == ' ' {
        idx -= 1;
    }
    while idx > 0 && chars[idx - 1] != ' ' {
        idx -= 1;
    }
    chars.drain(idx..end);
    *input = chars.into_iter().collect();
    idx
}

fn char_to_byte_index(input: &str, char_index: usize) -> usize {
    input
        .char_indices()
        .nth(char_index)
        .map(|(idx, _)| idx)
        .unwrap_or(input.len())
}
