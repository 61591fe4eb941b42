//! Markdown to styled terminal lines for AI response panels.
//!
//! Streaming bodies are often cut mid-construct (an open code fence, half a
//! list item); pulldown-cmark recovers from that on its own, so each redraw
//! simply re-renders the visible window.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

#[derive(Clone, Debug)]
enum ListKind {
    Unordered,
    Ordered(u64),
}

struct MarkdownRenderer {
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    lists: Vec<ListKind>,
    quote_depth: usize,
    in_code_block: bool,
    pending_link: Option<String>,
}

impl MarkdownRenderer {
    fn new(base: Style) -> Self {
        Self {
            lines: Vec::new(),
            current: Vec::new(),
            styles: vec![base],
            lists: Vec::new(),
            quote_depth: 0,
            in_code_block: false,
            pending_link: None,
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, patch: Style) {
        let next = self.style().patch(patch);
        self.styles.push(next);
    }

    fn pop_style(&mut self) {
        if self.styles.len() > 1 {
            self.styles.pop();
        }
    }

    fn push_text(&mut self, text: &str) {
        if self.current.is_empty() && self.quote_depth > 0 {
            let bar = "│ ".repeat(self.quote_depth);
            self.current
                .push(Span::styled(bar, Style::default().fg(Color::DarkGray)));
        }
        self.current.push(Span::styled(text.to_string(), self.style()));
    }

    fn flush_line(&mut self) {
        let spans = std::mem::take(&mut self.current);
        self.lines.push(Line::from(spans));
    }

    fn flush_if_open(&mut self) {
        if !self.current.is_empty() {
            self.flush_line();
        }
    }

    fn blank_line(&mut self) {
        self.flush_if_open();
        if self.lines.last().is_some_and(|line| !line.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {}
            Tag::Heading { level, .. } => {
                self.blank_line();
                let mut style = Style::default().add_modifier(Modifier::BOLD);
                if level == HeadingLevel::H1 {
                    style = style.add_modifier(Modifier::UNDERLINED);
                }
                self.push_style(style);
            }
            Tag::BlockQuote(_) => {
                self.flush_if_open();
                self.quote_depth += 1;
                self.push_style(Style::default().add_modifier(Modifier::ITALIC));
            }
            Tag::CodeBlock(kind) => {
                self.blank_line();
                self.in_code_block = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.current.push(Span::styled(
                            format!("[{lang}]"),
                            Style::default().fg(Color::DarkGray),
                        ));
                        self.flush_line();
                    }
                }
                self.push_style(Style::default().fg(Color::Yellow));
            }
            Tag::List(start) => {
                self.flush_if_open();
                self.lists.push(match start {
                    Some(n) => ListKind::Ordered(n),
                    None => ListKind::Unordered,
                });
            }
            Tag::Item => {
                self.flush_if_open();
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let marker = match self.lists.last_mut() {
                    Some(ListKind::Ordered(n)) => {
                        let marker = format!("{n}. ");
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.current.push(Span::raw(format!("{indent}{marker}")));
            }
            Tag::Emphasis => self.push_style(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => {
                self.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT))
            }
            Tag::Link { dest_url, .. } => {
                self.pending_link = Some(dest_url.to_string());
                self.push_style(Style::default().add_modifier(Modifier::UNDERLINED));
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.blank_line(),
            TagEnd::Heading(_) => {
                self.pop_style();
                self.blank_line();
            }
            TagEnd::BlockQuote(_) => {
                self.pop_style();
                self.flush_if_open();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::CodeBlock => {
                self.pop_style();
                self.in_code_block = false;
                self.blank_line();
            }
            TagEnd::List(_) => {
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Item => self.flush_if_open(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => self.pop_style(),
            TagEnd::Link => {
                self.pop_style();
                if let Some(url) = self.pending_link.take() {
                    self.current.push(Span::styled(
                        format!(" ({url})"),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if !self.in_code_block {
            self.push_text(text);
            return;
        }
        let mut parts = text.split('\n').peekable();
        while let Some(part) = parts.next() {
            if !part.is_empty() {
                self.push_text(part);
            }
            // The final newline of a code block closes its last line.
            if parts.peek().is_some() {
                self.flush_line();
            }
        }
    }

    fn render(mut self, source: &str) -> Vec<Line<'static>> {
        let parser = Parser::new_ext(source, Options::ENABLE_STRIKETHROUGH);
        for event in parser {
            match event {
                Event::Start(tag) => self.start(tag),
                Event::End(tag) => self.end(tag),
                Event::Text(text) => self.text(&text),
                Event::Code(code) => self.current.push(Span::styled(
                    code.to_string(),
                    self.style().fg(Color::Yellow),
                )),
                Event::SoftBreak => self.push_text(" "),
                Event::HardBreak => self.flush_line(),
                Event::Rule => {
                    self.blank_line();
                    self.current.push(Span::styled(
                        "─".repeat(24),
                        Style::default().fg(Color::DarkGray),
                    ));
                    self.blank_line();
                }
                Event::Html(html) | Event::InlineHtml(html) => self.push_text(&html),
                _ => {}
            }
        }
        self.flush_if_open();
        while self.lines.last().is_some_and(|line| line.spans.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }
}

/// Render `source` as styled lines on top of `base`.
pub fn render_markdown(source: &str, base: Style) -> Vec<Line<'static>> {
    MarkdownRenderer::new(base).render(source)
}

/// Unstyled fallback used when rendering is not possible.
pub fn plain_lines(source: &str) -> Vec<Line<'static>> {
    source.lines().map(|line| Line::raw(line.to_string())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn paragraphs_are_separated_by_blank_lines() {
        let lines = render_markdown("first\n\nsecond", Style::default());
        assert_eq!(text_of(&lines), ["first", "", "second"]);
    }

    #[test]
    fn strong_text_is_bold() {
        let lines = render_markdown("a **b** c", Style::default());
        let bold = lines[0]
            .spans
            .iter()
            .find(|span| span.content == "b")
            .expect("bold span");
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn lists_get_markers() {
        let lines = render_markdown("- one\n- two\n\n1. uno\n2. dos", Style::default());
        let text = text_of(&lines);
        assert!(text.contains(&"• one".to_string()));
        assert!(text.contains(&"• two".to_string()));
        assert!(text.contains(&"1. uno".to_string()));
        assert!(text.contains(&"2. dos".to_string()));
    }

    #[test]
    fn code_blocks_keep_their_lines() {
        let lines = render_markdown("```rust\nfn main() {}\nlet x = 1;\n```", Style::default());
        assert_eq!(text_of(&lines), ["[rust]", "fn main() {}", "let x = 1;"]);
    }

    #[test]
    fn unterminated_fence_still_renders() {
        let lines = render_markdown("```\npartial", Style::default());
        assert_eq!(text_of(&lines), ["partial"]);
    }

    #[test]
    fn links_show_destination() {
        let lines = render_markdown("[docs](https://example.com)", Style::default());
        assert_eq!(text_of(&lines), ["docs (https://example.com)"]);
    }
}
