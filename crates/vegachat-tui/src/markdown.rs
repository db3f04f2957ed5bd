//! Markdown to styled terminal lines

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

pub fn markdown_lines(source: &str) -> Vec<Line<'static>> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut writer = Writer::default();
    for event in Parser::new_ext(source, options) {
        writer.event(event);
    }
    writer.finish()
}

#[derive(Default)]
struct Writer {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    styles: Vec<Style>,
    /// One entry per open list; `Some(n)` is the next number of an ordered list.
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    in_code_block: bool,
    link: Option<String>,
    table_cell: usize,
}

impl Writer {
    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if self.in_code_block {
                    for line in text.lines() {
                        self.spans.push(Span::styled(format!("  {}", line), code_style()));
                        self.flush();
                    }
                } else {
                    self.push_text(text.to_string());
                }
            }
            Event::Code(code) => {
                self.spans.push(Span::styled(code.to_string(), code_style()));
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                self.spans.push(Span::styled(
                    html.trim_end().to_string(),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            Event::SoftBreak => self.push_text(" ".to_string()),
            Event::HardBreak => self.flush(),
            Event::Rule => {
                self.flush();
                self.spans.push(Span::styled(
                    "─".repeat(24),
                    Style::default().fg(Color::DarkGray),
                ));
                self.flush();
                self.blank();
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.spans.push(Span::raw(marker));
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush();
                let mut style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
                if level == HeadingLevel::H1 {
                    style = style.add_modifier(Modifier::UNDERLINED);
                }
                self.styles.push(style);
            }
            Tag::BlockQuote { .. } => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                if let CodeBlockKind::Fenced(info) = kind {
                    if !info.is_empty() {
                        self.spans.push(Span::styled(
                            format!("  {}", info),
                            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                        ));
                        self.flush();
                    }
                }
                self.in_code_block = true;
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let depth = self.lists.len().saturating_sub(1);
                let bullet = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let bullet = format!("{}. ", n);
                        *n += 1;
                        bullet
                    }
                    _ => "• ".to_string(),
                };
                self.spans.push(Span::raw("  ".repeat(depth)));
                self.spans.push(Span::styled(bullet, Style::default().fg(Color::Yellow)));
            }
            Tag::Emphasis => self.styles.push(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.styles.push(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => {
                self.styles.push(Style::default().add_modifier(Modifier::CROSSED_OUT))
            }
            Tag::Link { dest_url, .. } => {
                self.link = Some(dest_url.to_string());
                self.styles.push(
                    Style::default()
                        .fg(Color::Blue)
                        .add_modifier(Modifier::UNDERLINED),
                );
            }
            Tag::Table(_) => self.flush(),
            Tag::TableHead | Tag::TableRow => self.table_cell = 0,
            Tag::TableCell => {
                if self.table_cell > 0 {
                    self.spans.push(Span::styled(" │ ", Style::default().fg(Color::DarkGray)));
                }
                self.table_cell += 1;
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Heading(_) => {
                self.styles.pop();
                self.flush();
                self.blank();
            }
            TagEnd::BlockQuote { .. } => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.blank();
            }
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                self.flush();
                self.blank();
            }
            TagEnd::List { .. } => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => self.flush(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough => {
                self.styles.pop();
            }
            TagEnd::Link => {
                self.styles.pop();
                if let Some(url) = self.link.take() {
                    self.spans.push(Span::styled(
                        format!(" ({})", url),
                        Style::default().fg(Color::DarkGray),
                    ));
                }
            }
            TagEnd::TableHead => {
                let width: usize = self.spans.iter().map(|s| s.content.chars().count()).sum();
                for span in &mut self.spans {
                    span.style = span.style.add_modifier(Modifier::BOLD);
                }
                self.flush();
                self.spans.push(Span::styled(
                    "─".repeat(width.max(3)),
                    Style::default().fg(Color::DarkGray),
                ));
                self.flush();
            }
            TagEnd::TableRow => self.flush(),
            TagEnd::Table => self.blank(),
            _ => {}
        }
    }

    fn current_style(&self) -> Style {
        self.styles
            .iter()
            .fold(Style::default(), |acc, style| acc.patch(*style))
    }

    fn push_text(&mut self, text: String) {
        let style = self.current_style();
        self.spans.push(Span::styled(text, style));
    }

    fn flush(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        let mut spans = Vec::with_capacity(self.spans.len() + 1);
        if self.quote_depth > 0 {
            spans.push(Span::styled(
                "│ ".repeat(self.quote_depth),
                Style::default().fg(Color::DarkGray),
            ));
        }
        spans.append(&mut self.spans);
        self.lines.push(Line::from(spans));
    }

    fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| !l.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush();
        while self.lines.last().is_some_and(|l| l.spans.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }
}

fn code_style() -> Style {
    Style::default().fg(Color::Yellow)
}

#[cfg(test)]
pub(crate) fn line_text(line: &Line<'_>) -> String {
    line.spans.iter().map(|s| s.content.as_ref()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<String> {
        markdown_lines(source).iter().map(line_text).collect()
    }

    #[test]
    fn paragraphs_are_separated_by_blank_line() {
        assert_eq!(texts("one\ntwo\n\nthree"), vec!["one two", "", "three"]);
    }

    #[test]
    fn heading_and_strong_are_bold() {
        let lines = markdown_lines("# Title\n\nsome **bold** text");
        assert!(lines[0].spans[0].style.add_modifier.contains(Modifier::BOLD));
        let bold = lines[2].spans.iter().find(|s| s.content == "bold").unwrap();
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn lists_get_bullets_and_numbers() {
        assert_eq!(
            texts("- a\n- b\n\n1. x\n2. y"),
            vec!["• a", "• b", "", "1. x", "2. y"]
        );
    }

    #[test]
    fn nested_lists_indent() {
        assert_eq!(texts("- a\n  - b"), vec!["• a", "  • b"]);
    }

    #[test]
    fn tables_join_cells() {
        assert_eq!(
            texts("| a | b |\n|---|---|\n| 1 | 2 |"),
            vec!["a │ b", "─────", "1 │ 2"]
        );
    }

    #[test]
    fn inline_code_and_code_blocks_are_highlighted() {
        let lines = markdown_lines("run `ls`\n\n```sh\nls -la\n```");
        let code = lines[0].spans.iter().find(|s| s.content == "ls").unwrap();
        assert_eq!(code.style.fg, Some(Color::Yellow));
        assert_eq!(line_text(&lines[2]), "  sh");
        assert_eq!(line_text(&lines[3]), "  ls -la");
    }

    #[test]
    fn quotes_and_links() {
        assert_eq!(
            texts("> quoted [site](https://vega.github.io)"),
            vec!["│ quoted site (https://vega.github.io)"]
        );
    }

    #[test]
    fn task_list_markers() {
        assert_eq!(texts("- [x] done\n- [ ] todo"), vec!["• [x] done", "• [ ] todo"]);
    }
}
