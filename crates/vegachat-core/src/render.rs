//! Reply classification
//!
//! Splits a reply into markdown runs, ordinary code blocks and chart blocks.
//! Fences labelled `json/vega_lite` or `json/vega` become charts; while a
//! reply is still streaming they are only placeholders because the JSON is
//! usually incomplete.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::chart::{ChartKind, ChartOutcome, ChartRenderer, SpecSource};

/// Heading and text shown in place of a chart while the reply streams.
pub const PLACEHOLDER_TITLE: &str = "Preparing data visualization";
pub const PLACEHOLDER_TEXT: &str = "Waiting for the response to conclude before rendering the \
visualization. This visualization uses Vega to define and render the requested charts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Charts are not parsed.
    Placeholder,
    #[default]
    Full,
}

/// Language annotation of a code fence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenceLabel {
    VegaLite,
    Vega,
    Other(String),
    Plain,
}

impl FenceLabel {
    /// Parse a fence info string. Only the first word is the label.
    pub fn parse(info: &str) -> Self {
        match info.split_whitespace().next() {
            None => FenceLabel::Plain,
            Some("json/vega_lite") => FenceLabel::VegaLite,
            Some("json/vega") => FenceLabel::Vega,
            Some(other) => FenceLabel::Other(other.to_string()),
        }
    }

    pub fn chart_kind(&self) -> Option<ChartKind> {
        match self {
            FenceLabel::VegaLite => Some(ChartKind::VegaLite),
            FenceLabel::Vega => Some(ChartKind::Vega),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Markdown source for a run of non-code content
    Markdown(String),
    Code {
        language: Option<String>,
        body: String,
    },
    ChartPlaceholder {
        kind: ChartKind,
        body: String,
    },
    Chart {
        kind: ChartKind,
        body: String,
        rendered: ChartOutcome,
    },
    /// Text that cannot be treated as markdown, shown verbatim
    Literal(String),
}

impl Block {
    pub fn is_chart(&self) -> bool {
        matches!(self, Block::Chart { .. } | Block::ChartPlaceholder { .. })
    }

    /// Source text of the block, as it would be copied.
    pub fn source(&self) -> &str {
        match self {
            Block::Markdown(text) | Block::Literal(text) => text,
            Block::Code { body, .. }
            | Block::ChartPlaceholder { body, .. }
            | Block::Chart { body, .. } => body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    blocks: Vec<Block>,
}

impl Document {
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn chart_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_chart()).count()
    }

    /// Chart blocks in order, with their block index
    pub fn charts(&self) -> impl Iterator<Item = (usize, &Block)> {
        self.blocks.iter().enumerate().filter(|(_, b)| b.is_chart())
    }
}

/// Classify with the default chart renderer.
pub fn classify(text: &str, mode: RenderMode) -> Document {
    classify_with(text, mode, &ChartRenderer::default())
}

pub fn classify_with(text: &str, mode: RenderMode, renderer: &ChartRenderer) -> Document {
    if text.is_empty() {
        return Document::default();
    }
    if !is_markdown_safe(text) {
        return Document {
            blocks: vec![Block::Literal(escape_controls(text))],
        };
    }

    let mut blocks = Vec::new();
    let mut cursor = 0;
    let mut depth = 0usize;
    let mut fence: Option<(FenceLabel, String)> = None;

    for (event, range) in Parser::new_ext(text, markdown_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(kind)) if depth == 0 => {
                push_markdown(&mut blocks, &text[cursor..range.start]);
                let label = match kind {
                    CodeBlockKind::Fenced(info) => FenceLabel::parse(&info),
                    CodeBlockKind::Indented => FenceLabel::Plain,
                };
                fence = Some((label, String::new()));
                depth += 1;
            }
            Event::Text(body) if depth == 1 && fence.is_some() => {
                if let Some((_, buf)) = fence.as_mut() {
                    buf.push_str(&body);
                }
            }
            Event::End(TagEnd::CodeBlock) if depth == 1 && fence.is_some() => {
                if let Some((label, body)) = fence.take() {
                    blocks.push(code_block(label, body, mode, renderer));
                }
                cursor = range.end;
                depth -= 1;
            }
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    if let Some((label, body)) = fence.take() {
        blocks.push(code_block(label, body, mode, renderer));
        cursor = text.len();
    }
    push_markdown(&mut blocks, &text[cursor..]);

    Document { blocks }
}

fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

fn code_block(label: FenceLabel, body: String, mode: RenderMode, renderer: &ChartRenderer) -> Block {
    match (label.chart_kind(), mode) {
        (Some(kind), RenderMode::Placeholder) => Block::ChartPlaceholder { kind, body },
        (Some(kind), RenderMode::Full) => {
            let rendered = renderer.render(kind, SpecSource::Text(&body));
            Block::Chart {
                kind,
                body,
                rendered,
            }
        }
        (None, _) => Block::Code {
            language: match label {
                FenceLabel::Other(language) => Some(language),
                _ => None,
            },
            body,
        },
    }
}

fn push_markdown(blocks: &mut Vec<Block>, source: &str) {
    let source = source.trim_matches('\n');
    if !source.trim().is_empty() {
        blocks.push(Block::Markdown(source.to_string()));
    }
}

/// Control characters other than line breaks and tabs cannot be shown as
/// formatted text.
pub fn is_markdown_safe(text: &str) -> bool {
    !text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
}

fn escape_controls(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_control() && !matches!(c, '\n' | '\r' | '\t') {
                c.escape_unicode().to_string()
            } else {
                c.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BAR_REPLY: &str = "Here is the chart:\n\n```json/vega_lite\n{\"mark\":\"bar\"}\n```\n\nEnjoy.";

    #[test]
    fn empty_text_is_empty_document() {
        assert!(classify("", RenderMode::Full).is_empty());
    }

    #[test]
    fn chart_fence_renders_in_full_mode() {
        let doc = classify(BAR_REPLY, RenderMode::Full);
        let blocks = doc.blocks();

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0], Block::Markdown("Here is the chart:".to_string()));
        match &blocks[1] {
            Block::Chart {
                kind,
                body,
                rendered,
            } => {
                assert_eq!(*kind, ChartKind::VegaLite);
                assert_eq!(body, "{\"mark\":\"bar\"}\n");
                let chart = rendered.chart().unwrap();
                assert_eq!(chart.spec["mark"], "bar");
                assert_eq!(chart.width, 600.0);
            }
            other => panic!("expected chart, got {:?}", other),
        }
        assert_eq!(blocks[2], Block::Markdown("Enjoy.".to_string()));
        assert_eq!(doc.chart_count(), 1);
    }

    #[test]
    fn chart_fence_is_placeholder_while_streaming() {
        let doc = classify(BAR_REPLY, RenderMode::Placeholder);
        assert_eq!(
            doc.blocks()[1],
            Block::ChartPlaceholder {
                kind: ChartKind::VegaLite,
                body: "{\"mark\":\"bar\"}\n".to_string(),
            }
        );
    }

    #[test]
    fn placeholder_mode_never_parses_json() {
        let doc = classify("```json/vega\n{\"marks\": [,\n```", RenderMode::Placeholder);
        assert!(matches!(
            doc.blocks()[0],
            Block::ChartPlaceholder {
                kind: ChartKind::Vega,
                ..
            }
        ));
    }

    #[test]
    fn invalid_chart_json_fails_in_place() {
        let doc = classify("```json/vega_lite\n{\"mark\": \"bar\",}\n```", RenderMode::Full);
        match &doc.blocks()[0] {
            Block::Chart { rendered, .. } => {
                assert_eq!(
                    rendered.error().map(|e| e.message()),
                    Some("trailing comma at line 1 column 16")
                );
            }
            other => panic!("expected chart, got {:?}", other),
        }
    }

    #[test]
    fn other_labels_stay_code() {
        let doc = classify(
            "```python\nprint(1)\n```\n\n```\nplain\n```\n\n```json\n{}\n```",
            RenderMode::Full,
        );
        assert_eq!(
            doc.blocks(),
            &[
                Block::Code {
                    language: Some("python".to_string()),
                    body: "print(1)\n".to_string(),
                },
                Block::Code {
                    language: None,
                    body: "plain\n".to_string(),
                },
                Block::Code {
                    language: Some("json".to_string()),
                    body: "{}\n".to_string(),
                },
            ]
        );
        assert_eq!(doc.chart_count(), 0);
    }

    #[test]
    fn label_must_match_exactly() {
        assert_eq!(FenceLabel::parse("json/vega_lite"), FenceLabel::VegaLite);
        assert_eq!(FenceLabel::parse("json/vega"), FenceLabel::Vega);
        assert_eq!(
            FenceLabel::parse("json/vegalite"),
            FenceLabel::Other("json/vegalite".to_string())
        );
        assert_eq!(FenceLabel::parse(""), FenceLabel::Plain);
    }

    #[test]
    fn unterminated_fence_runs_to_end() {
        let doc = classify("Loading\n\n```json/vega_lite\n{\"mark\":", RenderMode::Placeholder);
        assert_eq!(doc.blocks().len(), 2);
        assert_eq!(doc.blocks()[0], Block::Markdown("Loading".to_string()));
        assert!(matches!(doc.blocks()[1], Block::ChartPlaceholder { .. }));
    }

    #[test]
    fn control_characters_fall_back_to_literal() {
        let doc = classify("bad \u{1b}[31m text", RenderMode::Full);
        assert_eq!(
            doc.blocks(),
            &[Block::Literal("bad \\u{1b}[31m text".to_string())]
        );
    }

    #[test]
    fn code_inside_lists_stays_markdown() {
        let text = "1. step\n\n   ```sh\n   ls\n   ```\n2. next";
        let doc = classify(text, RenderMode::Full);
        assert_eq!(doc.blocks(), &[Block::Markdown(text.to_string())]);
    }

    #[test]
    fn classification_is_deterministic() {
        let text = "# Title\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\n```json/vega\n{\"marks\":[]}\n```";
        assert_eq!(classify(text, RenderMode::Full), classify(text, RenderMode::Full));
    }
}
