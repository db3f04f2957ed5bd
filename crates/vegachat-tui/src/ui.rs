use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};
use vegachat_core::chart::{Bar, RenderedChart};
use vegachat_core::render::{classify, Block as Segment, RenderMode, PLACEHOLDER_TEXT, PLACEHOLDER_TITLE};
use vegachat_core::{clamp_text, ChartKind, ChartOutcome, ChatRole, Provider, RequestState, SAMPLE_PROMPTS};

use crate::app::{App, ChartRef, InputMode};
use crate::markdown::markdown_lines;

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const MAX_INPUT_ROWS: u16 = 6;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let error = match app.request_state() {
        RequestState::Error => app.tracker.error().map(|e| e.to_string()),
        _ => None,
    };
    let error_height = if error.is_some() { 3 } else { 0 };
    let input_rows = (app.input.lines().count().max(1) as u16 + app.input.ends_with('\n') as u16)
        .min(MAX_INPUT_ROWS);

    let [header_area, chat_area, error_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(error_height),
        Constraint::Length(input_rows + 2),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    if let Some(message) = error {
        render_error(frame, error_area, &message);
    }
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if app.show_api_key_input {
        render_api_key_input(app, frame, area);
    } else if app.show_provider_picker {
        render_provider_picker(app, frame, area);
    } else if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" vegachat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw("  "),
        Span::styled(
            format!("{} · {}", app.provider_label(), app.selected_model),
            Style::default().fg(Color::White),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" EDIT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let keys: &[(&str, &str)] = match app.input_mode {
        InputMode::Editing => &[("Enter", "send"), ("Alt+Enter", "newline"), ("Esc", "normal")],
        InputMode::Normal if app.conversation.is_empty() => &[
            ("1-3", "sample"),
            ("i", "write"),
            ("P", "provider"),
            ("M", "model"),
            ("q", "quit"),
        ],
        InputMode::Normal => &[
            ("i", "write"),
            ("j/k", "scroll"),
            ("Tab", "chart"),
            ("v", "json"),
            ("o", "open"),
            ("y", "copy chart"),
            ("c", "copy reply"),
            ("P", "provider"),
            ("M", "model"),
            ("q", "quit"),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in keys {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }

    if app.copied() {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(
            " Copied! ",
            Style::default().bg(Color::Green).fg(Color::Black).bold(),
        ));
    }
    if let Some(notice) = &app.notice {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(notice.clone(), Style::default().fg(Color::Yellow)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_error(frame: &mut Frame, area: Rect, message: &str) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Error (r to dismiss) ");
    let error = Paragraph::new(message.to_string())
        .style(Style::default().fg(Color::White).bg(Color::Red))
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(error, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {}: {} ", app.provider_label(), app.selected_model));

    if app.conversation.is_empty() && app.streaming.is_empty() && !app.is_loading() {
        app.total_lines = 0;
        app.scroll = 0;
        let welcome = Paragraph::new(welcome_text())
            .block(block)
            .wrap(Wrap { trim: false });
        frame.render_widget(welcome, area);
        return;
    }

    let transcript = build_transcript(app);
    let width = app.chat_width.max(1);

    // Wrapped row offsets, so charts can be scrolled into view
    let mut row = 0usize;
    let mut chart_rows = Vec::new();
    let mut anchors = transcript.anchors.iter().peekable();
    for (i, line) in transcript.lines.iter().enumerate() {
        while let Some((chart, _)) = anchors.next_if(|(_, at)| *at == i) {
            chart_rows.push((*chart, row));
        }
        row += wrapped_rows(line, width);
    }

    app.total_lines = row.min(u16::MAX as usize) as u16;
    if app.scroll_to_focus {
        app.scroll_to_focus = false;
        if let Some(focused) = app.focused_chart {
            if let Some((_, at)) = chart_rows.iter().find(|(c, _)| *c == focused) {
                app.scroll = (*at).min(u16::MAX as usize) as u16;
            }
        }
    } else if app.follow_bottom {
        app.scroll = app.max_scroll();
    }
    app.scroll = app.scroll.min(app.max_scroll());

    let chat = Paragraph::new(Text::from(transcript.lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));
    frame.render_widget(chat, area);
}

/// Rows a line takes under the same word wrapping the chat is drawn with
fn wrapped_rows(line: &Line<'_>, width: u16) -> usize {
    Paragraph::new(line.clone())
        .wrap(Wrap { trim: false })
        .line_count(width)
}

fn welcome_text() -> Text<'static> {
    let mut lines = vec![
        Line::default(),
        Line::from(Span::styled(
            "vegachat",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            "Ask about your data and get Vega / Vega-Lite charts inline.",
            Style::default().fg(Color::DarkGray),
        )),
        Line::default(),
        Line::from("Try one of these:"),
        Line::default(),
    ];
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    for (i, prompt) in SAMPLE_PROMPTS.iter().enumerate() {
        let flat = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
        lines.push(Line::from(vec![
            Span::styled(format!(" {} ", i + 1), key_style),
            Span::raw(" "),
            Span::raw(clamp_text(&flat, 100, "...")),
        ]));
        lines.push(Line::default());
    }
    Text::from(lines)
}

struct Transcript {
    lines: Vec<Line<'static>>,
    /// Chart blocks and the index of their first line
    anchors: Vec<(ChartRef, usize)>,
}

fn build_transcript(app: &App) -> Transcript {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut anchors = Vec::new();
    let width = app.chat_width as usize;

    for (message, msg) in app.conversation.iter().enumerate() {
        lines.push(role_line(msg.role));
        let Some(doc) = app.document(message) else {
            continue;
        };
        for (index, block) in doc.blocks().iter().enumerate() {
            let chart = ChartRef { message, block: index };
            if block.is_chart() {
                anchors.push((chart, lines.len()));
            }
            lines.extend(block_lines(app, block, chart, width));
        }
        lines.push(Line::default());
    }

    if app.is_loading() || !app.streaming.is_empty() {
        lines.push(role_line(ChatRole::Assistant));
        let doc = classify(&app.streaming, RenderMode::Placeholder);
        for block in doc.blocks() {
            // Streaming blocks are never focusable
            let chart = ChartRef {
                message: usize::MAX,
                block: usize::MAX,
            };
            lines.extend(block_lines(app, block, chart, width));
        }
        if app.is_loading() {
            let spinner = SPINNER[app.animation_frame % SPINNER.len()];
            let label = if app.streaming.is_empty() { "Thinking..." } else { "Streaming..." };
            lines.push(Line::from(Span::styled(
                format!("{} {}", spinner, label),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }
    }

    Transcript { lines, anchors }
}

fn role_line(role: ChatRole) -> Line<'static> {
    let color = match role {
        ChatRole::User => Color::Cyan,
        ChatRole::Assistant => Color::Yellow,
        ChatRole::Developer => Color::DarkGray,
    };
    Line::from(Span::styled(
        App::role_label(role),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))
}

fn block_lines(app: &App, block: &Segment, chart: ChartRef, width: usize) -> Vec<Line<'static>> {
    match block {
        Segment::Markdown(source) => {
            let mut lines = markdown_lines(source);
            lines.push(Line::default());
            lines
        }
        Segment::Code { language, body } => {
            let mut lines = Vec::new();
            if let Some(language) = language {
                lines.push(Line::from(Span::styled(
                    format!("  {}", language),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )));
            }
            lines.extend(code_lines(body, Color::Green));
            lines.push(Line::default());
            lines
        }
        Segment::Literal(text) => {
            let mut lines: Vec<Line<'static>> =
                text.lines().map(|l| Line::raw(l.to_string())).collect();
            lines.push(Line::default());
            lines
        }
        Segment::ChartPlaceholder { kind, body } => {
            let mut lines = vec![
                Line::from(Span::styled(
                    format!("◌ {}", PLACEHOLDER_TITLE),
                    Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    PLACEHOLDER_TEXT,
                    Style::default().fg(Color::DarkGray),
                )),
                fence_label(*kind),
            ];
            lines.extend(code_lines(body, Color::DarkGray));
            lines.push(Line::default());
            lines
        }
        Segment::Chart {
            kind,
            body,
            rendered,
        } => {
            let focused = app.focused_chart == Some(chart);
            let raw = app.is_raw(chart);
            let mut lines = vec![chart_header(*kind, rendered, focused)];

            if raw {
                lines.push(fence_label(*kind));
                lines.extend(code_lines(body, Color::Yellow));
            } else {
                match rendered {
                    ChartOutcome::Rendered(chart) => lines.extend(chart_preview(chart, width)),
                    ChartOutcome::Failed(err) => lines.push(Line::from(Span::styled(
                        format!(" {} ", err),
                        Style::default().bg(Color::Red).fg(Color::White),
                    ))),
                }
            }
            if focused {
                let hint = if raw { "v chart" } else { "v json" };
                lines.push(Line::from(Span::styled(
                    format!("{} · o open in browser · y copy json", hint),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            lines.push(Line::default());
            lines
        }
    }
}

fn fence_label(kind: ChartKind) -> Line<'static> {
    Line::from(Span::styled(
        format!("  {}", kind.fence_label()),
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    ))
}

fn code_lines(body: &str, color: Color) -> Vec<Line<'static>> {
    body.lines()
        .map(|l| Line::from(Span::styled(format!("  {}", l), Style::default().fg(color))))
        .collect()
}

fn chart_header(kind: ChartKind, outcome: &ChartOutcome, focused: bool) -> Line<'static> {
    let marker = if focused { "▶ " } else { "▍ " };
    let name = match kind {
        ChartKind::VegaLite => "Vega-Lite chart",
        ChartKind::Vega => "Vega chart",
    };
    let style = if focused {
        Style::default().fg(Color::Black).bg(Color::Magenta).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)
    };

    let mut spans = vec![Span::styled(format!("{}{}", marker, name), style)];
    match outcome {
        ChartOutcome::Rendered(chart) => spans.push(Span::styled(
            format!("  {}×{}", chart.width, chart.height),
            Style::default().fg(Color::DarkGray),
        )),
        ChartOutcome::Failed(_) => spans.push(Span::styled(
            "  invalid specification",
            Style::default().fg(Color::Red),
        )),
    }
    Line::from(spans)
}

fn chart_preview(chart: &RenderedChart, width: usize) -> Vec<Line<'static>> {
    let summary = chart.summary();
    let mut lines = Vec::new();

    if let Some(title) = summary.title {
        lines.push(Line::from(Span::styled(title, Style::default().bold())));
    }

    let mut facts = Vec::new();
    if let Some(mark) = summary.mark {
        facts.push(format!("mark: {}", mark));
    }
    if summary.rows > 0 {
        facts.push(format!("{} rows", summary.rows));
    }
    if !summary.fields.is_empty() {
        facts.push(summary.fields.join(", "));
    }
    if !facts.is_empty() {
        lines.push(Line::from(Span::styled(
            facts.join(" · "),
            Style::default().fg(Color::DarkGray),
        )));
    }

    if let Some(bars) = chart.bars() {
        lines.extend(bar_lines(&bars, width));
    }
    lines
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn bar_lines(bars: &[Bar], width: usize) -> Vec<Line<'static>> {
    let label_width = bars
        .iter()
        .map(|b| b.label.chars().count())
        .max()
        .unwrap_or(0)
        .min(16);
    let values: Vec<String> = bars.iter().map(|b| format_value(b.value)).collect();
    let value_width = values.iter().map(String::len).max().unwrap_or(0);
    let max = bars.iter().map(|b| b.value).fold(0.0_f64, f64::max);
    let room = width.saturating_sub(label_width + value_width + 4).max(1);

    bars.iter()
        .zip(values)
        .map(|(bar, value)| {
            let len = if max > 0.0 && bar.value > 0.0 {
                ((bar.value / max) * room as f64).round().max(1.0) as usize
            } else {
                0
            };
            let label = clamp_text(&bar.label, label_width, "…");
            Line::from(vec![
                Span::styled(
                    format!("{:<width$} ", label, width = label_width),
                    Style::default().fg(Color::White),
                ),
                Span::styled("█".repeat(len), Style::default().fg(Color::Cyan)),
                Span::styled(format!(" {}", value), Style::default().fg(Color::DarkGray)),
            ])
        })
        .collect()
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };
    let title = if app.is_loading() {
        " Waiting for reply... ".to_string()
    } else if editing {
        " Message (Enter to send) ".to_string()
    } else {
        " Message (i to write) ".to_string()
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;

    // Cursor row and column within the input
    let before: String = app.input.chars().take(app.cursor).collect();
    let cursor_row = before.matches('\n').count();
    let cursor_col = before.rsplit('\n').next().map_or(0, |l| l.chars().count());

    let row_offset = cursor_row.saturating_sub(inner_height.saturating_sub(1));
    let col_offset = if inner_width == 0 || cursor_col < inner_width {
        0
    } else {
        cursor_col - inner_width + 1
    };

    let visible: Vec<Line> = app
        .input
        .split('\n')
        .skip(row_offset)
        .take(inner_height.max(1))
        .map(|line| Line::raw(line.chars().skip(col_offset).take(inner_width).collect::<String>()))
        .collect();

    // Use cyan text to match the "You:" style - visible in both light and dark terminals
    let input = Paragraph::new(Text::from(visible))
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    if editing && !app.show_api_key_input {
        frame.set_cursor_position((
            area.x + 1 + (cursor_col - col_offset) as u16,
            area.y + 1 + (cursor_row - row_offset) as u16,
        ));
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    Rect::new(
        (area.width.saturating_sub(width)) / 2,
        (area.height.saturating_sub(height)) / 2,
        width,
        height,
    )
}

fn picker_list<'a>(items: Vec<ListItem<'a>>, title: &'a str) -> List<'a> {
    List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(title),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ")
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_area = centered(area, 44, app.available_models.len() as u16 + 2);
    frame.render_widget(Clear, popup_area);

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| {
            let style = if model == &app.selected_model {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
        .collect();

    let list = picker_list(items, " Select Model (Enter to select, Esc to cancel) ");
    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

fn render_provider_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let providers = Provider::all();
    let popup_area = centered(area, 45, providers.len() as u16 + 2);
    frame.render_widget(Clear, popup_area);

    let items: Vec<ListItem> = providers
        .iter()
        .map(|provider| {
            let key_source = app.key_source(*provider);
            let is_current = *provider == app.current_provider;

            let status = match key_source {
                Some("env") => "(env var)",
                Some("config") => "(configured)",
                Some("local") => "(local)",
                _ => "(needs key)",
            };
            let prefix = if is_current { "* " } else { "  " };

            let style = if is_current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else if key_source.is_some() {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(format!("{}{} {}", prefix, provider.display_name(), status)).style(style)
        })
        .collect();

    let list = picker_list(items, " Select Provider ");
    frame.render_stateful_widget(list, popup_area, &mut app.provider_picker_state);
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    let provider_name = app
        .api_key_target_provider
        .map(|p| p.display_name())
        .unwrap_or("Provider");

    let popup_area = centered(area, 60, 7);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(format!(" Enter API Key for {} ", provider_name));

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Paste your API key below. Press Enter to save, Esc to cancel.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    let input = Paragraph::new(mask_key(&app.api_key_input)).style(Style::default().fg(Color::Cyan));
    frame.render_widget(input, input_area);

    let cursor_x = app.api_key_input_cursor.min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let status = Paragraph::new(format!("{} characters", app.api_key_input.chars().count()))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(status, Rect::new(inner.x, inner.y + 4, inner.width, 1));
}

/// Mask all but the last four characters.
fn mask_key(key: &str) -> String {
    let len = key.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let masked_len = len - 4;
    let last_four: String = key.chars().skip(masked_len).collect();
    format!("{}...{}", "*".repeat(masked_len.min(20)), last_four)
}
