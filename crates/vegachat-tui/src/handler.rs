use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use vegachat_core::Provider;

use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
        AppEvent::Stream(text) => app.on_stream(text),
        AppEvent::Reply(reply) => app.on_reply(reply),
        AppEvent::Models(provider, models) => app.on_models(provider, models),
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    if app.show_api_key_input {
        handle_api_key_input(app, key);
        return Ok(());
    }
    if app.show_provider_picker {
        handle_provider_picker(app, key);
        return Ok(());
    }
    if app.show_model_picker {
        handle_model_picker(app, key);
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key).await,
        InputMode::Editing => {
            handle_editing_mode(app, key);
            Ok(())
        }
    }
}

async fn handle_normal_mode(app: &mut App, key: KeyEvent) -> Result<()> {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,

        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_down(app.half_page());
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_up(app.half_page());
        }
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('g') => app.scroll_up(u16::MAX),
        KeyCode::Char('G') => app.scroll_to_bottom(),

        KeyCode::Char(c @ '1'..='3') => {
            let index = (c as usize) - ('1' as usize);
            app.select_sample(index);
        }

        // Charts
        KeyCode::Tab => app.focus_next_chart(),
        KeyCode::Char('v') => app.toggle_raw_chart(),
        KeyCode::Char('o') => app.open_focused_chart(),

        // Copy
        KeyCode::Char('y') => app.copy_focused(),
        KeyCode::Char('c') => app.copy_last_reply(),

        KeyCode::Char('r') => app.reset_request(),

        KeyCode::Char('M') => app.request_models(),
        KeyCode::Char('P') => app.open_provider_picker(),

        KeyCode::Esc => {
            app.focused_chart = None;
            app.notice = None;
        }

        _ => {}
    }
    Ok(())
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, '\n');
            app.cursor += 1;
        }
        KeyCode::Enter => {
            app.submit();
            if app.input.is_empty() {
                app.input_mode = InputMode::Normal;
            }
        }
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

/// Insert pasted text into whichever input has focus.
fn handle_paste(app: &mut App, text: &str) {
    if app.show_api_key_input {
        let text = text.trim();
        let byte_pos = char_to_byte_index(&app.api_key_input, app.api_key_input_cursor);
        app.api_key_input.insert_str(byte_pos, text);
        app.api_key_input_cursor += text.chars().count();
    } else if app.input_mode == InputMode::Editing && !app.show_model_picker && !app.show_provider_picker {
        let text = text.replace("\r\n", "\n");
        let byte_pos = char_to_byte_index(&app.input, app.cursor);
        app.input.insert_str(byte_pos, &text);
        app.cursor += text.chars().count();
    }
}

fn handle_api_key_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_api_key_input(),
        KeyCode::Enter => app.confirm_api_key(),
        KeyCode::Backspace => {
            if app.api_key_input_cursor > 0 {
                app.api_key_input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.api_key_input, app.api_key_input_cursor);
                app.api_key_input.remove(byte_pos);
            }
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.api_key_input, app.api_key_input_cursor);
            app.api_key_input.insert(byte_pos, c);
            app.api_key_input_cursor += 1;
        }
        KeyCode::Left => {
            app.api_key_input_cursor = app.api_key_input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.api_key_input.chars().count();
            app.api_key_input_cursor = (app.api_key_input_cursor + 1).min(char_count);
        }
        _ => {}
    }
}

fn handle_provider_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_provider_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.provider_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.provider_picker_nav_up(),
        KeyCode::Enter => {
            let selected = app
                .provider_picker_state
                .selected()
                .and_then(|i| Provider::all().get(i).copied());
            if let Some(provider) = selected {
                app.choose_provider(provider);
            }
        }
        _ => {}
    }
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_model_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.model_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.model_picker_nav_up(),
        KeyCode::Enter => app.select_model(),
        _ => {}
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::test_app;
    use vegachat_core::SAMPLE_PROMPTS;

    fn press(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    async fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_event(app, press(KeyCode::Char(c))).await.unwrap();
        }
    }

    #[test]
    fn char_index_handles_multibyte() {
        assert_eq!(char_to_byte_index("añb", 2), 3);
        assert_eq!(char_to_byte_index("añb", 10), 4);
    }

    #[tokio::test]
    async fn editing_inserts_at_cursor() {
        let (mut app, _rx, _dir) = test_app();
        type_text(&mut app, "héllo").await;
        handle_event(&mut app, press(KeyCode::Home)).await.unwrap();
        handle_event(&mut app, press(KeyCode::Right)).await.unwrap();
        handle_event(&mut app, press(KeyCode::Delete)).await.unwrap();
        type_text(&mut app, "e").await;
        handle_event(&mut app, press(KeyCode::End)).await.unwrap();
        handle_event(&mut app, press(KeyCode::Backspace)).await.unwrap();

        assert_eq!(app.input, "hell");
        assert_eq!(app.cursor, 4);
    }

    #[tokio::test]
    async fn enter_submits_and_leaves_editing() {
        let (mut app, mut rx, _dir) = test_app();
        type_text(&mut app, "hi").await;
        handle_event(&mut app, press(KeyCode::Enter)).await.unwrap();

        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.conversation.len(), 1);

        while let Some(event) = rx.recv().await {
            let done = matches!(event, AppEvent::Reply(_));
            handle_event(&mut app, event).await.unwrap();
            if done {
                break;
            }
        }
        assert_eq!(app.conversation.len(), 2);
    }

    #[tokio::test]
    async fn number_keys_pick_sample_prompts() {
        let (mut app, _rx, _dir) = test_app();
        app.input_mode = InputMode::Normal;
        handle_event(&mut app, press(KeyCode::Char('3'))).await.unwrap();
        assert_eq!(app.input, SAMPLE_PROMPTS[2]);
        assert_eq!(app.input_mode, InputMode::Editing);
    }

    #[tokio::test]
    async fn provider_picker_requests_missing_key() {
        let (mut app, _rx, _dir) = test_app();
        app.input_mode = InputMode::Normal;
        app.config.claude_api_key = None;
        handle_event(&mut app, press(KeyCode::Char('P'))).await.unwrap();
        assert!(app.show_provider_picker);

        // Ollama is selected; move to Claude, which sits just above it.
        handle_event(&mut app, press(KeyCode::Up)).await.unwrap();
        handle_event(&mut app, press(KeyCode::Enter)).await.unwrap();

        assert!(!app.show_provider_picker);
        if std::env::var("ANTHROPIC_API_KEY").is_err() {
            assert!(app.show_api_key_input);
            handle_event(&mut app, press(KeyCode::Esc)).await.unwrap();
            assert!(!app.show_api_key_input);
            assert_eq!(app.current_provider, vegachat_core::Provider::Ollama);
        }
    }

    #[tokio::test]
    async fn paste_goes_to_focused_input() {
        let (mut app, _rx, _dir) = test_app();
        type_text(&mut app, "ab").await;
        handle_event(&mut app, press(KeyCode::Left)).await.unwrap();
        handle_event(&mut app, AppEvent::Paste("x\r\ny".to_string())).await.unwrap();
        assert_eq!(app.input, "ax\nyb");
        assert_eq!(app.cursor, 4);

        app.open_api_key_input(Provider::OpenAI);
        handle_event(&mut app, AppEvent::Paste(" sk-test\n".to_string())).await.unwrap();
        assert_eq!(app.api_key_input, "sk-test");
        assert_eq!(app.api_key_input_cursor, 7);
        assert_eq!(app.input, "ax\nyb");
    }

    #[tokio::test]
    async fn model_list_for_hosted_provider_opens_picker() {
        let (mut app, _rx, _dir) = test_app();
        app.input_mode = InputMode::Normal;
        app.current_provider = Provider::Claude;
        handle_event(&mut app, press(KeyCode::Char('M'))).await.unwrap();
        assert!(app.show_model_picker);
        assert_eq!(app.available_models, Provider::Claude.known_models());
    }

    #[tokio::test]
    async fn ollama_model_list_arrives_as_event() {
        if std::env::var("OLLAMA_HOST").is_ok() {
            return;
        }
        let (mut app, mut rx, _dir) = test_app();
        app.input_mode = InputMode::Normal;
        // Nothing listens on port 9, so the listing fails fast with no models.
        app.config.ollama_url = Some("http://127.0.0.1:9".to_string());
        handle_event(&mut app, press(KeyCode::Char('M'))).await.unwrap();
        assert!(!app.show_model_picker);
        assert!(app.notice.is_some());

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, AppEvent::Models(Provider::Ollama, _)));
        handle_event(&mut app, event).await.unwrap();
        assert!(app.notice.as_deref().is_some_and(|n| n.starts_with("No models")));
    }

    #[tokio::test]
    async fn stale_model_list_is_ignored() {
        let (mut app, _rx, _dir) = test_app();
        app.current_provider = Provider::OpenAI;
        let event = AppEvent::Models(Provider::Ollama, vec!["llama3.2".to_string()]);
        handle_event(&mut app, event).await.unwrap();
        assert!(!app.show_model_picker);
    }

    #[tokio::test]
    async fn ctrl_c_quits_from_any_mode() {
        let (mut app, _rx, _dir) = test_app();
        let event = AppEvent::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        handle_event(&mut app, event).await.unwrap();
        assert!(app.should_quit);
    }
}
