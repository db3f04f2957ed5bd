use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use vegachat_core::ai::ChatTransport;
use vegachat_core::render::{classify, Block, Document, RenderMode};
use vegachat_core::stream::stream_chat;
use vegachat_core::{
    build_transport, ChartRenderer, ChatMessage, ChatRole, Config, Conversation, OllamaClient,
    PromiseTracker, Provider, ProviderError, RequestState, SAMPLE_PROMPTS,
};

use crate::desktop;
use crate::tui::AppEvent;

pub const COPY_FEEDBACK: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Identifies one chart block: the message it belongs to and its block index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChartRef {
    pub message: usize,
    pub block: usize,
}

/// Transient "copied" indicator. Starting it again replaces the deadline.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyFeedback {
    until: Option<Instant>,
}

impl CopyFeedback {
    pub fn start(&mut self, now: Instant) {
        self.until = Some(now + COPY_FEEDBACK);
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now < until)
    }

    /// Drop an expired deadline.
    pub fn expire(&mut self, now: Instant) {
        if !self.is_active(now) {
            self.until = None;
        }
    }
}

pub type ReplyTracker = PromiseTracker<String, ProviderError>;

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Input
    pub input: String,
    pub cursor: usize,

    // Conversation
    pub conversation: Conversation,
    pub streaming: String,
    pub tracker: ReplyTracker,
    pub query_task: Option<JoinHandle<()>>,
    pub events: UnboundedSender<AppEvent>,

    // Chat viewport
    pub scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub total_lines: u16,
    pub follow_bottom: bool,
    pub chat_area: Option<Rect>,

    // Charts
    pub focused_chart: Option<ChartRef>,
    pub raw_charts: HashSet<ChartRef>,
    pub scroll_to_focus: bool,
    pub renderer: ChartRenderer,
    pub export_dir: PathBuf,

    // Feedback
    pub copy_feedback: CopyFeedback,
    pub notice: Option<String>,
    pub animation_frame: usize,

    // Model picker state
    pub show_model_picker: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,

    // Provider state
    pub config: Config,
    pub config_path: Option<PathBuf>,
    pub current_provider: Provider,
    pub selected_model: String,
    pub transport: Option<Arc<dyn ChatTransport>>,
    pub show_provider_picker: bool,
    pub provider_picker_state: ListState,

    // API key input state
    pub show_api_key_input: bool,
    pub api_key_input: String,
    pub api_key_input_cursor: usize,
    pub api_key_target_provider: Option<Provider>,
}

impl App {
    /// `config` is the on-disk configuration; environment overrides are
    /// applied on top without being written back.
    pub fn new(config: Config, config_path: Option<PathBuf>, events: UnboundedSender<AppEvent>) -> Self {
        let current_provider = config.provider();
        let selected_model = config
            .default_model
            .clone()
            .unwrap_or_else(|| current_provider.default_model());
        let tracker = ReplyTracker::new(config.retry_policy());
        tracker.state_cell().on_change(|new, old| {
            tracing::debug!(from = old.as_str(), to = new.as_str(), "request state changed");
        });
        let export_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("vegachat")
            .join("charts");

        let mut app = Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            input: String::new(),
            cursor: 0,

            conversation: Conversation::new(),
            streaming: String::new(),
            tracker,
            query_task: None,
            events,

            scroll: 0,
            chat_height: 0,
            chat_width: 0,
            total_lines: 0,
            follow_bottom: true,
            chat_area: None,

            focused_chart: None,
            raw_charts: HashSet::new(),
            scroll_to_focus: false,
            renderer: ChartRenderer::default(),
            export_dir,

            copy_feedback: CopyFeedback::default(),
            notice: None,
            animation_frame: 0,

            show_model_picker: false,
            available_models: Vec::new(),
            model_picker_state: ListState::default(),

            config,
            config_path,
            current_provider,
            selected_model,
            transport: None,
            show_provider_picker: false,
            provider_picker_state: ListState::default(),

            show_api_key_input: false,
            api_key_input: String::new(),
            api_key_input_cursor: 0,
            api_key_target_provider: None,
        };
        app.refresh_transport();
        app
    }

    /// Configuration with environment overrides applied
    pub fn effective_config(&self) -> Config {
        let mut config = self.config.clone();
        config.apply_env();
        config
    }

    /// Rebuild the transport for the current provider.
    pub fn refresh_transport(&mut self) {
        match build_transport(self.current_provider, &self.effective_config()) {
            Ok(transport) => self.transport = Some(transport),
            Err(e) => {
                tracing::info!(provider = self.current_provider.as_str(), error = %e, "no transport");
                self.transport = None;
            }
        }
    }

    pub fn request_state(&self) -> RequestState {
        self.tracker.state()
    }

    pub fn is_loading(&self) -> bool {
        self.tracker.state().is_loading()
    }

    /// Send the input as the next user message.
    ///
    /// Ignored while a request is in flight or when the input is blank.
    pub fn submit(&mut self) {
        if self.is_loading() || self.input.trim().is_empty() {
            return;
        }
        let Some(transport) = self.transport.clone() else {
            self.open_api_key_input(self.current_provider);
            return;
        };

        let text = std::mem::take(&mut self.input);
        self.cursor = 0;
        self.conversation.push(ChatMessage::user(text));
        self.streaming.clear();
        self.notice = None;
        self.follow_bottom = true;

        let history = self.conversation.clone();
        let model = self.selected_model.clone();
        let stream_tx = self.events.clone();
        tracing::info!(
            provider = transport.name(),
            model = %model,
            messages = history.len(),
            "submitting prompt"
        );

        let request = self.tracker.retry(move || {
            let transport = Arc::clone(&transport);
            let history = history.clone();
            let model = model.clone();
            let tx = stream_tx.clone();
            async move {
                stream_chat(transport.as_ref(), &model, &history, |text| {
                    let _ = tx.send(AppEvent::Stream(text.to_string()));
                })
                .await
            }
        });

        let reply_tx = self.events.clone();
        self.query_task = Some(tokio::spawn(async move {
            let reply = request.await.ok().flatten();
            let _ = reply_tx.send(AppEvent::Reply(reply));
        }));
    }

    pub fn on_stream(&mut self, text: String) {
        self.streaming = text;
    }

    /// Commit a finished reply. On failure the partial text stays visible
    /// until the next request.
    pub fn on_reply(&mut self, reply: Option<String>) {
        self.query_task = None;
        if let Some(text) = reply {
            self.conversation.push(ChatMessage::assistant(text));
            self.streaming.clear();
            self.follow_bottom = true;
        }
    }

    /// Dismiss the last error.
    pub fn reset_request(&mut self) {
        if self.request_state() == RequestState::Error {
            self.tracker.reset();
        }
    }

    pub fn abort_request(&mut self) {
        if let Some(task) = self.query_task.take() {
            task.abort();
        }
    }

    /// Put a sample prompt into the input.
    pub fn select_sample(&mut self, index: usize) {
        if !self.conversation.is_empty() {
            return;
        }
        if let Some(prompt) = SAMPLE_PROMPTS.get(index) {
            self.input = prompt.to_string();
            self.cursor = self.input.chars().count();
            self.input_mode = InputMode::Editing;
        }
    }

    pub fn tick(&mut self) {
        if self.is_loading() {
            self.animation_frame = self.animation_frame.wrapping_add(1);
        }
        self.copy_feedback.expire(Instant::now());
    }

    // Scrolling
    pub fn max_scroll(&self) -> u16 {
        self.total_lines.saturating_sub(self.chat_height)
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_add(lines).min(self.max_scroll());
        self.follow_bottom = self.scroll >= self.max_scroll();
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
        self.follow_bottom = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow_bottom = true;
        self.scroll = self.max_scroll();
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    // Charts

    /// Classification of a committed message
    pub fn document(&self, message: usize) -> Option<Document> {
        self.conversation
            .messages()
            .get(message)
            .map(|m| classify(&m.content, RenderMode::Full))
    }

    /// Every chart block in the conversation, in display order
    pub fn chart_refs(&self) -> Vec<ChartRef> {
        self.conversation
            .iter()
            .enumerate()
            .flat_map(|(message, m)| {
                classify(&m.content, RenderMode::Placeholder)
                    .charts()
                    .map(|(block, _)| ChartRef { message, block })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn focus_next_chart(&mut self) {
        let charts = self.chart_refs();
        if charts.is_empty() {
            self.focused_chart = None;
            return;
        }
        let next = match self.focused_chart.and_then(|c| charts.iter().position(|r| *r == c)) {
            Some(i) => (i + 1) % charts.len(),
            None => 0,
        };
        self.focused_chart = Some(charts[next]);
        self.scroll_to_focus = true;
        self.follow_bottom = false;
    }

    pub fn toggle_raw_chart(&mut self) {
        if let Some(chart) = self.focused_chart {
            if !self.raw_charts.remove(&chart) {
                self.raw_charts.insert(chart);
            }
        }
    }

    pub fn is_raw(&self, chart: ChartRef) -> bool {
        self.raw_charts.contains(&chart)
    }

    fn focused_block(&self) -> Option<Block> {
        let chart = self.focused_chart?;
        self.document(chart.message)?
            .blocks()
            .get(chart.block)
            .cloned()
    }

    /// Export the focused chart to HTML and open it.
    pub fn open_focused_chart(&mut self) {
        let Some(Block::Chart { rendered, .. }) = self.focused_block() else {
            self.notice = Some("Select a chart with Tab first".to_string());
            return;
        };
        let Some(chart) = rendered.chart() else {
            self.notice = Some("This chart has errors and cannot be opened".to_string());
            return;
        };
        match self.renderer.export(&self.export_dir, chart) {
            Ok(path) => {
                if let Err(e) = desktop::open_path(&path) {
                    tracing::warn!(error = %e, "failed to open chart");
                }
                self.notice = Some(format!("Saved {}", path.display()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to export chart");
                self.notice = Some(format!("Export failed: {}", e));
            }
        }
    }

    // Copying

    /// Copy the focused chart's JSON.
    pub fn copy_focused(&mut self) {
        if let Some(block) = self.focused_block() {
            self.copy_text(block.source().to_string());
        }
    }

    pub fn copy_last_reply(&mut self) {
        if let Some(reply) = self.conversation.last_reply() {
            self.copy_text(reply.content.clone());
        }
    }

    fn copy_text(&mut self, text: String) {
        match desktop::copy_to_clipboard(&text) {
            Ok(()) => self.copy_feedback.start(Instant::now()),
            Err(e) => tracing::warn!(error = %e, "clipboard copy failed"),
        }
    }

    pub fn copied(&self) -> bool {
        self.copy_feedback.is_active(Instant::now())
    }

    // Model picker methods
    pub fn open_model_picker(&mut self, models: Vec<String>) {
        self.available_models = models;
        if self.available_models.is_empty() {
            self.notice = Some(format!("No models available for {}", self.current_provider.display_name()));
            return;
        }
        let current_idx = self
            .available_models
            .iter()
            .position(|m| m == &self.selected_model)
            .unwrap_or(0);
        self.model_picker_state.select(Some(current_idx));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = self.available_models.get(i) {
                self.selected_model = model.clone();
                self.show_model_picker = false;
                self.config.default_model = Some(self.selected_model.clone());
                self.save_config();
            }
        }
    }

    /// Fetch the model list off the event loop; the result arrives as
    /// `AppEvent::Models`.
    pub fn request_models(&mut self) {
        let provider = self.current_provider;
        if provider != Provider::Ollama {
            self.open_model_picker(provider.known_models());
            return;
        }

        let client = OllamaClient::new(self.effective_config().ollama_url());
        let tx = self.events.clone();
        self.notice = Some("Loading models...".to_string());
        tokio::spawn(async move {
            let models = match client.list_models().await {
                Ok(models) => models,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to list Ollama models");
                    Vec::new()
                }
            };
            let _ = tx.send(AppEvent::Models(provider, models));
        });
    }

    /// Show a fetched model list unless the provider changed meanwhile.
    pub fn on_models(&mut self, provider: Provider, models: Vec<String>) {
        self.notice = None;
        if provider == self.current_provider {
            self.open_model_picker(models);
        }
    }

    // Provider picker methods
    pub fn open_provider_picker(&mut self) {
        let current_idx = Provider::all()
            .iter()
            .position(|p| *p == self.current_provider)
            .unwrap_or(0);
        self.provider_picker_state.select(Some(current_idx));
        self.show_provider_picker = true;
    }

    pub fn provider_picker_nav_down(&mut self) {
        let len = Provider::all().len();
        let i = self.provider_picker_state.selected().unwrap_or(0);
        self.provider_picker_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn provider_picker_nav_up(&mut self) {
        let i = self.provider_picker_state.selected().unwrap_or(0);
        self.provider_picker_state.select(Some(i.saturating_sub(1)));
    }

    /// Switch provider, or ask for its key first.
    pub fn choose_provider(&mut self, provider: Provider) {
        self.show_provider_picker = false;
        if self.key_source(provider).is_none() {
            self.open_api_key_input(provider);
            return;
        }
        self.switch_provider(provider);
    }

    fn switch_provider(&mut self, provider: Provider) {
        if provider != self.current_provider {
            self.selected_model = provider.default_model();
            self.config.default_model = Some(self.selected_model.clone());
        }
        self.current_provider = provider;
        self.config.provider = Some(provider.as_str().to_string());
        self.save_config();
        self.refresh_transport();
    }

    /// Where the provider's key comes from: "env", "config", "local" or none
    pub fn key_source(&self, provider: Provider) -> Option<&'static str> {
        if !provider.requires_api_key() {
            return Some("local");
        }
        let present = |key: Option<&str>| key.is_some_and(|k| !k.trim().is_empty());
        let env_var = match provider {
            Provider::OpenAI => "OPENAI_API_KEY",
            _ => "ANTHROPIC_API_KEY",
        };
        if present(std::env::var(env_var).ok().as_deref()) {
            Some("env")
        } else if present(self.config.api_key(provider)) {
            Some("config")
        } else {
            None
        }
    }

    // API key input
    pub fn open_api_key_input(&mut self, provider: Provider) {
        self.api_key_target_provider = Some(provider);
        self.show_api_key_input = true;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
    }

    pub fn close_api_key_input(&mut self) {
        self.show_api_key_input = false;
        self.api_key_input.clear();
        self.api_key_input_cursor = 0;
        self.api_key_target_provider = None;
    }

    pub fn confirm_api_key(&mut self) {
        let key = self.api_key_input.trim().to_string();
        if let (false, Some(provider)) = (key.is_empty(), self.api_key_target_provider) {
            self.config.set_api_key(provider, key);
            self.switch_provider(provider);
        }
        self.close_api_key_input();
    }

    fn save_config(&mut self) {
        let result = match &self.config_path {
            Some(path) => self.config.save_to(path),
            None => self.config.save(),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to save config");
            self.notice = Some(format!("Could not save config: {}", e));
        }
    }

    pub fn provider_label(&self) -> &'static str {
        match self.current_provider {
            Provider::OpenAI => "OpenAI",
            Provider::Claude => "Claude",
            Provider::Ollama => "Ollama",
        }
    }

    /// Role label used in the chat transcript
    pub fn role_label(role: ChatRole) -> &'static str {
        match role {
            ChatRole::User => "You:",
            ChatRole::Assistant => "AI:",
            ChatRole::Developer => "System:",
        }
    }
}
