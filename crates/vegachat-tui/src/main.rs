use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use vegachat_core::{Config, Provider};

mod app;
mod desktop;
mod handler;
mod markdown;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "vegachat")]
#[command(version, about = "Chat with an LLM and see its Vega / Vega-Lite charts in the terminal")]
struct Cli {
    /// Provider to start with (openai, claude, ollama)
    #[arg(short, long, value_parser = parse_provider)]
    provider: Option<Provider>,

    /// Model to start with
    #[arg(short, long)]
    model: Option<String>,

    /// Config file to read and write
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write logs here instead of the default log file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn parse_provider(s: &str) -> Result<Provider, String> {
    Provider::from_str(s).ok_or_else(|| format!("unknown provider '{}'", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.log_file.clone());
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting vegachat");

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::get_config_path()?,
    };
    let config = Config::load_from(&config_path)?;

    let mut events = EventHandler::new();
    let mut app = App::new(config, Some(config_path), events.sender());

    if let Some(provider) = cli.provider {
        app.current_provider = provider;
        app.selected_model = provider.default_model();
        app.refresh_transport();
    }
    if let Some(model) = cli.model {
        app.selected_model = model;
    }

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &mut app, &mut events).await;

    app.abort_request();
    tui::restore()?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "vegachat exited with an error");
    }
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::render(app, frame))?;

        let event = events
            .next()
            .await
            .ok_or_else(|| anyhow!("event channel closed"))?;
        handler::handle_event(app, event).await?;

        if app.should_quit {
            tracing::info!("quitting");
            return Ok(());
        }
    }
}

/// Log to a file; the terminal belongs to the UI.
fn setup_tracing(log_file: Option<PathBuf>) {
    use std::fs::OpenOptions;
    use std::sync::Mutex;

    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let Some(log_path) = log_file.or_else(|| {
        dirs::data_local_dir().map(|dir| dir.join("vegachat").join("vegachat.log"))
    }) else {
        return;
    };

    if let Some(parent) = log_path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return;
        }
    }

    let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) else {
        return;
    };

    let filter = EnvFilter::try_from_env("VEGACHAT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("vegachat=info,vegachat_core=info,vegachat_tui=info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    tracing::debug!(path = ?log_path, "tracing initialized");
}
