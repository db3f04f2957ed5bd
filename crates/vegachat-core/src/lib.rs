pub mod ai;
pub mod chart;
pub mod config;
pub mod lifecycle;
pub mod provider;
pub mod reactive;
pub mod render;
pub mod retry;
pub mod state;
pub mod stream;
pub mod text;

// Re-export main types for convenience
pub use ai::{ChatTransport, ClaudeClient, OllamaClient, OpenAIClient, ProviderError, StreamEvent};
pub use chart::{ChartError, ChartKind, ChartOutcome, ChartRenderer, RenderedChart, SpecSource};
pub use config::Config;
pub use lifecycle::{PromiseTracker, RequestState};
pub use provider::{build_transport, Provider};
pub use reactive::ReactiveCell;
pub use render::{classify, Block, Document, FenceLabel, RenderMode};
pub use retry::{retry, RetryPolicy};
pub use state::{ChatMessage, ChatRole, Conversation};
pub use stream::{stream_chat, Accumulator};
pub use text::{clamp_text, SAMPLE_PROMPTS};
