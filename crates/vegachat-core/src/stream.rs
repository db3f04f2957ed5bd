//! Streaming accumulator
//!
//! Feeds a transport's event stream through an [`Accumulator`] and publishes
//! the running text once per event.

use futures_util::StreamExt;
use tracing::{debug, info};

use crate::ai::{ChatTransport, ProviderError, StreamEvent};
use crate::state::{ChatMessage, Conversation};

/// Instructions sent ahead of every conversation.
pub const SYSTEM_PROMPT: &str = "Create charts or data visualizations using Vega-Lite by default. \
Encapsulate the Vega-Lite code within a code block, tagged as ```json/vega_lite <spec>```. \
If a complex visualization is needed or specifically requested, use Vega. \
For Vega visualizations, encapsulate the code within a code block, tagged as ```json/vega <spec>```. \
Ensure the specifications are clear and accurate. \
**VERY IMPORTANT** Do not include comments within the Vega or Vega-Lite code blocks.";

/// Running text of an in-progress reply.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Accumulator {
    text: String,
    finished: bool,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event and return the text to publish.
    ///
    /// A `Done` replaces everything received so far, even when it differs
    /// from the concatenated deltas.
    pub fn apply(&mut self, event: StreamEvent) -> &str {
        match event {
            StreamEvent::Delta(delta) => self.text.push_str(&delta),
            StreamEvent::Done(text) => {
                self.text = text;
                self.finished = true;
            }
        }
        &self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// The message list actually sent: the system prompt, then the history.
pub fn request_messages(history: &Conversation) -> Vec<ChatMessage> {
    std::iter::once(ChatMessage::developer(SYSTEM_PROMPT))
        .chain(history.iter().cloned())
        .collect()
}

/// Stream one assistant reply for `history`.
///
/// `on_publish` is called synchronously with the running text after every
/// event, in arrival order. Resolves to the final text.
pub async fn stream_chat<F>(
    transport: &dyn ChatTransport,
    model: &str,
    history: &Conversation,
    mut on_publish: F,
) -> Result<String, ProviderError>
where
    F: FnMut(&str),
{
    let messages = request_messages(history);
    info!(
        provider = transport.name(),
        model,
        messages = messages.len(),
        "Opening chat stream"
    );

    let mut events = transport.open_stream(model, &messages).await?;
    let mut acc = Accumulator::new();
    let mut published = 0usize;

    while let Some(event) = events.next().await {
        let text = acc.apply(event?);
        on_publish(text);
        published += 1;
    }

    if !acc.is_finished() {
        debug!(published, "Stream ended without a done event");
    }
    debug!(published, chars = acc.text().len(), "Chat stream finished");
    Ok(acc.into_text())
}
