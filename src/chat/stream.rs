use super::messages::{ChatConfig, ChatMessage, GroundingLink};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events streamed back by a chat backend
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A fragment of generated text
    TextDelta(String),
    /// Citations attached to the text generated so far
    Grounding(Vec<GroundingLink>),
}

/// Streaming text-generation backend
///
/// The collaborator seam for the text-chat surface: implementations wrap
/// whatever service generates the reply, the caller only sees the event
/// stream.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a streamed completion; events arrive on the receiver
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        config: ChatConfig,
    ) -> Result<mpsc::Receiver<ChatEvent>>;
}

/// A completed chat reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub full_text: String,
    pub grounding_links: Vec<GroundingLink>,
}

/// Assembles a full reply from streamed events
///
/// Text deltas are concatenated in arrival order; grounding links are
/// de-duplicated by URI, keeping the first title seen. Links without a
/// URI are dropped.
#[derive(Debug, Default)]
pub struct ReplyAccumulator {
    text: String,
    links: Vec<GroundingLink>,
}

impl ReplyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::TextDelta(delta) => self.text.push_str(&delta),
            ChatEvent::Grounding(links) => {
                for link in links {
                    if link.uri.is_empty() {
                        continue;
                    }
                    if self.links.iter().any(|seen| seen.uri == link.uri) {
                        continue;
                    }
                    self.links.push(link);
                }
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn links(&self) -> &[GroundingLink] {
        &self.links
    }

    pub fn finish(self) -> ChatReply {
        ChatReply {
            full_text: self.text,
            grounding_links: self.links,
        }
    }
}
