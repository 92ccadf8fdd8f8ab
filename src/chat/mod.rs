//! Text-chat collaborator types
//!
//! The sibling chat surface of the app, reduced to its contract: typed
//! message history, a streaming backend trait, and reply accumulation
//! with grounding-link de-duplication.

mod messages;
mod stream;

pub use messages::{ChatConfig, ChatMessage, ChatRole, GroundingLink};
pub use stream::{ChatBackend, ChatEvent, ChatReply, ReplyAccumulator};
