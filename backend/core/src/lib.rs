pub mod completion;
pub mod error;
pub mod message;
pub mod session;
pub mod state;
pub mod traits;

pub use completion::normalize_completion;
pub use error::ChatError;
pub use message::{ChatMessage, MessageKind, Role};
pub use session::{ChatSession, SessionSummary};
pub use state::ConversationState;
pub use traits::{
    ImageGenerator, ImageOutcome, LiveStore, LlmProvider, LlmRequest, LlmResponse, ProjectHit,
    ProjectSearch, SessionRepository,
};
