//! ChatITP conversation engine
//!
//! Turn production for the chat backend: intent classification, project
//! retrieval, rolling summarization, state tracking and session persistence.

pub mod context_window;
pub mod engine;
pub mod intent;
pub mod llm;
pub mod prompts;
pub mod retrieval;
pub mod settings;
pub mod state_tracker;
pub mod summarizer;
pub mod user_locks;
pub mod working_set;

pub use context_window::ContextWindow;
pub use engine::{ConversationEngine, TurnOutput};
pub use intent::{Intent, IntentClassifier};
pub use llm::LlmClient;
pub use retrieval::{ProjectRetriever, NO_NEW_PROJECTS};
pub use settings::EngineSettings;
pub use state_tracker::{Correction, StateTracker};
pub use summarizer::Summarizer;
pub use user_locks::UserLocks;
pub use working_set::{WorkingSet, WorkingSets};
