pub mod llama3;
pub mod mock;
pub mod openrouter;
pub mod replicate;

pub use mock::{ScriptedProvider, StaticImageGenerator};
pub use openrouter::OpenRouterProvider;
pub use replicate::{ReplicateClient, ReplicateImageGenerator, ReplicateProvider};
