pub mod embeddings;
pub mod live_store;
pub mod project_index;
pub mod session_store;
pub mod sqlite_store;

pub use embeddings::{create_provider, EmbeddingBackend, EmbeddingProvider};
pub use live_store::MokaLiveStore;
pub use project_index::{CatalogProject, ProjectIndex};
pub use session_store::InMemorySessionStore;
pub use sqlite_store::SqliteSessionStore;
