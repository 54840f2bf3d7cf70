//! Project retrieval filtered against what the conversation already covered.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use chatitp_core::{ChatError, ConversationState, ProjectHit, ProjectSearch};

/// Returned by [`ProjectRetriever::search_by_intent`] when every match was already discussed.
pub const NO_NEW_PROJECTS: &str = "No new relevant projects found.";

const RANDOM_QUERY: &str = "project";

#[derive(Clone)]
pub struct ProjectRetriever {
    search: Arc<dyn ProjectSearch>,
    timeout: Duration,
    attempts: usize,
    random_pool_size: usize,
    specific_pool_size: usize,
}

fn pick(candidates: &[ProjectHit]) -> Option<ProjectHit> {
    candidates.choose(&mut rand::thread_rng()).cloned()
}

impl ProjectRetriever {
    pub fn new(search: Arc<dyn ProjectSearch>, timeout: Duration) -> Self {
        Self {
            search,
            timeout,
            attempts: 10,
            random_pool_size: 10,
            specific_pool_size: 5,
        }
    }

    pub fn with_limits(mut self, attempts: usize, random_pool_size: usize, specific_pool_size: usize) -> Self {
        self.attempts = attempts;
        self.random_pool_size = random_pool_size;
        self.specific_pool_size = specific_pool_size;
        self
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ProjectHit>, ChatError> {
        match tokio::time::timeout(self.timeout, self.search.search(query, limit)).await {
            Ok(Ok(hits)) => Ok(hits),
            Ok(Err(e)) => Err(ChatError::generation(format!("project search failed: {:#}", e))),
            Err(_) => Err(ChatError::Generation(format!(
                "project search timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    /// Pick a random project not yet discussed and record it.
    ///
    /// When every round returns only discussed projects, the discussed set is
    /// cleared and a project is drawn from the last pool seen. Exhaustion is
    /// reported only when no round returned any candidate at all.
    pub async fn get_unique_project(&self, state: &mut ConversationState) -> Result<ProjectHit, ChatError> {
        let mut fallback_pool: Vec<ProjectHit> = Vec::new();

        for round in 1..=self.attempts {
            let hits = self.search(RANDOM_QUERY, self.random_pool_size).await?;
            if hits.is_empty() {
                debug!(round, "Random project search returned no candidates");
                continue;
            }

            let fresh: Vec<ProjectHit> = hits
                .iter()
                .filter(|h| !state.has_discussed(&h.id))
                .cloned()
                .collect();
            if let Some(project) = pick(&fresh) {
                state.record_project(project.id.clone());
                debug!(round, project = %project.id, "Picked unique project");
                return Ok(project);
            }
            fallback_pool = hits;
        }

        if let Some(project) = pick(&fallback_pool) {
            warn!(
                discussed = state.discussed_projects.len(),
                "Every candidate already discussed; resetting discussed projects"
            );
            state.discussed_projects.clear();
            state.record_project(project.id.clone());
            return Ok(project);
        }

        Err(ChatError::Exhaustion { attempts: self.attempts })
    }

    /// Text of a random undiscussed project among the best matches for `query`.
    pub async fn search_by_intent(&self, query: &str, state: &mut ConversationState) -> Result<String, ChatError> {
        let hits = self.search(query, self.specific_pool_size).await?;
        let fresh: Vec<ProjectHit> = hits
            .into_iter()
            .filter(|h| !state.has_discussed(&h.id))
            .collect();

        match pick(&fresh) {
            Some(project) => {
                info!(project = %project.id, "Matched project for query");
                state.record_project(project.id.clone());
                Ok(project.text)
            }
            None => Ok(NO_NEW_PROJECTS.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSearch {
        hits: Vec<ProjectHit>,
        calls: AtomicUsize,
    }

    impl FixedSearch {
        fn new(ids: &[&str]) -> Self {
            Self {
                hits: ids
                    .iter()
                    .map(|id| ProjectHit {
                        id: id.to_string(),
                        text: format!("{id} text"),
                        score: 1.0,
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProjectSearch for FixedSearch {
        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<ProjectHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.iter().take(limit).cloned().collect())
        }
    }

    fn retriever(search: Arc<FixedSearch>) -> ProjectRetriever {
        ProjectRetriever::new(search, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_unique_project_skips_discussed() {
        let search = Arc::new(FixedSearch::new(&["p1", "p2"]));
        let mut state = ConversationState::default();
        state.record_project("p1");

        let project = retriever(search).get_unique_project(&mut state).await.unwrap();
        assert_eq!(project.id, "p2");
        assert!(state.has_discussed("p1") && state.has_discussed("p2"));
    }

    #[tokio::test]
    async fn test_unique_project_resets_when_all_discussed() {
        let search = Arc::new(FixedSearch::new(&["p1", "p2"]));
        let mut state = ConversationState::default();
        state.record_project("p1");
        state.record_project("p2");
        state.record_project("p3");

        let project = retriever(search.clone()).get_unique_project(&mut state).await.unwrap();
        assert!(project.id == "p1" || project.id == "p2");
        assert_eq!(state.discussed_projects.len(), 1);
        assert!(state.has_discussed(&project.id));
        assert_eq!(search.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_unique_project_exhaustion_on_empty_search() {
        let search = Arc::new(FixedSearch::new(&[]));
        let mut state = ConversationState::default();
        let err = retriever(search.clone())
            .get_unique_project(&mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Exhaustion { attempts: 10 }));
        assert_eq!(search.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_search_by_intent_filters_and_records() {
        let search = Arc::new(FixedSearch::new(&["p1", "p2"]));
        let mut state = ConversationState::default();
        state.record_project("p2");

        let r = retriever(search);
        assert_eq!(r.search_by_intent("robots", &mut state).await.unwrap(), "p1 text");
        assert_eq!(
            r.search_by_intent("robots", &mut state).await.unwrap(),
            NO_NEW_PROJECTS
        );
        assert_eq!(state.discussed_projects.len(), 2);
    }
}
