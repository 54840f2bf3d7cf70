//! The conversation engine.
//!
//! A turn classifies the request, gathers context and relevant projects, calls
//! the model once and records the exchange. Every read-modify-write of a
//! user's working set happens under that user's lock; the post-turn state
//! update re-reads the working set under the same lock before merging.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use chatitp_core::{
    ChatError, ChatMessage, ChatSession, ImageGenerator, ImageOutcome, LiveStore, LlmProvider,
    MessageKind, ProjectSearch, SessionRepository, SessionSummary,
};
use logging::{ConversationEvent, EventLogger};

use crate::context_window::ContextWindow;
use crate::intent::{Intent, IntentClassifier};
use crate::llm::LlmClient;
use crate::prompts;
use crate::retrieval::ProjectRetriever;
use crate::settings::EngineSettings;
use crate::state_tracker::{apply_corrections, strip_state_trailer, StateTracker};
use crate::summarizer::Summarizer;
use crate::user_locks::UserLocks;
use crate::working_set::{WorkingSet, WorkingSets};

pub const IMAGE_TIMEOUT_MESSAGE: &str = "Image generation timed out. Please try again.";
const IMAGE_HISTORY_CHARS: usize = 200;

/// Result of one `generate` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutput {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
}

impl TurnOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self { kind: MessageKind::Text, content: content.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self { kind: MessageKind::Image, content: url.into() }
    }
}

#[derive(Clone)]
pub struct ConversationEngine {
    settings: EngineSettings,
    llm: LlmClient,
    classifier: IntentClassifier,
    retriever: ProjectRetriever,
    summarizer: Summarizer,
    tracker: StateTracker,
    images: Option<Arc<dyn ImageGenerator>>,
    working_sets: WorkingSets,
    sessions: Arc<dyn SessionRepository>,
    locks: Arc<UserLocks>,
}

impl ConversationEngine {
    pub fn new(
        settings: EngineSettings,
        provider: Arc<dyn LlmProvider>,
        search: Arc<dyn ProjectSearch>,
        live: Arc<dyn LiveStore>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        let llm = LlmClient::new(provider, settings.call_timeout)
            .with_sampling(settings.max_tokens, settings.temperature);
        let retriever = ProjectRetriever::new(search, settings.call_timeout).with_limits(
            settings.unique_project_attempts,
            settings.random_pool_size,
            settings.specific_pool_size,
        );
        Self {
            classifier: IntentClassifier::new(llm.clone()),
            summarizer: Summarizer::new(llm.clone()),
            tracker: StateTracker::new(llm.clone()),
            retriever,
            llm,
            images: None,
            working_sets: WorkingSets::new(live),
            sessions,
            locks: Arc::new(UserLocks::new()),
            settings,
        }
    }

    /// Enable image turns. Without a generator every request is treated as text.
    pub fn with_images(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // -----------------------------------------------------------------------
    // Working set lifecycle
    // -----------------------------------------------------------------------

    /// Reset the live working set to `[system: prompt]` with fresh state.
    #[instrument(skip(self, system_prompt))]
    pub async fn initialize(&self, user_id: &str, system_prompt: &str) -> Result<(), ChatError> {
        let _guard = self.locks.acquire(user_id).await;
        self.working_sets
            .replace(user_id, &WorkingSet::initial(system_prompt))
            .await?;
        EventLogger::log_event(
            user_id,
            ConversationEvent::Initialized { message_count: 1, rebuilt_state: false },
        );
        Ok(())
    }

    /// Replace the live log. When loading a session the state is rebuilt from
    /// the messages; otherwise it is kept, apart from the system prompt.
    #[instrument(skip(self, messages), fields(messages = messages.len()))]
    pub async fn initialize_with_messages(
        &self,
        user_id: &str,
        messages: Vec<ChatMessage>,
        is_loading_session: bool,
    ) -> Result<(), ChatError> {
        let _guard = self.locks.acquire(user_id).await;

        let state = if is_loading_session {
            self.tracker.rebuild(&messages).await?
        } else {
            let mut state = self.working_sets.load(user_id).await?.state;
            if let Some(system) = messages.iter().find(|m| m.is_system()) {
                state.system_prompt = system.content.clone();
            }
            state
        };

        let message_count = messages.len();
        self.working_sets
            .replace(user_id, &WorkingSet { messages, state })
            .await?;
        EventLogger::log_event(
            user_id,
            ConversationEvent::Initialized { message_count, rebuilt_state: is_loading_session },
        );
        Ok(())
    }

    /// Drop the live working set.
    pub async fn clear_session(&self, user_id: &str) -> Result<(), ChatError> {
        let _guard = self.locks.acquire(user_id).await;
        self.working_sets.clear(user_id).await
    }

    /// Current live message log.
    pub async fn messages(&self, user_id: &str) -> Result<Vec<ChatMessage>, ChatError> {
        Ok(self.working_sets.load(user_id).await?.messages)
    }

    /// Snapshot of the live working set.
    pub async fn working_set(&self, user_id: &str) -> Result<WorkingSet, ChatError> {
        self.working_sets.load(user_id).await
    }

    // -----------------------------------------------------------------------
    // Turn production
    // -----------------------------------------------------------------------

    #[instrument(skip(self, user_prompt))]
    pub async fn generate(&self, user_prompt: &str, user_id: &str) -> Result<TurnOutput, ChatError> {
        let result = self.produce_turn(user_prompt, user_id).await;
        if let Err(e) = &result {
            error!(error = %e, "Turn failed");
            EventLogger::log_event(user_id, ConversationEvent::TurnFailed { error_msg: e.to_string() });
        }
        result
    }

    async fn produce_turn(&self, user_prompt: &str, user_id: &str) -> Result<TurnOutput, ChatError> {
        let guard = self.locks.acquire(user_id).await;
        let epoch = self.working_sets.epoch(user_id).await?;
        let mut set = self.working_sets.load(user_id).await?;

        if let Some(images) = &self.images {
            if self.settings.image_enabled && self.classifier.is_image_request(user_prompt).await? {
                let output = self.image_turn(images.as_ref(), user_prompt, &mut set).await;
                self.working_sets.save(user_id, &set).await?;
                EventLogger::log_event(
                    user_id,
                    ConversationEvent::TurnCompleted {
                        kind: "image".into(),
                        interaction_count: set.state.interaction_count,
                        response_chars: output.content.len(),
                    },
                );
                return Ok(output);
            }
        }

        set.state.interaction_count += 1;

        let context = ContextWindow::build(
            &set.messages,
            &set.state,
            &self.summarizer,
            self.settings.summarize_threshold,
            self.settings.max_full_history,
        )
        .await?;
        if context.summarized_turns > 0 {
            debug!(summarized = context.summarized_turns, "Context summarized");
        }

        let relevant = self.relevant_project(user_prompt, &mut set).await?;
        let prompt = prompts::turn(&context.text, user_prompt, relevant.as_deref());

        let raw = self.llm.complete(&set.state.system_prompt, &prompt).await?;
        let response = strip_state_trailer(&raw);

        set.messages.push(ChatMessage::user(user_prompt));
        set.messages.push(ChatMessage::assistant(response.clone()));

        let interval = self.settings.context_validation_interval;
        if interval > 0 && set.state.interaction_count % interval == 0 {
            self.apply_validation(user_id, &mut set).await;
        }

        self.working_sets.save(user_id, &set).await?;
        drop(guard);

        EventLogger::log_event(
            user_id,
            ConversationEvent::TurnCompleted {
                kind: "text".into(),
                interaction_count: set.state.interaction_count,
                response_chars: response.len(),
            },
        );

        if self.settings.detach_state_updates {
            let engine = self.clone();
            let user_id = user_id.to_string();
            let response = response.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.update_state(&user_id, epoch, &response).await {
                    warn!(user_id = %user_id, error = %e, "Detached state update failed");
                }
            });
        } else if let Err(e) = self.update_state(user_id, epoch, &response).await {
            warn!(user_id = %user_id, error = %e, "State update failed");
        }

        Ok(TurnOutput::text(response))
    }

    /// Relevant project text for the request, if the request asks for one.
    async fn relevant_project(
        &self,
        user_prompt: &str,
        set: &mut WorkingSet,
    ) -> Result<Option<String>, ChatError> {
        match self.classifier.classify(user_prompt).await? {
            Intent::YesRandom => {
                let project = self.retriever.get_unique_project(&mut set.state).await?;
                info!(project = %project.id, "Random project selected");
                Ok(Some(project.text))
            }
            Intent::YesSpecific => Ok(Some(
                self.retriever.search_by_intent(user_prompt, &mut set.state).await?,
            )),
            Intent::No => Ok(None),
        }
    }

    async fn image_turn(
        &self,
        images: &dyn ImageGenerator,
        user_prompt: &str,
        set: &mut WorkingSet,
    ) -> TurnOutput {
        let turns: Vec<&ChatMessage> = set.messages.iter().filter(|m| !m.is_system()).collect();
        let tail = &turns[turns.len().saturating_sub(self.settings.image_history_turns)..];
        let recent: Vec<String> = tail
            .iter()
            .map(|m| {
                let line = m.render();
                match line.char_indices().nth(IMAGE_HISTORY_CHARS) {
                    Some((cut, _)) => line[..cut].to_string(),
                    None => line,
                }
            })
            .collect();
        let prompt = prompts::image(user_prompt, &recent, &set.state.key_topics);

        let outcome = tokio::time::timeout(
            self.settings.call_timeout,
            images.generate_image(&prompt, self.settings.image_width, self.settings.image_height),
        )
        .await
        .unwrap_or_else(|_| ImageOutcome::failure(IMAGE_TIMEOUT_MESSAGE));

        set.messages.push(ChatMessage::user(user_prompt));
        if outcome.success {
            info!("Image generated");
            set.messages
                .push(ChatMessage::assistant_image(outcome.content.clone(), outcome.content.clone()));
            TurnOutput::image(outcome.content)
        } else {
            warn!(reason = %outcome.content, "Image generation failed");
            set.messages.push(ChatMessage::assistant(outcome.content.clone()));
            TurnOutput::text(outcome.content)
        }
    }

    /// Merge projects/topics mentioned in `response` into the working set, unless
    /// it was replaced or cleared since the turn that produced `response`.
    async fn update_state(&self, user_id: &str, epoch: u64, response: &str) -> Result<(), ChatError> {
        let (projects, topics) = self.tracker.extract(response).await?;
        if projects.is_empty() && topics.is_empty() {
            return Ok(());
        }

        let _guard = self.locks.acquire(user_id).await;
        if self.working_sets.epoch(user_id).await? != epoch {
            debug!(epoch, "Working set replaced before state update; dropping it");
            return Ok(());
        }
        let mut set = self.working_sets.load(user_id).await?;

        let before = (set.state.discussed_projects.len(), set.state.key_topics.len());
        set.state.merge(projects, topics);
        self.working_sets.save(user_id, &set).await?;

        EventLogger::log_event(
            user_id,
            ConversationEvent::StateUpdated {
                projects_added: set.state.discussed_projects.len() - before.0,
                topics_added: set.state.key_topics.len() - before.1,
            },
        );
        Ok(())
    }

    /// Best-effort reconciliation of tracked state against the full history.
    async fn apply_validation(&self, user_id: &str, set: &mut WorkingSet) {
        match self.tracker.validate(&set.messages, &set.state).await {
            Ok(corrections) => {
                let applied = apply_corrections(&mut set.state, &corrections);
                EventLogger::log_event(
                    user_id,
                    ConversationEvent::ContextValidated { corrections_applied: applied },
                );
            }
            Err(e) => warn!(error = %e, "Context validation skipped"),
        }
    }

    /// Run a validation pass now, outside the regular interval.
    pub async fn validate_context(&self, user_id: &str) -> Result<(), ChatError> {
        let _guard = self.locks.acquire(user_id).await;
        let mut set = self.working_sets.load(user_id).await?;
        let corrections = self.tracker.validate(&set.messages, &set.state).await?;
        let applied = apply_corrections(&mut set.state, &corrections);
        self.working_sets.save(user_id, &set).await?;
        EventLogger::log_event(
            user_id,
            ConversationEvent::ContextValidated { corrections_applied: applied },
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Durable sessions
    // -----------------------------------------------------------------------

    /// Persist the live working set. Returns the session id (new or reused).
    #[instrument(skip(self))]
    pub async fn save_chat_session(
        &self,
        user_id: &str,
        session_id: Option<String>,
    ) -> Result<String, ChatError> {
        let _guard = self.locks.acquire(user_id).await;
        let set = self.working_sets.load(user_id).await?;

        let mut messages = set.messages;
        if messages.first().is_some_and(ChatMessage::is_system) {
            messages.remove(0);
        }
        if messages.is_empty() {
            return Err(ChatError::InvalidRequest("no conversation to save".into()));
        }

        let existing = match session_id.as_deref().filter(|id| !id.trim().is_empty()) {
            Some(id) => self.sessions.find(id, user_id).await.map_err(ChatError::persistence)?,
            None => None,
        };
        let session = match existing {
            Some(mut session) => {
                session.messages = messages;
                session.state = set.state;
                session.updated_at = Utc::now();
                session
            }
            None => ChatSession::new(session_id, user_id, messages, set.state),
        };

        self.sessions.upsert(&session).await.map_err(ChatError::persistence)?;
        EventLogger::log_event(
            user_id,
            ConversationEvent::SessionSaved {
                session_id: session.session_id.clone(),
                message_count: session.messages.len(),
            },
        );
        Ok(session.session_id)
    }

    /// Restore a saved session as the live working set and return its messages.
    #[instrument(skip(self))]
    pub async fn load_chat_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let _guard = self.locks.acquire(user_id).await;
        let session = self
            .sessions
            .find(session_id, user_id)
            .await
            .map_err(ChatError::persistence)?
            .ok_or_else(|| ChatError::SessionNotFound { session_id: session_id.to_string() })?;

        let mut live = Vec::with_capacity(session.messages.len() + 1);
        live.push(ChatMessage::system(session.state.system_prompt.clone()));
        live.extend(session.messages.iter().cloned());

        let untracked = session.state.discussed_projects.is_empty() && session.state.key_topics.is_empty();
        let state = if untracked && !session.messages.is_empty() {
            let mut rebuilt = self.tracker.rebuild(&live).await?;
            rebuilt.interaction_count = rebuilt.interaction_count.max(session.state.interaction_count);
            rebuilt
        } else {
            session.state.clone()
        };

        self.working_sets
            .replace(user_id, &WorkingSet { messages: live, state })
            .await?;
        EventLogger::log_event(
            user_id,
            ConversationEvent::SessionLoaded {
                session_id: session.session_id.clone(),
                message_count: session.messages.len(),
            },
        );
        Ok(session.messages)
    }

    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, ChatError> {
        self.sessions.list(user_id).await.map_err(ChatError::persistence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use chatitp_core::{ConversationState, ProjectHit, Role};
    use chatitp_memory::{InMemorySessionStore, MokaLiveStore};
    use chatitp_providers::{ScriptedProvider, StaticImageGenerator};
    use serde_json::Value;

    const SYSTEM: &str = "You are a helpful assistant.";

    struct StaticSearch(Vec<ProjectHit>);

    impl StaticSearch {
        fn new(ids: &[&str]) -> Arc<Self> {
            Arc::new(Self(
                ids.iter()
                    .map(|id| ProjectHit {
                        id: id.to_string(),
                        text: format!("Project {id}: a capstone about {id}"),
                        score: 1.0,
                    })
                    .collect(),
            ))
        }
    }

    #[async_trait]
    impl ProjectSearch for StaticSearch {
        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<ProjectHit>> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            detach_state_updates: false,
            call_timeout: Duration::from_secs(5),
            ..EngineSettings::default()
        }
    }

    /// Classifiers answer "no" and extraction finds nothing unless overridden.
    fn chat_provider() -> ScriptedProvider {
        ScriptedProvider::new().with_default("Hi! How can I help you today?")
    }

    fn with_defaults(provider: ScriptedProvider) -> ScriptedProvider {
        provider
            .when(prompts::IMAGE_LABEL, "NO")
            .when(prompts::INTENT_LABEL, "NO")
            .when(prompts::EXTRACTION_HEADER, "Projects: None\nTopics: None")
            .when(prompts::VALIDATION_HEADER, "Corrections:")
            .when(prompts::SUMMARY_HEADER, "SUMMARY-TEXT")
    }

    struct Harness {
        engine: ConversationEngine,
        provider: Arc<ScriptedProvider>,
    }

    fn harness_with(provider: ScriptedProvider, search: Arc<StaticSearch>, settings: EngineSettings) -> Harness {
        let provider = Arc::new(with_defaults(provider));
        let engine = ConversationEngine::new(
            settings,
            provider.clone(),
            search,
            Arc::new(MokaLiveStore::default()),
            Arc::new(InMemorySessionStore::new()),
        );
        Harness { engine, provider }
    }

    fn harness(provider: ScriptedProvider) -> Harness {
        harness_with(provider, StaticSearch::new(&["p1", "p2"]), settings())
    }

    fn turn_prompts(provider: &ScriptedProvider) -> Vec<String> {
        provider
            .requests()
            .into_iter()
            .map(|r| r.user_prompt)
            .filter(|p| p.contains("Do not bring up projects"))
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let h = harness(chat_provider());
        h.engine.initialize("u1", SYSTEM).await.unwrap();
        let once = h.engine.working_set("u1").await.unwrap();
        h.engine.initialize("u1", SYSTEM).await.unwrap();
        let twice = h.engine.working_set("u1").await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.messages, vec![ChatMessage::system(SYSTEM)]);
        assert_eq!(twice.state, ConversationState::new(SYSTEM));
    }

    #[tokio::test]
    async fn test_hello_produces_three_message_log() {
        let h = harness(chat_provider().when(prompts::EXTRACTION_HEADER, "Projects: None\nTopics: greetings"));
        h.engine.initialize("u1", SYSTEM).await.unwrap();

        let out = h.engine.generate("Hello", "u1").await.unwrap();
        assert_eq!(out.kind, MessageKind::Text);
        assert!(!out.content.is_empty());

        let set = h.engine.working_set("u1").await.unwrap();
        let roles: Vec<Role> = set.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(set.state.interaction_count, 1);
        assert_eq!(set.state.key_topics, vec!["greetings"]);

        let request = h
            .provider
            .requests()
            .into_iter()
            .find(|r| r.user_prompt.contains("Do not bring up projects"))
            .unwrap();
        assert_eq!(request.system_prompt, SYSTEM);
        assert!(request.user_prompt.contains("user: Hello"));
    }

    #[tokio::test]
    async fn test_random_project_is_recorded_and_injected() {
        let h = harness(chat_provider().when(prompts::INTENT_LABEL, "YES_RANDOM"));
        h.engine.initialize("u1", SYSTEM).await.unwrap();

        h.engine.generate("show me a random project", "u1").await.unwrap();

        let state = h.engine.working_set("u1").await.unwrap().state;
        assert_eq!(state.discussed_projects.len(), 1);
        let chosen = state.discussed_projects.iter().next().unwrap().clone();
        assert!(chosen == "p1" || chosen == "p2");

        let prompts = turn_prompts(&h.provider);
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(&format!("Project {chosen}: a capstone about {chosen}")));
    }

    #[tokio::test]
    async fn test_random_project_when_everything_discussed() {
        let h = harness(chat_provider().when(prompts::INTENT_LABEL, "YES_RANDOM"));
        let mut state = ConversationState::new(SYSTEM);
        state.record_project("p1");
        state.record_project("p2");
        h.engine
            .working_sets
            .save("u1", &WorkingSet { messages: vec![ChatMessage::system(SYSTEM)], state })
            .await
            .unwrap();

        let out = h.engine.generate("another random one", "u1").await.unwrap();
        assert_eq!(out.kind, MessageKind::Text);
        let state = h.engine.working_set("u1").await.unwrap().state;
        assert_eq!(state.discussed_projects.len(), 1);
    }

    #[tokio::test]
    async fn test_random_project_with_empty_catalog_fails() {
        let h = harness_with(
            chat_provider().when(prompts::INTENT_LABEL, "YES_RANDOM"),
            StaticSearch::new(&[]),
            settings(),
        );
        h.engine.initialize("u1", SYSTEM).await.unwrap();

        let err = h.engine.generate("random project please", "u1").await.unwrap_err();
        assert!(matches!(err, ChatError::Exhaustion { .. }));
        let set = h.engine.working_set("u1").await.unwrap();
        assert_eq!(set.messages.len(), 1);
        assert_eq!(set.state.interaction_count, 0);
    }

    #[tokio::test]
    async fn test_specific_project_uses_search() {
        let h = harness(chat_provider().when(prompts::INTENT_LABEL, "YES_SPECIFIC"));
        h.engine.initialize("u1", SYSTEM).await.unwrap();

        h.engine.generate("anything about p1 or p2?", "u1").await.unwrap();
        h.engine.generate("more of those", "u1").await.unwrap();
        h.engine.generate("and another", "u1").await.unwrap();

        let prompts = turn_prompts(&h.provider);
        assert!(prompts[2].contains(crate::retrieval::NO_NEW_PROJECTS));
        let state = h.engine.working_set("u1").await.unwrap().state;
        assert_eq!(state.discussed_projects.len(), 2);
    }

    #[tokio::test]
    async fn test_interaction_count_skips_image_turns() {
        let provider = chat_provider().when("Query: draw", "YES");
        let h = harness(provider);
        let images = Arc::new(StaticImageGenerator::new(ImageOutcome::success("https://img/robot.png")));
        let engine = h.engine.clone().with_images(images.clone());
        engine.initialize("u1", SYSTEM).await.unwrap();

        engine.generate("Hello", "u1").await.unwrap();
        let image = engine.generate("draw me a robot", "u1").await.unwrap();
        engine.generate("Thanks", "u1").await.unwrap();

        assert_eq!(image, TurnOutput::image("https://img/robot.png"));
        let set = engine.working_set("u1").await.unwrap();
        assert_eq!(set.state.interaction_count, 2);
        assert_eq!(set.messages.len(), 7);
        assert_eq!(set.messages[4].kind, MessageKind::Image);
        assert_eq!(set.messages[4].image_url.as_deref(), Some("https://img/robot.png"));

        let prompt = &images.prompts()[0];
        assert!(prompt.contains("draw me a robot"));
        assert!(prompt.contains("user: Hello"));
    }

    #[tokio::test]
    async fn test_image_prompt_uses_only_recent_turns() {
        let h = harness_with(
            chat_provider().when("Query: draw", "YES"),
            StaticSearch::new(&["p1"]),
            EngineSettings { image_history_turns: 2, ..settings() },
        );
        let images = Arc::new(StaticImageGenerator::new(ImageOutcome::success("https://img/a.png")));
        let engine = h.engine.clone().with_images(images.clone());
        engine.initialize("u1", SYSTEM).await.unwrap();

        engine.generate("Hello", "u1").await.unwrap();
        engine.generate("Second", "u1").await.unwrap();
        engine.generate("draw a bridge", "u1").await.unwrap();

        let prompt = &images.prompts()[0];
        assert!(prompt.contains("user: Second"));
        assert!(!prompt.contains("user: Hello"));
        assert!(!prompt.contains(SYSTEM));
    }

    #[tokio::test]
    async fn test_image_failure_becomes_text_turn() {
        let h = harness(chat_provider().when("Query: draw", "YES"));
        let engine = h.engine.clone().with_images(Arc::new(StaticImageGenerator::new(
            ImageOutcome::failure("NSFW content detected. Please try a different prompt."),
        )));
        engine.initialize("u1", SYSTEM).await.unwrap();

        let out = engine.generate("draw something rude", "u1").await.unwrap();
        assert_eq!(out.kind, MessageKind::Text);
        assert!(out.content.starts_with("NSFW content detected"));

        let set = engine.working_set("u1").await.unwrap();
        assert_eq!(set.messages.len(), 3);
        assert_eq!(set.messages[2].kind, MessageKind::Text);
        assert_eq!(set.state.interaction_count, 0);
    }

    #[tokio::test]
    async fn test_long_log_is_summarized() {
        let h = harness(chat_provider());
        let log: Vec<ChatMessage> = (0..60)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("question {i}"))
                } else {
                    ChatMessage::assistant(format!("answer {i}"))
                }
            })
            .collect();
        h.engine.initialize_with_messages("u1", log, false).await.unwrap();

        h.engine.generate("Hello", "u1").await.unwrap();

        let requests = h.provider.requests();
        let summaries: Vec<_> = requests
            .iter()
            .filter(|r| r.user_prompt.contains(prompts::SUMMARY_HEADER))
            .collect();
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].user_prompt.contains("user: question 0"));
        assert!(summaries[0].user_prompt.contains("assistant: answer 49"));
        assert!(!summaries[0].user_prompt.contains("question 50"));

        let turn = &turn_prompts(&h.provider)[0];
        assert!(turn.contains("SUMMARY-TEXT"));
        assert!(!turn.contains("user: question 0\n"));
        assert!(turn.contains("user: question 50"));
        assert!(turn.contains("assistant: answer 59"));
    }

    #[tokio::test]
    async fn test_summarization_failure_aborts_turn() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .when(prompts::IMAGE_LABEL, "NO")
                .when(prompts::SUMMARY_HEADER, Value::Null),
        );
        let engine = ConversationEngine::new(
            settings(),
            provider,
            StaticSearch::new(&[]),
            Arc::new(MokaLiveStore::default()),
            Arc::new(InMemorySessionStore::new()),
        );
        let log: Vec<ChatMessage> = (0..51).map(|i| ChatMessage::user(format!("m{i}"))).collect();
        engine.initialize_with_messages("u1", log, false).await.unwrap();

        let err = engine.generate("Hello", "u1").await.unwrap_err();
        assert!(matches!(err, ChatError::Summarization(_)));
        assert_eq!(engine.messages("u1").await.unwrap().len(), 51);
    }

    #[tokio::test]
    async fn test_generation_failure_persists_nothing() {
        let h = harness(chat_provider().with_default(Value::Null));
        h.engine.initialize("u1", SYSTEM).await.unwrap();

        let err = h.engine.generate("Hello", "u1").await.unwrap_err();
        assert!(matches!(err, ChatError::Generation(_)));

        let set = h.engine.working_set("u1").await.unwrap();
        assert_eq!(set.messages.len(), 1);
        assert_eq!(set.state.interaction_count, 0);
    }

    #[tokio::test]
    async fn test_leaked_state_trailer_is_stripped() {
        let h = harness(chat_provider().with_default("Try p1.\n\nDiscussed projects: p1\nKey topics: None"));
        h.engine.initialize("u1", SYSTEM).await.unwrap();
        let out = h.engine.generate("Hello", "u1").await.unwrap();
        assert_eq!(out.content, "Try p1.");
    }

    #[tokio::test]
    async fn test_validation_runs_on_interval() {
        let provider = chat_provider()
            .when(prompts::EXTRACTION_HEADER, "Projects: None\nTopics: robots")
            .when(prompts::VALIDATION_HEADER, "Corrections:\nAdd project: p9\nRemove topic: robots\nbogus line");
        let h = harness_with(
            provider,
            StaticSearch::new(&["p1"]),
            EngineSettings { context_validation_interval: 2, ..settings() },
        );
        h.engine.initialize("u1", SYSTEM).await.unwrap();

        h.engine.generate("one", "u1").await.unwrap();
        assert_eq!(h.provider.count_matching(prompts::VALIDATION_HEADER), 0);
        h.engine.generate("two", "u1").await.unwrap();
        assert_eq!(h.provider.count_matching(prompts::VALIDATION_HEADER), 1);

        let state = h.engine.working_set("u1").await.unwrap().state;
        assert!(state.has_discussed("p9"));
        // Removed by validation, then re-added by the post-turn update.
        assert_eq!(state.key_topics, vec!["robots"]);
    }

    #[tokio::test]
    async fn test_validate_context_on_demand() {
        let h = harness(chat_provider().when(prompts::VALIDATION_HEADER, "Corrections: Add topic: bees"));
        h.engine.initialize("u1", SYSTEM).await.unwrap();
        h.engine.validate_context("u1").await.unwrap();
        assert_eq!(h.engine.working_set("u1").await.unwrap().state.key_topics, vec!["bees"]);
    }

    #[tokio::test]
    async fn test_detached_state_update_lands() {
        let h = harness_with(
            chat_provider().when(prompts::EXTRACTION_HEADER, "Projects: p2\nTopics: solar"),
            StaticSearch::new(&["p1"]),
            EngineSettings { detach_state_updates: true, ..settings() },
        );
        h.engine.initialize("u1", SYSTEM).await.unwrap();
        h.engine.generate("Hello", "u1").await.unwrap();

        let mut merged = false;
        for _ in 0..100 {
            let state = h.engine.working_set("u1").await.unwrap().state;
            if state.has_discussed("p2") {
                assert_eq!(state.key_topics, vec!["solar"]);
                merged = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(merged, "detached update never merged");
        assert_eq!(h.engine.messages("u1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_detached_update_does_not_leak_into_new_conversation() {
        let h = harness_with(
            chat_provider().when(prompts::EXTRACTION_HEADER, "Projects: p2\nTopics: solar"),
            StaticSearch::new(&["p1"]),
            EngineSettings { detach_state_updates: true, ..settings() },
        );
        h.engine.initialize("u1", "A").await.unwrap();
        h.engine.generate("Hello", "u1").await.unwrap();
        h.engine.initialize("u1", "B").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let set = h.engine.working_set("u1").await.unwrap();
        assert_eq!(set.state, ConversationState::new("B"));
        assert_eq!(set.messages, vec![ChatMessage::system("B")]);
    }

    #[tokio::test]
    async fn test_stale_state_update_is_dropped() {
        let h = harness(chat_provider().when(prompts::EXTRACTION_HEADER, "Projects: p2\nTopics: solar"));
        h.engine.initialize("u1", "A").await.unwrap();
        let stale = h.engine.working_sets.epoch("u1").await.unwrap();

        h.engine.clear_session("u1").await.unwrap();
        h.engine.initialize("u1", "B").await.unwrap();
        h.engine.update_state("u1", stale, "p2 is a solar car.").await.unwrap();
        assert_eq!(h.engine.working_set("u1").await.unwrap().state, ConversationState::new("B"));

        let current = h.engine.working_sets.epoch("u1").await.unwrap();
        h.engine.update_state("u1", current, "p2 is a solar car.").await.unwrap();
        assert!(h.engine.working_set("u1").await.unwrap().state.has_discussed("p2"));
    }

    #[tokio::test]
    async fn test_concurrent_turns_for_one_user_are_serialized() {
        let h = harness(chat_provider());
        h.engine.initialize("u1", SYSTEM).await.unwrap();

        let (a, b) = tokio::join!(h.engine.generate("first", "u1"), h.engine.generate("second", "u1"));
        a.unwrap();
        b.unwrap();

        let set = h.engine.working_set("u1").await.unwrap();
        assert_eq!(set.state.interaction_count, 2);
        assert_eq!(set.messages.len(), 5);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let h = harness(chat_provider());
        h.engine.initialize("u1", SYSTEM).await.unwrap();
        h.engine.initialize("u2", "Other prompt").await.unwrap();
        h.engine.generate("Hello", "u1").await.unwrap();

        assert_eq!(h.engine.messages("u1").await.unwrap().len(), 3);
        assert_eq!(h.engine.messages("u2").await.unwrap(), vec![ChatMessage::system("Other prompt")]);
    }

    #[tokio::test]
    async fn test_initialize_with_messages_modes() {
        let h = harness(chat_provider().when(prompts::REBUILD_HEADER, "Projects: p5\nTopics: bikes"));
        h.engine.initialize("u1", SYSTEM).await.unwrap();

        let messages = vec![
            ChatMessage::system("New prompt"),
            ChatMessage::user("bike projects?"),
            ChatMessage::assistant("p5 is an e-bike."),
        ];

        h.engine.initialize_with_messages("u1", messages.clone(), false).await.unwrap();
        let set = h.engine.working_set("u1").await.unwrap();
        assert_eq!(set.messages, messages);
        assert_eq!(set.state.system_prompt, "New prompt");
        assert!(set.state.discussed_projects.is_empty());
        assert_eq!(h.provider.count_matching(prompts::REBUILD_HEADER), 0);

        h.engine.initialize_with_messages("u1", messages, true).await.unwrap();
        let state = h.engine.working_set("u1").await.unwrap().state;
        assert!(state.has_discussed("p5"));
        assert_eq!(state.key_topics, vec!["bikes"]);
        assert_eq!(state.interaction_count, 1);
    }

    #[tokio::test]
    async fn test_save_then_load_restores_log() {
        let h = harness(chat_provider().when(prompts::EXTRACTION_HEADER, "Projects: p1\nTopics: greetings"));
        h.engine.initialize("u1", SYSTEM).await.unwrap();
        h.engine.generate("Hello", "u1").await.unwrap();
        let saved_set = h.engine.working_set("u1").await.unwrap();

        let id = h.engine.save_chat_session("u1", None).await.unwrap();
        h.engine.initialize("u1", "Something else").await.unwrap();

        let loaded = h.engine.load_chat_session("u1", &id).await.unwrap();
        assert_eq!(loaded, saved_set.messages[1..].to_vec());

        let live = h.engine.working_set("u1").await.unwrap();
        assert_eq!(live.messages, saved_set.messages);
        assert_eq!(live.state, saved_set.state);
        assert_eq!(h.provider.count_matching(prompts::REBUILD_HEADER), 0);

        let sessions = h.engine.list_sessions("u1").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].preview, "Hello");
        assert!(h.engine.list_sessions("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_with_existing_id_updates_in_place() {
        let h = harness(chat_provider());
        h.engine.initialize("u1", SYSTEM).await.unwrap();
        h.engine.generate("Hello", "u1").await.unwrap();
        let id = h.engine.save_chat_session("u1", None).await.unwrap();

        h.engine.generate("More", "u1").await.unwrap();
        let again = h.engine.save_chat_session("u1", Some(id.clone())).await.unwrap();
        assert_eq!(again, id);

        let sessions = h.engine.list_sessions("u1").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].message_count, 4);
        assert!(sessions[0].updated_at >= sessions[0].created_at);
    }

    #[tokio::test]
    async fn test_save_requires_conversation() {
        let h = harness(chat_provider());
        h.engine.initialize("u1", SYSTEM).await.unwrap();
        let err = h.engine.save_chat_session("u1", None).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_load_unknown_or_foreign_session() {
        let h = harness(chat_provider());
        h.engine.initialize("u1", SYSTEM).await.unwrap();
        h.engine.generate("Hello", "u1").await.unwrap();
        let id = h.engine.save_chat_session("u1", None).await.unwrap();

        let err = h.engine.load_chat_session("u1", "nope").await.unwrap_err();
        assert!(matches!(err, ChatError::SessionNotFound { .. }));
        let err = h.engine.load_chat_session("u2", &id).await.unwrap_err();
        assert!(matches!(err, ChatError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_rebuilds_untracked_state() {
        let h = harness(chat_provider().when(prompts::REBUILD_HEADER, "Projects: p7\nTopics: drones"));
        h.engine.initialize("u1", SYSTEM).await.unwrap();
        h.engine.generate("Hello", "u1").await.unwrap();
        let id = h.engine.save_chat_session("u1", None).await.unwrap();

        h.engine.load_chat_session("u1", &id).await.unwrap();
        let state = h.engine.working_set("u1").await.unwrap().state;
        assert!(state.has_discussed("p7"));
        assert_eq!(state.system_prompt, SYSTEM);
        assert_eq!(state.interaction_count, 1);
    }

    #[tokio::test]
    async fn test_clear_session() {
        let h = harness(chat_provider());
        h.engine.initialize("u1", SYSTEM).await.unwrap();
        h.engine.clear_session("u1").await.unwrap();
        assert!(h.engine.messages("u1").await.unwrap().is_empty());
    }
}
