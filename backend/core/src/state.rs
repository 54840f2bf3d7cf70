use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Derived summary of a conversation, maintained alongside the raw message log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    #[serde(default)]
    pub discussed_projects: BTreeSet<String>,
    /// Insertion ordered, no duplicates.
    #[serde(default)]
    pub key_topics: Vec<String>,
    #[serde(default)]
    pub interaction_count: u64,
    #[serde(default)]
    pub system_prompt: String,
}

impl ConversationState {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ..Default::default()
        }
    }

    pub fn has_discussed(&self, project_id: &str) -> bool {
        self.discussed_projects.contains(project_id)
    }

    /// Returns true if the project was not yet recorded.
    pub fn record_project(&mut self, project_id: impl Into<String>) -> bool {
        let id = project_id.into();
        let id = id.trim();
        if id.is_empty() {
            return false;
        }
        self.discussed_projects.insert(id.to_string())
    }

    pub fn remove_project(&mut self, project_id: &str) -> bool {
        self.discussed_projects.remove(project_id.trim())
    }

    /// Returns true if the topic was not yet recorded. Comparison ignores case.
    pub fn record_topic(&mut self, topic: impl Into<String>) -> bool {
        let topic = topic.into();
        let topic = topic.trim();
        if topic.is_empty()
            || self
                .key_topics
                .iter()
                .any(|t| t.eq_ignore_ascii_case(topic))
        {
            return false;
        }
        self.key_topics.push(topic.to_string());
        true
    }

    pub fn remove_topic(&mut self, topic: &str) -> bool {
        let before = self.key_topics.len();
        let topic = topic.trim();
        self.key_topics.retain(|t| !t.eq_ignore_ascii_case(topic));
        before != self.key_topics.len()
    }

    /// Set union of projects, order-preserving union of topics.
    pub fn merge<P, T>(&mut self, projects: P, topics: T)
    where
        P: IntoIterator<Item = String>,
        T: IntoIterator<Item = String>,
    {
        for project in projects {
            self.record_project(project);
        }
        for topic in topics {
            self.record_topic(topic);
        }
    }

    /// Text block appended to every prompt context.
    pub fn render(&self) -> String {
        let projects = if self.discussed_projects.is_empty() {
            "None".to_string()
        } else {
            self.discussed_projects
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        };
        let topics = if self.key_topics.is_empty() {
            "None".to_string()
        } else {
            self.key_topics.join(", ")
        };
        format!("Discussed projects: {}\nKey topics: {}", projects, topics)
    }
}
