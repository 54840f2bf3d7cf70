//! Derived conversation state: extraction, reconstruction and self-validation.
//!
//! Model output is parsed best-effort. Missing or malformed lines yield empty
//! results and never an error.

use chatitp_core::message::render_transcript;
use chatitp_core::{ChatError, ChatMessage, ConversationState, Role};
use tracing::debug;

use crate::llm::LlmClient;
use crate::prompts;

/// One line of a `Corrections:` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correction {
    AddProject(String),
    RemoveProject(String),
    AddTopic(String),
    RemoveTopic(String),
}

/// Strip `label` from the start of `line`, ignoring case.
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label).then(|| line[label.len()..].trim())
}

fn clean_line(line: &str) -> &str {
    line.trim().trim_start_matches(['-', '*', '•']).trim()
}

fn split_list(value: &str) -> Vec<String> {
    let value = value.trim().trim_start_matches('[').trim_end_matches(']');
    if value.eq_ignore_ascii_case("none") {
        return Vec::new();
    }
    value
        .split(',')
        .map(|item| item.trim().trim_matches(['"', '\'', '.']).trim().to_string())
        .filter(|item| !item.is_empty() && !item.eq_ignore_ascii_case("none"))
        .collect()
}

/// Parse `Projects: ...` and `Topics: ...` lines. Absent lines give empty lists.
pub fn parse_state_lines(raw: &str) -> (Vec<String>, Vec<String>) {
    let mut projects = Vec::new();
    let mut topics = Vec::new();
    for line in raw.lines().map(clean_line) {
        if let Some(rest) = strip_label(line, "Projects:") {
            projects = split_list(rest);
        } else if let Some(rest) = strip_label(line, "Topics:") {
            topics = split_list(rest);
        }
    }
    (projects, topics)
}

/// Parse the lines following a `Corrections:` header, or the whole reply if
/// the header is missing.
pub fn parse_corrections(raw: &str) -> Vec<Correction> {
    let lines: Vec<&str> = raw.lines().map(clean_line).collect();
    let start = lines
        .iter()
        .position(|l| strip_label(l, "Corrections:").is_some());

    let body: Vec<&str> = match start {
        Some(i) => {
            let mut body = Vec::new();
            // Content may share the header line.
            if let Some(rest) = strip_label(lines[i], "Corrections:") {
                if !rest.is_empty() {
                    body.push(rest);
                }
            }
            body.extend(lines[i + 1..].iter().copied());
            body
        }
        None => lines,
    };

    body.into_iter()
        .filter_map(|line| {
            let (make, value): (fn(String) -> Correction, &str) =
                if let Some(v) = strip_label(line, "Add project:") {
                    (Correction::AddProject, v)
                } else if let Some(v) = strip_label(line, "Remove project:") {
                    (Correction::RemoveProject, v)
                } else if let Some(v) = strip_label(line, "Add topic:") {
                    (Correction::AddTopic, v)
                } else if let Some(v) = strip_label(line, "Remove topic:") {
                    (Correction::RemoveTopic, v)
                } else {
                    return None;
                };
            let value = value.trim_matches(['"', '\'']).trim();
            (!value.is_empty()).then(|| make(value.to_string()))
        })
        .collect()
}

/// Apply corrections in order and return how many changed the state.
pub fn apply_corrections(state: &mut ConversationState, corrections: &[Correction]) -> usize {
    let mut applied = 0;
    for correction in corrections {
        let changed = match correction {
            Correction::AddProject(id) => state.record_project(id.clone()),
            Correction::RemoveProject(id) => state.remove_project(id),
            Correction::AddTopic(t) => state.record_topic(t.clone()),
            Correction::RemoveTopic(t) => state.remove_topic(t),
        };
        if changed {
            applied += 1;
        }
    }
    applied
}

fn is_state_line(line: &str) -> bool {
    let l = clean_line(line);
    strip_label(l, "Discussed projects:").is_some() || strip_label(l, "Key topics:").is_some()
}

/// Drop a trailing echo of the state block the model sometimes copies from its prompt.
///
/// Only a block running to the end of the response is removed; a state-like line
/// followed by other content is kept.
pub fn strip_state_trailer(response: &str) -> String {
    let lines: Vec<&str> = response.lines().collect();
    let mut cut = lines.len();
    for (i, line) in lines.iter().enumerate().rev() {
        if is_state_line(line) {
            cut = i;
        } else if !line.trim().is_empty() {
            break;
        }
    }
    lines[..cut].join("\n").trim_end().to_string()
}

#[derive(Clone)]
pub struct StateTracker {
    llm: LlmClient,
}

impl StateTracker {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Projects and topics mentioned in an assistant response.
    pub async fn extract(&self, response: &str) -> Result<(Vec<String>, Vec<String>), ChatError> {
        let raw = self.llm.complete("", &prompts::extraction(response)).await?;
        Ok(parse_state_lines(&raw))
    }

    /// Derive state from a full transcript. Used only when loading a session.
    pub async fn rebuild(&self, messages: &[ChatMessage]) -> Result<ConversationState, ChatError> {
        let system_prompt = messages
            .iter()
            .find(|m| m.is_system())
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let conversation: Vec<ChatMessage> =
            messages.iter().filter(|m| !m.is_system()).cloned().collect();

        let mut state = ConversationState::new(system_prompt);
        state.interaction_count = conversation.iter().filter(|m| m.role == Role::User).count() as u64;
        if conversation.is_empty() {
            return Ok(state);
        }

        let raw = self
            .llm
            .complete("", &prompts::rebuild(&render_transcript(&conversation)))
            .await?;
        let (projects, topics) = parse_state_lines(&raw);
        debug!(projects = projects.len(), topics = topics.len(), "Rebuilt conversation state");
        state.merge(projects, topics);
        Ok(state)
    }

    /// Ask the model which tracked projects/topics disagree with the history.
    pub async fn validate(
        &self,
        messages: &[ChatMessage],
        state: &ConversationState,
    ) -> Result<Vec<Correction>, ChatError> {
        let raw = self
            .llm
            .complete("", &prompts::validation(&render_transcript(messages), state))
            .await?;
        Ok(parse_corrections(&raw))
    }
}
