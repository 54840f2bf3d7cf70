//! Intent classification via single-shot model calls.
//!
//! Labels are recovered by case-insensitive substring match on the raw output,
//! so surrounding whitespace or punctuation is tolerated but paraphrases are not.

use serde::{Deserialize, Serialize};
use tracing::debug;

use chatitp_core::ChatError;

use crate::llm::LlmClient;
use crate::prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    /// Any project will do.
    YesRandom,
    /// Projects matching the query.
    YesSpecific,
    No,
}

/// `YES_RANDOM` is checked before `YES_SPECIFIC`; anything else is `No`.
pub fn parse_intent(raw: &str) -> Intent {
    let upper = raw.to_uppercase();
    if upper.contains("YES_RANDOM") {
        Intent::YesRandom
    } else if upper.contains("YES_SPECIFIC") {
        Intent::YesSpecific
    } else {
        Intent::No
    }
}

pub fn parse_yes(raw: &str) -> bool {
    raw.to_uppercase().contains("YES")
}

#[derive(Clone)]
pub struct IntentClassifier {
    llm: LlmClient,
}

impl IntentClassifier {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, query: &str) -> Result<Intent, ChatError> {
        let raw = self.llm.complete("", &prompts::intent(query)).await?;
        let intent = parse_intent(&raw);
        debug!(?intent, "Classified query intent");
        Ok(intent)
    }

    pub async fn is_image_request(&self, query: &str) -> Result<bool, ChatError> {
        let raw = self.llm.complete("", &prompts::image_intent(query)).await?;
        Ok(parse_yes(&raw))
    }
}
