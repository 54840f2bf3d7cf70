//! Rolling context window.
//!
//! Short logs are passed verbatim. Once a log grows past the threshold, all but
//! the most recent turns are replaced by a summary.

use chatitp_core::message::render_transcript;
use chatitp_core::{ChatError, ChatMessage, ConversationState};

use crate::summarizer::Summarizer;

pub const SUMMARY_PREFIX: &str = "Summary of earlier conversation:";

pub struct ContextWindow {
    pub text: String,
    /// Number of leading turns replaced by the summary.
    pub summarized_turns: usize,
}

/// Where to cut `len` turns, if at all.
pub fn summary_split(len: usize, threshold: usize, keep_recent: usize) -> Option<usize> {
    if len > threshold && len > keep_recent {
        Some(len - keep_recent)
    } else {
        None
    }
}

impl ContextWindow {
    pub async fn build(
        transcript: &[ChatMessage],
        state: &ConversationState,
        summarizer: &Summarizer,
        threshold: usize,
        keep_recent: usize,
    ) -> Result<Self, ChatError> {
        let (history, summarized_turns) = match summary_split(transcript.len(), threshold, keep_recent) {
            Some(cut) => {
                let (older, recent) = transcript.split_at(cut);
                let summary = summarizer.summarize(older).await?;
                (
                    format!("{SUMMARY_PREFIX}\n{summary}\n\n{}", render_transcript(recent)),
                    cut,
                )
            }
            None => (render_transcript(transcript), 0),
        };

        Ok(Self {
            text: format!("{history}\n\n{}", state.render()),
            summarized_turns,
        })
    }
}
