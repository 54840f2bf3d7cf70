//! Prompt templates for every model call the engine makes.

use chatitp_core::ConversationState;

/// Label line closing the intent prompt.
pub const INTENT_LABEL: &str = "Label (YES_RANDOM, YES_SPECIFIC or NO):";
/// Label line closing the image prompt.
pub const IMAGE_LABEL: &str = "Answer (YES/NO):";
pub const SUMMARY_HEADER: &str = "Summarize the following conversation";
pub const EXTRACTION_HEADER: &str = "List the capstone projects and key topics mentioned";
pub const REBUILD_HEADER: &str = "Reconstruct the conversation state from this transcript";
pub const VALIDATION_HEADER: &str = "Compare the conversation history with the tracked state";

pub fn intent(query: &str) -> String {
    format!(
        "Classify the user's query about capstone projects into exactly one label.\n\
         YES_RANDOM: the user wants any project, picked at random.\n\
         YES_SPECIFIC: the user wants projects about a particular subject, technology or field.\n\
         NO: anything else, including follow-ups about a project already under discussion.\n\n\
         Query: show me a random project\nLabel: YES_RANDOM\n\
         Query: surprise me with something cool\nLabel: YES_RANDOM\n\
         Query: are there any projects using computer vision?\nLabel: YES_SPECIFIC\n\
         Query: I'm interested in sustainable fashion work\nLabel: YES_SPECIFIC\n\
         Query: what did you think of its materials?\nLabel: NO\n\
         Query: hello!\nLabel: NO\n\n\
         Query: {query}\n{INTENT_LABEL}"
    )
}

pub fn image_intent(query: &str) -> String {
    format!(
        "Determine if the following user query is requesting image generation, visualization, \
         or any kind of visual output, directly or indirectly. \
         Respond with \"YES\" if it is, or \"NO\" if it is not.\n\n\
         Query: {query}\n{IMAGE_LABEL}"
    )
}

pub fn summary(transcript: &str) -> String {
    format!(
        "{SUMMARY_HEADER} as a short narrative. Capture the topics covered, \
         any decisions or preferences the user expressed, and questions still open. \
         Mention every project by name or id.\n\n{transcript}\n\nSummary:"
    )
}

pub fn extraction(response: &str) -> String {
    format!(
        "{EXTRACTION_HEADER} in the assistant response below.\n\
         Reply with exactly two lines:\n\
         Projects: <comma separated project ids or names, or None>\n\
         Topics: <comma separated short topics, or None>\n\n\
         Response:\n{response}"
    )
}

pub fn rebuild(transcript: &str) -> String {
    format!(
        "{REBUILD_HEADER}.\n\
         Reply with exactly two lines:\n\
         Projects: <comma separated ids or names of every project discussed, or None>\n\
         Topics: <comma separated key topics, or None>\n\n\
         Transcript:\n{transcript}"
    )
}

pub fn validation(transcript: &str, state: &ConversationState) -> String {
    format!(
        "{VALIDATION_HEADER} below and list what the state gets wrong.\n\
         Start your reply with a line containing only \"Corrections:\" and then one line per fix, \
         using only these forms:\n\
         Add project: <id>\nRemove project: <id>\nAdd topic: <topic>\nRemove topic: <topic>\n\
         If nothing needs fixing, reply with \"Corrections:\" alone.\n\n\
         History:\n{transcript}\n\nTracked state:\n{}",
        state.render()
    )
}

/// Image prompt built from the request, recent turns and tracked topics.
pub fn image(user_prompt: &str, recent: &[String], topics: &[String]) -> String {
    let mut prompt = format!("Create an image for this request: {user_prompt}");
    if !recent.is_empty() {
        prompt.push_str("\nConversation so far:\n");
        prompt.push_str(&recent.join("\n"));
    }
    if !topics.is_empty() {
        prompt.push_str("\nThemes: ");
        prompt.push_str(&topics.join(", "));
    }
    prompt
}

/// Final prompt for a conversational turn. The system prompt travels separately.
pub fn turn(context: &str, user_prompt: &str, relevant: Option<&str>) -> String {
    let mut prompt = format!("{context}\n\nuser: {user_prompt}");
    if let Some(project) = relevant {
        prompt.push_str("\n\nRelevant project:\n");
        prompt.push_str(project);
    }
    prompt.push_str(
        "\n\nDo not bring up projects listed under \"Discussed projects\" again unless the user \
         asks about them. Do not repeat the discussed projects or key topics lists in your answer.",
    );
    prompt
}
