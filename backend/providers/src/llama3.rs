//! Llama 3 instruct prompt framing.

const BEGIN: &str = "<|begin_of_text|>";
const EOT: &str = "<|eot_id|>";

fn header(role: &str) -> String {
    format!("<|start_header_id|>{role}<|end_header_id|>\n\n")
}

/// Frame a system + user pair, leaving the assistant header open for the model.
pub fn format_prompt(system_prompt: &str, user_prompt: &str) -> String {
    let mut out = String::from(BEGIN);
    if !system_prompt.is_empty() {
        out.push_str(&header("system"));
        out.push_str(system_prompt);
        out.push_str(EOT);
    }
    out.push_str(&header("user"));
    out.push_str(user_prompt);
    out.push_str(EOT);
    out.push_str("<|start_header_id|>assistant<|end_header_id|>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prompt() {
        let prompt = format_prompt("Be brief.", "Hello");
        assert_eq!(
            prompt,
            "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n\nBe brief.<|eot_id|>\
             <|start_header_id|>user<|end_header_id|>\n\nHello<|eot_id|>\
             <|start_header_id|>assistant<|end_header_id|>"
        );
    }

    #[test]
    fn test_empty_system_prompt_is_skipped() {
        let prompt = format_prompt("", "Classify this");
        assert!(!prompt.contains("system"));
        assert!(prompt.ends_with("<|start_header_id|>assistant<|end_header_id|>"));
    }
}
