/// Fences the user's own words inside a generated prompt so they can be
/// recovered later for display.
pub const ORIGINAL_QUESTION_DELIMITER: &str = "\n\u{2063}~~~\u{2063}\n";

pub const CLARIFICATION_MARKER: &str = "clarification needed";

fn wrap_original(preamble: &str, question: &str, suffix: &str) -> String {
    format!(
        "{}{d}{}{d}{}",
        preamble.trim(),
        question.trim(),
        suffix.trim(),
        d = ORIGINAL_QUESTION_DELIMITER
    )
}

pub fn file_list_prompt(question: &str) -> String {
    wrap_original(
        "I want to make the following change to the project.",
        question,
        "List the files I have to create or update on disk to apply this change.\n\
         Text files only, with full paths relative to the project root, one per line.\n\
         Do not include files with template in their names.\n\
         No markdown, no bullets, no other words.\n\
         If the request is ambiguous, reply with a first line of exactly `clarification needed` \
         followed by your questions.",
    )
}

pub fn full_content_prompt(file_name: &str, current: Option<&str>) -> String {
    let mut out = format!(
        "Now show me the full new content of {file_name}.\n\
         Reply with the file content only.\n\
         If you cannot produce it without more information, reply with a first line of exactly \
         `clarification needed` followed by your questions.\n"
    );
    match current {
        Some(content) => {
            out.push_str("\nThe current file is:\n");
            out.push_str(content);
        }
        None => out.push_str("\nThe file does not exist yet.\n"),
    }
    out
}

pub fn search_query_prompt(question: &str) -> String {
    format!(
        "Rewrite the question below into a short query for a web search engine. \
         Your data may be out of date, so the search results will be attached to the real question.\n\
         Reply with the query only, no commentary and no quotes.\n\n{}",
        question.trim()
    )
}

pub fn is_clarification(reply: &str) -> bool {
    reply
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .is_some_and(|line| line.to_ascii_lowercase().contains(CLARIFICATION_MARKER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_prompts_expose_question_as_middle_segment() {
        let prompt = file_list_prompt("  add a --verbose flag ");
        let segments: Vec<&str> = prompt.split(ORIGINAL_QUESTION_DELIMITER).collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1], "add a --verbose flag");
    }

    #[test]
    fn clarification_is_detected_on_first_non_blank_line_only() {
        assert!(is_clarification("\nClarification needed\nwhich module?"));
        assert!(!is_clarification(
            "fn main() {}\n// clarification needed later"
        ));
    }

    #[test]
    fn search_query_prompt_is_not_wrapped() {
        let prompt = search_query_prompt(" when did rust ship? ");
        assert!(!prompt.contains(ORIGINAL_QUESTION_DELIMITER));
        assert!(prompt.ends_with("\n\nwhen did rust ship?"));
    }

    #[test]
    fn full_content_prompt_embeds_current_file() {
        let prompt = full_content_prompt("src/a.rs", Some("fn a() {}"));
        assert!(prompt.contains("src/a.rs"));
        assert!(prompt.ends_with("fn a() {}"));
    }
}
