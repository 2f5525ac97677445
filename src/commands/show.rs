use anyhow::Result;

use crate::chat::ledger::{LedgerStore, LedgerView};
use crate::chat::paths::resolve_paths;
use crate::commands::CommandReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowKind {
    Question,
    Answer,
    Original,
}

pub fn run_on(view: &LedgerView, kind: ShowKind, offset: usize) -> CommandReport {
    let mut report = CommandReport::new("show");
    let found = match kind {
        ShowKind::Question => view.question_at(offset),
        ShowKind::Answer => view.answer_at(offset),
        ShowKind::Original => view.original_question_at(offset).map(|original| {
            format!(
                "{}\n(question #{} from the end)",
                original.text, original.position_from_end
            )
        }),
    };
    match found {
        Some(text) => report.detail(text),
        None => report.issue(format!("nothing recorded at offset {offset}")),
    }
    report
}

pub fn run(kind: ShowKind, offset: usize) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let view = LedgerStore::from_paths(&paths).view();
    Ok(run_on(&view, kind, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ledger::{LedgerEntry, Operation};
    use crate::chat::prompts::file_list_prompt;
    use serde_json::json;

    fn ask(question: &str, answer: &str, context: serde_json::Value) -> LedgerEntry {
        LedgerEntry {
            operation: Operation::AskQuestion,
            arguments: json!({"question": question, "context": context}),
            result: json!(answer),
            recorded_at: None,
        }
    }

    #[test]
    fn offsets_walk_backwards() {
        let view = LedgerView::new(vec![
            ask("first", "a1", json!({"action": "chat"})),
            ask("second", "a2", json!({"action": "chat"})),
        ]);
        assert_eq!(run_on(&view, ShowKind::Question, 0).details, vec!["second"]);
        assert_eq!(run_on(&view, ShowKind::Answer, 1).details, vec!["a1"]);
        assert!(!run_on(&view, ShowKind::Answer, 2).ok);
    }

    #[test]
    fn original_unwraps_generated_prompt() {
        let view = LedgerView::new(vec![
            ask(&file_list_prompt("rename foo"), "src/foo.rs", json!({"action": "fileList"})),
            ask("content please", "fn foo() {}", json!({"action": "fileContent", "fileName": "src/foo.rs"})),
        ]);
        let report = run_on(&view, ShowKind::Original, 0);
        assert_eq!(report.details, vec!["rename foo\n(question #1 from the end)"]);
    }
}
