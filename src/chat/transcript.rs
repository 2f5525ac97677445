use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

const START_PREFIX: &str = "### answer #";
const END_PREFIX: &str = "answer #";
const SEPARATOR: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptState {
    pub remainder: String,
    pub last_thread_id: Option<String>,
    pub last_answer_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerBlock {
    pub index: u64,
    pub body: String,
    pub thread_id: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub index: u64,
    pub thread_id: String,
}

struct Line<'a> {
    offset: usize,
    text: &'a str,
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    for raw in text.split_inclusive('\n') {
        let body = raw.strip_suffix('\n').unwrap_or(raw);
        let body = body.strip_suffix('\r').unwrap_or(body);
        out.push(Line { offset, text: body });
        offset += raw.len();
    }
    out
}

fn parse_index(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn parse_start(line: &str) -> Option<u64> {
    parse_index(line.strip_prefix(START_PREFIX)?)
}

fn parse_end(line: &str, index: u64) -> Option<String> {
    let rest = line.strip_prefix(END_PREFIX)?;
    let rest = rest.strip_prefix(&index.to_string())?;
    let rest = rest.strip_prefix(" end (")?;
    let thread_id = rest.strip_suffix(')')?;
    if thread_id.is_empty() || thread_id.contains(')') || thread_id.chars().any(char::is_whitespace)
    {
        return None;
    }
    Some(thread_id.to_string())
}

fn is_blank(lines: &[Line<'_>], idx: usize) -> bool {
    lines.get(idx).is_some_and(|l| l.text.is_empty())
}

/// Find the closing sentinel for a block opened at `start_idx`.
///
/// The body is the shortest run of lines followed by a blank line, the end
/// sentinel, a blank line and the separator.
fn close_block(lines: &[Line<'_>], start_idx: usize, index: u64) -> Option<(usize, String)> {
    let mut end_idx = start_idx + 3;
    while end_idx < lines.len() {
        if is_blank(lines, end_idx - 1)
            && let Some(thread_id) = parse_end(lines[end_idx].text, index)
            && is_blank(lines, end_idx + 1)
            && lines
                .get(end_idx + 2)
                .is_some_and(|l| l.text.starts_with(SEPARATOR))
        {
            return Some((end_idx, thread_id));
        }
        end_idx += 1;
    }
    None
}

pub fn parse_blocks(text: &str) -> Vec<AnswerBlock> {
    let lines = split_lines(text);
    let mut blocks = Vec::new();
    let mut i = 0usize;
    while i < lines.len() {
        let Some(index) = parse_start(lines[i].text) else {
            i += 1;
            continue;
        };
        let Some((end_idx, thread_id)) = close_block(&lines, i, index) else {
            i += 1;
            continue;
        };

        let body_start = lines[i + 1].offset;
        let body_end = lines[end_idx - 1].offset;
        let body = text[body_start..body_end]
            .strip_suffix('\n')
            .unwrap_or(&text[body_start..body_end]);
        let body = body.strip_suffix('\r').unwrap_or(body);
        let separator = &lines[end_idx + 2];

        blocks.push(AnswerBlock {
            index,
            body: body.to_string(),
            thread_id,
            start: lines[i].offset,
            end: separator.offset + SEPARATOR.len(),
        });
        i = end_idx + 3;
    }
    blocks
}

pub fn parse(text: &str) -> TranscriptState {
    match parse_blocks(text).pop() {
        Some(last) => TranscriptState {
            remainder: text[last.end..].trim().to_string(),
            last_thread_id: Some(last.thread_id),
            last_answer_index: last.index,
        },
        None => TranscriptState {
            remainder: text.trim().to_string(),
            last_thread_id: None,
            last_answer_index: 0,
        },
    }
}

pub fn turns(text: &str) -> Vec<Turn> {
    let mut prev_end = 0usize;
    parse_blocks(text)
        .into_iter()
        .map(|block| {
            let question = text[prev_end..block.start].trim().to_string();
            prev_end = block.end;
            Turn {
                question,
                answer: block.body,
                index: block.index,
                thread_id: block.thread_id,
            }
        })
        .collect()
}

pub fn format_block(index: u64, body: &str, thread_id: &str) -> String {
    format!(
        "\n\n{START_PREFIX}{index}\n{}\n\n{END_PREFIX}{index} end ({thread_id})\n\n{SEPARATOR}\n",
        body.trim()
    )
}

pub fn append_answer(
    path: &Path,
    body: &str,
    thread_id: &str,
    last_answer_index: u64,
) -> Result<u64> {
    let Some(current) = last_answer_index.checked_add(1) else {
        anyhow::bail!(
            "{} already holds answer #{last_answer_index}; no further number is available",
            path.display()
        );
    };
    let block = format_block(current, body, thread_id);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(block.as_bytes())
        .with_context(|| format!("failed to append to {}", path.display()))?;
    Ok(current)
}

pub fn last_answer(text: &str, strip: bool) -> Option<String> {
    let block = parse_blocks(text).pop()?;
    if strip {
        Some(strip_fences(&block.body))
    } else {
        Some(block.body)
    }
}

pub fn strip_fences(raw: &str) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();
    if lines.first().is_some_and(|l| l.trim().starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn is_citation(inner: &str) -> bool {
    let Some((left, _)) = inner.split_once('†') else {
        return false;
    };
    let Some((a, b)) = left.split_once(':') else {
        return false;
    };
    parse_index(a).is_some() && parse_index(b).is_some()
}

/// Remove file-search citation markers such as `【4:0†source】`.
pub fn strip_citations(answer: &str) -> String {
    let mut out = String::with_capacity(answer.len());
    let mut rest = answer;
    while let Some(open) = rest.find('【') {
        let after_open = &rest[open + '【'.len_utf8()..];
        match after_open.find('】') {
            Some(close) if is_citation(&after_open[..close]) => {
                out.push_str(&rest[..open]);
                rest = &after_open[close + '】'.len_utf8()..];
            }
            _ => {
                let keep = open + '【'.len_utf8();
                out.push_str(&rest[..keep]);
                rest = &rest[keep..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn ensure_exists(path: &Path) -> Result<bool> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to create {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_transcript_has_no_blocks() {
        assert_eq!(
            parse(""),
            TranscriptState {
                remainder: String::new(),
                last_thread_id: None,
                last_answer_index: 0,
            }
        );
    }

    #[test]
    fn text_without_blocks_is_all_remainder() {
        let state = parse("\n  What is 2+2?  \n");
        assert_eq!(state.remainder, "What is 2+2?");
        assert_eq!(state.last_answer_index, 0);
    }

    #[test]
    fn round_trip_append_then_parse() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("chat.txt");
        fs::write(&path, "What is 2+2?").expect("write");

        let before = parse(&read(&path).expect("read"));
        let idx = append_answer(&path, "4", "th_1", before.last_answer_index).expect("append");
        assert_eq!(idx, 1);

        let text = read(&path).expect("read");
        assert!(text.starts_with("What is 2+2?"));
        let after = parse(&text);
        assert_eq!(after.remainder, "");
        assert_eq!(after.last_answer_index, 1);
        assert_eq!(after.last_thread_id.as_deref(), Some("th_1"));
        assert_eq!(last_answer(&text, false).as_deref(), Some("4"));
    }

    #[test]
    fn second_turn_increments_and_keeps_prior_bytes() {
        let first = format!("Q1{}", format_block(1, "A1", "thread_a"));
        let text = format!("{first}\nQ2 line one\nQ2 line two\n");
        let state = parse(&text);
        assert_eq!(state.remainder, "Q2 line one\nQ2 line two");
        assert_eq!(state.last_thread_id.as_deref(), Some("thread_a"));

        let appended = format!("{text}{}", format_block(2, "A2", "thread_a"));
        assert!(appended.starts_with(&first));
        let state = parse(&appended);
        assert_eq!(state.last_answer_index, 2);
        assert_eq!(state.remainder, "");
    }

    #[test]
    fn dangling_block_without_end_sentinel_stays_in_remainder() {
        let complete = format!("Q1{}", format_block(1, "A1", "thread_a"));
        let text = format!("{complete}\nQ2\n\n### answer #2\npartial text");
        let state = parse(&text);
        assert_eq!(state.last_answer_index, 1);
        assert_eq!(state.remainder, "Q2\n\n### answer #2\npartial text");
    }

    #[test]
    fn mismatched_end_number_is_not_a_block() {
        let text = "Q\n\n### answer #1\nbody\n\nanswer #2 end (thread_x)\n\n---\n";
        let state = parse(text);
        assert_eq!(state.last_answer_index, 0);
        assert_eq!(state.remainder, text.trim());
    }

    #[test]
    fn multi_line_body_with_blank_lines_is_kept() {
        let text = format!("Q{}", format_block(1, "line 1\n\nline 3", "thread_z"));
        assert_eq!(last_answer(&text, false).as_deref(), Some("line 1\n\nline 3"));
    }

    #[test]
    fn extract_last_answer_is_idempotent() {
        let text = format!(
            "Q{}Q2{}",
            format_block(1, "one", "t1"),
            format_block(2, "```rust\nfn main() {}\n```", "t1")
        );
        let a = last_answer(&text, true);
        let b = last_answer(&text, true);
        assert_eq!(a, b);
        assert_eq!(a.as_deref(), Some("fn main() {}"));
    }

    #[test]
    fn turns_pair_questions_with_answers() {
        let text = format!(
            "First?{}\nSecond?{}\nThird?",
            format_block(1, "one", "t1"),
            format_block(2, "two", "t1")
        );
        let got = turns(&text);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].question, "First?");
        assert_eq!(got[1].question, "Second?");
        assert_eq!(got[1].answer, "two");
    }

    #[test]
    fn strip_fences_trims_markers_and_blank_lines() {
        assert_eq!(strip_fences("```json\n\n{\"a\":1}\n\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("plain\n"), "plain");
    }

    #[test]
    fn strip_citations_removes_only_citation_markers() {
        assert_eq!(
            strip_citations("See docs【4:0†source】 and 【note】."),
            "See docs and 【note】."
        );
    }

    #[test]
    fn ensure_exists_creates_once() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("chats/new.txt");
        assert!(ensure_exists(&path).expect("create"));
        assert!(!ensure_exists(&path).expect("exists"));
        assert_eq!(read(&path).expect("read"), "");
    }

    #[test]
    fn append_refuses_to_overflow_answer_number() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("chat.txt");
        let text = format!(
            "q\n\n### answer #{max}\nhi\n\nanswer #{max} end (thread_1)\n\n---\nnext?",
            max = u64::MAX
        );
        fs::write(&path, &text).expect("seed");

        let state = parse(&text);
        assert_eq!(state.last_answer_index, u64::MAX);
        let err = append_answer(&path, "reply", "thread_1", state.last_answer_index)
            .expect_err("overflow");
        assert!(err.to_string().contains("no further number"));
        assert_eq!(read(&path).expect("read"), text);
    }
}
