//! History compaction.
//!
//! Once the conversation grows past the threshold, everything between the
//! leading system prompt and the most recent `keep_recent` messages is
//! collapsed into one synthetic system message. The summary text normally
//! comes from the model; when that call fails a local digest is used instead.

use crate::textutil::one_line_preview;
use crate::types::{Message, Role};
use std::ops::Range;

/// First line of every synthetic summary message.
pub const SUMMARY_PREFIX: &str = "[eleven history summary]";

const SUMMARY_INSTRUCTIONS: &str = "Summarize the following terminal-assistant conversation \
in a few short bullet points. Keep the user's goals, commands that were run and their \
outcomes, file paths and any unresolved problems. Reply with the summary only.";

const MAX_TRANSCRIPT_CHARS_PER_MESSAGE: usize = 600;
const MAX_DIGEST_LINES: usize = 24;
const DIGEST_PREVIEW_CHARS: usize = 180;

/// Which slice of the history a compaction replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionPlan {
    /// Leading system messages kept verbatim.
    pub head: usize,
    /// Span replaced by the summary; always ends where the recent tail starts.
    pub older: Range<usize>,
}

/// Decide whether `messages` needs compaction and over which span.
pub fn plan(messages: &[Message], threshold: usize, keep_recent: usize) -> Option<CompactionPlan> {
    if messages.len() <= threshold {
        return None;
    }
    // A previous summary sits right after the system prompt; it is folded
    // into the new one rather than kept.
    let head = messages
        .iter()
        .take_while(|m| m.role == Role::System && !is_summary(m))
        .count();
    let recent_start = messages.len().saturating_sub(keep_recent).max(head);
    if recent_start <= head {
        return None;
    }
    Some(CompactionPlan {
        head,
        older: head..recent_start,
    })
}

pub fn is_summary(message: &Message) -> bool {
    message.role == Role::System && message.content.starts_with(SUMMARY_PREFIX)
}

/// Messages sent to the model to obtain a summary of `older`.
pub fn summary_request(older: &[Message]) -> Vec<Message> {
    let transcript = older
        .iter()
        .map(|m| {
            format!(
                "{}: {}",
                m.role.as_str(),
                flatten(summary_body(m), MAX_TRANSCRIPT_CHARS_PER_MESSAGE)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    vec![Message::system(SUMMARY_INSTRUCTIONS), Message::user(transcript)]
}

/// Build the compacted history: head, one summary message, recent tail.
pub fn apply(messages: &[Message], plan: &CompactionPlan, summary: &str) -> Vec<Message> {
    let mut out = Vec::with_capacity(plan.head + 1 + messages.len() - plan.older.end);
    out.extend_from_slice(&messages[..plan.head]);
    out.push(Message::system(format!("{SUMMARY_PREFIX}\n{}", summary.trim())));
    out.extend_from_slice(&messages[plan.older.end..]);
    out
}

/// Summary built locally from message previews, used when the model is
/// unavailable.
pub fn local_digest(older: &[Message]) -> String {
    let mut lines = vec!["Earlier conversation (condensed locally):".to_string()];
    let mut added = 0usize;
    for message in older {
        if added >= MAX_DIGEST_LINES {
            break;
        }
        let body = summary_body(message);
        if body.trim().is_empty() {
            continue;
        }
        let role = if is_summary(message) {
            "earlier summary"
        } else {
            message.role.as_str()
        };
        lines.push(format!("- {role}: {}", flatten(body, DIGEST_PREVIEW_CHARS)));
        added += 1;
    }
    let skipped = older.len().saturating_sub(added);
    if skipped > 0 {
        lines.push(format!("... {skipped} more message(s) omitted"));
    }
    lines.join("\n")
}

/// Whole message on one line, capped at `max_chars`.
fn flatten(text: &str, max_chars: usize) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    one_line_preview(&joined, max_chars)
}

fn summary_body(message: &Message) -> &str {
    if is_summary(message) {
        message
            .content
            .strip_prefix(SUMMARY_PREFIX)
            .unwrap_or(&message.content)
            .trim_start()
    } else {
        &message.content
    }
}
