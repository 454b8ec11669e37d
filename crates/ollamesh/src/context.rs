//! Context-window budgeting for conversation history.
//!
//! Selects the maximal contiguous suffix of history (most recent first,
//! returned in chronological order) that fits the model's context window
//! alongside the system content, the current message, and a fixed safety
//! margin. A message either fits whole or is excluded — never truncated.

use crate::tokens::estimate_tokens;
use crate::{ChatMessage, MessageRole};

/// Tokens held back for response headroom and estimation error.
pub const CONTEXT_SAFETY_MARGIN: usize = 400;

/// Budget `history` (oldest to newest) against `context_window` tokens.
///
/// Walks newest-to-oldest accumulating estimated cost and stops at the
/// first message that would overflow; the kept suffix is returned oldest
/// first. System-authored messages are transient UI notices, not
/// model-visible turns, and are excluded from both the count and the
/// result.
pub fn budget_history(
    history: &[ChatMessage],
    system_content: &str,
    current_message: &str,
    context_window: usize,
) -> Vec<ChatMessage> {
    let reserved = estimate_tokens(system_content)
        + estimate_tokens(current_message)
        + CONTEXT_SAFETY_MARGIN;
    let available = context_window.saturating_sub(reserved);

    let mut used = 0usize;
    let mut kept: Vec<ChatMessage> = Vec::new();
    for msg in history.iter().rev() {
        if msg.role == MessageRole::System {
            continue;
        }
        let cost = estimate_tokens(&msg.content);
        if used + cost >= available {
            break;
        }
        kept.push(msg.clone());
        used += cost;
    }
    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: MessageRole, content: &str) -> ChatMessage {
        ChatMessage {
            role,
            content: content.to_string(),
            images: Vec::new(),
        }
    }

    #[test]
    fn keeps_everything_when_it_fits() {
        let history = vec![
            turn(MessageRole::User, "first question"),
            turn(MessageRole::Assistant, "first answer"),
            turn(MessageRole::User, "second question"),
        ];
        let kept = budget_history(&history, "persona", "now", 8192);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].content, "first question");
        assert_eq!(kept[2].content, "second question");
    }

    #[test]
    fn drops_oldest_first() {
        // Window 500, margin 400 => ~100 tokens available less system and
        // current message costs. Each turn below is ~29 tokens.
        let big = "x".repeat(100);
        let history: Vec<ChatMessage> = (0..10)
            .map(|i| {
                turn(
                    if i % 2 == 0 {
                        MessageRole::User
                    } else {
                        MessageRole::Assistant
                    },
                    &format!("{big}{i}"),
                )
            })
            .collect();
        let kept = budget_history(&history, "", "", 500);
        assert!(!kept.is_empty());
        assert!(kept.len() < history.len());
        // The kept slice is the most recent suffix, in original order.
        let expected: Vec<String> = history
            .iter()
            .skip(history.len() - kept.len())
            .map(|m| m.content.clone())
            .collect();
        let actual: Vec<String> = kept.iter().map(|m| m.content.clone()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn never_partially_includes_a_message() {
        // A single message whose cost alone exceeds the available budget
        // must be excluded entirely, leaving the history empty.
        let huge = turn(MessageRole::User, &"y".repeat(10_000));
        let kept = budget_history(&[huge], "", "", 1000);
        assert!(kept.is_empty());
    }

    #[test]
    fn empty_when_reserved_exceeds_window() {
        let history = vec![turn(MessageRole::User, "hi")];
        let kept = budget_history(&history, &"s".repeat(4000), "msg", 500);
        assert!(kept.is_empty());
    }

    #[test]
    fn system_notices_are_excluded() {
        let history = vec![
            turn(MessageRole::User, "question"),
            turn(MessageRole::System, "node pi went offline"),
            turn(MessageRole::Assistant, "answer"),
        ];
        let kept = budget_history(&history, "persona", "now", 8192);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|m| m.role != MessageRole::System));
    }

    #[test]
    fn a_blocking_message_hides_older_ones() {
        // The walk is newest-to-oldest and stops at the first overflow, so
        // a huge middle message also excludes everything older than it.
        let history = vec![
            turn(MessageRole::User, "tiny but old"),
            turn(MessageRole::Assistant, &"z".repeat(10_000)),
            turn(MessageRole::User, "recent"),
        ];
        let kept = budget_history(&history, "", "", 1000);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].content, "recent");
    }
}
