//! Token estimation heuristic for context budgeting.
//!
//! Not a real tokenizer: CJK characters count as one token each, other
//! characters as a quarter token, plus a fixed per-message overhead for
//! role and formatting. Good enough to keep assembled windows under a
//! model's context limit.

use parley_types::context::ContextMessage;

/// Fixed per-message overhead (role tag, formatting) in estimated tokens.
pub const MESSAGE_OVERHEAD_TOKENS: u32 = 10;

/// Truncation keeps 10% headroom under the requested budget.
const TRUNCATION_HEADROOM: f64 = 0.9;

/// A truncated message shorter than this is dropped as noise.
const MIN_TRUNCATED_CHARS: usize = 10;

/// Estimate the token count of a content string.
pub fn estimate_content(content: &str) -> u32 {
    let mut cjk: u32 = 0;
    let mut other: u32 = 0;
    for ch in content.chars() {
        if ('\u{4E00}'..='\u{9FFF}').contains(&ch) {
            cjk += 1;
        } else {
            other += 1;
        }
    }
    cjk + other / 4 + MESSAGE_OVERHEAD_TOKENS
}

/// Estimate the token count of a single context message.
pub fn estimate_message(message: &ContextMessage) -> u32 {
    estimate_content(&message.content)
}

/// Estimate the total token count of a message sequence.
pub fn estimate_total(messages: &[ContextMessage]) -> u32 {
    messages.iter().map(estimate_message).sum()
}

/// Shrink a message to fit a token budget.
///
/// Messages already within budget pass through unchanged. Otherwise the
/// content is cut proportionally (`budget / estimated`, with 10%
/// headroom) on a char boundary and suffixed with `"..."`. Returns
/// `None` when the surviving prefix would be under 10 characters --
/// including such a stub adds noise, not context.
pub fn truncate_to_budget(message: &ContextMessage, budget: u32) -> Option<ContextMessage> {
    if budget == 0 {
        return None;
    }

    let estimated = estimate_message(message);
    if estimated <= budget {
        return Some(message.clone());
    }

    // The fixed overhead is spent either way; the ratio must be taken
    // over content tokens or a small budget ends up overshot.
    if budget <= MESSAGE_OVERHEAD_TOKENS {
        return None;
    }
    let content_budget = budget - MESSAGE_OVERHEAD_TOKENS;
    let content_tokens = estimated - MESSAGE_OVERHEAD_TOKENS;

    let ratio = f64::from(content_budget) / f64::from(content_tokens) * TRUNCATION_HEADROOM;
    let char_count = message.content.chars().count();
    let keep = (char_count as f64 * ratio) as usize;

    if keep < MIN_TRUNCATED_CHARS {
        return None;
    }

    let truncated: String = message.content.chars().take(keep).collect();
    Some(ContextMessage::new(
        message.role,
        format!("{truncated}..."),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::context::ContextRole;

    #[test]
    fn test_ascii_estimation() {
        // 40 ASCII chars -> 10 content tokens + overhead.
        let content = "a".repeat(40);
        assert_eq!(estimate_content(&content), 10 + MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn test_cjk_estimation() {
        // Each CJK char is one token.
        let content = "你好世界";
        assert_eq!(estimate_content(content), 4 + MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn test_mixed_estimation() {
        // 4 CJK chars + 8 other chars -> 4 + 2 content tokens.
        let content = "你好世界 hello!!";
        assert_eq!(estimate_content(content), 6 + MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn test_empty_content_is_overhead_only() {
        assert_eq!(estimate_content(""), MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn test_estimate_total_sums() {
        let messages = vec![
            ContextMessage::system("a".repeat(40)),
            ContextMessage::new(ContextRole::User, "b".repeat(40)),
        ];
        assert_eq!(estimate_total(&messages), 2 * (10 + MESSAGE_OVERHEAD_TOKENS));
    }

    #[test]
    fn test_truncate_within_budget_passes_through() {
        let msg = ContextMessage::new(ContextRole::User, "short");
        let out = truncate_to_budget(&msg, 100).unwrap();
        assert_eq!(out, msg);
    }

    #[test]
    fn test_truncate_shrinks_and_fits() {
        let msg = ContextMessage::new(ContextRole::User, "x".repeat(4000));
        let budget = 100;
        let out = truncate_to_budget(&msg, budget).unwrap();
        assert!(out.content.len() < 4000);
        assert!(out.content.ends_with("..."));
        assert!(estimate_message(&out) <= budget);
    }

    #[test]
    fn test_truncate_drops_tiny_remainder() {
        let msg = ContextMessage::new(ContextRole::User, "x".repeat(4000));
        // Budget so small the surviving prefix would be under 10 chars.
        assert!(truncate_to_budget(&msg, 11).is_none());
        assert!(truncate_to_budget(&msg, 0).is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let msg = ContextMessage::new(ContextRole::User, "中".repeat(500));
        let out = truncate_to_budget(&msg, 60).unwrap();
        // Must not panic on multibyte content and must fit the budget.
        assert!(estimate_message(&out) <= 60);
        assert!(out.content.ends_with("..."));
    }
}
