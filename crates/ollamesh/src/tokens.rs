//! Length-based token cost heuristic used for context budgeting.
//!
//! This is deliberately not a real tokenizer. The budgeter only needs an
//! estimate that is deterministic and monotonic in text length, and the
//! `len / 3.5` ratio is a reasonable middle ground for English text. Any
//! replacement must preserve monotonicity or the budgeting walk breaks.

/// Characters per token (conservative estimate for English text).
pub const CHARS_PER_TOKEN: f64 = 3.5;

/// Estimate the token cost of `text`.
///
/// Returns `0` for empty text, otherwise `ceil(len / 3.5)`.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() as f64 / CHARS_PER_TOKEN).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn rounds_up() {
        // 1 char / 3.5 = 0.28... -> 1 token.
        assert_eq!(estimate_tokens("a"), 1);
        // 7 chars / 3.5 = exactly 2.
        assert_eq!(estimate_tokens("abcdefg"), 2);
        // 8 chars / 3.5 = 2.28... -> 3.
        assert_eq!(estimate_tokens("abcdefgh"), 3);
    }

    #[test]
    fn monotonic_in_length() {
        let mut prev = 0;
        for len in 0..200 {
            let est = estimate_tokens(&"x".repeat(len));
            assert!(est >= prev, "estimate must not decrease with length");
            prev = est;
        }
    }
}
