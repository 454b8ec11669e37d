//! Incremental splitter for inline `<think>` reasoning traces.
//!
//! Some models interleave a reasoning trace with their answer, delimited by
//! `<think>` / `</think>` sentinel tags. The stream arrives as text
//! fragments with arbitrary split points — a sentinel can be cut across two
//! or more fragments — so the splitter keeps a short carry-over buffer of
//! at most `tag length - 1` bytes and processes only the new fragment plus
//! that carry. It never re-scans previously emitted text, which keeps cost
//! bounded for multi-megabyte responses and avoids double emission.
//!
//! Invariants:
//! - every input byte is emitted on exactly one channel, in order;
//! - the carry-over buffer is always shorter than the longest sentinel;
//! - an unterminated `<think>` leaves the stream on the thought channel for
//!   the rest of the generation (accepted behavior, not an error).

/// Opening sentinel for a reasoning trace.
pub const THINK_OPEN: &str = "<think>";
/// Closing sentinel for a reasoning trace.
pub const THINK_CLOSE: &str = "</think>";

/// A piece of output on one of the two channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFragment {
    /// Visible answer text.
    Answer(String),
    /// Reasoning-trace text.
    Thought(String),
}

/// Two-state incremental scanner: `Answer` (initial) and `Thinking`.
#[derive(Debug, Default)]
pub struct ThinkTagParser {
    thinking: bool,
    carry: String,
}

impl ThinkTagParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the parser is currently inside a reasoning region.
    pub fn is_thinking(&self) -> bool {
        self.thinking
    }

    /// Feed one incoming fragment, returning the fragments it completes.
    ///
    /// Text withheld as a possible partial sentinel is carried over and
    /// emitted by a later `feed` or by [`finish`](Self::finish).
    pub fn feed(&mut self, content: &str) -> Vec<StreamFragment> {
        let mut out = Vec::new();
        let mut rest = std::mem::take(&mut self.carry);
        rest.push_str(content);

        // A single fragment can contain several tags; consume them in order.
        loop {
            let tag = if self.thinking { THINK_CLOSE } else { THINK_OPEN };
            match rest.find(tag) {
                Some(idx) => {
                    let (before, tagged) = rest.split_at(idx);
                    self.emit(before, &mut out);
                    let (_, after) = tagged.split_at(tag.len());
                    self.thinking = !self.thinking;
                    rest = after.to_string();
                }
                None => {
                    let keep = partial_suffix_len(&rest, tag);
                    if keep > 0 {
                        let (safe, partial) = rest.split_at(rest.len() - keep);
                        self.emit(safe, &mut out);
                        self.carry = partial.to_string();
                    } else {
                        self.emit(&rest, &mut out);
                    }
                    return out;
                }
            }
        }
    }

    /// Drain the carry-over buffer at end of stream.
    ///
    /// A partial sentinel that never completed is ordinary text and must
    /// still reach the caller, on whichever channel the stream ended in.
    pub fn finish(&mut self) -> Option<StreamFragment> {
        if self.carry.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.carry);
        Some(if self.thinking {
            StreamFragment::Thought(text)
        } else {
            StreamFragment::Answer(text)
        })
    }

    fn emit(&self, text: &str, out: &mut Vec<StreamFragment>) {
        if text.is_empty() {
            return;
        }
        out.push(if self.thinking {
            StreamFragment::Thought(text.to_string())
        } else {
            StreamFragment::Answer(text.to_string())
        });
    }
}

/// Length of the longest strict, non-empty prefix of `tag` that `s` ends
/// with, checked longest-first. Zero when no such suffix exists.
///
/// Byte comparison is safe here: the sentinels are pure ASCII, so a match
/// always lands on a UTF-8 boundary.
fn partial_suffix_len(s: &str, tag: &str) -> usize {
    let bytes = s.as_bytes();
    let tag_bytes = tag.as_bytes();
    let max = (tag.len() - 1).min(s.len());
    for len in (1..=max).rev() {
        if bytes.ends_with(&tag_bytes[..len]) {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `fragments` through a fresh parser and concatenate each channel.
    fn run(fragments: &[&str]) -> (String, String) {
        let mut parser = ThinkTagParser::new();
        let mut answer = String::new();
        let mut thought = String::new();
        for frag in fragments {
            for piece in parser.feed(frag) {
                match piece {
                    StreamFragment::Answer(t) => answer.push_str(&t),
                    StreamFragment::Thought(t) => thought.push_str(&t),
                }
            }
        }
        if let Some(piece) = parser.finish() {
            match piece {
                StreamFragment::Answer(t) => answer.push_str(&t),
                StreamFragment::Thought(t) => thought.push_str(&t),
            }
        }
        (answer, thought)
    }

    /// Split `text` into fragments of `width` bytes (ASCII inputs only).
    fn split_every(text: &str, width: usize) -> Vec<String> {
        text.as_bytes()
            .chunks(width)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn plain_text_passes_through() {
        let (answer, thought) = run(&["hello ", "world"]);
        assert_eq!(answer, "hello world");
        assert_eq!(thought, "");
    }

    #[test]
    fn whole_tags_in_one_fragment() {
        let (answer, thought) = run(&["before<think>reasoning</think>after"]);
        assert_eq!(answer, "beforeafter");
        assert_eq!(thought, "reasoning");
    }

    #[test]
    fn tag_split_across_two_fragments() {
        let (answer, thought) = run(&["abc<thi", "nk>deep</th", "ink>xyz"]);
        assert_eq!(answer, "abcxyz");
        assert_eq!(thought, "deep");
    }

    #[test]
    fn tag_split_one_byte_at_a_time() {
        let text = "a<think>b</think>c";
        let frags = split_every(text, 1);
        let refs: Vec<&str> = frags.iter().map(|s| s.as_str()).collect();
        let (answer, thought) = run(&refs);
        assert_eq!(answer, "ac");
        assert_eq!(thought, "b");
    }

    #[test]
    fn reconstruction_is_fragmentation_invariant() {
        let text = "intro <think>first trace</think> middle <think>second</think> outro<";
        let baseline = run(&[text]);
        for width in 1..=text.len() {
            let frags = split_every(text, width);
            let refs: Vec<&str> = frags.iter().map(|s| s.as_str()).collect();
            assert_eq!(run(&refs), baseline, "width {width} changed the output");
        }
        assert_eq!(baseline.0, "intro  middle  outro<");
        assert_eq!(baseline.1, "first tracesecond");
    }

    #[test]
    fn lone_angle_bracket_is_not_swallowed() {
        let (answer, thought) = run(&["1 < 2 and 3 > 2"]);
        assert_eq!(answer, "1 < 2 and 3 > 2");
        assert_eq!(thought, "");
    }

    #[test]
    fn false_prefix_is_released_when_disproved() {
        // "<thin" looks like a tag prefix until the 'g' arrives.
        let (answer, thought) = run(&["a<thin", "gs happen"]);
        assert_eq!(answer, "a<things happen");
        assert_eq!(thought, "");
    }

    #[test]
    fn repeated_sentinel_like_substrings() {
        let (answer, thought) = run(&["<t<th<thi<think>inside</think>done"]);
        assert_eq!(answer, "<t<th<thidone");
        assert_eq!(thought, "inside");
    }

    #[test]
    fn unterminated_think_stays_on_thought_channel() {
        let (answer, thought) = run(&["before<think>never ", "closed"]);
        assert_eq!(answer, "before");
        assert_eq!(thought, "never closed");
    }

    #[test]
    fn trailing_partial_tag_is_drained_by_finish() {
        let (answer, thought) = run(&["text ends with <thin"]);
        assert_eq!(answer, "text ends with <thin");
        assert_eq!(thought, "");
    }

    #[test]
    fn closing_tag_partial_includes_bare_bracket() {
        // In the thinking state a trailing "<" may begin "</think>".
        let (answer, thought) = run(&["<think>a<", "/think>b"]);
        assert_eq!(answer, "b");
        assert_eq!(thought, "a");
    }

    #[test]
    fn carry_stays_shorter_than_longest_tag() {
        let mut parser = ThinkTagParser::new();
        for frag in ["x<", "/", "t", "h", "i", "n"] {
            parser.feed(frag);
            assert!(parser.carry.len() < THINK_CLOSE.len());
        }
    }

    #[test]
    fn empty_fragments_are_harmless() {
        let (answer, thought) = run(&["", "a<think>", "", "b</think>", ""]);
        assert_eq!(answer, "a");
        assert_eq!(thought, "b");
    }
}
