//! Token buffer: coalesces partial content between two flushes.

use council_core::message::StreamingState;
use council_core::TokenDelta;

/// Deltas accumulated since the last flush, in the same shape as
/// [`StreamingState`].
///
/// Per-model text is concatenated in append order. Draining swaps the
/// contents out in one step, so a drained fragment can never be observed
/// twice and an append after a drain lands in the next batch.
#[derive(Debug, Default)]
pub struct TokenBuffer {
    pending: StreamingState,
    fragments: usize,
}

impl TokenBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fragment. Empty fragments are dropped.
    pub fn append(&mut self, delta: TokenDelta) {
        match delta {
            TokenDelta::Stage1 { model, content } => {
                if content.is_empty() {
                    return;
                }
                self.pending.stage1.entry(model).or_default().push_str(&content);
            }
            TokenDelta::Stage2 { model, content } => {
                if content.is_empty() {
                    return;
                }
                self.pending.stage2.entry(model).or_default().push_str(&content);
            }
            TokenDelta::Stage3 { content } => {
                if content.is_empty() {
                    return;
                }
                self.pending.stage3.push_str(&content);
            }
        }
        self.fragments += 1;
    }

    /// Take everything buffered and reset to empty.
    ///
    /// Returns `None` when nothing was buffered.
    pub fn drain(&mut self) -> Option<StreamingState> {
        if self.is_empty() {
            return None;
        }
        self.fragments = 0;
        Some(std::mem::take(&mut self.pending))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Fragments appended since the last drain.
    pub fn fragments(&self) -> usize {
        self.fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s1(model: &str, content: &str) -> TokenDelta {
        TokenDelta::Stage1 {
            model: model.into(),
            content: content.into(),
        }
    }

    #[test]
    fn same_model_fragments_concatenate_in_order() {
        let mut buf = TokenBuffer::new();
        buf.append(s1("A", "Hi"));
        buf.append(s1("A", " there"));
        buf.append(s1("A", "!"));
        let drained = buf.drain().unwrap();
        assert_eq!(drained.stage1["A"], "Hi there!");
        assert_eq!(drained.stage1.len(), 1);
    }

    #[test]
    fn models_accumulate_independently() {
        let mut buf = TokenBuffer::new();
        buf.append(s1("A", "a1"));
        buf.append(s1("B", "b1"));
        buf.append(s1("A", "a2"));
        buf.append(TokenDelta::Stage2 {
            model: "A".into(),
            content: "rank".into(),
        });
        let drained = buf.drain().unwrap();
        assert_eq!(drained.stage1["A"], "a1a2");
        assert_eq!(drained.stage1["B"], "b1");
        assert_eq!(drained.stage2["A"], "rank");
        assert!(drained.stage3.is_empty());
    }

    #[test]
    fn stage3_is_a_single_running_string() {
        let mut buf = TokenBuffer::new();
        buf.append(TokenDelta::Stage3 { content: "The ".into() });
        buf.append(TokenDelta::Stage3 { content: "answer".into() });
        assert_eq!(buf.fragments(), 2);
        assert_eq!(buf.drain().unwrap().stage3, "The answer");
    }

    #[test]
    fn drain_resets_so_content_is_never_seen_twice() {
        let mut buf = TokenBuffer::new();
        buf.append(s1("A", "once"));
        assert!(buf.drain().is_some());
        assert!(buf.drain().is_none());
        assert!(buf.is_empty());
        assert_eq!(buf.fragments(), 0);

        buf.append(s1("A", "next"));
        assert_eq!(buf.drain().unwrap().stage1["A"], "next");
    }

    #[test]
    fn empty_buffer_drains_to_none() {
        let mut buf = TokenBuffer::new();
        assert!(buf.drain().is_none());
    }

    #[test]
    fn empty_fragments_are_dropped() {
        let mut buf = TokenBuffer::new();
        buf.append(s1("A", ""));
        buf.append(TokenDelta::Stage3 { content: String::new() });
        assert!(buf.is_empty());
        assert_eq!(buf.fragments(), 0);
        assert!(buf.drain().is_none());
    }
}
