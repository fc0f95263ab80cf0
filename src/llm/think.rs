//! Removes `<think>…</think>` reasoning blocks from a streamed reply.
//!
//! Tags may be split across chunks (`"<thi"` + `"nk>"`), so a possible tag
//! prefix at the end of a chunk is held back until the next chunk decides it.

const OPEN: &str = "<think>";
const CLOSE: &str = "</think>";

#[derive(Debug, Default)]
pub struct ThinkFilter {
    inside: bool,
    held: String,
}

impl ThinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk; returns the visible text it completes.
    pub fn push(&mut self, chunk: &str) -> String {
        self.held.push_str(chunk);
        let mut visible = String::new();

        loop {
            let tag = if self.inside { CLOSE } else { OPEN };
            match self.held.find(tag) {
                Some(at) => {
                    if !self.inside {
                        visible.push_str(&self.held[..at]);
                    }
                    self.held.drain(..at + tag.len());
                    self.inside = !self.inside;
                }
                None => {
                    let keep = partial_tag_len(&self.held, tag);
                    let cut = self.held.len() - keep;
                    if !self.inside {
                        visible.push_str(&self.held[..cut]);
                    }
                    self.held.drain(..cut);
                    break;
                }
            }
        }

        visible
    }

    /// End of stream: release held text unless it is inside a think block.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.held);
        if self.inside {
            String::new()
        } else {
            rest
        }
    }
}

/// Length of the longest proper prefix of `tag` that `text` ends with.
fn partial_tag_len(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&n| text.ends_with(&tag[..n]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&str]) -> String {
        let mut filter = ThinkFilter::new();
        let mut out: String = chunks.iter().map(|c| filter.push(c)).collect();
        out.push_str(&filter.finish());
        out
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(run(&["Hello", ", world"]), "Hello, world");
    }

    #[test]
    fn removes_block_in_single_chunk() {
        assert_eq!(run(&["<think>plan</think>Hi there"]), "Hi there");
    }

    #[test]
    fn removes_block_split_across_chunks() {
        assert_eq!(
            run(&["Hel", "lo <thi", "nk>secret", " stuff</th", "ink> friend"]),
            "Hello  friend"
        );
    }

    #[test]
    fn lone_angle_bracket_is_released() {
        assert_eq!(run(&["a <", "b"]), "a <b");
        assert_eq!(run(&["x <"]), "x <");
    }

    #[test]
    fn unterminated_block_is_dropped() {
        assert_eq!(run(&["ok <think>never closed"]), "ok ");
    }

    #[test]
    fn multiple_blocks() {
        assert_eq!(run(&["<think>a</think>1<think>b</think>2"]), "12");
    }

    #[test]
    fn held_prefix_is_not_emitted_early() {
        let mut filter = ThinkFilter::new();
        assert_eq!(filter.push("hi <th"), "hi ");
        assert_eq!(filter.push("ere"), "<there");
    }
}
