//! Turns progress events into console text.
//!
//! Reply chunks are printed inline after a `Name: ` prefix and the line is
//! closed by `REPLY_COMPLETE` (or by an error cutting the reply short).

use crate::pipeline::{ProgressEvent, ProgressKind};

#[derive(Debug)]
pub struct Renderer {
    assistant_name: String,
    in_reply: bool,
}

impl Renderer {
    pub fn new(assistant_name: &str) -> Self {
        Self {
            assistant_name: assistant_name.to_string(),
            in_reply: false,
        }
    }

    /// Text to print for `event`, if any.  Includes its own newlines.
    pub fn render(&mut self, event: &ProgressEvent) -> Option<String> {
        match event.kind {
            ProgressKind::RecordingStarted => {
                Some("● recording... type `e` and Enter to stop\n".to_string())
            }
            ProgressKind::RecordingStopped => Some("■ stopped, thinking...\n".to_string()),
            ProgressKind::TranscriptionResult => Some(format!("You: {}\n", event.content)),
            ProgressKind::ReplyChunk => {
                if self.in_reply {
                    Some(event.content.clone())
                } else {
                    self.in_reply = true;
                    Some(format!("{}: {}", self.assistant_name, event.content))
                }
            }
            ProgressKind::ReplyComplete => {
                if std::mem::take(&mut self.in_reply) {
                    Some("\n".to_string())
                } else if event.content.is_empty() {
                    None
                } else {
                    Some(format!("{}: {}\n", self.assistant_name, event.content))
                }
            }
            ProgressKind::SynthesisComplete if event.content.contains("failed") => {
                Some(format!("(no speech: {})\n", event.content))
            }
            ProgressKind::TaskError => {
                let lead = if std::mem::take(&mut self.in_reply) { "\n" } else { "" };
                Some(format!("{lead}✗ {}\n", event.content))
            }
            ProgressKind::SynthesisStarted
            | ProgressKind::SynthesisComplete
            | ProgressKind::TaskComplete => None,
        }
    }
}
