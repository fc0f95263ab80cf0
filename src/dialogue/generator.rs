//! [`ConversationalGenerator`] — a [`ReplyGenerator`] that keeps the
//! conversation.
//!
//! ```text
//! stream_reply(text)
//!   ├─ dialogue.add_message(User, text)
//!   ├─ backend.stream_chat(system prompt + history)
//!   └─ chunks pass through; the joined reply is recorded as the
//!      assistant turn when the stream ends or fails
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::llm::{ChatBackend, LlmError, ReplyGenerator, ReplyStream};

use super::manager::DialogueManager;
use super::message::Role;

pub struct ConversationalGenerator {
    dialogue: Arc<DialogueManager>,
    backend: Arc<dyn ChatBackend>,
}

impl ConversationalGenerator {
    pub fn new(dialogue: Arc<DialogueManager>, backend: Arc<dyn ChatBackend>) -> Self {
        Self { dialogue, backend }
    }
}

#[async_trait]
impl ReplyGenerator for ConversationalGenerator {
    async fn stream_reply(&self, text: &str) -> Result<ReplyStream, LlmError> {
        self.dialogue.add_message(Role::User, text).await;
        let messages = self.dialogue.llm_messages().await;
        let inner = self.backend.stream_chat(messages).await?;
        Ok(recording(inner, Arc::clone(&self.dialogue)))
    }
}

struct Recording {
    inner: ReplyStream,
    dialogue: Arc<DialogueManager>,
    reply: String,
    finished: bool,
}

impl Recording {
    async fn record(&mut self) {
        self.finished = true;
        if !self.reply.is_empty() {
            let reply = std::mem::take(&mut self.reply);
            self.dialogue.add_message(Role::Assistant, &reply).await;
        }
    }
}

fn recording(inner: ReplyStream, dialogue: Arc<DialogueManager>) -> ReplyStream {
    let state = Recording {
        inner,
        dialogue,
        reply: String::new(),
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        match state.inner.next().await {
            Some(Ok(chunk)) => {
                state.reply.push_str(&chunk);
                Some((Ok(chunk), state))
            }
            Some(Err(e)) => {
                state.record().await;
                Some((Err(e), state))
            }
            None => {
                state.record().await;
                None
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::*;
    use crate::dialogue::SessionStore;
    use crate::llm::{ChatMessage, PromptBuilder};

    struct FakeBackend {
        chunks: Vec<Result<String, LlmError>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl ChatBackend for FakeBackend {
        async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<ReplyStream, LlmError> {
            self.seen.lock().unwrap().push(messages);
            Ok(stream::iter(self.chunks.clone()).boxed())
        }
    }

    async fn setup(
        dir: &TempDir,
        chunks: Vec<Result<String, LlmError>>,
    ) -> (Arc<DialogueManager>, Arc<FakeBackend>, ConversationalGenerator) {
        let store = SessionStore::open(dir.path(), 10).await.unwrap();
        let dialogue = Arc::new(DialogueManager::new(store, PromptBuilder::new("Aria", None), 20));
        dialogue.start_new_session().await.unwrap();
        let backend = Arc::new(FakeBackend {
            chunks,
            seen: Mutex::new(Vec::new()),
        });
        let generator = ConversationalGenerator::new(Arc::clone(&dialogue), backend.clone());
        (dialogue, backend, generator)
    }

    async fn drain(mut stream: ReplyStream) -> Vec<Result<String, LlmError>> {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn records_both_turns() {
        let dir = TempDir::new().unwrap();
        let (dialogue, backend, generator) =
            setup(&dir, vec![Ok("Hel".into()), Ok("lo!".into())]).await;

        let chunks = drain(generator.stream_reply("hi").await.unwrap()).await;
        assert_eq!(chunks.len(), 2);

        let sent = backend.seen.lock().unwrap()[0].clone();
        assert_eq!(sent[0].role, "system");
        assert_eq!(sent.last().unwrap(), &ChatMessage::user("hi"));

        let session = dialogue.current_session().await.unwrap();
        let turns: Vec<_> = session
            .messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(turns, vec![(Role::User, "hi"), (Role::Assistant, "Hello!")]);
    }

    #[tokio::test]
    async fn history_is_sent_on_the_next_turn() {
        let dir = TempDir::new().unwrap();
        let (_dialogue, backend, generator) = setup(&dir, vec![Ok("ok".into())]).await;

        drain(generator.stream_reply("one").await.unwrap()).await;
        drain(generator.stream_reply("two").await.unwrap()).await;

        let second = backend.seen.lock().unwrap()[1].clone();
        let contents: Vec<_> = second[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "ok", "two"]);
    }

    #[tokio::test]
    async fn failure_stops_the_stream_and_keeps_partial_reply() {
        let dir = TempDir::new().unwrap();
        let (dialogue, _backend, generator) = setup(
            &dir,
            vec![
                Ok("part".into()),
                Err(LlmError::Api("boom".into())),
                Ok("unreached".into()),
            ],
        )
        .await;

        let items = drain(generator.stream_reply("hi").await.unwrap()).await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());

        let session = dialogue.current_session().await.unwrap();
        assert_eq!(session.messages.last().unwrap().content, "part");
    }
}
