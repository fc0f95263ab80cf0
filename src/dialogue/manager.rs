//! [`DialogueManager`] — the current session, its history window and the
//! persona prompt sent with every request.

use chrono::Local;
use tokio::sync::Mutex;

use crate::llm::{ChatMessage, PromptBuilder};

use super::context::ContextExtractor;
use super::message::{Message, Role};
use super::session::{Session, SessionInfo, SessionSummary};
use super::store::{SessionError, SessionStore};

pub struct DialogueManager {
    store: SessionStore,
    prompt: PromptBuilder,
    extractor: ContextExtractor,
    history_limit: usize,
    current: Mutex<Option<Session>>,
}

impl DialogueManager {
    pub fn new(store: SessionStore, prompt: PromptBuilder, history_limit: usize) -> Self {
        Self {
            store,
            prompt,
            extractor: ContextExtractor::new(),
            history_limit,
            current: Mutex::new(None),
        }
    }

    pub fn assistant_name(&self) -> &str {
        self.prompt.assistant_name()
    }

    /// Resume the most recent session when `resume_latest` is set and one
    /// exists, otherwise start a new one.
    pub async fn initialize(&self, resume_latest: bool) -> Result<SessionInfo, SessionError> {
        if resume_latest {
            if let Some(latest) = self.store.list(1).await.into_iter().next() {
                if self.resume_session(&latest.session_id).await? {
                    log::info!("dialogue: resumed {} ({})", latest.session_id, latest.title);
                    if let Some(info) = self.current_session_info().await {
                        return Ok(info);
                    }
                }
                log::warn!("dialogue: could not resume {}, starting fresh", latest.session_id);
            }
        }
        self.start_new_session().await
    }

    pub async fn start_new_session(&self) -> Result<SessionInfo, SessionError> {
        let session = self.store.create().await?;
        let info = session.info();
        *self.current.lock().await = Some(session);
        Ok(info)
    }

    /// Make `session_id` current.  `Ok(false)` when it does not exist.
    pub async fn resume_session(&self, session_id: &str) -> Result<bool, SessionError> {
        match self.store.load(session_id).await? {
            Some(session) => {
                *self.current.lock().await = Some(session);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Append to the current session (starting one if none is open) and
    /// persist it.  Persistence failures are logged, not returned.
    pub async fn add_message(&self, role: Role, content: &str) {
        let mut current = self.current.lock().await;
        if current.is_none() {
            match self.store.create().await {
                Ok(session) => *current = Some(session),
                Err(e) => {
                    log::warn!("dialogue: no session to record into: {e}");
                    return;
                }
            }
        }
        let Some(session) = current.as_mut() else {
            return;
        };

        if role == Role::User {
            self.extractor
                .extract(content, &mut session.metadata.context);
        }
        session.add_message(Message::new(role, content));

        if let Err(e) = self.store.save(session).await {
            log::warn!("dialogue: failed to save session {}: {e}", session.session_id);
        }
    }

    /// System prompt followed by the last `history_limit` turns.
    pub async fn llm_messages(&self) -> Vec<ChatMessage> {
        let current = self.current.lock().await;
        let context = current
            .as_ref()
            .map(|s| s.metadata.context.clone())
            .unwrap_or_default();

        let mut messages = vec![ChatMessage::system(
            self.prompt.build_system_prompt(&context, Local::now()),
        )];
        if let Some(session) = current.as_ref() {
            messages.extend(session.history(self.history_limit));
        }
        messages
    }

    pub async fn current_session_info(&self) -> Option<SessionInfo> {
        self.current.lock().await.as_ref().map(Session::info)
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.current.lock().await.clone()
    }

    pub async fn list_sessions(&self, limit: usize) -> Vec<SessionSummary> {
        self.store.list(limit).await
    }

    /// Empty the current session's messages and learned context.
    pub async fn clear_current_session(&self) -> Result<(), SessionError> {
        let mut current = self.current.lock().await;
        if let Some(session) = current.as_mut() {
            session.clear();
            self.store.save(session).await?;
        }
        Ok(())
    }

    /// Delete a stored session; deleting the current one leaves no session
    /// open until the next message or `start_new_session`.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, SessionError> {
        let deleted = self.store.delete(session_id).await?;
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|s| s.session_id == session_id) {
            *current = None;
        }
        Ok(deleted)
    }

    /// A full copy of `session_id`, or of the current session when `None`.
    pub async fn export_session(&self, session_id: Option<&str>) -> Result<Option<Session>, SessionError> {
        {
            let current = self.current.lock().await;
            if let Some(session) = current.as_ref() {
                if session_id.map_or(true, |id| id == session.session_id) {
                    return Ok(Some(session.clone()));
                }
            }
        }
        match session_id {
            Some(id) => self.store.load(id).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn manager(dir: &TempDir) -> DialogueManager {
        let store = SessionStore::open(dir.path(), 100).await.unwrap();
        DialogueManager::new(store, PromptBuilder::new("Aria", None), 4)
    }

    #[tokio::test]
    async fn initialize_starts_fresh_when_nothing_stored() {
        let dir = TempDir::new().unwrap();
        let dm = manager(&dir).await;

        let info = dm.initialize(true).await.unwrap();

        assert_eq!(info.message_count, 0);
        assert_eq!(dm.list_sessions(10).await.len(), 1);
    }

    #[tokio::test]
    async fn initialize_resumes_latest_session() {
        let dir = TempDir::new().unwrap();
        let id = {
            let dm = manager(&dir).await;
            dm.start_new_session().await.unwrap();
            dm.add_message(Role::User, "hello there").await;
            dm.current_session_info().await.unwrap().session_id
        };

        let dm = manager(&dir).await;
        let info = dm.initialize(true).await.unwrap();
        assert_eq!(info.session_id, id);
        assert_eq!(info.message_count, 1);

        let fresh = manager(&dir).await.initialize(false).await.unwrap();
        assert_ne!(fresh.session_id, id);
    }

    #[tokio::test]
    async fn messages_carry_prompt_and_limited_history() {
        let dir = TempDir::new().unwrap();
        let dm = manager(&dir).await;
        dm.start_new_session().await.unwrap();
        for i in 0..3 {
            dm.add_message(Role::User, &format!("q{i}")).await;
            dm.add_message(Role::Assistant, &format!("a{i}")).await;
        }

        let messages = dm.llm_messages().await;

        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("You are Aria"));
        assert_eq!(messages[1].content, "q1");
        assert_eq!(messages[4].content, "a2");
    }

    #[tokio::test]
    async fn learned_context_reaches_the_prompt_and_disk() {
        let dir = TempDir::new().unwrap();
        let dm = manager(&dir).await;
        let info = dm.start_new_session().await.unwrap();

        dm.add_message(Role::User, "My name is Sam and I live in Lisbon.").await;

        let prompt = dm.llm_messages().await.remove(0).content;
        assert!(prompt.contains("User's name: Sam"));
        assert!(prompt.contains("User's location: Lisbon"));

        let stored = SessionStore::open(dir.path(), 100)
            .await
            .unwrap()
            .load(&info.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.metadata.context.user_name.as_deref(), Some("Sam"));
    }

    #[tokio::test]
    async fn add_message_without_session_starts_one() {
        let dir = TempDir::new().unwrap();
        let dm = manager(&dir).await;

        dm.add_message(Role::User, "hi").await;

        assert_eq!(dm.current_session_info().await.unwrap().message_count, 1);
    }

    #[tokio::test]
    async fn resume_unknown_session_is_false() {
        let dir = TempDir::new().unwrap();
        let dm = manager(&dir).await;
        assert!(!dm.resume_session("missing").await.unwrap());
    }

    #[tokio::test]
    async fn clear_and_delete_current_session() {
        let dir = TempDir::new().unwrap();
        let dm = manager(&dir).await;
        let info = dm.start_new_session().await.unwrap();
        dm.add_message(Role::User, "I like tea").await;

        dm.clear_current_session().await.unwrap();
        let session = dm.current_session().await.unwrap();
        assert!(session.messages.is_empty());
        assert!(session.metadata.context.is_empty());

        assert!(dm.delete_session(&info.session_id).await.unwrap());
        assert!(dm.current_session_info().await.is_none());
        assert!(dm.list_sessions(10).await.is_empty());
    }

    #[tokio::test]
    async fn export_current_or_stored_session() {
        let dir = TempDir::new().unwrap();
        let dm = manager(&dir).await;
        let first = dm.start_new_session().await.unwrap();
        dm.add_message(Role::User, "first").await;
        let second = dm.start_new_session().await.unwrap();

        let current = dm.export_session(None).await.unwrap().unwrap();
        assert_eq!(current.session_id, second.session_id);

        let older = dm.export_session(Some(&first.session_id)).await.unwrap().unwrap();
        assert_eq!(older.messages.len(), 1);
        assert_eq!(
            dm.current_session_info().await.unwrap().session_id,
            second.session_id
        );
    }
}
