//! Line-oriented console front-end.
//!
//! # Architecture
//!
//! ```text
//! stdin lines ──▶ parse_command ──▶ Console::handle ──▶ OperationController (source "cli")
//!                                         │                    │
//!                                         ▼                    ▼ subscribe_events
//!                                  DialogueManager       render task ──▶ Renderer ──▶ stdout
//!                                  (/new /list /load …)
//! ```
//!
//! User errors (already recording, nothing to stop, empty text) print a
//! one-line notice and the loop continues.

pub mod command;
pub mod render;

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::oneshot;

use crate::dialogue::session::truncate;
use crate::dialogue::{DialogueManager, Role};
use crate::lock;
use crate::pipeline::{ControllerError, OperationController, ProgressEvent};

pub use command::{parse_command, ConsoleCommand, DEFAULT_LIST_LIMIT, HELP};
pub use render::Renderer;

pub const SOURCE: &str = "cli";

const NO_SESSIONS: &str = "sessions are disabled";

/// How long `q` waits for running tasks to print their last events.
const QUIT_GRACE: Duration = Duration::from_secs(3);
const IDLE_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Console front-end writing to `W` (stdout in the binary).
pub struct Console<W: Write + Send + 'static> {
    controller: OperationController,
    dialogue: Option<Arc<DialogueManager>>,
    out: Arc<Mutex<W>>,
    assistant_name: String,
}

impl<W: Write + Send + 'static> Console<W> {
    pub fn new(
        controller: &OperationController,
        dialogue: Option<Arc<DialogueManager>>,
        out: W,
        assistant_name: &str,
    ) -> Self {
        Self {
            controller: controller.with_source(SOURCE),
            dialogue,
            out: Arc::new(Mutex::new(out)),
            assistant_name: assistant_name.to_string(),
        }
    }

    /// Shared handle to the output, e.g. to inspect it in tests.
    pub fn output(&self) -> Arc<Mutex<W>> {
        Arc::clone(&self.out)
    }

    /// Read commands until `q` or end of input, then shut the controller
    /// down.  Events already produced (and those of tasks that finish within
    /// [`QUIT_GRACE`]) are still printed before returning.
    pub async fn run<R: AsyncBufRead + Unpin>(&self, input: R) -> Result<()> {
        let mut subscription = self.controller.subscribe_events();
        let out = Arc::clone(&self.out);
        let mut renderer = Renderer::new(&self.assistant_name);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let render_task = tokio::spawn(async move {
            let mut print = |event: ProgressEvent| {
                if let Some(text) = renderer.render(&event) {
                    write_raw(&out, &text);
                }
            };
            loop {
                tokio::select! {
                    event = subscription.recv() => match event {
                        Some(event) => print(event),
                        None => break,
                    },
                    _ = &mut stop_rx => {
                        while let Some(event) = subscription.try_recv() {
                            print(event);
                        }
                        break;
                    }
                }
            }
        });

        self.say(&format!(
            "{} is listening. Type a message, or /help for commands.",
            self.assistant_name
        ));

        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if self.handle(parse_command(&line)).await == Flow::Quit {
                break;
            }
        }

        log::info!("console: leaving");
        self.controller.shutdown().await;
        if tokio::time::timeout(QUIT_GRACE, self.wait_idle()).await.is_err() {
            log::warn!("console: tasks still running, not waiting for them");
        }
        let _ = stop_tx.send(());
        if let Err(e) = render_task.await {
            log::warn!("console: renderer failed: {e}");
        }
        Ok(())
    }

    async fn wait_idle(&self) {
        loop {
            let status = self.controller.get_status();
            if status.active_task_count == 0 && status.awaiting_audio == 0 {
                // A task leaves the table just before its terminal event.
                tokio::time::sleep(IDLE_POLL).await;
                return;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    pub async fn handle(&self, command: ConsoleCommand) -> Flow {
        match command {
            ConsoleCommand::Empty => {}
            ConsoleCommand::Quit => {
                self.say("bye!");
                return Flow::Quit;
            }
            ConsoleCommand::StartRecording => {
                if let Err(e) = self.controller.start_recording().await {
                    self.notice(&e);
                }
            }
            ConsoleCommand::StopRecording => {
                if let Err(e) = self.controller.stop_recording().await {
                    self.notice(&e);
                }
            }
            ConsoleCommand::Text(text) => {
                if let Err(e) = self.controller.send_text(&text) {
                    self.notice(&e);
                }
            }
            ConsoleCommand::Status => self.print_status().await,
            ConsoleCommand::Help => self.say(HELP),
            ConsoleCommand::Usage(usage) => self.say(&format!("usage: {usage}")),
            ConsoleCommand::Unknown(line) => {
                self.say(&format!("unknown command {line:?}, try /help"))
            }
            ConsoleCommand::NewSession
            | ConsoleCommand::ListSessions(_)
            | ConsoleCommand::LoadSession(_)
            | ConsoleCommand::ClearSession
            | ConsoleCommand::DeleteSession(_) => self.handle_session(command).await,
        }
        Flow::Continue
    }

    async fn handle_session(&self, command: ConsoleCommand) {
        let Some(dialogue) = &self.dialogue else {
            self.say(NO_SESSIONS);
            return;
        };

        match command {
            ConsoleCommand::NewSession => match dialogue.start_new_session().await {
                Ok(info) => self.say(&format!("new conversation {}", short_id(&info.session_id))),
                Err(e) => self.say(&format!("could not start a conversation: {e}")),
            },
            ConsoleCommand::ListSessions(limit) => {
                let sessions = dialogue.list_sessions(limit).await;
                if sessions.is_empty() {
                    self.say("no saved conversations");
                }
                let current = dialogue.current_session_info().await.map(|i| i.session_id);
                for s in sessions {
                    let marker = if current.as_deref() == Some(s.session_id.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    self.say(&format!(
                        "{marker} {}  {}  {}",
                        short_id(&s.session_id),
                        s.updated_at.format("%Y-%m-%d %H:%M"),
                        s.title
                    ));
                }
            }
            ConsoleCommand::LoadSession(id) => {
                let Some(id) = self.resolve_session_id(dialogue, &id).await else {
                    self.say(&format!("no conversation matches {id:?}"));
                    return;
                };
                match dialogue.resume_session(&id).await {
                    Ok(true) => self.print_resumed(dialogue).await,
                    Ok(false) => self.say(&format!("conversation {} not found", short_id(&id))),
                    Err(e) => self.say(&format!("could not load conversation: {e}")),
                }
            }
            ConsoleCommand::ClearSession => match dialogue.clear_current_session().await {
                Ok(()) => self.say("conversation cleared"),
                Err(e) => self.say(&format!("could not clear conversation: {e}")),
            },
            ConsoleCommand::DeleteSession(id) => {
                let Some(id) = self.resolve_session_id(dialogue, &id).await else {
                    self.say(&format!("no conversation matches {id:?}"));
                    return;
                };
                match dialogue.delete_session(&id).await {
                    Ok(true) => self.say(&format!("deleted {}", short_id(&id))),
                    Ok(false) => self.say(&format!("conversation {} not found", short_id(&id))),
                    Err(e) => self.say(&format!("could not delete conversation: {e}")),
                }
            }
            _ => {}
        }
    }

    /// Accept a full id or a prefix matching exactly one listed session.
    async fn resolve_session_id(&self, dialogue: &DialogueManager, id: &str) -> Option<String> {
        let matches: Vec<String> = dialogue
            .list_sessions(usize::MAX)
            .await
            .into_iter()
            .map(|s| s.session_id)
            .filter(|sid| sid.starts_with(id))
            .collect();
        match matches.as_slice() {
            [only] => Some(only.clone()),
            _ if matches.iter().any(|sid| sid == id) => Some(id.to_string()),
            [] => Some(id.to_string()),
            _ => None,
        }
    }

    async fn print_resumed(&self, dialogue: &DialogueManager) {
        let Some(session) = dialogue.current_session().await else {
            return;
        };
        self.say(&format!("continuing \"{}\"", session.title()));
        let skip = session.messages.len().saturating_sub(4);
        for message in &session.messages[skip..] {
            let who = match message.role {
                Role::User => "You",
                _ => self.assistant_name.as_str(),
            };
            self.say(&format!(
                "  {who}: {}",
                truncate(&message.content, 80)
            ));
        }
    }

    async fn print_status(&self) {
        let status = self.controller.get_status();
        self.say(&format!(
            "recording: {} | active tasks: {} | awaiting audio: {} | listeners: {}",
            if status.is_recording { "yes" } else { "no" },
            status.active_task_count,
            status.awaiting_audio,
            status.observer_count
        ));
        let services: Vec<String> = self
            .controller
            .service_status()
            .into_iter()
            .map(|s| format!("{} {}", s.name, if s.available { "on" } else { "off" }))
            .collect();
        self.say(&format!("services: {}", services.join(", ")));

        if let Some(dialogue) = &self.dialogue {
            match dialogue.current_session_info().await {
                Some(info) => self.say(&format!(
                    "conversation: {} \"{}\" ({} messages)",
                    short_id(&info.session_id),
                    info.title,
                    info.message_count
                )),
                None => self.say("conversation: none"),
            }
        }
    }

    fn notice(&self, error: &ControllerError) {
        log::debug!("console: {error}");
        self.say(&format!("! {error}"));
    }

    fn say(&self, line: &str) {
        write_raw(&self.out, &format!("{line}\n"));
    }
}

fn write_raw<W: Write>(out: &Mutex<W>, text: &str) {
    let mut out = lock(out);
    if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
        log::warn!("console: write failed: {e}");
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::dialogue::SessionStore;
    use crate::events::EventBus;
    use crate::llm::PromptBuilder;
    use crate::pipeline::{ControllerOptions, PipelineServices};

    fn controller() -> OperationController {
        OperationController::new(
            EventBus::new(),
            PipelineServices::default(),
            ControllerOptions {
                audio_timeout: Duration::from_millis(20),
            },
        )
    }

    fn console(dialogue: Option<Arc<DialogueManager>>) -> Console<Vec<u8>> {
        Console::new(&controller(), dialogue, Vec::new(), "Aria")
    }

    fn printed(console: &Console<Vec<u8>>) -> String {
        String::from_utf8(console.output().lock().unwrap().clone()).unwrap()
    }

    async fn dialogue(dir: &TempDir) -> Arc<DialogueManager> {
        let store = SessionStore::open(dir.path(), 10).await.unwrap();
        let dm = DialogueManager::new(store, PromptBuilder::new("Aria", None), 20);
        dm.start_new_session().await.unwrap();
        Arc::new(dm)
    }

    #[tokio::test]
    async fn user_errors_print_a_notice_and_continue() {
        let console = console(None);

        assert_eq!(console.handle(ConsoleCommand::StopRecording).await, Flow::Continue);
        assert_eq!(console.handle(ConsoleCommand::StartRecording).await, Flow::Continue);
        assert_eq!(console.handle(ConsoleCommand::StartRecording).await, Flow::Continue);

        let out = printed(&console);
        assert!(out.contains("! no recording is in progress"));
        assert!(out.contains("! a recording is already in progress"));
    }

    #[tokio::test]
    async fn quit_ends_the_loop() {
        let console = console(None);
        assert_eq!(console.handle(ConsoleCommand::Quit).await, Flow::Quit);
    }

    #[tokio::test]
    async fn run_stops_at_q_and_shuts_down() {
        let console = console(None);
        let input: &[u8] = b"/status\nq\nnever read\n";

        console.run(input).await.unwrap();

        let out = printed(&console);
        assert!(out.contains("recording: no"));
        assert!(out.contains("services: stt off, llm off, tts off, player off"));
        assert!(out.contains("bye!"));
        assert!(console.controller.is_shut_down());
    }

    #[tokio::test]
    async fn quitting_mid_recording_prints_the_cancellation() {
        let console = console(None);
        let input: &[u8] = b"b
q
";

        console.run(input).await.unwrap();

        let out = printed(&console);
        assert!(out.contains("● recording"));
        assert!(out.contains("✗ recording cancelled by shutdown"));
        assert!(out.find("● recording") < out.find("✗ recording cancelled"));
    }

    #[tokio::test]
    async fn quitting_waits_for_running_tasks() {
        let console = console(None);
        // No generator configured, so the text task ends in an error that
        // must still reach the screen.
        let input: &[u8] = b"hello
q
";

        console.run(input).await.unwrap();

        assert!(printed(&console).contains("✗ reply generation is not available"));
        assert_eq!(console.controller.get_status().active_task_count, 0);
    }

    #[tokio::test]
    async fn session_commands_need_a_dialogue() {
        let console = console(None);
        console.handle(ConsoleCommand::NewSession).await;
        assert!(printed(&console).contains(NO_SESSIONS));
    }

    #[tokio::test]
    async fn list_marks_current_and_load_accepts_prefix() {
        let dir = TempDir::new().unwrap();
        let dm = dialogue(&dir).await;
        let first = dm.current_session_info().await.unwrap().session_id;
        dm.add_message(Role::User, "tell me about owls").await;
        dm.start_new_session().await.unwrap();
        let console = console(Some(Arc::clone(&dm)));

        console.handle(ConsoleCommand::ListSessions(10)).await;
        console
            .handle(ConsoleCommand::LoadSession(first[..8].to_string()))
            .await;

        let out = printed(&console);
        assert!(out.contains("tell me about owls"));
        assert!(out.contains("continuing \"tell me about owls\""));
        assert!(out.contains("You: tell me about owls"));
        assert_eq!(dm.current_session_info().await.unwrap().session_id, first);
    }

    #[tokio::test]
    async fn delete_unknown_session_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let console = console(Some(dialogue(&dir).await));

        console
            .handle(ConsoleCommand::DeleteSession("zzzz".into()))
            .await;

        assert!(printed(&console).contains("not found"));
    }

    #[test]
    fn short_ids() {
        assert_eq!(short_id("0123456789"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
