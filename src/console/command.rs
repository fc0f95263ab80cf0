//! Console input → [`ConsoleCommand`].

/// Sessions listed by `/list` without an explicit count.
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// One line typed at the console prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `b` — begin recording.
    StartRecording,
    /// `e` — end recording and process it.
    StopRecording,
    /// `q` — leave the console.
    Quit,
    /// `/new`
    NewSession,
    /// `/list [n]`
    ListSessions(usize),
    /// `/load <id>` — full id or a unique prefix.
    LoadSession(String),
    /// `/clear`
    ClearSession,
    /// `/delete <id>`
    DeleteSession(String),
    /// `/status`
    Status,
    /// `/help`
    Help,
    /// Any other non-empty line is sent to the assistant.
    Text(String),
    /// A slash command used incorrectly; carries the usage hint.
    Usage(&'static str),
    /// Unrecognised slash command.
    Unknown(String),
    Empty,
}

pub fn parse_command(line: &str) -> ConsoleCommand {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleCommand::Empty;
    }

    match line.to_ascii_lowercase().as_str() {
        "b" => return ConsoleCommand::StartRecording,
        "e" => return ConsoleCommand::StopRecording,
        "q" | "quit" | "exit" => return ConsoleCommand::Quit,
        _ => {}
    }

    let Some(rest) = line.strip_prefix('/') else {
        return ConsoleCommand::Text(line.to_string());
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default().to_ascii_lowercase();
    let arg = parts.next();

    match (name.as_str(), arg) {
        ("new", _) => ConsoleCommand::NewSession,
        ("list", None) => ConsoleCommand::ListSessions(DEFAULT_LIST_LIMIT),
        ("list", Some(n)) => match n.parse::<usize>() {
            Ok(n) if n > 0 => ConsoleCommand::ListSessions(n),
            _ => ConsoleCommand::Usage("/list [count]"),
        },
        ("load", Some(id)) => ConsoleCommand::LoadSession(id.to_string()),
        ("load", None) => ConsoleCommand::Usage("/load <session id>"),
        ("delete", Some(id)) => ConsoleCommand::DeleteSession(id.to_string()),
        ("delete", None) => ConsoleCommand::Usage("/delete <session id>"),
        ("clear", _) => ConsoleCommand::ClearSession,
        ("status", _) => ConsoleCommand::Status,
        ("help", _) | ("?", _) => ConsoleCommand::Help,
        _ => ConsoleCommand::Unknown(line.to_string()),
    }
}

pub const HELP: &str = "\
Commands:
  b              start recording
  e              stop recording and send it
  q              quit
  /new           start a new conversation
  /list [n]      list recent conversations
  /load <id>     continue a conversation (id prefix is enough)
  /clear         forget the current conversation
  /delete <id>   delete a conversation
  /status        show pipeline status
  /help          show this help
Anything else is sent as a message.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_letter_commands() {
        assert_eq!(parse_command("b"), ConsoleCommand::StartRecording);
        assert_eq!(parse_command(" E \n"), ConsoleCommand::StopRecording);
        assert_eq!(parse_command("q"), ConsoleCommand::Quit);
        assert_eq!(parse_command("exit"), ConsoleCommand::Quit);
    }

    #[test]
    fn blank_lines_are_empty() {
        assert_eq!(parse_command(""), ConsoleCommand::Empty);
        assert_eq!(parse_command("   \t"), ConsoleCommand::Empty);
    }

    #[test]
    fn other_lines_are_text() {
        assert_eq!(
            parse_command("  what's up?  "),
            ConsoleCommand::Text("what's up?".into())
        );
        assert_eq!(parse_command("be quick"), ConsoleCommand::Text("be quick".into()));
    }

    #[test]
    fn session_commands() {
        assert_eq!(parse_command("/new"), ConsoleCommand::NewSession);
        assert_eq!(
            parse_command("/list"),
            ConsoleCommand::ListSessions(DEFAULT_LIST_LIMIT)
        );
        assert_eq!(parse_command("/list 3"), ConsoleCommand::ListSessions(3));
        assert_eq!(parse_command("/LOAD ab12"), ConsoleCommand::LoadSession("ab12".into()));
        assert_eq!(parse_command("/delete x"), ConsoleCommand::DeleteSession("x".into()));
        assert_eq!(parse_command("/clear"), ConsoleCommand::ClearSession);
        assert_eq!(parse_command("/status"), ConsoleCommand::Status);
        assert_eq!(parse_command("/help"), ConsoleCommand::Help);
    }

    #[test]
    fn malformed_slash_commands() {
        assert!(matches!(parse_command("/load"), ConsoleCommand::Usage(_)));
        assert!(matches!(parse_command("/list zero"), ConsoleCommand::Usage(_)));
        assert!(matches!(parse_command("/list 0"), ConsoleCommand::Usage(_)));
        assert_eq!(
            parse_command("/dance"),
            ConsoleCommand::Unknown("/dance".into())
        );
    }
}
