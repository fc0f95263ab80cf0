//! Persona system prompt for conversational replies.
//!
//! [`PromptBuilder`] fills a template with the current time, a greeting
//! chosen by the hour of day, and a summary of what is known about the user.
//!
//! | Placeholder            | Replaced with                                    |
//! |------------------------|--------------------------------------------------|
//! | `{{assistant_name}}`   | configured persona name                          |
//! | `{{current_time}}`     | `YYYY-MM-DD HH:MM` (local time)                  |
//! | `{{time_greeting}}`    | greeting for morning / noon / afternoon / …      |
//! | `{{session_context}}`  | known name, location and up to 5 preferences     |

use chrono::{DateTime, Local, Timelike};

use crate::dialogue::SessionContext;

/// Preferences listed in the prompt at most.
pub const MAX_PROMPT_PREFERENCES: usize = 5;

// ---------------------------------------------------------------------------
// Default template
// ---------------------------------------------------------------------------

const DEFAULT_TEMPLATE: &str = "\
You are {{assistant_name}}, a friendly and upbeat voice assistant. Current time: {{current_time}}

Personality:
- Warm and lively, more like a friend than a machine
- Casual, natural spoken language
- Short replies with some warmth; no long lectures

Conversation rules:
- Never say things like \"as an AI assistant\"
- Adjust greetings to the time of day
- Remember what the user told you and refer to it naturally
- Show care and emotion where it fits
- Your reply will be read aloud: no markdown, lists or emoji

{{time_greeting}}

<memory>
{{session_context}}
</memory>";

const FIRST_CONVERSATION: &str = "This is our first conversation. Nice to meet you!";
const LEARNING_ABOUT_USER: &str = "Still getting to know the user.";

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Builds the system message sent ahead of the conversation history.
///
/// ```rust
/// use chrono::{Local, TimeZone};
/// use voice_assistant::dialogue::SessionContext;
/// use voice_assistant::llm::PromptBuilder;
///
/// let builder = PromptBuilder::new("Aria", None);
/// let at = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
/// let prompt = builder.build_system_prompt(&SessionContext::default(), at);
/// assert!(prompt.contains("You are Aria"));
/// assert!(prompt.contains("2024-05-01 09:30"));
/// ```
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    assistant_name: String,
    template: String,
}

impl PromptBuilder {
    /// `template` overrides the built-in persona prompt.
    pub fn new(assistant_name: &str, template: Option<&str>) -> Self {
        Self {
            assistant_name: assistant_name.to_string(),
            template: template.unwrap_or(DEFAULT_TEMPLATE).to_string(),
        }
    }

    pub fn assistant_name(&self) -> &str {
        &self.assistant_name
    }

    /// Render the template for `now`.
    pub fn build_system_prompt(&self, context: &SessionContext, now: DateTime<Local>) -> String {
        self.template
            .replace("{{assistant_name}}", &self.assistant_name)
            .replace("{{current_time}}", &now.format("%Y-%m-%d %H:%M").to_string())
            .replace("{{time_greeting}}", time_greeting(now.hour()))
            .replace("{{session_context}}", &context_summary(context))
    }
}

/// Greeting for the hour of day (0–23).
pub fn time_greeting(hour: u32) -> &'static str {
    match hour {
        5..=11 => "Good morning, a new day is starting!",
        12..=13 => "It's lunchtime, don't forget to eat!",
        14..=17 => "Good afternoon, maybe time for a coffee?",
        18..=21 => "Good evening, how was your day?",
        _ => "It's late, remember to get some rest.",
    }
}

/// Human-readable memory block for the prompt.
pub fn context_summary(context: &SessionContext) -> String {
    if context.is_empty() {
        return FIRST_CONVERSATION.to_string();
    }

    let mut parts = Vec::new();
    if let Some(name) = &context.user_name {
        parts.push(format!("User's name: {name}"));
    }
    if let Some(location) = &context.location {
        parts.push(format!("User's location: {location}"));
    }
    if !context.preferences.is_empty() {
        let prefs: Vec<&str> = context
            .preferences
            .iter()
            .take(MAX_PROMPT_PREFERENCES)
            .map(String::as_str)
            .collect();
        parts.push(format!("User likes: {}", prefs.join(", ")));
    }

    if parts.is_empty() {
        LEARNING_ABOUT_USER.to_string()
    } else {
        parts.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 2, hour, 5, 0).unwrap()
    }

    // ---- time_greeting ---

    #[test]
    fn greetings_follow_the_clock() {
        assert!(time_greeting(5).contains("morning"));
        assert!(time_greeting(11).contains("morning"));
        assert!(time_greeting(12).contains("lunch"));
        assert!(time_greeting(14).contains("afternoon"));
        assert!(time_greeting(21).contains("evening"));
        assert!(time_greeting(22).contains("late"));
        assert!(time_greeting(3).contains("late"));
    }

    // ---- context_summary ---

    #[test]
    fn empty_context_is_first_conversation() {
        assert_eq!(context_summary(&SessionContext::default()), FIRST_CONVERSATION);
    }

    #[test]
    fn summary_lists_known_facts() {
        let ctx = SessionContext {
            user_name: Some("Sam".into()),
            location: Some("Lisbon".into()),
            preferences: vec!["jazz".into(), "tea".into()],
        };
        let summary = context_summary(&ctx);
        assert!(summary.contains("User's name: Sam"));
        assert!(summary.contains("User's location: Lisbon"));
        assert!(summary.contains("User likes: jazz, tea"));
    }

    #[test]
    fn summary_caps_preferences() {
        let ctx = SessionContext {
            preferences: (0..8).map(|i| format!("p{i}")).collect(),
            ..SessionContext::default()
        };
        let summary = context_summary(&ctx);
        assert!(summary.contains("p4"));
        assert!(!summary.contains("p5"));
    }

    // ---- build_system_prompt ---

    #[test]
    fn default_template_fills_every_placeholder() {
        let prompt = PromptBuilder::new("Aria", None)
            .build_system_prompt(&SessionContext::default(), at(19));
        assert!(!prompt.contains("{{"));
        assert!(prompt.contains("Aria"));
        assert!(prompt.contains("2024-03-02 19:05"));
        assert!(prompt.contains("evening"));
        assert!(prompt.contains(FIRST_CONVERSATION));
    }

    #[test]
    fn custom_template_is_used() {
        let builder = PromptBuilder::new("Max", Some("{{assistant_name}} @ {{time_greeting}}"));
        let prompt = builder.build_system_prompt(&SessionContext::default(), at(8));
        assert_eq!(prompt, format!("Max @ {}", time_greeting(8)));
    }
}
