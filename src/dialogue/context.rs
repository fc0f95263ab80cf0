//! Picks up the user's name, location and likes from what they say.

use regex::Regex;

use super::session::SessionContext;

const MAX_NAME_CHARS: usize = 20;
const MAX_LOCATION_CHARS: usize = 30;
const MAX_PREFERENCE_CHARS: usize = 40;

const NAME_PATTERNS: &[&str] = &[
    r"(?i:\bmy name is|\bcall me|\bi am called|\bi'm called)\s+([\p{L}'-]+)",
];

const LOCATION_PATTERNS: &[&str] = &[
    r"(?i:\bi live in|\bi'm from|\bi am from|\bi'm based in|\bi am based in)\s+([^.,!?;\n]+)",
];

const PREFERENCE_PATTERNS: &[&str] = &[r"(?i:\bi (?:really )?(?:like|love|enjoy))\s+([^.,!?;\n]+)"];

/// Regex-based extractor; patterns are compiled once per instance.
#[derive(Debug, Clone)]
pub struct ContextExtractor {
    name: Vec<Regex>,
    location: Vec<Regex>,
    preference: Vec<Regex>,
}

impl ContextExtractor {
    pub fn new() -> Self {
        Self {
            name: compile(NAME_PATTERNS),
            location: compile(LOCATION_PATTERNS),
            preference: compile(PREFERENCE_PATTERNS),
        }
    }

    /// Merge anything found in `text` into `context`.  Returns whether the
    /// context changed.
    pub fn extract(&self, text: &str, context: &mut SessionContext) -> bool {
        let mut changed = false;

        if let Some(name) = first_capture(&self.name, text, MAX_NAME_CHARS) {
            if context.user_name.as_deref() != Some(name.as_str()) {
                log::debug!("dialogue: learned user name {name:?}");
                context.user_name = Some(name);
                changed = true;
            }
        }

        if let Some(location) = first_capture(&self.location, text, MAX_LOCATION_CHARS) {
            if context.location.as_deref() != Some(location.as_str()) {
                log::debug!("dialogue: learned location {location:?}");
                context.location = Some(location);
                changed = true;
            }
        }

        for re in &self.preference {
            for caps in re.captures_iter(text) {
                let Some(pref) = caps.get(1).and_then(|m| clean(m.as_str(), MAX_PREFERENCE_CHARS))
                else {
                    continue;
                };
                if !context.preferences.contains(&pref) {
                    log::debug!("dialogue: learned preference {pref:?}");
                    context.preferences.push(pref);
                    changed = true;
                }
            }
        }

        changed
    }
}

impl Default for ContextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                log::error!("dialogue: bad context pattern {p:?}: {e}");
                None
            }
        })
        .collect()
}

fn first_capture(patterns: &[Regex], text: &str, max_chars: usize) -> Option<String> {
    patterns
        .iter()
        .filter_map(|re| re.captures(text))
        .find_map(|caps| caps.get(1).and_then(|m| clean(m.as_str(), max_chars)))
}

fn clean(raw: &str, max_chars: usize) -> Option<String> {
    let value = raw.trim();
    let len = value.chars().count();
    (len > 0 && len <= max_chars).then(|| value.to_string())
}
