pub mod store;

use serde::{ Deserialize, Serialize };

use crate::models::chat::{ Message, Role };

pub use store::{ FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, SessionStore, StoreError };

const GREETINGS: [&str; 3] = [
    "👋 Welcome to TalentScout! I'm your AI Hiring Assistant.",
    "I'll guide you through a quick 5-step screening process. Ready to get started? ✨",
    "First, let's start with your full name. What should I call you? 😊",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn is_dark(self) -> bool {
        self == Theme::Dark
    }

    pub fn from_dark_flag(dark: bool) -> Self {
        if dark { Theme::Dark } else { Theme::Light }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// The persisted unit: one transcript plus the flags that travel with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub transcript: Vec<Message>,
    pub ended: bool,
    pub theme: Theme,
}

impl Session {
    pub fn seeded(theme: Theme) -> Self {
        Self {
            transcript: greeting_messages(),
            ended: false,
            theme,
        }
    }

    /// Number of leading assistant messages, i.e. the greeting seed that is never sent upstream.
    pub fn seed_len(&self) -> usize {
        self.transcript
            .iter()
            .take_while(|m| m.role == Role::Assistant)
            .count()
    }
}

pub fn greeting_messages() -> Vec<Message> {
    GREETINGS.iter()
        .map(|text| Message::assistant(*text).stamped())
        .collect()
}
