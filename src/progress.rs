use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;

use crate::models::chat::{ Message, Role };

/// Screening phases in the order a conversation walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Info,
    Experience,
    Tech,
    Questions,
    Summary,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Info,
        Stage::Experience,
        Stage::Tech,
        Stage::Questions,
        Stage::Summary,
    ];

    pub fn first() -> Self {
        Stage::Info
    }

    pub fn last() -> Self {
        Stage::Summary
    }

    pub fn index(self) -> usize {
        match self {
            Stage::Info => 0,
            Stage::Experience => 1,
            Stage::Tech => 2,
            Stage::Questions => 3,
            Stage::Summary => 4,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Stage::Info => "info",
            Stage::Experience => "experience",
            Stage::Tech => "tech",
            Stage::Questions => "questions",
            Stage::Summary => "summary",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Info => "Personal Info",
            Stage::Experience => "Experience",
            Stage::Tech => "Tech Stack",
            Stage::Questions => "Assessment",
            Stage::Summary => "Review",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Stage::Info => "👤",
            Stage::Experience => "💼",
            Stage::Tech => "⚡",
            Stage::Questions => "🎯",
            Stage::Summary => "✅",
        }
    }

    pub fn progress_percent(self) -> u8 {
        let total = Stage::ALL.len() as f32;
        (((self.index() + 1) as f32 / total) * 100.0).round() as u8
    }

    fn patterns(self) -> &'static [&'static str] {
        match self {
            Stage::Info =>
                &[
                    "full name",
                    "your name",
                    "email",
                    "phone",
                    "contact",
                    "location",
                    "where are you based",
                ],
            Stage::Experience =>
                &[
                    "years of experience",
                    "years of professional experience",
                    "experience",
                    "desired position",
                    "position",
                    "what role",
                ],
            Stage::Tech =>
                &[
                    "tech stack",
                    "technologies",
                    "programming languages",
                    "frameworks",
                    "databases",
                    "tools do you",
                ],
            Stage::Questions =>
                &[
                    "technical question",
                    "question 1",
                    "let me ask",
                    "assessment",
                    "explain the difference",
                    "how would you",
                    "how do you handle",
                ],
            Stage::Summary =>
                &[
                    "thank you for your time",
                    "summary",
                    "review your information",
                    "next steps",
                    "recruitment team",
                    "conclude",
                ],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseStageError {
    message: String,
}

impl fmt::Display for ParseStageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseStageError {}

impl FromStr for Stage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.key() == s.trim().to_lowercase())
            .ok_or_else(|| ParseStageError {
                message: format!("Invalid stage: '{}'", s),
            })
    }
}

/// Highest stage whose phrase list matches `text`, checked from the last stage down.
pub fn classify_text(text: &str) -> Option<Stage> {
    let lowered = text.to_lowercase();
    Stage::ALL
        .into_iter()
        .rev()
        .find(|stage| stage.patterns().iter().any(|p| lowered.contains(p)))
}

/// Stage inferred from the most recent assistant message only.
pub fn classify(transcript: &[Message]) -> Stage {
    transcript
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .and_then(|m| classify_text(&m.content))
        .unwrap_or_else(Stage::first)
}

/// Stage shown to the user: ended sessions sit on the last stage, tagged replies win over
/// pattern matching, untagged (legacy) transcripts fall back to `classify`.
pub fn resolve_stage(transcript: &[Message], ended: bool) -> Stage {
    if ended {
        return Stage::last();
    }
    match transcript.iter().rev().find(|m| m.role == Role::Assistant) {
        Some(Message { stage: Some(tag), .. }) => *tag,
        _ => classify(transcript),
    }
}
