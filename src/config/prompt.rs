use once_cell::sync::Lazy;
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use log::info;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are TalentScout's intelligent Hiring Assistant chatbot. Your primary role is to conduct initial candidate screening by gathering essential information and generating relevant technical questions.

CORE RESPONSIBILITIES:
1. Greet candidates warmly and explain your purpose
2. Collect candidate information systematically
3. Generate 3-5 technical questions based on their tech stack
4. Maintain conversation context and flow
5. Handle unexpected inputs gracefully
6. End conversations professionally

CONVERSATION FLOW:
1. GREETING: Welcome the candidate and explain the process
2. INFORMATION GATHERING: Collect the following in order:
   - Full Name
   - Email Address
   - Phone Number
   - Years of Experience
   - Desired Position(s)
   - Current Location
   - Tech Stack (programming languages, frameworks, databases, tools)
3. TECHNICAL ASSESSMENT: Generate 3-5 relevant technical questions based on their declared tech stack
4. CONCLUSION: Thank them and explain next steps

IMPORTANT RULES:
- Stay focused on hiring and recruitment topics
- Be professional but friendly
- Ask for one piece of information at a time
- Generate technical questions that match the candidate's experience level
- If someone tries to deviate from the hiring process, politely redirect
- Handle conversation-ending keywords like \"bye\", \"quit\", \"exit\", \"stop\"
- Never store or remember personal information beyond the current session

TECHNICAL QUESTION EXAMPLES:
- For Python: \"Can you explain the difference between lists and tuples in Python?\"
- For React: \"How do you handle state management in React applications?\"
- For SQL: \"What's the difference between INNER JOIN and LEFT JOIN?\"

Always maintain a helpful, professional tone and ensure the conversation flows naturally.";

const DEFAULT_CLOSING_MESSAGE: &str =
    "Thank you for your time! Your information has been recorded and our recruitment team will review your profile. You can expect to hear back from us within 2-3 business days. Have a great day! 👋";

const DEFAULT_FALLBACK_MESSAGE: &str =
    "I apologize, but I'm having trouble processing your request. Could you please try again?";

const DEFAULT_ENDING_KEYWORDS: [&str; 6] = ["bye", "quit", "exit", "stop", "goodbye", "end"];

pub static DEFAULT_PROMPT_CONFIG: Lazy<Arc<PromptConfig>> = Lazy::new(||
    Arc::new(PromptConfig::default())
);

#[derive(Debug)]
pub enum PromptError {
    MissingField(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::MissingField(key) => write!(f, "Prompt field '{}' must not be empty", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

/// Everything the orchestrator says on its own: the system instructions it prepends and the
/// fixed replies it produces without a model call. Fields missing from a prompt file keep
/// their built-in values.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PromptConfig {
    pub system_prompt: String,
    pub ending_keywords: Vec<String>,
    pub closing_message: String,
    pub fallback_message: String,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            ending_keywords: DEFAULT_ENDING_KEYWORDS.iter()
                .map(|k| k.to_string())
                .collect(),
            closing_message: DEFAULT_CLOSING_MESSAGE.to_string(),
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            last_loaded: None,
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if self.system_prompt.trim().is_empty() {
            return Err(PromptError::MissingField("system_prompt".to_string()));
        }
        if self.closing_message.trim().is_empty() {
            return Err(PromptError::MissingField("closing_message".to_string()));
        }
        if self.fallback_message.trim().is_empty() {
            return Err(PromptError::MissingField("fallback_message".to_string()));
        }
        if self.ending_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(PromptError::MissingField("ending_keywords".to_string()));
        }
        Ok(())
    }

    /// Literal, case-insensitive substring match; "Exiting" ends the session just like "exit".
    pub fn is_ending_message(&self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        self.ending_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .any(|k| lowered.contains(&k))
    }
}

pub fn load_prompts_from_str(json: &str) -> Result<PromptConfig, PromptError> {
    let config: PromptConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(&path)?;
    let mut config = load_prompts_from_str(&file_content)?;
    config.last_loaded = Some(SystemTime::now());
    Ok(Arc::new(config))
}

pub fn reload_prompts_if_changed<P: AsRef<Path>>(
    path: P,
    current_config: &Arc<PromptConfig>
) -> Result<Option<Arc<PromptConfig>>, PromptError> {
    let metadata = fs::metadata(&path)?;

    if let Ok(modified) = metadata.modified() {
        if let Some(last_loaded) = current_config.last_loaded {
            if modified > last_loaded {
                info!("Prompts file changed, reloading...");
                return load_prompts(&path).map(Some);
            }
        } else {
            info!("No last_loaded timestamp, reloading prompts...");
            return load_prompts(&path).map(Some);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn default_config_matches_builtin_texts() {
        let config = PromptConfig::default();
        assert!(config.system_prompt.starts_with("You are TalentScout's intelligent Hiring Assistant"));
        assert_eq!(config.ending_keywords.len(), 6);
        assert!(config.closing_message.contains("2-3 business days"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ending_detection_is_case_insensitive_substring() {
        let config = PromptConfig::default();
        assert!(config.is_ending_message("I'd like to EXIT now"));
        assert!(config.is_ending_message("Exiting considerations"));
        assert!(config.is_ending_message("ok, goodbye"));
        assert!(config.is_ending_message("Bye!"));
        assert!(!config.is_ending_message("My name is Dana"));
        assert!(!config.is_ending_message("I know Python and Rust"));
    }

    #[test]
    fn partial_prompt_file_keeps_defaults() {
        let config = load_prompts_from_str(r#"{ "system_prompt": "Screen for SRE roles." }"#).unwrap();
        assert_eq!(config.system_prompt, "Screen for SRE roles.");
        assert_eq!(config.fallback_message, PromptConfig::default().fallback_message);
        assert!(config.is_ending_message("quit"));
    }

    #[test]
    fn empty_required_field_is_rejected() {
        let err = load_prompts_from_str(r#"{ "closing_message": "  " }"#).unwrap_err();
        assert!(matches!(err, PromptError::MissingField(ref f) if f == "closing_message"));

        let err = load_prompts_from_str(r#"{ "ending_keywords": [] }"#).unwrap_err();
        assert!(matches!(err, PromptError::MissingField(_)));
    }

    #[test]
    fn malformed_prompt_file_is_a_json_error() {
        assert!(matches!(load_prompts_from_str("{ nope"), Err(PromptError::JsonError(_))));
    }

    #[test]
    fn reload_only_when_file_is_newer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        fs::write(&path, r#"{ "system_prompt": "first" }"#).unwrap();

        let loaded = load_prompts(&path).unwrap();
        assert_eq!(loaded.system_prompt, "first");

        let mut stale = (*loaded).clone();
        stale.last_loaded = loaded.last_loaded.map(|t| t + Duration::from_secs(3600));
        assert!(reload_prompts_if_changed(&path, &Arc::new(stale)).unwrap().is_none());

        let never_loaded = Arc::new(PromptConfig::default());
        let reloaded = reload_prompts_if_changed(&path, &never_loaded).unwrap().unwrap();
        assert_eq!(reloaded.system_prompt, "first");
    }
}
