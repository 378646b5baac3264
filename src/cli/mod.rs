use clap::{ Parser, Subcommand };

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the screening HTTP server (default).
    Serve,
    /// Start an interactive screening session against a running server.
    Chat,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (groq, openai)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "groq", global = true)]
    pub chat_llm_type: String,

    /// Full chat-completions endpoint (Groq) or API host (OpenAI). Adapter default if unset.
    #[arg(long, env = "CHAT_BASE_URL", global = true)]
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider
    #[arg(long, env = "CHAT_API_KEY", default_value = "", hide_env_values = true, global = true)]
    pub chat_api_key: String,

    /// Groq API key, used when CHAT_API_KEY is empty
    #[arg(long, env = "GROQ_API_KEY", default_value = "", hide_env_values = true, global = true)]
    pub groq_api_key: String,

    /// Model name for chat completion (e.g., llama-3.3-70b-versatile, gpt-4o)
    #[arg(long, env = "CHAT_MODEL", global = true)]
    pub chat_model: Option<String>,

    /// Sampling temperature for every screening reply.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7", global = true)]
    pub chat_temperature: f32,

    /// Upper bound on generated tokens per reply.
    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "1000", global = true)]
    pub chat_max_tokens: u32,

    /// Seconds to wait for the LLM provider before reporting a timeout.
    #[arg(long, env = "BACKEND_TIMEOUT_SECS", default_value = "30", global = true)]
    pub backend_timeout_secs: u64,

    // --- Server Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000", global = true)]
    pub server_addr: String,

    /// Optional path to a JSON prompt configuration file. Built-in prompts are used if unset.
    #[arg(long, env = "PROMPTS_PATH", global = true)]
    pub prompts_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false", global = true)]
    pub enable_tls: bool,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH", global = true)]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH", global = true)]
    pub tls_key_path: Option<String>,

    // --- Chat Client Args ---
    /// Base URL of the screening server the chat client talks to.
    #[arg(long, env = "SCREENING_SERVER_URL", default_value = "http://127.0.0.1:3000", global = true)]
    pub server_url: String,

    /// File holding the persisted chat session.
    #[arg(long, env = "SESSION_PATH", default_value = ".screening-session.json", global = true)]
    pub session_path: String,

    /// Seconds before the chat client gives up on the server.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "60", global = true)]
    pub request_timeout_secs: u64,

    /// Characters revealed per typing tick.
    #[arg(long, env = "REVEAL_CHARS_PER_TICK", default_value = "3", global = true)]
    pub reveal_chars_per_tick: usize,

    /// Milliseconds between typing ticks.
    #[arg(long, env = "REVEAL_INTERVAL_MS", default_value = "20", global = true)]
    pub reveal_interval_ms: u64,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }

    /// The credential to call the provider with, if any is configured.
    pub fn effective_api_key(&self) -> Option<String> {
        [&self.chat_api_key, &self.groq_api_key]
            .into_iter()
            .map(|k| k.trim())
            .find(|k| !k.is_empty())
            .map(str::to_string)
    }
}
