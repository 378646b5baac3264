pub mod cli;
pub mod client;
pub mod config;
pub mod controller;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod renderer;
pub mod repl;
pub mod server;
pub mod session;

use cli::{ Args, Command };
use log::info;
use orchestrator::PromptOrchestrator;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    match args.command() {
        Command::Serve => serve(args).await,
        Command::Chat => {
            info!("Chat client targeting: {}", args.server_url);
            info!("Session file: {}", args.session_path);
            repl::run_chat(&args).await
        }
    }
}

async fn serve(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("Chat API Key Present: {}", args.effective_api_key().is_some());
    info!("Temperature: {}", args.chat_temperature);
    info!("Max Tokens: {}", args.chat_max_tokens);
    info!("Backend Timeout: {}s", args.backend_timeout_secs);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let orchestrator = Arc::new(PromptOrchestrator::from_args(&args)?);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, orchestrator, args);
    server.run().await?;

    Ok(())
}
