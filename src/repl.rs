use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio::sync::watch;

use crate::cli::Args;
use crate::client::HttpScreeningClient;
use crate::controller::{ ConversationController, SubmitError, ViewModel };
use crate::models::chat::{ Message, Role };
use crate::progress::Stage;
use crate::renderer::StreamingRenderer;
use crate::session::{ FileKeyValueStore, SessionStore };

const HELP: &str = "Commands: /new starts over, /theme toggles the theme, /quit exits.";

pub async fn run_chat(args: &Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let backend = HttpScreeningClient::new(
        &args.server_url,
        Duration::from_secs(args.request_timeout_secs)
    )?;
    let store = SessionStore::new(Arc::new(FileKeyValueStore::new(&args.session_path)));
    let renderer = StreamingRenderer::new(
        args.reveal_chars_per_tick,
        Duration::from_millis(args.reveal_interval_ms)
    );
    let controller = ConversationController::initialize(Arc::new(backend), store, renderer);

    println!("TalentScout · AI-Powered Hiring Assistant");
    println!("{}", HELP);
    print_transcript(&controller.view());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => {
                break;
            }
            "/new" => {
                controller.reset_session();
                print_transcript(&controller.view());
                continue;
            }
            "/theme" => {
                let theme = controller.toggle_theme();
                println!("Theme preference: {}", if theme.is_dark() { "dark" } else { "light" });
                continue;
            }
            _ => {}
        }

        let slot = controller.view().messages.len() + 1;
        let printer = tokio::spawn(print_reply(controller.subscribe(), slot));
        match controller.submit_user_input(&line).await {
            Ok(_) | Err(SubmitError::Request(_)) => {
                let _ = printer.await;
            }
            Err(SubmitError::Ended) => {
                printer.abort();
                println!("This screening has ended. Type /new to start again.");
            }
            Err(e) => {
                printer.abort();
                log::debug!("Input not sent: {}", e);
            }
        }
        print_progress(&controller.view());
    }

    Ok(())
}

/// Prints the assistant message at `slot` as it grows, returning once it is final.
async fn print_reply(mut rx: watch::Receiver<ViewModel>, slot: usize) {
    let mut printer = ReplyPrinter::new(slot);
    while rx.changed().await.is_ok() {
        let view = rx.borrow_and_update().clone();
        let (chunk, done) = printer.advance(&view);
        print!("{}", chunk);
        let _ = std::io::stdout().flush();
        if done {
            println!();
            return;
        }
    }
}

/// Turns successive views into the text not yet shown for one reply.
struct ReplyPrinter {
    slot: usize,
    printed: usize,
    started: bool,
}

impl ReplyPrinter {
    fn new(slot: usize) -> Self {
        Self { slot, printed: 0, started: false }
    }

    /// Text to print for this view, and whether the reply is final.
    fn advance(&mut self, view: &ViewModel) -> (String, bool) {
        let Some(message) = view.messages.get(self.slot) else {
            return (String::new(), false);
        };
        let mut chunk = String::new();
        if !self.started {
            chunk.push_str("🤖 ");
            self.started = true;
        }
        let content = &message.content;
        if content.len() > self.printed && content.is_char_boundary(self.printed) {
            chunk.push_str(&content[self.printed..]);
            self.printed = content.len();
        }
        (chunk, !view.is_typing && !view.is_loading)
    }
}

fn print_transcript(view: &ViewModel) {
    for message in &view.messages {
        print_message(message);
    }
    print_progress(view);
}

fn print_message(message: &Message) {
    let who = match message.role {
        Role::User => "👤",
        Role::Assistant => "🤖",
        Role::System => "⚙️",
    };
    match &message.timestamp {
        Some(ts) => println!("{} [{}] {}", who, ts, message.content),
        None => println!("{} {}", who, message.content),
    }
}

fn print_progress(view: &ViewModel) {
    println!("{}", progress_line(view));
}

fn progress_line(view: &ViewModel) -> String {
    format!(
        "── Step {} of {} • {} {} • {}% Complete{}",
        view.stage.index() + 1,
        Stage::ALL.len(),
        view.stage.icon(),
        view.stage.label(),
        view.stage.progress_percent(),
        if view.ended { " • session ended" } else { "" }
    )
}
