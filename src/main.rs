use clap::Parser;
use dotenv::dotenv;
use screening_agent::cli::{ Args, Command };
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    let args = Args::parse();

    // Chat output shares the terminal with the log, so keep it quiet there.
    let default_filter = match args.command() {
        Command::Serve => "info",
        Command::Chat => "warn",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    screening_agent::run(args).await
}
