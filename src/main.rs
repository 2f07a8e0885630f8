//! ReelFinder - Entry Point

use reelfinder::Config;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let help_mode = std::env::args().any(|a| a == "--help" || a == "-h");
    if help_mode {
        println!("ReelFinder v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: reelfinder");
        println!();
        println!("Environment variables:");
        println!("  TELEGRAM_TOKEN           Telegram bot token (required)");
        println!("  GROQ_API_KEY             Completion API key (required)");
        println!("  CHANNEL_ID               Source channel id (required)");
        println!("  DATABASE_URL             Catalog database, e.g. sqlite://catalog.db (required)");
        println!("  COMPLETION_MODEL         Model name (default: llama-3.1-8b-instant)");
        println!("  COMPLETION_API_URL       OpenAI-compatible base URL");
        println!("  COMPLETION_TIMEOUT_SECS  Completion timeout (default: 30)");
        println!("  RUST_LOG                 trace|debug|info|warn|error (default: info)");
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Missing configuration is fatal
    let config = Config::from_env()?;

    info!("ReelFinder v{}", env!("CARGO_PKG_VERSION"));
    reelfinder::telegram::run_bot(config).await
}
