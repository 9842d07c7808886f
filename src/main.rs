use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod console;
mod dispatch;
mod models;
mod poll;
mod session;
mod state;
mod view;

use api::ApiClient;
use console::Console;
use session::{SessionContext, SessionStore};

/// Operator console for the device-management backend.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Base URL of the device-management backend, fixed for the process.
    #[arg(long, default_value = "http://localhost:4000")]
    server_url: String,

    /// Device identity shown to non-admin operators.
    #[arg(long, default_value = "android-test")]
    device: String,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Accept self-signed TLS certificates (lab setups).
    #[arg(long)]
    accept_invalid_certs: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Poll loops and requests run here; the console loop keeps the main
    // thread for readline.
    let runtime = tokio::runtime::Runtime::new()?;

    let context = SessionContext::new();
    let token_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".mdm_console_token");
    let session = SessionStore::new(context.clone(), token_path);

    let api = ApiClient::builder()
        .base_url(args.server_url)
        .session(context)
        .timeout(Duration::from_secs(args.timeout_secs))
        .accept_invalid_certs(args.accept_invalid_certs)
        .build()?;

    let mut console = Console::new(api, session, runtime.handle().clone(), args.device)?;
    console.run()
}
