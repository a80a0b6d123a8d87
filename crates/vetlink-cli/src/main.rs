//! vetlink CLI entry point.
//!
//! # Usage
//!
//! ```bash
//! vetlink --base-url https://clinic.example/api --user-id 9 --room 3
//!
//! # Behind a login session
//! vetlink --base-url https://clinic.example/api --user-id 9 --cookie "SESSION=abc"
//! ```

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vetlink_app::{AppConfig, AppSession, Command, Runtime, UserProfile};
use vetlink_cli::LiveDriver;
use vetlink_client::transport::{DEFAULT_SOCKET_PATH, Endpoints, RestClient, SystemEnv};

/// vetlink chat and notification client
#[derive(Parser, Debug)]
#[command(name = "vetlink")]
#[command(about = "Chat and notification client for the clinic backend")]
#[command(version)]
struct Args {
    /// API base URL
    #[arg(short, long, default_value = "http://localhost:8080/api")]
    base_url: String,

    /// Websocket path on the server origin
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket_path: String,

    /// Logged-in user id
    #[arg(short, long)]
    user_id: u64,

    /// Display name
    #[arg(short = 'n', long, default_value = "guest")]
    name: String,

    /// Room to open on start
    #[arg(short, long)]
    room: Option<u64>,

    /// Session cookie sent with every request
    #[arg(long, env = "VETLINK_COOKIE")]
    cookie: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout carries the chat log
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mut endpoints = Endpoints::new(&args.base_url)?.with_socket_path(&args.socket_path)?;
    if let Some(cookie) = args.cookie {
        endpoints = endpoints.with_cookie(cookie);
    }
    tracing::info!(api = %args.base_url, socket = %endpoints.socket_url(), "vetlink starting");

    let mut driver = LiveDriver::new(RestClient::new(endpoints)?);
    if let Some(room_id) = args.room {
        driver.queue(Command::EnterRoom(room_id));
    }

    let user = UserProfile { user_id: args.user_id, display_name: args.name };
    let session = AppSession::login(SystemEnv::new(), user, AppConfig::default());

    Runtime::new(driver, session).run().await?;
    Ok(())
}
