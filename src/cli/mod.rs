pub mod chat;

use clap::{ Parser, Subcommand };

use crate::client::DEFAULT_RELAY_URL;
use crate::config::DEFAULT_API_KEY_ENV;
use crate::llm::{ DEFAULT_MODEL, DEFAULT_UPSTREAM_URL };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false", global = true)]
    pub debug: bool,

    #[command(flatten)]
    pub serve: ServeArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the relay server (the default).
    Serve,
    /// Chat with a running relay from the terminal.
    Chat(ChatArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    // --- Server Args ---
    /// Host address and port for the relay to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    // --- Upstream Provider Args ---
    /// Chat-completions endpoint of the upstream provider.
    #[arg(long, env = "UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream_url: String,

    /// Model name sent upstream (e.g., gpt-3.5-turbo, gpt-4o)
    #[arg(long, env = "UPSTREAM_MODEL", default_value = DEFAULT_MODEL)]
    pub upstream_model: String,

    /// Name of the environment variable holding the upstream API key.
    /// It is read on every request, so the server starts without it.
    #[arg(long, env = "API_KEY_ENV", default_value = DEFAULT_API_KEY_ENV)]
    pub api_key_env: String,

    /// Timeout in seconds for a non-streaming upstream call.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value = "60")]
    pub upstream_timeout_secs: u64,

    /// Longest silence in seconds tolerated between two streamed chunks.
    #[arg(long, env = "UPSTREAM_IDLE_TIMEOUT_SECS", default_value = "60")]
    pub upstream_idle_timeout_secs: u64,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ChatArgs {
    /// Base URL of the relay server.
    #[arg(long, env = "RELAY_URL", default_value = DEFAULT_RELAY_URL)]
    pub relay_url: String,

    /// File the conversations are kept in.
    #[arg(long, env = "STORE_PATH", default_value = "conversations.json")]
    pub store_path: String,

    /// Send a single message and exit instead of starting the prompt loop.
    #[arg(short, long)]
    pub message: Option<String>,

    /// Conversation id to make active before sending.
    #[arg(long)]
    pub conversation: Option<String>,

    /// Turn streaming on or off (the choice is remembered).
    #[arg(long)]
    pub stream: Option<bool>,

    /// Client-side timeout in seconds, applied per chunk when streaming.
    #[arg(long, env = "RELAY_TIMEOUT_SECS", default_value = "120")]
    pub timeout_secs: u64,
}
