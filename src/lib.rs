pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod relay;
pub mod server;
pub mod session;
pub mod sse;

use cli::{ Args, Command };
use log::info;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    match args.command {
        Some(Command::Chat(chat)) => cli::chat::run(chat).await,
        Some(Command::Serve) | None => {
            let serve = args.serve;
            info!("--- Relay Configuration ---");
            info!("Server Address: {}", serve.server_addr);
            info!("TLS Enabled: {}", serve.enable_tls);
            info!("Upstream URL: {}", serve.upstream_url);
            info!("Upstream Model: {}", serve.upstream_model);
            info!("API Key Variable: {}", serve.api_key_env);
            info!("Upstream Timeout: {}s (idle {}s)", serve.upstream_timeout_secs, serve.upstream_idle_timeout_secs);
            info!("---------------------------");

            Server::new(serve)?.run().await
        }
    }
}
