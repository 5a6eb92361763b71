pub mod api;

use crate::cli::ServeArgs;
use crate::config::RelayConfig;
use crate::llm::chat::new_client;
use crate::relay::RelayService;
use self::api::{ create_router, AppState };
use std::error::Error;
use std::net::SocketAddr;
use log::{ info, warn };

pub struct Server {
    addr: SocketAddr,
    state: AppState,
    args: ServeArgs,
}

impl Server {
    pub fn new(args: ServeArgs) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let addr = args.server_addr.parse::<SocketAddr>()?;
        let config = RelayConfig::from_args(&args);
        let client = new_client(&config.llm)?;
        info!(
            "Upstream configured: endpoint={}, model={}, key from ${}",
            config.llm.endpoint,
            client.get_model(),
            args.api_key_env
        );
        if config.api_key.resolve().is_err() {
            warn!("{} is not set yet; relay requests will fail until it is", args.api_key_env);
        }

        let state = AppState {
            relay: RelayService::new(client, config.api_key),
        };

        Ok(Self { addr, state, args })
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let app = create_router(self.state);

        if self.args.enable_tls {
            let (cert_path, key_path) = match (&self.args.tls_cert_path, &self.args.tls_key_path) {
                (Some(cert), Some(key)) => (cert, key),
                _ => {
                    return Err("TLS enabled without both --tls-cert-path and --tls-key-path".into());
                }
            };
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                cert_path,
                key_path
            ).await?;

            info!("Relay listening on: https://{}", self.addr);
            axum_server::bind_rustls(self.addr, tls_config).serve(app.into_make_service()).await?;
        } else {
            let listener = tokio::net::TcpListener::bind(self.addr).await?;
            info!("Relay listening on: http://{}", listener.local_addr()?);
            axum::serve(listener, app.into_make_service()).await?;
        }

        Ok(())
    }
}
