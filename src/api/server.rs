// API server implementation using actix-web

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};

use crate::api::{auth, middleware, routes};
use crate::storage::Storage;
use psn_client::PsnClient;

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub api_secret: String,
    pub allowed_origins: String,
}

impl ApiServer {
    /// Create server from environment variables
    pub fn from_env() -> Result<Self> {
        crate::util::env::init_env();

        let host = crate::util::env::env_opt("API_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = crate::util::env::env_opt("API_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .context("invalid API_PORT")?;
        let api_secret =
            crate::util::env::env_req("API_SECRET").context("API_SECRET is required")?;
        let allowed_origins = crate::util::env::env_opt("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Self {
            host,
            port,
            api_secret,
            allowed_origins,
        })
    }

    /// Start the HTTP server
    pub async fn run(self, storage: Storage, client: PsnClient) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);

        tracing::info!(
            host = %self.host,
            port = %self.port,
            data_dir = %storage.root().display(),
            "starting library API server"
        );

        let storage_data = web::Data::new(storage);
        let client_data = web::Data::new(client);
        let api_secret = self.api_secret.clone();
        let allowed_origins = self.allowed_origins.clone();

        HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);
            let auth = auth::ApiAuth::new(api_secret.clone());

            App::new()
                .app_data(storage_data.clone())
                .app_data(client_data.clone())
                .wrap(logger)
                .wrap(compress)
                .wrap(cors)
                .wrap(auth)
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}
