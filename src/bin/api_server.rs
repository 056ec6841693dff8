// HTTP API server binary: serves the canonical library and a sync trigger.

use anyhow::Result;
use psn_librarian::api::ApiServer;
use psn_librarian::storage::Storage;
use psn_librarian::util::env as env_util;
use psn_client::{PsnClient, PsnConfig};

#[actix_web::main]
async fn main() -> Result<()> {
    psn_librarian::tracing::init_tracing("info")?;

    // Load dotenv/env once (safe to call multiple times)
    env_util::init_env();

    let server = ApiServer::from_env()?;
    let storage = Storage::from_env();
    let client = PsnClient::new(PsnConfig::default());

    server.run(storage, client).await?;

    Ok(())
}
