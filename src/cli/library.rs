use anyhow::{anyhow, bail, Result};
use tracing::info;

use psn_client::{PsnClient, PsnConfig};

use crate::storage::{self, Storage, StoredConfig};
use crate::sync;

#[derive(Debug, Clone, Default)]
pub struct ShowCommandConfig {
    pub limit: Option<usize>,
    pub platform: Option<String>,
    pub search: Option<String>,
}

fn client() -> PsnClient {
    PsnClient::new(PsnConfig::default())
}

pub async fn run_login(username: String, npsso: String) -> Result<()> {
    if username.trim().is_empty() || npsso.trim().is_empty() {
        bail!("both --username and --npsso are required");
    }
    let storage = Storage::from_env();
    let client = client();

    info!("exchanging NPSSO for access code");
    let code = client.exchange_npsso_for_access_code(npsso.trim()).await?;
    info!("exchanging access code for auth tokens");
    let tokens = client.exchange_access_code_for_tokens(&code).await?;

    storage.save_config(&StoredConfig {
        username: username.trim().to_string(),
        tokens,
    })?;
    println!(
        "tokens saved to {}",
        storage.root().join(storage::CONFIG_FILE).display()
    );
    Ok(())
}

pub async fn run_refresh() -> Result<()> {
    let storage = Storage::from_env();
    let cfg = storage
        .load_config()?
        .ok_or_else(|| anyhow!("no stored config; run login first"))?;
    let refresh = cfg
        .tokens
        .refresh_token
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("no refresh token stored; run login again"))?;

    let tokens = client().exchange_refresh_token(refresh).await?;
    let expires_at = tokens.access_expires_at();
    storage.save_config(&StoredConfig {
        username: cfg.username,
        tokens,
    })?;
    println!("access token refreshed; expires at epoch ms {expires_at}");
    Ok(())
}

pub async fn run_profile() -> Result<()> {
    let storage = Storage::from_env();
    let client = client();
    let cfg = storage
        .load_config()?
        .ok_or_else(|| anyhow!("no stored config; run login first"))?;
    let tokens = sync::ensure_fresh_tokens(&client, &storage, &cfg).await?;
    let profile = client.profile(&tokens, &cfg.username).await?;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

pub async fn run_sync() -> Result<()> {
    let storage = Storage::from_env();
    let entries = sync::full_library_sync(&client(), &storage).await?;
    println!(
        "library synced: {} entries -> {}",
        entries.len(),
        storage.root().join(storage::LIBRARY_FILE).display()
    );
    Ok(())
}

pub fn run_merge() -> Result<()> {
    let storage = Storage::from_env();
    let entries = sync::merge_from_snapshots(&storage)?;
    println!(
        "library rebuilt from snapshots: {} entries -> {}",
        entries.len(),
        storage.root().join(storage::LIBRARY_FILE).display()
    );
    Ok(())
}

pub fn run_show(cfg: ShowCommandConfig) -> Result<()> {
    let storage = Storage::from_env();
    if !storage.exists(storage::LIBRARY_FILE) {
        bail!("no canonical library found; run sync (or merge) first");
    }
    let entries = storage.load_library()?;
    let total = entries.len();

    let platform_filter = cfg.platform.map(|p| p.to_uppercase());
    let search_filter = cfg.search.map(|s| s.to_lowercase());

    let mut shown = 0usize;
    for entry in &entries {
        if let Some(p) = &platform_filter {
            let matches = entry
                .platform
                .as_deref()
                .is_some_and(|ep| ep.contains(p.as_str()));
            if !matches {
                continue;
            }
        }
        if let Some(s) = &search_filter {
            if !entry.display_name.to_lowercase().contains(s.as_str()) {
                continue;
            }
        }
        if let Some(limit) = cfg.limit {
            if shown >= limit {
                break;
            }
        }
        shown += 1;

        let platform = entry.platform.as_deref().unwrap_or("-");
        let progress = entry
            .trophy_progress
            .map(|p| format!("{p}%"))
            .unwrap_or_else(|| "-".into());
        let sources: Vec<&str> = entry.source.iter().map(|s| s.as_str()).collect();
        println!(
            "{:<50} {:<10} {:>5}  [{}]",
            entry.display_name,
            platform,
            progress,
            sources.join(",")
        );
    }
    println!("{shown} shown of {total} entries");
    Ok(())
}
