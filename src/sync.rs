//! Full library sync pipeline: fetch the three sources, snapshot them to
//! disk, merge, and persist the canonical library. The merge itself is pure;
//! everything with a failure mode lives here.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::info;

use psn_client::{PsnClient, Tokens};

use crate::library::{self, CanonicalEntry};
use crate::storage::{self, Storage, StoredConfig};

/// Refresh the stored token pair when the access token has lapsed, persisting
/// the replacement so the next run starts warm.
pub async fn ensure_fresh_tokens(
    client: &PsnClient,
    storage: &Storage,
    cfg: &StoredConfig,
) -> Result<Tokens> {
    match client
        .refresh_if_expired(&cfg.tokens)
        .await
        .context("token refresh failed")?
    {
        Some(fresh) => {
            storage.save_config(&StoredConfig {
                username: cfg.username.clone(),
                tokens: fresh.clone(),
            })?;
            info!("token refresh succeeded, stored updated tokens");
            Ok(fresh)
        }
        None => Ok(cfg.tokens.clone()),
    }
}

/// Fetch purchased, titles, and played batches, rebuild the canonical library
/// from scratch, and persist it along with the raw snapshots.
pub async fn full_library_sync(
    client: &PsnClient,
    storage: &Storage,
) -> Result<Vec<CanonicalEntry>> {
    let cfg = storage
        .load_config()?
        .ok_or_else(|| anyhow!("no stored config; run login first"))?;
    let tokens = ensure_fresh_tokens(client, storage, &cfg).await?;

    let profile = client
        .profile(&tokens, &cfg.username)
        .await
        .context("profile fetch failed")?;
    let account_id = profile
        .pointer("/profile/accountId")
        .and_then(|v| {
            v.as_str()
                .map(String::from)
                .or_else(|| v.as_i64().map(|n| n.to_string()))
        })
        .ok_or_else(|| anyhow!("profile response carried no accountId"))?;

    info!(account_id = %account_id, "fetching purchased games");
    storage.reset_purchased_pages()?;
    let size = client.config().purchased_page_size.max(1);
    let delay = Duration::from_millis(client.config().purchased_page_delay_ms);
    let mut purchased_raw: Vec<Value> = Vec::new();
    let mut start: u32 = 0;
    loop {
        let resp = client
            .purchased_page(&tokens, start, size)
            .await
            .context("purchased page fetch failed")?;
        let page: Vec<Value> = resp
            .pointer("/data/purchasedTitlesRetrieve/games")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if page.is_empty() {
            break;
        }
        storage.append_purchased_page(&page)?;
        let fetched = page.len();
        purchased_raw.extend(page);
        info!(batch = fetched, total = purchased_raw.len(), "purchased page fetched");
        if fetched < size as usize {
            break;
        }
        start += size;
        tokio::time::sleep(delay).await;
    }
    info!(total = purchased_raw.len(), "purchased fetch complete");
    let purchased = library::purchased_from_response(&Value::Array(purchased_raw));

    info!("fetching trophy titles");
    let titles_resp = client
        .user_titles(&tokens, &account_id)
        .await
        .context("titles fetch failed")?;
    let titles = library::titles_from_response(&titles_resp);
    storage.write_json(
        storage::TITLES_RAW_FILE,
        titles_resp.get("trophyTitles").unwrap_or(&titles_resp),
    )?;
    info!(count = titles.len(), "titles saved");

    info!("fetching played games");
    let played_resp = client
        .played_games(&tokens, &account_id)
        .await
        .context("played fetch failed")?;
    storage.write_json(storage::PLAYED_RAW_FILE, &played_resp)?;
    let played = library::played_from_response(&played_resp);
    storage.write_json(
        storage::PLAYED_DISTILLED_FILE,
        &library::distill_played(&played),
    )?;
    info!(count = played.len(), "played games fetched");

    info!("merging library");
    let entries = library::merge_library(&purchased, &titles, &played);
    storage.save_library(&entries)?;
    info!(entries = entries.len(), "full library saved");

    Ok(entries)
}

/// Rebuild the canonical library from the on-disk raw snapshots, no network.
/// Missing snapshot files read as empty batches.
pub fn merge_from_snapshots(storage: &Storage) -> Result<Vec<CanonicalEntry>> {
    let purchased = if storage.exists(storage::PURCHASED_RAW_FILE) {
        library::purchased_from_response(&Value::Array(storage.load_purchased_pages()?))
    } else {
        Vec::new()
    };
    let titles = if storage.exists(storage::TITLES_RAW_FILE) {
        library::titles_from_response(&storage.read_json::<Value>(storage::TITLES_RAW_FILE)?)
    } else {
        Vec::new()
    };
    let played = if storage.exists(storage::PLAYED_RAW_FILE) {
        library::played_from_response(&storage.read_json::<Value>(storage::PLAYED_RAW_FILE)?)
    } else {
        Vec::new()
    };

    info!(
        purchased = purchased.len(),
        titles = titles.len(),
        played = played.len(),
        "merging from local snapshots"
    );
    let entries = library::merge_library(&purchased, &titles, &played);
    storage.save_library(&entries)?;
    Ok(entries)
}
