// HTTP request handlers for API endpoints

use actix_web::{web, HttpResponse, Result};
use tracing::{error, info};

use crate::api::models::*;
use crate::library::{CanonicalEntry, Source};
use crate::storage::{self, Storage};
use psn_client::PsnClient;

/// Health check endpoint
pub async fn health_check(storage: web::Data<Storage>) -> Result<HttpResponse> {
    let library = if storage.exists(storage::LIBRARY_FILE) {
        "present"
    } else {
        "missing"
    };

    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        library: library.to_string(),
        data_dir: storage.root().display().to_string(),
    });

    Ok(HttpResponse::Ok().json(response))
}

fn source_matches(entry: &CanonicalEntry, wanted: &str) -> bool {
    let wanted = match wanted.to_lowercase().as_str() {
        "purchased" => Source::Purchased,
        "titles" => Source::Titles,
        "played" => Source::Played,
        _ => return false,
    };
    entry.source.contains(&wanted)
}

/// List canonical library entries with optional filters
pub async fn list_library(
    query: web::Query<LibraryQuery>,
    storage: web::Data<Storage>,
) -> Result<HttpResponse> {
    if !storage.exists(storage::LIBRARY_FILE) {
        let response: ApiResponse<LibraryResponse> =
            ApiResponse::error("no canonical library; trigger a sync first");
        return Ok(HttpResponse::NotFound().json(response));
    }

    let entries = match storage.load_library() {
        Ok(entries) => entries,
        Err(err) => {
            error!(error = %err, "failed to load library file");
            let response: ApiResponse<LibraryResponse> =
                ApiResponse::error("library file unreadable");
            return Ok(HttpResponse::InternalServerError().json(response));
        }
    };
    let total = entries.len();

    let platform = query.platform.as_ref().map(|p| p.to_uppercase());
    let search = query.search.as_ref().map(|s| s.to_lowercase());

    let mut filtered: Vec<CanonicalEntry> = entries
        .into_iter()
        .filter(|e| {
            platform.as_ref().map_or(true, |p| {
                e.platform
                    .as_deref()
                    .is_some_and(|ep| ep.contains(p.as_str()))
            })
        })
        .filter(|e| {
            search
                .as_ref()
                .map_or(true, |s| e.display_name.to_lowercase().contains(s.as_str()))
        })
        .filter(|e| query.source.as_ref().map_or(true, |s| source_matches(e, s)))
        .collect();
    if let Some(limit) = query.limit {
        filtered.truncate(limit);
    }

    let response = ApiResponse::success(LibraryResponse {
        total,
        returned: filtered.len(),
        entries: filtered,
    });
    Ok(HttpResponse::Ok().json(response))
}

/// Fetch one entry by any identity field (titleId, npCommunicationId,
/// productId)
pub async fn get_entry(
    path: web::Path<String>,
    storage: web::Data<Storage>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let entries = storage.load_library().unwrap_or_default();
    match entries.into_iter().find(|e| e.has_id(&id)) {
        Some(entry) => Ok(HttpResponse::Ok().json(ApiResponse::success(entry))),
        None => {
            let response: ApiResponse<CanonicalEntry> =
                ApiResponse::error(format!("no entry with id {id}"));
            Ok(HttpResponse::NotFound().json(response))
        }
    }
}

/// Kick off a full sync in the background
pub async fn trigger_sync(
    storage: web::Data<Storage>,
    client: web::Data<PsnClient>,
) -> Result<HttpResponse> {
    info!("sync trigger requested");

    let storage = storage.get_ref().clone();
    let client = client.get_ref().clone();
    tokio::spawn(async move {
        match crate::sync::full_library_sync(&client, &storage).await {
            Ok(entries) => info!(entries = entries.len(), "triggered sync finished"),
            Err(err) => error!(error = %err, "triggered sync failed"),
        }
    });

    let response = ApiResponse::success(serde_json::json!({
        "message": "sync started",
        "status": "running"
    }));
    Ok(HttpResponse::Accepted().json(response))
}

/// Report the state of the canonical library file
pub async fn sync_status(storage: web::Data<Storage>) -> Result<HttpResponse> {
    let library_present = storage.exists(storage::LIBRARY_FILE);
    let entries = if library_present {
        storage.load_library().map(|e| e.len()).unwrap_or(0)
    } else {
        0
    };
    let last_synced = storage
        .modified(storage::LIBRARY_FILE)
        .map(chrono::DateTime::<chrono::Utc>::from);

    let response = ApiResponse::success(SyncStatusResponse {
        library_present,
        entries,
        last_synced,
    });
    Ok(HttpResponse::Ok().json(response))
}
