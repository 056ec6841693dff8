// API request/response models (DTOs)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(Meta::now()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: Some(Meta::now()),
        }
    }
}

/// Metadata included in all API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// "present" when a canonical library file exists on disk
    pub library: String,
    pub data_dir: String,
}

/// Query filters for the library listing
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LibraryQuery {
    /// Platform substring, matched against the upper-cased stored value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Case-insensitive substring of the display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// One of "purchased" / "titles" / "played"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Library listing response
#[derive(Debug, Serialize)]
pub struct LibraryResponse {
    pub total: usize,
    pub returned: usize,
    pub entries: Vec<crate::library::CanonicalEntry>,
}

/// Sync status response
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncStatusResponse {
    pub library_present: bool,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
}
