// API route configuration

use actix_web::web;

use crate::api::handlers;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check (no auth required)
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        // API v1 routes (all require authentication)
        .service(
            web::scope("/api/v1")
                // Canonical library queries
                .route("/library", web::get().to(handlers::list_library))
                .route("/library/{id}", web::get().to(handlers::get_entry))
                // Sync control
                .route("/sync/trigger", web::post().to(handlers::trigger_sync))
                .route("/sync/status", web::get().to(handlers::sync_status)),
        );
}
