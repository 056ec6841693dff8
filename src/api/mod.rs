// HTTP surface for the canonical library: read endpoints for consumers
// (the preview UI, scripts) plus a sync trigger.

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;
