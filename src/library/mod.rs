//! Canonical library construction: record model, normalization helpers, and
//! the merge engine that reconciles the purchased/titles/played batches.

pub mod demo;
pub mod index;
pub mod merge;
pub mod normalize;
pub mod platform;
pub mod record;

pub use merge::merge_library;
pub use record::{
    distill_played, played_from_response, purchased_from_response, titles_from_response,
    CanonicalEntry, PlayedGame, PurchasedGame, Source, TrophyTitle,
};
