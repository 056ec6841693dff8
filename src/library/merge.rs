//! The merge engine: folds the three source batches into one canonical,
//! de-duplicated library.
//!
//! Resolution order for every incoming record is identity match, then
//! concept-sibling match, then normalized-name + platform-compatibility
//! fallback; the first tier that matches wins and the search stops there.
//! Purchased records seed the collection, titles and played records mutate
//! matched entries in place (existing fields are preserved where the incoming
//! record lacks a value). The engine performs no I/O and never fails: missing
//! or malformed fields degrade to `None` and the fold runs to completion.

use tracing::{debug, info};

use super::index::LibraryIndex;
use super::normalize;
use super::platform;
use super::record::{
    first_present, CanonicalEntry, PlayedGame, PurchasedGame, Source, TrophyTitle,
};

/// Merge the three ordered batches into the canonical library, rebuilt from
/// scratch on every call. Output order is insertion order: purchased entries
/// first, then entries created during the titles/played folds.
pub fn merge_library(
    purchased: &[PurchasedGame],
    titles: &[TrophyTitle],
    played: &[PlayedGame],
) -> Vec<CanonicalEntry> {
    let kept_purchased: Vec<&PurchasedGame> = purchased.iter().filter(|p| !p.is_demo()).collect();
    let kept_titles: Vec<&TrophyTitle> = titles.iter().filter(|t| !t.is_demo()).collect();
    let kept_played: Vec<&PlayedGame> = played.iter().filter(|p| !p.is_demo()).collect();

    info!(
        purchased_demos = purchased.len() - kept_purchased.len(),
        title_demos = titles.len() - kept_titles.len(),
        played_demos = played.len() - kept_played.len(),
        "demo filter applied"
    );

    let mut index = LibraryIndex::default();
    seed_purchased(&mut index, &kept_purchased);
    fold_titles(&mut index, &kept_titles);
    fold_played(&mut index, &kept_played);

    let mut entries = index.into_entries();
    // Presentation pass: persisted platform values are always upper-cased.
    for entry in &mut entries {
        if let Some(p) = entry.platform.take() {
            entry.platform = Some(platform::display_casing(&p));
        }
    }
    entries
}

/// Non-empty owned copy of an optional field.
fn owned(value: Option<&str>) -> Option<String> {
    value
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Step A: purchased records are the foundation. Key collisions within the
/// batch resolve last-write-wins.
fn seed_purchased(index: &mut LibraryIndex, records: &[&PurchasedGame]) {
    for p in records {
        let key = first_present([
            p.title_id.as_deref(),
            p.np_communication_id.as_deref(),
            p.product_id.as_deref(),
            p.name.as_deref(),
        ])
        .unwrap_or("")
        .to_string();

        let mut entry = CanonicalEntry {
            title_id: owned(p.title_id.as_deref()),
            np_communication_id: owned(p.np_communication_id.as_deref()),
            product_id: owned(p.product_id.as_deref()),
            name: owned(p.name.as_deref()),
            platform: owned(p.platform.as_deref()),
            concept: p.concept.clone(),
            source: vec![Source::Purchased],
            ..Default::default()
        };
        entry.refresh_derived();
        index.insert(key, entry);
    }
}

/// Step B: fold trophy-title records into the collection.
fn fold_titles(index: &mut LibraryIndex, records: &[&TrophyTitle]) {
    for t in records {
        let candidate_ids: Vec<&str> = [
            t.np_communication_id.as_deref(),
            t.title_id.as_deref(),
            t.product_id.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mut matched = index.find_by_any_id(&candidate_ids);
        if matched.is_none() {
            if let Some(tid) = first_present([t.title_id.as_deref()]) {
                matched = index.find_by_concept_title_id(tid);
            }
        }
        if matched.is_none() {
            let norm = normalize::normalized_name(
                first_present([
                    t.trophy_title_name.as_deref(),
                    t.title_name.as_deref(),
                    t.name.as_deref(),
                ])
                .unwrap_or(""),
            );
            matched = index.find_by_normalized_name(&norm, t.platform_hint());
            if matched.is_some() {
                debug!(name = %norm, "title record matched via name fallback");
            }
        }

        match matched {
            Some(key) => {
                if let Some(entry) = index.get_mut(&key) {
                    apply_title(entry, t);
                }
            }
            None => {
                let key = first_present([
                    t.np_communication_id.as_deref(),
                    t.title_id.as_deref(),
                    t.product_id.as_deref(),
                    t.trophy_title_name.as_deref(),
                    t.title_name.as_deref(),
                    t.name.as_deref(),
                ])
                .unwrap_or("")
                .to_string();
                let mut entry = CanonicalEntry::default();
                apply_title(&mut entry, t);
                index.insert(key, entry);
            }
        }
    }
}

/// Step C: fold play-history records into the collection.
fn fold_played(index: &mut LibraryIndex, records: &[&PlayedGame]) {
    for p in records {
        let candidate_ids: Vec<&str> = [
            p.title_id.as_deref(),
            p.np_communication_id.as_deref(),
            p.product_id.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mut matched = index.find_by_any_id(&candidate_ids);
        if matched.is_none() {
            if let Some(concept) = &p.concept {
                if !concept.title_ids.is_empty() {
                    matched = index.find_by_any_id(&concept.title_ids);
                }
            }
        }
        if matched.is_none() {
            let norm = normalize::normalized_name(
                first_present([
                    p.name.as_deref(),
                    p.title_name.as_deref(),
                    p.localized_name.as_deref(),
                ])
                .unwrap_or(""),
            );
            matched = index.find_by_normalized_name(&norm, p.platform_hint());
            if matched.is_some() {
                debug!(name = %norm, "played record matched via name fallback");
            }
        }

        match matched {
            Some(key) => {
                if let Some(entry) = index.get_mut(&key) {
                    apply_played(entry, p);
                }
            }
            None => {
                let key = first_present([
                    p.title_id.as_deref(),
                    p.np_communication_id.as_deref(),
                    p.product_id.as_deref(),
                    p.name.as_deref(),
                    p.localized_name.as_deref(),
                    p.title_name.as_deref(),
                ])
                .unwrap_or("")
                .to_string();
                let mut entry = CanonicalEntry::default();
                apply_played(&mut entry, p);
                index.insert(key, entry);
            }
        }
    }
}

/// Merge a trophy-title record into an entry. The trophy title name and trophy
/// data take precedence when present; identity fields only fill gaps.
fn apply_title(entry: &mut CanonicalEntry, t: &TrophyTitle) {
    entry.title_id = entry.title_id.take().or_else(|| owned(t.title_id.as_deref()));
    entry.np_communication_id = entry
        .np_communication_id
        .take()
        .or_else(|| owned(t.np_communication_id.as_deref()));
    entry.product_id = entry
        .product_id
        .take()
        .or_else(|| owned(t.product_id.as_deref()));

    let name = first_present([
        t.trophy_title_name.as_deref(),
        entry.name.as_deref(),
        t.title_name.as_deref(),
        t.name.as_deref(),
    ])
    .map(str::to_string);
    entry.name = name;

    if t.defined_trophies.is_some() {
        entry.trophies = t.defined_trophies.clone();
    }
    if t.progress.is_some() {
        entry.trophy_progress = t.progress;
    }
    if entry.images.cover.is_none() {
        entry.images.cover = owned(t.trophy_title_icon_url.as_deref());
    }
    if let Some(tp) = first_present([t.trophy_title_platform.as_deref()]) {
        entry.platform = Some(tp.to_string());
    }
    if entry.concept.is_none() {
        entry.concept = t.concept.clone();
    }

    entry.add_source(Source::Titles);
    entry.refresh_derived();
}

/// Merge a play-history record into an entry. Play fields take the incoming
/// value when present; trophy fields are preserved; the existing cover image
/// outranks the incoming one.
fn apply_played(entry: &mut CanonicalEntry, p: &PlayedGame) {
    entry.title_id = entry.title_id.take().or_else(|| owned(p.title_id.as_deref()));
    entry.np_communication_id = entry
        .np_communication_id
        .take()
        .or_else(|| owned(p.np_communication_id.as_deref()));
    entry.product_id = entry
        .product_id
        .take()
        .or_else(|| owned(p.product_id.as_deref()));

    let name = first_present([
        p.name.as_deref(),
        p.localized_name.as_deref(),
        entry.name.as_deref(),
        p.title_name.as_deref(),
    ])
    .map(str::to_string);
    entry.name = name;

    entry.play_count = p.play_count.or(entry.play_count).or(Some(0));
    entry.first_played = first_present([
        p.first_played.as_deref(),
        p.first_played_date_time.as_deref(),
    ])
    .map(str::to_string)
    .or_else(|| entry.first_played.take());
    entry.last_played = first_present([
        p.last_played.as_deref(),
        p.last_played_date_time.as_deref(),
    ])
    .map(str::to_string)
    .or_else(|| entry.last_played.take());
    entry.play_duration = owned(p.play_duration.as_deref()).or_else(|| entry.play_duration.take());

    let incoming = p.effective_images();
    if incoming.master.is_some() {
        entry.images.master = incoming.master;
    }
    if incoming.hero.is_some() {
        entry.images.hero = incoming.hero;
    }
    if entry.images.cover.is_none() {
        entry.images.cover = incoming.cover;
    }

    if let Some(pf) = first_present([p.platform.as_deref()]) {
        entry.platform = Some(pf.to_string());
    }
    if entry.concept.is_none() {
        entry.concept = p.concept.clone();
    }

    entry.add_source(Source::Played);
    entry.refresh_derived();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn purchased(v: serde_json::Value) -> PurchasedGame {
        serde_json::from_value(v).unwrap()
    }

    fn title(v: serde_json::Value) -> TrophyTitle {
        serde_json::from_value(v).unwrap()
    }

    fn played(v: serde_json::Value) -> PlayedGame {
        serde_json::from_value(v).unwrap()
    }

    fn sources(entry: &CanonicalEntry) -> Vec<Source> {
        entry.source.clone()
    }

    #[test]
    fn purchased_only_seeds_one_entry() {
        let out = merge_library(
            &[purchased(json!({ "titleId": "T1", "name": "Game A" }))],
            &[],
            &[],
        );
        assert_eq!(out.len(), 1);
        let e = &out[0];
        assert_eq!(e.title_id.as_deref(), Some("T1"));
        assert_eq!(e.name.as_deref(), Some("Game A"));
        assert_eq!(e.normalized_name, "gamea");
        assert_eq!(sources(e), vec![Source::Purchased]);
    }

    #[test]
    fn title_record_merges_via_name_and_platform_fallback() {
        let out = merge_library(
            &[purchased(json!({ "titleId": "T1", "name": "Game A", "platform": "ps5" }))],
            &[title(json!({
                "npCommunicationId": "NC1",
                "trophyTitleName": "Game A",
                "trophyTitlePlatform": "ps5",
                "progress": 50
            }))],
            &[],
        );
        assert_eq!(out.len(), 1);
        let e = &out[0];
        assert_eq!(e.title_id.as_deref(), Some("T1"));
        assert_eq!(e.np_communication_id.as_deref(), Some("NC1"));
        assert_eq!(e.trophy_progress, Some(50));
        assert_eq!(e.platform.as_deref(), Some("PS5"));
        assert_eq!(sources(e), vec![Source::Purchased, Source::Titles]);
    }

    #[test]
    fn demo_records_are_fully_excluded() {
        let out = merge_library(
            &[purchased(json!({ "name": "Great Game Demo", "productId": "X" }))],
            &[],
            &[],
        );
        assert!(out.is_empty());
    }

    #[test]
    fn platform_mismatch_blocks_the_name_fallback() {
        let out = merge_library(
            &[purchased(json!({ "titleId": "T1", "name": "Game A", "platform": "ps4" }))],
            &[],
            &[played(json!({ "titleId": "T2", "name": "Game A", "platform": "ps5" }))],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title_id.as_deref(), Some("T1"));
        assert_eq!(out[1].title_id.as_deref(), Some("T2"));
        assert_eq!(sources(&out[0]), vec![Source::Purchased]);
        assert_eq!(sources(&out[1]), vec![Source::Played]);
    }

    #[test]
    fn titles_alone_create_a_new_entry() {
        let out = merge_library(
            &[],
            &[title(json!({ "npCommunicationId": "NC1", "trophyTitleName": "Solo Title" }))],
            &[],
        );
        assert_eq!(out.len(), 1);
        let e = &out[0];
        assert_eq!(e.title_id, None);
        assert_eq!(e.np_communication_id.as_deref(), Some("NC1"));
        assert_eq!(e.name.as_deref(), Some("Solo Title"));
        assert_eq!(sources(e), vec![Source::Titles]);
    }

    #[test]
    fn trophy_title_name_overrides_purchased_name() {
        let out = merge_library(
            &[purchased(json!({ "titleId": "T1", "name": "Game A (PS4 & PS5)" }))],
            &[title(json!({ "titleId": "T1", "trophyTitleName": "Game A™" }))],
            &[],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name.as_deref(), Some("Game A™"));
        // derived fields track the updated name
        assert_eq!(out[0].display_name, "Game A");
        assert_eq!(out[0].normalized_name, "gamea");
    }

    #[test]
    fn played_record_matches_via_concept_sibling_ids() {
        let out = merge_library(
            &[purchased(json!({ "titleId": "CUSA0001", "name": "Game A" }))],
            &[],
            &[played(json!({
                "titleId": "PPSA0002",
                "name": "Game A Directors Cut",
                "playCount": 4,
                "concept": { "titleIds": ["CUSA0001", "PPSA0002"] }
            }))],
        );
        assert_eq!(out.len(), 1);
        let e = &out[0];
        // identity fills the gap, the existing id wins
        assert_eq!(e.title_id.as_deref(), Some("CUSA0001"));
        assert_eq!(e.play_count, Some(4));
        assert_eq!(sources(e), vec![Source::Purchased, Source::Played]);
    }

    #[test]
    fn existing_cover_outranks_incoming_played_cover() {
        let out = merge_library(
            &[],
            &[title(json!({
                "npCommunicationId": "NC1",
                "trophyTitleName": "Game A",
                "trophyTitleIconUrl": "https://img/trophy-icon.png"
            }))],
            &[played(json!({
                "npCommunicationId": "NC1",
                "name": "Game A",
                "images": { "cover": "https://img/played-cover.png", "hero": "https://img/hero.png" }
            }))],
        );
        assert_eq!(out.len(), 1);
        let e = &out[0];
        assert_eq!(e.images.cover.as_deref(), Some("https://img/trophy-icon.png"));
        assert_eq!(e.images.hero.as_deref(), Some("https://img/hero.png"));
    }

    #[test]
    fn played_fields_take_incoming_values_and_preserve_trophies() {
        let out = merge_library(
            &[],
            &[title(json!({
                "npCommunicationId": "NC1",
                "trophyTitleName": "Game A",
                "progress": 80,
                "definedTrophies": { "bronze": 10, "silver": 5, "gold": 2, "platinum": 1 }
            }))],
            &[played(json!({
                "npCommunicationId": "NC1",
                "name": "Game A",
                "playCount": 7,
                "firstPlayedDateTime": "2022-05-01T10:00:00Z",
                "lastPlayedDateTime": "2024-01-02T20:00:00Z",
                "playDuration": "PT45H"
            }))],
        );
        assert_eq!(out.len(), 1);
        let e = &out[0];
        assert_eq!(e.play_count, Some(7));
        assert_eq!(e.first_played.as_deref(), Some("2022-05-01T10:00:00Z"));
        assert_eq!(e.play_duration.as_deref(), Some("PT45H"));
        assert_eq!(e.trophy_progress, Some(80));
        assert_eq!(e.trophies.as_ref().map(|t| t.platinum), Some(1));
    }

    #[test]
    fn duplicate_purchased_key_is_last_write_wins() {
        let out = merge_library(
            &[
                purchased(json!({ "name": "Game A", "platform": "ps4" })),
                purchased(json!({ "name": "Game A", "platform": "ps5" })),
            ],
            &[],
            &[],
        );
        // both records derive the same name key; the later record wins
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].platform.as_deref(), Some("PS5"));
    }

    #[test]
    fn keyless_records_collide_on_the_empty_key() {
        let out = merge_library(
            &[
                purchased(json!({})),
                purchased(json!({ "platform": "ps4" })),
            ],
            &[],
            &[],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].platform.as_deref(), Some("PS4"));
        assert_eq!(out[0].normalized_name, "");
    }

    #[test]
    fn mid_batch_insertions_are_visible_to_later_lookups() {
        let out = merge_library(
            &[],
            &[
                title(json!({ "npCommunicationId": "NC1", "trophyTitleName": "Solo" })),
                title(json!({ "npCommunicationId": "NC1", "progress": 10 })),
            ],
            &[],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].trophy_progress, Some(10));
    }

    #[test]
    fn identity_match_outranks_name_fallback() {
        // the title record's id matches entry B even though entry A (inserted
        // earlier) matches by name
        let out = merge_library(
            &[
                purchased(json!({ "titleId": "T1", "name": "Game A" })),
                purchased(json!({ "titleId": "T2", "name": "Other Name" })),
            ],
            &[title(json!({ "titleId": "T2", "trophyTitleName": "Game A", "progress": 5 }))],
            &[],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].trophy_progress, None);
        assert_eq!(out[1].trophy_progress, Some(5));
    }

    #[test]
    fn merge_is_deterministic() {
        let purchased_batch = vec![
            purchased(json!({ "titleId": "T1", "name": "Game A", "platform": "ps5" })),
            purchased(json!({ "name": "Game B" })),
        ];
        let titles_batch = vec![
            title(json!({ "npCommunicationId": "NC1", "trophyTitleName": "Game A", "trophyTitlePlatform": "ps5" })),
            title(json!({ "npCommunicationId": "NC2", "trophyTitleName": "Game C" })),
        ];
        let played_batch = vec![played(json!({ "titleId": "T9", "name": "Game B", "playCount": 2 }))];

        let a = merge_library(&purchased_batch, &titles_batch, &played_batch);
        let b = merge_library(&purchased_batch, &titles_batch, &played_batch);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn source_sets_record_exactly_the_contributing_batches() {
        let out = merge_library(
            &[
                purchased(json!({ "titleId": "T1", "name": "Game A" })),
                purchased(json!({ "titleId": "T2", "name": "Game B" })),
            ],
            &[title(json!({ "titleId": "T1", "trophyTitleName": "Game A" }))],
            &[played(json!({ "titleId": "T2", "name": "Game B" }))],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(sources(&out[0]), vec![Source::Purchased, Source::Titles]);
        assert_eq!(sources(&out[1]), vec![Source::Purchased, Source::Played]);
    }

    #[test]
    fn output_preserves_first_encounter_order() {
        let out = merge_library(
            &[purchased(json!({ "titleId": "T1", "name": "Zeta" }))],
            &[title(json!({ "npCommunicationId": "NC1", "trophyTitleName": "Alpha" }))],
            &[played(json!({ "titleId": "T3", "name": "Mid" }))],
        );
        let names: Vec<_> = out.iter().map(|e| e.name.as_deref().unwrap()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
    }
}
