//! Record shapes for the three library sources and the merged canonical entry.
//!
//! Each source hands back a differently-shaped record; the variants below
//! carry every field the merge engine probes, all optional, so malformed or
//! partial payloads degrade to `None` instead of failing extraction.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{demo, normalize, platform, platform::Platform};

/// Which input batch contributed to a canonical entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Purchased,
    Titles,
    Played,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Purchased => "purchased",
            Source::Titles => "titles",
            Source::Played => "played",
        }
    }
}

/// Trophy counts as reported by the trophy-title service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrophyCounts {
    pub bronze: u32,
    pub silver: u32,
    pub gold: u32,
    pub platinum: u32,
}

/// Image URLs keyed by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hero: Option<String>,
}

impl ImageSet {
    pub fn is_empty(&self) -> bool {
        self.cover.is_none() && self.master.is_none() && self.hero.is_none()
    }

    /// Fold concept media entries into the three kinds the library keeps.
    pub fn from_concept_images(images: &[ConceptImage]) -> Self {
        let mut set = ImageSet::default();
        for img in images {
            match img.kind.as_str() {
                "GAMEHUB_COVER_ART" => set.cover = Some(img.url.clone()),
                "MASTER" => set.master = Some(img.url.clone()),
                "HERO_CHARACTER" => set.hero = Some(img.url.clone()),
                _ => {}
            }
        }
        set
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptImage {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptMedia {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ConceptImage>,
}

/// Concept metadata attached to played (and occasionally other) records.
/// `title_ids` lists sibling title ids of the same game across releases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Concept {
    #[serde(deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub title_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<ConceptMedia>,
}

/// Purchase/entitlement record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurchasedGame {
    pub title_id: Option<String>,
    pub np_communication_id: Option<String>,
    pub product_id: Option<String>,
    pub entitlement_id: Option<String>,
    #[serde(deserialize_with = "de_opt_id")]
    pub concept_id: Option<String>,
    pub name: Option<String>,
    pub platform: Option<String>,
    pub category: Option<String>,
    pub concept: Option<Concept>,
}

/// Trophy-title record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrophyTitle {
    pub np_communication_id: Option<String>,
    pub title_id: Option<String>,
    pub product_id: Option<String>,
    pub trophy_title_name: Option<String>,
    pub title_name: Option<String>,
    pub name: Option<String>,
    pub trophy_title_platform: Option<String>,
    /// Completion percentage, 0–100.
    pub progress: Option<i64>,
    pub defined_trophies: Option<TrophyCounts>,
    pub trophy_title_icon_url: Option<String>,
    pub concept: Option<Concept>,
}

/// Play-history record. Accepts both the raw game-list shape
/// (`firstPlayedDateTime`, concept media) and the distilled artifact shape
/// (`firstPlayed`, flat `images`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayedGame {
    pub title_id: Option<String>,
    pub np_communication_id: Option<String>,
    pub product_id: Option<String>,
    pub name: Option<String>,
    pub localized_name: Option<String>,
    pub title_name: Option<String>,
    pub platform: Option<String>,
    pub category: Option<String>,
    pub play_count: Option<i64>,
    pub first_played: Option<String>,
    pub first_played_date_time: Option<String>,
    pub last_played: Option<String>,
    pub last_played_date_time: Option<String>,
    pub play_duration: Option<String>,
    pub images: Option<ImageSet>,
    pub concept: Option<Concept>,
}

impl PurchasedGame {
    pub fn is_demo(&self) -> bool {
        demo::is_demo(
            self.name.as_deref(),
            self.product_id.as_deref(),
            self.entitlement_id.as_deref(),
        )
    }

    pub fn platform_hint(&self) -> Option<Platform> {
        platform::resolve(self.platform.as_deref(), None, self.category.as_deref())
    }
}

impl TrophyTitle {
    pub fn is_demo(&self) -> bool {
        let name = first_present([
            self.name.as_deref(),
            self.trophy_title_name.as_deref(),
            self.title_name.as_deref(),
        ]);
        demo::is_demo(name, self.product_id.as_deref(), None)
    }

    pub fn platform_hint(&self) -> Option<Platform> {
        platform::resolve(None, self.trophy_title_platform.as_deref(), None)
    }
}

impl PlayedGame {
    pub fn is_demo(&self) -> bool {
        let name = first_present([self.name.as_deref(), self.title_name.as_deref()]);
        demo::is_demo(name, self.product_id.as_deref(), None)
    }

    pub fn platform_hint(&self) -> Option<Platform> {
        platform::resolve(self.platform.as_deref(), None, self.category.as_deref())
    }

    /// Images carried directly on the record, else folded from concept media.
    pub fn effective_images(&self) -> ImageSet {
        if let Some(images) = &self.images {
            if !images.is_empty() {
                return images.clone();
            }
        }
        self.concept
            .as_ref()
            .and_then(|c| c.media.as_ref())
            .map(|m| ImageSet::from_concept_images(&m.images))
            .unwrap_or_default()
    }
}

/// One merged game in the canonical library.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanonicalEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub np_communication_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub normalized_name: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trophies: Option<TrophyCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trophy_progress: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_played: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_played: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_duration: Option<String>,
    #[serde(skip_serializing_if = "ImageSet::is_empty")]
    pub images: ImageSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<Concept>,
    pub source: Vec<Source>,
}

impl CanonicalEntry {
    /// Exact identity comparison against any of the three id fields.
    pub fn has_id(&self, id: &str) -> bool {
        [&self.title_id, &self.np_communication_id, &self.product_id]
            .into_iter()
            .flatten()
            .any(|own| own == id)
    }

    pub fn platform_hint(&self) -> Option<Platform> {
        platform::resolve(self.platform.as_deref(), None, None)
    }

    /// Append a provenance tag; the set only grows and keeps first-seen order.
    pub fn add_source(&mut self, source: Source) {
        if !self.source.contains(&source) {
            self.source.push(source);
        }
    }

    /// Re-derive the comparison key, display string, and platform casing from
    /// the current `name`/`platform`. Must run after every field update so the
    /// derived fields never go stale.
    pub fn refresh_derived(&mut self) {
        let name = self.name.as_deref().unwrap_or("");
        self.normalized_name = normalize::normalized_name(name);
        self.display_name = normalize::display_name(name);
        if let Some(p) = self.platform.take() {
            if !p.trim().is_empty() {
                self.platform = Some(platform::display_casing(&p));
            }
        }
    }
}

/// First non-empty value among the candidates, in order. Empty and
/// whitespace-only strings count as absent, matching how every source pads
/// missing fields.
pub(crate) fn first_present<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .find(|s| !s.trim().is_empty())
}

fn de_opt_id<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    // Ids arrive as strings in some payloads and bare numbers in others.
    let v = Option::<Value>::deserialize(de)?;
    Ok(v.and_then(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

fn records_from<T: serde::de::DeserializeOwned>(items: &[Value]) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

/// Unwrap a purchased-games GraphQL response (or a bare array) into records.
pub fn purchased_from_response(v: &Value) -> Vec<PurchasedGame> {
    let items = v
        .as_array()
        .or_else(|| {
            v.pointer("/data/purchasedTitlesRetrieve/games")
                .and_then(Value::as_array)
        })
        .map(Vec::as_slice)
        .unwrap_or_default();
    records_from(items)
}

/// Unwrap a trophy-title response (or a bare array) into records.
pub fn titles_from_response(v: &Value) -> Vec<TrophyTitle> {
    let items = v
        .as_array()
        .or_else(|| v.get("trophyTitles").and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default();
    records_from(items)
}

/// Normalize the play-history response to a sequence: the service returns
/// either a bare array or an object exposing `titles`/`items`.
pub fn played_from_response(v: &Value) -> Vec<PlayedGame> {
    let items = v
        .as_array()
        .or_else(|| v.get("titles").and_then(Value::as_array))
        .or_else(|| v.get("items").and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default();
    records_from(items)
}

/// Slimmed play-history artifact persisted alongside the raw snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistilledPlayed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(skip_serializing_if = "ImageSet::is_empty")]
    pub images: ImageSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_played: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_played: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_duration: Option<String>,
}

/// Distill raw play-history records for the preview artifact: concept media
/// folded to cover/master/hero, raw timestamp fields flattened.
pub fn distill_played(raw: &[PlayedGame]) -> Vec<DistilledPlayed> {
    raw.iter()
        .map(|g| DistilledPlayed {
            title_id: g.title_id.clone(),
            concept_id: g.concept.as_ref().and_then(|c| c.id.clone()),
            name: g.name.clone(),
            category: g.category.clone(),
            genres: g.concept.as_ref().map(|c| c.genres.clone()).unwrap_or_default(),
            images: g.effective_images(),
            play_count: g.play_count,
            first_played: first_present([
                g.first_played.as_deref(),
                g.first_played_date_time.as_deref(),
            ])
            .map(str::to_string),
            last_played: first_present([
                g.last_played.as_deref(),
                g.last_played_date_time.as_deref(),
            ])
            .map(str::to_string),
            play_duration: g.play_duration.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn played_response_accepts_all_three_shapes() {
        let bare = json!([{ "titleId": "T1", "name": "Game A" }]);
        let titles = json!({ "titles": [{ "titleId": "T1" }] });
        let items = json!({ "items": [{ "titleId": "T1" }] });
        let junk = json!({ "unexpected": true });

        assert_eq!(played_from_response(&bare).len(), 1);
        assert_eq!(played_from_response(&titles).len(), 1);
        assert_eq!(played_from_response(&items).len(), 1);
        assert!(played_from_response(&junk).is_empty());
    }

    #[test]
    fn purchased_response_unwraps_graphql_envelope() {
        let v = json!({
            "data": { "purchasedTitlesRetrieve": { "games": [
                { "titleId": "CUSA00001", "name": "Game A", "platform": "PS4" }
            ]}}
        });
        let games = purchased_from_response(&v);
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].title_id.as_deref(), Some("CUSA00001"));
    }

    #[test]
    fn concept_id_tolerates_numbers_and_strings() {
        let a: Concept = serde_json::from_value(json!({ "id": 10002237 })).unwrap();
        let b: Concept = serde_json::from_value(json!({ "id": "10002237" })).unwrap();
        assert_eq!(a.id.as_deref(), Some("10002237"));
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn distillation_folds_concept_media_by_kind() {
        let raw: PlayedGame = serde_json::from_value(json!({
            "titleId": "PPSA00001",
            "name": "Game A",
            "category": "ps5_native_game",
            "playCount": 12,
            "firstPlayedDateTime": "2023-01-01T00:00:00Z",
            "lastPlayedDateTime": "2024-06-30T12:00:00Z",
            "playDuration": "PT20H3M",
            "concept": {
                "id": 1,
                "genres": ["ACTION"],
                "media": { "images": [
                    { "type": "MASTER", "url": "https://img/master.png" },
                    { "type": "GAMEHUB_COVER_ART", "url": "https://img/cover.png" },
                    { "type": "HERO_CHARACTER", "url": "https://img/hero.png" },
                    { "type": "SCREENSHOT", "url": "https://img/shot.png" }
                ]}
            }
        }))
        .unwrap();

        let distilled = distill_played(std::slice::from_ref(&raw));
        assert_eq!(distilled.len(), 1);
        let d = &distilled[0];
        assert_eq!(d.images.cover.as_deref(), Some("https://img/cover.png"));
        assert_eq!(d.images.master.as_deref(), Some("https://img/master.png"));
        assert_eq!(d.images.hero.as_deref(), Some("https://img/hero.png"));
        assert_eq!(d.first_played.as_deref(), Some("2023-01-01T00:00:00Z"));
        assert_eq!(d.genres, vec!["ACTION"]);
    }

    #[test]
    fn effective_images_prefers_flat_images_when_present() {
        let g: PlayedGame = serde_json::from_value(json!({
            "images": { "cover": "https://img/flat.png" },
            "concept": { "media": { "images": [
                { "type": "GAMEHUB_COVER_ART", "url": "https://img/concept.png" }
            ]}}
        }))
        .unwrap();
        assert_eq!(g.effective_images().cover.as_deref(), Some("https://img/flat.png"));
    }

    #[test]
    fn first_present_skips_empty_and_whitespace() {
        assert_eq!(first_present([None, Some(""), Some("  "), Some("x")]), Some("x"));
        assert_eq!(first_present([None, Some("")]), None);
    }

    #[test]
    fn refresh_derived_tracks_current_name() {
        let mut entry = CanonicalEntry {
            name: Some("Game A™".into()),
            platform: Some("ps5".into()),
            ..Default::default()
        };
        entry.refresh_derived();
        assert_eq!(entry.normalized_name, "gamea");
        assert_eq!(entry.display_name, "Game A");
        assert_eq!(entry.platform.as_deref(), Some("PS5"));

        entry.name = Some("Game B".into());
        entry.refresh_derived();
        assert_eq!(entry.normalized_name, "gameb");
    }
}
