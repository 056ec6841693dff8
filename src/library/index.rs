//! Insertion-ordered identity index over canonical entries.
//!
//! Keys are the derived storage keys (first-present identifier at insertion
//! time). All lookups scan entries in insertion order so merge runs stay
//! deterministic; id candidates are tried in caller-supplied priority order.

use indexmap::IndexMap;

use super::platform::{self, Platform};
use super::record::CanonicalEntry;

#[derive(Debug, Default)]
pub struct LibraryIndex {
    entries: IndexMap<String, CanonicalEntry>,
}

impl LibraryIndex {
    /// Insert or overwrite at `key`. An overwrite keeps the original slot
    /// position, so last-write-wins collisions do not reorder output.
    pub fn insert(&mut self, key: String, entry: CanonicalEntry) {
        self.entries.insert(key, entry);
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut CanonicalEntry> {
        self.entries.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key of the first entry matching any candidate id. Candidates are tried
    /// in order; within one candidate, entries in insertion order.
    pub fn find_by_any_id<S: AsRef<str>>(&self, candidates: &[S]) -> Option<String> {
        for id in candidates {
            let id = id.as_ref();
            if id.trim().is_empty() {
                continue;
            }
            for (key, entry) in &self.entries {
                if entry.has_id(id) {
                    return Some(key.clone());
                }
            }
        }
        None
    }

    /// Key of the first entry whose concept lists `title_id` as a sibling.
    pub fn find_by_concept_title_id(&self, title_id: &str) -> Option<String> {
        if title_id.trim().is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|(_, entry)| {
                entry
                    .concept
                    .as_ref()
                    .is_some_and(|c| c.title_ids.iter().any(|t| t == title_id))
            })
            .map(|(key, _)| key.clone())
    }

    /// Fallback tier: first entry with an equal non-empty normalized name and
    /// a compatible platform.
    pub fn find_by_normalized_name(
        &self,
        normalized: &str,
        hint: Option<Platform>,
    ) -> Option<String> {
        if normalized.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|(_, entry)| {
                !entry.normalized_name.is_empty()
                    && entry.normalized_name == normalized
                    && platform::compatible(entry.platform_hint(), hint)
            })
            .map(|(key, _)| key.clone())
    }

    /// Entries in insertion order.
    pub fn into_entries(self) -> Vec<CanonicalEntry> {
        self.entries.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title_id: Option<&str>, np: Option<&str>, name: &str) -> CanonicalEntry {
        let mut e = CanonicalEntry {
            title_id: title_id.map(str::to_string),
            np_communication_id: np.map(str::to_string),
            name: Some(name.to_string()),
            ..Default::default()
        };
        e.refresh_derived();
        e
    }

    #[test]
    fn candidate_order_outranks_insertion_order() {
        let mut index = LibraryIndex::default();
        index.insert("a".into(), entry(Some("T1"), None, "First"));
        index.insert("b".into(), entry(Some("T2"), Some("NC2"), "Second"));

        // NC2 is the first candidate, so entry "b" wins even though "a" was
        // inserted first.
        let found = index.find_by_any_id(&["NC2", "T1"]);
        assert_eq!(found.as_deref(), Some("b"));
    }

    #[test]
    fn empty_candidates_are_skipped() {
        let mut index = LibraryIndex::default();
        index.insert("a".into(), entry(Some("T1"), None, "First"));
        assert_eq!(index.find_by_any_id(&["", "  ", "T1"]).as_deref(), Some("a"));
        assert_eq!(index.find_by_any_id::<&str>(&[]), None);
    }

    #[test]
    fn overwrite_keeps_slot_position() {
        let mut index = LibraryIndex::default();
        index.insert("a".into(), entry(Some("T1"), None, "First"));
        index.insert("b".into(), entry(Some("T2"), None, "Second"));
        index.insert("a".into(), entry(Some("T9"), None, "Replacement"));

        let entries = index.into_entries();
        assert_eq!(entries[0].title_id.as_deref(), Some("T9"));
        assert_eq!(entries[1].title_id.as_deref(), Some("T2"));
    }

    #[test]
    fn name_lookup_respects_platform_compatibility() {
        let mut index = LibraryIndex::default();
        let mut ps4 = entry(Some("T1"), None, "Game A");
        ps4.platform = Some("PS4".into());
        index.insert("a".into(), ps4);

        use crate::library::platform::Platform;
        assert!(index.find_by_normalized_name("gamea", Some(Platform::Ps5)).is_none());
        assert_eq!(
            index.find_by_normalized_name("gamea", Some(Platform::Ps4)).as_deref(),
            Some("a")
        );
        // unknown platform on the probe side never blocks
        assert_eq!(index.find_by_normalized_name("gamea", None).as_deref(), Some("a"));
        // empty normalized names never match
        assert!(index.find_by_normalized_name("", None).is_none());
    }

    #[test]
    fn concept_title_id_lookup() {
        let mut index = LibraryIndex::default();
        let mut e = entry(Some("T1"), None, "Game A");
        e.concept = Some(crate::library::record::Concept {
            title_ids: vec!["T1".into(), "T1-PS5".into()],
            ..Default::default()
        });
        index.insert("a".into(), e);

        assert_eq!(index.find_by_concept_title_id("T1-PS5").as_deref(), Some("a"));
        assert!(index.find_by_concept_title_id("T2").is_none());
        assert!(index.find_by_concept_title_id("").is_none());
    }
}
