//! Demo/beta/trial exclusion.
//!
//! Demo variants must never anchor or join a canonical entry, so every batch
//! is filtered through this predicate before any identity or name matching.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(demo|beta|trial version)\b").expect("demo name pattern"))
}

fn id_re() -> &'static Regex {
    // Trailing DEMO, optionally followed by digits: "...RETAILDEMO",
    // "...DEMO00000".
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)demo\d*$").expect("demo id pattern"))
}

/// Whole-word demo/beta/trial match against a display name.
pub fn is_demo_name(name: &str) -> bool {
    name_re().is_match(name)
}

/// Trailing-DEMO match against a product or entitlement id.
pub fn is_demo_id(id: &str) -> bool {
    !id.is_empty() && id_re().is_match(id)
}

/// The classifier proper: best-available name plus the two id fields.
/// All-absent input is not a demo.
pub fn is_demo(name: Option<&str>, product_id: Option<&str>, entitlement_id: Option<&str>) -> bool {
    if let Some(n) = name {
        if is_demo_name(n) {
            debug!(name = %n, "demo filter: name match");
            return true;
        }
    }
    for id in [product_id, entitlement_id].into_iter().flatten() {
        if is_demo_id(id) {
            debug!(id = %id, "demo filter: id suffix match");
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_word_name_matches() {
        assert!(is_demo_name("Great Game Demo"));
        assert!(is_demo_name("DEMO of Greatness"));
        assert!(is_demo_name("Closed Beta"));
        assert!(is_demo_name("Trial Version"));
        assert!(is_demo_name("Shooter 5 trial version (weekend)"));
    }

    #[test]
    fn substrings_inside_words_do_not_match() {
        assert!(!is_demo_name("Demolition Derby"));
        assert!(!is_demo_name("Betamax Chronicles"));
        assert!(!is_demo_name("Trial of the Gods"));
    }

    #[test]
    fn id_suffix_matches() {
        assert!(is_demo_id("UP1234-CUSA00001_00-MEMORYRETAILDEMO"));
        assert!(is_demo_id("EP9000-PPSA00002_00-GAMEDEMO00000"));
        assert!(is_demo_id("SOMETHINGdemo123"));
        assert!(!is_demo_id("UP1234-CUSA00001_00-DEMOLITION"));
        assert!(!is_demo_id("UP1234-CUSA00001_00-FULLGAME"));
        assert!(!is_demo_id(""));
    }

    #[test]
    fn absent_record_is_not_a_demo() {
        assert!(!is_demo(None, None, None));
        assert!(!is_demo(Some(""), Some(""), Some("")));
    }

    #[test]
    fn entitlement_id_is_checked_too() {
        assert!(is_demo(Some("Full Game"), None, Some("XX-RETAILDEMO")));
    }
}
