//! Platform extraction and compatibility.
//!
//! Records carry platform information in different fields per source; this
//! module folds them into one coarse tag used only for merge compatibility
//! checks. Persisted platform strings keep their source text, upper-cased.

/// Coarse platform tag recognized by the comparison logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ps4,
    Ps5,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ps4 => "ps4",
            Platform::Ps5 => "ps5",
        }
    }
}

/// Extract a tag from one raw value. "ps5" wins over "ps4" when both appear.
pub fn detect(raw: &str) -> Option<Platform> {
    let lc = raw.to_lowercase();
    if lc.contains("ps5") {
        Some(Platform::Ps5)
    } else if lc.contains("ps4") {
        Some(Platform::Ps4)
    } else {
        None
    }
}

/// Resolve across the per-source fields, in precedence order: `platform`,
/// then `trophyTitlePlatform`, then `category`. The first non-empty field
/// decides, even when it yields no recognizable tag.
pub fn resolve(
    platform: Option<&str>,
    trophy_platform: Option<&str>,
    category: Option<&str>,
) -> Option<Platform> {
    for field in [platform, trophy_platform, category].into_iter().flatten() {
        if !field.trim().is_empty() {
            return detect(field);
        }
    }
    None
}

/// Unknown platform never blocks a merge; two known platforms must agree.
pub fn compatible(a: Option<Platform>, b: Option<Platform>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

/// Presentation casing for persisted platform values ("ps5" -> "PS5",
/// "ps4, ps5" -> "PS4, PS5").
pub fn display_casing(raw: &str) -> String {
    raw.to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_tags_inside_larger_values() {
        assert_eq!(detect("ps5_native_game"), Some(Platform::Ps5));
        assert_eq!(detect("PS4"), Some(Platform::Ps4));
        assert_eq!(detect("unknown"), None);
        // "ps5" wins when a value names both generations
        assert_eq!(detect("ps4,ps5"), Some(Platform::Ps5));
    }

    #[test]
    fn first_non_empty_field_decides() {
        assert_eq!(
            resolve(Some("PS4"), Some("PS5"), None),
            Some(Platform::Ps4)
        );
        assert_eq!(resolve(None, Some("PS5"), Some("ps4_game")), Some(Platform::Ps5));
        assert_eq!(resolve(None, None, Some("ps4_game")), Some(Platform::Ps4));
        // a non-empty but unrecognized first field still decides
        assert_eq!(resolve(Some("vita"), Some("PS5"), None), None);
        assert_eq!(resolve(Some(""), Some("PS5"), None), Some(Platform::Ps5));
        assert_eq!(resolve(None, None, None), None);
    }

    #[test]
    fn unknown_platform_is_always_compatible() {
        for p in [None, Some(Platform::Ps4), Some(Platform::Ps5)] {
            assert!(compatible(None, p));
            assert!(compatible(p, None));
        }
    }

    #[test]
    fn known_platforms_must_agree() {
        assert!(compatible(Some(Platform::Ps5), Some(Platform::Ps5)));
        assert!(!compatible(Some(Platform::Ps4), Some(Platform::Ps5)));
    }

    #[test]
    fn display_casing_uppercases() {
        assert_eq!(display_casing("ps5"), "PS5");
        assert_eq!(display_casing("ps4, ps5"), "PS4, PS5");
    }
}
