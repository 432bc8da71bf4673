//! Keyword (de)serialisation helpers.
//!
//! Keywords are exposed as an ordered list but persisted as a single
//! comma-joined column so the fulltext index can cover them.

/// Join keywords into the stored form. Empty input maps to `None` so the
/// column can be left NULL on update.
pub fn join(keywords: &[String]) -> Option<String> {
    if keywords.is_empty() {
        return None;
    }
    Some(keywords.join(","))
}

/// Split a stored keywords column back into a list.
pub fn split(stored: &str) -> Vec<String> {
    stored
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_preserves_order() {
        let kw = vec!["timed".to_string(), "meeting".to_string()];
        assert_eq!(join(&kw).as_deref(), Some("timed,meeting"));
    }

    #[test]
    fn empty_list_joins_to_none() {
        assert_eq!(join(&[]), None);
    }

    #[test]
    fn split_roundtrip() {
        let stored = "timed,feature,meeting";
        assert_eq!(split(stored), vec!["timed", "feature", "meeting"]);
    }

    #[test]
    fn split_skips_blank_segments() {
        assert_eq!(split("a,,b, ,c"), vec!["a", "b", "c"]);
        assert!(split("").is_empty());
    }
}
