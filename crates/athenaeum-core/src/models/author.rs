use serde::{Deserialize, Serialize};

/// A book's author. Uniqueness is enforced on `full_name`; case-folded
/// mirrors back the search indexes in the catalog store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub full_name: String,
    pub full_name_lower: String,
    pub last_name_lower: String,
}

impl Author {
    /// The case-folded last whitespace-separated token of a full name, used
    /// as the sort key mirror. Empty input yields an empty string.
    pub fn last_name_lower_of(full_name: &str) -> String {
        full_name
            .split_whitespace()
            .last()
            .unwrap_or("")
            .to_lowercase()
    }
}

/// Parse a comma-separated author-name string into normalized, deduplicated
/// display names, collapsing internal whitespace. An empty or all-blank
/// input yields a single "Unknown" entry (ingest pipeline step 9).
pub fn split_author_names(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = raw
        .split(',')
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect();

    if names.is_empty() {
        return vec!["Unknown".to_string()];
    }

    let mut seen_lower = std::collections::HashSet::new();
    names.retain(|n| seen_lower.insert(n.to_lowercase()));
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_name_lower_of_takes_final_token() {
        assert_eq!(Author::last_name_lower_of("Иван Петрович Сидоров"), "сидоров");
        assert_eq!(Author::last_name_lower_of("Jane Austen"), "austen");
        assert_eq!(Author::last_name_lower_of(""), "");
    }

    #[test]
    fn split_author_names_collapses_whitespace_and_dedupes() {
        let names = split_author_names("  Jane   Austen , jane austen , Mark Twain");
        assert_eq!(names, vec!["Jane Austen".to_string(), "Mark Twain".to_string()]);
    }

    #[test]
    fn split_author_names_falls_back_to_unknown() {
        assert_eq!(split_author_names(""), vec!["Unknown".to_string()]);
        assert_eq!(split_author_names("   ,  , "), vec!["Unknown".to_string()]);
    }
}
