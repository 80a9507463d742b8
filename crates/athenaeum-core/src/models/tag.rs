use serde::{Deserialize, Serialize};

/// A book tag: short free-text label, unique by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// Maximum tag name length (spec §3).
pub const TAG_NAME_MAX_LEN: usize = 16;

impl Tag {
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty() && name.chars().count() <= TAG_NAME_MAX_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_name_length() {
        assert!(Tag::is_valid_name("rust"));
        assert!(!Tag::is_valid_name(""));
        assert!(!Tag::is_valid_name(&"x".repeat(17)));
        assert!(Tag::is_valid_name(&"x".repeat(16)));
    }
}
