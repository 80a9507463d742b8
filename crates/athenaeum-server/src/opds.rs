//! OPDS decision logic: threshold-driven navigation vs. acquisition feeds and
//! the alphabet index used to bucket large subcategories. Atom/XML
//! serialization is a rendering concern and lives outside this module.

pub const DEFAULT_PAGINATION_THRESHOLD: usize = 60;

/// Whether a subcategory with `entry_count` candidates should be shown as an
/// alphabet-index navigation feed rather than a full acquisition feed.
pub fn needs_alphabet_index(entry_count: usize, pagination_threshold: usize) -> bool {
    entry_count > pagination_threshold
}

/// The fixed bucket ordering: Cyrillic А-Я (Ё folded into Е), then ASCII A-Z,
/// then a residual "#" bucket.
pub fn alphabet_buckets() -> Vec<char> {
    let mut buckets: Vec<char> = ('А'..='Я').collect();
    buckets.extend('A'..='Z');
    buckets.push('#');
    buckets
}

/// The bucket a title belongs to: its first character, uppercased and with
/// Ё folded to Е, or '#' when it doesn't fall in either alphabet range.
pub fn bucket_for_title(title: &str) -> char {
    let Some(first) = title.chars().next() else {
        return '#';
    };
    let upper = first.to_uppercase().next().unwrap_or(first);
    let folded = if upper == 'Ё' { 'Е' } else { upper };
    if ('А'..='Я').contains(&folded) || ('A'..='Z').contains(&folded) {
        folded
    } else {
        '#'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_crossed_only_when_strictly_over() {
        assert!(!needs_alphabet_index(60, 60));
        assert!(needs_alphabet_index(61, 60));
    }

    #[test]
    fn yo_folds_into_ye() {
        assert_eq!(bucket_for_title("Ёлка"), 'Е');
    }

    #[test]
    fn non_alphabetic_titles_fall_into_residual_bucket() {
        assert_eq!(bucket_for_title("1984"), '#');
        assert_eq!(bucket_for_title(""), '#');
    }

    #[test]
    fn ascii_and_cyrillic_titles_bucket_by_first_letter() {
        assert_eq!(bucket_for_title("Dune"), 'D');
        assert_eq!(bucket_for_title("Мастер и Маргарита"), 'М');
    }
}
