use rand::Rng;
use std::collections::HashSet;

const TITLE_PART_LEN: usize = 15;
const SUFFIX_LEN: usize = 8;
const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Build a URL slug from an article title: up to 15 lowercased ASCII
/// alphanumeric characters of the title followed by 8 random characters.
pub fn generate_slug(title: &str) -> String {
    let title_part: String = title
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(TITLE_PART_LEN)
        .collect();

    let mut rng = rand::rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARS[rng.random_range(0..SUFFIX_CHARS.len())] as char)
        .collect();

    format!("{title_part}{suffix}")
}

/// Generate a slug not present in `existing`. The random suffix makes
/// collisions unlikely; after a bounded number of attempts fall back to
/// appending a counter.
pub fn generate_unique_slug(title: &str, existing: &HashSet<String>) -> String {
    const MAX_ATTEMPTS: usize = 10;

    for _ in 0..MAX_ATTEMPTS {
        let slug = generate_slug(title);
        if !existing.contains(&slug) {
            return slug;
        }
    }

    let base = generate_slug(title);
    let mut counter = 1u32;
    loop {
        let candidate = format!("{base}{counter}");
        if !existing.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_shape() {
        let slug = generate_slug("Breaking: New Technology Announced");
        // "breakingnewtech" (15 chars) + 8 random chars
        assert_eq!(slug.len(), TITLE_PART_LEN + SUFFIX_LEN);
        assert!(slug.starts_with("breakingnewtech"));
        assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_short_title_keeps_all_characters() {
        let slug = generate_slug("Hi!");
        assert_eq!(slug.len(), 2 + SUFFIX_LEN);
        assert!(slug.starts_with("hi"));
    }

    #[test]
    fn test_empty_title_is_suffix_only() {
        let slug = generate_slug("");
        assert_eq!(slug.len(), SUFFIX_LEN);
    }

    #[test]
    fn test_non_ascii_characters_are_dropped() {
        // Diacritics are not ASCII alphanumeric and disappear from the slug
        let slug = generate_slug("Tin tức mới nhất");
        assert!(slug.starts_with("tintcminht"));
    }

    #[test]
    fn test_two_slugs_for_same_title_differ() {
        let a = generate_slug("Identical Title");
        let b = generate_slug("Identical Title");
        // Same title part, different random suffix (8 chars of 36 symbols;
        // a collision here would be a broken RNG)
        assert_ne!(a, b);
        assert_eq!(&a[.."identicaltitle".len()], &b[.."identicaltitle".len()]);
    }

    #[test]
    fn test_unique_slug_avoids_existing() {
        let mut existing = HashSet::new();
        for _ in 0..100 {
            let slug = generate_unique_slug("Repeated headline text", &existing);
            assert!(!existing.contains(&slug));
            existing.insert(slug);
        }
        assert_eq!(existing.len(), 100);
    }
}
