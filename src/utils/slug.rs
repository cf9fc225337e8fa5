/// Derives the URL-safe slug for a category name.
///
/// Non-ASCII text is transliterated first, so the slug only ever holds
/// lowercase ASCII letters, digits and single `-` separators. The result
/// depends only on `name`; collisions with other categories are checked by
/// the caller.
pub fn slugify(name: &str) -> String {
    ::slug::slugify(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Electronics"), "electronics");
        assert_eq!(slugify("Home & Garden"), "home-garden");
        assert_eq!(slugify("  Men's   Shoes "), "men-s-shoes");
        assert_eq!(slugify("TV/Video--Audio"), "tv-video-audio");
    }

    #[test]
    fn test_slugify_transliterates_to_ascii() {
        assert_eq!(slugify("4K Monitors"), "4k-monitors");
        assert_eq!(slugify("Café Crème"), "cafe-creme");
        let slug = slugify("日本");
        assert!(!slug.is_empty());
        assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }

    #[test]
    fn test_slugify_punctuation_only_is_empty() {
        assert_eq!(slugify("!!! ---"), "");
    }
}
