//! Genre parsing and tag normalization.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;

use crate::models::RawGenres;

/// Synonym → canonical tag. Every canonical tag maps to itself.
const SYNONYMS: &[(&str, &str)] = &[
    ("sci-fi", "science fiction"),
    ("sci fi", "science fiction"),
    ("scifi", "science fiction"),
    ("sf", "science fiction"),
    ("science-fiction", "science fiction"),
    ("science fiction & fantasy", "science fiction"),
    ("ya", "young adult"),
    ("young-adult", "young adult"),
    ("young adult fiction", "young adult"),
    ("teen", "young adult"),
    ("non-fiction", "nonfiction"),
    ("non fiction", "nonfiction"),
    ("classic", "classics"),
    ("classic literature", "classics"),
    ("historical", "historical fiction"),
    ("mysteries", "mystery"),
    ("mystery fiction", "mystery"),
    ("detective and mystery stories", "mystery"),
    ("detective", "mystery"),
    ("crime fiction", "crime"),
    ("thrillers", "thriller"),
    ("suspense", "thriller"),
    ("romance novels", "romance"),
    ("love stories", "romance"),
    ("fantasy fiction", "fantasy"),
    ("fantastic fiction", "fantasy"),
    ("horror fiction", "horror"),
    ("horror tales", "horror"),
    ("children's", "childrens"),
    ("children's books", "childrens"),
    ("children's fiction", "childrens"),
    ("juvenile fiction", "childrens"),
    ("kids", "childrens"),
    ("comics", "graphic novels"),
    ("graphic novel", "graphic novels"),
    ("comics & graphic novels", "graphic novels"),
    ("biographies", "biography"),
    ("biography & autobiography", "biography"),
    ("autobiography", "biography"),
    ("literary", "literary fiction"),
    ("self-help", "self help"),
    ("dystopian", "dystopia"),
    ("plays", "drama"),
    ("poems", "poetry"),
];

/// Tags carrying no genre information.
const NOISE: &[&str] = &["general", "other", "unknown", "misc", "miscellaneous", "fiction in english"];

static SYNONYM_MAP: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| SYNONYMS.iter().copied().collect());

/// Split a genre field into raw tokens, before synonym mapping.
///
/// Free text may be delimited by `,`, `;`, `|` or `/`, or written in
/// list-like syntax such as `['Fantasy', 'Fiction']`.
pub fn parse_genre_field(raw: &RawGenres) -> Vec<String> {
    match raw {
        RawGenres::List(items) => items
            .iter()
            .flat_map(|item| split_genre_text(item))
            .collect(),
        RawGenres::Text(text) => split_genre_text(text),
    }
}

fn split_genre_text(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(trimmed);

    inner
        .split([',', ';', '|', '/'])
        .map(|token| token.trim_matches(is_wrapping).split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_wrapping(c: char) -> bool {
    c.is_whitespace() || matches!(c, '\'' | '"' | '[' | ']' | '(' | ')' | '.')
}

/// Canonical form of a single tag, or `None` for empty and noise tags.
pub fn normalize_tag(token: &str) -> Option<String> {
    let folded = token
        .trim_matches(is_wrapping)
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if !folded.chars().any(char::is_alphabetic) || NOISE.contains(&folded.as_str()) {
        return None;
    }

    Some(
        SYNONYM_MAP
            .get(folded.as_str())
            .map(|canonical| (*canonical).to_string())
            .unwrap_or(folded),
    )
}

/// Normalize a token list into a sorted, deduplicated tag set.
pub fn normalize_tags<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    tokens
        .iter()
        .filter_map(|t| normalize_tag(t.as_ref()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comma_separated() {
        let tokens = parse_genre_field(&RawGenres::from("Fantasy, Fiction"));
        assert_eq!(tokens, vec!["Fantasy", "Fiction"]);
    }

    #[test]
    fn test_parse_list_like_text() {
        let tokens = parse_genre_field(&RawGenres::from("['Fantasy', \"Young Adult\", 'Magic']"));
        assert_eq!(tokens, vec!["Fantasy", "Young Adult", "Magic"]);
    }

    #[test]
    fn test_parse_list_with_category_paths() {
        let raw = RawGenres::List(vec!["Fiction / Fantasy / Epic".into(), "Classics".into()]);
        assert_eq!(
            parse_genre_field(&raw),
            vec!["Fiction", "Fantasy", "Epic", "Classics"]
        );
    }

    #[test]
    fn test_normalize_maps_synonyms() {
        assert_eq!(normalize_tag("Sci-Fi").as_deref(), Some("science fiction"));
        assert_eq!(normalize_tag(" YA ").as_deref(), Some("young adult"));
        assert_eq!(normalize_tag("Children's").as_deref(), Some("childrens"));
        assert_eq!(normalize_tag("self_help").as_deref(), Some("self help"));
        assert_eq!(normalize_tag("General"), None);
        assert_eq!(normalize_tag("1234"), None);
    }

    #[test]
    fn test_normalize_tags_sorted_and_unique() {
        let tags = normalize_tags(&["Fiction", "fantasy", "FICTION", "Fantasy Fiction"]);
        assert_eq!(tags, vec!["fantasy", "fiction"]);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let inputs = [
            "Sci-Fi", "ya", "Classic", "Mysteries", "Comics", "Historical", "Romance",
            "Fantasy", "magic", "Self-Help", "dystopian", "Poems", "Children's Books",
        ];
        let once = normalize_tags(&inputs);
        let twice = normalize_tags(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_every_canonical_tag_is_a_fixed_point() {
        for (_, canonical) in SYNONYMS {
            assert_eq!(normalize_tag(canonical).as_deref(), Some(*canonical));
        }
    }
}
