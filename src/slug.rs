//! Slug generation for rows which are addressed by slug in urls.

use once_cell::sync::Lazy;
use regex::Regex;

/// Words which would shadow one of the module views if used as a slug.
pub const REST_KEYWORDS: &[&str] =
    &["create", "update", "delete", "list", "detail", "join", "api"];

const MAX_ATTEMPTS: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SlugError {
    #[error(transparent)]
    Query(#[from] diesel::result::Error),
    #[error("no free slug derived from '{0}'")]
    Exhausted(String),
}

/// Lowercases, drops anything which is not a word character, space or
/// hyphen and collapses runs of whitespace and hyphens into one hyphen.
pub fn slugify(value: &str) -> String {
    static STRIP: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid pattern"));
    static DASHES: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[-\s]+").expect("valid pattern"));

    let ascii = value
        .chars()
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .to_lowercase();
    let stripped = STRIP.replace_all(&ascii, "");
    DASHES
        .replace_all(stripped.trim(), "-")
        .trim_matches('-')
        .to_string()
}

pub fn is_reserved(slug: &str, model_words: &[&str]) -> bool {
    REST_KEYWORDS.contains(&slug) || model_words.contains(&slug)
}

/// Finds a free slug starting from `candidate`.
///
/// `newest_with` returns the id of the most recently created row using a
/// slug (excluding the row being saved). A taken or reserved candidate gets
/// `-<that id>` appended, or `-1` when it is reserved but unused, until a
/// free one is found.
pub fn allocate<F>(
    candidate: &str,
    fallback: &str,
    model_words: &[&str],
    mut newest_with: F,
) -> Result<String, SlugError>
where
    F: FnMut(&str) -> Result<Option<i32>, diesel::result::Error>,
{
    let mut slug = if candidate.is_empty() {
        fallback.to_string()
    } else {
        candidate.to_string()
    };

    for _ in 0..MAX_ATTEMPTS {
        match newest_with(&slug)? {
            Some(id) => slug = format!("{slug}-{id}"),
            None if is_reserved(&slug, model_words) => {
                slug = format!("{slug}-1")
            }
            None => return Ok(slug),
        }
    }

    Err(SlugError::Exhausted(candidate.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn slugify_like_a_url() {
        assert_eq!(slugify("Friday Night  Game!"), "friday-night-game");
        assert_eq!(slugify("  -- A_b --  "), "a_b");
        assert_eq!(
            slugify("Friday 2024-05-03 19:00:00"),
            "friday-2024-05-03-190000"
        );
        assert_eq!(slugify("Crème brûlée"), "crme-brle");
    }

    fn taken<'a>(
        rows: &'a [(&'a str, i32)],
    ) -> impl FnMut(&str) -> Result<Option<i32>, diesel::result::Error> + 'a {
        let rows = rows.iter().copied().collect::<HashMap<_, _>>();
        move |slug| Ok(rows.get(slug).copied())
    }

    #[test]
    fn free_slug_is_kept() {
        assert_eq!(allocate("friday", "meet", &[], taken(&[])).unwrap(), "friday");
    }

    #[test]
    fn taken_slug_gets_the_newest_id() {
        let rows = [("friday", 3), ("friday-3", 7)];
        assert_eq!(
            allocate("friday", "meet", &[], taken(&rows)).unwrap(),
            "friday-3-7"
        );
    }

    #[test]
    fn reserved_words_are_suffixed() {
        assert_eq!(allocate("create", "meet", &[], taken(&[])).unwrap(), "create-1");
        assert_eq!(
            allocate("attendees", "meet", &["attendees"], taken(&[("attendees", 4)]))
                .unwrap(),
            "attendees-4"
        );
    }

    #[test]
    fn empty_candidate_uses_fallback() {
        assert_eq!(allocate("", "location", &[], taken(&[])).unwrap(), "location");
    }

    #[test]
    fn gives_up_eventually() {
        let always = |_: &str| Ok(Some(1));
        assert!(matches!(
            allocate("x", "x", &[], always),
            Err(SlugError::Exhausted(_))
        ));
    }
}
