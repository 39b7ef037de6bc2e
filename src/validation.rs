use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

pub fn is_ascii_no_spaces(username: &str) -> Result<(), String> {
    match username.chars().all(|c| c.is_ascii() && !c.is_whitespace()) {
        true => Ok(()),
        false => Err("should be an ascii string without spaces".to_string()),
    }
}

pub fn is_valid_email(string: &str) -> Result<(), String> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
        r#"(?:[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*|"(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21\x23-\x5b\x5d-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])*")@(?:(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?|\[(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?|[a-z0-9-]*[a-z0-9]:(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21-\x5a\x53-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])+)\])"#
    ).expect("email pattern is valid")
    });
    match RE.is_match(string) {
        true => Ok(()),
        false => Err("Enter a valid email address.".to_string()),
    }
}

/// Slugs are ascii letters, digits, hyphens and underscores.
pub fn is_valid_slug(string: &str) -> Result<(), String> {
    let cmp = !string.is_empty()
        && string
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    match cmp {
        true => Ok(()),
        false => Err("Enter a valid slug consisting of letters, numbers, \
                      underscores or hyphens."
            .to_string()),
    }
}

/// Blank is allowed; anything else has to be an absolute http(s) url.
pub fn is_valid_url(string: &str) -> Result<(), String> {
    if string.is_empty() {
        return Ok(());
    }
    match Url::parse(string) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err("Enter a valid URL.".to_string()),
    }
}

pub fn max_length(string: &str, max: usize) -> Result<(), String> {
    match string.chars().count() <= max {
        true => Ok(()),
        false => Err(format!(
            "Ensure this value has at most {max} characters (it has {}).",
            string.chars().count()
        )),
    }
}

pub fn required(string: &str) -> Result<(), String> {
    match string.trim().is_empty() {
        true => Err("This field is required.".to_string()),
        false => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        assert!(is_valid_email("hello@example.com").is_ok());
        assert!(is_valid_email("hello").is_err());
    }

    #[test]
    fn test_slug() {
        assert!(is_valid_slug("friday-game_2").is_ok());
        assert!(is_valid_slug("friday game").is_err());
        assert!(is_valid_slug("").is_err());
    }

    #[test]
    fn test_url() {
        assert!(is_valid_url("").is_ok());
        assert!(is_valid_url("https://maps.example.com/?q=1").is_ok());
        assert!(is_valid_url("ftp://example.com").is_err());
        assert!(is_valid_url("example.com").is_err());
    }

    #[test]
    fn test_lengths() {
        assert!(max_length("abc", 3).is_ok());
        assert!(max_length("abcd", 3).is_err());
        assert!(required("  ").is_err());
    }
}
