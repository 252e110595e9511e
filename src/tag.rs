use crate::error::{Error, Result};

/// Characters allowed in a player/clan/tournament tag.
const ALLOWED: &str = "0289PYLQGRJCUV";

/// Minimum tag length, not counting the leading `#`.
const MIN_LEN: usize = 3;

/// Normalizes and validates a resource tag, returning it percent-encoded for
/// use in a URL path (`#2P0LYQ` becomes `%232P0LYQ`).
///
/// Normalization uppercases the tag, strips a leading `#` and maps the letter
/// `O` to the digit `0`, matching what the game client does. Validation then
/// checks the character set and minimum length and fails with
/// [`Error::Validation`] before any network call is made.
///
/// ```
/// # use rsroyale::tag::normalize;
/// assert_eq!(normalize("#2p0lyq").unwrap(), "%232P0LYQ");
/// assert_eq!(normalize("2POLYQ").unwrap(), "%232P0LYQ");
/// assert!(normalize("AB").is_err());
/// ```
pub fn normalize(tag: &str) -> Result<String> {
    let cleaned: String = tag
        .trim()
        .trim_start_matches('#')
        .chars()
        .map(|c| match c.to_ascii_uppercase() {
            'O' => '0',
            c => c,
        })
        .collect();

    let bad: Vec<char> = cleaned.chars().filter(|c| !ALLOWED.contains(*c)).collect();
    if !bad.is_empty() {
        return Err(Error::Validation(format!(
            "invalid tag characters: {}",
            bad.iter()
                .map(char::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    if cleaned.len() < MIN_LEN {
        return Err(Error::Validation(format!(
            "tag ({}) too short, length {}, expected at least {}",
            cleaned,
            cleaned.len(),
            MIN_LEN
        )));
    }

    Ok(format!("%23{}", cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_hash_and_letter_o() {
        assert_eq!(normalize("#2p0lyq").unwrap(), "%232P0LYQ");
        assert_eq!(normalize("2POLYQ").unwrap(), "%232P0LYQ");
        assert_eq!(normalize("  #8QU8J9LP ").unwrap(), "%238QU8J9LP");
    }

    #[test]
    fn rejects_invalid_characters() {
        match normalize("#2P0LYX") {
            Err(Error::Validation(msg)) => assert!(msg.contains('X')),
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rejects_short_tags() {
        assert!(matches!(normalize("#2P"), Err(Error::Validation(_))));
    }
}
