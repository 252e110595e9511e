use itertools::Itertools;
use url::Url;

/// Converts a camelCase key to snake_case. Digits stick to the preceding
/// word, so `clanWarTrophies` becomes `clan_war_trophies`.
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let boundary = match i.checked_sub(1).map(|j| chars[j]) {
                None => false,
                Some(p) => {
                    p.is_ascii_lowercase()
                        || p.is_ascii_digit()
                        || (p.is_ascii_uppercase()
                            && chars.get(i + 1).map_or(false, |n| n.is_ascii_lowercase()))
                }
            };

            if boundary {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Converts a snake_case key to camelCase, leaving the first word untouched.
pub fn to_camel_case(snake: &str) -> String {
    let mut parts = snake.split('_');
    let mut out = String::from(parts.next().unwrap_or(""));

    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }

    out
}

/// Merges `params` into the query string of `url` and re-canonicalizes it:
/// one value per key (later values win), keys in sorted order. Requests and
/// cache buckets both go through here, so two calls with the same parameters
/// in a different order land on the same bucket.
pub fn with_query(mut url: Url, params: &[(&str, String)]) -> Url {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    for (key, value) in params {
        pairs.retain(|(k, _)| k != key);
        pairs.push((key.to_string(), value.clone()));
    }

    let query = pairs
        .into_iter()
        .sorted()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(&k), urlencoding::encode(&v)))
        .join("&");

    if query.is_empty() {
        url.set_query(None);
    } else {
        url.set_query(Some(&query));
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_conversion() {
        assert_eq!(to_snake_case("clanWarTrophies"), "clan_war_trophies");
        assert_eq!(to_snake_case("memberList"), "member_list");
        assert_eq!(to_snake_case("tag"), "tag");
        assert_eq!(to_snake_case("XP"), "xp");
    }

    #[test]
    fn camel_case_conversion() {
        assert_eq!(to_camel_case("clan_war_trophies"), "clanWarTrophies");
        assert_eq!(to_camel_case("member_list"), "memberList");
        assert_eq!(to_camel_case("tag"), "tag");
    }

    #[test]
    fn query_is_canonical() {
        let url = Url::parse("https://api.example.com/clans").unwrap();

        let a = with_query(
            url.clone(),
            &[("name", "rats".to_string()), ("limit", "5".to_string())],
        );
        let b = with_query(
            url,
            &[("limit", "5".to_string()), ("name", "rats".to_string())],
        );

        assert_eq!(a, b);
        assert_eq!(a.query(), Some("limit=5&name=rats"));
    }

    #[test]
    fn later_values_replace_earlier_ones() {
        let url = Url::parse("https://api.example.com/clans?after=aaa").unwrap();
        let url = with_query(url, &[("after", "bbb".to_string())]);

        assert_eq!(url.query(), Some("after=bbb"));
    }

    #[test]
    fn query_values_are_encoded() {
        let url = Url::parse("https://api.example.com/clans").unwrap();
        let url = with_query(url, &[("name", "rat pack".to_string())]);

        assert_eq!(url.query(), Some("name=rat%20pack"));
    }
}
