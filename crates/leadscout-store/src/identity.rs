use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static PUNCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]").expect("punctuation pattern"));

/// Trailing tokens dropped from business names before comparison.
const CORPORATE_SUFFIXES: [&str; 5] = ["llc", "inc", "ltd", "co", "corp"];

fn normalize(input: &str) -> String {
    let lowered = input.to_lowercase();
    let stripped = PUNCT_RE.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_suffixes(normalized: &str) -> String {
    let mut tokens: Vec<&str> = normalized.split(' ').collect();
    while tokens.len() > 1 {
        let last = tokens[tokens.len() - 1];
        if CORPORATE_SUFFIXES.contains(&last) {
            tokens.pop();
        } else {
            break;
        }
    }
    tokens.join(" ")
}

/// Dedup key for a business at a location.
///
/// Case, punctuation, extra whitespace, and trailing corporate suffixes on
/// the name do not distinguish businesses: "Tony's Pizza LLC" in
/// "San Francisco, CA" and "tonys pizza" in "san francisco ca" collide.
pub fn identity_key(business_name: &str, location: &str) -> String {
    format!(
        "{}|{}",
        strip_suffixes(&normalize(business_name)),
        normalize(location)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_punctuation_insensitive() {
        assert_eq!(
            identity_key("Tony's Pizza", "San Francisco, CA"),
            identity_key("TONYS PIZZA", "san francisco ca"),
        );
    }

    #[test]
    fn test_corporate_suffixes_dropped() {
        assert_eq!(
            identity_key("Tony's Pizza LLC", "SF"),
            identity_key("Tonys Pizza", "SF"),
        );
        // stacked suffixes all come off
        assert_eq!(
            identity_key("Acme Co Inc", "Austin"),
            identity_key("Acme", "Austin"),
        );
    }

    #[test]
    fn test_suffix_only_name_survives() {
        assert_eq!(identity_key("Co", "Austin"), "co|austin");
    }

    #[test]
    fn test_distinct_locations_stay_distinct() {
        assert_ne!(
            identity_key("Tonys Pizza", "San Francisco, CA"),
            identity_key("Tonys Pizza", "Oakland, CA"),
        );
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(
            identity_key("Tonys   Pizza", " San  Francisco "),
            "tonys pizza|san francisco",
        );
    }

    #[test]
    fn test_unicode_names_keep_letters() {
        assert_eq!(identity_key("Café München", "Berlin"), "café münchen|berlin");
    }
}
