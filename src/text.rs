// Text cleaning shared by the ingestion and scoring cycles.
//
// `normalize` produces the cleaned text stored beside every post's original
// text. The scoring cycle runs it a second time before classification, so it
// has to be idempotent: normalize(normalize(t)) == normalize(t).
//
// `classifier_clean` is the stricter pass the relevance model was trained on
// (URLs removed, ASCII only). It runs inside the classifier, never on stored text.

use std::sync::LazyLock;

use regex_lite::Regex;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"http\S+|www\S+|https\S+").expect("valid URL regex"));

static NON_MODEL_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\s']").expect("valid character-class regex"));

/// Lowercase the text and strip every character that is neither a word
/// character (letter, digit, underscore) nor whitespace.
///
/// Whitespace is kept exactly as it appears: "Flood hits Austin today!"
/// becomes "flood hits austin today".
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect()
}

/// Prepare text for the relevance model: drop URLs, keep ASCII alphanumerics,
/// whitespace and apostrophes, and collapse runs of whitespace to one space.
pub fn classifier_clean(text: &str) -> String {
    let without_urls = URL_RE.replace_all(text, "");
    let kept = NON_MODEL_CHARS_RE.replace_all(&without_urls, "");
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Respects UTF-8 character boundaries, so it never panics on emoji.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation_and_lowercases() {
        assert_eq!(normalize("Flood hits Austin today!"), "flood hits austin today");
    }

    #[test]
    fn test_normalize_keeps_underscores_digits_and_whitespace() {
        assert_eq!(normalize("M6.2 quake_alert\tNOW"), "m62 quake_alert\tnow");
    }

    #[test]
    fn test_normalize_keeps_non_ascii_letters() {
        assert_eq!(normalize("Évacuation à Montréal!!"), "évacuation à montréal");
    }

    #[test]
    fn test_normalize_drops_emoji_and_symbols() {
        assert_eq!(normalize("🌪️ Tornado warning — stay safe ⚠️"), " tornado warning  stay safe ");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "",
            "Flood hits Austin today!",
            "#Hurricane @nhc_atlantic: CAT-4 (winds 140mph) https://t.co/xyz",
            "ΟΔΟΣ ΣΕΙΣΜΟΣ. Σ!",
            "İstanbul deprem 🙏🙏",
            "ǅemal's cafe\u{301} — wildfire smoke",
            "   \n\t  ",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_classifier_clean_removes_urls_and_collapses_whitespace() {
        let cleaned = classifier_clean("flood   in houston https://bsky.app/x  www.example.com now");
        assert_eq!(cleaned, "flood in houston now");
    }

    #[test]
    fn test_classifier_clean_keeps_apostrophes_only_ascii() {
        assert_eq!(classifier_clean("it's a café—fire!"), "it's a caffire");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("🌊🌊🌊🌊", 2), "🌊🌊...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
