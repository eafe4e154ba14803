//! Code-aware tokenizer shared by the lexical index and the fuzzy matcher

// ── Word splitting ─────────────────────────────────────────────────────────

/// Split text into lowercase words at punctuation, whitespace, camelCase
/// humps and letter/digit boundaries. No filtering.
///
/// `parseHTTPResponse_v2` becomes `parse http response v 2`.
pub fn words(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for segment in text.split(|c: char| !c.is_alphanumeric()) {
        if !segment.is_empty() {
            split_humps(segment, &mut out);
        }
    }
    out
}

fn split_humps(segment: &str, out: &mut Vec<String>) {
    let chars: Vec<char> = segment.chars().collect();
    let mut start = 0;
    for i in 1..chars.len() {
        let prev = chars[i - 1];
        let curr = chars[i];
        let lower_to_upper = prev.is_lowercase() && curr.is_uppercase();
        // "HTTPResponse": split before the last capital of a run
        let acronym_end =
            i >= 2 && chars[i - 2].is_uppercase() && prev.is_uppercase() && curr.is_lowercase();
        let digit_edge = prev.is_ascii_digit() != curr.is_ascii_digit();

        let split_at = if acronym_end { i - 1 } else { i };
        if (lower_to_upper || acronym_end || digit_edge) && split_at > start {
            out.push(chars[start..split_at].iter().collect::<String>().to_lowercase());
            start = split_at;
        }
    }
    if start < chars.len() {
        out.push(chars[start..].iter().collect::<String>().to_lowercase());
    }
}

// ── Terms ──────────────────────────────────────────────────────────────────

/// Sorted for binary search.
const STOPWORDS: &[&str] = &[
    "an", "and", "are", "as", "at", "be", "but", "by", "do", "does", "for", "from", "has", "have",
    "if", "in", "into", "is", "it", "its", "no", "not", "of", "on", "or", "so", "than", "that",
    "the", "then", "there", "these", "this", "to", "was", "were", "will", "with",
];

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// Index terms: words of two or more characters, minus stopwords, stemmed.
pub fn tokenize(text: &str) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|w| w.chars().count() >= 2 && !is_stopword(w))
        .map(|w| stem(&w))
        .collect()
}

/// Light suffix stripping. Keeps at least three characters of stem so
/// short identifiers survive untouched.
pub fn stem(word: &str) -> String {
    let rules: [(&str, &str); 6] = [
        ("sses", "ss"),
        ("ies", "y"),
        ("ing", ""),
        ("ed", ""),
        ("ly", ""),
        ("s", ""),
    ];
    for (suffix, replacement) in rules {
        let Some(base) = word.strip_suffix(suffix) else {
            continue;
        };
        if base.chars().count() < 3 {
            return word.to_string();
        }
        if suffix == "s" && (base.ends_with('s') || base.ends_with('u') || base.ends_with('i')) {
            return word.to_string();
        }
        return format!("{base}{replacement}");
    }
    word.to_string()
}
