//! Lemma normalization and raw-term filtering.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// English stopwords; a term starting with one of these is not a domain term.
pub const STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan",
    "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't",
    "wouldn", "wouldn't",
];

const MIN_TERM_LEN: usize = 3;
const LONG_TERM_LEN: usize = 30;
const LONG_TERM_MAX_WORDS: usize = 4;

fn letter_digit_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "v" followed by digits is a version marker ("v2") and stays glued.
    RE.get_or_init(|| Regex::new(r"([a-uw-z])([0-9]+)").expect("static regex"))
}

/// Canonical merge key for a term.
///
/// camelCase boundaries and hyphens become spaces, whitespace is collapsed,
/// the result is lowercased, and a letter directly followed by a digit run
/// is split (`"utf8"` -> `"utf 8"`) unless the letter is `v`.
pub fn normalize(term: &str) -> String {
    let mut spaced = String::with_capacity(term.len() + 4);
    let mut prev_lower = false;
    for c in term.chars() {
        if c.is_uppercase() && prev_lower {
            spaced.push(' ');
        }
        prev_lower = c.is_lowercase();
        spaced.push(if c == '-' { ' ' } else { c });
    }

    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let lowered = collapsed.to_lowercase();
    letter_digit_boundary()
        .replace_all(&lowered, "$1 $2")
        .into_owned()
}

/// Whether a raw extracted string is worth turning into a term node.
pub fn valid_term(term: &str) -> bool {
    let len = term.chars().count();
    if len < MIN_TERM_LEN || term.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let words: Vec<&str> = term.split_whitespace().collect();
    if len > LONG_TERM_LEN && words.len() > LONG_TERM_MAX_WORDS {
        return false;
    }
    match words.first() {
        None => false,
        Some(first) => !STOPWORDS.contains(&first.to_lowercase().as_str()),
    }
}

/// Number of whitespace-separated words; node creation order key.
pub fn word_count(term: &str) -> usize {
    term.split_whitespace().count()
}

/// Display name for a node: the shortest alias.
///
/// Length is the only key. When `current` is among the shortest it is kept,
/// otherwise the first shortest alias in set order wins.
pub fn select_name(current: &str, aliases: &BTreeSet<String>) -> String {
    let Some(min_len) = aliases.iter().map(|a| a.chars().count()).min() else {
        return current.to_string();
    };
    if current.chars().count() <= min_len {
        return current.to_string();
    }
    aliases
        .iter()
        .find(|a| a.chars().count() == min_len)
        .cloned()
        .unwrap_or_else(|| current.to_string())
}
