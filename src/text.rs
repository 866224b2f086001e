//! Text normalization shared by the lexical matcher, safety gate and
//! embedding cache

use once_cell::sync::Lazy;
use regex::Regex;

static APOSTROPHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"['’‘`]").unwrap());
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Conversational filler that carries no matching signal
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "to", "in", "on", "at", "for", "with", "from",
    "by", "as", "is", "are", "was", "were", "be", "been", "it", "its", "this", "that", "these",
    "those", "i", "im", "ive", "me", "my", "we", "our", "us", "you", "your", "he", "she", "they",
    "them", "their", "some", "any", "just", "so", "very", "really", "please", "can", "could",
    "would", "will", "do", "does", "did", "have", "has", "had", "get", "got", "need", "needs",
    "want", "like", "there", "theres", "here", "if", "up", "out", "about", "also", "too", "bit",
    "hi", "hello", "thanks", "cheers", "someone", "somebody", "come", "round", "mate", "um",
    "uh", "er", "erm", "yeah", "ok", "okay",
];

/// Lowercase, strip apostrophes, replace punctuation with spaces and
/// collapse whitespace. Always yields the same output for the same input.
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let no_apostrophes = APOSTROPHES.replace_all(&lower, "");
    let spaced = NON_WORD.replace_all(&no_apostrophes, " ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Normalized content tokens, stopwords removed, in input order
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|t| !t.is_empty() && !is_stopword(t))
        .map(str::to_string)
        .collect()
}

/// Last `max_chars` characters of `text`, starting on a word boundary
pub fn trailing_window(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let skip = total - max_chars;
    let start = text
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let tail = &text[start..];
    // Drop a partial leading word unless we landed on a boundary
    let landed_on_boundary = tail.starts_with(char::is_whitespace)
        || text[..start]
            .chars()
            .next_back()
            .map(char::is_whitespace)
            .unwrap_or(true);
    if landed_on_boundary {
        return tail.trim_start();
    }
    match tail.find(char::is_whitespace) {
        Some(i) => tail[i..].trim_start(),
        None => tail,
    }
}
