//! Tokenizing helpers shared by the scoring dimensions.

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as",
    "at", "be", "because", "been", "before", "being", "below", "between", "both", "but", "by",
    "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "him", "his", "how",
    "i", "if", "in", "into", "is", "it", "its", "itself", "just", "may", "me", "might", "more",
    "most", "must", "my", "no", "nor", "not", "of", "off", "on", "once", "only", "or", "other",
    "our", "ours", "out", "over", "own", "same", "shall", "she", "should", "so", "some", "such",
    "than", "that", "the", "their", "theirs", "them", "then", "there", "these", "they", "this",
    "those", "through", "to", "too", "under", "until", "up", "very", "was", "we", "were", "what",
    "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would", "you",
    "your", "yours",
];

pub(crate) fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Lower-cased alphanumeric runs. Apostrophes inside a word are dropped so
/// "cell's" and "cells" meet after stemming.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if (ch == '\'' || ch == '\u{2019}') && !current.is_empty() {
            continue;
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Light suffix stripping; enough to fold plurals and common verb forms.
pub(crate) fn stem(word: &str) -> String {
    if word.chars().any(|ch| ch.is_ascii_digit()) || word.chars().count() <= 3 {
        return word.to_string();
    }

    for (suffix, replacement, min_len) in [
        ("ational", "ate", 8),
        ("iveness", "ive", 8),
        ("fulness", "ful", 8),
        ("ization", "ize", 8),
        ("ies", "y", 5),
        ("sses", "ss", 5),
        ("ing", "", 6),
        ("edly", "", 7),
        ("ed", "", 5),
        ("ly", "", 6),
        ("s", "", 4),
    ] {
        if word.len() >= min_len && word.ends_with(suffix) {
            if suffix == "s" && (word.ends_with("ss") || word.ends_with("us") || word.ends_with("is")) {
                return word.to_string();
            }
            let base = &word[..word.len() - suffix.len()];
            return format!("{base}{replacement}");
        }
    }
    word.to_string()
}

/// Stemmed tokens with stop words removed, in text order.
pub(crate) fn content_terms(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|token| !is_stop_word(token))
        .filter(|token| token.chars().count() > 1 || token.chars().all(|ch| ch.is_ascii_digit()))
        .map(|token| stem(&token))
        .collect()
}

pub(crate) fn word_count(text: &str) -> usize {
    text.split_whitespace().filter(|word| word.chars().any(char::is_alphanumeric)).count()
}

/// Splits an answer key into its individual claims: sentences and clauses
/// separated by `.`, `;`, `!`, `?` or a line break. A `.` between digits
/// stays inside the number.
pub(crate) fn split_key_points(answer_key: &str) -> Vec<String> {
    let chars: Vec<char> = answer_key.chars().collect();
    let mut points = Vec::new();
    let mut current = String::new();

    for (index, &ch) in chars.iter().enumerate() {
        let boundary = match ch {
            ';' | '!' | '?' | '\n' => true,
            '.' => {
                let before = index.checked_sub(1).and_then(|i| chars.get(i));
                let after = chars.get(index + 1);
                !(before.is_some_and(char::is_ascii_digit) && after.is_some_and(char::is_ascii_digit))
            }
            _ => false,
        };
        if boundary {
            push_point(&mut points, &current);
            current.clear();
        } else {
            current.push(ch);
        }
    }
    push_point(&mut points, &current);
    points
}

fn push_point(points: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim().trim_start_matches(['-', '*', '•']).trim();
    if !content_terms(trimmed).is_empty() {
        points.push(trimmed.to_string());
    }
}
