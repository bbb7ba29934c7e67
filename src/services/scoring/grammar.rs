use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammarIssueKind {
    LowercaseSentenceStart,
    MissingFinalPunctuation,
    RepeatedWord,
    LowercasePronounI,
    MissingSpaceAfterPunctuation,
    RunOnSentence,
    SpaceBeforePunctuation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarIssue {
    pub kind: GrammarIssueKind,
    /// Byte offset into the checked text.
    pub offset: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GrammarReport {
    pub(crate) score: f64,
    pub(crate) sentences: usize,
    pub(crate) issues: Vec<GrammarIssue>,
}

struct Sentence<'a> {
    start: usize,
    text: &'a str,
}

/// Surface checks only; the content of the answer is never considered.
///
/// Score is `1 - issues / (2 * sentences)` floored at zero. Issues are ordered
/// by position.
pub(crate) fn check(text: &str, max_sentence_words: usize) -> GrammarReport {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return GrammarReport { score: 0.0, sentences: 0, issues: Vec::new() };
    }

    let mut issues = Vec::new();
    for sentence in &sentences {
        check_sentence(sentence, max_sentence_words, &mut issues);
    }
    check_final_punctuation(text, &mut issues);
    check_spacing(text, &mut issues);
    check_words(text, &mut issues);
    issues.sort_by_key(|issue| issue.offset);

    let score = (1.0 - issues.len() as f64 / (2.0 * sentences.len() as f64)).max(0.0);
    GrammarReport { score, sentences: sentences.len(), issues }
}

fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((index, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
        if at_boundary {
            let end = index + ch.len_utf8();
            push_sentence(&mut sentences, text, start, end);
            start = end;
        }
    }
    push_sentence(&mut sentences, text, start, text.len());
    sentences
}

fn push_sentence<'a>(sentences: &mut Vec<Sentence<'a>>, text: &'a str, start: usize, end: usize) {
    let raw = &text[start..end];
    let leading = raw.len() - raw.trim_start().len();
    let trimmed = raw.trim();
    if trimmed.chars().any(char::is_alphanumeric) {
        sentences.push(Sentence { start: start + leading, text: trimmed });
    }
}

fn check_sentence(sentence: &Sentence<'_>, max_sentence_words: usize, issues: &mut Vec<GrammarIssue>) {
    if let Some((offset, first)) = sentence.text.char_indices().find(|(_, ch)| ch.is_alphabetic()) {
        if first.is_lowercase() {
            issues.push(GrammarIssue {
                kind: GrammarIssueKind::LowercaseSentenceStart,
                offset: sentence.start + offset,
                message: "Sentence should start with a capital letter".to_string(),
            });
        }
    }

    let words = sentence.text.split_whitespace().count();
    if words > max_sentence_words {
        issues.push(GrammarIssue {
            kind: GrammarIssueKind::RunOnSentence,
            offset: sentence.start,
            message: format!("Sentence runs on for {words} words; consider splitting it"),
        });
    }
}

fn check_final_punctuation(text: &str, issues: &mut Vec<GrammarIssue>) {
    let trimmed = text.trim_end().trim_end_matches(['"', '\'', ')', '\u{201D}']);
    if trimmed.ends_with(['.', '!', '?']) {
        return;
    }
    issues.push(GrammarIssue {
        kind: GrammarIssueKind::MissingFinalPunctuation,
        offset: trimmed.len(),
        message: "Final sentence is missing ending punctuation".to_string(),
    });
}

fn check_spacing(text: &str, issues: &mut Vec<GrammarIssue>) {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    for (position, &(offset, ch)) in chars.iter().enumerate() {
        let next = chars.get(position + 1).map(|&(_, next)| next);
        let previous = position.checked_sub(1).and_then(|i| chars.get(i)).map(|&(_, prev)| prev);

        let missing_space = match (ch, next) {
            (',' | ';' | ':', Some(next)) => next.is_alphabetic(),
            ('.' | '!' | '?', Some(next)) => next.is_uppercase(),
            _ => false,
        };
        if missing_space {
            issues.push(GrammarIssue {
                kind: GrammarIssueKind::MissingSpaceAfterPunctuation,
                offset,
                message: format!("Missing space after '{ch}'"),
            });
        }

        let is_mark = matches!(ch, ',' | '.' | ';' | ':' | '!' | '?');
        let after_space = previous.is_some_and(|prev| prev == ' ' || prev == '\t');
        let after_word = position >= 2
            && chars.get(position - 2).is_some_and(|&(_, before)| !before.is_whitespace());
        if is_mark && after_space && after_word {
            issues.push(GrammarIssue {
                kind: GrammarIssueKind::SpaceBeforePunctuation,
                offset,
                message: format!("Unexpected space before '{ch}'"),
            });
        }
    }
}

fn check_words(text: &str, issues: &mut Vec<GrammarIssue>) {
    let mut previous: Option<String> = None;
    let mut cursor = 0;

    for raw in text.split_whitespace() {
        let offset = text[cursor..].find(raw).map_or(cursor, |found| cursor + found);
        cursor = offset + raw.len();

        let word = raw.trim_matches(|ch: char| !ch.is_alphanumeric());
        if word.is_empty() {
            previous = None;
            continue;
        }

        if word == "i" {
            issues.push(GrammarIssue {
                kind: GrammarIssueKind::LowercasePronounI,
                offset,
                message: "The pronoun 'I' should be capitalized".to_string(),
            });
        }

        let lowered = word.to_lowercase();
        if previous.as_deref() == Some(lowered.as_str()) && !lowered.chars().all(|ch| ch.is_ascii_digit()) {
            issues.push(GrammarIssue {
                kind: GrammarIssueKind::RepeatedWord,
                offset,
                message: format!("Repeated word '{word}'"),
            });
        }

        // a clause break resets repetition tracking
        previous = if raw.ends_with(|ch: char| matches!(ch, '.' | ',' | ';' | ':' | '!' | '?')) {
            None
        } else {
            Some(lowered)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(report: &GrammarReport) -> Vec<GrammarIssueKind> {
        report.issues.iter().map(|issue| issue.kind).collect()
    }

    #[test]
    fn clean_text_scores_one() {
        let report = check("Plants make food. They use sunlight, water and air.", 40);
        assert_eq!(report.sentences, 2);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.score, 1.0);
    }

    #[test]
    fn each_heuristic_fires() {
        let report = check("plants make make food.I think i know , maybe", 40);
        assert_eq!(
            kinds(&report),
            vec![
                GrammarIssueKind::LowercaseSentenceStart,
                GrammarIssueKind::RepeatedWord,
                GrammarIssueKind::MissingSpaceAfterPunctuation,
                GrammarIssueKind::LowercasePronounI,
                GrammarIssueKind::SpaceBeforePunctuation,
                GrammarIssueKind::MissingFinalPunctuation,
            ]
        );
        assert_eq!(report.score, 0.0);
    }

    #[test]
    fn run_on_sentence_is_flagged() {
        let long = format!("{}.", vec!["Word"; 45].join(" "));
        let report = check(&long, 40);
        assert!(kinds(&report).contains(&GrammarIssueKind::RunOnSentence));
    }

    #[test]
    fn score_scales_with_sentence_count() {
        let report = check("One fact here. Another fact here. A third one", 40);
        assert_eq!(report.sentences, 3);
        assert_eq!(kinds(&report), vec![GrammarIssueKind::MissingFinalPunctuation]);
        assert!((report.score - (1.0 - 1.0 / 6.0)).abs() < 1e-12);
    }

    #[test]
    fn decimals_do_not_split_sentences() {
        let report = check("Water boils at 100.0 degrees.", 40);
        assert_eq!(report.sentences, 1);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
    }

    #[test]
    fn empty_text_has_no_sentences() {
        let report = check("   ", 40);
        assert_eq!(report.sentences, 0);
        assert_eq!(report.score, 0.0);
    }
}
