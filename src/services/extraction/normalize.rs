use std::sync::OnceLock;

use regex::Regex;

/// Cleans raw backend output: drops markdown fences, unifies line endings,
/// trims each line and squeezes runs of blank lines down to one.
pub(crate) fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<&str> = Vec::new();
    let mut previous_blank = true;
    for line in unified.lines() {
        let trimmed = line.trim_end();
        if trimmed.trim_start().starts_with("```") {
            continue;
        }
        let blank = trimmed.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        lines.push(if blank { "" } else { trimmed });
        previous_blank = blank;
    }

    lines.join("\n").trim().to_string()
}

fn marker_regex() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| {
            Regex::new(
                r"(?mi)^[ \t]*(?:(?:question|answer|ans|q)[ \t]*\.?[ \t]*(\d{1,3})\b[ \t]*[:.)\-]?|(\d{1,3})[ \t]*[.)](?:[ \t]|$))",
            )
            .ok()
        })
        .as_ref()
}

struct Marker {
    ordinal: usize,
    start: usize,
    body_start: usize,
}

/// Returns the section of a whole-sheet transcription that belongs to
/// `ordinal`.
///
/// Worded markers (`Q2`, `Answer 2`) take precedence over bare numerals
/// (`2.`, `2)`) when both appear. Markers only count when they appear in
/// strictly increasing order and at least two distinct questions are marked;
/// otherwise the whole text is returned. A marked sheet without the requested ordinal yields an empty
/// string.
pub(crate) fn segment_for_question(text: &str, ordinal: usize, total: usize) -> String {
    if total <= 1 {
        return text.to_string();
    }
    let Some(regex) = marker_regex() else {
        return text.to_string();
    };

    let mut candidates: Vec<(bool, Marker)> = Vec::new();
    for captures in regex.captures_iter(text) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let (worded, number) = match (captures.get(1), captures.get(2)) {
            (Some(number), _) => (true, number),
            (None, Some(number)) => (false, number),
            (None, None) => continue,
        };
        let Ok(value) = number.as_str().parse::<usize>() else {
            continue;
        };
        if value == 0 || value > total {
            continue;
        }
        // the leading whitespace of the line belongs to the previous section
        let start = whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len());
        candidates.push((worded, Marker { ordinal: value, start, body_start: whole.end() }));
    }

    // bare numerals are list items once the sheet labels its answers with words
    let worded_only = candidates.iter().any(|(worded, _)| *worded);
    let mut markers: Vec<Marker> = Vec::new();
    for (worded, marker) in candidates {
        if worded_only && !worded {
            continue;
        }
        if markers.last().is_some_and(|last| marker.ordinal <= last.ordinal) {
            continue;
        }
        markers.push(marker);
    }

    if markers.len() < 2 {
        return text.to_string();
    }

    let Some(index) = markers.iter().position(|marker| marker.ordinal == ordinal) else {
        return String::new();
    };
    let end = markers.get(index + 1).map_or(text.len(), |next| next.start);
    text[markers[index].body_start..end].trim().to_string()
}
