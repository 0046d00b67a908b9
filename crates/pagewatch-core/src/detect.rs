//! Change detection: hash comparison, line diffs and significance heuristics.
//!
//! Everything here is pure; the scheduler owns persistence and side effects.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use crate::models::{ChangeType, DiffLine, DiffLineKind, Importance, Snapshot, compute_hash};

/// Below this many diff parts, unchanged lines are kept as context.
pub const SMALL_DIFF_PARTS: usize = 10;

/// More inserted or deleted words than this makes a change significant.
pub const SIGNIFICANT_WORD_COUNT: usize = 10;
/// A relative length change above this makes a change significant.
pub const SIGNIFICANT_LENGTH_RATIO: f64 = 0.10;

const HIGH_WORD_COUNT: usize = 100;
const HIGH_LENGTH_RATIO: f64 = 0.5;
const MEDIUM_WORD_COUNT: usize = 20;
const MEDIUM_LENGTH_RATIO: f64 = 0.2;

/// Result of comparing two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeDetection {
    pub has_changed: bool,
    pub change_type: ChangeType,
    pub diff: Vec<DiffLine>,
}

/// Significance verdict for a detected change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeAnalysis {
    pub is_significant: bool,
    pub importance: Importance,
    pub summary: String,
    pub added_words: usize,
    pub removed_words: usize,
    /// |Δchars| / max(previous chars, 1)
    pub length_change: f64,
}

/// Compare two snapshots. Equal hashes short-circuit to "unchanged".
pub fn detect_change(previous: &Snapshot, current: &Snapshot) -> ChangeDetection {
    if previous.content_hash == current.content_hash {
        return ChangeDetection {
            has_changed: false,
            change_type: ChangeType::Content,
            diff: Vec::new(),
        };
    }

    ChangeDetection {
        has_changed: true,
        change_type: ChangeType::Content,
        diff: diff_lines(&previous.content, &current.content),
    }
}

/// Line diff between two texts.
///
/// Consecutive lines sharing a tag form one part. Inserted and deleted lines
/// are always emitted; unchanged lines only when the diff has fewer than
/// [`SMALL_DIFF_PARTS`] parts.
pub fn diff_lines(previous: &str, current: &str) -> Vec<DiffLine> {
    let diff = TextDiff::from_lines(previous, current);

    let mut parts: Vec<(ChangeTag, Vec<&str>)> = Vec::new();
    for change in diff.iter_all_changes() {
        let line = change.value().trim_end_matches(['\n', '\r']);
        match parts.last_mut() {
            Some((tag, lines)) if *tag == change.tag() => lines.push(line),
            _ => parts.push((change.tag(), vec![line])),
        }
    }

    let keep_context = parts.len() < SMALL_DIFF_PARTS;
    parts
        .into_iter()
        .filter_map(|(tag, lines)| {
            let kind = match tag {
                ChangeTag::Insert => DiffLineKind::Added,
                ChangeTag::Delete => DiffLineKind::Removed,
                ChangeTag::Equal if keep_context => DiffLineKind::Context,
                ChangeTag::Equal => return None,
            };
            Some(lines.into_iter().map(move |line| DiffLine {
                kind,
                text: escape_html(line),
            }))
        })
        .flatten()
        .collect()
}

/// Decide whether a change matters and how much.
pub fn classify(previous: &str, current: &str, target_name: &str) -> ChangeAnalysis {
    let (added_words, removed_words) = word_counts(previous, current);

    let prev_len = previous.chars().count();
    let curr_len = current.chars().count();
    let length_change = prev_len.abs_diff(curr_len) as f64 / prev_len.max(1) as f64;

    let is_significant = added_words > SIGNIFICANT_WORD_COUNT
        || removed_words > SIGNIFICANT_WORD_COUNT
        || length_change > SIGNIFICANT_LENGTH_RATIO;

    let summary = if is_significant {
        format!(
            "Detected changes on {target_name}: {added_words} words added, {removed_words} words removed."
        )
    } else {
        format!("{target_name} had a minor update; content is essentially unchanged.")
    };

    ChangeAnalysis {
        is_significant,
        importance: importance_for(added_words, length_change),
        summary,
        added_words,
        removed_words,
        length_change,
    }
}

/// Importance tier from the number of added words and the relative length change.
pub fn importance_for(added_words: usize, length_change: f64) -> Importance {
    if added_words > HIGH_WORD_COUNT || length_change > HIGH_LENGTH_RATIO {
        Importance::High
    } else if added_words > MEDIUM_WORD_COUNT || length_change > MEDIUM_LENGTH_RATIO {
        Importance::Medium
    } else {
        Importance::Low
    }
}

/// Count inserted and deleted non-whitespace tokens of a word diff.
fn word_counts(previous: &str, current: &str) -> (usize, usize) {
    let diff = TextDiff::from_words(previous, current);
    let mut added = 0;
    let mut removed = 0;
    for change in diff.iter_all_changes() {
        if change.value().trim().is_empty() {
            continue;
        }
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => removed += 1,
            ChangeTag::Equal => {}
        }
    }
    (added, removed)
}

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("valid date regex"));
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{2}:\d{2}(:\d{2})?").expect("valid time regex"));
static RELATIVE_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+ (seconds?|minutes?|hours?|days?) ago").expect("valid relative time regex")
});
static COPYRIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"©\s*\d{4}").expect("valid copyright regex"));
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,3}(,\d{3})*\b").expect("valid number regex"));

/// Mask volatile fragments (dates, clock times, relative times, copyright
/// years, counters) so that they do not register as content changes.
pub fn filter_noise(content: &str) -> String {
    let masked = DATE_RE.replace_all(content, "[DATE]");
    let masked = TIME_RE.replace_all(&masked, "[TIME]");
    let masked = RELATIVE_TIME_RE.replace_all(&masked, "[RELATIVE_TIME]");
    let masked = COPYRIGHT_RE.replace_all(&masked, "[COPYRIGHT]");
    NUMBER_RE.replace_all(&masked, "[NUMBER]").into_owned()
}

/// True if two contents only differ in fragments masked by [`filter_noise`].
pub fn is_noise_only(previous: &str, current: &str) -> bool {
    compute_hash(&filter_noise(previous)) == compute_hash(&filter_noise(current))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use uuid::Uuid;

    use super::*;
    use crate::models::FetchedPage;

    fn snapshot(target_id: Uuid, content: &str) -> Snapshot {
        Snapshot::capture(
            target_id,
            FetchedPage {
                content: content.to_string(),
                title: String::new(),
                status_code: 200,
                response_time_ms: 5,
            },
        )
    }

    fn words(n: usize, prefix: &str) -> String {
        (0..n)
            .map(|i| format!("{prefix}{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn identical_snapshots_are_unchanged() {
        let id = Uuid::new_v4();
        let a = snapshot(id, "same content\nline two");
        let b = snapshot(id, "same content\nline two");

        let detection = detect_change(&a, &b);
        assert!(!detection.has_changed);
        assert!(detection.diff.is_empty());
    }

    #[test]
    fn small_diff_keeps_context_lines() {
        let id = Uuid::new_v4();
        let a = snapshot(id, "header\nPrice: $10\nfooter");
        let b = snapshot(id, "header\nPrice: $15\nfooter");

        let detection = detect_change(&a, &b);
        assert!(detection.has_changed);
        assert_eq!(detection.change_type, ChangeType::Content);

        let rendered: Vec<String> = detection.diff.iter().map(DiffLine::render).collect();
        assert_eq!(
            rendered,
            vec!["  header", "- Price: $10", "+ Price: $15", "  footer"]
        );
    }

    #[test]
    fn large_diff_drops_context_lines() {
        let previous: Vec<String> = (0..12).map(|i| format!("line {i}")).collect();
        let mut current = previous.clone();
        for i in (0..12).step_by(2) {
            current[i] = format!("changed {i}");
        }

        let diff = diff_lines(&previous.join("\n"), &current.join("\n"));
        assert!(!diff.is_empty());
        assert!(diff.iter().all(|l| l.kind != DiffLineKind::Context));
    }

    #[test]
    fn diff_text_is_html_escaped() {
        let diff = diff_lines("<b>old</b>", "<b>\"new\" & 'shiny'</b>");
        let added = diff
            .iter()
            .find(|l| l.kind == DiffLineKind::Added)
            .unwrap();
        assert_eq!(
            added.text,
            "&lt;b&gt;&quot;new&quot; &amp; &#039;shiny&#039;&lt;/b&gt;"
        );
    }

    #[test]
    fn single_price_change_is_insignificant() {
        let analysis = classify("Price: $10", "Price: $15", "Shop");
        assert_eq!(analysis.added_words, 1);
        assert_eq!(analysis.removed_words, 1);
        assert!(!analysis.is_significant);
        assert_eq!(analysis.importance, Importance::Low);
        assert_eq!(
            analysis.summary,
            "Shop had a minor update; content is essentially unchanged."
        );
    }

    #[test]
    fn large_growth_is_high_importance() {
        let base = "x".repeat(1000);
        let extra = words(30, "w");
        let padding = "y".repeat(600 - extra.len() - 1);
        let current = format!("{base} {extra}{padding}");
        assert_eq!(current.chars().count(), 1600);

        let analysis = classify(&base, &current, "Blog");
        assert!(analysis.is_significant);
        assert_eq!(analysis.importance, Importance::High);
        assert!(analysis.length_change > 0.5);
        assert!(analysis.summary.starts_with("Detected changes on Blog:"));
    }

    #[test]
    fn many_removed_words_are_significant() {
        let previous = words(40, "old");
        let current = words(28, "old");
        let analysis = classify(&previous, &current, "Docs");
        assert_eq!(analysis.removed_words, 12);
        assert!(analysis.is_significant);
    }

    #[test]
    fn importance_thresholds() {
        assert_eq!(importance_for(0, 0.0), Importance::Low);
        assert_eq!(importance_for(20, 0.2), Importance::Low);
        assert_eq!(importance_for(21, 0.0), Importance::Medium);
        assert_eq!(importance_for(0, 0.25), Importance::Medium);
        assert_eq!(importance_for(101, 0.0), Importance::High);
        assert_eq!(importance_for(0, 0.51), Importance::High);
    }

    #[test]
    fn filter_noise_masks_volatile_fragments() {
        let masked = filter_noise("Updated 2024-03-01 at 12:30:05, posted 5 minutes ago. © 2024");
        assert_eq!(
            masked,
            "Updated [DATE] at [TIME], posted [RELATIVE_TIME]. [COPYRIGHT]"
        );
        assert_eq!(filter_noise("1,234 views"), "[NUMBER] views");
    }

    #[test]
    fn noise_only_changes_are_detected() {
        assert!(is_noise_only(
            "Last updated 2024-01-01 10:00",
            "Last updated 2024-01-02 11:45"
        ));
        assert!(!is_noise_only("Price: $10", "Price: $15 today"));
    }

    proptest! {
        #[test]
        fn importance_is_monotonic_in_added_words(
            added in 0usize..500,
            extra in 0usize..500,
            length_change in 0.0f64..1.0,
        ) {
            prop_assert!(
                importance_for(added, length_change) <= importance_for(added + extra, length_change)
            );
        }

        #[test]
        fn detect_change_on_same_content_is_unchanged(content in ".{0,200}") {
            let id = Uuid::new_v4();
            let a = snapshot(id, &content);
            let b = snapshot(id, &content);
            prop_assert!(!detect_change(&a, &b).has_changed);
        }
    }
}
