//! Stage 1a: lexical matching.
//!
//! Two passes over the namespace snapshot: exact keyword containment (first
//! pattern in creation order wins, scored 1.0), then an edit-distance ratio
//! against keywords and example phrasings. Purely in-memory; this stage
//! cannot error, a miss simply falls through.

use std::sync::Arc;

use strsim::normalized_levenshtein;

use crate::index::{normalize_text, IndexedPattern, NamespaceIndex};
use crate::types::MatchMethod;

/// A lexical hit.
#[derive(Debug, Clone)]
pub struct LexicalMatch {
    pub pattern: Arc<IndexedPattern>,
    pub score: f32,
    pub method: MatchMethod,
}

/// Match an utterance against the namespace snapshot.
pub fn match_lexical(
    utterance: &str,
    index: &NamespaceIndex,
    fuzzy_threshold: f32,
) -> Option<LexicalMatch> {
    if index.is_empty() {
        return None;
    }

    let normalized = normalize_text(utterance);
    if normalized.is_empty() {
        return None;
    }

    if let Some(hit) = exact_pass(&normalized, index) {
        return Some(hit);
    }
    fuzzy_pass(&normalized, index, fuzzy_threshold)
}

/// Containment scan over the keyword map. The earliest-created candidate
/// wins, keeping the result deterministic under hash-map iteration order.
fn exact_pass(normalized: &str, index: &NamespaceIndex) -> Option<LexicalMatch> {
    let mut best_position: Option<usize> = None;

    for (keyword, positions) in index.keyword_map() {
        if !contains_phrase(normalized, keyword) {
            continue;
        }
        for &position in positions {
            if best_position.map_or(true, |best| position < best) {
                best_position = Some(position);
            }
        }
    }

    best_position.map(|position| LexicalMatch {
        pattern: index.patterns()[position].clone(),
        score: 1.0,
        method: MatchMethod::Exact,
    })
}

/// Word-boundary-aware containment of a normalized keyword phrase.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack
        .match_indices(phrase)
        .any(|(start, _)| {
            let end = start + phrase.len();
            let starts_clean =
                start == 0 || haystack.as_bytes().get(start - 1) == Some(&b' ');
            let ends_clean =
                end == haystack.len() || haystack.as_bytes().get(end) == Some(&b' ');
            starts_clean && ends_clean
        })
}

/// Edit-distance ratio against each pattern's keywords and example texts.
fn fuzzy_pass(
    normalized: &str,
    index: &NamespaceIndex,
    threshold: f32,
) -> Option<LexicalMatch> {
    let mut best: Option<(Arc<IndexedPattern>, f32)> = None;

    for entry in index.patterns() {
        let candidates = entry
            .pattern
            .keywords
            .iter()
            .chain(entry.pattern.example_queries.iter().map(|e| &e.text));

        let mut score = 0.0f32;
        for candidate in candidates {
            let candidate = normalize_text(candidate);
            if candidate.is_empty() {
                continue;
            }
            let similarity = normalized_levenshtein(normalized, &candidate) as f32;
            score = score.max(similarity);
        }

        if score < threshold {
            continue;
        }
        let replace = match &best {
            None => true,
            Some((current, current_score)) => {
                beats(entry, score, current, *current_score)
            }
        };
        if replace {
            best = Some((entry.clone(), score));
        }
    }

    best.map(|(pattern, score)| LexicalMatch {
        pattern,
        score,
        method: MatchMethod::Fuzzy,
    })
}

/// Tie-break ordering: score, then hit count, then most recently created.
pub(crate) fn beats(
    challenger: &Arc<IndexedPattern>,
    challenger_score: f32,
    incumbent: &Arc<IndexedPattern>,
    incumbent_score: f32,
) -> bool {
    if challenger_score != incumbent_score {
        return challenger_score > incumbent_score;
    }
    let (ch, ih) = (challenger.hit_count(), incumbent.hit_count());
    if ch != ih {
        return ch > ih;
    }
    challenger.pattern.created_at > incumbent.pattern.created_at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CachedResponse, ExampleQuery, Pattern};

    fn pattern(key: &str, keywords: &[&str], examples: &[&str]) -> Pattern {
        Pattern::new("tenant", key, CachedResponse::text("answer"))
            .with_keywords(keywords.iter().map(|k| k.to_string()).collect())
            .with_examples(
                examples
                    .iter()
                    .map(|e| ExampleQuery::new(*e, vec![]))
                    .collect(),
            )
    }

    fn index(patterns: Vec<Pattern>) -> NamespaceIndex {
        NamespaceIndex::build("tenant", patterns)
    }

    #[test]
    fn test_exact_containment_scores_one() {
        let idx = index(vec![pattern("hours", &["hours"], &[])]);
        let hit = match_lexical("what are your hours today", &idx, 0.8).unwrap();
        assert_eq!(hit.method, MatchMethod::Exact);
        assert_eq!(hit.score, 1.0);
        assert_eq!(hit.pattern.pattern.key, "hours");
    }

    #[test]
    fn test_exact_requires_word_boundary() {
        let idx = index(vec![pattern("open", &["open"], &[])]);
        // "reopened" contains "open" as a substring but not as a word.
        assert!(match_lexical("you reopened recently", &idx, 0.99).is_none());
        assert!(match_lexical("are you open", &idx, 0.99).is_some());
    }

    #[test]
    fn test_first_created_pattern_wins_exact_tie() {
        let idx = index(vec![
            pattern("hours", &["open"], &[]),
            pattern("location", &["open"], &[]),
        ]);
        let hit = match_lexical("are you open", &idx, 0.8).unwrap();
        assert_eq!(hit.pattern.pattern.key, "hours");
    }

    #[test]
    fn test_fuzzy_match_above_threshold() {
        let idx = index(vec![pattern("hours", &[], &["what are your hours"])]);
        let hit = match_lexical("what are you hours", &idx, 0.8).unwrap();
        assert_eq!(hit.method, MatchMethod::Fuzzy);
        assert!(hit.score >= 0.8);
        assert!(hit.score < 1.0);
    }

    #[test]
    fn test_fuzzy_below_threshold_misses() {
        let idx = index(vec![pattern("hours", &["business hours"], &[])]);
        assert!(match_lexical("do you deliver pizza", &idx, 0.8).is_none());
    }

    #[test]
    fn test_fuzzy_monotonic_in_edit_distance() {
        let idx = index(vec![pattern("hours", &[], &["what are your hours"])]);
        // One edit away vs. three edits away from the example.
        let close = match_lexical("what are your hour", &idx, 0.0).unwrap();
        let far = match_lexical("what are my ours", &idx, 0.0).unwrap();
        assert!(close.score >= far.score);
    }

    #[test]
    fn test_fuzzy_tie_broken_by_hit_count() {
        let idx = index(vec![
            pattern("first", &["identical keyword"], &[]),
            pattern("second", &["identical keyword"], &[]),
        ]);
        // Give the second pattern more hits; same fuzzy score for both.
        idx.patterns()[1].record_hit();
        let hit = match_lexical("identical keywords", &idx, 0.5).unwrap();
        assert_eq!(hit.pattern.pattern.key, "second");
    }

    #[test]
    fn test_empty_index_misses() {
        let idx = index(vec![]);
        assert!(match_lexical("anything", &idx, 0.8).is_none());
    }
}
