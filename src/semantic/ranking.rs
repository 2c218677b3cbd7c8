//! Re-ranking of raw cosine similarity.
//!
//! Adjustment applied per candidate word `w` against the base word:
//!
//! ```text
//! adjusted = raw * category_bonus * length_penalty
//! category_bonus = 1.1 when both words share a category other than "general"
//! length_penalty = 0.9 when their lengths differ by more than 8 characters
//! ```
//!
//! The adjusted value is not clamped, so a same-category candidate can score
//! above its raw cosine and even above 1.0.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use super::categories::CategoryModel;

const CATEGORY_BONUS: f64 = 1.1;
const LENGTH_PENALTY: f64 = 0.9;
const LENGTH_PENALTY_GAP: usize = 8;

/// A word scored against a query during one ranking pass.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Candidate {
    pub word: String,
    pub adjusted_similarity: f64,
    pub raw_similarity: f64,
    pub category: String,
}

/// Threshold and size limit for one ranking pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cutoff {
    pub threshold: f64,
    pub top_k: usize,
}

impl Cutoff {
    pub const fn new(threshold: f64, top_k: usize) -> Self {
        Self { threshold, top_k }
    }
}

/// Outcome of a ranking pass with threshold relaxation.
#[derive(Debug, Clone, Serialize)]
pub struct Ranked {
    pub candidates: Vec<Candidate>,
    /// True when the primary cutoff matched nothing and the relaxed one was used
    pub relaxed: bool,
}

pub struct Ranker {
    categories: Arc<CategoryModel>,
}

impl Ranker {
    pub fn new(categories: Arc<CategoryModel>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &CategoryModel {
        &self.categories
    }

    /// Apply the category bonus and length penalty to a raw similarity.
    pub fn adjusted_similarity(&self, base_word: &str, word: &str, raw: f64) -> f64 {
        let base_category = self.categories.category_of(base_word);
        let word_category = self.categories.category_of(word);

        let category_bonus =
            if base_category.name == word_category.name && !base_category.is_general() {
                CATEGORY_BONUS
            } else {
                1.0
            };

        let gap = base_word
            .chars()
            .count()
            .abs_diff(word.chars().count());
        let length_penalty = if gap > LENGTH_PENALTY_GAP {
            LENGTH_PENALTY
        } else {
            1.0
        };

        raw * category_bonus * length_penalty
    }

    /// Score, filter, sort (stable, descending) and truncate.
    ///
    /// `words` and `raw` are index-aligned. Only the aligned prefix is
    /// ranked when their lengths differ.
    pub fn rank<S: AsRef<str>>(
        &self,
        base_word: &str,
        words: &[S],
        raw: &[f64],
        cutoff: Cutoff,
    ) -> Vec<Candidate> {
        if words.len() != raw.len() {
            log::warn!(
                "{} candidate words but {} similarities for '{base_word}'",
                words.len(),
                raw.len()
            );
        }

        let mut ranked: Vec<Candidate> = words
            .iter()
            .zip(raw.iter())
            .map(|(word, &raw)| {
                let word = word.as_ref();
                Candidate {
                    word: word.to_string(),
                    adjusted_similarity: self.adjusted_similarity(base_word, word, raw),
                    raw_similarity: raw,
                    category: self.categories.category_of(word).name.to_string(),
                }
            })
            .filter(|c| c.adjusted_similarity >= cutoff.threshold)
            .collect();

        ranked.sort_by(|a, b| {
            b.adjusted_similarity
                .partial_cmp(&a.adjusted_similarity)
                .unwrap_or(Ordering::Equal)
        });
        ranked.truncate(cutoff.top_k);
        ranked
    }

    /// Rank with `primary`; if nothing survives, rank again with `relaxed`.
    pub fn rank_with_fallback<S: AsRef<str>>(
        &self,
        base_word: &str,
        words: &[S],
        raw: &[f64],
        primary: Cutoff,
        relaxed: Cutoff,
    ) -> Ranked {
        let candidates = self.rank(base_word, words, raw, primary);
        if !candidates.is_empty() {
            return Ranked {
                candidates,
                relaxed: false,
            };
        }

        log::debug!(
            "no candidates for '{base_word}' at {:.2}, relaxing to {:.2}",
            primary.threshold,
            relaxed.threshold
        );

        Ranked {
            candidates: self.rank(base_word, words, raw, relaxed),
            relaxed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PRIMARY: Cutoff = Cutoff::new(0.5, 12);
    const RELAXED: Cutoff = Cutoff::new(0.3, 10);

    fn ranker() -> Ranker {
        Ranker::new(Arc::new(CategoryModel::builtin()))
    }

    #[test]
    fn test_same_category_bonus() {
        let r = ranker();
        assert!((r.adjusted_similarity("rei", "rainha", 0.8) - 0.88).abs() < 1e-12);
        // different categories
        assert!((r.adjusted_similarity("rei", "gato", 0.8) - 0.8).abs() < 1e-12);
        // both general: no bonus
        assert!((r.adjusted_similarity("foo", "bar", 0.8) - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_length_penalty() {
        let r = ranker();
        // "ar" (2) vs "conhecimento" (12): gap 10
        assert!((r.adjusted_similarity("ar", "conhecimento", 0.6) - 0.54).abs() < 1e-12);
        // gap of exactly 8 is not penalized
        assert!((r.adjusted_similarity("ab", "abcdefghij", 0.6) - 0.6).abs() < 1e-12);
        // counted in characters, not bytes
        assert!((r.adjusted_similarity("pé", "pássaros", 0.6) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_adjusted_is_not_clamped() {
        let r = ranker();
        let adjusted = r.adjusted_similarity("rei", "rainha", 0.99);
        assert!(adjusted > 1.0);
    }

    #[test]
    fn test_rank_filters_sorts_truncates() {
        let r = ranker();
        let words = ["gato", "cachorro", "mesa", "rainha", "xyzzy"];
        let raw = [0.55, 0.7, 0.2, 0.6, 0.9];

        let ranked = r.rank("rei", &words, &raw, Cutoff::new(0.5, 3));
        let order: Vec<&str> = ranked.iter().map(|c| c.word.as_str()).collect();
        assert_eq!(order, vec!["xyzzy", "cachorro", "rainha"]);
        assert_eq!(ranked[2].category, "realeza");
        assert!((ranked[2].adjusted_similarity - 0.66).abs() < 1e-12);
        assert!((ranked[2].raw_similarity - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_rank_is_stable_on_ties() {
        let r = ranker();
        let words = ["a1", "a2", "a3"];
        let raw = [0.7, 0.7, 0.7];
        let ranked = r.rank("zz", &words, &raw, PRIMARY);
        let order: Vec<&str> = ranked.iter().map(|c| c.word.as_str()).collect();
        assert_eq!(order, vec!["a1", "a2", "a3"]);
    }

    #[test]
    fn test_fallback_used_when_primary_empty() {
        let r = ranker();
        let words = ["gato", "mesa", "lua"];
        let raw = [0.45, 0.35, 0.1];

        let ranked = r.rank_with_fallback("xyzzy", &words, &raw, PRIMARY, RELAXED);
        assert!(ranked.relaxed);
        let order: Vec<&str> = ranked.candidates.iter().map(|c| c.word.as_str()).collect();
        assert_eq!(order, vec!["gato", "mesa"]);
    }

    #[test]
    fn test_fallback_not_used_when_primary_matches() {
        let r = ranker();
        let ranked = r.rank_with_fallback("xyzzy", &["gato", "mesa"], &[0.6, 0.4], PRIMARY, RELAXED);
        assert!(!ranked.relaxed);
        assert_eq!(ranked.candidates.len(), 1);
    }

    #[test]
    fn test_fallback_can_still_be_empty() {
        let r = ranker();
        let ranked = r.rank_with_fallback("xyzzy", &["gato"], &[0.1], PRIMARY, RELAXED);
        assert!(ranked.relaxed);
        assert!(ranked.candidates.is_empty());
    }

    #[test]
    fn test_misaligned_inputs_rank_the_aligned_prefix() {
        let r = ranker();
        let ranked = r.rank("rei", &["rainha", "gato", "mesa"], &[0.9, 0.8], Cutoff::new(0.0, 10));
        let words: Vec<&str> = ranked.iter().map(|c| c.word.as_str()).collect();
        assert_eq!(words, vec!["rainha", "gato"]);

        let ranked = r.rank("rei", &["rainha"], &[0.9, 0.8], Cutoff::new(0.0, 10));
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_nan_never_survives() {
        let r = ranker();
        let ranked = r.rank("xyzzy", &["gato"], &[f64::NAN], Cutoff::new(0.0, 5));
        assert!(ranked.is_empty());
    }

    proptest! {
        #[test]
        fn prop_rank_is_sorted_bounded_and_thresholded(
            raw in prop::collection::vec(-1.0f64..1.0, 0..80),
            threshold in 0.0f64..0.9,
            top_k in 0usize..20,
        ) {
            let r = ranker();
            let vocab = r.categories().vocabulary().to_vec();
            let words: Vec<String> = (0..raw.len()).map(|i| vocab[i % vocab.len()].clone()).collect();

            let ranked = r.rank("rei", &words, &raw, Cutoff::new(threshold, top_k));

            prop_assert!(ranked.len() <= top_k);
            for c in &ranked {
                prop_assert!(c.adjusted_similarity >= threshold);
            }
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].adjusted_similarity >= pair[1].adjusted_similarity);
            }
        }
    }
}
