//! Text and vector scoring primitives shared by the in-memory backends and
//! the retriever's semantic cache.

use std::collections::BTreeSet;

use crate::model::DistanceMetric;

/// Cosine similarity `⟨a,b⟩ / (‖a‖·‖b‖)`. Returns 0.0 when either vector
/// has zero norm or the dimensions disagree.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Distance under the given metric; smaller is closer for every metric
/// (inner product is negated, matching vector-store ordering).
pub fn distance(a: &[f32], b: &[f32], metric: DistanceMetric) -> f32 {
    match metric {
        DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        DistanceMetric::L2 => {
            if a.len() != b.len() {
                return f32::MAX;
            }
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt()
        }
        DistanceMetric::InnerProduct => {
            if a.len() != b.len() {
                return f32::MAX;
            }
            -a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>()
        }
    }
}

/// Lowercased alphanumeric terms of length ≥ 2.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Full-text rank: fraction of query terms present in the document.
/// 0.0 means no overlap (and the row is excluded from search results).
pub fn fulltext_rank(document: &str, query_terms: &BTreeSet<String>) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let document_terms = tokenize(document);
    let overlap = query_terms.intersection(&document_terms).count() as f32;
    overlap / query_terms.len() as f32
}

/// Character-trigram similarity in `[0, 1]`, the shape `pg_trgm` computes:
/// each lowercased word is padded with two leading and one trailing space,
/// trigram sets are compared by Jaccard overlap.
pub fn trigram_similarity(a: &str, b: &str) -> f32 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count() as f32;
    let union = ta.union(&tb).count() as f32;
    intersection / union
}

fn trigrams(text: &str) -> BTreeSet<[char; 3]> {
    let mut set = BTreeSet::new();
    for word in text
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars())
            .chain(" ".chars())
            .collect();
        for window in padded.windows(3) {
            set.insert([window[0], window[1], window[2]]);
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 1.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_dimension_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn l2_distance_of_identical_is_zero() {
        let v = vec![1.0, 2.0];
        assert_eq!(distance(&v, &v, DistanceMetric::L2), 0.0);
    }

    #[test]
    fn inner_product_orders_larger_dot_closer() {
        let query = vec![1.0, 0.0];
        let near = distance(&query, &[5.0, 0.0], DistanceMetric::InnerProduct);
        let far = distance(&query, &[1.0, 0.0], DistanceMetric::InnerProduct);
        assert!(near < far);
    }

    #[test]
    fn cosine_distance_orders_by_angle() {
        let query = vec![1.0, 0.0];
        let close = distance(&query, &[0.9, 0.1], DistanceMetric::Cosine);
        let far = distance(&query, &[0.1, 0.9], DistanceMetric::Cosine);
        assert!(close < far);
    }

    #[test]
    fn fulltext_rank_counts_overlap_fraction() {
        let terms = tokenize("fitness workout videos");
        let full = fulltext_rank("user watches fitness workout videos nightly", &terms);
        let partial = fulltext_rank("user watches fitness content", &terms);
        let none = fulltext_rank("user reads the news", &terms);
        assert_eq!(full, 1.0);
        assert!(partial > 0.0 && partial < 1.0);
        assert_eq!(none, 0.0);
    }

    #[test]
    fn trigram_exact_match_is_one() {
        assert!((trigram_similarity("Sarah Smith", "sarah smith") - 1.0).abs() < 1e-6);
    }

    #[test]
    fn trigram_typo_scores_high_but_below_exact() {
        let typo = trigram_similarity("Sarah Smith", "Sara Smith");
        assert!(typo > 0.3, "typo similarity was {typo}");
        assert!(typo < 1.0);
    }

    #[test]
    fn trigram_unrelated_names_score_low() {
        let score = trigram_similarity("Sarah Smith", "Kevin Chen");
        assert!(score < 0.3, "unrelated similarity was {score}");
    }

    #[test]
    fn trigram_empty_input_is_zero() {
        assert_eq!(trigram_similarity("", "Sarah"), 0.0);
        assert_eq!(trigram_similarity("Sarah", ""), 0.0);
        assert_eq!(trigram_similarity("", ""), 0.0);
    }
}
