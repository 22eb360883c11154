//! Weighted Reciprocal Rank Fusion.
//!
//! Each method's candidates are sorted by native score and item `r` (0-indexed)
//! earns `1 / (r + rrf_k)`. An id's fused score is
//! `bm25_weight * rrf_lex + vector_weight * rrf_vec`, with 0 for a method that
//! did not return it. A larger `rrf_k` flattens the advantage of the very top
//! ranks.
//!
//! Ordering rules:
//! - native-score sorting is stable, and NaN scores rank last;
//! - an id repeated within one method keeps the rank of its last occurrence;
//! - equal fused scores keep fusion-input order: ids in order of first
//!   appearance in the sorted lexical list, then the sorted vector list.

use std::cmp::Ordering;

use ahash::AHashMap;
use common::{Candidate, FusedResult, config::RetrieverSettings};

use crate::error::FusionConfigError;

pub const DEFAULT_RRF_K: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    pub bm25_weight: f64,
    pub vector_weight: f64,
    pub rrf_k: u32,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            bm25_weight: 0.5,
            vector_weight: 0.5,
            rrf_k: DEFAULT_RRF_K,
        }
    }
}

impl FusionParams {
    pub fn new(
        bm25_weight: f64,
        vector_weight: f64,
        rrf_k: u32,
    ) -> Result<Self, FusionConfigError> {
        if rrf_k == 0 {
            return Err(FusionConfigError::ZeroRrfK);
        }
        for (name, value) in [("bm25_weight", bm25_weight), ("vector_weight", vector_weight)] {
            if !value.is_finite() || value < 0.0 {
                return Err(FusionConfigError::InvalidWeight { name, value });
            }
        }
        Ok(Self {
            bm25_weight,
            vector_weight,
            rrf_k,
        })
    }

    pub fn from_settings(settings: &RetrieverSettings) -> Result<Self, FusionConfigError> {
        Self::new(
            f64::from(settings.bm25_weight),
            f64::from(settings.vector_weight),
            settings.rrf_k,
        )
    }

    /// Largest fused score any id can reach: rank 0 in both lists.
    pub fn max_score(&self) -> f64 {
        let k = f64::from(self.rrf_k);
        self.bm25_weight / k + self.vector_weight / k
    }

    fn reciprocal(&self, rank: usize) -> f64 {
        1.0 / (rank as f64 + f64::from(self.rrf_k))
    }
}

#[derive(Default)]
struct Contribution {
    lexical_rank: Option<usize>,
    vector_rank: Option<usize>,
}

pub fn fuse(
    lexical: &[Candidate],
    vector: &[Candidate],
    final_k: usize,
    params: &FusionParams,
) -> Vec<FusedResult> {
    let mut order: Vec<&str> = Vec::new();
    let mut contributions: AHashMap<&str, Contribution> = AHashMap::new();

    for (rank, candidate) in sorted_by_native_score(lexical).into_iter().enumerate() {
        let entry = contributions.entry(candidate.id.as_str()).or_insert_with(|| {
            order.push(candidate.id.as_str());
            Contribution::default()
        });
        entry.lexical_rank = Some(rank);
    }
    for (rank, candidate) in sorted_by_native_score(vector).into_iter().enumerate() {
        let entry = contributions.entry(candidate.id.as_str()).or_insert_with(|| {
            order.push(candidate.id.as_str());
            Contribution::default()
        });
        entry.vector_rank = Some(rank);
    }

    let mut fused = order
        .into_iter()
        .map(|id| {
            let contribution = contributions.remove(id).unwrap_or_default();
            let lexical_term = contribution
                .lexical_rank
                .map_or(0.0, |rank| params.reciprocal(rank));
            let vector_term = contribution
                .vector_rank
                .map_or(0.0, |rank| params.reciprocal(rank));
            FusedResult {
                id: id.to_string(),
                fused_score: params.bm25_weight * lexical_term + params.vector_weight * vector_term,
                lexical_rank: contribution.lexical_rank,
                vector_rank: contribution.vector_rank,
            }
        })
        .collect::<Vec<_>>();

    sort_by_fused_score(&mut fused);
    fused.truncate(final_k);
    tracing::debug!(
        lexical = lexical.len(),
        vector = vector.len(),
        fused = fused.len(),
        final_k,
        "rank fusion complete"
    );
    fused
}

/// Stable descending sort on fused score.
fn sort_by_fused_score(results: &mut [FusedResult]) {
    results.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score));
}

fn sorted_by_native_score(candidates: &[Candidate]) -> Vec<&Candidate> {
    let mut sorted = candidates.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| descending_nan_last(a.native_score, b.native_score));
    sorted
}

fn descending_nan_last(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use common::Candidate;
    use proptest::prelude::*;

    use super::{FusionParams, fuse};
    use crate::error::FusionConfigError;

    fn lex(items: &[(&str, f32)]) -> Vec<Candidate> {
        items.iter().map(|(id, s)| Candidate::lexical(*id, *s)).collect()
    }

    fn vecs(items: &[(&str, f32)]) -> Vec<Candidate> {
        items
            .iter()
            .map(|(id, s)| Candidate::vector(*id, *s, None))
            .collect()
    }

    fn ids(results: &[common::FusedResult]) -> Vec<&str> {
        results.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn worked_example_orders_b_a_c() {
        let fused = fuse(
            &lex(&[("A", 10.0), ("B", 5.0)]),
            &vecs(&[("B", 0.9), ("C", 0.8)]),
            10,
            &FusionParams::default(),
        );
        insta::assert_snapshot!(ids(&fused).join(","), @"B,A,C");
        assert!((fused[0].fused_score - (0.5 / 61.0 + 0.5 / 60.0)).abs() < 1e-12);
        assert!((fused[1].fused_score - 0.5 / 60.0).abs() < 1e-12);
        assert!((fused[2].fused_score - 0.5 / 61.0).abs() < 1e-12);
        assert_eq!(fused[0].lexical_rank, Some(1));
        assert_eq!(fused[0].vector_rank, Some(0));
        assert_eq!(fused[2].lexical_rank, None);
    }

    #[test]
    fn sorts_each_method_by_native_score_before_ranking() {
        let fused = fuse(
            &lex(&[("low", 1.0), ("high", 9.0)]),
            &[],
            10,
            &FusionParams::default(),
        );
        assert_eq!(ids(&fused), vec!["high", "low"]);
    }

    #[test]
    fn empty_inputs_fuse_to_nothing() {
        assert!(fuse(&[], &[], 5, &FusionParams::default()).is_empty());
    }

    #[test]
    fn final_k_larger_than_union_returns_everything_without_padding() {
        let fused = fuse(&lex(&[("a", 1.0)]), &vecs(&[("b", 1.0)]), 50, &FusionParams::default());
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn final_k_truncates() {
        let fused = fuse(
            &lex(&[("a", 3.0), ("b", 2.0), ("c", 1.0)]),
            &[],
            2,
            &FusionParams::default(),
        );
        assert_eq!(ids(&fused), vec!["a", "b"]);
    }

    #[test]
    fn duplicate_ids_keep_last_occurrence_rank() {
        let fused = fuse(
            &lex(&[("dup", 9.0), ("x", 5.0), ("dup", 1.0)]),
            &[],
            10,
            &FusionParams::default(),
        );
        let dup = fused.iter().find(|r| r.id == "dup").expect("dup present");
        assert_eq!(dup.lexical_rank, Some(2));
        assert_eq!(ids(&fused), vec!["x", "dup"]);
    }

    #[test]
    fn ties_keep_fusion_input_order() {
        let fused = fuse(
            &lex(&[("l0", 2.0), ("l1", 1.0)]),
            &vecs(&[("v0", 2.0), ("v1", 1.0)]),
            10,
            &FusionParams::default(),
        );
        assert_eq!(ids(&fused), vec!["l0", "v0", "l1", "v1"]);
    }

    #[test]
    fn nan_native_scores_rank_last() {
        let fused = fuse(
            &lex(&[("nan", f32::NAN), ("ok", 0.1)]),
            &[],
            10,
            &FusionParams::default(),
        );
        assert_eq!(ids(&fused), vec!["ok", "nan"]);
    }

    #[test]
    fn zero_vector_weight_sinks_vector_only_ids() {
        let params = FusionParams::new(1.0, 0.0, 60).expect("params");
        let fused = fuse(
            &lex(&[("a", 3.0), ("b", 1.0)]),
            &vecs(&[("only-vec", 0.99), ("b", 0.5)]),
            10,
            &params,
        );
        assert_eq!(ids(&fused), vec!["a", "b", "only-vec"]);
        assert_eq!(fused[2].fused_score, 0.0);
    }

    #[test]
    fn rejects_invalid_params() {
        assert_eq!(FusionParams::new(0.5, 0.5, 0), Err(FusionConfigError::ZeroRrfK));
        assert!(matches!(
            FusionParams::new(-0.1, 0.5, 60),
            Err(FusionConfigError::InvalidWeight { name: "bm25_weight", .. })
        ));
        assert!(matches!(
            FusionParams::new(0.5, f64::NAN, 60),
            Err(FusionConfigError::InvalidWeight { name: "vector_weight", .. })
        ));
    }

    fn candidate_lists() -> impl Strategy<Value = (Vec<(u8, f32)>, Vec<(u8, f32)>)> {
        (
            prop::collection::vec((0u8..40, 0.0f32..100.0), 0..30),
            prop::collection::vec((0u8..40, 0.0f32..1.0), 0..30),
        )
    }

    fn params() -> impl Strategy<Value = FusionParams> {
        (0.0f64..2.0, 0.0f64..2.0, 1u32..200)
            .prop_map(|(w_lex, w_vec, k)| FusionParams::new(w_lex, w_vec, k).expect("valid"))
    }

    fn to_candidates(raw: &[(u8, f32)], lexical: bool) -> Vec<Candidate> {
        raw.iter()
            .map(|(id, score)| {
                let id = format!("id{id}");
                if lexical {
                    Candidate::lexical(id, *score)
                } else {
                    Candidate::vector(id, *score, None)
                }
            })
            .collect()
    }

    proptest! {
        #[test]
        fn fused_scores_stay_within_bounds((l, v) in candidate_lists(), p in params()) {
            let fused = fuse(&to_candidates(&l, true), &to_candidates(&v, false), usize::MAX, &p);
            for result in &fused {
                prop_assert!(result.fused_score >= 0.0);
                prop_assert!(result.fused_score <= p.max_score() + 1e-12);
            }
        }

        #[test]
        fn fusion_covers_the_union_of_inputs((l, v) in candidate_lists(), p in params()) {
            let lexical = to_candidates(&l, true);
            let vector = to_candidates(&v, false);
            let fused = fuse(&lexical, &vector, usize::MAX, &p);
            let expected = lexical.iter().chain(vector.iter()).map(|c| c.id.clone()).collect::<HashSet<_>>();
            let got = fused.iter().map(|r| r.id.clone()).collect::<HashSet<_>>();
            prop_assert_eq!(fused.len(), got.len());
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn fusion_output_is_non_increasing((l, v) in candidate_lists(), p in params(), k in 0usize..50) {
            let fused = fuse(&to_candidates(&l, true), &to_candidates(&v, false), k, &p);
            prop_assert!(fused.len() <= k);
            for pair in fused.windows(2) {
                prop_assert!(pair[0].fused_score >= pair[1].fused_score);
            }
        }

        #[test]
        fn zero_vector_weight_ranks_by_lexical_alone((l, v) in candidate_lists(), w in 0.01f64..2.0) {
            let p = FusionParams::new(w, 0.0, 60).expect("valid");
            let fused = fuse(&to_candidates(&l, true), &to_candidates(&v, false), usize::MAX, &p);
            let first_zero = fused.iter().position(|r| r.lexical_rank.is_none()).unwrap_or(fused.len());
            for result in &fused[first_zero..] {
                prop_assert!(result.lexical_rank.is_none());
                prop_assert_eq!(result.fused_score, 0.0);
            }
            for pair in fused[..first_zero].windows(2) {
                prop_assert!(pair[0].lexical_rank < pair[1].lexical_rank);
            }
        }
    }
}
