use serde::Serialize;
use rapidfuzz::fuzz;

use crate::artifacts::ArtifactSink;
use crate::catalog::{CandidateItem, EntityType};

/// Score of an identical match.
pub const EXACT_MATCH: f64 = 100.0;

/// One scored candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub name: String,
    pub id: String,
    pub score: f64,
}

/// Outcome of matching one keyword against a candidate list.
///
/// `candidates` only holds the candidates actually scanned: scanning stops
/// at the first exact match.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub keyword: String,
    pub entity: EntityType,
    pub candidates: Vec<ScoredCandidate>,
    pub best_id: Option<String>,
    pub confidence: f64,
}

impl MatchResult {
    /// `(identifier, confidence)` of the winning candidate.
    pub fn best(&self) -> (Option<&str>, f64) {
        (self.best_id.as_deref(), self.confidence)
    }

    pub fn best_name(&self) -> Option<&str> {
        let id = self.best_id.as_deref()?;
        self.candidates.iter().find(|c| c.id == id).map(|c| c.name.as_str())
    }
}

/// Indel similarity between two names as a percentage,
/// `(1 - indel / (len_a + len_b)) * 100`, rounded to four decimal places.
/// Case-sensitive; two empty strings are identical.
pub fn similarity(keyword: &str, name: &str) -> f64 {
    if keyword.is_empty() && name.is_empty() {
        return EXACT_MATCH;
    }
    let ratio = fuzz::ratio(keyword.chars(), name.chars()) * 100.0;
    (ratio * 10_000.0).round() / 10_000.0
}

/// Picks the closest catalog candidate for a keyword.
pub struct FuzzyMatcher<'a> {
    threshold: f64,
    sink: &'a ArtifactSink,
}

impl<'a> FuzzyMatcher<'a> {
    pub fn new(threshold: f64, sink: &'a ArtifactSink) -> Self {
        Self { threshold, sink }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score every candidate and select the best.
    ///
    /// The scan stops at the first candidate scoring exactly 100, so with
    /// duplicate names the earliest one in response order wins. Otherwise
    /// the first maximum wins. An empty list yields `(None, 0.0)`.
    ///
    /// Results under the threshold are dumped to the artifact sink for
    /// manual review; they are still returned.
    pub fn find_closest_match(
        &self,
        keyword: &str,
        entity: EntityType,
        candidates: &[CandidateItem],
    ) -> MatchResult {
        let mut scored: Vec<ScoredCandidate> = Vec::with_capacity(candidates.len());
        let mut best: Option<usize> = None;

        for item in candidates {
            let score = similarity(keyword, &item.name);
            scored.push(ScoredCandidate {
                name: item.name.clone(),
                id: item.id.clone(),
                score,
            });
            let idx = scored.len() - 1;
            if best.is_none_or(|b| score > scored[b].score) {
                best = Some(idx);
            }
            if score == EXACT_MATCH {
                break;
            }
        }

        let (best_id, confidence) = match best {
            Some(i) => (Some(scored[i].id.clone()), scored[i].score),
            None => (None, 0.0),
        };

        let result = MatchResult {
            keyword: keyword.to_string(),
            entity,
            candidates: scored,
            best_id,
            confidence,
        };

        if self.is_ambiguous(&result) {
            self.sink.save(&format!("closest_match-{entity}-{keyword}"), &result);
        }
        result
    }

    /// Below the confidence threshold: usable, but flagged for review.
    pub fn is_ambiguous(&self, result: &MatchResult) -> bool {
        result.confidence < self.threshold
    }
}
