//! Column type resolution.
//!
//! Reduces the per-value candidate lists of one column to a single winning
//! `(type, format)` pair.

use std::collections::HashMap;

use crate::guess::{Candidate, CellType};

/// The resolved type of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ResolvedType {
    #[serde(rename = "type")]
    pub ty: CellType,
    pub format: &'static str,
}

/// Resolves column types from accumulated candidates.
///
/// `confidence` scales the vote threshold: a candidate stays in the running
/// when its vote count is at least `max_count * confidence`. Among the
/// survivors the most specific type (lowest priority index) wins, which
/// makes the outcome deterministic for any tie.
#[derive(Debug, Clone, Copy)]
pub struct TypeResolver {
    confidence: f64,
}

impl Default for TypeResolver {
    fn default() -> Self {
        Self { confidence: 1.0 }
    }
}

impl TypeResolver {
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Resolve one column from the candidate lists of its values.
    ///
    /// Missing markers are excluded from the vote as soon as at least one
    /// concrete value exists; a column of only missing markers resolves to
    /// `Any`.
    pub fn resolve(&self, value_candidates: &[Vec<Candidate>]) -> ResolvedType {
        let has_concrete = value_candidates
            .iter()
            .any(|candidates| candidates.iter().any(|c| c.ty != CellType::Missing));
        if !has_concrete {
            return ResolvedType {
                ty: CellType::Any,
                format: "any",
            };
        }

        let mut votes: HashMap<Candidate, usize> = HashMap::new();
        for candidates in value_candidates {
            if candidates.iter().all(|c| c.ty == CellType::Missing) {
                continue;
            }
            for candidate in candidates {
                if candidate.ty == CellType::Missing {
                    continue;
                }
                *votes.entry(*candidate).or_insert(0) += 1;
            }
        }

        let max_count = votes.values().copied().max().unwrap_or(0);
        let threshold = (max_count as f64) * self.confidence;

        votes
            .into_iter()
            .filter(|(_, count)| (*count as f64) >= threshold)
            .map(|(candidate, _)| candidate)
            .min_by_key(|candidate| (candidate.ty.priority(), candidate.format))
            .map(|candidate| ResolvedType {
                ty: candidate.ty,
                format: candidate.format,
            })
            .unwrap_or(ResolvedType {
                ty: CellType::Any,
                format: "any",
            })
    }
}
