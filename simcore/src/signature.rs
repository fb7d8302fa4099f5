//! Precomputed numeric signatures: flat `id weight id weight ...` streams
//! parsed into sparse vectors over a fixed feature space.

use crate::error::{Error, Result};
use crate::vector::{cosine_similarity, SparseVector};
use crate::FeatureId;
use serde::Serialize;

/// Feature-space size large enough that signature ids never collide.
pub const DEFAULT_SIGNATURE_DIM: usize = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureSpace {
    dim: usize,
}

impl Default for SignatureSpace {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNATURE_DIM)
    }
}

impl SignatureSpace {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn dim(&self) -> usize { self.dim }

    /// Parse a whitespace or tab delimited signature. An empty string yields an
    /// empty vector; an odd number of fields or unparsable numbers are
    /// rejected. Repeated ids accumulate.
    pub fn parse(&self, signature: &str) -> Result<SparseVector> {
        let fields: Vec<&str> = signature.split_whitespace().collect();
        if fields.len() % 2 != 0 {
            return Err(Error::MalformedInput(format!(
                "signature has {} fields, expected id/weight pairs",
                fields.len()
            )));
        }
        let mut pairs = Vec::with_capacity(fields.len() / 2);
        for pair in fields.chunks_exact(2) {
            let id: FeatureId = pair[0]
                .parse()
                .map_err(|_| Error::MalformedInput(format!("invalid signature feature id {:?}", pair[0])))?;
            let weight: f32 = pair[1]
                .parse()
                .ok()
                .filter(|w: &f32| w.is_finite())
                .ok_or_else(|| Error::MalformedInput(format!("invalid signature weight {:?}", pair[1])))?;
            pairs.push((id, weight));
        }
        SparseVector::from_pairs(self.dim, pairs)
    }

    pub fn similarity(&self, a: &str, b: &str) -> Result<f64> {
        cosine_similarity(&self.parse(a)?, &self.parse(b)?)
    }

    /// Score candidates in the order given, reporting the first candidate and
    /// the best one. Every candidate takes a rank position; those with a
    /// missing or unparsable signature are skipped.
    pub fn rank<'a, I>(&self, query: &str, candidates: I) -> Result<SignatureRanking>
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let query = self.parse(query)?;
        let mut ranking = SignatureRanking::default();
        for (rank, (id, signature)) in candidates.into_iter().enumerate() {
            let Some(signature) = signature else {
                tracing::debug!(id, "skipping candidate without signature");
                continue;
            };
            let candidate = match self.parse(signature) {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(id, %err, "skipping candidate with malformed signature");
                    continue;
                }
            };
            let hit = SignatureHit { id: id.to_string(), similarity: cosine_similarity(&query, &candidate)?, rank: rank + 1 };
            if ranking.first.is_none() {
                ranking.first = Some(hit.clone());
            }
            match &ranking.best {
                Some(best) if best.similarity >= hit.similarity => {}
                _ => ranking.best = Some(hit),
            }
        }
        Ok(ranking)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignatureHit {
    pub id: String,
    pub similarity: f64,
    /// 1-based position among the candidates as given.
    pub rank: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignatureRanking {
    pub first: Option<SignatureHit>,
    pub best: Option<SignatureHit>,
}
