use crate::error::{Error, Result};
use crate::FeatureId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sparse vector over a feature space of `dim` positions.
///
/// Entries are kept sorted by feature id with no duplicates; an absent id
/// means weight 0. Bag-of-words vectors carry integer counts stored as
/// `f32`, signature vectors carry signed real weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    dim: usize,
    entries: Vec<(FeatureId, f32)>,
}

impl SparseVector {
    pub fn empty(dim: usize) -> Self {
        Self { dim, entries: Vec::new() }
    }

    /// Build from arbitrary pairs. Duplicate ids are summed, explicit zeros
    /// dropped, every id must fall inside `dim` and every weight must be
    /// finite.
    pub fn from_pairs<I>(dim: usize, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (FeatureId, f32)>,
    {
        let mut acc: BTreeMap<FeatureId, f32> = BTreeMap::new();
        for (id, weight) in pairs {
            if id as usize >= dim {
                return Err(Error::MalformedInput(format!(
                    "feature id {id} outside feature space of size {dim}"
                )));
            }
            if !weight.is_finite() {
                return Err(Error::MalformedInput(format!("feature {id} has non-finite weight {weight}")));
            }
            *acc.entry(id).or_insert(0.0) += weight;
        }
        if let Some((id, _)) = acc.iter().find(|(_, w)| !w.is_finite()) {
            return Err(Error::MalformedInput(format!("weights of feature {id} overflow")));
        }
        let entries = acc.into_iter().filter(|(_, w)| *w != 0.0).collect();
        Ok(Self { dim, entries })
    }

    /// Entries already sorted by id, unique, nonzero and inside `dim`.
    pub(crate) fn from_sorted(dim: usize, entries: Vec<(FeatureId, f32)>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        Self { dim, entries }
    }

    pub fn dim(&self) -> usize { self.dim }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn entries(&self) -> &[(FeatureId, f32)] { &self.entries }

    pub fn ids(&self) -> impl Iterator<Item = FeatureId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    pub fn get(&self, id: FeatureId) -> f32 {
        match self.entries.binary_search_by_key(&id, |(i, _)| *i) {
            Ok(pos) => self.entries[pos].1,
            Err(_) => 0.0,
        }
    }

    pub fn norm(&self) -> f64 {
        self.entries.iter().map(|(_, w)| (*w as f64) * (*w as f64)).sum::<f64>().sqrt()
    }

    /// Scale to unit length. A zero vector stays zero.
    pub fn normalized(&self) -> Self {
        let norm = self.norm();
        if norm == 0.0 {
            return self.clone();
        }
        let entries = self.entries.iter().map(|(id, w)| (*id, (*w as f64 / norm) as f32)).collect();
        Self { dim: self.dim, entries }
    }

    /// Element-wise sum, used to represent a group of documents as one vector.
    pub fn add(&self, other: &SparseVector) -> Result<Self> {
        check_same_space(self, other)?;
        Self::from_pairs(self.dim, self.entries.iter().chain(other.entries.iter()).copied())
    }

    /// Drop the given feature ids, keeping the feature space unchanged.
    pub fn without(&self, ids: &[FeatureId]) -> Self {
        let entries = self.entries.iter().filter(|(id, _)| !ids.contains(id)).copied().collect();
        Self { dim: self.dim, entries }
    }

    /// Inner product and whether any nonzero position overlaps.
    pub(crate) fn dot_overlap(&self, other: &SparseVector) -> (f64, bool) {
        let (mut i, mut j) = (0, 0);
        let mut dot = 0.0f64;
        let mut overlap = false;
        while i < self.entries.len() && j < other.entries.len() {
            let (a_id, a_w) = self.entries[i];
            let (b_id, b_w) = other.entries[j];
            if a_id < b_id {
                i += 1;
            } else if a_id > b_id {
                j += 1;
            } else {
                overlap = true;
                dot += a_w as f64 * b_w as f64;
                i += 1;
                j += 1;
            }
        }
        (dot, overlap)
    }

    pub fn dot(&self, other: &SparseVector) -> Result<f64> {
        check_same_space(self, other)?;
        Ok(self.dot_overlap(other).0)
    }
}

fn check_same_space(a: &SparseVector, b: &SparseVector) -> Result<()> {
    if a.dim != b.dim {
        return Err(Error::MalformedInput(format!(
            "feature space mismatch: {} vs {}",
            a.dim, b.dim
        )));
    }
    Ok(())
}

/// Cosine similarity in `[-1, 1]`.
///
/// Exactly 0 when the vectors share no nonzero position (which includes
/// either vector being empty). Vectors over different feature spaces are
/// rejected.
pub fn cosine_similarity(a: &SparseVector, b: &SparseVector) -> Result<f64> {
    check_same_space(a, b)?;
    let (dot, overlap) = a.dot_overlap(b);
    if !overlap {
        return Ok(0.0);
    }
    let denom = a.norm() * b.norm();
    if denom == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / denom).clamp(-1.0, 1.0))
}
