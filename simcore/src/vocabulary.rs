//! Token ↔ id mapping with document-frequency statistics.
//!
//! Ids are handed out in order of first appearance and stay stable until the
//! vocabulary is pruned. Pruning renumbers the survivors contiguously and bumps
//! the revision, so it belongs to vocabulary construction only: an index built
//! against one revision refuses to be queried with another.

use crate::error::{Error, Result};
use crate::persist::{load_bincode, save_bincode};
use crate::vector::SparseVector;
use crate::TokenId;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    token2id: HashMap<String, TokenId>,
    tokens: Vec<String>,
    dfs: Vec<u32>,
    num_docs: u64,
    num_pos: u64,
    num_nnz: u64,
    revision: u32,
}

#[derive(Serialize, Deserialize)]
struct VocabularyFile {
    version: u32,
    tokens: Vec<String>,
    dfs: Vec<u32>,
    num_docs: u64,
    num_pos: u64,
    num_nnz: u64,
    revision: u32,
}

impl Vocabulary {
    pub fn new() -> Self { Self::default() }

    /// Build a vocabulary from a sequence of token documents.
    pub fn from_documents<S: AsRef<str>>(docs: &[Vec<S>]) -> Self {
        let mut vocab = Self::new();
        for doc in docs {
            vocab.add_document(doc);
        }
        vocab
    }

    /// Register unseen tokens and count each distinct token once towards its
    /// document frequency.
    pub fn add_document<S: AsRef<str>>(&mut self, tokens: &[S]) {
        let mut seen: HashSet<TokenId> = HashSet::new();
        for token in tokens {
            let token = token.as_ref();
            let id = match self.token2id.get(token) {
                Some(&id) => id,
                None => {
                    let id = self.tokens.len() as TokenId;
                    self.token2id.insert(token.to_string(), id);
                    self.tokens.push(token.to_string());
                    self.dfs.push(0);
                    id
                }
            };
            if seen.insert(id) {
                self.dfs[id as usize] += 1;
            }
        }
        self.num_docs += 1;
        self.num_pos += tokens.len() as u64;
        self.num_nnz += seen.len() as u64;
    }

    /// Bag-of-words over the current vocabulary. Unknown tokens are dropped.
    pub fn doc2bow<S: AsRef<str>>(&self, tokens: &[S]) -> SparseVector {
        let mut counts: HashMap<TokenId, u32> = HashMap::new();
        for token in tokens {
            if let Some(&id) = self.token2id.get(token.as_ref()) {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        let mut entries: Vec<(TokenId, f32)> = counts.into_iter().map(|(id, c)| (id, c as f32)).collect();
        entries.sort_by_key(|(id, _)| *id);
        SparseVector::from_sorted(self.num_features(), entries)
    }

    pub fn len(&self) -> usize { self.tokens.len() }
    pub fn is_empty(&self) -> bool { self.tokens.is_empty() }

    /// Size of the bag-of-words feature space.
    pub fn num_features(&self) -> usize { self.tokens.len() }
    pub fn num_docs(&self) -> u64 { self.num_docs }
    pub fn num_pos(&self) -> u64 { self.num_pos }
    pub fn num_nnz(&self) -> u64 { self.num_nnz }
    pub fn revision(&self) -> u32 { self.revision }

    /// SHA-1 over the token table in id order. Equal fingerprints mean every
    /// token maps to the same id.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha1::new();
        for token in &self.tokens {
            hasher.update((token.len() as u64).to_le_bytes());
            hasher.update(token.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn id_of(&self, token: &str) -> Option<TokenId> {
        self.token2id.get(token).copied()
    }

    pub fn token_of(&self, id: TokenId) -> Result<&str> {
        self.tokens
            .get(id as usize)
            .map(String::as_str)
            .ok_or_else(|| Error::Lookup(format!("unknown vocabulary id {id}")))
    }

    pub fn doc_freq(&self, id: TokenId) -> Result<u32> {
        self.dfs
            .get(id as usize)
            .copied()
            .ok_or_else(|| Error::Lookup(format!("unknown vocabulary id {id}")))
    }

    /// Keep the `keep_n` ids with the highest document frequency; ties go to
    /// the earlier id.
    pub fn filter_extremes(&mut self, keep_n: usize) {
        let mut ranked: Vec<TokenId> = (0..self.tokens.len() as TokenId).collect();
        ranked.sort_by(|a, b| self.dfs[*b as usize].cmp(&self.dfs[*a as usize]).then(a.cmp(b)));
        ranked.truncate(keep_n);
        let keep: HashSet<TokenId> = ranked.into_iter().collect();
        self.retain(|id| keep.contains(&id));
    }

    /// Drop tokens seen in fewer than `no_below` documents or in more than the
    /// `no_above` fraction of all documents.
    pub fn filter_by_doc_freq(&mut self, no_below: u32, no_above: f64) {
        let max_df = (no_above * self.num_docs as f64) as u64;
        let dfs = self.dfs.clone();
        self.retain(|id| {
            let df = dfs[id as usize];
            df >= no_below && df as u64 <= max_df
        });
    }

    /// Remove the given ids. Every id must exist; nothing is removed otherwise.
    pub fn filter_tokens(&mut self, bad_ids: &[TokenId]) -> Result<()> {
        if let Some(bad) = bad_ids.iter().find(|id| **id as usize >= self.tokens.len()) {
            return Err(Error::Lookup(format!("unknown vocabulary id {bad}")));
        }
        let bad: HashSet<TokenId> = bad_ids.iter().copied().collect();
        self.retain(|id| !bad.contains(&id));
        Ok(())
    }

    /// Keep ids passing `keep`, renumbering survivors contiguously in their
    /// original relative order.
    fn retain<F: Fn(TokenId) -> bool>(&mut self, keep: F) {
        let before = self.tokens.len();
        let mut tokens = Vec::new();
        let mut dfs = Vec::new();
        for (id, (token, df)) in self.tokens.drain(..).zip(self.dfs.drain(..)).enumerate() {
            if keep(id as TokenId) {
                tokens.push(token);
                dfs.push(df);
            }
        }
        self.token2id = tokens.iter().enumerate().map(|(id, t)| (t.clone(), id as TokenId)).collect();
        self.tokens = tokens;
        self.dfs = dfs;
        self.revision += 1;
        tracing::debug!(before, after = self.tokens.len(), revision = self.revision, "pruned vocabulary");
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = VocabularyFile {
            version: FORMAT_VERSION,
            tokens: self.tokens.clone(),
            dfs: self.dfs.clone(),
            num_docs: self.num_docs,
            num_pos: self.num_pos,
            num_nnz: self.num_nnz,
            revision: self.revision,
        };
        save_bincode(path.as_ref(), &file)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file: VocabularyFile = load_bincode(path)?;
        if file.version != FORMAT_VERSION {
            return Err(Error::persistence(path, format!("unsupported vocabulary version {}", file.version)));
        }
        if file.tokens.len() != file.dfs.len() {
            return Err(Error::persistence(path, "token and frequency tables differ in length"));
        }
        let token2id: HashMap<String, TokenId> =
            file.tokens.iter().enumerate().map(|(id, t)| (t.clone(), id as TokenId)).collect();
        if token2id.len() != file.tokens.len() {
            return Err(Error::persistence(path, "duplicate tokens in vocabulary"));
        }
        Ok(Self {
            token2id,
            tokens: file.tokens,
            dfs: file.dfs,
            num_docs: file.num_docs,
            num_pos: file.num_pos,
            num_nnz: file.num_nnz,
            revision: file.revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat_vocab() -> Vocabulary {
        Vocabulary::from_documents(&[vec!["cat", "sat"], vec!["cat", "ran"]])
    }

    #[test]
    fn ids_follow_first_appearance() {
        let v = cat_vocab();
        assert_eq!(v.len(), 3);
        assert_eq!(v.id_of("cat"), Some(0));
        assert_eq!(v.id_of("sat"), Some(1));
        assert_eq!(v.id_of("ran"), Some(2));
        assert_eq!(v.num_docs(), 2);
        assert_eq!(v.doc_freq(0).unwrap(), 2);
        assert_eq!(v.num_nnz(), 4);
    }

    #[test]
    fn repeated_tokens_count_once_per_document() {
        let mut v = Vocabulary::new();
        v.add_document(&["a", "a", "b"]);
        assert_eq!(v.doc_freq(0).unwrap(), 1);
        assert_eq!(v.num_pos(), 3);
    }

    #[test]
    fn doc2bow_counts_known_tokens() {
        let v = cat_vocab();
        let bow = v.doc2bow(&["cat", "cat", "sat", "dog"]);
        assert_eq!(bow.entries(), &[(0, 2.0), (1, 1.0)]);
        assert_eq!(bow.dim(), 3);
    }

    #[test]
    fn empty_inputs_give_empty_vectors() {
        let empty: [&str; 0] = [];
        assert!(cat_vocab().doc2bow(&empty).is_empty());
        assert!(Vocabulary::new().doc2bow(&["cat"]).is_empty());
    }

    #[test]
    fn unknown_ids_are_lookup_failures() {
        let mut v = cat_vocab();
        assert!(matches!(v.token_of(9), Err(Error::Lookup(_))));
        assert!(matches!(v.filter_tokens(&[1, 9]), Err(Error::Lookup(_))));
        assert_eq!(v.len(), 3);
    }

    #[test]
    fn filter_tokens_renumbers_and_bumps_revision() {
        let mut v = cat_vocab();
        v.filter_tokens(&[1]).unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v.id_of("sat"), None);
        assert_eq!(v.id_of("ran"), Some(1));
        assert_eq!(v.token_of(1).unwrap(), "ran");
        assert_eq!(v.revision(), 1);
    }

    #[test]
    fn fingerprint_tracks_id_assignment() {
        let a = Vocabulary::from_documents(&[vec!["cat"], vec!["dog"]]);
        let b = Vocabulary::from_documents(&[vec!["dog"], vec!["cat"]]);
        assert_eq!(a.len(), b.len());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        let ab = Vocabulary::from_documents(&[vec!["ab"]]);
        let split = Vocabulary::from_documents(&[vec!["a", "b"]]);
        assert_ne!(ab.fingerprint(), split.fingerprint());
    }

    #[test]
    fn filter_extremes_keeps_most_frequent() {
        let mut v = Vocabulary::from_documents(&[vec!["a", "b"], vec!["b", "c"], vec!["b", "c"]]);
        v.filter_extremes(2);
        assert_eq!(v.id_of("b"), Some(0));
        assert_eq!(v.id_of("c"), Some(1));
        assert_eq!(v.id_of("a"), None);
    }

    #[test]
    fn filter_by_doc_freq_drops_rare_and_common() {
        let mut v = Vocabulary::from_documents(&[vec!["a", "b"], vec!["b", "c"], vec!["b", "c"], vec!["d"]]);
        v.filter_by_doc_freq(2, 0.6);
        assert_eq!(v.len(), 1);
        assert_eq!(v.id_of("c"), Some(0));
    }
}
