//! Exact top-K cosine similarity over bag-of-words vectors.
//!
//! An index is built once by streaming vectors through an [`IndexBuilder`],
//! which spills fixed-size shards to disk as it goes, and is read-only after
//! [`IndexBuilder::finish`]. Each vector's position in the stream is its
//! ordinal; mapping ordinals back to documents is the caller's job (see
//! [`crate::ordinal::OrdinalMap`]).

use crate::error::{Error, Result};
use crate::persist::{load_bincode, load_json, save_bincode, save_json};
use crate::vector::SparseVector;
use crate::Ordinal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const FORMAT_VERSION: u32 = 1;
const MANIFEST: &str = "manifest.json";
pub const DEFAULT_SHARD_SIZE: usize = 32_768;
/// Similarities with a smaller magnitude are not reported as matches.
const MIN_SIMILARITY: f32 = 1e-8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    pub num_features: usize,
    pub shard_size: usize,
    /// Revision of the vocabulary the vectors were built with, if any.
    pub vocabulary_revision: Option<u32>,
    /// Token table fingerprint of that vocabulary.
    pub vocabulary_fingerprint: Option<String>,
}

impl IndexOptions {
    pub fn new(num_features: usize) -> Self {
        Self { num_features, shard_size: DEFAULT_SHARD_SIZE, vocabulary_revision: None, vocabulary_fingerprint: None }
    }

    pub fn shard_size(mut self, shard_size: usize) -> Self {
        self.shard_size = shard_size;
        self
    }

    pub fn vocabulary_revision(mut self, revision: u32) -> Self {
        self.vocabulary_revision = Some(revision);
        self
    }

    pub fn vocabulary_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.vocabulary_fingerprint = Some(fingerprint.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub num_features: usize,
    pub shard_size: usize,
    pub num_vectors: u32,
    pub shards: Vec<ShardEntry>,
    pub vocabulary_revision: Option<u32>,
    #[serde(default)]
    pub vocabulary_fingerprint: Option<String>,
    pub created_at: String,
}

/// Shard file names are relative to the directory holding them, so moving
/// the whole index directory keeps it loadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardEntry {
    pub file: String,
    pub first_ordinal: Ordinal,
    pub len: u32,
}

/// Unit-normalized vectors for a contiguous ordinal range.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Shard {
    first_ordinal: Ordinal,
    vectors: Vec<SparseVector>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hit {
    pub ordinal: Ordinal,
    pub similarity: f32,
}

fn shard_file_name(n: usize) -> String {
    format!("shard.{n}.bin")
}

fn unit_dot(a: &SparseVector, b: &SparseVector) -> f32 {
    (a.dot_overlap(b).0 as f32).clamp(-1.0, 1.0)
}

/// Accepts vectors for a new index. Dropping a builder without calling
/// [`finish`](Self::finish) leaves shard files but no manifest; such a
/// directory never loads and should be discarded.
pub struct IndexBuilder {
    dir: PathBuf,
    options: IndexOptions,
    shards: Vec<ShardEntry>,
    pending: Vec<SparseVector>,
    next_ordinal: Ordinal,
}

impl IndexBuilder {
    pub fn create(dir: impl AsRef<Path>, options: IndexOptions) -> Result<Self> {
        let dir = dir.as_ref();
        if options.shard_size == 0 {
            return Err(Error::MalformedInput("shard size must be positive".into()));
        }
        fs::create_dir_all(dir)?;
        if dir.join(MANIFEST).exists() {
            return Err(Error::InvalidState(format!(
                "an index is already published in {}; build into a fresh directory",
                dir.display()
            )));
        }
        Ok(Self { dir: dir.to_path_buf(), options, shards: Vec::new(), pending: Vec::new(), next_ordinal: 0 })
    }

    pub fn len(&self) -> usize { self.next_ordinal as usize }
    pub fn is_empty(&self) -> bool { self.next_ordinal == 0 }

    /// Append one vector and return its ordinal.
    pub fn add(&mut self, vector: &SparseVector) -> Result<Ordinal> {
        if vector.dim() != self.options.num_features {
            return Err(Error::MalformedInput(format!(
                "vector over {} features added to an index over {}",
                vector.dim(),
                self.options.num_features
            )));
        }
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.pending.push(vector.normalized());
        if self.pending.len() >= self.options.shard_size {
            self.flush()?;
        }
        Ok(ordinal)
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let len = self.pending.len() as u32;
        let first_ordinal = self.next_ordinal - len;
        let file = shard_file_name(self.shards.len());
        let shard = Shard { first_ordinal, vectors: std::mem::take(&mut self.pending) };
        save_bincode(&self.dir.join(&file), &shard)?;
        tracing::info!(shard = %file, first_ordinal, len, "flushed index shard");
        self.shards.push(ShardEntry { file, first_ordinal, len });
        Ok(())
    }

    /// Flush the last shard, write the manifest and reopen the index
    /// read-only.
    pub fn finish(mut self) -> Result<SimilarityIndex> {
        self.flush()?;
        let manifest = Manifest {
            version: FORMAT_VERSION,
            num_features: self.options.num_features,
            shard_size: self.options.shard_size,
            num_vectors: self.next_ordinal,
            shards: std::mem::take(&mut self.shards),
            vocabulary_revision: self.options.vocabulary_revision,
            vocabulary_fingerprint: self.options.vocabulary_fingerprint.take(),
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "".into()),
        };
        save_json(&self.dir.join(MANIFEST), &manifest)?;
        SimilarityIndex::load(&self.dir)
    }
}

/// A closed, queryable index.
#[derive(Debug)]
pub struct SimilarityIndex {
    dir: PathBuf,
    manifest: Manifest,
    shards: Vec<Shard>,
}

impl SimilarityIndex {
    /// Drain `vectors` once, in order, into a new index under `dir`.
    pub fn build<I>(vectors: I, dir: impl AsRef<Path>, options: IndexOptions) -> Result<Self>
    where
        I: IntoIterator<Item = SparseVector>,
    {
        let mut builder = IndexBuilder::create(dir, options)?;
        for vector in vectors {
            builder.add(&vector)?;
        }
        builder.finish()
    }

    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        Self::load_relocated(dir, dir)
    }

    /// Load a manifest from `manifest_dir` with its shards read from
    /// `shard_dir`. Every shard is checked against the manifest before the
    /// index is returned.
    pub fn load_relocated(manifest_dir: impl AsRef<Path>, shard_dir: impl AsRef<Path>) -> Result<Self> {
        let manifest_path = manifest_dir.as_ref().join(MANIFEST);
        let shard_dir = shard_dir.as_ref();
        let manifest: Manifest = load_json(&manifest_path)?;
        if manifest.version != FORMAT_VERSION {
            return Err(Error::persistence(&manifest_path, format!("unsupported index version {}", manifest.version)));
        }

        let paths: Vec<PathBuf> = manifest.shards.iter().map(|e| shard_dir.join(&e.file)).collect();
        if let Some(missing) = paths.iter().find(|p| !p.is_file()) {
            return Err(Error::persistence(missing, "index shard missing; shards moved without relocation"));
        }

        let mut shards = Vec::with_capacity(paths.len());
        let mut expected: Ordinal = 0;
        for (entry, path) in manifest.shards.iter().zip(&paths) {
            let shard: Shard = load_bincode(path)?;
            if entry.first_ordinal != expected
                || shard.first_ordinal != entry.first_ordinal
                || shard.vectors.len() != entry.len as usize
            {
                return Err(Error::persistence(path, "shard does not match manifest"));
            }
            if shard.vectors.iter().any(|v| v.dim() != manifest.num_features) {
                return Err(Error::persistence(path, "shard vector outside the index feature space"));
            }
            expected += entry.len;
            shards.push(shard);
        }
        if expected != manifest.num_vectors {
            return Err(Error::persistence(&manifest_path, "manifest vector count does not match its shards"));
        }

        tracing::info!(dir = %shard_dir.display(), vectors = manifest.num_vectors, shards = shards.len(), "loaded similarity index");
        Ok(Self { dir: shard_dir.to_path_buf(), manifest, shards })
    }

    /// Write the manifest and every shard into `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        for (entry, shard) in self.manifest.shards.iter().zip(&self.shards) {
            save_bincode(&dir.join(&entry.file), shard)?;
        }
        save_json(&dir.join(MANIFEST), &self.manifest)
    }

    /// Point at the directory the shard files were renamed into.
    pub(crate) fn moved_to(mut self, dir: &Path) -> Self {
        self.dir = dir.to_path_buf();
        self
    }

    pub fn dir(&self) -> &Path { &self.dir }
    pub fn manifest(&self) -> &Manifest { &self.manifest }
    pub fn num_features(&self) -> usize { self.manifest.num_features }
    pub fn len(&self) -> usize { self.manifest.num_vectors as usize }
    pub fn is_empty(&self) -> bool { self.manifest.num_vectors == 0 }

    fn check_query(&self, query: &SparseVector) -> Result<()> {
        if query.dim() != self.manifest.num_features {
            return Err(Error::MalformedInput(format!(
                "query over {} features against an index over {}",
                query.dim(),
                self.manifest.num_features
            )));
        }
        Ok(())
    }

    /// Cosine similarity of `query` against every indexed vector, by ordinal.
    /// An empty query scores 0 everywhere.
    pub fn similarities(&self, query: &SparseVector) -> Result<Vec<f32>> {
        self.check_query(query)?;
        let query = query.normalized();
        Ok(self.shards.iter().flat_map(|s| s.vectors.iter()).map(|v| unit_dot(&query, v)).collect())
    }

    /// The `top_k` most similar vectors, by descending similarity and then by
    /// ordinal. Vectors with zero similarity are not matches.
    pub fn query(&self, query: &SparseVector, top_k: usize) -> Result<Vec<Hit>> {
        self.check_query(query)?;
        if query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let mut hits: Vec<Hit> = self
            .similarities(query)?
            .into_iter()
            .enumerate()
            .filter(|(_, s)| s.abs() >= MIN_SIMILARITY)
            .map(|(ordinal, similarity)| Hit { ordinal: ordinal as Ordinal, similarity })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then(a.ordinal.cmp(&b.ordinal)));
        hits.truncate(top_k);
        Ok(hits)
    }
}
