//! Match documents to their most similar counterpart in a reference corpus
//! using bag-of-words vectors and cosine similarity.
//!
//! Raw text goes through the [`analyzer::Analyzer`] pipeline, is mapped to a
//! sparse vector by a [`vocabulary::Vocabulary`], and is queried against a
//! sharded [`index::SimilarityIndex`]. Precomputed numeric signatures are
//! scored separately through [`signature::SignatureSpace`].

pub mod analyzer;
pub mod config;
pub mod corpus;
pub mod error;
pub mod index;
pub mod ordinal;
pub mod persist;
pub mod pipeline;
pub mod signature;
pub mod tokenizer;
pub mod vector;
pub mod vocabulary;

/// Position in a sparse feature space.
pub type FeatureId = u32;
/// Vocabulary ids double as bag-of-words feature ids.
pub type TokenId = FeatureId;
/// Position of a vector in the order it was added to an index.
pub type Ordinal = u32;

pub use analyzer::{Analyzer, Stage, NUMBER_TOKEN};
pub use config::MatchConfig;
pub use corpus::{CorpusSource, DocumentRecord};
pub use error::{Error, Result};
pub use index::{Hit, IndexBuilder, IndexOptions, SimilarityIndex};
pub use ordinal::OrdinalMap;
pub use pipeline::{Match, MatchReport, Matcher};
pub use signature::SignatureSpace;
pub use vector::{cosine_similarity, SparseVector};
pub use vocabulary::Vocabulary;
