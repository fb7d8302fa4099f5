use crate::analyzer::Analyzer;
use crate::error::Result;
use crate::index::DEFAULT_SHARD_SIZE;
use crate::signature::{SignatureSpace, DEFAULT_SIGNATURE_DIM};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Settings shared by vocabulary building, index building and matching.
/// Every field has a default, so `{}` is a complete configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Analyzer stage keys, applied in order.
    pub analyzers: Vec<String>,
    /// Fields concatenated into a document's text.
    pub fields: Vec<String>,
    pub signature_field: String,
    pub signature_dim: usize,
    pub shard_size: usize,
    pub top_k: usize,
    /// Tokens dropped from query vectors before matching.
    pub exclude_tokens: Vec<String>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            analyzers: Analyzer::DEFAULT_STAGES.iter().map(|s| s.key().to_string()).collect(),
            fields: vec!["title".into(), "content".into()],
            signature_field: "signature".into(),
            signature_dim: DEFAULT_SIGNATURE_DIM,
            shard_size: DEFAULT_SHARD_SIZE,
            top_k: 10,
            exclude_tokens: Vec::new(),
        }
    }
}

impl MatchConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Resolve the configured stage keys; an unknown key is a lookup failure.
    pub fn analyzer(&self) -> Result<Analyzer> {
        Analyzer::from_keys(&self.analyzers)
    }

    pub fn signature_space(&self) -> SignatureSpace {
        SignatureSpace::new(self.signature_dim)
    }
}
