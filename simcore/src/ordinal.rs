use crate::error::{Error, Result};
use crate::persist::{load_json, save_json};
use crate::Ordinal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// External document id for every index ordinal, recorded in lockstep with the
/// index build. Persisted as `{"ids": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdinalMap {
    ids: Vec<String>,
}

impl OrdinalMap {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, id: impl Into<String>) -> Ordinal {
        self.ids.push(id.into());
        (self.ids.len() - 1) as Ordinal
    }

    pub fn get(&self, ordinal: Ordinal) -> Result<&str> {
        self.ids
            .get(ordinal as usize)
            .map(String::as_str)
            .ok_or_else(|| Error::Lookup(format!("no document for ordinal {ordinal}")))
    }

    pub fn len(&self) -> usize { self.ids.len() }
    pub fn is_empty(&self) -> bool { self.ids.is_empty() }
    pub fn ids(&self) -> &[String] { &self.ids }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_json(path.as_ref(), self)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_json(path.as_ref())
    }
}

impl FromIterator<String> for OrdinalMap {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self { ids: iter.into_iter().collect() }
    }
}
