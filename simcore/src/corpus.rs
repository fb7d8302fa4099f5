//! Document records and the sources that yield them.
//!
//! A source is consumed once, in order. Sources that fetch by id report a
//! missing record as [`Error::DocumentNotFound`] for that item alone; the
//! drivers log and skip it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// One external document: a stable id plus named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), fields: Map::new() }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), Value::String(value.into()));
        self
    }

    /// String value of a field; absent, null and non-string fields read as
    /// `None`.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Space-joined text of the named fields that are present, or `None` when
    /// none are.
    pub fn text<S: AsRef<str>>(&self, names: &[S]) -> Option<String> {
        let parts: Vec<&str> = names.iter().filter_map(|n| self.field(n.as_ref())).collect();
        if parts.is_empty() { None } else { Some(parts.join(" ")) }
    }
}

/// A finite, single-pass sequence of document records.
pub trait CorpusSource {
    type Documents: Iterator<Item = Result<DocumentRecord>>;

    fn documents(self) -> Self::Documents;
}

impl CorpusSource for Vec<DocumentRecord> {
    type Documents = std::iter::Map<std::vec::IntoIter<DocumentRecord>, fn(DocumentRecord) -> Result<DocumentRecord>>;

    fn documents(self) -> Self::Documents {
        self.into_iter().map(Ok as fn(DocumentRecord) -> Result<DocumentRecord>)
    }
}

/// Records stored one JSON object per line. Blank lines are ignored.
pub struct JsonlCorpus {
    lines: Lines<BufReader<File>>,
}

impl JsonlCorpus {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let f = File::open(path.as_ref())?;
        Ok(Self { lines: BufReader::new(f).lines() })
    }
}

impl Iterator for JsonlCorpus {
    type Item = Result<DocumentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(Error::Io(e))),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(Error::from));
        }
    }
}

impl CorpusSource for JsonlCorpus {
    type Documents = Self;

    fn documents(self) -> Self::Documents { self }
}

/// Fetch records one id at a time through `fetch`, which answers `None` for an
/// id it does not know.
pub struct IdListCorpus<F> {
    ids: std::vec::IntoIter<String>,
    fetch: F,
}

impl<F> IdListCorpus<F>
where
    F: FnMut(&str) -> Result<Option<DocumentRecord>>,
{
    pub fn new(ids: Vec<String>, fetch: F) -> Self {
        Self { ids: ids.into_iter(), fetch }
    }
}

impl<F> Iterator for IdListCorpus<F>
where
    F: FnMut(&str) -> Result<Option<DocumentRecord>>,
{
    type Item = Result<DocumentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        Some(match (self.fetch)(&id) {
            Ok(Some(doc)) => Ok(doc),
            Ok(None) => Err(Error::DocumentNotFound(id)),
            Err(e) => Err(e),
        })
    }
}

impl<F> CorpusSource for IdListCorpus<F>
where
    F: FnMut(&str) -> Result<Option<DocumentRecord>>,
{
    type Documents = Self;

    fn documents(self) -> Self::Documents { self }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn text_joins_present_fields_in_order() {
        let doc = DocumentRecord::new("u1").with_field("title", "Hello").with_field("content", "world");
        assert_eq!(doc.text(&["title", "content"]).unwrap(), "Hello world");
        assert_eq!(doc.text(&["content", "missing"]).unwrap(), "world");
        assert!(doc.text(&["description", "name"]).is_none());
    }

    #[test]
    fn null_fields_are_absent() {
        let doc: DocumentRecord = serde_json::from_str(r#"{"id":"u1","title":null,"content":"x"}"#).unwrap();
        assert_eq!(doc.field("title"), None);
        assert_eq!(doc.text(&["title", "content"]).unwrap(), "x");
    }

    #[test]
    fn jsonl_skips_blank_lines() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"{{"id":"a","title":"A"}}"#).unwrap();
        writeln!(f).unwrap();
        writeln!(f, r#"{{"id":"b","name":"B"}}"#).unwrap();
        let ids: Vec<String> = JsonlCorpus::open(f.path()).unwrap().documents().map(|d| d.unwrap().id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn id_list_reports_missing_documents_individually() {
        let store: HashMap<&str, DocumentRecord> = [("a", DocumentRecord::new("a"))].into_iter().collect();
        let corpus = IdListCorpus::new(vec!["a".into(), "zz".into()], |id: &str| Ok(store.get(id).cloned()));
        let items: Vec<Result<DocumentRecord>> = corpus.documents().collect();
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(Error::DocumentNotFound(ref id)) if id == "zz"));
    }
}
