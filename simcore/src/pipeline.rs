//! Corpus-level drivers: text → tokens → bag-of-words, vocabulary and index
//! builds over a [`CorpusSource`], and matching against a published index.

use crate::analyzer::Analyzer;
use crate::config::MatchConfig;
use crate::corpus::{CorpusSource, DocumentRecord};
use crate::error::{Error, Result};
use crate::index::{IndexBuilder, IndexOptions, SimilarityIndex};
use crate::ordinal::OrdinalMap;
use crate::persist::{ordinals_in, publish_dir, staging_dir_for, ArtifactPaths};
use crate::signature::{SignatureRanking, SignatureSpace};
use crate::vector::SparseVector;
use crate::vocabulary::Vocabulary;
use crate::{Ordinal, TokenId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Analyzed tokens of the named fields, or `None` when the record has none of
/// them or nothing survives analysis.
pub fn document_tokens<S: AsRef<str>>(analyzer: &Analyzer, record: &DocumentRecord, fields: &[S]) -> Option<Vec<String>> {
    let text = record.text(fields)?;
    let tokens = analyzer.analyze_text(&text);
    if tokens.is_empty() { None } else { Some(tokens) }
}

/// Bag-of-words of the named fields, or `None` for no signal.
pub fn document_bow<S: AsRef<str>>(
    analyzer: &Analyzer,
    vocabulary: &Vocabulary,
    record: &DocumentRecord,
    fields: &[S],
) -> Option<SparseVector> {
    let tokens = document_tokens(analyzer, record, fields)?;
    let bow = vocabulary.doc2bow(&tokens);
    if bow.is_empty() { None } else { Some(bow) }
}

/// Unwrap one source item; a document the source could not find is logged
/// and skipped, anything else aborts.
fn present(item: Result<DocumentRecord>) -> Result<Option<DocumentRecord>> {
    match item {
        Ok(doc) => Ok(Some(doc)),
        Err(Error::DocumentNotFound(id)) => {
            tracing::warn!(%id, "document not found, skipping");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Build one vocabulary per partition. Each present field of a record is
/// added as its own document; records `partition` maps to `None` are
/// skipped.
pub fn build_vocabularies<C, P, S>(
    source: C,
    analyzer: &Analyzer,
    fields: &[S],
    mut partition: P,
) -> Result<BTreeMap<String, Vocabulary>>
where
    C: CorpusSource,
    P: FnMut(&DocumentRecord) -> Option<String>,
    S: AsRef<str>,
{
    let mut vocabularies: BTreeMap<String, Vocabulary> = BTreeMap::new();
    for (seen, item) in source.documents().enumerate() {
        let Some(doc) = present(item)? else { continue };
        let Some(key) = partition(&doc) else {
            tracing::debug!(id = %doc.id, "no partition for document, skipping");
            continue;
        };
        tracing::debug!(seen, id = %doc.id, partition = %key, "adding document to vocabulary");
        let vocabulary = vocabularies.entry(key).or_default();
        for field in fields {
            if let Some(value) = doc.field(field.as_ref()) {
                vocabulary.add_document(&analyzer.analyze_text(value));
            }
        }
    }
    for (key, vocabulary) in &vocabularies {
        tracing::info!(partition = %key, tokens = vocabulary.len(), docs = vocabulary.num_docs(), "built vocabulary");
    }
    Ok(vocabularies)
}

pub fn build_vocabulary<C, S>(source: C, analyzer: &Analyzer, fields: &[S]) -> Result<Vocabulary>
where
    C: CorpusSource,
    S: AsRef<str>,
{
    let mut all = build_vocabularies(source, analyzer, fields, |_| Some(String::new()))?;
    Ok(all.remove("").unwrap_or_default())
}

/// Write `(id, vector)` entries into a staged index plus ordinal map and
/// publish both under `index_dir` once complete. On error nothing is
/// published and any previous artifact set stays in place.
fn write_index<I>(entries: I, vocabulary: &Vocabulary, index_dir: &Path, shard_size: usize) -> Result<(SimilarityIndex, OrdinalMap)>
where
    I: IntoIterator<Item = Result<(String, SparseVector)>>,
{
    let staging = staging_dir_for(index_dir)?;
    let options = IndexOptions::new(vocabulary.num_features())
        .shard_size(shard_size)
        .vocabulary_revision(vocabulary.revision())
        .vocabulary_fingerprint(vocabulary.fingerprint());
    let mut builder = IndexBuilder::create(staging.path(), options)?;
    let mut ordinals = OrdinalMap::new();

    for entry in entries {
        let (id, vector) = entry?;
        let ordinal = builder.add(&vector)?;
        tracing::debug!(ordinal, %id, "indexed vector");
        ordinals.push(id);
    }

    let index = builder.finish()?;
    ordinals.save(ordinals_in(staging.path()))?;
    publish_dir(staging, index_dir)?;
    Ok((index.moved_to(index_dir), ordinals))
}

/// Stream `source` into a new index under `index_dir`, recording each
/// indexed document id at its ordinal. Documents with no signal are skipped.
pub fn build_index<C, S>(
    source: C,
    analyzer: &Analyzer,
    vocabulary: &Vocabulary,
    fields: &[S],
    index_dir: &Path,
    shard_size: usize,
) -> Result<(SimilarityIndex, OrdinalMap)>
where
    C: CorpusSource,
    S: AsRef<str>,
{
    let mut skipped = 0usize;
    let entries = source.documents().filter_map(|item| match present(item) {
        Ok(Some(doc)) => match document_bow(analyzer, vocabulary, &doc, fields) {
            Some(bow) => Some(Ok((doc.id, bow))),
            None => {
                tracing::debug!(id = %doc.id, "no signal, skipping");
                skipped += 1;
                None
            }
        },
        Ok(None) => None,
        Err(e) => Some(Err(e)),
    });
    let (index, ordinals) = write_index(entries, vocabulary, index_dir, shard_size)?;
    tracing::info!(indexed = ordinals.len(), skipped, dir = %index_dir.display(), "built similarity index");
    Ok((index, ordinals))
}

/// Like [`build_index`], but every distinct value of `group_field` becomes one
/// indexed vector: the sum of the bag-of-words of its records. Ordinals map to
/// group values in order of first appearance. Records without the group field
/// or without signal are skipped.
pub fn build_grouped_index<C, S>(
    source: C,
    analyzer: &Analyzer,
    vocabulary: &Vocabulary,
    fields: &[S],
    group_field: &str,
    index_dir: &Path,
    shard_size: usize,
) -> Result<(SimilarityIndex, OrdinalMap)>
where
    C: CorpusSource,
    S: AsRef<str>,
{
    let mut order: Vec<String> = Vec::new();
    let mut sums: HashMap<String, SparseVector> = HashMap::new();
    let mut members = 0usize;

    for item in source.documents() {
        let Some(doc) = present(item)? else { continue };
        let Some(group) = doc.field(group_field) else {
            tracing::debug!(id = %doc.id, field = group_field, "no group, skipping");
            continue;
        };
        let Some(bow) = document_bow(analyzer, vocabulary, &doc, fields) else {
            tracing::debug!(id = %doc.id, "no signal, skipping");
            continue;
        };
        members += 1;
        match sums.get_mut(group) {
            Some(sum) => *sum = sum.add(&bow)?,
            None => {
                order.push(group.to_string());
                sums.insert(group.to_string(), bow);
            }
        }
    }

    let entries = order.into_iter().filter_map(|group| sums.remove(&group).map(|sum| Ok((group, sum))));
    let (index, ordinals) = write_index(entries, vocabulary, index_dir, shard_size)?;
    tracing::info!(groups = ordinals.len(), members, dir = %index_dir.display(), "built grouped similarity index");
    Ok((index, ordinals))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub id: String,
    pub ordinal: Ordinal,
    pub score: f32,
}

/// Best match of one query document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchReport {
    pub query_id: String,
    pub matched_id: String,
    pub score: f32,
}

/// A vocabulary, index and ordinal map that belong together, ready to
/// answer queries.
pub struct Matcher {
    analyzer: Analyzer,
    vocabulary: Vocabulary,
    index: SimilarityIndex,
    ordinals: OrdinalMap,
    fields: Vec<String>,
    excluded: Vec<TokenId>,
    top_k: usize,
}

impl Matcher {
    pub fn new(
        analyzer: Analyzer,
        vocabulary: Vocabulary,
        index: SimilarityIndex,
        ordinals: OrdinalMap,
        config: &MatchConfig,
    ) -> Result<Self> {
        if index.num_features() != vocabulary.num_features() {
            return Err(Error::persistence(
                index.dir(),
                format!(
                    "index covers {} features but the vocabulary has {}",
                    index.num_features(),
                    vocabulary.num_features()
                ),
            ));
        }
        if let Some(revision) = index.manifest().vocabulary_revision {
            if revision != vocabulary.revision() {
                return Err(Error::persistence(
                    index.dir(),
                    format!(
                        "index built against vocabulary revision {revision}, loaded revision {}",
                        vocabulary.revision()
                    ),
                ));
            }
        }
        if let Some(fingerprint) = &index.manifest().vocabulary_fingerprint {
            if *fingerprint != vocabulary.fingerprint() {
                return Err(Error::persistence(
                    index.dir(),
                    "index was built against a different vocabulary; rebuild the index",
                ));
            }
        }
        if ordinals.len() != index.len() {
            return Err(Error::persistence(
                index.dir(),
                format!("{} ordinal ids for {} indexed vectors", ordinals.len(), index.len()),
            ));
        }
        let excluded = config.exclude_tokens.iter().filter_map(|t| vocabulary.id_of(t)).collect();
        Ok(Self { analyzer, vocabulary, index, ordinals, fields: config.fields.clone(), excluded, top_k: config.top_k })
    }

    /// Load the artifact set published under `key`.
    pub fn open(paths: &ArtifactPaths, key: &str, config: &MatchConfig) -> Result<Self> {
        let analyzer = config.analyzer()?;
        let vocabulary = Vocabulary::load(paths.vocabulary(key))?;
        let index = SimilarityIndex::load(paths.index_dir(key))?;
        let ordinals = OrdinalMap::load(paths.ordinals(key))?;
        Self::new(analyzer, vocabulary, index, ordinals, config)
    }

    pub fn index(&self) -> &SimilarityIndex { &self.index }
    pub fn vocabulary(&self) -> &Vocabulary { &self.vocabulary }

    /// Query vector for a record, or `None` for no signal.
    pub fn vectorize(&self, record: &DocumentRecord) -> Option<SparseVector> {
        let bow = document_bow(&self.analyzer, &self.vocabulary, record, &self.fields)?.without(&self.excluded);
        if bow.is_empty() { None } else { Some(bow) }
    }

    pub fn matches_vector(&self, vector: &SparseVector) -> Result<Vec<Match>> {
        self.index
            .query(vector, self.top_k)?
            .into_iter()
            .map(|hit| Ok(Match { id: self.ordinals.get(hit.ordinal)?.to_string(), ordinal: hit.ordinal, score: hit.similarity }))
            .collect()
    }

    /// Up to `top_k` matches; empty when the record carries no signal.
    pub fn matches(&self, record: &DocumentRecord) -> Result<Vec<Match>> {
        match self.vectorize(record) {
            Some(vector) => self.matches_vector(&vector),
            None => Ok(Vec::new()),
        }
    }

    pub fn best_match(&self, record: &DocumentRecord) -> Result<Option<Match>> {
        Ok(self.matches(record)?.into_iter().next())
    }

    /// Every match of every query document, in source order. Queries without
    /// matches are left out.
    pub fn all_matches<C: CorpusSource>(&self, source: C) -> Result<Vec<(String, Vec<Match>)>> {
        let mut out = Vec::new();
        for item in source.documents() {
            let Some(doc) = present(item)? else { continue };
            let matches = self.matches(&doc)?;
            if !matches.is_empty() {
                out.push((doc.id, matches));
            }
        }
        Ok(out)
    }

    /// Best match for every query document with one, by descending score.
    pub fn match_corpus<C: CorpusSource>(&self, source: C) -> Result<Vec<MatchReport>> {
        let mut reports = Vec::new();
        for item in source.documents() {
            let Some(doc) = present(item)? else { continue };
            match self.best_match(&doc)? {
                Some(best) => reports.push(MatchReport { query_id: doc.id, matched_id: best.id, score: best.score }),
                None => tracing::debug!(id = %doc.id, "no match"),
            }
        }
        reports.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(reports)
    }
}

/// Rank `candidates` against `query` by the cosine similarity of their
/// signature fields. Every candidate holds a rank; those without a usable
/// signature are skipped. `None` when the query has no signature.
pub fn rank_by_signature(
    space: &SignatureSpace,
    field: &str,
    query: &DocumentRecord,
    candidates: &[DocumentRecord],
) -> Result<Option<SignatureRanking>> {
    let Some(signature) = query.field(field) else { return Ok(None) };
    let pairs = candidates.iter().map(|c| (c.id.as_str(), c.field(field)));
    space.rank(signature, pairs).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: &str, title: &str, content: &str) -> DocumentRecord {
        DocumentRecord::new(id).with_field("title", title).with_field("content", content)
    }

    #[test]
    fn records_without_fields_have_no_signal() {
        let analyzer = Analyzer::default();
        let vocab = Vocabulary::from_documents(&[vec!["cat"]]);
        let doc = DocumentRecord::new("x").with_field("name", "cat");
        assert!(document_bow(&analyzer, &vocab, &doc, &["title", "content"]).is_none());
        let stop_only = page("y", "the", "of and");
        assert!(document_tokens(&analyzer, &stop_only, &["title", "content"]).is_none());
    }

    #[test]
    fn vocabularies_partition_and_count_fields_separately() {
        let analyzer = Analyzer::default();
        let docs = vec![page("a", "Cats", "cats sleep"), page("b", "Dogs", "dogs bark"), DocumentRecord::new("c")];
        let vocabs = build_vocabularies(docs, &analyzer, &["title", "content"], |d| {
            if d.id == "c" { None } else { Some(d.id.clone()) }
        })
        .unwrap();
        assert_eq!(vocabs.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        let a = &vocabs["a"];
        assert_eq!(a.num_docs(), 2);
        assert_eq!(a.doc_freq(a.id_of("cat").unwrap()).unwrap(), 2);
    }

    #[test]
    fn missing_documents_are_skipped() {
        let analyzer = Analyzer::default();
        let items: Vec<Result<DocumentRecord>> =
            vec![Err(Error::DocumentNotFound("gone".into())), Ok(page("a", "cats", "purr"))];
        let vocab = build_vocabulary(items.into_iter().collect::<VecSource>(), &analyzer, &["title"]).unwrap();
        assert_eq!(vocab.num_docs(), 1);
    }

    struct VecSource(Vec<Result<DocumentRecord>>);

    impl FromIterator<Result<DocumentRecord>> for VecSource {
        fn from_iter<I: IntoIterator<Item = Result<DocumentRecord>>>(iter: I) -> Self {
            VecSource(iter.into_iter().collect())
        }
    }

    impl CorpusSource for VecSource {
        type Documents = std::vec::IntoIter<Result<DocumentRecord>>;
        fn documents(self) -> Self::Documents { self.0.into_iter() }
    }

    #[test]
    fn other_source_errors_abort() {
        let analyzer = Analyzer::default();
        let items = VecSource(vec![Err(Error::MalformedInput("bad line".into()))]);
        assert!(build_vocabulary(items, &analyzer, &["title"]).is_err());
    }

    #[test]
    fn all_matches_skips_missing_documents() {
        let dir = tempfile::tempdir().unwrap();
        let analyzer = Analyzer::default();
        let docs = vec![page("a", "cats purr", ""), page("b", "dogs bark", "")];
        let vocab = build_vocabulary(docs.clone(), &analyzer, &["title"]).unwrap();
        let (index, ordinals) = build_index(docs, &analyzer, &vocab, &["title"], &dir.path().join("index"), 4).unwrap();
        let config = MatchConfig { fields: vec!["title".into()], ..MatchConfig::default() };
        let matcher = Matcher::new(analyzer, vocab, index, ordinals, &config).unwrap();

        let queries = VecSource(vec![
            Err(Error::DocumentNotFound("gone".into())),
            Ok(page("q1", "purring cats", "")),
            Ok(page("q2", "the", "")),
        ]);
        let found = matcher.all_matches(queries).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "q1");
        assert_eq!(found[0].1[0].id, "a");
    }

    #[test]
    fn signature_ranking_reads_the_named_field() {
        let space = SignatureSpace::new(100);
        let query = DocumentRecord::new("q").with_field("esaSignature", "1 1.0 2 1.0");
        let candidates = vec![
            DocumentRecord::new("t1").with_field("esaSignature", "50 1.0"),
            DocumentRecord::new("t2"),
            DocumentRecord::new("t3").with_field("esaSignature", "1 1.0 2 1.0"),
        ];
        let ranking = rank_by_signature(&space, "esaSignature", &query, &candidates).unwrap().unwrap();
        assert_eq!(ranking.first.unwrap().id, "t1");
        let best = ranking.best.unwrap();
        assert_eq!((best.id.as_str(), best.rank), ("t3", 3));
        assert!(rank_by_signature(&space, "esaSignature", &DocumentRecord::new("none"), &candidates).unwrap().is_none());
    }
}
