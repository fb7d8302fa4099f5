use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use simcore::corpus::{CorpusSource, JsonlCorpus};
use simcore::persist::{partition_key, ArtifactPaths};
use simcore::pipeline::{build_grouped_index, build_index, build_vocabularies, rank_by_signature};
use simcore::{DocumentRecord, MatchConfig, Matcher, Vocabulary};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;
use walkdir::WalkDir;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build vocabularies and similarity indexes, and match documents against them", long_about = None)]
struct Cli {
    /// Root directory holding one artifact set per partition key
    #[arg(long, global = true, default_value = "artifacts")]
    root: PathBuf,
    /// JSON file with analyzer, field and matching settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Text fields to read, overriding the config
    #[arg(long, global = true, num_args = 1..)]
    fields: Option<Vec<String>>,
    /// Matches reported per query, overriding the config
    #[arg(long, global = true)]
    top_k: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a vocabulary from input JSON/JSONL files or a directory
    Vocab {
        #[arg(long)]
        input: PathBuf,
        /// Partition key parts, joined with '-'
        #[arg(long, required = true, num_args = 1..)]
        key: Vec<String>,
        /// One vocabulary per URL subdomain of the document id
        #[arg(long, default_value_t = false)]
        by_subdomain: bool,
    },
    /// Filter a saved vocabulary and save the result under a new key
    Prune {
        #[arg(long, required = true, num_args = 1..)]
        key: Vec<String>,
        #[arg(long, required = true, num_args = 1..)]
        into: Vec<String>,
        /// Keep tokens in at least this many documents
        #[arg(long, default_value_t = 1)]
        no_below: u32,
        /// Keep tokens in at most this fraction of documents
        #[arg(long, default_value_t = 1.0)]
        no_above: f64,
        /// Keep only the most frequent tokens
        #[arg(long)]
        keep_n: Option<usize>,
        /// Drop these tokens outright
        #[arg(long, num_args = 1..)]
        drop: Vec<String>,
    },
    /// Index input documents against a saved vocabulary
    Index {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, required = true, num_args = 1..)]
        key: Vec<String>,
        /// Index one summed vector per distinct value of this field
        #[arg(long)]
        group_by: Option<String>,
    },
    /// Print the best indexed match of every input document as TSV
    Match {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, required = true, num_args = 1..)]
        key: Vec<String>,
        /// Print every match up to top_k instead of the best one
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Rank candidate documents by signature similarity to each query
    Signature {
        #[arg(long)]
        query: PathBuf,
        #[arg(long)]
        candidates: PathBuf,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => MatchConfig::from_file(path).with_context(|| format!("reading config {}", path.display()))?,
        None => MatchConfig::default(),
    };
    if let Some(fields) = cli.fields {
        config.fields = fields;
    }
    if let Some(top_k) = cli.top_k {
        config.top_k = top_k;
    }
    let paths = ArtifactPaths::new(&cli.root);

    match cli.command {
        Commands::Vocab { input, key, by_subdomain } => build_vocab(&paths, &config, &input, &key, by_subdomain),
        Commands::Prune { key, into, no_below, no_above, keep_n, drop } => {
            prune(&paths, &key, &into, no_below, no_above, keep_n, &drop)
        }
        Commands::Index { input, key, group_by } => index(&paths, &config, &input, &key, group_by.as_deref()),
        Commands::Match { input, key, all } => match_documents(&paths, &config, &input, &key, all),
        Commands::Signature { query, candidates } => signatures(&config, &query, &candidates),
    }
}

/// Every .json and .jsonl file under `input`, or `input` itself.
fn input_files(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }
    Ok(files)
}

/// Documents read from a list of files in order. `.jsonl` files hold one
/// record per line; other files hold one record or an array of records.
struct FileCorpus {
    files: Vec<PathBuf>,
}

impl FileCorpus {
    fn open(input: &Path) -> Result<Self> {
        let files = input_files(input)?;
        tracing::info!(files = files.len(), input = %input.display(), "collected input files");
        Ok(Self { files })
    }
}

type Records = Box<dyn Iterator<Item = simcore::Result<DocumentRecord>>>;

fn read_json(file: &Path) -> simcore::Result<Vec<DocumentRecord>> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    Ok(match json {
        serde_json::Value::Array(arr) => {
            arr.into_iter().map(serde_json::from_value).collect::<serde_json::Result<Vec<DocumentRecord>>>()?
        }
        serde_json::Value::Object(_) => vec![serde_json::from_value(json)?],
        _ => Vec::new(),
    })
}

fn records_in(file: PathBuf) -> Records {
    let jsonl = file.extension().and_then(|s| s.to_str()) == Some("jsonl");
    let opened = if jsonl {
        JsonlCorpus::open(&file).map(|c| Box::new(c.documents()) as Records)
    } else {
        read_json(&file).map(|docs| Box::new(docs.documents()) as Records)
    };
    match opened {
        Ok(records) => records,
        Err(e) => Box::new(std::iter::once(Err(e))),
    }
}

impl CorpusSource for FileCorpus {
    type Documents = Records;

    fn documents(self) -> Self::Documents {
        Box::new(self.files.into_iter().flat_map(records_in))
    }
}

fn read_records(input: &Path) -> Result<Vec<DocumentRecord>> {
    Ok(FileCorpus::open(input)?.documents().collect::<simcore::Result<Vec<_>>>()?)
}

/// Third label from the right of the document URL's host, e.g. `garden` for
/// `http://garden.example.com/ferns`.
fn subdomain(doc: &DocumentRecord) -> Option<String> {
    let url = Url::parse(&doc.id).ok()?;
    let labels: Vec<&str> = url.host_str()?.split('.').collect();
    if labels.len() < 3 {
        return None;
    }
    Some(labels[labels.len() - 3].to_string())
}

fn build_vocab(paths: &ArtifactPaths, config: &MatchConfig, input: &Path, key: &[String], by_subdomain: bool) -> Result<()> {
    let analyzer = config.analyzer()?;
    let corpus = FileCorpus::open(input)?;
    let vocabularies = if by_subdomain {
        build_vocabularies(corpus, &analyzer, &config.fields, subdomain)?
    } else {
        build_vocabularies(corpus, &analyzer, &config.fields, |_| Some(String::new()))?
    };

    for (sub, vocabulary) in vocabularies {
        let mut parts = key.to_vec();
        if !sub.is_empty() {
            parts.push(sub);
        }
        let key = partition_key(&parts)?;
        vocabulary.save(paths.vocabulary(&key))?;
        tracing::info!(%key, tokens = vocabulary.len(), "saved vocabulary");
    }
    Ok(())
}

fn prune(
    paths: &ArtifactPaths,
    key: &[String],
    into: &[String],
    no_below: u32,
    no_above: f64,
    keep_n: Option<usize>,
    drop: &[String],
) -> Result<()> {
    let from = partition_key(key)?;
    let to = partition_key(into)?;
    if from == to {
        bail!("refusing to prune vocabulary {from} in place; its index would no longer match");
    }
    let mut vocabulary = Vocabulary::load(paths.vocabulary(&from))?;
    let before = vocabulary.len();

    let bad: Vec<u32> = drop.iter().filter_map(|t| vocabulary.id_of(t)).collect();
    if !bad.is_empty() {
        vocabulary.filter_tokens(&bad)?;
    }
    vocabulary.filter_by_doc_freq(no_below, no_above);
    if let Some(keep_n) = keep_n {
        vocabulary.filter_extremes(keep_n);
    }

    vocabulary.save(paths.vocabulary(&to))?;
    tracing::info!(from = %from, to = %to, before, after = vocabulary.len(), "pruned vocabulary");
    Ok(())
}

fn index(paths: &ArtifactPaths, config: &MatchConfig, input: &Path, key: &[String], group_by: Option<&str>) -> Result<()> {
    let key = partition_key(key)?;
    let analyzer = config.analyzer()?;
    let vocabulary = Vocabulary::load(paths.vocabulary(&key))
        .with_context(|| format!("no vocabulary for {key}; run `indexer vocab` first"))?;
    let corpus = FileCorpus::open(input)?;
    let index_dir = paths.index_dir(&key);
    let (index, _) = match group_by {
        Some(field) => {
            build_grouped_index(corpus, &analyzer, &vocabulary, &config.fields, field, &index_dir, config.shard_size)?
        }
        None => build_index(corpus, &analyzer, &vocabulary, &config.fields, &index_dir, config.shard_size)?,
    };
    tracing::info!(%key, vectors = index.len(), "index build complete");
    Ok(())
}

fn match_documents(paths: &ArtifactPaths, config: &MatchConfig, input: &Path, key: &[String], all: bool) -> Result<()> {
    let key = partition_key(key)?;
    let matcher = Matcher::open(paths, &key, config)?;
    let corpus = FileCorpus::open(input)?;

    if !all {
        for report in matcher.match_corpus(corpus)? {
            println!("{:.6}\t{}\t{}", report.score, report.query_id, report.matched_id);
        }
        return Ok(());
    }
    for (query_id, matches) in matcher.all_matches(corpus)? {
        for m in matches {
            println!("{:.6}\t{}\t{}", m.score, query_id, m.id);
        }
    }
    Ok(())
}

fn signatures(config: &MatchConfig, query: &Path, candidates: &Path) -> Result<()> {
    let space = config.signature_space();
    let candidates = read_records(candidates)?;
    for doc in read_records(query)? {
        let Some(ranking) = rank_by_signature(&space, &config.signature_field, &doc, &candidates)? else {
            tracing::warn!(id = %doc.id, field = %config.signature_field, "query has no signature");
            continue;
        };
        println!("{}", serde_json::json!({ "query_id": doc.id, "first": ranking.first, "best": ranking.best }));
    }
    Ok(())
}
