//! Token-level analysis stages and the ordered pipeline that chains them.
//!
//! Every stage is a pure function over a token sequence. A pipeline is the
//! composition of its stages in the order they were given, so the same
//! input and stage order always produce the same output.

use crate::error::{Error, Result};
use crate::tokenizer::tokenize;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Token every numeric literal collapses to.
pub const NUMBER_TOKEN: &str = "{__NUMBER__}";

lazy_static! {
    static ref ALNUM: Regex = Regex::new(r"[a-zA-Z0-9]").expect("valid regex");
    // Anchored at the start only: "12th" collapses as well as "12".
    static ref NUMERIC: Regex = Regex::new(r"^[-+]?[0-9]*\.?[0-9]+([eE][-+]?[0-9]+)?").expect("valid regex");
    static ref MARKUP: Regex = Regex::new(r"<[^<>]*>").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "i","me","my","myself","we","our","ours","ourselves","you","you're","you've","you'll","you'd",
            "your","yours","yourself","yourselves","he","him","his","himself","she","she's","her","hers",
            "herself","it","it's","its","itself","they","them","their","theirs","themselves",
            "what","which","who","whom","this","that","that'll","these","those",
            "am","is","are","was","were","be","been","being","have","has","had","having","do","does","did","doing",
            "a","an","the","and","but","if","or","because","as","until","while","of","at","by","for","with",
            "about","against","between","into","through","during","before","after","above","below","to","from",
            "up","down","in","out","on","off","over","under","again","further","then","once",
            "here","there","when","where","why","how","all","any","both","each","few","more","most","other",
            "some","such","no","nor","not","only","own","same","so","than","too","very",
            "s","t","can","will","just","don","don't","should","should've","now","d","ll","m","o","re","ve","y",
            "ain","aren","aren't","couldn","couldn't","didn","didn't","doesn","doesn't","hadn","hadn't",
            "hasn","hasn't","haven","haven't","isn","isn't","ma","mightn","mightn't","mustn","mustn't",
            "needn","needn't","shan","shan't","shouldn","shouldn't","wasn","wasn't","weren","weren't",
            "won","won't","wouldn","wouldn't"
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// One analysis stage. The set is closed: configuration keys are resolved
/// into variants when a pipeline is constructed, never while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Drop tokens without an ASCII letter or digit.
    AlphaNumeric,
    Lowercase,
    /// Drop English stopwords (exact, case-sensitive match).
    RemoveStopwords,
    /// Snowball English stemming.
    PorterStem,
    /// Collapse numeric literals into [`NUMBER_TOKEN`].
    TokenizeNumbers,
    /// Remove markup tags, dropping tokens left empty.
    StripHtml,
}

impl Stage {
    pub fn key(&self) -> &'static str {
        match self {
            Stage::AlphaNumeric => "alpha_numeric",
            Stage::Lowercase => "lowercase",
            Stage::RemoveStopwords => "remove_stopwords",
            Stage::PorterStem => "porterstem",
            Stage::TokenizeNumbers => "tokenize_numbers",
            Stage::StripHtml => "strip_html",
        }
    }

    pub fn apply(&self, tokens: Vec<String>) -> Vec<String> {
        match self {
            Stage::AlphaNumeric => tokens.into_iter().filter(|t| ALNUM.is_match(t)).collect(),
            Stage::Lowercase => tokens.into_iter().map(|t| t.to_lowercase()).collect(),
            Stage::RemoveStopwords => tokens.into_iter().filter(|t| !is_stopword(t)).collect(),
            Stage::PorterStem => tokens.into_iter().map(|t| STEMMER.stem(&t).into_owned()).collect(),
            Stage::TokenizeNumbers => tokens
                .into_iter()
                .map(|t| if NUMERIC.is_match(&t) { NUMBER_TOKEN.to_string() } else { t })
                .collect(),
            Stage::StripHtml => tokens
                .into_iter()
                .filter_map(|t| {
                    let stripped = MARKUP.replace_all(&t, "");
                    let stripped = stripped.trim();
                    if stripped.is_empty() { None } else { Some(stripped.to_string()) }
                })
                .collect(),
        }
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(key: &str) -> Result<Self> {
        match key {
            "alpha_numeric" => Ok(Stage::AlphaNumeric),
            "lowercase" => Ok(Stage::Lowercase),
            "remove_stopwords" => Ok(Stage::RemoveStopwords),
            "porterstem" => Ok(Stage::PorterStem),
            "tokenize_numbers" => Ok(Stage::TokenizeNumbers),
            "strip_html" => Ok(Stage::StripHtml),
            other => Err(Error::Lookup(format!("unknown analyzer key {other}"))),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Ordered chain of [`Stage`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analyzer {
    stages: Vec<Stage>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STAGES.to_vec())
    }
}

impl Analyzer {
    pub const DEFAULT_STAGES: [Stage; 5] = [
        Stage::AlphaNumeric,
        Stage::Lowercase,
        Stage::RemoveStopwords,
        Stage::PorterStem,
        Stage::TokenizeNumbers,
    ];

    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Resolve every key before building anything; the first unknown key fails
    /// the whole pipeline.
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Result<Self> {
        let stages = keys.iter().map(|k| k.as_ref().parse()).collect::<Result<Vec<Stage>>>()?;
        Ok(Self::new(stages))
    }

    pub fn stages(&self) -> &[Stage] { &self.stages }

    pub fn analyze(&self, tokens: Vec<String>) -> Vec<String> {
        self.stages.iter().fold(tokens, |acc, stage| stage.apply(acc))
    }

    /// Tokenize raw text, then run the pipeline.
    pub fn analyze_text(&self, text: &str) -> Vec<String> {
        self.analyze(tokenize(text))
    }
}
