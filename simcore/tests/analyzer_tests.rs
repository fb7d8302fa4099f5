use simcore::analyzer::{Analyzer, Stage, NUMBER_TOKEN};
use simcore::tokenizer::tokenize;
use simcore::Vocabulary;

#[test]
fn it_normalizes_and_stems() {
    let words = Analyzer::default().analyze_text("Running Runners RUN! The café's menu.");
    assert!(words.contains(&"run".to_string()));
    assert!(words.contains(&"menu".to_string()));
    assert!(!words.iter().any(|w| w == "!" || w == "."));
}

#[test]
fn it_filters_stopwords() {
    let words = Analyzer::default().analyze_text("The quick brown fox and the lazy dog");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert!(words.contains(&"fox".to_string()));
}

#[test]
fn it_is_deterministic() {
    let analyzer = Analyzer::default();
    for text in ["", "Rust 1.75 was released!", "<p>Markup &amp; more</p>", "ÉCOLE école Ecole"] {
        assert_eq!(analyzer.analyze_text(text), analyzer.analyze_text(text));
    }
}

#[test]
fn stage_order_matters() {
    let tokens = tokenize("The 2 Cats");
    let numbers_first = Analyzer::new(vec![Stage::TokenizeNumbers, Stage::Lowercase]).analyze(tokens.clone());
    let lowercase_first = Analyzer::new(vec![Stage::Lowercase, Stage::TokenizeNumbers]).analyze(tokens);
    assert_eq!(numbers_first, vec!["the", "{__number__}", "cats"]);
    assert_eq!(lowercase_first, vec!["the", NUMBER_TOKEN, "cats"]);
}

#[test]
fn markup_is_stripped_before_indexing() {
    let analyzer = Analyzer::from_keys(&["strip_html", "alpha_numeric", "lowercase"]).unwrap();
    assert_eq!(analyzer.analyze_text("<h1 class='t'>Hello</h1> <br/>World"), vec!["hello", "world"]);
}

#[test]
fn numeric_literals_share_one_vocabulary_entry() {
    let analyzer = Analyzer::new(vec![Stage::TokenizeNumbers]);
    let tokens = analyzer.analyze(vec!["3.14".into(), "-2".into(), "1e10".into()]);
    assert!(tokens.iter().all(|t| t == NUMBER_TOKEN));

    let vocab = Vocabulary::from_documents(&[tokens]);
    assert_eq!(vocab.len(), 1);
    assert_eq!(vocab.id_of(NUMBER_TOKEN), Some(0));
}

#[test]
fn ordinals_and_grouped_numbers_collapse_whole() {
    let words = Analyzer::default().analyze_text("the 12th century, 3,500 years");
    assert_eq!(words, vec![NUMBER_TOKEN, "centuri", NUMBER_TOKEN, "year"]);
}
