use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    // Markup tags, numbers (with thousands separators and any word suffix,
    // so "12th" and "3,500" stay whole), hyphenated words, then any single
    // non-space symbol.
    static ref RE: Regex = Regex::new(concat!(
        r"(?u)<[^<>]*>",
        r"|[-+]?(?:[0-9]{1,3}(?:,[0-9]{3})+|[0-9]*\.?[0-9]+)(?:[eE][-+]?[0-9]+)?[\p{L}\p{N}_']*(?:-[\p{L}\p{N}]+)*",
        r"|[\p{L}\p{N}][\p{L}\p{N}_']*(?:-[\p{L}\p{N}]+)*",
        r"|[^\s\p{L}\p{N}]",
    ))
    .expect("valid regex");
}

/// Split raw text into word-level tokens after NFKC normalization.
///
/// Case is preserved and punctuation is emitted as standalone tokens; the
/// analyzer stages decide what survives.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>();
    RE.find_iter(&normalized).map(|m| m.as_str().to_string()).collect()
}
