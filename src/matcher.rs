// src/matcher.rs
//! Term matching shared by the decoder and the categorizer.
//!
//! Both sides run on text passed through [`normalize_for_matching`], so a
//! keyword and the text it is searched in always agree on case and punctuation.

use once_cell::sync::OnceCell;
use regex::Regex;

/// Lowercase, turn punctuation into spaces, collapse whitespace.
pub fn normalize_for_matching(input: &str) -> String {
    let mapped: String = input
        .chars()
        .flat_map(|c| {
            let keep = c.is_alphanumeric() || c.is_whitespace();
            let c = if keep { c } else { ' ' };
            c.to_lowercase()
        })
        .collect();

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(&mapped, " ").trim().to_string()
}

/// A compiled search term.
#[derive(Debug, Clone)]
pub enum TermMatcher {
    /// Purely numeric term: literal substring, so "666" also hits "666th".
    Numeric(String),
    /// Everything else: whole words only, so "war" does not hit "warranty".
    Words(Regex),
}

impl TermMatcher {
    /// Compile `term`. Returns `None` when nothing is left after normalization.
    pub fn compile(term: &str) -> Option<Self> {
        let norm = normalize_for_matching(term);
        if norm.is_empty() {
            return None;
        }
        if norm.chars().all(|c| c.is_ascii_digit()) {
            return Some(Self::Numeric(norm));
        }
        let body = norm
            .split(' ')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+");
        let re = Regex::new(&format!(r"\b{body}\b")).ok()?;
        Some(Self::Words(re))
    }

    /// `normalized` must come from [`normalize_for_matching`].
    pub fn is_match(&self, normalized: &str) -> bool {
        match self {
            Self::Numeric(n) => normalized.contains(n.as_str()),
            Self::Words(re) => re.is_match(normalized),
        }
    }
}

/// A term together with its compiled matcher (the original spelling is kept
/// for explainability).
#[derive(Debug, Clone)]
pub struct CompiledTerm {
    pub term: String,
    matcher: TermMatcher,
}

impl CompiledTerm {
    pub fn new(term: &str) -> Option<Self> {
        TermMatcher::compile(term).map(|matcher| Self {
            term: term.to_string(),
            matcher,
        })
    }

    pub fn is_match(&self, normalized: &str) -> bool {
        self.matcher.is_match(normalized)
    }
}

/// Compile a list of terms, dropping duplicates (after normalization) and empties.
pub fn compile_terms<'a, I>(terms: I) -> Vec<CompiledTerm>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = std::collections::HashSet::new();
    terms
        .into_iter()
        .filter(|t| seen.insert(normalize_for_matching(t)))
        .filter_map(CompiledTerm::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_punctuation_and_case() {
        assert_eq!(
            normalize_for_matching("  The BEAST's  mark,\n(again)! "),
            "the beast s mark again"
        );
        assert_eq!(normalize_for_matching(""), "");
    }

    #[test]
    fn numbers_match_as_substring() {
        let m = TermMatcher::compile("666").unwrap();
        assert!(m.is_match(&normalize_for_matching("the 666th day")));
        assert!(!m.is_match(&normalize_for_matching("six six six")));
    }

    #[test]
    fn words_need_boundaries() {
        let m = TermMatcher::compile("war").unwrap();
        assert!(m.is_match(&normalize_for_matching("War broke out.")));
        assert!(!m.is_match(&normalize_for_matching("Extended warranty offer")));
    }

    #[test]
    fn phrases_tolerate_punctuation_between_words() {
        let m = TermMatcher::compile("Mark of the Beast").unwrap();
        assert!(m.is_match(&normalize_for_matching("a mark -- of the beast?")));
    }

    #[test]
    fn empty_and_duplicate_terms_are_dropped() {
        assert!(TermMatcher::compile(" ... ").is_none());
        let terms = compile_terms(["Dragon", "dragon", "", "serpent"]);
        let names: Vec<_> = terms.iter().map(|t| t.term.as_str()).collect();
        assert_eq!(names, vec!["Dragon", "serpent"]);
    }
}
