//! Markdown stripping and lemma normalization shared by indexing and querying.
//!
//! The lexical index only matches what this module produces, so the same
//! [`TextNormalizer`] must run over chunk text at index time and over the
//! query at search time. Any drift between the two silently costs recall.

use std::{
    fs,
    path::Path,
    sync::{Arc, LazyLock},
};

use ahash::{AHashMap, AHashSet};
use anyhow::{Context, Result, bail};
use common::config::RetrieverSettings;
use regex::Regex;
use tantivy::tokenizer::{
    Language, RawTokenizer, SimpleTokenizer, Stemmer, TextAnalyzer, TokenStream, Tokenizer,
};

const MAX_STEM_PASSES: usize = 32;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)```.*?```"));
static IMAGE: LazyLock<Regex> = LazyLock::new(|| compile(r"!\[[^\]]*\]\([^)]+\)"));
static LINK: LazyLock<Regex> = LazyLock::new(|| compile(r"\[([^\]]+)\]\([^)]+\)"));
static HEADING: LazyLock<Regex> = LazyLock::new(|| compile(r"#+\s*"));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| compile(r"`([^`]*)`"));
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| compile(r"[*_]{1,3}"));
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^\s*[-*+]\s*"));
static QUOTE_MARKER: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^\s*>\s*"));
static TABLE_ROW: LazyLock<Regex> = LazyLock::new(|| compile(r"\|.*\|"));
static HORIZONTAL_RULE: LazyLock<Regex> = LazyLock::new(|| compile(r"[-*_]{3,}"));
static BRACKETS: LazyLock<Regex> = LazyLock::new(|| compile(r"[{}\[\]]"));
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| compile(r"<[^>]+>"));

// Only called with the literal patterns above; `every_markdown_pattern_compiles` forces each one.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static markdown pattern compiles")
}

/// Reduces a single lowercase token to a canonical form shared by index and
/// query text. [`DictionaryLemmatizer`] yields dictionary lemmas; the
/// [`SnowballLemmatizer`] default yields stems (`fondations` -> `fond`), which
/// are not words.
pub trait Lemmatizer: Send + Sync {
    fn lemmatize(&self, token: &str) -> String;

    fn lemmatize_all(&self, tokens: &[String]) -> Vec<String> {
        tokens.iter().map(|t| self.lemmatize(t)).collect()
    }
}

/// Snowball stemming through tantivy's stemmer filter, applied until the
/// token stops changing so a second pass is a no-op.
#[derive(Clone)]
pub struct SnowballLemmatizer {
    analyzer: TextAnalyzer,
}

impl SnowballLemmatizer {
    pub fn new(language: Language) -> Self {
        let analyzer = TextAnalyzer::builder(RawTokenizer::default())
            .filter(Stemmer::new(language))
            .build();
        Self { analyzer }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let language = match name.trim().to_ascii_lowercase().as_str() {
            "french" | "fr" => Language::French,
            "english" | "en" => Language::English,
            "german" | "de" => Language::German,
            "spanish" | "es" => Language::Spanish,
            "italian" | "it" => Language::Italian,
            "portuguese" | "pt" => Language::Portuguese,
            "dutch" | "nl" => Language::Dutch,
            _ => return None,
        };
        Some(Self::new(language))
    }

    fn stem_to_fixpoint(analyzer: &mut TextAnalyzer, token: &str) -> String {
        let mut current = token.to_string();
        for _ in 0..MAX_STEM_PASSES {
            let mut stream = analyzer.token_stream(&current);
            let mut next = String::new();
            while stream.advance() {
                next.push_str(&stream.token().text);
            }
            drop(stream);
            if next.is_empty() || next == current {
                break;
            }
            current = next;
        }
        current
    }
}

impl Lemmatizer for SnowballLemmatizer {
    fn lemmatize(&self, token: &str) -> String {
        let mut analyzer = self.analyzer.clone();
        Self::stem_to_fixpoint(&mut analyzer, token)
    }

    fn lemmatize_all(&self, tokens: &[String]) -> Vec<String> {
        let mut analyzer = self.analyzer.clone();
        tokens
            .iter()
            .map(|t| Self::stem_to_fixpoint(&mut analyzer, t))
            .collect()
    }
}

/// Form to lemma lookup table (`form<TAB>lemma` per line). Unknown tokens pass
/// through unchanged.
pub struct DictionaryLemmatizer {
    table: AHashMap<String, String>,
}

impl DictionaryLemmatizer {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading lemma dictionary: {}", path.display()))?;
        let pairs = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (form, lemma) = line.split_once('\t')?;
                Some((form.trim().to_string(), lemma.trim().to_string()))
            })
            .collect::<Vec<_>>();
        if pairs.is_empty() {
            bail!("lemma dictionary {} has no entries", path.display());
        }
        Ok(Self::from_pairs(pairs))
    }

    /// Builds the table, resolving lemma chains (`a -> b -> c` becomes `a -> c`)
    /// so every lookup result maps to itself. Cycles collapse onto their
    /// lexicographically smallest member. Entries that are not single
    /// alphanumeric words are dropped since the tokenizer never produces them.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let raw = pairs
            .into_iter()
            .map(|(form, lemma)| (form.to_lowercase(), lemma.to_lowercase()))
            .filter(|(form, lemma)| is_single_word(form) && is_single_word(lemma))
            .collect::<AHashMap<_, _>>();

        let mut table = AHashMap::with_capacity(raw.len());
        for form in raw.keys() {
            let mut seen = AHashSet::new();
            let mut current = form.clone();
            while let Some(next) = raw.get(&current) {
                if !seen.insert(current.clone()) {
                    break;
                }
                current = next.clone();
            }
            // `current` is either outside the table or back inside a cycle.
            if seen.contains(&current) {
                current = seen
                    .iter()
                    .filter(|word| in_cycle(&raw, word))
                    .min()
                    .cloned()
                    .unwrap_or(current);
            }
            table.insert(form.clone(), current);
        }
        Self { table }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

fn in_cycle(raw: &AHashMap<String, String>, start: &str) -> bool {
    let mut current = raw.get(start);
    for _ in 0..raw.len() {
        match current {
            Some(next) if next == start => return true,
            Some(next) => current = raw.get(next),
            None => return false,
        }
    }
    false
}

fn is_single_word(word: &str) -> bool {
    !word.is_empty() && word.chars().all(char::is_alphanumeric)
}

impl Lemmatizer for DictionaryLemmatizer {
    fn lemmatize(&self, token: &str) -> String {
        self.table
            .get(token)
            .cloned()
            .unwrap_or_else(|| token.to_string())
    }
}

pub struct TextNormalizer {
    lemmatizer: Arc<dyn Lemmatizer>,
}

impl TextNormalizer {
    pub fn new(lemmatizer: Arc<dyn Lemmatizer>) -> Self {
        Self { lemmatizer }
    }

    /// French Snowball stemming; tokens come out as stems, not lemmas.
    pub fn french() -> Self {
        Self::new(Arc::new(SnowballLemmatizer::new(Language::French)))
    }

    /// Dictionary lemmatizer when a table is configured, Snowball for the
    /// configured language otherwise.
    pub fn from_settings(settings: &RetrieverSettings) -> Result<Self> {
        if let Some(path) = settings.lemma_dictionary.as_deref() {
            let dictionary = DictionaryLemmatizer::load(Path::new(path))?;
            tracing::debug!(entries = dictionary.len(), path, "loaded lemma dictionary");
            return Ok(Self::new(Arc::new(dictionary)));
        }
        let Some(snowball) = SnowballLemmatizer::from_name(&settings.language) else {
            bail!("unsupported lemmatizer language: {}", settings.language);
        };
        Ok(Self::new(Arc::new(snowball)))
    }

    pub fn normalize(&self, text: &str) -> String {
        let stripped = strip_markdown(text);
        let lowered = stripped.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        let tokens = tokenize(&lowered);
        self.lemmatizer
            .lemmatize_all(&tokens)
            .into_iter()
            .filter(|lemma| !lemma.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn strip_markdown(text: &str) -> String {
    let text = CODE_FENCE.replace_all(text, " ");
    let text = IMAGE.replace_all(&text, " ");
    let text = LINK.replace_all(&text, "${1}");
    let text = HEADING.replace_all(&text, " ");
    let text = INLINE_CODE.replace_all(&text, "${1}");
    let text = EMPHASIS.replace_all(&text, " ");
    let text = LIST_MARKER.replace_all(&text, " ");
    let text = QUOTE_MARKER.replace_all(&text, " ");
    let text = TABLE_ROW.replace_all(&text, " ");
    let text = HORIZONTAL_RULE.replace_all(&text, " ");
    let text = BRACKETS.replace_all(&text, " ");
    HTML_TAG.replace_all(&text, " ").into_owned()
}

/// Splits on anything that is not alphanumeric; punctuation and whitespace never become tokens.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokenizer = SimpleTokenizer::default();
    let mut stream = tokenizer.token_stream(text);
    let mut out = Vec::new();
    while stream.advance() {
        out.push(stream.token().text.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::{
        BRACKETS, CODE_FENCE, DictionaryLemmatizer, EMPHASIS, HEADING, HORIZONTAL_RULE, HTML_TAG,
        IMAGE, INLINE_CODE, LINK, LIST_MARKER, Lemmatizer, QUOTE_MARKER, TABLE_ROW, TextNormalizer,
        strip_markdown,
    };

    #[test]
    fn every_markdown_pattern_compiles() {
        for pattern in [
            &CODE_FENCE,
            &IMAGE,
            &LINK,
            &HEADING,
            &INLINE_CODE,
            &EMPHASIS,
            &LIST_MARKER,
            &QUOTE_MARKER,
            &TABLE_ROW,
            &HORIZONTAL_RULE,
            &BRACKETS,
            &HTML_TAG,
        ] {
            assert!(!std::sync::LazyLock::force(pattern).as_str().is_empty());
        }
    }

    #[test]
    fn snowball_yields_stems_where_the_dictionary_yields_lemmas() {
        let stemmed = TextNormalizer::french().normalize("fondations");
        assert!(stemmed.starts_with("fond"));
        assert_ne!(stemmed, "fondation");

        let lemmatized = TextNormalizer::new(Arc::new(dictionary(&[("fondations", "fondation")])))
            .normalize("fondations");
        assert_eq!(lemmatized, "fondation");
    }

    fn dictionary(pairs: &[(&str, &str)]) -> DictionaryLemmatizer {
        DictionaryLemmatizer::from_pairs(
            pairs
                .iter()
                .map(|(f, l)| ((*f).to_string(), (*l).to_string())),
        )
    }

    #[test]
    fn strips_markdown_constructs() {
        let md = "# Titre\n\nVoir [la norme](https://ex.com/nf) et ![schéma](img.png).\n\n```rust\nfn main() {}\n```\n> cité\n- **gras** et `code`\n<br/>\n---\n| a | b |";
        let stripped = strip_markdown(md);
        assert!(stripped.contains("la norme"));
        assert!(stripped.contains("code"));
        for gone in ["https://", "img.png", "fn main", "**", "<br/>", "#", "| a |", "---", "```"] {
            assert!(!stripped.contains(gone), "{gone} survived: {stripped}");
        }
    }

    #[test]
    fn dictionary_normalization_lowercases_and_lemmatizes() {
        let normalizer = TextNormalizer::new(Arc::new(dictionary(&[
            ("murs", "mur"),
            ("porteurs", "porteur"),
            ("sont", "être"),
        ])));
        let out = normalizer.normalize("## Les **Murs** porteurs, sont-ils [conformes](http://x)?");
        insta::assert_snapshot!(out, @"les mur porteur être ils conformes");
    }

    #[test]
    fn dictionary_resolves_chains_and_cycles() {
        let lemmas = dictionary(&[
            ("a", "b"),
            ("b", "c"),
            ("x", "y"),
            ("y", "x"),
            ("bad", "two words"),
        ]);
        assert_eq!(lemmas.lemmatize("a"), "c");
        assert_eq!(lemmas.lemmatize("b"), "c");
        assert_eq!(lemmas.lemmatize("x"), "x");
        assert_eq!(lemmas.lemmatize("y"), "x");
        assert_eq!(lemmas.lemmatize("bad"), "bad");
        assert_eq!(lemmas.lemmatize("unknown"), "unknown");
    }

    #[test]
    fn snowball_folds_inflections_to_one_stem() {
        let normalizer = TextNormalizer::french();
        let a = normalizer.normalize("Les fondations");
        let b = normalizer.normalize("la fondation");
        assert_eq!(a.split(' ').nth(1), b.split(' ').nth(1));
    }

    #[test]
    fn normalizing_twice_is_a_no_op_for_french_prose() {
        let normalizer = TextNormalizer::french();
        let text = "## Réglementation\nLes **entreprises** générales doivent vérifier la conformité des échafaudages, \
                    conformément à l'arrêté du 21 décembre 2004.";
        let once = normalizer.normalize(text);
        assert_eq!(normalizer.normalize(&once), once);
    }

    #[test]
    fn empty_and_markup_only_input_normalize_to_empty() {
        let normalizer = TextNormalizer::french();
        assert_eq!(normalizer.normalize(""), "");
        assert_eq!(normalizer.normalize("```\ncode\n```  --- ** <div>"), "");
    }

    #[test]
    fn rejects_unknown_language() {
        let settings = common::config::RetrieverSettings {
            language: "klingon".to_string(),
            ..common::config::RetrieverSettings::default()
        };
        assert!(TextNormalizer::from_settings(&settings).is_err());
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(text in "[a-zA-Zéèàçù0-9#*_>`|\\[\\]()!<>{} .,;:'\n-]{0,160}") {
            let normalizer = TextNormalizer::french();
            let once = normalizer.normalize(&text);
            prop_assert_eq!(normalizer.normalize(&once), once);
        }
    }
}
