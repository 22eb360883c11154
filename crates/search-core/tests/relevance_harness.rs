use std::{fs, path::PathBuf};

use search_core::{TextNormalizer, tantivy_index::TantivyLexicalIndex};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RelevanceCase {
    query: String,
    chunk_id: String,
    content: String,
}

fn load_cases() -> Vec<RelevanceCase> {
    let fixture_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("relevance.json");
    let raw = fs::read_to_string(fixture_path).expect("fixture");
    serde_json::from_str(&raw).expect("parse fixture")
}

#[test]
fn lexical_relevance_harness_matches_fixture_expectations() {
    let cases = load_cases();
    let normalizer = TextNormalizer::french();

    let index = TantivyLexicalIndex::new_in_memory().expect("index");
    for case in &cases {
        index
            .add_document(&case.chunk_id, &normalizer.normalize(&case.content))
            .expect("add");
    }
    index.commit().expect("commit");

    for case in &cases {
        let hits = index
            .search(&normalizer.normalize(&case.query), 3)
            .expect("search");
        assert_eq!(
            hits.first().map(|hit| hit.doc_id.as_str()),
            Some(case.chunk_id.as_str()),
            "query {:?}",
            case.query
        );
    }
}

#[test]
fn unnormalized_queries_miss_inflected_forms() {
    let cases = load_cases();
    let normalizer = TextNormalizer::french();
    let index = TantivyLexicalIndex::new_in_memory().expect("index");
    for case in &cases {
        index
            .add_document(&case.chunk_id, &normalizer.normalize(&case.content))
            .expect("add");
    }
    index.commit().expect("commit");

    let raw = index.search("canalisations", 3).expect("search");
    assert!(raw.is_empty());
    let normalized = index
        .search(&normalizer.normalize("canalisations"), 3)
        .expect("search");
    assert_eq!(normalized[0].doc_id, "105");
}
