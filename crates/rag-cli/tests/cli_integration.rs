#![allow(deprecated)]

use std::path::Path;

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};

fn rag(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rag-retrieve").expect("binary");
    cmd.current_dir(workdir)
        .env("TANTIVY_DIR", workdir.join("lexical"))
        .env("RAG_COLLECTIONS_PATH", workdir.join("collections.json"))
        .env("EMBED_PROVIDER", "pseudo")
        .env("QDRANT_URL", "http://127.0.0.1:1")
        .env("RETRIEVER_TIMEOUT_MS", "500")
        .env("LEXICAL_BACKEND", "tantivy")
        .env_remove("LEMMA_DICTIONARY")
        .env_remove("LEMMATIZER_LANGUAGE");
    cmd
}

#[test]
fn normalize_strips_markup_and_lowercases() {
    let tmp = tempfile::tempdir().expect("tempdir");
    rag(tmp.path())
        .args(["normalize", "## Les **Fondations** [profondes](http://x)"])
        .assert()
        .success()
        .stdout(contains("fond"))
        .stdout(contains("profond"))
        .stdout(contains("**").not())
        .stdout(contains("http").not());
}

#[test]
fn schema_describes_result_types() {
    let tmp = tempfile::tempdir().expect("tempdir");
    rag(tmp.path())
        .arg("schema")
        .assert()
        .success()
        .stdout(contains("retrieved_chunk"))
        .stdout(contains("chunk_text"))
        .stdout(contains("fused_score"));
}

#[test]
fn lexical_only_index_reports_counts() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let input = tmp.path().join("chunks.jsonl");
    std::fs::write(
        &input,
        concat!(
            "{\"id\": \"1\", \"chunk_text\": \"La charpente en bois\", \"metadata\": {\"title\": \"Guide\"}}\n",
            "\n",
            "{\"id\": \"2\", \"chunk_text\": \"   \"}\n",
            "{\"chunk_text\": \"Isolation des combles\"}\n",
        ),
    )
    .expect("write");

    rag(tmp.path())
        .args([
            "index",
            "--input",
            input.to_str().expect("utf8 path"),
            "--lexical-index",
            "guides",
            "--vector-collection",
            "chunks",
            "--lexical-only",
        ])
        .assert()
        .success()
        .stdout(contains("\"indexed\": 2"))
        .stdout(contains("\"skipped\": 1"));

    assert!(tmp.path().join("lexical").join("guides").join("meta.json").exists());
}

#[test]
fn malformed_records_fail_with_line_number() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let input = tmp.path().join("chunks.jsonl");
    std::fs::write(&input, "{\"chunk_text\": \"ok\"}\nnot json\n").expect("write");

    rag(tmp.path())
        .args([
            "index",
            "--input",
            input.to_str().expect("utf8 path"),
            "--lexical-index",
            "guides",
            "--vector-collection",
            "chunks",
            "--lexical-only",
        ])
        .assert()
        .failure()
        .stderr(contains("chunks.jsonl:2"));
}

#[test]
fn unknown_collection_lists_available_names() {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        tmp.path().join("collections.json"),
        r#"{"guides": {"qdrant_collection": "guides_chunks", "es_index": "guides_idx"}}"#,
    )
    .expect("write");

    rag(tmp.path())
        .args(["query", "mur porteur", "--collection", "nope"])
        .assert()
        .failure()
        .stderr(contains("unknown collection"))
        .stderr(contains("guides"));
}

#[test]
fn zero_top_k_is_rejected() {
    let tmp = tempfile::tempdir().expect("tempdir");
    rag(tmp.path())
        .args([
            "query",
            "mur porteur",
            "--lexical-index",
            "guides",
            "--vector-collection",
            "chunks",
            "--top-k",
            "0",
        ])
        .assert()
        .failure()
        .stderr(contains("top_k must be at least 1"));
}

#[test]
fn unreachable_stores_yield_an_empty_result() {
    let tmp = tempfile::tempdir().expect("tempdir");
    rag(tmp.path())
        .args([
            "query",
            "mur porteur",
            "--lexical-index",
            "guides",
            "--vector-collection",
            "chunks",
        ])
        .assert()
        .success()
        .stdout(contains("[]"));
}

#[test]
fn collections_reports_store_presence() {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        tmp.path().join("collections.json"),
        r#"{"guides": {"qdrant_collection": "guides_chunks", "es_index": "guides_idx"}}"#,
    )
    .expect("write");

    rag(tmp.path())
        .arg("collections")
        .assert()
        .success()
        .stdout(contains("\"name\": \"guides\""))
        .stdout(contains("\"lexical_index\": \"guides_idx\""))
        .stdout(contains("\"vector_collection\": \"guides_chunks\""))
        .stdout(contains("\"lexical_exists\": false"))
        .stdout(contains("\"vector_exists\": null"));
}
