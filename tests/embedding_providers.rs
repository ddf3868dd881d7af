//! Integration tests for the remote embedding providers.
//!
//! A wiremock HTTP server stands in for the OpenAI-compatible and Gemini
//! endpoints, so these run without API keys or network access.

use std::collections::HashMap;
use std::fs;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use mylobster_memory::config::{
    Config, MemorySearchRemoteConfig, MemorySearchStoreConfig, MemorySearchSyncConfig,
};
use mylobster_memory::memory::{
    self, EmbeddingProvider, GeminiEmbeddingProvider, MemoryIndexManager, MemorySearchOptions,
    OpenAiEmbeddingProvider,
};

// ============================================================================
// Mock response builders
// ============================================================================

fn keyword_vector(text: &str) -> Vec<f64> {
    if text.contains("deploy") {
        vec![1.0, 0.0, 0.0]
    } else {
        vec![0.0, 1.0, 0.0]
    }
}

/// OpenAI-style response with one row per input, listed in reverse order so
/// the client has to sort by `index`.
fn openai_embeddings(request: &Request) -> ResponseTemplate {
    let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
    let inputs: Vec<String> = body["input"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(index, text)| json!({ "index": index, "embedding": keyword_vector(text) }))
        .collect();
    ResponseTemplate::new(200).set_body_json(json!({ "object": "list", "data": data }))
}

// ============================================================================
// OpenAI-compatible
// ============================================================================

#[tokio::test]
async fn openai_batch_is_returned_in_input_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer test-key"))
        .and(header("x-team", "memory"))
        .and(body_partial_json(json!({ "model": "text-embedding-3-small" })))
        .respond_with(openai_embeddings)
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiEmbeddingProvider::new("test-key".into(), None)
        .with_base_url(Some(format!("{}/v1", server.uri())))
        .with_headers(HashMap::from([("x-team".to_string(), "memory".to_string())]));

    let vectors = provider
        .embed_batch(&["deploy the api".to_string(), "lunch order".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
}

#[tokio::test]
async fn openai_short_response_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "index": 0, "embedding": [0.1, 0.2] }]
        })))
        .mount(&server)
        .await;

    let provider =
        OpenAiEmbeddingProvider::new("k".into(), None).with_base_url(Some(server.uri()));
    let err = provider
        .embed_batch(&["one".to_string(), "two".to_string()])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("1 embeddings for 2 inputs"));
}

#[tokio::test]
async fn openai_http_error_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let provider =
        OpenAiEmbeddingProvider::mistral("k".into(), None).with_base_url(Some(server.uri()));
    assert_eq!(provider.id(), "mistral");
    assert!(provider.embed_query("hello").await.is_err());
}

// ============================================================================
// Gemini
// ============================================================================

#[tokio::test]
async fn gemini_query_uses_embed_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/text-embedding-004:embedContent"))
        .and(header("x-goog-api-key", "gemini-key"))
        .and(body_partial_json(json!({
            "model": "models/text-embedding-004",
            "content": { "parts": [{ "text": "where is the runbook" }] }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "embedding": { "values": [0.5, 0.25] } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider =
        GeminiEmbeddingProvider::new("gemini-key".into(), None).with_base_url(Some(server.uri()));
    let vector = provider.embed_query("where is the runbook").await.unwrap();
    assert_eq!(vector, vec![0.5, 0.25]);
}

#[tokio::test]
async fn gemini_batch_uses_batch_embed_contents() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/text-embedding-004:batchEmbedContents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [{ "values": [1.0, 0.0] }, { "values": [0.0, 1.0] }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider =
        GeminiEmbeddingProvider::new("k".into(), None).with_base_url(Some(server.uri()));
    let vectors = provider
        .embed_batch(&["a".to_string(), "b".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

// ============================================================================
// End to end through the application config
// ============================================================================

#[tokio::test]
async fn search_through_config_syncs_on_boot_and_persists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(openai_embeddings)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let workspace = tmp.path().join("workspace");
    fs::create_dir_all(workspace.join("memory")).unwrap();
    fs::write(
        workspace.join("MEMORY.md"),
        "# Ops\n\nTo deploy the api run the release pipeline.\n",
    )
    .unwrap();
    fs::write(
        workspace.join("memory/2024-03-02.md"),
        "Lunch with the design team.\n",
    )
    .unwrap();

    let mut config = Config {
        workspace: Some(workspace.to_string_lossy().into_owned()),
        state_dir: tmp.path().join("state"),
        ..Config::default()
    };
    config.memory.dimensions = Some(3);
    config.memory.remote = Some(MemorySearchRemoteConfig {
        base_url: Some(server.uri()),
        api_key: Some("test-key".to_string()),
        headers: None,
    });
    config.memory.sync = Some(MemorySearchSyncConfig {
        on_boot: Some(true),
        ..Default::default()
    });

    let results = memory::search(&config, "deploy api", MemorySearchOptions::default())
        .await
        .unwrap();
    assert_eq!(results[0].path, "MEMORY.md");
    assert_eq!(results[0].source, "memory");
    assert_eq!(results[0].citation, "MEMORY.md:1-3");
    assert!(results[0].snippet.contains("release pipeline"));

    let store_path = config.memory_store_path().unwrap();
    assert_eq!(store_path, tmp.path().join("state/memory/main.sqlite"));
    assert!(store_path.exists());

    // Reopening without boot sync serves the persisted generation.
    config.memory.sync = None;
    let manager = MemoryIndexManager::open(&config).await.unwrap();
    let status = manager.status().unwrap();
    assert_eq!(status.file_count, 2);
    assert_eq!(status.chunk_count, 2);
    assert_eq!(status.vector_count, 2);
    assert_eq!(status.provider, "openai");
    manager.close().await;
}

#[tokio::test]
async fn in_memory_store_path_disables_persistence() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config {
        state_dir: tmp.path().to_path_buf(),
        ..Config::default()
    };
    config.memory.store = Some(MemorySearchStoreConfig {
        path: Some(":memory:".to_string()),
    });
    config.memory.remote = Some(MemorySearchRemoteConfig {
        api_key: Some("k".to_string()),
        ..Default::default()
    });

    assert_eq!(config.memory_store_path(), None);
    let manager = MemoryIndexManager::open(&config).await.unwrap();
    assert_eq!(manager.status().unwrap().store_path, None);
    manager.close().await;
}
