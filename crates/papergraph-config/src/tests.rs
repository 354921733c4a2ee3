use super::*;

#[test]
fn test_default_thresholds_match() {
    let graph = GraphConfig::default();
    assert_eq!(graph.batch_confidence_threshold, 0.6);
    assert_eq!(graph.regenerate_confidence_threshold, 0.6);
    assert_eq!(graph.max_concurrent_pairs, 1);
}

#[test]
fn test_default_retry_policies() {
    let retry = RetryConfig::default();
    assert_eq!(retry.extraction.max_retries, 3);
    assert_eq!(retry.extraction.base_delay_secs, 2.0);
    assert_eq!(retry.synthesis.max_retries, 5);
    assert_eq!(retry.synthesis.base_delay_secs, 5.0);
    assert_eq!(retry.synthesis.max_delay_secs, 60.0);
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = Config::from_toml(
        r#"
        [server]
        bind = "127.0.0.1:9000"

        [graph]
        batch_confidence_threshold = 0.8
        "#,
    )
    .unwrap();
    assert_eq!(config.server.bind, "127.0.0.1:9000");
    assert_eq!(config.server.upload_dir, PathBuf::from("data"));
    assert_eq!(config.graph.batch_confidence_threshold, 0.8);
    assert_eq!(config.graph.regenerate_confidence_threshold, 0.6);
    assert_eq!(config.llm.groq_model, "llama-3.1-8b-instant");
}

#[test]
fn test_threshold_out_of_range_rejected() {
    let err = Config::from_toml("[graph]\nregenerate_confidence_threshold = 1.5\n").unwrap_err();
    assert!(err.to_string().contains("regenerate_confidence_threshold"));
}

#[test]
fn test_converter_kind_parses_lowercase() {
    let config = Config::from_toml("[ingestion]\nconverter = \"local\"\n").unwrap();
    assert_eq!(config.ingestion.converter, ConverterKind::Local);
}

#[test]
fn test_from_file_reads_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("papergraph.toml");
    std::fs::write(&path, "[server]\nupload_dir = \"/tmp/papers\"\n").unwrap();
    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.server.upload_dir, PathBuf::from("/tmp/papers"));
}

#[test]
fn test_placeholder_key_is_ignored() {
    assert_eq!(usable_key("your-key-here".to_string()), None);
    assert_eq!(usable_key("  ".to_string()), None);
    assert_eq!(usable_key("gsk_abc".to_string()).as_deref(), Some("gsk_abc"));
}

#[test]
fn test_api_keys_debug_is_redacted() {
    let keys = ApiKeys { groq: Some("secret".into()), ..ApiKeys::default() };
    let rendered = format!("{keys:?}");
    assert!(!rendered.contains("secret"));
}

#[test]
fn test_retry_delays_must_be_finite_and_non_negative() {
    let err = Config::from_toml("[retry.synthesis]\nmax_retries = 2\nbase_delay_secs = -1.0\nmax_delay_secs = 60.0\n")
        .unwrap_err();
    assert!(err.to_string().contains("retry.synthesis"));

    let err = Config::from_toml("[retry.extraction]\nmax_retries = 2\nbase_delay_secs = 1.0\nmax_delay_secs = inf\n")
        .unwrap_err();
    assert!(err.to_string().contains("max_delay_secs"));

    let err = Config::from_toml("[retry.extraction]\nmax_retries = 2\nbase_delay_secs = 1e300\nmax_delay_secs = 60.0\n")
        .unwrap_err();
    assert!(err.to_string().contains("base_delay_secs"));
}

#[test]
fn test_embedding_section_defaults_and_parses() {
    let config = Config::default();
    assert_eq!(config.embedding.backend, EmbeddingBackendKind::Auto);
    assert_eq!(config.embedding.gemini_model, "gemini-embedding-001");

    let config = Config::from_toml(
        "[embedding]\nbackend = \"openai\"\nopenai_base_url = \"http://localhost:11434\"\n",
    )
    .unwrap();
    assert_eq!(config.embedding.backend, EmbeddingBackendKind::OpenAi);
    assert_eq!(config.embedding.openai_base_url.as_deref(), Some("http://localhost:11434"));
    assert_eq!(config.embedding.openai_model, "text-embedding-3-small");
}
