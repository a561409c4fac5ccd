use std::time::Duration;

use recsys_proxy_cache::{ProxyCacheError, Result};

#[test]
fn test_error_display() {
    let err = ProxyCacheError::MalformedEndpoint("tf-1".to_string());
    assert!(err.to_string().contains("tf-1"));
}

#[test]
fn test_backend_timeout_names_budget() {
    let err = ProxyCacheError::BackendTimeout(Duration::from_millis(150));
    assert!(err.to_string().contains("150ms"));
}

#[test]
fn test_integrity_lists_items_and_scores() {
    let err = ProxyCacheError::Integrity {
        items: vec![1, 2, 3],
        scores: vec![0.5, 0.25],
        missing: 1,
    };
    let msg = err.to_string();
    assert!(msg.contains("investigate integrity"));
    assert!(msg.contains("[1, 2, 3]"));
    assert!(msg.contains("[0.5, 0.25]"));
}

#[test]
fn test_json_error_converts() {
    let parse: std::result::Result<Vec<String>, _> = serde_json::from_str("{");
    let err: ProxyCacheError = parse.unwrap_err().into();
    assert!(matches!(err, ProxyCacheError::Json(_)));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(ProxyCacheError::Shutdown)
    }
    assert!(returns_error().is_err());
}
