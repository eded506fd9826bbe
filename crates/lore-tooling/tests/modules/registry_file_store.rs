//! Tool records read from a JSON file through the registry.

#![cfg(test)]

use std::fs;

use lore_tooling::{
    ExecutableRef, JsonFileToolStore, ToolFilter, ToolMetadataStore, ToolRegistry, ToolSpec,
};
use serde_json::json;
use tempfile::TempDir;

fn write_records(dir: &TempDir) -> JsonFileToolStore {
    let path = dir.path().join("tools.json");
    let records = json!([
        {
            "id": "t1",
            "name": "weather",
            "description": "Current weather",
            "inputSchema": "{\"type\": \"object\", \"properties\": {\"city\": {\"type\": \"string\"}}}",
            "executionCode": "function handler(event) { return {statusCode: 200, body: 'ok'}; }",
            "requirements": "left-pad@1.3.0\n\n# pinned for padding\nclock",
            "isActive": true
        },
        {
            "id": "t2",
            "name": "stocks",
            "inputSchema": {"type": "object"},
            "codeKey": "tool-code/stocks.js",
            "requirements": ["ticker"],
            "isActive": false
        },
        {
            "id": "t3",
            "name": "broken-schema",
            "inputSchema": "not json",
            "executionCode": "result = 1",
            "isActive": true
        },
        {"id": "t4", "isActive": true},
        {
            "id": "t5",
            "name": "codeless",
            "inputSchema": {"type": "object"},
            "isActive": true
        }
    ]);
    fs::write(&path, serde_json::to_vec_pretty(&records).unwrap()).unwrap();
    JsonFileToolStore::new(path)
}

#[tokio::test]
async fn test_active_listing_skips_malformed_records() {
    let temp_dir = TempDir::new().unwrap();
    let registry = ToolRegistry::new(write_records(&temp_dir));

    let tools = registry.list_active(None).await;
    let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["weather"]);
    assert_eq!(tools[0].requirements, vec!["left-pad@1.3.0", "clock"]);
    assert_eq!(
        tools[0].input_schema["properties"]["city"]["type"],
        json!("string")
    );
}

#[tokio::test]
async fn test_model_specs_shape() {
    let temp_dir = TempDir::new().unwrap();
    let registry = ToolRegistry::new(write_records(&temp_dir));

    let selected = vec!["t1".to_owned()];
    let specs = registry.model_specs(Some(selected.as_slice())).await;
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0]["toolSpec"]["name"], json!("weather"));
    assert_eq!(specs[0]["toolSpec"]["inputSchema"]["json"]["type"], json!("object"));

    let unknown = vec!["t9".to_owned()];
    assert!(registry.model_specs(Some(unknown.as_slice())).await.is_empty());
}

#[tokio::test]
async fn test_inactive_tools_do_not_resolve() {
    let temp_dir = TempDir::new().unwrap();
    let registry = ToolRegistry::new(write_records(&temp_dir));

    assert!(registry.resolve("stocks").await.is_none());
    assert!(registry.get_executable_ref("stocks").await.is_none());

    let stocks = registry.get_by_id("t2").await.unwrap();
    assert!(!stocks.is_active);
    assert_eq!(
        stocks.executable,
        ExecutableRef::Stored("tool-code/stocks.js".to_owned())
    );

    assert!(matches!(
        registry.get_executable_ref("weather").await,
        Some(ExecutableRef::Inline(_))
    ));
}

#[tokio::test]
async fn test_unreadable_store_falls_back() {
    let temp_dir = TempDir::new().unwrap();
    let store = JsonFileToolStore::new(temp_dir.path().join("missing.json"));
    assert!(matches!(store.scan(&ToolFilter::default()).await, Err(_)));

    let builtin = ToolSpec {
        id: "builtin-clock".to_owned(),
        name: "clock".to_owned(),
        description: "Current time".to_owned(),
        input_schema: json!({"type": "object"}),
        executable: ExecutableRef::Inline("result = Date.now()".to_owned()),
        requirements: Vec::new(),
        is_active: true,
    };
    let registry = ToolRegistry::new(store).with_fallback(vec![builtin.clone()]);

    assert_eq!(registry.list_active(None).await, vec![builtin.clone()]);
    assert_eq!(registry.resolve("clock").await, Some(builtin));
    assert!(registry.resolve("weather").await.is_none());
}
