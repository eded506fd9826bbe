//! Tools stored on disk, installed and run through the sandbox.

#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use lore_core::{BlobStore, BoundedBlobStore, LocalBlobStore, LoreConfig, SandboxConfig};
use lore_tooling::{
    BlobPackageInstaller, Envelope, FailureKind, InMemoryToolStore, RequirementList, ToolRecord,
    ToolRegistry, ToolSandbox,
};
use serde_json::{Value, json};
use tempfile::TempDir;

fn tool(name: &str, code: &str, requirements: &str) -> ToolRecord {
    ToolRecord {
        id: format!("id-{name}"),
        name: name.to_owned(),
        description: String::new(),
        input_schema: json!({"type": "object"}),
        execution_code: Some(code.to_owned()),
        code_key: None,
        requirements: RequirementList::Lines(requirements.to_owned()),
        category: Some("test".to_owned()),
        is_active: true,
    }
}

async fn seeded_store(root: &TempDir) -> Arc<dyn BlobStore> {
    let store = LocalBlobStore::new(root.path());
    store
        .put(
            "tool-packages/units/1.0.0.js",
            b"exports.toFahrenheit = (celsius) => celsius * 9 / 5 + 32;".to_vec(),
        )
        .await
        .unwrap();
    store
        .put(
            "tool-packages/units/2.0.0.js",
            b"exports.toFahrenheit = () => 'v2';".to_vec(),
        )
        .await
        .unwrap();
    store
        .put(
            "tool-code/convert.js",
            br#"
                const units = require("units");
                async function handler(event, context) {
                    const celsius = event.tool_input.celsius;
                    console.log("converting", { celsius, requestId: context.requestId });
                    return {
                        statusCode: 200,
                        body: JSON.stringify({ fahrenheit: units.toFahrenheit(celsius) }),
                    };
                }
            "#
            .to_vec(),
        )
        .await
        .unwrap();
    Arc::new(BoundedBlobStore::new(store, Duration::from_secs(5)))
}

fn sandbox(blobs: Arc<dyn BlobStore>, records: Vec<ToolRecord>) -> ToolSandbox<InMemoryToolStore> {
    let registry = Arc::new(ToolRegistry::new(InMemoryToolStore::new(records)));
    let installer = Arc::new(BlobPackageInstaller::new(Arc::clone(&blobs), "tool-packages"));
    ToolSandbox::new(registry, blobs, installer, SandboxConfig::default())
}

fn result_of(envelope: &Envelope) -> Value {
    assert!(envelope.success, "tool failed: {:?}", envelope.error_text());
    envelope.result.clone().unwrap_or(Value::Null)
}

#[tokio::test]
async fn test_stored_handler_with_package() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    let blobs = seeded_store(&root).await;
    let mut convert = tool("convert", "", "units==1.0.0");
    convert.execution_code = None;
    convert.code_key = Some("tool-code/convert.js".to_owned());
    let sandbox = sandbox(blobs, vec![convert]);

    let envelope = sandbox.invoke("convert", &json!({"celsius": 100})).await;
    assert_eq!(result_of(&envelope), json!({"fahrenheit": 212}));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_invocations_keep_packages_apart() {
    let root = TempDir::new().unwrap();
    let blobs = seeded_store(&root).await;
    let code = "result = require('units').toFahrenheit(0);";
    let sandbox = Arc::new(sandbox(
        blobs,
        vec![
            tool("old", code, "units@1.0.0"),
            tool("new", code, "units@2.0.0"),
        ],
    ));

    let mut handles = Vec::new();
    for round in 0..4 {
        let name = if round % 2 == 0 { "old" } else { "new" };
        let worker = Arc::clone(&sandbox);
        handles.push(tokio::spawn(async move {
            (name, worker.invoke(name, &json!({})).await)
        }));
    }
    for handle in handles {
        let (name, envelope) = handle.await.unwrap();
        let expected = if name == "old" { json!(32) } else { json!("v2") };
        assert_eq!(result_of(&envelope), expected, "tool {name}");
    }
}

#[tokio::test]
async fn test_failure_kinds_are_reported() {
    let root = TempDir::new().unwrap();
    let blobs = seeded_store(&root).await;
    let sandbox = sandbox(
        blobs,
        vec![
            tool("syntax", "function (", ""),
            tool("needs-ghost", "result = 1", "ghost"),
            tool("reports", "function main() { return {success: false, error: 'quota'}; }", ""),
            tool("silent", "const unused = input;", ""),
        ],
    );

    let envelope = sandbox.invoke("syntax", &json!({})).await;
    assert_eq!(envelope.kind, Some(FailureKind::ExecutionError));
    assert!(envelope.error_text().unwrap().starts_with("JavaScript error"));

    let envelope = sandbox.invoke("needs-ghost", &json!({})).await;
    assert_eq!(envelope.kind, Some(FailureKind::DependencyInstallFailed));

    let envelope = sandbox.invoke("reports", &json!({})).await;
    assert_eq!(
        envelope.to_json(),
        json!({"success": false, "error": "quota", "kind": "ToolReported"})
    );

    let envelope = sandbox.invoke("silent", &json!({"a": 1})).await;
    assert_eq!(result_of(&envelope), json!("Tool executed successfully"));
}

#[tokio::test]
async fn test_sandbox_from_config() {
    let root = TempDir::new().unwrap();
    let blobs = seeded_store(&root).await;
    let registry = Arc::new(ToolRegistry::new(InMemoryToolStore::new(vec![tool(
        "convert",
        "function execute(celsius) { return require('units').toFahrenheit(celsius); }",
        "units",
    )])));
    blobs
        .put(
            "tool-packages/units/latest.js",
            b"exports.toFahrenheit = (celsius) => celsius + 1000;".to_vec(),
        )
        .await
        .unwrap();

    let sandbox = ToolSandbox::from_config(registry, blobs, &LoreConfig::default());
    let envelope = sandbox.invoke("convert", &json!({"celsius": 5})).await;
    assert_eq!(result_of(&envelope), json!(1005));
}
