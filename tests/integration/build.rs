use armforge::config::{BuilderConfig, CacheConfig};
use armforge::core::ArmforgeError;
use armforge::functions::{BuildCache, BuildOptions, FunctionBuilder, FunctionDescriptor, PackagingStrategy};
use armforge::test_utils::{FakeCompiler, write_handler};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config(temp: &TempDir) -> BuilderConfig {
    BuilderConfig::with_cache(CacheConfig::with_dir(temp.path().join("cache")))
}

#[tokio::test]
async fn test_ten_builds_with_concurrency_three() {
    let temp = TempDir::new().unwrap();
    let compiler = Arc::new(FakeCompiler::new().with_delay(Duration::from_millis(25)));
    let mut builder = FunctionBuilder::new(config(&temp).concurrency(3), compiler.clone());

    let descriptors: Vec<FunctionDescriptor> = (0..10)
        .map(|i| {
            let handler = write_handler(temp.path(), &format!("f{i}"), &format!("export const v = {i};"));
            FunctionDescriptor::new(format!("f{i}"), format!("f{i}"), handler)
        })
        .collect();

    let outcome = builder.build_all(&descriptors).await.unwrap();
    assert_eq!(outcome.artifacts.len(), 10);
    assert_eq!(outcome.telemetry.len(), 10);
    assert!(compiler.max_in_flight() <= 3);
    for i in 0..10 {
        assert!(outcome.artifacts.contains_key(&format!("f{i}")));
    }
}

#[tokio::test]
async fn test_strategy_follows_bundle_characteristics() {
    let temp = TempDir::new().unwrap();
    let mut builder = FunctionBuilder::new(config(&temp), Arc::new(FakeCompiler::new()));

    let cases = [
        ("tiny", "export const a = 1;\n", PackagingStrategy::Inline),
        ("deps", "// DEP axios\nexport const a = 1;\n", PackagingStrategy::Storage),
        ("native", "// NATIVE\nexport const a = 1;\n", PackagingStrategy::Container),
        ("padded", "// PAD 8192\nexport const a = 1;\n", PackagingStrategy::Storage),
    ];
    let descriptors: Vec<FunctionDescriptor> = cases
        .iter()
        .map(|(name, source, _)| FunctionDescriptor::new(*name, *name, write_handler(temp.path(), name, source)))
        .collect();

    let outcome = builder.build_all(&descriptors).await.unwrap();
    for (name, _, expected) in cases {
        assert_eq!(outcome.artifacts[name].strategy, expected, "{name}");
    }
    assert!(outcome.artifacts["deps"].artifact.metadata.dependencies.contains("axios"));
    assert!(outcome.artifacts["native"].artifact.metadata.has_native_modules);
}

#[tokio::test]
async fn test_cache_hit_keeps_original_strategy() {
    let temp = TempDir::new().unwrap();
    let compiler = Arc::new(FakeCompiler::new());
    let handler = write_handler(temp.path(), "orders", "// DEP lodash\nexport const a = 1;\n");
    let descriptor = FunctionDescriptor::new("orders", "orders", handler);

    let mut first = FunctionBuilder::new(config(&temp), compiler.clone());
    first.build_all(std::slice::from_ref(&descriptor)).await.unwrap();

    let mut second = FunctionBuilder::new(config(&temp), compiler.clone());
    let outcome = second.build_all(std::slice::from_ref(&descriptor)).await.unwrap();
    let built = &outcome.artifacts["orders"];
    assert!(built.cache_hit);
    assert_eq!(built.strategy, PackagingStrategy::Storage);
    assert_eq!(outcome.telemetry[0].strategy, Some(PackagingStrategy::Storage));
    assert_eq!(compiler.calls(), 1);
}

#[tokio::test]
async fn test_changed_options_miss_the_cache() {
    let temp = TempDir::new().unwrap();
    let compiler = Arc::new(FakeCompiler::new());
    let handler = write_handler(temp.path(), "orders", "export const a = 1;\n");
    let descriptor = FunctionDescriptor::new("orders", "orders", handler);
    let mut builder = FunctionBuilder::new(config(&temp), compiler.clone());

    builder.build_one(&descriptor).await.unwrap();
    let with_map = descriptor.clone().with_options(BuildOptions {
        source_map: true,
        ..BuildOptions::default()
    });
    let built = builder.build_one(&with_map).await.unwrap();

    assert!(!built.cache_hit);
    assert!(built.artifact.source_map.is_some());
    assert_eq!(compiler.calls(), 2);
    assert_eq!(BuildCache::new(config(&temp).cache, "fake 1.0.0").stats().await.unwrap().entries, 2);
}

#[tokio::test]
async fn test_resource_config_file_is_merged() {
    let temp = TempDir::new().unwrap();
    let handler = write_handler(temp.path(), "nightly", "export const run = () => 1;\n");
    let resource = temp.path().join("src/nightly.resource.yaml");
    std::fs::write(
        &resource,
        "trigger:\n  type: timer\n  schedule: \"0 0 2 * * *\"\nenvironment:\n  REGION: westeurope\n",
    )
    .unwrap();
    let descriptor = FunctionDescriptor::new("nightly", "nightly", handler).with_resource_config(&resource);

    let mut builder = FunctionBuilder::new(config(&temp), Arc::new(FakeCompiler::new()));
    let outcome = builder.build_all(&[descriptor]).await.unwrap();
    let built = &outcome.artifacts["nightly"];
    assert!(built.descriptor.trigger.is_some());
    assert_eq!(built.environment["REGION"], "westeurope");
}

#[tokio::test]
async fn test_invalid_resource_configs_are_reported_together() {
    let temp = TempDir::new().unwrap();
    let mut descriptors = Vec::new();
    for name in ["a", "b"] {
        let handler = write_handler(temp.path(), name, "export {};\n");
        let resource = temp.path().join(format!("src/{name}.resource.json"));
        std::fs::write(&resource, r#"{"trigger": {"type": "timer", "schedule": "every day"}}"#).unwrap();
        descriptors.push(FunctionDescriptor::new(name, name, handler).with_resource_config(resource));
    }

    let compiler = Arc::new(FakeCompiler::new());
    let mut builder = FunctionBuilder::new(config(&temp), compiler.clone());
    let err = builder.build_all(&descriptors).await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("2 function configurations are invalid"), "{message}");
    assert!(message.contains("a.resource.json"));
    assert!(message.contains("b.resource.json"));
    assert_eq!(compiler.calls(), 0);
}

#[tokio::test]
async fn test_empty_bundle_fails_only_that_function() {
    let temp = TempDir::new().unwrap();
    let mut builder = FunctionBuilder::new(config(&temp), Arc::new(FakeCompiler::new()));
    let descriptors = vec![
        FunctionDescriptor::new("ok", "ok", write_handler(temp.path(), "ok", "export {};\n")),
        FunctionDescriptor::new("empty", "empty", write_handler(temp.path(), "empty", "// EMPTY\n")),
    ];

    let err = builder.build_all(&descriptors).await.unwrap_err();
    match err.downcast_ref::<ArmforgeError>() {
        Some(ArmforgeError::BatchBuildFailed { failures }) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains("empty bundle"), "{failures:?}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let stats = builder.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.failures, 1);
}
