use armforge::config::{BuilderConfig, CacheConfig, SynthesisOptions};
use armforge::construct::{ConstructNode, GenericResource, StackProps, load_app};
use armforge::core::{ArmforgeError, DeploymentScope};
use armforge::functions::{FunctionBuilder, PackagingStrategy};
use armforge::synth::{Manifest, Synthesizer};
use armforge::test_utils::{AppFixture, FakeCompiler, init_test_logging, write_handler};
use std::io::{Cursor, Read};
use std::sync::Arc;
use tempfile::TempDir;

fn builder(temp: &TempDir, compiler: Arc<FakeCompiler>) -> FunctionBuilder {
    let config = BuilderConfig::with_cache(CacheConfig::with_dir(temp.path().join("cache")));
    FunctionBuilder::new(config, compiler)
}

fn options(temp: &TempDir) -> SynthesisOptions {
    SynthesisOptions {
        outdir: temp.path().join("out"),
        ..SynthesisOptions::default()
    }
}

fn read_manifest(temp: &TempDir) -> Manifest {
    let content = std::fs::read(temp.path().join("out/manifest.json")).unwrap();
    serde_json::from_slice(&content).unwrap()
}

#[tokio::test]
async fn test_synthesize_app_with_inline_function() {
    init_test_logging(None);
    let temp = TempDir::new().unwrap();
    let app = AppFixture::basic().write_to(temp.path());
    let tree = load_app(&app).await.unwrap();

    let compiler = Arc::new(FakeCompiler::new());
    let mut synthesizer = Synthesizer::new(options(&temp)).with_builder(builder(&temp, compiler.clone()));
    let result = synthesizer.synthesize(&tree).await.unwrap();

    // storage account is declared second but deploys first
    let template: serde_json::Value =
        serde_json::from_slice(&std::fs::read(temp.path().join("out/shop-core.json")).unwrap()).unwrap();
    let resources = template["resources"].as_array().unwrap();
    assert_eq!(resources[0]["name"], "shopdata");
    assert_eq!(resources[1]["name"], "shop-api");
    assert_eq!(resources[1]["dependsOn"][0], "shopdata");
    assert_eq!(resources[0]["location"], "westeurope");

    let manifest = read_manifest(&temp);
    assert_eq!(manifest, result.manifest);
    assert_eq!(manifest.stacks.len(), 1);
    assert_eq!(manifest.stacks[0].resource_count, 2);
    assert_eq!(manifest.stacks[0].output_count, 1);
    assert_eq!(manifest.functions.len(), 1);

    let function = &manifest.functions[0];
    assert_eq!(function.function_name, "orders");
    assert_eq!(function.stack, "shop-core");
    assert_eq!(function.strategy, PackagingStrategy::Inline);
    assert!(function.integrity.starts_with("sha256:"));
    assert!(temp.path().join("out/functions/orders/index.js").is_file());
    assert_eq!(compiler.calls(), 1);
}

#[tokio::test]
async fn test_storage_function_is_packaged_as_zip() {
    let temp = TempDir::new().unwrap();
    let app = AppFixture::basic().write_to(temp.path());
    write_handler(temp.path(), "orders", "// DEP lodash\nexport const handler = () => 1;\n");
    let tree = load_app(&app).await.unwrap();

    let mut synthesizer =
        Synthesizer::new(options(&temp)).with_builder(builder(&temp, Arc::new(FakeCompiler::new())));
    synthesizer.synthesize(&tree).await.unwrap();

    let manifest = read_manifest(&temp);
    let function = &manifest.functions[0];
    assert_eq!(function.strategy, PackagingStrategy::Storage);
    assert_eq!(function.artifact, "functions/orders/orders.zip");

    let archive = std::fs::read(temp.path().join(&function.artifact)).unwrap();
    assert_eq!(archive.len() as u64, function.size);
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
    let mut function_json = String::new();
    zip.by_name("orders/function.json").unwrap().read_to_string(&mut function_json).unwrap();
    let function_json: serde_json::Value = serde_json::from_str(&function_json).unwrap();
    assert_eq!(function_json["bindings"][0]["type"], "httpTrigger");
    assert_eq!(function_json["scriptFile"], "index.js");
    assert!(zip.by_name("host.json").is_ok());
}

#[tokio::test]
async fn test_second_synthesis_hits_build_cache() {
    let temp = TempDir::new().unwrap();
    let app = AppFixture::basic().write_to(temp.path());
    let tree = load_app(&app).await.unwrap();
    let compiler = Arc::new(FakeCompiler::new());

    Synthesizer::new(options(&temp))
        .with_builder(builder(&temp, compiler.clone()))
        .synthesize(&tree)
        .await
        .unwrap();
    let result = Synthesizer::new(options(&temp))
        .with_builder(builder(&temp, compiler.clone()))
        .synthesize(&tree)
        .await
        .unwrap();

    assert_eq!(compiler.calls(), 1);
    assert!(result.manifest.functions[0].cache_hit);
    let stats = result.build_stats.unwrap();
    assert_eq!(stats.cache_hits, 1);
}

#[tokio::test]
async fn test_large_stack_is_split_into_linked_templates() {
    let temp = TempDir::new().unwrap();
    let mut props = StackProps::new("big", DeploymentScope::ResourceGroup);
    props.location = Some("westeurope".to_string());
    let mut stack = ConstructNode::stack("big", props);
    for i in 0..12 {
        let mut resource = GenericResource::new("Microsoft.Network/publicIPAddresses", "2023-04-01", format!("ip{i}"))
            .with_properties(serde_json::json!({ "description": "x".repeat(300) }));
        if i > 0 {
            resource = resource.depends_on(format!("ip{}", i - 1));
        }
        stack.add_child(ConstructNode::resource(Arc::new(resource)));
    }
    let tree = ConstructNode::root("app").with_child(stack);

    let mut options = options(&temp);
    options.max_template_size = 2_000;
    let result = Synthesizer::new(options).synthesize(&tree).await.unwrap();

    let manifest = &result.manifest;
    let stack = &manifest.stacks[0];
    assert!(stack.linked_templates.len() > 1);
    assert_eq!(stack.deployment_order.len(), stack.linked_templates.len());
    assert_eq!(stack.deployment_order[0], "big-linked-1");
    assert_eq!(stack.resource_count, 12);
    // written pretty printed, and still within the ceiling on disk
    for file in stack.linked_templates.iter().chain(std::iter::once(&stack.template_file)) {
        let written = std::fs::read_to_string(temp.path().join("out").join(file)).unwrap();
        assert!(written.contains("\n  "));
        assert!(written.len() <= 2_000, "{file} is {} bytes", written.len());
    }

    let root: serde_json::Value =
        serde_json::from_slice(&std::fs::read(temp.path().join("out/big.json")).unwrap()).unwrap();
    let deployments = root["resources"].as_array().unwrap();
    assert_eq!(deployments.len(), stack.linked_templates.len());
    assert_eq!(deployments[0]["type"], "Microsoft.Resources/deployments");
    assert_eq!(deployments[1]["dependsOn"][0], "big-linked-1");
}

#[tokio::test]
async fn test_scope_violation_fails_prepare() {
    let temp = TempDir::new().unwrap();
    let policy = GenericResource::new("Microsoft.Authorization/policyDefinitions", "2021-06-01", "deny-public-ip")
        .with_scope(DeploymentScope::Subscription);
    let tree = ConstructNode::root("app").with_child(
        ConstructNode::stack("core", StackProps::new("core", DeploymentScope::ResourceGroup))
            .with_child(ConstructNode::resource(Arc::new(policy))),
    );

    let err = Synthesizer::new(options(&temp)).synthesize(&tree).await.unwrap_err();
    assert!(err.to_string().contains("prepare phase"));
    let violation = err.chain().find_map(|e| e.downcast_ref::<ArmforgeError>().filter(|e| {
        matches!(e, ArmforgeError::ScopeViolation { .. })
    }));
    assert!(violation.is_some(), "{err:#}");
    assert!(!temp.path().join("out").exists());
}

#[tokio::test]
async fn test_same_function_name_in_two_stacks_fails_prepare() {
    let temp = TempDir::new().unwrap();
    let handler = write_handler(temp.path(), "api", "export {};\n");
    let stack = |name: &str, id: &str| {
        ConstructNode::stack(name, StackProps::new(name, DeploymentScope::ResourceGroup)).with_child(
            ConstructNode::function(armforge::functions::FunctionDescriptor::new(id, "api", handler.clone())),
        )
    };
    let tree = ConstructNode::root("app").with_child(stack("east", "east-api")).with_child(stack("west", "west-api"));
    let compiler = Arc::new(FakeCompiler::new());

    let err = Synthesizer::new(options(&temp))
        .with_builder(builder(&temp, compiler.clone()))
        .synthesize(&tree)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("prepare phase"));
    assert!(format!("{err:#}").contains("Duplicate function name 'api'"), "{err:#}");
    assert_eq!(compiler.calls(), 0);
    assert!(!temp.path().join("out").exists());
}

#[tokio::test]
async fn test_reference_to_other_stack_is_unresolved() {
    let temp = TempDir::new().unwrap();
    let app = AppFixture::orphan_reference().write_to(temp.path());
    let tree = load_app(&app).await.unwrap();

    let err = Synthesizer::new(options(&temp)).synthesize(&tree).await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("transform phase"));
    assert!(message.contains("unknown resource 'elsewhere'"), "{message}");
}

#[tokio::test]
async fn test_missing_handler_fails_without_output() {
    let temp = TempDir::new().unwrap();
    let app = AppFixture::basic().write_to(temp.path());
    std::fs::remove_file(temp.path().join("src/orders.ts")).unwrap();
    let tree = load_app(&app).await.unwrap();

    let err = Synthesizer::new(options(&temp))
        .with_builder(builder(&temp, Arc::new(FakeCompiler::new())))
        .synthesize(&tree)
        .await
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Handler file(s) not found"), "{message}");
    assert!(message.contains("orders.ts"));
    assert!(!temp.path().join("out").exists());
}
