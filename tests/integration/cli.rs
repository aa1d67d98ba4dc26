use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const STORAGE_APP: &str = r#"
name: plain
stacks:
  - name: data
    location: westeurope
    resources:
      - type: Microsoft.Storage/storageAccounts
        apiVersion: "2023-01-01"
        name: plaindata
        kind: StorageV2
        sku: { name: Standard_LRS }
"#;

fn armforge(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("armforge").unwrap();
    cmd.current_dir(temp.path())
        .env("ARMFORGE_CACHE_DIR", temp.path().join("cache"))
        .env("ARMFORGE_NO_PROGRESS", "1")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_synth_writes_assembly() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("app.yaml"), STORAGE_APP).unwrap();

    armforge(&temp)
        .args(["synth", "app.yaml", "--outdir", "out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("data.json"));

    let manifest = std::fs::read_to_string(temp.path().join("out/manifest.json")).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
    assert_eq!(manifest["stacks"][0]["name"], "data");
    assert!(temp.path().join("out/data.json").is_file());
}

#[test]
fn test_synth_quiet_prints_nothing() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("app.yaml"), STORAGE_APP).unwrap();

    armforge(&temp)
        .args(["--quiet", "synth", "app.yaml", "--outdir", "out", "--compact"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let template = std::fs::read_to_string(temp.path().join("out/data.json")).unwrap();
    assert!(!template.contains('\n'));
}

#[test]
fn test_synth_missing_app_fails() {
    let temp = TempDir::new().unwrap();

    armforge(&temp).args(["synth", "missing.yaml"]).assert().failure();
    assert!(!temp.path().join("armforge.out").exists());
}

#[test]
fn test_cache_stats_on_empty_cache() {
    let temp = TempDir::new().unwrap();

    armforge(&temp)
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Entries:         0"));
}

#[test]
fn test_cache_clean_reports_removed_entries() {
    let temp = TempDir::new().unwrap();
    let cache = temp.path().join("cache");
    std::fs::create_dir_all(&cache).unwrap();

    armforge(&temp)
        .args(["cache", "clean"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 cache entries"));
}

#[test]
fn test_unknown_validation_level_is_rejected() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("app.yaml"), STORAGE_APP).unwrap();

    armforge(&temp)
        .args(["synth", "app.yaml", "--level", "paranoid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("paranoid"));
}
