//! Disk-backed, content-addressed build cache.
//!
//! Each entry lives in `{cache_dir}/{key}.json` and holds a serialized
//! [`CacheEntry`]. Keys digest every build input: handler content, build
//! options, the optional function config file, the nearest dependency
//! manifest and the compiler version. Changing any input changes the key.
//!
//! The cache never fails a build. Read problems (unreadable or unparseable
//! entries, integrity mismatches) delete the entry and report a miss; write
//! problems are logged and skipped.
//!
//! Expiry and eviction both use file modification times. An entry older than
//! the configured TTL, or than the TTL recorded in the entry when it was
//! written, is a miss and is removed when read. After every write the oldest
//! entries are removed until the cache fits its size ceiling.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;

use super::artifact::BuildArtifact;
use super::descriptor::BuildOptions;
use super::strategy::PackagingStrategy;
use crate::config::CacheConfig;
use crate::utils::{atomic_write, hash_bytes, hash_file, hash_parts};

const ENTRY_EXTENSION: &str = "json";

/// One cached build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub artifact: BuildArtifact,
    pub cached_at: DateTime<Utc>,
    /// TTL in force when the entry was written; the shorter of this and the
    /// reader's TTL applies
    pub ttl_ms: u64,
    /// Packaging strategy chosen when the artifact was built
    #[serde(default)]
    pub strategy: Option<PackagingStrategy>,
}

/// Summary of the cache directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

struct EntryFile {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

/// Build cache rooted at [`CacheConfig::cache_dir`].
#[derive(Debug, Clone)]
pub struct BuildCache {
    config: CacheConfig,
    toolchain_version: String,
}

impl BuildCache {
    /// `toolchain_version` is folded into every key, so upgrading the
    /// compiler invalidates all entries.
    pub fn new(config: CacheConfig, toolchain_version: impl Into<String>) -> Self {
        Self {
            config,
            toolchain_version: toolchain_version.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.config.cache_dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    /// Deterministic key for a build.
    ///
    /// Fails only when the handler or config file cannot be read.
    pub async fn cache_key(
        &self,
        handler: &Path,
        options: &BuildOptions,
        resource_config: Option<&Path>,
    ) -> Result<String> {
        let handler_hash = hash_file(handler).await?;
        let config_hash = match resource_config {
            Some(path) => hash_file(path).await?,
            None => String::new(),
        };
        let manifest_hash = dependency_manifest_hash(handler).await;

        Ok(hash_parts(&[
            handler_hash.as_str(),
            options.canonical_json().as_str(),
            config_hash.as_str(),
            manifest_hash.as_str(),
            self.toolchain_version.as_str(),
        ]))
    }

    /// Look up an entry. Absent, expired or unreadable entries are misses.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        if !self.config.enabled {
            return None;
        }

        let path = self.entry_path(key);
        let metadata = fs::metadata(&path).await.ok()?;

        let age = metadata
            .modified()
            .ok()
            .and_then(|m| SystemTime::now().duration_since(m).ok())
            .unwrap_or(Duration::ZERO);
        if age > self.config.ttl {
            tracing::debug!(target: "cache", "Entry {key} expired ({}s old)", age.as_secs());
            self.discard(&path).await;
            return None;
        }

        let content = match fs::read(&path).await {
            Ok(content) => content,
            // evicted by a concurrent writer
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(target: "cache", "Failed to read cache entry {}: {e}", path.display());
                self.discard(&path).await;
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry>(&content) {
            Ok(entry) if age > Duration::from_millis(entry.ttl_ms) => {
                tracing::debug!(target: "cache", "Entry {key} outlived its recorded TTL ({}s old)", age.as_secs());
                self.discard(&path).await;
                None
            }
            Ok(entry) if entry.key == key && entry.artifact.verify_integrity() => {
                tracing::debug!(target: "cache", "Cache hit for {}", entry.artifact.function_id);
                Some(entry)
            }
            Ok(_) => {
                tracing::warn!(target: "cache", "Cache entry {} failed its integrity check", path.display());
                self.discard(&path).await;
                None
            }
            Err(e) => {
                tracing::warn!(target: "cache", "Corrupt cache entry {}: {e}", path.display());
                self.discard(&path).await;
                None
            }
        }
    }

    /// Store an artifact, then enforce the size ceiling. Never fails.
    pub async fn set(&self, key: &str, artifact: &BuildArtifact, strategy: PackagingStrategy) {
        if !self.config.enabled {
            return;
        }

        let entry = CacheEntry {
            key: key.to_string(),
            artifact: artifact.clone(),
            cached_at: Utc::now(),
            ttl_ms: u64::try_from(self.config.ttl.as_millis()).unwrap_or(u64::MAX),
            strategy: Some(strategy),
        };

        let content = match serde_json::to_vec(&entry) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(target: "cache", "Failed to serialize cache entry for {}: {e}", artifact.function_id);
                return;
            }
        };

        let path = self.entry_path(key);
        let written = tokio::task::spawn_blocking(move || atomic_write(&path, &content)).await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(target: "cache", "Failed to write cache entry {key}: {e:#}");
                return;
            }
            Err(e) => {
                tracing::warn!(target: "cache", "Cache write task failed for {key}: {e}");
                return;
            }
        }

        if let Err(e) = self.evict().await {
            tracing::warn!(target: "cache", "Cache eviction failed: {e:#}");
        }
    }

    /// Delete one entry. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove cache entry {}", path.display())),
        }
    }

    /// Delete every entry whose key contains `pattern`, or every entry when
    /// no pattern is given. Returns the number removed.
    pub async fn invalidate(&self, pattern: Option<&str>) -> Result<usize> {
        let mut removed = 0;
        for entry in self.entries().await? {
            let key = entry.path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if pattern.is_none_or(|p| key.contains(p)) {
                fs::remove_file(&entry.path)
                    .await
                    .with_context(|| format!("Failed to remove cache entry {}", entry.path.display()))?;
                removed += 1;
            }
        }
        tracing::debug!(target: "cache", "Invalidated {removed} cache entries");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let entries = self.entries().await?;
        let mut stats = CacheStats {
            entries: entries.len(),
            ..Default::default()
        };
        for entry in &entries {
            stats.total_size += entry.size;
            let modified = DateTime::<Utc>::from(entry.modified);
            stats.oldest_entry = Some(stats.oldest_entry.map_or(modified, |o| o.min(modified)));
            stats.newest_entry = Some(stats.newest_entry.map_or(modified, |n| n.max(modified)));
        }
        Ok(stats)
    }

    /// Remove oldest entries until the total size is within `max_size`.
    async fn evict(&self) -> Result<()> {
        let mut entries = self.entries().await?;
        let mut total: u64 = entries.iter().map(|e| e.size).sum();
        if total <= self.config.max_size {
            return Ok(());
        }

        entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        for entry in entries {
            if total <= self.config.max_size {
                break;
            }
            match fs::remove_file(&entry.path).await {
                Ok(()) => {
                    total = total.saturating_sub(entry.size);
                    tracing::debug!(target: "cache", "Evicted {}", entry.path.display());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    total = total.saturating_sub(entry.size);
                }
                Err(e) => {
                    tracing::warn!(target: "cache", "Failed to evict {}: {e}", entry.path.display());
                }
            }
        }
        Ok(())
    }

    /// Entry files currently on disk. A missing cache directory is empty.
    async fn entries(&self) -> Result<Vec<EntryFile>> {
        let mut dir = match fs::read_dir(&self.config.cache_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read cache directory {}", self.config.cache_dir.display())
                });
            }
        };

        let mut entries = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            // entries can disappear under concurrent eviction
            let Ok(metadata) = item.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            entries.push(EntryFile {
                path,
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        Ok(entries)
    }

    async fn discard(&self, path: &Path) {
        let removed = match fs::symlink_metadata(path).await {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path).await,
            _ => fs::remove_file(path).await,
        };
        if let Err(e) = removed
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(target: "cache", "Failed to remove cache entry {}: {e}", path.display());
        }
    }
}

/// Hash of the nearest `package.json` above the handler, plus its sibling
/// `package-lock.json` when present. Empty when there is no manifest.
async fn dependency_manifest_hash(handler: &Path) -> String {
    let mut dir = handler.parent();
    while let Some(current) = dir {
        let manifest = current.join("package.json");
        if let Ok(content) = fs::read(&manifest).await {
            let lock = fs::read(current.join("package-lock.json")).await.unwrap_or_default();
            return hash_parts(&[hash_bytes(&content), hash_bytes(&lock)]);
        }
        dir = current.parent();
    }
    String::new()
}
