//! Per-run build telemetry.

use serde::Serialize;

use super::strategy::PackagingStrategy;

/// Outcome of one function build.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    pub function_id: String,
    pub build_time_ms: u64,
    pub bundle_size: u64,
    pub cache_hit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<PackagingStrategy>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TelemetryRecord {
    pub fn failure(function_id: impl Into<String>, build_time_ms: u64, error: impl Into<String>) -> Self {
        Self {
            function_id: function_id.into(),
            build_time_ms,
            bundle_size: 0,
            cache_hit: false,
            strategy: None,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Aggregates over the records of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStats {
    pub total: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub failures: usize,
    /// `cache_hits / total`, 0 when nothing was built
    pub hit_rate: f64,
    pub total_build_time_ms: u64,
}

/// Append-only telemetry log owned by one builder.
#[derive(Debug, Clone, Default)]
pub struct BuildTelemetry {
    enabled: bool,
    records: Vec<TelemetryRecord>,
}

impl BuildTelemetry {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            records: Vec::new(),
        }
    }

    pub fn record(&mut self, record: TelemetryRecord) {
        if self.enabled {
            self.records.push(record);
        }
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    pub fn snapshot(&self) -> Vec<TelemetryRecord> {
        self.records.clone()
    }

    pub fn stats(&self) -> BuildStats {
        let total = self.records.len();
        let cache_hits = self.records.iter().filter(|r| r.success && r.cache_hit).count();
        let failures = self.records.iter().filter(|r| !r.success).count();
        BuildStats {
            total,
            cache_hits,
            cache_misses: total - cache_hits - failures,
            failures,
            hit_rate: if total == 0 { 0.0 } else { cache_hits as f64 / total as f64 },
            total_build_time_ms: self.records.iter().map(|r| r.build_time_ms).sum(),
        }
    }
}
