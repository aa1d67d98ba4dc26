//! Build artifacts and their metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::constants::BASE_MEMORY_ESTIMATE_MB;
use crate::utils::hash_bytes;

const MIB: u64 = 1024 * 1024;

/// Facts about a bundle, computed once when it is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetadata {
    /// Bundle size in bytes
    pub size: u64,
    pub build_time_ms: u64,
    /// Content hash of the bundle bytes alone
    pub hash: String,
    /// Top-level third-party packages that contributed to the bundle
    pub dependencies: BTreeSet<String>,
    pub has_native_modules: bool,
    pub memory_estimate_mb: u64,
}

/// Rough runtime memory need for a bundle: 128 MB plus 2 MB per MiB of
/// bundle, rounded up to a whole MB.
///
/// This is a heuristic, not a measurement.
pub fn estimate_memory_mb(bundle_size: u64) -> u64 {
    (BASE_MEMORY_ESTIMATE_MB as f64 + 2.0 * bundle_size as f64 / MIB as f64).ceil() as u64
}

/// A bundled function ready for packaging.
///
/// Binary payloads are stored base64-encoded when serialized, so an artifact
/// written to JSON and read back is byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArtifact {
    pub function_id: String,
    pub function_name: String,
    #[serde(with = "base64_bytes")]
    pub bundle: Vec<u8>,
    #[serde(default, with = "base64_opt_bytes", skip_serializing_if = "Option::is_none")]
    pub source_map: Option<Vec<u8>>,
    pub metadata: BuildMetadata,
}

impl BuildArtifact {
    /// Assemble an artifact, deriving size, hash and memory estimate from the bundle.
    pub fn new(
        function_id: impl Into<String>,
        function_name: impl Into<String>,
        bundle: Vec<u8>,
        source_map: Option<Vec<u8>>,
        dependencies: BTreeSet<String>,
        has_native_modules: bool,
        build_time_ms: u64,
    ) -> Self {
        let size = bundle.len() as u64;
        let metadata = BuildMetadata {
            size,
            build_time_ms,
            hash: hash_bytes(&bundle),
            dependencies,
            has_native_modules,
            memory_estimate_mb: estimate_memory_mb(size),
        };
        Self {
            function_id: function_id.into(),
            function_name: function_name.into(),
            bundle,
            source_map,
            metadata,
        }
    }

    /// Whether the stored hash still matches the bundle bytes.
    pub fn verify_integrity(&self) -> bool {
        hash_bytes(&self.bundle) == self.metadata.hash
    }

    pub fn size_kb(&self) -> f64 {
        self.metadata.size as f64 / 1024.0
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

mod base64_opt_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
