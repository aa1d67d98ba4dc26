//! Global constants used throughout the armforge codebase.
//!
//! This module contains size ceilings, platform limits, cache defaults and
//! timeouts that are shared across the synthesis and function build
//! pipelines. Defining them centrally keeps the magic numbers discoverable.

use std::time::Duration;

/// Default ceiling for a single synthesized template document (3 MiB).
///
/// Documents above this size are split into a root template plus linked
/// templates when linked templates are enabled.
pub const DEFAULT_MAX_TEMPLATE_SIZE: usize = 3 * 1024 * 1024;

/// Hard platform limit for a deployment template (4 MiB).
pub const ARM_TEMPLATE_SIZE_LIMIT: usize = 4 * 1024 * 1024;

/// Maximum number of resources in a single template.
pub const ARM_MAX_RESOURCES: usize = 800;

/// Maximum number of parameters in a single template.
pub const ARM_MAX_PARAMETERS: usize = 256;

/// Maximum number of variables in a single template.
pub const ARM_MAX_VARIABLES: usize = 256;

/// Maximum number of outputs in a single template.
pub const ARM_MAX_OUTPUTS: usize = 64;

/// Maximum length of a fully qualified resource name.
pub const ARM_MAX_RESOURCE_NAME_LENGTH: usize = 260;

/// Resource names above this length draw a naming warning.
pub const RECOMMENDED_NAME_LENGTH: usize = 64;

/// Content version stamped on every synthesized template.
pub const TEMPLATE_CONTENT_VERSION: &str = "1.0.0.0";

/// API version used for the `Microsoft.Resources/deployments` resources that
/// link child templates into a root template.
pub const DEPLOYMENTS_API_VERSION: &str = "2022-09-01";

/// Manifest format version written to `manifest.json`.
pub const MANIFEST_VERSION: &str = "1.0.0";

/// Default time-to-live for build cache entries (1 hour).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(3_600_000);

/// Default total size ceiling for the build cache (1 GiB).
pub const DEFAULT_CACHE_MAX_SIZE: u64 = 1_073_741_824;

/// Default number of function builds that may be in flight at once.
pub const DEFAULT_BUILD_CONCURRENCY: usize = 4;

/// Wall-clock limit for a single function build (5 minutes).
///
/// A build that exceeds this limit is abandoned, marked failed and its
/// concurrency slot is released.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(300);

/// Bundles below this size (in KB) without dependencies are deployed inline.
pub const INLINE_SIZE_LIMIT_KB: f64 = 4.0;

/// Bundles above this size (in KB) are referenced externally.
pub const EXTERNAL_SIZE_THRESHOLD_KB: f64 = 50.0 * 1024.0;

/// Bundles above this size (in KB) are deployed as containers.
pub const CONTAINER_SIZE_THRESHOLD_KB: f64 = 100.0 * 1024.0;

/// Baseline memory estimate for a function runtime in MB.
pub const BASE_MEMORY_ESTIMATE_MB: u64 = 128;

/// Environment variable overriding the build cache directory.
pub const CACHE_DIR_ENV: &str = "ARMFORGE_CACHE_DIR";

/// Environment variable overriding the esbuild executable location.
pub const ESBUILD_ENV: &str = "ARMFORGE_ESBUILD";

/// Default output directory for synthesized documents.
pub const DEFAULT_OUTDIR: &str = "armforge.out";

/// Default project configuration file name.
pub const PROJECT_CONFIG_FILE: &str = "armforge.toml";
