//! Cross-cutting utilities
//!
//! - [`fs`] - Atomic writes, directory helpers and staged promotion
//! - [`hash`] - SHA-256 content hashing for cache keys and integrity digests
//! - [`progress`] - Progress bars for the CLI

pub mod fs;
pub mod hash;
pub mod progress;

pub use fs::{atomic_write, atomic_write_multiple, ensure_dir, is_safe_file_name};
pub use hash::{ContentHasher, hash_bytes, hash_file, hash_parts, sha256_integrity};
