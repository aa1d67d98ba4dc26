//! Core types shared by the synthesis and function build pipelines.
//!
//! - [`ArmforgeError`] - strongly-typed error kinds for precise handling in code
//! - [`ErrorContext`] / [`user_friendly_error`] - colored CLI diagnostics with suggestions
//! - [`DeploymentScope`] - the scope a stack deploys at or a resource requires

pub mod error;
mod scope;

pub use error::{ArmforgeError, ErrorContext, user_friendly_error};
pub use scope::DeploymentScope;
