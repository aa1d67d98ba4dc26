//! End-to-end tests for armforge.
//!
//! Function builds use the in-process `FakeCompiler` from
//! `armforge::test_utils`, so no esbuild installation is needed.

mod build;
mod cli;
mod synth;
