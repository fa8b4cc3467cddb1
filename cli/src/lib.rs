//! Demo clients for the `sam` binary and the workspace integration tests.

pub mod puzzle;
