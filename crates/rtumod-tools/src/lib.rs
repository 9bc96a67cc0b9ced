//! Shared argument parsing and setup for the `rtu-*` binaries.

pub mod common;
