//! Integration test crate for sealchain components.
//!
//! This crate exists solely to run integration tests that span the element,
//! ledger and attestation crates. It has no public API - all functionality is
//! in the test modules.

#![forbid(unsafe_code)]
