//! # seal-cli
//!
//! `sealctl`, the command-line front end of sealchain.
//!
//! Provides commands for:
//! - Creating and registering the device identity
//! - Attesting files on the ledger
//! - Querying attestations and device registrations
//! - Verifying one attestation or every local record
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  sign, hash   ┌────────────────┐
//! │ sealctl  │──────────────►│ secure element │
//! │          │               └────────────────┘
//! │          │  HTTP         ┌────────────────┐
//! │          │──────────────►│ ledger node    │
//! │          │               └────────────────┘
//! │          │  JSON files   ┌────────────────┐
//! │          │──────────────►│ record store   │
//! └──────────┘               └────────────────┘
//! ```
//!
//! Exit codes: `0` success, `1` failure, `2` verification mismatch.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod element;
pub mod error;
pub mod output;

pub use cli::{AttestArgs, Cli, Commands, ElementKind, Format, IdentityCommands};
pub use config::{MachineConfig, SealConfig};
pub use element::open_session;
pub use error::{CliError, EXIT_FAILURE, EXIT_MISMATCH, EXIT_SUCCESS};
pub use output::OutputFormat;
