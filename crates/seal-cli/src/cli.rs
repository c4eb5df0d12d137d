//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Hardware-anchored data attestation on a ledger.
#[derive(Parser, Debug, Clone)]
#[command(name = "sealctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Ledger node URL.
    #[arg(short, long, global = true, env = "SEAL_LEDGER_URL")]
    pub ledger: Option<String>,

    /// Directory of local attestation records.
    #[arg(short, long, global = true, env = "SEAL_DATABASE_DIR")]
    pub database: Option<PathBuf>,

    /// Secure element backend.
    #[arg(short, long, global = true, value_enum, env = "SEAL_ELEMENT")]
    pub element: Option<ElementKind>,

    /// Path of the native secure element library.
    #[arg(long, global = true, env = "SEAL_LIBRARY_PATH")]
    pub library: Option<PathBuf>,

    /// Recompute hashes in software when verifying.
    #[arg(long, global = true)]
    pub software_hash: bool,

    /// Output format.
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Secure element backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// The vendor library on real hardware.
    Native,
    /// A software element for development.
    #[default]
    Simulated,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Device identity management.
    Identity {
        /// Identity subcommand to execute.
        #[command(subcommand)]
        command: IdentityCommands,
    },

    /// Hash a file on the secure element and anchor it on the ledger.
    Attest(AttestArgs),

    /// List ledger transactions for a subject id.
    Query {
        /// Subject id the attestations were filed under.
        subject: String,
    },

    /// Show the device registered under a public key.
    Lookup {
        /// Base58 public key.
        public_key: String,
    },

    /// Verify one attestation against the ledger and its local record.
    Verify {
        /// Ledger transaction id.
        tx_id: String,
    },

    /// Verify every local record.
    Check,
}

/// Identity subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum IdentityCommands {
    /// Generate the device key pair and register the device on the ledger.
    Create {
        /// Machine name anchored with the registration.
        #[arg(short, long)]
        name: String,

        /// Replace an existing identity. Attestations by the old key can no
        /// longer be extended.
        #[arg(long)]
        force: bool,

        /// Do not anchor a device registration.
        #[arg(long)]
        no_register: bool,
    },

    /// Register the existing identity on the ledger.
    Register {
        /// Machine name anchored with the registration.
        #[arg(short, long)]
        name: String,
    },

    /// Show the stored identity and its registration.
    Show,
}

/// Arguments for the attest command.
#[derive(Args, Debug, Clone)]
pub struct AttestArgs {
    /// File to attest.
    pub file: PathBuf,

    /// Subject id anchored with the hash. Defaults to the `id` field of a
    /// JSON object payload, else the file name without extension.
    #[arg(short, long)]
    pub subject: Option<String>,

    /// Transaction metadata (KEY=VALUE). JSON values are kept as JSON.
    #[arg(short, long, value_name = "KEY=VALUE")]
    pub meta: Vec<String>,

    /// Attest even if the same content is already anchored.
    #[arg(long)]
    pub allow_duplicate: bool,
}
