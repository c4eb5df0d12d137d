//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use seal_attest::{
    AttestationRecord, CheckOutcome, DeviceIdentity, HashAnchor, RegisteredDevice,
    VerificationResult,
};
use seal_ledger::{transaction_url, CommittedTx};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// The device identity, with its registration when one was anchored.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityView {
    /// Base58 public key.
    pub public_key: String,
    /// Protected storage offset of the private key.
    pub key_offset: u16,
    /// Registration anchored by this command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<DeviceView>,
}

impl IdentityView {
    /// View of `identity`.
    #[must_use]
    pub fn new(identity: &DeviceIdentity, registration: Option<DeviceView>) -> Self {
        Self {
            public_key: identity.public_key.to_base58(),
            key_offset: identity.key_ref.offset,
            registration,
        }
    }
}

impl TableDisplay for IdentityView {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Device Identity")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Public key:       {}", self.public_key)?;
        writeln!(writer, "Key offset:       {}", self.key_offset)?;
        if let Some(registration) = &self.registration {
            writeln!(writer)?;
            registration.write_table(writer)?;
        }
        Ok(())
    }
}

/// A device registration found on or anchored to the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    /// The registration.
    #[serde(flatten)]
    pub device: RegisteredDevice,
    /// Explorer link of the registration.
    pub url: String,
}

impl DeviceView {
    /// View of `device` on the ledger at `ledger_url`.
    #[must_use]
    pub fn new(device: RegisteredDevice, ledger_url: &str) -> Self {
        let url = transaction_url(ledger_url, &device.tx_id);
        Self { device, url }
    }
}

impl TableDisplay for DeviceView {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let profile = &self.device.profile;
        writeln!(writer, "Machine: {}", profile.name)?;
        writeln!(writer, "──────────────────────────────────")?;
        writeln!(writer, "Public key:       {}", self.device.public_key)?;
        write_field(writer, "Type", &profile.kind)?;
        write_field(writer, "Owner", &profile.owner)?;
        write_field(writer, "Address", &profile.address_line)?;
        write_field(writer, "Zip code", &profile.zip_code)?;
        write_field(writer, "City", &profile.city)?;
        if let Some(location) = &self.device.location {
            write_field(writer, "Location", location)?;
        }
        writeln!(writer, "Transaction:      {}", self.url)?;
        Ok(())
    }
}

/// Lookup answer: the registration or nothing.
#[derive(Debug, Clone, Serialize)]
pub struct LookupView {
    /// Key looked up.
    pub public_key: String,
    /// Registration, if any.
    pub device: Option<DeviceView>,
}

impl TableDisplay for LookupView {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        match &self.device {
            Some(device) => device.write_table(writer),
            None => {
                writeln!(writer, "No device registered for {}", self.public_key)?;
                Ok(())
            }
        }
    }
}

/// Result of an attestation.
#[derive(Debug, Clone, Serialize)]
pub struct AttestView {
    /// The persisted record.
    #[serde(flatten)]
    pub record: AttestationRecord,
    /// Local record file.
    pub record_path: String,
    /// Explorer link of the anchoring transaction.
    pub url: String,
}

impl TableDisplay for AttestView {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "✓ Attested {}", self.record.subject_id)?;
        writeln!(writer, "SHA-256:          {}", self.record.content_hash)?;
        writeln!(writer, "Record:           {}", self.record_path)?;
        writeln!(writer, "Transaction:      {}", self.url)?;
        Ok(())
    }
}

/// Summary of a ledger transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TxSummary {
    /// Transaction id.
    pub tx_id: String,
    /// Asset subject.
    pub subject_id: Option<String>,
    /// Anchored hash, if the transaction is an attestation.
    pub sha256: Option<String>,
    /// Explorer link.
    pub url: String,
}

impl TxSummary {
    /// Summary of `tx` on the ledger at `ledger_url`.
    #[must_use]
    pub fn new(tx: &CommittedTx, ledger_url: &str) -> Self {
        Self {
            tx_id: tx.id.clone(),
            subject_id: tx.asset_str(seal_attest::SUBJECT_KEY).map(str::to_string),
            sha256: tx.asset_str(seal_attest::HASH_KEY).map(str::to_string),
            url: transaction_url(ledger_url, &tx.id),
        }
    }
}

/// Transactions matching a query.
#[derive(Debug, Clone, Serialize)]
pub struct TxList {
    /// What was searched for.
    pub query: String,
    /// Matching transactions.
    pub transactions: Vec<TxSummary>,
}

impl TableDisplay for TxList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.transactions.is_empty() {
            writeln!(writer, "No transactions for {}", self.query)?;
            return Ok(());
        }

        writeln!(writer, "{:<64}  {:<24}  SHA-256", "TRANSACTION", "SUBJECT")?;
        writeln!(writer, "{}", "─".repeat(156))?;
        for tx in &self.transactions {
            writeln!(
                writer,
                "{:<64}  {:<24}  {}",
                tx.tx_id,
                truncate(tx.subject_id.as_deref().unwrap_or("-"), 24),
                tx.sha256.as_deref().unwrap_or("-")
            )?;
        }
        writeln!(writer)?;
        writeln!(writer, "Total: {} transaction(s)", self.transactions.len())?;
        Ok(())
    }
}

/// Result of verifying one transaction.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyView {
    /// The verification result.
    #[serde(flatten)]
    pub result: VerificationResult,
    /// Explorer link of the transaction.
    pub url: String,
}

impl VerifyView {
    /// View of `result` on the ledger at `ledger_url`.
    #[must_use]
    pub fn new(result: VerificationResult, ledger_url: &str) -> Self {
        let url = transaction_url(ledger_url, &result.tx_id);
        Self { result, url }
    }
}

impl TableDisplay for VerifyView {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let result = &self.result;
        let missing = || "-".to_string();
        writeln!(writer, "Transaction:      {}", self.url)?;
        writeln!(
            writer,
            "Hash recomputed:  {} ({})",
            result.hash_recomputed.map_or_else(missing, |h| h.to_hex()),
            result.hash_anchor
        )?;
        writeln!(
            writer,
            "Hash local:       {}",
            result.hash_local.map_or_else(missing, |h| h.to_hex())
        )?;
        writeln!(writer, "Hash ledger:      {}", result.hash_ledger)?;
        if result.status.is_match() {
            writeln!(writer, "✓ Hashes match")?;
        } else {
            let divergences: Vec<String> =
                result.status.divergences().iter().map(ToString::to_string).collect();
            writeln!(writer, "✗ ATTENTION: hashes do not match ({})", divergences.join(", "))?;
        }
        if result.hash_anchor == HashAnchor::Software {
            writeln!(writer, "! Recomputed in software, not on the secure element")?;
        }
        writeln!(writer)?;
        writeln!(writer, "Signer:           {}", result.signer_public_key)?;
        match &result.signer_device {
            Some(device) => writeln!(
                writer,
                "Signer device:    {} ({})",
                device.profile.name, device.tx_id
            )?,
            None => writeln!(writer, "Signer device:    not registered")?,
        }
        Ok(())
    }
}

/// One row of a `check` report.
#[derive(Debug, Clone, Serialize)]
pub struct CheckRow {
    /// Transaction named by the local record.
    pub tx_id: String,
    /// `match`, `mismatch` or `error`.
    pub status: &'static str,
    /// Diverging pairs or missing sources.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub divergences: Vec<String>,
    /// Why verification could not run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Verification of every local record.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    /// One row per record, sorted by transaction id.
    pub records: Vec<CheckRow>,
    /// Records whose hashes all agree.
    pub matched: usize,
    /// Records with at least one divergence.
    pub mismatched: usize,
    /// Records that could not be verified.
    pub failed: usize,
    /// Primitive used to recompute hashes.
    pub hash_anchor: HashAnchor,
}

impl CheckReport {
    /// Summarise `outcomes`.
    #[must_use]
    pub fn new(outcomes: Vec<CheckOutcome>, hash_anchor: HashAnchor) -> Self {
        let records: Vec<CheckRow> = outcomes.into_iter().map(CheckRow::from).collect();
        let count = |status: &str| records.iter().filter(|r| r.status == status).count();
        Self {
            matched: count("match"),
            mismatched: count("mismatch"),
            failed: count("error"),
            records,
            hash_anchor,
        }
    }
}

impl From<CheckOutcome> for CheckRow {
    fn from(outcome: CheckOutcome) -> Self {
        match outcome.result {
            Ok(result) if result.status.is_match() => Self {
                tx_id: outcome.tx_id,
                status: "match",
                divergences: Vec::new(),
                error: None,
            },
            Ok(result) => Self {
                tx_id: outcome.tx_id,
                status: "mismatch",
                divergences: result
                    .status
                    .divergences()
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                error: None,
            },
            Err(err) => Self {
                tx_id: outcome.tx_id,
                status: "error",
                divergences: Vec::new(),
                error: Some(err.to_string()),
            },
        }
    }
}

impl TableDisplay for CheckReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.records.is_empty() {
            writeln!(writer, "No local records")?;
            return Ok(());
        }

        writeln!(writer, "{:<64}  {:<8}  DETAIL", "TRANSACTION", "STATUS")?;
        writeln!(writer, "{}", "─".repeat(96))?;
        for row in &self.records {
            let detail = row
                .error
                .clone()
                .unwrap_or_else(|| row.divergences.join(", "));
            writeln!(writer, "{:<64}  {:<8}  {}", row.tx_id, row.status, detail)?;
        }
        writeln!(writer)?;
        writeln!(
            writer,
            "Matched: {}  Mismatched: {}  Failed: {}  (hashes recomputed in {})",
            self.matched, self.mismatched, self.failed, self.hash_anchor
        )?;
        Ok(())
    }
}

fn write_field<W: Write>(writer: &mut W, label: &str, value: &str) -> Result<(), CliError> {
    if !value.is_empty() {
        writeln!(writer, "{:<18}{value}", format!("{label}:"))?;
    }
    Ok(())
}

/// Truncate a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seal_attest::{
        AttestError, ContentHash, DeviceProfile, KeyRef, PublicKey, VerificationStatus,
    };

    fn result(status: VerificationStatus) -> VerificationResult {
        VerificationResult {
            tx_id: "a".repeat(64),
            subject_id: Some("lot-1".to_string()),
            hash_local: Some(ContentHash::from_bytes([1; 32])),
            hash_ledger: ContentHash::from_bytes([1; 32]),
            hash_recomputed: Some(ContentHash::from_bytes([1; 32])),
            hash_anchor: HashAnchor::Hardware,
            status,
            signer_public_key: PublicKey::from_bytes([2; 32]),
            signer_device: None,
        }
    }

    #[test]
    fn output_format_default_is_table() {
        let fmt = OutputFormat::default();
        assert_eq!(fmt.format(), Format::Table);
        assert!(!fmt.is_json());
    }

    #[test]
    fn verify_view_json_is_flat() {
        let view = VerifyView::new(result(VerificationStatus::Match), "http://ledger");
        let text = OutputFormat::new(Format::Json).to_string(&view).expect("json");
        let value: serde_json::Value = serde_json::from_str(&text).expect("parse");
        assert_eq!(value["status"], "match");
        assert_eq!(value["hash_anchor"], "hardware");
        assert_eq!(
            value["url"],
            format!("http://ledger/api/v1/transactions/{}", "a".repeat(64))
        );
    }

    #[test]
    fn verify_view_table_names_divergences() {
        let view = VerifyView::new(
            result(VerificationStatus::Mismatch {
                divergences: vec![seal_attest::Divergence::LocalVsLedger],
            }),
            "http://ledger",
        );
        let text = OutputFormat::default().to_string(&view).expect("table");
        assert!(text.contains("hashes do not match (local-vs-ledger)"));
        assert!(text.contains("not registered"));
    }

    #[test]
    fn check_report_counts_outcomes() {
        let outcomes = vec![
            CheckOutcome {
                tx_id: "1".repeat(64),
                result: Ok(result(VerificationStatus::Match)),
            },
            CheckOutcome {
                tx_id: "2".repeat(64),
                result: Ok(result(VerificationStatus::Mismatch {
                    divergences: vec![seal_attest::Divergence::LocalRecordMissing],
                })),
            },
            CheckOutcome {
                tx_id: "3".repeat(64),
                result: Err(AttestError::TransactionNotFound("3".repeat(64))),
            },
        ];
        let report = CheckReport::new(outcomes, HashAnchor::Software);
        assert_eq!((report.matched, report.mismatched, report.failed), (1, 1, 1));
        assert_eq!(report.records[1].divergences, vec!["local-record-missing"]);
    }

    #[test]
    fn identity_view_table_shows_registration() {
        let identity = DeviceIdentity {
            public_key: PublicKey::from_bytes([5; 32]),
            key_ref: KeyRef::default(),
        };
        let device = RegisteredDevice {
            public_key: identity.public_key,
            profile: DeviceProfile::named("press-4"),
            location: Some("Halle 8".to_string()),
            tx_id: "b".repeat(64),
        };
        let view = IdentityView::new(&identity, Some(DeviceView::new(device, "http://ledger")));
        let text = OutputFormat::default().to_string(&view).expect("table");
        assert!(text.contains(&identity.public_key.to_base58()));
        assert!(text.contains("Machine: press-4"));
        assert!(text.contains("Halle 8"));
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Glück-Glück-Glück", 8), "Glück...");
    }
}
